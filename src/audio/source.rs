//! The [`AudioSource`] seam between the worker and a capture backend.

use thiserror::Error;

use super::frame::{ErrorCallback, FrameCallback, SAMPLE_RATE};

/// Errors that abort the current worker run.  None of them are retried
/// internally.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AudioError {
    /// No matching input device exists, or it vanished.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The OS refused access to the microphone.
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    /// The device cannot deliver a sample format or rate we can convert.
    #[error("unsupported audio format: {0}")]
    FormatUnsupported(String),
}

/// Samples per frame unless configured otherwise: 0.5 s at 16 kHz.
pub const DEFAULT_FRAME_SIZE: usize = 8_000;

/// Parameters for opening a capture stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamParams {
    /// Rate of the frames delivered to the callback (Hz).
    pub sample_rate: u32,
    /// Samples per delivered frame.
    pub frame_size: usize,
    /// Case-insensitive substring of the preferred input device name.
    pub device_hint: Option<String>,
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            frame_size: DEFAULT_FRAME_SIZE,
            device_hint: None,
        }
    }
}

/// A microphone capture stream.
///
/// Implementations must be `Send` so the worker that owns them can move to its
/// own thread.
pub trait AudioSource: Send {
    /// Register the producer callback used by the next [`open`](Self::open).
    ///
    /// The callback runs on the capture thread and must only enqueue.
    fn on_frame(&mut self, callback: FrameCallback);

    /// Register the callback told about stream failures after `open`
    /// succeeded.  It may run on any backend thread.
    fn on_error(&mut self, callback: ErrorCallback);

    /// Start capturing.  Opening an already-open source is a no-op.
    fn open(&mut self, params: &StreamParams) -> Result<(), AudioError>;

    /// Release the device.  Idempotent: calling it twice, or on a source that
    /// was never opened, does nothing.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}
