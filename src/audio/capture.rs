//! Microphone capture via `cpal`.
//!
//! [`CpalSource`] implements [`AudioSource`].  A `cpal::Stream` is not `Send`
//! on every platform, so the stream is built, played and dropped on a
//! dedicated `audio-capture` thread; the source itself only holds that
//! thread's handle and a shutdown channel.  [`AudioSource::close`] signals the
//! thread and joins it, which releases the device.
//!
//! The stream callback converts whatever the device delivers into 16 kHz mono
//! `i16`, cuts it into fixed-size [`AudioFrame`]s and hands each one to the
//! registered [`FrameCallback`].  Conversion runs on the capture thread so the
//! queue carries ready frames.  Its work is linear in the device buffer, it
//! never locks, and it allocates once per emitted frame, since all
//! intermediate buffers are kept across calls.
//!
//! Stream errors after `open` go to the registered [`ErrorCallback`].

use std::sync::mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};

use super::frame::{AudioFrame, ErrorCallback, FrameCallback};
use super::resample::{f32_to_i16, i16_to_f32, resample_to_16k, stereo_to_mono};
use super::source::{AudioError, AudioSource, StreamParams};

// ---------------------------------------------------------------------------
// cpal error mapping
// ---------------------------------------------------------------------------

fn backend_error(description: String) -> AudioError {
    let lower = description.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        AudioError::PermissionDenied(description)
    } else {
        AudioError::DeviceUnavailable(description)
    }
}

impl From<cpal::SupportedStreamConfigsError> for AudioError {
    fn from(e: cpal::SupportedStreamConfigsError) -> Self {
        match &e {
            cpal::SupportedStreamConfigsError::DeviceNotAvailable => {
                AudioError::DeviceUnavailable(e.to_string())
            }
            _ => backend_error(e.to_string()),
        }
    }
}

impl From<cpal::DefaultStreamConfigError> for AudioError {
    fn from(e: cpal::DefaultStreamConfigError) -> Self {
        match &e {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => {
                AudioError::DeviceUnavailable(e.to_string())
            }
            cpal::DefaultStreamConfigError::StreamTypeNotSupported => {
                AudioError::FormatUnsupported(e.to_string())
            }
            _ => backend_error(e.to_string()),
        }
    }
}

impl From<cpal::BuildStreamError> for AudioError {
    fn from(e: cpal::BuildStreamError) -> Self {
        match &e {
            cpal::BuildStreamError::DeviceNotAvailable => {
                AudioError::DeviceUnavailable(e.to_string())
            }
            cpal::BuildStreamError::StreamConfigNotSupported => {
                AudioError::FormatUnsupported(e.to_string())
            }
            _ => backend_error(e.to_string()),
        }
    }
}

impl From<cpal::StreamError> for AudioError {
    fn from(e: cpal::StreamError) -> Self {
        match &e {
            cpal::StreamError::DeviceNotAvailable => AudioError::DeviceUnavailable(e.to_string()),
            _ => backend_error(e.to_string()),
        }
    }
}

impl From<cpal::PlayStreamError> for AudioError {
    fn from(e: cpal::PlayStreamError) -> Self {
        match &e {
            cpal::PlayStreamError::DeviceNotAvailable => {
                AudioError::DeviceUnavailable(e.to_string())
            }
            _ => backend_error(e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Rechunker
// ---------------------------------------------------------------------------

/// Converts device buffers to 16 kHz mono `i16` and emits fixed-size frames.
///
/// The scratch buffers grow to the largest device buffer seen and are then
/// reused.
struct Rechunker {
    channels: u16,
    source_rate: u32,
    frame_size: usize,
    input: Vec<f32>,
    mono: Vec<f32>,
    resampled: Vec<f32>,
    quantised: Vec<i16>,
    pending: Vec<i16>,
    callback: FrameCallback,
}

impl Rechunker {
    fn new(channels: u16, source_rate: u32, frame_size: usize, callback: FrameCallback) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            channels,
            source_rate,
            frame_size,
            input: Vec::new(),
            mono: Vec::new(),
            resampled: Vec::new(),
            quantised: Vec::new(),
            pending: Vec::with_capacity(frame_size * 2),
            callback,
        }
    }

    fn push_i16(&mut self, data: &[i16]) {
        let mut input = std::mem::take(&mut self.input);
        i16_to_f32(data, &mut input);
        self.push(&input);
        self.input = input;
    }

    fn push(&mut self, data: &[f32]) {
        stereo_to_mono(data, self.channels, &mut self.mono);
        resample_to_16k(&self.mono, self.source_rate, &mut self.resampled);
        f32_to_i16(&self.resampled, &mut self.quantised);
        self.pending.extend_from_slice(&self.quantised);

        let mut emitted = 0;
        while self.pending.len() - emitted >= self.frame_size {
            let frame = &self.pending[emitted..emitted + self.frame_size];
            (self.callback)(AudioFrame::new(frame));
            emitted += self.frame_size;
        }
        self.pending.drain(..emitted);
    }
}

// ---------------------------------------------------------------------------
// Device / config resolution
// ---------------------------------------------------------------------------

/// First input device whose name contains `hint` (case-insensitive), else the
/// host default.
fn select_device(hint: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();

    if let Some(hint) = hint.filter(|h| !h.trim().is_empty()) {
        let pattern = hint.to_lowercase();
        match host.input_devices() {
            Ok(mut devices) => {
                let found = devices.find(|d| {
                    d.name()
                        .map(|n| n.to_lowercase().contains(&pattern))
                        .unwrap_or(false)
                });
                if let Some(device) = found {
                    return Ok(device);
                }
                log::warn!("capture: no input device matches '{hint}', using the default");
            }
            Err(e) => log::warn!("capture: failed to enumerate input devices: {e}"),
        }
    }

    host.default_input_device().ok_or_else(|| {
        AudioError::DeviceUnavailable("no input device found on the default audio host".into())
    })
}

/// Prefer a native configuration at `sample_rate`; otherwise fall back to the
/// device default and let the [`Rechunker`] convert.
fn select_config(
    device: &cpal::Device,
    sample_rate: u32,
) -> Result<(StreamConfig, SampleFormat), AudioError> {
    let wanted = SampleRate(sample_rate);

    let native = device
        .supported_input_configs()?
        .filter(|c| matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32))
        .filter(|c| c.min_sample_rate() <= wanted && wanted <= c.max_sample_rate())
        .min_by_key(|c| c.channels());

    let supported = match native {
        Some(range) => range.with_sample_rate(wanted),
        None => device.default_input_config()?,
    };

    match supported.sample_format() {
        format @ (SampleFormat::I16 | SampleFormat::F32) => Ok((supported.config(), format)),
        other => Err(AudioError::FormatUnsupported(format!(
            "device only offers {other:?} samples"
        ))),
    }
}

fn start_stream(
    params: &StreamParams,
    callback: FrameCallback,
    mut on_failure: ErrorCallback,
) -> Result<cpal::Stream, AudioError> {
    let device = select_device(params.device_hint.as_deref())?;
    let (config, format) = select_config(&device, params.sample_rate)?;

    let name = device.name().unwrap_or_else(|_| "<unknown>".into());
    log::info!(
        "capture: using '{name}' at {} Hz, {} ch, {format:?}",
        config.sample_rate.0,
        config.channels
    );

    let mut chunker = Rechunker::new(
        config.channels,
        config.sample_rate.0,
        params.frame_size,
        callback,
    );
    let on_error = move |err: cpal::StreamError| {
        log::error!("capture: stream error: {err}");
        on_failure(AudioError::from(err));
    };

    let stream = match format {
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| chunker.push_i16(data),
            on_error,
            None,
        )?,
        _ => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| chunker.push(data),
            on_error,
            None,
        )?,
    };

    stream.play()?;
    Ok(stream)
}

// ---------------------------------------------------------------------------
// CpalSource
// ---------------------------------------------------------------------------

struct CaptureThread {
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// [`AudioSource`] backed by the system microphone.
#[derive(Default)]
pub struct CpalSource {
    callback: Option<FrameCallback>,
    on_error: Option<ErrorCallback>,
    capture: Option<CaptureThread>,
}

impl CpalSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSource for CpalSource {
    fn on_frame(&mut self, callback: FrameCallback) {
        self.callback = Some(callback);
    }

    fn on_error(&mut self, callback: ErrorCallback) {
        self.on_error = Some(callback);
    }

    fn open(&mut self, params: &StreamParams) -> Result<(), AudioError> {
        if self.capture.is_some() {
            return Ok(());
        }

        let callback = self.callback.take().unwrap_or_else(|| {
            log::warn!("capture: opened without a frame callback; audio will be discarded");
            Box::new(|_| {})
        });
        let on_error = self.on_error.take().unwrap_or_else(|| Box::new(|_| {}));

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioError>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let params = params.clone();

        let handle = std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let stream = match start_stream(&params, callback, on_error) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Hold the stream until close() or the source is dropped.
                let _ = shutdown_rx.recv();
                drop(stream);
            })
            .map_err(|e| AudioError::DeviceUnavailable(format!("capture thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.capture = Some(CaptureThread {
                    shutdown: shutdown_tx,
                    handle,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(AudioError::DeviceUnavailable(
                    "capture thread exited while starting".into(),
                ))
            }
        }
    }

    fn close(&mut self) {
        if let Some(capture) = self.capture.take() {
            let _ = capture.shutdown.send(());
            if capture.handle.join().is_err() {
                log::error!("capture: audio thread panicked");
            }
            log::info!("capture: audio stream closed");
        }
    }

    fn is_open(&self) -> bool {
        self.capture.is_some()
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
