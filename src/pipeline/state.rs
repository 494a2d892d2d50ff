//! Worker lifecycle states.
//!
//! [`WorkerState`] is written only by the recognition worker.  The host and
//! any other thread read it through a shared [`StateCell`] (an `AtomicU8`),
//! never by touching worker fields.

use std::sync::atomic::{AtomicU8, Ordering};

// ---------------------------------------------------------------------------
// WorkerState
// ---------------------------------------------------------------------------

/// States of the recognition worker.
///
/// ```text
/// Idle ──run()──▶ Starting ──device open──▶ Running ──stop──▶ Stopping ──▶ Stopped
///                    │                         │                             │
///                    └──────── error ──────────┴──────────▶ Failed          │
///                                                                            │
/// Stopped ──run()──▶ Starting   (the only way a worker is reused) ◀──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum WorkerState {
    /// Constructed, never run.
    #[default]
    Idle = 0,
    /// Loading the decoder, connecting, opening the device.
    Starting = 1,
    /// Consuming frames.
    Running = 2,
    /// Releasing resources after a stop request.
    Stopping = 3,
    /// Clean terminal state; `run()` may be called again.
    Stopped = 4,
    /// Terminal after an error.
    Failed = 5,
}

impl WorkerState {
    /// Short human-readable label for logs and status lines.
    pub fn label(&self) -> &'static str {
        match self {
            WorkerState::Idle => "Idle",
            WorkerState::Starting => "Starting",
            WorkerState::Running => "Running",
            WorkerState::Stopping => "Stopping",
            WorkerState::Stopped => "Stopped",
            WorkerState::Failed => "Failed",
        }
    }

    /// `true` for `Stopped` and `Failed`.
    ///
    /// ```
    /// use obs_voice_control::pipeline::WorkerState;
    ///
    /// assert!(WorkerState::Stopped.is_terminal());
    /// assert!(WorkerState::Failed.is_terminal());
    /// assert!(!WorkerState::Running.is_terminal());
    /// ```
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Stopped | WorkerState::Failed)
    }

    /// States from which `run()` is accepted.
    pub fn can_start(&self) -> bool {
        matches!(self, WorkerState::Idle | WorkerState::Stopped)
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerState::Idle,
            1 => WorkerState::Starting,
            2 => WorkerState::Running,
            3 => WorkerState::Stopping,
            4 => WorkerState::Stopped,
            _ => WorkerState::Failed,
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// StateCell
// ---------------------------------------------------------------------------

/// Lock-free holder for a [`WorkerState`].
#[derive(Debug, Default)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: WorkerState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Release);
    }
}
