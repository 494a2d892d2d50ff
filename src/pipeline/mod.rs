//! Recognition pipeline: the worker state machine and its host thread.
//!
//! # Architecture
//!
//! ```text
//! AudioSource ──FrameCallback──▶ bounded queue ──▶ RecognitionWorker
//!                                                    │  Decoder
//!                                                    │  CommandTable ─▶ RemoteClient
//!                                                    ▼
//!                       WorkerHost ◀── WorkerEvent (Acknowledged / Failed)
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use obs_voice_control::audio::CpalSource;
//! use obs_voice_control::commands::CommandTable;
//! use obs_voice_control::pipeline::{RecognitionWorker, WorkerHost, WorkerOptions};
//! use obs_voice_control::remote::{ObsClient, RemoteConfig};
//! # use obs_voice_control::stt::{Decoder, ModelLoadError};
//! # fn loader() -> Result<Box<dyn Decoder>, ModelLoadError> { unimplemented!() }
//!
//! let worker = RecognitionWorker::new(
//!     Box::new(CpalSource::new()),
//!     Box::new(loader),
//!     Box::new(ObsClient::new(RemoteConfig::default())),
//!     CommandTable::standard("freya"),
//!     WorkerOptions::default(),
//! );
//! let mut host = WorkerHost::start(worker).unwrap();
//! // ... later
//! host.request_stop();
//! host.join(Duration::from_secs(5));
//! ```

pub mod host;
pub mod state;
pub mod worker;

pub use host::{JoinOutcome, WorkerHost};
pub use state::{StateCell, WorkerState};
pub use worker::{
    RecognitionWorker, WorkerControl, WorkerError, WorkerEvent, WorkerOptions,
    CONNECT_FAILED_MESSAGE,
};
