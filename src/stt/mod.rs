//! Speech-to-text: streaming decoder over a batch Whisper engine.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │            Decoder (trait, owned by the worker)       │
//! │                                                      │
//! │   ┌──────────────┐    ┌──────────────────┐           │
//! │   │  Endpointer  │    │ SttEngine (trait)│           │
//! │   │ - VAD / RMS  │───▶│  WhisperEngine   │           │
//! │   │ - silence ms │    │  audio → text    │           │
//! │   └──────────────┘    └────────┬─────────┘           │
//! │                                ▼                     │
//! │                    Utterance::normalize              │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The worker builds its decoder through a [`DecoderLoader`] so that a
//! missing model fails the run before the microphone is opened.
//!
//! # Quick start
//!
//! ```rust,no_run
//! # #[cfg(feature = "whisper")]
//! # {
//! use obs_voice_control::stt::{DecoderLoader, EndpointConfig, TranscribeParams, WhisperLoader};
//!
//! let loader = WhisperLoader {
//!     model_path: "models/ggml-base.en.bin".into(),
//!     params: TranscribeParams::default(),
//!     endpoint: EndpointConfig::default(),
//! };
//! let _decoder = loader.load().expect("model not found");
//! # }
//! ```

pub mod decoder;
pub mod engine;
pub mod transcribe;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use decoder::{Decoder, DecoderLoader, EndpointConfig, Endpointer, StreamingDecoder, Utterance};
#[cfg(feature = "whisper")]
pub use decoder::WhisperLoader;
pub use engine::{ModelLoadError, SttEngine, SttError};
#[cfg(feature = "whisper")]
pub use engine::WhisperEngine;
pub use transcribe::{SamplingStrategy, TranscribeParams, TranscriptionResult};

#[cfg(test)]
pub use engine::MockSttEngine;
