//! Audio capture: microphone → 16 kHz mono frames → bounded queue.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback (audio-capture thread)
//!           → stereo_to_mono → resample_to_16k → f32_to_i16 → AudioFrame
//!           → FrameSender::push (try_send, drop-on-full)
//!           → FrameReceiver (recognition worker)
//! ```
//!
//! The worker never talks to cpal directly; it goes through the
//! [`AudioSource`] trait so tests can substitute a scripted source.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use obs_voice_control::audio::{AudioSource, CpalSource, StreamParams};
//!
//! let mut source = CpalSource::new();
//! source.on_frame(Box::new(|frame| println!("{} samples", frame.len())));
//! source.open(&StreamParams::default()).unwrap();
//! std::thread::sleep(std::time::Duration::from_secs(1));
//! source.close();
//! ```

pub mod capture;
pub mod frame;
pub mod resample;
pub mod source;
pub mod vad;

pub use capture::CpalSource;
pub use frame::{AudioFrame, ErrorCallback, FrameCallback, FrameSender, SAMPLE_RATE};
pub use resample::{f32_to_i16, i16_to_f32, resample_to_16k, stereo_to_mono};
pub use source::{AudioError, AudioSource, StreamParams, DEFAULT_FRAME_SIZE};
pub use vad::VadDetector;
