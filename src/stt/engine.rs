//! Core STT engine trait and implementations.
//!
//! # Overview
//!
//! [`SttEngine`] is the batch interface the streaming decoder calls once per
//! finished speech segment.  It is object-safe and `Send + Sync`.
//!
//! [`WhisperEngine`] (feature `whisper`) wraps a `whisper_rs::WhisperContext`.
//! Construct it with [`WhisperEngine::load`].
//!
//! [`MockSttEngine`] (available under `#[cfg(test)]`) returns a pre-configured
//! response without any model file.

use thiserror::Error;

use crate::stt::transcribe::TranscriptionResult;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from a single transcription call.  These never stop the worker; the
/// decoder logs them and discards the segment.
#[derive(Debug, Clone, Error)]
pub enum SttError {
    /// An error occurred during the inference pass.
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// The supplied audio buffer is empty.
    #[error("Audio too short: no samples")]
    AudioTooShort,

    /// The supplied audio buffer exceeds the maximum 30 s
    /// (480 000 samples at 16 kHz).
    #[error("Audio too long: maximum 30 s (480 000 samples at 16 kHz)")]
    AudioTooLong,
}

/// The recognition model could not be located or initialised.  Fatal to
/// worker startup; raised before the audio device is opened.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelLoadError {
    /// The model file was not found at the given path.
    #[error("Model not found: {0}")]
    NotFound(String),

    /// The backend failed to initialise from the model file.
    #[error("Model initialisation failed: {0}")]
    Init(String),

    /// No recognition backend was compiled into this build.
    #[error("Speech recognition unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// SttEngine trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe interface for batch speech-to-text engines.
///
/// # Contract
///
/// - `audio` must be **16 kHz, mono, f32** PCM samples.
/// - Returns `Err(SttError::AudioTooShort)` when `audio` is empty.
/// - Returns `Err(SttError::AudioTooLong)` when `audio.len() > 480_000`.
pub trait SttEngine: Send + Sync {
    /// Transcribe `audio`, returning the raw transcript and inference time.
    fn transcribe(&self, audio: &[f32]) -> Result<TranscriptionResult, SttError>;
}

// Compile-time assertion: Box<dyn SttEngine> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SttEngine>) {}
};

// ---------------------------------------------------------------------------
// Audio length constants (16 kHz mono f32)
// ---------------------------------------------------------------------------

/// Whisper produces unreliable output on clips under one second, so shorter
/// segments are zero-padded up to this length.
pub(crate) const MIN_AUDIO_SAMPLES: usize = 16_000;
/// Maximum audio length: 30 s × 16 000 Hz.  Matches Whisper's window.
pub(crate) const MAX_AUDIO_SAMPLES: usize = 480_000;

fn check_length(audio: &[f32]) -> Result<(), SttError> {
    if audio.is_empty() {
        return Err(SttError::AudioTooShort);
    }
    if audio.len() > MAX_AUDIO_SAMPLES {
        return Err(SttError::AudioTooLong);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// WhisperEngine
// ---------------------------------------------------------------------------

#[cfg(feature = "whisper")]
pub use whisper::WhisperEngine;

#[cfg(feature = "whisper")]
mod whisper {
    use std::borrow::Cow;
    use std::path::Path;

    use whisper_rs::{FullParams, WhisperContext, WhisperContextParameters};

    use super::{check_length, ModelLoadError, SttEngine, SttError, MIN_AUDIO_SAMPLES};
    use crate::stt::transcribe::{SamplingStrategy, TranscribeParams, TranscriptionResult};

    /// Production STT engine that wraps a `whisper_rs::WhisperContext`.
    ///
    /// A new `WhisperState` is created for every call so the engine needs no
    /// locking.
    pub struct WhisperEngine {
        ctx: WhisperContext,
        params: TranscribeParams,
    }

    impl std::fmt::Debug for WhisperEngine {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("WhisperEngine")
                .field("params", &self.params)
                .finish_non_exhaustive()
        }
    }

    // SAFETY: WhisperContext is Send+Sync as declared by whisper-rs; the model
    // weights are read-only after loading.
    unsafe impl Send for WhisperEngine {}
    unsafe impl Sync for WhisperEngine {}

    impl WhisperEngine {
        /// Load a GGML model from `model_path`.
        ///
        /// # Errors
        ///
        /// - [`ModelLoadError::NotFound`] if `model_path` does not exist.
        /// - [`ModelLoadError::Init`] if whisper-rs failed to load the file.
        pub fn load(
            model_path: impl AsRef<Path>,
            params: TranscribeParams,
        ) -> Result<Self, ModelLoadError> {
            let path = model_path.as_ref();

            if !path.exists() {
                return Err(ModelLoadError::NotFound(path.display().to_string()));
            }

            let path_str = path.to_str().ok_or_else(|| {
                ModelLoadError::NotFound(format!(
                    "model path contains non-UTF-8 characters: {}",
                    path.display()
                ))
            })?;

            let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
                .map_err(|e| ModelLoadError::Init(e.to_string()))?;

            log::info!("stt: whisper model loaded from {}", path.display());
            Ok(Self { ctx, params })
        }
    }

    impl SttEngine for WhisperEngine {
        fn transcribe(&self, audio: &[f32]) -> Result<TranscriptionResult, SttError> {
            check_length(audio)?;

            let audio: Cow<'_, [f32]> = if audio.len() < MIN_AUDIO_SAMPLES {
                let mut padded = audio.to_vec();
                padded.resize(MIN_AUDIO_SAMPLES, 0.0);
                Cow::Owned(padded)
            } else {
                Cow::Borrowed(audio)
            };

            use whisper_rs::SamplingStrategy as WS;
            let ws = match self.params.strategy {
                SamplingStrategy::Greedy { best_of } => WS::Greedy { best_of },
                SamplingStrategy::BeamSearch { beam_size, patience } => {
                    WS::BeamSearch { beam_size, patience }
                }
            };

            let mut fp = FullParams::new(ws);
            let lang: Option<&str> = if self.params.language == "auto" {
                None
            } else {
                Some(self.params.language.as_str())
            };
            fp.set_language(lang);
            fp.set_n_threads(self.params.n_threads);
            fp.set_single_segment(true);
            fp.set_no_context(true);
            if let Some(prompt) = self.params.initial_prompt.as_deref().filter(|p| !p.is_empty()) {
                fp.set_initial_prompt(prompt);
            }

            if self.params.suppress_progress {
                fp.set_print_progress(false);
                fp.set_print_realtime(false);
                fp.set_print_special(false);
            }

            let mut state = self
                .ctx
                .create_state()
                .map_err(|e| SttError::Transcription(e.to_string()))?;

            let wall_start = std::time::Instant::now();

            state
                .full(fp, &audio)
                .map_err(|e| SttError::Transcription(e.to_string()))?;

            let n_segments = state
                .full_n_segments()
                .map_err(|e| SttError::Transcription(e.to_string()))?;

            let mut text = String::new();
            for i in 0..n_segments {
                let seg_text = state
                    .full_get_segment_text(i)
                    .map_err(|e| SttError::Transcription(format!("segment {i}: {e}")))?;
                text.push_str(&seg_text);
            }

            Ok(TranscriptionResult {
                text: text.trim().to_string(),
                duration_ms: wall_start.elapsed().as_millis(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// MockSttEngine  (test-only)
// ---------------------------------------------------------------------------

/// A test double that returns a pre-configured response and records how many
/// samples each call received.
#[cfg(test)]
pub struct MockSttEngine {
    response: Result<String, SttError>,
    calls: std::sync::Mutex<Vec<usize>>,
}

#[cfg(test)]
impl MockSttEngine {
    /// Create a mock that always returns `Ok(text)`.
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
            calls: Default::default(),
        }
    }

    /// Create a mock that always returns `Err(error)`.
    pub fn err(error: SttError) -> Self {
        Self {
            response: Err(error),
            calls: Default::default(),
        }
    }

    /// Sample counts passed to each `transcribe` call, in order.
    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl SttEngine for MockSttEngine {
    fn transcribe(&self, audio: &[f32]) -> Result<TranscriptionResult, SttError> {
        // Enforce the audio-length contract even in the mock so callers are
        // tested against it.
        check_length(audio)?;
        self.calls.lock().unwrap().push(audio.len());
        self.response.clone().map(|text| TranscriptionResult {
            text,
            duration_ms: 0,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
