//! Streaming decoder: PCM frames in, finalized utterances out.
//!
//! ```text
//! AudioFrame ─▶ Endpointer ──(speech burst + trailing silence)──▶ segment
//!                                                                   │
//!                       Utterance::normalize ◀── SttEngine::transcribe
//! ```
//!
//! The [`Decoder`] trait is what the recognition worker sees: feed one frame
//! at a time, and when [`Decoder::accept_frame`] returns `true` collect the
//! finished [`Utterance`] with [`Decoder::take_utterance`].  State persists
//! across calls, so a phrase spanning many frames is decoded once.

use std::fmt;

use crate::audio::{AudioFrame, VadDetector, SAMPLE_RATE};
use crate::stt::engine::{ModelLoadError, SttEngine};

// ---------------------------------------------------------------------------
// Utterance
// ---------------------------------------------------------------------------

/// A finalized phrase: lowercase, punctuation stripped, single-spaced.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Utterance(String);

impl Utterance {
    /// Normalize raw recognizer output.
    ///
    /// Bracketed annotations such as `[BLANK_AUDIO]` or `(music)` are removed,
    /// punctuation becomes whitespace, and runs of whitespace collapse.
    ///
    /// ```
    /// use obs_voice_control::stt::Utterance;
    ///
    /// let u = Utterance::normalize(" Freya, clip   that! [BLANK_AUDIO]");
    /// assert_eq!(u.as_str(), "freya clip that");
    /// ```
    pub fn normalize(raw: &str) -> Self {
        let mut depth = 0usize;
        let mut cleaned = String::with_capacity(raw.len());

        for c in raw.chars() {
            match c {
                '[' | '(' => depth += 1,
                ']' | ')' => depth = depth.saturating_sub(1),
                _ if depth > 0 => {}
                c if c.is_alphanumeric() || c == '\'' => cleaned.extend(c.to_lowercase()),
                _ => cleaned.push(' '),
            }
        }

        Self(cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

}

impl fmt::Display for Utterance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Decoder / DecoderLoader
// ---------------------------------------------------------------------------

/// Stateful speech-to-text over a frame stream.
pub trait Decoder: Send {
    /// Feed one frame.  Returns `true` exactly when this frame completed an
    /// utterance.
    fn accept_frame(&mut self, frame: &AudioFrame) -> bool;

    /// The utterance finalized by the last `true` from
    /// [`accept_frame`](Self::accept_frame).  Returns `None` when there is
    /// nothing pending, including a second call for the same utterance.
    fn take_utterance(&mut self) -> Option<Utterance>;
}

/// Builds a [`Decoder`] at worker start.  Loading may be slow (model files)
/// and may fail, in which case the worker fails before opening the device.
pub trait DecoderLoader: Send {
    fn load(&self) -> Result<Box<dyn Decoder>, ModelLoadError>;
}

impl<F> DecoderLoader for F
where
    F: Fn() -> Result<Box<dyn Decoder>, ModelLoadError> + Send,
{
    fn load(&self) -> Result<Box<dyn Decoder>, ModelLoadError> {
        self()
    }
}

// ---------------------------------------------------------------------------
// Endpointer
// ---------------------------------------------------------------------------

/// Utterance boundary detection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointConfig {
    /// RMS level above which a 30 ms window counts as speech.
    pub vad_threshold: f32,
    /// Silence after speech that ends an utterance.
    pub trailing_silence_ms: u32,
    /// Segments are cut at exactly this length; audio past the cut starts
    /// the next segment.
    pub max_utterance_ms: u32,
    /// Segments with less voiced audio than this are discarded as noise.
    pub min_speech_ms: u32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            vad_threshold: 0.01,
            trailing_silence_ms: 700,
            max_utterance_ms: 10_000,
            min_speech_ms: 200,
        }
    }
}

fn samples_to_ms(samples: usize) -> u64 {
    samples as u64 * 1_000 / SAMPLE_RATE as u64
}

/// Energy-based endpointer.  Silence before speech is discarded; once speech
/// starts every sample is kept until the trailing-silence or length limit is
/// hit.
#[derive(Debug)]
pub struct Endpointer {
    vad: VadDetector,
    config: EndpointConfig,
    segment: Vec<f32>,
    voiced_samples: usize,
    trailing_silence: usize,
}

impl Endpointer {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            vad: VadDetector::new(config.vad_threshold),
            config,
            segment: Vec::new(),
            voiced_samples: 0,
            trailing_silence: 0,
        }
    }

    pub fn in_speech(&self) -> bool {
        !self.segment.is_empty()
    }

    /// Feed samples; returns a trimmed speech segment when an endpoint is
    /// reached.
    pub fn push(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        match self.vad.voice_span(samples) {
            Some((start, end)) => {
                self.segment.extend_from_slice(samples);
                self.voiced_samples += end - start;
                self.trailing_silence = samples.len() - end;
            }
            None if self.in_speech() => {
                self.segment.extend_from_slice(samples);
                self.trailing_silence += samples.len();
            }
            None => return None,
        }

        let silence_ms = samples_to_ms(self.trailing_silence);
        let max_samples =
            (self.config.max_utterance_ms as usize * SAMPLE_RATE as usize / 1_000).max(1);

        if silence_ms >= u64::from(self.config.trailing_silence_ms) {
            self.finish()
        } else if self.segment.len() >= max_samples {
            let overflow = self.segment.split_off(max_samples);
            log::debug!(
                "decoder: forcing endpoint after {} ms",
                samples_to_ms(self.segment.len())
            );
            let segment = self.finish();
            self.carry(overflow);
            segment
        } else {
            None
        }
    }

    /// Start the next segment with audio cut off by a forced endpoint.
    fn carry(&mut self, overflow: Vec<f32>) {
        if let Some((start, end)) = self.vad.voice_span(&overflow) {
            self.voiced_samples = end - start;
            self.trailing_silence = overflow.len() - end;
            self.segment = overflow;
        }
    }

    /// Drop any partial segment.
    pub fn reset(&mut self) {
        self.segment.clear();
        self.voiced_samples = 0;
        self.trailing_silence = 0;
    }

    fn finish(&mut self) -> Option<Vec<f32>> {
        let segment = std::mem::take(&mut self.segment);
        let voiced_ms = samples_to_ms(self.voiced_samples);
        self.reset();

        if voiced_ms < u64::from(self.config.min_speech_ms) {
            log::debug!("decoder: discarding {voiced_ms} ms burst as noise");
            return None;
        }
        Some(self.vad.trim_silence(&segment).to_vec())
    }
}

// ---------------------------------------------------------------------------
// StreamingDecoder
// ---------------------------------------------------------------------------

/// [`Decoder`] that endpoints with an [`Endpointer`] and transcribes each
/// segment with a batch [`SttEngine`].
pub struct StreamingDecoder<E> {
    engine: E,
    endpointer: Endpointer,
    ready: Option<Utterance>,
}

impl<E: SttEngine> StreamingDecoder<E> {
    pub fn new(engine: E, config: EndpointConfig) -> Self {
        Self {
            engine,
            endpointer: Endpointer::new(config),
            ready: None,
        }
    }
}

impl<E: SttEngine> Decoder for StreamingDecoder<E> {
    fn accept_frame(&mut self, frame: &AudioFrame) -> bool {
        let Some(segment) = self.endpointer.push(&frame.to_f32()) else {
            return false;
        };

        match self.engine.transcribe(&segment) {
            Ok(result) => {
                log::debug!(
                    "decoder: transcribed {} ms of audio in {} ms",
                    samples_to_ms(segment.len()),
                    result.duration_ms
                );
                let utterance = Utterance::normalize(&result.text);
                if utterance.is_empty() {
                    log::debug!("decoder: segment produced no words");
                    return false;
                }
                log::info!("decoder: heard \"{utterance}\"");
                self.ready = Some(utterance);
                true
            }
            Err(e) => {
                log::warn!("decoder: transcription failed: {e}");
                false
            }
        }
    }

    fn take_utterance(&mut self) -> Option<Utterance> {
        self.ready.take()
    }
}

// ---------------------------------------------------------------------------
// WhisperLoader
// ---------------------------------------------------------------------------

#[cfg(feature = "whisper")]
pub use whisper_loader::WhisperLoader;

#[cfg(feature = "whisper")]
mod whisper_loader {
    use std::path::PathBuf;

    use super::{Decoder, DecoderLoader, EndpointConfig, StreamingDecoder};
    use crate::stt::engine::{ModelLoadError, WhisperEngine};
    use crate::stt::transcribe::TranscribeParams;

    /// Loads a GGML Whisper model and wraps it in a [`StreamingDecoder`].
    #[derive(Debug, Clone)]
    pub struct WhisperLoader {
        pub model_path: PathBuf,
        pub params: TranscribeParams,
        pub endpoint: EndpointConfig,
    }

    impl DecoderLoader for WhisperLoader {
        fn load(&self) -> Result<Box<dyn Decoder>, ModelLoadError> {
            let engine = WhisperEngine::load(&self.model_path, self.params.clone())?;
            Ok(Box::new(StreamingDecoder::new(engine, self.endpoint.clone())))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
