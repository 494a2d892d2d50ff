//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`.
//! Every section is `#[serde(default)]`, so a file that only sets
//! `[remote] password = "..."` is complete.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AppPaths;
use crate::audio::{StreamParams, DEFAULT_FRAME_SIZE, SAMPLE_RATE};
use crate::pipeline::WorkerOptions;
use crate::remote::RemoteConfig;
use crate::stt::engine::MAX_AUDIO_SAMPLES;
use crate::stt::{EndpointConfig, TranscribeParams};

/// Longest utterance the recognizer accepts in one pass.
pub const MAX_UTTERANCE_SECS: u32 = (MAX_AUDIO_SAMPLES / SAMPLE_RATE as usize) as u32;

// ---------------------------------------------------------------------------
// RemoteSettings
// ---------------------------------------------------------------------------

/// OBS WebSocket connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub host: String,
    pub port: u16,
    /// The password shown in OBS under Tools → WebSocket Server Settings.
    pub password: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 4455,
            password: "password".into(),
            connect_timeout_secs: 5,
            request_timeout_secs: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for microphone capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Rate of the frames handed to the decoder; must be 16 000.
    pub sample_rate: u32,
    /// Samples per frame (8 000 = 0.5 s).
    pub frame_size: usize,
    /// Substring of the input device name; `None` means the system default.
    pub device: Option<String>,
    /// Frames buffered between capture and recognition.
    pub queue_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            frame_size: DEFAULT_FRAME_SIZE,
            device: None,
            queue_capacity: 32,
        }
    }
}

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Settings for the Whisper STT engine and the endpointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// GGML model name (`"base.en"` → `ggml-base.en.bin` in the models
    /// directory) or an explicit path to a `.bin` file.
    pub model: String,
    /// ISO-639-1 code, or `"auto"`.
    pub language: String,
    /// RMS level above which audio counts as speech.
    pub vad_threshold: f32,
    /// Silence that ends an utterance.
    pub endpoint_silence_ms: u32,
    /// Longest utterance before an endpoint is forced.
    pub max_utterance_secs: u32,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: "base.en".into(),
            language: "en".into(),
            vad_threshold: 0.01,
            endpoint_silence_ms: 700,
            max_utterance_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkerConfig / CommandsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Longest wait on the frame queue before the stop flag is re-checked.
    pub poll_interval_ms: u64,
    /// How long shutdown waits for the worker thread.
    pub join_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            join_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Word every command phrase starts with.
    pub wake_word: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            wake_word: "freya".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A loaded configuration that cannot work.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("remote.host is empty")]
    EmptyHost,

    #[error("remote.port must be non-zero")]
    ZeroPort,

    #[error("audio.sample_rate must be {SAMPLE_RATE}, got {0}")]
    SampleRate(u32),

    #[error("audio.{0} must be greater than zero")]
    Zero(&'static str),

    #[error("stt.vad_threshold must be within [0, 1], got {0}")]
    VadThreshold(f32),

    #[error("stt.max_utterance_secs must be within 1..={MAX_UTTERANCE_SECS}, got {0}")]
    MaxUtterance(u32),
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub remote: RemoteSettings,
    pub audio: AudioConfig,
    pub stt: SttConfig,
    pub worker: WorkerConfig,
    pub commands: CommandsConfig,
}

impl AppConfig {
    /// Load `path`; `Default` when the file is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Load `path`, generating it on first run.
    ///
    /// - missing file: defaults are written and returned;
    /// - unparsable file: the parse error is returned and the file is left
    ///   untouched;
    /// - parsed but invalid: a warning is logged and the values are returned
    ///   as they are, so the caller decides whether to continue.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("config: {} does not exist, generating defaults", path.display());
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let config = Self::load_from(path)?;

        match config.validate() {
            Ok(()) => log::info!("config: loaded {}", path.display()),
            Err(e) => log::warn!("config: existing config invalid ({e}); most likely will not connect to OBS"),
        }
        Ok(config)
    }

    /// Save to an explicit path, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// First problem found, if any.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.remote.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.audio.sample_rate != SAMPLE_RATE {
            return Err(ConfigError::SampleRate(self.audio.sample_rate));
        }
        if self.audio.frame_size == 0 {
            return Err(ConfigError::Zero("frame_size"));
        }
        if self.audio.queue_capacity == 0 {
            return Err(ConfigError::Zero("queue_capacity"));
        }
        if !(0.0..=1.0).contains(&self.stt.vad_threshold) {
            return Err(ConfigError::VadThreshold(self.stt.vad_threshold));
        }
        if !(1..=MAX_UTTERANCE_SECS).contains(&self.stt.max_utterance_secs) {
            return Err(ConfigError::MaxUtterance(self.stt.max_utterance_secs));
        }
        Ok(())
    }

    // ── Conversions into component settings ──────────────────────────────

    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig {
            host: self.remote.host.trim().to_string(),
            port: self.remote.port,
            password: self.remote.password.clone(),
            connect_timeout: Duration::from_secs(self.remote.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.remote.request_timeout_secs),
        }
    }

    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            poll_interval: Duration::from_millis(self.worker.poll_interval_ms.max(1)),
            queue_capacity: self.audio.queue_capacity,
            stream: StreamParams {
                sample_rate: self.audio.sample_rate,
                frame_size: self.audio.frame_size,
                device_hint: self.audio.device.clone().filter(|d| !d.trim().is_empty()),
            },
        }
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.worker.join_timeout_ms)
    }

    pub fn endpoint_config(&self) -> EndpointConfig {
        EndpointConfig {
            vad_threshold: self.stt.vad_threshold,
            trailing_silence_ms: self.stt.endpoint_silence_ms,
            max_utterance_ms: self.stt.max_utterance_secs.saturating_mul(1_000),
            ..EndpointConfig::default()
        }
    }

    pub fn transcribe_params(&self) -> TranscribeParams {
        TranscribeParams {
            language: self.stt.language.clone(),
            ..TranscribeParams::default()
        }
    }

    /// Resolve `stt.model` to a file: explicit `.bin` paths are used as-is,
    /// bare names map to `ggml-{name}.bin` under the models directory.
    pub fn model_path(&self, paths: &AppPaths) -> PathBuf {
        let model = Path::new(&self.stt.model);
        if model.extension().is_some_and(|ext| ext == "bin") {
            model.to_path_buf()
        } else {
            paths.models_dir.join(format!("ggml-{}.bin", self.stt.model))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
