//! Cross-platform application paths using the `dirs` crate.
//!
//! Config dir (`settings.toml`):
//!   Windows: %APPDATA%\obs-voice-control\
//!   macOS:   ~/Library/Application Support/obs-voice-control/
//!   Linux:   ~/.config/obs-voice-control/
//!
//! Data dir (Whisper models):
//!   Windows: %LOCALAPPDATA%\obs-voice-control\models\
//!   macOS:   ~/Library/Application Support/obs-voice-control/models/
//!   Linux:   ~/.local/share/obs-voice-control/models/

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory searched for `ggml-*.bin` model files.
    pub models_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "obs-voice-control";

    /// Falls back to the current directory when the platform has no
    /// standard location.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            models_dir: data_dir.join("models"),
            config_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_under_app_dirs() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.ends_with("obs-voice-control"));
        assert!(paths.models_dir.ends_with("obs-voice-control/models"));
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
        assert!(paths.settings_file.starts_with(&paths.config_dir));
    }
}
