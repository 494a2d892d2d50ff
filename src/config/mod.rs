//! Configuration: `AppConfig` with one section per subsystem, `AppPaths`
//! for platform directories, and TOML persistence with first-run generation
//! via [`AppConfig::load_or_init`].

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AudioConfig, CommandsConfig, ConfigError, RemoteSettings, SttConfig, WorkerConfig,
};
