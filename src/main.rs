//! Application entry point: OBS voice control.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`], generating `settings.toml` on first run.  An
//!    invalid configuration aborts startup.
//! 3. Build the audio source, decoder loader, OBS client and command table.
//! 4. Start the [`WorkerHost`] on its own thread.
//! 5. Report events until the worker fails or Ctrl-C is pressed.
//! 6. Request a stop and join the worker with the configured timeout.

use std::process::ExitCode;

use obs_voice_control::{
    audio::CpalSource,
    commands::CommandTable,
    config::{AppConfig, AppPaths},
    pipeline::{JoinOutcome, RecognitionWorker, WorkerEvent, WorkerHost},
    remote::ObsClient,
    stt::DecoderLoader,
};

// ---------------------------------------------------------------------------
// Decoder loader
// ---------------------------------------------------------------------------

#[cfg(feature = "whisper")]
fn decoder_loader(
    config: &AppConfig,
    paths: &AppPaths,
    table: &CommandTable,
) -> Box<dyn DecoderLoader> {
    let model_path = config.model_path(paths);
    log::info!("Whisper model: {}", model_path.display());
    let mut params = config.transcribe_params();
    params.initial_prompt = Some(table.vocabulary_prompt());
    Box::new(obs_voice_control::stt::WhisperLoader {
        model_path,
        params,
        endpoint: config.endpoint_config(),
    })
}

#[cfg(not(feature = "whisper"))]
fn decoder_loader(
    _config: &AppConfig,
    _paths: &AppPaths,
    _table: &CommandTable,
) -> Box<dyn DecoderLoader> {
    use obs_voice_control::stt::{Decoder, ModelLoadError};

    Box::new(|| -> Result<Box<dyn Decoder>, ModelLoadError> {
        Err(ModelLoadError::Unavailable(
            "built without the `whisper` feature".into(),
        ))
    })
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Print events until the worker fails, its channel closes, or Ctrl-C.
/// Returns `true` when the worker reported a failure.
async fn report_events(host: &mut WorkerHost) -> bool {
    loop {
        tokio::select! {
            event = host.next_event() => match event {
                Some(WorkerEvent::Acknowledged(label)) => {
                    log::info!("ack: {label}");
                    println!("{label}");
                }
                Some(WorkerEvent::Failed(message)) => {
                    eprintln!("error: {message}");
                    return true;
                }
                None => return false,
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    log::warn!("Ctrl-C handler unavailable: {e}");
                }
                log::info!("interrupt received, stopping");
                return false;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("OBS voice control starting up");

    let paths = AppPaths::new();
    let config = match AppConfig::load_or_init(&paths.settings_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: could not load configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.validate() {
        eprintln!(
            "error: invalid configuration in {}: {e}",
            paths.settings_file.display()
        );
        return ExitCode::FAILURE;
    }

    let remote = config.remote_config();
    log::info!("OBS endpoint: {}", remote.url());

    let table = CommandTable::standard(&config.commands.wake_word);
    let worker = RecognitionWorker::new(
        Box::new(CpalSource::new()),
        decoder_loader(&config, &paths, &table),
        Box::new(ObsClient::new(remote)),
        table,
        config.worker_options(),
    );

    let mut host = match WorkerHost::start(worker) {
        Ok(host) => host,
        Err(e) => {
            eprintln!("error: could not start the recognition worker: {e}");
            return ExitCode::FAILURE;
        }
    };

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: could not create the async runtime: {e}");
            host.request_stop();
            host.join(config.join_timeout());
            return ExitCode::FAILURE;
        }
    };

    println!(
        "Listening. Say \"{} start recording\", \"{} clip it\", ... (Ctrl-C to quit)",
        config.commands.wake_word, config.commands.wake_word
    );
    let failed = rt.block_on(report_events(&mut host));

    host.request_stop();
    match host.join(config.join_timeout()) {
        JoinOutcome::Finished if !failed => {
            log::info!("stopped");
            ExitCode::SUCCESS
        }
        JoinOutcome::Finished => ExitCode::FAILURE,
        JoinOutcome::TimedOut => {
            eprintln!("error: the recognition worker did not stop in time");
            ExitCode::FAILURE
        }
    }
}
