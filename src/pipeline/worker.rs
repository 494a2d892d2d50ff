//! The recognition worker: audio frames in, remote actions out.
//!
//! ```text
//! run()
//!   ├─ Starting: drain stale queue ─▶ DecoderLoader::load ─▶ RemoteClient::connect
//!   │            ─▶ AudioSource::on_frame / on_error(queue) ─▶ AudioSource::open
//!   ├─ Running:  loop {
//!   │              stop flag set?            ─▶ leave
//!   │              queue.next(poll_interval)
//!   │                Frame    ─▶ Decoder::accept_frame ─▶ dispatch(utterance)
//!   │                Sentinel ─▶ leave
//!   │                Failed   ─▶ error
//!   │                Timeout  ─▶ loop
//!   │            }
//!   ├─ Stopping: close source, disconnect, drain queue ─▶ Stopped
//!   └─ any error: same release ─▶ Failed
//! ```
//!
//! Stopping is cooperative.  [`WorkerControl::request_stop`] sets an atomic
//! flag and enqueues a sentinel so a reader blocked on an empty queue wakes
//! at once; a frame already being decoded or dispatched is finished first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::audio::frame::{frame_queue, FrameReceiver, Next};
use crate::audio::{AudioError, AudioSource, FrameSender, StreamParams};
use crate::commands::{dispatch, CommandTable};
use crate::pipeline::state::{StateCell, WorkerState};
use crate::remote::{ActionError, ConnectionError, RemoteClient};
use crate::stt::{Decoder, DecoderLoader, ModelLoadError};

/// Shown to the user whenever the OBS session cannot be established.
pub const CONNECT_FAILED_MESSAGE: &str =
    "Could not connect to OBS. Change connection parameters then try again.";

// ---------------------------------------------------------------------------
// Events / errors
// ---------------------------------------------------------------------------

/// Notifications posted to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// A command ran; carries its acknowledgment label.
    Acknowledged(String),
    /// The worker failed; carries a message fit for display.
    Failed(String),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Action(#[from] ActionError),

    /// `run()` called while the worker was not `Idle` or `Stopped`.
    #[error("cannot run a worker in state {0}")]
    InvalidState(WorkerState),

    #[error("worker runtime error: {0}")]
    Runtime(String),
}

impl WorkerError {
    /// One-line message for the user, as opposed to the `Display` form meant
    /// for logs.
    pub fn user_message(&self) -> String {
        match self {
            WorkerError::Connection(_) | WorkerError::Action(ActionError::Connection(_)) => {
                CONNECT_FAILED_MESSAGE.to_string()
            }
            WorkerError::Action(e) => format!("OBS command failed: {e}"),
            WorkerError::Audio(e) => format!("Microphone unavailable: {e}"),
            WorkerError::ModelLoad(e) => format!("Speech model could not be loaded: {e}"),
            WorkerError::InvalidState(_) | WorkerError::Runtime(_) => {
                format!("Voice control could not start: {self}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// WorkerControl
// ---------------------------------------------------------------------------

/// Thread-safe handle for stopping and observing a worker.
#[derive(Debug, Clone)]
pub struct WorkerControl {
    stop: Arc<AtomicBool>,
    state: Arc<StateCell>,
    queue: FrameSender,
}

impl WorkerControl {
    /// Ask the worker to stop after the current frame.  Never blocks.
    pub fn request_stop(&self) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            log::info!("worker: stop requested");
        }
        self.queue.send_sentinel();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }
}

// ---------------------------------------------------------------------------
// WorkerOptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Longest single wait on the frame queue before re-checking the stop
    /// flag.
    pub poll_interval: Duration,
    /// Frames the queue holds before the capture side starts dropping.
    pub queue_capacity: usize,
    pub stream: StreamParams,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            queue_capacity: 32,
            stream: StreamParams::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// RecognitionWorker
// ---------------------------------------------------------------------------

pub struct RecognitionWorker {
    source: Box<dyn AudioSource>,
    loader: Box<dyn DecoderLoader>,
    client: Box<dyn RemoteClient>,
    table: CommandTable,
    options: WorkerOptions,
    control: WorkerControl,
    frames: FrameReceiver,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<WorkerEvent>>,
}

impl RecognitionWorker {
    pub fn new(
        source: Box<dyn AudioSource>,
        loader: Box<dyn DecoderLoader>,
        client: Box<dyn RemoteClient>,
        table: CommandTable,
        options: WorkerOptions,
    ) -> Self {
        let (queue, frames) = frame_queue(options.queue_capacity);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let control = WorkerControl {
            stop: Arc::new(AtomicBool::new(false)),
            state: Arc::new(StateCell::new(WorkerState::Idle)),
            queue,
        };

        Self {
            source,
            loader,
            client,
            table,
            options,
            control,
            frames,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    pub fn control(&self) -> WorkerControl {
        self.control.clone()
    }

    pub fn state(&self) -> WorkerState {
        self.control.state()
    }

    /// The receiving end of the event channel.  `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<WorkerEvent>> {
        self.events_rx.take()
    }

    pub(crate) fn event_sender(&self) -> mpsc::UnboundedSender<WorkerEvent> {
        self.events_tx.clone()
    }

    /// Run until stopped or failed.
    ///
    /// Returns `Ok(())` after a clean stop (state `Stopped`; the worker may be
    /// run again) and the error otherwise (state `Failed`).  Resources are
    /// released before returning in both cases.
    pub async fn run(&mut self) -> Result<(), WorkerError> {
        let current = self.state();
        if !current.can_start() {
            log::error!("worker: run() rejected in state {current}");
            return Err(WorkerError::InvalidState(current));
        }

        self.set_state(WorkerState::Starting);
        match self.start_and_consume().await {
            Ok(()) => {
                self.set_state(WorkerState::Stopping);
                self.release().await;
                self.control.stop.store(false, Ordering::SeqCst);
                self.set_state(WorkerState::Stopped);
                Ok(())
            }
            Err(e) => {
                log::error!("worker: {e}");
                self.release().await;
                self.set_state(WorkerState::Failed);
                Err(e)
            }
        }
    }

    async fn start_and_consume(&mut self) -> Result<(), WorkerError> {
        let stale = self.frames.drain();
        if stale > 0 {
            log::debug!("worker: discarded {stale} stale queue items");
        }

        let mut decoder = self.loader.load()?;
        log::info!("worker: decoder ready");
        if self.control.stop_requested() {
            log::info!("worker: stop requested during startup");
            return Ok(());
        }

        self.client.connect().await?;
        if self.control.stop_requested() {
            log::info!("worker: stop requested during startup");
            return Ok(());
        }

        self.source
            .on_frame(self.control.queue.clone().into_callback());
        self.source
            .on_error(self.control.queue.clone().into_error_callback());
        self.source.open(&self.options.stream)?;

        self.set_state(WorkerState::Running);
        log::info!("worker: listening");

        self.consume(decoder.as_mut()).await
    }

    async fn consume(&mut self, decoder: &mut dyn Decoder) -> Result<(), WorkerError> {
        while !self.control.stop_requested() {
            match self.frames.next(self.options.poll_interval).await {
                Next::Frame(frame) => {
                    if !decoder.accept_frame(&frame) {
                        continue;
                    }
                    let Some(utterance) = decoder.take_utterance() else {
                        continue;
                    };

                    let events = &self.events_tx;
                    dispatch(&self.table, self.client.as_mut(), utterance.as_str(), |label| {
                        let _ = events.send(WorkerEvent::Acknowledged(label.to_string()));
                    })
                    .await?;
                }
                Next::Failed(e) => return Err(e.into()),
                Next::Sentinel | Next::Closed => break,
                Next::Timeout => {}
            }
        }
        Ok(())
    }

    /// Best-effort release of everything `run()` may have acquired.
    async fn release(&mut self) {
        self.source.close();
        self.client.disconnect().await;

        let drained = self.frames.drain();
        let dropped = self.frames.dropped();
        if dropped > 0 {
            log::warn!("worker: {dropped} frames dropped on a full queue since start");
        }
        log::info!("worker: released device and connection ({drained} queued items discarded)");
    }

    fn set_state(&self, next: WorkerState) {
        log::debug!("worker: {} -> {next}", self.control.state());
        self.control.state.set(next);
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::fakes::*;
    use super::*;
    use crate::remote::{RecordingClient, RemoteAction};

    fn drain(rx: &mut mpsc::UnboundedReceiver<WorkerEvent>) -> Vec<WorkerEvent> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    #[tokio::test]
    async fn stop_recording_phrase_dispatches_once_and_keeps_running() {
        let source = SpySource::with_frames(vec![marked(1)]);
        let client = RecordingClient::new();
        let decoder = ScriptedDecoder::new(&[(1, "Freya, stop recording.")]);
        let mut worker = worker(source.clone(), Ok(decoder), client.clone());
        let mut events = worker.take_events().unwrap();
        let control = worker.control();

        let (result, ()) = tokio::join!(worker.run(), async {
            assert!(wait_until(|| client.count("stop_recording") == 1).await);
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert_eq!(control.state(), WorkerState::Running);
            control.request_stop();
        });

        result.unwrap();
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert_eq!(client.calls(), vec!["connect", "stop_recording", "disconnect"]);
        assert_eq!(
            drain(&mut events),
            vec![WorkerEvent::Acknowledged("Stopping recording".into())]
        );
        assert_eq!(source.opens(), 1);
        assert_eq!(source.releases(), 1);
    }

    #[tokio::test]
    async fn utterances_dispatch_in_capture_order() {
        let source = SpySource::with_frames(vec![marked(1), marked(9), marked(2), marked(3)]);
        let client = RecordingClient::new();
        let decoder = ScriptedDecoder::new(&[
            (1, "freya start recording"),
            (2, "freya clip it"),
            (3, "freya stop the replay"),
        ]);
        let mut worker = worker(source, Ok(decoder.clone()), client.clone());
        let control = worker.control();

        let (result, ()) = tokio::join!(worker.run(), async {
            assert!(wait_until(|| client.actions().len() == 3).await);
            control.request_stop();
        });

        result.unwrap();
        assert_eq!(decoder.seen(), vec![1, 9, 2, 3]);
        assert_eq!(
            client.actions(),
            vec!["start_recording", "save_buffer", "stop_buffer"]
        );
    }

    #[tokio::test]
    async fn decoder_failure_never_opens_the_device() {
        let source = SpySource::new();
        let client = RecordingClient::new();
        let mut worker = worker(
            source.clone(),
            Err(ModelLoadError::NotFound("ggml-base.en.bin".into())),
            client.clone(),
        );

        let err = worker.run().await.unwrap_err();
        assert!(matches!(err, WorkerError::ModelLoad(_)));
        assert_eq!(worker.state(), WorkerState::Failed);
        assert_eq!(source.opens(), 0);
        assert_eq!(client.count("connect"), 0);
    }

    #[tokio::test]
    async fn connect_failure_fails_before_opening() {
        let source = SpySource::new();
        let client = RecordingClient::new().refusing_connect();
        let mut worker = worker(source.clone(), Ok(ScriptedDecoder::default()), client);

        let err = worker.run().await.unwrap_err();
        assert!(matches!(err, WorkerError::Connection(_)));
        assert_eq!(err.user_message(), CONNECT_FAILED_MESSAGE);
        assert_eq!(source.opens(), 0);
        assert_eq!(worker.state(), WorkerState::Failed);
    }

    #[tokio::test]
    async fn device_failure_tears_down_connection() {
        let source =
            SpySource::failing(AudioError::PermissionDenied("microphone blocked".into()));
        let client = RecordingClient::new();
        let mut worker = worker(source.clone(), Ok(ScriptedDecoder::default()), client.clone());

        let err = worker.run().await.unwrap_err();
        assert!(matches!(err, WorkerError::Audio(AudioError::PermissionDenied(_))));
        assert_eq!(client.calls(), vec!["connect", "disconnect"]);
        assert_eq!(source.releases(), 0);
        assert_eq!(worker.state(), WorkerState::Failed);
    }

    #[tokio::test]
    async fn device_lost_while_listening_fails_the_worker() {
        let source = SpySource::new();
        let client = RecordingClient::new();
        let mut worker = worker_with(
            source.clone(),
            Ok(ScriptedDecoder::default()),
            client.clone(),
            options(Duration::from_secs(30)),
        );
        let control = worker.control();

        let finished = tokio::time::timeout(Duration::from_secs(2), async {
            tokio::join!(worker.run(), async {
                assert!(wait_until(|| control.state() == WorkerState::Running).await);
                source.break_stream(AudioError::DeviceUnavailable("device unplugged".into()));
            })
        })
        .await;

        let (result, ()) = finished.expect("stream failure did not wake the worker");
        let err = result.unwrap_err();
        assert!(matches!(
            &err,
            WorkerError::Audio(AudioError::DeviceUnavailable(msg)) if msg == "device unplugged"
        ));
        assert!(err.user_message().starts_with("Microphone unavailable"));
        assert_eq!(worker.state(), WorkerState::Failed);
        assert_eq!(source.releases(), 1);
        assert_eq!(client.count("disconnect"), 1);
    }

    #[tokio::test]
    async fn failing_action_stops_further_dispatch() {
        let source = SpySource::with_frames(vec![marked(1), marked(2)]);
        let client = RecordingClient::new().failing_on(RemoteAction::StartRecording);
        let decoder = ScriptedDecoder::new(&[(1, "freya start everything"), (2, "freya clip it")]);
        let mut worker = worker(source.clone(), Ok(decoder), client.clone());
        let mut events = worker.take_events().unwrap();

        let err = worker.run().await.unwrap_err();

        assert!(matches!(err, WorkerError::Action(ActionError::Rejected { .. })));
        assert_eq!(worker.state(), WorkerState::Failed);
        assert_eq!(client.actions(), vec!["start_recording"]);
        assert_eq!(client.count("disconnect"), 1);
        assert_eq!(source.releases(), 1);
        // The worker itself reports acks only; the host posts the failure.
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn stop_wakes_a_reader_blocked_on_an_empty_queue() {
        let source = SpySource::new();
        let mut worker = worker_with(
            source,
            Ok(ScriptedDecoder::default()),
            RecordingClient::new(),
            options(Duration::from_secs(30)),
        );
        let control = worker.control();

        let stopped = tokio::time::timeout(Duration::from_secs(2), async {
            tokio::join!(worker.run(), async {
                assert!(wait_until(|| control.state() == WorkerState::Running).await);
                tokio::time::sleep(Duration::from_millis(20)).await;
                control.request_stop();
            })
        })
        .await;

        let (result, ()) = stopped.expect("worker did not leave the blocking read");
        result.unwrap();
        assert_eq!(worker.state(), WorkerState::Stopped);
    }

    #[tokio::test]
    async fn stop_before_run_is_honoured_before_opening() {
        let source = SpySource::new();
        let client = RecordingClient::new();
        let mut worker = worker(source.clone(), Ok(ScriptedDecoder::default()), client.clone());

        worker.control().request_stop();
        worker.run().await.unwrap();

        assert_eq!(worker.state(), WorkerState::Stopped);
        assert_eq!(source.opens(), 0);
        assert_eq!(client.count("connect"), 0);
        assert_eq!(client.count("disconnect"), 1);
    }

    #[tokio::test]
    async fn stopped_worker_can_run_again() {
        let source = SpySource::new();
        let client = RecordingClient::new();
        let decoder = ScriptedDecoder::new(&[(4, "freya clip that")]);
        let mut worker = worker(source.clone(), Ok(decoder), client.clone());
        let control = worker.control();

        for round in 1..=2 {
            let (result, ()) = tokio::join!(worker.run(), async {
                assert!(wait_until(|| control.state() == WorkerState::Running).await);
                source.push(marked(4));
                assert!(wait_until(|| client.count("save_buffer") == round).await);
                control.request_stop();
            });
            result.unwrap();
            assert_eq!(worker.state(), WorkerState::Stopped);
        }

        assert_eq!(source.opens(), 2);
        assert_eq!(source.releases(), 2);
    }

    #[tokio::test]
    async fn failed_worker_rejects_run() {
        let mut worker = worker(
            SpySource::new(),
            Err(ModelLoadError::Init("corrupt".into())),
            RecordingClient::new(),
        );
        assert!(worker.run().await.is_err());

        let err = worker.run().await.unwrap_err();
        assert!(matches!(err, WorkerError::InvalidState(WorkerState::Failed)));
        assert_eq!(worker.state(), WorkerState::Failed);
    }

    #[test]
    fn user_messages() {
        let lost = WorkerError::Action(ActionError::Connection(ConnectionError::AuthenticationFailed));
        assert_eq!(lost.user_message(), CONNECT_FAILED_MESSAGE);

        let mic = WorkerError::Audio(AudioError::DeviceUnavailable("no input".into()));
        assert!(mic.user_message().starts_with("Microphone unavailable"));
    }
}
