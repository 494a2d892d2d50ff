//! Runs a [`RecognitionWorker`] on its own thread and bridges it back to the
//! caller.
//!
//! ```text
//! caller thread                       "recognition-worker" thread
//! ─────────────                       ───────────────────────────
//! WorkerHost::start ──spawn──────────▶ current-thread runtime
//!                                       block_on(worker.run())
//! request_stop ──flag + sentinel─────▶     │
//!                                          ▼
//! try_event / next_event ◀──events──── completion observer
//!                                       (Failed event, runtime shutdown)
//! join(timeout) ◀──done──────────────────── │
//! ```

use std::io;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc;

use super::state::WorkerState;
use super::worker::{RecognitionWorker, WorkerControl, WorkerError, WorkerEvent};

/// Result of [`WorkerHost::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The worker thread exited and was joined.
    Finished,
    /// The worker is still running after the timeout.
    TimedOut,
}

pub struct WorkerHost {
    control: WorkerControl,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    done: std_mpsc::Receiver<()>,
    handle: Option<JoinHandle<()>>,
    finished: bool,
}

impl WorkerHost {
    /// Spawn `worker` on a dedicated thread and start running it.
    ///
    /// # Errors
    ///
    /// Fails if the thread cannot be spawned or the worker's event receiver
    /// was already taken.
    pub fn start(mut worker: RecognitionWorker) -> io::Result<Self> {
        let control = worker.control();
        let events = worker.take_events().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "worker events already taken")
        })?;
        let events_tx = worker.event_sender();
        let (done_tx, done_rx) = std_mpsc::channel();

        let handle = std::thread::Builder::new()
            .name("recognition-worker".into())
            .spawn(move || {
                let outcome = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => {
                        let outcome = rt.block_on(worker.run());
                        rt.shutdown_timeout(Duration::from_millis(100));
                        outcome
                    }
                    Err(e) => Err(WorkerError::Runtime(e.to_string())),
                };

                // Completion observer: runs exactly once per thread.
                match outcome {
                    Ok(()) => log::info!("host: worker finished cleanly"),
                    Err(e) => {
                        log::error!("host: worker failed: {e}");
                        let _ = events_tx.send(WorkerEvent::Failed(e.user_message()));
                    }
                }
                drop(worker);
                let _ = done_tx.send(());
            })?;

        log::info!("host: worker thread started");
        Ok(Self {
            control,
            events,
            done: done_rx,
            handle: Some(handle),
            finished: false,
        })
    }

    /// Signal the worker to stop.  Callable from any thread; never blocks.
    pub fn request_stop(&self) {
        self.control.request_stop();
    }

    pub fn state(&self) -> WorkerState {
        self.control.state()
    }

    pub fn control(&self) -> WorkerControl {
        self.control.clone()
    }

    /// Next pending event, without waiting.
    pub fn try_event(&mut self) -> Option<WorkerEvent> {
        self.events.try_recv().ok()
    }

    /// Wait for the next event.  `None` once the worker thread has exited
    /// and every event was delivered.
    pub async fn next_event(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }

    /// Wait up to `timeout` for the worker thread to exit.
    ///
    /// A timeout is a failed graceful shutdown: it is logged and reported as
    /// [`JoinOutcome::TimedOut`], and the host keeps the thread handle so a
    /// later `join` can still succeed.
    pub fn join(&mut self, timeout: Duration) -> JoinOutcome {
        if !self.finished {
            match self.done.recv_timeout(timeout) {
                Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => self.finished = true,
                Err(std_mpsc::RecvTimeoutError::Timeout) => {
                    log::error!(
                        "host: worker still {} after {timeout:?}; graceful shutdown failed",
                        self.state()
                    );
                    return JoinOutcome::TimedOut;
                }
            }
        }

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("host: worker thread panicked");
            }
        }
        JoinOutcome::Finished
    }
}

impl Drop for WorkerHost {
    fn drop(&mut self) {
        if self.handle.as_ref().is_some_and(|h| !h.is_finished()) {
            self.control.request_stop();
            log::warn!("host: dropped while the worker is running; its thread is abandoned");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use tokio::sync::Notify;

    use super::*;
    use crate::audio::AudioError;
    use crate::pipeline::worker::fakes::*;
    use crate::pipeline::worker::CONNECT_FAILED_MESSAGE;
    use crate::remote::{RecordingClient, RemoteAction};

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    fn collect(host: &mut WorkerHost) -> Vec<WorkerEvent> {
        std::iter::from_fn(|| host.try_event()).collect()
    }

    #[test]
    fn ack_events_reach_the_host() {
        let source = SpySource::with_frames(vec![marked(1)]);
        let client = RecordingClient::new();
        let decoder = ScriptedDecoder::new(&[(1, "freya clip it")]);
        let mut host = WorkerHost::start(worker(source.clone(), Ok(decoder), client.clone())).unwrap();

        let mut events = Vec::new();
        assert!(wait_for(|| {
            events.extend(collect(&mut host));
            !events.is_empty()
        }));
        assert_eq!(events, vec![WorkerEvent::Acknowledged("Clipping".into())]);
        assert_eq!(host.state(), WorkerState::Running);

        host.request_stop();
        assert_eq!(host.join(Duration::from_secs(2)), JoinOutcome::Finished);
        assert_eq!(host.state(), WorkerState::Stopped);
        assert_eq!(source.releases(), 1);
        assert_eq!(client.calls().last().map(String::as_str), Some("disconnect"));
        assert!(collect(&mut host).is_empty());
    }

    #[test]
    fn connection_failure_posts_exactly_one_error() {
        let source = SpySource::new();
        let client = RecordingClient::new().refusing_connect();
        let mut host =
            WorkerHost::start(worker(source.clone(), Ok(ScriptedDecoder::default()), client))
                .unwrap();

        assert_eq!(host.join(Duration::from_secs(2)), JoinOutcome::Finished);
        assert_eq!(host.state(), WorkerState::Failed);
        assert_eq!(
            collect(&mut host),
            vec![WorkerEvent::Failed(CONNECT_FAILED_MESSAGE.into())]
        );
        assert_eq!(source.opens(), 0);
    }

    #[test]
    fn action_failure_posts_one_error_and_stops_dispatch() {
        let source = SpySource::with_frames(vec![marked(1), marked(2)]);
        let client = RecordingClient::new().failing_on(RemoteAction::SaveBuffer);
        let decoder = ScriptedDecoder::new(&[(1, "freya clip that"), (2, "freya start recording")]);
        let mut host = WorkerHost::start(worker(source, Ok(decoder), client.clone())).unwrap();

        assert_eq!(host.join(Duration::from_secs(2)), JoinOutcome::Finished);
        let events = collect(&mut host);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], WorkerEvent::Failed(m) if m.starts_with("OBS command failed")));
        assert_eq!(client.actions(), vec!["save_buffer"]);
    }

    #[test]
    fn lost_microphone_posts_one_error() {
        let source = SpySource::new();
        let mut host = WorkerHost::start(worker_with(
            source.clone(),
            Ok(ScriptedDecoder::default()),
            RecordingClient::new(),
            options(Duration::from_secs(30)),
        ))
        .unwrap();

        assert!(wait_for(|| host.state() == WorkerState::Running));
        source.break_stream(AudioError::DeviceUnavailable("device unplugged".into()));

        assert_eq!(host.join(Duration::from_secs(2)), JoinOutcome::Finished);
        assert_eq!(host.state(), WorkerState::Failed);
        assert_eq!(
            collect(&mut host),
            vec![WorkerEvent::Failed(
                "Microphone unavailable: audio device unavailable: device unplugged".into()
            )]
        );
        assert_eq!(source.releases(), 1);
    }

    #[test]
    fn zero_timeout_join_reports_timeout_without_hanging() {
        let gate = Arc::new(Notify::new());
        let client = RecordingClient::new().gated(Arc::clone(&gate));
        let source = SpySource::new();
        let mut host =
            WorkerHost::start(worker(source.clone(), Ok(ScriptedDecoder::default()), client))
                .unwrap();

        host.request_stop();
        assert_eq!(host.join(Duration::ZERO), JoinOutcome::TimedOut);

        gate.notify_one();
        assert_eq!(host.join(Duration::from_secs(2)), JoinOutcome::Finished);
        assert_eq!(host.state(), WorkerState::Stopped);
        assert_eq!(source.opens(), 0);

        // Joining a finished host again is harmless.
        assert_eq!(host.join(Duration::ZERO), JoinOutcome::Finished);
    }

    #[test]
    fn stop_while_idle_exits_promptly() {
        let mut host = WorkerHost::start(worker_with(
            SpySource::new(),
            Ok(ScriptedDecoder::default()),
            RecordingClient::new(),
            options(Duration::from_secs(30)),
        ))
        .unwrap();

        assert!(wait_for(|| host.state() == WorkerState::Running));
        host.request_stop();
        assert_eq!(host.join(Duration::from_secs(1)), JoinOutcome::Finished);
    }

    #[test]
    fn stop_during_slow_decode_finishes_current_frame() {
        let source = SpySource::with_frames(vec![marked(1), marked(2)]);
        let client = RecordingClient::new();
        let decoder = ScriptedDecoder::new(&[(1, "freya start recording"), (2, "freya clip it")])
            .slow(Duration::from_millis(150));
        let mut host =
            WorkerHost::start(worker(source, Ok(decoder.clone()), client.clone())).unwrap();

        assert!(wait_for(|| !decoder.seen().is_empty()));
        host.request_stop();
        assert_eq!(host.join(Duration::from_secs(2)), JoinOutcome::Finished);

        // The frame in flight was dispatched; the queued one was not decoded.
        assert_eq!(decoder.seen(), vec![1]);
        assert_eq!(client.actions(), vec!["start_recording"]);
        assert_eq!(host.state(), WorkerState::Stopped);
    }

    #[test]
    fn dropping_a_running_host_requests_stop() {
        let gate = Arc::new(Notify::new());
        let client = RecordingClient::new().gated(Arc::clone(&gate));
        let host = WorkerHost::start(worker(
            SpySource::new(),
            Ok(ScriptedDecoder::default()),
            client.clone(),
        ))
        .unwrap();
        let control = host.control();

        drop(host);
        assert!(control.stop_requested());

        gate.notify_one();
        assert!(wait_for(|| control.state() == WorkerState::Stopped));
    }
}
