//! PCM frames and the bounded queue between the capture thread and the
//! recognition worker.
//!
//! The capture callback is the producer and must never block, so
//! [`FrameSender::push`] is a single `try_send`.  When the queue is full the
//! **incoming** frame is dropped and counted; audio is a lossy real-time feed
//! and the frames already queued are older speech the decoder still needs.
//!
//! The consumer side ([`FrameReceiver`]) waits with a timeout so the worker can
//! re-check its stop flag even when no audio arrives.  A [`QueueItem::Sentinel`]
//! wakes a blocked read immediately during shutdown.
//!
//! A stream error after `open` (device unplugged, access revoked) is reported
//! through [`FrameSender::report_error`].  The error is parked in a slot shared
//! with the receiver, so it survives a full queue, and the next read returns
//! [`Next::Failed`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

use super::source::AudioError;

/// Sample rate of every [`AudioFrame`] handed to the decoder.
pub const SAMPLE_RATE: u32 = 16_000;

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// An immutable block of mono, 16 kHz, signed 16-bit PCM samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Box<[i16]>,
}

impl AudioFrame {
    pub fn new(samples: impl Into<Box<[i16]>>) -> Self {
        Self {
            samples: samples.into(),
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples scaled to `[-1.0, 1.0)`.
    pub fn to_f32(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.samples.len());
        crate::audio::i16_to_f32(&self.samples, &mut out);
        out
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// A value travelling through the frame queue.
#[derive(Debug)]
pub(crate) enum QueueItem {
    Frame(AudioFrame),
    /// No more frames will be consumed; unblocks a waiting reader.
    Sentinel,
    /// A stream error was parked in the fault slot; unblocks a waiting reader.
    Fault,
}

/// Result of one bounded wait on the frame queue.
#[derive(Debug)]
pub(crate) enum Next {
    Frame(AudioFrame),
    Sentinel,
    /// The capture stream broke after it was opened.
    Failed(AudioError),
    Timeout,
    Closed,
}

/// Producer callback registered with an [`AudioSource`](crate::audio::AudioSource).
///
/// Invoked on the capture thread; implementations must return quickly and
/// must not block.
pub type FrameCallback = Box<dyn FnMut(AudioFrame) + Send + 'static>;

/// Error callback registered with an [`AudioSource`](crate::audio::AudioSource);
/// invoked when the stream fails after `open` returned.
pub type ErrorCallback = Box<dyn FnMut(AudioError) + Send + 'static>;

type FaultSlot = Arc<Mutex<Option<AudioError>>>;

fn take_fault(slot: &FaultSlot) -> Option<AudioError> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

/// Create a bounded frame queue holding at most `capacity` items.
pub(crate) fn frame_queue(capacity: usize) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let fault = FaultSlot::default();
    (
        FrameSender {
            tx,
            dropped: Arc::clone(&dropped),
            fault: Arc::clone(&fault),
        },
        FrameReceiver { rx, dropped, fault },
    )
}

/// Cloneable, non-blocking producer handle.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<QueueItem>,
    dropped: Arc<AtomicU64>,
    fault: FaultSlot,
}

impl FrameSender {
    /// Enqueue `frame` without blocking.  Returns `false` when the frame was
    /// dropped because the queue is full or the consumer is gone.
    pub fn push(&self, frame: AudioFrame) -> bool {
        match self.tx.try_send(QueueItem::Frame(frame)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Enqueue the shutdown sentinel.  When the queue is full the reader is
    /// not blocked anyway and will see the stop flag on its next iteration.
    pub(crate) fn send_sentinel(&self) -> bool {
        self.tx.try_send(QueueItem::Sentinel).is_ok()
    }

    /// Park `error` for the reader and wake it.  The first error wins; later
    /// ones are dropped until the receiver takes it.
    pub fn report_error(&self, error: AudioError) {
        {
            let mut slot = self.fault.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(error);
            }
        }
        // A full queue means the reader is awake and checks the slot anyway.
        let _ = self.tx.try_send(QueueItem::Fault);
    }

    /// Wrap this sender as a capture callback.
    pub fn into_callback(self) -> FrameCallback {
        Box::new(move |frame| {
            self.push(frame);
        })
    }

    /// Wrap this sender as a stream error callback.
    pub fn into_error_callback(self) -> ErrorCallback {
        Box::new(move |error| self.report_error(error))
    }

    /// Number of frames dropped on a full queue since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer end, owned by the recognition worker.
#[derive(Debug)]
pub(crate) struct FrameReceiver {
    rx: mpsc::Receiver<QueueItem>,
    dropped: Arc<AtomicU64>,
    fault: FaultSlot,
}

impl FrameReceiver {
    /// Wait at most `timeout` for the next item.  A parked stream error is
    /// returned before any queued frame.
    pub(crate) async fn next(&mut self, timeout: Duration) -> Next {
        if let Some(error) = take_fault(&self.fault) {
            return Next::Failed(error);
        }
        loop {
            return match tokio::time::timeout(timeout, self.rx.recv()).await {
                Ok(Some(QueueItem::Frame(frame))) => Next::Frame(frame),
                Ok(Some(QueueItem::Sentinel)) => Next::Sentinel,
                // Wake-ups for an error already taken are skipped.
                Ok(Some(QueueItem::Fault)) => match take_fault(&self.fault) {
                    Some(error) => Next::Failed(error),
                    None => continue,
                },
                Ok(None) => Next::Closed,
                Err(_) => Next::Timeout,
            };
        }
    }

    /// Discard everything currently queued, including a parked stream error,
    /// and return how many items were removed.
    pub(crate) fn drain(&mut self) -> usize {
        let mut removed = 0;
        loop {
            match self.rx.try_recv() {
                Ok(_) => removed += 1,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if let Some(error) = take_fault(&self.fault) {
            log::debug!("frames: discarded stream error: {error}");
        }
        removed
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
