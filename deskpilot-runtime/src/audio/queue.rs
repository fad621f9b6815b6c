use deskpilot_core::AudioFrame;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// Counters shared between the capture callback, the sender and the player.
#[derive(Debug, Default)]
pub struct StreamStats {
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    frames_muted: AtomicU64,
    frames_played: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub frames_muted: u64,
    pub frames_played: u64,
}

impl StreamStats {
    pub fn record_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        crate::metrics::increment_frames_sent();
    }

    pub fn record_played(&self) {
        self.frames_played.fetch_add(1, Ordering::Relaxed);
        crate::metrics::increment_frames_played();
    }

    fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
        crate::metrics::increment_frames_dropped();
    }

    fn record_muted(&self) {
        self.frames_muted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_muted: self.frames_muted.load(Ordering::Relaxed),
            frames_played: self.frames_played.load(Ordering::Relaxed),
        }
    }
}

/// Microphone mute switch used while assistant audio plays.
///
/// Every mute bumps a generation counter so a delayed unmute scheduled before
/// a newer mute does not reopen the microphone early.
#[derive(Debug, Default)]
pub struct MicGate {
    muted: AtomicBool,
    generation: AtomicU64,
}

impl MicGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mute(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.muted.store(true, Ordering::Release);
    }

    pub fn unmute(&self) {
        self.muted.store(false, Ordering::Release);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    /// Unmute after `delay` unless the gate was muted again in between.
    pub fn unmute_after(self: &Arc<Self>, delay: Duration) -> tokio::task::JoinHandle<()> {
        let gate = Arc::clone(self);
        let armed_at = gate.generation.load(Ordering::Acquire);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if gate.generation.load(Ordering::Acquire) == armed_at {
                gate.unmute();
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queue full; the new frame was discarded.
    Dropped,
    /// Microphone muted; the frame never reached the queue.
    Muted,
    /// Consumer is gone.
    Closed,
}

/// Producer half, handed to the capture callback.
#[derive(Clone)]
pub struct CaptureSink {
    tx: mpsc::Sender<AudioFrame>,
    gate: Arc<MicGate>,
    stats: Arc<StreamStats>,
}

impl CaptureSink {
    /// Non-blocking enqueue. Never waits on the consumer.
    pub fn push(&self, frame: AudioFrame) -> PushOutcome {
        if self.gate.is_muted() {
            self.stats.record_muted();
            return PushOutcome::Muted;
        }
        match self.tx.try_send(frame) {
            Ok(()) => PushOutcome::Queued,
            Err(TrySendError::Full(_)) => {
                self.stats.record_dropped();
                debug!("capture queue full, dropping frame");
                PushOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => PushOutcome::Closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, drained by the sender loop.
pub struct CaptureQueue {
    rx: mpsc::Receiver<AudioFrame>,
}

impl CaptureQueue {
    pub async fn recv(&mut self) -> Option<AudioFrame> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<AudioFrame> {
        self.rx.try_recv().ok()
    }

    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Bounded capture channel of `capacity` frames.
pub fn capture_channel(
    capacity: usize,
    gate: Arc<MicGate>,
    stats: Arc<StreamStats>,
) -> (CaptureSink, CaptureQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (CaptureSink { tx, gate, stats }, CaptureQueue { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(marker: i16) -> AudioFrame {
        AudioFrame::new(vec![marker; 4], 24_000)
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let stats = Arc::new(StreamStats::default());
        let (sink, mut queue) = capture_channel(2, MicGate::new(), stats.clone());

        assert_eq!(sink.push(frame(1)), PushOutcome::Queued);
        assert_eq!(sink.push(frame(2)), PushOutcome::Queued);
        assert_eq!(sink.push(frame(3)), PushOutcome::Dropped);

        assert_eq!(queue.try_recv().unwrap().samples()[0], 1);
        assert_eq!(queue.try_recv().unwrap().samples()[0], 2);
        assert!(queue.try_recv().is_none());
        assert_eq!(stats.snapshot().frames_dropped, 1);
    }

    #[test]
    fn test_muted_frames_are_counted_separately() {
        let stats = Arc::new(StreamStats::default());
        let gate = MicGate::new();
        let (sink, mut queue) = capture_channel(4, gate.clone(), stats.clone());

        gate.mute();
        assert_eq!(sink.push(frame(1)), PushOutcome::Muted);
        gate.unmute();
        assert_eq!(sink.push(frame(2)), PushOutcome::Queued);

        assert_eq!(queue.try_recv().unwrap().samples()[0], 2);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_muted, 1);
        assert_eq!(snapshot.frames_dropped, 0);
    }

    #[test]
    fn test_push_after_consumer_closed() {
        let (sink, mut queue) =
            capture_channel(1, MicGate::new(), Arc::new(StreamStats::default()));
        queue.close();
        assert_eq!(sink.push(frame(1)), PushOutcome::Closed);
        assert!(sink.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_unmute_is_ignored() {
        let gate = MicGate::new();
        gate.mute();
        let first = gate.unmute_after(Duration::from_millis(500));
        tokio::time::sleep(Duration::from_millis(100)).await;
        gate.mute();
        first.await.unwrap();
        assert!(gate.is_muted());

        gate.unmute_after(Duration::from_millis(500)).await.unwrap();
        assert!(!gate.is_muted());
    }
}
