#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use deskpilot_core::AudioFrame;
use deskpilot_runtime::audio::{capture_channel, MicGate, StreamStats};
use metrics::{Counter, CounterFn, Gauge, Histogram, Key, KeyName, Recorder, SharedString, Unit};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Tally(AtomicU64);

impl CounterFn for Tally {
    fn increment(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    fn absolute(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }
}

/// Keeps every counter by name so tests can read them back.
#[derive(Clone, Default)]
struct CountingRecorder {
    counters: Arc<Mutex<HashMap<String, Arc<Tally>>>>,
}

impl CountingRecorder {
    fn value(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .get(name)
            .map_or(0, |t| t.0.load(Ordering::Relaxed))
    }
}

impl Recorder for CountingRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key) -> Counter {
        let tally = self
            .counters
            .lock()
            .entry(key.name().to_string())
            .or_default()
            .clone();
        Counter::from_arc(tally)
    }

    fn register_gauge(&self, _: &Key) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _: &Key) -> Histogram {
        Histogram::noop()
    }
}

// Only test in this binary, so the global recorder is ours alone.
#[test]
fn test_frame_counters_reach_the_recorder() {
    let recorder = CountingRecorder::default();
    metrics::set_boxed_recorder(Box::new(recorder.clone())).unwrap();

    let stats = Arc::new(StreamStats::default());
    for _ in 0..3 {
        stats.record_played();
    }
    stats.record_sent();

    let (sink, _queue) = capture_channel(1, MicGate::new(), stats.clone());
    sink.push(AudioFrame::new(vec![0; 4], 24_000));
    sink.push(AudioFrame::new(vec![0; 4], 24_000));

    assert_eq!(recorder.value("audio_frames_played"), 3);
    assert_eq!(recorder.value("audio_frames_sent"), 1);
    assert_eq!(recorder.value("audio_frames_dropped"), 1);
    assert_eq!(stats.snapshot().frames_played, 3);
}
