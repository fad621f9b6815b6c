//! Metrics instrumentation for runtime observability.

use std::time::Instant;

/// Record model request latency.
pub fn record_model_latency(duration_ms: f64) {
    metrics::histogram!("model_request_latency", duration_ms);
}

/// Record tool dispatch latency.
pub fn record_tool_latency(duration_ms: f64) {
    metrics::histogram!("tool_dispatch_latency", duration_ms);
}

/// Record how long a realtime stream stayed open.
pub fn record_stream_duration(duration_ms: f64) {
    metrics::histogram!("stream_duration", duration_ms);
}

pub fn increment_frames_sent() {
    metrics::counter!("audio_frames_sent", 1);
}

pub fn increment_frames_played() {
    metrics::counter!("audio_frames_played", 1);
}

pub fn increment_frames_dropped() {
    metrics::counter!("audio_frames_dropped", 1);
}

pub fn increment_stream_failures() {
    metrics::counter!("stream_failures", 1);
}

/// RAII timer for automatic metric recording.
pub struct MetricTimer {
    start: Instant,
    metric_name: &'static str,
}

impl MetricTimer {
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }
}

impl Drop for MetricTimer {
    fn drop(&mut self) {
        let duration_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        match self.metric_name {
            "model_request_latency" => record_model_latency(duration_ms),
            "tool_dispatch_latency" => record_tool_latency(duration_ms),
            "stream_duration" => record_stream_duration(duration_ms),
            _ => {}
        }
    }
}
