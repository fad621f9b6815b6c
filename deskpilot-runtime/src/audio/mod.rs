//! Audio capture/playback seams for the realtime session.
//!
//! The capture side is a bounded producer/consumer channel: the device
//! callback pushes frames through a [`CaptureSink`] and never blocks; the
//! sender loop drains the matching [`CaptureQueue`].

pub mod convert;
#[cfg(feature = "audio-device")]
pub mod device;
pub mod queue;

pub use queue::{
    capture_channel, CaptureQueue, CaptureSink, MicGate, PushOutcome, StatsSnapshot, StreamStats,
};

use crate::error::AudioError;
use deskpilot_core::AudioFrame;

/// Sample rate of the realtime wire format (pcm16 mono).
pub const WIRE_SAMPLE_RATE: u32 = 24_000;

/// Samples per captured frame.
pub const FRAME_SAMPLES: usize = 1024;

/// Microphone (or any other producer of wire-format frames).
pub trait AudioSource: Send {
    /// Begin delivering frames into `sink`. Called at most once per stream.
    fn start(&mut self, sink: CaptureSink) -> Result<(), AudioError>;

    /// Halt capture and release the device. Idempotent.
    fn stop(&mut self);
}

/// Speaker (or any other consumer of wire-format frames).
pub trait AudioSink: Send {
    fn start(&mut self) -> Result<(), AudioError>;

    /// Queue a frame behind everything already queued.
    fn play(&mut self, frame: AudioFrame) -> Result<(), AudioError>;

    /// Halt playback and release the device. Idempotent.
    fn stop(&mut self);
}
