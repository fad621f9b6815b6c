//! cpal-backed microphone and speaker.
//!
//! cpal streams are not `Send`, so each one lives on its own thread for the
//! life of the stream and is dropped there when stop is signalled.

use super::convert::{i16_to_f32, resample, to_mono, Framer};
use super::{AudioSink, AudioSource, CaptureSink, FRAME_SAMPLES, WIRE_SAMPLE_RATE};
use crate::error::AudioError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use deskpilot_core::AudioFrame;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info};

struct DeviceThread {
    stop_tx: std_mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl DeviceThread {
    /// Run `build` on a new thread, keep what it returns alive until stopped.
    fn spawn<F>(name: &str, build: F) -> Result<Self, AudioError>
    where
        F: FnOnce() -> Result<cpal::Stream, AudioError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::Stream(format!(
                        "failed to start stream: {e}"
                    ))));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                // Sender dropped or stop sent: either way we are done.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| AudioError::Stream(format!("failed to spawn audio thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { stop_tx, handle }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(AudioError::Stream("audio thread exited during setup".to_string()))
            }
        }
    }

    fn stop(self) {
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            error!("audio thread panicked");
        }
    }
}

fn device_name(device: &cpal::Device) -> String {
    device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into())
}

/// Default microphone, delivered as 24 kHz mono pcm16 frames.
#[derive(Default)]
pub struct CpalSource {
    running: Option<DeviceThread>,
}

impl CpalSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSource for CpalSource {
    fn start(&mut self, sink: CaptureSink) -> Result<(), AudioError> {
        if self.running.is_some() {
            return Ok(());
        }
        let thread = DeviceThread::spawn("deskpilot-capture", move || {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or_else(|| AudioError::DeviceUnavailable("no default input device".into()))?;
            info!("using input device: {}", device_name(&device));

            let default_config = device
                .default_input_config()
                .map_err(|e| AudioError::DeviceUnavailable(format!("no default input config: {e}")))?;
            let native_rate = default_config.sample_rate();
            let native_channels = default_config.channels();
            let stream_config = StreamConfig {
                channels: native_channels,
                sample_rate: native_rate,
                buffer_size: cpal::BufferSize::Default,
            };
            info!(
                "capture: native {}Hz x{} -> {}Hz mono",
                native_rate, native_channels, WIRE_SAMPLE_RATE
            );

            let mut framer = Framer::new(FRAME_SAMPLES, WIRE_SAMPLE_RATE);
            device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                        let mono = to_mono(data, native_channels);
                        let samples = resample(&mono, native_rate, WIRE_SAMPLE_RATE);
                        for frame in framer.push(&samples) {
                            sink.push(frame);
                        }
                    },
                    move |err| {
                        error!("audio input stream error: {err}");
                    },
                    None,
                )
                .map_err(|e| AudioError::Stream(format!("failed to build input stream: {e}")))
        })?;
        self.running = Some(thread);
        info!("audio capture started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(thread) = self.running.take() {
            thread.stop();
            info!("audio capture stopped");
        }
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Default speaker. Frames are queued and played back in arrival order.
pub struct CpalSink {
    buffer: Arc<Mutex<VecDeque<f32>>>,
    output_rate: u32,
    running: Option<DeviceThread>,
}

impl CpalSink {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(VecDeque::new())),
            output_rate: WIRE_SAMPLE_RATE,
            running: None,
        }
    }
}

impl Default for CpalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for CpalSink {
    fn start(&mut self) -> Result<(), AudioError> {
        if self.running.is_some() {
            return Ok(());
        }
        let buffer = Arc::clone(&self.buffer);
        let (rate_tx, rate_rx) = std_mpsc::channel();
        let thread = DeviceThread::spawn("deskpilot-playback", move || {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceUnavailable("no default output device".into()))?;
            info!("using output device: {}", device_name(&device));

            let default_config = device
                .default_output_config()
                .map_err(|e| AudioError::DeviceUnavailable(format!("no default output config: {e}")))?;
            let channels = default_config.channels().max(1) as usize;
            let stream_config = StreamConfig {
                channels: default_config.channels(),
                sample_rate: default_config.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            };
            let _ = rate_tx.send(default_config.sample_rate());

            device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                        let mut buf = buffer.lock();
                        for frame in data.chunks_mut(channels) {
                            let sample = buf.pop_front().unwrap_or(0.0);
                            frame.fill(sample);
                        }
                    },
                    move |err| {
                        error!("audio output stream error: {err}");
                    },
                    None,
                )
                .map_err(|e| AudioError::Stream(format!("failed to build output stream: {e}")))
        })?;
        if let Ok(rate) = rate_rx.try_recv() {
            self.output_rate = rate;
        }
        self.running = Some(thread);
        Ok(())
    }

    fn play(&mut self, frame: AudioFrame) -> Result<(), AudioError> {
        if self.running.is_none() {
            return Err(AudioError::Stream("playback not started".to_string()));
        }
        let samples: Vec<f32> = frame.samples().iter().map(|&s| i16_to_f32(s)).collect();
        let samples = resample(&samples, frame.sample_rate(), self.output_rate);
        self.buffer.lock().extend(samples);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(thread) = self.running.take() {
            thread.stop();
            self.buffer.lock().clear();
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.stop();
    }
}
