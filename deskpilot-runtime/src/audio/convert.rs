//! Sample format helpers between device buffers and the pcm16 wire format.

use deskpilot_core::AudioFrame;

/// Average interleaved channels into one.
pub fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels.max(1) as usize;
    if ch == 1 {
        return data.to_vec();
    }
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear-interpolation resampler, used in both directions.
pub fn resample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() || src_rate == 0 || dst_rate == 0 {
        return samples.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            samples[idx] as f64 * (1.0 - frac) + samples[idx + 1] as f64 * frac
        } else {
            samples[idx.min(samples.len() - 1)] as f64
        };

        output.push(sample as f32);
    }

    output
}

pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / i16::MAX as f32
}

/// Cuts a continuous sample stream into fixed-size frames.
pub struct Framer {
    frame_len: usize,
    sample_rate: u32,
    pending: Vec<i16>,
}

impl Framer {
    pub fn new(frame_len: usize, sample_rate: u32) -> Self {
        Self {
            frame_len: frame_len.max(1),
            sample_rate,
            pending: Vec::with_capacity(frame_len),
        }
    }

    /// Feed samples; returns every frame completed by them.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        let mut frames = Vec::new();
        for &s in samples {
            self.pending.push(f32_to_i16(s));
            if self.pending.len() == self.frame_len {
                let full = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_len));
                frames.push(AudioFrame::new(full, self.sample_rate));
            }
        }
        frames
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
