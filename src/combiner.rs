//! Frame combination: format reconciliation, summation, clip protection
//!
//! Inputs may disagree with the target on sample rate and channel
//! count; each one is remixed and resampled before hitting the i32 mix
//! bus. The limiter only engages when more than one source contributed,
//! so a lone source passes through bit-exact (modulo resampling).

use crate::frame::AudioFrame;
use crate::limiter::{saturate_to_i16, FrameLimiter};

/// Merges per-source frames into one output frame per mix cycle.
///
/// Stateless except for the limiter's one cycle of gain memory, which
/// is private to this instance.
pub struct FrameCombiner {
    use_limiter: bool,
    limiter: FrameLimiter,
}

impl FrameCombiner {
    pub fn new(use_limiter: bool) -> Self {
        Self {
            use_limiter,
            limiter: FrameLimiter::new(),
        }
    }

    /// Merge `frames` into one 10 ms frame at the requested format.
    ///
    /// Zero inputs produce a full silent frame. The limiter runs only
    /// when it was enabled at construction and at least two sources
    /// contributed; every path ends in saturating conversion.
    pub fn combine(
        &mut self,
        frames: &[&AudioFrame],
        number_of_channels: usize,
        sample_rate: u32,
    ) -> AudioFrame {
        let mut out = AudioFrame::silent(sample_rate, number_of_channels);
        if frames.is_empty() {
            return out;
        }

        let mut mix = vec![0i32; out.samples.len()];
        for frame in frames {
            accumulate(frame, sample_rate, number_of_channels, &mut mix);
        }

        if self.use_limiter && frames.len() > 1 {
            self.limiter.process(&mut mix, number_of_channels);
        } else {
            self.limiter.mark_bypassed();
        }
        saturate_to_i16(&mix, &mut out.samples);
        out
    }
}

/// Convert one input frame to the target format and add it to the bus.
fn accumulate(frame: &AudioFrame, sample_rate: u32, number_of_channels: usize, mix: &mut [i32]) {
    let converted = convert_frame(frame, sample_rate, number_of_channels);
    for (acc, &sample) in mix.iter_mut().zip(&converted) {
        *acc += i32::from(sample);
    }
}

/// Bring an input frame to the target rate and channel count.
fn convert_frame(frame: &AudioFrame, sample_rate: u32, number_of_channels: usize) -> Vec<i16> {
    let remixed = if frame.channels == number_of_channels {
        frame.samples.clone()
    } else {
        remix_channels(&frame.samples, frame.channels, number_of_channels)
    };
    if frame.sample_rate == sample_rate {
        remixed
    } else {
        resample_linear(
            &remixed,
            number_of_channels,
            frame.samples_per_channel(),
            (sample_rate / 100) as usize,
        )
    }
}

/// Channel up/down-mix on interleaved samples.
///
/// Mono fans out by duplication, down-mix to mono averages, and the
/// general case copies matching channels (duplicating the last source
/// channel into any extra target channels).
fn remix_channels(samples: &[i16], src_channels: usize, dst_channels: usize) -> Vec<i16> {
    let samples_per_channel = samples.len() / src_channels;
    let mut out = Vec::with_capacity(samples_per_channel * dst_channels);
    for frame in samples.chunks(src_channels) {
        if dst_channels == 1 {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            out.push((sum / src_channels as i32) as i16);
        } else if src_channels == 1 {
            out.extend(std::iter::repeat(frame[0]).take(dst_channels));
        } else {
            for channel in 0..dst_channels {
                out.push(frame[channel.min(src_channels - 1)]);
            }
        }
    }
    out
}

/// Linear-interpolation resampling on interleaved samples.
///
/// Stateless per frame, which keeps the combiner deterministic; the
/// quality is adequate for the 8/16/32/48 kHz native-rate ladder where
/// up-conversions are integer ratios.
fn resample_linear(samples: &[i16], channels: usize, in_len: usize, out_len: usize) -> Vec<i16> {
    // An empty input has nothing to interpolate from; contribute silence
    // rather than index past the buffer.
    if in_len == 0 {
        return vec![0; out_len * channels];
    }
    let mut out = Vec::with_capacity(out_len * channels);
    let step = in_len as f32 / out_len as f32;
    for i in 0..out_len {
        let position = i as f32 * step;
        let index = position as usize;
        let frac = position - index as f32;
        let next = (index + 1).min(in_len - 1);
        for channel in 0..channels {
            let a = f32::from(samples[index * channels + channel]);
            let b = f32::from(samples[next * channels + channel]);
            out.push((a + (b - a) * frac).round() as i16);
        }
    }
    out
}
