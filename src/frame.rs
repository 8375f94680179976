//! 10 ms linear-PCM audio frame

use std::fmt;

/// Every frame in the pipeline covers exactly this much audio.
pub const FRAME_DURATION_MS: u32 = 10;

/// A single 10 ms buffer of interleaved signed 16-bit PCM.
///
/// The sample count is fully determined by the rate and channel count:
/// `sample_rate / 100` sample frames, interleaved across `channels`.
pub struct AudioFrame {
    pub sample_rate: u32,
    pub channels: usize,
    /// Interleaved samples, length = samples_per_channel() * channels.
    pub samples: Vec<i16>,
}

impl AudioFrame {
    /// Create a silent frame at the given format.
    pub fn silent(sample_rate: u32, channels: usize) -> Self {
        let samples_per_channel = (sample_rate / 100) as usize;
        Self {
            sample_rate,
            channels,
            samples: vec![0; samples_per_channel * channels],
        }
    }

    /// Number of sample frames per channel (sample_rate / 100 for 10 ms).
    pub fn samples_per_channel(&self) -> usize {
        (self.sample_rate / 100) as usize
    }

    /// Whether the buffer length matches the declared rate and channel
    /// count. A rate below 100 Hz carries no samples in 10 ms and is
    /// rejected outright.
    pub fn is_valid_shape(&self) -> bool {
        self.channels >= 1
            && self.samples_per_channel() > 0
            && self.samples.len() == self.samples_per_channel() * self.channels
    }

    /// Zero all samples, keeping the format.
    pub fn mute(&mut self) {
        self.samples.fill(0);
    }

    /// Reformat in place to a silent frame, reusing the allocation.
    ///
    /// Sources use this on their scratch frame before filling it, which
    /// keeps allocation off the pull path after the first cycle.
    pub fn reset(&mut self, sample_rate: u32, channels: usize) {
        self.sample_rate = sample_rate;
        self.channels = channels;
        let len = (sample_rate / 100) as usize * channels;
        self.samples.clear();
        self.samples.resize(len, 0);
    }

    /// Instantaneous loudness proxy: sum of squared samples.
    ///
    /// Deterministic and monotonic in signal level; zero exactly when
    /// the frame is silent.
    pub fn energy(&self) -> u64 {
        self.samples
            .iter()
            .map(|&s| {
                let s = i64::from(s);
                (s * s) as u64
            })
            .sum()
    }

    /// Scale samples by a gain that moves linearly from `from` to `to`
    /// over the frame. Both channels of an interleaved sample frame get
    /// the same gain. Gains are expected in [0.0, 1.0].
    pub fn apply_gain_ramp(&mut self, from: f32, to: f32) {
        let samples_per_channel = self.samples_per_channel();
        if samples_per_channel == 0 || self.channels == 0 {
            return;
        }
        let step = (to - from) / samples_per_channel as f32;
        let mut gain = from;
        for frame in self.samples.chunks_mut(self.channels) {
            for sample in frame {
                *sample = (f32::from(*sample) * gain) as i16;
            }
            gain += step;
        }
    }
}

impl Clone for AudioFrame {
    fn clone(&self) -> Self {
        Self {
            sample_rate: self.sample_rate,
            channels: self.channels,
            samples: self.samples.clone(),
        }
    }
}

impl fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioFrame")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("samples", &self.samples.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_frame_shape() {
        let frame = AudioFrame::silent(48_000, 2);
        assert_eq!(frame.samples_per_channel(), 480);
        assert_eq!(frame.samples.len(), 960);
        assert!(frame.is_valid_shape());
        assert!(frame.samples.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_shape_validation_rejects_wrong_length() {
        let mut frame = AudioFrame::silent(8_000, 1);
        assert!(frame.is_valid_shape());

        frame.samples.pop();
        assert!(!frame.is_valid_shape(), "short buffer must be invalid");

        frame.samples.extend([0, 0]);
        assert!(!frame.is_valid_shape(), "long buffer must be invalid");
    }

    #[test]
    fn test_zero_rate_frame_is_invalid() {
        assert!(!AudioFrame::silent(0, 1).is_valid_shape());

        let mut frame = AudioFrame::silent(16_000, 1);
        frame.reset(0, 1);
        assert!(
            !frame.is_valid_shape(),
            "an empty zero-rate frame must not pass shape validation"
        );
    }

    #[test]
    fn test_reset_reformats_and_silences() {
        let mut frame = AudioFrame::silent(8_000, 1);
        frame.samples.fill(1000);

        frame.reset(16_000, 2);
        assert_eq!(frame.sample_rate, 16_000);
        assert_eq!(frame.channels, 2);
        assert_eq!(frame.samples.len(), 320);
        assert!(frame.samples.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_energy_is_monotonic_in_level() {
        let mut quiet = AudioFrame::silent(8_000, 1);
        quiet.samples.fill(100);
        let mut loud = AudioFrame::silent(8_000, 1);
        loud.samples.fill(200);

        assert_eq!(AudioFrame::silent(8_000, 1).energy(), 0);
        assert!(loud.energy() > quiet.energy());
        assert_eq!(quiet.energy(), 100 * 100 * 80);
    }

    #[test]
    fn test_energy_ignores_sign() {
        let mut pos = AudioFrame::silent(8_000, 1);
        pos.samples.fill(500);
        let mut neg = AudioFrame::silent(8_000, 1);
        neg.samples.fill(-500);

        assert_eq!(pos.energy(), neg.energy());
    }

    #[test]
    fn test_ramp_in_is_monotonic_and_reaches_full_gain() {
        let mut frame = AudioFrame::silent(48_000, 1);
        frame.samples.fill(10_000);

        frame.apply_gain_ramp(0.0, 1.0);

        assert_eq!(frame.samples[0], 0, "ramp starts at zero gain");
        for pair in frame.samples.windows(2) {
            assert!(pair[1] >= pair[0], "ramp-in gain must not decrease");
        }
        let last = *frame.samples.last().unwrap();
        assert!(last >= 9_900, "ramp must reach full gain, got {}", last);
    }

    #[test]
    fn test_ramp_out_is_monotonic_and_reaches_zero() {
        let mut frame = AudioFrame::silent(48_000, 1);
        frame.samples.fill(10_000);

        frame.apply_gain_ramp(1.0, 0.0);

        assert_eq!(frame.samples[0], 10_000, "ramp-out starts at full gain");
        for pair in frame.samples.windows(2) {
            assert!(pair[1] <= pair[0], "ramp-out gain must not increase");
        }
        let last = *frame.samples.last().unwrap();
        assert!(
            (0..=25).contains(&last),
            "ramp must land at zero gain, got {}",
            last
        );
    }

    #[test]
    fn test_ramp_at_unity_gain_is_exact() {
        let mut frame = AudioFrame::silent(16_000, 2);
        for (i, sample) in frame.samples.iter_mut().enumerate() {
            *sample = (i as i16).wrapping_mul(13) - 3000;
        }
        let original = frame.samples.clone();

        frame.apply_gain_ramp(1.0, 1.0);
        assert_eq!(frame.samples, original, "unity ramp must be a no-op");
    }

    #[test]
    fn test_ramp_applies_same_gain_across_channels() {
        let mut frame = AudioFrame::silent(8_000, 2);
        frame.samples.fill(8_000);

        frame.apply_gain_ramp(0.0, 1.0);

        for pair in frame.samples.chunks(2) {
            assert_eq!(pair[0], pair[1], "L and R must ramp together");
        }
    }
}
