//! Mix-bus gain limiting and saturation
//!
//! Summation runs on an i32 bus so intermediate values can exceed the
//! i16 range without wrapping. The limiter pulls loud cycles back under
//! full scale with a gain that moves linearly across the frame, and the
//! saturating conversion is the last line of defense on every path.

/// Saturate an i32 mix bus down to i16 output samples.
pub fn saturate_to_i16(mix: &[i32], out: &mut [i16]) {
    for (dst, &src) in out.iter_mut().zip(mix) {
        *dst = src.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
    }
}

/// Soft limiter with one cycle of gain memory.
///
/// The gain needed to fit this cycle's peak inside the i16 range is
/// reached at the end of the frame; the start of the frame continues
/// from the previous cycle's gain so consecutive loud cycles do not get
/// an audible gain step. Samples still above range after limiting are
/// caught by [`saturate_to_i16`].
pub struct FrameLimiter {
    gain: f32,
}

impl FrameLimiter {
    pub fn new() -> Self {
        Self { gain: 1.0 }
    }

    /// Scale `mix` (interleaved, `channels` wide) so its peak fits the
    /// i16 range, interpolating from the previous cycle's gain.
    pub fn process(&mut self, mix: &mut [i32], channels: usize) {
        if mix.is_empty() || channels == 0 {
            return;
        }

        let peak = mix.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
        let target = if peak > i16::MAX as u32 {
            i16::MAX as f32 / peak as f32
        } else {
            1.0
        };

        // Quiet cycle following a quiet cycle: nothing to do.
        if target == 1.0 && self.gain == 1.0 {
            return;
        }

        let frames = mix.len() / channels;
        let step = (target - self.gain) / frames as f32;
        let mut gain = self.gain;
        for frame in mix.chunks_mut(channels) {
            for sample in frame {
                *sample = (*sample as f32 * gain) as i32;
            }
            gain += step;
        }
        self.gain = target;
    }

    /// Record a cycle that bypassed the limiter. Bypassed output plays
    /// at unity gain, so the memory must follow it; otherwise the next
    /// limited cycle would ramp from a stale gain and reintroduce the
    /// gain step the memory exists to prevent.
    pub fn mark_bypassed(&mut self) {
        self.gain = 1.0;
    }
}

impl Default for FrameLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_bus_is_untouched() {
        let mut limiter = FrameLimiter::new();
        let mut mix = vec![1_000i32; 160];
        limiter.process(&mut mix, 2);

        assert!(mix.iter().all(|&s| s == 1_000), "in-range mix must pass through");
    }

    #[test]
    fn test_loud_bus_ends_at_full_scale() {
        let mut limiter = FrameLimiter::new();
        let mut mix = vec![60_000i32; 480];
        limiter.process(&mut mix, 1);

        let last = *mix.last().unwrap();
        assert!(
            (last - i32::from(i16::MAX)).abs() <= 200,
            "end of a loud frame should sit at full scale, got {}",
            last
        );
    }

    #[test]
    fn test_gain_memory_carries_into_next_cycle() {
        let mut limiter = FrameLimiter::new();
        let mut first = vec![60_000i32; 480];
        limiter.process(&mut first, 1);

        // First cycle starts from unity gain, so its first sample is hot.
        assert_eq!(first[0], 60_000);

        let mut second = vec![60_000i32; 480];
        limiter.process(&mut second, 1);

        // Second cycle starts at the gain the first one reached.
        assert!(
            (second[0] - i32::from(i16::MAX)).abs() <= 200,
            "second loud cycle must start already limited, got {}",
            second[0]
        );
    }

    #[test]
    fn test_gain_recovers_after_loud_cycle() {
        let mut limiter = FrameLimiter::new();
        let mut loud = vec![60_000i32; 480];
        limiter.process(&mut loud, 1);

        let mut quiet = vec![1_000i32; 480];
        limiter.process(&mut quiet, 1);

        // Ramps back toward unity over the frame.
        assert!(quiet[0] < 1_000, "quiet frame starts attenuated after a loud one");
        let last = *quiet.last().unwrap();
        assert!(last >= 990, "gain must recover to unity, got {}", last);
    }

    #[test]
    fn test_bypassed_cycle_clears_gain_memory() {
        let mut limiter = FrameLimiter::new();
        let mut loud = vec![60_000i32; 480];
        limiter.process(&mut loud, 1);

        // The cycles in between play unlimited at unity gain.
        limiter.mark_bypassed();

        let mut quiet = vec![1_000i32; 480];
        limiter.process(&mut quiet, 1);
        assert!(
            quiet.iter().all(|&s| s == 1_000),
            "after a bypassed cycle the limiter must restart from unity, got {}",
            quiet[0]
        );
    }

    #[test]
    fn test_same_gain_across_interleaved_channels() {
        let mut limiter = FrameLimiter::new();
        let mut mix = vec![50_000i32; 320];
        limiter.process(&mut mix, 2);

        for frame in mix.chunks(2) {
            assert_eq!(frame[0], frame[1], "L and R must share the limiter gain");
        }
    }

    #[test]
    fn test_saturation_clamps_both_directions() {
        let mix = [40_000, -40_000, 100, -100];
        let mut out = [0i16; 4];
        saturate_to_i16(&mix, &mut out);

        assert_eq!(out, [i16::MAX, i16::MIN, 100, -100]);
    }
}
