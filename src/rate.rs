//! Output sample-rate policy

/// Rate used when no sources are registered.
pub const DEFAULT_OUTPUT_RATE: u32 = 48_000;

/// Rates the mix path runs at natively, ascending.
pub const NATIVE_SAMPLE_RATES: [u32; 4] = [8_000, 16_000, 32_000, 48_000];

/// Policy mapping the registered sources' preferred rates to the single
/// rate one mix cycle runs at.
///
/// Implementations must be deterministic for a given input multiset.
/// `&mut self` leaves room for stateful policies (hysteresis, fixed-rate
/// overrides) without changing the mixer.
pub trait OutputRateCalculator: Send {
    fn compute_output_rate(&mut self, preferred_rates: &[u32]) -> u32;
}

/// Default policy: the highest preferred rate, rounded up to the nearest
/// native rate and capped at 48 kHz. An empty source set yields
/// [`DEFAULT_OUTPUT_RATE`].
#[derive(Debug, Default)]
pub struct DefaultOutputRateCalculator;

impl OutputRateCalculator for DefaultOutputRateCalculator {
    fn compute_output_rate(&mut self, preferred_rates: &[u32]) -> u32 {
        let max_rate = match preferred_rates.iter().max() {
            Some(&rate) => rate,
            None => return DEFAULT_OUTPUT_RATE,
        };
        NATIVE_SAMPLE_RATES
            .iter()
            .copied()
            .find(|&native| native >= max_rate)
            .unwrap_or(DEFAULT_OUTPUT_RATE)
    }
}
