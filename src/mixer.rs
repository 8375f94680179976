//! Source registry, per-cycle selection and ramping — the mixing entry point
//!
//! Two concurrency domains share this type: registration (add/remove,
//! any thread, serialized by the registry lock) and mixing (one
//! sequential caller on a 10 ms cadence). The mix path holds the
//! registry lock only long enough to snapshot the source list; all
//! pulling, ranking, ramping and combining runs against the snapshot.

use crate::combiner::FrameCombiner;
use crate::frame::AudioFrame;
use crate::rate::{DefaultOutputRateCalculator, OutputRateCalculator};
use crate::source::{same_source, AudioSource, SourceFrameInfo};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// A mix cycle never includes more than this many ranked sources.
pub const MAX_MIXED_SOURCES: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MixerError {
    #[error("source is already registered")]
    DuplicateSource,
    #[error("source was never registered")]
    UnknownSource,
}

/// Mixer construction options.
///
/// The single construction entry point; historical factory variants
/// collapse into named fields here.
pub struct MixerConfig {
    pub rate_calculator: Box<dyn OutputRateCalculator>,
    pub use_limiter: bool,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            rate_calculator: Box::new(DefaultOutputRateCalculator),
            use_limiter: true,
        }
    }
}

/// Per-source mixing state. Owned by the mixing domain; created when a
/// source first appears in a snapshot and dropped when it disappears.
struct SourceStatus {
    source: Arc<dyn AudioSource>,
    /// Whether this source was part of the previous cycle's mix.
    is_mixed: bool,
    /// Ramp gain the previous cycle ended at.
    gain: f32,
    /// Scratch buffer the source fills each cycle; reused so the pull
    /// path stops allocating after the first cycle.
    frame: AudioFrame,
}

impl SourceStatus {
    fn new(source: Arc<dyn AudioSource>) -> Self {
        Self {
            source,
            is_mixed: false,
            gain: 0.0,
            frame: AudioFrame::silent(8_000, 1),
        }
    }
}

/// State touched only by the sequential mix path (and, between cycles,
/// by test introspection).
struct MixingState {
    rate_calculator: Box<dyn OutputRateCalculator>,
    output_rate: u32,
    statuses: Vec<SourceStatus>,
    combiner: FrameCombiner,
}

/// Real-time multi-source audio mixer.
///
/// Shared across device and session lifetimes via `Arc`; registration
/// is thread-safe while [`AudioMixer::mix`] must be driven by a single
/// caller at the 10 ms cadence.
pub struct AudioMixer {
    /// Registration domain: the only state mutated from arbitrary threads.
    registry: Mutex<Vec<Arc<dyn AudioSource>>>,
    mixing: Mutex<MixingState>,
    /// Non-blocking detector for the sequential-mix contract.
    mix_in_progress: AtomicBool,
}

impl AudioMixer {
    pub fn new(config: MixerConfig) -> Arc<Self> {
        let mut rate_calculator = config.rate_calculator;
        let output_rate = rate_calculator.compute_output_rate(&[]);
        Arc::new(Self {
            registry: Mutex::new(Vec::new()),
            mixing: Mutex::new(MixingState {
                rate_calculator,
                output_rate,
                statuses: Vec::new(),
                combiner: FrameCombiner::new(config.use_limiter),
            }),
            mix_in_progress: AtomicBool::new(false),
        })
    }

    /// Register a source. Fails when the same allocation is already
    /// registered; identity is the `Arc`, never the value behind it.
    pub fn add_source(&self, source: Arc<dyn AudioSource>) -> Result<(), MixerError> {
        let mut registry = self.registry.lock();
        if registry.iter().any(|existing| same_source(existing, &source)) {
            log::warn!("add_source: source is already registered");
            return Err(MixerError::DuplicateSource);
        }
        registry.push(source);
        log::debug!("add_source: registry holds {} sources", registry.len());
        Ok(())
    }

    /// Unregister a source. Safe while a mix cycle runs on another
    /// thread; the source simply misses the next snapshot.
    pub fn remove_source(&self, source: &Arc<dyn AudioSource>) -> Result<(), MixerError> {
        let mut registry = self.registry.lock();
        let len_before = registry.len();
        registry.retain(|existing| !same_source(existing, source));
        if registry.len() == len_before {
            log::warn!("remove_source: source was never registered");
            return Err(MixerError::UnknownSource);
        }
        log::debug!("remove_source: registry holds {} sources", registry.len());
        Ok(())
    }

    /// Produce one 10 ms output frame with the requested channel count.
    ///
    /// Must never run concurrently with itself; that contract is the
    /// caller's, checked here by a compare-and-swap guard because a
    /// silent race would corrupt ramp state. Violation panics, and the
    /// release profile turns that into an abort.
    pub fn mix(&self, number_of_channels: usize) -> AudioFrame {
        let _sequential = SequentialMixGuard::enter(&self.mix_in_progress);

        let snapshot: Vec<Arc<dyn AudioSource>> = self.registry.lock().clone();

        let mut state = self.mixing.lock();
        let MixingState {
            rate_calculator,
            output_rate,
            statuses,
            combiner,
        } = &mut *state;

        if sync_statuses(statuses, &snapshot) {
            let preferred: Vec<u32> = snapshot
                .iter()
                .map(|source| source.preferred_sample_rate())
                .collect();
            let rate = rate_calculator.compute_output_rate(&preferred);
            if rate != *output_rate {
                log::debug!("output rate changed: {} -> {} Hz", *output_rate, rate);
                *output_rate = rate;
            }
        }

        let mix_list = select_and_ramp(statuses);
        let frames: Vec<&AudioFrame> = mix_list.iter().map(|&idx| &statuses[idx].frame).collect();
        combiner.combine(&frames, number_of_channels, *output_rate)
    }

    /// Whether `source` was part of the previous cycle's mix.
    /// Logs and returns false for sources that were never added.
    pub fn mixed_last_cycle(&self, source: &Arc<dyn AudioSource>) -> bool {
        let registered = self
            .registry
            .lock()
            .iter()
            .any(|existing| same_source(existing, source));
        if !registered {
            log::error!("mixed_last_cycle: source was never registered");
            return false;
        }
        self.mixing
            .lock()
            .statuses
            .iter()
            .find(|status| same_source(&status.source, source))
            .map(|status| status.is_mixed)
            .unwrap_or(false)
    }
}

/// Reconcile the status list with the registry snapshot. Returns true
/// when the source set changed, which is what gates recomputing the
/// output rate.
fn sync_statuses(statuses: &mut Vec<SourceStatus>, snapshot: &[Arc<dyn AudioSource>]) -> bool {
    let len_before = statuses.len();
    statuses.retain(|status| {
        snapshot
            .iter()
            .any(|source| same_source(source, &status.source))
    });
    let removed = statuses.len() != len_before;

    let mut added = false;
    for source in snapshot {
        let known = statuses
            .iter()
            .any(|status| same_source(&status.source, source));
        if !known {
            statuses.push(SourceStatus::new(Arc::clone(source)));
            added = true;
        }
    }
    removed || added
}

/// Pull one frame per source, rank the audible ones by energy, pick the
/// cycle's mix list and advance ramp state. Returned indices are the
/// combine order.
fn select_and_ramp(statuses: &mut [SourceStatus]) -> Vec<usize> {
    // Pull pass: every snapshotted source gets asked exactly once per
    // cycle. Failed, muted or malformed pulls contribute silence.
    let mut candidates: Vec<(usize, u64)> = Vec::with_capacity(statuses.len());
    for (idx, status) in statuses.iter_mut().enumerate() {
        let info = status.source.pull_frame(&mut status.frame);
        let audible = match info {
            SourceFrameInfo::Normal => {
                if status.frame.is_valid_shape() {
                    true
                } else {
                    log::warn!(
                        "source delivered a malformed frame ({} Hz, {} ch, {} samples); muted for this cycle",
                        status.frame.sample_rate,
                        status.frame.channels,
                        status.frame.samples.len()
                    );
                    false
                }
            }
            SourceFrameInfo::Muted | SourceFrameInfo::Error => false,
        };
        if !audible {
            status.frame.reset(8_000, 1);
        }
        let energy = status.frame.energy();
        if energy > 0 {
            candidates.push((idx, energy));
        }
    }

    // Highest energy first; the sort is stable, so equal energies keep
    // registration order.
    candidates.sort_by(|a, b| b.1.cmp(&a.1));
    let selected: Vec<usize> = candidates
        .iter()
        .take(MAX_MIXED_SOURCES)
        .map(|&(idx, _)| idx)
        .collect();

    let mut mix_list = Vec::with_capacity(selected.len() + 1);
    for (idx, status) in statuses.iter_mut().enumerate() {
        if selected.contains(&idx) {
            // Ramp in on entry; steady unity gain once established.
            status.frame.apply_gain_ramp(status.gain, 1.0);
            status.gain = 1.0;
            status.is_mixed = true;
            mix_list.push(idx);
        } else if status.is_mixed {
            // One ramp-out cycle before the source leaves the mix.
            status.frame.apply_gain_ramp(status.gain, 0.0);
            status.gain = 0.0;
            status.is_mixed = false;
            mix_list.push(idx);
        } else {
            status.gain = 0.0;
            status.is_mixed = false;
        }
    }
    mix_list
}

/// RAII guard backing the sequential-mix contract. Entry is a single
/// compare-and-swap; a second concurrent entry means ramp state is
/// already corrupt, so it is unrecoverable.
struct SequentialMixGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SequentialMixGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        if flag
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            panic!("AudioMixer::mix invoked concurrently; mixing must be driven sequentially");
        }
        Self { flag }
    }
}

impl Drop for SequentialMixGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
