//! Audio source capability
//!
//! Sources are external producers of sequential 10 ms frames. The mixer
//! never owns a source; it holds a shared handle and uses the handle's
//! allocation address as the source's identity.

use crate::frame::AudioFrame;
use std::sync::Arc;

/// Outcome of asking a source for its next 10 ms of audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFrameInfo {
    /// The frame carries audio and is a candidate for mixing.
    Normal,
    /// The source had nothing to deliver; the frame contents are ignored.
    Muted,
    /// The source failed to produce a frame; treated like `Muted`.
    Error,
}

/// An external producer of 10 ms audio frames.
///
/// Implementations are shared across the registration and mixing
/// threads, so mutability is interior. A pull must complete well inside
/// the 10 ms cycle budget; a source that cannot deliver in time should
/// return [`SourceFrameInfo::Muted`] instead of stalling the cycle.
pub trait AudioSource: Send + Sync {
    /// Fill `frame` with the next 10 ms of audio at the source's own
    /// sample rate and channel count. `frame` is a scratch buffer owned
    /// by the mixer and reused across cycles.
    fn pull_frame(&self, frame: &mut AudioFrame) -> SourceFrameInfo;

    /// The sample rate this source would prefer the mix to run at.
    fn preferred_sample_rate(&self) -> u32;
}

/// Registry identity is the handle's allocation, not the value behind
/// it. Comparing thin data pointers keeps two handles to the same
/// allocation equal even when their vtable pointers differ.
pub(crate) fn same_source(a: &Arc<dyn AudioSource>, b: &Arc<dyn AudioSource>) -> bool {
    Arc::as_ptr(a) as *const u8 == Arc::as_ptr(b) as *const u8
}
