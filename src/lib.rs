//! Real-time multi-source audio mixer
//!
//! Synthesizes one 10 ms output frame per cycle from a dynamically
//! changing set of sources.
//!
//! Key properties:
//! - Registration is thread-safe and serialized by a registry lock;
//!   the mix path only takes that lock to snapshot the source list
//! - Per-cycle energy ranking caps the mix at four sources, with
//!   linear gain ramps on entry and exit to avoid audible clicks
//! - The combiner reconciles heterogeneous rates and channel counts
//!   and protects the output against clipping

pub mod combiner;
pub mod frame;
pub mod limiter;
pub mod mixer;
pub mod rate;
pub mod source;

pub use combiner::*;
pub use frame::*;
pub use limiter::*;
pub use mixer::*;
pub use rate::*;
pub use source::*;
