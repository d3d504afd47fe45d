//! PMC abstraction (C2, spec §4.2).
//!
//! One uniform trait, three backends: [`direct::DirectPmc`] programs raw
//! model-specific event encodings straight through `perf_event_open`
//! (the kernel's stand-in for MSR access), [`library::LibraryPmc`] looks
//! events up by name the way a general performance-counter library would,
//! and [`simulated::SimulatedPmc`] is deterministic, in-process counters
//! for tests and the CLI demo.

pub mod direct;
pub mod library;
pub mod simulated;
mod sys;

use crate::error::PmcError;

/// Fixed semantic bank size: up to 4 counters per thread (spec §4.2, §4.3).
pub const MAX_COUNTERS: usize = 4;

/// Opaque reference to a programmed counter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmcHandle(pub(crate) usize);

/// Uniform surface over the three backends.
///
/// `read_delta` never propagates I/O failure as an `Err` from the hot
/// path's perspective — callers in [`crate::epoch`] treat a logged
/// `TransientCounterError` as "zero stall cycles" per spec §7. The trait
/// still returns a `Result` so backends can log with context; only
/// `program` (a startup-time operation) is meant to be handled with `?`.
pub trait PmcBackend {
    /// Binds `event_name` to a free slot. Fails with `NoSuchEvent` if the
    /// backend doesn't recognize the name, or `CountersExhausted` if all
    /// `MAX_COUNTERS` slots are taken.
    fn program(&mut self, event_name: &str) -> Result<PmcHandle, PmcError>;

    /// Returns the count since the previous `read_delta` (or since
    /// `program`), then resets the baseline.
    fn read_delta(&mut self, handle: PmcHandle) -> Result<u64, PmcError>;

    /// Fills deltas for every programmed slot, in program order, atomically
    /// with respect to each other on the current thread.
    fn read_all(&mut self) -> [u64; MAX_COUNTERS];

    /// Called when a thread enrolls.
    fn enable(&mut self);

    /// Called when a thread leaves.
    fn disable(&mut self);
}
