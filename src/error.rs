//! Error taxonomy for the latency emulation core (see spec §7).
//!
//! Only the fatal, startup-time failures are ever surfaced as `Result`s.
//! Steady-state failures (`TransientCounterError`, `NumericOverflow`) never
//! escape [`crate::epoch::close_epoch`]; they are logged and folded into
//! the "zero stall cycles" / "zero delay" defaults described in the spec.

use thiserror::Error;

/// Errors that can terminate process startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemlatError {
    /// The host CPU's vendor brand or (family, model) pair is not in the
    /// microarchitecture registry.
    #[error("unsupported CPU: {0}")]
    Unsupported(String),

    /// A target latency is not strictly greater than some virtual node's
    /// hardware latency, or required configuration is missing.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A required PMC event could not be programmed on the calling thread.
    #[error("performance counter unavailable: {0}")]
    CounterUnavailable(#[from] PmcError),
}

/// Errors from the PMC abstraction (§4.2).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PmcError {
    /// The named event is not recognized by this backend.
    #[error("no such event: {0}")]
    NoSuchEvent(String),

    /// All counter slots on this thread are already programmed.
    #[error("counters exhausted (max {0} slots)")]
    CountersExhausted(usize),

    /// The underlying syscall/ioctl/read failed.
    #[error("counter I/O error: {0}")]
    Io(String),
}
