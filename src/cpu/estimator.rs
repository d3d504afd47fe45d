//! Pure stall-cycle estimator formulas (spec §4.3 "Estimator formula").
//!
//! Every descriptor's counter deltas are indexed the same way:
//! `[l2_miss_stall, llc_hit, remote_dram, local_dram]`. These functions
//! never look at hardware state; they're plain arithmetic over `u64`s so
//! they can be unit tested directly against the boundary table in spec §8.

/// Counter deltas at the four fixed indices defined in spec §4.3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterDeltas {
    /// Index 0: L2-miss stall cycles.
    pub l2_miss_stall: u64,
    /// Index 1: LLC-hit-but-serviced cycles.
    pub llc_hit: u64,
    /// Index 2: LLC misses serviced from remote DRAM.
    pub remote_dram: u64,
    /// Index 3: LLC misses serviced from local DRAM.
    pub local_dram: u64,
}

/// Total stall cycles attributable to memory traffic.
///
/// `stalls_total = l2 * (F*(rem+loc)) / (F*(rem+loc) + hit)`, with the
/// convention that it is `0` whenever `rem == loc == 0` or the denominator
/// is `0`.
pub fn stalls_total(d: CounterDeltas, l3_factor: f64) -> u64 {
    if d.remote_dram == 0 && d.local_dram == 0 {
        return 0;
    }
    let num = l3_factor * (d.remote_dram + d.local_dram) as f64;
    let den = num + d.llc_hit as f64;
    if den == 0.0 {
        return 0;
    }
    ((d.l2_miss_stall as f64) * (num / den)) as u64
}

/// The fraction of [`stalls_total`] attributable specifically to remote
/// DRAM traffic, weighted by the thread's observed local/remote hardware
/// latencies.
///
/// `stalls_remote = stalls_total * (rem*hw_remote) / (rem*hw_remote + loc*hw_local)`,
/// `0` if the denominator is `0`.
pub fn stalls_remote(
    d: CounterDeltas,
    l3_factor: f64,
    hw_remote_latency_ns: u64,
    hw_local_latency_ns: u64,
) -> u64 {
    let total = stalls_total(d, l3_factor);
    if total == 0 {
        return 0;
    }
    let remote_weight = d.remote_dram as f64 * hw_remote_latency_ns as f64;
    let local_weight = d.local_dram as f64 * hw_local_latency_ns as f64;
    let den = remote_weight + local_weight;
    if den == 0.0 {
        return 0;
    }
    (total as f64 * (remote_weight / den)) as u64
}
