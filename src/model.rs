//! Latency model (C4, spec §4.4).
//!
//! One process-wide instance (see [`crate::singleton`] for how it's
//! published), read-only after [`LatencyModel::init`] except for the
//! calibration factor, which the spec explicitly allows an "out-of-core
//! calibration loop" to update concurrently with epoch engine readers —
//! that single field is kept behind an atomic rather than plain mutable
//! state.

use crate::config::Config;
use crate::cpu::estimator::CounterDeltas;
use crate::cpu::{Estimator, MicroarchDescriptor};
use crate::error::MemlatError;
use crate::pmc::{PmcBackend, PmcHandle};
use crate::topology::VirtualTopology;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide latency emulation configuration and programmed-counter
/// state.
pub struct LatencyModel {
    pub enabled: bool,
    pub inject_delay: bool,
    pub read_latency_ns: u64,
    pub write_latency_ns: u64,

    /// Handles for the descriptor's event set, in the same order, one per
    /// successfully programmed event. Index 0 (the stall-cycles counter)
    /// is always present — `init` is fatal otherwise.
    programmed: Vec<PmcHandle>,
    /// Whether a distinct remote-DRAM counter (event_set[2]/[3]) was
    /// programmed, letting the epoch engine pick the remote-only estimator.
    has_remote_counter: bool,
    estimator: Estimator,

    calibration_enabled: bool,
    calibration_factor_bits: AtomicU64,
}

/// Every virtual node's DRAM and NVRAM hardware latency must be strictly
/// less than both target latencies (spec §3 invariant, §8 property 1).
fn check_target_latency_against_hardware(
    topology: &VirtualTopology,
    read_latency_ns: u64,
    write_latency_ns: u64,
) -> Result<(), MemlatError> {
    for (i, node) in topology.nodes.iter().enumerate() {
        if node.dram_latency_ns >= read_latency_ns
            || node.dram_latency_ns >= write_latency_ns
            || node.nvram_latency_ns >= read_latency_ns
            || node.nvram_latency_ns >= write_latency_ns
        {
            return Err(MemlatError::InvalidConfig(format!(
                "virtual node {i}: target read ({read_latency_ns}ns)/write ({write_latency_ns}ns) \
                 must exceed hardware dram ({}ns) and nvram ({}ns) latency",
                node.dram_latency_ns, node.nvram_latency_ns
            )));
        }
    }
    Ok(())
}

impl LatencyModel {
    /// Initializes the latency model from configuration (spec §4.4, steps
    /// 1-7). `pmc` must already be bound to the calling thread/process by
    /// the caller.
    pub fn init(
        cfg: &Config,
        topology: &VirtualTopology,
        descriptor: &MicroarchDescriptor,
        pmc: &mut dyn PmcBackend,
    ) -> Result<LatencyModel, MemlatError> {
        tracing::info!("initializing latency model");

        let read_latency_ns = cfg.latency.read;
        let write_latency_ns = cfg.latency.write;

        check_target_latency_against_hardware(topology, read_latency_ns, write_latency_ns)?;

        let inject_delay = cfg.latency.inject_delay;
        if !inject_delay {
            tracing::warn!("latency model is enabled, but delay injection is disabled");
        }

        let mut programmed = Vec::new();
        for (i, &event_name) in descriptor
            .event_set
            .iter()
            .take(descriptor.counter_count)
            .enumerate()
        {
            match pmc.program(event_name) {
                Ok(handle) => programmed.push(handle),
                Err(e) if i == 0 => {
                    // index 0 is the stall-cycles counter: mandatory.
                    return Err(MemlatError::CounterUnavailable(e));
                }
                Err(e) => {
                    tracing::warn!(event = event_name, error = %e, "optional PMC event unavailable, degrading");
                    break;
                }
            }
        }

        if programmed.is_empty() {
            return Err(MemlatError::InvalidConfig(
                "no stall-cycles counter programmed".to_owned(),
            ));
        }
        let has_remote_counter = programmed.len() >= 3;

        let calibration_enabled = cfg.latency.calibration;
        let calibration_factor_bits = AtomicU64::new(1.0_f64.to_bits());

        Ok(LatencyModel {
            enabled: true,
            inject_delay,
            read_latency_ns,
            write_latency_ns,
            programmed,
            has_remote_counter,
            estimator: descriptor.estimator,
            calibration_enabled,
            calibration_factor_bits,
        })
    }

    /// Whether this model programmed a counter that distinguishes
    /// remote-DRAM traffic from local-DRAM traffic.
    pub fn has_remote_counter(&self) -> bool {
        self.has_remote_counter
    }

    /// The handles a thread should pass to [`crate::pmc::PmcBackend::read_all`]
    /// ordering, forwarded as-is so the epoch engine doesn't need its own copy.
    pub fn programmed_handles(&self) -> &[PmcHandle] {
        &self.programmed
    }

    pub fn estimator(&self) -> Estimator {
        self.estimator
    }

    pub fn calibration_enabled(&self) -> bool {
        self.calibration_enabled
    }

    /// Current calibration multiplier (default `1.0`).
    pub fn calibration_factor(&self) -> f64 {
        f64::from_bits(self.calibration_factor_bits.load(Ordering::Relaxed))
    }

    /// Updates the calibration multiplier. Safe to call concurrently with
    /// epoch engine readers; see the module doc.
    pub fn set_calibration_factor(&self, factor: f64) {
        self.calibration_factor_bits
            .store(factor.to_bits(), Ordering::Relaxed);
    }

    /// Applies the stall-cycle estimator the epoch engine should use for
    /// `deltas`, given whether this thread's DRAM/NVRAM nodes differ (spec
    /// §4.5 step 3).
    pub fn estimate_stall_cycles(
        &self,
        deltas: CounterDeltas,
        remote_and_local_differ: bool,
        hw_remote_latency_ns: u64,
        hw_local_latency_ns: u64,
    ) -> u64 {
        let raw = if remote_and_local_differ && self.has_remote_counter {
            (self.estimator.stalls_remote)(deltas, hw_remote_latency_ns, hw_local_latency_ns)
        } else {
            (self.estimator.stalls_total)(deltas)
        };
        if self.calibration_enabled {
            (raw as f64 * self.calibration_factor()) as u64
        } else {
            raw
        }
    }
}
