//! Epoch engine (C5, spec §4.5) — the timed, re-entrancy-protected routine
//! that closes an epoch on the calling thread.
//!
//! [`close_epoch`] takes its collaborators as explicit arguments rather
//! than reaching for hidden globals, so it can run identically from a
//! plain call site or be wrapped by a one-line `extern "C"` trampoline
//! installed as a signal handler (spec §9 "Signal-handler execution").
//! Every callee on this path — cycle reads, counter reads, arithmetic,
//! the spin — is lock-free and allocation-free, because this function may
//! run inside a signal handler (spec §5 "Signal safety").

use crate::clock;
use crate::cpu::estimator::CounterDeltas;
use crate::model::LatencyModel;
use crate::pmc::PmcBackend;
use crate::thread::{block_new_epoch, monotonic_time_us, unblock_new_epoch, ThreadRegistry};

/// Closes an epoch for the calling thread (spec §4.5).
///
/// No-op (beyond clearing `signaled`) if no thread is enrolled in
/// `registry`, or if the minimum epoch duration hasn't elapsed yet. Never
/// panics, never returns an error — per spec §7, no failure ever escapes
/// this function.
pub fn close_epoch<R: ThreadRegistry>(registry: &R, model: &LatencyModel, pmc: &mut dyn PmcBackend) {
    let entry_cycles = clock::now_cycles();

    // Step 1: re-entry guard.
    block_new_epoch();

    let thread = match registry.thread_self() {
        Some(t) => t,
        None => {
            unblock_new_epoch();
            return;
        }
    };

    // Step 2: min-duration gate.
    if !registry.reached_min_epoch_duration(&thread) {
        let mut t = thread.lock().unwrap();
        t.signaled = false;
        drop(t);
        unblock_new_epoch();
        return;
    }

    let (hw_local_latency_ns, hw_remote_latency_ns, remote_and_local_differ) = {
        let t = thread.lock().unwrap();
        (
            t.hw_local_latency_ns,
            t.hw_remote_latency_ns,
            t.is_remote_topology(),
        )
    };

    // Step 3+4: counter sampling and calibration, folded together in
    // `LatencyModel::estimate_stall_cycles` (it picks the selector and
    // applies the calibration factor).
    let raw = pmc.read_all();
    let deltas = CounterDeltas {
        l2_miss_stall: raw[0],
        llc_hit: raw[1],
        remote_dram: raw[2],
        local_dram: raw[3],
    };
    let stall_cycles = model.estimate_stall_cycles(
        deltas,
        remote_and_local_differ,
        hw_remote_latency_ns,
        hw_local_latency_ns,
    );

    // Step 5: delay derivation.
    let target = model.read_latency_ns;
    let ratio = if hw_remote_latency_ns > 0 && target > hw_remote_latency_ns {
        (target - hw_remote_latency_ns) as f64 / hw_remote_latency_ns as f64
    } else {
        0.0
    };

    let mut delay_cycles: u64 = if stall_cycles > 0 && ratio > 0.0 {
        if stall_cycles as f64 > u64::MAX as f64 / ratio {
            tracing::warn!(stall_cycles, ratio, "delay computation would overflow, capping");
            u64::MAX
        } else {
            (stall_cycles as f64 * ratio) as u64
        }
    } else {
        0
    };

    // Step 6: overhead accounting.
    let elapsed_in_engine = clock::now_cycles().wrapping_sub(entry_cycles);
    {
        let mut t = thread.lock().unwrap();
        t.overhead_cycles += elapsed_in_engine;
        if delay_cycles > t.overhead_cycles {
            delay_cycles -= t.overhead_cycles;
            t.overhead_cycles = 0;
        } else {
            t.overhead_cycles -= delay_cycles;
            delay_cycles = 0;
        }
        if t.stats.enabled {
            t.stats.stall_cycles_total += stall_cycles;
        }
    }

    // Step 7: absolute cap.
    let (cpu_speed_mhz, min_epoch_duration_us) = {
        let t = thread.lock().unwrap();
        (t.cpu_speed_mhz, t.min_epoch_duration_us)
    };
    let max_delay_ns = 5u64.saturating_mul(min_epoch_duration_us).saturating_mul(1000);
    let max_allowed_delay_cycles = if cpu_speed_mhz > 0 {
        cpu_speed_mhz.saturating_mul(max_delay_ns) / 1000
    } else {
        4_000_000_000
    };
    if delay_cycles > max_allowed_delay_cycles {
        tracing::warn!(
            delay_cycles,
            max_allowed_delay_cycles,
            "computed delay exceeds cap, discarding"
        );
        delay_cycles = 0;
    }

    // Step 8: spin.
    if delay_cycles > 0 && model.inject_delay {
        clock::spin(delay_cycles);
    }

    // Step 9: statistics.
    let epoch_end_us = monotonic_time_us();
    {
        let mut t = thread.lock().unwrap();
        if t.stats.enabled {
            let diff = epoch_end_us.saturating_sub(t.last_epoch_timestamp_us);
            t.stats.epoch_count += 1;
            t.stats.shortest_epoch_us = t.stats.shortest_epoch_us.min(diff);
            t.stats.longest_epoch_us = t.stats.longest_epoch_us.max(diff);
            t.stats.overall_epoch_us += diff;
        }
        // Step 10: terminal — order matters, see module doc.
        t.last_epoch_timestamp_us = monotonic_time_us();
        t.signaled = false;
    }
    unblock_new_epoch();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, LatencyConfig, LoggingConfig, TopologyConfig};
    use crate::cpu::{Estimator, MicroarchDescriptor, Provenance};
    use crate::pmc::simulated::SimulatedPmc;
    use crate::thread::InProcessThreadRegistry;
    use crate::topology::VirtualTopology;

    fn descriptor() -> MicroarchDescriptor {
        MicroarchDescriptor {
            name: "Test".to_owned(),
            family_id: 6,
            model_id: 63,
            event_set: ["L2", "HIT", "REM", "LOC"],
            estimator: Estimator {
                stalls_total: |d| crate::cpu::estimator::stalls_total(d, 1.0),
                stalls_remote: |d, r, l| crate::cpu::estimator::stalls_remote(d, 1.0, r, l),
            },
            llc_size_bytes: 0,
            counter_count: 4,
            provenance: Provenance::Verified,
        }
    }

    fn cfg(read: u64, write: u64, inject: bool) -> Config {
        Config {
            latency: LatencyConfig {
                read,
                write,
                inject_delay: inject,
                calibration: false,
            },
            logging: LoggingConfig::default(),
            topology: TopologyConfig::default(),
        }
    }

    #[test]
    fn no_enrolled_thread_is_a_silent_no_op() {
        let registry = InProcessThreadRegistry::new();
        let descriptor = descriptor();
        let mut pmc = SimulatedPmc::new(&descriptor.event_set);
        let model = LatencyModel::init(
            &cfg(300, 280, true),
            &VirtualTopology::from_nodes(vec![]),
            &descriptor,
            &mut pmc,
        )
        .unwrap();
        close_epoch(&registry, &model, &mut pmc); // must not panic
    }

    #[test]
    fn min_duration_not_met_clears_signaled_only() {
        let registry = InProcessThreadRegistry::new();
        let descriptor = descriptor();
        let mut pmc = SimulatedPmc::new(&descriptor.event_set);
        let model = LatencyModel::init(
            &cfg(300, 280, false),
            &VirtualTopology::from_nodes(vec![]),
            &descriptor,
            &mut pmc,
        )
        .unwrap();
        let handle = registry.enroll(80, 200, 2000, 1_000_000, false);
        {
            let mut t = handle.lock().unwrap();
            t.signaled = true;
            t.overhead_cycles = 42;
        }
        close_epoch(&registry, &model, &mut pmc);
        let t = handle.lock().unwrap();
        assert!(!t.signaled);
        assert_eq!(t.overhead_cycles, 42, "no other state should change");
    }

    #[test]
    fn signaled_is_always_cleared_on_exit() {
        let registry = InProcessThreadRegistry::new();
        let descriptor = descriptor();
        let mut pmc = SimulatedPmc::new(&descriptor.event_set);
        let model = LatencyModel::init(
            &cfg(300, 280, false),
            &VirtualTopology::from_nodes(vec![]),
            &descriptor,
            &mut pmc,
        )
        .unwrap();
        let handle = registry.enroll(80, 200, 2000, 0, false);
        {
            let mut t = handle.lock().unwrap();
            t.signaled = true;
        }
        close_epoch(&registry, &model, &mut pmc);
        assert!(!handle.lock().unwrap().signaled);
    }

    #[test]
    fn overhead_conservation_holds_across_many_epochs() {
        let registry = InProcessThreadRegistry::new();
        let descriptor = descriptor();
        let mut pmc = SimulatedPmc::new(&descriptor.event_set);
        // inject_delay = false so the spin never actually burns wall time
        // in this test, but the cycle accounting math still runs.
        let model = LatencyModel::init(
            &cfg(300, 100, false),
            &VirtualTopology::from_nodes(vec![]),
            &descriptor,
            &mut pmc,
        )
        .unwrap();
        let handle = registry.enroll(80, 200, 2000, 0, true);

        for _ in 0..50 {
            pmc.push_delta("L2", 1000);
            pmc.push_delta("HIT", 100);
            pmc.push_delta("REM", 10);
            pmc.push_delta("LOC", 10);
            // the only failure mode under test is an underflow panic in the
            // overhead subtraction (spec §8 property 5); reaching here for
            // every iteration is the assertion.
            close_epoch(&registry, &model, &mut pmc);
        }
        let t = handle.lock().unwrap();
        assert_eq!(t.stats.epoch_count, 50);
    }

    #[test]
    fn zero_ratio_yields_zero_delay_end_to_end() {
        let registry = InProcessThreadRegistry::new();
        let descriptor = descriptor();
        let mut pmc = SimulatedPmc::new(&descriptor.event_set);
        let model = LatencyModel::init(
            &cfg(100, 90, true),
            &VirtualTopology::from_nodes(vec![]),
            &descriptor,
            &mut pmc,
        )
        .unwrap();
        // hw_remote_latency_ns == read_latency_ns (100) => ratio == 0.
        let handle = registry.enroll(80, 100, 2000, 0, true);
        pmc.push_delta("L2", 10_000);
        pmc.push_delta("HIT", 0);
        pmc.push_delta("REM", 100);
        pmc.push_delta("LOC", 0);
        close_epoch(&registry, &model, &mut pmc);
        let t = handle.lock().unwrap();
        // delay_cycles was 0, so overhead only grows by this epoch's own
        // engine time — it must never underflow regardless of that value.
        assert!(t.overhead_cycles < u64::MAX);
    }
}
