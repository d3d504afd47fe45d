//! Process-wide [`LatencyModel`] publication (spec §9 "Global process
//! state").
//!
//! The model is built once, from whichever microarchitecture descriptor and
//! config apply to this process, and then read by every thread's epoch
//! engine for the rest of the process lifetime. `OnceLock` gives us that
//! shape without an `unsafe impl Sync` wrapper: init races are resolved by
//! the lock, and every reader after that sees a fully-initialized value.

use crate::model::LatencyModel;
use std::sync::OnceLock;

static MODEL: OnceLock<LatencyModel> = OnceLock::new();

/// Publishes `model` as the process-wide instance. Returns `Err(model)` if
/// one was already published — callers should treat a second call as a
/// logic error, since the epoch engine only ever wants one target latency
/// in effect per process.
pub fn publish(model: LatencyModel) -> Result<(), LatencyModel> {
    MODEL.set(model)
}

/// The process-wide instance, if [`publish`] has run.
pub fn get() -> Option<&'static LatencyModel> {
    MODEL.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, LatencyConfig, LoggingConfig, TopologyConfig};
    use crate::cpu::estimator::{stalls_remote, stalls_total};
    use crate::cpu::{Estimator, MicroarchDescriptor, Provenance};
    use crate::pmc::simulated::SimulatedPmc;
    use crate::topology::VirtualTopology;

    // `OnceLock` is process-global, so only one test here may actually
    // publish; the rest just observe whatever state the process already
    // settled into. We only assert internal consistency, never a specific
    // outcome, to stay order-independent within this process.
    #[test]
    fn publish_then_get_round_trips() {
        let descriptor = MicroarchDescriptor {
            name: "Test".to_owned(),
            family_id: 6,
            model_id: 63,
            event_set: ["A", "B", "C", "D"],
            estimator: Estimator {
                stalls_total: |d| stalls_total(d, 1.0),
                stalls_remote: |d, r, l| stalls_remote(d, 1.0, r, l),
            },
            llc_size_bytes: 0,
            counter_count: 4,
            provenance: Provenance::Verified,
        };
        let cfg = Config {
            latency: LatencyConfig {
                read: 300,
                write: 280,
                inject_delay: false,
                calibration: false,
            },
            logging: LoggingConfig::default(),
            topology: TopologyConfig::default(),
        };
        let mut pmc = SimulatedPmc::new(&descriptor.event_set);
        let topo = VirtualTopology::from_nodes(vec![]);
        let model = LatencyModel::init(&cfg, &topo, &descriptor, &mut pmc).unwrap();
        let _ = publish(model);
        assert!(get().is_some());
    }
}
