//! Crate-level integration test: config load → descriptor select → epoch
//! loop, end to end against the simulated PMC backend (spec §8 "Test
//! tooling").

use memlat_core::config::Config;
use memlat_core::cpu::estimator::{stalls_remote, stalls_total, CounterDeltas};
use memlat_core::cpu::{Estimator, MicroarchDescriptor, Provenance};
use memlat_core::epoch::close_epoch;
use memlat_core::model::LatencyModel;
use memlat_core::pmc::simulated::SimulatedPmc;
use memlat_core::thread::InProcessThreadRegistry;
use memlat_core::topology::VirtualTopology;
use std::io::Write;

fn descriptor() -> MicroarchDescriptor {
    MicroarchDescriptor {
        name: "Test Haswell".to_owned(),
        family_id: 6,
        model_id: 63,
        event_set: [
            "CYCLE_ACTIVITY:STALLS_L2_PENDING",
            "MEM_LOAD_UOPS_LLC_HIT_RETIRED:XSNP_NONE",
            "MEM_LOAD_UOPS_LLC_MISS_RETIRED:REMOTE_DRAM",
            "MEM_LOAD_UOPS_LLC_MISS_RETIRED:LOCAL_DRAM",
        ],
        estimator: Estimator {
            stalls_total: |d: CounterDeltas| stalls_total(d, 1.0),
            stalls_remote: |d: CounterDeltas, r, l| stalls_remote(d, 1.0, r, l),
        },
        llc_size_bytes: 30 * 1024 * 1024,
        counter_count: 4,
        provenance: Provenance::Verified,
    }
}

fn write_config(body: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp config file");
    file.write_all(body.as_bytes()).expect("write temp config");
    file
}

#[test]
fn config_load_reject_invalid_topology() {
    let file = write_config(
        r#"
        [latency]
        read = 300
        write = 280

        [[topology.nodes]]
        dram_latency_ns = 80
        nvram_latency_ns = 400
        "#,
    );
    let cfg = Config::load(file.path()).expect("config should parse");
    let topology = VirtualTopology::from(&cfg.topology);
    let descriptor = descriptor();
    let mut pmc = SimulatedPmc::new(&descriptor.event_set);

    let err = LatencyModel::init(&cfg, &topology, &descriptor, &mut pmc).unwrap_err();
    assert!(matches!(err, memlat_core::MemlatError::InvalidConfig(_)));
}

#[test]
fn full_loop_from_config_to_epoch_statistics() {
    let file = write_config(
        r#"
        [latency]
        read = 300
        write = 280
        inject_delay = false
        calibration = false

        [[topology.nodes]]
        dram_latency_ns = 80
        nvram_latency_ns = 200
        "#,
    );
    let cfg = Config::load(file.path()).expect("config should parse");
    let topology = VirtualTopology::from(&cfg.topology);
    let descriptor = descriptor();
    let mut pmc = SimulatedPmc::new(&descriptor.event_set);

    let model = LatencyModel::init(&cfg, &topology, &descriptor, &mut pmc)
        .expect("model should initialize against a valid topology");
    assert!(model.has_remote_counter());

    let registry = InProcessThreadRegistry::new();
    let node = topology.nodes[0];
    let handle = registry.enroll(node.dram_latency_ns, node.nvram_latency_ns, 2000, 0, true);

    for _ in 0..20 {
        pmc.push_delta(descriptor.event_set[0], 10_000);
        pmc.push_delta(descriptor.event_set[1], 500);
        pmc.push_delta(descriptor.event_set[2], 50);
        pmc.push_delta(descriptor.event_set[3], 50);
        close_epoch(&registry, &model, &mut pmc);
    }

    let t = handle.lock().unwrap();
    assert_eq!(t.stats.epoch_count, 20);
    assert!(t.stats.stall_cycles_total > 0);
    assert!(!t.signaled);
}

#[test]
fn degrades_to_generic_estimator_when_dram_and_nvram_coincide() {
    let cfg = Config {
        latency: memlat_core::config::LatencyConfig {
            read: 300,
            write: 280,
            inject_delay: false,
            calibration: false,
        },
        logging: memlat_core::config::LoggingConfig::default(),
        topology: memlat_core::config::TopologyConfig::default(),
    };
    let descriptor = descriptor();
    // only the mandatory stall-cycle event is programmable here.
    let mut pmc = SimulatedPmc::new(&[descriptor.event_set[0]]);
    let topology = VirtualTopology::from_nodes(vec![]);

    let model = LatencyModel::init(&cfg, &topology, &descriptor, &mut pmc)
        .expect("should degrade rather than fail when only the stall counter programs");
    assert!(!model.has_remote_counter());

    let registry = InProcessThreadRegistry::new();
    let handle = registry.enroll(80, 80, 2000, 0, true);
    pmc.push_delta(descriptor.event_set[0], 1_000);
    close_epoch(&registry, &model, &mut pmc);
    assert_eq!(handle.lock().unwrap().stats.epoch_count, 1);
}
