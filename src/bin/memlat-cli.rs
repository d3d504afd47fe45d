//! Thin demo/debugging binary over `memlat-core` (spec §6 "CLI entry
//! point"). Loads a TOML config, selects a microarchitecture descriptor,
//! enrolls one demo thread against the in-process thread registry, and
//! drives a handful of epochs through the simulated PMC backend, printing
//! the resulting per-thread statistics.
//!
//! This is not a production deployment tool — real direct/library PMC
//! programming needs root and a matching host CPU; the demo always runs
//! against [`memlat_core::pmc::simulated::SimulatedPmc`] so it's usable in
//! CI and on non-Intel laptops.

use clap::Parser;
use memlat_core::config::Config;
use memlat_core::cpu::estimator::{stalls_remote, stalls_total, CounterDeltas};
use memlat_core::cpu::{self, Estimator, MicroarchDescriptor, Provenance};
use memlat_core::epoch::close_epoch;
use memlat_core::model::LatencyModel;
use memlat_core::pmc::simulated::SimulatedPmc;
use memlat_core::thread::InProcessThreadRegistry;
use memlat_core::topology::VirtualTopology;

#[derive(Parser, Debug)]
#[command(name = "memlat-cli", about = "Run the memory-latency epoch engine against a simulated backend")]
struct Args {
    /// Path to a TOML config file (see `memlat_core::config::Config`).
    config: String,

    /// Skip host CPU identification and use a synthetic descriptor. Forced
    /// on automatically if /proc/cpuinfo identification fails.
    #[arg(long)]
    simulate: bool,

    /// Number of epochs to close in the demo loop.
    #[arg(long, default_value_t = 10)]
    epochs: u32,

    /// L2-miss stall cycles fed to the simulated counter each epoch.
    #[arg(long, default_value_t = 50_000)]
    l2_stall: u64,

    /// LLC-hit cycles fed to the simulated counter each epoch.
    #[arg(long, default_value_t = 5_000)]
    llc_hit: u64,

    /// Remote-DRAM serviced count fed to the simulated counter each epoch.
    #[arg(long, default_value_t = 100)]
    remote_dram: u64,

    /// Local-DRAM serviced count fed to the simulated counter each epoch.
    #[arg(long, default_value_t = 100)]
    local_dram: u64,
}

/// A synthetic descriptor for hosts where real CPU identification fails or
/// `--simulate` was passed, matching the classic `L3_FACTOR = 1.0` formula.
fn synthetic_descriptor() -> MicroarchDescriptor {
    MicroarchDescriptor {
        name: "Simulated (generic)".to_owned(),
        family_id: 0,
        model_id: 0,
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
        llc_size_bytes: 0,
        counter_count: 4,
        provenance: Provenance::Verified,
    }
}

fn main() {
    let args = Args::parse();

    let cfg = match Config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(cfg.logging.level.as_str()))
        .init();

    let descriptor = if args.simulate {
        tracing::info!("--simulate passed, using synthetic descriptor");
        synthetic_descriptor()
    } else {
        match cpu::cpu_model() {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "CPU identification failed, falling back to synthetic descriptor");
                synthetic_descriptor()
            }
        }
    };
    println!("microarch: {} (provenance: {:?})", descriptor.name, descriptor.provenance);

    let topology = VirtualTopology::from(&cfg.topology);
    let mut pmc = SimulatedPmc::new(&descriptor.event_set);

    let model = match LatencyModel::init(&cfg, &topology, &descriptor, &mut pmc) {
        Ok(model) => model,
        Err(e) => {
            eprintln!("failed to initialize latency model: {e}");
            std::process::exit(1);
        }
    };

    let registry = InProcessThreadRegistry::new();
    let (hw_local, hw_remote) = topology
        .nodes
        .first()
        .map(|n| (n.dram_latency_ns, n.nvram_latency_ns))
        .unwrap_or((0, 0));
    let cpu_speed_mhz = cpu::cpu_speed_mhz().unwrap_or(0);
    let min_epoch_duration_us = 0;
    let handle = registry.enroll(hw_local, hw_remote, cpu_speed_mhz, min_epoch_duration_us, true);

    for i in 0..args.epochs {
        pmc.push_delta(descriptor.event_set[0], args.l2_stall);
        pmc.push_delta(descriptor.event_set[1], args.llc_hit);
        pmc.push_delta(descriptor.event_set[2], args.remote_dram);
        pmc.push_delta(descriptor.event_set[3], args.local_dram);
        close_epoch(&registry, &model, &mut pmc);
        let t = handle.lock().unwrap();
        println!(
            "epoch {i}: stall_cycles_total={} overhead_cycles={}",
            t.stats.stall_cycles_total, t.overhead_cycles
        );
    }

    let t = handle.lock().unwrap();
    println!(
        "done: epochs={} stall_cycles_total={} shortest_us={} longest_us={} overall_us={}",
        t.stats.epoch_count,
        t.stats.stall_cycles_total,
        t.stats.shortest_epoch_us,
        t.stats.longest_epoch_us,
        t.stats.overall_epoch_us
    );
    drop(t);
    registry.leave();
}
