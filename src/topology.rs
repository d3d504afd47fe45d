//! Virtual NUMA topology stand-in (ambient, spec §4.6).
//!
//! The real topology builder — page migration, NUMA-aware allocation — is
//! out of scope (spec §1). This is just enough of `thread.h`/`topology.h`'s
//! shape to validate [`crate::model::LatencyModel::init`]'s invariant and
//! to hand threads a `(dram, nvram)` latency pair in tests and the CLI
//! demo.

/// One virtual node: a DRAM-backed region paired with an emulated,
/// higher-latency "NVRAM" region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualNode {
    /// Hardware latency, in nanoseconds, of the DRAM-backed region.
    pub dram_latency_ns: u64,
    /// Hardware latency, in nanoseconds, of the NVRAM-backed region.
    pub nvram_latency_ns: u64,
}

/// The full set of virtual nodes threads can be assigned to.
#[derive(Debug, Clone, Default)]
pub struct VirtualTopology {
    pub nodes: Vec<VirtualNode>,
}

impl VirtualTopology {
    pub fn from_nodes(nodes: Vec<VirtualNode>) -> VirtualTopology {
        VirtualTopology { nodes }
    }
}

impl From<&crate::config::TopologyConfig> for VirtualTopology {
    fn from(cfg: &crate::config::TopologyConfig) -> Self {
        VirtualTopology {
            nodes: cfg
                .nodes
                .iter()
                .map(|n| VirtualNode {
                    dram_latency_ns: n.dram_latency_ns,
                    nvram_latency_ns: n.nvram_latency_ns,
                })
                .collect(),
        }
    }
}
