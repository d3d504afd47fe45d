//! Per-thread state (spec §3) and the thread/signal scheduler stand-in
//! (ambient, spec §4.6).
//!
//! The real thread manager — periodic SIGALRM delivery, min-epoch-duration
//! tracking tied to a production scheduler — is out of scope (spec §1).
//! [`InProcessThreadRegistry`] is the minimal implementation of the
//! `thread_self()` / `reached_min_epoch_duration()` contract (spec §6) the
//! epoch engine needs to run in tests and the CLI demo. `block_new_epoch`,
//! `unblock_new_epoch`, and `monotonic_time_us` are real, not stand-ins:
//! they do actual signal masking and clock reads, because those are part
//! of the core's own re-entrancy guard (spec §4.5 step 1, §5 "Signal
//! safety").

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

/// Per-thread accounting the epoch engine updates (spec §3 "Optional
/// accounting").
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadStats {
    pub enabled: bool,
    pub epoch_count: u64,
    pub stall_cycles_total: u64,
    pub shortest_epoch_us: u64,
    pub longest_epoch_us: u64,
    pub overall_epoch_us: u64,
    pub global_remote_dram_bytes: u64,
    pub global_local_dram_bytes: u64,
}

impl ThreadStats {
    fn new_enabled() -> ThreadStats {
        ThreadStats {
            enabled: true,
            shortest_epoch_us: u64::MAX,
            ..Default::default()
        }
    }
}

/// Per-thread state participating in the epoch engine (spec §3
/// "Per-thread state").
#[derive(Debug, Clone)]
pub struct ThreadState {
    pub tid: u64,
    pub hw_local_latency_ns: u64,
    pub hw_remote_latency_ns: u64,
    pub overhead_cycles: u64,
    pub last_epoch_timestamp_us: u64,
    pub signaled: bool,
    pub cpu_speed_mhz: u64,
    pub min_epoch_duration_us: u64,
    pub stats: ThreadStats,
}

impl ThreadState {
    pub fn new(
        tid: u64,
        hw_local_latency_ns: u64,
        hw_remote_latency_ns: u64,
        cpu_speed_mhz: u64,
        min_epoch_duration_us: u64,
        stats_enabled: bool,
    ) -> ThreadState {
        ThreadState {
            tid,
            hw_local_latency_ns,
            hw_remote_latency_ns,
            overhead_cycles: 0,
            last_epoch_timestamp_us: monotonic_time_us(),
            signaled: false,
            cpu_speed_mhz,
            min_epoch_duration_us,
            stats: if stats_enabled {
                ThreadStats::new_enabled()
            } else {
                ThreadStats::default()
            },
        }
    }

    /// This thread's DRAM and NVRAM regions are distinct virtual nodes
    /// (spec §4.5 step 3 selector condition).
    pub fn is_remote_topology(&self) -> bool {
        self.hw_local_latency_ns != self.hw_remote_latency_ns
    }
}

/// Shared handle to a [`ThreadState`]; `Clone` is cheap (an `Arc` bump).
pub type ThreadHandle = Arc<Mutex<ThreadState>>;

/// The `thread_self()` / `reached_min_epoch_duration()` contract (spec §6)
/// the epoch engine consumes.
pub trait ThreadRegistry {
    /// Returns the calling thread's enrolled state, if any.
    fn thread_self(&self) -> Option<ThreadHandle>;

    /// Whether the configured minimum epoch duration has elapsed since
    /// `thread`'s last epoch.
    fn reached_min_epoch_duration(&self, thread: &ThreadHandle) -> bool;
}

/// A single-process [`ThreadRegistry`] backed by a map from [`ThreadId`] to
/// [`ThreadState`] — enough to drive the epoch engine in unit tests and the
/// CLI demo without a real timer-driven scheduler.
#[derive(Default)]
pub struct InProcessThreadRegistry {
    threads: Mutex<HashMap<ThreadId, ThreadHandle>>,
}

impl InProcessThreadRegistry {
    pub fn new() -> InProcessThreadRegistry {
        InProcessThreadRegistry::default()
    }

    /// Enrolls the calling thread with state built from `hw_local_latency_ns`
    /// etc (spec §3 "Lifecycle": per-thread state created when a thread
    /// enrolls).
    pub fn enroll(
        &self,
        hw_local_latency_ns: u64,
        hw_remote_latency_ns: u64,
        cpu_speed_mhz: u64,
        min_epoch_duration_us: u64,
        stats_enabled: bool,
    ) -> ThreadHandle {
        let tid = std::thread::current().id();
        let state = Arc::new(Mutex::new(ThreadState::new(
            thread_id_to_u64(tid),
            hw_local_latency_ns,
            hw_remote_latency_ns,
            cpu_speed_mhz,
            min_epoch_duration_us,
            stats_enabled,
        )));
        self.threads.lock().unwrap().insert(tid, Arc::clone(&state));
        state
    }

    /// Removes the calling thread's state (spec §3 "Lifecycle": destroyed
    /// on exit).
    pub fn leave(&self) {
        let tid = std::thread::current().id();
        self.threads.lock().unwrap().remove(&tid);
    }
}

impl ThreadRegistry for InProcessThreadRegistry {
    fn thread_self(&self) -> Option<ThreadHandle> {
        let tid = std::thread::current().id();
        self.threads.lock().unwrap().get(&tid).cloned()
    }

    fn reached_min_epoch_duration(&self, thread: &ThreadHandle) -> bool {
        let thread = thread.lock().unwrap();
        let now = monotonic_time_us();
        now.saturating_sub(thread.last_epoch_timestamp_us) >= thread.min_epoch_duration_us
    }
}

fn thread_id_to_u64(id: ThreadId) -> u64 {
    // `ThreadId` has no stable numeric accessor; hash it into a u64 that's
    // stable for the process lifetime, which is all the `tid` field needs
    // (diagnostics, not a real kernel TID).
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    id.hash(&mut hasher);
    hasher.finish()
}

/// The signal this core masks for its re-entrancy guard. A production
/// integration would use whatever signal its timer delivers the periodic
/// epoch on; `SIGALRM` matches the original's own default.
const EPOCH_SIGNAL: libc::c_int = libc::SIGALRM;

/// Blocks the new-epoch signal source for the calling thread (spec §4.5
/// step 1, §5 "Signal safety").
pub fn block_new_epoch() {
    signal_mask(libc::SIG_BLOCK);
}

/// Unblocks the new-epoch signal source (spec §4.5 step 10).
pub fn unblock_new_epoch() {
    signal_mask(libc::SIG_UNBLOCK);
}

fn signal_mask(how: libc::c_int) {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, EPOCH_SIGNAL);
        libc::pthread_sigmask(how, &set, std::ptr::null_mut());
    }
}

/// A monotonic microsecond clock (spec §6), used for statistics and the
/// min-epoch-duration gate. Distinct from [`crate::clock::now_cycles`],
/// which is a raw cycle count, not wall time.
pub fn monotonic_time_us() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    ts.tv_sec as u64 * 1_000_000 + ts.tv_nsec as u64 / 1_000
}
