//! Cycle clock (C1, spec §4.1).
//!
//! A monotonic, per-core cycle counter plus a busy-wait primitive the epoch
//! engine uses to inject delay. Both operations must be cheap and must not
//! call into the scheduler: they run on the signal-handler path.

/// Reads a monotonically non-decreasing per-core cycle count.
///
/// On x86_64 this is `RDTSCP`, which also serializes against out-of-order
/// execution so the read can't be hoisted across surrounding instructions.
/// Callers running on unsynchronized sockets must already be pinned to a
/// core; the epoch engine satisfies this by always reading on the calling
/// thread.
#[cfg(target_arch = "x86_64")]
#[inline]
pub fn now_cycles() -> u64 {
    let mut aux: u32 = 0;
    // SAFETY: RDTSCP is available on every x86_64 CPU since its introduction
    // with Nehalem; no memory is touched, only general-purpose registers.
    unsafe { core::arch::x86_64::__rdtscp(&mut aux) }
}

/// Portable fallback for non-x86_64 hosts (e.g. running the test suite on
/// CI under a different architecture). Not cycle-accurate: it reports
/// nanoseconds from a monotonic clock. Labeled explicitly as an
/// approximation per spec §4.1.
#[cfg(not(target_arch = "x86_64"))]
#[inline]
pub fn now_cycles() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, fully-initialized out parameter.
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}

/// Busy-waits until [`now_cycles`] has advanced by at least `n_cycles` from
/// the first sample taken inside this call.
///
/// Compiled to never be elided: each iteration re-reads the counter through
/// a real instruction (`RDTSCP`/`clock_gettime`), so there is nothing for
/// the optimizer to constant-fold or hoist out of the loop. Never yields or
/// sleeps — the caller may be inside a signal handler.
#[inline]
pub fn spin(n_cycles: u64) {
    if n_cycles == 0 {
        return;
    }
    let start = now_cycles();
    while now_cycles().wrapping_sub(start) < n_cycles {
        core::hint::spin_loop();
    }
}

/// `cycles / speed_mhz`, truncating integer division, as specified in §4.1.
#[inline]
pub fn cycles_to_us(speed_mhz: u64, cycles: u64) -> u64 {
    if speed_mhz == 0 {
        return 0;
    }
    cycles / speed_mhz
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spin_zero_returns_immediately() {
        let before = now_cycles();
        spin(0);
        let after = now_cycles();
        // Bounded overhead: shouldn't burn more than a fraction of a
        // millisecond worth of cycles even on a slow CI core.
        assert!(after.wrapping_sub(before) < 50_000_000);
    }

    #[test]
    fn now_cycles_is_monotonic_non_decreasing() {
        let mut last = now_cycles();
        for _ in 0..1000 {
            let next = now_cycles();
            assert!(next >= last || next.wrapping_sub(last) < u64::MAX / 2);
            last = next;
        }
    }

    #[test]
    fn cycles_to_us_truncates_and_guards_zero_speed() {
        assert_eq!(cycles_to_us(2000, 5000), 2);
        assert_eq!(cycles_to_us(0, 5000), 0);
    }
}
