//! Library-based backend: a small, fixed set of portable events looked up
//! by string name (spec §4.2 "Library-based"), the way a general
//! performance-counter library (PAPI, `perf stat`) exposes counters rather
//! than raw MSR encodings.

use super::{sys, PmcBackend, PmcHandle, MAX_COUNTERS};
use crate::error::PmcError;
use std::os::unix::io::RawFd;

/// The kernel's own generic hardware event enumeration
/// (`PERF_COUNT_HW_*`), which is as close as Linux gets to a portable,
/// string-addressable counter library without depending on PAPI itself.
fn generic_event_config(name: &str) -> Option<u64> {
    match name {
        "CPU_CYCLES" => Some(0),
        "INSTRUCTIONS" => Some(1),
        "CACHE_REFERENCES" => Some(2),
        "CACHE_MISSES" => Some(3),
        "STALLED_CYCLES_FRONTEND" => Some(7),
        "STALLED_CYCLES_BACKEND" => Some(8),
        _ => None,
    }
}

struct Slot {
    name: String,
    fd: RawFd,
    last_value: u64,
}

/// Backend that accepts the string names in [`generic_event_config`].
#[derive(Default)]
pub struct LibraryPmc {
    slots: Vec<Slot>,
}

impl LibraryPmc {
    pub fn new() -> LibraryPmc {
        LibraryPmc::default()
    }
}

impl PmcBackend for LibraryPmc {
    fn program(&mut self, event_name: &str) -> Result<PmcHandle, PmcError> {
        if self.slots.len() >= MAX_COUNTERS {
            return Err(PmcError::CountersExhausted(MAX_COUNTERS));
        }
        let config =
            generic_event_config(event_name).ok_or_else(|| PmcError::NoSuchEvent(event_name.to_owned()))?;

        let fd = sys::open_hardware(config).map_err(|e| PmcError::Io(e.to_string()))?;
        sys::reset(fd).map_err(|e| PmcError::Io(e.to_string()))?;
        sys::enable(fd).map_err(|e| PmcError::Io(e.to_string()))?;

        let handle = PmcHandle(self.slots.len());
        self.slots.push(Slot {
            name: event_name.to_owned(),
            fd,
            last_value: 0,
        });
        Ok(handle)
    }

    fn read_delta(&mut self, handle: PmcHandle) -> Result<u64, PmcError> {
        let slot = self
            .slots
            .get_mut(handle.0)
            .ok_or_else(|| PmcError::NoSuchEvent(format!("slot {}", handle.0)))?;
        match sys::read_count(slot.fd) {
            Ok(value) => {
                let delta = value.wrapping_sub(slot.last_value);
                slot.last_value = value;
                Ok(delta)
            }
            Err(e) => {
                tracing::debug!(event = %slot.name, error = %e, "PMC read failed");
                Err(PmcError::Io(e.to_string()))
            }
        }
    }

    fn read_all(&mut self) -> [u64; MAX_COUNTERS] {
        let mut out = [0u64; MAX_COUNTERS];
        for i in 0..self.slots.len().min(MAX_COUNTERS) {
            out[i] = self.read_delta(PmcHandle(i)).unwrap_or(0);
        }
        out
    }

    fn enable(&mut self) {
        for slot in &self.slots {
            let _ = sys::enable(slot.fd);
        }
    }

    fn disable(&mut self) {
        for slot in &self.slots {
            let _ = sys::disable(slot.fd);
        }
    }
}

impl Drop for LibraryPmc {
    fn drop(&mut self) {
        for slot in &self.slots {
            sys::close(slot.fd);
        }
    }
}
