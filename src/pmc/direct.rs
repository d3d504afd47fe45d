//! Direct backend: model-specific register programming via raw,
//! vendor-encoded event configs (spec §4.2 "Direct").
//!
//! Event codes come from [`crate::cpu::MicroarchDescriptor::event_set`] as
//! opaque 32-bit encodings (umask:event pairs packed the way Intel's
//! `IA32_PERFEVTSELx` MSRs expect them); the kernel's `perf_event_open`
//! with `PERF_TYPE_RAW` is the portable, unprivileged way to get the
//! kernel's PMU driver to program that exact encoding on our behalf.

use super::{sys, PmcBackend, PmcHandle, MAX_COUNTERS};
use crate::error::PmcError;
use std::os::unix::io::RawFd;

struct Slot {
    name: String,
    fd: RawFd,
    last_value: u64,
}

/// Maps event names to their raw 32-bit encodings. The direct backend only
/// knows the events a [`crate::cpu::MicroarchDescriptor`] actually names,
/// so this is built from that descriptor rather than hardcoded here.
pub struct DirectPmc {
    known_events: Vec<(&'static str, u32)>,
    slots: Vec<Slot>,
}

impl DirectPmc {
    /// Builds a backend that can program exactly the events in `event_set`,
    /// using `encode` to turn each event name into its raw MSR-style
    /// encoding.
    pub fn new(event_set: &[&'static str], encode: impl Fn(&str) -> Option<u32>) -> DirectPmc {
        let known_events = event_set
            .iter()
            .filter_map(|&name| encode(name).map(|code| (name, code)))
            .collect();
        DirectPmc {
            known_events,
            slots: Vec::new(),
        }
    }
}

impl PmcBackend for DirectPmc {
    fn program(&mut self, event_name: &str) -> Result<PmcHandle, PmcError> {
        if self.slots.len() >= MAX_COUNTERS {
            return Err(PmcError::CountersExhausted(MAX_COUNTERS));
        }
        let &(_, code) = self
            .known_events
            .iter()
            .find(|(name, _)| *name == event_name)
            .ok_or_else(|| PmcError::NoSuchEvent(event_name.to_owned()))?;

        let fd = sys::open_raw(code as u64).map_err(|e| PmcError::Io(e.to_string()))?;
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
                tracing::error!(event = %slot.name, error = %e, "PMC read failed");
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

impl Drop for DirectPmc {
    fn drop(&mut self) {
        for slot in &self.slots {
            sys::close(slot.fd);
        }
    }
}
