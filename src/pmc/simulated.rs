//! Simulated backend: deterministic, in-process counters driven by
//! test-supplied values (spec §4.2, third backend). Not a production
//! backend — it exists so the rest of the engine is exercisable on hosts
//! without `perf_event_open` access or Intel hardware, and so tests can
//! drive exact counter-delta sequences without real hardware jitter.

use super::{PmcBackend, PmcHandle, MAX_COUNTERS};
use crate::error::PmcError;

#[derive(Default)]
struct Slot {
    name: String,
    /// Queue of deltas to hand out, one per `read_delta` call; once
    /// drained, further reads return 0.
    queued_deltas: std::collections::VecDeque<u64>,
}

/// In-process fake satisfying [`PmcBackend`]. Construct with
/// [`SimulatedPmc::new`], `program` the events under test, then
/// [`SimulatedPmc::push_delta`] the values each `read_delta`/`read_all`
/// should hand back next.
#[derive(Default)]
pub struct SimulatedPmc {
    slots: Vec<Slot>,
    known_events: Vec<&'static str>,
}

impl SimulatedPmc {
    /// Events this simulated backend will accept from `program`.
    pub fn new(known_events: &[&'static str]) -> SimulatedPmc {
        SimulatedPmc {
            slots: Vec::new(),
            known_events: known_events.to_vec(),
        }
    }

    /// Queues the next delta `read_delta`/`read_all` will return for the
    /// slot programmed with `event_name`.
    pub fn push_delta(&mut self, event_name: &str, delta: u64) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.name == event_name) {
            slot.queued_deltas.push_back(delta);
        }
    }
}

impl PmcBackend for SimulatedPmc {
    fn program(&mut self, event_name: &str) -> Result<PmcHandle, PmcError> {
        if self.slots.len() >= MAX_COUNTERS {
            return Err(PmcError::CountersExhausted(MAX_COUNTERS));
        }
        if !self.known_events.contains(&event_name) {
            return Err(PmcError::NoSuchEvent(event_name.to_owned()));
        }
        let handle = PmcHandle(self.slots.len());
        self.slots.push(Slot {
            name: event_name.to_owned(),
            queued_deltas: Default::default(),
        });
        Ok(handle)
    }

    fn read_delta(&mut self, handle: PmcHandle) -> Result<u64, PmcError> {
        let slot = self
            .slots
            .get_mut(handle.0)
            .ok_or_else(|| PmcError::NoSuchEvent(format!("slot {}", handle.0)))?;
        Ok(slot.queued_deltas.pop_front().unwrap_or(0))
    }

    fn read_all(&mut self) -> [u64; MAX_COUNTERS] {
        let mut out = [0u64; MAX_COUNTERS];
        for i in 0..self.slots.len().min(MAX_COUNTERS) {
            out[i] = self.read_delta(PmcHandle(i)).unwrap_or(0);
        }
        out
    }

    fn enable(&mut self) {}
    fn disable(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_event() {
        let mut pmc = SimulatedPmc::new(&["LDM_STALL_CYCLES"]);
        assert!(matches!(
            pmc.program("NOT_AN_EVENT"),
            Err(PmcError::NoSuchEvent(_))
        ));
    }

    #[test]
    fn exhausts_after_max_counters() {
        let events = ["A", "B", "C", "D"];
        let mut pmc = SimulatedPmc::new(&events);
        for e in &events {
            pmc.program(e).unwrap();
        }
        assert!(matches!(
            pmc.program("A"),
            Err(PmcError::CountersExhausted(MAX_COUNTERS))
        ));
    }

    #[test]
    fn read_delta_drains_queue_then_zero() {
        let mut pmc = SimulatedPmc::new(&["X"]);
        let h = pmc.program("X").unwrap();
        pmc.push_delta("X", 42);
        assert_eq!(pmc.read_delta(h).unwrap(), 42);
        assert_eq!(pmc.read_delta(h).unwrap(), 0);
    }
}
