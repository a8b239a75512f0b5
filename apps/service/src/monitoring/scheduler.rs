use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::executor::ProbeSubmitter;
use super::registry::{DeviceRegistry, RegistryError};
use super::sink::StatusSink;
use super::types::{DisplayGroup, ProbeOutcome, StatusChange};

/// Default time between two ticks
pub const DEFAULT_CADENCE: Duration = Duration::from_millis(1000);

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A device was marked probing and handed to the executor
    Probed {
        id: String,
        /// Measured from the start of this tick, not from probe completion
        next_tick: Instant,
    },
    /// Nothing to probe. No further ticks until a device is added.
    Idle,
}

/// Round-robin health-check scheduler.
///
/// Owns the registry. The cycle walks a snapshot of the registry ids taken
/// when the previous snapshot ran out, so a device added mid-cycle waits at
/// most one full cycle before its first probe. Ids removed since the
/// snapshot are skipped without using up a tick.
pub struct Scheduler {
    registry: DeviceRegistry,
    cycle: Vec<String>,
    cursor: usize,
    cadence: Duration,
    submitter: Arc<dyn ProbeSubmitter>,
    sink: StatusSink,
    idle: bool,
}

impl Scheduler {
    /// Create a scheduler over an empty registry
    pub fn new(submitter: Arc<dyn ProbeSubmitter>, sink: StatusSink, cadence: Duration) -> Self {
        Self {
            registry: DeviceRegistry::new(),
            cycle: Vec::new(),
            cursor: 0,
            cadence,
            submitter,
            sink,
            idle: true,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    /// True when the last tick found nothing to do (or no tick ran yet and
    /// there is nothing to do)
    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// Ids still to be visited in the current cycle
    pub fn remaining_in_cycle(&self) -> &[String] {
        self.cycle.get(self.cursor..).unwrap_or_default()
    }

    /// Add a device.
    ///
    /// Returns `true` if the scheduler was idle and now needs a tick; the
    /// caller arms its timer only in that case.
    pub fn add_device(
        &mut self,
        id: impl Into<String>,
        address: impl Into<String>,
        display_group: DisplayGroup,
    ) -> Result<bool, RegistryError> {
        let device = self.registry.add(id, address, display_group)?;
        debug!(id = %device.id, address = %device.address, group = %device.display_group, "Device added");

        let wake = self.idle;
        self.idle = false;
        Ok(wake)
    }

    /// Remove a device. Any probe already in flight for it still completes;
    /// its result is dropped on delivery.
    pub fn remove_device(&mut self, id: &str) -> bool {
        let removed = self.registry.remove(id);
        if removed {
            debug!(id = %id, "Device removed");
        }
        removed
    }

    /// Run one tick at `now`
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if self.registry.is_empty() {
            self.cycle.clear();
            self.cursor = 0;
            if !self.idle {
                info!("No devices to monitor, scheduler going idle");
            }
            self.idle = true;
            return TickOutcome::Idle;
        }

        loop {
            if self.cursor >= self.cycle.len() {
                self.rearm();
                if self.cycle.is_empty() {
                    self.idle = true;
                    return TickOutcome::Idle;
                }
            }

            let id = self.cycle[self.cursor].clone();
            self.cursor += 1;

            let Some(device) = self.registry.get(&id) else {
                debug!(id = %id, "Skipping device removed since the cycle snapshot");
                continue;
            };
            let address = device.address.clone();
            let generation = device.generation;

            self.sink.mark_probing(&mut self.registry, &id);
            self.submitter.submit(id.clone(), generation, address);
            self.idle = false;

            return TickOutcome::Probed { id, next_tick: now + self.cadence };
        }
    }

    /// Apply a delivered probe result. Stale results return `None`.
    pub fn apply_outcome(&mut self, outcome: ProbeOutcome, at: DateTime<Utc>) -> Option<StatusChange> {
        self.sink.apply(&mut self.registry, outcome, at)
    }

    pub fn sink(&self) -> &StatusSink {
        &self.sink
    }

    fn rearm(&mut self) {
        self.cycle = self.registry.snapshot();
        self.cursor = 0;
        debug!(devices = self.cycle.len(), "Cycle re-armed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::sink::NoopListener;
    use crate::monitoring::types::DeviceStatus;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSubmitter {
        submitted: Mutex<Vec<(String, String)>>,
    }

    impl ProbeSubmitter for RecordingSubmitter {
        fn submit(&self, id: String, _generation: u64, address: String) {
            self.submitted.lock().unwrap().push((id, address));
        }
    }

    impl RecordingSubmitter {
        fn ids(&self) -> Vec<String> {
            self.submitted.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
        }
    }

    fn scheduler() -> (Scheduler, Arc<RecordingSubmitter>) {
        let submitter = Arc::new(RecordingSubmitter::default());
        let scheduler = Scheduler::new(
            submitter.clone(),
            StatusSink::new(Arc::new(NoopListener)),
            DEFAULT_CADENCE,
        );
        (scheduler, submitter)
    }

    #[test]
    fn test_each_device_once_per_cycle() {
        let (mut scheduler, submitter) = scheduler();
        for (id, addr) in [("A", "1.1.1.1"), ("B", "2.2.2.2"), ("C", "3.3.3.3"), ("D", "4.4.4.4")] {
            scheduler.add_device(id, addr, DisplayGroup::Primary).unwrap();
        }

        let now = Instant::now();
        for _ in 0..4 {
            scheduler.tick(now);
        }

        let mut ids = submitter.ids();
        ids.sort();
        assert_eq!(ids, vec!["A", "B", "C", "D"]);

        // next cycle starts over in insertion order
        scheduler.tick(now);
        assert_eq!(submitter.ids().last().unwrap(), "A");
    }

    #[test]
    fn test_next_tick_measured_from_tick_start() {
        let (mut scheduler, _) = scheduler();
        scheduler.add_device("A", "1.1.1.1", DisplayGroup::Primary).unwrap();

        let start = Instant::now();
        match scheduler.tick(start) {
            TickOutcome::Probed { id, next_tick } => {
                assert_eq!(id, "A");
                assert_eq!(next_tick, start + DEFAULT_CADENCE);
            }
            TickOutcome::Idle => panic!("expected a probe"),
        }
    }

    #[test]
    fn test_marks_selected_device_probing() {
        let (mut scheduler, submitter) = scheduler();
        scheduler.add_device("A", "1.1.1.1", DisplayGroup::Primary).unwrap();
        scheduler.add_device("B", "2.2.2.2", DisplayGroup::Secondary).unwrap();

        scheduler.tick(Instant::now());

        assert_eq!(scheduler.registry().get("A").unwrap().status, DeviceStatus::Probing);
        assert_eq!(scheduler.registry().get("B").unwrap().status, DeviceStatus::Unknown);
        assert_eq!(
            submitter.submitted.lock().unwrap().as_slice(),
            &[("A".to_string(), "1.1.1.1".to_string())]
        );
    }

    #[test]
    fn test_removed_device_skipped_without_losing_tick() {
        let (mut scheduler, submitter) = scheduler();
        scheduler.add_device("A", "1.1.1.1", DisplayGroup::Primary).unwrap();
        scheduler.add_device("B", "2.2.2.2", DisplayGroup::Primary).unwrap();
        scheduler.add_device("C", "3.3.3.3", DisplayGroup::Primary).unwrap();

        let now = Instant::now();
        scheduler.tick(now);
        scheduler.remove_device("B");
        scheduler.tick(now);

        assert_eq!(submitter.ids(), vec!["A", "C"]);
    }

    #[test]
    fn test_device_added_mid_cycle_waits_for_rearm() {
        let (mut scheduler, submitter) = scheduler();
        scheduler.add_device("A", "1.1.1.1", DisplayGroup::Primary).unwrap();
        scheduler.add_device("B", "2.2.2.2", DisplayGroup::Primary).unwrap();

        let now = Instant::now();
        scheduler.tick(now);
        scheduler.add_device("C", "3.3.3.3", DisplayGroup::Primary).unwrap();
        assert_eq!(scheduler.remaining_in_cycle(), &["B".to_string()]);

        scheduler.tick(now);
        scheduler.tick(now);
        scheduler.tick(now);
        scheduler.tick(now);

        assert_eq!(submitter.ids(), vec!["A", "B", "A", "B", "C"]);
    }

    #[test]
    fn test_idle_when_empty() {
        let (mut scheduler, submitter) = scheduler();
        assert!(scheduler.is_idle());

        for _ in 0..5 {
            assert_eq!(scheduler.tick(Instant::now()), TickOutcome::Idle);
        }
        assert!(submitter.ids().is_empty());

        assert!(scheduler.add_device("A", "1.1.1.1", DisplayGroup::Primary).unwrap());
        // already awake, second add must not ask for another timer
        assert!(!scheduler.add_device("B", "2.2.2.2", DisplayGroup::Primary).unwrap());
    }

    #[test]
    fn test_goes_idle_after_last_removal() {
        let (mut scheduler, _) = scheduler();
        scheduler.add_device("A", "1.1.1.1", DisplayGroup::Primary).unwrap();
        scheduler.tick(Instant::now());
        scheduler.remove_device("A");

        assert_eq!(scheduler.tick(Instant::now()), TickOutcome::Idle);
        assert!(scheduler.is_idle());
        assert!(scheduler.add_device("A", "1.1.1.1", DisplayGroup::Primary).unwrap());
    }

    #[test]
    fn test_duplicate_add_does_not_wake() {
        let (mut scheduler, _) = scheduler();
        scheduler.add_device("A", "1.1.1.1", DisplayGroup::Primary).unwrap();
        let err = scheduler.add_device("A", "9.9.9.9", DisplayGroup::Primary).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateId("A".into()));
        assert_eq!(scheduler.registry().get("A").unwrap().address, "1.1.1.1");
    }
}
