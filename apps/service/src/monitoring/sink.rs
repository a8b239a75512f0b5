use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::registry::DeviceRegistry;
use super::types::{DeviceStatus, ProbeOutcome, StatusChange};
use crate::store::{Labels, Settings};

/// Receives status transitions for display.
///
/// Called on the coordinating task, so implementations should return quickly.
pub trait StatusListener: Send + Sync {
    fn on_status_changed(&self, change: &StatusChange);

    /// The persisted document could not be written
    fn on_store_error(&self, _message: &str) {}

    /// Display settings were loaded or changed
    fn on_settings_changed(&self, _settings: &Settings) {}

    /// Table headings were loaded or changed
    fn on_labels_changed(&self, _labels: &Labels) {}
}

/// Listener that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl StatusListener for NoopListener {
    fn on_status_changed(&self, _change: &StatusChange) {}
}

/// Applies status changes to the registry and tells the listener about them
#[derive(Clone)]
pub struct StatusSink {
    listener: Arc<dyn StatusListener>,
}

impl StatusSink {
    pub fn new(listener: Arc<dyn StatusListener>) -> Self {
        Self { listener }
    }

    pub fn listener(&self) -> &Arc<dyn StatusListener> {
        &self.listener
    }

    /// Scheduler picked this device; its result is now pending
    pub fn mark_probing(&self, registry: &mut DeviceRegistry, id: &str) -> Option<StatusChange> {
        self.transition(registry, id, DeviceStatus::Probing)
    }

    /// Apply a delivered probe result.
    ///
    /// Results for ids no longer in the registry, or re-added since the probe
    /// was submitted, are dropped and `None` is returned.
    pub fn apply(
        &self,
        registry: &mut DeviceRegistry,
        outcome: ProbeOutcome,
        at: DateTime<Utc>,
    ) -> Option<StatusChange> {
        if !registry.is_current(&outcome.id, outcome.generation) {
            debug!(id = %outcome.id, generation = outcome.generation, "Dropping stale probe result for removed device");
            return None;
        }

        let change = self.transition(registry, &outcome.id, DeviceStatus::from_reachable(outcome.reachable))?;
        registry.mark_checked(&outcome.id, at);
        Some(change)
    }

    fn transition(
        &self,
        registry: &mut DeviceRegistry,
        id: &str,
        status: DeviceStatus,
    ) -> Option<StatusChange> {
        let previous = registry.set_status(id, status)?;
        let device = registry.get(id)?;

        let change = StatusChange {
            id: device.id.clone(),
            previous,
            current: status,
            address: device.address.clone(),
            display_group: device.display_group,
        };

        self.listener.on_status_changed(&change);
        Some(change)
    }
}
