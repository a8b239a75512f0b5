//! The live set of monitored devices.
//!
//! The registry is owned by the coordinating task and mutated only there,
//! so it carries no interior locking.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{Device, DeviceStatus, DisplayGroup};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("A device with id '{0}' already exists")]
    DuplicateId(String),
}

/// Insertion-ordered mapping from device id to [`Device`]
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    order: Vec<String>,
    devices: HashMap<String, Device>,
    next_generation: u64,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device in the `Unknown` state. An existing id is never overwritten.
    pub fn add(
        &mut self,
        id: impl Into<String>,
        address: impl Into<String>,
        display_group: DisplayGroup,
    ) -> Result<&Device, RegistryError> {
        let id = id.into();
        if self.devices.contains_key(&id) {
            return Err(RegistryError::DuplicateId(id));
        }

        self.next_generation += 1;
        let device = Device { generation: self.next_generation, ..Device::new(id.clone(), address, display_group) };
        self.order.push(id.clone());
        Ok(self.devices.entry(id).or_insert(device))
    }

    /// Remove a device. In-flight probes for it are left alone; their
    /// results are dropped when they arrive.
    pub fn remove(&mut self, id: &str) -> bool {
        if self.devices.remove(id).is_none() {
            return false;
        }
        self.order.retain(|existing| existing != id);
        true
    }

    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    /// True if `id` is registered and still the same entry as `generation`
    pub fn is_current(&self, id: &str, generation: u64) -> bool {
        self.devices.get(id).is_some_and(|d| d.generation == generation)
    }

    /// Current ids in insertion order
    pub fn snapshot(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Set a device's status, returning the previous one.
    ///
    /// Returns `None` without doing anything if the id is gone.
    pub fn set_status(&mut self, id: &str, status: DeviceStatus) -> Option<DeviceStatus> {
        let device = self.devices.get_mut(id)?;
        Some(std::mem::replace(&mut device.status, status))
    }

    /// Record when a probe result was applied. No-op for unknown ids.
    pub fn mark_checked(&mut self, id: &str, at: DateTime<Utc>) {
        if let Some(device) = self.devices.get_mut(id) {
            device.last_checked_at = Some(at);
        }
    }

    /// Devices in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.order.iter().filter_map(|id| self.devices.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_id_rejected() {
        let mut registry = DeviceRegistry::new();
        registry.add("A", "1.1.1.1", DisplayGroup::Primary).unwrap();

        let err = registry.add("A", "9.9.9.9", DisplayGroup::Secondary).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateId("A".to_string()));

        let device = registry.get("A").unwrap();
        assert_eq!(device.address, "1.1.1.1");
        assert_eq!(device.display_group, DisplayGroup::Primary);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_keeps_insertion_order() {
        let mut registry = DeviceRegistry::new();
        registry.add("zeta", "10.0.0.3", DisplayGroup::Primary).unwrap();
        registry.add("alpha", "10.0.0.1", DisplayGroup::Primary).unwrap();
        registry.add("mid", "10.0.0.2", DisplayGroup::Secondary).unwrap();

        assert_eq!(registry.snapshot(), vec!["zeta", "alpha", "mid"]);

        assert!(registry.remove("alpha"));
        assert_eq!(registry.snapshot(), vec!["zeta", "mid"]);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut registry = DeviceRegistry::new();
        registry.add("A", "1.1.1.1", DisplayGroup::Primary).unwrap();

        assert!(!registry.remove("B"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_set_status_ignores_removed_device() {
        let mut registry = DeviceRegistry::new();
        registry.add("A", "1.1.1.1", DisplayGroup::Primary).unwrap();
        registry.remove("A");

        assert_eq!(registry.set_status("A", DeviceStatus::Online), None);
        assert!(registry.get("A").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_set_status_returns_previous() {
        let mut registry = DeviceRegistry::new();
        registry.add("A", "1.1.1.1", DisplayGroup::Primary).unwrap();

        assert_eq!(registry.set_status("A", DeviceStatus::Probing), Some(DeviceStatus::Unknown));
        assert_eq!(registry.set_status("A", DeviceStatus::Offline), Some(DeviceStatus::Probing));
        assert_eq!(registry.get("A").unwrap().status, DeviceStatus::Offline);
    }

    #[test]
    fn test_readd_after_remove() {
        let mut registry = DeviceRegistry::new();
        registry.add("A", "1.1.1.1", DisplayGroup::Primary).unwrap();
        registry.set_status("A", DeviceStatus::Online);
        registry.remove("A");

        let device = registry.add("A", "2.2.2.2", DisplayGroup::Primary).unwrap();
        assert_eq!(device.status, DeviceStatus::Unknown);
        assert_eq!(device.address, "2.2.2.2");
    }

    #[test]
    fn test_readd_gets_new_generation() {
        let mut registry = DeviceRegistry::new();
        let first = registry.add("A", "1.1.1.1", DisplayGroup::Primary).unwrap().generation;
        assert!(registry.is_current("A", first));

        registry.remove("A");
        assert!(!registry.is_current("A", first));

        let second = registry.add("A", "2.2.2.2", DisplayGroup::Primary).unwrap().generation;
        assert_ne!(first, second);
        assert!(registry.is_current("A", second));
        assert!(!registry.is_current("A", first));
    }
}
