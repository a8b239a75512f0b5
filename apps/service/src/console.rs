//! Terminal front end: turns status transitions into log lines.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use crate::monitoring::sink::StatusListener;
use crate::monitoring::types::{DeviceStatus, DisplayGroup, StatusChange};
use crate::store::{Document, HIDDEN_ADDRESS, Labels, Settings};

/// Logs every transition, hiding addresses when the settings say so
#[derive(Default)]
pub struct ConsoleListener {
    hide_ip: AtomicBool,
    labels: Mutex<Labels>,
    /// Last Online/Offline seen per device; every result follows a Probing
    /// transition, so `StatusChange::previous` can't tell a flip from a repeat
    settled: Mutex<HashMap<String, DeviceStatus>>,
}

impl ConsoleListener {
    pub fn new(labels: Labels) -> Arc<Self> {
        Arc::new(Self {
            hide_ip: AtomicBool::new(false),
            labels: Mutex::new(labels),
            settled: Mutex::new(HashMap::new()),
        })
    }

    /// Address as it should appear on screen
    pub fn display_address<'a>(&self, address: &'a str) -> &'a str {
        if self.hide_ip.load(Ordering::Relaxed) { HIDDEN_ADDRESS } else { address }
    }

    fn table_label(&self, change: &StatusChange) -> String {
        self.labels
            .lock()
            .map(|labels| labels.get(change.display_group).to_string())
            .unwrap_or_else(|_| change.display_group.to_string())
    }

    /// Remember a settled result. True if it differs from the last one.
    fn record_settled(&self, id: &str, status: DeviceStatus) -> bool {
        match self.settled.lock() {
            Ok(mut settled) => settled.insert(id.to_string(), status) != Some(status),
            Err(_) => true,
        }
    }
}

impl StatusListener for ConsoleListener {
    fn on_status_changed(&self, change: &StatusChange) {
        let address = self.display_address(&change.address);
        let table = self.table_label(change);

        match change.current {
            // too chatty for info, one per tick
            DeviceStatus::Unknown | DeviceStatus::Probing => {
                debug!(table = %table, "{} ({}) is {}", change.id, address, change.current)
            }
            status if !self.record_settled(&change.id, status) => {
                debug!(table = %table, "{} ({}) still {}", change.id, address, status)
            }
            DeviceStatus::Online => info!(table = %table, "{} ({}) is Online", change.id, address),
            DeviceStatus::Offline => warn!(table = %table, "{} ({}) is Offline", change.id, address),
        }
    }

    fn on_store_error(&self, message: &str) {
        error!("Changes not saved: {}", message);
    }

    fn on_settings_changed(&self, settings: &Settings) {
        self.hide_ip.store(settings.hide_ip, Ordering::Relaxed);
    }

    fn on_labels_changed(&self, labels: &Labels) {
        if let Ok(mut current) = self.labels.lock() {
            *current = labels.clone();
        }
    }
}

/// Render the stored devices as a plain table, one group after the other
pub fn render_devices(document: &Document) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", document.settings.title));

    for group in [DisplayGroup::Primary, DisplayGroup::Secondary] {
        out.push_str(&format!("\n{} [{}]\n", document.labels.get(group), group));
        let mut serial = 0;
        for device in document.devices.iter().filter(|d| d.display_group == group) {
            serial += 1;
            let address = document.settings.display_address(&device.address);
            out.push_str(&format!("  {:>3}  {:<24} {}\n", serial, device.id, address));
        }
        if serial == 0 {
            out.push_str("  (no devices)\n");
        }
    }

    out
}
