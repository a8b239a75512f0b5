//! The persisted device document.
//!
//! One JSON file holds the device list, the two table labels and the
//! display settings. It is read once at startup and rewritten in full after
//! every change.

use std::path::{Path, PathBuf};
use std::{fs, io};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::monitoring::registry::{DeviceRegistry, RegistryError};
use crate::monitoring::types::DisplayGroup;

/// Default document location, relative to the working directory
pub const DEFAULT_DATA_FILE: &str = "device_data.json";

/// Shown in place of an address when `hide_ip` is on
pub const HIDDEN_ADDRESS: &str = "*******";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Headings of the two device tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Labels {
    pub label_tree1: String,
    pub label_tree2: String,
}

impl Default for Labels {
    fn default() -> Self {
        Self { label_tree1: "Table 1".into(), label_tree2: "Table 2".into() }
    }
}

impl Labels {
    pub fn get(&self, group: DisplayGroup) -> &str {
        match group {
            DisplayGroup::Primary => &self.label_tree1,
            DisplayGroup::Secondary => &self.label_tree2,
        }
    }

    pub fn set(&mut self, group: DisplayGroup, text: impl Into<String>) {
        match group {
            DisplayGroup::Primary => self.label_tree1 = text.into(),
            DisplayGroup::Secondary => self.label_tree2 = text.into(),
        }
    }
}

/// Display settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub title: String,
    pub text_size: u32,
    pub hide_ip: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self { title: "Device Monitor Application".into(), text_size: 15, hide_ip: false }
    }
}

impl Settings {
    /// Address as it should be shown to the user
    pub fn display_address<'a>(&self, address: &'a str) -> &'a str {
        if self.hide_ip { HIDDEN_ADDRESS } else { address }
    }
}

/// A device as stored on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDevice {
    pub id: String,
    pub address: String,
    pub display_group: DisplayGroup,
}

/// In-memory form of the whole document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    /// Insertion order, kept across save and reload
    pub devices: Vec<StoredDevice>,
    pub labels: Labels,
    pub settings: Settings,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawDocument {
    /// Key order is file order (serde_json `preserve_order`)
    #[serde(default)]
    devices: Map<String, Value>,
    #[serde(default)]
    labels: Labels,
    #[serde(default)]
    settings: Settings,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawDevice {
    #[serde(default, alias = "address", skip_serializing_if = "Option::is_none")]
    ip: Option<String>,
    #[serde(default, alias = "displayGroup", skip_serializing_if = "Option::is_none")]
    table: Option<String>,
}

impl Document {
    /// Read the document at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            debug!("No device document at {}, starting empty", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .map_err(|source| StoreError::Read { path: path.to_path_buf(), source })?;
        let raw: RawDocument = serde_json::from_str(&raw)
            .map_err(|source| StoreError::Parse { path: path.to_path_buf(), source })?;

        Ok(Self::from_raw(raw))
    }

    /// Like [`Document::load`], but any failure is logged and the defaults
    /// are used instead.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!("{}; starting with an empty device list", e);
            Self::default()
        })
    }

    /// Overwrite the file at `path` with this document
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(&self.to_raw()?)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| StoreError::Write { path: path.to_path_buf(), source })?;
        }

        fs::write(path, contents).map_err(|source| StoreError::Write { path: path.to_path_buf(), source })
    }

    /// Replace the device list with the registry's current contents
    pub fn sync_devices(&mut self, registry: &DeviceRegistry) {
        self.devices = registry
            .iter()
            .map(|d| StoredDevice {
                id: d.id.clone(),
                address: d.address.clone(),
                display_group: d.display_group,
            })
            .collect();
    }

    pub fn device(&self, id: &str) -> Option<&StoredDevice> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// Append a device entry. Existing ids are rejected.
    pub fn add_device(
        &mut self,
        id: impl Into<String>,
        address: impl Into<String>,
        display_group: DisplayGroup,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        if self.device(&id).is_some() {
            return Err(RegistryError::DuplicateId(id));
        }

        self.devices.push(StoredDevice { id, address: address.into(), display_group });
        Ok(())
    }

    pub fn remove_device(&mut self, id: &str) -> bool {
        let before = self.devices.len();
        self.devices.retain(|d| d.id != id);
        self.devices.len() != before
    }

    fn from_raw(raw: RawDocument) -> Self {
        let devices = raw
            .devices
            .into_iter()
            .filter_map(|(id, value)| {
                let entry = match serde_json::from_value::<RawDevice>(value) {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(id = %id, "Skipping malformed stored device: {}", e);
                        return None;
                    }
                };
                Some((id, entry))
            })
            .filter_map(|(id, entry)| match entry.ip {
                Some(address) => Some(StoredDevice {
                    id,
                    address,
                    display_group: entry.table.as_deref().map(DisplayGroup::from_tag).unwrap_or_default(),
                }),
                None => {
                    warn!(id = %id, "Skipping stored device without an address");
                    None
                }
            })
            .collect();

        Self { devices, labels: raw.labels, settings: raw.settings }
    }

    fn to_raw(&self) -> Result<RawDocument, StoreError> {
        let mut devices = Map::new();
        for d in &self.devices {
            let entry = RawDevice {
                ip: Some(d.address.clone()),
                table: Some(d.display_group.as_tag().to_string()),
            };
            devices.insert(d.id.clone(), serde_json::to_value(entry)?);
        }

        Ok(RawDocument { devices, labels: self.labels.clone(), settings: self.settings.clone() })
    }
}
