use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reachability status of a monitored device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Never probed since the device was added
    #[default]
    Unknown,
    /// Selected by the scheduler, result pending
    Probing,
    Online,
    Offline,
}

impl DeviceStatus {
    /// Status to record for a delivered probe result
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable { DeviceStatus::Online } else { DeviceStatus::Offline }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::Unknown => write!(f, "Unknown"),
            DeviceStatus::Probing => write!(f, "Probing"),
            DeviceStatus::Online => write!(f, "Online"),
            DeviceStatus::Offline => write!(f, "Offline"),
        }
    }
}

/// Which of the two dashboard tables a device is shown in.
///
/// The scheduler never looks at this; it is carried through to the store
/// and the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub enum DisplayGroup {
    #[default]
    Primary,
    Secondary,
}

impl DisplayGroup {
    /// Tag used in the persisted document
    pub fn as_tag(&self) -> &'static str {
        match self {
            DisplayGroup::Primary => "tree1",
            DisplayGroup::Secondary => "tree2",
        }
    }

    /// Parse a tag, rejecting anything unrecognised
    pub fn parse_tag(tag: &str) -> Option<Self> {
        match tag.trim() {
            "tree1" | "table1" | "primary" | "1" => Some(DisplayGroup::Primary),
            "tree2" | "table2" | "secondary" | "2" => Some(DisplayGroup::Secondary),
            _ => None,
        }
    }

    /// Parse a persisted tag. Anything unrecognised lands in the first group.
    pub fn from_tag(tag: &str) -> Self {
        Self::parse_tag(tag).unwrap_or_default()
    }
}

impl std::fmt::Display for DisplayGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// A monitored endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Unique, stable identity (the device name)
    pub id: String,

    /// Host name or IP address, passed to the prober as-is
    pub address: String,

    pub status: DeviceStatus,

    pub display_group: DisplayGroup,

    /// When the last probe result was applied
    pub last_checked_at: Option<DateTime<Utc>>,

    /// Assigned by the registry on add. A re-added id gets a new one, so
    /// results of probes started before the removal can be told apart.
    pub generation: u64,
}

impl Device {
    /// Create a device in the `Unknown` state
    pub fn new(id: impl Into<String>, address: impl Into<String>, display_group: DisplayGroup) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            status: DeviceStatus::Unknown,
            display_group,
            last_checked_at: None,
            generation: 0,
        }
    }
}

/// A finished probe, as delivered from a worker back to the coordinating task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub id: String,
    /// Generation of the device when the probe was submitted
    pub generation: u64,
    pub reachable: bool,
}

/// A status transition reported to the UI listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub id: String,
    pub previous: DeviceStatus,
    pub current: DeviceStatus,
    /// Real address. Redaction is up to the listener.
    pub address: String,
    pub display_group: DisplayGroup,
}
