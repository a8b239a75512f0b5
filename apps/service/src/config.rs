use std::time::Duration;
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitoring::checker::ProbeKind;
use crate::monitoring::executor::{DEFAULT_POOL_SIZE, ExecutorSettings};
use crate::store::DEFAULT_DATA_FILE;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read config: {0}")]
    ReadFailed(#[source] std::io::Error),
    #[error("Failed to write config: {0}")]
    WriteFailed(#[source] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("No config directory available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub probe: ProbeConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Time between ticks
    pub cadence_ms: u64,
    /// Concurrent probes
    pub pool_size: usize,
    /// Timeout passed to the prober
    pub probe_timeout_secs: u64,
    /// Executor-side hard deadline per probe, off unless set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_deadline_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub kind: ProbeKind,
    /// Port used by the tcp prober when the address has none
    pub tcp_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_file: path::PathBuf,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cadence_ms: 1000,
            pool_size: DEFAULT_POOL_SIZE,
            probe_timeout_secs: 1,
            probe_deadline_ms: None,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { kind: ProbeKind::Ping, tcp_port: 80 }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { data_file: DEFAULT_DATA_FILE.into() }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/nms/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("nms/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        let deadline = match self.scheduler.probe_deadline_ms {
            Some(ms) => format!("{} ms", ms),
            None => "none".to_string(),
        };
        let kind = match self.probe.kind {
            ProbeKind::Ping => "ping",
            ProbeKind::Tcp => "tcp",
        };

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Scheduler")?;
        write_1(f, "Cadence", &format!("{} ms", self.scheduler.cadence_ms))?;
        write_1(f, "Pool Size", &self.scheduler.pool_size)?;
        write_1(f, "Probe Timeout", &format!("{} s", self.scheduler.probe_timeout_secs))?;
        write_1(f, "Probe Deadline", &deadline)?;
        write_title_1(f, "Probe")?;
        write_1(f, "Kind", &kind)?;
        write_1(f, "TCP Port", &self.probe.tcp_port)?;
        write_title_1(f, "Store")?;
        write_1(f, "Data File", &self.store.data_file.display())?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/nms/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust,ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(Error::ReadFailed)?;
            toml::from_str::<Self>(raw_string.as_str())?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::WriteFailed)?;
        }

        std::fs::write(path, config_str).map_err(Error::WriteFailed)
    }

    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        const MIN_TIMEOUT: u64 = 1;
        const MAX_TIMEOUT: u64 = 300; // 5 minutes

        if self.scheduler.cadence_ms == 0 {
            return Err(Error::Invalid("scheduler.cadence_ms must be at least 1".into()));
        }
        if self.scheduler.pool_size == 0 {
            return Err(Error::Invalid("scheduler.pool_size must be at least 1".into()));
        }
        if !(MIN_TIMEOUT..=MAX_TIMEOUT).contains(&self.scheduler.probe_timeout_secs) {
            return Err(Error::Invalid(format!(
                "scheduler.probe_timeout_secs must be between {} and {}",
                MIN_TIMEOUT, MAX_TIMEOUT
            )));
        }
        if self.scheduler.probe_deadline_ms == Some(0) {
            return Err(Error::Invalid("scheduler.probe_deadline_ms must be at least 1".into()));
        }
        Ok(())
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.scheduler.cadence_ms)
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            pool_size: self.scheduler.pool_size,
            probe_timeout: Duration::from_secs(self.scheduler.probe_timeout_secs),
            deadline: self.scheduler.probe_deadline_ms.map(Duration::from_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_config_is_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config");

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.toml").exists());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scheduler]\ncadence_ms = 250\n\n[probe]\nkind = \"tcp\"\n").unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.cadence(), Duration::from_millis(250));
        assert_eq!(config.scheduler.pool_size, 10);
        assert_eq!(config.probe.kind, ProbeKind::Tcp);
        assert_eq!(config.store.data_file, path::PathBuf::from("device_data.json"));
    }

    #[test]
    fn test_rejects_zero_pool() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scheduler]\npool_size = 0\n").unwrap();

        assert!(matches!(Config::from_config(Some(&path)), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_executor_settings() {
        let mut config = Config::default();
        config.scheduler.probe_deadline_ms = Some(1500);

        let settings = config.executor_settings();
        assert_eq!(settings.pool_size, 10);
        assert_eq!(settings.probe_timeout, Duration::from_secs(1));
        assert_eq!(settings.deadline, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_write_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nms.toml");

        let mut config = Config::default();
        config.scheduler.probe_deadline_ms = Some(2000);
        config.probe.tcp_port = 22;
        config.write_config(&path).unwrap();

        assert_eq!(Config::from_config(Some(&path)).unwrap(), config);
    }
}
