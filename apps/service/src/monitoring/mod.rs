/// Device health-check engine
///
/// This module is responsible for:
/// - Keeping the live set of monitored devices
/// - Walking that set round-robin at a fixed cadence
/// - Running blocking reachability probes on a bounded pool
/// - Applying delivered results back onto the registry
pub mod checker;
pub mod executor;
pub mod registry;
pub mod scheduler;
pub mod sink;
pub mod types;

pub use checker::{PingProber, ProbeError, ProbeKind, Prober, TcpProber};
pub use executor::{ExecutorSettings, ProbeExecutor, ProbeSubmitter};
pub use registry::{DeviceRegistry, RegistryError};
pub use scheduler::{Scheduler, TickOutcome};
pub use sink::{NoopListener, StatusListener, StatusSink};
pub use types::{Device, DeviceStatus, DisplayGroup, ProbeOutcome, StatusChange};
