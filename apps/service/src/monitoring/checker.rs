use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::process::{Command, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of reachability probe to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// One ICMP echo through the system `ping` utility
    #[default]
    Ping,
    /// TCP connect to a fixed port
    Tcp,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Refusing to probe address '{0}'")]
    InvalidAddress(String),

    #[error("Failed to run ping: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Could not resolve '{address}': {source}")]
    Resolve {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Probe did not finish within {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Probe worker panicked")]
    Panicked,

    #[error("Probe worker was cancelled")]
    Cancelled,
}

/// A single blocking reachability check.
///
/// Implementations are expected to return within roughly `timeout`; the
/// executor runs them on the blocking pool so they may sleep or wait on I/O.
pub trait Prober: Send + Sync {
    fn probe(&self, address: &str, timeout: Duration) -> Result<bool, ProbeError>;
}

impl<F> Prober for F
where
    F: Fn(&str, Duration) -> Result<bool, ProbeError> + Send + Sync,
{
    fn probe(&self, address: &str, timeout: Duration) -> Result<bool, ProbeError> {
        self(address, timeout)
    }
}

/// Addresses starting with '-' would be read by `ping` as flags
fn check_address(address: &str) -> Result<&str, ProbeError> {
    let trimmed = address.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') {
        return Err(ProbeError::InvalidAddress(address.to_string()));
    }
    Ok(trimmed)
}

/// Sends one echo request with the operating system's `ping`
#[derive(Debug, Default, Clone, Copy)]
pub struct PingProber;

impl PingProber {
    pub fn new() -> Self {
        Self
    }

    fn command(address: &str, timeout: Duration) -> Command {
        let mut command = Command::new("ping");

        if cfg!(target_os = "windows") {
            let millis = timeout.as_millis().max(1);
            command.args(["-n", "1", "-w", &millis.to_string()]);
        } else if cfg!(target_os = "macos") {
            let millis = timeout.as_millis().max(1);
            command.args(["-c", "1", "-W", &millis.to_string()]);
        } else {
            let secs = timeout.as_secs().max(1);
            command.args(["-c", "1", "-W", &secs.to_string()]);
        }

        command.arg(address).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
        command
    }
}

impl Prober for PingProber {
    fn probe(&self, address: &str, timeout: Duration) -> Result<bool, ProbeError> {
        let address = check_address(address)?;
        let status = Self::command(address, timeout).status().map_err(ProbeError::Spawn)?;
        Ok(status.success())
    }
}

/// Treats a completed TCP handshake as reachable.
///
/// Useful where raw ICMP is filtered or `ping` is unavailable.
#[derive(Debug, Clone, Copy)]
pub struct TcpProber {
    port: u16,
}

impl TcpProber {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

impl Prober for TcpProber {
    fn probe(&self, address: &str, timeout: Duration) -> Result<bool, ProbeError> {
        let address = check_address(address)?;
        let target = match address.parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.port).to_string(),
            Err(_) if address.contains(':') => address.to_string(),
            Err(_) => format!("{}:{}", address, self.port),
        };

        let addrs = target
            .to_socket_addrs()
            .map_err(|source| ProbeError::Resolve { address: address.to_string(), source })?;

        Ok(addrs.into_iter().any(|addr| TcpStream::connect_timeout(&addr, timeout).is_ok()))
    }
}

/// Build the prober for a configured kind
pub fn build_prober(kind: ProbeKind, tcp_port: u16) -> std::sync::Arc<dyn Prober> {
    match kind {
        ProbeKind::Ping => std::sync::Arc::new(PingProber::new()),
        ProbeKind::Tcp => std::sync::Arc::new(TcpProber::new(tcp_port)),
    }
}
