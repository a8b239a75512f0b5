use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinError;
use tracing::{debug, warn};

use super::checker::{ProbeError, Prober};
use super::types::ProbeOutcome;

/// Default number of probes allowed to run at once
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Anything that accepts probe work from the scheduler without blocking
pub trait ProbeSubmitter: Send + Sync {
    /// `generation` is echoed back in the [`ProbeOutcome`]
    fn submit(&self, id: String, generation: u64, address: String);
}

/// Executor tuning
#[derive(Debug, Clone, Copy)]
pub struct ExecutorSettings {
    pub pool_size: usize,
    /// Handed to the prober; the prober enforces it
    pub probe_timeout: Duration,
    /// Optional hard deadline enforced by the executor itself
    pub deadline: Option<Duration>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self { pool_size: DEFAULT_POOL_SIZE, probe_timeout: Duration::from_secs(1), deadline: None }
    }
}

/// Bounded pool running blocking probes off the coordinating task.
///
/// Results go back over `delivery_tx` only. Workers never see a `Device`,
/// just the `(id, address)` pair they were given.
pub struct ProbeExecutor {
    prober: Arc<dyn Prober>,
    permits: Arc<Semaphore>,
    delivery_tx: mpsc::Sender<ProbeOutcome>,
    settings: ExecutorSettings,
    pending: Arc<AtomicUsize>,
}

impl ProbeExecutor {
    /// Create an executor. Must be used from within a tokio runtime.
    pub fn new(
        prober: Arc<dyn Prober>,
        delivery_tx: mpsc::Sender<ProbeOutcome>,
        settings: ExecutorSettings,
    ) -> Self {
        let pool_size = settings.pool_size.max(1);
        Self {
            prober,
            permits: Arc::new(Semaphore::new(pool_size)),
            delivery_tx,
            settings: ExecutorSettings { pool_size, ..settings },
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Probes submitted but not yet delivered, queued ones included
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

impl ProbeSubmitter for ProbeExecutor {
    fn submit(&self, id: String, generation: u64, address: String) {
        let prober = Arc::clone(&self.prober);
        let permits = Arc::clone(&self.permits);
        let delivery_tx = self.delivery_tx.clone();
        let pending = Arc::clone(&self.pending);
        let ExecutorSettings { probe_timeout, deadline, .. } = self.settings;

        pending.fetch_add(1, Ordering::AcqRel);

        tokio::spawn(async move {
            let Ok(permit) = permits.acquire_owned().await else {
                pending.fetch_sub(1, Ordering::AcqRel);
                return;
            };

            // The permit travels with the blocking call so a probe that outlives
            // its deadline still counts against the pool.
            let probe_address = address.clone();
            let work = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                prober.probe(&probe_address, probe_timeout)
            });

            let result = match deadline {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(joined) => flatten(joined),
                    Err(_) => Err(ProbeError::DeadlineExceeded(limit)),
                },
                None => flatten(work.await),
            };

            let reachable = match result {
                Ok(reachable) => reachable,
                Err(e) => {
                    debug!(id = %id, address = %address, error = %e, "Probe failed, treating as unreachable");
                    false
                }
            };

            pending.fetch_sub(1, Ordering::AcqRel);
            if let Err(e) = delivery_tx.send(ProbeOutcome { id, generation, reachable }).await {
                warn!("Dropping probe result, delivery channel closed: {}", e.0.id);
            }
        });
    }
}

fn flatten(joined: Result<Result<bool, ProbeError>, JoinError>) -> Result<bool, ProbeError> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(ProbeError::Panicked),
        Err(_) => Err(ProbeError::Cancelled),
    }
}
