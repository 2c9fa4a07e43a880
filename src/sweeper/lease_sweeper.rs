use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::is_descendant;
use crate::time::get_duration_since_epoch;
use crate::time::until_next_boundary;
use crate::EventBroker;
use crate::Mirror;
use crate::RemoteStore;
use crate::Result;
use crate::SweeperConfig;

/// Periodically drops keys whose lease expired upstream without a delete
/// notification reaching the mirror.
///
/// Sweeps fire on wall-clock multiples of the interval. Each sweep asks the
/// store about every distinct lease at most once and never about leases
/// hidden below an expired subtree. A lease whose query fails or times out
/// is treated as alive.
pub struct LeaseSweeper<R: RemoteStore> {
    store: Arc<R>,
    mirror: Arc<Mirror>,
    broker: EventBroker,
    config: SweeperConfig,
}

impl<R: RemoteStore> LeaseSweeper<R> {
    pub fn new(
        store: Arc<R>,
        mirror: Arc<Mirror>,
        broker: EventBroker,
        config: SweeperConfig,
    ) -> Self {
        Self {
            store,
            mirror,
            broker,
            config,
        }
    }

    pub async fn run(
        self,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        if !self.config.enabled {
            debug!("Lease sweeper disabled");
            return Ok(());
        }

        loop {
            let wait = until_next_boundary(get_duration_since_epoch(), self.config.interval());
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Shutdown requested, lease sweeper stopping");
                    return Ok(());
                }
                _ = sleep(wait) => {}
            }
            self.sweep_once().await;
        }
    }

    /// Runs one sweep and returns the keys removed.
    pub async fn sweep_once(&self) -> Vec<String> {
        let leased = self.mirror.leased_keys();
        if leased.is_empty() {
            return Vec::new();
        }

        // ancestors come before descendants, so a key under an expired
        // subtree is skipped without asking about its own lease
        let mut memo: HashMap<i64, bool> = HashMap::new();
        let mut expired_roots: Vec<&str> = Vec::new();
        for (key, lease_id) in &leased {
            if expired_roots.iter().any(|root| is_descendant(key, root)) {
                continue;
            }
            let expired = match memo.get(lease_id) {
                Some(expired) => *expired,
                None => {
                    let expired = self.is_expired(*lease_id).await;
                    memo.insert(*lease_id, expired);
                    expired
                }
            };
            if expired {
                expired_roots.push(key.as_str());
            }
        }

        if expired_roots.is_empty() {
            debug!(leases = memo.len(), "Lease sweep found nothing expired");
            return Vec::new();
        }

        let removed = self.mirror.remove_expired(&memo, &self.broker);
        info!(removed = removed.len(), "Lease sweep removed expired keys");
        removed
    }

    async fn is_expired(
        &self,
        lease_id: i64,
    ) -> bool {
        let query_timeout = self.config.query_timeout();
        match timeout(query_timeout, self.store.lease_time_to_live(lease_id)).await {
            Ok(Ok(ttl)) => ttl < 0,
            Ok(Err(e)) => {
                warn!(lease_id, "Lease query failed, keeping its keys: {}", e);
                false
            }
            Err(_) => {
                warn!(
                    lease_id,
                    timeout_ms = self.config.query_timeout_ms,
                    "Lease query timed out, keeping its keys"
                );
                false
            }
        }
    }
}
