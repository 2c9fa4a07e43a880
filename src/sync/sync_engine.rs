//! Keeps the [`Mirror`] in step with the remote store.
//!
//! ```text
//! Loading ──► Watching ◄──► Disconnected ──► Fatal
//! ```
//!
//! Loading reads the whole prefix once without publishing anything. Watching
//! applies every change in stream order and republishes it. When the stream
//! ends or fails the engine backs off and reopens it from the next unseen
//! revision, or from the compaction point if history was discarded. Too many
//! consecutive failures end in Fatal.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::async_task::task_with_timeout_and_exponential_backoff;
use crate::ChangeEvent;
use crate::Error;
use crate::EventBroker;
use crate::Mirror;
use crate::RemoteError;
use crate::RemoteStore;
use crate::Result;
use crate::RetryPolicies;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Loading,
    /// Stream open; `rev` is the mirror revision when it was opened
    Watching { rev: i64 },
    /// Waiting before reconnect attempt number `attempt`
    Disconnected { attempt: usize },
    Fatal,
}

pub struct SyncEngine<R: RemoteStore> {
    store: Arc<R>,
    mirror: Arc<Mirror>,
    broker: EventBroker,
    prefix: String,
    retry: RetryPolicies,
    state_tx: watch::Sender<EngineState>,
}

impl<R: RemoteStore> std::fmt::Debug for SyncEngine<R> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("prefix", &self.prefix)
            .field("state", &*self.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl<R: RemoteStore> SyncEngine<R> {
    pub fn new(
        store: Arc<R>,
        mirror: Arc<Mirror>,
        broker: EventBroker,
        prefix: impl Into<String>,
        retry: RetryPolicies,
    ) -> Self {
        let (state_tx, _) = watch::channel(EngineState::Loading);
        Self {
            store,
            mirror,
            broker,
            prefix: prefix.into(),
            retry,
            state_tx,
        }
    }

    /// Observe state transitions.
    pub fn state(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }

    /// Runs until shutdown is signalled (`Ok`) or the engine turns Fatal.
    pub async fn run(
        self,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        let snapshot_rev = tokio::select! {
            _ = shutdown.changed() => {
                info!("Shutdown requested while loading");
                return Ok(());
            }
            loaded = self.load() => match loaded {
                Ok(rev) => rev,
                Err(e) => return Err(self.fatal(format!("initial load failed: {e}"))),
            },
        };

        let mut resume = snapshot_rev + 1;
        let mut failures = 0usize;
        let policy = self.retry.watch;

        loop {
            let ended = tokio::select! {
                _ = shutdown.changed() => {
                    info!(rev = self.mirror.revision(), "Shutdown requested, sync engine stopping");
                    return Ok(());
                }
                ended = self.watch_session(&mut resume, &mut failures) => ended,
            };

            if let RemoteError::Compacted { compact_revision } = ended {
                warn!(
                    resume,
                    compact_revision, "Requested revision was compacted, resuming from compaction point"
                );
                resume = resume.max(compact_revision);
            }

            failures += 1;
            if failures > policy.max_retries {
                return Err(self.fatal(format!("watch failed {failures} times in a row, last error: {ended}")));
            }

            let delay = policy.delay_for(failures - 1);
            self.state_tx.send_replace(EngineState::Disconnected { attempt: failures });
            warn!(
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                resume,
                "Watch interrupted: {}",
                ended
            );

            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Shutdown requested during backoff");
                    return Ok(());
                }
                _ = sleep(delay) => {}
            }
        }
    }

    /// Full load of the prefix. Returns the revision the mirror starts from.
    async fn load(&self) -> std::result::Result<i64, RemoteError> {
        self.state_tx.send_replace(EngineState::Loading);
        let response = task_with_timeout_and_exponential_backoff(
            || self.store.get(&self.prefix, true),
            &self.retry.load,
        )
        .await?;

        let rev = self.mirror.load_snapshot(response.revision, &response.entries);
        info!(
            prefix = %self.prefix,
            keys = response.entries.len(),
            rev,
            "Initial load complete"
        );
        Ok(rev)
    }

    /// Opens one watch stream and drains it. Returns why it ended.
    ///
    /// `resume` tracks the next revision to ask for; `failures` is reset as
    /// soon as the stream delivers anything.
    async fn watch_session(
        &self,
        resume: &mut i64,
        failures: &mut usize,
    ) -> RemoteError {
        let open_timeout = self.retry.watch.timeout();
        let mut stream = match timeout(open_timeout, self.store.watch(&self.prefix, *resume)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return e,
            Err(_) => return RemoteError::Timeout(open_timeout),
        };

        self.state_tx.send_replace(EngineState::Watching {
            rev: self.mirror.revision(),
        });
        debug!(prefix = %self.prefix, from = *resume, "Watch stream open");

        while let Some(item) = stream.next().await {
            let response = match item {
                Ok(response) => response,
                Err(e) => return e,
            };
            *failures = 0;
            for event in response.events {
                let event = ChangeEvent::from(event);
                *resume = (*resume).max(event.rev + 1);
                self.mirror.apply(event, &self.broker);
            }
        }
        RemoteError::Transport("watch stream closed".into())
    }

    fn fatal(
        &self,
        reason: String,
    ) -> Error {
        error!("Sync engine is fatal: {}", reason);
        self.state_tx.send_replace(EngineState::Fatal);
        Error::Fatal(reason)
    }
}
