//! Single-producer, many-subscriber fan-out of change events.
//!
//! ```text
//! SyncEngine::apply -> publish() [unbounded queue, never blocks]
//!                           |
//!                     control loop (one task, owns the registry)
//!                           |  try_send per subscriber
//!                           v
//!            Subscription channels (bounded, drop when full)
//! ```
//!
//! Registration, deregistration and publication are all commands on the
//! same queue, so a subscriber registered before a publish sees it and one
//! registered after does not.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::BrokerConfig;
use crate::ChangeEvent;

enum Command {
    Subscribe {
        id: u64,
        sender: mpsc::Sender<ChangeEvent>,
    },
    Unsubscribe {
        id: u64,
    },
    Publish(ChangeEvent),
    Count(oneshot::Sender<usize>),
    Stop,
}

struct BrokerInner {
    commands: mpsc::UnboundedSender<Command>,

    /// Taken by the first `start()`
    pending: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,

    /// Control loop handle (None before start and after stop)
    handle: Mutex<Option<JoinHandle<()>>>,

    next_id: AtomicU64,

    /// Messages dropped because a subscriber's buffer was full
    dropped: Arc<AtomicU64>,

    buffer_size: usize,
}

/// Handle to the broker's control loop.
///
/// Cheap to clone; every clone talks to the same loop.
#[derive(Clone)]
pub struct EventBroker {
    inner: Arc<BrokerInner>,
}

impl std::fmt::Debug for EventBroker {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("EventBroker")
            .field("buffer_size", &self.inner.buffer_size)
            .field("dropped", &self.inner.dropped.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventBroker {
    /// Creates the broker. Commands issued before [`EventBroker::start`] are
    /// queued and processed in order once the loop runs.
    pub fn new(config: &BrokerConfig) -> Self {
        let (commands, pending) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(BrokerInner {
                commands,
                pending: Mutex::new(Some(pending)),
                handle: Mutex::new(None),
                next_id: AtomicU64::new(1),
                dropped: Arc::new(AtomicU64::new(0)),
                buffer_size: config.subscriber_buffer_size,
            }),
        }
    }

    /// Spawns the control loop. Calling `start()` again is a no-op.
    pub fn start(&self) {
        let Some(commands) = self.inner.pending.lock().take() else {
            return;
        };
        let dropped = self.inner.dropped.clone();
        let handle = tokio::spawn(run_control_loop(commands, dropped));
        *self.inner.handle.lock() = Some(handle);
    }

    /// Closes every subscriber channel and halts the control loop.
    ///
    /// Commands already queued ahead of the stop are still processed.
    pub async fn stop(&self) {
        let _ = self.inner.commands.send(Command::Stop);
        let handle = self.inner.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Event broker loop ended abnormally: {:?}", e);
            }
        }
    }

    /// Registers a new bounded channel for delivery.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.inner.buffer_size);
        // after stop the sender is dropped with the command and the channel reads as closed
        let _ = self.inner.commands.send(Command::Subscribe { id, sender });
        trace!(subscriber_id = id, "Subscriber registered");
        Subscription {
            id,
            receiver,
            commands: self.inner.commands.clone(),
        }
    }

    /// Queues `event` for every registered subscriber. Never blocks.
    pub fn publish(
        &self,
        event: ChangeEvent,
    ) {
        if self.inner.commands.send(Command::Publish(event)).is_err() {
            debug!("Event broker stopped, publish ignored");
        }
    }

    /// Number of registered subscribers once every queued command is processed.
    pub async fn subscriber_count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.inner.commands.send(Command::Count(tx)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Total messages dropped for slow subscribers so far.
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

async fn run_control_loop(
    mut commands: mpsc::UnboundedReceiver<Command>,
    dropped: Arc<AtomicU64>,
) {
    debug!("Event broker started");
    let mut subscribers: HashMap<u64, mpsc::Sender<ChangeEvent>> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Subscribe { id, sender } => {
                subscribers.insert(id, sender);
            }
            Command::Unsubscribe { id } => {
                if subscribers.remove(&id).is_some() {
                    trace!(subscriber_id = id, "Subscriber unregistered");
                }
            }
            Command::Publish(event) => {
                let mut closed = Vec::new();
                for (id, sender) in &subscribers {
                    // buffered channel, use non-blocking send to protect the broker
                    match sender.try_send(event.clone()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            dropped.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                subscriber_id = id,
                                key = %event.key,
                                rev = event.rev,
                                "Subscriber is stuck - message dropped"
                            );
                        }
                        Err(TrySendError::Closed(_)) => closed.push(*id),
                    }
                }
                for id in closed {
                    subscribers.remove(&id);
                }
                trace!(key = %event.key, rev = event.rev, subscribers = subscribers.len(), "Event dispatched");
            }
            Command::Count(reply) => {
                let _ = reply.send(subscribers.len());
            }
            Command::Stop => break,
        }
    }

    // dropping the senders closes every subscriber channel
    subscribers.clear();
    debug!("Event broker stopped");
}

/// A registered subscriber channel.
///
/// Dropping the subscription unregisters it from the broker.
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<ChangeEvent>,
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish_non_exhaustive()
    }
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event in publish order; `None` once the broker has stopped.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<ChangeEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Deregisters and closes the channel.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.receiver.close();
        let _ = self.commands.send(Command::Unsubscribe { id: self.id });
    }
}
