//! Drives one live subscription from the broker to an external sink.

use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tokio::time::interval_at;
use tokio::time::timeout;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tonic::async_trait;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::ApiConfig;
use crate::ClientMessage;
use crate::Error;
use crate::Result;
use crate::Subscription;
use crate::UpdateMessage;

/// A unit written to a subscriber's connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Serialized [`UpdateMessage`]
    Text(String),
    /// Liveness probe
    Ping,
}

/// Outbound half of a subscriber connection.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UpdateSink: Send + 'static {
    async fn send(
        &mut self,
        frame: Frame,
    ) -> Result<()>;
}

#[async_trait]
impl UpdateSink for mpsc::Sender<Frame> {
    async fn send(
        &mut self,
        frame: Frame,
    ) -> Result<()> {
        mpsc::Sender::send(self, frame).await.map_err(|_| Error::SinkClosed)
    }
}

pub struct Forwarder<S: UpdateSink> {
    subscription: Subscription,
    sink: S,
    client: mpsc::Receiver<Bytes>,
    config: ApiConfig,
    key_of_interest: String,
}

impl<S: UpdateSink> std::fmt::Debug for Forwarder<S> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("subscription", &self.subscription)
            .field("key_of_interest", &self.key_of_interest)
            .finish_non_exhaustive()
    }
}

impl<S: UpdateSink> Forwarder<S> {
    /// `client` carries raw messages read from the connection; closing it
    /// ends the forwarder.
    pub fn new(
        subscription: Subscription,
        sink: S,
        client: mpsc::Receiver<Bytes>,
        config: ApiConfig,
    ) -> Self {
        Self {
            subscription,
            sink,
            client,
            config,
            key_of_interest: String::new(),
        }
    }

    /// Forwards until the client leaves, the broker stops or a write fails.
    ///
    /// The subscription is released on return.
    pub async fn run(mut self) -> Result<()> {
        let ping_period = self.config.ping_period();
        let mut heartbeat = interval_at(Instant::now() + ping_period, ping_period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                raw = self.client.recv() => {
                    let Some(raw) = raw else {
                        debug!(subscriber_id = self.subscription.id(), "Client went away");
                        break Ok(());
                    };
                    if let Some(message) = ClientMessage::parse(&raw, self.config.max_client_message_bytes) {
                        trace!(subscriber_id = self.subscription.id(), key = %message.key, "Key of interest changed");
                        self.key_of_interest = message.key;
                    }
                }
                event = self.subscription.recv() => {
                    let Some(event) = event else {
                        debug!(subscriber_id = self.subscription.id(), "Broker stopped");
                        break Ok(());
                    };
                    let message = UpdateMessage::filtered(&event, &self.key_of_interest);
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(e) => break Err(e.into()),
                    };
                    if let Err(e) = self.write(Frame::Text(text)).await {
                        break Err(e);
                    }
                    heartbeat.reset();
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = self.write(Frame::Ping).await {
                        break Err(e);
                    }
                }
            }
        };

        if let Err(e) = &result {
            warn!(subscriber_id = self.subscription.id(), "Forwarder ended: {}", e);
        }
        result
    }

    async fn write(
        &mut self,
        frame: Frame,
    ) -> Result<()> {
        let write_timeout = self.config.write_timeout();
        match timeout(write_timeout, self.sink.send(frame)).await {
            Ok(result) => result,
            Err(_) => Err(Error::WriteTimeout(write_timeout)),
        }
    }
}
