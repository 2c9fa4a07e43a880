use std::borrow::Cow;

use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;
use serde::Serializer;
use tracing::debug;

use crate::Change;
use crate::ChangeEvent;

/// What a live subscriber learns about a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePayload {
    /// New value of the key of interest
    Value(Bytes),
    /// The key was deleted
    Deleted,
    /// Some other key was written; its value is not sent
    Omitted,
}

/// One message pushed to a live subscriber.
///
/// Serializes as `{"key":..,"value":..,"rev":..}`, `{"key":..,"deleted":1,"rev":..}`
/// or `{"key":..,"rev":..}` depending on the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateMessage {
    pub key: String,
    pub payload: UpdatePayload,
    pub rev: i64,
}

impl UpdateMessage {
    /// Shapes `event` for a subscriber currently interested in `key_of_interest`.
    pub fn filtered(
        event: &ChangeEvent,
        key_of_interest: &str,
    ) -> Self {
        let payload = match &event.change {
            Change::Delete => UpdatePayload::Deleted,
            Change::Put { value, .. } if event.key == key_of_interest => UpdatePayload::Value(value.clone()),
            Change::Put { .. } => UpdatePayload::Omitted,
        };
        Self {
            key: event.key.clone(),
            payload,
            rev: event.rev,
        }
    }
}

#[derive(Serialize)]
struct WireUpdate<'a> {
    key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Cow<'a, str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted: Option<u8>,
    rev: i64,
}

impl Serialize for UpdateMessage {
    fn serialize<S>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let (value, deleted) = match &self.payload {
            UpdatePayload::Value(bytes) => (Some(String::from_utf8_lossy(bytes)), None),
            UpdatePayload::Deleted => (None, Some(1)),
            UpdatePayload::Omitted => (None, None),
        };
        WireUpdate {
            key: &self.key,
            value,
            deleted,
            rev: self.rev,
        }
        .serialize(serializer)
    }
}

/// Message sent by a live subscriber to change its key of interest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientMessage {
    pub key: String,
}

impl ClientMessage {
    /// Parses a raw client message. Oversize or malformed input yields `None`.
    pub fn parse(
        raw: &[u8],
        max_bytes: usize,
    ) -> Option<Self> {
        if raw.len() > max_bytes {
            debug!(len = raw.len(), max_bytes, "Client message too large, ignored");
            return None;
        }
        match serde_json::from_slice(raw) {
            Ok(message) => Some(message),
            Err(e) => {
                debug!("Malformed client message ignored: {}", e);
                None
            }
        }
    }
}
