use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tonic::async_trait;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::proto;
use crate::constants::ETCD_DELETE_RANGE_PATH;
use crate::constants::ETCD_LEASE_TTL_PATH;
use crate::constants::ETCD_PUT_PATH;
use crate::constants::ETCD_RANGE_PATH;
use crate::constants::ETCD_WATCH_PATH;
use crate::KeyValue;
use crate::RangeResponse;
use crate::RemoteConfig;
use crate::RemoteError;
use crate::RemoteStore;
use crate::WatchEvent;
use crate::WatchEventKind;
use crate::WatchResponse;
use crate::WatchStream;

/// etcd v3 client over a load-balanced gRPC channel.
///
/// Every unary call is bounded by the configured request timeout. Watch
/// streams stay open until the server ends them or the stream is dropped.
#[derive(Debug, Clone)]
pub struct EtcdStore {
    channel: Channel,
    request_timeout: Duration,
}

impl EtcdStore {
    /// Builds the channel lazily; no connection is attempted until first use.
    pub fn connect(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let endpoints = config
            .endpoints
            .iter()
            .map(|url| {
                Endpoint::from_shared(url.clone())
                    .map(|endpoint| {
                        endpoint
                            .connect_timeout(Duration::from_millis(config.dial_timeout_ms))
                            .http2_keep_alive_interval(Duration::from_millis(config.keepalive_interval_ms))
                            .keep_alive_timeout(Duration::from_millis(config.keepalive_timeout_ms))
                            .keep_alive_while_idle(true)
                    })
                    .map_err(|e| RemoteError::InvalidEndpoint(format!("{url}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(endpoints = ?config.endpoints, "etcd channel configured");
        Ok(Self {
            channel: Channel::balance_list(endpoints.into_iter()),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    async fn ready(&self) -> Result<Grpc<Channel>, RemoteError> {
        let mut grpc = Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| RemoteError::Transport(format!("service not ready: {e}")))?;
        Ok(grpc)
    }

    async fn unary<Req, Resp>(
        &self,
        path: &'static str,
        request: Req,
    ) -> Result<Resp, RemoteError>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let call = async {
            let mut grpc = self.ready().await?;
            let codec: ProstCodec<Req, Resp> = ProstCodec::default();
            let response = grpc
                .unary(tonic::Request::new(request), PathAndQuery::from_static(path), codec)
                .await?;
            Ok::<_, RemoteError>(response.into_inner())
        };
        timeout(self.request_timeout, call)
            .await
            .map_err(|_| RemoteError::Timeout(self.request_timeout))?
    }
}

/// First key past every key starting with `prefix`.
pub(crate) fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    // every byte was 0xff: range to the end of the keyspace
    vec![0]
}

/// `(key, range_end)` covering every key under `prefix`.
pub(crate) fn prefix_range(prefix: &str) -> (Vec<u8>, Vec<u8>) {
    if prefix.is_empty() {
        return (vec![0], vec![0]);
    }
    (prefix.as_bytes().to_vec(), prefix_range_end(prefix.as_bytes()))
}

fn header_revision(header: Option<proto::ResponseHeader>) -> i64 {
    header.map_or(0, |h| h.revision)
}

/// Keys are expected to be UTF-8. Anything else is mapped lossily, which can
/// fold distinct keys onto the same path.
pub(crate) fn decode_key(raw: Vec<u8>) -> String {
    match String::from_utf8(raw) {
        Ok(key) => key,
        Err(e) => {
            let key = String::from_utf8_lossy(e.as_bytes()).into_owned();
            warn!(key = %key, "Key is not valid UTF-8, mirrored lossily");
            key
        }
    }
}

fn convert_kv(kv: proto::KeyValue) -> KeyValue {
    KeyValue {
        key: decode_key(kv.key),
        value: Bytes::from(kv.value),
        mod_revision: kv.mod_revision,
        lease_id: Some(kv.lease).filter(|id| *id > 0),
    }
}

fn convert_event(event: proto::Event) -> Option<WatchEvent> {
    let kind = if event.r#type == proto::EventType::Delete as i32 {
        WatchEventKind::Delete
    } else {
        WatchEventKind::Put
    };
    Some(WatchEvent {
        kind,
        kv: convert_kv(event.kv?),
    })
}

pub(crate) fn convert_watch_response(
    item: Result<proto::WatchResponse, tonic::Status>,
) -> Result<WatchResponse, RemoteError> {
    let response = item?;
    if response.compact_revision > 0 {
        return Err(RemoteError::Compacted {
            compact_revision: response.compact_revision,
        });
    }
    if response.canceled {
        return Err(RemoteError::WatchCanceled(response.cancel_reason));
    }
    Ok(WatchResponse {
        events: response.events.into_iter().filter_map(convert_event).collect(),
    })
}

#[async_trait]
impl RemoteStore for EtcdStore {
    async fn get(
        &self,
        key: &str,
        with_prefix: bool,
    ) -> Result<RangeResponse, RemoteError> {
        let (key, range_end) = if with_prefix {
            prefix_range(key)
        } else {
            (key.as_bytes().to_vec(), Vec::new())
        };
        let request = proto::RangeRequest {
            key,
            range_end,
            ..Default::default()
        };
        let response: proto::RangeResponse = self.unary(ETCD_RANGE_PATH, request).await?;
        trace!(count = response.kvs.len(), "range served");
        Ok(RangeResponse {
            revision: header_revision(response.header),
            entries: response.kvs.into_iter().map(convert_kv).collect(),
        })
    }

    async fn watch(
        &self,
        prefix: &str,
        start_revision: i64,
    ) -> Result<WatchStream, RemoteError> {
        let (key, range_end) = prefix_range(prefix);
        let create = proto::WatchRequest {
            request_union: Some(proto::watch_request::RequestUnion::CreateRequest(
                proto::WatchCreateRequest {
                    key,
                    range_end,
                    start_revision,
                    progress_notify: false,
                },
            )),
        };

        // The request side must stay open or the server tears the watch down.
        let (request_tx, request_rx) = mpsc::channel(1);
        request_tx
            .send(create)
            .await
            .map_err(|_| RemoteError::Transport("watch request channel closed".to_string()))?;

        let open = async {
            let mut grpc = self.ready().await?;
            let codec: ProstCodec<proto::WatchRequest, proto::WatchResponse> = ProstCodec::default();
            let response = grpc
                .streaming(
                    tonic::Request::new(ReceiverStream::new(request_rx)),
                    PathAndQuery::from_static(ETCD_WATCH_PATH),
                    codec,
                )
                .await?;
            Ok::<_, RemoteError>(response.into_inner())
        };
        let inbound = timeout(self.request_timeout, open)
            .await
            .map_err(|_| RemoteError::Timeout(self.request_timeout))??;

        debug!(prefix, start_revision, "watch stream opened");
        let stream = inbound.map(move |item| {
            let _keep_open = &request_tx;
            convert_watch_response(item)
        });
        Ok(Box::pin(stream))
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
        lease_id: Option<i64>,
    ) -> Result<i64, RemoteError> {
        let request = proto::PutRequest {
            key: key.as_bytes().to_vec(),
            value: value.to_vec(),
            lease: lease_id.unwrap_or(0),
        };
        let response: proto::PutResponse = self.unary(ETCD_PUT_PATH, request).await?;
        Ok(header_revision(response.header))
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<i64, RemoteError> {
        let request = proto::DeleteRangeRequest {
            key: key.as_bytes().to_vec(),
            range_end: Vec::new(),
        };
        let response: proto::DeleteRangeResponse = self.unary(ETCD_DELETE_RANGE_PATH, request).await?;
        Ok(header_revision(response.header))
    }

    async fn lease_time_to_live(
        &self,
        lease_id: i64,
    ) -> Result<i64, RemoteError> {
        let request = proto::LeaseTimeToLiveRequest {
            id: lease_id,
            keys: false,
        };
        let response: proto::LeaseTimeToLiveResponse = self.unary(ETCD_LEASE_TTL_PATH, request).await?;
        Ok(response.ttl)
    }
}
