//! Remote implementations of the backbone contracts.
//!
//! [`RemoteFrameBus`] and [`RemoteEventLog`] are thin JSON/HTTP clients over
//! the broker API, so the services' `FrameBus`/`EventLog` handles work the
//! same whether the store is in-process (tests) or a daemon across the
//! network (deployment).

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use trinetra_core::error::{EventLogError, FrameBusError};
use trinetra_core::traits::{BusEntry, EntryId, EventLog, FrameBus, LogRecord, StreamStats};
use trinetra_core::types::Frame;

use crate::api::*;

/// Extra time a long-poll request gets on top of its block window before
/// the client gives up on the connection.
const BLOCK_MARGIN: Duration = Duration::from_secs(5);

/// Deadline for plain request/response calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared HTTP plumbing for both contract clients.
#[derive(Clone)]
struct BrokerClient {
    http: reqwest::Client,
    base: String,
}

impl BrokerClient {
    /// `endpoint` may be a full URL or a bare `host:port` (the bootstrap
    /// shape); bare endpoints get an `http://` scheme.
    fn new(endpoint: &str) -> Self {
        let with_scheme = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("http://{endpoint}")
        };
        Self {
            http: reqwest::Client::new(),
            base: with_scheme.trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.base
    }

    async fn post_json<Req, Resp>(
        &self,
        path: &str,
        body: &Req,
        timeout: Duration,
    ) -> Result<Resp, String>
    where
        Req: serde::Serialize,
        Resp: serde::de::DeserializeOwned,
    {
        let response = self
            .http
            .post(format!("{}{path}", self.base))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("{path}: {e}"))?;
        Self::read_json(path, response).await
    }

    /// POST where the server answers with a bare status code.
    async fn post_unit<Req: serde::Serialize>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<(), String> {
        let response = self
            .http
            .post(format!("{}{path}", self.base))
            .timeout(REQUEST_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("{path}: {e}"))?;
        Self::check_status(path, response).await
    }

    async fn get_json<Resp: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Resp, String> {
        let response = self
            .http
            .get(format!("{}{path}", self.base))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| format!("{path}: {e}"))?;
        Self::read_json(path, response).await
    }

    async fn read_json<Resp: serde::de::DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<Resp, String> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{path}: {status}: {}", error_message(&body)));
        }
        response
            .json::<Resp>()
            .await
            .map_err(|e| format!("{path}: bad response: {e}"))
    }

    async fn check_status(path: &str, response: reqwest::Response) -> Result<(), String> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(format!("{path}: {status}: {}", error_message(&body)))
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.to_string())
}

/// Frame bus served by a broker daemon.
pub struct RemoteFrameBus {
    client: BrokerClient,
}

impl RemoteFrameBus {
    pub fn connect(endpoint: &str) -> Self {
        Self {
            client: BrokerClient::new(endpoint),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.client.endpoint()
    }
}

fn bus_transport(message: String) -> FrameBusError {
    FrameBusError::StoreUnreachable(message)
}

#[async_trait]
impl FrameBus for RemoteFrameBus {
    async fn publish(&self, frame: Frame) -> Result<EntryId, FrameBusError> {
        let request = PublishFrameRequest {
            frame: frame.into(),
        };
        let response: PublishFrameResponse = self
            .client
            .post_json("/bus/publish", &request, REQUEST_TIMEOUT)
            .await
            .map_err(bus_transport)?;
        Ok(response.id)
    }

    async fn consume(
        &self,
        group: &str,
        consumer: &str,
        streams: &[String],
        count: usize,
        block: Duration,
    ) -> Result<Vec<BusEntry>, FrameBusError> {
        let request = BusConsumeRequest {
            group: group.to_string(),
            consumer: consumer.to_string(),
            streams: streams.to_vec(),
            count,
            block_ms: block.as_millis() as u64,
        };
        let response: EntriesResponse = self
            .client
            .post_json("/bus/consume", &request, block + BLOCK_MARGIN)
            .await
            .map_err(bus_transport)?;
        response
            .entries
            .into_iter()
            .map(|dto| dto.into_entry().map_err(|e| FrameBusError::Codec(e.to_string())))
            .collect()
    }

    async fn ack(
        &self,
        group: &str,
        stream: &str,
        ids: &[EntryId],
    ) -> Result<usize, FrameBusError> {
        let request = AckRequest {
            group: group.to_string(),
            stream: stream.to_string(),
            ids: ids.to_vec(),
        };
        let response: AckResponse = self
            .client
            .post_json("/bus/ack", &request, REQUEST_TIMEOUT)
            .await
            .map_err(bus_transport)?;
        Ok(response.acked)
    }

    async fn reclaim(
        &self,
        group: &str,
        consumer: &str,
        idle: Duration,
    ) -> Result<Vec<BusEntry>, FrameBusError> {
        let request = ReclaimRequest {
            group: group.to_string(),
            consumer: consumer.to_string(),
            idle_ms: idle.as_millis() as u64,
        };
        let response: EntriesResponse = self
            .client
            .post_json("/bus/reclaim", &request, REQUEST_TIMEOUT)
            .await
            .map_err(bus_transport)?;
        response
            .entries
            .into_iter()
            .map(|dto| dto.into_entry().map_err(|e| FrameBusError::Codec(e.to_string())))
            .collect()
    }

    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), FrameBusError> {
        let request = EnsureGroupRequest {
            stream: stream.to_string(),
            group: group.to_string(),
        };
        self.client
            .post_unit("/bus/groups", &request)
            .await
            .map_err(bus_transport)
    }

    async fn len(&self, camera_id: &str) -> usize {
        self.stats(camera_id).await.len
    }

    async fn fill_ratio(&self, camera_id: &str) -> f64 {
        self.stats(camera_id).await.fill_ratio
    }

    async fn dropped(&self, camera_id: &str) -> u64 {
        self.stats(camera_id).await.dropped
    }

    /// One round trip for all three advisory numbers; degrades to zeros
    /// when the backbone is briefly unreachable.
    async fn stats(&self, camera_id: &str) -> StreamStats {
        match self
            .client
            .get_json::<StreamStatsResponse>(&format!("/bus/stats/{camera_id}"))
            .await
        {
            Ok(stats) => StreamStats {
                len: stats.len,
                fill_ratio: stats.fill_ratio,
                dropped: stats.dropped,
            },
            Err(e) => {
                warn!(error = %e, "stream stats unavailable");
                StreamStats::default()
            }
        }
    }

    async fn stream_names(&self) -> Vec<String> {
        match self.client.get_json::<StreamsResponse>("/bus/streams").await {
            Ok(response) => response.streams,
            Err(e) => {
                warn!(error = %e, "stream listing unavailable");
                Vec::new()
            }
        }
    }

    async fn put_checkpoint(&self, key: &str, value: Vec<u8>) -> Result<(), FrameBusError> {
        let body = CheckpointDto {
            data: encode_blob(&value),
        };
        let response = self
            .client
            .http
            .put(format!("{}/bus/checkpoints/{key}", self.client.base))
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| bus_transport(format!("/bus/checkpoints: {e}")))?;
        BrokerClient::check_status("/bus/checkpoints", response)
            .await
            .map_err(bus_transport)
    }

    async fn get_checkpoint(&self, key: &str) -> Result<Option<Vec<u8>>, FrameBusError> {
        let response = self
            .client
            .http
            .get(format!("{}/bus/checkpoints/{key}", self.client.base))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| bus_transport(format!("/bus/checkpoints: {e}")))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: CheckpointDto = BrokerClient::read_json("/bus/checkpoints", response)
            .await
            .map_err(bus_transport)?;
        let data = decode_blob(&body.data).map_err(|e| FrameBusError::Codec(e.to_string()))?;
        Ok(Some(data))
    }
}

/// Event log served by a broker daemon.
pub struct RemoteEventLog {
    client: BrokerClient,
}

impl RemoteEventLog {
    /// `bootstrap` follows the broker-list shape, `host:port`.
    pub fn connect(bootstrap: &str) -> Self {
        Self {
            client: BrokerClient::new(bootstrap),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.client.endpoint()
    }
}

fn log_transport(message: String) -> EventLogError {
    EventLogError::Storage(message)
}

#[async_trait]
impl EventLog for RemoteEventLog {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: Vec<u8>,
    ) -> Result<(u32, u64), EventLogError> {
        let request = LogPublishRequest {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: encode_blob(&payload),
        };
        let response: LogPublishResponse = self
            .client
            .post_json("/log/publish", &request, REQUEST_TIMEOUT)
            .await
            .map_err(log_transport)?;
        Ok((response.partition, response.offset))
    }

    async fn consume(
        &self,
        group: &str,
        topics: &[String],
        max: usize,
        block: Duration,
    ) -> Result<Vec<LogRecord>, EventLogError> {
        let request = LogConsumeRequest {
            group: group.to_string(),
            topics: topics.to_vec(),
            max,
            block_ms: block.as_millis() as u64,
        };
        let response: LogRecordsResponse = self
            .client
            .post_json("/log/consume", &request, block + BLOCK_MARGIN)
            .await
            .map_err(log_transport)?;
        response
            .records
            .into_iter()
            .map(|dto| {
                dto.into_record()
                    .map_err(|e| EventLogError::Serialization(e.to_string()))
            })
            .collect()
    }

    async fn commit(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
        offset: u64,
    ) -> Result<(), EventLogError> {
        let request = CommitRequest {
            group: group.to_string(),
            topic: topic.to_string(),
            partition,
            offset,
        };
        self.client
            .post_unit("/log/commit", &request)
            .await
            .map_err(log_transport)
    }

    async fn seek_to_committed(&self, group: &str, topics: &[String]) -> Result<(), EventLogError> {
        let request = SeekRequest {
            group: group.to_string(),
            topics: topics.to_vec(),
        };
        self.client
            .post_unit("/log/seek", &request)
            .await
            .map_err(log_transport)
    }

    async fn lag(&self, group: &str, topic: &str) -> Result<u64, EventLogError> {
        let response: LagResponse = self
            .client
            .get_json(&format!("/log/lag/{group}/{topic}"))
            .await
            .map_err(log_transport)?;
        Ok(response.lag)
    }
}
