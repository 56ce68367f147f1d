//! Wire types shared by the broker server and the remote clients.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use trinetra_core::traits::{BusEntry, EntryId, LogRecord};
use trinetra_core::types::{CameraType, Frame, FrameMeta};

/// A frame in transit: metadata verbatim, JPEG bytes base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameDto {
    pub camera_id: String,
    pub camera_type: CameraType,
    pub frame_index: u64,
    pub ingest_ts: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_ts: Option<f64>,
    pub jpeg: String,
}

impl From<Frame> for FrameDto {
    fn from(frame: Frame) -> Self {
        Self {
            camera_id: frame.meta.camera_id,
            camera_type: frame.meta.camera_type,
            frame_index: frame.meta.frame_index,
            ingest_ts: frame.meta.ingest_ts,
            frame_ts: frame.meta.frame_ts,
            jpeg: BASE64.encode(&frame.jpeg),
        }
    }
}

impl FrameDto {
    pub fn into_frame(self) -> Result<Frame, base64::DecodeError> {
        Ok(Frame {
            meta: FrameMeta {
                camera_id: self.camera_id,
                camera_type: self.camera_type,
                frame_index: self.frame_index,
                ingest_ts: self.ingest_ts,
                frame_ts: self.frame_ts,
            },
            jpeg: BASE64.decode(self.jpeg.as_bytes())?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEntryDto {
    pub stream: String,
    pub id: EntryId,
    pub frame: FrameDto,
}

impl From<BusEntry> for BusEntryDto {
    fn from(entry: BusEntry) -> Self {
        Self {
            stream: entry.stream,
            id: entry.id,
            frame: entry.frame.into(),
        }
    }
}

impl BusEntryDto {
    pub fn into_entry(self) -> Result<BusEntry, base64::DecodeError> {
        Ok(BusEntry {
            stream: self.stream,
            id: self.id,
            frame: self.frame.into_frame()?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishFrameRequest {
    pub frame: FrameDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishFrameResponse {
    pub id: EntryId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BusConsumeRequest {
    pub group: String,
    pub consumer: String,
    pub streams: Vec<String>,
    pub count: usize,
    pub block_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EntriesResponse {
    pub entries: Vec<BusEntryDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AckRequest {
    pub group: String,
    pub stream: String,
    pub ids: Vec<EntryId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub acked: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReclaimRequest {
    pub group: String,
    pub consumer: String,
    pub idle_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnsureGroupRequest {
    pub stream: String,
    pub group: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StreamStatsResponse {
    pub len: usize,
    pub fill_ratio: f64,
    pub dropped: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StreamsResponse {
    pub streams: Vec<String>,
}

/// Checkpoint blobs travel base64-encoded, like frame payloads.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckpointDto {
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogPublishRequest {
    pub topic: String,
    pub key: String,
    pub payload: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogPublishResponse {
    pub partition: u32,
    pub offset: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogConsumeRequest {
    pub group: String,
    pub topics: Vec<String>,
    pub max: usize,
    pub block_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecordDto {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub key: String,
    pub payload: String,
    pub publish_ts: f64,
}

impl From<LogRecord> for LogRecordDto {
    fn from(record: LogRecord) -> Self {
        Self {
            topic: record.topic,
            partition: record.partition,
            offset: record.offset,
            key: record.key,
            payload: BASE64.encode(&record.payload),
            publish_ts: record.publish_ts,
        }
    }
}

impl LogRecordDto {
    pub fn into_record(self) -> Result<LogRecord, base64::DecodeError> {
        Ok(LogRecord {
            topic: self.topic,
            partition: self.partition,
            offset: self.offset,
            key: self.key,
            payload: BASE64.decode(self.payload.as_bytes())?,
            publish_ts: self.publish_ts,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogRecordsResponse {
    pub records: Vec<LogRecordDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommitRequest {
    pub group: String,
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeekRequest {
    pub group: String,
    pub topics: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LagResponse {
    pub lag: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn encode_blob(data: &[u8]) -> String {
    BASE64.encode(data)
}

pub fn decode_blob(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64.decode(data.as_bytes())
}
