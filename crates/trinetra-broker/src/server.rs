//! Axum routes exposing the backbone contracts.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;

use trinetra_core::error::{EventLogError, FrameBusError};
use trinetra_core::traits::{EventLog, FrameBus};

use crate::api::*;

/// Longest long-poll the server will hold a consume request open.
const MAX_BLOCK_MS: u64 = 30_000;

#[derive(Clone)]
pub struct BrokerState {
    pub bus: Arc<dyn FrameBus>,
    pub log: Arc<dyn EventLog>,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn bus_error(e: FrameBusError) -> ApiError {
    let status = match &e {
        FrameBusError::UnknownStream(_) | FrameBusError::UnknownGroup { .. } => {
            StatusCode::NOT_FOUND
        }
        FrameBusError::Codec(_) => StatusCode::BAD_REQUEST,
        FrameBusError::StoreUnreachable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorBody { error: e.to_string() }))
}

fn log_error(e: EventLogError) -> ApiError {
    let status = match &e {
        EventLogError::UnknownTopic(_) => StatusCode::NOT_FOUND,
        EventLogError::CommitOutOfRange { .. } => StatusCode::CONFLICT,
        EventLogError::Serialization(_) => StatusCode::BAD_REQUEST,
        EventLogError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorBody { error: e.to_string() }))
}

fn decode_error(e: base64::DecodeError) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: format!("base64: {e}"),
        }),
    )
}

async fn health() -> &'static str {
    "ok"
}

async fn bus_publish(
    State(state): State<BrokerState>,
    Json(req): Json<PublishFrameRequest>,
) -> Result<Json<PublishFrameResponse>, ApiError> {
    let frame = req.frame.into_frame().map_err(decode_error)?;
    let id = state.bus.publish(frame).await.map_err(bus_error)?;
    Ok(Json(PublishFrameResponse { id }))
}

async fn bus_consume(
    State(state): State<BrokerState>,
    Json(req): Json<BusConsumeRequest>,
) -> Result<Json<EntriesResponse>, ApiError> {
    let block = Duration::from_millis(req.block_ms.min(MAX_BLOCK_MS));
    let entries = state
        .bus
        .consume(&req.group, &req.consumer, &req.streams, req.count, block)
        .await
        .map_err(bus_error)?;
    Ok(Json(EntriesResponse {
        entries: entries.into_iter().map(Into::into).collect(),
    }))
}

async fn bus_ack(
    State(state): State<BrokerState>,
    Json(req): Json<AckRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let acked = state
        .bus
        .ack(&req.group, &req.stream, &req.ids)
        .await
        .map_err(bus_error)?;
    Ok(Json(AckResponse { acked }))
}

async fn bus_reclaim(
    State(state): State<BrokerState>,
    Json(req): Json<ReclaimRequest>,
) -> Result<Json<EntriesResponse>, ApiError> {
    let entries = state
        .bus
        .reclaim(&req.group, &req.consumer, Duration::from_millis(req.idle_ms))
        .await
        .map_err(bus_error)?;
    Ok(Json(EntriesResponse {
        entries: entries.into_iter().map(Into::into).collect(),
    }))
}

async fn bus_ensure_group(
    State(state): State<BrokerState>,
    Json(req): Json<EnsureGroupRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .bus
        .ensure_group(&req.stream, &req.group)
        .await
        .map_err(bus_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn bus_stats(
    State(state): State<BrokerState>,
    Path(camera_id): Path<String>,
) -> Json<StreamStatsResponse> {
    Json(StreamStatsResponse {
        len: state.bus.len(&camera_id).await,
        fill_ratio: state.bus.fill_ratio(&camera_id).await,
        dropped: state.bus.dropped(&camera_id).await,
    })
}

async fn bus_streams(State(state): State<BrokerState>) -> Json<StreamsResponse> {
    Json(StreamsResponse {
        streams: state.bus.stream_names().await,
    })
}

async fn checkpoint_put(
    State(state): State<BrokerState>,
    Path(key): Path<String>,
    Json(body): Json<CheckpointDto>,
) -> Result<StatusCode, ApiError> {
    let data = decode_blob(&body.data).map_err(decode_error)?;
    state
        .bus
        .put_checkpoint(&key, data)
        .await
        .map_err(bus_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn checkpoint_get(
    State(state): State<BrokerState>,
    Path(key): Path<String>,
) -> Result<Json<CheckpointDto>, ApiError> {
    match state.bus.get_checkpoint(&key).await.map_err(bus_error)? {
        Some(data) => Ok(Json(CheckpointDto {
            data: encode_blob(&data),
        })),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("no checkpoint at {key}"),
            }),
        )),
    }
}

async fn log_publish(
    State(state): State<BrokerState>,
    Json(req): Json<LogPublishRequest>,
) -> Result<Json<LogPublishResponse>, ApiError> {
    let payload = decode_blob(&req.payload).map_err(decode_error)?;
    let (partition, offset) = state
        .log
        .publish(&req.topic, &req.key, payload)
        .await
        .map_err(log_error)?;
    Ok(Json(LogPublishResponse { partition, offset }))
}

async fn log_consume(
    State(state): State<BrokerState>,
    Json(req): Json<LogConsumeRequest>,
) -> Result<Json<LogRecordsResponse>, ApiError> {
    let block = Duration::from_millis(req.block_ms.min(MAX_BLOCK_MS));
    let records = state
        .log
        .consume(&req.group, &req.topics, req.max, block)
        .await
        .map_err(log_error)?;
    Ok(Json(LogRecordsResponse {
        records: records.into_iter().map(Into::into).collect(),
    }))
}

async fn log_commit(
    State(state): State<BrokerState>,
    Json(req): Json<CommitRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .log
        .commit(&req.group, &req.topic, req.partition, req.offset)
        .await
        .map_err(log_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn log_seek(
    State(state): State<BrokerState>,
    Json(req): Json<SeekRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .log
        .seek_to_committed(&req.group, &req.topics)
        .await
        .map_err(log_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn log_lag(
    State(state): State<BrokerState>,
    Path((group, topic)): Path<(String, String)>,
) -> Result<Json<LagResponse>, ApiError> {
    let lag = state.log.lag(&group, &topic).await.map_err(log_error)?;
    Ok(Json(LagResponse { lag }))
}

pub fn router(state: BrokerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/bus/publish", post(bus_publish))
        .route("/bus/consume", post(bus_consume))
        .route("/bus/ack", post(bus_ack))
        .route("/bus/reclaim", post(bus_reclaim))
        .route("/bus/groups", post(bus_ensure_group))
        .route("/bus/streams", get(bus_streams))
        .route("/bus/stats/:camera_id", get(bus_stats))
        .route("/bus/checkpoints/:key", get(checkpoint_get).put(checkpoint_put))
        .route("/log/publish", post(log_publish))
        .route("/log/consume", post(log_consume))
        .route("/log/commit", post(log_commit))
        .route("/log/seek", post(log_seek))
        .route("/log/lag/:group/:topic", get(log_lag))
        .with_state(state)
}

/// Serve the backbone until the process exits.
pub async fn serve(state: BrokerState, bind: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "backbone listening");
    axum::serve(listener, router(state)).await
}
