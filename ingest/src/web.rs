//! HTTP boundary: upload, search, match detail, video regeneration and
//! the storage-event hook.

use crate::config::AppConfig;
use crate::error::AppError;
use crate::pipeline::{IngestPipeline, RenderJob};
use crate::query::{QueryGateway, SearchFilters};
use crate::store::{replay_key, ObjectStore};
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub pipeline: Arc<IngestPipeline>,
    pub query: Arc<QueryGateway>,
    pub objects: Arc<dyn ObjectStore>,
    pub render_tx: mpsc::Sender<RenderJob>,
}

pub fn router(state: AppState) -> Router {
    let max_body = state.config.max_replay_bytes as usize + 1024 * 1024;
    Router::new()
        .route("/healthz", get(health))
        .route("/api/upload", post(upload))
        .route("/api/search", post(search))
        .route("/api/match/:arena_id", get(match_detail))
        .route("/api/generate-video", post(generate_video))
        .route("/events/object-created", post(object_created))
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    #[serde(rename = "arenaUniqueID")]
    arena_unique_id: Option<String>,
    upload_key: String,
    status: &'static str,
}

async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    authorize_upload(&state.config, &headers)?;

    let mut file: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("multipart read: {e}")))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("multipart read: {e}")))?;
        file = Some((file_name, bytes.to_vec()));
        break;
    }

    let (file_name, bytes) = file.ok_or_else(|| {
        AppError::BadRequest("no file in multipart body".to_string())
    })?;

    if !file_name.ends_with(".wowsreplay") {
        return Err(AppError::BadRequest(
            "only .wowsreplay files are accepted".to_string(),
        ));
    }
    if bytes.is_empty() {
        return Err(AppError::BadRequest("empty upload".to_string()));
    }
    if bytes.len() as u64 > state.config.max_replay_bytes {
        return Err(AppError::BadRequest("replay exceeds the size limit".to_string()));
    }

    let uploader = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("client-tool")
        .to_string();
    let key = replay_key(&uploader, &file_name);

    state
        .objects
        .put(&key, bytes, "application/octet-stream")
        .await?;
    info!(key = %key, uploader = %uploader, "replay stored");

    // The blob is durable; decoding happens on the internal storage
    // event. The caller gets the real arena id only when identification
    // finishes inside the interactive budget.
    let pipeline = state.pipeline.clone();
    let event_key = key.clone();
    let handle = tokio::spawn(async move { pipeline.handle_object_created(&event_key).await });

    let budget = Duration::from_secs(state.config.interactive_decode_seconds);
    match tokio::time::timeout(budget, handle).await {
        Ok(Ok(Ok(outcome))) => Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                arena_unique_id: Some(outcome.arena_unique_id),
                upload_key: key,
                status: "processed",
            }),
        )),
        Ok(Ok(Err(err))) => Err(AppError::from(err)),
        Ok(Err(join_err)) => Err(AppError::Internal(anyhow::anyhow!(join_err))),
        Err(_elapsed) => {
            // The decode task keeps running; the upload is acknowledged.
            warn!(key = %key, "interactive decode budget exceeded, continuing async");
            Ok((
                StatusCode::CREATED,
                Json(UploadResponse {
                    arena_unique_id: None,
                    upload_key: key,
                    status: "queued",
                }),
            ))
        }
    }
}

fn authorize_upload(config: &AppConfig, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = &config.upload_api_key else {
        return Ok(());
    };
    let provided = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    if provided == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

async fn search(
    State(state): State<AppState>,
    Json(filters): Json<SearchFilters>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.query.search(&filters).await?;
    Ok(Json(response))
}

async fn match_detail(
    State(state): State<AppState>,
    Path(arena_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let detail = state
        .query
        .match_detail(&arena_id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(detail))
}

#[derive(Deserialize)]
struct GenerateVideoRequest {
    #[serde(rename = "arenaUniqueID")]
    arena_unique_id: String,
    #[serde(rename = "playerID")]
    #[allow(dead_code)]
    player_id: Option<i64>,
}

#[derive(Serialize)]
struct GenerateVideoResponse {
    status: &'static str,
}

/// Idempotent regenerate: `already_exists` when nothing is missing,
/// `generating` when a job was queued.
async fn generate_video(
    State(state): State<AppState>,
    Json(request): Json<GenerateVideoRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (game_type, record) = state
        .query
        .find_match(&request.arena_unique_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let wants_dual = record.has_dual_replay && record.dual_mp4_s3_key.is_none();
    if record.mp4_s3_key.is_some() && !wants_dual {
        return Ok(Json(GenerateVideoResponse {
            status: "already_exists",
        }));
    }

    state
        .render_tx
        .send(RenderJob {
            game_type,
            arena_unique_id: request.arena_unique_id,
            dual: wants_dual,
        })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("render queue: {e}")))?;

    Ok(Json(GenerateVideoResponse { status: "generating" }))
}

#[derive(Deserialize)]
struct ObjectCreatedEvent {
    key: String,
}

/// External storage notification; mirrors the internal upload event.
async fn object_created(
    State(state): State<AppState>,
    Json(event): Json<ObjectCreatedEvent>,
) -> Result<impl IntoResponse, AppError> {
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        if let Err(err) = pipeline.handle_object_created(&event.key).await {
            warn!(key = %event.key, error = %err, "storage event processing failed");
        }
    });
    Ok(StatusCode::ACCEPTED)
}
