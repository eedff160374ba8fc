//! The decode pipeline: one storage event in, one persisted upload out.
//!
//! Stateless across invocations; which records already exist for the
//! arena id fully determines what happens. Failures leave a marker item
//! so operators can see what never made it into a MATCH row.

use crate::assembler::{MatchAssembler, UploadContext};
use crate::persister::{Persister, PersistOutcome};
use crate::records::{DecodeFailureRecord, GameType};
use crate::store::{ObjectStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use wows_replay_parser::stats::ship_params::ShipParams;
use wows_replay_parser::stats::StatsParser;
use wows_replay_parser::{ReplayDecoder, ReplayError};

/// Work item for the render worker.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub game_type: GameType,
    pub arena_unique_id: String,
    /// Render the combined two-perspective video.
    pub dual: bool,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("replay decode failed: {0}")]
    Decode(#[from] ReplayError),
    #[error("replay carries no arena identifier")]
    NoArenaId,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("upload object {0} not found")]
    MissingObject(String),
}

impl IngestError {
    /// Stable kind string recorded on failure markers.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Decode(ReplayError::MalformedHeader(_)) => "MalformedHeader",
            IngestError::Decode(ReplayError::DecryptFailure(_)) => "DecryptFailure",
            IngestError::Decode(ReplayError::UnsupportedVersion(_)) => "UnsupportedVersion",
            IngestError::Decode(ReplayError::TruncatedStream { .. }) => "TruncatedStream",
            IngestError::Decode(ReplayError::NoBattleStats) => "NoBattleStats",
            IngestError::Decode(_) => "DecodeFailed",
            IngestError::NoArenaId => "NoArenaId",
            IngestError::Store(_) => "PersistFailed",
            IngestError::MissingObject(_) => "MissingObject",
        }
    }
}

pub struct IngestPipeline {
    decoder: ReplayDecoder,
    ships: Arc<ShipParams>,
    persister: Arc<Persister>,
    objects: Arc<dyn ObjectStore>,
    render_tx: mpsc::Sender<RenderJob>,
}

impl IngestPipeline {
    pub fn new(
        ships: Arc<ShipParams>,
        persister: Arc<Persister>,
        objects: Arc<dyn ObjectStore>,
        render_tx: mpsc::Sender<RenderJob>,
    ) -> Self {
        IngestPipeline {
            decoder: ReplayDecoder::new(),
            ships,
            persister,
            objects,
            render_tx,
        }
    }

    /// Storage-event entry point: an object appeared under `replays/`.
    pub async fn handle_object_created(&self, key: &str) -> Result<PersistOutcome, IngestError> {
        if !key.ends_with(".wowsreplay") {
            warn!(key, "ignoring non-replay object");
            return Err(IngestError::MissingObject(key.to_string()));
        }

        let bytes = self
            .objects
            .get(key)
            .await?
            .ok_or_else(|| IngestError::MissingObject(key.to_string()))?;

        let uploaded_by = key.split('/').nth(1).unwrap_or("unknown").to_string();
        self.ingest_bytes(key, &bytes, &uploaded_by).await
    }

    /// Decode, parse, assemble, persist. Schedules the render job on
    /// success; writes a failure marker on decode errors.
    pub async fn ingest_bytes(
        &self,
        key: &str,
        bytes: &[u8],
        uploaded_by: &str,
    ) -> Result<PersistOutcome, IngestError> {
        let outcome = self.run_pipeline(key, bytes, uploaded_by).await;

        if let Err(err) = &outcome {
            if !matches!(err, IngestError::Store(_)) {
                // Persist errors are transient; everything else is a fact
                // about the upload worth recording.
                let marker = DecodeFailureRecord {
                    upload_key: key.to_string(),
                    error_kind: err.kind().to_string(),
                    message: err.to_string(),
                    failed_at: chrono::Utc::now().timestamp(),
                };
                if let Err(marker_err) = self.persister.record_decode_failure(&marker).await {
                    error!(key, error = %marker_err, "failed to write decode failure marker");
                }
            }
        }

        outcome
    }

    async fn run_pipeline(
        &self,
        key: &str,
        bytes: &[u8],
        uploaded_by: &str,
    ) -> Result<PersistOutcome, IngestError> {
        let decoded = self.decoder.decode(bytes)?;
        if decoded.arena_id.is_none() {
            return Err(IngestError::NoArenaId);
        }
        if !decoded.is_complete() {
            // Still persisted: metadata search works without statistics.
            info!(key, "replay has no battle statistics, persisting metadata only");
        }

        let stats = match &decoded.battle_stats {
            Some(data) => StatsParser::new(decoded.version, &self.ships).parse_all(
                data,
                &decoded.hidden,
                &decoded.meta.playerName,
            ),
            None => Vec::new(),
        };

        let file_name = key.rsplit('/').next().unwrap_or(key).to_string();
        let assembled = MatchAssembler::new(&self.ships).assemble(
            &decoded,
            &stats,
            UploadContext {
                s3_key: key.to_string(),
                file_name,
                file_size: bytes.len() as u64,
                uploaded_by: uploaded_by.to_string(),
            },
        );

        let outcome = self.persister.persist(&assembled).await?;
        self.schedule_render(&outcome).await;
        Ok(outcome)
    }

    /// Renders run once per single upload and once more when the first
    /// opposite-team upload arrives.
    async fn schedule_render(&self, outcome: &PersistOutcome) {
        let job = if outcome.created {
            Some(RenderJob {
                game_type: outcome.game_type,
                arena_unique_id: outcome.arena_unique_id.clone(),
                dual: false,
            })
        } else if outcome.dual_flipped {
            Some(RenderJob {
                game_type: outcome.game_type,
                arena_unique_id: outcome.arena_unique_id.clone(),
                dual: true,
            })
        } else {
            None
        };

        if let Some(job) = job {
            if let Err(e) = self.render_tx.send(job).await {
                // Render is a derived artifact; ingest stays healthy.
                error!(error = %e, "render queue unavailable");
            }
        }
    }
}
