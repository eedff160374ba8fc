//! The render worker: consumes render jobs, produces minimap videos.
//!
//! One job is one synchronous render occupying the worker for its whole
//! duration; concurrency comes from running more workers. Failures are
//! recorded and never retried automatically; a user-initiated regenerate
//! re-enqueues the job.

use crate::notify::Notifier;
use crate::persister::Persister;
use crate::pipeline::RenderJob;
use crate::records::{GameType, MatchRecord, UploadRecord};
use crate::store::{video_key, BattleStore, ObjectStore, VideoUpdate};
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use wows_minimap_video::{MinimapRenderer, RenderInput, RenderOptions, RosterEntry, TeamSide};
use wows_replay_parser::decoder::DecodedReplay;
use wows_replay_parser::types::Team;
use wows_replay_parser::ReplayDecoder;

pub struct RenderContext {
    pub store: Arc<dyn BattleStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub persister: Arc<Persister>,
    pub options: RenderOptions,
    pub notifier: Option<Arc<Notifier>>,
}

/// Worker loop; runs until the job channel closes.
pub async fn run(mut rx: mpsc::Receiver<RenderJob>, ctx: RenderContext) {
    while let Some(job) = rx.recv().await {
        let arena = job.arena_unique_id.clone();
        match render_one(&ctx, &job).await {
            Ok(()) => info!(arena = %arena, dual = job.dual, "render complete"),
            // No automatic retry; the failure cause lands in the log and
            // the match simply has no video until someone re-queues it.
            Err(err) => error!(arena = %arena, error = %err, "render failed"),
        }
    }
}

async fn render_one(ctx: &RenderContext, job: &RenderJob) -> Result<()> {
    let record = ctx
        .store
        .get_match(job.game_type, &job.arena_unique_id)
        .await?
        .ok_or_else(|| anyhow!("no match record for arena {}", job.arena_unique_id))?;
    let uploads = ctx
        .store
        .get_uploads(job.game_type, &job.arena_unique_id)
        .await?;

    let renderer = MinimapRenderer::new(ctx.options.clone())
        .map_err(|e| anyhow!("renderer setup: {e}"))?;

    let (mp4, tag) = if job.dual {
        render_dual(ctx, &record, &uploads, &renderer).await?
    } else {
        render_single(ctx, &record, &uploads, &renderer).await?
    };

    let key = video_key(&job.arena_unique_id, tag);
    ctx.objects.put(&key, mp4, "video/mp4").await?;

    let update = if job.dual {
        VideoUpdate::Dual { s3_key: key }
    } else {
        VideoUpdate::Single {
            s3_key: key,
            generated_at: chrono::Utc::now().timestamp(),
        }
    };
    ctx.persister
        .record_video(job.game_type, &job.arena_unique_id, update)
        .await?;

    // Match-ready notification policy: clan battles only.
    if job.game_type == GameType::Clan {
        if let Some(notifier) = &ctx.notifier {
            notifier.clone().spawn_match_ready(record);
        }
    }
    Ok(())
}

async fn render_single(
    ctx: &RenderContext,
    record: &MatchRecord,
    uploads: &[UploadRecord],
    renderer: &MinimapRenderer,
) -> Result<(Vec<u8>, &'static str)> {
    let upload = uploads
        .first()
        .ok_or_else(|| anyhow!("match has no uploads"))?;
    let decoded = decode_upload(ctx, upload).await?;

    let roster = full_roster(record, &decoded);
    let input = RenderInput {
        timeline: &decoded.timeline,
        roster,
    };
    let mp4 = renderer
        .render_mp4(
            &[input],
            &tag_or(&record.ally_main_clan_tag, "ALLY"),
            &tag_or(&record.enemy_main_clan_tag, "ENEMY"),
        )
        .map_err(|e| anyhow!("render: {e}"))?;
    Ok((mp4, "single"))
}

/// Combined two-perspective render: each side's friendly tracks drawn
/// from its own replay so both teams get full detection-free coverage.
async fn render_dual(
    ctx: &RenderContext,
    record: &MatchRecord,
    uploads: &[UploadRecord],
    renderer: &MinimapRenderer,
) -> Result<(Vec<u8>, &'static str)> {
    let green_upload = uploads
        .iter()
        .find(|u| u.team == Team::Ally)
        .ok_or_else(|| anyhow!("dual render without an ally-side upload"))?;
    let red_upload = uploads
        .iter()
        .find(|u| u.team == Team::Enemy)
        .ok_or_else(|| anyhow!("dual render without an enemy-side upload"))?;

    let green = decode_upload(ctx, green_upload).await?;
    let red = decode_upload(ctx, red_upload).await?;

    let green_input = RenderInput {
        roster: friendly_roster(&green, TeamSide::Green),
        timeline: &green.timeline,
    };
    let red_input = RenderInput {
        roster: friendly_roster(&red, TeamSide::Red),
        timeline: &red.timeline,
    };

    let mp4 = renderer
        .render_mp4(
            &[green_input, red_input],
            &tag_or(&record.ally_main_clan_tag, "GREEN"),
            &tag_or(&record.enemy_main_clan_tag, "RED"),
        )
        .map_err(|e| anyhow!("dual render: {e}"))?;
    Ok((mp4, "dual"))
}

async fn decode_upload(ctx: &RenderContext, upload: &UploadRecord) -> Result<DecodedReplay> {
    let bytes = ctx
        .objects
        .get(&upload.s3_key)
        .await?
        .ok_or_else(|| anyhow!("replay object {} is gone", upload.s3_key))?;
    ReplayDecoder::new()
        .decode(&bytes)
        .context("decoding replay for render")
}

/// Single render roster: every known player, colored by side.
fn full_roster(record: &MatchRecord, decoded: &DecodedReplay) -> Vec<RosterEntry> {
    let mut roster = Vec::new();
    for (side, players) in [
        (TeamSide::Green, &record.allies),
        (TeamSide::Red, &record.enemies),
    ] {
        for player in players {
            if let Some(state) = decoded.hidden.player_by_name(&player.name) {
                roster.push(RosterEntry {
                    player_id: state.id,
                    name: player.name.clone(),
                    ship_name: player.ship_name.clone(),
                    side,
                });
            }
        }
    }
    roster
}

/// Dual render roster: only the recorder's own team from each replay.
fn friendly_roster(decoded: &DecodedReplay, side: TeamSide) -> Vec<RosterEntry> {
    let Some(own_team) = decoded.own_team_id() else {
        return Vec::new();
    };
    decoded
        .hidden
        .players
        .values()
        .filter(|p| p.team_id == own_team)
        .map(|p| RosterEntry {
            player_id: p.id,
            name: p.name.clone(),
            ship_name: String::new(),
            side,
        })
        .collect()
}

fn tag_or(tag: &str, fallback: &str) -> String {
    if tag.is_empty() {
        fallback.to_string()
    } else {
        tag.to_string()
    }
}
