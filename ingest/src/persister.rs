//! The write protocol.
//!
//! One assembled upload becomes at most one MATCH record, one STATS
//! record, one UPLOAD record and the reverse-index rows. Correctness under
//! concurrent uploads of the same battle rests on two conditional writes:
//! create-if-absent for MATCH/STATS, and a revision compare-and-set for
//! the merge path. Index rows are written only when this call created the
//! MATCH record.

use crate::assembler::AssembledMatch;
use crate::records::{
    create_index_sk, ClanIndexRow, DecodeFailureRecord, GameType, MatchRecord, PlayerIndexRow,
    ShipIndexRow, UploaderRef,
};
use crate::store::{
    BattleStore, ListingQuery, SearchIndexStore, StoreError, StoreResult, VideoUpdate,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use wows_replay_parser::types::Team;

const MAX_MERGE_ATTEMPTS: u32 = 4;
const BASE_BACKOFF_MS: u64 = 25;

/// What a persist call did; drives render scheduling downstream.
#[derive(Debug, Clone)]
pub struct PersistOutcome {
    pub game_type: GameType,
    pub arena_unique_id: String,
    /// This call created the MATCH record.
    pub created: bool,
    /// This call flipped `hasDualReplay` from false to true.
    pub dual_flipped: bool,
    /// Team the uploader ended up on relative to the stored perspective.
    pub team: Team,
}

pub struct Persister {
    store: Arc<dyn BattleStore>,
    index: Arc<dyn SearchIndexStore>,
}

impl Persister {
    pub fn new(store: Arc<dyn BattleStore>, index: Arc<dyn SearchIndexStore>) -> Self {
        Persister { store, index }
    }

    pub async fn persist(&self, assembled: &AssembledMatch) -> StoreResult<PersistOutcome> {
        let game_type = assembled.game_type;
        let arena_id = assembled.match_record.arena_unique_id.clone();

        let mut outcome = self.write_match(assembled).await?;

        // STATS: first uploader wins, later uploads never overwrite.
        if let Some(stats) = &assembled.stats_record {
            let created = self.store.put_stats_if_absent(game_type, stats).await?;
            if !created {
                debug!(arena = %arena_id, "stats record already present");
            }
        }

        // UPLOAD: unconditional, keyed by the uploader's own player id.
        let mut upload = assembled.upload_record.clone();
        upload.team = outcome.team;
        self.store.put_upload(game_type, &upload).await?;

        // Reverse indexes exist from the moment the match is first seen;
        // merges never amend them.
        if outcome.created {
            self.write_indexes(game_type, &assembled.match_record).await?;
        }

        info!(
            arena = %arena_id,
            game_type = %game_type,
            created = outcome.created,
            dual = outcome.dual_flipped,
            "upload persisted"
        );
        outcome.arena_unique_id = arena_id;
        Ok(outcome)
    }

    /// Step 2: create-or-merge of the MATCH record, retried under a small
    /// backoff when a concurrent uploader wins the race.
    async fn write_match(&self, assembled: &AssembledMatch) -> StoreResult<PersistOutcome> {
        let game_type = assembled.game_type;
        let fresh = &assembled.match_record;

        for attempt in 0..MAX_MERGE_ATTEMPTS {
            match self.store.get_match(game_type, &fresh.arena_unique_id).await? {
                None => {
                    if self.store.put_match_if_absent(game_type, fresh).await? {
                        return Ok(PersistOutcome {
                            game_type,
                            arena_unique_id: String::new(),
                            created: true,
                            dual_flipped: false,
                            team: Team::Ally,
                        });
                    }
                    // Lost the create race; fall through to re-read.
                }
                Some(existing) => {
                    let uploader = &assembled.upload_record;
                    let team = if existing.is_ally_name(&uploader.player_name) {
                        Team::Ally
                    } else {
                        Team::Enemy
                    };

                    if existing.has_uploader(uploader.player_id) {
                        // Same player re-uploading: MATCH unchanged.
                        return Ok(PersistOutcome {
                            game_type,
                            arena_unique_id: String::new(),
                            created: false,
                            dual_flipped: false,
                            team,
                        });
                    }

                    let mut merged = existing.clone();
                    merged.uploaders.push(UploaderRef {
                        player_id: uploader.player_id,
                        player_name: uploader.player_name.clone(),
                        team,
                    });
                    let dual_flipped = team == Team::Enemy && !existing.has_dual_replay;
                    if dual_flipped {
                        merged.has_dual_replay = true;
                    }
                    merged.revision = existing.revision + 1;

                    match self
                        .store
                        .update_match_cas(game_type, &merged, existing.revision)
                        .await
                    {
                        Ok(()) => {
                            return Ok(PersistOutcome {
                                game_type,
                                arena_unique_id: String::new(),
                                created: false,
                                dual_flipped,
                                team,
                            });
                        }
                        Err(StoreError::Conflict) => {
                            warn!(
                                arena = %fresh.arena_unique_id,
                                attempt,
                                "match merge lost a race, retrying"
                            );
                        }
                        Err(e) => return Err(e),
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(BASE_BACKOFF_MS << attempt)).await;
        }

        // Exhausted retries: transient by contract, the storage event will
        // re-trigger this upload.
        Err(StoreError::Conflict)
    }

    /// Step 5: one row per (dimension value, arena id) tuple.
    async fn write_indexes(&self, game_type: GameType, record: &MatchRecord) -> StoreResult<()> {
        let sk = create_index_sk(game_type, record.unix_time, &record.arena_unique_id);

        // Ship rows: counts per side for the team filter.
        let mut ship_counts: HashMap<String, (u32, u32)> = HashMap::new();
        for player in &record.allies {
            if !player.ship_name.is_empty() {
                ship_counts.entry(player.ship_name.to_uppercase()).or_default().0 += 1;
            }
        }
        for player in &record.enemies {
            if !player.ship_name.is_empty() {
                ship_counts.entry(player.ship_name.to_uppercase()).or_default().1 += 1;
            }
        }
        let ship_rows: Vec<ShipIndexRow> = ship_counts
            .into_iter()
            .map(|(ship_name, (ally_count, enemy_count))| ShipIndexRow {
                ship_name,
                sk: sk.clone(),
                ally_count,
                enemy_count,
                total_count: ally_count + enemy_count,
            })
            .collect();
        self.index.put_ship_rows(&ship_rows).await?;

        let mut player_rows = Vec::new();
        for (team, roster) in [(Team::Ally, &record.allies), (Team::Enemy, &record.enemies)] {
            for player in roster {
                if player.name.is_empty() {
                    continue;
                }
                player_rows.push(PlayerIndexRow {
                    player_name: player.name.clone(),
                    sk: sk.clone(),
                    team,
                    clan_tag: player.clan_tag.clone(),
                    ship_name: player.ship_name.clone(),
                });
            }
        }
        self.index.put_player_rows(&player_rows).await?;

        let mut clan_counts: HashMap<String, (u32, u32)> = HashMap::new();
        for player in &record.allies {
            if !player.clan_tag.is_empty() {
                clan_counts.entry(player.clan_tag.clone()).or_default().0 += 1;
            }
        }
        for player in &record.enemies {
            if !player.clan_tag.is_empty() {
                clan_counts.entry(player.clan_tag.clone()).or_default().1 += 1;
            }
        }
        let clan_rows: Vec<ClanIndexRow> = clan_counts
            .into_iter()
            .map(|(clan_tag, (ally, enemy))| ClanIndexRow {
                is_main_clan: clan_tag == record.ally_main_clan_tag
                    || clan_tag == record.enemy_main_clan_tag,
                team: if ally >= enemy { Team::Ally } else { Team::Enemy },
                member_count: ally + enemy,
                sk: sk.clone(),
                clan_tag,
            })
            .collect();
        self.index.put_clan_rows(&clan_rows).await?;

        Ok(())
    }

    /// Admin backfill: re-emit the reverse-index rows for every MATCH
    /// record of one battle table. Rows are keyed upserts, so running this
    /// twice converges on the same state.
    pub async fn reindex(&self, game_type: GameType) -> StoreResult<usize> {
        const PAGE: usize = 100;
        let mut reindexed = 0;
        let mut cursor: Option<i64> = None;

        loop {
            let page = self
                .store
                .list_matches(
                    game_type,
                    &ListingQuery {
                        before_unix_time: cursor,
                        limit: PAGE,
                        ..ListingQuery::default()
                    },
                )
                .await?;
            if page.is_empty() {
                break;
            }
            cursor = page.last().map(|m| m.unix_time);
            let page_len = page.len();
            for record in &page {
                self.write_indexes(game_type, record).await?;
                reindexed += 1;
            }
            if page_len < PAGE {
                break;
            }
        }

        info!(game_type = %game_type, reindexed, "index backfill complete");
        Ok(reindexed)
    }

    /// Video-update operation used by the render worker.
    pub async fn record_video(
        &self,
        game_type: GameType,
        arena_id: &str,
        update: VideoUpdate,
    ) -> StoreResult<()> {
        self.store.set_video_keys(game_type, arena_id, &update).await
    }

    pub async fn record_decode_failure(&self, record: &DecodeFailureRecord) -> StoreResult<()> {
        self.store.put_decode_failure(record).await
    }
}

/// Counts of MATCH-related records for one arena id; invariant checks and
/// admin tooling.
pub async fn record_counts(
    store: &dyn BattleStore,
    game_type: GameType,
    arena_id: &str,
) -> StoreResult<(usize, usize, usize)> {
    let matches = usize::from(store.get_match(game_type, arena_id).await?.is_some());
    let stats = usize::from(store.get_stats(game_type, arena_id).await?.is_some());
    let uploads = store.get_uploads(game_type, arena_id).await?.len();
    Ok((matches, stats, uploads))
}
