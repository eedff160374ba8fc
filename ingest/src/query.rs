//! Read side: paginated search and the match-detail join.
//!
//! The most selective reverse index answers first (ship, then player,
//! then clan); everything it cannot express applies as a post-scan
//! predicate over the listing. Correctness leans on the persister's
//! invariants: one MATCH per arena id, index rows written with the first
//! upload.

use crate::records::{parse_index_sk, GameType, MatchRecord, StatsRecord, UploadRecord};
use crate::store::{BattleStore, ListingQuery, ObjectStore, SearchIndexStore, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use wows_replay_parser::types::{Team, WinLoss};

const DEFAULT_LIMIT: usize = 30;
/// How many index rows one dimension contributes before intersection.
const INDEX_FAN_IN: usize = 500;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchFilters {
    pub game_type: Option<GameType>,
    pub map_id: Option<String>,
    pub ally_clan_tag: Option<String>,
    pub enemy_clan_tag: Option<String>,
    pub ship_name: Option<String>,
    pub ship_team: Option<Team>,
    pub ship_min_count: Option<u32>,
    pub player_name: Option<String>,
    pub clan_tag: Option<String>,
    pub win_loss: Option<WinLoss>,
    /// `YYYY-MM-DD`, inclusive.
    pub date_from: Option<String>,
    /// `YYYY-MM-DD`, inclusive.
    pub date_to: Option<String>,
    pub limit: Option<usize>,
    pub cursor_unix_time: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub items: Vec<MatchRecord>,
    pub count: usize,
    pub cursor_unix_time: Option<i64>,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDetail {
    #[serde(rename = "match")]
    pub match_record: MatchRecord,
    pub stats: Option<StatsRecord>,
    pub uploads: Vec<UploadRecord>,
    pub video_url: Option<String>,
    pub dual_video_url: Option<String>,
}

/// Normalize a ship-name filter to the stored title-cased form, keeping
/// known collab prefixes upper-cased.
pub fn normalize_ship_name(name: &str) -> String {
    const UPPER_PREFIXES: [&str; 4] = ["AL ", "BA ", "GQ ", "STAR "];

    let mut titled = String::with_capacity(name.len());
    let mut at_word_start = true;
    for ch in name.chars() {
        if at_word_start {
            titled.extend(ch.to_uppercase());
        } else {
            titled.extend(ch.to_lowercase());
        }
        at_word_start = ch.is_whitespace() || ch == '-';
    }

    for prefix in UPPER_PREFIXES {
        let title_prefix: String = normalize_word(prefix);
        if titled.starts_with(&title_prefix) {
            return format!("{prefix}{}", &titled[title_prefix.len()..]);
        }
    }
    titled
}

fn normalize_word(prefix: &str) -> String {
    let mut out = String::new();
    let mut at_start = true;
    for ch in prefix.chars() {
        if at_start {
            out.extend(ch.to_uppercase());
        } else {
            out.extend(ch.to_lowercase());
        }
        at_start = ch.is_whitespace();
    }
    out
}

pub struct QueryGateway {
    store: Arc<dyn BattleStore>,
    index: Arc<dyn SearchIndexStore>,
    objects: Arc<dyn ObjectStore>,
    presign_expiry_seconds: u64,
}

impl QueryGateway {
    pub fn new(
        store: Arc<dyn BattleStore>,
        index: Arc<dyn SearchIndexStore>,
        objects: Arc<dyn ObjectStore>,
        presign_expiry_seconds: u64,
    ) -> Self {
        QueryGateway {
            store,
            index,
            objects,
            presign_expiry_seconds,
        }
    }

    pub async fn search(&self, filters: &SearchFilters) -> StoreResult<SearchResponse> {
        let limit = filters.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 200);

        // Arena-id pre-filter from the reverse indexes, most selective
        // dimension first; multiple dimensions intersect.
        let arena_filter = self.index_prefilter(filters).await?;

        let game_types = match filters.game_type {
            Some(gt) => vec![gt],
            None => GameType::ALL.to_vec(),
        };

        let between = date_range_to_unix(filters.date_from.as_deref(), filters.date_to.as_deref());
        let listing = ListingQuery {
            map_id: filters.map_id.clone(),
            before_unix_time: filters.cursor_unix_time,
            between,
            // Over-fetch: post predicates may drop rows.
            limit: limit * 3,
        };

        let mut items = Vec::new();
        for game_type in game_types {
            let matches = self.store.list_matches(game_type, &listing).await?;
            for record in matches {
                if let Some(allowed) = &arena_filter {
                    if !allowed.contains(&record.arena_unique_id) {
                        continue;
                    }
                }
                if !post_predicates(&record, filters) {
                    continue;
                }
                items.push(record);
            }
        }

        items.sort_by(|a, b| b.unix_time.cmp(&a.unix_time));
        let has_more = items.len() > limit;
        items.truncate(limit);
        let cursor_unix_time = if has_more {
            items.last().map(|m| m.unix_time)
        } else {
            None
        };

        Ok(SearchResponse {
            count: items.len(),
            cursor_unix_time,
            has_more,
            items,
        })
    }

    /// One read of MATCH, one of STATS, N of UPLOAD, plus presigned video
    /// URLs. The owning table is probed across game types because the
    /// arena id alone does not name it.
    pub async fn match_detail(&self, arena_id: &str) -> StoreResult<Option<MatchDetail>> {
        let Some((game_type, match_record)) = self.find_match(arena_id).await? else {
            return Ok(None);
        };

        let stats = self.store.get_stats(game_type, arena_id).await?;
        let uploads = self.store.get_uploads(game_type, arena_id).await?;

        let video_url = match &match_record.mp4_s3_key {
            Some(key) => Some(
                self.objects
                    .presign_get(key, self.presign_expiry_seconds)
                    .await?,
            ),
            None => None,
        };
        let dual_video_url = match &match_record.dual_mp4_s3_key {
            Some(key) => Some(
                self.objects
                    .presign_get(key, self.presign_expiry_seconds)
                    .await?,
            ),
            None => None,
        };

        Ok(Some(MatchDetail {
            match_record,
            stats,
            uploads,
            video_url,
            dual_video_url,
        }))
    }

    pub async fn find_match(
        &self,
        arena_id: &str,
    ) -> StoreResult<Option<(GameType, MatchRecord)>> {
        for game_type in GameType::ALL {
            if let Some(record) = self.store.get_match(game_type, arena_id).await? {
                return Ok(Some((game_type, record)));
            }
        }
        Ok(None)
    }

    async fn index_prefilter(
        &self,
        filters: &SearchFilters,
    ) -> StoreResult<Option<HashSet<String>>> {
        let mut result: Option<HashSet<String>> = None;

        if let Some(ship_name) = &filters.ship_name {
            let normalized = normalize_ship_name(ship_name).to_uppercase();
            let rows = self
                .index
                .query_ship(&normalized, filters.game_type, INDEX_FAN_IN)
                .await?;
            let min_count = filters.ship_min_count.unwrap_or(1);
            let ids: HashSet<String> = rows
                .iter()
                .filter(|row| match filters.ship_team {
                    Some(Team::Ally) => row.ally_count >= min_count,
                    Some(Team::Enemy) => row.enemy_count >= min_count,
                    None => row.total_count >= min_count,
                })
                .filter_map(|row| parse_index_sk(&row.sk).map(|p| p.arena_unique_id))
                .collect();
            debug!(ship = %normalized, matches = ids.len(), "ship index filter");
            result = Some(ids);
        }

        if let Some(player_name) = &filters.player_name {
            let rows = self
                .index
                .query_player(player_name, filters.game_type, INDEX_FAN_IN)
                .await?;
            let ids: HashSet<String> = rows
                .iter()
                .filter_map(|row| parse_index_sk(&row.sk).map(|p| p.arena_unique_id))
                .collect();
            debug!(player = %player_name, matches = ids.len(), "player index filter");
            result = Some(match result {
                Some(existing) => existing.intersection(&ids).cloned().collect(),
                None => ids,
            });
        }

        if let Some(clan_tag) = &filters.clan_tag {
            let rows = self
                .index
                .query_clan(clan_tag, filters.game_type, INDEX_FAN_IN)
                .await?;
            let ids: HashSet<String> = rows
                .iter()
                .filter_map(|row| parse_index_sk(&row.sk).map(|p| p.arena_unique_id))
                .collect();
            debug!(clan = %clan_tag, matches = ids.len(), "clan index filter");
            result = Some(match result {
                Some(existing) => existing.intersection(&ids).cloned().collect(),
                None => ids,
            });
        }

        Ok(result)
    }
}

fn post_predicates(record: &MatchRecord, filters: &SearchFilters) -> bool {
    if let Some(tag) = &filters.ally_clan_tag {
        if &record.ally_main_clan_tag != tag {
            return false;
        }
    }
    if let Some(tag) = &filters.enemy_clan_tag {
        if &record.enemy_main_clan_tag != tag {
            return false;
        }
    }
    if let Some(win_loss) = filters.win_loss {
        if record.win_loss != win_loss {
            return false;
        }
    }
    true
}

/// Lower a `YYYY-MM-DD` range onto the `unixTime` index attribute.
fn date_range_to_unix(from: Option<&str>, to: Option<&str>) -> Option<(i64, i64)> {
    fn day_start(date: &str) -> Option<i64> {
        chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .ok()?
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
    }

    match (from, to) {
        (None, None) => None,
        (from, to) => {
            let start = from.and_then(day_start).unwrap_or(0);
            // End of day: start of the next day minus one second.
            let end = to
                .and_then(day_start)
                .map(|t| t + 86_399)
                .unwrap_or(i64::MAX);
            Some((start, end))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ship_name_normalization() {
        assert_eq!(normalize_ship_name("chung mu"), "Chung Mu");
        assert_eq!(normalize_ship_name("DES MOINES"), "Des Moines");
        assert_eq!(normalize_ship_name("al montpelier"), "AL Montpelier");
    }

    #[test]
    fn date_range_lowering() {
        let (from, to) = date_range_to_unix(Some("2026-01-03"), Some("2026-01-03")).unwrap();
        assert_eq!(to - from, 86_399);

        let (from, to) = date_range_to_unix(None, Some("2026-01-03")).unwrap();
        assert_eq!(from, 0);
        assert!(to > 0);

        assert!(date_range_to_unix(None, None).is_none());
    }
}
