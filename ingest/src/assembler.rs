//! Match assembly: a decoded replay plus parsed statistics become the
//! MATCH / STATS / UPLOAD records and their derived search fields.

use crate::records::{
    GameType, MatchRecord, PlayerRef, StatsRecord, UploadRecord, UploaderRef, LISTING_KEY_ACTIVE,
};
use chrono::{NaiveDateTime, Timelike};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use wows_replay_parser::decoder::DecodedReplay;
use wows_replay_parser::stats::{determine_win_loss, PlayerStats};
use wows_replay_parser::stats::ship_params::ShipParams;
use wows_replay_parser::types::{Relation, ShipParamsId, Team};

const DATE_TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";
const SORTABLE_FORMAT: &str = "%Y%m%d%H%M%S";
pub const EMPTY_SORTABLE: &str = "00000000000000";

/// `DD.MM.YYYY HH:MM:SS` to the sortable `YYYYMMDDHHMMSS` form. The raw
/// format does not sort lexicographically across year boundaries; this one
/// does. Unparsable input sorts to the bottom.
pub fn format_sortable_datetime(date_time: &str) -> String {
    match NaiveDateTime::parse_from_str(date_time, DATE_TIME_FORMAT) {
        Ok(dt) => dt.format(SORTABLE_FORMAT).to_string(),
        Err(_) => EMPTY_SORTABLE.to_string(),
    }
}

/// Inverse of `format_sortable_datetime` for valid values.
pub fn parse_sortable_datetime(sortable: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(sortable, SORTABLE_FORMAT).ok()
}

/// Seconds since epoch, 0 for unparsable input so empty dates sort last in
/// descending listings but still exist.
pub fn parse_datetime_to_unix(date_time: &str) -> i64 {
    NaiveDateTime::parse_from_str(date_time, DATE_TIME_FORMAT)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}

/// Round a battle time down to its 5-minute bucket. Times already on a
/// boundary map to themselves. Unparsable input passes through untouched.
pub fn round_datetime_to_5min(date_time: &str) -> String {
    match NaiveDateTime::parse_from_str(date_time, DATE_TIME_FORMAT) {
        Ok(dt) => {
            let rounded = dt
                .with_second(0)
                .and_then(|d| d.with_minute(d.minute() / 5 * 5))
                .unwrap_or(dt);
            rounded.format(DATE_TIME_FORMAT).to_string()
        }
        Err(_) => date_time.to_string(),
    }
}

/// Stable grouping key for one server-side battle, independent of which
/// uploader submitted first and tolerant of small clock skew between
/// clients: 5-minute-rounded time, map, game type and the sorted player
/// set, hashed.
pub fn compute_match_key(
    date_time: &str,
    map_id: &str,
    game_type: GameType,
    player_names: &[String],
) -> String {
    let mut names: Vec<&str> = player_names.iter().map(String::as_str).collect();
    names.sort_unstable();
    names.dedup();

    let rounded = round_datetime_to_5min(date_time);
    let seed = format!("{rounded}|{map_id}|{game_type}|{}", names.join("|"));
    hex::encode(Sha256::digest(seed.as_bytes()))
}

/// Most common clan tag of a roster. Requires at least two players sharing
/// the tag (a lone tag does not make a clan team); ties break to the
/// lexicographically smallest tag so the result is deterministic.
pub fn main_clan_tag(players: &[PlayerRef]) -> Option<String> {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for player in players {
        if !player.clan_tag.is_empty() {
            *counts.entry(player.clan_tag.as_str()).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n >= 2)
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(tag, _)| tag.to_string())
}

/// Everything about one upload, ready for the persister.
#[derive(Debug, Clone)]
pub struct AssembledMatch {
    pub game_type: GameType,
    pub match_record: MatchRecord,
    /// Absent when the replay carried no battle statistics.
    pub stats_record: Option<StatsRecord>,
    pub upload_record: UploadRecord,
}

/// Context of the upload itself (object key, size, uploader identity).
#[derive(Debug, Clone)]
pub struct UploadContext {
    pub s3_key: String,
    pub file_name: String,
    pub file_size: u64,
    pub uploaded_by: String,
}

/// Builds persistence records out of decoder output. Holds the immutable
/// ship side table; construct once and share.
pub struct MatchAssembler<'a> {
    ships: &'a ShipParams,
}

impl<'a> MatchAssembler<'a> {
    pub fn new(ships: &'a ShipParams) -> Self {
        MatchAssembler { ships }
    }

    pub fn assemble(
        &self,
        decoded: &DecodedReplay,
        stats: &[PlayerStats],
        upload: UploadContext,
    ) -> AssembledMatch {
        let game_type = GameType::normalize(decoded.meta.game_type());
        let arena_unique_id = decoded
            .arena_id
            .map(|id| id.to_string())
            .unwrap_or_default();
        let date_time = decoded.meta.dateTime.clone();
        let unix_time = parse_datetime_to_unix(&date_time);

        let allies = self.roster(decoded, Relation::Own);
        let enemies = self.roster(decoded, Relation::Enemy);

        let all_names: Vec<String> = decoded
            .meta
            .vehicles
            .iter()
            .map(|v| v.name.clone())
            .collect();
        let match_key = compute_match_key(&date_time, &decoded.map_id, game_type, &all_names);

        // Clan tags only mark a clan battle when a team actually shares one.
        let ally_main_clan_tag = main_clan_tag(&allies).unwrap_or_default();
        let enemy_main_clan_tag = main_clan_tag(&enemies).unwrap_or_default();

        let own_team_id = decoded.own_team_id();
        let win_loss = determine_win_loss(
            decoded.hidden.battle_result,
            own_team_id,
            game_type == GameType::Clan,
            decoded.battle_stats.as_ref().and_then(|b| b.raw_experience()),
        );

        let player_id = decoded.meta.playerID;
        let player_name = decoded.meta.playerName.clone();

        let match_record = MatchRecord {
            arena_unique_id: arena_unique_id.clone(),
            listing_key: LISTING_KEY_ACTIVE.to_string(),
            unix_time,
            date_time_sortable: format_sortable_datetime(&date_time),
            date_time,
            match_key,
            map_id: decoded.map_id.clone(),
            map_display_name: decoded.meta.mapDisplayName.clone(),
            client_version: decoded.version.to_string(),
            game_type,
            ally_perspective_player_id: player_id,
            ally_perspective_player_name: player_name.clone(),
            win_loss,
            ally_main_clan_tag,
            enemy_main_clan_tag,
            allies,
            enemies,
            mp4_s3_key: None,
            mp4_generated_at: None,
            dual_mp4_s3_key: None,
            has_dual_replay: false,
            uploaders: vec![UploaderRef {
                player_id,
                player_name: player_name.clone(),
                team: Team::Ally,
            }],
            revision: 1,
        };

        let stats_record = decoded.battle_stats.as_ref().map(|_| StatsRecord {
            arena_unique_id: arena_unique_id.clone(),
            all_players_stats: stats.to_vec(),
        });

        let own_stats = stats.iter().find(|s| s.is_own).cloned();
        let own_player = self.own_player_ref(decoded);
        let upload_record = UploadRecord {
            arena_unique_id,
            player_id,
            player_name,
            team: Team::Ally,
            s3_key: upload.s3_key,
            file_name: upload.file_name,
            file_size: upload.file_size,
            uploaded_at: unix_time,
            uploaded_by: upload.uploaded_by,
            own_player,
            stats: own_stats,
            experience_earned: decoded.experience_earned(),
        };

        AssembledMatch {
            game_type,
            match_record,
            stats_record,
            upload_record,
        }
    }

    /// Roster of one side. `Relation::Own` selects the friendly side
    /// including the recorder; anything else the enemy side.
    fn roster(&self, decoded: &DecodedReplay, side: Relation) -> Vec<PlayerRef> {
        decoded
            .meta
            .vehicles
            .iter()
            .filter(|v| Relation::from_raw(v.relation).is_friendly() == side.is_friendly())
            .map(|v| {
                let clan_tag = decoded
                    .hidden
                    .player_by_name(&v.name)
                    .map(|p| p.clan_tag.clone())
                    .unwrap_or_default();
                PlayerRef {
                    name: v.name.clone(),
                    clan_tag,
                    ship_name: self.ships.ship_name(ShipParamsId(v.shipId)),
                    ship_id: v.shipId,
                }
            })
            .collect()
    }

    fn own_player_ref(&self, decoded: &DecodedReplay) -> PlayerRef {
        decoded
            .meta
            .own_vehicle()
            .map(|v| PlayerRef {
                name: v.name.clone(),
                clan_tag: decoded
                    .hidden
                    .player_by_name(&v.name)
                    .map(|p| p.clan_tag.clone())
                    .unwrap_or_default(),
                ship_name: self.ships.ship_name(ShipParamsId(v.shipId)),
                ship_id: v.shipId,
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sortable_datetime_round_trip() {
        let sortable = format_sortable_datetime("03.01.2026 23:28:22");
        assert_eq!(sortable, "20260103232822");
        assert_eq!(sortable.len(), 14);

        let back = parse_sortable_datetime(&sortable).unwrap();
        assert_eq!(back.format("%d.%m.%Y %H:%M:%S").to_string(), "03.01.2026 23:28:22");
    }

    #[test]
    fn empty_or_malformed_datetime_sorts_to_bottom() {
        assert_eq!(format_sortable_datetime(""), EMPTY_SORTABLE);
        assert_eq!(format_sortable_datetime("2026-01-03 23:28"), EMPTY_SORTABLE);
        assert_eq!(parse_datetime_to_unix(""), 0);
    }

    #[test]
    fn sortable_order_survives_year_boundary() {
        let old = format_sortable_datetime("31.12.2025 23:59:00");
        let new = format_sortable_datetime("01.01.2026 00:01:00");
        // Raw strings compare the wrong way around; sortable compares right.
        assert!("31.12.2025 23:59:00" > "01.01.2026 00:01:00");
        assert!(new > old);
    }

    #[test]
    fn five_minute_rounding_rounds_down() {
        assert_eq!(
            round_datetime_to_5min("04.01.2026 21:56:55"),
            "04.01.2026 21:55:00"
        );
        // Exact boundaries map to themselves.
        assert_eq!(
            round_datetime_to_5min("04.01.2026 21:55:00"),
            "04.01.2026 21:55:00"
        );
    }

    #[test]
    fn match_key_is_order_insensitive_and_skew_tolerant() {
        let names_a = vec!["zulu".to_string(), "alpha".to_string(), "mike".to_string()];
        let names_b = vec!["mike".to_string(), "zulu".to_string(), "alpha".to_string()];

        let a = compute_match_key("04.01.2026 21:56:10", "spaces/19_OC_prey", GameType::Clan, &names_a);
        let b = compute_match_key("04.01.2026 21:56:55", "spaces/19_OC_prey", GameType::Clan, &names_b);
        assert_eq!(a, b);

        // A different map is a different match.
        let c = compute_match_key("04.01.2026 21:56:10", "spaces/22_tierra", GameType::Clan, &names_a);
        assert_ne!(a, c);
    }

    #[test]
    fn main_clan_tag_majority_and_ties() {
        let mk = |tags: &[&str]| -> Vec<PlayerRef> {
            tags.iter()
                .map(|t| PlayerRef {
                    name: "p".into(),
                    clan_tag: t.to_string(),
                    ..Default::default()
                })
                .collect()
        };

        assert_eq!(
            main_clan_tag(&mk(&["OZEKI", "OZEKI", "OZEKI", "KNAVE"])),
            Some("OZEKI".to_string())
        );
        // Ties break lexicographically.
        assert_eq!(
            main_clan_tag(&mk(&["ZETA", "ZETA", "ALFA", "ALFA"])),
            Some("ALFA".to_string())
        );
        // A lone tag is not a clan team.
        assert_eq!(main_clan_tag(&mk(&["SOLO", "", ""])), None);
        assert_eq!(main_clan_tag(&[]), None);
    }
}
