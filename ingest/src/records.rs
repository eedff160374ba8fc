//! Persisted record models.
//!
//! Three record kinds share the `arenaUniqueID` partition key inside a
//! per-game-type battle table: the MATCH record (one per battle), the
//! STATS record (one, first uploader wins) and one UPLOAD record per
//! uploading player. Three reverse-index tables answer ship/player/clan
//! searches without table scans. Attribute names are camelCase to match
//! the table layout.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use wows_replay_parser::stats::PlayerStats;
use wows_replay_parser::types::{Team, WinLoss};

pub const SK_MATCH: &str = "MATCH";
pub const SK_STATS: &str = "STATS";
pub const SK_UPLOAD_PREFIX: &str = "UPLOAD#";
pub const LISTING_KEY_ACTIVE: &str = "ACTIVE";

/// Normalized game type; controls which battle table a match lands in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Clan,
    Ranked,
    Random,
    Other,
}

impl GameType {
    /// Bucket a raw replay game type. Unknown values land in `other`.
    pub fn normalize(raw: &str) -> GameType {
        match raw.to_ascii_lowercase().as_str() {
            "clan" => GameType::Clan,
            "ranked" => GameType::Ranked,
            "pvp" => GameType::Random,
            "pve" | "cooperative" | "event" => GameType::Other,
            _ => GameType::Other,
        }
    }

    pub const ALL: [GameType; 4] = [
        GameType::Clan,
        GameType::Ranked,
        GameType::Random,
        GameType::Other,
    ];
}

/// One player of a team roster as stored on the MATCH record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRef {
    pub name: String,
    #[serde(default)]
    pub clan_tag: String,
    #[serde(default)]
    pub ship_name: String,
    #[serde(default)]
    pub ship_id: i64,
}

/// One uploader noted on the MATCH record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploaderRef {
    #[serde(rename = "playerID")]
    pub player_id: i64,
    pub player_name: String,
    pub team: Team,
}

/// The per-battle MATCH record. Exactly one exists per arena id per
/// battle table; later uploads merge into it, never duplicate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    #[serde(rename = "arenaUniqueID")]
    pub arena_unique_id: String,
    /// Fixed listing partition so the by-time index can range-scan.
    pub listing_key: String,
    pub unix_time: i64,
    pub date_time: String,
    /// `YYYYMMDDHHMMSS`; lexicographic order equals chronological order.
    pub date_time_sortable: String,
    /// Grouping key that survives arena-id divergence between uploads.
    pub match_key: String,
    pub map_id: String,
    pub map_display_name: String,
    pub client_version: String,
    pub game_type: GameType,
    #[serde(rename = "allyPerspectivePlayerID")]
    pub ally_perspective_player_id: i64,
    pub ally_perspective_player_name: String,
    pub win_loss: WinLoss,
    #[serde(default)]
    pub ally_main_clan_tag: String,
    #[serde(default)]
    pub enemy_main_clan_tag: String,
    pub allies: Vec<PlayerRef>,
    pub enemies: Vec<PlayerRef>,
    #[serde(default)]
    pub mp4_s3_key: Option<String>,
    #[serde(default)]
    pub mp4_generated_at: Option<i64>,
    #[serde(default)]
    pub dual_mp4_s3_key: Option<String>,
    pub has_dual_replay: bool,
    pub uploaders: Vec<UploaderRef>,
    /// Compare-and-set token for merge writes.
    #[serde(default)]
    pub revision: u64,
}

impl MatchRecord {
    pub fn has_uploader(&self, player_id: i64) -> bool {
        self.uploaders.iter().any(|u| u.player_id == player_id)
    }

    pub fn is_ally_name(&self, name: &str) -> bool {
        self.allies.iter().any(|p| p.name == name)
    }
}

/// The per-battle STATS record: every player's decoded scoreboard row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRecord {
    #[serde(rename = "arenaUniqueID")]
    pub arena_unique_id: String,
    pub all_players_stats: Vec<PlayerStats>,
}

/// One uploader's UPLOAD record, keyed `UPLOAD#{playerID}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    #[serde(rename = "arenaUniqueID")]
    pub arena_unique_id: String,
    #[serde(rename = "playerID")]
    pub player_id: i64,
    pub player_name: String,
    pub team: Team,
    pub s3_key: String,
    pub file_name: String,
    pub file_size: u64,
    pub uploaded_at: i64,
    pub uploaded_by: String,
    pub own_player: PlayerRef,
    /// The uploader's own scoreboard row; absent on incomplete replays.
    #[serde(default)]
    pub stats: Option<PlayerStats>,
    #[serde(default)]
    pub experience_earned: Option<i64>,
}

/// Failure marker written when an upload cannot be decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeFailureRecord {
    pub upload_key: String,
    pub error_kind: String,
    pub message: String,
    pub failed_at: i64,
}

// ── Reverse index rows ──────────────────────────────────────────────────

/// Index sort key `{gameType}#{unixTime}#{arenaUniqueID}`; range queries by
/// time stay monotonic within a game type.
pub fn create_index_sk(game_type: GameType, unix_time: i64, arena_unique_id: &str) -> String {
    format!("{game_type}#{unix_time}#{arena_unique_id}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexSkParts {
    pub game_type: GameType,
    pub unix_time: i64,
    pub arena_unique_id: String,
}

pub fn parse_index_sk(sk: &str) -> Option<IndexSkParts> {
    let mut parts = sk.splitn(3, '#');
    let game_type = parts.next()?.parse().ok()?;
    let unix_time = parts.next()?.parse().ok()?;
    let arena_unique_id = parts.next()?.to_string();
    Some(IndexSkParts {
        game_type,
        unix_time,
        arena_unique_id,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipIndexRow {
    /// Upper-cased for exact-match lookups.
    pub ship_name: String,
    #[serde(rename = "SK")]
    pub sk: String,
    pub ally_count: u32,
    pub enemy_count: u32,
    pub total_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerIndexRow {
    pub player_name: String,
    #[serde(rename = "SK")]
    pub sk: String,
    pub team: Team,
    pub clan_tag: String,
    pub ship_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanIndexRow {
    pub clan_tag: String,
    #[serde(rename = "SK")]
    pub sk: String,
    pub team: Team,
    pub member_count: u32,
    pub is_main_clan: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_type_normalization() {
        assert_eq!(GameType::normalize("clan"), GameType::Clan);
        assert_eq!(GameType::normalize("PVP"), GameType::Random);
        assert_eq!(GameType::normalize("ranked"), GameType::Ranked);
        assert_eq!(GameType::normalize("cooperative"), GameType::Other);
        assert_eq!(GameType::normalize("brawl2026"), GameType::Other);
    }

    #[test]
    fn index_sk_round_trip() {
        let sk = create_index_sk(GameType::Clan, 1_767_000_000, "7700000001");
        assert_eq!(sk, "clan#1767000000#7700000001");
        let parts = parse_index_sk(&sk).unwrap();
        assert_eq!(parts.game_type, GameType::Clan);
        assert_eq!(parts.unix_time, 1_767_000_000);
        assert_eq!(parts.arena_unique_id, "7700000001");
    }

    #[test]
    fn malformed_index_sk_is_none() {
        assert!(parse_index_sk("clan#oops").is_none());
        assert!(parse_index_sk("").is_none());
    }

    #[test]
    fn match_record_serializes_with_table_attribute_names() {
        let record = MatchRecord {
            arena_unique_id: "1".into(),
            listing_key: LISTING_KEY_ACTIVE.into(),
            unix_time: 5,
            date_time: "03.01.2026 23:28:22".into(),
            date_time_sortable: "20260103232822".into(),
            match_key: "k".into(),
            map_id: "spaces/19_OC_prey".into(),
            map_display_name: String::new(),
            client_version: "14.11.0".into(),
            game_type: GameType::Clan,
            ally_perspective_player_id: 9,
            ally_perspective_player_name: "p".into(),
            win_loss: WinLoss::Win,
            ally_main_clan_tag: "OZEKI".into(),
            enemy_main_clan_tag: String::new(),
            allies: vec![],
            enemies: vec![],
            mp4_s3_key: None,
            mp4_generated_at: None,
            dual_mp4_s3_key: None,
            has_dual_replay: false,
            uploaders: vec![],
            revision: 1,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("arenaUniqueID").is_some());
        assert!(json.get("listingKey").is_some());
        assert!(json.get("dateTimeSortable").is_some());
        assert!(json.get("allyPerspectivePlayerID").is_some());
        assert_eq!(json.get("winLoss").unwrap(), "win");
    }
}
