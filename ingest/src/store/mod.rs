//! Persistence ports.
//!
//! The pipeline talks to three storage concerns through traits: the battle
//! tables (MATCH/STATS/UPLOAD records), the reverse search indexes, and
//! the replay/video object store. Production backends live in `dynamodb`
//! and `s3`; `memory` backs the test suites and local runs.

pub mod dynamodb;
pub mod memory;
pub mod s3;

use crate::records::{
    ClanIndexRow, DecodeFailureRecord, GameType, MatchRecord, PlayerIndexRow, ShipIndexRow,
    StatsRecord, UploadRecord,
};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional write lost its race; retry against fresh state.
    #[error("conditional write conflict")]
    Conflict,
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn storage(msg: impl Into<String>) -> Self {
        StoreError::Storage(msg.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Listing query over a battle table's by-time index.
#[derive(Debug, Clone, Default)]
pub struct ListingQuery {
    pub map_id: Option<String>,
    /// Exclusive pagination cursor; return records strictly older.
    pub before_unix_time: Option<i64>,
    /// Inclusive date range on `unixTime`.
    pub between: Option<(i64, i64)>,
    pub limit: usize,
}

/// Video attributes set on the MATCH record after a render.
#[derive(Debug, Clone)]
pub enum VideoUpdate {
    Single { s3_key: String, generated_at: i64 },
    Dual { s3_key: String },
}

/// Battle tables, one per game type. The MATCH item's existence is the
/// only cross-item lock the write protocol relies on.
#[async_trait]
pub trait BattleStore: Send + Sync {
    async fn get_match(&self, game_type: GameType, arena_id: &str)
        -> StoreResult<Option<MatchRecord>>;

    /// Create the MATCH record. `Ok(false)` means it already existed.
    async fn put_match_if_absent(
        &self,
        game_type: GameType,
        record: &MatchRecord,
    ) -> StoreResult<bool>;

    /// Replace the MATCH record if its stored revision still equals
    /// `expected_revision`; `StoreError::Conflict` otherwise.
    async fn update_match_cas(
        &self,
        game_type: GameType,
        record: &MatchRecord,
        expected_revision: u64,
    ) -> StoreResult<()>;

    /// Create the STATS record. `Ok(false)` when one already exists; an
    /// existing record is never overwritten.
    async fn put_stats_if_absent(
        &self,
        game_type: GameType,
        record: &StatsRecord,
    ) -> StoreResult<bool>;

    async fn get_stats(&self, game_type: GameType, arena_id: &str)
        -> StoreResult<Option<StatsRecord>>;

    /// Unconditional write of `UPLOAD#{playerID}`; a re-upload by the same
    /// player replaces only their own record.
    async fn put_upload(&self, game_type: GameType, record: &UploadRecord) -> StoreResult<()>;

    async fn get_uploads(&self, game_type: GameType, arena_id: &str)
        -> StoreResult<Vec<UploadRecord>>;

    /// Newest-first listing off the by-time index.
    async fn list_matches(
        &self,
        game_type: GameType,
        query: &ListingQuery,
    ) -> StoreResult<Vec<MatchRecord>>;

    async fn set_video_keys(
        &self,
        game_type: GameType,
        arena_id: &str,
        update: &VideoUpdate,
    ) -> StoreResult<()>;

    async fn put_decode_failure(&self, record: &DecodeFailureRecord) -> StoreResult<()>;
}

/// Reverse indexes for ship / player / clan search. Rows are written once
/// per match (idempotent upserts for admin backfills).
#[async_trait]
pub trait SearchIndexStore: Send + Sync {
    async fn put_ship_rows(&self, rows: &[ShipIndexRow]) -> StoreResult<()>;
    async fn put_player_rows(&self, rows: &[PlayerIndexRow]) -> StoreResult<()>;
    async fn put_clan_rows(&self, rows: &[ClanIndexRow]) -> StoreResult<()>;

    async fn query_ship(
        &self,
        ship_name: &str,
        game_type: Option<GameType>,
        limit: usize,
    ) -> StoreResult<Vec<ShipIndexRow>>;

    async fn query_player(
        &self,
        player_name: &str,
        game_type: Option<GameType>,
        limit: usize,
    ) -> StoreResult<Vec<PlayerIndexRow>>;

    async fn query_clan(
        &self,
        clan_tag: &str,
        game_type: Option<GameType>,
        limit: usize,
    ) -> StoreResult<Vec<ClanIndexRow>>;
}

/// Replay blobs and rendered videos, addressed by key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StoreResult<()>;
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
    async fn presign_get(&self, key: &str, expires_secs: u64) -> StoreResult<String>;
}

/// Object key of a raw upload.
pub fn replay_key(uploader_id: &str, file_name: &str) -> String {
    format!("replays/{uploader_id}/{file_name}")
}

/// Object key of a rendered video; `tag` distinguishes single and dual.
pub fn video_key(arena_id: &str, tag: &str) -> String {
    format!("videos/{arena_id}/{tag}.mp4")
}
