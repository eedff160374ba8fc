//! In-memory store backends.
//!
//! Semantics mirror the DynamoDB backends (conditional puts, CAS on the
//! match revision, newest-first listings) so pipeline and query tests
//! exercise the real write protocol.

use super::{
    BattleStore, ListingQuery, ObjectStore, SearchIndexStore, StoreError, StoreResult, VideoUpdate,
};
use crate::records::{
    ClanIndexRow, DecodeFailureRecord, GameType, MatchRecord, PlayerIndexRow, ShipIndexRow,
    StatsRecord, UploadRecord,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct BattleTable {
    matches: HashMap<String, MatchRecord>,
    stats: HashMap<String, StatsRecord>,
    uploads: HashMap<(String, i64), UploadRecord>,
}

/// Battle tables held in process memory.
#[derive(Default)]
pub struct MemoryBattleStore {
    tables: Mutex<HashMap<GameType, BattleTable>>,
    failures: Mutex<Vec<DecodeFailureRecord>>,
}

impl MemoryBattleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode_failures(&self) -> Vec<DecodeFailureRecord> {
        self.failures.lock().expect("poisoned").clone()
    }
}

#[async_trait]
impl BattleStore for MemoryBattleStore {
    async fn get_match(
        &self,
        game_type: GameType,
        arena_id: &str,
    ) -> StoreResult<Option<MatchRecord>> {
        let tables = self.tables.lock().expect("poisoned");
        Ok(tables
            .get(&game_type)
            .and_then(|t| t.matches.get(arena_id))
            .cloned())
    }

    async fn put_match_if_absent(
        &self,
        game_type: GameType,
        record: &MatchRecord,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.lock().expect("poisoned");
        let table = tables.entry(game_type).or_default();
        if table.matches.contains_key(&record.arena_unique_id) {
            return Ok(false);
        }
        table
            .matches
            .insert(record.arena_unique_id.clone(), record.clone());
        Ok(true)
    }

    async fn update_match_cas(
        &self,
        game_type: GameType,
        record: &MatchRecord,
        expected_revision: u64,
    ) -> StoreResult<()> {
        let mut tables = self.tables.lock().expect("poisoned");
        let table = tables.entry(game_type).or_default();
        match table.matches.get_mut(&record.arena_unique_id) {
            Some(existing) if existing.revision == expected_revision => {
                *existing = record.clone();
                Ok(())
            }
            Some(_) => Err(StoreError::Conflict),
            None => Err(StoreError::storage("match does not exist")),
        }
    }

    async fn put_stats_if_absent(
        &self,
        game_type: GameType,
        record: &StatsRecord,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.lock().expect("poisoned");
        let table = tables.entry(game_type).or_default();
        if table.stats.contains_key(&record.arena_unique_id) {
            return Ok(false);
        }
        table
            .stats
            .insert(record.arena_unique_id.clone(), record.clone());
        Ok(true)
    }

    async fn get_stats(
        &self,
        game_type: GameType,
        arena_id: &str,
    ) -> StoreResult<Option<StatsRecord>> {
        let tables = self.tables.lock().expect("poisoned");
        Ok(tables
            .get(&game_type)
            .and_then(|t| t.stats.get(arena_id))
            .cloned())
    }

    async fn put_upload(&self, game_type: GameType, record: &UploadRecord) -> StoreResult<()> {
        let mut tables = self.tables.lock().expect("poisoned");
        let table = tables.entry(game_type).or_default();
        table.uploads.insert(
            (record.arena_unique_id.clone(), record.player_id),
            record.clone(),
        );
        Ok(())
    }

    async fn get_uploads(
        &self,
        game_type: GameType,
        arena_id: &str,
    ) -> StoreResult<Vec<UploadRecord>> {
        let tables = self.tables.lock().expect("poisoned");
        let mut uploads: Vec<UploadRecord> = tables
            .get(&game_type)
            .map(|t| {
                t.uploads
                    .iter()
                    .filter(|((arena, _), _)| arena == arena_id)
                    .map(|(_, record)| record.clone())
                    .collect()
            })
            .unwrap_or_default();
        uploads.sort_by_key(|u| u.player_id);
        Ok(uploads)
    }

    async fn list_matches(
        &self,
        game_type: GameType,
        query: &ListingQuery,
    ) -> StoreResult<Vec<MatchRecord>> {
        let tables = self.tables.lock().expect("poisoned");
        let mut matches: Vec<MatchRecord> = tables
            .get(&game_type)
            .map(|t| t.matches.values().cloned().collect())
            .unwrap_or_default();

        matches.retain(|m| {
            if let Some(map_id) = &query.map_id {
                if &m.map_id != map_id {
                    return false;
                }
            }
            if let Some(before) = query.before_unix_time {
                if m.unix_time >= before {
                    return false;
                }
            }
            if let Some((from, to)) = query.between {
                if m.unix_time < from || m.unix_time > to {
                    return false;
                }
            }
            true
        });
        matches.sort_by(|a, b| b.unix_time.cmp(&a.unix_time));
        if query.limit > 0 {
            matches.truncate(query.limit);
        }
        Ok(matches)
    }

    async fn set_video_keys(
        &self,
        game_type: GameType,
        arena_id: &str,
        update: &VideoUpdate,
    ) -> StoreResult<()> {
        let mut tables = self.tables.lock().expect("poisoned");
        let table = tables.entry(game_type).or_default();
        let record = table
            .matches
            .get_mut(arena_id)
            .ok_or_else(|| StoreError::storage("match does not exist"))?;
        match update {
            VideoUpdate::Single { s3_key, generated_at } => {
                record.mp4_s3_key = Some(s3_key.clone());
                record.mp4_generated_at = Some(*generated_at);
            }
            VideoUpdate::Dual { s3_key } => {
                record.dual_mp4_s3_key = Some(s3_key.clone());
            }
        }
        Ok(())
    }

    async fn put_decode_failure(&self, record: &DecodeFailureRecord) -> StoreResult<()> {
        self.failures.lock().expect("poisoned").push(record.clone());
        Ok(())
    }
}

/// Reverse indexes held in process memory.
#[derive(Default)]
pub struct MemorySearchIndexStore {
    ships: Mutex<HashMap<(String, String), ShipIndexRow>>,
    players: Mutex<HashMap<(String, String), PlayerIndexRow>>,
    clans: Mutex<HashMap<(String, String), ClanIndexRow>>,
}

impl MemorySearchIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ship_row_count(&self) -> usize {
        self.ships.lock().expect("poisoned").len()
    }

    pub fn player_row_count(&self) -> usize {
        self.players.lock().expect("poisoned").len()
    }

    pub fn clan_row_count(&self) -> usize {
        self.clans.lock().expect("poisoned").len()
    }
}

fn game_type_matches(sk: &str, game_type: Option<GameType>) -> bool {
    match game_type {
        Some(gt) => sk.starts_with(&format!("{gt}#")),
        None => true,
    }
}

#[async_trait]
impl SearchIndexStore for MemorySearchIndexStore {
    async fn put_ship_rows(&self, rows: &[ShipIndexRow]) -> StoreResult<()> {
        let mut ships = self.ships.lock().expect("poisoned");
        for row in rows {
            ships.insert((row.ship_name.clone(), row.sk.clone()), row.clone());
        }
        Ok(())
    }

    async fn put_player_rows(&self, rows: &[PlayerIndexRow]) -> StoreResult<()> {
        let mut players = self.players.lock().expect("poisoned");
        for row in rows {
            players.insert((row.player_name.clone(), row.sk.clone()), row.clone());
        }
        Ok(())
    }

    async fn put_clan_rows(&self, rows: &[ClanIndexRow]) -> StoreResult<()> {
        let mut clans = self.clans.lock().expect("poisoned");
        for row in rows {
            clans.insert((row.clan_tag.clone(), row.sk.clone()), row.clone());
        }
        Ok(())
    }

    async fn query_ship(
        &self,
        ship_name: &str,
        game_type: Option<GameType>,
        limit: usize,
    ) -> StoreResult<Vec<ShipIndexRow>> {
        let ships = self.ships.lock().expect("poisoned");
        let mut rows: Vec<ShipIndexRow> = ships
            .iter()
            .filter(|((name, sk), _)| name == ship_name && game_type_matches(sk, game_type))
            .map(|(_, row)| row.clone())
            .collect();
        rows.sort_by(|a, b| b.sk.cmp(&a.sk));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn query_player(
        &self,
        player_name: &str,
        game_type: Option<GameType>,
        limit: usize,
    ) -> StoreResult<Vec<PlayerIndexRow>> {
        let players = self.players.lock().expect("poisoned");
        let mut rows: Vec<PlayerIndexRow> = players
            .iter()
            .filter(|((name, sk), _)| name == player_name && game_type_matches(sk, game_type))
            .map(|(_, row)| row.clone())
            .collect();
        rows.sort_by(|a, b| b.sk.cmp(&a.sk));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn query_clan(
        &self,
        clan_tag: &str,
        game_type: Option<GameType>,
        limit: usize,
    ) -> StoreResult<Vec<ClanIndexRow>> {
        let clans = self.clans.lock().expect("poisoned");
        let mut rows: Vec<ClanIndexRow> = clans
            .iter()
            .filter(|((tag, sk), _)| tag == clan_tag && game_type_matches(sk, game_type))
            .map(|(_, row)| row.clone())
            .collect();
        rows.sort_by(|a, b| b.sk.cmp(&a.sk));
        rows.truncate(limit);
        Ok(rows)
    }
}

/// Object store held in process memory.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().expect("poisoned").contains_key(key)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> StoreResult<()> {
        self.objects
            .lock()
            .expect("poisoned")
            .insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.objects.lock().expect("poisoned").get(key).cloned())
    }

    async fn presign_get(&self, key: &str, expires_secs: u64) -> StoreResult<String> {
        Ok(format!("memory://{key}?expires={expires_secs}"))
    }
}
