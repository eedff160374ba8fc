//! DynamoDB store backends.
//!
//! Battle tables use a composite key (`arenaUniqueID` + `recordType`) with
//! a `(listingKey, unixTime)` GSI for newest-first listings and a
//! `(mapId, unixTime)` GSI for map-filtered listings. Records travel as
//! their serde JSON form converted attribute-by-attribute.

use super::{
    BattleStore, ListingQuery, SearchIndexStore, StoreError, StoreResult, VideoUpdate,
};
use crate::records::{
    ClanIndexRow, DecodeFailureRecord, GameType, MatchRecord, PlayerIndexRow, ShipIndexRow,
    StatsRecord, UploadRecord, SK_MATCH, SK_STATS, SK_UPLOAD_PREFIX,
};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

type Item = HashMap<String, AttributeValue>;

pub const LISTING_INDEX: &str = "ListingIndex";
pub const MAP_INDEX: &str = "MapIndex";
pub const SK_DECODE_FAILED: &str = "DECODE_FAILED";

/// Per-game-type battle table names.
#[derive(Debug, Clone)]
pub struct BattleTableNames {
    pub clan: String,
    pub ranked: String,
    pub random: String,
    pub other: String,
}

impl BattleTableNames {
    pub fn with_prefix(prefix: &str) -> Self {
        BattleTableNames {
            clan: format!("{prefix}-clan-battles"),
            ranked: format!("{prefix}-ranked-battles"),
            random: format!("{prefix}-random-battles"),
            other: format!("{prefix}-other-battles"),
        }
    }

    fn for_type(&self, game_type: GameType) -> &str {
        match game_type {
            GameType::Clan => &self.clan,
            GameType::Ranked => &self.ranked,
            GameType::Random => &self.random,
            GameType::Other => &self.other,
        }
    }
}

pub struct DynamoBattleStore {
    client: Client,
    tables: BattleTableNames,
}

impl DynamoBattleStore {
    pub fn new(client: Client, tables: BattleTableNames) -> Self {
        DynamoBattleStore { client, tables }
    }

    async fn get_record<T: DeserializeOwned>(
        &self,
        table: &str,
        arena_id: &str,
        record_type: &str,
    ) -> StoreResult<Option<T>> {
        let response = self
            .client
            .get_item()
            .table_name(table)
            .key("arenaUniqueID", AttributeValue::S(arena_id.to_string()))
            .key("recordType", AttributeValue::S(record_type.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| StoreError::storage(format!("DynamoDB GetItem failed: {e}")))?;

        match response.item() {
            Some(item) => Ok(Some(from_item(item)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl BattleStore for DynamoBattleStore {
    async fn get_match(
        &self,
        game_type: GameType,
        arena_id: &str,
    ) -> StoreResult<Option<MatchRecord>> {
        self.get_record(self.tables.for_type(game_type), arena_id, SK_MATCH)
            .await
    }

    async fn put_match_if_absent(
        &self,
        game_type: GameType,
        record: &MatchRecord,
    ) -> StoreResult<bool> {
        let mut item = to_item(record)?;
        item.insert(
            "recordType".to_string(),
            AttributeValue::S(SK_MATCH.to_string()),
        );

        let result = self
            .client
            .put_item()
            .table_name(self.tables.for_type(game_type))
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(arenaUniqueID)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_put_condition_failure(&e) => Ok(false),
            Err(e) => Err(StoreError::storage(format!("DynamoDB PutItem failed: {e}"))),
        }
    }

    async fn update_match_cas(
        &self,
        game_type: GameType,
        record: &MatchRecord,
        expected_revision: u64,
    ) -> StoreResult<()> {
        let mut item = to_item(record)?;
        item.insert(
            "recordType".to_string(),
            AttributeValue::S(SK_MATCH.to_string()),
        );

        let result = self
            .client
            .put_item()
            .table_name(self.tables.for_type(game_type))
            .set_item(Some(item))
            .condition_expression("attribute_exists(arenaUniqueID) AND revision = :expected")
            .expression_attribute_values(
                ":expected",
                AttributeValue::N(expected_revision.to_string()),
            )
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_put_condition_failure(&e) => Err(StoreError::Conflict),
            Err(e) => Err(StoreError::storage(format!("DynamoDB PutItem failed: {e}"))),
        }
    }

    async fn put_stats_if_absent(
        &self,
        game_type: GameType,
        record: &StatsRecord,
    ) -> StoreResult<bool> {
        let mut item = to_item(record)?;
        item.insert(
            "recordType".to_string(),
            AttributeValue::S(SK_STATS.to_string()),
        );

        let result = self
            .client
            .put_item()
            .table_name(self.tables.for_type(game_type))
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(arenaUniqueID)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_put_condition_failure(&e) => Ok(false),
            Err(e) => Err(StoreError::storage(format!("DynamoDB PutItem failed: {e}"))),
        }
    }

    async fn get_stats(
        &self,
        game_type: GameType,
        arena_id: &str,
    ) -> StoreResult<Option<StatsRecord>> {
        self.get_record(self.tables.for_type(game_type), arena_id, SK_STATS)
            .await
    }

    async fn put_upload(&self, game_type: GameType, record: &UploadRecord) -> StoreResult<()> {
        let mut item = to_item(record)?;
        item.insert(
            "recordType".to_string(),
            AttributeValue::S(format!("{SK_UPLOAD_PREFIX}{}", record.player_id)),
        );

        self.client
            .put_item()
            .table_name(self.tables.for_type(game_type))
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| StoreError::storage(format!("DynamoDB PutItem failed: {e}")))?;
        Ok(())
    }

    async fn get_uploads(
        &self,
        game_type: GameType,
        arena_id: &str,
    ) -> StoreResult<Vec<UploadRecord>> {
        let response = self
            .client
            .query()
            .table_name(self.tables.for_type(game_type))
            .key_condition_expression(
                "arenaUniqueID = :aid AND begins_with(recordType, :prefix)",
            )
            .expression_attribute_values(":aid", AttributeValue::S(arena_id.to_string()))
            .expression_attribute_values(
                ":prefix",
                AttributeValue::S(SK_UPLOAD_PREFIX.to_string()),
            )
            .send()
            .await
            .map_err(|e| StoreError::storage(format!("DynamoDB Query failed: {e}")))?;

        response.items().iter().map(|item| from_item(item)).collect()
    }

    async fn list_matches(
        &self,
        game_type: GameType,
        query: &ListingQuery,
    ) -> StoreResult<Vec<MatchRecord>> {
        let mut request = self
            .client
            .query()
            .table_name(self.tables.for_type(game_type))
            .scan_index_forward(false)
            .limit(query.limit.max(1) as i32);

        let mut condition = if let Some(map_id) = &query.map_id {
            request = request
                .index_name(MAP_INDEX)
                .expression_attribute_values(":pk", AttributeValue::S(map_id.clone()));
            "mapId = :pk".to_string()
        } else {
            request = request.index_name(LISTING_INDEX).expression_attribute_values(
                ":pk",
                AttributeValue::S(crate::records::LISTING_KEY_ACTIVE.to_string()),
            );
            "listingKey = :pk".to_string()
        };

        if let Some((from, to)) = query.between {
            condition.push_str(" AND unixTime BETWEEN :from AND :to");
            request = request
                .expression_attribute_values(":from", AttributeValue::N(from.to_string()))
                .expression_attribute_values(":to", AttributeValue::N(to.to_string()));
        } else if let Some(before) = query.before_unix_time {
            condition.push_str(" AND unixTime < :before");
            request =
                request.expression_attribute_values(":before", AttributeValue::N(before.to_string()));
        }

        let response = request
            .key_condition_expression(condition)
            .send()
            .await
            .map_err(|e| StoreError::storage(format!("DynamoDB Query failed: {e}")))?;

        response.items().iter().map(|item| from_item(item)).collect()
    }

    async fn set_video_keys(
        &self,
        game_type: GameType,
        arena_id: &str,
        update: &VideoUpdate,
    ) -> StoreResult<()> {
        let mut request = self
            .client
            .update_item()
            .table_name(self.tables.for_type(game_type))
            .key("arenaUniqueID", AttributeValue::S(arena_id.to_string()))
            .key("recordType", AttributeValue::S(SK_MATCH.to_string()));

        request = match update {
            VideoUpdate::Single { s3_key, generated_at } => request
                .update_expression("SET mp4S3Key = :key, mp4GeneratedAt = :at")
                .expression_attribute_values(":key", AttributeValue::S(s3_key.clone()))
                .expression_attribute_values(":at", AttributeValue::N(generated_at.to_string())),
            VideoUpdate::Dual { s3_key } => request
                .update_expression("SET dualMp4S3Key = :key")
                .expression_attribute_values(":key", AttributeValue::S(s3_key.clone())),
        };

        request
            .send()
            .await
            .map_err(|e| StoreError::storage(format!("DynamoDB UpdateItem failed: {e}")))?;
        Ok(())
    }

    async fn put_decode_failure(&self, record: &DecodeFailureRecord) -> StoreResult<()> {
        // Failure markers share the `other` table, keyed by the upload key.
        let mut item = to_item(record)?;
        item.insert(
            "arenaUniqueID".to_string(),
            AttributeValue::S(record.upload_key.clone()),
        );
        item.insert(
            "recordType".to_string(),
            AttributeValue::S(SK_DECODE_FAILED.to_string()),
        );

        self.client
            .put_item()
            .table_name(&self.tables.other)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| StoreError::storage(format!("DynamoDB PutItem failed: {e}")))?;
        Ok(())
    }
}

/// Reverse index tables: ship, player and clan, each keyed by the search
/// dimension with the compound `{gameType}#{unixTime}#{arenaUniqueID}`
/// sort key.
pub struct DynamoSearchIndexStore {
    client: Client,
    ship_table: String,
    player_table: String,
    clan_table: String,
}

impl DynamoSearchIndexStore {
    pub fn new(client: Client, ship_table: String, player_table: String, clan_table: String) -> Self {
        DynamoSearchIndexStore {
            client,
            ship_table,
            player_table,
            clan_table,
        }
    }

    async fn put_rows<T: Serialize>(&self, table: &str, rows: &[T]) -> StoreResult<()> {
        for row in rows {
            let item = to_item(row)?;
            self.client
                .put_item()
                .table_name(table)
                .set_item(Some(item))
                .send()
                .await
                .map_err(|e| StoreError::storage(format!("DynamoDB PutItem failed: {e}")))?;
        }
        Ok(())
    }

    async fn query_dimension<T: DeserializeOwned>(
        &self,
        table: &str,
        key_attr: &str,
        key_value: &str,
        game_type: Option<GameType>,
        limit: usize,
    ) -> StoreResult<Vec<T>> {
        let mut request = self
            .client
            .query()
            .table_name(table)
            .scan_index_forward(false)
            .limit(limit.max(1) as i32)
            .expression_attribute_names("#pk", key_attr)
            .expression_attribute_values(":pk", AttributeValue::S(key_value.to_string()));

        let condition = if let Some(gt) = game_type {
            request = request
                .expression_attribute_values(":prefix", AttributeValue::S(format!("{gt}#")));
            "#pk = :pk AND begins_with(SK, :prefix)"
        } else {
            "#pk = :pk"
        };

        let response = request
            .key_condition_expression(condition)
            .send()
            .await
            .map_err(|e| StoreError::storage(format!("DynamoDB Query failed: {e}")))?;

        response.items().iter().map(|item| from_item(item)).collect()
    }
}

#[async_trait]
impl SearchIndexStore for DynamoSearchIndexStore {
    async fn put_ship_rows(&self, rows: &[ShipIndexRow]) -> StoreResult<()> {
        self.put_rows(&self.ship_table, rows).await
    }

    async fn put_player_rows(&self, rows: &[PlayerIndexRow]) -> StoreResult<()> {
        self.put_rows(&self.player_table, rows).await
    }

    async fn put_clan_rows(&self, rows: &[ClanIndexRow]) -> StoreResult<()> {
        self.put_rows(&self.clan_table, rows).await
    }

    async fn query_ship(
        &self,
        ship_name: &str,
        game_type: Option<GameType>,
        limit: usize,
    ) -> StoreResult<Vec<ShipIndexRow>> {
        self.query_dimension(&self.ship_table, "shipName", ship_name, game_type, limit)
            .await
    }

    async fn query_player(
        &self,
        player_name: &str,
        game_type: Option<GameType>,
        limit: usize,
    ) -> StoreResult<Vec<PlayerIndexRow>> {
        self.query_dimension(&self.player_table, "playerName", player_name, game_type, limit)
            .await
    }

    async fn query_clan(
        &self,
        clan_tag: &str,
        game_type: Option<GameType>,
        limit: usize,
    ) -> StoreResult<Vec<ClanIndexRow>> {
        self.query_dimension(&self.clan_table, "clanTag", clan_tag, game_type, limit)
            .await
    }
}

// ── Record <-> item conversion ──────────────────────────────────────────

fn to_item<T: Serialize>(record: &T) -> StoreResult<Item> {
    let json = serde_json::to_value(record)
        .map_err(|e| StoreError::storage(format!("record serialization failed: {e}")))?;
    let serde_json::Value::Object(map) = json else {
        return Err(StoreError::storage("record is not a JSON object"));
    };
    Ok(map
        .into_iter()
        .filter_map(|(k, v)| json_to_attr(&v).map(|attr| (k, attr)))
        .collect())
}

fn from_item<T: DeserializeOwned>(item: &Item) -> StoreResult<T> {
    let map: serde_json::Map<String, serde_json::Value> = item
        .iter()
        .filter_map(|(k, v)| attr_to_json(v).map(|val| (k.clone(), val)))
        .collect();
    serde_json::from_value(serde_json::Value::Object(map))
        .map_err(|e| StoreError::storage(format!("record deserialization failed: {e}")))
}

fn json_to_attr(value: &serde_json::Value) -> Option<AttributeValue> {
    match value {
        serde_json::Value::Null => Some(AttributeValue::Null(true)),
        serde_json::Value::Bool(b) => Some(AttributeValue::Bool(*b)),
        serde_json::Value::Number(n) => Some(AttributeValue::N(n.to_string())),
        serde_json::Value::String(s) => Some(AttributeValue::S(s.clone())),
        serde_json::Value::Array(arr) => Some(AttributeValue::L(
            arr.iter().filter_map(json_to_attr).collect(),
        )),
        serde_json::Value::Object(obj) => {
            let map: HashMap<String, AttributeValue> = obj
                .iter()
                .filter_map(|(k, v)| json_to_attr(v).map(|a| (k.clone(), a)))
                .collect();
            Some(AttributeValue::M(map))
        }
    }
}

fn attr_to_json(attr: &AttributeValue) -> Option<serde_json::Value> {
    match attr {
        AttributeValue::S(s) => Some(serde_json::Value::String(s.clone())),
        AttributeValue::N(n) => {
            if let Ok(i) = n.parse::<i64>() {
                Some(serde_json::Value::Number(i.into()))
            } else if let Ok(f) = n.parse::<f64>() {
                serde_json::Number::from_f64(f).map(serde_json::Value::Number)
            } else {
                None
            }
        }
        AttributeValue::Bool(b) => Some(serde_json::Value::Bool(*b)),
        AttributeValue::Null(_) => Some(serde_json::Value::Null),
        AttributeValue::L(list) => Some(serde_json::Value::Array(
            list.iter().filter_map(attr_to_json).collect(),
        )),
        AttributeValue::M(map) => {
            let obj: serde_json::Map<_, _> = map
                .iter()
                .filter_map(|(k, v)| attr_to_json(v).map(|val| (k.clone(), val)))
                .collect();
            Some(serde_json::Value::Object(obj))
        }
        _ => None,
    }
}

fn is_put_condition_failure(
    err: &aws_sdk_dynamodb::error::SdkError<aws_sdk_dynamodb::operation::put_item::PutItemError>,
) -> bool {
    use aws_sdk_dynamodb::error::SdkError;
    use aws_sdk_dynamodb::operation::put_item::PutItemError;
    match err {
        SdkError::ServiceError(se) => {
            matches!(se.err(), PutItemError::ConditionalCheckFailedException(_))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::LISTING_KEY_ACTIVE;
    use wows_replay_parser::types::WinLoss;

    #[test]
    fn match_record_item_round_trip() {
        let record = MatchRecord {
            arena_unique_id: "7700000001".into(),
            listing_key: LISTING_KEY_ACTIVE.into(),
            unix_time: 1_767_000_000,
            date_time: "03.01.2026 23:28:22".into(),
            date_time_sortable: "20260103232822".into(),
            match_key: "abc".into(),
            map_id: "spaces/19_OC_prey".into(),
            map_display_name: "Crash Zone Alpha".into(),
            client_version: "14.11.0".into(),
            game_type: GameType::Clan,
            ally_perspective_player_id: 1,
            ally_perspective_player_name: "_meteor0090".into(),
            win_loss: WinLoss::Win,
            ally_main_clan_tag: "OZEKI".into(),
            enemy_main_clan_tag: "KNAVE".into(),
            allies: vec![],
            enemies: vec![],
            mp4_s3_key: Some("videos/7700000001/single.mp4".into()),
            mp4_generated_at: None,
            dual_mp4_s3_key: None,
            has_dual_replay: true,
            uploaders: vec![],
            revision: 3,
        };

        let item = to_item(&record).unwrap();
        assert!(matches!(item.get("arenaUniqueID"), Some(AttributeValue::S(_))));
        assert!(matches!(item.get("unixTime"), Some(AttributeValue::N(_))));
        assert!(matches!(item.get("hasDualReplay"), Some(AttributeValue::Bool(true))));

        let back: MatchRecord = from_item(&item).unwrap();
        assert_eq!(back.arena_unique_id, record.arena_unique_id);
        assert_eq!(back.revision, 3);
        assert_eq!(back.win_loss, WinLoss::Win);
        assert_eq!(back.mp4_s3_key, record.mp4_s3_key);
    }
}
