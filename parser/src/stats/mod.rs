//! Battle statistics extraction.
//!
//! Maps the positional arrays of the terminal statistics packet into named
//! per-player records, enriches them from the hidden arena state (skills,
//! fittings, hull class), and determines the battle outcome.

pub mod index_table;
pub mod ship_params;
pub mod skills;
pub mod upgrades;

use crate::hidden::{BattleResult, HiddenState};
use crate::packet::BattleStatsData;
use crate::types::{PlayerId, ShipClass, Team, WinLoss};
use crate::version::ClientVersion;
use index_table::{IndexTable, SlotDecoder, StatsField};
use serde::{Deserialize, Serialize};
use serde_pickle::Value;
use ship_params::ShipParams;
use std::collections::BTreeMap;
use tracing::warn;

/// A single slot of a positional stat array, reduced to the value kinds the
/// server actually emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SlotValue {
    None,
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<SlotValue>),
}

impl From<&Value> for SlotValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::I64(v) => SlotValue::Int(*v),
            Value::F64(v) => SlotValue::Float(*v),
            Value::String(s) => SlotValue::Str(s.clone()),
            Value::Bool(b) => SlotValue::Int(*b as i64),
            Value::List(xs) | Value::Tuple(xs) => {
                SlotValue::List(xs.iter().map(SlotValue::from).collect())
            }
            _ => SlotValue::None,
        }
    }
}

/// Fully decoded, enriched record for one player of one battle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub player_id: i64,
    pub player_name: String,
    pub account_db_id: i64,
    pub clan_tag: String,
    pub clan_id: i64,
    pub realm: String,
    pub team: Option<Team>,
    pub is_own: bool,

    pub ship_params_id: i64,
    pub ship_name: String,
    pub ship_class: Option<ShipClass>,

    pub survival_time: i64,
    pub survival_percent: i64,
    pub kills: i64,
    pub hits_ap: i64,
    pub hits_he: i64,
    pub hits_secondaries: i64,
    pub citadels: i64,
    pub crits: i64,
    pub fires: i64,
    pub floods: i64,

    pub damage: i64,
    pub damage_ap: i64,
    pub damage_he: i64,
    pub damage_he_secondaries: i64,
    pub damage_torps: i64,
    pub damage_deep_water_torps: i64,
    pub damage_other: i64,
    pub damage_fire: i64,
    pub damage_flooding: i64,

    pub received_damage: i64,
    pub spotting_damage: i64,
    pub potential_damage: i64,
    pub base_xp: i64,

    pub captain_skills: Vec<String>,
    pub upgrades: Vec<String>,
    pub ship_components: BTreeMap<String, String>,
}

impl PlayerStats {
    /// Sum of the per-source damage columns; equals `damage` on a
    /// consistent export.
    pub fn damage_component_sum(&self) -> i64 {
        self.damage_ap
            + self.damage_he
            + self.damage_he_secondaries
            + self.damage_torps
            + self.damage_deep_water_torps
            + self.damage_fire
            + self.damage_flooding
            + self.damage_other
    }
}

/// Parser for one client version's stat layout.
pub struct StatsParser<'a> {
    table: &'static IndexTable,
    ships: &'a ShipParams,
}

impl<'a> StatsParser<'a> {
    pub fn new(version: ClientVersion, ships: &'a ShipParams) -> Self {
        StatsParser {
            table: version.bundle().stats_table,
            ships,
        }
    }

    /// Decode every player of the statistics payload, enriched from the
    /// hidden arena state. Players whose array is shorter than the table's
    /// minimum are skipped.
    pub fn parse_all(
        &self,
        data: &BattleStatsData,
        hidden: &HiddenState,
        own_player_name: &str,
    ) -> Vec<PlayerStats> {
        let own_team_id = self.own_team_id(data, hidden, own_player_name);

        let mut out = Vec::with_capacity(data.players_public_info.len());
        for (player_id, slots) in &data.players_public_info {
            if slots.len() < self.table.min_len {
                warn!(
                    player = %player_id,
                    len = slots.len(),
                    min = self.table.min_len,
                    "stat array too short, skipping player"
                );
                continue;
            }
            out.push(self.parse_one(*player_id, slots, hidden, own_team_id, own_player_name));
        }

        out.sort_by(|a, b| b.damage.cmp(&a.damage));
        out
    }

    fn parse_one(
        &self,
        player_id: PlayerId,
        slots: &[SlotValue],
        hidden: &HiddenState,
        own_team_id: Option<i64>,
        own_player_name: &str,
    ) -> PlayerStats {
        let int = |field| self.int_field(slots, field);
        let string = |field| self.string_field(slots, field);

        let mut stats = PlayerStats {
            player_id: int(StatsField::PlayerId),
            player_name: string(StatsField::PlayerName),
            account_db_id: int(StatsField::AccountDbId),
            clan_tag: string(StatsField::ClanTag),
            clan_id: int(StatsField::ClanId),
            realm: string(StatsField::Realm),
            survival_time: int(StatsField::SurvivalTime),
            survival_percent: int(StatsField::SurvivalPercent),
            kills: int(StatsField::Kills),
            hits_ap: int(StatsField::HitsAp),
            hits_he: int(StatsField::HitsHe),
            hits_secondaries: int(StatsField::HitsSecondaries),
            citadels: int(StatsField::Citadels),
            crits: int(StatsField::Crits),
            fires: int(StatsField::Fires),
            floods: int(StatsField::Floods),
            damage: int(StatsField::Damage),
            damage_ap: int(StatsField::DamageAp),
            damage_he: int(StatsField::DamageHe),
            damage_he_secondaries: int(StatsField::DamageHeSecondaries),
            damage_torps: int(StatsField::DamageTorps),
            damage_deep_water_torps: int(StatsField::DamageDeepWaterTorps),
            damage_other: int(StatsField::DamageOther),
            damage_fire: int(StatsField::DamageFire),
            damage_flooding: int(StatsField::DamageFlooding),
            received_damage: int(StatsField::ReceivedDamage),
            spotting_damage: int(StatsField::SpottingDamage),
            potential_damage: int(StatsField::PotentialDamage),
            base_xp: int(StatsField::BaseXp),
            ..Default::default()
        };
        stats.is_own = stats.player_name == own_player_name;

        // Team assignment: the arena-state dictionary is authoritative
        // (its key table is versioned); the positional slot is only an
        // unconfirmed candidate for players the arena state never saw.
        let team_id = hidden
            .players
            .get(&player_id)
            .map(|p| p.team_id)
            .or_else(|| self.candidate_int(slots, StatsField::TeamId));
        stats.team = match (team_id, own_team_id) {
            (Some(id), Some(own)) => Some(if id == own { Team::Ally } else { Team::Enemy }),
            _ => None,
        };

        if let Some(arena) = hidden.players.get(&player_id) {
            stats.ship_params_id = arena.ship_params_id.raw();
            stats.ship_name = self.ships.ship_name(arena.ship_params_id);
            stats.ship_class = self.ships.ship_class(arena.ship_params_id);
            stats.ship_components = arena.ship_components.clone();
            if !arena.ship_config_dump.is_empty() {
                stats.upgrades = upgrades::upgrade_names(&arena.ship_config_dump);
            }
            // Skills are valid only for the hull class actually sailed.
            if let (Some(class), Some(crew)) = (stats.ship_class, hidden.crew_for(arena)) {
                if let Some(resolved) = skills::resolve_for_class(crew, class) {
                    stats.captain_skills = resolved;
                }
            }
        }

        stats
    }

    /// The recorder's team id. The hidden arena state is authoritative;
    /// the positional stat slot is an unconfirmed candidate consulted
    /// only when the arena state never recorded the player.
    fn own_team_id(
        &self,
        data: &BattleStatsData,
        hidden: &HiddenState,
        own_player_name: &str,
    ) -> Option<i64> {
        if let Some(player) = hidden.player_by_name(own_player_name) {
            return Some(player.team_id);
        }
        for slots in data.players_public_info.values() {
            if slots.len() < self.table.min_len {
                continue;
            }
            if self.string_field(slots, StatsField::PlayerName) == own_player_name {
                return self.candidate_int(slots, StatsField::TeamId);
            }
        }
        None
    }

    /// Candidate-slot read; `None` when the table carries no candidate
    /// for the field or the slot holds no number.
    fn candidate_int(&self, slots: &[SlotValue], field: StatsField) -> Option<i64> {
        let spec = self.table.candidate_of(field)?;
        match slots.get(spec.slot) {
            Some(SlotValue::Int(v)) => Some(*v),
            Some(SlotValue::Float(v)) => Some(*v as i64),
            _ => None,
        }
    }

    fn int_field(&self, slots: &[SlotValue], field: StatsField) -> i64 {
        let Some(spec) = self.table.spec_of(field) else {
            return 0;
        };
        match (spec.decoder, slots.get(spec.slot)) {
            (SlotDecoder::AsInt, Some(SlotValue::Int(v))) => *v,
            (SlotDecoder::AsInt, Some(SlotValue::Float(v))) => *v as i64,
            (SlotDecoder::FloatAsInt, Some(SlotValue::Float(v))) => *v as i64,
            (SlotDecoder::FloatAsInt, Some(SlotValue::Int(v))) => *v,
            _ => 0,
        }
    }

    fn string_field(&self, slots: &[SlotValue], field: StatsField) -> String {
        let Some(spec) = self.table.spec_of(field) else {
            return String::new();
        };
        match (spec.decoder, slots.get(spec.slot)) {
            (SlotDecoder::AsString | SlotDecoder::ClanTag, Some(SlotValue::Str(s))) => s.clone(),
            // Clanless players serialize as None; everything else empty too.
            _ => String::new(),
        }
    }
}

/// Raw XP recorded for a clan-battle victory (server stores XP at 10x).
pub const CLAN_VICTORY_RAW_XP: i64 = 300_000;
/// Raw XP recorded for a clan-battle defeat.
pub const CLAN_DEFEAT_RAW_XP: i64 = 150_000;

/// Battle outcome from the recorder's perspective.
///
/// The battle result packet is authoritative when present. Without it the
/// only reliable signal is the fixed victory/defeat XP pair of clan
/// battles; other game types stay `Unknown`.
pub fn determine_win_loss(
    result: Option<BattleResult>,
    own_team_id: Option<i64>,
    clan_battle: bool,
    raw_xp: Option<i64>,
) -> WinLoss {
    if let Some(result) = result {
        if result.winner_team_id == -1 {
            return WinLoss::Draw;
        }
        if let Some(own) = own_team_id {
            return if i64::from(result.winner_team_id) == own {
                WinLoss::Win
            } else {
                WinLoss::Loss
            };
        }
    }

    if clan_battle {
        match raw_xp {
            Some(CLAN_VICTORY_RAW_XP) => return WinLoss::Win,
            Some(CLAN_DEFEAT_RAW_XP) => return WinLoss::Loss,
            _ => {}
        }
    }

    WinLoss::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hidden::ArenaPlayerState;
    use crate::types::ShipParamsId;

    fn slots_with(table: &IndexTable, fields: &[(StatsField, SlotValue)]) -> Vec<SlotValue> {
        let mut slots = vec![SlotValue::None; table.min_len];
        for (field, value) in fields {
            let spec = table
                .spec_of(*field)
                .or_else(|| table.candidate_of(*field))
                .unwrap();
            slots[spec.slot] = value.clone();
        }
        slots
    }

    fn base_row(table: &IndexTable, name: &str, team: i64, damage: i64) -> Vec<SlotValue> {
        slots_with(
            table,
            &[
                (StatsField::PlayerId, SlotValue::Int(1)),
                (StatsField::PlayerName, SlotValue::Str(name.into())),
                (StatsField::TeamId, SlotValue::Int(team)),
                (StatsField::Damage, SlotValue::Int(damage)),
                (StatsField::DamageAp, SlotValue::Int(damage)),
            ],
        )
    }

    #[test]
    fn decodes_named_fields_and_team() {
        let ships = ShipParams::bundled();
        let parser = StatsParser::new(ClientVersion::V14_11_0, &ships);
        let table = parser.table;

        // No arena state here, so teams come from the candidate slot.
        let mut data = BattleStatsData::default();
        data.players_public_info
            .insert(PlayerId(1), base_row(table, "_meteor0090", 0, 150_000));
        data.players_public_info
            .insert(PlayerId(2), base_row(table, "rival", 1, 90_000));

        let all = parser.parse_all(&data, &HiddenState::default(), "_meteor0090");
        assert_eq!(all.len(), 2);
        // Sorted by damage, own player first here.
        assert!(all[0].is_own);
        assert_eq!(all[0].team, Some(Team::Ally));
        assert_eq!(all[1].team, Some(Team::Enemy));
        assert_eq!(all[0].damage, 150_000);
    }

    #[test]
    fn team_resolution_prefers_arena_state_over_candidate_slot() {
        let ships = ShipParams::bundled();
        let parser = StatsParser::new(ClientVersion::V14_11_0, &ships);
        let table = parser.table;

        // Arena state: recorder on team 0, rival on team 1.
        let mut hidden = HiddenState::default();
        hidden.players.insert(
            PlayerId(1),
            ArenaPlayerState {
                id: PlayerId(1),
                name: "p".into(),
                team_id: 0,
                ..Default::default()
            },
        );
        hidden.players.insert(
            PlayerId(2),
            ArenaPlayerState {
                id: PlayerId(2),
                name: "rival".into(),
                team_id: 1,
                ..Default::default()
            },
        );

        // The candidate slot disagrees on every row (teams flipped). The
        // arena state must win; the slot is unconfirmed.
        let mut data = BattleStatsData::default();
        data.players_public_info
            .insert(PlayerId(1), base_row(table, "p", 1, 100_000));
        data.players_public_info
            .insert(PlayerId(2), base_row(table, "rival", 0, 50_000));

        let all = parser.parse_all(&data, &hidden, "p");
        let own = all.iter().find(|s| s.player_name == "p").unwrap();
        let rival = all.iter().find(|s| s.player_name == "rival").unwrap();
        assert_eq!(own.team, Some(Team::Ally));
        assert_eq!(rival.team, Some(Team::Enemy));
    }

    #[test]
    fn short_arrays_are_skipped() {
        let ships = ShipParams::bundled();
        let parser = StatsParser::new(ClientVersion::V14_11_0, &ships);
        let mut data = BattleStatsData::default();
        data.players_public_info
            .insert(PlayerId(1), vec![SlotValue::Int(1); 10]);
        data.players_public_info.insert(
            PlayerId(2),
            base_row(parser.table, "ok", 0, 5),
        );

        let all = parser.parse_all(&data, &HiddenState::default(), "ok");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].player_name, "ok");
    }

    #[test]
    fn float_slots_decode_to_int() {
        let ships = ShipParams::bundled();
        let parser = StatsParser::new(ClientVersion::V14_11_0, &ships);
        let table = parser.table;
        let mut data = BattleStatsData::default();
        data.players_public_info.insert(
            PlayerId(1),
            slots_with(
                table,
                &[
                    (StatsField::PlayerName, SlotValue::Str("p".into())),
                    (StatsField::TeamId, SlotValue::Int(0)),
                    (StatsField::PotentialDamage, SlotValue::Float(123_456.7)),
                ],
            ),
        );
        let all = parser.parse_all(&data, &HiddenState::default(), "p");
        assert_eq!(all[0].potential_damage, 123_456);
    }

    #[test]
    fn damage_components_sum_to_total() {
        let ships = ShipParams::bundled();
        let parser = StatsParser::new(ClientVersion::V14_11_0, &ships);
        let table = parser.table;
        let mut data = BattleStatsData::default();
        data.players_public_info.insert(
            PlayerId(1),
            slots_with(
                table,
                &[
                    (StatsField::PlayerName, SlotValue::Str("p".into())),
                    (StatsField::TeamId, SlotValue::Int(0)),
                    (StatsField::Damage, SlotValue::Int(100_000)),
                    (StatsField::DamageAp, SlotValue::Int(40_000)),
                    (StatsField::DamageHe, SlotValue::Int(25_000)),
                    (StatsField::DamageHeSecondaries, SlotValue::Int(5_000)),
                    (StatsField::DamageTorps, SlotValue::Int(20_000)),
                    (StatsField::DamageFire, SlotValue::Int(9_000)),
                    (StatsField::DamageFlooding, SlotValue::Int(1_000)),
                ],
            ),
        );
        let all = parser.parse_all(&data, &HiddenState::default(), "p");
        assert_eq!(all[0].damage_component_sum(), all[0].damage);
    }

    #[test]
    fn enriches_from_hidden_state() {
        let ships = ShipParams::bundled();
        let parser = StatsParser::new(ClientVersion::V14_11_0, &ships);
        let table = parser.table;

        let mut hidden = HiddenState::default();
        hidden.players.insert(
            PlayerId(1),
            ArenaPlayerState {
                id: PlayerId(1),
                name: "p".into(),
                ship_params_id: ShipParamsId(4287510224),
                ..Default::default()
            },
        );

        let mut data = BattleStatsData::default();
        data.players_public_info
            .insert(PlayerId(1), base_row(table, "p", 0, 1));

        let all = parser.parse_all(&data, &hidden, "p");
        assert_eq!(all[0].ship_name, "Chung Mu");
        assert_eq!(all[0].ship_class, Some(ShipClass::Destroyer));
    }

    #[test]
    fn win_loss_primary_rule() {
        let result = BattleResult {
            winner_team_id: 0,
            finish_reason: 1,
        };
        assert_eq!(
            determine_win_loss(Some(result), Some(0), false, None),
            WinLoss::Win
        );
        assert_eq!(
            determine_win_loss(Some(result), Some(1), false, None),
            WinLoss::Loss
        );

        let draw = BattleResult {
            winner_team_id: -1,
            finish_reason: 3,
        };
        assert_eq!(
            determine_win_loss(Some(draw), Some(0), false, None),
            WinLoss::Draw
        );
    }

    #[test]
    fn win_loss_xp_fallback_is_clan_only() {
        assert_eq!(
            determine_win_loss(None, Some(0), true, Some(CLAN_VICTORY_RAW_XP)),
            WinLoss::Win
        );
        assert_eq!(
            determine_win_loss(None, Some(0), true, Some(CLAN_DEFEAT_RAW_XP)),
            WinLoss::Loss
        );
        assert_eq!(
            determine_win_loss(None, Some(0), true, Some(123)),
            WinLoss::Unknown
        );
        assert_eq!(
            determine_win_loss(None, Some(0), false, Some(CLAN_VICTORY_RAW_XP)),
            WinLoss::Unknown
        );
    }
}
