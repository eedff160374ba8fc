//! State that only exists inside the packet stream ("hidden" data): the
//! per-player arena dictionaries, crew skill sheets, and the end-of-battle
//! result. Built up incrementally by the decoder as packets stream through.

use crate::types::{PlayerId, ShipParamsId};
use crate::version::ArenaStateKeys;
use serde::Serialize;
use serde_pickle::{HashableValue, Value};
use std::collections::BTreeMap;

/// One player's entry of the arena state dictionary.
///
/// The wire form is a pickle dict keyed by small integers; the version
/// registry supplies the index of each named attribute.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArenaPlayerState {
    pub id: PlayerId,
    pub account_db_id: i64,
    pub avatar_id: i64,
    pub name: String,
    pub clan_tag: String,
    pub realm: String,
    pub team_id: i64,
    pub max_health: i64,
    pub ship_params_id: ShipParamsId,
    /// First element is the captain (crew) id.
    pub crew_params: Vec<i64>,
    /// Module slot name -> fitted component, e.g. `"hull" -> "PCUH707_B_Hull"`.
    pub ship_components: BTreeMap<String, String>,
    /// Opaque fitting blob; decoded by the upgrades parser.
    #[serde(skip_serializing)]
    pub ship_config_dump: Vec<u8>,
}

impl ArenaPlayerState {
    /// Decode the arena state pickle (a list of per-player dicts).
    pub fn from_pickle(value: &Value, keys: &ArenaStateKeys) -> Vec<ArenaPlayerState> {
        let Value::List(entries) = value else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|entry| Self::one_from_pickle(entry, keys))
            .collect()
    }

    fn one_from_pickle(entry: &Value, keys: &ArenaStateKeys) -> Option<ArenaPlayerState> {
        let Value::Dict(dict) = entry else {
            return None;
        };

        let get = |idx: i64| dict.get(&HashableValue::I64(idx));

        let mut state = ArenaPlayerState {
            id: PlayerId(as_i64(get(keys.id))?),
            account_db_id: as_i64(get(keys.account_db_id)).unwrap_or_default(),
            avatar_id: as_i64(get(keys.avatar_id)).unwrap_or_default(),
            name: as_string(get(keys.name))?,
            clan_tag: as_string(get(keys.clan_tag)).unwrap_or_default(),
            realm: as_string(get(keys.realm)).unwrap_or_default(),
            team_id: as_i64(get(keys.team_id)).unwrap_or_default(),
            max_health: as_i64(get(keys.max_health)).unwrap_or_default(),
            ship_params_id: ShipParamsId(as_i64(get(keys.ship_params_id)).unwrap_or_default()),
            ..Default::default()
        };

        if let Some(Value::List(params)) = get(keys.crew_params) {
            state.crew_params = params.iter().filter_map(|v| as_i64(Some(v))).collect();
        }
        if let Some(Value::Dict(components)) = get(keys.ship_components) {
            for (slot, module) in components {
                if let (HashableValue::String(slot), Value::String(module)) = (slot, module) {
                    state.ship_components.insert(slot.clone(), module.clone());
                }
            }
        }
        if let Some(Value::Bytes(dump)) = get(keys.ship_config_dump) {
            state.ship_config_dump = dump.clone();
        }

        Some(state)
    }
}

/// A captain's skill sheet keyed by ship class name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrewInfo {
    pub crew_id: i64,
    /// `"Destroyer" -> [internal skill names]`; the decoder keeps the class
    /// keying intact so callers resolve against the actual hull class.
    pub learned_skills: BTreeMap<String, Vec<String>>,
}

impl CrewInfo {
    /// Decode a crew info pickle: `dict[crew slot id -> crew dict]`.
    pub fn map_from_pickle(value: &Value) -> BTreeMap<i64, CrewInfo> {
        let mut out = BTreeMap::new();
        let Value::Dict(dict) = value else {
            return out;
        };
        for (key, entry) in dict {
            let HashableValue::I64(slot) = key else {
                continue;
            };
            let Value::Dict(entry) = entry else {
                continue;
            };

            let mut info = CrewInfo::default();
            for (name, val) in entry {
                let HashableValue::String(name) = name else {
                    continue;
                };
                match (name.as_str(), val) {
                    ("crew_id", Value::I64(id)) => info.crew_id = *id,
                    ("learned_skills", Value::Dict(by_class)) => {
                        for (class, skills) in by_class {
                            let HashableValue::String(class) = class else {
                                continue;
                            };
                            let Value::List(skills) = skills else {
                                continue;
                            };
                            let names = skills
                                .iter()
                                .filter_map(|s| match s {
                                    Value::String(s) => Some(s.clone()),
                                    _ => None,
                                })
                                .collect();
                            info.learned_skills.insert(class.clone(), names);
                        }
                    }
                    _ => {}
                }
            }
            out.insert(*slot, info);
        }
        out
    }
}

/// End-of-battle verdict. `winner_team_id` is `-1` for a draw.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BattleResult {
    pub winner_team_id: i8,
    pub finish_reason: u8,
}

/// Aggregated hidden state after the packet walk.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HiddenState {
    pub players: BTreeMap<PlayerId, ArenaPlayerState>,
    pub crews: BTreeMap<i64, CrewInfo>,
    pub battle_result: Option<BattleResult>,
}

impl HiddenState {
    pub fn player_by_name(&self, name: &str) -> Option<&ArenaPlayerState> {
        self.players.values().find(|p| p.name == name)
    }

    /// Skill sheet for a player, located through `crewParams[0]`.
    pub fn crew_for(&self, player: &ArenaPlayerState) -> Option<&CrewInfo> {
        let crew_id = *player.crew_params.first()?;
        self.crews.values().find(|c| c.crew_id == crew_id)
    }
}

fn as_i64(value: Option<&Value>) -> Option<i64> {
    match value {
        Some(Value::I64(v)) => Some(*v),
        _ => None,
    }
}

fn as_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::ClientVersion;

    fn player_dict(id: i64, name: &str, team: i64) -> Value {
        let keys = &ClientVersion::V14_11_0.bundle().arena_keys;
        let mut dict = BTreeMap::new();
        dict.insert(HashableValue::I64(keys.id), Value::I64(id));
        dict.insert(
            HashableValue::I64(keys.name),
            Value::String(name.to_string()),
        );
        dict.insert(HashableValue::I64(keys.team_id), Value::I64(team));
        dict.insert(
            HashableValue::I64(keys.clan_tag),
            Value::String("OZEKI".to_string()),
        );
        dict.insert(
            HashableValue::I64(keys.crew_params),
            Value::List(vec![Value::I64(555)]),
        );
        Value::Dict(dict)
    }

    #[test]
    fn arena_state_decoding() {
        let keys = &ClientVersion::V14_11_0.bundle().arena_keys;
        let pickle = Value::List(vec![
            player_dict(1, "_meteor0090", 0),
            player_dict(2, "rival", 1),
            Value::I64(99), // junk entry, skipped
        ]);
        let players = ArenaPlayerState::from_pickle(&pickle, keys);
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].name, "_meteor0090");
        assert_eq!(players[0].clan_tag, "OZEKI");
        assert_eq!(players[1].team_id, 1);
    }

    #[test]
    fn crew_resolution_goes_through_crew_params() {
        let keys = &ClientVersion::V14_11_0.bundle().arena_keys;
        let players = ArenaPlayerState::from_pickle(
            &Value::List(vec![player_dict(1, "cap", 0)]),
            keys,
        );

        let mut crew_dict = BTreeMap::new();
        crew_dict.insert(
            HashableValue::String("crew_id".into()),
            Value::I64(555),
        );
        let mut by_class = BTreeMap::new();
        by_class.insert(
            HashableValue::String("Destroyer".into()),
            Value::List(vec![Value::String("Maneuverability".into())]),
        );
        crew_dict.insert(
            HashableValue::String("learned_skills".into()),
            Value::Dict(by_class),
        );
        let mut top = BTreeMap::new();
        top.insert(HashableValue::I64(7), Value::Dict(crew_dict));

        let mut hidden = HiddenState::default();
        for p in players {
            hidden.players.insert(p.id, p);
        }
        hidden.crews = CrewInfo::map_from_pickle(&Value::Dict(top));

        let player = hidden.player_by_name("cap").unwrap();
        let crew = hidden.crew_for(player).unwrap();
        assert_eq!(
            crew.learned_skills.get("Destroyer").unwrap(),
            &vec!["Maneuverability".to_string()]
        );
    }
}
