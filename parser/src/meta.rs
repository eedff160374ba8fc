//! The JSON metadata block at the front of every replay.
//!
//! Field names follow the game's own camelCase spelling so the struct maps
//! 1:1 onto the recorded JSON. Keys the pipeline does not consume are
//! dropped here at the decoder boundary.

use crate::types::{Relation, ShipParamsId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct ReplayMeta {
    pub clientVersionFromExe: String,
    #[serde(default)]
    pub clientVersionFromXml: String,
    /// `DD.MM.YYYY HH:MM:SS`, recorder-local clock.
    #[serde(default)]
    pub dateTime: String,
    #[serde(default)]
    pub mapName: String,
    #[serde(default)]
    pub mapDisplayName: String,
    #[serde(default)]
    pub duration: u32,
    /// Primary game-type source; `gameLogic` and `battleType` are fallbacks.
    #[serde(default)]
    pub matchGroup: String,
    #[serde(default)]
    pub gameLogic: String,
    #[serde(default)]
    pub battleType: String,
    #[serde(default)]
    pub playerID: i64,
    #[serde(default)]
    pub playerName: String,
    #[serde(default)]
    pub vehicles: Vec<VehicleMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct VehicleMeta {
    #[serde(default)]
    pub shipId: i64,
    #[serde(default)]
    pub relation: i64,
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

impl ReplayMeta {
    /// Raw game type with the recorded fallback chain.
    pub fn game_type(&self) -> &str {
        if !self.matchGroup.is_empty() {
            &self.matchGroup
        } else if !self.gameLogic.is_empty() {
            &self.gameLogic
        } else {
            &self.battleType
        }
    }

    pub fn own_vehicle(&self) -> Option<&VehicleMeta> {
        self.vehicles
            .iter()
            .find(|v| Relation::from_raw(v.relation) == Relation::Own)
    }

    pub fn vehicles_with_relation(&self, relation: Relation) -> impl Iterator<Item = &VehicleMeta> {
        self.vehicles
            .iter()
            .filter(move |v| Relation::from_raw(v.relation) == relation)
    }
}

impl VehicleMeta {
    pub fn ship_params_id(&self) -> ShipParamsId {
        ShipParamsId(self.shipId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_type_fallback_chain() {
        let mut meta: ReplayMeta = serde_json::from_str(
            r#"{"clientVersionFromExe":"14,11,0,1","matchGroup":"clan","gameLogic":"Domination"}"#,
        )
        .unwrap();
        assert_eq!(meta.game_type(), "clan");

        meta.matchGroup.clear();
        assert_eq!(meta.game_type(), "Domination");

        meta.gameLogic.clear();
        meta.battleType = "pvp".into();
        assert_eq!(meta.game_type(), "pvp");
    }

    #[test]
    fn unknown_keys_are_dropped() {
        let meta: ReplayMeta = serde_json::from_str(
            r#"{"clientVersionFromExe":"14,11,0,1","weather":"fog","scenario":7}"#,
        )
        .unwrap();
        assert_eq!(meta.clientVersionFromExe, "14,11,0,1");
    }

    #[test]
    fn relation_partition() {
        let meta: ReplayMeta = serde_json::from_str(
            r#"{"clientVersionFromExe":"14,11,0,1","vehicles":[
                {"shipId":1,"relation":0,"id":10,"name":"me"},
                {"shipId":2,"relation":1,"id":11,"name":"friend"},
                {"shipId":3,"relation":2,"id":12,"name":"foe"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(meta.own_vehicle().unwrap().name, "me");
        assert_eq!(meta.vehicles_with_relation(Relation::Ally).count(), 1);
        assert_eq!(meta.vehicles_with_relation(Relation::Enemy).count(), 1);
    }
}
