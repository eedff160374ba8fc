//! Ship parameter side table: hull id -> name and class.
//!
//! Derived from game data and bundled with the crate; constructed once at
//! process start and passed through the call graph (no process-global
//! cache). A hull the table does not know decodes with a placeholder name
//! and no class, which downstream records tolerate.

use crate::types::{ShipClass, ShipParamsId};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct ShipInfo {
    pub name: String,
    pub species: ShipClass,
}

/// Immutable hull lookup table.
#[derive(Debug, Clone)]
pub struct ShipParams {
    by_id: HashMap<i64, ShipInfo>,
}

static BUNDLED_SHIPS: &str = include_str!("../data/ships.json");

impl ShipParams {
    /// Table bundled with the crate (a current-clients subset of the full
    /// game catalogue).
    pub fn bundled() -> Self {
        Self::from_json(BUNDLED_SHIPS).expect("bundled ships.json is well-formed")
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let raw: HashMap<String, ShipInfo> = serde_json::from_str(json)?;
        let by_id = raw
            .into_iter()
            .filter_map(|(id, info)| id.parse::<i64>().ok().map(|id| (id, info)))
            .collect();
        Ok(ShipParams { by_id })
    }

    pub fn get(&self, id: ShipParamsId) -> Option<&ShipInfo> {
        self.by_id.get(&id.raw())
    }

    pub fn ship_name(&self, id: ShipParamsId) -> String {
        match self.get(id) {
            Some(info) => info.name.clone(),
            None => format!("Unknown Ship (ID: {})", id.raw()),
        }
    }

    pub fn ship_class(&self, id: ShipParamsId) -> Option<ShipClass> {
        self.get(id).map(|info| info.species)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_table_loads() {
        let ships = ShipParams::bundled();
        assert!(ships.len() >= 14);

        let chung_mu = ships.get(ShipParamsId(4287510224)).unwrap();
        assert_eq!(chung_mu.name, "Chung Mu");
        assert_eq!(chung_mu.species, ShipClass::Destroyer);
    }

    #[test]
    fn unknown_hull_gets_placeholder() {
        let ships = ShipParams::bundled();
        assert_eq!(
            ships.ship_name(ShipParamsId(42)),
            "Unknown Ship (ID: 42)"
        );
        assert!(ships.ship_class(ShipParamsId(42)).is_none());
    }
}
