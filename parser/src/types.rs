use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumString};

/// Server-assigned identifier of a battle. Shared by every participant of
/// one match; the grouping key for all persisted records.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArenaId(pub i64);

impl ArenaId {
    pub fn raw(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ArenaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ArenaId {
    fn from(v: i64) -> Self {
        ArenaId(v)
    }
}

/// Per-battle player identifier (the key of `playersPublicInfo`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub i64);

impl PlayerId {
    pub fn raw(self) -> i64 {
        self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PlayerId {
    fn from(v: i64) -> Self {
        PlayerId(v)
    }
}

impl From<i32> for PlayerId {
    fn from(v: i32) -> Self {
        PlayerId(v as i64)
    }
}

/// Game parameter id of a ship hull (shipParamsId in the arena state).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShipParamsId(pub i64);

impl ShipParamsId {
    pub fn raw(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ShipParamsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ShipParamsId {
    fn from(v: i64) -> Self {
        ShipParamsId(v)
    }
}

/// A game clock value in seconds since the replay started recording.
#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct GameClock(pub f32);

impl GameClock {
    pub fn seconds(self) -> f32 {
        self.0
    }
}

impl fmt::Display for GameClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}s", self.0)
    }
}

/// Relation of a vehicle to the recording player as stored in the replay
/// metadata: 0 = the recorder, 1 = ally, anything else = enemy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    Own,
    Ally,
    Enemy,
}

impl Relation {
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            0 => Relation::Own,
            1 => Relation::Ally,
            _ => Relation::Enemy,
        }
    }

    pub fn is_friendly(self) -> bool {
        matches!(self, Relation::Own | Relation::Ally)
    }
}

/// Team assignment relative to the uploader's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Ally,
    Enemy,
}

/// Battle outcome from the recorder's perspective.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WinLoss {
    Win,
    Loss,
    Draw,
    #[default]
    Unknown,
}

/// Hull classification from the ship-params side table.
///
/// The string forms match the keys used by the crew `learned_skills`
/// mapping, so skill resolution can index directly by class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum ShipClass {
    Destroyer,
    Cruiser,
    Battleship,
    AirCarrier,
    Submarine,
    Auxiliary,
}

/// Minimap-normalized position. X grows east, Y grows north, both in [0, 1]
/// across the playable area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinimapPos {
    pub x: f32,
    pub y: f32,
}

impl MinimapPos {
    pub fn lerp(self, other: MinimapPos, t: f32) -> MinimapPos {
        MinimapPos {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_mapping() {
        assert_eq!(Relation::from_raw(0), Relation::Own);
        assert_eq!(Relation::from_raw(1), Relation::Ally);
        assert_eq!(Relation::from_raw(2), Relation::Enemy);
        assert_eq!(Relation::from_raw(7), Relation::Enemy);
        assert!(Relation::from_raw(1).is_friendly());
        assert!(!Relation::from_raw(2).is_friendly());
    }

    #[test]
    fn win_loss_strings() {
        assert_eq!(WinLoss::Win.to_string(), "win");
        assert_eq!(WinLoss::Unknown.to_string(), "unknown");
        assert_eq!("loss".parse::<WinLoss>().unwrap(), WinLoss::Loss);
    }
}
