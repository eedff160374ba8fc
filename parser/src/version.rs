//! Client version registry.
//!
//! Every supported game client version owns a decoder bundle: the packet
//! type catalogue, the entity-method ids, the positional key table of the
//! arena state dictionary, and the battle statistics index table. Adding a
//! new version is a code change here, never runtime configuration.

use crate::stats::index_table::{self, IndexTable};
use crate::{ReplayError, Result};
use serde::Serialize;

/// Closed set of client versions this decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ClientVersion {
    V14_9_0,
    V14_10_0,
    V14_11_0,
}

impl ClientVersion {
    /// Parse the `clientVersionFromExe` metadata field, e.g.
    /// `"14,11,0,12345678"`. Only the first three components matter.
    pub fn from_client_exe(raw: &str) -> Result<Self> {
        let cleaned = raw.replace(' ', "");
        let mut parts = cleaned.split(',');
        let major: u32 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| ReplayError::UnsupportedVersion(raw.to_string()))?;
        let minor: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let patch: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);

        match (major, minor, patch) {
            (14, 9, _) => Ok(ClientVersion::V14_9_0),
            (14, 10, _) => Ok(ClientVersion::V14_10_0),
            (14, 11, _) => Ok(ClientVersion::V14_11_0),
            _ => Err(ReplayError::UnsupportedVersion(raw.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClientVersion::V14_9_0 => "14.9.0",
            ClientVersion::V14_10_0 => "14.10.0",
            ClientVersion::V14_11_0 => "14.11.0",
        }
    }

    /// Decoder bundle for this version. Consulted once at decode start.
    pub fn bundle(self) -> &'static VersionBundle {
        match self {
            // 14.9 through 14.11 share the packet catalogue; the stats
            // layout shifted in 14.11 when two hit-ribbon slots were added.
            ClientVersion::V14_9_0 => &V14_9_BUNDLE,
            ClientVersion::V14_10_0 => &V14_10_BUNDLE,
            ClientVersion::V14_11_0 => &V14_11_BUNDLE,
        }
    }
}

impl std::fmt::Display for ClientVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire ids of the packet types the decoder cares about. Everything else in
/// the stream is skipped by size.
#[derive(Debug, Clone, Copy)]
pub struct PacketCatalogue {
    pub map: u32,
    pub entity_create: u32,
    pub entity_method: u32,
    pub position: u32,
    pub battle_stats: u32,
}

/// Wire ids of the entity-method calls the decoder dispatches on.
#[derive(Debug, Clone, Copy)]
pub struct MethodIds {
    pub arena_state_received: u32,
    pub receive_crew_info: u32,
    pub battle_end: u32,
    pub receive_damage_stat: u32,
}

/// Positional keys of the per-player dictionary inside the arena state
/// pickle. The game serializes player attributes as `index -> value`; the
/// indices shift between client versions.
#[derive(Debug, Clone, Copy)]
pub struct ArenaStateKeys {
    pub account_db_id: i64,
    pub avatar_id: i64,
    pub clan_tag: i64,
    pub crew_params: i64,
    pub id: i64,
    pub max_health: i64,
    pub name: i64,
    pub realm: i64,
    pub ship_components: i64,
    pub ship_config_dump: i64,
    pub ship_params_id: i64,
    pub team_id: i64,
}

/// Everything version-specific the decoder needs, bundled.
#[derive(Debug)]
pub struct VersionBundle {
    pub packets: PacketCatalogue,
    pub methods: MethodIds,
    pub arena_keys: ArenaStateKeys,
    pub stats_table: &'static IndexTable,
}

const PACKETS_14: PacketCatalogue = PacketCatalogue {
    map: 0x27,
    entity_create: 0x05,
    entity_method: 0x08,
    position: 0x0A,
    battle_stats: 0x22,
};

const METHODS_14: MethodIds = MethodIds {
    arena_state_received: 0x74,
    receive_crew_info: 0x79,
    battle_end: 0x8C,
    receive_damage_stat: 0x91,
};

// 14.x arena-state key layout (descends from the 0.12.8 reshuffle).
const ARENA_KEYS_14: ArenaStateKeys = ArenaStateKeys {
    account_db_id: 0,
    avatar_id: 2,
    clan_tag: 6,
    crew_params: 7,
    id: 11,
    max_health: 24,
    name: 25,
    realm: 30,
    ship_components: 31,
    ship_config_dump: 32,
    ship_params_id: 34,
    team_id: 36,
};

static V14_9_BUNDLE: VersionBundle = VersionBundle {
    packets: PACKETS_14,
    methods: METHODS_14,
    arena_keys: ARENA_KEYS_14,
    stats_table: &index_table::TABLE_14_9,
};

static V14_10_BUNDLE: VersionBundle = VersionBundle {
    packets: PACKETS_14,
    methods: METHODS_14,
    arena_keys: ARENA_KEYS_14,
    stats_table: &index_table::TABLE_14_9,
};

static V14_11_BUNDLE: VersionBundle = VersionBundle {
    packets: PACKETS_14,
    methods: METHODS_14,
    arena_keys: ARENA_KEYS_14,
    stats_table: &index_table::TABLE_14_11,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_exe_strings() {
        assert_eq!(
            ClientVersion::from_client_exe("14,11,0,10859530").unwrap(),
            ClientVersion::V14_11_0
        );
        assert_eq!(
            ClientVersion::from_client_exe("14, 9, 0, 1").unwrap(),
            ClientVersion::V14_9_0
        );
    }

    #[test]
    fn rejects_unknown_versions() {
        let err = ClientVersion::from_client_exe("13,5,0,99").unwrap_err();
        assert!(matches!(err, ReplayError::UnsupportedVersion(_)));

        let err = ClientVersion::from_client_exe("garbage").unwrap_err();
        assert!(matches!(err, ReplayError::UnsupportedVersion(_)));
    }

    #[test]
    fn bundles_are_version_indexed() {
        let v11 = ClientVersion::V14_11_0.bundle();
        let v9 = ClientVersion::V14_9_0.bundle();
        assert_eq!(v11.packets.battle_stats, v9.packets.battle_stats);
        assert!(!std::ptr::eq(v11.stats_table, v9.stats_table));
    }
}
