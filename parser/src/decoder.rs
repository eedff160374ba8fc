//! The packet walk: raw replay bytes to a `DecodedReplay`.
//!
//! Decoding is a pure function of the input bytes. The walk streams every
//! packet through once, building the hidden state, the renderer timeline,
//! and capturing the terminal statistics payload when the battle ran to
//! completion.

use crate::hidden::{BattleResult, HiddenState};
use crate::meta::ReplayMeta;
use crate::packet::{self, BattleStatsData, DamageStatEntry, PacketPayload};
use crate::replay_file::ReplayFile;
use crate::types::{ArenaId, GameClock, MinimapPos, PlayerId, ShipParamsId};
use crate::version::ClientVersion;
use crate::{ReplayError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// A ship position sample for the renderer.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TrackPoint {
    pub clock: GameClock,
    pub pos: MinimapPos,
    pub heading: f32,
}

/// Entity identity established by an entity-create packet.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EntityInfo {
    pub player_id: PlayerId,
    pub ship_params_id: ShipParamsId,
}

/// Movement and damage history of the battle, renderer input.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Timeline {
    pub entities: BTreeMap<u32, EntityInfo>,
    pub tracks: BTreeMap<u32, Vec<TrackPoint>>,
    pub damage: Vec<(GameClock, DamageStatEntry)>,
    /// Clock of the last packet seen.
    pub duration: f32,
}

impl Timeline {
    pub fn entity_for_player(&self, player_id: PlayerId) -> Option<u32> {
        self.entities
            .iter()
            .find(|(_, info)| info.player_id == player_id)
            .map(|(id, _)| *id)
    }
}

/// Everything extracted from one replay.
#[derive(Debug, Clone, Serialize)]
pub struct DecodedReplay {
    pub version: ClientVersion,
    pub meta: ReplayMeta,
    /// Map identifier from the map packet; falls back to the metadata name.
    pub map_id: String,
    pub arena_id: Option<ArenaId>,
    pub hidden: HiddenState,
    /// Absent when the recorder left before the battle ended.
    pub battle_stats: Option<BattleStatsData>,
    pub timeline: Timeline,
}

impl DecodedReplay {
    /// True when the terminal statistics packet was recorded.
    pub fn is_complete(&self) -> bool {
        self.battle_stats.is_some()
    }

    pub fn own_player(&self) -> Option<&crate::hidden::ArenaPlayerState> {
        self.hidden.player_by_name(&self.meta.playerName)
    }

    pub fn own_team_id(&self) -> Option<i64> {
        self.own_player().map(|p| p.team_id)
    }

    pub fn experience_earned(&self) -> Option<i64> {
        self.battle_stats.as_ref()?.experience_earned()
    }
}

/// Versioned replay decoder.
///
/// Lenient by default: a replay without the terminal statistics packet
/// decodes successfully with `battle_stats: None`, so incomplete battles
/// still yield searchable metadata. Strict mode turns that case into
/// `NoBattleStats`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayDecoder {
    strict: bool,
}

impl ReplayDecoder {
    pub fn new() -> Self {
        ReplayDecoder { strict: false }
    }

    pub fn strict(self) -> Self {
        ReplayDecoder { strict: true }
    }

    pub fn decode_file(&self, path: &std::path::Path) -> Result<DecodedReplay> {
        let replay = ReplayFile::from_file(path)?;
        self.decode_replay(replay)
    }

    pub fn decode(&self, data: &[u8]) -> Result<DecodedReplay> {
        let replay = ReplayFile::from_bytes(data)?;
        self.decode_replay(replay)
    }

    fn decode_replay(&self, replay: ReplayFile) -> Result<DecodedReplay> {
        let version = ClientVersion::from_client_exe(&replay.meta.clientVersionFromExe)?;
        // The registry is consulted exactly once per decode.
        let bundle = version.bundle();

        let mut decoded = DecodedReplay {
            version,
            map_id: replay.meta.mapName.clone(),
            meta: replay.meta,
            arena_id: None,
            hidden: HiddenState::default(),
            battle_stats: None,
            timeline: Timeline::default(),
        };

        let mut remaining = &replay.packet_data[..];
        let total = replay.packet_data.len();
        while !remaining.is_empty() {
            let (rest, raw) = packet::parse_raw(remaining).map_err(|_| {
                ReplayError::TruncatedStream {
                    offset: total - remaining.len(),
                }
            })?;
            remaining = rest;
            decoded.timeline.duration = decoded.timeline.duration.max(raw.clock.seconds());

            match packet::decode(&raw, bundle)? {
                PacketPayload::Map {
                    arena_id, map_name, ..
                } => {
                    debug!(%arena_id, map = %map_name, "map packet");
                    decoded.arena_id = Some(arena_id);
                    if !map_name.is_empty() {
                        decoded.map_id = map_name;
                    }
                }
                PacketPayload::EntityCreate {
                    entity_id,
                    player_id,
                    ship_params_id,
                } => {
                    decoded.timeline.entities.insert(
                        entity_id,
                        EntityInfo {
                            player_id,
                            ship_params_id,
                        },
                    );
                }
                PacketPayload::Position {
                    entity_id,
                    pos,
                    heading,
                } => {
                    decoded
                        .timeline
                        .tracks
                        .entry(entity_id)
                        .or_default()
                        .push(TrackPoint {
                            clock: raw.clock,
                            pos,
                            heading,
                        });
                }
                PacketPayload::ArenaState { players } => {
                    for player in players {
                        decoded.hidden.players.insert(player.id, player);
                    }
                }
                PacketPayload::CrewInfo { crews } => {
                    decoded.hidden.crews.extend(crews);
                }
                PacketPayload::BattleEnd {
                    winner_team_id,
                    reason,
                } => {
                    decoded.hidden.battle_result = Some(BattleResult {
                        winner_team_id,
                        finish_reason: reason,
                    });
                }
                PacketPayload::DamageStat { entries } => {
                    for entry in entries {
                        decoded.timeline.damage.push((raw.clock, entry));
                    }
                }
                PacketPayload::BattleStats(data) => {
                    if decoded.arena_id.is_none() {
                        decoded.arena_id = Some(data.arena_unique_id);
                    }
                    decoded.battle_stats = Some(data);
                }
                PacketPayload::Unknown { kind } => {
                    trace!(kind, "skipping packet");
                }
            }
        }

        if self.strict && decoded.battle_stats.is_none() {
            return Err(ReplayError::NoBattleStats);
        }

        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::ReplayBuilder;

    #[test]
    fn full_battle_decodes_with_stats() {
        let data = ReplayBuilder::clan_battle().build();
        let decoded = ReplayDecoder::new().decode(&data).unwrap();

        assert!(decoded.is_complete());
        assert_eq!(decoded.version, ClientVersion::V14_11_0);
        assert_eq!(decoded.map_id, "spaces/19_OC_prey");
        assert_eq!(decoded.arena_id, Some(ArenaId(7_700_000_001)));
        assert_eq!(decoded.hidden.players.len(), 14);
        assert_eq!(
            decoded.battle_stats.as_ref().unwrap().players_public_info.len(),
            14
        );
        assert_eq!(decoded.own_player().unwrap().name, "_meteor0090");
    }

    #[test]
    fn incomplete_battle_is_lenient_by_default() {
        let data = ReplayBuilder::clan_battle().without_battle_stats().build();
        let decoded = ReplayDecoder::new().decode(&data).unwrap();
        assert!(!decoded.is_complete());
        // Metadata still available for search.
        assert_eq!(decoded.meta.playerName, "_meteor0090");

        let err = ReplayDecoder::new().strict().decode(&data).unwrap_err();
        assert!(matches!(err, ReplayError::NoBattleStats));
    }

    #[test]
    fn decode_is_idempotent() {
        let data = ReplayBuilder::clan_battle().build();
        let a = ReplayDecoder::new().decode(&data).unwrap();
        let b = ReplayDecoder::new().decode(&data).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn unsupported_version_fails_cleanly() {
        let data = ReplayBuilder::clan_battle()
            .client_version("13,5,0,1")
            .build();
        let err = ReplayDecoder::new().decode(&data).unwrap_err();
        assert!(matches!(err, ReplayError::UnsupportedVersion(_)));
    }

    #[test]
    fn truncated_packet_stream_reports_offset() {
        let data = ReplayBuilder::clan_battle().truncate_stream().build();
        let err = ReplayDecoder::new().decode(&data).unwrap_err();
        assert!(matches!(err, ReplayError::TruncatedStream { .. }));
    }

    #[test]
    fn timeline_collects_positions() {
        let data = ReplayBuilder::clan_battle().build();
        let decoded = ReplayDecoder::new().decode(&data).unwrap();
        assert!(!decoded.timeline.tracks.is_empty());
        assert!(decoded.timeline.duration > 0.0);

        let own = decoded.own_player().unwrap();
        let entity = decoded.timeline.entity_for_player(own.id).unwrap();
        assert!(decoded.timeline.tracks.contains_key(&entity));
    }
}
