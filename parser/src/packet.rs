//! Packet framing and payload decoding.
//!
//! Every packet is framed as `size:u32 | type:u32 | clock:f32 | payload`.
//! The payloads of interest carry either fixed binary layouts or pickled
//! game state; everything else is skipped by size and surfaced as
//! `PacketPayload::Unknown` so the walk stays total.

use crate::hidden::{ArenaPlayerState, CrewInfo};
use crate::stats::SlotValue;
use crate::types::{ArenaId, GameClock, MinimapPos, PlayerId, ShipParamsId};
use crate::version::VersionBundle;
use crate::{IResult, ReplayError, Result};
use flate2::read::ZlibDecoder;
use nom::bytes::complete::take;
use nom::number::complete::{le_f32, le_i64, le_i8, le_u32, le_u8};
use serde::Serialize;
use serde_pickle::{DeOptions, HashableValue, Value};
use std::collections::BTreeMap;
use std::io::Read;

/// One frame of the packet stream, payload still raw.
#[derive(Debug, Clone, Copy)]
pub struct RawPacket<'a> {
    pub kind: u32,
    pub clock: GameClock,
    pub payload: &'a [u8],
}

/// Parse a single framed packet off the front of `i`.
pub fn parse_raw(i: &[u8]) -> IResult<'_, RawPacket<'_>> {
    let (i, size) = le_u32(i)?;
    let (i, kind) = le_u32(i)?;
    let (i, clock) = le_f32(i)?;
    let (i, payload) = take(size as usize)(i)?;
    Ok((
        i,
        RawPacket {
            kind,
            clock: GameClock(clock),
            payload,
        },
    ))
}

/// Decoded payload of a packet the pipeline cares about.
#[derive(Debug, Clone)]
pub enum PacketPayload {
    Map {
        space_id: u32,
        arena_id: ArenaId,
        map_name: String,
    },
    EntityCreate {
        entity_id: u32,
        player_id: PlayerId,
        ship_params_id: ShipParamsId,
    },
    Position {
        entity_id: u32,
        pos: MinimapPos,
        heading: f32,
    },
    ArenaState {
        players: Vec<ArenaPlayerState>,
    },
    CrewInfo {
        crews: BTreeMap<i64, CrewInfo>,
    },
    BattleEnd {
        winner_team_id: i8,
        reason: u8,
    },
    DamageStat {
        entries: Vec<DamageStatEntry>,
    },
    BattleStats(BattleStatsData),
    Unknown {
        kind: u32,
    },
}

/// One row of a `receiveDamageStat` call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DamageStatEntry {
    pub victim: PlayerId,
    pub aggressor: PlayerId,
    pub amount: f64,
}

/// Server data of the terminal battle statistics packet.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BattleStatsData {
    pub arena_unique_id: ArenaId,
    /// Positional stat arrays, one per player, ~430+ slots each.
    pub players_public_info: BTreeMap<PlayerId, Vec<SlotValue>>,
    /// Private payload of the recorder; index 7 holds the XP array.
    pub private_data_list: Vec<SlotValue>,
}

impl BattleStatsData {
    /// Earned XP, stored by the server at 10x scale.
    pub fn experience_earned(&self) -> Option<i64> {
        match self.private_data_list.get(7) {
            Some(SlotValue::List(xs)) => match xs.first() {
                Some(SlotValue::Int(raw)) => Some(raw / 10),
                _ => None,
            },
            _ => None,
        }
    }

    /// Raw (10x) XP value used by the clan-battle outcome heuristic.
    pub fn raw_experience(&self) -> Option<i64> {
        match self.private_data_list.get(7) {
            Some(SlotValue::List(xs)) => match xs.first() {
                Some(SlotValue::Int(raw)) => Some(*raw),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Decode a raw packet against a version bundle.
pub fn decode(raw: &RawPacket<'_>, bundle: &VersionBundle) -> Result<PacketPayload> {
    let p = &bundle.packets;
    if raw.kind == p.map {
        decode_map(raw.payload)
    } else if raw.kind == p.entity_create {
        decode_entity_create(raw.payload)
    } else if raw.kind == p.position {
        decode_position(raw.payload)
    } else if raw.kind == p.entity_method {
        decode_entity_method(raw.payload, bundle)
    } else if raw.kind == p.battle_stats {
        decode_battle_stats(raw.payload)
    } else {
        Ok(PacketPayload::Unknown { kind: raw.kind })
    }
}

fn truncated(payload: &[u8]) -> ReplayError {
    ReplayError::TruncatedStream {
        offset: payload.len(),
    }
}

fn decode_map(payload: &[u8]) -> Result<PacketPayload> {
    fn inner(i: &[u8]) -> IResult<'_, (u32, i64, &[u8])> {
        let (i, space_id) = le_u32(i)?;
        let (i, arena_id) = le_i64(i)?;
        let (i, name_len) = le_u32(i)?;
        let (i, name) = take(name_len as usize)(i)?;
        Ok((i, (space_id, arena_id, name)))
    }

    let (_, (space_id, arena_id, name)) = inner(payload).map_err(|_| truncated(payload))?;
    Ok(PacketPayload::Map {
        space_id,
        arena_id: ArenaId(arena_id),
        map_name: String::from_utf8_lossy(name).into_owned(),
    })
}

fn decode_entity_create(payload: &[u8]) -> Result<PacketPayload> {
    fn inner(i: &[u8]) -> IResult<'_, (u32, i64, i64)> {
        let (i, entity_id) = le_u32(i)?;
        let (i, player_id) = le_i64(i)?;
        let (i, ship_params_id) = le_i64(i)?;
        Ok((i, (entity_id, player_id, ship_params_id)))
    }

    let (_, (entity_id, player_id, ship_params_id)) =
        inner(payload).map_err(|_| truncated(payload))?;
    Ok(PacketPayload::EntityCreate {
        entity_id,
        player_id: PlayerId(player_id),
        ship_params_id: ShipParamsId(ship_params_id),
    })
}

fn decode_position(payload: &[u8]) -> Result<PacketPayload> {
    fn inner(i: &[u8]) -> IResult<'_, (u32, f32, f32, f32)> {
        let (i, entity_id) = le_u32(i)?;
        let (i, x) = le_f32(i)?;
        let (i, y) = le_f32(i)?;
        let (i, heading) = le_f32(i)?;
        Ok((i, (entity_id, x, y, heading)))
    }

    let (_, (entity_id, x, y, heading)) = inner(payload).map_err(|_| truncated(payload))?;
    Ok(PacketPayload::Position {
        entity_id,
        pos: MinimapPos { x, y },
        heading,
    })
}

fn decode_entity_method(payload: &[u8], bundle: &VersionBundle) -> Result<PacketPayload> {
    fn header(i: &[u8]) -> IResult<'_, (u32, u32)> {
        let (i, entity_id) = le_u32(i)?;
        let (i, method_id) = le_u32(i)?;
        Ok((i, (entity_id, method_id)))
    }

    let (args, (_entity_id, method_id)) = header(payload).map_err(|_| truncated(payload))?;
    let m = &bundle.methods;

    if method_id == m.arena_state_received {
        let value = unpickle(args)?;
        let players = ArenaPlayerState::from_pickle(&value, &bundle.arena_keys);
        Ok(PacketPayload::ArenaState { players })
    } else if method_id == m.receive_crew_info {
        let value = unpickle(args)?;
        Ok(PacketPayload::CrewInfo {
            crews: CrewInfo::map_from_pickle(&value),
        })
    } else if method_id == m.battle_end {
        let (_, (winner, reason)) = nom::sequence::pair(le_i8, le_u8)(args)
            .map_err(|_: nom::Err<nom::error::Error<&[u8]>>| truncated(args))?;
        Ok(PacketPayload::BattleEnd {
            winner_team_id: winner,
            reason,
        })
    } else if method_id == m.receive_damage_stat {
        let value = unpickle(&inflate(args)?)?;
        Ok(PacketPayload::DamageStat {
            entries: damage_entries(&value),
        })
    } else {
        Ok(PacketPayload::Unknown {
            kind: bundle.packets.entity_method,
        })
    }
}

fn decode_battle_stats(payload: &[u8]) -> Result<PacketPayload> {
    let value = unpickle(&inflate(payload)?)?;
    let Value::Dict(dict) = value else {
        return Err(ReplayError::DecryptFailure(
            "battle stats payload is not a dict",
        ));
    };

    let mut data = BattleStatsData::default();
    for (key, val) in &dict {
        let HashableValue::String(name) = key else {
            continue;
        };
        match (name.as_str(), val) {
            ("arenaUniqueID", Value::I64(id)) => data.arena_unique_id = ArenaId(*id),
            ("playersPublicInfo", Value::Dict(players)) => {
                for (pid, slots) in players {
                    let HashableValue::I64(pid) = pid else {
                        continue;
                    };
                    let Value::List(slots) = slots else {
                        continue;
                    };
                    data.players_public_info
                        .insert(PlayerId(*pid), slots.iter().map(SlotValue::from).collect());
                }
            }
            ("privateDataList", Value::List(items)) => {
                data.private_data_list = items.iter().map(SlotValue::from).collect();
            }
            _ => {}
        }
    }
    Ok(PacketPayload::BattleStats(data))
}

fn damage_entries(value: &Value) -> Vec<DamageStatEntry> {
    let Value::List(items) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let (Value::Tuple(parts) | Value::List(parts)) = item else {
                return None;
            };
            match parts.as_slice() {
                [Value::I64(victim), Value::I64(aggressor), Value::F64(amount)] => {
                    Some(DamageStatEntry {
                        victim: PlayerId(*victim),
                        aggressor: PlayerId(*aggressor),
                        amount: *amount,
                    })
                }
                _ => None,
            }
        })
        .collect()
}

fn unpickle(data: &[u8]) -> Result<Value> {
    serde_pickle::value_from_slice(data, DeOptions::new())
        .map_err(|_| ReplayError::DecryptFailure("undecodable pickle payload"))
}

fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|_| ReplayError::DecryptFailure("compressed payload does not inflate"))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::ClientVersion;

    #[test]
    fn raw_framing() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&4u32.to_le_bytes());
        frame.extend_from_slice(&0x27u32.to_le_bytes());
        frame.extend_from_slice(&12.5f32.to_le_bytes());
        frame.extend_from_slice(&[1, 2, 3, 4]);
        frame.extend_from_slice(&[0xEE]); // next packet's bytes

        let (rest, raw) = parse_raw(&frame).unwrap();
        assert_eq!(raw.kind, 0x27);
        assert_eq!(raw.clock.seconds(), 12.5);
        assert_eq!(raw.payload, &[1, 2, 3, 4]);
        assert_eq!(rest, &[0xEE]);
    }

    #[test]
    fn unknown_packets_are_skipped_not_fatal() {
        let bundle = ClientVersion::V14_11_0.bundle();
        let raw = RawPacket {
            kind: 0xDEAD,
            clock: GameClock(0.0),
            payload: &[1, 2, 3],
        };
        let decoded = decode(&raw, bundle).unwrap();
        assert!(matches!(decoded, PacketPayload::Unknown { kind: 0xDEAD }));
    }

    #[test]
    fn map_packet_round_trip() {
        let bundle = ClientVersion::V14_11_0.bundle();
        let mut payload = Vec::new();
        payload.extend_from_slice(&3u32.to_le_bytes());
        payload.extend_from_slice(&991_199i64.to_le_bytes());
        let name = b"spaces/19_OC_prey";
        payload.extend_from_slice(&(name.len() as u32).to_le_bytes());
        payload.extend_from_slice(name);

        let raw = RawPacket {
            kind: bundle.packets.map,
            clock: GameClock(0.0),
            payload: &payload,
        };
        match decode(&raw, bundle).unwrap() {
            PacketPayload::Map {
                arena_id, map_name, ..
            } => {
                assert_eq!(arena_id, ArenaId(991_199));
                assert_eq!(map_name, "spaces/19_OC_prey");
            }
            other => panic!("wrong payload: {other:?}"),
        }
    }
}
