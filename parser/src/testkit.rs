//! Synthetic replay construction for the workspace test suites.
//!
//! Builds byte-exact `.wowsreplay` containers (framing, cipher, pickled
//! payloads) around a configurable battle so decode paths can be exercised
//! without game-client fixtures.

#![doc(hidden)]

use crate::replay_file::{CIPHER_KEY, REPLAY_MAGIC};
use crate::stats::index_table::{StatsField, TABLE_14_11};
use crate::stats::upgrades::{encode_ship_config_dump, ShipConfig};
use crate::version::ClientVersion;
use blowfish::Blowfish;
use cipher::generic_array::GenericArray;
use cipher::{BlockEncrypt, KeyInit};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde_pickle::{HashableValue, SerOptions, Value};
use std::collections::BTreeMap;
use std::io::Write;

#[derive(Debug, Clone)]
pub struct TestPlayer {
    pub id: i64,
    pub name: String,
    pub clan_tag: String,
    pub team_id: i64,
    pub ship_params_id: i64,
    pub crew_id: i64,
    pub damage: i64,
    pub base_xp: i64,
    pub kills: i64,
}

impl TestPlayer {
    pub fn new(id: i64, name: &str, clan: &str, team: i64, ship: i64) -> Self {
        TestPlayer {
            id,
            name: name.to_string(),
            clan_tag: clan.to_string(),
            team_id: team,
            ship_params_id: ship,
            crew_id: 500 + id,
            damage: 40_000 + id * 1_000,
            base_xp: 1_500 + id * 10,
            kills: (id % 3) as i64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplayBuilder {
    client_version: String,
    date_time: String,
    match_group: String,
    map_name: String,
    arena_id: i64,
    own_name: String,
    players: Vec<TestPlayer>,
    winner_team_id: Option<i8>,
    raw_xp: i64,
    with_battle_stats: bool,
    with_map_packet: bool,
    truncate_stream: bool,
}

impl ReplayBuilder {
    /// Minimal valid replay: one player, no battle statistics.
    pub fn new() -> Self {
        ReplayBuilder {
            client_version: "14,11,0,10859530".to_string(),
            date_time: "03.01.2026 23:28:22".to_string(),
            match_group: "clan".to_string(),
            map_name: "spaces/19_OC_prey".to_string(),
            arena_id: 7_700_000_001,
            own_name: "_meteor0090".to_string(),
            players: vec![TestPlayer::new(1, "_meteor0090", "OZEKI", 0, 4287510224)],
            winner_team_id: None,
            raw_xp: 300_000,
            with_battle_stats: false,
            with_map_packet: true,
            truncate_stream: false,
        }
    }

    /// A full 7v7 clan battle recorded by `_meteor0090`, ally team wins.
    pub fn clan_battle() -> Self {
        let ozeki: [(&str, i64); 7] = [
            ("_meteor0090", 4287510224),
            ("harugumo_main", 4182751184),
            ("pensa_cola", 4179605456),
            ("yama_mia", 4276435952),
            ("slava_enjoyer", 3763249104),
            ("venice_canal", 4181702608),
            ("cold_halland", 3761217488),
        ];
        let knave: [(&str, i64); 7] = [
            ("kn_daring", 4287493872),
            ("kn_gearing", 3760168912),
            ("kn_shima", 4288559088),
            ("kn_desmo", 4179605456),
            ("kn_smolensk", 4182751184),
            ("kn_kremlin", 4074616784),
            ("kn_conde", 4074747856),
        ];

        let mut players = Vec::new();
        for (i, (name, ship)) in ozeki.iter().enumerate() {
            players.push(TestPlayer::new(1 + i as i64, name, "OZEKI", 0, *ship));
        }
        for (i, (name, ship)) in knave.iter().enumerate() {
            players.push(TestPlayer::new(101 + i as i64, name, "KNAVE", 1, *ship));
        }

        ReplayBuilder {
            players,
            winner_team_id: Some(0),
            with_battle_stats: true,
            ..ReplayBuilder::new()
        }
    }

    pub fn client_version(mut self, version: &str) -> Self {
        self.client_version = version.to_string();
        self
    }

    pub fn date_time(mut self, date_time: &str) -> Self {
        self.date_time = date_time.to_string();
        self
    }

    pub fn match_group(mut self, group: &str) -> Self {
        self.match_group = group.to_string();
        self
    }

    pub fn arena_id(mut self, arena_id: i64) -> Self {
        self.arena_id = arena_id;
        self
    }

    pub fn recorded_by(mut self, name: &str) -> Self {
        self.own_name = name.to_string();
        self
    }

    pub fn winner(mut self, team: Option<i8>) -> Self {
        self.winner_team_id = team;
        self
    }

    pub fn raw_xp(mut self, raw_xp: i64) -> Self {
        self.raw_xp = raw_xp;
        self
    }

    pub fn without_battle_stats(mut self) -> Self {
        self.with_battle_stats = false;
        self.winner_team_id = None;
        self
    }

    pub fn without_map_packet(mut self) -> Self {
        self.with_map_packet = false;
        self
    }

    pub fn truncate_stream(mut self) -> Self {
        self.truncate_stream = true;
        self
    }

    pub fn players(&self) -> &[TestPlayer] {
        &self.players
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_parts().0
    }

    /// Returns the bytes plus the offset of the encrypted tail.
    pub fn build_parts(&self) -> (Vec<u8>, usize) {
        let meta = self.meta_json();
        let stream = self.packet_stream();

        let compressed = {
            let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
            enc.write_all(&stream).expect("in-memory write");
            enc.finish().expect("in-memory finish")
        };
        let encrypted = encrypt(&compressed);

        let mut out = Vec::new();
        out.extend_from_slice(&REPLAY_MAGIC.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&(meta.len() as u32).to_le_bytes());
        out.extend_from_slice(&meta);
        let encrypted_at = out.len();
        out.extend_from_slice(&encrypted);
        (out, encrypted_at)
    }

    fn meta_json(&self) -> Vec<u8> {
        let own_team = self
            .players
            .iter()
            .find(|p| p.name == self.own_name)
            .map(|p| p.team_id)
            .unwrap_or(0);
        let vehicles: Vec<serde_json::Value> = self
            .players
            .iter()
            .map(|p| {
                let relation = if p.name == self.own_name {
                    0
                } else if p.team_id == own_team {
                    1
                } else {
                    2
                };
                serde_json::json!({
                    "shipId": p.ship_params_id,
                    "relation": relation,
                    "id": p.id,
                    "name": p.name,
                })
            })
            .collect();

        serde_json::to_vec(&serde_json::json!({
            "clientVersionFromExe": self.client_version,
            "clientVersionFromXml": self.client_version,
            "dateTime": self.date_time,
            "mapName": self.map_name,
            "mapDisplayName": "Crash Zone Alpha",
            "duration": 1200,
            "matchGroup": self.match_group,
            "playerID": self.players.iter().find(|p| p.name == self.own_name).map(|p| p.id).unwrap_or(0),
            "playerName": self.own_name,
            "vehicles": vehicles,
        }))
        .expect("meta serializes")
    }

    fn packet_stream(&self) -> Vec<u8> {
        let bundle = ClientVersion::V14_11_0.bundle();
        let p = &bundle.packets;
        let m = &bundle.methods;
        let mut stream = Vec::new();

        if self.with_map_packet {
            let mut payload = Vec::new();
            payload.extend_from_slice(&19u32.to_le_bytes());
            payload.extend_from_slice(&self.arena_id.to_le_bytes());
            payload.extend_from_slice(&(self.map_name.len() as u32).to_le_bytes());
            payload.extend_from_slice(self.map_name.as_bytes());
            frame(&mut stream, p.map, 0.0, &payload);
        }

        // Entities + a short position track per player
        for (i, player) in self.players.iter().enumerate() {
            let entity_id = 1000 + i as u32;
            let mut payload = Vec::new();
            payload.extend_from_slice(&entity_id.to_le_bytes());
            payload.extend_from_slice(&player.id.to_le_bytes());
            payload.extend_from_slice(&player.ship_params_id.to_le_bytes());
            frame(&mut stream, p.entity_create, 1.0, &payload);
        }

        // Arena state
        let arena_state = self.arena_state_pickle(bundle);
        frame_method(&mut stream, p.entity_method, m.arena_state_received, 2.0, &arena_state);

        // Crew info
        let crew_info = self.crew_info_pickle();
        frame_method(&mut stream, p.entity_method, m.receive_crew_info, 2.5, &crew_info);

        for tick in 0..5 {
            for (i, player) in self.players.iter().enumerate() {
                let entity_id = 1000 + i as u32;
                let t = tick as f32;
                let mut payload = Vec::new();
                payload.extend_from_slice(&entity_id.to_le_bytes());
                let side = if player.team_id == 0 { 0.1 } else { 0.9 };
                payload.extend_from_slice(&(side + t * 0.05f32).to_le_bytes());
                payload.extend_from_slice(&(0.1 + i as f32 * 0.05).to_le_bytes());
                payload.extend_from_slice(&0.0f32.to_le_bytes());
                frame(&mut stream, p.position, 30.0 + t * 60.0, &payload);
            }
        }

        // A couple of damage rows
        if self.players.len() >= 2 {
            let rows = Value::List(vec![Value::Tuple(vec![
                Value::I64(self.players[1].id),
                Value::I64(self.players[0].id),
                Value::F64(8_420.0),
            ])]);
            let blob = deflate(&pickle(&rows));
            frame_method(&mut stream, p.entity_method, m.receive_damage_stat, 300.0, &blob);
        }

        if let Some(winner) = self.winner_team_id {
            let args = [winner as u8, 2u8];
            frame_method(&mut stream, p.entity_method, m.battle_end, 1190.0, &args);
        }

        if self.with_battle_stats {
            let blob = deflate(&pickle(&self.battle_stats_pickle()));
            frame(&mut stream, p.battle_stats, 1199.0, &blob);
        }

        if self.truncate_stream {
            // A frame header promising more payload than remains.
            stream.extend_from_slice(&100u32.to_le_bytes());
            stream.extend_from_slice(&0xFFu32.to_le_bytes());
            stream.extend_from_slice(&0.0f32.to_le_bytes());
            stream.extend_from_slice(&[0xAA, 0xBB]);
        }

        stream
    }

    fn arena_state_pickle(&self, bundle: &crate::version::VersionBundle) -> Vec<u8> {
        let keys = &bundle.arena_keys;
        let entries: Vec<Value> = self
            .players
            .iter()
            .map(|p| {
                let mut dict = BTreeMap::new();
                dict.insert(HashableValue::I64(keys.id), Value::I64(p.id));
                dict.insert(HashableValue::I64(keys.account_db_id), Value::I64(2_000_000_000 + p.id));
                dict.insert(HashableValue::I64(keys.avatar_id), Value::I64(3_000 + p.id));
                dict.insert(HashableValue::I64(keys.name), Value::String(p.name.clone()));
                dict.insert(HashableValue::I64(keys.clan_tag), Value::String(p.clan_tag.clone()));
                dict.insert(HashableValue::I64(keys.realm), Value::String("ASIA".to_string()));
                dict.insert(HashableValue::I64(keys.team_id), Value::I64(p.team_id));
                dict.insert(HashableValue::I64(keys.max_health), Value::I64(21_500));
                dict.insert(HashableValue::I64(keys.ship_params_id), Value::I64(p.ship_params_id));
                dict.insert(
                    HashableValue::I64(keys.crew_params),
                    Value::List(vec![Value::I64(p.crew_id)]),
                );
                let mut components = BTreeMap::new();
                components.insert(
                    HashableValue::String("hull".to_string()),
                    Value::String("B_Hull".to_string()),
                );
                dict.insert(HashableValue::I64(keys.ship_components), Value::Dict(components));
                dict.insert(
                    HashableValue::I64(keys.ship_config_dump),
                    Value::Bytes(encode_ship_config_dump(&ShipConfig {
                        ship_params_id: p.ship_params_id as u32,
                        units: vec![1, 2],
                        modernization: vec![4247494576, 4229668240],
                        signals: vec![4290791376],
                    })),
                );
                Value::Dict(dict)
            })
            .collect();
        pickle(&Value::List(entries))
    }

    fn crew_info_pickle(&self) -> Vec<u8> {
        let mut top = BTreeMap::new();
        for (i, player) in self.players.iter().enumerate() {
            let mut crew = BTreeMap::new();
            crew.insert(HashableValue::String("crew_id".to_string()), Value::I64(player.crew_id));
            let mut by_class = BTreeMap::new();
            by_class.insert(
                HashableValue::String("Destroyer".to_string()),
                Value::List(vec![
                    Value::String("Maneuverability".to_string()),
                    Value::String("DetectionVisibilityRange".to_string()),
                ]),
            );
            by_class.insert(
                HashableValue::String("Cruiser".to_string()),
                Value::List(vec![Value::String("HeFireProbability".to_string())]),
            );
            crew.insert(
                HashableValue::String("learned_skills".to_string()),
                Value::Dict(by_class),
            );
            top.insert(HashableValue::I64(i as i64), Value::Dict(crew));
        }
        pickle(&Value::Dict(top))
    }

    fn battle_stats_pickle(&self) -> Value {
        let table = &TABLE_14_11;
        // Candidate slots (the positional team id) are populated the way
        // live payloads carry them.
        let slot = |field: StatsField| {
            table
                .spec_of(field)
                .or_else(|| table.candidate_of(field))
                .expect("field in table")
                .slot
        };

        let mut players = BTreeMap::new();
        for p in &self.players {
            let mut slots = vec![Value::None; table.min_len];
            slots[slot(StatsField::PlayerId)] = Value::I64(p.id);
            slots[slot(StatsField::PlayerName)] = Value::String(p.name.clone());
            slots[slot(StatsField::AccountDbId)] = Value::I64(2_000_000_000 + p.id);
            slots[slot(StatsField::ClanTag)] = Value::String(p.clan_tag.clone());
            slots[slot(StatsField::ClanId)] = Value::I64(77);
            slots[slot(StatsField::TeamId)] = Value::I64(p.team_id);
            slots[slot(StatsField::Realm)] = Value::String("ASIA".to_string());
            slots[slot(StatsField::SurvivalTime)] = Value::I64(1100);
            slots[slot(StatsField::SurvivalPercent)] = Value::F64(91.6);
            slots[slot(StatsField::Kills)] = Value::I64(p.kills);
            slots[slot(StatsField::HitsAp)] = Value::I64(40);
            slots[slot(StatsField::HitsHe)] = Value::I64(120);
            slots[slot(StatsField::HitsSecondaries)] = Value::I64(12);
            slots[slot(StatsField::Citadels)] = Value::I64(1);
            slots[slot(StatsField::Crits)] = Value::I64(3);
            slots[slot(StatsField::Fires)] = Value::I64(2);
            slots[slot(StatsField::Floods)] = Value::I64(1);
            // Component columns sum to the damage total.
            let ap = p.damage / 2;
            let he = p.damage / 4;
            let fire = p.damage - ap - he;
            slots[slot(StatsField::Damage)] = Value::I64(p.damage);
            slots[slot(StatsField::DamageAp)] = Value::I64(ap);
            slots[slot(StatsField::DamageHe)] = Value::I64(he);
            slots[slot(StatsField::DamageHeSecondaries)] = Value::I64(0);
            slots[slot(StatsField::DamageTorps)] = Value::I64(0);
            slots[slot(StatsField::DamageDeepWaterTorps)] = Value::I64(0);
            slots[slot(StatsField::DamageOther)] = Value::I64(0);
            slots[slot(StatsField::DamageFire)] = Value::I64(fire);
            slots[slot(StatsField::DamageFlooding)] = Value::I64(0);
            slots[slot(StatsField::ReceivedDamage)] = Value::I64(18_000);
            slots[slot(StatsField::BaseXp)] = Value::I64(p.base_xp);
            slots[slot(StatsField::SpottingDamage)] = Value::I64(9_000);
            slots[slot(StatsField::PotentialDamage)] = Value::F64(450_000.0);
            players.insert(HashableValue::I64(p.id), Value::List(slots));
        }

        let mut private_data = vec![Value::None; 7];
        private_data.push(Value::List(vec![Value::I64(self.raw_xp)]));

        let mut server_data = BTreeMap::new();
        server_data.insert(
            HashableValue::String("arenaUniqueID".to_string()),
            Value::I64(self.arena_id),
        );
        server_data.insert(
            HashableValue::String("playersPublicInfo".to_string()),
            Value::Dict(players),
        );
        server_data.insert(
            HashableValue::String("privateDataList".to_string()),
            Value::List(private_data),
        );
        Value::Dict(server_data)
    }
}

impl Default for ReplayBuilder {
    fn default() -> Self {
        ReplayBuilder::new()
    }
}

fn frame(stream: &mut Vec<u8>, kind: u32, clock: f32, payload: &[u8]) {
    stream.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    stream.extend_from_slice(&kind.to_le_bytes());
    stream.extend_from_slice(&clock.to_le_bytes());
    stream.extend_from_slice(payload);
}

fn frame_method(stream: &mut Vec<u8>, packet_kind: u32, method_id: u32, clock: f32, args: &[u8]) {
    let mut payload = Vec::new();
    payload.extend_from_slice(&42u32.to_le_bytes()); // avatar entity
    payload.extend_from_slice(&method_id.to_le_bytes());
    payload.extend_from_slice(args);
    frame(stream, packet_kind, clock, &payload);
}

fn pickle(value: &Value) -> Vec<u8> {
    serde_pickle::value_to_vec(value, SerOptions::new()).expect("pickle serializes")
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).expect("in-memory write");
    enc.finish().expect("in-memory finish")
}

/// Inverse of the replay cipher: pad to the block size, then for each
/// plaintext block emit `E(p_i XOR p_{i-1})`.
fn encrypt(data: &[u8]) -> Vec<u8> {
    let cipher: Blowfish = Blowfish::new_from_slice(&CIPHER_KEY).expect("fixed key length");

    let mut padded = data.to_vec();
    while padded.len() % 8 != 0 {
        padded.push(0);
    }

    let mut out = Vec::with_capacity(padded.len());
    let mut prev = [0u8; 8];
    let mut first = true;
    for chunk in padded.chunks_exact(8) {
        let mut block = [0u8; 8];
        block.copy_from_slice(chunk);
        let plain = block;
        if !first {
            for (b, p) in block.iter_mut().zip(prev.iter()) {
                *b ^= p;
            }
        }
        cipher.encrypt_block(GenericArray::from_mut_slice(&mut block));
        out.extend_from_slice(&block);
        prev = plain;
        first = false;
    }
    out
}
