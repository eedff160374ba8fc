//! Ship fitting decoding.
//!
//! `shipConfigDump` is an opaque little-endian blob describing the hull
//! fit. The walk below extracts the modernization (upgrade) ids and signal
//! flags; upgrade ids map to PCM catalogue codes which in turn map to the
//! display names shown on scoreboards.
//!
//! Blob layout (all u32):
//!
//! ```text
//! unknown | ship_params_id | unknown
//! unit_count | unit_count ids
//! applied_external_config
//! modernization_count | modernization_count ids
//! signal_count | signal_count ids
//! ```

use crate::IResult;
use nom::multi::length_count;
use nom::number::complete::le_u32;

/// Decoded fitting blob.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShipConfig {
    pub ship_params_id: u32,
    pub units: Vec<u32>,
    pub modernization: Vec<u32>,
    pub signals: Vec<u32>,
}

/// Walk the fitting blob. Malformed or short dumps yield an empty config;
/// a fitting is cosmetic relative to the battle record, never fatal.
pub fn decode_ship_config_dump(dump: &[u8]) -> ShipConfig {
    fn inner(i: &[u8]) -> IResult<'_, ShipConfig> {
        let (i, _unknown1) = le_u32(i)?;
        let (i, ship_params_id) = le_u32(i)?;
        let (i, _unknown2) = le_u32(i)?;
        let (i, units) = length_count(le_u32, le_u32)(i)?;
        let (i, _applied_external) = le_u32(i)?;
        let (i, modernization) = length_count(le_u32, le_u32)(i)?;
        let (i, signals) = length_count(le_u32, le_u32)(i)?;
        Ok((
            i,
            ShipConfig {
                ship_params_id,
                units,
                modernization,
                signals,
            },
        ))
    }

    match inner(dump) {
        Ok((_, config)) => config,
        Err(_) => ShipConfig::default(),
    }
}

/// Modernization id -> PCM catalogue code. Game-data derived; ids are
/// stable across client versions even when slot placement changes.
static MODERNIZATION_PCM: &[(u32, &str)] = &[
    (4247494576, "PCM001"),
    (4246445968, "PCM002"),
    (4245397360, "PCM004"),
    (4244348752, "PCM006"),
    (4243300144, "PCM008"),
    (4242251536, "PCM012"),
    (4241202928, "PCM013"),
    (4240154320, "PCM014"),
    (4239105712, "PCM015"),
    (4238057104, "PCM018"),
    (4237008496, "PCM020"),
    (4235959888, "PCM021"),
    (4234911280, "PCM022"),
    (4233862672, "PCM023"),
    (4232814064, "PCM024"),
    (4231765456, "PCM025"),
    (4230716848, "PCM026"),
    (4229668240, "PCM027"),
    (4228619632, "PCM033"),
    (4227571024, "PCM035"),
    (4226522416, "PCM042"),
    (4225473808, "PCM072"),
];

/// PCM code -> English display name.
static PCM_DISPLAY_NAMES: &[(&str, &str)] = &[
    ("PCM001", "Main Armaments Mod 1"),
    ("PCM002", "Auxiliary Armaments Mod 1"),
    ("PCM004", "AA Guns Mod 1"),
    ("PCM006", "Main Battery Mod 2"),
    ("PCM008", "Gun Fire Control System Mod 1"),
    ("PCM012", "Secondary Battery Mod 2"),
    ("PCM013", "Main Battery Mod 3"),
    ("PCM014", "Torpedo Tubes Mod 2"),
    ("PCM015", "Gun Fire Control System Mod 2"),
    ("PCM018", "AA Guns Mod 2"),
    ("PCM020", "Damage Control System Mod 1"),
    ("PCM021", "Propulsion Mod 1"),
    ("PCM022", "Steering Gears Mod 1"),
    ("PCM023", "Damage Control System Mod 2"),
    ("PCM024", "Propulsion Mod 2"),
    ("PCM025", "Steering Gears Mod 2"),
    ("PCM026", "Torpedo Lookout System"),
    ("PCM027", "Concealment System Mod 1"),
    ("PCM033", "Aiming Systems Mod 1"),
    ("PCM035", "Steering Gears Mod 3"),
    ("PCM042", "Surveillance Radar Mod 1"),
    ("PCM072", "Ship Consumables Mod 1"),
];

pub fn pcm_code(modernization_id: u32) -> Option<&'static str> {
    MODERNIZATION_PCM
        .iter()
        .find(|(id, _)| *id == modernization_id)
        .map(|(_, code)| *code)
}

/// Display name for a modernization id; unknown ids fall back to the PCM
/// code, unknown codes to nothing.
pub fn upgrade_name(modernization_id: u32) -> Option<&'static str> {
    let code = pcm_code(modernization_id)?;
    Some(
        PCM_DISPLAY_NAMES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, name)| *name)
            .unwrap_or(code),
    )
}

/// Full name resolution for a fitting dump, silently dropping unknown ids.
pub fn upgrade_names(dump: &[u8]) -> Vec<String> {
    decode_ship_config_dump(dump)
        .modernization
        .iter()
        .filter_map(|id| upgrade_name(*id))
        .map(str::to_string)
        .collect()
}

/// Inverse of the walk above; backs the synthetic replay builder.
#[doc(hidden)]
pub fn encode_ship_config_dump(config: &ShipConfig) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&config.ship_params_id.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(config.units.len() as u32).to_le_bytes());
    for unit in &config.units {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(config.modernization.len() as u32).to_le_bytes());
    for id in &config.modernization {
        out.extend_from_slice(&id.to_le_bytes());
    }
    out.extend_from_slice(&(config.signals.len() as u32).to_le_bytes());
    for id in &config.signals {
        out.extend_from_slice(&id.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_dump_round_trip() {
        let config = ShipConfig {
            ship_params_id: 4_287_510_224,
            units: vec![11, 22, 33],
            modernization: vec![4247494576, 4229668240],
            signals: vec![900, 901],
        };
        let dump = encode_ship_config_dump(&config);
        assert_eq!(decode_ship_config_dump(&dump), config);
    }

    #[test]
    fn short_dump_is_not_fatal() {
        assert_eq!(decode_ship_config_dump(&[1, 2, 3]), ShipConfig::default());
        assert_eq!(decode_ship_config_dump(&[]), ShipConfig::default());
    }

    #[test]
    fn upgrade_names_resolve_and_drop_unknowns() {
        let config = ShipConfig {
            modernization: vec![4247494576, 4229668240, 12345],
            ..Default::default()
        };
        let names = upgrade_names(&encode_ship_config_dump(&config));
        assert_eq!(
            names,
            vec!["Main Armaments Mod 1", "Concealment System Mod 1"]
        );
    }
}
