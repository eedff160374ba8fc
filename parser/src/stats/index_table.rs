//! Positional layout of the `playersPublicInfo` stat arrays.
//!
//! The server serializes each player's battle record as a flat array of
//! ~430+ slots; the meaning of each slot shifts between client versions.
//! Each supported version owns a reviewed table mapping a field identifier
//! to its slot index and decoder. Slots known to carry non-authoritative
//! duplicates of a field are listed separately with the canonical slot
//! staying in the main table.

use serde::Serialize;

/// Named fields extracted from a player's positional stat array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StatsField {
    PlayerId,
    PlayerName,
    AccountDbId,
    ClanTag,
    ClanId,
    TeamId,
    Realm,
    SurvivalTime,
    SurvivalPercent,
    Kills,
    HitsAp,
    HitsHe,
    Citadels,
    HitsSecondaries,
    Crits,
    Floods,
    Fires,
    DamageAp,
    DamageHe,
    DamageHeSecondaries,
    DamageTorps,
    DamageDeepWaterTorps,
    DamageOther,
    DamageFire,
    DamageFlooding,
    ReceivedDamage,
    BaseXp,
    SpottingDamage,
    PotentialDamage,
    Damage,
}

/// How a slot's raw value becomes a typed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotDecoder {
    AsInt,
    /// Stored as a float by the server, persisted as an integer.
    FloatAsInt,
    AsString,
    /// String with an empty-string fallback for clanless players.
    ClanTag,
}

#[derive(Debug, Clone, Copy)]
pub struct SlotSpec {
    pub field: StatsField,
    pub slot: usize,
    pub decoder: SlotDecoder,
}

const fn spec(field: StatsField, slot: usize, decoder: SlotDecoder) -> SlotSpec {
    SlotSpec {
        field,
        slot,
        decoder,
    }
}

#[derive(Debug)]
pub struct IndexTable {
    pub version_label: &'static str,
    /// Arrays shorter than this are rejected for the player in question.
    pub min_len: usize,
    pub entries: &'static [SlotSpec],
    /// Slots observed in live payloads but never confirmed against a
    /// known-good export. Read only as a last resort when the
    /// authoritative source for the field is unavailable.
    pub candidates: &'static [SlotSpec],
    /// Known duplicate slots; never read, recorded so a future version bump
    /// revalidates them against a known-good export.
    pub duplicates: &'static [(StatsField, usize)],
}

impl IndexTable {
    pub fn spec_of(&self, field: StatsField) -> Option<&SlotSpec> {
        self.entries.iter().find(|e| e.field == field)
    }

    pub fn candidate_of(&self, field: StatsField) -> Option<&SlotSpec> {
        self.candidates.iter().find(|e| e.field == field)
    }
}

use SlotDecoder::{AsInt, AsString, ClanTag, FloatAsInt};
use StatsField::*;

/// 14.11.0 layout. Every canonical slot matches the original export; the
/// positional team id has no export confirmation and stays a candidate.
pub static TABLE_14_11: IndexTable = IndexTable {
    version_label: "14.11.0",
    min_len: 430,
    entries: &[
        spec(PlayerId, 0, AsInt),
        spec(PlayerName, 1, AsString),
        spec(AccountDbId, 2, AsInt),
        spec(StatsField::ClanTag, 3, ClanTag),
        spec(ClanId, 4, AsInt),
        spec(Realm, 9, AsString),
        spec(SurvivalTime, 22, AsInt),
        spec(SurvivalPercent, 23, FloatAsInt),
        spec(Kills, 32, AsInt),
        spec(HitsAp, 66, AsInt),
        spec(HitsHe, 68, AsInt),
        spec(Citadels, 70, AsInt),
        spec(HitsSecondaries, 71, AsInt),
        spec(Crits, 72, AsInt),
        spec(Floods, 75, AsInt),
        spec(Fires, 86, AsInt),
        spec(DamageAp, 157, AsInt),
        spec(DamageHe, 159, AsInt),
        spec(DamageHeSecondaries, 162, AsInt),
        spec(DamageTorps, 166, AsInt),
        spec(DamageDeepWaterTorps, 167, AsInt),
        spec(DamageOther, 178, AsInt),
        spec(DamageFire, 179, AsInt),
        spec(DamageFlooding, 180, AsInt),
        spec(ReceivedDamage, 204, AsInt),
        spec(BaseXp, 406, AsInt),
        spec(SpottingDamage, 415, AsInt),
        spec(PotentialDamage, 419, FloatAsInt),
        spec(Damage, 429, AsInt),
    ],
    candidates: &[
        // Observed as a 0/1 flag near the head of the row; no export
        // confirms the exact index. Team assignment resolves through the
        // arena state instead.
        spec(TeamId, 5, AsInt),
    ],
    duplicates: &[
        // Fires mirrors at 85; 86 is authoritative.
        (Fires, 85),
        // HitsHe repeats the legacy combined-hits slot.
        (HitsHe, 64),
    ],
};

/// 14.9/14.10 layout. Two ribbon slots (citadels, crits) do not exist yet;
/// everything after slot 68 sits two positions lower.
pub static TABLE_14_9: IndexTable = IndexTable {
    version_label: "14.9.0",
    min_len: 428,
    entries: &[
        spec(PlayerId, 0, AsInt),
        spec(PlayerName, 1, AsString),
        spec(AccountDbId, 2, AsInt),
        spec(StatsField::ClanTag, 3, ClanTag),
        spec(ClanId, 4, AsInt),
        spec(Realm, 9, AsString),
        spec(SurvivalTime, 22, AsInt),
        spec(SurvivalPercent, 23, FloatAsInt),
        spec(Kills, 32, AsInt),
        spec(HitsAp, 66, AsInt),
        spec(HitsHe, 68, AsInt),
        spec(HitsSecondaries, 69, AsInt),
        spec(Floods, 73, AsInt),
        spec(Fires, 84, AsInt),
        spec(DamageAp, 155, AsInt),
        spec(DamageHe, 157, AsInt),
        spec(DamageHeSecondaries, 160, AsInt),
        spec(DamageTorps, 164, AsInt),
        spec(DamageDeepWaterTorps, 165, AsInt),
        spec(DamageOther, 176, AsInt),
        spec(DamageFire, 177, AsInt),
        spec(DamageFlooding, 178, AsInt),
        spec(ReceivedDamage, 202, AsInt),
        spec(BaseXp, 404, AsInt),
        spec(SpottingDamage, 413, AsInt),
        spec(PotentialDamage, 417, FloatAsInt),
        spec(Damage, 427, AsInt),
    ],
    candidates: &[spec(TeamId, 5, AsInt)],
    duplicates: &[(Fires, 83)],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_slots_never_collide_with_duplicates() {
        for table in [&TABLE_14_11, &TABLE_14_9] {
            for (field, dup_slot) in table.duplicates {
                let canonical = table.spec_of(*field).unwrap();
                assert_ne!(canonical.slot, *dup_slot, "{field:?} in {}", table.version_label);
            }
        }
    }

    #[test]
    fn every_slot_fits_min_len() {
        for table in [&TABLE_14_11, &TABLE_14_9] {
            for entry in table.entries.iter().chain(table.candidates) {
                assert!(entry.slot < table.min_len);
            }
        }
    }

    #[test]
    fn slots_are_unique_within_a_table() {
        for table in [&TABLE_14_11, &TABLE_14_9] {
            let mut slots: Vec<usize> = table.entries.iter().map(|e| e.slot).collect();
            slots.sort_unstable();
            slots.dedup();
            assert_eq!(slots.len(), table.entries.len(), "{}", table.version_label);
        }
    }

    #[test]
    fn candidates_stay_out_of_the_canonical_table() {
        for table in [&TABLE_14_11, &TABLE_14_9] {
            for candidate in table.candidates {
                assert!(
                    table.spec_of(candidate.field).is_none(),
                    "{:?} is both canonical and candidate in {}",
                    candidate.field,
                    table.version_label
                );
                assert!(
                    table.entries.iter().all(|e| e.slot != candidate.slot),
                    "candidate slot {} shadows a canonical slot in {}",
                    candidate.slot,
                    table.version_label
                );
            }
        }
    }
}
