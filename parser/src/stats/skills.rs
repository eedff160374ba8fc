//! Captain skill naming.
//!
//! The crew sheet stores internal skill identifiers grouped by ship class.
//! A captain carries separate skill sets for every class he can command, so
//! resolution must go through the hull class the player actually sailed;
//! picking the first populated class yields a plausible but wrong build.

use crate::hidden::CrewInfo;
use crate::types::ShipClass;

/// Internal identifier -> display name, 14.x vocabulary.
static SKILL_DISPLAY_NAMES: &[(&str, &str)] = &[
    ("AaDamageConstantBubbles", "AA Defense and ASW Expert"),
    ("AaPrioritysectorDamageConstant", "Focus Fire Training"),
    ("ApDamageBb", "Close Quarters Combat"),
    ("ApDamageCa", "Heavy AP Shells"),
    ("ApDamageDd", "Main Battery and AA Expert"),
    ("ArmamentReloadAaDamage", "Adrenaline Rush"),
    ("AtbaAccuracy", "Long-Range Secondary Battery Shells"),
    ("AtbaRange", "Manual Secondary Battery Aiming"),
    ("ConsumablesAdditional", "Superintendent"),
    ("ConsumablesCrashcrewRegencrewReload", "Emergency Repair Specialist"),
    ("ConsumablesCrashcrewRegencrewUpgrade", "Improved Repair Party Readiness"),
    ("ConsumablesDuration", "Consumable Enhancements"),
    ("ConsumablesReload", "Improved Engine Boost"),
    ("DefenceCritFireFlooding", "Basics of Survivability"),
    ("DefenceFireProbability", "Fire Prevention Expert"),
    ("DefenceUw", "Emergency Repair Expert"),
    ("DefenseCritProbability", "Preventive Maintenance"),
    ("DefenseHp", "Survivability Expert"),
    ("DetectionAiming", "Incoming Fire Alert"),
    ("DetectionAlert", "Priority Target"),
    ("DetectionDirection", "Radio Location"),
    ("DetectionTorpedoRange", "Vigilance"),
    ("DetectionVisibilityRange", "Concealment Expert"),
    ("GmReloadAaDamageConstant", "Gun Feeder"),
    ("GmRangeAaDamageBubbles", "Main Battery and AA Specialist"),
    ("GmShellReload", "Expert Loader"),
    ("GmTurn", "Grease the Gears"),
    ("HeFireProbability", "Demolition Expert"),
    ("HePenetration", "Inertia Fuse for HE Shells"),
    ("HeSapDamage", "Super-Heavy AP Shells"),
    ("Maneuverability", "Last Stand"),
    ("PlanesAimingBoost", "Aiming Facility Maintenance"),
    ("PlanesDefenseDamageConstant", "Air Supremacy"),
    ("PlanesForsageDuration", "Engine Tuning"),
    ("PlanesHp", "Survivability Expert"),
    ("PlanesReload", "Improved Engine Boost"),
    ("PlanesSpeed", "Swift Fish"),
    ("SubmarineBatteryCapacity", "Enhanced Battery Capacity"),
    ("SubmarineDangerAlert", "Enhanced Impulse Generator"),
    ("SubmarineHoldSectors", "Sonar Operator"),
    ("SubmarineSpeed", "Improved Battery Efficiency"),
    ("SubmarineTorpedoPingDamage", "Homing Torpedo Expert"),
    ("TorpedoDamage", "Torpedo Armament Expertise"),
    ("TorpedoFloodingProbability", "Liquidator"),
    ("TorpedoReload", "Fill the Tubes"),
    ("TorpedoSpeed", "Swift Fish"),
    ("TriggerBurnGmReload", "Furious"),
    ("TriggerGmAtbaReloadBb", "Close Quarters Expert"),
    ("TriggerGmAtbaReloadCa", "Top Grade Gunner"),
    ("TriggerGmReload", "Fearless Brawler"),
    ("TriggerSeenTorpedoReload", "Torpedo Crew Training"),
    ("TriggerSpeed", "Swift Fish"),
    ("TriggerSpeedBb", "Emergency Engine Power"),
    ("TriggerSpreading", "Consumable Specialist"),
];

/// Display name for an internal skill identifier. Unknown identifiers pass
/// through unchanged so a new client skill still shows up readably.
pub fn display_name(internal: &str) -> &str {
    SKILL_DISPLAY_NAMES
        .iter()
        .find(|(key, _)| *key == internal)
        .map(|(_, name)| *name)
        .unwrap_or(internal)
}

/// Resolve a captain's skills for the hull class actually sailed.
///
/// Returns `None` when the sheet has no entry for that class, which callers
/// treat as "skills unavailable", never as license to try another class.
pub fn resolve_for_class(crew: &CrewInfo, class: ShipClass) -> Option<Vec<String>> {
    crew.learned_skills
        .get(&class.to_string())
        .map(|skills| skills.iter().map(|s| display_name(s).to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn crew_with(classes: &[(&str, &[&str])]) -> CrewInfo {
        let mut learned = BTreeMap::new();
        for (class, skills) in classes {
            learned.insert(
                class.to_string(),
                skills.iter().map(|s| s.to_string()).collect(),
            );
        }
        CrewInfo {
            crew_id: 1,
            learned_skills: learned,
        }
    }

    #[test]
    fn resolves_by_actual_class_only() {
        // The destroyer sheet is listed first, but the player sailed a
        // cruiser; the cruiser list must win.
        let crew = crew_with(&[
            ("Destroyer", &["Maneuverability", "DetectionVisibilityRange"]),
            ("Cruiser", &["HeFireProbability"]),
        ]);

        let skills = resolve_for_class(&crew, ShipClass::Cruiser).unwrap();
        assert_eq!(skills, vec!["Demolition Expert"]);

        assert!(resolve_for_class(&crew, ShipClass::Battleship).is_none());
    }

    #[test]
    fn unknown_internal_names_pass_through() {
        assert_eq!(display_name("BrandNewSkill2027"), "BrandNewSkill2027");
        assert_eq!(display_name("Maneuverability"), "Last Stand");
    }
}
