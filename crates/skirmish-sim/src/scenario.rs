//! Scripted encounters.
//!
//! A scenario lists the combatants, the abilities they can use and a
//! timeline of actions. Scenarios are stored as RON:
//!
//! ```ron
//! (
//!     name: "Training dummy",
//!     duration: 5.0,
//!     entities: [
//!         (id: 1, name: "Tank", kind: Player, max_health: 1000.0),
//!         (id: 100, name: "Dummy", kind: Hostile, max_health: 5000.0),
//!     ],
//!     abilities: [(id: 1, name: "Strike")],
//!     actions: [
//!         (at: 0.0, action: Damage(source: Some(1), target: 100, amount: 50.0)),
//!     ],
//! )
//! ```

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use skirmish_combat::{
    AbilityEffect, AbilitySpec, CharacterStats, CrowdControl, DamageType, EntityKind,
};
use skirmish_common::{AbilityId, EntityId};

/// One combatant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Host id.
    pub id: u64,
    /// Display name used in logs.
    pub name: String,
    /// Player or hostile.
    pub kind: EntityKind,
    /// Starting and maximum health.
    pub max_health: f32,
    /// Combat stats; zeroed when omitted.
    #[serde(default)]
    pub stats: CharacterStats,
}

/// Ability content referenced by cast and queue actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityDef {
    /// Ability id.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Cast time in seconds, 0 for instant.
    #[serde(default)]
    pub cast_time: f32,
    /// Usable during the global cooldown.
    #[serde(default)]
    pub off_gcd: bool,
    /// Casting requires standing still.
    #[serde(default)]
    pub stationary: bool,
    /// Only usable from stealth.
    #[serde(default)]
    pub from_stealth: bool,
    /// Damage or healing applied when the ability lands.
    #[serde(default)]
    pub effect: AbilityEffect,
    /// Damage counts as ranged threat.
    #[serde(default)]
    pub ranged: bool,
}

impl AbilityDef {
    /// Ability content handed to the combat world.
    pub fn spec(&self) -> AbilitySpec {
        let mut spec = if self.cast_time > 0.0 {
            AbilitySpec::cast(AbilityId::new(self.id), self.cast_time)
        } else {
            AbilitySpec::instant(AbilityId::new(self.id))
        };
        spec.requires_stationary = self.stationary;
        if self.off_gcd {
            spec = spec.off_gcd();
        }
        if self.from_stealth {
            spec = spec.from_stealth();
        }
        if self.ranged {
            spec = spec.ranged();
        }
        spec.effect = self.effect;
        spec
    }
}

/// Something that happens at a point on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Deals damage.
    Damage {
        /// Attacker, `None` for the environment.
        #[serde(default)]
        source: Option<u64>,
        /// Victim.
        target: u64,
        /// Amount.
        amount: f32,
        /// Damage school.
        #[serde(default)]
        school: DamageType,
        /// Threat is recorded as ranged.
        #[serde(default)]
        ranged: bool,
    },
    /// Heals.
    Heal {
        /// Healer, `None` for the environment.
        #[serde(default)]
        source: Option<u64>,
        /// Patient.
        target: u64,
        /// Amount.
        amount: f32,
    },
    /// Uses an ability.
    Cast {
        /// Caster.
        actor: u64,
        /// Ability id from the scenario's ability list.
        ability: u32,
    },
    /// Buffers an ability press.
    Queue {
        /// Caster.
        actor: u64,
        /// Ability id.
        ability: u32,
        /// Action bar slot.
        #[serde(default)]
        slot: u8,
    },
    /// Selects the target abilities land on.
    Target {
        /// Entity selecting.
        actor: u64,
        /// New target, `None` to clear.
        #[serde(default)]
        target: Option<u64>,
    },
    /// Reports movement.
    Move {
        /// Entity that moved.
        actor: u64,
    },
    /// Applies crowd control.
    CrowdControl {
        /// Victim.
        target: u64,
        /// Category.
        category: CrowdControl,
        /// Base duration before diminishing returns.
        duration: f32,
    },
    /// Interrupts a cast.
    Interrupt {
        /// Interrupter.
        source: u64,
        /// Interrupted entity.
        target: u64,
    },
    /// Taunts a hostile.
    Taunt {
        /// Taunter.
        source: u64,
        /// Hostile.
        target: u64,
    },
    /// Enters stealth.
    Stealth {
        /// Entity.
        entity: u64,
    },
    /// Kills outright.
    Kill {
        /// Victim.
        target: u64,
    },
    /// Resurrects at a fraction of max health.
    Resurrect {
        /// Dead entity.
        target: u64,
        /// Health fraction.
        fraction: f32,
    },
    /// Respawns a dead player.
    ReleaseSpirit {
        /// Dead player.
        target: u64,
    },
}

/// An action scheduled at `at` seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedAction {
    /// Scenario time in seconds.
    pub at: f32,
    /// What happens.
    pub action: Action,
}

/// A complete encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Display name.
    pub name: String,
    /// Seconds to simulate.
    pub duration: f32,
    /// Combatants.
    pub entities: Vec<EntityDef>,
    /// Ability content.
    #[serde(default)]
    pub abilities: Vec<AbilityDef>,
    /// Timeline.
    pub actions: Vec<TimedAction>,
}

impl Scenario {
    /// Parses and validates a RON scenario.
    pub fn from_ron_str(contents: &str) -> Result<Self> {
        let scenario: Self = ron::from_str(contents).context("invalid scenario RON")?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Loads a RON scenario file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_ron_str(&contents).with_context(|| format!("in {}", path.display()))
    }

    /// Rejects scenarios that reference unknown entities or abilities.
    pub fn validate(&self) -> Result<()> {
        if !self.duration.is_finite() || self.duration <= 0.0 {
            bail!("scenario duration must be > 0, got {}", self.duration);
        }
        for (i, entity) in self.entities.iter().enumerate() {
            if self.entities[..i].iter().any(|e| e.id == entity.id) {
                bail!("duplicate entity id {}", entity.id);
            }
        }
        for timed in &self.actions {
            if !timed.at.is_finite() || timed.at < 0.0 {
                bail!("action time must be >= 0, got {}", timed.at);
            }
            for id in timed.action.entities() {
                if self.entity(id).is_none() {
                    bail!("action at {}s references unknown entity {id}", timed.at);
                }
            }
            if let Some(ability) = timed.action.ability() {
                if self.ability(ability).is_none() {
                    bail!("action at {}s references unknown ability {ability}", timed.at);
                }
            }
        }
        Ok(())
    }

    /// Looks up a combatant by host id.
    pub fn entity(&self, id: u64) -> Option<&EntityDef> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Looks up ability content by id.
    pub fn ability(&self, id: u32) -> Option<&AbilityDef> {
        self.abilities.iter().find(|a| a.id == id)
    }

    /// Display name for an entity.
    pub fn name_of(&self, id: EntityId) -> &str {
        self.entity(id.raw()).map_or("?", |e| e.name.as_str())
    }

    /// Actions ordered by time; simultaneous actions keep file order.
    pub fn timeline(&self) -> Vec<TimedAction> {
        let mut actions = self.actions.clone();
        actions.sort_by(|a, b| a.at.total_cmp(&b.at));
        actions
    }

    /// Tank, mage and priest against a single boss.
    pub fn builtin() -> Self {
        const TANK: u64 = 1;
        const MAGE: u64 = 2;
        const PRIEST: u64 = 3;
        const BOSS: u64 = 100;

        let entity = |id, name: &str, kind, max_health| EntityDef {
            id,
            name: name.to_string(),
            kind,
            max_health,
            stats: CharacterStats::default(),
        };
        let ability = |id, name: &str, cast_time| AbilityDef {
            id,
            name: name.to_string(),
            cast_time,
            off_gcd: false,
            stationary: cast_time > 0.0,
            from_stealth: false,
            effect: AbilityEffect::None,
            ranged: false,
        };
        let at = |at, action| TimedAction { at, action };
        let hit = |source, target, amount, school, ranged| Action::Damage {
            source: Some(source),
            target,
            amount,
            school,
            ranged,
        };

        Self {
            name: "Builtin encounter".to_string(),
            duration: 14.0,
            entities: vec![
                entity(TANK, "Tank", EntityKind::Player, 1200.0),
                entity(MAGE, "Mage", EntityKind::Player, 700.0),
                entity(PRIEST, "Priest", EntityKind::Player, 800.0),
                entity(BOSS, "Boss", EntityKind::Hostile, 6000.0),
            ],
            abilities: vec![
                ability(1, "Shield Slam", 0.0),
                ability(2, "Frostbolt", 2.0),
                ability(3, "Flash Heal", 1.5),
                AbilityDef {
                    off_gcd: true,
                    ..ability(4, "Pummel", 0.0)
                },
                AbilityDef {
                    from_stealth: true,
                    ..ability(5, "Ambush", 0.0)
                },
            ],
            actions: vec![
                at(0.0, Action::Cast { actor: TANK, ability: 1 }),
                at(0.0, hit(TANK, BOSS, 200.0, DamageType::Physical, false)),
                at(0.5, Action::Cast { actor: MAGE, ability: 2 }),
                at(2.5, hit(MAGE, BOSS, 180.0, DamageType::Frost, true)),
                at(3.0, hit(BOSS, TANK, 250.0, DamageType::Physical, false)),
                at(3.0, Action::Cast { actor: PRIEST, ability: 3 }),
                at(
                    4.5,
                    Action::Heal {
                        source: Some(PRIEST),
                        target: TANK,
                        amount: 300.0,
                    },
                ),
                at(
                    5.0,
                    Action::CrowdControl {
                        target: BOSS,
                        category: CrowdControl::Stun,
                        duration: 3.0,
                    },
                ),
                at(6.0, Action::Taunt { source: TANK, target: BOSS }),
                at(6.5, hit(TANK, BOSS, 100.0, DamageType::Physical, false)),
                at(7.0, Action::Stealth { entity: MAGE }),
                at(8.0, Action::Cast { actor: MAGE, ability: 5 }),
                at(8.0, hit(MAGE, BOSS, 400.0, DamageType::Shadow, false)),
                at(9.0, Action::Interrupt { source: TANK, target: BOSS }),
                at(10.0, hit(BOSS, MAGE, 800.0, DamageType::Fire, false)),
                at(12.0, Action::Resurrect { target: MAGE, fraction: 0.5 }),
                at(12.0, Action::Cast { actor: TANK, ability: 1 }),
                at(
                    13.2,
                    Action::Queue {
                        actor: TANK,
                        ability: 1,
                        slot: 1,
                    },
                ),
            ],
        }
    }
}

impl Action {
    /// Host ids this action touches.
    pub fn entities(&self) -> Vec<u64> {
        match *self {
            Self::Damage { source, target, .. } | Self::Heal { source, target, .. } => {
                source.into_iter().chain([target]).collect()
            },
            Self::Interrupt { source, target } | Self::Taunt { source, target } => {
                vec![source, target]
            },
            Self::Cast { actor, .. } | Self::Queue { actor, .. } | Self::Move { actor } => {
                vec![actor]
            },
            Self::Target { actor, target } => [actor].into_iter().chain(target).collect(),
            Self::CrowdControl { target, .. }
            | Self::Kill { target }
            | Self::Resurrect { target, .. }
            | Self::ReleaseSpirit { target } => vec![target],
            Self::Stealth { entity } => vec![entity],
        }
    }

    /// Ability this action references, if any.
    pub fn ability(&self) -> Option<u32> {
        match *self {
            Self::Cast { ability, .. } | Self::Queue { ability, .. } => Some(ability),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAID: &str = include_str!("../scenarios/raid.ron");

    #[test]
    fn test_builtin_is_valid() {
        let scenario = Scenario::builtin();
        assert!(scenario.validate().is_ok());
        assert_eq!(scenario.entities.len(), 4);
        assert_eq!(scenario.name_of(EntityId::from_raw(100)), "Boss");
    }

    #[test]
    fn test_bundled_scenario_parses() {
        let scenario = Scenario::from_ron_str(RAID).expect("raid.ron");
        assert!(!scenario.actions.is_empty());
        assert!(scenario.ability(2).is_some_and(|a| a.cast_time > 0.0));
    }

    #[test]
    fn test_minimal_ron_with_defaults() {
        let scenario = Scenario::from_ron_str(
            r#"(
                name: "Dummy",
                duration: 5.0,
                entities: [
                    (id: 1, name: "Tank", kind: Player, max_health: 1000.0),
                    (id: 100, name: "Dummy", kind: Hostile, max_health: 5000.0),
                ],
                actions: [
                    (at: 0.0, action: Damage(source: Some(1), target: 100, amount: 50.0)),
                    (at: 1.0, action: Kill(target: 100)),
                ],
            )"#,
        )
        .expect("parse");

        assert!(scenario.abilities.is_empty());
        assert_eq!(scenario.entities[0].stats, CharacterStats::default());
        assert_eq!(
            scenario.actions[0].action,
            Action::Damage {
                source: Some(1),
                target: 100,
                amount: 50.0,
                school: DamageType::Physical,
                ranged: false,
            }
        );
    }

    #[test]
    fn test_unknown_references_rejected() {
        let mut scenario = Scenario::builtin();
        scenario.actions.push(TimedAction {
            at: 1.0,
            action: Action::Kill { target: 999 },
        });
        assert!(scenario.validate().is_err());

        let mut scenario = Scenario::builtin();
        scenario.actions.push(TimedAction {
            at: 1.0,
            action: Action::Cast { actor: 1, ability: 42 },
        });
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn test_timeline_is_stable() {
        let mut scenario = Scenario::builtin();
        scenario.actions.reverse();
        let timeline = scenario.timeline();
        assert!(timeline.windows(2).all(|w| w[0].at <= w[1].at));
    }

    #[test]
    fn test_ability_spec_conversion() {
        let scenario = Scenario::builtin();
        let pummel = scenario.ability(4).expect("pummel").spec();
        assert!(pummel.off_gcd && !pummel.triggers_gcd);
        let frostbolt = scenario.ability(2).expect("frostbolt").spec();
        assert!(frostbolt.requires_stationary);
        assert_eq!(frostbolt.cast_time, 2.0);
        assert_eq!(frostbolt.effect, AbilityEffect::None);
    }

    #[test]
    fn test_ability_effects_parse() {
        let scenario = Scenario::from_ron_str(RAID).expect("raid.ron");
        let fireball = scenario.ability(2).expect("fireball").spec();
        assert_eq!(
            fireball.effect,
            AbilityEffect::Damage {
                base: 250.0,
                school: DamageType::Fire
            }
        );
        assert!(fireball.ranged);

        let sorcerer = scenario.entity(2).expect("sorcerer");
        assert_eq!(sorcerer.stats.spell_power, 40);
        assert_eq!(sorcerer.stats.armor, 0);
    }
}
