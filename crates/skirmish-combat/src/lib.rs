//! # Skirmish Combat
//!
//! Deterministic, tick-driven combat core for an action RPG.
//!
//! This crate provides every combat subsystem and a façade that wires them:
//! - Health, death, combat timeout and wipe detection
//! - Threat tables and hostile target selection
//! - Cast state machine and spell queue
//! - Ability effects, target selection and queued ability firing
//! - Diminishing returns on crowd control
//! - Interrupt lockouts
//! - Stealth
//! - Damage formulas
//! - Event bus for host notifications
//!
//! Nothing here reads a wall clock. Hosts drive time through `tick(dt)`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod arena;
pub mod cast;
pub mod config;
pub mod damage_calc;
pub mod diminishing;
pub mod error;
pub mod events;
pub mod health;
pub mod interrupt;
pub mod spell_queue;
pub mod stealth;
pub mod threat;
pub mod world;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::arena::*;
    pub use crate::cast::*;
    pub use crate::config::*;
    pub use crate::damage_calc::*;
    pub use crate::diminishing::*;
    pub use crate::error::*;
    pub use crate::events::*;
    pub use crate::health::*;
    pub use crate::interrupt::*;
    pub use crate::spell_queue::*;
    pub use crate::stealth::*;
    pub use crate::threat::*;
    pub use crate::world::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_common::{AbilityId, EntityId};

    #[test]
    fn test_encounter_through_prelude() {
        let tank = EntityId::from_raw(1);
        let boss = EntityId::from_raw(2);

        let mut world = CombatWorld::default();
        world.register_player(tank, 500.0).expect("tank");
        world.register_hostile(boss, 2000.0).expect("boss");

        assert!(world.use_ability(tank, &AbilitySpec::instant(AbilityId::new(1))));
        world.apply_damage(boss, 150.0, DamageType::Physical, Some(tank));
        world.tick(1.0 / 60.0);

        assert_eq!(world.current_target(boss), Some(tank));
        assert_eq!(world.cast_state(tank), Some(CastState::GlobalCooldown));
        assert!(!world.drain_events().is_empty());
    }
}
