//! Stealth state tracking.
//!
//! The tracker only stores state. Damage received and attacks performed are
//! reported to it by the health manager and the ability layer; it does not
//! observe combat on its own.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use skirmish_common::EntityId;
use tracing::debug;

use crate::events::{CombatEvent, EventSender};

/// Why stealth ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StealthBreakReason {
    /// Entity attacked something
    Attack,
    /// Entity took damage
    DamageReceived,
    /// Entity used an ability that breaks stealth
    AbilityUsed,
    /// Entity left stealth on purpose
    Manual,
}

/// Stealth tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StealthConfig {
    /// Movement speed multiplier while stealthed.
    pub movement_speed_multiplier: f32,
    /// Seconds before stealth can be re-entered after it breaks.
    pub reentry_cooldown: f32,
}

impl Default for StealthConfig {
    fn default() -> Self {
        Self {
            movement_speed_multiplier: 0.7,
            reentry_cooldown: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct StealthRecord {
    stealthed: bool,
    /// Timestamp when re-entry becomes possible.
    cooldown_until: f64,
}

/// Tracks who is stealthed and who is waiting to re-enter.
#[derive(Debug, Default)]
pub struct StealthSystem {
    config: StealthConfig,
    now: f64,
    records: AHashMap<EntityId, StealthRecord>,
    events: EventSender,
}

impl StealthSystem {
    /// Creates a tracker with the given tuning.
    #[must_use]
    pub fn new(config: StealthConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Connects the tracker to an event bus.
    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    /// Attempts to enter stealth. Fails while the re-entry cooldown runs.
    pub fn try_enter_stealth(&mut self, entity: EntityId) -> bool {
        let now = self.now;
        let record = self.records.entry(entity).or_default();
        if record.stealthed {
            return true;
        }
        if now < record.cooldown_until {
            debug!(
                "{entity} cannot stealth, {:.1}s cooldown left",
                record.cooldown_until - now
            );
            return false;
        }

        record.stealthed = true;
        debug!("{entity} entered stealth");
        self.events.emit(CombatEvent::StealthEntered { entity });
        true
    }

    /// Ends stealth and starts the re-entry cooldown. No-op if not stealthed.
    pub fn break_stealth(&mut self, entity: EntityId, reason: StealthBreakReason) {
        let Some(record) = self.records.get_mut(&entity) else {
            return;
        };
        if !record.stealthed {
            return;
        }

        record.stealthed = false;
        record.cooldown_until = self.now + f64::from(self.config.reentry_cooldown);
        debug!("{entity} stealth broken: {reason:?}");
        self.events
            .emit(CombatEvent::StealthBroken { entity, reason });
    }

    /// Leaves stealth manually.
    pub fn exit_stealth(&mut self, entity: EntityId) {
        self.break_stealth(entity, StealthBreakReason::Manual);
    }

    /// Reports that `entity` took damage.
    pub fn on_damage_received(&mut self, entity: EntityId) {
        self.break_stealth(entity, StealthBreakReason::DamageReceived);
    }

    /// Reports that `entity` attacked.
    pub fn on_attack_performed(&mut self, entity: EntityId) {
        self.break_stealth(entity, StealthBreakReason::Attack);
    }

    /// Reports that `entity` used a stealth-breaking ability.
    pub fn on_ability_used(&mut self, entity: EntityId) {
        self.break_stealth(entity, StealthBreakReason::AbilityUsed);
    }

    /// Check if `entity` is stealthed.
    #[must_use]
    pub fn is_stealthed(&self, entity: EntityId) -> bool {
        self.records.get(&entity).is_some_and(|r| r.stealthed)
    }

    /// Seconds until stealth can be re-entered.
    #[must_use]
    pub fn cooldown_remaining(&self, entity: EntityId) -> f32 {
        self.records
            .get(&entity)
            .map_or(0.0, |r| (r.cooldown_until - self.now).max(0.0) as f32)
    }

    /// Check if `entity` may enter stealth now.
    #[must_use]
    pub fn can_enter_stealth(&self, entity: EntityId) -> bool {
        self.cooldown_remaining(entity) <= 0.0
    }

    /// Stealth-only abilities require the entity to be stealthed.
    #[must_use]
    pub fn can_use_stealth_ability(&self, entity: EntityId) -> bool {
        self.is_stealthed(entity)
    }

    /// Movement speed multiplier for `entity`.
    #[must_use]
    pub fn movement_speed_multiplier(&self, entity: EntityId) -> f32 {
        if self.is_stealthed(entity) {
            self.config.movement_speed_multiplier
        } else {
            1.0
        }
    }

    /// Number of stealthed entities.
    #[must_use]
    pub fn stealthed_count(&self) -> usize {
        self.records.values().filter(|r| r.stealthed).count()
    }

    /// Lets `entity` re-enter stealth immediately.
    pub fn clear_cooldown(&mut self, entity: EntityId) {
        if let Some(record) = self.records.get_mut(&entity) {
            record.cooldown_until = self.now;
        }
    }

    /// Forgets an entity.
    pub fn remove(&mut self, entity: EntityId) {
        self.records.remove(&entity);
    }

    /// Forgets every entity.
    pub fn clear_all(&mut self) {
        self.records.clear();
    }

    /// Advances the clock and drops finished cooldowns.
    pub fn tick(&mut self, dt: f32) {
        self.now += f64::from(dt);
        let now = self.now;
        self.records
            .retain(|_, r| r.stealthed || now < r.cooldown_until);
    }
}
