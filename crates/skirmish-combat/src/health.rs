//! Health, death and combat-state tracking.
//!
//! The health manager is the root of the combat core: it mutates health,
//! decides deaths and wipes, and tells the other subsystems about it through
//! [`CombatHooks`]. It owns no references to them; the caller passes the
//! hooks into every mutating call.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use skirmish_common::{EntityId, RegistrationError};
use tracing::{debug, info};

use crate::arena::EntityArena;
use crate::damage_calc::{DamageCalculator, DamageType};
use crate::events::{CombatEvent, EventSender};

// ============================================================================
// Collaborators
// ============================================================================

/// Callbacks into the subsystems that react to health changes.
///
/// Every method defaults to doing nothing; `()` is the empty implementation.
pub trait CombatHooks {
    /// `source` damaged hostile `target` for `amount`.
    fn add_threat(&mut self, _source: EntityId, _target: EntityId, _amount: f32) {}

    /// `healer` restored `amount`; split threat across `engaged` hostiles.
    fn add_healing_threat(&mut self, _healer: EntityId, _amount: f32, _engaged: &[EntityId]) {}

    /// `entity` died or left combat.
    fn reset_threat(&mut self, _entity: EntityId) {}

    /// `entity` took damage.
    fn damage_received(&mut self, _entity: EntityId) {}

    /// `entity` died.
    fn entity_died(&mut self, _entity: EntityId) {}
}

impl CombatHooks for () {}

// ============================================================================
// Configuration
// ============================================================================

/// Health and mortality tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Seconds without damage before an entity leaves combat.
    pub combat_timeout: f32,
    /// Rolling window for the recent damage log.
    pub damage_window: f32,
    /// Fraction of recent damage returned by a windowed heal.
    pub windowed_heal_fraction: f32,
    /// Minimum windowed heal as a fraction of max health.
    pub windowed_heal_floor: f32,
    /// Health fraction after releasing spirit.
    pub respawn_health_fraction: f32,
    /// Seconds after death during which resurrection is possible.
    pub resurrection_window: f32,
    /// Whether entities of the same kind can damage each other.
    pub friendly_fire: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            combat_timeout: 5.0,
            damage_window: 5.0,
            windowed_heal_fraction: 0.25,
            windowed_heal_floor: 0.10,
            respawn_health_fraction: 0.5,
            resurrection_window: 60.0,
            friendly_fire: false,
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// Whether an entity counts toward wipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Player character
    Player,
    /// Hostile NPC
    Hostile,
}

/// Health of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Current health in [0, max].
    pub current: f32,
    /// Maximum health.
    pub max: f32,
    /// Dead until resurrected.
    pub is_dead: bool,
    /// Clock value at death.
    pub death_timestamp: Option<f64>,
}

impl HealthRecord {
    fn new(max: f32) -> Self {
        Self {
            current: max,
            max,
            is_dead: false,
            death_timestamp: None,
        }
    }

    /// Current health as a fraction of max.
    #[must_use]
    pub fn percent(&self) -> f32 {
        if self.max <= 0.0 {
            0.0
        } else {
            self.current / self.max
        }
    }
}

/// Damage taken inside a rolling window.
#[derive(Debug, Clone, Default)]
pub struct RecentDamageLog {
    entries: VecDeque<(f64, f32)>,
}

impl RecentDamageLog {
    /// Appends a hit.
    pub fn record(&mut self, timestamp: f64, amount: f32) {
        self.entries.push_back((timestamp, amount));
    }

    /// Drops hits older than `cutoff`.
    pub fn prune(&mut self, cutoff: f64) {
        while self.entries.front().is_some_and(|&(t, _)| t < cutoff) {
            self.entries.pop_front();
        }
    }

    /// Sum of hits at or after `cutoff`.
    #[must_use]
    pub fn total_since(&self, cutoff: f64) -> f32 {
        self.entries
            .iter()
            .filter(|&&(t, _)| t >= cutoff)
            .map(|&(_, amount)| amount)
            .sum()
    }

    /// Number of hits stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone)]
struct Combatant {
    kind: EntityKind,
    health: HealthRecord,
    in_combat: bool,
    last_combat: f64,
    recent_damage: RecentDamageLog,
    /// Opponents this entity traded damage with during the current combat.
    engaged: Vec<EntityId>,
}

impl Combatant {
    fn new(kind: EntityKind, max: f32) -> Self {
        Self {
            kind,
            health: HealthRecord::new(max),
            in_combat: false,
            last_combat: 0.0,
            recent_damage: RecentDamageLog::default(),
            engaged: Vec::new(),
        }
    }

    fn engage(&mut self, other: EntityId) {
        if !self.engaged.contains(&other) {
            self.engaged.push(other);
        }
    }
}

// ============================================================================
// Health Manager
// ============================================================================

/// Health and mortality for every registered entity.
#[derive(Debug)]
pub struct HealthManager {
    config: HealthConfig,
    now: f64,
    entities: EntityArena<Combatant>,
    /// Cleared when a wipe fires, set again once a player is alive.
    wipe_armed: bool,
    events: EventSender,
}

impl Default for HealthManager {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

impl HealthManager {
    /// Creates a manager with the given tuning.
    #[must_use]
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            now: 0.0,
            entities: EntityArena::new(),
            wipe_armed: true,
            events: EventSender::detached(),
        }
    }

    /// Connects the manager to an event bus.
    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    /// Tuning in use.
    #[must_use]
    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Current clock value in seconds.
    #[must_use]
    pub fn now(&self) -> f64 {
        self.now
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Registers an entity at full health.
    pub fn register(
        &mut self,
        entity: EntityId,
        kind: EntityKind,
        max_health: f32,
    ) -> Result<(), RegistrationError> {
        if !entity.is_valid() {
            return Err(RegistrationError::NullEntity);
        }
        if self.entities.contains(entity) {
            return Err(RegistrationError::AlreadyRegistered(entity));
        }
        if !max_health.is_finite() || max_health <= 0.0 {
            return Err(RegistrationError::InvalidMaxHealth { entity, max_health });
        }

        self.entities
            .insert(entity, Combatant::new(kind, max_health));
        if kind == EntityKind::Player {
            self.wipe_armed = true;
        }
        debug!("registered {kind:?} {entity} with {max_health} health");
        Ok(())
    }

    /// Removes an entity and every engagement that points at it.
    pub fn unregister(&mut self, entity: EntityId) -> bool {
        if self.entities.remove(entity).is_none() {
            return false;
        }
        for (_, other) in self.entities.iter_mut() {
            other.engaged.retain(|&e| e != entity);
        }
        debug!("unregistered {entity}");
        true
    }

    /// Check if `entity` is registered.
    #[must_use]
    pub fn is_registered(&self, entity: EntityId) -> bool {
        self.entities.contains(entity)
    }

    /// Kind of a registered entity.
    #[must_use]
    pub fn kind(&self, entity: EntityId) -> Option<EntityKind> {
        self.entities.get(entity).map(|c| c.kind)
    }

    /// Registered players in slot order.
    pub fn players(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities
            .iter()
            .filter(|(_, c)| c.kind == EntityKind::Player)
            .map(|(id, _)| id)
    }

    /// Registered hostiles in slot order.
    pub fn hostiles(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities
            .iter()
            .filter(|(_, c)| c.kind == EntityKind::Hostile)
            .map(|(id, _)| id)
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Applies damage. Ignored for non-positive amounts, unknown targets and
    /// dead targets. Damage between two entities of the same kind is dropped
    /// unless `friendly_fire` is on, and hostiles never build threat on each
    /// other.
    pub fn apply_damage(
        &mut self,
        target: EntityId,
        amount: f32,
        damage_type: DamageType,
        source: Option<EntityId>,
        hooks: &mut impl CombatHooks,
    ) {
        if amount.is_nan() || amount <= 0.0 {
            return;
        }
        let now = self.now;
        let source = source.filter(|&s| s.is_valid() && s != target);
        let source_kind = source.and_then(|s| self.entities.get(s)).map(|c| c.kind);
        let source_known = source_kind.is_some();
        let friendly_fire = self.config.friendly_fire;

        let Some(victim) = self.entities.get_mut(target) else {
            return;
        };
        if victim.health.is_dead {
            return;
        }
        if source_kind == Some(victim.kind) && !friendly_fire {
            debug!("{target} ignored friendly damage");
            return;
        }

        let remaining = (victim.health.current - amount).max(0.0);
        victim.health.current = remaining;
        victim.recent_damage.record(now, amount);
        let target_kind = victim.kind;
        if let Some(source) = source.filter(|_| source_known) {
            victim.engage(source);
        }
        self.enter_combat(target);

        if let Some(source) = source {
            if let Some(attacker) = self.entities.get_mut(source) {
                attacker.engage(target);
            }
            if source_known {
                self.enter_combat(source);
            }
            if target_kind == EntityKind::Hostile && source_kind != Some(EntityKind::Hostile) {
                hooks.add_threat(source, target, amount);
            }
        }

        debug!(
            "{target} took {amount:.0} {damage_type:?} from {} ({remaining:.0} left)",
            source.map_or_else(|| "environment".to_string(), |s| s.to_string())
        );
        self.events.emit(CombatEvent::DamageDealt {
            target,
            source,
            amount,
            damage_type,
            remaining,
        });
        hooks.damage_received(target);

        if remaining <= 0.0 {
            self.handle_death(target, hooks);
        }
    }

    /// Applies healing, capped at max health. Ignored for non-positive
    /// amounts and dead targets.
    pub fn apply_healing(
        &mut self,
        target: EntityId,
        amount: f32,
        source: Option<EntityId>,
        hooks: &mut impl CombatHooks,
    ) {
        if amount.is_nan() || amount <= 0.0 {
            return;
        }
        let Some(patient) = self.entities.get_mut(target) else {
            return;
        };
        if patient.health.is_dead {
            return;
        }

        let before = patient.health.current;
        patient.health.current = (before + amount).min(patient.health.max);
        let actual = patient.health.current - before;
        let target_in_combat = patient.in_combat;

        debug!(
            "{target} healed for {actual:.0} ({:.0}/{:.0})",
            patient.health.current, patient.health.max
        );
        self.events.emit(CombatEvent::HealingDone {
            target,
            source,
            amount: actual,
        });

        if let Some(healer) = source.filter(|s| s.is_valid()) {
            if target_in_combat && actual > 0.0 {
                let engaged = self.engaged_hostiles(healer, target);
                hooks.add_healing_threat(healer, actual, &engaged);
            }
        }
    }

    /// Kills `target` outright. No-op if already dead.
    pub fn kill(&mut self, target: EntityId, hooks: &mut impl CombatHooks) {
        let Some(victim) = self.entities.get_mut(target) else {
            return;
        };
        if victim.health.is_dead {
            return;
        }
        victim.health.current = 0.0;
        self.handle_death(target, hooks);
    }

    /// Brings a dead entity back at `health_fraction` of max health.
    ///
    /// The fraction is clamped to [0, 1]; the result is floored at one point
    /// of health so a living entity never sits at zero.
    pub fn resurrect(&mut self, target: EntityId, health_fraction: f32) -> bool {
        let Some(entity) = self.entities.get_mut(target) else {
            return false;
        };
        if !entity.health.is_dead {
            return false;
        }

        let fraction = if health_fraction.is_nan() {
            0.0
        } else {
            health_fraction.clamp(0.0, 1.0)
        };
        let max = entity.health.max;
        let health = (max * fraction).max(1.0).min(max);
        entity.health.current = health;
        entity.health.is_dead = false;
        entity.health.death_timestamp = None;
        if entity.kind == EntityKind::Player {
            self.wipe_armed = true;
        }

        info!("{target} resurrected with {health:.0} health");
        self.events
            .emit(CombatEvent::EntityResurrected { entity: target, health });
        true
    }

    /// Respawns a dead player at the configured respawn fraction.
    pub fn release_spirit(&mut self, player: EntityId) -> bool {
        if !self.is_dead(player) {
            return false;
        }
        debug!("{player} released spirit");
        self.resurrect(player, self.config.respawn_health_fraction)
    }

    /// Changes max health. Living entities are clamped or healed to full.
    pub fn set_max_health(&mut self, entity: EntityId, max_health: f32, heal_to_full: bool) -> bool {
        if !max_health.is_finite() || max_health <= 0.0 {
            return false;
        }
        let Some(record) = self.entities.get_mut(entity).map(|c| &mut c.health) else {
            return false;
        };
        record.max = max_health;
        if !record.is_dead {
            record.current = if heal_to_full {
                max_health
            } else {
                record.current.min(max_health)
            };
        }
        true
    }

    /// Marks `entity` as in combat and refreshes its timer.
    pub fn enter_combat(&mut self, entity: EntityId) {
        let now = self.now;
        let Some(combatant) = self.entities.get_mut(entity) else {
            return;
        };
        combatant.last_combat = now;
        if !combatant.in_combat {
            combatant.in_combat = true;
            debug!("{entity} entered combat");
            self.events.emit(CombatEvent::CombatEntered { entity });
        }
    }

    /// Drops `entity` out of combat and resets its threat.
    pub fn leave_combat(&mut self, entity: EntityId, hooks: &mut impl CombatHooks) {
        let Some(combatant) = self.entities.get_mut(entity) else {
            return;
        };
        if !combatant.in_combat {
            return;
        }
        combatant.in_combat = false;
        combatant.engaged.clear();
        debug!("{entity} left combat");
        self.events.emit(CombatEvent::CombatLeft { entity });
        hooks.reset_threat(entity);
    }

    /// Advances the clock, ends timed-out combat and prunes damage logs.
    pub fn tick(&mut self, dt: f32, hooks: &mut impl CombatHooks) {
        self.now += f64::from(dt);
        let now = self.now;
        let timeout = f64::from(self.config.combat_timeout);
        let cutoff = now - f64::from(self.config.damage_window);

        let mut timed_out = Vec::new();
        for (id, combatant) in self.entities.iter_mut() {
            combatant.recent_damage.prune(cutoff);
            if combatant.in_combat && now - combatant.last_combat > timeout {
                timed_out.push(id);
            }
        }
        for entity in timed_out {
            self.leave_combat(entity, hooks);
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Snapshot of an entity's health.
    #[must_use]
    pub fn record(&self, entity: EntityId) -> Option<HealthRecord> {
        self.entities.get(entity).map(|c| c.health)
    }

    /// Current health, 0 if unknown.
    #[must_use]
    pub fn health(&self, entity: EntityId) -> f32 {
        self.record(entity).map_or(0.0, |r| r.current)
    }

    /// Max health, 0 if unknown.
    #[must_use]
    pub fn max_health(&self, entity: EntityId) -> f32 {
        self.record(entity).map_or(0.0, |r| r.max)
    }

    /// Health fraction in [0, 1], 0 if unknown.
    #[must_use]
    pub fn health_percent(&self, entity: EntityId) -> f32 {
        self.record(entity).map_or(0.0, |r| r.percent())
    }

    /// Check if `entity` is dead.
    #[must_use]
    pub fn is_dead(&self, entity: EntityId) -> bool {
        self.entities.get(entity).is_some_and(|c| c.health.is_dead)
    }

    /// Check if `entity` is alive and registered.
    #[must_use]
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.get(entity).is_some_and(|c| !c.health.is_dead)
    }

    /// Check if `entity` is in combat.
    #[must_use]
    pub fn is_in_combat(&self, entity: EntityId) -> bool {
        self.entities.get(entity).is_some_and(|c| c.in_combat)
    }

    /// Seconds since `entity` died.
    #[must_use]
    pub fn time_since_death(&self, entity: EntityId) -> Option<f32> {
        self.record(entity)
            .and_then(|r| r.death_timestamp)
            .map(|t| (self.now - t) as f32)
    }

    /// Check if `entity` is dead and still inside the resurrection window.
    #[must_use]
    pub fn can_be_resurrected(&self, entity: EntityId) -> bool {
        self.time_since_death(entity)
            .is_some_and(|t| t <= self.config.resurrection_window)
    }

    /// Damage taken inside the rolling window.
    #[must_use]
    pub fn recent_damage_taken(&self, entity: EntityId) -> f32 {
        let cutoff = self.now - f64::from(self.config.damage_window);
        self.entities
            .get(entity)
            .map_or(0.0, |c| c.recent_damage.total_since(cutoff))
    }

    /// Heal sized from recent damage: a fraction of the window's damage,
    /// floored at a fraction of max health.
    #[must_use]
    pub fn windowed_heal(&self, entity: EntityId, calculator: &DamageCalculator) -> f32 {
        calculator.windowed_heal(
            self.recent_damage_taken(entity),
            self.max_health(entity),
            self.config.windowed_heal_fraction,
            self.config.windowed_heal_floor,
        )
    }

    /// Check if every registered player is dead.
    #[must_use]
    pub fn all_players_dead(&self) -> bool {
        let mut players = self
            .entities
            .iter()
            .filter(|(_, c)| c.kind == EntityKind::Player)
            .peekable();
        players.peek().is_some() && players.all(|(_, c)| c.health.is_dead)
    }

    /// Hostiles engaged with `healer` or `target` that are alive and in combat.
    #[must_use]
    pub fn engaged_hostiles(&self, healer: EntityId, target: EntityId) -> Vec<EntityId> {
        let mut hostiles = Vec::new();
        let lists = [healer, target]
            .into_iter()
            .filter_map(|id| self.entities.get(id))
            .flat_map(|c| c.engaged.iter().copied());
        for id in lists {
            if hostiles.contains(&id) {
                continue;
            }
            let active = self.entities.get(id).is_some_and(|c| {
                c.kind == EntityKind::Hostile && c.in_combat && !c.health.is_dead
            });
            if active {
                hostiles.push(id);
            }
        }
        hostiles
    }

    /// Number of registered entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn handle_death(&mut self, target: EntityId, hooks: &mut impl CombatHooks) {
        let now = self.now;
        let Some(victim) = self.entities.get_mut(target) else {
            return;
        };
        victim.health.current = 0.0;
        victim.health.is_dead = true;
        victim.health.death_timestamp = Some(now);
        let was_in_combat = victim.in_combat;

        // Leaving combat resets threat; only reset here if that didn't run
        self.leave_combat(target, hooks);
        info!("{target} died");
        self.events.emit(CombatEvent::EntityDied { entity: target });
        if !was_in_combat {
            hooks.reset_threat(target);
        }
        hooks.entity_died(target);

        self.check_wipe();
    }

    fn check_wipe(&mut self) {
        if !self.wipe_armed || !self.all_players_dead() {
            return;
        }
        self.wipe_armed = false;
        info!("wipe: every player is dead");
        self.events.emit(CombatEvent::Wipe);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use proptest::prelude::*;

    const HERO: EntityId = EntityId::from_raw(1);
    const OGRE: EntityId = EntityId::from_raw(50);

    fn manager() -> HealthManager {
        let mut health = HealthManager::new(HealthConfig::default());
        health
            .register(HERO, EntityKind::Player, 1000.0)
            .expect("register hero");
        health
            .register(OGRE, EntityKind::Hostile, 5000.0)
            .expect("register ogre");
        health
    }

    #[derive(Default)]
    struct Recorder {
        threat: Vec<(EntityId, EntityId, f32)>,
        healing: Vec<(EntityId, f32, Vec<EntityId>)>,
        resets: Vec<EntityId>,
        hits: Vec<EntityId>,
        deaths: Vec<EntityId>,
    }

    impl CombatHooks for Recorder {
        fn add_threat(&mut self, source: EntityId, target: EntityId, amount: f32) {
            self.threat.push((source, target, amount));
        }

        fn add_healing_threat(&mut self, healer: EntityId, amount: f32, engaged: &[EntityId]) {
            self.healing.push((healer, amount, engaged.to_vec()));
        }

        fn reset_threat(&mut self, entity: EntityId) {
            self.resets.push(entity);
        }

        fn damage_received(&mut self, entity: EntityId) {
            self.hits.push(entity);
        }

        fn entity_died(&mut self, entity: EntityId) {
            self.deaths.push(entity);
        }
    }

    fn count_deaths(events: &[CombatEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, CombatEvent::EntityDied { .. }))
            .count()
    }

    #[test]
    fn test_registration_errors() {
        let mut health = manager();
        assert_eq!(
            health.register(HERO, EntityKind::Player, 10.0),
            Err(RegistrationError::AlreadyRegistered(HERO))
        );
        assert_eq!(
            health.register(EntityId::NULL, EntityKind::Player, 10.0),
            Err(RegistrationError::NullEntity)
        );
        assert!(health
            .register(EntityId::from_raw(9), EntityKind::Player, 0.0)
            .is_err());
        assert!(health
            .register(EntityId::from_raw(9), EntityKind::Player, f32::INFINITY)
            .is_err());
    }

    #[test]
    fn test_damage_heal_kill_scenario() {
        let bus = EventBus::new(64);
        let mut health = manager().with_events(bus.sender());

        health.apply_damage(HERO, 400.0, DamageType::Physical, None, &mut ());
        assert_eq!(health.health(HERO), 600.0);

        health.apply_healing(HERO, 200.0, None, &mut ());
        assert_eq!(health.health(HERO), 800.0);

        health.apply_damage(HERO, 900.0, DamageType::Fire, None, &mut ());
        assert_eq!(health.health(HERO), 0.0);
        assert!(health.is_dead(HERO));

        health.apply_damage(HERO, 50.0, DamageType::Fire, None, &mut ());
        health.kill(HERO, &mut ());
        assert_eq!(health.health(HERO), 0.0);
        assert_eq!(count_deaths(&bus.drain()), 1);
    }

    #[test]
    fn test_non_positive_amounts_ignored() {
        let bus = EventBus::new(16);
        let mut health = manager().with_events(bus.sender());
        health.apply_damage(HERO, 0.0, DamageType::Physical, None, &mut ());
        health.apply_damage(HERO, -10.0, DamageType::Physical, None, &mut ());
        health.apply_healing(HERO, 0.0, None, &mut ());
        health.apply_damage(HERO, f32::NAN, DamageType::Physical, None, &mut ());
        assert_eq!(health.health(HERO), 1000.0);
        assert!(!health.is_in_combat(HERO));
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_healing_capped_and_dead_ignored() {
        let mut health = manager();
        health.apply_damage(HERO, 100.0, DamageType::Physical, None, &mut ());
        health.apply_healing(HERO, 500.0, None, &mut ());
        assert_eq!(health.health(HERO), 1000.0);

        health.kill(HERO, &mut ());
        health.apply_healing(HERO, 500.0, None, &mut ());
        assert_eq!(health.health(HERO), 0.0);
    }

    #[test]
    fn test_damage_hooks_and_engagement() {
        let mut hooks = Recorder::default();
        let mut health = manager();
        health.apply_damage(OGRE, 100.0, DamageType::Physical, Some(HERO), &mut hooks);

        assert_eq!(hooks.threat, vec![(HERO, OGRE, 100.0)]);
        assert_eq!(hooks.hits, vec![OGRE]);
        assert!(health.is_in_combat(HERO));
        assert!(health.is_in_combat(OGRE));
        assert_eq!(health.engaged_hostiles(HERO, HERO), vec![OGRE]);

        // Players don't hold threat tables
        health.apply_damage(HERO, 100.0, DamageType::Physical, Some(OGRE), &mut hooks);
        assert_eq!(hooks.threat.len(), 1);
    }

    #[test]
    fn test_healing_threat_goes_to_engaged_hostiles() {
        let priest = EntityId::from_raw(2);
        let mut hooks = Recorder::default();
        let mut health = manager();
        health
            .register(priest, EntityKind::Player, 800.0)
            .expect("register priest");

        health.apply_damage(HERO, 300.0, DamageType::Physical, Some(OGRE), &mut hooks);
        health.apply_healing(HERO, 500.0, Some(priest), &mut hooks);

        assert_eq!(hooks.healing, vec![(priest, 300.0, vec![OGRE])]);

        // Out of combat heals generate no threat
        let mut hooks = Recorder::default();
        health.tick(6.0, &mut hooks);
        health.apply_healing(HERO, 10.0, Some(priest), &mut hooks);
        assert!(hooks.healing.is_empty());
    }

    #[test]
    fn test_death_resets_threat_and_leaves_combat() {
        let mut hooks = Recorder::default();
        let mut health = manager();
        health.apply_damage(OGRE, 6000.0, DamageType::Physical, Some(HERO), &mut hooks);

        assert!(health.is_dead(OGRE));
        assert!(!health.is_in_combat(OGRE));
        assert_eq!(hooks.resets, vec![OGRE]);
        assert_eq!(hooks.deaths, vec![OGRE]);
    }

    #[test]
    fn test_out_of_combat_kill_resets_threat_once() {
        let mut hooks = Recorder::default();
        let mut health = manager();
        assert!(!health.is_in_combat(OGRE));
        health.kill(OGRE, &mut hooks);
        assert_eq!(hooks.resets, vec![OGRE]);
        assert_eq!(hooks.deaths, vec![OGRE]);
    }

    #[test]
    fn test_friendly_fire_ignored_by_default() {
        let ally = EntityId::from_raw(2);
        let twin = EntityId::from_raw(51);
        let mut hooks = Recorder::default();
        let mut health = manager();
        health
            .register(ally, EntityKind::Player, 800.0)
            .expect("register ally");
        health
            .register(twin, EntityKind::Hostile, 5000.0)
            .expect("register twin");

        health.apply_damage(HERO, 100.0, DamageType::Fire, Some(ally), &mut hooks);
        health.apply_damage(OGRE, 100.0, DamageType::Fire, Some(twin), &mut hooks);
        assert_eq!(health.health(HERO), 1000.0);
        assert_eq!(health.health(OGRE), 5000.0);
        assert!(!health.is_in_combat(HERO));
        assert!(hooks.hits.is_empty());
    }

    #[test]
    fn test_friendly_fire_never_builds_hostile_threat() {
        let twin = EntityId::from_raw(51);
        let config = HealthConfig {
            friendly_fire: true,
            ..HealthConfig::default()
        };
        let mut hooks = Recorder::default();
        let mut health = HealthManager::new(config);
        health
            .register(OGRE, EntityKind::Hostile, 5000.0)
            .expect("register ogre");
        health
            .register(twin, EntityKind::Hostile, 5000.0)
            .expect("register twin");

        health.apply_damage(OGRE, 100.0, DamageType::Fire, Some(twin), &mut hooks);
        assert_eq!(health.health(OGRE), 4900.0);
        assert!(hooks.threat.is_empty());
    }

    #[test]
    fn test_combat_timeout() {
        let bus = EventBus::new(32);
        let mut hooks = Recorder::default();
        let mut health = manager().with_events(bus.sender());
        health.apply_damage(OGRE, 10.0, DamageType::Physical, Some(HERO), &mut hooks);

        health.tick(5.0, &mut hooks);
        assert!(health.is_in_combat(OGRE));

        health.tick(0.5, &mut hooks);
        assert!(!health.is_in_combat(OGRE));
        assert!(!health.is_in_combat(HERO));
        assert!(hooks.resets.contains(&OGRE));
        assert!(bus
            .drain()
            .contains(&CombatEvent::CombatLeft { entity: OGRE }));
    }

    #[test]
    fn test_windowed_heal_formula() {
        let mut health = manager();
        health.apply_damage(HERO, 300.0, DamageType::Physical, None, &mut ());
        health.tick(2.0, &mut ());
        health.apply_damage(HERO, 100.0, DamageType::Physical, None, &mut ());
        health.tick(2.0, &mut ());

        let calc = DamageCalculator::new();
        assert_eq!(health.recent_damage_taken(HERO), 400.0);
        let expected = (0.25 * 400.0_f32).max(0.10 * 1000.0);
        assert_eq!(health.windowed_heal(HERO, &calc), expected);

        // First hit ages out of the window
        health.tick(1.5, &mut ());
        assert_eq!(health.recent_damage_taken(HERO), 100.0);
        assert_eq!(health.windowed_heal(HERO, &calc), 100.0);
    }

    #[test]
    fn test_windowed_heal_floor() {
        let health = manager();
        assert_eq!(health.windowed_heal(HERO, &DamageCalculator::new()), 100.0);
    }

    #[test]
    fn test_resurrection() {
        let bus = EventBus::new(32);
        let mut health = manager().with_events(bus.sender());
        assert!(!health.resurrect(HERO, 1.0));

        health.kill(HERO, &mut ());
        health.tick(30.0, &mut ());
        assert!(health.can_be_resurrected(HERO));
        assert_eq!(health.time_since_death(HERO), Some(30.0));

        assert!(health.resurrect(HERO, 1.7));
        assert_eq!(health.health(HERO), 1000.0);
        assert!(!health.is_dead(HERO));
        assert!(bus.drain().contains(&CombatEvent::EntityResurrected {
            entity: HERO,
            health: 1000.0
        }));
    }

    #[test]
    fn test_resurrect_at_zero_keeps_one_health() {
        let mut health = manager();
        health.kill(HERO, &mut ());
        assert!(health.resurrect(HERO, 0.0));
        assert_eq!(health.health(HERO), 1.0);
        assert!(health.is_alive(HERO));

        health.kill(HERO, &mut ());
        assert!(health.resurrect(HERO, f32::NAN));
        assert_eq!(health.health(HERO), 1.0);
    }

    #[test]
    fn test_resurrection_window_expires() {
        let mut health = manager();
        health.kill(HERO, &mut ());
        health.tick(61.0, &mut ());
        assert!(!health.can_be_resurrected(HERO));
        assert!(health.release_spirit(HERO));
        assert_eq!(health.health(HERO), 500.0);
        assert!(!health.release_spirit(HERO));
    }

    #[test]
    fn test_wipe_fires_once() {
        let bus = EventBus::new(64);
        let mut health = HealthManager::new(HealthConfig::default()).with_events(bus.sender());
        let players: Vec<EntityId> = (1..=3).map(EntityId::from_raw).collect();
        for &p in &players {
            health
                .register(p, EntityKind::Player, 100.0)
                .expect("register player");
        }

        health.kill(players[0], &mut ());
        health.kill(players[1], &mut ());
        assert!(!bus.drain().contains(&CombatEvent::Wipe));

        health.kill(players[2], &mut ());
        health.kill(players[2], &mut ());
        let wipes = bus
            .drain()
            .into_iter()
            .filter(|e| *e == CombatEvent::Wipe)
            .count();
        assert_eq!(wipes, 1);
    }

    #[test]
    fn test_resurrect_prevents_wipe_and_rearms() {
        let bus = EventBus::new(64);
        let mut health = HealthManager::new(HealthConfig::default()).with_events(bus.sender());
        let players: Vec<EntityId> = (1..=3).map(EntityId::from_raw).collect();
        for &p in &players {
            health
                .register(p, EntityKind::Player, 100.0)
                .expect("register player");
        }

        health.kill(players[0], &mut ());
        health.kill(players[1], &mut ());
        health.resurrect(players[0], 0.5);
        health.kill(players[2], &mut ());
        assert!(!bus.drain().contains(&CombatEvent::Wipe));

        health.kill(players[0], &mut ());
        assert!(bus.drain().contains(&CombatEvent::Wipe));
    }

    #[test]
    fn test_hostile_deaths_never_wipe() {
        let bus = EventBus::new(16);
        let mut health = HealthManager::new(HealthConfig::default()).with_events(bus.sender());
        health
            .register(OGRE, EntityKind::Hostile, 100.0)
            .expect("register ogre");
        health.kill(OGRE, &mut ());
        assert!(!bus.drain().contains(&CombatEvent::Wipe));
    }

    #[test]
    fn test_set_max_health() {
        let mut health = manager();
        assert!(health.set_max_health(HERO, 500.0, false));
        assert_eq!(health.health(HERO), 500.0);
        assert!(health.set_max_health(HERO, 2000.0, false));
        assert_eq!(health.health(HERO), 500.0);
        assert!(health.set_max_health(HERO, 2000.0, true));
        assert_eq!(health.health(HERO), 2000.0);
        assert!(!health.set_max_health(HERO, -1.0, true));
    }

    #[test]
    fn test_unregister_drops_engagement() {
        let mut health = manager();
        health.apply_damage(OGRE, 10.0, DamageType::Physical, Some(HERO), &mut ());
        assert!(health.unregister(OGRE));
        assert!(health.engaged_hostiles(HERO, HERO).is_empty());
        assert!(!health.unregister(OGRE));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Damage(f32),
        Heal(f32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-50.0f32..2000.0).prop_map(Op::Damage),
            (-50.0f32..2000.0).prop_map(Op::Heal),
        ]
    }

    proptest! {
        #[test]
        fn prop_health_stays_in_bounds(ops in prop::collection::vec(op(), 1..64)) {
            let mut health = manager();
            for op in ops {
                match op {
                    Op::Damage(amount) => {
                        health.apply_damage(HERO, amount, DamageType::Physical, None, &mut ());
                    },
                    Op::Heal(amount) => health.apply_healing(HERO, amount, None, &mut ()),
                }
                let record = health.record(HERO).expect("hero registered");
                prop_assert!(record.current >= 0.0);
                prop_assert!(record.current <= record.max);
                prop_assert_eq!(record.is_dead, record.current == 0.0);
            }
        }

        #[test]
        fn prop_death_fires_once_per_life(hits in prop::collection::vec(1.0f32..800.0, 1..40)) {
            let bus = EventBus::new(1024);
            let mut health = manager().with_events(bus.sender());
            for hit in hits {
                health.apply_damage(HERO, hit, DamageType::Shadow, None, &mut ());
            }
            let deaths = count_deaths(&bus.drain());
            prop_assert_eq!(deaths, usize::from(health.is_dead(HERO)));
        }
    }
}
