//! Host-facing combat world.
//!
//! [`CombatWorld`] owns one instance of every subsystem plus the event bus
//! and wires them together. Hosts call into it with player intents and
//! damage, call [`CombatWorld::tick`] once per frame, and drain events.
//!
//! Abilities with an [`AbilityEffect`] are resolved here: amounts are sized
//! by the [`DamageCalculator`] from the caster's [`CharacterStats`] and then
//! handed to the health manager. Instant abilities land immediately; timed
//! casts land on the tick they complete. Buffered spell-queue presses are
//! fired for any ability registered with [`CombatWorld::register_ability`]
//! as soon as the caster's state allows it.

use ahash::AHashMap;
use skirmish_common::{AbilityId, EntityId};
use tracing::{debug, info};

use crate::arena::EntityArena;
use crate::cast::{AbilityEffect, AbilitySpec, CastState};
use crate::config::CombatConfig;
use crate::damage_calc::{CharacterStats, DamageCalculator, DamageResult, DamageType};
use crate::diminishing::{CrowdControl, DiminishingReturns};
use crate::error::CombatResult;
use crate::events::{CombatEvent, EventBus, DEFAULT_EVENT_CAPACITY};
use crate::health::{CombatHooks, EntityKind, HealthManager};
use crate::interrupt::InterruptSystem;
use crate::spell_queue::{Caster, QueuedIntent};
use crate::stealth::{StealthBreakReason, StealthSystem};
use crate::threat::ThreatEngine;

// ============================================================================
// Hooks
// ============================================================================

/// Borrowed view of the subsystems the health manager reports to.
struct WorldHooks<'a> {
    threat: &'a mut ThreatEngine,
    stealth: &'a mut StealthSystem,
    diminishing: &'a mut DiminishingReturns,
    interrupts: &'a mut InterruptSystem,
    casters: &'a mut EntityArena<Caster>,
    ranged: bool,
}

impl CombatHooks for WorldHooks<'_> {
    fn add_threat(&mut self, source: EntityId, target: EntityId, amount: f32) {
        if self.ranged {
            self.threat.add_threat_ranged(source, target, amount);
        } else {
            self.threat.add_threat(source, target, amount);
        }
    }

    fn add_healing_threat(&mut self, healer: EntityId, amount: f32, engaged: &[EntityId]) {
        self.threat.add_healing_threat(healer, amount, engaged);
    }

    fn reset_threat(&mut self, entity: EntityId) {
        self.threat.reset_threat(entity);
    }

    fn damage_received(&mut self, entity: EntityId) {
        self.stealth.on_damage_received(entity);
    }

    fn entity_died(&mut self, entity: EntityId) {
        // Hostiles stop chasing a corpse
        self.threat.remove_contributor(entity);
        self.diminishing.clear_target(entity);
        self.interrupts.clear_lockout(entity);
        self.stealth.remove(entity);
        if let Some(caster) = self.casters.get_mut(entity) {
            caster.reset();
        }
    }
}

// ============================================================================
// Combat World
// ============================================================================

/// Timed cast waiting to land.
#[derive(Debug, Clone)]
struct PendingCast {
    ability: AbilitySpec,
    target: Option<EntityId>,
}

/// Every combat subsystem behind one façade.
#[derive(Debug)]
pub struct CombatWorld {
    config: CombatConfig,
    bus: EventBus,
    calculator: DamageCalculator,
    health: HealthManager,
    threat: ThreatEngine,
    casters: EntityArena<Caster>,
    diminishing: DiminishingReturns,
    interrupts: InterruptSystem,
    stealth: StealthSystem,
    abilities: AHashMap<AbilityId, AbilitySpec>,
    stats: EntityArena<CharacterStats>,
    targets: EntityArena<EntityId>,
    pending: EntityArena<PendingCast>,
}

impl Default for CombatWorld {
    fn default() -> Self {
        Self::new(CombatConfig::default())
    }
}

impl CombatWorld {
    /// Creates a world with the default event capacity.
    ///
    /// The config is used as given; see [`CombatWorld::try_new`] for a
    /// constructor that validates it first.
    #[must_use]
    pub fn new(config: CombatConfig) -> Self {
        Self::with_event_capacity(config, DEFAULT_EVENT_CAPACITY)
    }

    /// Validates `config`, then creates a world.
    pub fn try_new(config: CombatConfig) -> CombatResult<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Creates a world whose event bus holds `capacity` undrained events.
    #[must_use]
    pub fn with_event_capacity(config: CombatConfig, capacity: usize) -> Self {
        let bus = EventBus::new(capacity);
        Self {
            calculator: DamageCalculator::with_config(config.damage.clone()),
            health: HealthManager::new(config.health.clone()).with_events(bus.sender()),
            threat: ThreatEngine::new(config.threat.clone()).with_events(bus.sender()),
            casters: EntityArena::new(),
            diminishing: DiminishingReturns::new(config.diminishing.clone())
                .with_events(bus.sender()),
            interrupts: InterruptSystem::new(config.interrupt.clone()).with_events(bus.sender()),
            stealth: StealthSystem::new(config.stealth.clone()).with_events(bus.sender()),
            abilities: AHashMap::new(),
            stats: EntityArena::new(),
            targets: EntityArena::new(),
            pending: EntityArena::new(),
            config,
            bus,
        }
    }

    /// Tuning in use.
    #[must_use]
    pub fn config(&self) -> &CombatConfig {
        &self.config
    }

    /// Event bus shared by every subsystem.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Drains every pending event.
    pub fn drain_events(&self) -> Vec<CombatEvent> {
        self.bus.drain()
    }

    /// Damage formulas configured for this world.
    #[must_use]
    pub fn calculator(&self) -> &DamageCalculator {
        &self.calculator
    }

    /// Health manager.
    #[must_use]
    pub fn health_manager(&self) -> &HealthManager {
        &self.health
    }

    /// Threat engine.
    #[must_use]
    pub fn threat_engine(&self) -> &ThreatEngine {
        &self.threat
    }

    /// Diminishing returns tracker.
    #[must_use]
    pub fn diminishing(&self) -> &DiminishingReturns {
        &self.diminishing
    }

    /// Lockout tracker.
    #[must_use]
    pub fn interrupts(&self) -> &InterruptSystem {
        &self.interrupts
    }

    /// Stealth tracker.
    #[must_use]
    pub fn stealth(&self) -> &StealthSystem {
        &self.stealth
    }

    /// Cast state machine and queue of `entity`.
    #[must_use]
    pub fn caster(&self, entity: EntityId) -> Option<&Caster> {
        self.casters.get(entity)
    }

    fn parts(&mut self, ranged: bool) -> (&mut HealthManager, WorldHooks<'_>) {
        (
            &mut self.health,
            WorldHooks {
                threat: &mut self.threat,
                stealth: &mut self.stealth,
                diminishing: &mut self.diminishing,
                interrupts: &mut self.interrupts,
                casters: &mut self.casters,
                ranged,
            },
        )
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Registers a player at full health.
    pub fn register_player(&mut self, entity: EntityId, max_health: f32) -> CombatResult<()> {
        self.register(entity, EntityKind::Player, max_health)
    }

    /// Registers a hostile at full health.
    pub fn register_hostile(&mut self, entity: EntityId, max_health: f32) -> CombatResult<()> {
        self.register(entity, EntityKind::Hostile, max_health)
    }

    fn register(&mut self, entity: EntityId, kind: EntityKind, max_health: f32) -> CombatResult<()> {
        self.health.register(entity, kind, max_health)?;
        let caster = Caster::new(entity, &self.config.cast, &self.bus.sender());
        self.casters.insert(entity, caster);
        self.stats.insert(entity, CharacterStats::default());
        info!("{kind:?} {entity} joined combat world");
        Ok(())
    }

    /// Removes an entity from every subsystem.
    pub fn unregister_entity(&mut self, entity: EntityId) -> bool {
        if !self.health.unregister(entity) {
            return false;
        }
        self.casters.remove(entity);
        self.stats.remove(entity);
        self.pending.remove(entity);
        self.targets.remove(entity);
        self.targets.retain(|_, target| *target != entity);
        self.threat.remove_hostile(entity);
        self.threat.remove_contributor(entity);
        self.diminishing.clear_target(entity);
        self.interrupts.clear_lockout(entity);
        self.stealth.remove(entity);
        info!("{entity} left combat world");
        true
    }

    /// Replaces the stats of a registered entity.
    pub fn set_stats(&mut self, entity: EntityId, stats: CharacterStats) -> bool {
        match self.stats.get_mut(entity) {
            Some(current) => {
                *current = stats;
                true
            },
            None => false,
        }
    }

    /// Stats of `entity`, zeroed if unknown.
    #[must_use]
    pub fn stats(&self, entity: EntityId) -> CharacterStats {
        self.stats.get(entity).copied().unwrap_or_default()
    }

    /// Makes `ability` available to the spell queue. Replaces any ability
    /// with the same id.
    pub fn register_ability(&mut self, ability: AbilitySpec) {
        debug!("registered {}", ability.id);
        self.abilities.insert(ability.id, ability);
    }

    /// Registered ability by id.
    #[must_use]
    pub fn ability(&self, id: AbilityId) -> Option<&AbilitySpec> {
        self.abilities.get(&id)
    }

    // ------------------------------------------------------------------------
    // Targeting
    // ------------------------------------------------------------------------

    /// Selects (or with `None`, clears) `actor`'s target.
    pub fn set_target(&mut self, actor: EntityId, target: Option<EntityId>) -> bool {
        if !self.health.is_registered(actor) {
            return false;
        }
        match target {
            Some(target) if self.health.is_registered(target) => {
                self.targets.insert(actor, target);
                true
            },
            Some(_) => false,
            None => {
                self.targets.remove(actor);
                true
            },
        }
    }

    /// Living target of `actor`: its selection, or for hostiles the top of
    /// the threat table.
    #[must_use]
    pub fn target_of(&self, actor: EntityId) -> Option<EntityId> {
        self.targets
            .get(actor)
            .copied()
            .or_else(|| self.threat.current_target(actor))
            .filter(|&t| self.health.is_alive(t))
    }

    // ------------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------------

    /// Applies damage to `target`.
    pub fn apply_damage(
        &mut self,
        target: EntityId,
        amount: f32,
        damage_type: DamageType,
        source: Option<EntityId>,
    ) {
        let (health, mut hooks) = self.parts(false);
        health.apply_damage(target, amount, damage_type, source, &mut hooks);
    }

    /// Applies damage from a ranged attacker; threat is recorded as ranged.
    pub fn apply_ranged_damage(
        &mut self,
        target: EntityId,
        amount: f32,
        damage_type: DamageType,
        source: EntityId,
    ) {
        let (health, mut hooks) = self.parts(true);
        health.apply_damage(target, amount, damage_type, Some(source), &mut hooks);
    }

    /// Applies healing to `target`.
    pub fn apply_healing(&mut self, target: EntityId, amount: f32, source: Option<EntityId>) {
        let (health, mut hooks) = self.parts(false);
        health.apply_healing(target, amount, source, &mut hooks);
    }

    /// Kills `target` outright.
    pub fn kill(&mut self, target: EntityId) {
        let (health, mut hooks) = self.parts(false);
        health.kill(target, &mut hooks);
    }

    /// Resurrects a dead entity at `health_fraction` of max health.
    pub fn resurrect(&mut self, target: EntityId, health_fraction: f32) -> bool {
        self.health.resurrect(target, health_fraction)
    }

    /// Respawns a dead player at the configured fraction.
    pub fn release_spirit(&mut self, player: EntityId) -> bool {
        self.health.release_spirit(player)
    }

    /// Sizes `base` damage from `source`'s stats and `target`'s armor, then
    /// applies it. `roll` is a crit roll in `[0, 100)`; `None` never crits.
    pub fn deal_damage(
        &mut self,
        source: EntityId,
        target: EntityId,
        base: f32,
        damage_type: DamageType,
        roll: Option<f32>,
    ) -> DamageResult {
        self.strike(source, target, base, damage_type, false, roll)
    }

    /// Sizes `base` healing from `source`'s stats, then applies it.
    pub fn deal_healing(
        &mut self,
        source: EntityId,
        target: EntityId,
        base: f32,
        roll: Option<f32>,
    ) -> DamageResult {
        let caster = self.stats(source);
        let result = self.calculator.full_healing(base, &caster, roll);
        self.apply_healing(target, result.final_damage, Some(source));
        result
    }

    fn strike(
        &mut self,
        source: EntityId,
        target: EntityId,
        base: f32,
        damage_type: DamageType,
        ranged: bool,
        roll: Option<f32>,
    ) -> DamageResult {
        let attacker = self.stats(source);
        let armor = self.stats(target).armor;
        let result = if damage_type.is_physical() {
            self.calculator.full_physical(base, &attacker, armor, roll)
        } else {
            self.calculator.full_spell(base, &attacker, None, roll)
        };
        if ranged {
            self.apply_ranged_damage(target, result.final_damage, damage_type, source);
        } else {
            self.apply_damage(target, result.final_damage, damage_type, Some(source));
        }
        result
    }

    /// Heals `target` for the windowed amount derived from its recent damage.
    pub fn apply_windowed_heal(&mut self, target: EntityId, source: Option<EntityId>) -> f32 {
        let amount = self.health.windowed_heal(target, &self.calculator);
        self.apply_healing(target, amount, source);
        amount
    }

    /// Current health of `entity`.
    #[must_use]
    pub fn health(&self, entity: EntityId) -> f32 {
        self.health.health(entity)
    }

    /// Health fraction of `entity`.
    #[must_use]
    pub fn health_percent(&self, entity: EntityId) -> f32 {
        self.health.health_percent(entity)
    }

    /// Check if `entity` is dead.
    #[must_use]
    pub fn is_dead(&self, entity: EntityId) -> bool {
        self.health.is_dead(entity)
    }

    /// Check if `entity` is in combat.
    #[must_use]
    pub fn is_in_combat(&self, entity: EntityId) -> bool {
        self.health.is_in_combat(entity)
    }

    // ------------------------------------------------------------------------
    // Threat
    // ------------------------------------------------------------------------

    /// Adds threat directly.
    pub fn add_threat(&mut self, source: EntityId, hostile: EntityId, amount: f32) {
        self.threat.add_threat(source, hostile, amount);
    }

    /// Taunts `hostile`.
    pub fn taunt(&mut self, source: EntityId, hostile: EntityId) {
        if self.health.is_dead(source) || self.health.is_dead(hostile) {
            return;
        }
        self.threat.taunt(source, hostile);
    }

    /// Splits healing threat across `engaged` hostiles.
    pub fn add_healing_threat(&mut self, healer: EntityId, amount: f32, engaged: &[EntityId]) {
        self.threat.add_healing_threat(healer, amount, engaged);
    }

    /// Clears `hostile`'s threat table.
    pub fn reset_threat(&mut self, hostile: EntityId) {
        self.threat.reset_threat(hostile);
    }

    /// Who `hostile` is attacking.
    #[must_use]
    pub fn current_target(&self, hostile: EntityId) -> Option<EntityId> {
        self.threat.current_target(hostile)
    }

    /// Threat table of `hostile`, highest first.
    #[must_use]
    pub fn threat_table(&self, hostile: EntityId) -> Vec<(EntityId, f32)> {
        self.threat.threat_table(hostile)
    }

    // ------------------------------------------------------------------------
    // Casting
    // ------------------------------------------------------------------------

    /// Check if `actor` may use `ability` right now.
    #[must_use]
    pub fn can_use_ability(&self, actor: EntityId, ability: &AbilitySpec) -> bool {
        let Some(caster) = self.casters.get(actor) else {
            return false;
        };
        self.health.is_alive(actor)
            && self.interrupts.can_cast(actor)
            && caster.machine.can_use_ability(ability.off_gcd)
            && (!ability.requires_stealth || self.stealth.can_use_stealth_ability(actor))
    }

    /// Uses an ability on `actor`'s current target. See
    /// [`CombatWorld::use_ability_on`].
    pub fn use_ability(&mut self, actor: EntityId, ability: &AbilitySpec) -> bool {
        self.use_ability_on(actor, ability, None)
    }

    /// Uses an ability: validates cast state, lockout and stealth, breaks
    /// stealth when the ability does, then starts the cast.
    ///
    /// The effect lands on `target`. Without one, damage goes to the actor's
    /// current target and healing to its selected ally, or itself.
    pub fn use_ability_on(
        &mut self,
        actor: EntityId,
        ability: &AbilitySpec,
        target: Option<EntityId>,
    ) -> bool {
        if !self.can_use_ability(actor, ability) {
            debug!("{actor} cannot use {} now", ability.id);
            return false;
        }
        let Some(caster) = self.casters.get_mut(actor) else {
            return false;
        };
        if !caster.machine.start_casting(
            ability.id,
            ability.cast_time,
            ability.triggers_gcd,
            ability.requires_stationary,
        ) {
            return false;
        }
        if ability.breaks_stealth {
            self.stealth.on_ability_used(actor);
        }
        if ability.is_instant() {
            self.pending.remove(actor);
            self.resolve(actor, ability, target);
        } else {
            let pending = PendingCast {
                ability: ability.clone(),
                target,
            };
            self.pending.insert(actor, pending);
        }
        true
    }

    fn resolve(&mut self, actor: EntityId, ability: &AbilitySpec, target: Option<EntityId>) {
        if !self.health.is_alive(actor) {
            return;
        }
        match ability.effect {
            AbilityEffect::None => {},
            AbilityEffect::Damage { base, school } => {
                let Some(target) = target.or_else(|| self.target_of(actor)) else {
                    debug!("{actor} has no target for {}", ability.id);
                    return;
                };
                self.strike(actor, target, base, school, ability.ranged, None);
            },
            AbilityEffect::Heal { base } => {
                let kind = self.health.kind(actor);
                let patient = target
                    .or_else(|| {
                        let selected = self.targets.get(actor).copied()?;
                        (self.health.kind(selected) == kind).then_some(selected)
                    })
                    .unwrap_or(actor);
                self.deal_healing(actor, patient, base, None);
            },
        }
    }

    /// Starts a cast without the world's validation.
    pub fn start_casting(
        &mut self,
        actor: EntityId,
        ability: AbilityId,
        duration: f32,
        triggers_gcd: bool,
        requires_stationary: bool,
    ) -> bool {
        self.pending.remove(actor);
        self.casters.get_mut(actor).is_some_and(|c| {
            c.machine
                .start_casting(ability, duration, triggers_gcd, requires_stationary)
        })
    }

    /// Cancels `actor`'s cast.
    pub fn interrupt_cast(&mut self, actor: EntityId) -> bool {
        self.pending.remove(actor);
        self.casters
            .get_mut(actor)
            .is_some_and(|c| c.machine.interrupt_cast())
    }

    /// Locks `actor` for `duration` seconds and drops its buffered input.
    pub fn lock(&mut self, actor: EntityId, duration: f32) -> bool {
        let locked = self
            .casters
            .get_mut(actor)
            .is_some_and(|c| c.lock(duration));
        if locked {
            self.pending.remove(actor);
        }
        locked
    }

    /// Reports that `actor` moved; cancels stationary casts only.
    pub fn on_movement_detected(&mut self, actor: EntityId) -> bool {
        let cancelled = self
            .casters
            .get_mut(actor)
            .is_some_and(|c| c.machine.on_movement_detected());
        if cancelled {
            self.pending.remove(actor);
        }
        cancelled
    }

    /// Cast state of `actor`.
    #[must_use]
    pub fn cast_state(&self, actor: EntityId) -> Option<CastState> {
        self.casters.get(actor).map(Caster::state)
    }

    /// Cast progress of `actor` in [0, 1].
    #[must_use]
    pub fn cast_progress(&self, actor: EntityId) -> f32 {
        self.casters
            .get(actor)
            .map_or(0.0, |c| c.machine.cast_progress())
    }

    /// Buffers an ability press.
    pub fn try_queue(&mut self, actor: EntityId, ability: AbilityId, slot: u8) -> bool {
        self.casters
            .get_mut(actor)
            .is_some_and(|c| c.try_queue(ability, slot))
    }

    /// Pops `actor`'s buffered ability.
    pub fn consume_queued_ability(&mut self, actor: EntityId) -> Option<QueuedIntent> {
        self.casters
            .get_mut(actor)
            .and_then(Caster::consume_queued_ability)
    }

    /// Discards `actor`'s buffered ability.
    pub fn clear_queue(&mut self, actor: EntityId) {
        if let Some(caster) = self.casters.get_mut(actor) {
            caster.queue.clear_queue();
        }
    }

    // ------------------------------------------------------------------------
    // Crowd Control
    // ------------------------------------------------------------------------

    /// Filters `base_duration` through diminishing returns only.
    pub fn apply_diminishing_returns(
        &mut self,
        target: EntityId,
        category: CrowdControl,
        base_duration: f32,
    ) -> f32 {
        self.diminishing.apply(target, category, base_duration)
    }

    /// Check if `target` is immune to `category`.
    #[must_use]
    pub fn is_immune(&self, target: EntityId, category: CrowdControl) -> bool {
        self.diminishing.is_immune(target, category)
    }

    /// Applies crowd control: DR first, then a lock for categories that stop
    /// casting. Returns the effective duration.
    pub fn apply_crowd_control(
        &mut self,
        target: EntityId,
        category: CrowdControl,
        base_duration: f32,
    ) -> f32 {
        if !self.health.is_alive(target) {
            return 0.0;
        }
        let duration = self.diminishing.apply(target, category, base_duration);
        if duration > 0.0 && category.locks_casting() {
            self.lock(target, duration);
        }
        duration
    }

    // ------------------------------------------------------------------------
    // Interrupts
    // ------------------------------------------------------------------------

    /// Interrupts `target`: cancels its cast and locks it out.
    pub fn interrupt(&mut self, interrupter: EntityId, target: EntityId) -> bool {
        if !self.health.is_alive(target) {
            return false;
        }
        self.interrupt_cast(target);
        self.interrupts.try_interrupt(interrupter, target)
    }

    /// Lockout only, leaving any cast running.
    pub fn try_interrupt(&mut self, interrupter: EntityId, target: EntityId) -> bool {
        self.interrupts.try_interrupt(interrupter, target)
    }

    /// Locks `target` out for `duration` seconds.
    pub fn apply_lockout(&mut self, target: EntityId, duration: f32) {
        self.interrupts.apply_lockout(target, duration);
    }

    /// Removes a lockout early.
    pub fn clear_lockout(&mut self, target: EntityId) {
        self.interrupts.clear_lockout(target);
    }

    /// Check if `target` is locked out.
    #[must_use]
    pub fn is_locked_out(&self, target: EntityId) -> bool {
        self.interrupts.is_locked_out(target)
    }

    // ------------------------------------------------------------------------
    // Stealth
    // ------------------------------------------------------------------------

    /// Enters stealth. Dead entities cannot stealth.
    pub fn try_enter_stealth(&mut self, entity: EntityId) -> bool {
        self.health.is_alive(entity) && self.stealth.try_enter_stealth(entity)
    }

    /// Breaks stealth for `reason`.
    pub fn break_stealth(&mut self, entity: EntityId, reason: StealthBreakReason) {
        self.stealth.break_stealth(entity, reason);
    }

    /// Reports that `entity` took damage outside the health manager.
    pub fn on_damage_received(&mut self, entity: EntityId) {
        self.stealth.on_damage_received(entity);
    }

    /// Reports that `entity` attacked.
    pub fn on_attack_performed(&mut self, entity: EntityId) {
        self.stealth.on_attack_performed(entity);
    }

    /// Check if `entity` is stealthed.
    #[must_use]
    pub fn is_stealthed(&self, entity: EntityId) -> bool {
        self.stealth.is_stealthed(entity)
    }

    /// Movement speed multiplier of `entity`.
    #[must_use]
    pub fn movement_speed_multiplier(&self, entity: EntityId) -> f32 {
        self.stealth.movement_speed_multiplier(entity)
    }

    // ------------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------------

    /// Advances every subsystem by `dt` seconds.
    ///
    /// Casters go first so a completed cast has started its global cooldown
    /// and landed its effect before anything else looks at cast state.
    /// Buffered abilities fire last, once every timer has moved.
    pub fn tick(&mut self, dt: f32) {
        if dt.is_nan() || dt < 0.0 {
            return;
        }
        let mut completed = Vec::new();
        for (actor, caster) in self.casters.iter_mut() {
            let casting = caster.machine.current_ability();
            caster.tick(dt);
            if casting.is_some() && caster.state() != CastState::Casting {
                completed.push(actor);
            }
        }
        for actor in completed {
            if let Some(cast) = self.pending.remove(actor) {
                self.resolve(actor, &cast.ability, cast.target);
            }
        }

        self.interrupts.tick(dt);
        self.diminishing.tick(dt);
        self.stealth.tick(dt);

        let (health, mut hooks) = self.parts(false);
        health.tick(dt, &mut hooks);

        self.fire_queued();
    }

    /// Casts buffered abilities whose caster can now use them.
    fn fire_queued(&mut self) {
        let ready: Vec<(EntityId, AbilitySpec)> = self
            .casters
            .iter()
            .filter_map(|(actor, caster)| {
                let intent = caster.queue.queued()?;
                let ability = self.abilities.get(&intent.ability)?;
                self.can_use_ability(actor, ability)
                    .then(|| (actor, ability.clone()))
            })
            .collect();
        for (actor, ability) in ready {
            if self.consume_queued_ability(actor).is_some() {
                self.use_ability(actor, &ability);
            }
        }
    }
}
