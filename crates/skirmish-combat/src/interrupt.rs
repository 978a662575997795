//! Interrupts and spell lockouts.
//!
//! A successful interrupt locks the target out of casting for a fixed time.
//! Lockouts are stored as expiry timestamps against the tracker's own clock,
//! which advances with [`InterruptSystem::tick`].

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use skirmish_common::EntityId;
use tracing::debug;

use crate::events::{CombatEvent, EventSender};

/// Interrupt tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterruptConfig {
    /// Lockout applied by an interrupt, in seconds.
    pub lockout_duration: f32,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            lockout_duration: 4.0,
        }
    }
}

/// Tracks lockout expiry per entity.
#[derive(Debug, Default)]
pub struct InterruptSystem {
    config: InterruptConfig,
    /// Seconds since the tracker was created.
    now: f64,
    /// Entity -> lockout expiry timestamp.
    lockouts: AHashMap<EntityId, f64>,
    events: EventSender,
}

impl InterruptSystem {
    /// Creates a tracker with the given tuning.
    #[must_use]
    pub fn new(config: InterruptConfig) -> Self {
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

    /// Current clock value in seconds.
    #[must_use]
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Interrupts `target`, locking it out for the configured duration.
    ///
    /// Always succeeds; checking that the target was actually casting is the
    /// caller's job.
    pub fn try_interrupt(&mut self, interrupter: EntityId, target: EntityId) -> bool {
        debug!("{interrupter} interrupted {target}");
        self.events
            .emit(CombatEvent::InterruptLanded { interrupter, target });
        self.apply_lockout(target, self.config.lockout_duration);
        true
    }

    /// Locks `target` out for `duration` seconds, replacing any current lockout.
    pub fn apply_lockout(&mut self, target: EntityId, duration: f32) {
        if duration.is_nan() || duration <= 0.0 {
            return;
        }
        self.lockouts
            .insert(target, self.now + f64::from(duration));
        debug!("lockout on {target} for {duration}s");
        self.events
            .emit(CombatEvent::LockoutApplied { target, duration });
    }

    /// Check if `target` is locked out.
    #[must_use]
    pub fn is_locked_out(&self, target: EntityId) -> bool {
        self.lockouts
            .get(&target)
            .is_some_and(|&expiry| self.now < expiry)
    }

    /// Seconds of lockout left, 0 if none.
    #[must_use]
    pub fn remaining(&self, target: EntityId) -> f32 {
        self.lockouts
            .get(&target)
            .map_or(0.0, |&expiry| (expiry - self.now).max(0.0) as f32)
    }

    /// Check if `target` may cast.
    #[must_use]
    pub fn can_cast(&self, target: EntityId) -> bool {
        !self.is_locked_out(target)
    }

    /// Removes a lockout early.
    pub fn clear_lockout(&mut self, target: EntityId) {
        if self.lockouts.remove(&target).is_some() {
            debug!("lockout cleared for {target}");
            self.events.emit(CombatEvent::LockoutExpired { target });
        }
    }

    /// Removes every lockout.
    pub fn clear_all(&mut self) {
        let mut targets: Vec<EntityId> = self.lockouts.drain().map(|(id, _)| id).collect();
        targets.sort_unstable();
        for target in targets {
            self.events.emit(CombatEvent::LockoutExpired { target });
        }
    }

    /// Number of lockouts still running.
    #[must_use]
    pub fn active_lockout_count(&self) -> usize {
        self.lockouts
            .values()
            .filter(|&&expiry| self.now < expiry)
            .count()
    }

    /// Advances the clock and evicts expired lockouts.
    pub fn tick(&mut self, dt: f32) {
        self.now += f64::from(dt);
        let now = self.now;

        let mut expired: Vec<EntityId> = self
            .lockouts
            .iter()
            .filter(|(_, &expiry)| now >= expiry)
            .map(|(&id, _)| id)
            .collect();
        expired.sort_unstable();

        for target in expired {
            self.lockouts.remove(&target);
            debug!("lockout expired for {target}");
            self.events.emit(CombatEvent::LockoutExpired { target });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;

    fn ids() -> (EntityId, EntityId) {
        (EntityId::from_raw(1), EntityId::from_raw(2))
    }

    #[test]
    fn test_interrupt_applies_lockout() {
        let (kicker, caster) = ids();
        let mut system = InterruptSystem::default();

        assert!(system.try_interrupt(kicker, caster));
        assert!(system.is_locked_out(caster));
        assert!(!system.can_cast(caster));
        assert_eq!(system.remaining(caster), 4.0);
        assert!(!system.is_locked_out(kicker));
    }

    #[test]
    fn test_lockout_expires_on_tick() {
        let bus = EventBus::new(16);
        let (kicker, caster) = ids();
        let mut system = InterruptSystem::default().with_events(bus.sender());

        system.try_interrupt(kicker, caster);
        system.tick(3.0);
        assert!(system.is_locked_out(caster));
        assert!((system.remaining(caster) - 1.0).abs() < 1e-6);

        system.tick(1.0);
        assert!(!system.is_locked_out(caster));
        assert_eq!(system.active_lockout_count(), 0);

        let events = bus.drain();
        assert_eq!(
            events,
            vec![
                CombatEvent::InterruptLanded {
                    interrupter: kicker,
                    target: caster
                },
                CombatEvent::LockoutApplied {
                    target: caster,
                    duration: 4.0
                },
                CombatEvent::LockoutExpired { target: caster },
            ]
        );
    }

    #[test]
    fn test_invalid_lockout_ignored() {
        let (_, caster) = ids();
        let mut system = InterruptSystem::default();
        system.apply_lockout(caster, 0.0);
        system.apply_lockout(caster, -2.0);
        assert!(!system.is_locked_out(caster));
        assert_eq!(system.remaining(caster), 0.0);
    }

    #[test]
    fn test_clear_lockout() {
        let bus = EventBus::new(16);
        let (_, caster) = ids();
        let mut system = InterruptSystem::default().with_events(bus.sender());
        system.apply_lockout(caster, 10.0);
        system.clear_lockout(caster);
        assert!(!system.is_locked_out(caster));
        assert_eq!(
            bus.drain().last(),
            Some(&CombatEvent::LockoutExpired { target: caster })
        );

        // Clearing twice is a no-op
        system.clear_lockout(caster);
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_clear_all() {
        let (a, b) = ids();
        let mut system = InterruptSystem::default();
        system.apply_lockout(a, 5.0);
        system.apply_lockout(b, 5.0);
        assert_eq!(system.active_lockout_count(), 2);
        system.clear_all();
        assert_eq!(system.active_lockout_count(), 0);
    }
}
