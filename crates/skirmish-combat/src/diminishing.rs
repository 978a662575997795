//! Diminishing returns on crowd control.
//!
//! Each (target, category) pair counts recent applications. The count picks
//! a duration multiplier from `[100%, 50%, 25%, 0%]`; the third application
//! makes the target immune to that category for a fixed time. A category
//! that goes unapplied for the reset interval starts over at 100%.

use serde::{Deserialize, Serialize};
use skirmish_common::EntityId;
use tracing::debug;

use crate::arena::EntityArena;
use crate::events::{CombatEvent, EventSender};

/// Applications needed before the target turns immune.
pub const IMMUNITY_THRESHOLD: u8 = 3;

/// Crowd-control categories tracked independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrowdControl {
    /// Movement slow
    Slow,
    /// Stun
    Stun,
    /// Fear
    Fear,
    /// Root
    Root,
    /// Silence
    Silence,
}

impl CrowdControl {
    /// All categories in index order.
    pub const ALL: [Self; 5] = [Self::Slow, Self::Stun, Self::Fear, Self::Root, Self::Silence];

    /// Check if this category stops the target from casting.
    #[must_use]
    pub const fn locks_casting(self) -> bool {
        matches!(self, Self::Stun | Self::Fear | Self::Silence)
    }

    const fn index(self) -> usize {
        match self {
            Self::Slow => 0,
            Self::Stun => 1,
            Self::Fear => 2,
            Self::Root => 3,
            Self::Silence => 4,
        }
    }
}

/// Diminishing returns tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiminishingConfig {
    /// Seconds without an application before the count resets.
    pub reset_interval: f32,
    /// Seconds of immunity after the third application.
    pub immunity_duration: f32,
    /// Duration multipliers by application count.
    pub multipliers: [f32; 4],
}

impl Default for DiminishingConfig {
    fn default() -> Self {
        Self {
            reset_interval: 15.0,
            immunity_duration: 15.0,
            multipliers: [1.0, 0.5, 0.25, 0.0],
        }
    }
}

/// DR state of one category on one target.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DrState {
    /// Applications since the last reset (0-3).
    pub count: u8,
    /// Seconds since the last application.
    pub since_last: f32,
    /// Whether the target is immune.
    pub immune: bool,
    /// Seconds of immunity left.
    pub immunity_remaining: f32,
}

impl DrState {
    fn is_fresh(&self) -> bool {
        self.count == 0 && !self.immune
    }
}

#[derive(Debug, Clone, Default)]
struct TargetDr {
    categories: [DrState; CrowdControl::ALL.len()],
}

impl TargetDr {
    fn is_fresh(&self) -> bool {
        self.categories.iter().all(DrState::is_fresh)
    }
}

/// Tracks diminishing returns for every target.
#[derive(Debug, Default)]
pub struct DiminishingReturns {
    config: DiminishingConfig,
    targets: EntityArena<TargetDr>,
    events: EventSender,
}

impl DiminishingReturns {
    /// Creates a tracker with the given tuning.
    #[must_use]
    pub fn new(config: DiminishingConfig) -> Self {
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

    /// Returns the tuning in use.
    #[must_use]
    pub fn config(&self) -> &DiminishingConfig {
        &self.config
    }

    /// Scales `base_duration` by the target's DR level and records the application.
    ///
    /// Returns 0 while the target is immune. Non-positive durations return 0
    /// without being recorded.
    pub fn apply(&mut self, target: EntityId, category: CrowdControl, base_duration: f32) -> f32 {
        if base_duration.is_nan() || base_duration <= 0.0 {
            return 0.0;
        }

        let immunity_duration = self.config.immunity_duration;
        let multipliers = self.config.multipliers;
        let state = &mut self
            .targets
            .get_or_insert_with(target, TargetDr::default)
            .categories[category.index()];

        if state.immune {
            debug!("{target} is immune to {category:?}");
            self.events.emit(CombatEvent::DrApplied {
                target,
                category,
                level: IMMUNITY_THRESHOLD,
                duration: 0.0,
            });
            return 0.0;
        }

        let level = state.count.min(IMMUNITY_THRESHOLD);
        let multiplier = multipliers[usize::from(level)];
        let duration = base_duration * multiplier;

        state.count = state.count.saturating_add(1);
        state.since_last = 0.0;
        let now_immune = state.count >= IMMUNITY_THRESHOLD;
        if now_immune {
            state.immune = true;
            state.immunity_remaining = immunity_duration;
        }

        debug!(
            "{category:?} on {target}: level {level}, x{multiplier}, {base_duration}s -> {duration}s"
        );
        self.events.emit(CombatEvent::DrApplied {
            target,
            category,
            level,
            duration,
        });
        if now_immune {
            debug!("{target} immune to {category:?} for {immunity_duration}s");
            self.events
                .emit(CombatEvent::ImmunityStarted { target, category });
        }

        duration
    }

    /// Returns the state of one category, if tracked.
    #[must_use]
    pub fn state(&self, target: EntityId, category: CrowdControl) -> Option<DrState> {
        self.targets
            .get(target)
            .map(|dr| dr.categories[category.index()])
    }

    /// Check if a target is immune to a category.
    #[must_use]
    pub fn is_immune(&self, target: EntityId, category: CrowdControl) -> bool {
        self.state(target, category).is_some_and(|s| s.immune)
    }

    /// DR level: 0 = full duration, 1 = 50%, 2 = 25%, 3 = immune.
    #[must_use]
    pub fn dr_level(&self, target: EntityId, category: CrowdControl) -> u8 {
        match self.state(target, category) {
            Some(s) if s.immune => IMMUNITY_THRESHOLD,
            Some(s) => s.count.min(IMMUNITY_THRESHOLD),
            None => 0,
        }
    }

    /// Multiplier the next application would receive.
    #[must_use]
    pub fn duration_multiplier(&self, target: EntityId, category: CrowdControl) -> f32 {
        self.config.multipliers[usize::from(self.dr_level(target, category))]
    }

    /// Seconds of immunity left, 0 if not immune.
    #[must_use]
    pub fn immunity_remaining(&self, target: EntityId, category: CrowdControl) -> f32 {
        match self.state(target, category) {
            Some(s) if s.immune => s.immunity_remaining,
            _ => 0.0,
        }
    }

    /// Number of targets with any DR tracked.
    #[must_use]
    pub fn tracked_targets(&self) -> usize {
        self.targets.len()
    }

    /// Forgets every category for a target (death, zone change).
    pub fn clear_target(&mut self, target: EntityId) {
        if self.targets.remove(target).is_some() {
            debug!("cleared DR tracking for {target}");
        }
    }

    /// Advances immunity and reset timers.
    pub fn tick(&mut self, dt: f32) {
        let reset_interval = self.config.reset_interval;
        let events = &self.events;

        self.targets.retain(|target, dr| {
            for category in CrowdControl::ALL {
                let state = &mut dr.categories[category.index()];
                if state.immune {
                    state.immunity_remaining -= dt;
                    if state.immunity_remaining <= 0.0 {
                        *state = DrState::default();
                        debug!("immunity to {category:?} expired for {target}");
                        events.emit(CombatEvent::ImmunityExpired { target, category });
                    }
                } else if state.count > 0 {
                    state.since_last += dt;
                    if state.since_last >= reset_interval {
                        *state = DrState::default();
                        debug!("DR reset for {target} against {category:?}");
                        events.emit(CombatEvent::DrReset { target, category });
                    }
                }
            }
            !dr.is_fresh()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;

    fn target() -> EntityId {
        EntityId::from_raw(7)
    }

    #[test]
    fn test_dr_sequence() {
        let mut dr = DiminishingReturns::default();
        let durations: Vec<f32> = (0..4)
            .map(|_| dr.apply(target(), CrowdControl::Stun, 4.0))
            .collect();

        assert_eq!(durations, vec![4.0, 2.0, 1.0, 0.0]);
        assert!(dr.is_immune(target(), CrowdControl::Stun));
        assert_eq!(dr.dr_level(target(), CrowdControl::Stun), 3);
    }

    #[test]
    fn test_third_application_grants_immunity() {
        let mut dr = DiminishingReturns::default();
        dr.apply(target(), CrowdControl::Fear, 6.0);
        dr.apply(target(), CrowdControl::Fear, 6.0);
        assert!(!dr.is_immune(target(), CrowdControl::Fear));
        dr.apply(target(), CrowdControl::Fear, 6.0);
        assert!(dr.is_immune(target(), CrowdControl::Fear));
        assert_eq!(dr.immunity_remaining(target(), CrowdControl::Fear), 15.0);
    }

    #[test]
    fn test_categories_are_independent() {
        let mut dr = DiminishingReturns::default();
        dr.apply(target(), CrowdControl::Stun, 4.0);
        dr.apply(target(), CrowdControl::Stun, 4.0);
        assert_eq!(dr.apply(target(), CrowdControl::Root, 4.0), 4.0);
        assert_eq!(dr.duration_multiplier(target(), CrowdControl::Stun), 0.25);
    }

    #[test]
    fn test_reset_after_quiet_interval() {
        let mut dr = DiminishingReturns::default();
        dr.apply(target(), CrowdControl::Stun, 4.0);
        dr.apply(target(), CrowdControl::Stun, 4.0);

        for _ in 0..15 {
            dr.tick(1.0);
        }
        assert_eq!(dr.dr_level(target(), CrowdControl::Stun), 0);
        assert_eq!(dr.apply(target(), CrowdControl::Stun, 4.0), 4.0);
    }

    #[test]
    fn test_no_reset_before_interval() {
        let mut dr = DiminishingReturns::default();
        dr.apply(target(), CrowdControl::Slow, 4.0);
        dr.tick(14.0);
        assert_eq!(dr.apply(target(), CrowdControl::Slow, 4.0), 2.0);
    }

    #[test]
    fn test_immunity_expires() {
        let bus = EventBus::new(64);
        let mut dr = DiminishingReturns::default().with_events(bus.sender());
        for _ in 0..3 {
            dr.apply(target(), CrowdControl::Stun, 2.0);
        }
        dr.tick(10.0);
        assert!(dr.is_immune(target(), CrowdControl::Stun));
        dr.tick(5.0);
        assert!(!dr.is_immune(target(), CrowdControl::Stun));
        assert_eq!(dr.apply(target(), CrowdControl::Stun, 2.0), 2.0);

        let events = bus.drain();
        assert!(events.contains(&CombatEvent::ImmunityStarted {
            target: target(),
            category: CrowdControl::Stun,
        }));
        assert!(events.contains(&CombatEvent::ImmunityExpired {
            target: target(),
            category: CrowdControl::Stun,
        }));
    }

    #[test]
    fn test_immune_attempt_is_reported() {
        let bus = EventBus::new(64);
        let mut dr = DiminishingReturns::default().with_events(bus.sender());
        for _ in 0..3 {
            dr.apply(target(), CrowdControl::Root, 2.0);
        }
        bus.drain();
        assert_eq!(dr.apply(target(), CrowdControl::Root, 2.0), 0.0);
        assert_eq!(
            bus.drain(),
            vec![CombatEvent::DrApplied {
                target: target(),
                category: CrowdControl::Root,
                level: 3,
                duration: 0.0,
            }]
        );
    }

    #[test]
    fn test_invalid_duration_not_recorded() {
        let mut dr = DiminishingReturns::default();
        assert_eq!(dr.apply(target(), CrowdControl::Stun, 0.0), 0.0);
        assert_eq!(dr.apply(target(), CrowdControl::Stun, -1.0), 0.0);
        assert_eq!(dr.tracked_targets(), 0);
    }

    #[test]
    fn test_clear_target_and_eviction() {
        let mut dr = DiminishingReturns::default();
        dr.apply(target(), CrowdControl::Stun, 4.0);
        dr.apply(target(), CrowdControl::Fear, 4.0);
        dr.clear_target(target());
        assert_eq!(dr.tracked_targets(), 0);
        assert_eq!(dr.apply(target(), CrowdControl::Stun, 4.0), 4.0);

        dr.tick(15.0);
        assert_eq!(dr.tracked_targets(), 0);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn dr_sequence_scales_any_duration(
                base in 0.1f32..120.0,
                extra in 0usize..6,
                gap in 0.0f32..14.0,
            ) {
                let mut dr = DiminishingReturns::default();
                let mut durations = Vec::new();
                for _ in 0..4 + extra {
                    durations.push(dr.apply(target(), CrowdControl::Silence, base));
                    dr.tick(gap / 8.0);
                }
                prop_assert_eq!(durations[0], base);
                prop_assert_eq!(durations[1], base * 0.5);
                prop_assert_eq!(durations[2], base * 0.25);
                prop_assert!(durations[3..].iter().all(|&d| d == 0.0));
            }

            #[test]
            fn dr_never_lengthens(
                bases in proptest::collection::vec(0.0f32..30.0, 1..12),
                dt in 0.0f32..20.0,
            ) {
                let mut dr = DiminishingReturns::default();
                for base in bases {
                    let applied = dr.apply(target(), CrowdControl::Stun, base);
                    prop_assert!(applied >= 0.0 && applied <= base);
                    dr.tick(dt);
                }
            }
        }
    }
}
