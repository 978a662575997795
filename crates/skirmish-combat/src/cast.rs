//! Cast and global cooldown state machine.
//!
//! Each actor owns one machine with four states:
//!
//! ```text
//! Idle ──start──▶ Casting ──complete──▶ Idle ──(triggers GCD)──▶ GlobalCooldown ──▶ Idle
//!   │               │ interrupt / move
//!   │               ▼
//!   └──────────▶ Locked ──expire / unlock──▶ Idle
//! ```
//!
//! Timed states count down in [`CastStateMachine::tick`]; nothing blocks.

use serde::{Deserialize, Serialize};
use skirmish_common::{AbilityId, EntityId};
use tracing::debug;

use crate::damage_calc::DamageType;
use crate::events::{CombatEvent, EventSender};

// ============================================================================
// State
// ============================================================================

/// Cast state of one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CastState {
    /// Free to act.
    #[default]
    Idle,
    /// Channeling a cast-time ability.
    Casting,
    /// Waiting out the shared cooldown.
    GlobalCooldown,
    /// Crowd controlled.
    Locked,
}

impl CastState {
    /// Check if the state counts down on its own.
    #[must_use]
    pub fn is_timed(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Check if abilities can be buffered during this state.
    #[must_use]
    pub fn accepts_queue(&self) -> bool {
        matches!(self, Self::Casting | Self::GlobalCooldown)
    }
}

/// Cast tuning shared by every actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CastConfig {
    /// Global cooldown length in seconds.
    pub global_cooldown: f32,
    /// Trailing window in which inputs may be buffered.
    pub spell_queue_window: f32,
}

impl Default for CastConfig {
    fn default() -> Self {
        Self {
            global_cooldown: 1.5,
            spell_queue_window: 0.4,
        }
    }
}

// ============================================================================
// Ability Content
// ============================================================================

/// Health change an ability makes when it lands.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum AbilityEffect {
    /// Nothing beyond the cast itself.
    #[default]
    None,
    /// Damage scaled by the caster's stats.
    Damage {
        /// Unscaled amount
        base: f32,
        /// Damage school
        school: DamageType,
    },
    /// Healing scaled by the caster's stats.
    Heal {
        /// Unscaled amount
        base: f32,
    },
}

/// Externally supplied ability parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilitySpec {
    /// Ability reference.
    pub id: AbilityId,
    /// Cast time in seconds (0 = instant).
    #[serde(default)]
    pub cast_time: f32,
    /// Whether the ability starts the global cooldown.
    #[serde(default = "default_true")]
    pub triggers_gcd: bool,
    /// Whether moving cancels the cast.
    #[serde(default)]
    pub requires_stationary: bool,
    /// Whether the ability may be used during the global cooldown.
    #[serde(default)]
    pub off_gcd: bool,
    /// Whether using the ability breaks stealth.
    #[serde(default = "default_true")]
    pub breaks_stealth: bool,
    /// Whether the ability can only be used from stealth.
    #[serde(default)]
    pub requires_stealth: bool,
    /// Applied to the target when the cast completes.
    #[serde(default)]
    pub effect: AbilityEffect,
    /// Whether damage from this ability counts as ranged threat.
    #[serde(default)]
    pub ranged: bool,
}

fn default_true() -> bool {
    true
}

impl AbilitySpec {
    /// Creates an instant, GCD-triggering ability.
    #[must_use]
    pub fn instant(id: AbilityId) -> Self {
        Self {
            id,
            cast_time: 0.0,
            triggers_gcd: true,
            requires_stationary: false,
            off_gcd: false,
            breaks_stealth: true,
            requires_stealth: false,
            effect: AbilityEffect::None,
            ranged: false,
        }
    }

    /// Creates a stationary cast-time ability.
    #[must_use]
    pub fn cast(id: AbilityId, cast_time: f32) -> Self {
        Self {
            cast_time,
            requires_stationary: true,
            ..Self::instant(id)
        }
    }

    /// Marks the ability as usable during the global cooldown.
    #[must_use]
    pub fn off_gcd(mut self) -> Self {
        self.off_gcd = true;
        self.triggers_gcd = false;
        self
    }

    /// Marks the ability as stealth-only.
    #[must_use]
    pub fn from_stealth(mut self) -> Self {
        self.requires_stealth = true;
        self
    }

    /// Deals `base` damage of `school` on completion.
    #[must_use]
    pub fn dealing(mut self, base: f32, school: DamageType) -> Self {
        self.effect = AbilityEffect::Damage { base, school };
        self
    }

    /// Heals for `base` on completion.
    #[must_use]
    pub fn healing(mut self, base: f32) -> Self {
        self.effect = AbilityEffect::Heal { base };
        self
    }

    /// Records damage from this ability as ranged threat.
    #[must_use]
    pub fn ranged(mut self) -> Self {
        self.ranged = true;
        self
    }

    /// Check if the ability finishes in the same call that starts it.
    #[must_use]
    pub fn is_instant(&self) -> bool {
        self.cast_time.is_nan() || self.cast_time <= 0.0
    }

    /// Sets whether the ability breaks stealth.
    #[must_use]
    pub fn with_breaks_stealth(mut self, breaks: bool) -> Self {
        self.breaks_stealth = breaks;
        self
    }
}

// ============================================================================
// State Machine
// ============================================================================

/// Per-actor cast state machine.
#[derive(Debug, Clone)]
pub struct CastStateMachine {
    entity: EntityId,
    state: CastState,
    /// Time left in the current timed state.
    remaining: f32,
    /// Total length of the current cast.
    cast_duration: f32,
    ability: Option<AbilityId>,
    triggers_gcd: bool,
    requires_stationary: bool,
    gcd_duration: f32,
    events: EventSender,
}

impl CastStateMachine {
    /// Creates an idle machine for `entity`.
    #[must_use]
    pub fn new(entity: EntityId, gcd_duration: f32) -> Self {
        Self {
            entity,
            state: CastState::Idle,
            remaining: 0.0,
            cast_duration: 0.0,
            ability: None,
            triggers_gcd: false,
            requires_stationary: false,
            gcd_duration,
            events: EventSender::detached(),
        }
    }

    /// Connects the machine to an event bus.
    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    /// Owning actor.
    #[must_use]
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CastState {
        self.state
    }

    /// Time left in the current state, 0 when idle.
    #[must_use]
    pub fn state_time_remaining(&self) -> f32 {
        self.remaining
    }

    /// Ability being cast.
    #[must_use]
    pub fn current_ability(&self) -> Option<AbilityId> {
        self.ability
    }

    /// Total cast time of the current cast.
    #[must_use]
    pub fn cast_duration(&self) -> f32 {
        self.cast_duration
    }

    /// Cast progress in [0, 1]. Returns 1 when not casting.
    #[must_use]
    pub fn cast_progress(&self) -> f32 {
        if self.state == CastState::Casting && self.cast_duration > 0.0 {
            (1.0 - self.remaining / self.cast_duration).clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    /// Check if the current cast is cancelled by movement.
    #[must_use]
    pub fn is_stationary_cast(&self) -> bool {
        self.state == CastState::Casting && self.requires_stationary
    }

    /// Global cooldown length used by this machine.
    #[must_use]
    pub fn gcd_duration(&self) -> f32 {
        self.gcd_duration
    }

    /// Check if an ability may be used now.
    ///
    /// `off_gcd` abilities are allowed during the global cooldown; nothing is
    /// allowed while casting or locked.
    #[must_use]
    pub fn can_use_ability(&self, off_gcd: bool) -> bool {
        match self.state {
            CastState::Idle => true,
            CastState::GlobalCooldown => off_gcd,
            CastState::Casting | CastState::Locked => false,
        }
    }

    /// Starts an ability.
    ///
    /// A non-positive duration completes immediately. Rejected while casting
    /// or locked.
    pub fn start_casting(
        &mut self,
        ability: AbilityId,
        duration: f32,
        triggers_gcd: bool,
        requires_stationary: bool,
    ) -> bool {
        if matches!(self.state, CastState::Casting | CastState::Locked) {
            return false;
        }

        if duration.is_nan() || duration <= 0.0 {
            debug!("{} instant {ability}", self.entity);
            self.events.emit(CombatEvent::CastCompleted {
                entity: self.entity,
                ability,
            });
            if triggers_gcd {
                self.start_gcd();
            }
            return true;
        }

        self.ability = Some(ability);
        self.cast_duration = duration;
        self.remaining = duration;
        self.triggers_gcd = triggers_gcd;
        self.requires_stationary = requires_stationary;
        self.transition(CastState::Casting);
        true
    }

    /// Cancels the current cast. No-op outside `Casting`.
    pub fn interrupt_cast(&mut self) -> bool {
        if self.state != CastState::Casting {
            return false;
        }
        let ability = self.clear_cast();
        self.transition(CastState::Idle);
        if let Some(ability) = ability {
            self.events.emit(CombatEvent::CastInterrupted {
                entity: self.entity,
                ability,
            });
        }
        true
    }

    /// Starts the global cooldown. Ignored while locked.
    pub fn start_gcd(&mut self) {
        if self.state == CastState::Locked {
            return;
        }
        self.remaining = self.gcd_duration;
        self.transition(CastState::GlobalCooldown);
        self.events.emit(CombatEvent::GlobalCooldownStarted {
            entity: self.entity,
            duration: self.gcd_duration,
        });
    }

    /// Forces `Locked` for `duration` seconds, cancelling any cast first.
    pub fn lock(&mut self, duration: f32) -> bool {
        if duration.is_nan() || duration <= 0.0 {
            return false;
        }

        if self.state == CastState::Casting {
            if let Some(ability) = self.clear_cast() {
                self.events.emit(CombatEvent::CastInterrupted {
                    entity: self.entity,
                    ability,
                });
            }
        }

        self.remaining = duration;
        self.transition(CastState::Locked);
        self.events.emit(CombatEvent::Locked {
            entity: self.entity,
            duration,
        });
        true
    }

    /// Releases a lock early. No-op if not locked.
    pub fn unlock(&mut self) -> bool {
        if self.state != CastState::Locked {
            return false;
        }
        self.remaining = 0.0;
        self.transition(CastState::Idle);
        self.events.emit(CombatEvent::Unlocked {
            entity: self.entity,
        });
        true
    }

    /// Cancels the cast if it requires standing still.
    pub fn on_movement_detected(&mut self) -> bool {
        if !self.is_stationary_cast() {
            return false;
        }
        self.interrupt_cast()
    }

    /// Returns to `Idle` without firing cast events.
    pub fn reset(&mut self) {
        self.clear_cast();
        self.remaining = 0.0;
        self.transition(CastState::Idle);
    }

    /// Advances timers by `dt` seconds.
    pub fn tick(&mut self, dt: f32) {
        match self.state {
            CastState::Idle => {},
            CastState::Casting => self.tick_casting(dt),
            CastState::GlobalCooldown => {
                self.remaining -= dt;
                if self.remaining <= 0.0 {
                    self.remaining = 0.0;
                    self.transition(CastState::Idle);
                }
            },
            CastState::Locked => {
                self.remaining -= dt;
                if self.remaining <= 0.0 {
                    self.remaining = 0.0;
                    self.transition(CastState::Idle);
                    self.events.emit(CombatEvent::Unlocked {
                        entity: self.entity,
                    });
                }
            },
        }
    }

    fn tick_casting(&mut self, dt: f32) {
        self.remaining -= dt;
        self.events.emit(CombatEvent::CastProgress {
            entity: self.entity,
            progress: self.cast_progress(),
            duration: self.cast_duration,
        });

        if self.remaining > 0.0 {
            return;
        }

        let triggers_gcd = self.triggers_gcd;
        let ability = self.clear_cast();
        self.remaining = 0.0;
        if let Some(ability) = ability {
            debug!("{} completed {ability}", self.entity);
            self.events.emit(CombatEvent::CastCompleted {
                entity: self.entity,
                ability,
            });
        }
        self.transition(CastState::Idle);

        if triggers_gcd {
            self.start_gcd();
        }
    }

    fn clear_cast(&mut self) -> Option<AbilityId> {
        self.cast_duration = 0.0;
        self.triggers_gcd = false;
        self.requires_stationary = false;
        self.ability.take()
    }

    fn transition(&mut self, to: CastState) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        debug!("{} {from:?} -> {to:?}", self.entity);
        self.events.emit(CombatEvent::StateChanged {
            entity: self.entity,
            from,
            to,
        });
    }
}
