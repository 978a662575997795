//! Input buffering on top of a cast state machine.
//!
//! A player pressing the next ability slightly before the current cast or
//! global cooldown ends gets it buffered instead of rejected. Only one
//! intent is kept; the newest press wins.

use serde::{Deserialize, Serialize};
use skirmish_common::{AbilityId, EntityId};
use tracing::debug;

use crate::cast::{CastConfig, CastState, CastStateMachine};
use crate::events::{CombatEvent, EventSender};

/// A buffered ability press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedIntent {
    /// Ability to fire.
    pub ability: AbilityId,
    /// Action bar slot it came from.
    pub slot: u8,
}

/// One-slot input buffer.
#[derive(Debug, Clone)]
pub struct SpellQueue {
    entity: EntityId,
    window: f32,
    queued: Option<QueuedIntent>,
    events: EventSender,
}

impl SpellQueue {
    /// Creates an empty queue with the given buffer window.
    #[must_use]
    pub fn new(entity: EntityId, window: f32) -> Self {
        Self {
            entity,
            window,
            queued: None,
            events: EventSender::detached(),
        }
    }

    /// Connects the queue to an event bus.
    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    /// Buffer window in seconds.
    #[must_use]
    pub fn window(&self) -> f32 {
        self.window
    }

    /// Check if `machine` is in the trailing buffer window of a cast or GCD.
    #[must_use]
    pub fn is_within_buffer_window(&self, machine: &CastStateMachine) -> bool {
        machine.state().accepts_queue() && machine.state_time_remaining() <= self.window
    }

    /// Buffers an ability, replacing any earlier one.
    pub fn try_queue(&mut self, machine: &CastStateMachine, ability: AbilityId, slot: u8) -> bool {
        if !self.is_within_buffer_window(machine) {
            return false;
        }

        self.queued = Some(QueuedIntent { ability, slot });
        debug!("{} queued {ability} from slot {slot}", self.entity);
        self.events.emit(CombatEvent::AbilityQueued {
            entity: self.entity,
            ability,
            slot,
        });
        true
    }

    /// Pops the buffered ability.
    pub fn consume_queued_ability(&mut self) -> Option<QueuedIntent> {
        let intent = self.queued.take()?;
        self.events.emit(CombatEvent::QueueConsumed {
            entity: self.entity,
            ability: intent.ability,
            slot: intent.slot,
        });
        Some(intent)
    }

    /// Discards the buffered ability, if any.
    pub fn clear_queue(&mut self) {
        if self.queued.take().is_some() {
            self.events.emit(CombatEvent::QueueCleared {
                entity: self.entity,
            });
        }
    }

    /// Check if an ability is buffered.
    #[must_use]
    pub fn has_queued(&self) -> bool {
        self.queued.is_some()
    }

    /// The buffered ability without consuming it.
    #[must_use]
    pub fn queued(&self) -> Option<QueuedIntent> {
        self.queued
    }

    /// Slot of the buffered ability.
    #[must_use]
    pub fn queued_slot(&self) -> Option<u8> {
        self.queued.map(|q| q.slot)
    }
}

// ============================================================================
// Caster
// ============================================================================

/// State machine and input buffer of one actor.
///
/// All state changes that affect the buffer go through here so a lock always
/// discards the buffered intent.
#[derive(Debug, Clone)]
pub struct Caster {
    /// Cast state machine.
    pub machine: CastStateMachine,
    /// Input buffer.
    pub queue: SpellQueue,
}

impl Caster {
    /// Creates an idle caster.
    #[must_use]
    pub fn new(entity: EntityId, config: &CastConfig, events: &EventSender) -> Self {
        Self {
            machine: CastStateMachine::new(entity, config.global_cooldown)
                .with_events(events.clone()),
            queue: SpellQueue::new(entity, config.spell_queue_window).with_events(events.clone()),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CastState {
        self.machine.state()
    }

    /// Buffers an ability against this caster's machine.
    pub fn try_queue(&mut self, ability: AbilityId, slot: u8) -> bool {
        self.queue.try_queue(&self.machine, ability, slot)
    }

    /// Pops the buffered ability.
    pub fn consume_queued_ability(&mut self) -> Option<QueuedIntent> {
        self.queue.consume_queued_ability()
    }

    /// Locks the caster and drops any buffered input.
    pub fn lock(&mut self, duration: f32) -> bool {
        if !self.machine.lock(duration) {
            return false;
        }
        self.queue.clear_queue();
        true
    }

    /// Returns to idle and drops any buffered input.
    pub fn reset(&mut self) {
        self.machine.reset();
        self.queue.clear_queue();
    }

    /// Advances the state machine.
    pub fn tick(&mut self, dt: f32) {
        self.machine.tick(dt);
    }
}
