//! Event bus for combat notifications.
//!
//! Every subsystem publishes into the same channel synchronously, inside the
//! call that caused the event. The host drains the bus once per frame and
//! forwards events to rendering or replication.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use skirmish_common::{AbilityId, EntityId};
use tracing::warn;

use crate::cast::CastState;
use crate::damage_calc::DamageType;
use crate::diminishing::CrowdControl;
use crate::stealth::StealthBreakReason;

/// Default channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 4096;

/// Outbound combat events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CombatEvent {
    /// Health reached zero
    EntityDied {
        /// Entity that died
        entity: EntityId,
    },
    /// Entity came back to life
    EntityResurrected {
        /// Entity resurrected
        entity: EntityId,
        /// Health after resurrection
        health: f32,
    },
    /// Every registered player is dead
    Wipe,
    /// Damage landed on a target
    DamageDealt {
        /// Target entity
        target: EntityId,
        /// Source entity (None for environmental damage)
        source: Option<EntityId>,
        /// Damage applied
        amount: f32,
        /// Damage school
        damage_type: DamageType,
        /// Target health after the hit
        remaining: f32,
    },
    /// Healing landed on a target
    HealingDone {
        /// Target entity
        target: EntityId,
        /// Healer (None for environmental healing)
        source: Option<EntityId>,
        /// Health actually restored
        amount: f32,
    },
    /// Entity entered combat
    CombatEntered {
        /// Entity ID
        entity: EntityId,
    },
    /// Entity dropped out of combat
    CombatLeft {
        /// Entity ID
        entity: EntityId,
    },
    /// Cast state machine transition
    StateChanged {
        /// Actor
        entity: EntityId,
        /// Previous state
        from: CastState,
        /// New state
        to: CastState,
    },
    /// Per-tick cast progress
    CastProgress {
        /// Actor
        entity: EntityId,
        /// Progress in [0, 1]
        progress: f32,
        /// Total cast time
        duration: f32,
    },
    /// Cast cancelled before completion
    CastInterrupted {
        /// Actor
        entity: EntityId,
        /// Ability that was being cast
        ability: AbilityId,
    },
    /// Cast finished
    CastCompleted {
        /// Actor
        entity: EntityId,
        /// Ability that completed
        ability: AbilityId,
    },
    /// Global cooldown started
    GlobalCooldownStarted {
        /// Actor
        entity: EntityId,
        /// GCD length
        duration: f32,
    },
    /// Actor locked by crowd control
    Locked {
        /// Actor
        entity: EntityId,
        /// Lock length
        duration: f32,
    },
    /// Actor released from a lock
    Unlocked {
        /// Actor
        entity: EntityId,
    },
    /// Ability buffered in the spell queue
    AbilityQueued {
        /// Actor
        entity: EntityId,
        /// Buffered ability
        ability: AbilityId,
        /// Action bar slot
        slot: u8,
    },
    /// Buffered ability popped by the host
    QueueConsumed {
        /// Actor
        entity: EntityId,
        /// Buffered ability
        ability: AbilityId,
        /// Action bar slot
        slot: u8,
    },
    /// Buffered ability discarded
    QueueCleared {
        /// Actor
        entity: EntityId,
    },
    /// Hostile switched targets
    AggroChanged {
        /// Hostile entity
        hostile: EntityId,
        /// New target
        target: EntityId,
    },
    /// Crowd control duration scaled by diminishing returns
    DrApplied {
        /// Target
        target: EntityId,
        /// CC category
        category: CrowdControl,
        /// DR level used (0 = full, 3 = immune)
        level: u8,
        /// Duration after scaling
        duration: f32,
    },
    /// Target became immune to a category
    ImmunityStarted {
        /// Target
        target: EntityId,
        /// CC category
        category: CrowdControl,
    },
    /// Immunity to a category ended
    ImmunityExpired {
        /// Target
        target: EntityId,
        /// CC category
        category: CrowdControl,
    },
    /// DR count reset after a quiet period
    DrReset {
        /// Target
        target: EntityId,
        /// CC category
        category: CrowdControl,
    },
    /// Interrupt landed
    InterruptLanded {
        /// Interrupting entity
        interrupter: EntityId,
        /// Interrupted entity
        target: EntityId,
    },
    /// Lockout started
    LockoutApplied {
        /// Locked-out entity
        target: EntityId,
        /// Lockout length
        duration: f32,
    },
    /// Lockout ended
    LockoutExpired {
        /// Previously locked-out entity
        target: EntityId,
    },
    /// Entity entered stealth
    StealthEntered {
        /// Entity ID
        entity: EntityId,
    },
    /// Entity left stealth
    StealthBroken {
        /// Entity ID
        entity: EntityId,
        /// Why stealth ended
        reason: StealthBreakReason,
    },
}

impl CombatEvent {
    /// Deaths, resurrections and wipes. These are never dropped.
    #[must_use]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::EntityDied { .. } | Self::EntityResurrected { .. } | Self::Wipe
        )
    }
}

/// Event bus for broadcasting events to the host.
///
/// The main channel is bounded. When it is full, ordinary events are dropped
/// with a warning. Lifecycle events (see [`CombatEvent::is_lifecycle`]) spill
/// into an unbounded overflow lane instead, so a host that falls behind still
/// sees every death and wipe. `drain` returns the main channel first, then the
/// overflow, which keeps publication order.
#[derive(Debug)]
pub struct EventBus {
    /// Senders handed to subsystems
    lanes: Lanes,
    /// Receiver for the bounded channel
    receiver: Receiver<CombatEvent>,
    /// Receiver for lifecycle events that did not fit
    overflow: Receiver<CombatEvent>,
    /// Channel capacity
    capacity: usize,
}

#[derive(Debug, Clone)]
struct Lanes {
    events: Sender<CombatEvent>,
    overflow: Sender<CombatEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    /// Creates a new event bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (events, receiver) = bounded(capacity);
        let (overflow_tx, overflow) = unbounded();
        Self {
            lanes: Lanes {
                events,
                overflow: overflow_tx,
            },
            receiver,
            overflow,
            capacity,
        }
    }

    /// Publishes an event to the bus.
    pub fn publish(&self, event: CombatEvent) {
        self.lanes.publish(event);
    }

    /// Drains all pending events.
    pub fn drain(&self) -> Vec<CombatEvent> {
        self.receiver
            .try_iter()
            .chain(self.overflow.try_iter())
            .collect()
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len() + self.overflow.len()
    }

    /// Returns the channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Creates a sender handle for a subsystem.
    #[must_use]
    pub fn sender(&self) -> EventSender {
        EventSender(Some(self.lanes.clone()))
    }
}

/// Publishing half held by each subsystem.
///
/// A detached sender (the default) silently discards events, which keeps
/// subsystems usable on their own in tests and tools.
#[derive(Debug, Clone, Default)]
pub struct EventSender(Option<Lanes>);

impl EventSender {
    /// Creates a sender that discards everything.
    #[must_use]
    pub const fn detached() -> Self {
        Self(None)
    }

    /// Returns true if connected to a bus.
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.0.is_some()
    }

    /// Publishes an event.
    pub fn emit(&self, event: CombatEvent) {
        if let Some(lanes) = &self.0 {
            lanes.publish(event);
        }
    }
}

impl Lanes {
    fn publish(&self, event: CombatEvent) {
        match self.events.try_send(event) {
            Ok(()) => {},
            Err(TrySendError::Full(event)) if event.is_lifecycle() => {
                warn!("event bus full, spilling {event:?} to overflow");
                let _ = self.overflow.send(event);
            },
            Err(TrySendError::Full(event)) => warn!("event bus full, dropping {event:?}"),
            Err(TrySendError::Disconnected(_)) => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_and_drain() {
        let bus = EventBus::new(8);
        let sender = bus.sender();
        sender.emit(CombatEvent::Wipe);
        bus.publish(CombatEvent::LockoutExpired {
            target: EntityId::from_raw(1),
        });

        assert_eq!(bus.pending_count(), 2);
        let events = bus.drain();
        assert_eq!(events[0], CombatEvent::Wipe);
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_full_bus_drops() {
        let bus = EventBus::new(1);
        let tank = EntityId::from_raw(1);
        bus.publish(CombatEvent::CombatEntered { entity: tank });
        bus.publish(CombatEvent::CombatLeft { entity: tank });
        assert_eq!(bus.drain(), vec![CombatEvent::CombatEntered { entity: tank }]);
    }

    #[test]
    fn test_full_bus_keeps_lifecycle_events() {
        let bus = EventBus::new(1);
        let sender = bus.sender();
        let tank = EntityId::from_raw(1);
        sender.emit(CombatEvent::CombatEntered { entity: tank });
        sender.emit(CombatEvent::StealthEntered { entity: tank });
        sender.emit(CombatEvent::EntityDied { entity: tank });
        sender.emit(CombatEvent::Wipe);

        assert_eq!(bus.pending_count(), 3);
        assert_eq!(
            bus.drain(),
            vec![
                CombatEvent::CombatEntered { entity: tank },
                CombatEvent::EntityDied { entity: tank },
                CombatEvent::Wipe,
            ]
        );
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_detached_sender_is_silent() {
        let sender = EventSender::detached();
        assert!(!sender.is_attached());
        sender.emit(CombatEvent::Wipe);
    }

    #[test]
    fn test_events_serialize_for_replication() {
        let event = CombatEvent::AggroChanged {
            hostile: EntityId::from_raw(100),
            target: EntityId::from_raw(1),
        };
        let json = serde_json::to_string(&event).expect("serialize");
        assert_eq!(json, r#"{"AggroChanged":{"hostile":100,"target":1}}"#);
        let back: CombatEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, event);
    }
}
