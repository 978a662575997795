//! Error types shared across Skirmish crates.
//!
//! Combat actions themselves never fail loudly: a rejected ability or a heal
//! on a corpse is an ordinary outcome reported through a `bool` or an event.
//! These types cover setup paths (registration and configuration) where the
//! caller must react.

use thiserror::Error;

use crate::ids::EntityId;

/// Top-level error type for Skirmish operations.
#[derive(Debug, Error)]
pub enum SkirmishError {
    /// Entity registration errors
    #[error("registration error: {0}")]
    Registration(#[from] RegistrationError),

    /// Configuration was rejected
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Errors raised when adding participants to the simulation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    /// The null id cannot be registered
    #[error("cannot register the null entity id")]
    NullEntity,

    /// Entity is already registered
    #[error("entity {0} is already registered")]
    AlreadyRegistered(EntityId),

    /// Max health must be positive and finite
    #[error("invalid max health {max_health} for entity {entity}")]
    InvalidMaxHealth {
        /// Entity being registered
        entity: EntityId,
        /// Rejected value
        max_health: f32,
    },
}
