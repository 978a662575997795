//! Setup errors for the combat core.
//!
//! Gameplay calls never fail loudly; they return `bool`/`Option` or do
//! nothing. Only registration and configuration produce errors.

use skirmish_common::{RegistrationError, SkirmishError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by the combat core.
#[derive(Debug, Error)]
pub enum CombatError {
    /// Entity registration rejected
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for combat setup operations.
pub type CombatResult<T> = Result<T, CombatError>;

impl From<CombatError> for SkirmishError {
    fn from(err: CombatError) -> Self {
        match err {
            CombatError::Registration(e) => Self::Registration(e),
            CombatError::Config(e) => Self::Config(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_common::EntityId;

    #[test]
    fn test_registration_error_converts() {
        let err: CombatError = RegistrationError::AlreadyRegistered(EntityId::from_raw(4)).into();
        assert_eq!(err.to_string(), "entity #4 is already registered");

        let top: SkirmishError = err.into();
        assert!(matches!(top, SkirmishError::Registration(_)));
    }

    #[test]
    fn test_config_error_converts() {
        let err: CombatError = ConfigError::Invalid("cast.global_cooldown = 0".to_string()).into();
        let top: SkirmishError = err.into();
        assert!(matches!(top, SkirmishError::Config(msg) if msg.contains("global_cooldown")));
    }
}
