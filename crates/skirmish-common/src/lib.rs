//! # Skirmish Common
//!
//! Shared identifiers and error types for the Skirmish combat core:
//! - ID types (EntityId, AbilityId)
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod ids;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::ids::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_generation() {
        let id1 = EntityId::new();
        let id2 = EntityId::new();
        assert_ne!(id1, id2);
        assert!(id1.is_valid());
        assert!(!EntityId::NULL.is_valid());
    }

    #[test]
    fn test_entity_id_raw_roundtrip() {
        let id = EntityId::from_raw(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(id.to_string(), "#42");
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&AbilityId::new(7)).expect("serialize");
        assert_eq!(json, "7");
        let back: AbilityId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.raw(), 7);
    }

    #[test]
    fn test_registration_error_wraps() {
        let err: SkirmishError = RegistrationError::AlreadyRegistered(EntityId::from_raw(3)).into();
        assert_eq!(
            err.to_string(),
            "registration error: entity #3 is already registered"
        );
    }
}
