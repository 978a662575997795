//! Combat configuration.
//!
//! One TOML section per subsystem. Every field has a default, so a file
//! only needs the values it overrides:
//!
//! ```toml
//! [threat]
//! switch_policy = "ByContributorRange"
//!
//! [cast]
//! global_cooldown = 1.0
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::cast::CastConfig;
use crate::damage_calc::DamageConfig;
use crate::diminishing::DiminishingConfig;
use crate::health::HealthConfig;
use crate::interrupt::InterruptConfig;
use crate::stealth::StealthConfig;
use crate::threat::ThreatConfig;

/// Errors raised while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("config io error: {0}")]
    Io(#[from] io::Error),
    /// File is not valid TOML for this schema
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Config could not be serialized
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// A value is out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tuning for every combat subsystem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Health and mortality.
    pub health: HealthConfig,
    /// Threat tables.
    pub threat: ThreatConfig,
    /// Cast state machine and spell queue.
    pub cast: CastConfig,
    /// Diminishing returns.
    pub diminishing: DiminishingConfig,
    /// Interrupt lockouts.
    pub interrupt: InterruptConfig,
    /// Stealth.
    pub stealth: StealthConfig,
    /// Damage formulas.
    pub damage: DamageConfig,
}

impl CombatConfig {
    /// Parses and validates a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        info!("Loaded combat config from {}", path.display());
        Ok(config)
    }

    /// Loads a TOML file, falling back to defaults on any error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("Combat config {} not found, using defaults", path.display());
            return Self::default();
        }
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load combat config: {e}");
                Self::default()
            },
        }
    }

    /// Writes the config as pretty TOML.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        info!("Saved combat config to {}", path.display());
        Ok(())
    }

    /// Rejects non-finite or out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let h = &self.health;
        positive("health.combat_timeout", h.combat_timeout)?;
        positive("health.damage_window", h.damage_window)?;
        fraction("health.windowed_heal_fraction", h.windowed_heal_fraction)?;
        fraction("health.windowed_heal_floor", h.windowed_heal_floor)?;
        fraction("health.respawn_health_fraction", h.respawn_health_fraction)?;
        non_negative("health.resurrection_window", h.resurrection_window)?;

        let t = &self.threat;
        at_least_one("threat.melee_threshold", t.melee_threshold)?;
        at_least_one("threat.ranged_threshold", t.ranged_threshold)?;
        if t.melee_threshold > t.ranged_threshold {
            return Err(invalid(
                "threat.melee_threshold",
                t.melee_threshold,
                "must not exceed threat.ranged_threshold",
            ));
        }
        non_negative("threat.healing_multiplier", t.healing_multiplier)?;
        if !t.taunt_bonus.is_finite() || t.taunt_bonus <= 1.0 {
            return Err(invalid("threat.taunt_bonus", t.taunt_bonus, "must be > 1.0"));
        }

        positive("cast.global_cooldown", self.cast.global_cooldown)?;
        non_negative("cast.spell_queue_window", self.cast.spell_queue_window)?;

        let d = &self.diminishing;
        positive("diminishing.reset_interval", d.reset_interval)?;
        positive("diminishing.immunity_duration", d.immunity_duration)?;
        for (i, &m) in d.multipliers.iter().enumerate() {
            fraction(&format!("diminishing.multipliers[{i}]"), m)?;
        }
        if d.multipliers.windows(2).any(|w| w[1] > w[0]) {
            return Err(ConfigError::Invalid(
                "diminishing.multipliers must not increase".to_string(),
            ));
        }

        positive("interrupt.lockout_duration", self.interrupt.lockout_duration)?;

        fraction(
            "stealth.movement_speed_multiplier",
            self.stealth.movement_speed_multiplier,
        )?;
        non_negative("stealth.reentry_cooldown", self.stealth.reentry_cooldown)?;

        let dmg = &self.damage;
        positive("damage.stat_scaling_divisor", dmg.stat_scaling_divisor)?;
        positive("damage.armor_mitigation_divisor", dmg.armor_mitigation_divisor)?;
        at_least_one("damage.crit_multiplier", dmg.crit_multiplier)?;
        fraction("damage.min_damage_multiplier", dmg.min_damage_multiplier)?;
        non_negative("damage.max_crit_chance", dmg.max_crit_chance)?;
        positive("damage.min_global_cooldown", dmg.min_global_cooldown)?;

        Ok(())
    }
}

fn invalid(field: &str, value: f32, rule: &str) -> ConfigError {
    ConfigError::Invalid(format!("{field} = {value} ({rule})"))
}

fn positive(field: &str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, value, "must be > 0"))
    }
}

fn non_negative(field: &str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, value, "must be >= 0"))
    }
}

fn fraction(field: &str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, value, "must be in [0, 1]"))
    }
}

fn at_least_one(field: &str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 1.0 {
        Ok(())
    } else {
        Err(invalid(field, value, "must be >= 1.0"))
    }
}
