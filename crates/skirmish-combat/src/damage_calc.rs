//! Damage and healing calculation.
//!
//! This module provides:
//! - Stat-scaled physical damage, spell damage and healing
//! - Armor mitigation
//! - Critical hit chance and multiplier
//! - Haste applied to cast times and the global cooldown
//! - Windowed healing ("heal for a share of recent damage taken")
//!
//! Everything here is a pure function of its inputs. Randomness is supplied
//! by the caller as a roll in `[0, 100)`, so results are reproducible.

use serde::{Deserialize, Serialize};

// ============================================================================
// Damage Types
// ============================================================================

/// School of damage dealt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DamageType {
    /// Physical damage - reduced by armor.
    #[default]
    Physical,
    /// Fire damage.
    Fire,
    /// Frost damage.
    Frost,
    /// Holy damage.
    Holy,
    /// Shadow damage.
    Shadow,
    /// Nature damage.
    Nature,
    /// Arcane damage.
    Arcane,
}

impl DamageType {
    /// Check if this damage type is mitigated by armor.
    #[must_use]
    pub const fn is_physical(self) -> bool {
        matches!(self, Self::Physical)
    }

    /// Check if this is a magic school.
    #[must_use]
    pub const fn is_magic(self) -> bool {
        !self.is_physical()
    }
}

// ============================================================================
// Stats
// ============================================================================

/// Combat stats of an attacker, caster or target.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterStats {
    /// Attack power.
    pub attack_power: i32,
    /// Strength.
    pub strength: i32,
    /// Spell power.
    pub spell_power: i32,
    /// Intellect.
    pub intellect: i32,
    /// Crit chance in percent (0-100).
    pub crit_chance: f32,
    /// Haste in percent.
    pub haste: f32,
    /// Armor, used when this entity takes physical damage.
    pub armor: i32,
}

impl CharacterStats {
    /// Create zeroed stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set attack power and strength.
    #[must_use]
    pub fn with_physical(mut self, attack_power: i32, strength: i32) -> Self {
        self.attack_power = attack_power;
        self.strength = strength;
        self
    }

    /// Set spell power and intellect.
    #[must_use]
    pub fn with_spell(mut self, spell_power: i32, intellect: i32) -> Self {
        self.spell_power = spell_power;
        self.intellect = intellect;
        self
    }

    /// Set crit chance in percent.
    #[must_use]
    pub fn with_crit_chance(mut self, crit_chance: f32) -> Self {
        self.crit_chance = crit_chance;
        self
    }

    /// Set haste in percent.
    #[must_use]
    pub fn with_haste(mut self, haste: f32) -> Self {
        self.haste = haste;
        self
    }

    /// Set armor.
    #[must_use]
    pub fn with_armor(mut self, armor: i32) -> Self {
        self.armor = armor;
        self
    }
}

// ============================================================================
// Damage Result
// ============================================================================

/// Result of a damage or healing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DamageResult {
    /// Amount after stat scaling.
    pub raw: f32,
    /// Amount after mitigation.
    pub mitigated: f32,
    /// Amount after the crit multiplier.
    pub final_damage: f32,
    /// Whether this was a critical hit.
    pub is_critical: bool,
}

impl DamageResult {
    /// Amount removed by mitigation.
    #[must_use]
    pub fn mitigation(&self) -> f32 {
        (self.raw - self.mitigated).max(0.0)
    }
}

// ============================================================================
// Damage Calculator
// ============================================================================

/// Tuning for damage calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DamageConfig {
    /// Divisor turning stat points into a damage bonus.
    pub stat_scaling_divisor: f32,
    /// Armor constant in `100 / (100 + armor)`.
    pub armor_mitigation_divisor: f32,
    /// Multiplier applied on critical hits.
    pub crit_multiplier: f32,
    /// Scaled amounts never drop below `base * min_damage_multiplier`.
    pub min_damage_multiplier: f32,
    /// Crit chance cap in percent.
    pub max_crit_chance: f32,
    /// Floor for a hasted global cooldown, in seconds.
    pub min_global_cooldown: f32,
}

impl Default for DamageConfig {
    fn default() -> Self {
        Self {
            stat_scaling_divisor: 100.0,
            armor_mitigation_divisor: 100.0,
            crit_multiplier: 1.5,
            min_damage_multiplier: 0.1,
            max_crit_chance: 100.0,
            min_global_cooldown: 1.0,
        }
    }
}

/// Calculator for damage and healing values.
#[derive(Debug, Clone, Default)]
pub struct DamageCalculator {
    /// Configuration.
    pub config: DamageConfig,
}

impl DamageCalculator {
    /// Create new calculator with default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create calculator with config.
    #[must_use]
    pub fn with_config(config: DamageConfig) -> Self {
        Self { config }
    }

    fn scale(&self, base: f32, stat_points: i32) -> f32 {
        if base <= 0.0 {
            return 0.0;
        }
        let bonus = stat_points as f32 / self.config.stat_scaling_divisor;
        (base * (1.0 + bonus)).max(base * self.config.min_damage_multiplier)
    }

    /// Physical damage: `base * (1 + (strength + attack_power) / 100)`.
    #[must_use]
    pub fn physical_damage(&self, base: f32, attack_power: i32, strength: i32) -> f32 {
        self.scale(base, strength + attack_power)
    }

    /// Spell damage: `base * (1 + (intellect + spell_power) / 100)`.
    #[must_use]
    pub fn spell_damage(&self, base: f32, spell_power: i32, intellect: i32) -> f32 {
        self.scale(base, intellect + spell_power)
    }

    /// Healing scales like spell damage.
    #[must_use]
    pub fn healing(&self, base: f32, spell_power: i32, intellect: i32) -> f32 {
        self.scale(base, intellect + spell_power)
    }

    /// Damage after armor: `damage * 100 / (100 + armor)`.
    #[must_use]
    pub fn apply_armor(&self, damage: f32, armor: i32) -> f32 {
        if damage <= 0.0 {
            return 0.0;
        }
        if armor <= 0 {
            return damage;
        }
        let divisor = self.config.armor_mitigation_divisor;
        damage * (divisor / (divisor + armor as f32))
    }

    /// Percentage (0-100) of damage removed by armor.
    #[must_use]
    pub fn armor_reduction_percent(&self, armor: i32) -> f32 {
        if armor <= 0 {
            return 0.0;
        }
        let armor = armor as f32;
        armor / (self.config.armor_mitigation_divisor + armor) * 100.0
    }

    /// Total crit chance, clamped to `[0, max_crit_chance]`.
    #[must_use]
    pub fn crit_chance(&self, base_chance: f32, rating: f32) -> f32 {
        (base_chance + rating).clamp(0.0, self.config.max_crit_chance)
    }

    /// Roll for critical hit. `roll` is a uniform sample in `[0, 100)`.
    #[must_use]
    pub fn roll_crit(&self, crit_chance: f32, roll: f32) -> bool {
        crit_chance > 0.0 && roll < crit_chance
    }

    /// Applies the crit multiplier if `is_crit`.
    #[must_use]
    pub fn apply_crit(&self, amount: f32, is_crit: bool) -> f32 {
        if is_crit {
            amount * self.config.crit_multiplier
        } else {
            amount
        }
    }

    fn finish(&self, raw: f32, mitigated: f32, stats: &CharacterStats, roll: Option<f32>) -> DamageResult {
        let chance = self.crit_chance(stats.crit_chance, 0.0);
        let is_critical = roll.is_some_and(|r| self.roll_crit(chance, r));
        DamageResult {
            raw,
            mitigated,
            final_damage: self.apply_crit(mitigated, is_critical),
            is_critical,
        }
    }

    /// Full physical pipeline: stat scaling, armor, crit.
    ///
    /// `roll` of `None` skips the crit roll entirely.
    #[must_use]
    pub fn full_physical(
        &self,
        base: f32,
        attacker: &CharacterStats,
        target_armor: i32,
        roll: Option<f32>,
    ) -> DamageResult {
        let raw = self.physical_damage(base, attacker.attack_power, attacker.strength);
        let mitigated = self.apply_armor(raw, target_armor);
        self.finish(raw, mitigated, attacker, roll)
    }

    /// Full spell pipeline. Spells ignore armor unless `target_armor` is given.
    #[must_use]
    pub fn full_spell(
        &self,
        base: f32,
        caster: &CharacterStats,
        target_armor: Option<i32>,
        roll: Option<f32>,
    ) -> DamageResult {
        let raw = self.spell_damage(base, caster.spell_power, caster.intellect);
        let mitigated = match target_armor {
            Some(armor) => self.apply_armor(raw, armor),
            None => raw,
        };
        self.finish(raw, mitigated, caster, roll)
    }

    /// Full healing pipeline. Healing is never mitigated.
    #[must_use]
    pub fn full_healing(&self, base: f32, caster: &CharacterStats, roll: Option<f32>) -> DamageResult {
        let raw = self.healing(base, caster.spell_power, caster.intellect);
        self.finish(raw, raw, caster, roll)
    }

    /// Cast time after haste: `cast_time / (1 + haste / 100)`.
    #[must_use]
    pub fn hasted_cast_time(&self, cast_time: f32, haste: f32) -> f32 {
        if cast_time <= 0.0 {
            return 0.0;
        }
        cast_time / (1.0 + haste / 100.0)
    }

    /// Global cooldown after haste, floored at `min_global_cooldown`.
    #[must_use]
    pub fn hasted_global_cooldown(&self, gcd: f32, haste: f32) -> f32 {
        self.hasted_cast_time(gcd, haste)
            .max(self.config.min_global_cooldown)
    }

    /// Windowed heal: `max(recent_damage * fraction, max_health * floor_fraction)`.
    #[must_use]
    pub fn windowed_heal(
        &self,
        recent_damage: f32,
        max_health: f32,
        fraction: f32,
        floor_fraction: f32,
    ) -> f32 {
        (recent_damage.max(0.0) * fraction).max(max_health * floor_fraction)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.001
    }

    #[test]
    fn test_damage_type_properties() {
        assert!(DamageType::Physical.is_physical());
        assert!(DamageType::Fire.is_magic());
        assert!(!DamageType::Arcane.is_physical());
    }

    #[test]
    fn test_physical_scaling() {
        let calc = DamageCalculator::new();
        // 100 * (1 + (30 + 20) / 100) = 150
        assert!(approx(calc.physical_damage(100.0, 20, 30), 150.0));
        assert_eq!(calc.physical_damage(0.0, 20, 30), 0.0);
        assert_eq!(calc.physical_damage(-5.0, 20, 30), 0.0);
    }

    #[test]
    fn test_negative_stats_hit_floor() {
        let calc = DamageCalculator::new();
        // 100 * (1 - 2) would be negative, floor is 10% of base
        assert!(approx(calc.spell_damage(100.0, -150, -50), 10.0));
    }

    #[test]
    fn test_armor_mitigation() {
        let calc = DamageCalculator::new();
        assert!(approx(calc.apply_armor(200.0, 100), 100.0));
        assert_eq!(calc.apply_armor(200.0, 0), 200.0);
        assert_eq!(calc.apply_armor(0.0, 100), 0.0);
        assert!(approx(calc.armor_reduction_percent(100), 50.0));
        assert_eq!(calc.armor_reduction_percent(-10), 0.0);
    }

    #[test]
    fn test_crit_chance_and_roll() {
        let calc = DamageCalculator::new();
        assert_eq!(calc.crit_chance(90.0, 30.0), 100.0);
        assert_eq!(calc.crit_chance(-10.0, 0.0), 0.0);
        assert!(calc.roll_crit(25.0, 10.0));
        assert!(!calc.roll_crit(25.0, 25.0));
        assert!(!calc.roll_crit(0.0, 0.0));
    }

    #[test]
    fn test_full_physical_pipeline() {
        let calc = DamageCalculator::new();
        let stats = CharacterStats::new()
            .with_physical(50, 50)
            .with_crit_chance(20.0);

        // 100 * 2 = 200 raw, 100 armor halves it, roll 5 < 20 crits for 1.5x
        let result = calc.full_physical(100.0, &stats, 100, Some(5.0));
        assert!(approx(result.raw, 200.0));
        assert!(approx(result.mitigated, 100.0));
        assert!(approx(result.final_damage, 150.0));
        assert!(result.is_critical);
        assert!(approx(result.mitigation(), 100.0));

        let no_roll = calc.full_physical(100.0, &stats, 100, None);
        assert!(!no_roll.is_critical);
        assert!(approx(no_roll.final_damage, 100.0));
    }

    #[test]
    fn test_spell_ignores_armor_by_default() {
        let calc = DamageCalculator::new();
        let stats = CharacterStats::new().with_spell(100, 0);
        let result = calc.full_spell(50.0, &stats, None, None);
        assert!(approx(result.final_damage, 100.0));

        let armored = calc.full_spell(50.0, &stats, Some(100), None);
        assert!(approx(armored.final_damage, 50.0));
    }

    #[test]
    fn test_healing_pipeline() {
        let calc = DamageCalculator::new();
        let stats = CharacterStats::new().with_spell(40, 10).with_crit_chance(100.0);
        let result = calc.full_healing(100.0, &stats, Some(99.0));
        assert!(approx(result.raw, 150.0));
        assert!(approx(result.mitigated, 150.0));
        assert!(approx(result.final_damage, 225.0));
    }

    #[test]
    fn test_haste() {
        let calc = DamageCalculator::new();
        assert!(approx(calc.hasted_cast_time(2.0, 100.0), 1.0));
        assert_eq!(calc.hasted_cast_time(0.0, 50.0), 0.0);
        assert!(approx(calc.hasted_global_cooldown(1.5, 25.0), 1.2));
        assert!(approx(calc.hasted_global_cooldown(1.5, 200.0), 1.0));
    }

    #[test]
    fn test_windowed_heal() {
        let calc = DamageCalculator::new();
        // 25% of 400 = 100 vs 10% of 1000 = 100
        assert!(approx(calc.windowed_heal(400.0, 1000.0, 0.25, 0.10), 100.0));
        // Floor wins with little damage taken
        assert!(approx(calc.windowed_heal(40.0, 1000.0, 0.25, 0.10), 100.0));
        // Damage share wins with heavy damage taken
        assert!(approx(calc.windowed_heal(2000.0, 1000.0, 0.25, 0.10), 500.0));
    }
}
