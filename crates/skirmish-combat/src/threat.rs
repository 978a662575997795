//! Threat tables and hostile target selection.
//!
//! Every hostile keeps a table of contributors and the threat each has built
//! up. A hostile keeps attacking its current target until a challenger beats
//! that target's threat by a multiplicative margin; taunts skip the margin.

use serde::{Deserialize, Serialize};
use skirmish_common::EntityId;
use tracing::{debug, info};

use crate::arena::EntityArena;
use crate::events::{CombatEvent, EventSender};

/// Which margin to use when re-evaluating a hostile's target after a threat
/// add.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TargetSwitchPolicy {
    /// Always use the melee margin.
    #[default]
    MeleeOnly,
    /// Use the ranged margin for contributors recorded as ranged.
    ByContributorRange,
}

/// Threat tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatConfig {
    /// Margin a melee challenger needs over the current target.
    pub melee_threshold: f32,
    /// Margin a ranged challenger needs over the current target.
    pub ranged_threshold: f32,
    /// Fraction of healing converted into threat.
    pub healing_multiplier: f32,
    /// Taunt sets threat to highest times this.
    pub taunt_bonus: f32,
    /// Margin selection when re-evaluating targets.
    pub switch_policy: TargetSwitchPolicy,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            melee_threshold: 1.1,
            ranged_threshold: 1.3,
            healing_multiplier: 0.5,
            taunt_bonus: 1.1,
            switch_policy: TargetSwitchPolicy::MeleeOnly,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ThreatEntry {
    source: EntityId,
    threat: f32,
    ranged: bool,
}

/// Contributors in first-contact order.
#[derive(Debug, Clone, Default)]
struct ThreatTable {
    entries: Vec<ThreatEntry>,
    current_target: Option<EntityId>,
}

impl ThreatTable {
    fn entry(&self, source: EntityId) -> Option<&ThreatEntry> {
        self.entries.iter().find(|e| e.source == source)
    }

    fn threat(&self, source: EntityId) -> f32 {
        self.entry(source).map_or(0.0, |e| e.threat)
    }

    fn entry_mut(&mut self, source: EntityId) -> &mut ThreatEntry {
        let index = match self.entries.iter().position(|e| e.source == source) {
            Some(index) => index,
            None => {
                self.entries.push(ThreatEntry {
                    source,
                    threat: 0.0,
                    ranged: false,
                });
                self.entries.len() - 1
            },
        };
        &mut self.entries[index]
    }

    /// Highest contributor; ties go to whoever engaged first.
    fn highest(&self) -> Option<&ThreatEntry> {
        self.entries
            .iter()
            .fold(None, |best: Option<&ThreatEntry>, e| match best {
                Some(b) if b.threat >= e.threat => Some(b),
                _ => Some(e),
            })
    }
}

/// Threat engine for every hostile.
#[derive(Debug, Default)]
pub struct ThreatEngine {
    config: ThreatConfig,
    tables: EntityArena<ThreatTable>,
    events: EventSender,
}

impl ThreatEngine {
    /// Creates an engine with the given tuning.
    #[must_use]
    pub fn new(config: ThreatConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Connects the engine to an event bus.
    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    /// Tuning in use.
    #[must_use]
    pub fn config(&self) -> &ThreatConfig {
        &self.config
    }

    /// Adds threat from a melee-range contributor.
    pub fn add_threat(&mut self, source: EntityId, hostile: EntityId, amount: f32) {
        self.add_threat_inner(source, hostile, amount, false);
    }

    /// Adds threat from a ranged contributor.
    pub fn add_threat_ranged(&mut self, source: EntityId, hostile: EntityId, amount: f32) {
        self.add_threat_inner(source, hostile, amount, true);
    }

    fn add_threat_inner(&mut self, source: EntityId, hostile: EntityId, amount: f32, ranged: bool) {
        if amount.is_nan() || amount <= 0.0 || !source.is_valid() || source == hostile {
            return;
        }

        let table = self
            .tables
            .get_or_insert_with(hostile, ThreatTable::default);
        let entry = table.entry_mut(source);
        entry.threat += amount;
        entry.ranged = ranged;
        debug!(
            "+{amount:.0} threat: {source} -> {hostile} (total {:.0})",
            entry.threat
        );

        self.reevaluate(hostile);
    }

    /// Sets `source` above the current top threat and forces the switch.
    pub fn taunt(&mut self, source: EntityId, hostile: EntityId) {
        if !source.is_valid() || source == hostile {
            return;
        }

        let bonus = self.config.taunt_bonus;
        let table = self
            .tables
            .get_or_insert_with(hostile, ThreatTable::default);
        let highest = table.highest().map_or(0.0, |e| e.threat);
        let threat = highest * bonus;
        table.entry_mut(source).threat = threat;
        debug!("{source} taunted {hostile} (threat {threat:.0})");

        self.set_current_target(hostile, source);
    }

    /// Spreads healing threat evenly across `engaged` hostiles.
    pub fn add_healing_threat(&mut self, healer: EntityId, heal_amount: f32, engaged: &[EntityId]) {
        if engaged.is_empty() || heal_amount.is_nan() || heal_amount <= 0.0 {
            return;
        }

        let total = heal_amount * self.config.healing_multiplier;
        let per_hostile = total / engaged.len() as f32;
        for &hostile in engaged {
            self.add_threat(healer, hostile, per_hostile);
        }
        debug!(
            "healing threat {total:.0} from {healer} split across {} hostiles",
            engaged.len()
        );
    }

    /// Clears a hostile's table and current target.
    pub fn reset_threat(&mut self, hostile: EntityId) {
        if let Some(table) = self.tables.get_mut(hostile) {
            table.entries.clear();
            table.current_target = None;
            debug!("threat reset for {hostile}");
        }
    }

    /// Contributor with the most threat on `hostile`.
    #[must_use]
    pub fn highest_threat_entity(&self, hostile: EntityId) -> Option<EntityId> {
        self.tables
            .get(hostile)
            .and_then(ThreatTable::highest)
            .map(|e| e.source)
    }

    /// Check if `candidate` should take `hostile`'s attention.
    #[must_use]
    pub fn should_switch_target(
        &self,
        candidate: EntityId,
        hostile: EntityId,
        is_melee_range: bool,
    ) -> bool {
        let Some(table) = self.tables.get(hostile) else {
            return true;
        };
        let Some(current) = table.current_target else {
            return true;
        };
        if current == candidate {
            return false;
        }

        let current_threat = table.threat(current);
        let candidate_threat = table.threat(candidate);
        if current_threat <= 0.0 {
            return candidate_threat > 0.0;
        }

        let threshold = if is_melee_range {
            self.config.melee_threshold
        } else {
            self.config.ranged_threshold
        };
        candidate_threat >= current_threat * threshold
    }

    /// Threat `source` has on `hostile`.
    #[must_use]
    pub fn threat(&self, source: EntityId, hostile: EntityId) -> f32 {
        self.tables.get(hostile).map_or(0.0, |t| t.threat(source))
    }

    /// Who `hostile` is attacking.
    #[must_use]
    pub fn current_target(&self, hostile: EntityId) -> Option<EntityId> {
        self.tables.get(hostile).and_then(|t| t.current_target)
    }

    /// Snapshot of a hostile's table, highest threat first.
    #[must_use]
    pub fn threat_table(&self, hostile: EntityId) -> Vec<(EntityId, f32)> {
        let mut snapshot: Vec<(EntityId, f32)> = self
            .tables
            .get(hostile)
            .map(|t| t.entries.iter().map(|e| (e.source, e.threat)).collect())
            .unwrap_or_default();
        snapshot.sort_by(|a, b| b.1.total_cmp(&a.1));
        snapshot
    }

    /// Hostiles with a table.
    pub fn hostiles(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.tables.ids()
    }

    /// Drops `source` from every table, retargeting hostiles that were on it.
    pub fn remove_contributor(&mut self, source: EntityId) {
        let mut retarget = Vec::new();
        for (hostile, table) in self.tables.iter_mut() {
            table.entries.retain(|e| e.source != source);
            if table.current_target == Some(source) {
                table.current_target = None;
                retarget.push(hostile);
            }
        }
        for hostile in retarget {
            self.reevaluate(hostile);
        }
    }

    /// Forgets a hostile entirely.
    pub fn remove_hostile(&mut self, hostile: EntityId) {
        self.tables.remove(hostile);
    }

    /// Forgets everything.
    pub fn clear_all(&mut self) {
        self.tables.clear();
    }

    fn reevaluate(&mut self, hostile: EntityId) {
        let Some(table) = self.tables.get(hostile) else {
            return;
        };
        let Some(top) = table.highest().copied() else {
            return;
        };

        if table.current_target.is_none() {
            self.set_current_target(hostile, top.source);
            return;
        }

        let is_melee = match self.config.switch_policy {
            TargetSwitchPolicy::MeleeOnly => true,
            TargetSwitchPolicy::ByContributorRange => !top.ranged,
        };
        if self.should_switch_target(top.source, hostile, is_melee) {
            self.set_current_target(hostile, top.source);
        }
    }

    fn set_current_target(&mut self, hostile: EntityId, target: EntityId) {
        let Some(table) = self.tables.get_mut(hostile) else {
            return;
        };
        if table.current_target == Some(target) {
            return;
        }
        table.current_target = Some(target);
        info!("{hostile} now targeting {target}");
        self.events
            .emit(CombatEvent::AggroChanged { hostile, target });
    }
}
