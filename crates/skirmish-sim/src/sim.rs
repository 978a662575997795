//! Fixed-rate encounter runner.

use std::fmt;

use anyhow::{Context, Result};
use skirmish_combat::{CombatConfig, CombatEvent, CombatWorld, EntityKind};
use skirmish_common::{AbilityId, EntityId};
use tracing::{debug, info};

use crate::scenario::{Action, Scenario, TimedAction};

/// Simulation ticks per second.
pub const TICK_RATE: u32 = 60;

/// Final state of one combatant.
#[derive(Debug, Clone, PartialEq)]
pub struct CombatantSummary {
    /// Display name.
    pub name: String,
    /// Player or hostile.
    pub kind: EntityKind,
    /// Health at the end.
    pub health: f32,
    /// Max health.
    pub max_health: f32,
    /// Whether it ended dead.
    pub dead: bool,
    /// Current target, hostiles only.
    pub target: Option<String>,
}

/// What happened during a run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Summary {
    /// Scenario name.
    pub scenario: String,
    /// Ticks simulated.
    pub ticks: u64,
    /// Events drained.
    pub events: usize,
    /// Deaths observed.
    pub deaths: usize,
    /// Wipes observed.
    pub wipes: usize,
    /// Final state per combatant.
    pub combatants: Vec<CombatantSummary>,
}

impl Summary {
    /// Looks up a combatant by name.
    pub fn combatant(&self, name: &str) -> Option<&CombatantSummary> {
        self.combatants.iter().find(|c| c.name == name)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== {} ==", self.scenario)?;
        writeln!(
            f,
            "{} ticks, {} events, {} deaths, {} wipes",
            self.ticks, self.events, self.deaths, self.wipes
        )?;
        for c in &self.combatants {
            let status = if c.dead { " (dead)" } else { "" };
            write!(
                f,
                "  {:<20} {:>7.0}/{:<7.0}{status}",
                c.name, c.health, c.max_health
            )?;
            if let Some(target) = &c.target {
                write!(f, " -> {target}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Runs one scenario against a fresh combat world.
pub struct Simulation {
    scenario: Scenario,
    world: CombatWorld,
    dt: f32,
}

impl Simulation {
    /// Registers every combatant and ability.
    pub fn new(scenario: Scenario, config: CombatConfig) -> Result<Self> {
        let mut world = CombatWorld::try_new(config).context("invalid combat config")?;
        for entity in &scenario.entities {
            let id = EntityId::from_raw(entity.id);
            let registered = match entity.kind {
                EntityKind::Player => world.register_player(id, entity.max_health),
                EntityKind::Hostile => world.register_hostile(id, entity.max_health),
            };
            registered.with_context(|| format!("cannot register {}", entity.name))?;
            world.set_stats(id, entity.stats);
        }
        for ability in &scenario.abilities {
            world.register_ability(ability.spec());
        }
        Ok(Self {
            scenario,
            world,
            dt: 1.0 / TICK_RATE as f32,
        })
    }

    /// World being simulated.
    pub fn world(&self) -> &CombatWorld {
        &self.world
    }

    /// Runs the whole timeline.
    pub fn run(mut self) -> Summary {
        let ticks = (self.scenario.duration * TICK_RATE as f32).ceil() as u64;
        let timeline = self.scenario.timeline();
        let mut pending = timeline.iter().peekable();
        let mut summary = Summary {
            scenario: self.scenario.name.clone(),
            ticks,
            ..Summary::default()
        };

        info!("Running '{}' for {ticks} ticks", self.scenario.name);
        for tick in 0..ticks {
            while let Some(timed) = pending.next_if(|t| due_tick(t) <= tick) {
                self.apply(&timed.action);
            }

            self.world.tick(self.dt);

            let time = (tick + 1) as f32 * self.dt;
            for event in self.world.drain_events() {
                match event {
                    CombatEvent::EntityDied { .. } => summary.deaths += 1,
                    CombatEvent::Wipe => summary.wipes += 1,
                    _ => {},
                }
                if matches!(event, CombatEvent::CastProgress { .. }) {
                    debug!("[{time:6.2}] {event:?}");
                } else {
                    info!("[{time:6.2}] {event:?}");
                }
                summary.events += 1;
            }
        }

        summary.combatants = self.combatants();
        summary
    }

    fn apply(&mut self, action: &Action) {
        let id = EntityId::from_raw;
        debug!("{action:?}");
        match *action {
            Action::Damage {
                source,
                target,
                amount,
                school,
                ranged,
            } => match source {
                Some(source) if ranged => {
                    self.world
                        .apply_ranged_damage(id(target), amount, school, id(source));
                },
                _ => {
                    self.world
                        .apply_damage(id(target), amount, school, source.map(id));
                },
            },
            Action::Heal {
                source,
                target,
                amount,
            } => self.world.apply_healing(id(target), amount, source.map(id)),
            Action::Cast { actor, ability } => {
                self.cast(id(actor), ability);
            },
            Action::Queue {
                actor,
                ability,
                slot,
            } => {
                self.world
                    .try_queue(id(actor), AbilityId::new(ability), slot);
            },
            Action::Target { actor, target } => {
                self.world.set_target(id(actor), target.map(id));
            },
            Action::Move { actor } => {
                self.world.on_movement_detected(id(actor));
            },
            Action::CrowdControl {
                target,
                category,
                duration,
            } => {
                self.world.apply_crowd_control(id(target), category, duration);
            },
            Action::Interrupt { source, target } => {
                self.world.interrupt(id(source), id(target));
            },
            Action::Taunt { source, target } => self.world.taunt(id(source), id(target)),
            Action::Stealth { entity } => {
                self.world.try_enter_stealth(id(entity));
            },
            Action::Kill { target } => self.world.kill(id(target)),
            Action::Resurrect { target, fraction } => {
                self.world.resurrect(id(target), fraction);
            },
            Action::ReleaseSpirit { target } => {
                self.world.release_spirit(id(target));
            },
        }
    }

    fn cast(&mut self, actor: EntityId, ability: u32) -> bool {
        let Some(spec) = self.world.ability(AbilityId::new(ability)).cloned() else {
            return false;
        };
        let used = self.world.use_ability(actor, &spec);
        if !used {
            debug!(
                "{} could not use {}",
                self.scenario.name_of(actor),
                AbilityId::new(ability)
            );
        }
        used
    }

    fn combatants(&self) -> Vec<CombatantSummary> {
        self.scenario
            .entities
            .iter()
            .map(|e| {
                let id = EntityId::from_raw(e.id);
                let target = match e.kind {
                    EntityKind::Hostile => self
                        .world
                        .current_target(id)
                        .map(|t| self.scenario.name_of(t).to_string()),
                    EntityKind::Player => None,
                };
                CombatantSummary {
                    name: e.name.clone(),
                    kind: e.kind,
                    health: self.world.health(id),
                    max_health: e.max_health,
                    dead: self.world.is_dead(id),
                    target,
                }
            })
            .collect()
    }
}

/// Tick on which an action fires.
fn due_tick(timed: &TimedAction) -> u64 {
    (timed.at * TICK_RATE as f32).round() as u64
}
