//! Engine - drives the world through the scheduler
//!
//! Simulated time is measured in years since the world's start year. Every
//! route fires at each whole year, captives first act half a year after they
//! are acquired, the age dump runs at `k + 363/365` and the year counter
//! advances at `k + 364/365`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use crate::{
    error::SimError,
    events::Observer,
    scheduler::Scheduler,
    snapshot::{AgeDump, SnapshotWriter},
    victim::{step_victim, StepOutcome},
    world::{FlowStats, RouteId, VictimId, World, WorldSnapshot},
};

const REPORT_OFFSET: f64 = 363.0 / 365.0;
const YEAR_END_OFFSET: f64 = 364.0 / 365.0;
const YEAR: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Route(RouteId),
    Victim(VictimId),
    Report,
    YearEnd,
}

pub struct EngineSettings {
    pub scenario_name: String,
    pub snapshot_interval_years: u32,
    pub snapshot_dir: PathBuf,
    /// Directory for the captive age dump; `None` disables it.
    pub age_dump_dir: Option<PathBuf>,
}

pub struct EngineBuilder {
    settings: EngineSettings,
    observers: Vec<Box<dyn Observer>>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: impl Observer + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            scheduler: Scheduler::new(),
            observers: self.observers,
            snapshot_writer: SnapshotWriter::new(
                &self.settings.snapshot_dir,
                self.settings.snapshot_interval_years,
            ),
            age_dump: self.settings.age_dump_dir.as_ref().map(AgeDump::new),
            settings: self.settings,
            primed: false,
            completed_years: 0,
            dispatched: 0,
            snapshots: Vec::new(),
        }
    }
}

/// What a call to [`Engine::run`] did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub seed: u64,
    pub start_year: i32,
    pub years: u32,
    pub final_year: i32,
    pub sim_time: f64,
    pub dispatched: u64,
    /// Transitions during this run only.
    pub stats: FlowStats,
    pub snapshots: Vec<PathBuf>,
}

pub struct Engine {
    scheduler: Scheduler<Actor>,
    observers: Vec<Box<dyn Observer>>,
    snapshot_writer: SnapshotWriter,
    age_dump: Option<AgeDump>,
    settings: EngineSettings,
    primed: bool,
    completed_years: u32,
    dispatched: u64,
    snapshots: Vec<PathBuf>,
}

impl Engine {
    pub fn now(&self) -> f64 {
        self.scheduler.now()
    }

    pub fn completed_years(&self) -> u32 {
        self.completed_years
    }

    pub fn pending(&self) -> usize {
        self.scheduler.len()
    }

    pub fn run(&mut self, world: &mut World, years: u32) -> Result<RunSummary> {
        self.run_with_hook(world, years, |_| {})
    }

    /// Advance until `years` more year ends have passed. `hook` receives the
    /// state of every year just before its counter advances.
    pub fn run_with_hook<F>(
        &mut self,
        world: &mut World,
        years: u32,
        mut hook: F,
    ) -> Result<RunSummary>
    where
        F: FnMut(WorldSnapshot),
    {
        self.prime(world)?;
        let before = world.stats();
        let dispatched = self.dispatched;
        let first_snapshot = self.snapshots.len();
        let target = self.completed_years + years;
        info!(
            scenario = %self.settings.scenario_name,
            year = world.year(),
            years,
            "run started"
        );

        while self.completed_years < target {
            if self.dispatch(world, &mut hook)?.is_none() {
                break;
            }
        }

        let summary = RunSummary {
            seed: world.rng().seed(),
            start_year: world.start_year(),
            years,
            final_year: world.year(),
            sim_time: self.scheduler.now(),
            dispatched: self.dispatched - dispatched,
            stats: stats_delta(before, world.stats()),
            snapshots: self.snapshots[first_snapshot..].to_vec(),
        };
        info!(
            scenario = %self.settings.scenario_name,
            final_year = summary.final_year,
            acquired = summary.stats.acquired,
            retired = summary.stats.retired,
            released = summary.stats.released,
            captives = world.total_captives(),
            "run finished"
        );
        Ok(summary)
    }

    /// Dispatch the next scheduled actor. Returns `None` once nothing is
    /// scheduled.
    pub fn step(&mut self, world: &mut World) -> Result<Option<Actor>> {
        self.prime(world)?;
        self.dispatch(world, &mut |_: WorldSnapshot| {})
    }

    fn prime(&mut self, world: &World) -> Result<()> {
        if self.primed {
            return Ok(());
        }
        for id in world.route_ids() {
            self.scheduler
                .schedule_repeating(0.0, YEAR, Actor::Route(id));
        }
        self.scheduler
            .schedule_repeating(YEAR_END_OFFSET, YEAR, Actor::YearEnd);
        if let Some(dump) = &self.age_dump {
            let dir = dump.dir().display();
            dump.prepare()
                .with_context(|| format!("Failed to prepare age dump directory {dir}"))?;
            self.scheduler
                .schedule_repeating(REPORT_OFFSET, YEAR, Actor::Report);
        }
        self.primed = true;
        Ok(())
    }

    fn dispatch<F>(&mut self, world: &mut World, hook: &mut F) -> Result<Option<Actor>>
    where
        F: FnMut(WorldSnapshot),
    {
        let Some(fired) = self.scheduler.pop_next() else {
            return Ok(None);
        };
        let actor = fired.actor;
        let now = fired.time;

        let outcome = match actor {
            Actor::Route(id) => {
                let route = *world.route(id).ok_or(SimError::UnknownRoute(id))?;
                route.run_year(world)?;
                StepOutcome::Continue
            }
            Actor::Victim(id) => step_victim(world, id)?.outcome(),
            Actor::Report => {
                if let Some(dump) = &self.age_dump {
                    let year = world.year();
                    dump.write_year(world)
                        .with_context(|| format!("Failed to write age dump for {year}"))?;
                }
                StepOutcome::Continue
            }
            Actor::YearEnd => {
                self.end_year(world, now, hook)?;
                StepOutcome::Continue
            }
        };
        self.dispatched += 1;

        if outcome == StepOutcome::Continue {
            self.scheduler.rearm(fired);
        }
        let delay = world.params().victim.first_step_delay;
        for id in world.take_spawned() {
            self.scheduler
                .schedule_repeating(now + delay, YEAR, Actor::Victim(id));
        }
        for event in world.take_events() {
            for observer in &mut self.observers {
                observer.on_event(&event);
            }
        }
        Ok(Some(actor))
    }

    fn end_year<F>(&mut self, world: &mut World, now: f64, hook: &mut F) -> Result<()>
    where
        F: FnMut(WorldSnapshot),
    {
        self.completed_years += 1;
        let snapshot = world.snapshot(&self.settings.scenario_name, now);
        if let Some(path) = self
            .snapshot_writer
            .maybe_write(&snapshot, self.completed_years)
            .context("Failed to write world snapshot")?
        {
            self.snapshots.push(path);
        }
        info!(
            year = snapshot.year,
            population = snapshot.total_population,
            captives = snapshot.total_captives,
            escapees = snapshot.total_escapees,
            tracked = world.victim_count(),
            "year complete"
        );
        hook(snapshot);
        world.advance_year();
        Ok(())
    }
}

fn stats_delta(before: FlowStats, after: FlowStats) -> FlowStats {
    FlowStats {
        acquired: after.acquired - before.acquired,
        moved: after.moved - before.moved,
        escaped: after.escaped - before.escaped,
        reacquired: after.reacquired - before.reacquired,
        retired: after.retired - before.retired,
        released: after.released - before.released,
    }
}
