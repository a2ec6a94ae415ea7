//! Victim lifecycle
//!
//! `Captive` may escape or retire on its own step; `Escapee` only changes
//! state through route reacquisition; `Retired` is terminal. Forced release by
//! an immigration sweep has the same effect as retirement.

use serde::Serialize;
use tracing::trace;

use crate::error::SimError;
use crate::events::SimEvent;
use crate::world::{LocationId, VictimId, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VictimState {
    Captive,
    Escapee,
    Retired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Victim {
    id: VictimId,
    birth_year: i32,
    location: Option<LocationId>,
    state: VictimState,
    pending_removal: bool,
}

impl Victim {
    /// A new captive not yet attached to any location.
    pub fn new(id: VictimId, birth_year: i32) -> Self {
        Self {
            id,
            birth_year,
            location: None,
            state: VictimState::Captive,
            pending_removal: false,
        }
    }

    pub fn id(&self) -> VictimId {
        self.id
    }

    pub fn birth_year(&self) -> i32 {
        self.birth_year
    }

    pub fn age(&self, year: i32) -> i32 {
        year - self.birth_year
    }

    /// Owning location, `None` only while detached mid-move.
    pub fn location(&self) -> Option<LocationId> {
        self.location
    }

    pub fn state(&self) -> VictimState {
        self.state
    }

    pub fn is_escapee(&self) -> bool {
        self.state == VictimState::Escapee
    }

    /// Whether a deferred `Hidden` event is owed on the next step.
    pub fn pending_removal(&self) -> bool {
        self.pending_removal
    }

    pub(crate) fn attach(&mut self, location: LocationId) {
        self.location = Some(location);
    }

    pub(crate) fn detach(&mut self) {
        self.location = None;
    }

    pub(crate) fn set_state(&mut self, state: VictimState) {
        self.state = state;
    }

    pub(crate) fn set_pending_removal(&mut self, pending: bool) {
        self.pending_removal = pending;
    }
}

/// What the scheduler should do with a victim's recurring step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Finished,
}

/// What happened during one victim step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    Escaped,
    Retired,
    /// The victim had already left the simulation.
    Gone,
}

impl Transition {
    pub fn outcome(self) -> StepOutcome {
        match self {
            Transition::Retired | Transition::Gone => StepOutcome::Finished,
            Transition::None | Transition::Escaped => StepOutcome::Continue,
        }
    }
}

/// Run one annual step for `id`.
pub fn step_victim(world: &mut World, id: VictimId) -> Result<Transition, SimError> {
    let Some(victim) = world.victim(id) else {
        // Released by a sweep after this step was queued.
        return Ok(Transition::Gone);
    };
    let state = victim.state();
    let owed_hide = victim.pending_removal();
    let location = victim.location().ok_or(SimError::DetachedVictim(id))?;
    let age = victim.age(world.year());

    if owed_hide {
        world.victim_mut(id)?.set_pending_removal(false);
        world.emit(SimEvent::Hidden { victim: id });
    }

    if state != VictimState::Captive {
        return Ok(Transition::None);
    }

    let params = world.params().victim;
    if world.rng_mut().chance(params.escape_probability) {
        world.escape(id)?;
        trace!(
            victim = id.raw(),
            location = location.raw(),
            "victim escaped"
        );
        return Ok(Transition::Escaped);
    }

    if world.rng_mut().chance(params.retire_probability(age)) {
        world.retire(id)?;
        trace!(victim = id.raw(), age, "victim retired");
        return Ok(Transition::Retired);
    }

    Ok(Transition::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Coordinates;
    use crate::params::{SimParams, VictimParams};

    fn world_with(params: SimParams) -> (World, LocationId) {
        let mut world = World::new(2013, 17, params);
        let id = world.add_location(
            "Nepal",
            Coordinates {
                latitude: 28.0,
                longitude: 84.0,
            },
            1_000,
            0.5,
            0.3,
        );
        (world, id)
    }

    fn params(escape: f64, intercept: f64, slope: f64) -> SimParams {
        SimParams {
            victim: VictimParams {
                escape_probability: escape,
                retire_intercept: intercept,
                retire_slope: slope,
                ..VictimParams::default()
            },
            ..SimParams::default()
        }
    }

    #[test]
    fn new_victims_start_captive_and_non_negative_age() {
        let (mut world, nepal) = world_with(SimParams::default());
        for _ in 0..200 {
            let id = world.acquire_victim(nepal).unwrap();
            let victim = world.victim(id).unwrap();
            assert_eq!(victim.state(), VictimState::Captive);
            assert!(victim.age(world.year()) >= 0);
        }
    }

    #[test]
    fn certain_escape_moves_victim_to_escapees() {
        let (mut world, nepal) = world_with(params(1.0, -10.0, 2.0));
        let id = world.acquire_victim(nepal).unwrap();

        let transition = step_victim(&mut world, id).unwrap();
        assert_eq!(transition, Transition::Escaped);
        assert_eq!(transition.outcome(), StepOutcome::Continue);

        let loc = world.location(nepal).unwrap();
        assert_eq!(loc.captive_count(), 0);
        assert_eq!(loc.escapees(), &[id]);
        let victim = world.victim(id).unwrap();
        assert!(victim.is_escapee());
        assert!(victim.pending_removal());
        assert_eq!(victim.location(), Some(nepal));
    }

    #[test]
    fn escapees_do_not_evaluate_escape_or_retirement() {
        let (mut world, nepal) = world_with(params(1.0, 1.0, 0.0));
        let id = world.acquire_victim(nepal).unwrap();
        assert_eq!(step_victim(&mut world, id).unwrap(), Transition::Escaped);
        world.take_events();

        // Retirement is certain for a captive here, but the victim has escaped.
        let draws = world.rng().draws();
        assert_eq!(step_victim(&mut world, id).unwrap(), Transition::None);
        assert_eq!(world.rng().draws(), draws);
        assert_eq!(
            world.take_events(),
            vec![SimEvent::Hidden { victim: id }],
            "deferred hide is emitted once"
        );
        assert!(!world.victim(id).unwrap().pending_removal());
    }

    #[test]
    fn retirement_returns_unit_to_population() {
        let (mut world, nepal) = world_with(params(0.0, 1.0, 0.0));
        let before = world.location(nepal).unwrap().headcount();
        let id = world.acquire_victim(nepal).unwrap();
        assert_eq!(world.location(nepal).unwrap().population(), 999);

        let transition = step_victim(&mut world, id).unwrap();
        assert_eq!(transition, Transition::Retired);
        assert_eq!(transition.outcome(), StepOutcome::Finished);
        assert!(world.victim(id).is_none());

        let loc = world.location(nepal).unwrap();
        assert_eq!(loc.population(), 1_000);
        assert_eq!(loc.captive_count(), 0);
        assert_eq!(loc.headcount(), before);
    }

    #[test]
    fn zero_probabilities_leave_captive_in_place() {
        let (mut world, nepal) = world_with(params(0.0, 0.0, 0.0));
        let id = world.acquire_victim(nepal).unwrap();
        for _ in 0..10 {
            assert_eq!(step_victim(&mut world, id).unwrap(), Transition::None);
            world.advance_year();
        }
        assert_eq!(world.location(nepal).unwrap().captives(), &[id]);
    }

    #[test]
    fn removed_victims_finish_quietly() {
        let (mut world, nepal) = world_with(params(0.0, 0.0, 0.0));
        let id = world.acquire_victim(nepal).unwrap();
        world.set_free(id).unwrap();
        let transition = step_victim(&mut world, id).unwrap();
        assert_eq!(transition, Transition::Gone);
        assert_eq!(transition.outcome(), StepOutcome::Finished);
    }

    #[test]
    fn age_grows_with_the_year() {
        let victim = Victim::new(VictimId::new(0), 1995);
        assert_eq!(victim.age(2013), 18);
        assert_eq!(victim.age(2014), 19);
    }
}
