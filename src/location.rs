use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Pool, SimError};
use crate::params::DemandRange;
use crate::rng::RandomSource;
use crate::victim::Victim;
use crate::world::{LocationId, VictimId};

const MAP_WIDTH_PX: f64 = 800.0;
const MAP_HEIGHT_PX: f64 = 600.0;
const PRIME_MERIDIAN_PX: f64 = 360.0;
const EQUATOR_PX: f64 = 335.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Degrees north (negative is south).
    pub latitude: f64,
    /// Degrees east (negative is west).
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl Coordinates {
    /// Position on the 800x600 world map used by renderers.
    pub fn projected(&self) -> ScreenPoint {
        ScreenPoint {
            x: MAP_WIDTH_PX * self.longitude / 360.0 + PRIME_MERIDIAN_PX,
            y: MAP_HEIGHT_PX * -self.latitude / 360.0 + EQUATOR_PX,
        }
    }
}

/// A place victims can be abducted from, held in, or moved through.
///
/// The location owns pool membership and its population count. Victim records
/// live in the world; operations that rebind a victim take it by `&mut`.
#[derive(Debug, Clone)]
pub struct Location {
    id: LocationId,
    name: String,
    coordinates: Coordinates,
    position: ScreenPoint,
    population: u64,
    gender_ratio: f64,
    age_ratio: f64,
    demand: DemandRange,
    captives: Members,
    escapees: Members,
}

impl Location {
    pub fn new(
        id: LocationId,
        name: impl Into<String>,
        coordinates: Coordinates,
        population: u64,
        gender_ratio: f64,
        age_ratio: f64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            coordinates,
            position: coordinates.projected(),
            population,
            gender_ratio,
            age_ratio,
            demand: DemandRange::default(),
            captives: Members::default(),
            escapees: Members::default(),
        }
    }

    pub fn with_demand(mut self, demand: DemandRange) -> Self {
        self.demand = demand;
        self
    }

    pub fn id(&self) -> LocationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn coordinates(&self) -> Coordinates {
        self.coordinates
    }

    pub fn position(&self) -> ScreenPoint {
        self.position
    }

    pub fn population(&self) -> u64 {
        self.population
    }

    pub fn captives(&self) -> &[VictimId] {
        self.captives.as_slice()
    }

    pub fn escapees(&self) -> &[VictimId] {
        self.escapees.as_slice()
    }

    pub fn captive_count(&self) -> usize {
        self.captives.len()
    }

    pub fn escapee_count(&self) -> usize {
        self.escapees.len()
    }

    /// Population plus everyone held in either pool.
    pub fn headcount(&self) -> u64 {
        self.population + self.captives.len() as u64 + self.escapees.len() as u64
    }

    /// Size of the pool acquisition draws from. Nobody is removed.
    pub fn eligible_count(&self) -> u64 {
        (self.population as f64 * self.gender_ratio * self.age_ratio).floor() as u64
    }

    /// One fresh demand draw.
    pub fn demand_factor(&self, rng: &mut RandomSource) -> f64 {
        rng.uniform_range(self.demand.min, self.demand.max)
    }

    /// Move one unit of population into the captive pool as `victim`.
    pub fn add_from_population(&mut self, victim: &mut Victim) -> Result<(), SimError> {
        if self.population == 0 {
            return Err(SimError::PopulationExhausted {
                location: self.name.clone(),
            });
        }
        self.population -= 1;
        self.attach_captive(victim);
        Ok(())
    }

    /// Attach a victim detached from some other pool.
    pub fn add_from_transfer(&mut self, victim: &mut Victim) {
        self.attach_captive(victim);
    }

    /// Returns false if `victim` already was an escapee here.
    pub fn add_escapee(&mut self, victim: VictimId) -> bool {
        self.escapees.insert(victim)
    }

    pub fn remove_escapee(&mut self, victim: VictimId) -> bool {
        self.escapees.remove(victim)
    }

    pub fn remove_captive(&mut self, victim: VictimId) -> bool {
        self.captives.remove(victim)
    }

    /// Drop a captive from the pool and return the unit to the population.
    pub fn release_captive(&mut self, victim: VictimId) -> bool {
        let removed = self.remove_captive(victim);
        if removed {
            self.population += 1;
        }
        removed
    }

    /// Detach a uniformly chosen captive. The caller owns rebinding it.
    pub fn extract_random_captive(
        &mut self,
        rng: &mut RandomSource,
    ) -> Result<VictimId, SimError> {
        self.captives
            .extract_random(rng)
            .ok_or_else(|| self.empty_pool(Pool::Captives))
    }

    /// Detach a uniformly chosen escapee. The caller owns rebinding it.
    pub fn extract_random_escapee(
        &mut self,
        rng: &mut RandomSource,
    ) -> Result<VictimId, SimError> {
        self.escapees
            .extract_random(rng)
            .ok_or_else(|| self.empty_pool(Pool::Escapees))
    }

    fn empty_pool(&self, pool: Pool) -> SimError {
        SimError::EmptyPool {
            location: self.name.clone(),
            pool,
        }
    }

    /// Decide this year's immigration sweep. On success returns the captive to
    /// set free; the pool is left untouched.
    pub fn sweep_target(&self, rng: &mut RandomSource, probability: f64) -> Option<VictimId> {
        if !rng.chance(probability) || self.captives.is_empty() {
            return None;
        }
        let index = rng.index(self.captives.len());
        self.captives.as_slice().get(index).copied()
    }

    fn attach_captive(&mut self, victim: &mut Victim) {
        let inserted = self.captives.insert(victim.id());
        debug_assert!(inserted, "duplicate captive");
        victim.attach(self.id);
    }
}

/// Insertion-ordered set of victims with O(1) membership edits. Removal swaps
/// the last member into the freed slot, so order is deterministic but not
/// stable.
#[derive(Debug, Clone, Default)]
struct Members {
    order: Vec<VictimId>,
    slots: HashMap<VictimId, usize>,
}

impl Members {
    fn as_slice(&self) -> &[VictimId] {
        &self.order
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn insert(&mut self, victim: VictimId) -> bool {
        if self.slots.contains_key(&victim) {
            return false;
        }
        self.slots.insert(victim, self.order.len());
        self.order.push(victim);
        true
    }

    fn remove(&mut self, victim: VictimId) -> bool {
        match self.slots.remove(&victim) {
            Some(index) => {
                self.take_at(index);
                true
            }
            None => false,
        }
    }

    fn extract_random(&mut self, rng: &mut RandomSource) -> Option<VictimId> {
        if self.is_empty() {
            return None;
        }
        let index = rng.index(self.len());
        let victim = self.take_at(index);
        self.slots.remove(&victim);
        Some(victim)
    }

    fn take_at(&mut self, index: usize) -> VictimId {
        let victim = self.order.swap_remove(index);
        if let Some(moved) = self.order.get(index) {
            self.slots.insert(*moved, index);
        }
        victim
    }
}
