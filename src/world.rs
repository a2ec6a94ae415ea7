use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::SimError;
use crate::events::SimEvent;
use crate::location::{Coordinates, Location};
use crate::network::Network;
use crate::params::SimParams;
use crate::rng::RandomSource;
use crate::route::Route;
use crate::victim::{Victim, VictimState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationId(u32);

impl LocationId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RouteId(u32);

impl RouteId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VictimId(u64);

impl VictimId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Running totals of every transition since the world was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStats {
    pub acquired: u64,
    pub moved: u64,
    pub escaped: u64,
    pub reacquired: u64,
    pub retired: u64,
    pub released: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSnapshot {
    pub id: u32,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub x: f64,
    pub y: f64,
    pub population: u64,
    pub captives: usize,
    pub escapees: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub scenario: String,
    pub year: i32,
    pub sim_time: f64,
    pub total_population: u64,
    pub total_captives: usize,
    pub total_escapees: usize,
    pub stats: FlowStats,
    pub locations: Vec<LocationSnapshot>,
}

/// The simulation context: locations, routes, tracked victims, the year
/// counter and the single random stream. Every rule takes it by `&mut`.
pub struct World {
    start_year: i32,
    year: i32,
    params: SimParams,
    rng: RandomSource,
    locations: Vec<Location>,
    names: HashMap<String, LocationId>,
    routes: Vec<Route>,
    victims: BTreeMap<VictimId, Victim>,
    next_victim: u64,
    stats: FlowStats,
    events: Vec<SimEvent>,
    spawned: Vec<VictimId>,
}

impl World {
    pub fn new(start_year: i32, seed: u64, params: SimParams) -> Self {
        Self {
            start_year,
            year: start_year,
            params,
            rng: RandomSource::new(seed),
            locations: Vec::new(),
            names: HashMap::new(),
            routes: Vec::new(),
            victims: BTreeMap::new(),
            next_victim: 0,
            stats: FlowStats::default(),
            events: Vec::new(),
            spawned: Vec::new(),
        }
    }

    /// Build a world from a validated network description.
    pub fn from_network(
        network: &Network,
        start_year: i32,
        seed: u64,
        params: SimParams,
    ) -> Result<Self, SimError> {
        let mut world = Self::new(start_year, seed, params);
        for spec in &network.locations {
            world.add_location(
                spec.name.clone(),
                spec.coordinates,
                spec.population,
                spec.gender_ratio,
                spec.age_ratio,
            );
        }
        for spec in &network.routes {
            let resolve = |name: &str| {
                world
                    .location_id(name)
                    .ok_or_else(|| SimError::UnknownLocationName(name.to_string()))
            };
            let source = resolve(&spec.source)?;
            let destination = resolve(&spec.destination)?;
            let transit = spec.transit.as_deref().map(resolve).transpose()?;
            world.add_route(Route::new(
                source,
                transit,
                destination,
                spec.source_vol,
                spec.transit_vol,
                spec.dest_vol,
            ))?;
        }
        Ok(world)
    }

    /// Register a location. Names are unique; re-adding a name replaces the
    /// lookup entry, so loaders reject duplicates first.
    pub fn add_location(
        &mut self,
        name: impl Into<String>,
        coordinates: Coordinates,
        population: u64,
        gender_ratio: f64,
        age_ratio: f64,
    ) -> LocationId {
        let id = LocationId(self.locations.len() as u32);
        let location = Location::new(
            id,
            name,
            coordinates,
            population,
            gender_ratio,
            age_ratio,
        )
        .with_demand(self.params.flow.demand);
        self.names.insert(location.name().to_string(), id);
        self.locations.push(location);
        id
    }

    pub fn add_route(&mut self, route: Route) -> Result<RouteId, SimError> {
        for endpoint in route.endpoints() {
            self.location(endpoint)
                .ok_or(SimError::UnknownLocation(endpoint))?;
        }
        if let Some(repeated) = route.repeated_endpoint() {
            return Err(SimError::RepeatedEndpoint(repeated));
        }
        let id = RouteId(self.routes.len() as u32);
        self.routes.push(route);
        Ok(id)
    }

    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn advance_year(&mut self) {
        self.year += 1;
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn rng(&self) -> &RandomSource {
        &self.rng
    }

    pub fn rng_mut(&mut self) -> &mut RandomSource {
        &mut self.rng
    }

    pub fn stats(&self) -> FlowStats {
        self.stats
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn location(&self, id: LocationId) -> Option<&Location> {
        self.locations.get(id.index())
    }

    pub fn location_id(&self, name: &str) -> Option<LocationId> {
        self.names.get(name).copied()
    }

    pub fn location_by_name(&self, name: &str) -> Option<&Location> {
        self.location_id(name).and_then(|id| self.location(id))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn route(&self, id: RouteId) -> Option<&Route> {
        self.routes.get(id.0 as usize)
    }

    pub fn route_ids(&self) -> impl Iterator<Item = RouteId> {
        (0..self.routes.len() as u32).map(RouteId)
    }

    pub fn victim(&self, id: VictimId) -> Option<&Victim> {
        self.victims.get(&id)
    }

    pub fn victim_mut(&mut self, id: VictimId) -> Result<&mut Victim, SimError> {
        self.victims.get_mut(&id).ok_or(SimError::UnknownVictim(id))
    }

    /// Tracked victims in id order.
    pub fn victims(&self) -> impl Iterator<Item = &Victim> {
        self.victims.values()
    }

    pub fn victim_count(&self) -> usize {
        self.victims.len()
    }

    pub fn total_population(&self) -> u64 {
        self.locations.iter().map(Location::population).sum()
    }

    pub fn total_captives(&self) -> usize {
        self.locations.iter().map(Location::captive_count).sum()
    }

    pub fn total_escapees(&self) -> usize {
        self.locations.iter().map(Location::escapee_count).sum()
    }

    /// Population plus both pools over every location. Constant for the life
    /// of a world.
    pub fn total_headcount(&self) -> u64 {
        self.locations.iter().map(Location::headcount).sum()
    }

    pub fn emit(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    /// Events buffered since the last call, in emission order.
    pub fn take_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }

    /// Victims created since the last call; the engine schedules their steps.
    pub fn take_spawned(&mut self) -> Vec<VictimId> {
        std::mem::take(&mut self.spawned)
    }

    /// Abduct one unit of `location`'s population as a new captive.
    pub fn acquire_victim(&mut self, location: LocationId) -> Result<VictimId, SimError> {
        let slot = slot(&mut self.locations, location)?;
        if slot.population() == 0 {
            return Err(SimError::PopulationExhausted {
                location: slot.name().to_string(),
            });
        }
        let params = self.params.victim;
        let sampled = self.rng.gaussian() * params.age_std_dev + params.age_mean;
        let age = sampled.round().max(0.0) as i32;

        let id = VictimId(self.next_victim);
        let mut victim = Victim::new(id, self.year - age);
        slot.add_from_population(&mut victim)?;
        self.next_victim += 1;
        self.victims.insert(id, victim);
        self.spawned.push(id);
        self.stats.acquired += 1;
        self.events.push(SimEvent::Created {
            victim: id,
            location,
        });
        Ok(id)
    }

    /// Move one uniformly chosen captive from `from` to `to`.
    pub fn transfer_random_captive(
        &mut self,
        from: LocationId,
        to: LocationId,
    ) -> Result<VictimId, SimError> {
        slot(&mut self.locations, to)?;
        let origin = slot(&mut self.locations, from)?;
        let id = origin.extract_random_captive(&mut self.rng)?;
        let victim = tracked(&mut self.victims, id)?;
        victim.detach();
        slot(&mut self.locations, to)?.add_from_transfer(victim);
        self.stats.moved += 1;
        self.events.push(SimEvent::Moved {
            victim: id,
            from,
            to,
        });
        Ok(id)
    }

    /// Return one uniformly chosen escapee of `location` to its captives.
    pub fn reacquire_random_escapee(&mut self, location: LocationId) -> Result<VictimId, SimError> {
        let slot = slot(&mut self.locations, location)?;
        let id = slot.extract_random_escapee(&mut self.rng)?;
        let victim = tracked(&mut self.victims, id)?;
        victim.detach();
        slot.add_from_transfer(victim);
        victim.set_state(VictimState::Captive);
        victim.set_pending_removal(false);
        self.stats.reacquired += 1;
        self.events.push(SimEvent::Moved {
            victim: id,
            from: location,
            to: location,
        });
        Ok(id)
    }

    /// Captive -> Escapee at the victim's current location.
    pub fn escape(&mut self, id: VictimId) -> Result<(), SimError> {
        let victim = tracked(&mut self.victims, id)?;
        let location = victim.location().ok_or(SimError::DetachedVictim(id))?;
        let slot = slot(&mut self.locations, location)?;
        if !slot.remove_captive(id) {
            return Err(SimError::EmptyPool {
                location: slot.name().to_string(),
                pool: crate::error::Pool::Captives,
            });
        }
        slot.add_escapee(id);
        victim.set_state(VictimState::Escapee);
        victim.set_pending_removal(true);
        self.stats.escaped += 1;
        Ok(())
    }

    /// Retirement on the victim's own step.
    pub fn retire(&mut self, id: VictimId) -> Result<(), SimError> {
        self.remove_captive_to_population(id)?;
        self.stats.retired += 1;
        Ok(())
    }

    /// Forced release by an immigration sweep.
    pub fn set_free(&mut self, id: VictimId) -> Result<(), SimError> {
        self.remove_captive_to_population(id)?;
        self.stats.released += 1;
        Ok(())
    }

    /// One fresh demand draw for `location`.
    pub fn demand_factor(&mut self, location: LocationId) -> Result<f64, SimError> {
        let slot = self
            .locations
            .get(location.index())
            .ok_or(SimError::UnknownLocation(location))?;
        Ok(slot.demand_factor(&mut self.rng))
    }

    /// Run `location`'s annual immigration sweep. Returns the released
    /// victim, if any.
    pub fn immigration_sweep(
        &mut self,
        location: LocationId,
    ) -> Result<Option<VictimId>, SimError> {
        let probability = self.params.flow.immigration_sweep_probability;
        let target = self
            .locations
            .get(location.index())
            .ok_or(SimError::UnknownLocation(location))?
            .sweep_target(&mut self.rng, probability);
        if let Some(id) = target {
            self.set_free(id)?;
            trace!(
                victim = id.raw(),
                location = location.raw(),
                "victim set free"
            );
        }
        Ok(target)
    }

    pub fn snapshot(&self, scenario: &str, sim_time: f64) -> WorldSnapshot {
        let locations = self
            .locations
            .iter()
            .map(|location| LocationSnapshot {
                id: location.id().raw(),
                name: location.name().to_string(),
                latitude: location.coordinates().latitude,
                longitude: location.coordinates().longitude,
                x: location.position().x,
                y: location.position().y,
                population: location.population(),
                captives: location.captive_count(),
                escapees: location.escapee_count(),
            })
            .collect();
        WorldSnapshot {
            scenario: scenario.to_string(),
            year: self.year,
            sim_time,
            total_population: self.total_population(),
            total_captives: self.total_captives(),
            total_escapees: self.total_escapees(),
            stats: self.stats,
            locations,
        }
    }

    /// Every broken membership rule, described. Empty when the pools and the
    /// victim records agree.
    pub fn membership_violations(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut seen: HashMap<VictimId, usize> = HashMap::new();
        for location in &self.locations {
            let pools = [
                (location.captives(), VictimState::Captive),
                (location.escapees(), VictimState::Escapee),
            ];
            for (pool, expected) in pools {
                for id in pool {
                    *seen.entry(*id).or_default() += 1;
                    match self.victims.get(id) {
                        None => problems.push(format!(
                            "{} holds untracked victim {}",
                            location.name(),
                            id.raw()
                        )),
                        Some(victim) => {
                            if victim.state() != expected {
                                problems.push(format!(
                                    "victim {} is {:?} but sits in a {:?} pool of {}",
                                    id.raw(),
                                    victim.state(),
                                    expected,
                                    location.name()
                                ));
                            }
                            if victim.location() != Some(location.id()) {
                                problems.push(format!(
                                    "victim {} points at {:?} but sits in {}",
                                    id.raw(),
                                    victim.location(),
                                    location.name()
                                ));
                            }
                        }
                    }
                }
            }
        }
        for (id, count) in &seen {
            if *count > 1 {
                problems.push(format!("victim {} appears in {count} pools", id.raw()));
            }
        }
        for id in self.victims.keys() {
            if !seen.contains_key(id) {
                problems.push(format!("victim {} is tracked but in no pool", id.raw()));
            }
        }
        problems
    }

    fn remove_captive_to_population(&mut self, id: VictimId) -> Result<(), SimError> {
        let victim = self.victims.get(&id).ok_or(SimError::UnknownVictim(id))?;
        let location = victim.location().ok_or(SimError::DetachedVictim(id))?;
        let slot = slot(&mut self.locations, location)?;
        if !slot.release_captive(id) {
            return Err(SimError::EmptyPool {
                location: slot.name().to_string(),
                pool: crate::error::Pool::Captives,
            });
        }
        self.victims.remove(&id);
        self.events.push(SimEvent::Hidden { victim: id });
        Ok(())
    }
}

fn slot(locations: &mut [Location], id: LocationId) -> Result<&mut Location, SimError> {
    locations
        .get_mut(id.index())
        .ok_or(SimError::UnknownLocation(id))
}

fn tracked(
    victims: &mut BTreeMap<VictimId, Victim>,
    id: VictimId,
) -> Result<&mut Victim, SimError> {
    victims.get_mut(&id).ok_or(SimError::UnknownVictim(id))
}
