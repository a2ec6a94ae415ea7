//! Route flow
//!
//! Once a year a route acquires new victims at its source, moves captives
//! along its edge and gives escapees at its endpoints a chance of being
//! reacquired. Every count is clamped to what the origin pool holds before
//! anything is extracted.

use serde::Serialize;
use tracing::debug;

use crate::error::SimError;
use crate::world::{LocationId, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Route {
    pub source: LocationId,
    pub transit: Option<LocationId>,
    pub destination: LocationId,
    /// Historical annual volume estimates; 0 means "no estimate".
    pub source_vol: u32,
    pub transit_vol: u32,
    pub dest_vol: u32,
}

/// Counts produced by one route year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteYear {
    pub acquired: u64,
    pub moved: u64,
    pub reacquired: u64,
    pub released: u64,
}

impl Route {
    pub fn new(
        source: LocationId,
        transit: Option<LocationId>,
        destination: LocationId,
        source_vol: u32,
        transit_vol: u32,
        dest_vol: u32,
    ) -> Self {
        Self {
            source,
            transit,
            destination,
            source_vol,
            transit_vol,
            dest_vol,
        }
    }

    pub fn direct(
        source: LocationId,
        destination: LocationId,
        source_vol: u32,
        dest_vol: u32,
    ) -> Self {
        Self::new(source, None, destination, source_vol, 0, dest_vol)
    }

    /// Source, transit (if any), destination.
    pub fn endpoints(&self) -> Vec<LocationId> {
        let mut endpoints = vec![self.source];
        endpoints.extend(self.transit);
        endpoints.push(self.destination);
        endpoints
    }

    pub fn repeated_endpoint(&self) -> Option<LocationId> {
        let endpoints = self.endpoints();
        endpoints
            .iter()
            .enumerate()
            .find(|(i, id)| endpoints[..*i].contains(id))
            .map(|(_, id)| *id)
    }

    /// Mean of the nonzero volume estimates. The transit estimate only counts
    /// when the route has a transit.
    pub fn estimated_volume(&self) -> f64 {
        let mut volumes = vec![self.source_vol, self.dest_vol];
        if self.transit.is_some() {
            volumes.push(self.transit_vol);
        }
        let known: Vec<f64> = volumes
            .into_iter()
            .filter(|vol| *vol > 0)
            .map(f64::from)
            .collect();
        if known.is_empty() {
            0.0
        } else {
            known.iter().sum::<f64>() / known.len() as f64
        }
    }

    pub fn describe(&self, world: &World) -> String {
        let name = |id: LocationId| {
            world
                .location(id)
                .map(|location| location.name().to_string())
                .unwrap_or_else(|| format!("#{}", id.raw()))
        };
        match self.transit {
            Some(transit) => format!(
                "{} -> {} -> {}",
                name(self.source),
                name(transit),
                name(self.destination)
            ),
            None => format!("{} -> {}", name(self.source), name(self.destination)),
        }
    }

    /// One full year: acquisition, movement, reacquisition, then immigration
    /// sweeps at transit and destination.
    pub fn run_year(&self, world: &mut World) -> Result<RouteYear, SimError> {
        let acquired = self.acquire(world)?;
        let moved = self.move_victims(world)?;
        let reacquired = self.reacquire(world)?;
        let released = self.sweep(world)?;
        let year = RouteYear {
            acquired,
            moved,
            reacquired,
            released,
        };
        debug!(
            route = %self.describe(world),
            year = world.year(),
            acquired,
            moved,
            reacquired,
            released,
            "route year complete"
        );
        Ok(year)
    }

    /// Number of victims acquisition would create this year. Consumes one
    /// Gaussian draw and one demand draw.
    pub fn planned_acquisitions(&self, world: &mut World) -> Result<u64, SimError> {
        let noise = world.params().flow.acquisition_noise;
        let source = world
            .location(self.source)
            .ok_or(SimError::UnknownLocation(self.source))?;
        let eligible = source.eligible_count();
        let available = source.population();

        let outflow = eligible as f64 * self.estimated_volume() / 100.0;
        let raw_estimate = outflow + world.rng_mut().gaussian() * noise * outflow;
        let this_year = raw_estimate * world.demand_factor(self.destination)?;
        let wanted = (this_year / 100.0).round();
        if !wanted.is_finite() || wanted <= 0.0 {
            return Ok(0);
        }
        Ok((wanted as u64).min(available))
    }

    /// Phase 1: create this year's victims at the source.
    pub fn acquire(&self, world: &mut World) -> Result<u64, SimError> {
        let count = self.planned_acquisitions(world)?;
        for _ in 0..count {
            world.acquire_victim(self.source)?;
        }
        Ok(count)
    }

    /// Phase 2: transit -> destination then source -> transit, or a single
    /// source -> destination hop.
    pub fn move_victims(&self, world: &mut World) -> Result<u64, SimError> {
        let derating = world.params().flow.transit_derating;
        match self.transit {
            Some(transit) => {
                let onward = self.transfer(world, transit, self.destination, Some(derating))?;
                let inbound = self.transfer(world, self.source, transit, Some(derating))?;
                Ok(onward + inbound)
            }
            None => self.transfer(world, self.source, self.destination, None),
        }
    }

    /// Phase 3: each escapee at every endpoint may be taken back.
    pub fn reacquire(&self, world: &mut World) -> Result<u64, SimError> {
        let mut total = 0;
        for location in self.endpoints() {
            total += reacquire_at(world, location)?;
        }
        Ok(total)
    }

    /// Immigration sweeps at transit (if any) and destination.
    pub fn sweep(&self, world: &mut World) -> Result<u64, SimError> {
        let mut released = 0;
        for location in self.transit.into_iter().chain([self.destination]) {
            if world.immigration_sweep(location)?.is_some() {
                released += 1;
            }
        }
        Ok(released)
    }

    fn transfer(
        &self,
        world: &mut World,
        from: LocationId,
        to: LocationId,
        derating: Option<f64>,
    ) -> Result<u64, SimError> {
        let available = world
            .location(from)
            .ok_or(SimError::UnknownLocation(from))?
            .captive_count();
        let demand = world.demand_factor(self.destination)?;
        let count = transfer_count(demand, available, derating);
        for _ in 0..count {
            world.transfer_random_captive(from, to)?;
        }
        Ok(count as u64)
    }
}

/// `round(demand * available)`, cut back when it exceeds `available`: to
/// `round(derating * available)` when a derating applies, else to `available`.
/// Never more than `available`.
pub fn transfer_count(demand: f64, available: usize, derating: Option<f64>) -> usize {
    let wanted = (demand * available as f64).round();
    if !wanted.is_finite() || wanted <= 0.0 {
        return 0;
    }
    let wanted = wanted as usize;
    if wanted <= available {
        return wanted;
    }
    match derating {
        Some(share) => {
            let derated = (share * available as f64).round().max(0.0) as usize;
            derated.min(available)
        }
        None => available,
    }
}

fn reacquire_at(world: &mut World, location: LocationId) -> Result<u64, SimError> {
    let probability = world.params().flow.reacquire_probability;
    let escapees = world
        .location(location)
        .ok_or(SimError::UnknownLocation(location))?
        .escapee_count();
    let mut taken = 0;
    for _ in 0..escapees {
        if world.rng_mut().chance(probability) {
            world.reacquire_random_escapee(location)?;
            taken += 1;
        }
    }
    Ok(taken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SimEvent;
    use crate::location::Coordinates;
    use crate::params::{DemandRange, FlowParams, SimParams, VictimParams};

    fn coords() -> Coordinates {
        Coordinates {
            latitude: 10.0,
            longitude: 10.0,
        }
    }

    fn neutral_params() -> SimParams {
        SimParams {
            flow: FlowParams {
                demand: DemandRange::fixed(1.0),
                acquisition_noise: 0.0,
                ..FlowParams::default()
            },
            victim: VictimParams::default(),
        }
    }

    #[test]
    fn estimated_volume_averages_known_values() {
        let a = LocationId::new(0);
        let b = LocationId::new(1);
        let c = LocationId::new(2);
        assert_eq!(Route::direct(a, b, 50, 60).estimated_volume(), 55.0);
        assert_eq!(Route::direct(a, b, 50, 0).estimated_volume(), 50.0);
        assert_eq!(Route::direct(a, b, 0, 0).estimated_volume(), 0.0);
        let via = Some(c);
        assert_eq!(Route::new(a, via, b, 30, 60, 90).estimated_volume(), 60.0);
        assert_eq!(Route::new(a, via, b, 30, 0, 90).estimated_volume(), 60.0);
        // Without a transit the transit estimate is ignored.
        assert_eq!(Route::new(a, None, b, 30, 600, 90).estimated_volume(), 60.0);
    }

    #[test]
    fn transfer_count_clamps() {
        assert_eq!(transfer_count(1.0, 10, None), 10);
        assert_eq!(transfer_count(0.5, 10, None), 5);
        assert_eq!(transfer_count(1.1, 10, None), 10);
        assert_eq!(transfer_count(1.1, 10, Some(0.9)), 9);
        assert_eq!(transfer_count(1.04, 10, Some(0.9)), 10);
        assert_eq!(transfer_count(0.0, 10, Some(0.9)), 0);
        assert_eq!(transfer_count(-1.0, 10, None), 0);
        assert_eq!(transfer_count(1.1, 0, Some(0.9)), 0);
        for available in 0..40 {
            for step in 0..=30 {
                let demand = step as f64 * 0.1;
                assert!(transfer_count(demand, available, Some(0.9)) <= available);
                assert!(transfer_count(demand, available, None) <= available);
            }
        }
    }

    #[test]
    fn neutral_acquisition_matches_hand_computation() {
        for _ in 0..2 {
            let mut world = World::new(2013, 99, neutral_params());
            let a = world.add_location("A", coords(), 100_000, 0.5, 0.3);
            let b = world.add_location("B", coords(), 10, 0.5, 0.3);
            let route = Route::direct(a, b, 50, 60);
            assert_eq!(world.location(a).unwrap().eligible_count(), 15_000);
            assert_eq!(route.acquire(&mut world).unwrap(), 83);
            assert_eq!(world.location(a).unwrap().captive_count(), 83);
            assert_eq!(world.location(a).unwrap().population(), 100_000 - 83);
        }
    }

    #[test]
    fn acquisition_never_exceeds_population() {
        let mut world = World::new(2013, 5, neutral_params());
        let a = world.add_location("A", coords(), 120, 1.0, 1.0);
        let b = world.add_location("B", coords(), 10, 1.0, 1.0);
        let route = Route::direct(a, b, 60_000, 60_000);
        assert_eq!(route.acquire(&mut world).unwrap(), 120);
        assert_eq!(world.location(a).unwrap().population(), 0);
        assert_eq!(route.acquire(&mut world).unwrap(), 0);
    }

    #[test]
    fn zero_demand_or_volume_acquires_nobody() {
        let mut params = neutral_params();
        params.flow.demand = DemandRange::fixed(0.0);
        let mut world = World::new(2013, 5, params);
        let a = world.add_location("A", coords(), 100_000, 0.5, 0.3);
        let b = world.add_location("B", coords(), 10, 0.5, 0.3);
        assert_eq!(Route::direct(a, b, 50, 60).acquire(&mut world).unwrap(), 0);
        assert_eq!(Route::direct(a, b, 0, 0).acquire(&mut world).unwrap(), 0);
        assert_eq!(world.victim_count(), 0);
    }

    #[test]
    fn direct_route_moves_everyone_at_neutral_demand() {
        let mut world = World::new(2013, 5, neutral_params());
        let a = world.add_location("A", coords(), 1_000, 1.0, 1.0);
        let b = world.add_location("B", coords(), 1_000, 1.0, 1.0);
        for _ in 0..12 {
            world.acquire_victim(a).unwrap();
        }
        let route = Route::direct(a, b, 0, 0);
        assert_eq!(route.move_victims(&mut world).unwrap(), 12);
        assert_eq!(world.location(a).unwrap().captive_count(), 0);
        assert_eq!(world.location(b).unwrap().captive_count(), 12);
        assert!(world.membership_violations().is_empty());
    }

    #[test]
    fn transit_route_moves_onward_before_inbound() {
        let mut params = neutral_params();
        params.flow.demand = DemandRange::fixed(1.5);
        let mut world = World::new(2013, 5, params);
        let src = world.add_location("Src", coords(), 1_000, 1.0, 1.0);
        let via = world.add_location("Via", coords(), 1_000, 1.0, 1.0);
        let dst = world.add_location("Dst", coords(), 1_000, 1.0, 1.0);
        for _ in 0..10 {
            world.acquire_victim(src).unwrap();
        }
        for _ in 0..20 {
            world.acquire_victim(via).unwrap();
        }
        let route = Route::new(src, Some(via), dst, 0, 0, 0);
        // Via -> Dst: 1.5 * 20 > 20, derated to 18. Src -> Via: derated to 9.
        assert_eq!(route.move_victims(&mut world).unwrap(), 27);
        assert_eq!(world.location(dst).unwrap().captive_count(), 18);
        assert_eq!(world.location(via).unwrap().captive_count(), 2 + 9);
        assert_eq!(world.location(src).unwrap().captive_count(), 1);
        assert!(world.membership_violations().is_empty());
    }

    #[test]
    fn certain_reacquisition_empties_escapee_pools_in_place() {
        let mut params = neutral_params();
        params.flow.reacquire_probability = 1.0;
        let mut world = World::new(2013, 5, params);
        let a = world.add_location("A", coords(), 100, 1.0, 1.0);
        let b = world.add_location("B", coords(), 100, 1.0, 1.0);
        let mut escaped_at_b = Vec::new();
        for _ in 0..3 {
            let id = world.acquire_victim(b).unwrap();
            world.escape(id).unwrap();
            escaped_at_b.push(id);
        }
        let route = Route::direct(a, b, 0, 0);
        assert_eq!(route.reacquire(&mut world).unwrap(), 3);
        let pool_b = world.location(b).unwrap();
        assert_eq!(pool_b.escapee_count(), 0);
        for id in escaped_at_b {
            assert!(pool_b.captives().contains(&id));
        }
        assert_eq!(world.location(a).unwrap().captive_count(), 0);
    }

    #[test]
    fn empty_pools_make_a_year_a_no_op_apart_from_acquisition() {
        let mut params = neutral_params();
        params.flow.demand = DemandRange::fixed(0.0);
        let mut world = World::new(2013, 5, params);
        let a = world.add_location("A", coords(), 5_000, 0.5, 0.3);
        let b = world.add_location("B", coords(), 5_000, 0.5, 0.3);
        let route = Route::direct(a, b, 50, 60);
        let year = route.run_year(&mut world).unwrap();
        assert_eq!(year, RouteYear::default());
        assert_eq!(world.location(a).unwrap().population(), 5_000);
        assert_eq!(world.location(b).unwrap().population(), 5_000);
        assert!(world.take_events().is_empty());
    }

    #[test]
    fn acquisition_noise_scales_with_outflow() {
        let mut params = neutral_params();
        params.flow.acquisition_noise = 0.1;
        let counts: Vec<f64> = (0..200)
            .map(|seed| {
                let mut world = World::new(2013, seed, params);
                let a = world.add_location("A", coords(), 100_000, 0.5, 0.3);
                let b = world.add_location("B", coords(), 10, 0.5, 0.3);
                let planned = Route::direct(a, b, 50, 60)
                    .planned_acquisitions(&mut world)
                    .unwrap();
                planned as f64
            })
            .collect();

        assert!(counts.iter().all(|n| (0.0..=166.0).contains(n)));
        let mean = counts.iter().sum::<f64>() / counts.len() as f64;
        let variance =
            counts.iter().map(|n| (n - mean).powi(2)).sum::<f64>() / (counts.len() - 1) as f64;
        // Outflow 8250 with 10% noise puts the count at 83 +/- 8.25.
        assert!((80.0..=86.0).contains(&mean), "mean {mean}");
        let std_dev = variance.sqrt();
        assert!((6.0..=11.0).contains(&std_dev), "std dev {std_dev}");
    }

    #[test]
    fn sweeps_skip_the_source() {
        let mut params = neutral_params();
        params.flow.immigration_sweep_probability = 1.0;
        let mut world = World::new(2013, 5, params);
        let src = world.add_location("Src", coords(), 100, 1.0, 1.0);
        let via = world.add_location("Via", coords(), 100, 1.0, 1.0);
        let dst = world.add_location("Dst", coords(), 100, 1.0, 1.0);
        for location in [src, via, dst] {
            for _ in 0..3 {
                world.acquire_victim(location).unwrap();
            }
        }
        let held_at_via = world.location(via).unwrap().captives().to_vec();
        world.take_events();

        let route = Route::new(src, Some(via), dst, 0, 0, 0);
        assert_eq!(route.sweep(&mut world).unwrap(), 2);
        assert_eq!(world.location(src).unwrap().captive_count(), 3);
        assert_eq!(world.location(via).unwrap().captive_count(), 2);
        assert_eq!(world.location(dst).unwrap().captive_count(), 2);
        assert_eq!(world.location(via).unwrap().population(), 98);

        // Transit is swept before the destination.
        let hidden: Vec<_> = world.take_events().iter().map(SimEvent::victim).collect();
        assert_eq!(hidden.len(), 2);
        assert!(held_at_via.contains(&hidden[0]));
        assert!(world.membership_violations().is_empty());
    }

    #[test]
    fn repeated_endpoints_are_reported() {
        let a = LocationId::new(0);
        let b = LocationId::new(1);
        assert_eq!(Route::direct(a, b, 1, 1).repeated_endpoint(), None);
        assert_eq!(Route::direct(a, a, 1, 1).repeated_endpoint(), Some(a));
        assert_eq!(
            Route::new(a, Some(b), b, 1, 1, 1).repeated_endpoint(),
            Some(b)
        );
    }
}
