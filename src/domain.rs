//! Domain model for the vehicle routing problem.
//!
//! A [`RoutePlan`] owns the visits (an immutable arena shared by every
//! snapshot of the plan) and the vehicles, each of which owns its route as an
//! ordered sequence of [`VisitIdx`]. The per-vehicle sequence is the source of
//! truth: a visit's vehicle, previous and next visit are answered from a
//! placement index rebuilt from the routes, never stored on the visit.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::haversine;
use crate::score::HardSoftScore;

/// A (latitude, longitude) coordinate, `[lat, lng]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn coords(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// Estimated driving time to `other` in whole seconds.
    pub fn driving_time_seconds(&self, other: &Location) -> i64 {
        haversine::driving_seconds(self.coords(), other.coords(), haversine::DEFAULT_SPEED_KMH)
    }
}

impl From<[f64; 2]> for Location {
    fn from([latitude, longitude]: [f64; 2]) -> Self {
        Self { latitude, longitude }
    }
}

impl From<Location> for [f64; 2] {
    fn from(location: Location) -> Self {
        [location.latitude, location.longitude]
    }
}

/// Position of a visit in the plan's visit arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VisitIdx(pub usize);

impl VisitIdx {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A work item with a location, a demand, a service duration and a time window.
#[derive(Debug, Clone, PartialEq)]
pub struct Visit {
    pub id: String,
    pub name: String,
    pub location: Location,
    pub demand: i32,
    pub min_start_time: NaiveDateTime,
    pub max_end_time: NaiveDateTime,
    pub service_duration: TimeDelta,
}

/// A mobile resource with a capacity and a home location.
#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    pub id: String,
    pub capacity: i32,
    pub home_location: Location,
    pub departure_time: NaiveDateTime,
    visits: Vec<VisitIdx>,
}

impl Vehicle {
    pub fn new(
        id: impl Into<String>,
        capacity: i32,
        home_location: Location,
        departure_time: NaiveDateTime,
    ) -> Self {
        Self {
            id: id.into(),
            capacity,
            home_location,
            departure_time,
            visits: Vec::new(),
        }
    }

    /// Replaces the route. Validation happens when the vehicle joins a plan.
    pub fn with_route(mut self, visits: Vec<VisitIdx>) -> Self {
        self.visits = visits;
        self
    }

    /// The route in visiting order.
    pub fn visits(&self) -> &[VisitIdx] {
        &self.visits
    }
}

/// Lifecycle of the solving job associated with a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolverStatus {
    NotSolving,
    SolvingScheduled,
    SolvingActive,
    Terminated,
}

impl SolverStatus {
    pub fn is_solving(self) -> bool {
        matches!(self, SolverStatus::SolvingScheduled | SolverStatus::SolvingActive)
    }
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SolverStatus::NotSolving => "NOT_SOLVING",
            SolverStatus::SolvingScheduled => "SOLVING_SCHEDULED",
            SolverStatus::SolvingActive => "SOLVING_ACTIVE",
            SolverStatus::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("duplicate visit id `{0}`")]
    DuplicateVisitId(String),
    #[error("duplicate vehicle id `{0}`")]
    DuplicateVehicleId(String),
    #[error("expected {expected} routes, got {found}")]
    RouteCountMismatch { expected: usize, found: usize },
    #[error("visit index {0} is out of range")]
    UnknownVisit(usize),
    #[error("visit `{visit}` is on the routes of both `{first}` and `{second}`")]
    VisitOnMultipleRoutes {
        visit: String,
        first: String,
        second: String,
    },
    #[error("visit `{visit}` appears more than once on the route of `{vehicle}`")]
    VisitRepeatedInRoute { visit: String, vehicle: String },
}

/// Where a visit sits: owning vehicle index and position within its route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub vehicle: usize,
    pub position: usize,
}

/// Timing of one stop along a vehicle's route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopTiming {
    pub visit: VisitIdx,
    pub driving_seconds_from_previous: i64,
    pub arrival_time: NaiveDateTime,
    pub start_service_time: NaiveDateTime,
    pub departure_time: NaiveDateTime,
}

impl StopTiming {
    /// Minutes by which service ends after the visit's window closes, rounded up.
    pub fn finished_delay_minutes(&self, visit: &Visit) -> i64 {
        let late = (self.departure_time - visit.max_end_time).num_seconds();
        if late <= 0 { 0 } else { (late + 59) / 60 }
    }
}

/// Derived schedule of a single vehicle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSchedule {
    pub stops: Vec<StopTiming>,
    pub total_demand: i64,
    /// Includes the drive back to the home location.
    pub total_driving_seconds: i64,
    /// Time the vehicle is back home; the departure time for an empty route.
    pub arrival_time: NaiveDateTime,
}

/// The aggregate root: every vehicle with its route, and every visit.
#[derive(Debug, Clone)]
pub struct RoutePlan {
    pub name: String,
    pub south_west_corner: Location,
    pub north_east_corner: Location,
    pub start_date_time: Option<NaiveDateTime>,
    pub end_date_time: Option<NaiveDateTime>,
    visits: Arc<[Visit]>,
    vehicles: Vec<Vehicle>,
    placements: Vec<Option<Placement>>,
    score: Option<HardSoftScore>,
}

impl RoutePlan {
    /// Builds a plan, checking id uniqueness and that every route references
    /// known visits with no visit placed twice.
    pub fn new(
        name: impl Into<String>,
        visits: Vec<Visit>,
        vehicles: Vec<Vehicle>,
    ) -> Result<Self, PlanError> {
        let mut seen = HashSet::new();
        if let Some(visit) = visits.iter().find(|visit| !seen.insert(visit.id.as_str())) {
            return Err(PlanError::DuplicateVisitId(visit.id.clone()));
        }
        let mut seen = HashSet::new();
        if let Some(vehicle) = vehicles.iter().find(|vehicle| !seen.insert(vehicle.id.as_str())) {
            return Err(PlanError::DuplicateVehicleId(vehicle.id.clone()));
        }

        let placements = placements_for(&visits, &vehicles)?;
        let (south_west_corner, north_east_corner) = bounding_box(&visits, &vehicles);

        Ok(Self {
            name: name.into(),
            south_west_corner,
            north_east_corner,
            start_date_time: None,
            end_date_time: None,
            visits: visits.into(),
            vehicles,
            placements,
            score: None,
        })
    }

    /// A snapshot of this plan with every route replaced. Visits are shared,
    /// not copied. The score is cleared.
    pub fn with_routes(&self, routes: Vec<Vec<VisitIdx>>) -> Result<Self, PlanError> {
        if routes.len() != self.vehicles.len() {
            return Err(PlanError::RouteCountMismatch {
                expected: self.vehicles.len(),
                found: routes.len(),
            });
        }

        let vehicles = self
            .vehicles
            .iter()
            .zip(routes)
            .map(|(vehicle, route)| vehicle.clone().with_route(route))
            .collect::<Vec<_>>();
        let placements = placements_for(&self.visits, &vehicles)?;

        Ok(Self {
            name: self.name.clone(),
            south_west_corner: self.south_west_corner,
            north_east_corner: self.north_east_corner,
            start_date_time: self.start_date_time,
            end_date_time: self.end_date_time,
            visits: Arc::clone(&self.visits),
            vehicles,
            placements,
            score: None,
        })
    }

    pub fn with_score(mut self, score: HardSoftScore) -> Self {
        self.score = Some(score);
        self
    }

    pub fn score(&self) -> Option<HardSoftScore> {
        self.score
    }

    pub fn visits(&self) -> &[Visit] {
        &self.visits
    }

    pub fn visit(&self, idx: VisitIdx) -> &Visit {
        &self.visits[idx.0]
    }

    pub fn visit_idx(&self, id: &str) -> Option<VisitIdx> {
        self.visits.iter().position(|visit| visit.id == id).map(VisitIdx)
    }

    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    pub fn vehicle_by_id(&self, id: &str) -> Option<&Vehicle> {
        self.vehicles.iter().find(|vehicle| vehicle.id == id)
    }

    /// Visits on a vehicle's route, resolved to the shared instances.
    pub fn route(&self, vehicle: usize) -> impl Iterator<Item = &Visit> {
        self.vehicles
            .get(vehicle)
            .map(|vehicle| vehicle.visits.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|idx| &self.visits[idx.0])
    }

    /// Copies of every route, in vehicle order.
    pub fn routes(&self) -> Vec<Vec<VisitIdx>> {
        self.vehicles.iter().map(|vehicle| vehicle.visits.clone()).collect()
    }

    pub fn placement(&self, idx: VisitIdx) -> Option<Placement> {
        self.placements.get(idx.0).copied().flatten()
    }

    pub fn vehicle_of(&self, idx: VisitIdx) -> Option<&Vehicle> {
        self.placement(idx).map(|placement| &self.vehicles[placement.vehicle])
    }

    pub fn previous_visit(&self, idx: VisitIdx) -> Option<&Visit> {
        let placement = self.placement(idx)?;
        let position = placement.position.checked_sub(1)?;
        let previous = self.vehicles[placement.vehicle].visits[position];
        Some(&self.visits[previous.0])
    }

    pub fn next_visit(&self, idx: VisitIdx) -> Option<&Visit> {
        let placement = self.placement(idx)?;
        let next = self.vehicles[placement.vehicle].visits.get(placement.position + 1)?;
        Some(&self.visits[next.0])
    }

    pub fn unassigned(&self) -> impl Iterator<Item = VisitIdx> {
        self.placements
            .iter()
            .enumerate()
            .filter(|(_, placement)| placement.is_none())
            .map(|(i, _)| VisitIdx(i))
    }

    /// Derived arrival, service and departure times along a vehicle's route.
    pub fn schedule(&self, vehicle: usize) -> Option<RouteSchedule> {
        let vehicle = self.vehicles.get(vehicle)?;

        let mut stops = Vec::with_capacity(vehicle.visits.len());
        let mut previous = vehicle.home_location;
        let mut time = vehicle.departure_time;
        let mut total_demand = 0;
        let mut total_driving_seconds = 0;

        for &idx in &vehicle.visits {
            let visit = &self.visits[idx.0];
            let driving = previous.driving_time_seconds(&visit.location);
            let arrival_time = shifted(time, seconds(driving));
            let start_service_time = arrival_time.max(visit.min_start_time);
            let departure_time = shifted(start_service_time, visit.service_duration);

            stops.push(StopTiming {
                visit: idx,
                driving_seconds_from_previous: driving,
                arrival_time,
                start_service_time,
                departure_time,
            });

            total_demand += i64::from(visit.demand);
            total_driving_seconds += driving;
            time = departure_time;
            previous = visit.location;
        }

        let mut arrival_time = vehicle.departure_time;
        if !stops.is_empty() {
            let back_home = previous.driving_time_seconds(&vehicle.home_location);
            total_driving_seconds += back_home;
            arrival_time = shifted(time, seconds(back_home));
        }

        Some(RouteSchedule {
            stops,
            total_demand,
            total_driving_seconds,
            arrival_time,
        })
    }

    pub fn total_driving_time_seconds(&self) -> i64 {
        (0..self.vehicles.len())
            .filter_map(|vehicle| self.schedule(vehicle))
            .map(|schedule| schedule.total_driving_seconds)
            .sum()
    }
}

/// `time + delta`, clamped to the representable range.
fn shifted(time: NaiveDateTime, delta: TimeDelta) -> NaiveDateTime {
    time.checked_add_signed(delta).unwrap_or(if delta < TimeDelta::zero() {
        NaiveDateTime::MIN
    } else {
        NaiveDateTime::MAX
    })
}

fn seconds(seconds: i64) -> TimeDelta {
    TimeDelta::try_seconds(seconds).unwrap_or(TimeDelta::MAX)
}

fn placements_for(visits: &[Visit], vehicles: &[Vehicle]) -> Result<Vec<Option<Placement>>, PlanError> {
    let mut placements: Vec<Option<Placement>> = vec![None; visits.len()];

    for (vehicle_index, vehicle) in vehicles.iter().enumerate() {
        for (position, idx) in vehicle.visits.iter().enumerate() {
            let slot = placements
                .get_mut(idx.0)
                .ok_or(PlanError::UnknownVisit(idx.0))?;

            if let Some(existing) = slot {
                let visit = visits[idx.0].id.clone();
                return Err(if existing.vehicle == vehicle_index {
                    PlanError::VisitRepeatedInRoute {
                        visit,
                        vehicle: vehicle.id.clone(),
                    }
                } else {
                    PlanError::VisitOnMultipleRoutes {
                        visit,
                        first: vehicles[existing.vehicle].id.clone(),
                        second: vehicle.id.clone(),
                    }
                });
            }

            *slot = Some(Placement {
                vehicle: vehicle_index,
                position,
            });
        }
    }

    Ok(placements)
}

fn bounding_box(visits: &[Visit], vehicles: &[Vehicle]) -> (Location, Location) {
    let locations = visits
        .iter()
        .map(|visit| visit.location)
        .chain(vehicles.iter().map(|vehicle| vehicle.home_location));

    let mut bounds: Option<(Location, Location)> = None;
    for location in locations {
        let (sw, ne) = bounds.get_or_insert((location, location));
        sw.latitude = sw.latitude.min(location.latitude);
        sw.longitude = sw.longitude.min(location.longitude);
        ne.latitude = ne.latitude.max(location.latitude);
        ne.longitude = ne.longitude.max(location.longitude);
    }

    bounds.unwrap_or((Location::new(0.0, 0.0), Location::new(0.0, 0.0)))
}
