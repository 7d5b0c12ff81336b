//! Rebuilds a [`RoutePlan`] from its flat wire record.
//!
//! Visits are parsed once into the plan's arena and every route entry is
//! resolved to an index into it, so "visit X" is one instance no matter how
//! many places reference it. Derived fields on the records are never read:
//! vehicle, neighbours and timings come from the routes alone.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use chrono::TimeDelta;
use thiserror::Error;

use crate::domain::{PlanError, RoutePlan, Vehicle, Visit, VisitIdx};
use crate::wire::{RoutePlanRecord, VehicleRecord, VisitRecord};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconstructError {
    #[error("duplicate visit id `{0}`")]
    DuplicateVisitId(String),
    #[error("duplicate vehicle id `{0}`")]
    DuplicateVehicleId(String),
    #[error("vehicle `{vehicle}` references unknown visit `{visit}`")]
    UnknownVisit { vehicle: String, visit: String },
    #[error("visit `{visit}` is assigned to both `{first}` and `{second}`")]
    VisitAssignedTwice {
        visit: String,
        first: String,
        second: String,
    },
    #[error("visit `{visit}` appears more than once on the route of `{vehicle}`")]
    VisitRepeatedInRoute { visit: String, vehicle: String },
    #[error("visit `{0}` has a time window that ends before it starts")]
    InvalidTimeWindow(String),
    #[error("visit `{0}` has a negative service duration")]
    NegativeServiceDuration(String),
    #[error("visit `{0}` has a service duration out of range")]
    ServiceDurationOutOfRange(String),
    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// Converts a wire record into a plan.
///
/// Rejects dangling visit references, a visit on two routes, and a visit
/// repeated within one route; nothing is dropped or duplicated silently.
pub fn reconstruct(record: RoutePlanRecord) -> Result<RoutePlan, ReconstructError> {
    let RoutePlanRecord {
        name,
        south_west_corner,
        north_east_corner,
        start_date_time,
        end_date_time,
        vehicles: vehicle_records,
        visits: visit_records,
        ..
    } = record;

    let mut index: HashMap<String, VisitIdx> = HashMap::with_capacity(visit_records.len());
    let mut visits = Vec::with_capacity(visit_records.len());
    for visit_record in visit_records {
        let visit = visit_from_record(visit_record)?;
        match index.entry(visit.id.clone()) {
            Entry::Occupied(_) => return Err(ReconstructError::DuplicateVisitId(visit.id)),
            Entry::Vacant(slot) => {
                slot.insert(VisitIdx(visits.len()));
            }
        }
        visits.push(visit);
    }

    let mut owners: HashMap<VisitIdx, String> = HashMap::new();
    let mut vehicles: Vec<Vehicle> = Vec::with_capacity(vehicle_records.len());
    for vehicle_record in vehicle_records {
        if vehicles.iter().any(|vehicle| vehicle.id == vehicle_record.id) {
            return Err(ReconstructError::DuplicateVehicleId(vehicle_record.id));
        }
        let route = resolve_route(&vehicle_record, &index, &mut owners)?;
        vehicles.push(
            Vehicle::new(
                vehicle_record.id,
                vehicle_record.capacity,
                vehicle_record.home_location,
                vehicle_record.departure_time,
            )
            .with_route(route),
        );
    }

    let mut plan = RoutePlan::new(name, visits, vehicles)?;
    if let Some(corner) = south_west_corner {
        plan.south_west_corner = corner;
    }
    if let Some(corner) = north_east_corner {
        plan.north_east_corner = corner;
    }
    plan.start_date_time = start_date_time;
    plan.end_date_time = end_date_time;

    Ok(plan)
}

/// Builds the domain visit from the record's own attributes only.
fn visit_from_record(record: VisitRecord) -> Result<Visit, ReconstructError> {
    if record.max_end_time < record.min_start_time {
        return Err(ReconstructError::InvalidTimeWindow(record.id));
    }
    if record.service_duration < 0 {
        return Err(ReconstructError::NegativeServiceDuration(record.id));
    }
    let Some(service_duration) = TimeDelta::try_seconds(record.service_duration) else {
        return Err(ReconstructError::ServiceDurationOutOfRange(record.id));
    };

    Ok(Visit {
        id: record.id,
        name: record.name,
        location: record.location,
        demand: record.demand,
        min_start_time: record.min_start_time,
        max_end_time: record.max_end_time,
        service_duration,
    })
}

fn resolve_route(
    vehicle: &VehicleRecord,
    index: &HashMap<String, VisitIdx>,
    owners: &mut HashMap<VisitIdx, String>,
) -> Result<Vec<VisitIdx>, ReconstructError> {
    let mut route = Vec::with_capacity(vehicle.visits.len());

    for visit_id in &vehicle.visits {
        let idx = *index.get(visit_id).ok_or_else(|| ReconstructError::UnknownVisit {
            vehicle: vehicle.id.clone(),
            visit: visit_id.clone(),
        })?;

        match owners.entry(idx) {
            Entry::Occupied(owner) if owner.get() == &vehicle.id => {
                return Err(ReconstructError::VisitRepeatedInRoute {
                    visit: visit_id.clone(),
                    vehicle: vehicle.id.clone(),
                });
            }
            Entry::Occupied(owner) => {
                return Err(ReconstructError::VisitAssignedTwice {
                    visit: visit_id.clone(),
                    first: owner.get().clone(),
                    second: vehicle.id.clone(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(vehicle.id.clone());
            }
        }

        route.push(idx);
    }

    Ok(route)
}
