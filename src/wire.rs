//! Wire records exchanged with clients.
//!
//! Input and output share one shape. Cross-references are bare ids. Derived
//! fields (a visit's vehicle and neighbours, timings, totals, score, status)
//! are written on output and discarded on input, whatever value a client
//! sends for them.

use chrono::NaiveDateTime;
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{Location, RoutePlan, SolverStatus};
use crate::score::HardSoftScore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub location: Location,
    #[serde(default)]
    pub demand: i32,
    pub min_start_time: NaiveDateTime,
    pub max_end_time: NaiveDateTime,
    /// Seconds.
    pub service_duration: i64,

    #[serde(default, deserialize_with = "discard", skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<String>,
    #[serde(default, deserialize_with = "discard", skip_serializing_if = "Option::is_none")]
    pub previous_visit: Option<String>,
    #[serde(default, deserialize_with = "discard", skip_serializing_if = "Option::is_none")]
    pub next_visit: Option<String>,
    #[serde(default, deserialize_with = "discard", skip_serializing_if = "Option::is_none")]
    pub arrival_time: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "discard", skip_serializing_if = "Option::is_none")]
    pub start_service_time: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "discard", skip_serializing_if = "Option::is_none")]
    pub departure_time: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "discard", skip_serializing_if = "Option::is_none")]
    pub driving_time_seconds_from_previous_standstill: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRecord {
    pub id: String,
    pub capacity: i32,
    pub home_location: Location,
    pub departure_time: NaiveDateTime,
    /// Visit ids in route order.
    #[serde(default)]
    pub visits: Vec<String>,

    #[serde(default, deserialize_with = "discard", skip_serializing_if = "Option::is_none")]
    pub total_demand: Option<i64>,
    #[serde(default, deserialize_with = "discard", skip_serializing_if = "Option::is_none")]
    pub total_driving_time_seconds: Option<i64>,
    #[serde(default, deserialize_with = "discard", skip_serializing_if = "Option::is_none")]
    pub arrival_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlanRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub south_west_corner: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub north_east_corner: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date_time: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub vehicles: Vec<VehicleRecord>,
    #[serde(default)]
    pub visits: Vec<VisitRecord>,

    #[serde(default, deserialize_with = "discard", skip_serializing_if = "Option::is_none")]
    pub score: Option<HardSoftScore>,
    #[serde(default, deserialize_with = "discard", skip_serializing_if = "Option::is_none")]
    pub solver_status: Option<SolverStatus>,
    #[serde(default, deserialize_with = "discard", skip_serializing_if = "Option::is_none")]
    pub total_driving_time_seconds: Option<i64>,
    #[serde(default, deserialize_with = "discard", skip_serializing_if = "Option::is_none")]
    pub solver_failure: Option<String>,
}

/// Body of a solve request: a plan plus the strategy key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[serde(flatten)]
    pub plan: RoutePlanRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver_config: Option<String>,
}

fn discard<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
{
    IgnoredAny::deserialize(deserializer)?;
    Ok(None)
}

impl RoutePlanRecord {
    /// Renders a plan with every derived field populated. Job fields
    /// (`solverStatus`, `solverFailure`) are left for the caller.
    pub fn from_plan(plan: &RoutePlan) -> Self {
        let mut visits = plan
            .visits()
            .iter()
            .map(|visit| VisitRecord {
                id: visit.id.clone(),
                name: visit.name.clone(),
                location: visit.location,
                demand: visit.demand,
                min_start_time: visit.min_start_time,
                max_end_time: visit.max_end_time,
                service_duration: visit.service_duration.num_seconds(),
                vehicle: None,
                previous_visit: None,
                next_visit: None,
                arrival_time: None,
                start_service_time: None,
                departure_time: None,
                driving_time_seconds_from_previous_standstill: None,
            })
            .collect::<Vec<_>>();

        let mut vehicles = Vec::with_capacity(plan.vehicles().len());
        let mut total_driving_time_seconds = 0;

        for (index, vehicle) in plan.vehicles().iter().enumerate() {
            let schedule = plan.schedule(index);

            if let Some(schedule) = &schedule {
                total_driving_time_seconds += schedule.total_driving_seconds;
                for stop in &schedule.stops {
                    let record = &mut visits[stop.visit.index()];
                    record.vehicle = Some(vehicle.id.clone());
                    record.previous_visit = plan.previous_visit(stop.visit).map(|visit| visit.id.clone());
                    record.next_visit = plan.next_visit(stop.visit).map(|visit| visit.id.clone());
                    record.arrival_time = Some(stop.arrival_time);
                    record.start_service_time = Some(stop.start_service_time);
                    record.departure_time = Some(stop.departure_time);
                    record.driving_time_seconds_from_previous_standstill =
                        Some(stop.driving_seconds_from_previous);
                }
            }

            vehicles.push(VehicleRecord {
                id: vehicle.id.clone(),
                capacity: vehicle.capacity,
                home_location: vehicle.home_location,
                departure_time: vehicle.departure_time,
                visits: plan.route(index).map(|visit| visit.id.clone()).collect(),
                total_demand: schedule.as_ref().map(|schedule| schedule.total_demand),
                total_driving_time_seconds: schedule.as_ref().map(|schedule| schedule.total_driving_seconds),
                arrival_time: schedule.as_ref().map(|schedule| schedule.arrival_time),
            });
        }

        Self {
            name: plan.name.clone(),
            south_west_corner: Some(plan.south_west_corner),
            north_east_corner: Some(plan.north_east_corner),
            start_date_time: plan.start_date_time,
            end_date_time: plan.end_date_time,
            vehicles,
            visits,
            score: plan.score(),
            solver_status: None,
            total_driving_time_seconds: Some(total_driving_time_seconds),
            solver_failure: None,
        }
    }
}
