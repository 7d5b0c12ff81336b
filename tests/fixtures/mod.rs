//! Test fixtures for vrp-jobs.
//!
//! Builders for wire records with sensible defaults, a small plan around
//! Philadelphia, and tracing output routed through the test harness.

#![allow(dead_code)]

use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime};
use tracing_subscriber::EnvFilter;

use vrp_jobs::catalog::{SolverCatalog, Termination};
use vrp_jobs::domain::{Location, RoutePlan};
use vrp_jobs::reconstruct::reconstruct;
use vrp_jobs::wire::{RoutePlanRecord, SubmitRequest, VehicleRecord, VisitRecord};

/// Installs a subscriber once per test binary; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 3)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .expect("valid fixture time")
}

/// Short budgets so solves finish within a test.
pub fn fast_catalog() -> SolverCatalog {
    SolverCatalog::new(Termination {
        spent_limit: Duration::from_secs(2),
        unimproved_spent_limit: Some(Duration::from_millis(300)),
        step_count_limit: None,
    })
    .with_random_seed(42)
}

/// Polls `condition` every few milliseconds until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

// ============================================================================
// Record Builders
// ============================================================================

/// Builder for visit records.
#[derive(Clone, Debug)]
pub struct TestVisit {
    record: VisitRecord,
}

impl TestVisit {
    pub fn new(id: &str) -> Self {
        Self {
            record: VisitRecord {
                id: id.to_string(),
                name: format!("Customer {}", id),
                location: Location::new(39.95, -75.16),
                demand: 1,
                min_start_time: at(8, 0),
                max_end_time: at(18, 0),
                service_duration: 600,
                vehicle: None,
                previous_visit: None,
                next_visit: None,
                arrival_time: None,
                start_service_time: None,
                departure_time: None,
                driving_time_seconds_from_previous_standstill: None,
            },
        }
    }

    pub fn location(mut self, lat: f64, lng: f64) -> Self {
        self.record.location = Location::new(lat, lng);
        self
    }

    pub fn demand(mut self, demand: i32) -> Self {
        self.record.demand = demand;
        self
    }

    pub fn window(mut self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        self.record.min_start_time = start;
        self.record.max_end_time = end;
        self
    }

    pub fn service_minutes(mut self, minutes: i64) -> Self {
        self.record.service_duration = minutes * 60;
        self
    }

    pub fn build(self) -> VisitRecord {
        self.record
    }
}

/// Builder for vehicle records.
#[derive(Clone, Debug)]
pub struct TestVehicle {
    record: VehicleRecord,
}

impl TestVehicle {
    pub fn new(id: &str) -> Self {
        Self {
            record: VehicleRecord {
                id: id.to_string(),
                capacity: 10,
                home_location: Location::new(39.95, -75.16),
                departure_time: at(7, 30),
                visits: Vec::new(),
                total_demand: None,
                total_driving_time_seconds: None,
                arrival_time: None,
            },
        }
    }

    pub fn capacity(mut self, capacity: i32) -> Self {
        self.record.capacity = capacity;
        self
    }

    pub fn home(mut self, lat: f64, lng: f64) -> Self {
        self.record.home_location = Location::new(lat, lng);
        self
    }

    pub fn route(mut self, visit_ids: &[&str]) -> Self {
        self.record.visits = visit_ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn build(self) -> VehicleRecord {
        self.record
    }
}

/// Builder for whole plans.
#[derive(Clone, Debug, Default)]
pub struct TestPlan {
    name: String,
    vehicles: Vec<TestVehicle>,
    visits: Vec<TestVisit>,
}

impl TestPlan {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn vehicle(mut self, vehicle: TestVehicle) -> Self {
        self.vehicles.push(vehicle);
        self
    }

    pub fn visit(mut self, visit: TestVisit) -> Self {
        self.visits.push(visit);
        self
    }

    pub fn record(self) -> RoutePlanRecord {
        RoutePlanRecord {
            name: self.name,
            south_west_corner: None,
            north_east_corner: None,
            start_date_time: None,
            end_date_time: None,
            vehicles: self.vehicles.into_iter().map(TestVehicle::build).collect(),
            visits: self.visits.into_iter().map(TestVisit::build).collect(),
            score: None,
            solver_status: None,
            total_driving_time_seconds: None,
            solver_failure: None,
        }
    }

    pub fn request(self, solver_config: &str) -> SubmitRequest {
        SubmitRequest {
            plan: self.record(),
            solver_config: Some(solver_config.to_string()),
        }
    }

    pub fn plan(self) -> RoutePlan {
        reconstruct(self.record()).expect("valid fixture plan")
    }
}

/// Two vehicles and three visits around Philadelphia, all unassigned.
pub fn small_plan() -> TestPlan {
    TestPlan::new("small")
        .vehicle(TestVehicle::new("v1").home(39.95, -75.16))
        .vehicle(TestVehicle::new("v2").home(40.00, -75.10))
        .visit(TestVisit::new("a").location(39.96, -75.17))
        .visit(TestVisit::new("b").location(39.98, -75.12))
        .visit(TestVisit::new("c").location(40.02, -75.09).demand(2))
}
