//! Named demo datasets.
//!
//! Generation is seeded per dataset, so a name always yields the same plan for
//! a given date.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::domain::{Location, PlanError, RoutePlan, Vehicle, Visit};

const FIRST_NAMES: &[&str] = &["Amy", "Beth", "Carl", "Dan", "Elsa", "Flo", "Gus", "Hugo", "Ivy", "Jay"];
const LAST_NAMES: &[&str] = &["Cole", "Fox", "Green", "Jones", "King", "Li", "Poe", "Rye", "Smith", "Watt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoData {
    Philadelphia,
    Hartford,
    Firenze,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown demo dataset `{0}`")]
pub struct UnknownDemoData(pub String);

struct DemoDataProperties {
    seed: u64,
    visit_count: usize,
    vehicle_count: usize,
    vehicle_start: NaiveTime,
    demand: (i32, i32),
    capacity: (i32, i32),
    south_west: Location,
    north_east: Location,
}

impl DemoData {
    pub const ALL: [DemoData; 3] = [DemoData::Philadelphia, DemoData::Hartford, DemoData::Firenze];

    pub fn name(self) -> &'static str {
        match self {
            DemoData::Philadelphia => "PHILADELPHIA",
            DemoData::Hartford => "HARTFORD",
            DemoData::Firenze => "FIRENZE",
        }
    }

    fn properties(self) -> DemoDataProperties {
        let vehicle_start = NaiveTime::from_hms_opt(7, 30, 0).unwrap_or_default();
        match self {
            DemoData::Philadelphia => DemoDataProperties {
                seed: 0,
                visit_count: 55,
                vehicle_count: 6,
                vehicle_start,
                demand: (1, 2),
                capacity: (15, 30),
                south_west: Location::new(39.7656, -76.8378),
                north_east: Location::new(40.7764, -74.9301),
            },
            DemoData::Hartford => DemoDataProperties {
                seed: 1,
                visit_count: 50,
                vehicle_count: 6,
                vehicle_start,
                demand: (1, 3),
                capacity: (20, 30),
                south_west: Location::new(41.4837, -73.1590),
                north_east: Location::new(41.9951, -72.2511),
            },
            DemoData::Firenze => DemoDataProperties {
                seed: 2,
                visit_count: 77,
                vehicle_count: 6,
                vehicle_start,
                demand: (1, 2),
                capacity: (20, 40),
                south_west: Location::new(43.7515, 11.1772),
                north_east: Location::new(43.8093, 11.2902),
            },
        }
    }

    /// Vehicles with empty routes and unassigned visits, all on `date`.
    pub fn generate(self, date: NaiveDate) -> Result<RoutePlan, PlanError> {
        let props = self.properties();
        let mut rng = StdRng::seed_from_u64(props.seed);

        let random_location = |rng: &mut StdRng| {
            Location::new(
                rng.gen_range(props.south_west.latitude..props.north_east.latitude),
                rng.gen_range(props.south_west.longitude..props.north_east.longitude),
            )
        };

        let departure_time = date.and_time(props.vehicle_start);
        let vehicles = (0..props.vehicle_count)
            .map(|i| {
                Vehicle::new(
                    i.to_string(),
                    rng.gen_range(props.capacity.0..=props.capacity.1),
                    random_location(&mut rng),
                    departure_time,
                )
            })
            .collect::<Vec<_>>();

        let visits = (0..props.visit_count)
            .map(|i| {
                let (min_start_time, max_end_time) = if rng.gen_bool(0.5) {
                    (at(date, 8), at(date, 12))
                } else {
                    (at(date, 13), at(date, 18))
                };
                Visit {
                    id: i.to_string(),
                    name: format!(
                        "{} {}",
                        FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())],
                        LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())]
                    ),
                    location: random_location(&mut rng),
                    demand: rng.gen_range(props.demand.0..=props.demand.1),
                    min_start_time,
                    max_end_time,
                    service_duration: TimeDelta::minutes(5 * rng.gen_range(1..=6)),
                }
            })
            .collect::<Vec<_>>();

        let mut plan = RoutePlan::new(self.name(), visits, vehicles)?;
        plan.south_west_corner = props.south_west;
        plan.north_east_corner = props.north_east;
        plan.start_date_time = Some(departure_time);
        plan.end_date_time = Some(at(date + TimeDelta::days(1), 0));
        Ok(plan)
    }
}

fn at(date: NaiveDate, hour: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default())
}

impl fmt::Display for DemoData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DemoData {
    type Err = UnknownDemoData;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DemoData::ALL
            .into_iter()
            .find(|demo| demo.name() == s)
            .ok_or_else(|| UnknownDemoData(s.to_string()))
    }
}
