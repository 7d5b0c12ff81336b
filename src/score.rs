//! Hard/soft score and the default vehicle-routing constraints.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::RoutePlan;
use crate::traits::ScoreCalculator;

/// Two-level score compared hard level first. Higher is better; a negative
/// hard level means the plan breaks a hard constraint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HardSoftScore {
    pub hard: i64,
    pub soft: i64,
}

impl HardSoftScore {
    pub const ZERO: HardSoftScore = HardSoftScore { hard: 0, soft: 0 };

    pub const fn of(hard: i64, soft: i64) -> Self {
        Self { hard, soft }
    }

    pub fn is_feasible(&self) -> bool {
        self.hard >= 0
    }
}

impl fmt::Display for HardSoftScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}hard/{}soft", self.hard, self.soft)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid score `{0}`, expected `<hard>hard/<soft>soft`")]
pub struct ScoreParseError(String);

impl FromStr for HardSoftScore {
    type Err = ScoreParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScoreParseError(s.to_string());
        let (hard, soft) = s
            .trim()
            .strip_suffix("soft")
            .and_then(|rest| rest.split_once("hard/"))
            .ok_or_else(invalid)?;

        Ok(Self {
            hard: hard.parse().map_err(|_| invalid())?,
            soft: soft.parse().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for HardSoftScore {
    type Error = ScoreParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HardSoftScore> for String {
    fn from(score: HardSoftScore) -> Self {
        score.to_string()
    }
}

/// Default constraint set.
///
/// Hard: total demand above vehicle capacity, and minutes of service finished
/// after a visit's window closes. Soft: total driving seconds, including each
/// vehicle's return home.
#[derive(Debug, Clone, Copy, Default)]
pub struct VehicleRoutingConstraints;

impl ScoreCalculator for VehicleRoutingConstraints {
    fn calculate(&self, plan: &RoutePlan) -> HardSoftScore {
        let mut score = HardSoftScore::ZERO;

        for (index, vehicle) in plan.vehicles().iter().enumerate() {
            let Some(schedule) = plan.schedule(index) else {
                continue;
            };

            let excess = schedule.total_demand - i64::from(vehicle.capacity);
            if excess > 0 {
                score.hard -= excess;
            }

            for stop in &schedule.stops {
                score.hard -= stop.finished_delay_minutes(plan.visit(stop.visit));
            }

            score.soft -= schedule.total_driving_seconds;
        }

        score
    }
}
