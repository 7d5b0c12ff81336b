//! Seams between job orchestration and the solving engine.
//!
//! The orchestrator only knows how to build a solver from a configuration,
//! hand it a problem, and listen for improved solutions. Search heuristics and
//! scoring live behind these traits.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::catalog::SolverConfig;
use crate::domain::{PlanError, RoutePlan};
use crate::score::HardSoftScore;

/// Ranks candidate solutions.
pub trait ScoreCalculator: Send + Sync {
    fn calculate(&self, plan: &RoutePlan) -> HardSoftScore;
}

/// A single solve run over one problem.
pub trait Solver {
    /// Solves until the configured budget is spent or early termination is
    /// requested through `scope`, returning the best plan found.
    ///
    /// Every strictly better plan is reported via
    /// [`SolverScope::best_solution_changed`] as it is found.
    fn solve(&mut self, problem: RoutePlan, scope: &mut SolverScope<'_>) -> Result<RoutePlan, SolverError>;
}

/// Builds solvers for a strategy configuration.
pub trait SolverFactory: Send + Sync {
    fn build(&self, config: &SolverConfig) -> Box<dyn Solver + Send>;
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("invalid plan: {0}")]
    Plan(#[from] PlanError),
    #[error("problem cannot be scored: {0}")]
    Unscoreable(String),
    #[error("solver panicked: {0}")]
    Panicked(String),
}

/// What a running solver can see of its job: the early-termination flag and
/// the consumer of improved solutions.
pub struct SolverScope<'a> {
    terminate_early: &'a AtomicBool,
    on_best_solution: &'a mut dyn FnMut(RoutePlan),
    best_solution_count: usize,
}

impl<'a> SolverScope<'a> {
    pub fn new(terminate_early: &'a AtomicBool, on_best_solution: &'a mut dyn FnMut(RoutePlan)) -> Self {
        Self {
            terminate_early,
            on_best_solution,
            best_solution_count: 0,
        }
    }

    pub fn is_terminate_early_requested(&self) -> bool {
        self.terminate_early.load(Ordering::Acquire)
    }

    pub fn best_solution_changed(&mut self, plan: RoutePlan) {
        self.best_solution_count += 1;
        (self.on_best_solution)(plan);
    }

    pub fn best_solution_count(&self) -> usize {
        self.best_solution_count
    }
}
