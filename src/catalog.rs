//! Named solver strategies and their configurations.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::score::HardSoftScore;

/// Search strategy selectable by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strategy {
    TabuSearch,
    LateAcceptance,
    SimulatedAnnealing,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::TabuSearch,
        Strategy::LateAcceptance,
        Strategy::SimulatedAnnealing,
    ];

    /// Wire key of the strategy.
    pub fn key(self) -> &'static str {
        match self {
            Strategy::TabuSearch => "TABU_SEARCH",
            Strategy::LateAcceptance => "LATE_ACCEPTANCE",
            Strategy::SimulatedAnnealing => "SIMULATED_ANNEALING",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Strategy {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.key() == s)
            .ok_or_else(|| CatalogError::UnknownKey(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("solver configuration key is required")]
    MissingKey,
    #[error("unknown solver configuration key `{0}`")]
    UnknownKey(String),
}

/// When a solve run stops on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    pub spent_limit: Duration,
    /// Stop when the best score has not improved for this long.
    pub unimproved_spent_limit: Option<Duration>,
    pub step_count_limit: Option<u64>,
}

impl Default for Termination {
    fn default() -> Self {
        Self {
            spent_limit: Duration::from_secs(30),
            unimproved_spent_limit: Some(Duration::from_secs(5)),
            step_count_limit: None,
        }
    }
}

impl Termination {
    pub fn is_reached(&self, spent: Duration, unimproved: Duration, steps: u64) -> bool {
        spent >= self.spent_limit
            || self.unimproved_spent_limit.is_some_and(|limit| unimproved >= limit)
            || self.step_count_limit.is_some_and(|limit| steps >= limit)
    }

    /// Fraction of the spent limit used so far, in `[0, 1]`.
    pub fn time_gradient(&self, spent: Duration) -> f64 {
        if self.spent_limit.is_zero() {
            return 1.0;
        }
        (spent.as_secs_f64() / self.spent_limit.as_secs_f64()).clamp(0.0, 1.0)
    }
}

/// Move acceptance rule of the local search phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptorConfig {
    /// Visits moved in the last `tabu_size` steps may not move again unless
    /// the move beats the best score.
    EntityTabu { tabu_size: usize },
    /// Accept a move that is no worse than the current score or the score
    /// `size` steps ago.
    LateAcceptance { size: usize },
    /// Accept worse moves with a probability that cools down over the run.
    SimulatedAnnealing { starting_temperature: HardSoftScore },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverConfig {
    pub strategy: Strategy,
    pub acceptor: AcceptorConfig,
    /// Candidate moves evaluated per step; the best accepted one is taken.
    pub accepted_count_limit: usize,
    pub termination: Termination,
    pub random_seed: Option<u64>,
}

impl SolverConfig {
    pub fn for_strategy(strategy: Strategy, termination: Termination) -> Self {
        let (acceptor, accepted_count_limit) = match strategy {
            Strategy::TabuSearch => (AcceptorConfig::EntityTabu { tabu_size: 7 }, 1000),
            Strategy::LateAcceptance => (AcceptorConfig::LateAcceptance { size: 400 }, 1),
            Strategy::SimulatedAnnealing => (
                AcceptorConfig::SimulatedAnnealing {
                    starting_temperature: HardSoftScore::of(0, 1000),
                },
                4,
            ),
        };

        Self {
            strategy,
            acceptor,
            accepted_count_limit,
            termination,
            random_seed: None,
        }
    }
}

/// Fixed mapping from strategy to solver configuration.
#[derive(Debug, Clone)]
pub struct SolverCatalog {
    configs: BTreeMap<Strategy, SolverConfig>,
}

impl Default for SolverCatalog {
    fn default() -> Self {
        Self::new(Termination::default())
    }
}

impl SolverCatalog {
    /// One entry per [`Strategy`], all sharing `termination`.
    pub fn new(termination: Termination) -> Self {
        let configs = Strategy::ALL
            .into_iter()
            .map(|strategy| (strategy, SolverConfig::for_strategy(strategy, termination.clone())))
            .collect();
        Self { configs }
    }

    /// Fixes the random seed of every entry, making runs reproducible.
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        for config in self.configs.values_mut() {
            config.random_seed = Some(seed);
        }
        self
    }

    pub fn lookup(&self, key: &str) -> Result<&SolverConfig, CatalogError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(CatalogError::MissingKey);
        }
        let strategy = key.parse::<Strategy>()?;
        self.configs
            .get(&strategy)
            .ok_or_else(|| CatalogError::UnknownKey(key.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.configs.keys().map(|strategy| strategy.key())
    }
}
