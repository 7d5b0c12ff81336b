//! Local search solver (reference engine).
//!
//! Construction assigns every unassigned visit by cheapest insertion. The local
//! search phase then samples relocate, swap and 2-opt moves each step and takes
//! the best one the strategy's acceptor allows.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::catalog::{AcceptorConfig, SolverConfig};
use crate::domain::{RoutePlan, VisitIdx};
use crate::score::{HardSoftScore, VehicleRoutingConstraints};
use crate::traits::{ScoreCalculator, Solver, SolverError, SolverFactory, SolverScope};

/// Builds [`LocalSearchSolver`]s sharing one score calculator.
#[derive(Clone)]
pub struct LocalSearchSolverFactory {
    calculator: Arc<dyn ScoreCalculator>,
}

impl LocalSearchSolverFactory {
    pub fn new(calculator: Arc<dyn ScoreCalculator>) -> Self {
        Self { calculator }
    }
}

impl Default for LocalSearchSolverFactory {
    fn default() -> Self {
        Self::new(Arc::new(VehicleRoutingConstraints))
    }
}

impl SolverFactory for LocalSearchSolverFactory {
    fn build(&self, config: &SolverConfig) -> Box<dyn Solver + Send> {
        Box::new(LocalSearchSolver::new(config.clone(), Arc::clone(&self.calculator)))
    }
}

pub struct LocalSearchSolver {
    config: SolverConfig,
    calculator: Arc<dyn ScoreCalculator>,
    rng: StdRng,
}

impl LocalSearchSolver {
    pub fn new(config: SolverConfig, calculator: Arc<dyn ScoreCalculator>) -> Self {
        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            calculator,
            rng,
        }
    }

    fn evaluate(&self, problem: &RoutePlan, routes: &[Vec<VisitIdx>]) -> Result<HardSoftScore, SolverError> {
        let plan = problem.with_routes(routes.to_vec())?;
        Ok(self.calculator.calculate(&plan))
    }

    /// Inserts each unassigned visit at the position with the best resulting score.
    fn construct(
        &self,
        problem: &RoutePlan,
        routes: &mut [Vec<VisitIdx>],
        scope: &SolverScope<'_>,
    ) -> Result<HardSoftScore, SolverError> {
        for visit in problem.unassigned() {
            if scope.is_terminate_early_requested() {
                break;
            }

            let mut best: Option<(usize, usize, HardSoftScore)> = None;
            for vehicle in 0..routes.len() {
                for position in 0..=routes[vehicle].len() {
                    routes[vehicle].insert(position, visit);
                    let score = self.evaluate(problem, routes);
                    routes[vehicle].remove(position);
                    let score = score?;

                    if best.is_none_or(|(_, _, best_score)| score > best_score) {
                        best = Some((vehicle, position, score));
                    }
                }
            }

            if let Some((vehicle, position, _)) = best {
                routes[vehicle].insert(position, visit);
            }
        }

        self.evaluate(problem, routes)
    }

    fn random_move(&mut self, routes: &[Vec<VisitIdx>]) -> Option<Move> {
        let assigned = routes
            .iter()
            .enumerate()
            .flat_map(|(vehicle, route)| (0..route.len()).map(move |position| (vehicle, position)))
            .collect::<Vec<_>>();
        if assigned.is_empty() {
            return None;
        }
        let pick = |rng: &mut StdRng| assigned[rng.gen_range(0..assigned.len())];

        match self.rng.gen_range(0..3) {
            0 => {
                let from = pick(&mut self.rng);
                let vehicle = self.rng.gen_range(0..routes.len());
                let len_after_removal = routes[vehicle].len() - usize::from(vehicle == from.0);
                let to = (vehicle, self.rng.gen_range(0..=len_after_removal));
                (to != from).then_some(Move::Relocate { from, to })
            }
            1 => {
                let left = pick(&mut self.rng);
                let right = pick(&mut self.rng);
                (left != right).then_some(Move::Swap { left, right })
            }
            _ => {
                let (vehicle, _) = pick(&mut self.rng);
                let len = routes[vehicle].len();
                if len < 2 {
                    return None;
                }
                let start = self.rng.gen_range(0..len - 1);
                let end = self.rng.gen_range(start + 1..len);
                Some(Move::TwoOpt { vehicle, start, end })
            }
        }
    }
}

impl Solver for LocalSearchSolver {
    fn solve(&mut self, problem: RoutePlan, scope: &mut SolverScope<'_>) -> Result<RoutePlan, SolverError> {
        let started = Instant::now();
        let mut routes = problem.routes();
        let mut current = self.construct(&problem, &mut routes, scope)?;

        let mut best = current;
        let mut best_routes = routes.clone();
        scope.best_solution_changed(problem.with_routes(best_routes.clone())?.with_score(best));
        debug!(score = %best, elapsed_ms = started.elapsed().as_millis() as u64, "construction heuristic ended");

        if problem.vehicles().is_empty() || problem.visits().len() < 2 {
            return Ok(problem.with_routes(best_routes)?.with_score(best));
        }

        let termination = self.config.termination.clone();
        let mut acceptor = Acceptor::new(&self.config.acceptor, current);
        let mut last_improvement = Instant::now();
        let mut step: u64 = 0;

        while !scope.is_terminate_early_requested()
            && !termination.is_reached(started.elapsed(), last_improvement.elapsed(), step)
        {
            let time_gradient = termination.time_gradient(started.elapsed());
            let mut chosen: Option<(Move, HardSoftScore)> = None;

            for _ in 0..self.config.accepted_count_limit.max(1) {
                if scope.is_terminate_early_requested() {
                    break;
                }
                let Some(candidate) = self.random_move(&routes) else {
                    continue;
                };

                let mut trial = routes.clone();
                candidate.apply(&mut trial);
                let score = self.evaluate(&problem, &trial)?;
                let moved = candidate.moved_visits(&routes);

                if !acceptor.is_accepted(&mut self.rng, &moved, score, current, best, time_gradient) {
                    continue;
                }
                if chosen.is_none_or(|(_, chosen_score)| score > chosen_score) {
                    chosen = Some((candidate, score));
                }
            }
            step += 1;

            let Some((step_move, score)) = chosen else {
                continue;
            };
            acceptor.step_taken(&step_move.moved_visits(&routes), score);
            step_move.apply(&mut routes);
            current = score;

            if current > best {
                best = current;
                best_routes = routes.clone();
                last_improvement = Instant::now();
                scope.best_solution_changed(problem.with_routes(best_routes.clone())?.with_score(best));
            }
        }

        debug!(
            score = %best,
            steps = step,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "local search ended"
        );
        Ok(problem.with_routes(best_routes)?.with_score(best))
    }
}

/// A change to the routes. Positions are `(vehicle, position)` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Move {
    /// `to` is the insert position after the visit was removed.
    Relocate { from: (usize, usize), to: (usize, usize) },
    Swap { left: (usize, usize), right: (usize, usize) },
    /// Reverses the segment `start..=end` of one route.
    TwoOpt { vehicle: usize, start: usize, end: usize },
}

impl Move {
    fn apply(self, routes: &mut [Vec<VisitIdx>]) {
        match self {
            Move::Relocate { from, to } => {
                let visit = routes[from.0].remove(from.1);
                routes[to.0].insert(to.1, visit);
            }
            Move::Swap { left, right } => {
                let visit = routes[left.0][left.1];
                routes[left.0][left.1] = routes[right.0][right.1];
                routes[right.0][right.1] = visit;
            }
            Move::TwoOpt { vehicle, start, end } => routes[vehicle][start..=end].reverse(),
        }
    }

    /// Visits the move would touch, read before it is applied.
    fn moved_visits(self, routes: &[Vec<VisitIdx>]) -> Vec<VisitIdx> {
        match self {
            Move::Relocate { from, .. } => vec![routes[from.0][from.1]],
            Move::Swap { left, right } => vec![routes[left.0][left.1], routes[right.0][right.1]],
            Move::TwoOpt { vehicle, start, end } => routes[vehicle][start..=end].to_vec(),
        }
    }
}

enum Acceptor {
    EntityTabu { tabu_size: usize, tabu: VecDeque<VisitIdx> },
    LateAcceptance { history: VecDeque<HardSoftScore> },
    SimulatedAnnealing { starting_temperature: HardSoftScore },
}

impl Acceptor {
    fn new(config: &AcceptorConfig, initial: HardSoftScore) -> Self {
        match *config {
            AcceptorConfig::EntityTabu { tabu_size } => Acceptor::EntityTabu {
                tabu_size,
                tabu: VecDeque::with_capacity(tabu_size),
            },
            AcceptorConfig::LateAcceptance { size } => Acceptor::LateAcceptance {
                history: std::iter::repeat(initial).take(size.max(1)).collect(),
            },
            AcceptorConfig::SimulatedAnnealing { starting_temperature } => {
                Acceptor::SimulatedAnnealing { starting_temperature }
            }
        }
    }

    fn is_accepted(
        &self,
        rng: &mut StdRng,
        moved: &[VisitIdx],
        candidate: HardSoftScore,
        current: HardSoftScore,
        best: HardSoftScore,
        time_gradient: f64,
    ) -> bool {
        match self {
            Acceptor::EntityTabu { tabu, .. } => {
                candidate > best || !moved.iter().any(|visit| tabu.contains(visit))
            }
            Acceptor::LateAcceptance { history } => {
                candidate >= current || history.front().is_some_and(|late| candidate >= *late)
            }
            Acceptor::SimulatedAnnealing { starting_temperature } => {
                if candidate >= current {
                    return true;
                }
                // The first level that got worse decides.
                let (delta, temperature) = if candidate.hard < current.hard {
                    (candidate.hard - current.hard, starting_temperature.hard)
                } else {
                    (candidate.soft - current.soft, starting_temperature.soft)
                };
                let temperature = temperature as f64 * (1.0 - time_gradient);
                if temperature <= 0.0 {
                    return false;
                }
                rng.gen_range(0.0..1.0) < (delta as f64 / temperature).exp()
            }
        }
    }

    fn step_taken(&mut self, moved: &[VisitIdx], score: HardSoftScore) {
        match self {
            Acceptor::EntityTabu { tabu_size, tabu } => {
                tabu.extend(moved.iter().copied());
                while tabu.len() > *tabu_size {
                    tabu.pop_front();
                }
            }
            Acceptor::LateAcceptance { history } => {
                history.pop_front();
                history.push_back(score);
            }
            Acceptor::SimulatedAnnealing { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes() -> Vec<Vec<VisitIdx>> {
        vec![vec![VisitIdx(0), VisitIdx(1), VisitIdx(2)], vec![VisitIdx(3)]]
    }

    #[test]
    fn test_relocate_between_routes() {
        let mut routes = routes();
        Move::Relocate { from: (0, 1), to: (1, 0) }.apply(&mut routes);
        assert_eq!(routes, vec![vec![VisitIdx(0), VisitIdx(2)], vec![VisitIdx(1), VisitIdx(3)]]);
    }

    #[test]
    fn test_swap_and_two_opt() {
        let mut routes = routes();
        Move::Swap { left: (0, 0), right: (1, 0) }.apply(&mut routes);
        assert_eq!(routes[0][0], VisitIdx(3));
        assert_eq!(routes[1][0], VisitIdx(0));

        Move::TwoOpt { vehicle: 0, start: 0, end: 2 }.apply(&mut routes);
        assert_eq!(routes[0], vec![VisitIdx(2), VisitIdx(1), VisitIdx(3)]);
    }

    #[test]
    fn test_tabu_blocks_recent_visits_unless_new_best() {
        let mut acceptor = Acceptor::new(&AcceptorConfig::EntityTabu { tabu_size: 2 }, HardSoftScore::ZERO);
        let mut rng = StdRng::seed_from_u64(0);
        acceptor.step_taken(&[VisitIdx(1)], HardSoftScore::of(0, -10));

        let current = HardSoftScore::of(0, -10);
        let best = HardSoftScore::of(0, -5);
        assert!(!acceptor.is_accepted(&mut rng, &[VisitIdx(1)], HardSoftScore::of(0, -8), current, best, 0.0));
        assert!(acceptor.is_accepted(&mut rng, &[VisitIdx(1)], HardSoftScore::of(0, -1), current, best, 0.0));
        assert!(acceptor.is_accepted(&mut rng, &[VisitIdx(2)], HardSoftScore::of(0, -20), current, best, 0.0));
    }

    #[test]
    fn test_late_acceptance_compares_with_old_score() {
        let initial = HardSoftScore::of(0, -100);
        let mut acceptor = Acceptor::new(&AcceptorConfig::LateAcceptance { size: 2 }, initial);
        let mut rng = StdRng::seed_from_u64(0);
        acceptor.step_taken(&[], HardSoftScore::of(0, -50));

        let current = HardSoftScore::of(0, -50);
        assert!(acceptor.is_accepted(&mut rng, &[], HardSoftScore::of(0, -90), current, current, 0.0));
        assert!(!acceptor.is_accepted(&mut rng, &[], HardSoftScore::of(0, -150), current, current, 0.0));
    }

    #[test]
    fn test_annealing_rejects_worse_once_cold() {
        let acceptor = Acceptor::new(
            &AcceptorConfig::SimulatedAnnealing { starting_temperature: HardSoftScore::of(0, 1000) },
            HardSoftScore::ZERO,
        );
        let mut rng = StdRng::seed_from_u64(0);
        let current = HardSoftScore::of(0, -10);
        assert!(!acceptor.is_accepted(&mut rng, &[], HardSoftScore::of(0, -11), current, current, 1.0));
        assert!(!acceptor.is_accepted(&mut rng, &[], HardSoftScore::of(-1, 0), current, current, 0.0));
        assert!(acceptor.is_accepted(&mut rng, &[], HardSoftScore::of(0, -9), current, current, 1.0));
    }
}
