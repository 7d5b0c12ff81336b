use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use vrp_jobs::catalog::{SolverConfig, Strategy, Termination};
use vrp_jobs::domain::RoutePlan;
use vrp_jobs::score::{HardSoftScore, VehicleRoutingConstraints};
use vrp_jobs::solver::LocalSearchSolver;
use vrp_jobs::traits::{Solver, SolverScope};

mod fixtures;

use fixtures::{TestPlan, TestVehicle, TestVisit, at, small_plan};

fn config(strategy: Strategy, steps: u64) -> SolverConfig {
    let mut config = SolverConfig::for_strategy(
        strategy,
        Termination {
            spent_limit: Duration::from_secs(60),
            unimproved_spent_limit: None,
            step_count_limit: Some(steps),
        },
    );
    config.random_seed = Some(7);
    config
}

/// Runs a solver to completion, returning the result and every reported score.
fn run(config: SolverConfig, problem: RoutePlan, terminate: bool) -> (RoutePlan, Vec<HardSoftScore>) {
    let mut solver = LocalSearchSolver::new(config, Arc::new(VehicleRoutingConstraints));
    let terminate_early = AtomicBool::new(terminate);
    let mut scores = Vec::new();
    let mut on_best_solution = |plan: RoutePlan| scores.push(plan.score().expect("reported plans are scored"));

    let (result, count) = {
        let mut scope = SolverScope::new(&terminate_early, &mut on_best_solution);
        let result = solver.solve(problem, &mut scope).expect("solvable");
        (result, scope.best_solution_count())
    };
    assert_eq!(count, scores.len());
    (result, scores)
}

fn tight_plan() -> TestPlan {
    TestPlan::new("tight")
        .vehicle(TestVehicle::new("v1").capacity(3).home(39.95, -75.16))
        .vehicle(TestVehicle::new("v2").capacity(3).home(40.00, -75.10))
        .visit(TestVisit::new("a").location(39.96, -75.17).demand(2))
        .visit(TestVisit::new("b").location(39.97, -75.15).demand(2))
        .visit(TestVisit::new("c").location(39.99, -75.11))
        .visit(TestVisit::new("d").location(40.01, -75.09))
}

#[test]
fn assigns_every_visit_within_capacity() {
    for strategy in Strategy::ALL {
        let (plan, _) = run(config(strategy, 200), tight_plan().plan(), false);

        assert_eq!(plan.unassigned().count(), 0, "{} left visits unassigned", strategy);
        assert!(plan.score().is_some_and(|score| score.is_feasible()), "{} is infeasible", strategy);
        for vehicle in 0..plan.vehicles().len() {
            let schedule = plan.schedule(vehicle).expect("vehicle exists");
            assert!(schedule.total_demand <= i64::from(plan.vehicles()[vehicle].capacity));
        }
    }
}

#[test]
fn respects_time_windows() {
    let problem = TestPlan::new("windows")
        .vehicle(TestVehicle::new("v1").capacity(10))
        .visit(TestVisit::new("late").location(39.96, -75.17).window(at(13, 0), at(18, 0)))
        .visit(TestVisit::new("early").location(39.98, -75.12).window(at(8, 0), at(9, 0)))
        .plan();

    let (plan, _) = run(config(Strategy::TabuSearch, 100), problem, false);
    let route = plan.route(0).map(|visit| visit.id.as_str()).collect::<Vec<_>>();
    assert_eq!(route, vec!["early", "late"]);
    assert_eq!(plan.score().map(|score| score.hard), Some(0));
}

#[test]
fn reports_strictly_improving_solutions() {
    let (plan, scores) = run(config(Strategy::LateAcceptance, 300), tight_plan().plan(), false);

    assert!(!scores.is_empty());
    assert!(scores.windows(2).all(|pair| pair[0] < pair[1]), "scores: {:?}", scores);
    assert_eq!(scores.last().copied(), plan.score());
}

#[test]
fn same_seed_same_routes() {
    let (first, _) = run(config(Strategy::SimulatedAnnealing, 100), tight_plan().plan(), false);
    let (second, _) = run(config(Strategy::SimulatedAnnealing, 100), tight_plan().plan(), false);
    assert_eq!(first.routes(), second.routes());
}

#[test]
fn stops_at_once_when_terminated_early() {
    let mut config = config(Strategy::TabuSearch, u64::MAX);
    config.termination.step_count_limit = None;

    let started = Instant::now();
    let (plan, scores) = run(config, small_plan().plan(), true);

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(scores.len(), 1);
    assert_eq!(plan.unassigned().count(), 3);
}

#[test]
fn handles_plan_without_vehicles() {
    let problem = TestPlan::new("no vehicles").visit(TestVisit::new("a")).plan();

    let (plan, scores) = run(config(Strategy::TabuSearch, 10), problem, false);
    assert_eq!(scores, vec![HardSoftScore::ZERO]);
    assert_eq!(plan.unassigned().count(), 1);
}
