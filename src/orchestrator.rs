//! Job orchestration: one cancellable background solve per submitted problem.
//!
//! The orchestrator is an explicit object, created once and dropped at
//! shutdown. It holds two registries keyed by [`ProblemId`]: job records
//! (status, early-termination flag, failure) and the latest solution
//! snapshot. Solves run on the orchestrator's thread pool. Workers never touch
//! the registries; they send [`JobEvent`]s over a channel to a single
//! publisher thread, which applies them in order.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{CatalogError, SolverCatalog, SolverConfig, Strategy};
use crate::domain::{RoutePlan, SolverStatus};
use crate::traits::{SolverError, SolverFactory, SolverScope};

/// Identifier of a submitted problem and its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProblemId(Uuid);

impl ProblemId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ProblemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for ProblemId {
    type Err = uuid::Error;

    /// Accepts the id with surrounding whitespace or JSON quotes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim().trim_matches('"')).map(Self)
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Jobs solving at once; later submissions wait as `SOLVING_SCHEDULED`.
    pub parallel_solver_count: usize,
    pub thread_name_prefix: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            parallel_solver_count: thread::available_parallelism().map_or(1, |count| count.get()),
            thread_name_prefix: "route-plan-solver".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("no route plan for problem `{0}`")]
    NotFound(String),
    #[error("orchestrator is shut down")]
    ShutDown,
    #[error("cannot build solver thread pool: {0}")]
    ThreadPool(#[from] ThreadPoolBuildError),
    #[error("cannot spawn publisher thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// The latest stored plan of a job together with its live status.
#[derive(Debug, Clone)]
pub struct CurrentSolution {
    pub plan: Arc<RoutePlan>,
    pub solver_status: SolverStatus,
    /// Engine failure that terminated the job, if any.
    pub failure: Option<String>,
}

#[derive(Debug)]
struct JobRecord {
    strategy: Strategy,
    terminate_early: Arc<AtomicBool>,
    state: Mutex<JobState>,
}

#[derive(Debug)]
struct JobState {
    status: SolverStatus,
    failure: Option<String>,
}

impl JobRecord {
    fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            terminate_early: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(JobState {
                status: SolverStatus::SolvingScheduled,
                failure: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request_termination(&self) {
        let _state = self.state();
        self.terminate_early.store(true, Ordering::Release);
    }
}

#[derive(Debug)]
struct JobEvent {
    problem_id: ProblemId,
    kind: JobEventKind,
}

#[derive(Debug)]
enum JobEventKind {
    Started,
    BestSolutionChanged(RoutePlan),
    Finished(Result<(), String>),
}

type JobRegistry = RwLock<HashMap<ProblemId, Arc<JobRecord>>>;
type SolutionRegistry = RwLock<HashMap<ProblemId, Arc<RoutePlan>>>;

#[derive(Default)]
struct Registries {
    jobs: JobRegistry,
    solutions: SolutionRegistry,
}

impl Registries {
    fn job(&self, problem_id: &ProblemId) -> Option<Arc<JobRecord>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(problem_id)
            .cloned()
    }

    fn solution(&self, problem_id: &ProblemId) -> Option<Arc<RoutePlan>> {
        self.solutions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(problem_id)
            .cloned()
    }
}

pub struct JobOrchestrator {
    catalog: SolverCatalog,
    factory: Arc<dyn SolverFactory>,
    pool: ThreadPool,
    registries: Arc<Registries>,
    events: Option<Sender<JobEvent>>,
    publisher: Option<JoinHandle<()>>,
}

impl JobOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        catalog: SolverCatalog,
        factory: Arc<dyn SolverFactory>,
    ) -> Result<Self, OrchestratorError> {
        let prefix = config.thread_name_prefix;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.parallel_solver_count.max(1))
            .thread_name({
                let prefix = prefix.clone();
                move |index| format!("{}-{}", prefix, index)
            })
            .build()?;

        let registries = Arc::new(Registries::default());
        let (events, receiver) = mpsc::channel();
        let publisher = thread::Builder::new()
            .name(format!("{}-publisher", prefix))
            .spawn({
                let registries = Arc::clone(&registries);
                move || publish(receiver, &registries)
            })?;

        Ok(Self {
            catalog,
            factory,
            pool,
            registries,
            events: Some(events),
            publisher: Some(publisher),
        })
    }

    pub fn catalog(&self) -> &SolverCatalog {
        &self.catalog
    }

    /// Registers `problem` under a fresh id and starts solving it in the
    /// background with the configuration named by `strategy_key`.
    ///
    /// The key is checked before anything is registered or scheduled.
    pub fn submit(&self, problem: RoutePlan, strategy_key: &str) -> Result<ProblemId, OrchestratorError> {
        let config = self.catalog.lookup(strategy_key)?.clone();
        let events = self.events.clone().ok_or(OrchestratorError::ShutDown)?;
        let record = Arc::new(JobRecord::new(config.strategy));

        let problem_id = {
            let mut jobs = self.registries.jobs.write().unwrap_or_else(PoisonError::into_inner);
            let problem_id = loop {
                let candidate = ProblemId::generate();
                if !jobs.contains_key(&candidate) {
                    break candidate;
                }
            };
            self.registries
                .solutions
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(problem_id, Arc::new(problem.clone()));
            jobs.insert(problem_id, Arc::clone(&record));
            problem_id
        };

        info!(
            problem_id = %problem_id,
            strategy = %config.strategy,
            visits = problem.visits().len(),
            vehicles = problem.vehicles().len(),
            "route plan submitted"
        );

        let factory = Arc::clone(&self.factory);
        let terminate_early = Arc::clone(&record.terminate_early);
        self.pool.spawn(move || {
            run_job(problem_id, problem, &config, factory.as_ref(), &terminate_early, &events);
        });

        Ok(problem_id)
    }

    /// The latest stored plan for `problem_id` with its live status.
    pub fn current_solution(&self, problem_id: &ProblemId) -> Result<CurrentSolution, OrchestratorError> {
        let plan = self
            .registries
            .solution(problem_id)
            .ok_or_else(|| OrchestratorError::NotFound(problem_id.to_string()))?;

        let (solver_status, failure) = match self.registries.job(problem_id) {
            Some(record) => {
                let state = record.state();
                (state.status, state.failure.clone())
            }
            None => (SolverStatus::NotSolving, None),
        };

        Ok(CurrentSolution {
            plan,
            solver_status,
            failure,
        })
    }

    /// Live status of the job; `NOT_SOLVING` when no job is registered.
    pub fn query_status(&self, problem_id: &ProblemId) -> SolverStatus {
        self.registries
            .job(problem_id)
            .map_or(SolverStatus::NotSolving, |record| record.state().status)
    }

    /// Asks the job to stop at its next checkpoint. Unknown ids and finished
    /// jobs are ignored.
    pub fn terminate(&self, problem_id: &ProblemId) {
        if let Some(record) = self.registries.job(problem_id) {
            record.request_termination();
            debug!(problem_id = %problem_id, strategy = %record.strategy, "early termination requested");
        }
    }

    pub fn problem_ids(&self) -> Vec<ProblemId> {
        self.registries
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }
}

impl Drop for JobOrchestrator {
    fn drop(&mut self) {
        for record in self
            .registries
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
        {
            record.request_termination();
        }

        // The publisher exits once every worker has dropped its sender.
        self.events.take();
        if let Some(publisher) = self.publisher.take() {
            if publisher.join().is_err() {
                warn!("route plan publisher panicked");
            }
        }
    }
}

fn run_job(
    problem_id: ProblemId,
    problem: RoutePlan,
    config: &SolverConfig,
    factory: &dyn SolverFactory,
    terminate_early: &AtomicBool,
    events: &Sender<JobEvent>,
) {
    let send = |kind| {
        // A closed channel means the orchestrator is gone; nobody is listening.
        let _ = events.send(JobEvent { problem_id, kind });
    };

    send(JobEventKind::Started);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut solver = factory.build(config);
        let mut on_best_solution = |plan: RoutePlan| send(JobEventKind::BestSolutionChanged(plan));
        let mut scope = SolverScope::new(terminate_early, &mut on_best_solution);
        solver.solve(problem, &mut scope).map(|_| ())
    }))
    .unwrap_or_else(|payload| Err(SolverError::Panicked(panic_message(payload.as_ref()))));

    send(JobEventKind::Finished(outcome.map_err(|err| err.to_string())));
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Applies job events to the registries until every sender is dropped.
fn publish(receiver: Receiver<JobEvent>, registries: &Registries) {
    for JobEvent { problem_id, kind } in receiver {
        let Some(record) = registries.job(&problem_id) else {
            continue;
        };
        let mut state = record.state();

        match kind {
            JobEventKind::Started => {
                if state.status == SolverStatus::SolvingScheduled {
                    state.status = SolverStatus::SolvingActive;
                }
            }
            JobEventKind::BestSolutionChanged(plan) => {
                if !state.status.is_solving() || record.terminate_early.load(Ordering::Acquire) {
                    debug!(problem_id = %problem_id, "late solution dropped");
                    continue;
                }
                debug!(
                    problem_id = %problem_id,
                    score = %plan.score().unwrap_or_default(),
                    "new best solution"
                );
                registries
                    .solutions
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(problem_id, Arc::new(plan));
            }
            JobEventKind::Finished(Ok(())) => {
                state.status = if record.terminate_early.load(Ordering::Acquire) {
                    SolverStatus::Terminated
                } else {
                    SolverStatus::NotSolving
                };
                info!(problem_id = %problem_id, status = %state.status, "solving ended");
            }
            JobEventKind::Finished(Err(failure)) => {
                warn!(problem_id = %problem_id, error = %failure, "solving failed");
                state.status = SolverStatus::Terminated;
                state.failure = Some(failure);
            }
        }
    }
}
