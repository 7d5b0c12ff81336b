//! Request-level operations behind the route plan endpoints.
//!
//! Each method maps one endpoint: it takes the raw path segment or body,
//! talks to the [`JobOrchestrator`], and answers with a wire record or a
//! [`ServiceError`] carrying the HTTP status to send.

use std::sync::Arc;

use chrono::{Local, TimeDelta};
use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::CatalogError;
use crate::demo::{DemoData, UnknownDemoData};
use crate::orchestrator::{JobOrchestrator, OrchestratorError, ProblemId};
use crate::reconstruct::{ReconstructError, reconstruct};
use crate::wire::{RoutePlanRecord, SubmitRequest};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unavailable(String),
}

impl ServiceError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::NotFound(_) => 404,
            ServiceError::Unavailable(_) => 503,
        }
    }
}

impl From<CatalogError> for ServiceError {
    fn from(err: CatalogError) -> Self {
        ServiceError::BadRequest(err.to_string())
    }
}

impl From<ReconstructError> for ServiceError {
    fn from(err: ReconstructError) -> Self {
        ServiceError::BadRequest(err.to_string())
    }
}

impl From<UnknownDemoData> for ServiceError {
    fn from(err: UnknownDemoData) -> Self {
        ServiceError::NotFound(err.to_string())
    }
}

impl From<OrchestratorError> for ServiceError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Catalog(err) => err.into(),
            OrchestratorError::NotFound(_) => ServiceError::NotFound(err.to_string()),
            other => ServiceError::Unavailable(other.to_string()),
        }
    }
}

pub struct RoutePlanService {
    orchestrator: Arc<JobOrchestrator>,
}

impl RoutePlanService {
    pub fn new(orchestrator: Arc<JobOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &JobOrchestrator {
        &self.orchestrator
    }

    /// `GET /demo-data`
    pub fn demo_data_list(&self) -> Vec<&'static str> {
        DemoData::ALL.iter().map(|demo| demo.name()).collect()
    }

    /// `GET /demo-data/{name}`: the named dataset, dated tomorrow.
    pub fn demo_data(&self, name: &str) -> Result<RoutePlanRecord, ServiceError> {
        let demo = name.parse::<DemoData>()?;
        let tomorrow = Local::now().date_naive() + TimeDelta::days(1);
        let plan = demo
            .generate(tomorrow)
            .map_err(|err| ServiceError::Unavailable(err.to_string()))?;
        Ok(RoutePlanRecord::from_plan(&plan))
    }

    /// `GET /route-plans/{id}`: the latest stored plan with its live status.
    ///
    /// An id that does not parse is reported the same way as an unknown one.
    pub fn route_plan(&self, problem_id: &str) -> Result<RoutePlanRecord, ServiceError> {
        let problem_id = problem_id
            .parse::<ProblemId>()
            .map_err(|_| ServiceError::NotFound(format!("no route plan for problem `{}`", problem_id.trim())))?;
        let current = self.orchestrator.current_solution(&problem_id)?;

        let mut record = RoutePlanRecord::from_plan(&current.plan);
        record.solver_status = Some(current.solver_status);
        record.solver_failure = current.failure;
        Ok(record)
    }

    /// `POST /route-plans`: starts a background solve and returns its id.
    ///
    /// The strategy key is checked before the plan is rebuilt, so a bad key
    /// never registers anything.
    pub fn solve(&self, request: SubmitRequest) -> Result<String, ServiceError> {
        let key = request.solver_config.as_deref().unwrap_or_default();
        self.orchestrator.catalog().lookup(key)?;

        let plan = reconstruct(request.plan).inspect_err(|err| {
            debug!(error = %err, "rejected route plan");
        })?;
        let problem_id = self.orchestrator.submit(plan, key)?;
        Ok(problem_id.to_string())
    }

    /// [`Self::solve`] for a raw JSON body.
    pub fn solve_json(&self, body: &str) -> Result<String, ServiceError> {
        let request = serde_json::from_str::<SubmitRequest>(body).map_err(|err| {
            warn!(error = %err, "malformed route plan body");
            ServiceError::BadRequest(format!("malformed route plan: {}", err))
        })?;
        self.solve(request)
    }

    /// `DELETE /route-plans/{id}`: requests early termination. Always
    /// succeeds, whether or not the id names a job.
    pub fn stop_solving(&self, problem_id: &str) {
        if let Ok(problem_id) = problem_id.parse::<ProblemId>() {
            self.orchestrator.terminate(&problem_id);
        }
    }
}
