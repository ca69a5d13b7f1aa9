//! Job orchestration
//!
//! Analyses and facets are computed server side as jobs, in two phases:
//!
//! 1. **Submit**: the job record built from the model is POSTed to the
//!    family's collection. The server may answer with a finished job.
//! 2. **Poll**: otherwise the results resource is fetched until it stops
//!    answering `COMPUTING_IN_PROGRESS`.
//!
//! Every outcome, success or failure, is also written onto the model's
//! [`JobState`], which ends DONE once per orchestration call.

mod analysis;
mod facet;
mod orchestrator;

use serde::Deserialize;
use serde_json::Value;
use squid_model::{ApiError, JobId, JobKey, JobState, ProjectId, ResourcePath, ResultsFormat, Selection};

use crate::errors::JobError;

pub use orchestrator::JobOrchestrator;

/// `apiError` code of a results resource whose job is still running.
pub const COMPUTING_IN_PROGRESS: &str = "COMPUTING_IN_PROGRESS";

/// A job family the orchestrator can drive.
pub trait JobModel: Send {
    type Results: Send;

    /// Collection segment under the project, e.g. `analysisjobs`.
    const COLLECTION: &'static str;

    fn key(&self) -> &JobKey;

    fn job(&self) -> &JobState<Self::Results>;

    fn job_mut(&mut self) -> &mut JobState<Self::Results>;

    /// Submission body. An explicit `selection` replaces the model's own.
    fn job_record(&self, project_id: &ProjectId, selection: Option<&Selection>) -> Value;

    /// Resets transient model state before submission.
    fn prepare_submit(&mut self) {}

    fn results_path(
        &self,
        project_id: &ProjectId,
        job_id: &JobId,
        format: Option<&ResultsFormat>,
    ) -> ResourcePath;

    /// Results carried by a submission answered DONE.
    fn results_from_submission(results: Option<Value>) -> Result<Self::Results, serde_json::Error>;

    /// Results read from the results resource.
    fn results_from_payload(payload: Value) -> Result<Self::Results, serde_json::Error>;

    /// Stores successful results; the job ends DONE.
    fn complete(&mut self, results: Self::Results) {
        self.job_mut().succeed(results);
    }

    fn collection_path(project_id: &ProjectId) -> ResourcePath {
        ResourcePath::project(project_id).member(Self::COLLECTION, None)
    }
}

/// Server answer to a job submission.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JobSubmission {
    #[serde(default)]
    pub id: JobKey,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub results: Option<Value>,
}

impl JobSubmission {
    pub fn is_done(&self) -> bool {
        self.status.as_deref() == Some("DONE")
    }

    /// Error reported by a finished job, if any.
    pub fn api_error(&self) -> Option<ApiError> {
        self.error
            .clone()
            .filter(|error| !error.is_null())
            .map(ApiError::from_payload)
    }
}

pub(crate) fn malformed(error: serde_json::Error) -> (ApiError, JobError) {
    (
        ApiError::from_message(format!("Malformed job response: {error}")),
        JobError::MalformedResponse(error),
    )
}
