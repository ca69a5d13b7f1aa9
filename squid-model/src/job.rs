//! Job models.
//!
//! Callers build an [`AnalysisModel`] or [`FacetModel`] describing the
//! computation, hand it to the orchestrator and read back the outcome from
//! the same model. The RUNNING/DONE lifecycle lives in [`JobState`], whose
//! fields are private so that `results` can only be present on a successful
//! DONE state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ModelError, Result};
use crate::ids::{
    DimensionId, DimensionPk, DomainId, DomainPk, JobKey, MetricId, MetricPk,
    ProjectId,
};
use crate::selection::{Facet, Selection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Done,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "RUNNING",
            JobStatus::Done => "DONE",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RUNNING" => Ok(JobStatus::Running),
            "DONE" => Ok(JobStatus::Done),
            other => Err(ModelError::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload attached to a job, either sent by the server or derived
/// from a failed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(
        rename = "apiError",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub code: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl ApiError {
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Builds an error from an arbitrary server payload. Non-object payloads
    /// are kept as the message text.
    ///
    /// Object fields are read one by one: `message` and `apiError` when they
    /// are strings, `status` when it is a valid HTTP status. Anything else,
    /// including a known field of an unexpected type, stays in `details`.
    pub fn from_payload(payload: Value) -> Self {
        match payload {
            Value::Object(mut details) => {
                let message = take_string(&mut details, "message");
                let code = take_string(&mut details, "apiError");
                let status = match details.get("status").and_then(Value::as_u64) {
                    Some(status) => u16::try_from(status).ok(),
                    None => None,
                };
                if status.is_some() {
                    details.remove("status");
                }
                Self {
                    message,
                    status,
                    code,
                    details,
                }
            }
            Value::String(message) => Self::from_message(message),
            Value::Null => Self::default(),
            other => Self::from_message(other.to_string()),
        }
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(_)) => match map.remove(key) {
            Some(Value::String(value)) => Some(value),
            _ => None,
        },
        _ => None,
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.code, &self.message, self.status) {
            (Some(code), Some(message), _) => write!(f, "{code}: {message}"),
            (None, Some(message), Some(status)) => {
                write!(f, "{message} ({status})")
            }
            (None, Some(message), None) => f.write_str(message),
            (Some(code), None, _) => f.write_str(code),
            (None, None, Some(status)) => write!(f, "HTTP {status}"),
            (None, None, None) => f.write_str("unknown error"),
        }
    }
}

/// Lifecycle of one job computation.
#[derive(Debug, Clone, PartialEq)]
pub struct JobState<R> {
    job_id: Option<JobKey>,
    status: Option<JobStatus>,
    error: Option<ApiError>,
    results: Option<R>,
}

impl<R> Default for JobState<R> {
    fn default() -> Self {
        Self {
            job_id: None,
            status: None,
            error: None,
            results: None,
        }
    }
}

impl<R> JobState<R> {
    pub fn job_id(&self) -> Option<&JobKey> {
        self.job_id.as_ref()
    }

    pub fn status(&self) -> Option<JobStatus> {
        self.status
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    pub fn results(&self) -> Option<&R> {
        self.results.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.status == Some(JobStatus::Done)
    }

    pub fn set_job_id(&mut self, job_id: JobKey) {
        self.job_id = Some(job_id);
    }

    /// Enters RUNNING. Outcomes of a previous run are dropped.
    pub fn begin(&mut self) {
        self.status = Some(JobStatus::Running);
        self.error = None;
        self.results = None;
    }

    pub fn succeed(&mut self, results: R) {
        self.error = None;
        self.results = Some(results);
        self.status = Some(JobStatus::Done);
    }

    pub fn fail(&mut self, error: ApiError) {
        self.error = Some(error);
        self.results = None;
        self.status = Some(JobStatus::Done);
    }
}

/// Format parameters of the analysis results resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsFormat {
    pub format: String,
    pub compression: String,
}

impl Default for ResultsFormat {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
            compression: "none".to_string(),
        }
    }
}

/// An analysis computation: metrics broken down by dimensions over the
/// given domains and selection.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisModel {
    pub id: JobKey,
    pub domains: Vec<DomainPk>,
    pub dimensions: Vec<DimensionPk>,
    pub metrics: Vec<MetricPk>,
    pub auto_run: Option<bool>,
    pub selection: Option<Selection>,
    pub results_format: ResultsFormat,
    pub job: JobState<Value>,
}

impl AnalysisModel {
    pub fn new(project_id: impl Into<ProjectId>) -> Self {
        Self {
            id: JobKey::for_project(project_id.into()),
            domains: Vec::new(),
            dimensions: Vec::new(),
            metrics: Vec::new(),
            auto_run: None,
            selection: None,
            results_format: ResultsFormat::default(),
            job: JobState::default(),
        }
    }

    pub fn project_id(&self) -> Option<&ProjectId> {
        self.id.project_id.as_ref()
    }

    pub fn set_domain_ids<I, S>(&mut self, domain_ids: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<DomainId>,
    {
        self.domains = domain_keys(self.id.project_id.clone(), domain_ids);
        self
    }

    /// Dimensions are scoped to the first domain.
    pub fn set_dimension_ids<I, S>(&mut self, dimension_ids: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<DimensionId>,
    {
        let domain = self.first_domain()?;
        self.dimensions = dimension_ids
            .into_iter()
            .map(|id| DimensionPk {
                project_id: domain.project_id.clone(),
                domain_id: domain.domain_id.clone(),
                dimension_id: id.into(),
            })
            .collect();
        Ok(self)
    }

    /// Metrics are scoped to the first domain.
    pub fn set_metric_ids<I, S>(&mut self, metric_ids: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<MetricId>,
    {
        let domain = self.first_domain()?;
        self.metrics = metric_ids
            .into_iter()
            .map(|id| MetricPk {
                project_id: domain.project_id.clone(),
                domain_id: domain.domain_id.clone(),
                metric_id: id.into(),
            })
            .collect();
        Ok(self)
    }

    pub fn is_done(&self) -> bool {
        self.job.is_done()
    }

    fn first_domain(&self) -> Result<DomainPk> {
        self.domains.first().cloned().ok_or(ModelError::MissingDomain)
    }
}

/// A facet computation: resolves the available facets of the domains under
/// the current selection. Computed facets replace `selection`.
#[derive(Debug, Clone, PartialEq)]
pub struct FacetModel {
    pub id: JobKey,
    pub domains: Vec<DomainPk>,
    pub selection: Option<Selection>,
    /// Transient selection edited by the user, cleared on every submit.
    pub user_selection: Option<Selection>,
    pub job: JobState<Vec<Facet>>,
}

impl FacetModel {
    pub fn new(project_id: impl Into<ProjectId>) -> Self {
        Self {
            id: JobKey::for_project(project_id.into()),
            domains: Vec::new(),
            selection: Some(Selection::default()),
            user_selection: None,
            job: JobState::default(),
        }
    }

    pub fn project_id(&self) -> Option<&ProjectId> {
        self.id.project_id.as_ref()
    }

    pub fn set_domain_ids<I, S>(&mut self, domain_ids: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<DomainId>,
    {
        self.domains = domain_keys(self.id.project_id.clone(), domain_ids);
        self
    }

    /// Adds a free value to the facet of `dimension` in the current selection.
    pub fn add_selection(
        &mut self,
        dimension: &DimensionPk,
        value: impl Into<String>,
    ) {
        let project_id = self
            .id
            .project_id
            .clone()
            .unwrap_or_else(|| dimension.project_id.clone());
        self.selection
            .get_or_insert_with(Selection::default)
            .select_value(&project_id, dimension, value);
    }

    pub fn is_done(&self) -> bool {
        self.job.is_done()
    }
}

/// Several analyses computed together and reported as one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiAnalysisModel {
    pub analyses: Vec<AnalysisModel>,
    status: Option<JobStatus>,
    error: Option<ApiError>,
}

impl MultiAnalysisModel {
    pub fn new(analyses: Vec<AnalysisModel>) -> Self {
        Self {
            analyses,
            status: None,
            error: None,
        }
    }

    pub fn status(&self) -> Option<JobStatus> {
        self.status
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.status == Some(JobStatus::Done)
    }

    pub fn begin(&mut self) {
        self.status = Some(JobStatus::Running);
        self.error = None;
    }

    pub fn set_error(&mut self, error: ApiError) {
        self.error = Some(error);
    }

    pub fn finish(&mut self) {
        self.status = Some(JobStatus::Done);
    }
}

fn domain_keys<I, S>(project_id: Option<ProjectId>, domain_ids: I) -> Vec<DomainPk>
where
    I: IntoIterator<Item = S>,
    S: Into<DomainId>,
{
    let project_id = project_id.unwrap_or_else(|| ProjectId::new(""));
    domain_ids
        .into_iter()
        .map(|id| DomainPk {
            project_id: project_id.clone(),
            domain_id: id.into(),
        })
        .collect()
}
