use log::{debug, info, warn};
use serde_json::Value;
use squid_model::{ApiError, JobKey, Selection};
use tokio_util::sync::CancellationToken;

use super::{COMPUTING_IN_PROGRESS, JobModel, JobSubmission, malformed};
use crate::api_client::ApiClient;
use crate::config::OrchestratorConfig;
use crate::errors::{JobError, JobResult};

/// Drives jobs through submission and polling.
///
/// Cloning is cheap. Clones share the cancellation token, so cancelling it
/// stops every poll loop started from this orchestrator or its clones.
#[derive(Debug, Clone)]
pub struct JobOrchestrator {
    pub(super) api: ApiClient,
    pub(super) config: OrchestratorConfig,
    cancel: CancellationToken,
}

impl JobOrchestrator {
    pub fn new(api: ApiClient, config: OrchestratorConfig) -> Self {
        Self {
            api,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Submits `model` as a new job and stores the assigned job id on it.
    ///
    /// The model is left RUNNING unless the submission fails; applying a
    /// finished submission is up to the caller.
    pub async fn submit<M: JobModel>(
        &self,
        model: &mut M,
        selection: Option<&Selection>,
    ) -> JobResult<JobSubmission> {
        model.prepare_submit();
        model.job_mut().begin();

        let Some(project_id) = model.key().project_id.clone() else {
            model
                .job_mut()
                .fail(ApiError::from_message("job model has no project id"));
            return Err(JobError::MissingProject);
        };

        let record = model.job_record(&project_id, selection);
        let path = M::collection_path(&project_id);
        debug!("[Jobs] Submitting job to {}", path);

        let response = match self.api.post_json(&path, record).await {
            Ok(response) => response,
            Err(source) => {
                warn!("[Jobs] Submission to {} failed: {}", path, source);
                model.job_mut().fail(source.to_api_error());
                return Err(JobError::SubmitFailed { source });
            }
        };

        let submission = match serde_json::from_value::<JobSubmission>(response) {
            Ok(submission) => submission,
            Err(e) => {
                let (api_error, error) = malformed(e);
                model.job_mut().fail(api_error);
                return Err(error);
            }
        };

        let mut key = submission.id.clone();
        if key.project_id.is_none() {
            key.project_id = Some(project_id);
        }
        debug!(
            "[Jobs] Job {:?} accepted with status {:?}",
            key.job_id, submission.status
        );
        model.job_mut().set_job_id(key);
        Ok(submission)
    }

    /// Fetches the results of the model's submitted job, re-fetching while
    /// the server reports the computation in progress.
    pub async fn poll<M: JobModel>(&self, model: &mut M) -> JobResult<()> {
        let Some(JobKey {
            project_id: Some(project_id),
            job_id: Some(job_id),
        }) = model.job().job_id().cloned()
        else {
            model
                .job_mut()
                .fail(ApiError::from_message("job has no server assigned id"));
            return Err(JobError::MissingJobId);
        };

        let path = model.results_path(
            &project_id,
            &job_id,
            self.config.results_format.as_ref(),
        );
        let mut attempts: u32 = 0;

        loop {
            let response = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(cancelled(model)),
                response = self.api.get(&path) => response,
            };
            attempts += 1;

            let payload = match response {
                Ok(payload) => payload,
                Err(source) => {
                    warn!("[Jobs] Results of job {} unavailable: {}", job_id, source);
                    model
                        .job_mut()
                        .fail(ApiError::from_message(source.status_text.clone()));
                    return Err(JobError::PollFailed { job_id, source });
                }
            };

            match payload.get("apiError").and_then(Value::as_str) {
                Some(COMPUTING_IN_PROGRESS) => {
                    debug!(
                        "[Jobs] Job {} still computing (attempt {})",
                        job_id, attempts
                    );
                    self.pause(model).await?;
                }
                Some(_) => {
                    let error = ApiError::from_payload(payload);
                    warn!("[Jobs] Job {} failed: {}", job_id, error);
                    model.job_mut().fail(error.clone());
                    return Err(JobError::Application(error));
                }
                None => {
                    let results = M::results_from_payload(payload).map_err(|e| {
                        let (api_error, error) = malformed(e);
                        model.job_mut().fail(api_error);
                        error
                    })?;
                    info!(
                        "[Jobs] Job {} done after {} results request(s)",
                        job_id, attempts
                    );
                    model.complete(results);
                    return Ok(());
                }
            }
        }
    }

    /// Submits and, unless the submission already finished, polls.
    pub async fn compute<M: JobModel>(
        &self,
        model: &mut M,
        selection: Option<&Selection>,
    ) -> JobResult<()> {
        let submission = self.submit(model, selection).await?;
        if !submission.is_done() {
            return self.poll(model).await;
        }

        if let Some(error) = submission.api_error() {
            model.job_mut().fail(error.clone());
            return Err(JobError::Application(error));
        }
        match M::results_from_submission(submission.results) {
            Ok(results) => {
                model.complete(results);
                Ok(())
            }
            Err(e) => {
                let (api_error, error) = malformed(e);
                model.job_mut().fail(api_error);
                Err(error)
            }
        }
    }

    // Cancellation aware gap between two polls. Without a configured delay
    // the task still yields so other tasks can run.
    async fn pause<M: JobModel>(&self, model: &mut M) -> JobResult<()> {
        match self.config.poll_delay {
            Some(delay) => {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Err(cancelled(model)),
                    _ = tokio::time::sleep(delay) => Ok(()),
                }
            }
            None => {
                tokio::task::yield_now().await;
                Ok(())
            }
        }
    }
}

fn cancelled<M: JobModel>(model: &mut M) -> JobError {
    info!("[Jobs] Polling cancelled");
    model
        .job_mut()
        .fail(ApiError::from_message("job polling cancelled"));
    JobError::Cancelled
}
