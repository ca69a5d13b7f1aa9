use futures::future::join_all;
use log::{debug, info};
use serde_json::{Map, Value, json};
use squid_model::{
    AnalysisModel, JobId, JobKey, JobState, MultiAnalysisModel, ProjectId,
    ResourcePath, ResultsFormat, Selection, paths::ANALYSIS_JOBS,
};

use super::{JobModel, JobOrchestrator, JobSubmission};
use crate::errors::{JobError, JobResult};

impl JobModel for AnalysisModel {
    type Results = Value;

    const COLLECTION: &'static str = ANALYSIS_JOBS;

    fn key(&self) -> &JobKey {
        &self.id
    }

    fn job(&self) -> &JobState<Value> {
        &self.job
    }

    fn job_mut(&mut self) -> &mut JobState<Value> {
        &mut self.job
    }

    fn job_record(&self, project_id: &ProjectId, selection: Option<&Selection>) -> Value {
        let mut record = Map::new();
        record.insert(
            "id".to_string(),
            JobKey::for_project(project_id.clone()).to_wire("analysisJobId"),
        );
        record.insert("domains".to_string(), json!(self.domains));
        record.insert("dimensions".to_string(), json!(self.dimensions));
        record.insert("metrics".to_string(), json!(self.metrics));
        if let Some(auto_run) = self.auto_run {
            record.insert("autoRun".to_string(), Value::Bool(auto_run));
        }
        if let Some(selection) = selection.or(self.selection.as_ref()) {
            record.insert("selection".to_string(), json!(selection));
        }
        Value::Object(record)
    }

    fn results_path(
        &self,
        project_id: &ProjectId,
        job_id: &JobId,
        format: Option<&ResultsFormat>,
    ) -> ResourcePath {
        ResourcePath::analysis_job_results(
            project_id,
            job_id,
            format.unwrap_or(&self.results_format),
        )
    }

    fn results_from_submission(results: Option<Value>) -> Result<Value, serde_json::Error> {
        Ok(results.unwrap_or(Value::Null))
    }

    // The results resource either wraps the rows in `results` or is the
    // results document itself.
    fn results_from_payload(mut payload: Value) -> Result<Value, serde_json::Error> {
        if let Some(results) = payload.get_mut("results") {
            return Ok(results.take());
        }
        Ok(payload)
    }
}

impl JobOrchestrator {
    /// Submits the analysis. The model stays RUNNING on success.
    pub async fn create_analysis_job(
        &self,
        model: &mut AnalysisModel,
        selection: Option<&Selection>,
    ) -> JobResult<JobSubmission> {
        self.submit(model, selection).await
    }

    /// Polls the results of an already submitted analysis.
    pub async fn analysis_job_results(&self, model: &mut AnalysisModel) -> JobResult<()> {
        self.poll(model).await
    }

    /// Submits the analysis and waits for its results.
    pub async fn compute_analysis(
        &self,
        model: &mut AnalysisModel,
        selection: Option<&Selection>,
    ) -> JobResult<()> {
        self.compute(model, selection).await
    }

    /// Computes every analysis concurrently and waits for all of them.
    ///
    /// The aggregate error is the error of the last failing analysis in
    /// list order. The aggregate ends DONE whatever the outcome.
    pub async fn compute_multi_analysis(
        &self,
        multi: &mut MultiAnalysisModel,
        selection: Option<&Selection>,
    ) -> JobResult<()> {
        multi.begin();
        debug!("[Jobs] Computing {} analyses", multi.analyses.len());

        let outcomes = join_all(
            multi
                .analyses
                .iter_mut()
                .map(|analysis| self.compute_analysis(analysis, selection)),
        )
        .await;
        let failures = outcomes.iter().filter(|outcome| outcome.is_err()).count();

        let last_failure = multi
            .analyses
            .iter()
            .enumerate()
            .filter_map(|(index, analysis)| {
                analysis.job.error().map(|error| (index, error.clone()))
            })
            .last();

        if let Some((_, error)) = &last_failure {
            multi.set_error(error.clone());
        }
        multi.finish();
        info!(
            "[Jobs] Multi analysis done: {} of {} failed",
            failures,
            multi.analyses.len()
        );

        match last_failure {
            Some((index, error)) => Err(JobError::ChildJobFailed { index, error }),
            None => Ok(()),
        }
    }
}
