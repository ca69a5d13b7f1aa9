use serde_json::{Map, Value, json};
use squid_model::{
    Facet, FacetModel, JobId, JobKey, JobState, ProjectId, ResourcePath,
    ResultsFormat, Selection, paths::FACET_JOBS,
};

use super::{JobModel, JobOrchestrator, JobSubmission};
use crate::errors::JobResult;

impl JobModel for FacetModel {
    type Results = Vec<Facet>;

    const COLLECTION: &'static str = FACET_JOBS;

    fn key(&self) -> &JobKey {
        &self.id
    }

    fn job(&self) -> &JobState<Vec<Facet>> {
        &self.job
    }

    fn job_mut(&mut self) -> &mut JobState<Vec<Facet>> {
        &mut self.job
    }

    fn job_record(&self, project_id: &ProjectId, selection: Option<&Selection>) -> Value {
        let mut record = Map::new();
        record.insert("id".to_string(), json!({ "projectId": project_id }));
        record.insert("domains".to_string(), json!(self.domains));
        if let Some(selection) = selection.or(self.selection.as_ref()) {
            record.insert("selection".to_string(), json!(selection));
        }
        Value::Object(record)
    }

    fn prepare_submit(&mut self) {
        self.user_selection = None;
    }

    fn results_path(
        &self,
        project_id: &ProjectId,
        job_id: &JobId,
        _format: Option<&ResultsFormat>,
    ) -> ResourcePath {
        ResourcePath::facet_job_results(project_id, job_id)
    }

    fn results_from_submission(results: Option<Value>) -> Result<Vec<Facet>, serde_json::Error> {
        facets_of(results.unwrap_or(Value::Null))
    }

    // Results resources carry the facets at the top level; finished
    // submissions nest them under `results`.
    fn results_from_payload(mut payload: Value) -> Result<Vec<Facet>, serde_json::Error> {
        if payload.get("facets").is_none()
            && let Some(results) = payload.get_mut("results")
        {
            return facets_of(results.take());
        }
        facets_of(payload)
    }

    /// Computed facets become the model's selection.
    fn complete(&mut self, facets: Vec<Facet>) {
        self.selection = Some(Selection::from_facets(facets.clone()));
        self.job.succeed(facets);
    }
}

fn facets_of(mut payload: Value) -> Result<Vec<Facet>, serde_json::Error> {
    match payload.get_mut("facets").map(Value::take) {
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(facets) => serde_json::from_value(facets),
    }
}

impl JobOrchestrator {
    /// Submits the facet job and waits for the computed facets.
    pub async fn compute_facets(
        &self,
        model: &mut FacetModel,
        selection: Option<&Selection>,
    ) -> JobResult<()> {
        self.compute(model, selection).await
    }

    /// Submits the facet job. The model stays RUNNING on success.
    pub async fn create_facet_job(
        &self,
        model: &mut FacetModel,
        selection: Option<&Selection>,
    ) -> JobResult<JobSubmission> {
        self.submit(model, selection).await
    }

    /// Polls the facets of an already submitted facet job.
    pub async fn facet_job_results(&self, model: &mut FacetModel) -> JobResult<()> {
        self.poll(model).await
    }
}
