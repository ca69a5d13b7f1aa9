//! Resource path composition.
//!
//! Every API resource path is its parent's path plus a segment built from
//! the resource's identifying fields, e.g. a job's results live under the
//! job which lives under its project.

use std::fmt;

use crate::ids::{JobId, ProjectId};
use crate::job::ResultsFormat;

pub const PROJECTS: &str = "projects";
pub const ANALYSIS_JOBS: &str = "analysisjobs";
pub const FACET_JOBS: &str = "facetjobs";
pub const RESULTS: &str = "results";

/// A path relative to the API base URL, with optional query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourcePath {
    segments: Vec<String>,
    trailing_slash: bool,
    query: Vec<(String, String)>,
}

impl ResourcePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Appends one segment. Query parameters are not inherited by children.
    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.as_ref().trim_matches('/').to_string());
        Self {
            segments,
            trailing_slash: false,
            query: Vec::new(),
        }
    }

    /// Appends `collection` and, when known, the member id. Without an id the
    /// path addresses the collection itself and keeps a trailing slash.
    pub fn member(&self, collection: &str, id: Option<&str>) -> Self {
        let collection = self.child(collection);
        match id {
            Some(id) => collection.child(id),
            None => Self {
                trailing_slash: true,
                ..collection
            },
        }
    }

    pub fn with_query(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn project(project_id: &ProjectId) -> Self {
        Self::root().member(PROJECTS, Some(project_id.as_str()))
    }

    pub fn analysis_job(project_id: &ProjectId, job_id: Option<&JobId>) -> Self {
        Self::project(project_id)
            .member(ANALYSIS_JOBS, job_id.map(JobId::as_str))
    }

    pub fn analysis_job_results(
        project_id: &ProjectId,
        job_id: &JobId,
        format: &ResultsFormat,
    ) -> Self {
        Self::analysis_job(project_id, Some(job_id))
            .child(RESULTS)
            .with_query("compression", &format.compression)
            .with_query("format", &format.format)
    }

    pub fn facet_job(project_id: &ProjectId, job_id: Option<&JobId>) -> Self {
        Self::project(project_id).member(FACET_JOBS, job_id.map(JobId::as_str))
    }

    pub fn facet_job_results(project_id: &ProjectId, job_id: &JobId) -> Self {
        Self::facet_job(project_id, Some(job_id)).child(RESULTS)
    }

    pub fn token() -> Self {
        Self::root().child("token")
    }

    pub fn token_info() -> Self {
        Self::root().child("tokeninfo")
    }

    pub fn user() -> Self {
        Self::root().child("user")
    }

    pub fn logout() -> Self {
        Self::root().child("logout")
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{}", urlencoding::encode(segment))?;
        }
        if self.trailing_slash || self.segments.is_empty() {
            f.write_str("/")?;
        }
        for (i, (name, value)) in self.query.iter().enumerate() {
            let delim = if i == 0 { '?' } else { '&' };
            write!(f, "{delim}{name}={}", urlencoding::encode(value))?;
        }
        Ok(())
    }
}
