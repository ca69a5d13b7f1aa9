use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Customer (tenant) identifier scoping tokens and login URLs
    CustomerId
);
string_id!(
    /// OAuth client identifier of the host application
    ClientId
);
string_id!(ProjectId);
string_id!(DomainId);
string_id!(DimensionId);
string_id!(MetricId);
string_id!(
    /// Server-assigned identifier of an analysis or facet job
    JobId
);

/// Primary key of a domain inside a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainPk {
    pub project_id: ProjectId,
    pub domain_id: DomainId,
}

/// Primary key of a dimension inside a domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionPk {
    pub project_id: ProjectId,
    pub domain_id: DomainId,
    pub dimension_id: DimensionId,
}

/// Primary key of a metric inside a domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPk {
    pub project_id: ProjectId,
    pub domain_id: DomainId,
    pub metric_id: MetricId,
}

/// Composite job identifier: the owning project plus the job id once the
/// server has assigned one.
///
/// The server names the job field after the job family (`analysisJobId`,
/// `facetJobId`); all spellings are accepted when reading.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct JobKey {
    #[serde(
        rename = "projectId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub project_id: Option<ProjectId>,
    #[serde(
        rename = "jobId",
        alias = "analysisJobId",
        alias = "facetJobId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub job_id: Option<JobId>,
}

impl JobKey {
    pub fn for_project(project_id: ProjectId) -> Self {
        Self {
            project_id: Some(project_id),
            job_id: None,
        }
    }

    /// Wire form using the family specific job id field name.
    pub fn to_wire(&self, job_field: &str) -> Value {
        let mut map = Map::new();
        map.insert(
            "projectId".to_string(),
            self.project_id
                .as_ref()
                .map(|p| Value::String(p.0.clone()))
                .unwrap_or(Value::Null),
        );
        map.insert(
            job_field.to_string(),
            self.job_id
                .as_ref()
                .map(|j| Value::String(j.0.clone()))
                .unwrap_or(Value::Null),
        );
        Value::Object(map)
    }
}
