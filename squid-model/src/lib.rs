//! Core data model definitions shared across Squid client crates.
//!
//! Everything here is plain data: identifiers, the selection/facet wire
//! shapes, job models with their RUNNING/DONE state, session records and the
//! resource path composition used to address API resources.

pub mod error;
pub mod ids;
pub mod job;
pub mod paths;
pub mod prelude;
pub mod selection;
pub mod session;

// Intentionally curated re-exports for downstream consumers.
pub use error::{ModelError, Result as ModelResult};
pub use ids::{
    ClientId, CustomerId, DimensionId, DimensionPk, DomainId, DomainPk,
    JobId, JobKey, MetricId, MetricPk, ProjectId,
};
pub use job::{
    AnalysisModel, ApiError, FacetModel, JobState, JobStatus,
    MultiAnalysisModel, ResultsFormat,
};
pub use paths::ResourcePath;
pub use selection::{Facet, FacetDimension, FacetItem, Selection};
pub use session::{LoginRecord, TokenGrant, TokenInfo};
