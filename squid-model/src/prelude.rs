//! Client focused snapshot of the model surface.
//! Prefer importing from this module instead of individual tree nodes when
//! working in squid-client or host applications.

pub use super::error::{ModelError, Result as ModelResult};
pub use super::ids::{
    ClientId, CustomerId, DimensionId, DimensionPk, DomainId, DomainPk,
    JobId, JobKey, MetricId, MetricPk, ProjectId,
};
pub use super::job::{
    AnalysisModel, ApiError, FacetModel, JobState, JobStatus,
    MultiAnalysisModel, ResultsFormat,
};
pub use super::paths::ResourcePath;
pub use super::selection::{Facet, FacetDimension, FacetItem, Selection};
pub use super::session::{LoginRecord, TokenGrant, TokenInfo};
