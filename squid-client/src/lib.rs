//! Squid analytics API client
//!
//! This crate wraps the Squid REST API (v4.2) for host applications:
//!
//! - [`SessionManager`] resolves the session settings, logs in with an access
//!   token or an OAuth authorization code, persists the token and clears it
//!   when the server rejects it.
//! - [`ActivityTracker`] counts in-flight requests and keeps the last error
//!   and status message for a busy indicator.
//! - [`JobOrchestrator`] submits analysis and facet jobs and polls their
//!   results.
//!
//! Collaborators are traits ([`HttpTransport`], [`TokenStore`],
//! [`LocationSource`]) with thin default adapters, so a host can swap any of
//! them. The wire data model lives in `squid-model` and is re-exported as
//! [`model`].
//!
//! Notes
//! - Logging goes through the `log` facade; the host picks the backend.
//! - Public items are subject to change while the API stabilizes.

pub mod activity;
pub mod api_client;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod location;
pub mod session;
/// Test doubles, public so that host applications can test against them
pub mod testing;
pub mod token_store;
pub mod transport;

pub use squid_model as model;

pub use activity::{ActivityState, ActivityTracker, TaskGuard, TaskId};
pub use api_client::ApiClient;
pub use config::{ClientConfig, OrchestratorConfig, ResolvedConfig};
pub use errors::{
    AuthError, ClientError, ClientResult, JobError, StorageError,
    TransportError,
};
pub use jobs::{JobModel, JobOrchestrator, JobSubmission};
pub use location::{LocationHref, LocationSource};
pub use session::{
    AuthOutcome, Collaborators, Session, SessionManager, SessionStateStore,
};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use transport::{HttpTransport, ReqwestTransport, RequestBody};
