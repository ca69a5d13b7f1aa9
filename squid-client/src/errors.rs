//! Client error types
//!
//! Failures are grouped by the boundary that produces them: the transport,
//! the session (authentication), the token store and job orchestration.
//! [`ClientError`] wraps them all for callers that do not care which.

use serde_json::Value;
use squid_model::{ApiError, JobId, ModelError};
use thiserror::Error;

/// Failed HTTP exchange, or no exchange at all when `status` is `None`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", self.describe())]
pub struct TransportError {
    pub status: Option<u16>,
    pub status_text: String,
    /// Parsed response body, when the server sent JSON.
    pub body: Option<Value>,
}

impl TransportError {
    pub fn http(status: u16, status_text: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            status_text: status_text.into(),
            body: None,
        }
    }

    /// Connection, timeout or decoding failure without an HTTP status.
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            status_text: message.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// 401 and 403 both mean the session is no longer usable.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status, Some(401) | Some(403))
    }

    /// The failed response as it is written onto job and activity records.
    pub fn to_api_error(&self) -> ApiError {
        let mut error = self
            .body
            .clone()
            .map(ApiError::from_payload)
            .unwrap_or_default();
        error.status = self.status.or(error.status);
        if error.message.is_none() {
            error.message = Some(self.status_text.clone());
        }
        error
    }

    fn describe(&self) -> String {
        match self.status {
            Some(status) => format!("HTTP {status}: {}", self.status_text),
            None => format!("network error: {}", self.status_text),
        }
    }
}

/// Session and authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// The server answered 401/403; the session has been invalidated
    #[error("Session rejected by server: {0}")]
    Rejected(TransportError),

    #[error("Token metadata unavailable: {0}")]
    TokenInfo(TransportError),

    #[error("Token was issued for client {actual:?}, expected {expected}")]
    ClientMismatch {
        expected: String,
        actual: Option<String>,
    },

    #[error("Login record unavailable: {0}")]
    Login(TransportError),

    #[error("Logout failed: {0}")]
    Logout(TransportError),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl AuthError {
    /// Wraps a failed request, promoting 401/403 to [`AuthError::Rejected`].
    pub(crate) fn from_transport(
        err: TransportError,
        wrap: fn(TransportError) -> AuthError,
    ) -> Self {
        if err.is_auth_failure() {
            AuthError::Rejected(err)
        } else {
            wrap(err)
        }
    }
}

/// Token store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to initialize storage: {0}")]
    InitFailed(String),

    #[error("Failed to read from storage")]
    ReadFailed(#[source] std::io::Error),

    #[error("Failed to write to storage")]
    WriteFailed(#[source] std::io::Error),

    #[error("Corrupted storage data")]
    CorruptedData(#[source] serde_json::Error),
}

/// Job orchestration errors
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job submission failed: {source}")]
    SubmitFailed { source: TransportError },

    #[error("Results of job {job_id} unavailable: {source}")]
    PollFailed {
        job_id: JobId,
        source: TransportError,
    },

    /// The server finished the job with an application error payload
    #[error("Job failed: {0}")]
    Application(ApiError),

    /// Last failing child of a multi-analysis, in submission order
    #[error("Analysis #{index} failed: {error}")]
    ChildJobFailed { index: usize, error: ApiError },

    #[error("Job polling cancelled")]
    Cancelled,

    #[error("Job model has no project id")]
    MissingProject,

    #[error("Job has no server assigned id")]
    MissingJobId,

    #[error("Malformed job response")]
    MalformedResponse(#[source] serde_json::Error),
}

/// Any failure surfaced by the client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type AuthResult<T> = Result<T, AuthError>;
pub type JobResult<T> = Result<T, JobError>;
pub type ClientResult<T> = Result<T, ClientError>;
