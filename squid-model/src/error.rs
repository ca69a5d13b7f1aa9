use std::fmt::{self, Display};

/// Errors produced by model constructors and parsing routines.
#[derive(Debug)]
pub enum ModelError {
    UnknownStatus(String),
    MissingDomain,
    InvalidPayload(serde_json::Error),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::UnknownStatus(raw) => {
                write!(f, "unknown job status: {raw}")
            }
            ModelError::MissingDomain => {
                write!(f, "a domain must be set before dimensions or metrics")
            }
            ModelError::InvalidPayload(err) => {
                write!(f, "invalid payload: {err}")
            }
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelError::InvalidPayload(err) => Some(err),
            ModelError::UnknownStatus(_) | ModelError::MissingDomain => None,
        }
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::InvalidPayload(err)
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
