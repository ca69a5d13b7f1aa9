//! Session lifecycle: initialization, token login, logout and invalidation.

pub mod manager;
pub mod state;

pub use manager::{Collaborators, SessionManager};
pub use state::{AuthOutcome, Session, SessionStateStore};
