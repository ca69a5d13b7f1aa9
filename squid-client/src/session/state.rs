//! Session state shared through a watch channel.

use std::sync::Arc;

use squid_model::{ClientId, CustomerId, LoginRecord, ProjectId, TokenInfo};
use tokio::sync::watch;

/// Identity and credentials of the current session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub customer_id: Option<CustomerId>,
    pub client_id: Option<ClientId>,
    pub project_id: Option<ProjectId>,
    pub access_token: Option<String>,
    pub token_info: Option<TokenInfo>,
    pub login: Option<LoginRecord>,
}

impl Session {
    /// A token is held and the server confirmed who it belongs to.
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some() && self.login.is_some()
    }
}

/// Outcome of a successful authentication attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    /// No token was supplied or stored; nothing was sent to the server.
    Anonymous,
    Authenticated(LoginRecord),
}

impl AuthOutcome {
    pub fn login(&self) -> Option<&LoginRecord> {
        match self {
            AuthOutcome::Authenticated(login) => Some(login),
            AuthOutcome::Anonymous => None,
        }
    }
}

/// Cheap to clone handle on the session. Writes are published to every
/// subscriber.
#[derive(Clone, Debug)]
pub struct SessionStateStore {
    sender: Arc<watch::Sender<Session>>,
    receiver: watch::Receiver<Session>,
}

impl SessionStateStore {
    pub fn new(initial: Session) -> Self {
        let (sender, receiver) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn current(&self) -> Session {
        self.receiver.borrow().clone()
    }

    /// Access state without cloning
    pub fn with_state<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Session) -> R,
    {
        f(&self.receiver.borrow())
    }

    pub fn access_token(&self) -> Option<String> {
        self.with_state(|session| session.access_token.clone())
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.with_state(|session| session.customer_id.clone())
    }

    /// Receiver that has seen the current value.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.sender.subscribe()
    }

    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Session),
    {
        self.sender.send_modify(f);
    }

    pub fn set_access_token(&self, token: impl Into<String>) {
        let token = token.into();
        self.update(|session| session.access_token = Some(token));
    }

    /// Forgets who is logged in but keeps the token.
    pub fn clear_identity(&self) {
        self.update(|session| session.login = None);
    }

    /// Forgets the token and everything learned from it.
    pub fn clear_login(&self) {
        self.update(|session| {
            session.access_token = None;
            session.token_info = None;
            session.login = None;
        });
    }
}

impl Default for SessionStateStore {
    fn default() -> Self {
        Self::new(Session::default())
    }
}
