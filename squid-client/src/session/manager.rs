use std::sync::Arc;

use chrono::Duration;
use log::{debug, info, warn};
use squid_model::{LoginRecord, ResourcePath, TokenGrant, TokenInfo};
use tokio::sync::watch;

use crate::activity::ActivityTracker;
use crate::api_client::ApiClient;
use crate::config::{
    ClientConfig, DEFAULT_TOKEN_EXPIRATION_MINUTES, OrchestratorConfig, ResolvedConfig,
};
use crate::errors::{AuthError, AuthResult, ClientResult, StorageError, TransportError};
use crate::jobs::JobOrchestrator;
use crate::location::LocationSource;
use crate::session::state::{AuthOutcome, Session, SessionStateStore};
use crate::token_store::{TOKEN_KEY, TokenStore, token_key};
use crate::transport::HttpTransport;

const LOGOUT_FAILED_MESSAGE: &str = "logout failed";
const DEFAULT_LOGIN_HOST: &str = "https://api.squidsolutions.com/release/v4.2/api/oauth";

/// Host supplied collaborators of a session.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn HttpTransport>,
    pub token_store: Arc<dyn TokenStore>,
    pub location: Arc<dyn LocationSource>,
    pub activity: ActivityTracker,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("activity", &self.activity)
            .finish_non_exhaustive()
    }
}

impl Collaborators {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        token_store: Arc<dyn TokenStore>,
        location: Arc<dyn LocationSource>,
    ) -> Self {
        Self {
            transport,
            token_store,
            location,
            activity: ActivityTracker::new(),
        }
    }

    pub fn with_activity(mut self, activity: ActivityTracker) -> Self {
        self.activity = activity;
        self
    }
}

/// Session manager
///
/// ## Token lifecycle
///
/// - A token comes from the location (`access_token`), from an authorization
///   `code` exchanged at `/token`, or from the token store.
/// - It is validated with `/tokeninfo` (which also tells the customer it
///   belongs to) and `/user`, then persisted under `sq-token_<customerId>`
///   and `sq-token`.
/// - Any tracked request answered 401 or 403 clears both store entries and
///   the in-memory token and login. Nothing is retried.
#[derive(Clone)]
pub struct SessionManager {
    config: ResolvedConfig,
    api: ApiClient,
    state: SessionStateStore,
    token_store: Arc<dyn TokenStore>,
    location: Arc<dyn LocationSource>,
    activity: ActivityTracker,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("api", &self.api)
            .field("authenticated", &self.state.current().is_authenticated())
            .finish()
    }
}

impl SessionManager {
    /// Resolves the session settings and wires the 401/403 invalidation.
    /// No request is sent; call [`SessionManager::start`] to log in.
    pub async fn initialize(
        config: &ClientConfig,
        collaborators: Collaborators,
    ) -> ClientResult<Self> {
        let Collaborators {
            transport,
            token_store,
            location,
            activity,
        } = collaborators;

        let resolved = ResolvedConfig::resolve(config, location.as_ref());
        info!(
            "[Session] Initializing for customer {:?}, API {}",
            resolved.customer_id, resolved.api_url
        );

        let state = SessionStateStore::new(Session {
            customer_id: resolved.customer_id.clone(),
            client_id: resolved.client_id.clone(),
            project_id: resolved.project_id.clone(),
            ..Session::default()
        });

        let api = ApiClient::new(
            resolved.api_url.clone(),
            transport,
            state.clone(),
            activity.clone(),
        )?
        .with_timeout_millis(resolved.timeout_millis);

        let store = token_store.clone();
        let observed = state.clone();
        api.set_invalidation_callback(move |error| {
            let store = store.clone();
            let observed = observed.clone();
            async move {
                warn!(
                    "[Session] Server answered {:?}, clearing login",
                    error.status
                );
                if let Err(e) = clear_session(store.as_ref(), &observed) {
                    warn!("[Session] Failed to remove stored token: {}", e);
                }
            }
        })
        .await;

        Ok(Self {
            config: resolved,
            api,
            state,
            token_store,
            location,
            activity,
        })
    }

    /// Initial login: exchanges the location's `code` when present, otherwise
    /// uses its `access_token` (or the stored token).
    pub async fn start(&self) -> AuthResult<AuthOutcome> {
        match self.location.param("code") {
            Some(code) => self.authenticate_with_code(&code, None).await,
            None => {
                let token = self.location.param("access_token");
                self.authenticate_with_token(token, None).await
            }
        }
    }

    /// Exchanges an OAuth authorization code for a token, then logs in with
    /// it. A failed exchange falls back to the stored token.
    pub async fn authenticate_with_code(
        &self,
        code: &str,
        expiration: Option<Duration>,
    ) -> AuthResult<AuthOutcome> {
        let mut form = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), code.to_string()),
        ];
        if let Some(client_id) = &self.config.client_id {
            form.push(("client_id".to_string(), client_id.to_string()));
        }
        form.push(("redirect_uri".to_string(), String::new()));

        let grant = self
            .api
            .post_form(&ResourcePath::token(), form)
            .await
            .and_then(|value| {
                serde_json::from_value::<TokenGrant>(value).map_err(|e| {
                    TransportError::network(format!("Malformed token grant: {e}"))
                })
            });

        match grant {
            Ok(grant) => {
                debug!("[Session] Authorization code exchanged");
                self.authenticate_with_token(Some(grant.oid), expiration)
                    .await
            }
            Err(e) => {
                warn!("[Session] Authorization code exchange failed: {}", e);
                self.authenticate_with_token(None, expiration).await
            }
        }
    }

    /// Logs in with `token`, or with the stored token when `None`.
    ///
    /// Without any token the login identity is cleared and no request is
    /// sent. `expiration` defaults to 120 minutes.
    pub async fn authenticate_with_token(
        &self,
        token: Option<String>,
        expiration: Option<Duration>,
    ) -> AuthResult<AuthOutcome> {
        let expiration = expiration
            .unwrap_or_else(|| Duration::minutes(DEFAULT_TOKEN_EXPIRATION_MINUTES));

        let token = match token.filter(|token| !token.is_empty()) {
            Some(token) => Some(token),
            None => {
                let key = token_key(self.state.customer_id().as_ref());
                self.token_store.read(&key)?
            }
        };
        let Some(token) = token else {
            debug!("[Session] No access token available");
            self.state.clear_identity();
            return Ok(AuthOutcome::Anonymous);
        };

        self.state.set_access_token(token.clone());

        let info = match self.api.fetch::<TokenInfo>(&ResourcePath::token_info()).await {
            Ok(info) => info,
            Err(e) => {
                self.state.clear_identity();
                return Err(AuthError::from_transport(e, AuthError::TokenInfo));
            }
        };

        self.state.update(|session| {
            session.customer_id = info.customer_id.clone();
            session.token_info = Some(info.clone());
        });

        if let Some(expected) = &self.config.client_id
            && info.client_id.as_ref() != Some(expected)
        {
            warn!(
                "[Session] Token belongs to client {:?}, expected {}",
                info.client_id, expected
            );
            self.state.clear_identity();
            return Err(AuthError::ClientMismatch {
                expected: expected.to_string(),
                actual: info.client_id.map(|id| id.to_string()),
            });
        }

        let login = match self.api.fetch::<LoginRecord>(&ResourcePath::user()).await {
            Ok(login) => login,
            Err(e) => {
                self.state.clear_identity();
                return Err(AuthError::from_transport(e, AuthError::Login));
            }
        };

        self.state
            .update(|session| session.login = Some(login.clone()));

        let customer_key = token_key(info.customer_id.as_ref());
        self.token_store.write(&customer_key, &token, expiration)?;
        if customer_key != TOKEN_KEY {
            self.token_store.write(TOKEN_KEY, &token, expiration)?;
        }

        info!(
            "[Session] Logged in as {:?}",
            login.login.as_deref().or(login.email.as_deref())
        );
        Ok(AuthOutcome::Authenticated(login))
    }

    /// Revokes the token server side. On failure the session is kept and the
    /// activity message says so.
    pub async fn logout(&self) -> AuthResult<()> {
        if self.state.access_token().is_none() {
            return Err(AuthError::NotAuthenticated);
        }

        match self.api.get(&ResourcePath::logout()).await {
            Ok(_) => {
                info!("[Session] Logged out");
                self.invalidate()?;
                Ok(())
            }
            Err(e) => {
                warn!("[Session] Logout failed: {}", e);
                self.activity.set_message(LOGOUT_FAILED_MESSAGE);
                Err(AuthError::from_transport(e, AuthError::Logout))
            }
        }
    }

    /// Clears the stored token entries and the in-memory token and login.
    pub fn invalidate(&self) -> Result<(), StorageError> {
        clear_session(self.token_store.as_ref(), &self.state)
    }

    pub fn session(&self) -> Session {
        self.state.current()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.access_token()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn state(&self) -> &SessionStateStore {
        &self.state
    }

    /// Login URL built from the resolved login host.
    pub fn login_url(&self) -> &str {
        &self.config.login_url
    }

    /// Login URL on the public release API for the current client and
    /// customer.
    pub fn default_login_url(&self) -> String {
        let client_id = self
            .config
            .client_id
            .as_ref()
            .map(|id| urlencoding::encode(id.as_str()).into_owned())
            .unwrap_or_default();
        let mut url = format!("{DEFAULT_LOGIN_HOST}?client_id={client_id}");
        if let Some(customer_id) = self.state.customer_id() {
            url.push_str("&customerId=");
            url.push_str(&urlencoding::encode(customer_id.as_str()));
        }
        url
    }

    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }

    /// API environment name, e.g. `release`.
    pub fn api(&self) -> &str {
        &self.config.api
    }

    pub fn api_client(&self) -> &ApiClient {
        &self.api
    }

    /// Orchestrator sending its jobs with this session's token.
    pub fn job_orchestrator(&self, config: OrchestratorConfig) -> JobOrchestrator {
        JobOrchestrator::new(self.api.clone(), config)
    }

    pub fn activity(&self) -> &ActivityTracker {
        &self.activity
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }
}

/// Removes both token entries, then forgets the login in memory. The memory
/// side is cleared even when the store fails.
fn clear_session(
    store: &dyn TokenStore,
    state: &SessionStateStore,
) -> Result<(), StorageError> {
    let customer_key = token_key(state.customer_id().as_ref());
    let scoped = store.remove(&customer_key);
    let global = if customer_key != TOKEN_KEY {
        store.remove(TOKEN_KEY)
    } else {
        Ok(())
    };
    state.clear_login();
    scoped.and(global)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::LocationHref;
    use crate::token_store::MockTokenStore;
    use crate::transport::MockHttpTransport;

    async fn manager(store: MockTokenStore) -> SessionManager {
        let config = ClientConfig::default()
            .with_customer_id("acme")
            .with_client_id("app");
        SessionManager::initialize(
            &config,
            Collaborators::new(
                Arc::new(MockHttpTransport::new()),
                Arc::new(store),
                Arc::new(LocationHref::default()),
            ),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn missing_token_is_anonymous_without_requests() {
        let mut store = MockTokenStore::new();
        store
            .expect_read()
            .withf(|key| key == "sq-token_acme")
            .times(1)
            .returning(|_| Ok(None));
        let session = manager(store).await;

        let outcome = session.authenticate_with_token(None, None).await.unwrap();

        assert_eq!(outcome, AuthOutcome::Anonymous);
        assert!(session.session().login.is_none());
        assert_eq!(session.activity().status(), None);
    }

    #[tokio::test]
    async fn invalidate_removes_both_keys() {
        let mut store = MockTokenStore::new();
        store
            .expect_remove()
            .withf(|key| key == "sq-token_acme")
            .times(1)
            .returning(|_| Ok(()));
        store
            .expect_remove()
            .withf(|key| key == "sq-token")
            .times(1)
            .returning(|_| Ok(()));
        let session = manager(store).await;
        session.state().set_access_token("t1");

        session.invalidate().unwrap();

        assert_eq!(session.access_token(), None);
    }

    #[tokio::test]
    async fn store_failure_still_clears_memory() {
        let mut store = MockTokenStore::new();
        store.expect_remove().returning(|_| {
            Err(StorageError::WriteFailed(std::io::Error::other("disk full")))
        });
        let session = manager(store).await;
        session.state().set_access_token("t1");

        assert!(session.invalidate().is_err());
        assert_eq!(session.access_token(), None);
    }

    #[tokio::test]
    async fn logout_without_token_sends_nothing() {
        let session = manager(MockTokenStore::new()).await;
        assert!(matches!(
            session.logout().await,
            Err(AuthError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn urls_follow_resolved_config() {
        let session = manager(MockTokenStore::new()).await;
        assert_eq!(
            session.api_url(),
            "https://api.squidsolutions.com/release/v4.2/rs"
        );
        assert_eq!(session.api(), "release");
        assert_eq!(
            session.default_login_url(),
            "https://api.squidsolutions.com/release/v4.2/api/oauth?client_id=app&customerId=acme"
        );
        assert!(session.login_url().ends_with("client_id=app&customerId=acme"));
    }
}
