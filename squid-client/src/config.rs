//! Client configuration
//!
//! [`ClientConfig`] is what the host supplies (defaults, then environment
//! overrides). At session initialization it is merged with the location
//! parameters into a [`ResolvedConfig`], where location always wins.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use squid_model::{ClientId, CustomerId, ProjectId, ResultsFormat};

use crate::location::LocationSource;

pub const DEFAULT_API_URL: &str = "https://api.squidsolutions.com";
pub const DEFAULT_API: &str = "release";
pub const DEFAULT_LOGIN_URL: &str = "https://api.squidsolutions.com";
pub const API_VERSION: &str = "v4.2";
pub const DEFAULT_TIMEOUT_MILLIS: u64 = 10_000;
/// Lifetime of a persisted access token when the caller does not pick one.
pub const DEFAULT_TOKEN_EXPIRATION_MINUTES: i64 = 120;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub customer_id: Option<CustomerId>,
    pub client_id: Option<ClientId>,
    pub project_id: Option<ProjectId>,
    /// Host of the API, without the environment and version suffix.
    pub api_url: Option<String>,
    /// API environment, e.g. `release` or `dev`.
    pub api: Option<String>,
    pub login_url: Option<String>,
    pub timeout_millis: Option<u64>,
}

impl ClientConfig {
    /// Defaults overridden by `SQUID_*` environment variables.
    pub fn load() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let timeout_millis = var("SQUID_TIMEOUT_MILLIS").and_then(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|e| {
                    log::warn!(
                        "[Config] Ignoring invalid SQUID_TIMEOUT_MILLIS '{}': {}",
                        raw,
                        e
                    )
                })
                .ok()
        });

        Self {
            customer_id: var("SQUID_CUSTOMER_ID").map(CustomerId::new),
            client_id: var("SQUID_CLIENT_ID").map(ClientId::new),
            project_id: var("SQUID_PROJECT_ID").map(ProjectId::new),
            api_url: var("SQUID_API_URL"),
            api: var("SQUID_API"),
            login_url: var("SQUID_LOGIN_URL"),
            timeout_millis,
        }
    }

    pub fn with_customer_id(mut self, customer_id: impl Into<CustomerId>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<ClientId>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_project_id(mut self, project_id: impl Into<ProjectId>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    pub fn with_timeout_millis(mut self, timeout_millis: u64) -> Self {
        self.timeout_millis = Some(timeout_millis);
        self
    }
}

/// Effective settings of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub customer_id: Option<CustomerId>,
    pub client_id: Option<ClientId>,
    pub project_id: Option<ProjectId>,
    /// `{apiUrl}/{api}/v4.2/rs`
    pub api_url: String,
    pub api: String,
    /// OAuth entry point the host should redirect to for an authorization code.
    pub login_url: String,
    pub timeout_millis: u64,
}

impl ResolvedConfig {
    pub fn resolve(config: &ClientConfig, location: &dyn LocationSource) -> Self {
        let customer_id = location
            .param("customerId")
            .map(CustomerId::new)
            .or_else(|| config.customer_id.clone());
        let client_id = location
            .param("clientId")
            .map(ClientId::new)
            .or_else(|| config.client_id.clone());
        let project_id = location
            .param("projectId")
            .map(ProjectId::new)
            .or_else(|| config.project_id.clone());

        let api = location
            .param("api")
            .or_else(|| config.api.clone())
            .unwrap_or_else(|| DEFAULT_API.to_string());
        let host = location
            .param("apiUrl")
            .or_else(|| config.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = format!(
            "{}/{}/{}/rs",
            host.trim_end_matches('/'),
            api,
            API_VERSION
        );

        let login_host = location
            .param("loginUrl")
            .or_else(|| config.login_url.clone())
            .unwrap_or_else(|| DEFAULT_LOGIN_URL.to_string());
        let mut login_url = format!(
            "{}/api/oauth?response_type=code",
            login_host.trim_end_matches('/')
        );
        if let Some(client_id) = &client_id {
            login_url.push_str("&client_id=");
            login_url.push_str(&urlencoding::encode(client_id.as_str()));
        }
        if let Some(customer_id) = &customer_id {
            login_url.push_str("&customerId=");
            login_url.push_str(&urlencoding::encode(customer_id.as_str()));
        }
        log::debug!("[Config] Login URL: {}", login_url);

        Self {
            customer_id,
            client_id,
            project_id,
            api_url,
            api,
            login_url,
            timeout_millis: config
                .timeout_millis
                .filter(|millis| *millis > 0)
                .unwrap_or(DEFAULT_TIMEOUT_MILLIS),
        }
    }
}

/// Tuning of the job polling loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrchestratorConfig {
    /// Pause between two results requests. `None` polls back to back.
    pub poll_delay: Option<Duration>,
    /// Overrides the results format of every analysis model when set.
    pub results_format: Option<ResultsFormat>,
}

impl OrchestratorConfig {
    /// Defaults overridden by `SQUID_POLL_DELAY_MILLIS`.
    pub fn load() -> Self {
        let poll_delay = std::env::var("SQUID_POLL_DELAY_MILLIS")
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis);
        Self {
            poll_delay,
            results_format: None,
        }
    }

    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = Some(delay);
        self
    }
}
