use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use log::{info, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use squid_model::ResourcePath;
use tokio::sync::Mutex;

use crate::activity::ActivityTracker;
use crate::errors::{ClientError, TransportError};
use crate::session::SessionStateStore;
use crate::transport::{HttpTransport, Method, RequestBody, redact};

/// Callback run when a tracked request is answered 401 or 403
pub type InvalidationCallback = Arc<
    Mutex<
        Option<
            Box<
                dyn Fn(TransportError) -> Pin<Box<dyn Future<Output = ()> + Send>>
                    + Send
                    + Sync,
            >,
        >,
    >,
>;

/// API client bound to one session
///
/// URLs are built from [`ResourcePath`]s under the session's API base URL.
/// Session requests carry the `timeout` and `access_token` query parameters;
/// the token exchange carries neither. Every request is registered with the
/// [`ActivityTracker`] while in flight and has its failure written into the
/// tracker's error slot.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    timeout_millis: Option<u64>,
    session: SessionStateStore,
    activity: ActivityTracker,
    invalidation_callback: InvalidationCallback,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("timeout_millis", &self.timeout_millis)
            .field("has_token", &self.session.access_token().is_some())
            .finish()
    }
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        session: SessionStateStore,
        activity: ActivityTracker,
    ) -> Result<Self, ClientError> {
        let raw = base_url.into();
        let base_url = raw.trim().trim_end_matches('/').to_string();
        url::Url::parse(&base_url)
            .map_err(|e| ClientError::Config(format!("invalid API URL '{raw}': {e}")))?;

        info!("[ApiClient] Creating API client with base URL: {}", base_url);

        Ok(Self {
            transport,
            base_url,
            timeout_millis: None,
            session,
            activity,
            invalidation_callback: Arc::new(Mutex::new(None)),
        })
    }

    pub fn with_timeout_millis(mut self, timeout_millis: u64) -> Self {
        self.timeout_millis = Some(timeout_millis);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn activity(&self) -> &ActivityTracker {
        &self.activity
    }

    pub fn session(&self) -> &SessionStateStore {
        &self.session
    }

    /// Set the callback run on 401/403 answers
    pub async fn set_invalidation_callback<F, Fut>(&self, callback: F)
    where
        F: Fn(TransportError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed_callback = Box::new(
            move |error: TransportError| -> Pin<Box<dyn Future<Output = ()> + Send>> {
                Box::pin(callback(error))
            },
        );
        *self.invalidation_callback.lock().await = Some(boxed_callback);
    }

    /// Absolute URL of `path` without any session parameters
    pub fn public_url(&self, path: &ResourcePath) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Absolute URL of `path` with the `timeout` and `access_token` parameters
    pub fn build_url(&self, path: &ResourcePath) -> String {
        let url = self.public_url(path);
        let url = add_param(
            url,
            "timeout",
            self.timeout_millis.map(|millis| millis.to_string()).as_deref(),
        );
        add_param(url, "access_token", self.session.access_token().as_deref())
    }

    pub async fn get(&self, path: &ResourcePath) -> Result<Value, TransportError> {
        self.send(Method::GET, path, None).await
    }

    /// GET decoded into `T`. Undecodable bodies fail like a network error and
    /// keep the raw body.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        path: &ResourcePath,
    ) -> Result<T, TransportError> {
        let value = self.get(path).await?;
        serde_json::from_value(value.clone()).map_err(|e| {
            TransportError::network(format!("Malformed response from {path}: {e}"))
                .with_body(value)
        })
    }

    pub async fn post_json(
        &self,
        path: &ResourcePath,
        body: Value,
    ) -> Result<Value, TransportError> {
        self.send(Method::POST, path, Some(RequestBody::Json(body))).await
    }

    /// Tracked form POST without session parameters, for the token exchange.
    pub async fn post_form(
        &self,
        path: &ResourcePath,
        fields: Vec<(String, String)>,
    ) -> Result<Value, TransportError> {
        let url = self.public_url(path);
        self.dispatch(Method::POST, url, Some(RequestBody::Form(fields)))
            .await
    }

    /// Tracked request.
    pub async fn send(
        &self,
        method: Method,
        path: &ResourcePath,
        body: Option<RequestBody>,
    ) -> Result<Value, TransportError> {
        let url = self.build_url(path);
        self.dispatch(method, url, body).await
    }

    // Single path to the transport, so no request escapes the activity
    // tracker or the invalidation callback.
    async fn dispatch(
        &self,
        method: Method,
        url: String,
        body: Option<RequestBody>,
    ) -> Result<Value, TransportError> {
        let task = self.activity.begin();
        let error = match self.transport.request(method, &url, body).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        self.activity.record_error(error.to_api_error());
        drop(task);

        if error.is_auth_failure() {
            warn!(
                "[ApiClient] {} rejected the session ({:?})",
                redact(&url),
                error.status
            );
            if let Some(callback) = self.invalidation_callback.lock().await.as_ref() {
                callback(error.clone()).await;
            }
        }
        Err(error)
    }
}

/// Appends `name=value` with `?` or `&` as needed. Absent or empty values
/// leave the URL unchanged.
pub(crate) fn add_param(mut url: String, name: &str, value: Option<&str>) -> String {
    let Some(value) = value.filter(|value| !value.is_empty()) else {
        return url;
    };
    url.push(if url.contains('?') { '&' } else { '?' });
    url.push_str(name);
    url.push('=');
    url.push_str(&urlencoding::encode(value));
    url
}
