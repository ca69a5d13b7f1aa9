use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::errors::TransportError;
use crate::transport::{HttpTransport, Method, RequestBody};

/// A request as received by the stub.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<RequestBody>,
}

impl RecordedRequest {
    /// URL without its query string.
    pub fn path(&self) -> &str {
        self.url.split('?').next().unwrap_or(&self.url)
    }

    /// Value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        let (_, query) = self.url.split_once('?')?;
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == name).then_some(value)
        })
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Respond(Result<Value, TransportError>),
    /// Never resolves; the request stays in flight until dropped.
    Hang,
}

#[derive(Debug)]
struct Route {
    method: Method,
    /// Matched against the end of the URL path.
    path_suffix: String,
    replies: VecDeque<Reply>,
    /// Kept after the queue drains and used for every later match.
    sticky: Option<Reply>,
}

impl Route {
    fn matches(&self, method: &Method, path: &str) -> bool {
        self.method == *method
            && path.ends_with(&self.path_suffix)
            && (!self.replies.is_empty() || self.sticky.is_some())
    }

    fn next(&mut self) -> Option<Reply> {
        self.replies.pop_front().or_else(|| self.sticky.clone())
    }
}

#[derive(Debug, Default)]
struct InnerState {
    routes: Vec<Route>,
    requests: Vec<RecordedRequest>,
}

/// Scripted [`HttpTransport`].
///
/// Replies are queued per method and path suffix and consumed in order.
/// Requests matching no route fail with a 404 naming the request.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<InnerState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, method: Method, path_suffix: &str, body: Value) -> &Self {
        self.push(method, path_suffix, Reply::Respond(Ok(body)))
    }

    pub fn fail(&self, method: Method, path_suffix: &str, error: TransportError) -> &Self {
        self.push(method, path_suffix, Reply::Respond(Err(error)))
    }

    pub fn hang(&self, method: Method, path_suffix: &str) -> &Self {
        self.push(method, path_suffix, Reply::Hang)
    }

    /// Answers every remaining match with `body` once queued replies run out.
    pub fn respond_always(&self, method: Method, path_suffix: &str, body: Value) -> &Self {
        let mut inner = self.inner.lock();
        match inner
            .routes
            .iter_mut()
            .find(|route| route.method == method && route.path_suffix == path_suffix)
        {
            Some(route) => route.sticky = Some(Reply::Respond(Ok(body))),
            None => inner.routes.push(Route {
                method,
                path_suffix: path_suffix.to_string(),
                replies: VecDeque::new(),
                sticky: Some(Reply::Respond(Ok(body))),
            }),
        }
        drop(inner);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.lock().requests.clone()
    }

    /// Recorded requests whose path ends with `path_suffix`.
    pub fn requests_to(&self, path_suffix: &str) -> Vec<RecordedRequest> {
        self.inner
            .lock()
            .requests
            .iter()
            .filter(|request| request.path().ends_with(path_suffix))
            .cloned()
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.inner.lock().requests.len()
    }

    fn push(&self, method: Method, path_suffix: &str, reply: Reply) -> &Self {
        let mut inner = self.inner.lock();
        match inner
            .routes
            .iter_mut()
            .find(|route| route.method == method && route.path_suffix == path_suffix)
        {
            Some(route) => route.replies.push_back(reply),
            None => inner.routes.push(Route {
                method,
                path_suffix: path_suffix.to_string(),
                replies: VecDeque::from([reply]),
                sticky: None,
            }),
        }
        drop(inner);
        self
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<RequestBody>,
    ) -> Result<Value, TransportError> {
        let recorded = RecordedRequest {
            method: method.clone(),
            url: url.to_string(),
            body,
        };
        let reply = {
            let mut inner = self.inner.lock();
            let path = recorded.path().to_string();
            inner.requests.push(recorded);
            inner
                .routes
                .iter_mut()
                .find(|route| route.matches(&method, &path))
                .and_then(Route::next)
        };

        match reply {
            Some(Reply::Respond(result)) => result,
            Some(Reply::Hang) => futures::future::pending().await,
            None => Err(TransportError::http(
                404,
                format!("No scripted response for {method} {url}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn replies_are_consumed_in_order_then_sticky() {
        let transport = ScriptedTransport::new();
        transport
            .respond(Method::GET, "/results", json!({"n": 1}))
            .respond_always(Method::GET, "/results", json!({"n": 0}));

        let first = transport.request(Method::GET, "https://h/results?x=1", None).await;
        let second = transport.request(Method::GET, "https://h/results", None).await;
        let third = transport.request(Method::GET, "https://h/results", None).await;

        assert_eq!(first.unwrap()["n"], 1);
        assert_eq!(second.unwrap()["n"], 0);
        assert_eq!(third.unwrap()["n"], 0);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn unscripted_request_is_not_found() {
        let transport = ScriptedTransport::new();
        let err = transport
            .request(Method::POST, "https://h/token", None)
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(404));
        assert_eq!(transport.requests_to("/token").len(), 1);
    }

    #[test]
    fn recorded_request_reads_query() {
        let request = RecordedRequest {
            method: Method::GET,
            url: "https://h/user?timeout=10&access_token=t1".into(),
            body: None,
        };
        assert_eq!(request.path(), "https://h/user");
        assert_eq!(request.query_param("access_token"), Some("t1"));
        assert_eq!(request.query_param("missing"), None);
    }
}
