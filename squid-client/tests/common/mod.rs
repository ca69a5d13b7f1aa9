//! Shared fixtures for squid-client integration tests

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{Value, json};
use squid_client::testing::ScriptedTransport;
use squid_client::transport::Method;
use squid_client::{
    ClientConfig, Collaborators, LocationHref, MemoryTokenStore, SessionManager,
};

pub const API_URL: &str = "https://api.squidsolutions.com/release/v4.2/rs";

/// Session wired to a scripted transport and an in-memory token store
pub struct TestContext {
    pub transport: ScriptedTransport,
    pub store: Arc<MemoryTokenStore>,
    pub session: SessionManager,
}

impl TestContext {
    pub async fn new(href: &str) -> Self {
        Self::with_config(
            href,
            ClientConfig::default()
                .with_customer_id("acme")
                .with_client_id("dashboard"),
        )
        .await
    }

    pub async fn with_config(href: &str, config: ClientConfig) -> Self {
        init_logging();
        let transport = ScriptedTransport::new();
        let store = Arc::new(MemoryTokenStore::new());
        let session = SessionManager::initialize(
            &config,
            Collaborators::new(
                Arc::new(transport.clone()),
                store.clone(),
                Arc::new(LocationHref::new(href)),
            ),
        )
        .await
        .expect("session should initialize");

        Self {
            transport,
            store,
            session,
        }
    }

    /// Scripts a valid `/tokeninfo` + `/user` exchange.
    pub fn script_login(&self, customer_id: &str, client_id: &str) {
        self.transport
            .respond(
                Method::GET,
                "/tokeninfo",
                token_info(customer_id, client_id),
            )
            .respond(Method::GET, "/user", user_record("jdoe"));
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn token_info(customer_id: &str, client_id: &str) -> Value {
    json!({
        "customerId": customer_id,
        "clientId": client_id,
        "expirationDateUTC": 4_102_444_800_000_i64
    })
}

pub fn user_record(login: &str) -> Value {
    json!({
        "login": login,
        "email": format!("{login}@example.com"),
        "groups": []
    })
}

pub fn computing() -> Value {
    json!({"apiError": "COMPUTING_IN_PROGRESS", "message": "computing"})
}
