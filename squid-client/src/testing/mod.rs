//! Test doubles for the client's collaborators
//!
//! [`ScriptedTransport`] answers requests from scripted routes and records
//! every request it receives, which lets tests assert on exact request
//! sequences (e.g. one results request per `COMPUTING_IN_PROGRESS`).
//!
//! ```rust,no_run
//! use squid_client::testing::ScriptedTransport;
//! use squid_client::transport::Method;
//! use serde_json::json;
//!
//! let transport = ScriptedTransport::new();
//! transport.respond(Method::POST, "/analysisjobs/", json!({"id": {"analysisJobId": "j1"}}));
//! transport.respond_always(Method::GET, "/analysisjobs/j1/results", json!({"rows": []}));
//! ```

pub mod stubs;

pub use stubs::{RecordedRequest, ScriptedTransport};
