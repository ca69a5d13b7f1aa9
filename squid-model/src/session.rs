use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{ClientId, CustomerId};

/// Metadata the server holds about an access token (`/tokeninfo`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    #[serde(default)]
    pub client_id: Option<ClientId>,
    #[serde(
        default,
        alias = "expirationDateUTC",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenInfo {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }
}

/// The authenticated user's record (`/user`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LoginRecord {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub groups: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response of the authorization code exchange; `oid` is the access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub oid: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn token_info_reads_millisecond_expiry() {
        let info: TokenInfo = serde_json::from_str(
            r#"{"customerId":"c1","clientId":"app","expirationDateUTC":1400000000000,"oid":"t"}"#,
        )
        .unwrap();
        assert_eq!(info.customer_id, Some(CustomerId::new("c1")));
        assert_eq!(info.expiry, Utc.timestamp_millis_opt(1_400_000_000_000).single());
        assert!(info.is_expired_at(Utc::now()));
        assert_eq!(info.extra["oid"], "t");
    }

    #[test]
    fn token_info_without_expiry_never_expires() {
        let info: TokenInfo = serde_json::from_str(r#"{"customerId":"c1"}"#).unwrap();
        assert!(info.expiry.is_none());
        assert!(!info.is_expired_at(Utc::now()));
    }
}
