//! Connection between an account and an app.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DemuxConfig;
use crate::error::DemuxError;
use crate::models::App;

/// The literal signal name that subscribes a connection to every signal.
pub const WILDCARD_SIGNAL: &str = "*";

/// Binds one account to one app for a set of signal names.
///
/// Account type is matched exactly; only the signal-name dimension supports
/// the `*` wildcard. Read-only to the dispatch core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub app_id: Uuid,
    pub account_id: i64,
    /// Discriminator for accounts sharing an identifier space
    /// (e.g. "user" vs "account").
    pub account_type: String,
    /// Subscribed signal names; `*` means all.
    pub signals: Vec<String>,
}

impl Connection {
    /// Create a connection subscribing an account to the given signals.
    pub fn new(
        app_id: Uuid,
        account_id: i64,
        account_type: impl Into<String>,
        signals: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            app_id,
            account_id,
            account_type: account_type.into(),
            signals,
        }
    }

    /// Is this connection listening for the given signal name?
    pub fn listens_for(&self, signal_name: &str) -> bool {
        self.signals
            .iter()
            .any(|s| s == signal_name || s == WILDCARD_SIGNAL)
    }

    /// Return an entry URL for this specific connection.
    ///
    /// The token includes `account_id` and `account_type` claims in addition
    /// to whatever the caller passes in `data`.
    pub fn entry_url(
        &self,
        app: &App,
        data: serde_json::Value,
        config: &DemuxConfig,
    ) -> Result<String, DemuxError> {
        let mut claims = match data {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            _ => {
                return Err(DemuxError::Validation(
                    "entry URL data must be a JSON object".to_string(),
                ))
            }
        };
        claims.insert("account_id".to_string(), serde_json::json!(self.account_id));
        claims.insert(
            "account_type".to_string(),
            serde_json::json!(self.account_type),
        );

        app.signed_entry_url(&serde_json::Value::Object(claims), config)
    }
}
