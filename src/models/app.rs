//! An external app that can be connected to accounts and receive signals.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DemuxConfig;
use crate::crypto;
use crate::error::DemuxError;

/// A subscriber application registered with the dispatch engine.
///
/// The secret is a shared symmetric key used to sign outbound request bodies
/// so the app can verify authenticity. A `None` signal URL means the app is
/// not currently receiving push deliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    pub id: Uuid,
    pub name: String,
    /// Shared signing secret, generated once at onboarding and immutable.
    pub secret: String,
    /// Webhook URL signals are POSTed to. `None` gates delivery off.
    pub signal_url: Option<String>,
    /// Onboarding URL that signed entry tokens are appended to.
    pub entry_url: Option<String>,
    /// Stable external-facing label, unique when present.
    pub indicator: Option<String>,
    /// Account types this app connects to.
    pub account_types: Vec<String>,
    /// Free-form app configuration.
    pub config: serde_json::Value,
}

impl App {
    /// Create an app with the given name and signing secret.
    pub fn new(name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            secret: secret.into(),
            signal_url: None,
            entry_url: None,
            indicator: None,
            account_types: vec!["account".to_string()],
            config: serde_json::Value::Null,
        }
    }

    /// Set the signal delivery URL.
    #[must_use]
    pub fn with_signal_url(mut self, url: impl Into<String>) -> Self {
        self.signal_url = Some(url.into());
        self
    }

    /// Set the onboarding entry URL.
    #[must_use]
    pub fn with_entry_url(mut self, url: impl Into<String>) -> Self {
        self.entry_url = Some(url.into());
        self
    }

    /// Set the external-facing indicator label.
    #[must_use]
    pub fn with_indicator(mut self, indicator: impl Into<String>) -> Self {
        self.indicator = Some(indicator.into());
        self
    }

    /// Set the account types this app connects to.
    #[must_use]
    pub fn with_account_types(mut self, types: Vec<String>) -> Self {
        self.account_types = types;
        self
    }

    /// Does this app connect to a given account type?
    pub fn handles_account_type(&self, account_type: &str) -> bool {
        self.account_types.iter().any(|t| t == account_type)
    }

    /// Return the entry URL with a signed token appended for authorization.
    ///
    /// The token embeds the caller-supplied data and expires after the
    /// configured entry-token TTL.
    pub fn signed_entry_url(
        &self,
        data: &serde_json::Value,
        config: &DemuxConfig,
    ) -> Result<String, DemuxError> {
        let entry_url = self
            .entry_url
            .as_deref()
            .ok_or_else(|| DemuxError::InvalidUrl(format!("app {} has no entry_url", self.id)))?;

        let token = crypto::sign_entry_token(&self.secret, data, config.entry_token_ttl)?;
        Ok(format!("{entry_url}?token={token}"))
    }

    /// Generate a new RSA access key for this app.
    ///
    /// Only the public key and fingerprint should be persisted; the private
    /// key must be handed to the external app.
    pub fn generate_access_key(&self) -> Result<crypto::AccessKey, DemuxError> {
        crypto::generate_access_key()
    }
}
