//! One queued/attempted/terminal transmission of an occurrence to one app.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{App, Occurrence};

/// Delivery lifecycle status.
///
/// A delivery is created `Queued`, transitions to `Sending` immediately
/// before transport, and terminates in `Success`, `Failure`, or
/// `RequestTimeout`. A row stuck at `Sending` (crash mid-transport) is not
/// retried here; it must be re-surfaced by an external recovery sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Queued,
    Sending,
    Success,
    Failure,
    RequestTimeout,
}

impl DeliveryStatus {
    /// Has the delivery reached a terminal status?
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Success | DeliveryStatus::Failure | DeliveryStatus::RequestTimeout
        )
    }
}

/// One attempt (and its lifecycle) to deliver an occurrence to one app.
///
/// Occurrence fields are denormalized onto the row so the payload can be
/// rebuilt at transmit time. At most one `Queued` delivery may exist per
/// (app, fingerprint) pair; the store's scoped-uniqueness insert enforces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub app_id: Uuid,
    pub account_id: i64,
    pub account_type: String,
    pub action: String,
    pub context: BTreeMap<String, serde_json::Value>,
    pub object_id: i64,
    pub signal_class: String,
    pub status: DeliveryStatus,
    pub fingerprint: String,
    /// Request actually sent, recorded at the queued→sending transition.
    pub request_url: Option<String>,
    pub request_body: Option<String>,
    pub request_headers: BTreeMap<String, String>,
    /// Response actually received, recorded at the terminal transition.
    pub response_code: Option<u16>,
    pub response_headers: BTreeMap<String, String>,
    pub response_body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    /// Create a queued delivery for an occurrence resolved against an app.
    pub fn queued(app: &App, occurrence: &Occurrence, fingerprint: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            app_id: app.id,
            account_id: occurrence.account_id,
            account_type: occurrence.account_type.clone(),
            action: occurrence.action.clone(),
            context: occurrence.context.clone(),
            object_id: occurrence.object_id,
            signal_class: occurrence.signal_class.clone(),
            status: DeliveryStatus::Queued,
            fingerprint: fingerprint.to_string(),
            request_url: None,
            request_body: None,
            request_headers: BTreeMap::new(),
            response_code: None,
            response_headers: BTreeMap::new(),
            response_body: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstruct the occurrence this delivery was created from.
    pub fn occurrence(&self) -> Occurrence {
        Occurrence {
            account_id: self.account_id,
            account_type: self.account_type.clone(),
            action: self.action.clone(),
            context: self.context.clone(),
            object_id: self.object_id,
            signal_class: self.signal_class.clone(),
        }
    }
}

/// The exact outgoing request, recorded at the queued→sending transition.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub url: String,
    pub body: String,
    pub headers: BTreeMap<String, String>,
}

/// Terminal outcome folded into a delivery after a transport attempt.
#[derive(Debug, Clone)]
pub struct OutcomeRecord {
    pub status: DeliveryStatus,
    pub response_code: Option<u16>,
    pub response_headers: BTreeMap<String, String>,
    pub response_body: String,
}
