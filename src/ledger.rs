//! The durable queue of pending and completed deliveries.
//!
//! Enforces the dedup invariant (at most one queued delivery per
//! (app, fingerprint) pair) and drives the delivery state machine:
//! queued → sending → success | failure | request_timeout.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DemuxError;
use crate::models::{App, Delivery, Occurrence, OutcomeRecord, RequestRecord};
use crate::store::{InsertOutcome, Store};
use crate::transport::Receipt;

/// Result of an enqueue attempt. A duplicate is a first-class no-op branch,
/// not an error: redundant trigger calls for the same logical event must not
/// create duplicate outbound deliveries.
#[derive(Debug)]
pub enum Enqueue {
    Created(Delivery),
    AlreadyQueued,
}

/// Queue-state operations over the backing store.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Attempt to create a queued delivery for an occurrence and app.
    ///
    /// If a queued delivery already exists for (app, fingerprint), the call
    /// reports `AlreadyQueued` instead of creating a duplicate.
    pub async fn enqueue(
        &self,
        app: &App,
        occurrence: &Occurrence,
        fingerprint: &str,
    ) -> Result<Enqueue, DemuxError> {
        let delivery = Delivery::queued(app, occurrence, fingerprint);
        match self.store.insert_queued_delivery(delivery).await? {
            InsertOutcome::Inserted(created) => {
                tracing::debug!(
                    target: "demux",
                    delivery_id = %created.id,
                    app_id = %app.id,
                    fingerprint = %fingerprint,
                    "delivery queued"
                );
                Ok(Enqueue::Created(created))
            }
            InsertOutcome::Conflict => {
                tracing::debug!(
                    target: "demux",
                    app_id = %app.id,
                    fingerprint = %fingerprint,
                    "delivery already queued, skipping"
                );
                Ok(Enqueue::AlreadyQueued)
            }
        }
    }

    /// Every currently queued delivery for the given apps and fingerprint.
    ///
    /// Includes rows created by earlier resolutions that never completed
    /// transport; re-resolving the same occurrence is how a stuck queued
    /// delivery gets retried.
    pub async fn queued_deliveries(
        &self,
        apps: &[App],
        fingerprint: &str,
    ) -> Result<Vec<Delivery>, DemuxError> {
        let app_ids: Vec<Uuid> = apps.iter().map(|a| a.id).collect();
        self.store.queued_deliveries(&app_ids, fingerprint).await
    }

    /// Transition a delivery to sending, recording the exact outgoing
    /// request for audit. Returns `None` if another caller claimed the row
    /// first; at most one caller transmits a given queued row.
    pub async fn claim_for_sending(
        &self,
        delivery: &Delivery,
        request: RequestRecord,
    ) -> Result<Option<Delivery>, DemuxError> {
        self.store.claim_for_sending(delivery.id, request).await
    }

    /// Fold a transport receipt into the delivery as its terminal state.
    pub async fn record_outcome(
        &self,
        delivery_id: Uuid,
        receipt: &Receipt,
    ) -> Result<Delivery, DemuxError> {
        let outcome = OutcomeRecord {
            status: receipt.status(),
            response_code: receipt.http_code(),
            response_headers: receipt.response_headers().clone(),
            response_body: receipt.response_body().to_string(),
        };
        self.store.record_outcome(delivery_id, outcome).await
    }

    /// Delete terminal deliveries updated before the cutoff.
    ///
    /// Retention only; no correctness coupling to the rest of the pipeline.
    pub async fn purge(&self, older_than: DateTime<Utc>) -> Result<u64, DemuxError> {
        let removed = self.store.purge_deliveries_before(older_than).await?;
        if removed > 0 {
            tracing::info!(target: "demux", removed, "purged old deliveries");
        }
        Ok(removed)
    }
}
