//! Narrow repository interface over the relational store, plus an in-memory
//! implementation.
//!
//! The dispatch core only needs equality/set-containment filters, a
//! scoped-uniqueness insert, a compare-and-set status transition, and a batch
//! delete. Any storage engine satisfying `Store` is substitutable; the
//! scoped-uniqueness insert on queued deliveries and the queued-to-sending
//! compare-and-set are the only concurrency-control primitives the pipeline
//! relies on.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::DemuxError;
use crate::models::{App, Connection, Delivery, DeliveryStatus, OutcomeRecord, RequestRecord};

/// Result of attempting to insert a queued delivery.
#[derive(Debug)]
pub enum InsertOutcome {
    /// The row was created.
    Inserted(Delivery),
    /// A queued delivery already exists for this (app, fingerprint) pair.
    Conflict,
}

/// Store operations consumed by the dispatch core.
#[async_trait]
pub trait Store: Send + Sync {
    /// Connections matching the account exactly whose signal set contains
    /// the given signal name or the wildcard.
    async fn connections_listening(
        &self,
        account_id: i64,
        account_type: &str,
        signal_name: &str,
    ) -> Result<Vec<Connection>, DemuxError>;

    /// Find a connection by its app's indicator label.
    async fn connection_by_indicator(
        &self,
        indicator: &str,
        account_id: i64,
        account_type: &str,
    ) -> Result<Option<Connection>, DemuxError>;

    /// Apps by id, in no particular order.
    async fn apps_by_ids(&self, ids: &[Uuid]) -> Result<Vec<App>, DemuxError>;

    /// Subset of `app_ids` currently holding a queued delivery for the
    /// fingerprint.
    async fn apps_with_queued_delivery(
        &self,
        app_ids: &[Uuid],
        fingerprint: &str,
    ) -> Result<HashSet<Uuid>, DemuxError>;

    /// Insert a queued delivery, honoring the uniqueness constraint scoped to
    /// status=queued: at most one queued delivery per (app, fingerprint).
    /// Rows in any other status never conflict. A conflict is reported, not
    /// raised.
    async fn insert_queued_delivery(
        &self,
        delivery: Delivery,
    ) -> Result<InsertOutcome, DemuxError>;

    /// Every queued delivery for the given apps restricted to the
    /// fingerprint, including rows left over from prior resolutions.
    async fn queued_deliveries(
        &self,
        app_ids: &[Uuid],
        fingerprint: &str,
    ) -> Result<Vec<Delivery>, DemuxError>;

    /// Transition a delivery from queued to sending, recording the exact
    /// outgoing request. Returns `None` if the row is no longer queued
    /// (another caller claimed it).
    async fn claim_for_sending(
        &self,
        delivery_id: Uuid,
        request: RequestRecord,
    ) -> Result<Option<Delivery>, DemuxError>;

    /// Transition a delivery to a terminal status, recording the response.
    async fn record_outcome(
        &self,
        delivery_id: Uuid,
        outcome: OutcomeRecord,
    ) -> Result<Delivery, DemuxError>;

    /// Delete terminal deliveries updated before the cutoff. Returns the
    /// number of rows removed.
    async fn purge_deliveries_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DemuxError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    apps: Vec<App>,
    connections: Vec<Connection>,
    deliveries: Vec<Delivery>,
}

/// In-memory `Store` for tests and single-process embedding.
///
/// The write lock makes check-and-insert atomic, which is exactly the
/// guarantee a relational store's partial unique index provides.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an app. Indicator labels must be unique when present.
    pub async fn insert_app(&self, app: App) -> Result<(), DemuxError> {
        let mut state = self.state.write().await;
        if let Some(ref indicator) = app.indicator {
            if state
                .apps
                .iter()
                .any(|a| a.indicator.as_deref() == Some(indicator))
            {
                return Err(DemuxError::Validation(format!(
                    "indicator {indicator:?} is already taken"
                )));
            }
        }
        state.apps.push(app);
        Ok(())
    }

    /// Register a connection. The referenced app must exist.
    pub async fn insert_connection(&self, connection: Connection) -> Result<(), DemuxError> {
        let mut state = self.state.write().await;
        if !state.apps.iter().any(|a| a.id == connection.app_id) {
            return Err(DemuxError::Validation(format!(
                "connection references unknown app {}",
                connection.app_id
            )));
        }
        state.connections.push(connection);
        Ok(())
    }

    /// Look up a delivery by id.
    pub async fn delivery(&self, id: Uuid) -> Option<Delivery> {
        let state = self.state.read().await;
        state.deliveries.iter().find(|d| d.id == id).cloned()
    }

    /// Snapshot of every delivery row.
    pub async fn deliveries(&self) -> Vec<Delivery> {
        let state = self.state.read().await;
        state.deliveries.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn connections_listening(
        &self,
        account_id: i64,
        account_type: &str,
        signal_name: &str,
    ) -> Result<Vec<Connection>, DemuxError> {
        let state = self.state.read().await;
        Ok(state
            .connections
            .iter()
            .filter(|c| {
                c.account_id == account_id
                    && c.account_type == account_type
                    && c.listens_for(signal_name)
            })
            .cloned()
            .collect())
    }

    async fn connection_by_indicator(
        &self,
        indicator: &str,
        account_id: i64,
        account_type: &str,
    ) -> Result<Option<Connection>, DemuxError> {
        let state = self.state.read().await;
        let app_id = match state
            .apps
            .iter()
            .find(|a| a.indicator.as_deref() == Some(indicator))
        {
            Some(app) => app.id,
            None => return Ok(None),
        };

        Ok(state
            .connections
            .iter()
            .find(|c| {
                c.app_id == app_id
                    && c.account_id == account_id
                    && c.account_type == account_type
            })
            .cloned())
    }

    async fn apps_by_ids(&self, ids: &[Uuid]) -> Result<Vec<App>, DemuxError> {
        let state = self.state.read().await;
        Ok(state
            .apps
            .iter()
            .filter(|a| ids.contains(&a.id))
            .cloned()
            .collect())
    }

    async fn apps_with_queued_delivery(
        &self,
        app_ids: &[Uuid],
        fingerprint: &str,
    ) -> Result<HashSet<Uuid>, DemuxError> {
        let state = self.state.read().await;
        Ok(state
            .deliveries
            .iter()
            .filter(|d| {
                d.status == DeliveryStatus::Queued
                    && d.fingerprint == fingerprint
                    && app_ids.contains(&d.app_id)
            })
            .map(|d| d.app_id)
            .collect())
    }

    async fn insert_queued_delivery(
        &self,
        delivery: Delivery,
    ) -> Result<InsertOutcome, DemuxError> {
        let mut state = self.state.write().await;
        let conflict = state.deliveries.iter().any(|d| {
            d.status == DeliveryStatus::Queued
                && d.app_id == delivery.app_id
                && d.fingerprint == delivery.fingerprint
        });
        if conflict {
            return Ok(InsertOutcome::Conflict);
        }
        state.deliveries.push(delivery.clone());
        Ok(InsertOutcome::Inserted(delivery))
    }

    async fn queued_deliveries(
        &self,
        app_ids: &[Uuid],
        fingerprint: &str,
    ) -> Result<Vec<Delivery>, DemuxError> {
        let state = self.state.read().await;
        Ok(state
            .deliveries
            .iter()
            .filter(|d| {
                d.status == DeliveryStatus::Queued
                    && d.fingerprint == fingerprint
                    && app_ids.contains(&d.app_id)
            })
            .cloned()
            .collect())
    }

    async fn claim_for_sending(
        &self,
        delivery_id: Uuid,
        request: RequestRecord,
    ) -> Result<Option<Delivery>, DemuxError> {
        let mut state = self.state.write().await;
        let delivery = state
            .deliveries
            .iter_mut()
            .find(|d| d.id == delivery_id)
            .ok_or(DemuxError::DeliveryNotFound(delivery_id))?;

        if delivery.status != DeliveryStatus::Queued {
            return Ok(None);
        }

        delivery.status = DeliveryStatus::Sending;
        delivery.request_url = Some(request.url);
        delivery.request_body = Some(request.body);
        delivery.request_headers = request.headers;
        delivery.updated_at = Utc::now();
        Ok(Some(delivery.clone()))
    }

    async fn record_outcome(
        &self,
        delivery_id: Uuid,
        outcome: OutcomeRecord,
    ) -> Result<Delivery, DemuxError> {
        let mut state = self.state.write().await;
        let delivery = state
            .deliveries
            .iter_mut()
            .find(|d| d.id == delivery_id)
            .ok_or(DemuxError::DeliveryNotFound(delivery_id))?;

        delivery.status = outcome.status;
        delivery.response_code = outcome.response_code;
        delivery.response_headers = outcome.response_headers;
        delivery.response_body = Some(outcome.response_body);
        delivery.updated_at = Utc::now();
        Ok(delivery.clone())
    }

    async fn purge_deliveries_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DemuxError> {
        let mut state = self.state.write().await;
        let before = state.deliveries.len();
        state
            .deliveries
            .retain(|d| !(d.status.is_terminal() && d.updated_at < cutoff));
        Ok((before - state.deliveries.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
