//! The heart of pairing occurrences to apps.
//!
//! Given an occurrence, the demuxer resolves subscribers, enqueues deliveries
//! (skipping already-queued duplicates), and immediately attempts
//! transmission of everything currently queued for that fingerprint.
//!
//! The two-phase structure (enqueue, then fetch, then send) makes concurrent
//! triggers of the same logical event collapse into a single queued row per
//! app, while guaranteeing every queued row eventually gets a transmission
//! attempt from whichever caller observes it; no queued row is owned by the
//! caller that created it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::DemuxConfig;
use crate::error::DemuxError;
use crate::ledger::Ledger;
use crate::models::{App, Delivery, DeliveryStatus, Occurrence};
use crate::registry::Registry;
use crate::signal::{Signal, SignalRegistry};
use crate::store::Store;
use crate::transport::{Receipt, SignalRequest, Transport};

/// Orchestrates subscriber resolution, delivery queueing, and transmission.
#[derive(Clone)]
pub struct Demuxer {
    registry: Registry,
    ledger: Ledger,
    transport: Arc<Transport>,
    signals: Arc<SignalRegistry>,
    config: DemuxConfig,
}

impl Demuxer {
    /// Create a demuxer over a store and a signal registry.
    pub fn new(
        store: Arc<dyn Store>,
        signals: Arc<SignalRegistry>,
        config: DemuxConfig,
    ) -> Result<Self, DemuxError> {
        let transport = Arc::new(Transport::new(&config)?);
        Ok(Self {
            registry: Registry::new(store.clone()),
            ledger: Ledger::new(store),
            transport,
            signals,
            config,
        })
    }

    /// Trigger an action on a signal: the caller-facing entry point.
    ///
    /// Assembles the occurrence from the signal's bound object and account
    /// plus the merged context, then resolves it.
    pub async fn trigger(
        &self,
        signal: &dyn Signal,
        action: &str,
        context: BTreeMap<String, serde_json::Value>,
    ) -> Result<Vec<Delivery>, DemuxError> {
        self.resolve(signal.trigger(action, context)).await
    }

    /// Resolve an occurrence into deliveries and transmit everything queued
    /// for its fingerprint.
    ///
    /// Returns the deliveries this call transmitted. Delivery failures are
    /// data (the terminal status on each row), never an `Err`; only a
    /// structurally invalid occurrence or an unknown signal class errors.
    pub async fn resolve(&self, occurrence: Occurrence) -> Result<Vec<Delivery>, DemuxError> {
        occurrence.validate()?;
        let signal = self.signals.build(&occurrence)?;
        let signal_name = signal.signal_name().to_string();
        let fingerprint = occurrence.fingerprint()?;

        let candidates = self
            .registry
            .listening_for(&signal_name, occurrence.account_id, &occurrence.account_type)
            .await?;

        if candidates.is_empty() {
            tracing::debug!(
                target: "demux",
                signal = %signal_name,
                account_id = occurrence.account_id,
                account_type = %occurrence.account_type,
                "no apps listening"
            );
            return Ok(Vec::new());
        }

        // Enqueue only for apps not already holding a queued row; the store
        // constraint absorbs any race that slips through.
        let targets = self
            .registry
            .without_queued_delivery_for(&candidates, &fingerprint)
            .await?;
        for app in &targets {
            self.ledger.enqueue(app, &occurrence, &fingerprint).await?;
        }

        // Re-fetch against the full candidate set to also pick up stale
        // queued rows left by earlier resolutions that never transmitted.
        let pending = self
            .ledger
            .queued_deliveries(&candidates, &fingerprint)
            .await?;

        tracing::info!(
            target: "demux",
            signal = %signal_name,
            fingerprint = %fingerprint,
            candidates = candidates.len(),
            pending = pending.len(),
            "resolving occurrence"
        );

        let apps_by_id: HashMap<Uuid, App> =
            candidates.into_iter().map(|a| (a.id, a)).collect();

        // One task per delivery: a slow app must not block the others.
        let mut tasks = JoinSet::new();
        for delivery in pending {
            let Some(app) = apps_by_id.get(&delivery.app_id).cloned() else {
                continue;
            };
            let ledger = self.ledger.clone();
            let transport = self.transport.clone();
            let signals = self.signals.clone();
            let config = self.config.clone();
            tasks.spawn(async move {
                transmit(&ledger, &transport, &signals, &config, app, delivery).await
            });
        }

        let mut completed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(delivery)) => completed.push(delivery),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(target: "demux", error = %e, "delivery task failed");
                }
            }
        }

        Ok(completed)
    }
}

/// Claim one queued delivery, transmit it, and record the outcome.
///
/// Returns `None` when the row was claimed by a concurrent caller or a
/// collaborator failed in a way that leaves the row for a later resolution.
async fn transmit(
    ledger: &Ledger,
    transport: &Transport,
    signals: &SignalRegistry,
    config: &DemuxConfig,
    app: App,
    delivery: Delivery,
) -> Option<Delivery> {
    let occurrence = delivery.occurrence();
    let signal = match signals.build(&occurrence) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(
                target: "demux",
                delivery_id = %delivery.id,
                error = %e,
                "cannot rebuild signal for queued delivery"
            );
            return None;
        }
    };

    let request = signal
        .payload_for(&delivery.action)
        .and_then(|payload| {
            SignalRequest::build(&app, signal.signal_name(), &delivery.action, payload, config)
        });

    let (claimed, receipt) = match request {
        Ok(request) => {
            let claimed = match ledger.claim_for_sending(&delivery, request_record(&request)).await
            {
                Ok(Some(claimed)) => claimed,
                // Another caller claimed this row; it will transmit.
                Ok(None) => return None,
                Err(e) => {
                    tracing::error!(
                        target: "demux",
                        delivery_id = %delivery.id,
                        error = %e,
                        "failed to claim delivery for sending"
                    );
                    return None;
                }
            };
            let receipt = transport.deliver(&request).await;
            (claimed, receipt)
        }
        Err(e) => {
            // Pre-flight failure: no request was ever built. Terminate the
            // delivery with an empty receipt instead of leaving it queued.
            tracing::warn!(
                target: "demux",
                delivery_id = %delivery.id,
                app_id = %app.id,
                error = %e,
                "pre-flight failure building signal request"
            );
            let record = crate::models::RequestRecord {
                url: app.signal_url.clone().unwrap_or_default(),
                body: String::new(),
                headers: BTreeMap::new(),
            };
            let claimed = match ledger.claim_for_sending(&delivery, record).await {
                Ok(Some(claimed)) => claimed,
                Ok(None) => return None,
                Err(e) => {
                    tracing::error!(
                        target: "demux",
                        delivery_id = %delivery.id,
                        error = %e,
                        "failed to claim delivery for sending"
                    );
                    return None;
                }
            };
            (claimed, Receipt::Empty)
        }
    };

    match ledger.record_outcome(claimed.id, &receipt).await {
        Ok(done) => {
            log_outcome(&done);
            Some(done)
        }
        Err(e) => {
            tracing::error!(
                target: "demux",
                delivery_id = %claimed.id,
                error = %e,
                "failed to record delivery outcome"
            );
            None
        }
    }
}

fn request_record(request: &SignalRequest) -> crate::models::RequestRecord {
    crate::models::RequestRecord {
        url: request.url.clone(),
        body: request.body.clone(),
        headers: request.headers.clone(),
    }
}

fn log_outcome(delivery: &Delivery) {
    match delivery.status {
        DeliveryStatus::Success => {
            tracing::info!(
                target: "demux",
                delivery_id = %delivery.id,
                app_id = %delivery.app_id,
                response_code = delivery.response_code,
                "delivery succeeded"
            );
        }
        _ => {
            tracing::warn!(
                target: "demux",
                delivery_id = %delivery.id,
                app_id = %delivery.app_id,
                status = ?delivery.status,
                response_code = delivery.response_code,
                "delivery did not succeed"
            );
        }
    }
}
