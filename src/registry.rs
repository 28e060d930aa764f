//! Subscriber resolution: which apps are listening for a signal?

use std::sync::Arc;

use uuid::Uuid;

use crate::error::DemuxError;
use crate::models::App;
use crate::store::Store;

/// Resolves subscriber apps for a given signal, account, and account type.
#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn Store>,
}

impl Registry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Apps listening for the given signal name and account.
    ///
    /// Connections match on exact account id and account type, and on a
    /// signal set containing the signal name or the `*` wildcard. Apps
    /// without a signal URL have nothing to deliver to and are discarded.
    /// An app with multiple matching connections appears once. The result is
    /// sorted by app id for deterministic output.
    pub async fn listening_for(
        &self,
        signal_name: &str,
        account_id: i64,
        account_type: &str,
    ) -> Result<Vec<App>, DemuxError> {
        let connections = self
            .store
            .connections_listening(account_id, account_type, signal_name)
            .await?;

        let mut app_ids: Vec<Uuid> = connections.iter().map(|c| c.app_id).collect();
        app_ids.sort_unstable();
        app_ids.dedup();

        let mut apps = self.store.apps_by_ids(&app_ids).await?;
        apps.retain(|a| a.signal_url.is_some());
        apps.sort_by_key(|a| a.id);
        apps.dedup_by_key(|a| a.id);

        Ok(apps)
    }

    /// Subset of `apps` with no queued delivery for the fingerprint.
    ///
    /// An optimization to avoid failed-insert churn; the store's scoped
    /// uniqueness constraint remains the correctness backstop.
    pub async fn without_queued_delivery_for(
        &self,
        apps: &[App],
        fingerprint: &str,
    ) -> Result<Vec<App>, DemuxError> {
        let app_ids: Vec<Uuid> = apps.iter().map(|a| a.id).collect();
        let already_queued = self
            .store
            .apps_with_queued_delivery(&app_ids, fingerprint)
            .await?;

        Ok(apps
            .iter()
            .filter(|a| !already_queued.contains(&a.id))
            .cloned()
            .collect())
    }
}
