//! `ClusterNotifier`: the cluster-wide reload broadcast boundary.
//!
//! Out of scope to implement against a real RPC transport; named so
//! [`super::CatalogManager`] has something to subscribe to and publish
//! through. Best-effort by design - a missed notification is self-healed by
//! the age-based refresh policy in [`super::CatalogManager::refresh`].

use async_trait::async_trait;
use tokio::sync::broadcast;

/// The fixed shape of a reload notification, matching what the reference
/// cluster RPC surface sends peers on mutation commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadMessage {
    pub method_api: &'static str,
    pub method_name: &'static str,
    pub target: String,
}

impl ReloadMessage {
    #[must_use]
    pub fn load_system_store() -> Self {
        Self {
            method_api: "cluster_api",
            method_name: "load_system_store",
            target: String::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("cluster notifier error: {0}")]
pub struct NotifierError(pub String);

/// Subscribes to and publishes reload notifications across the cluster.
#[async_trait]
pub trait ClusterNotifier: Send + Sync + std::fmt::Debug {
    /// Subscribes to the redirector; returns a receiver the manager listens
    /// on for the lifetime of the process. Subscribing is expected to be
    /// idempotent-safe to call once - [`super::CatalogManager`] only ever
    /// calls it once per process, memoized alongside store initialization.
    async fn subscribe(&self) -> Result<broadcast::Receiver<ReloadMessage>, NotifierError>;

    /// Publishes a reload notification to every peer, including self.
    async fn publish(&self, message: ReloadMessage) -> Result<(), NotifierError>;
}
