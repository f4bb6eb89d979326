//! Test-only fixtures: an in-memory [`DocumentStore`], a no-op
//! [`ClusterNotifier`], and a ready-to-use [`CatalogManager`] builder.
//!
//! Gated the same way the reference crate gates its own fixture module -
//! compiled for `#[cfg(test)]` unconditionally, and additionally available
//! to downstream crates under the `test-utils` feature.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::{
    document::Document,
    manager::{ClusterNotifier, NotifierError, ReloadMessage},
    store::memory::InMemoryDocumentStore,
    store::DocumentStore,
};

pub use crate::store::memory::InMemoryDocumentStore as TestDocumentStore;

/// A [`ClusterNotifier`] that accepts subscriptions and publishes, and does
/// nothing with either - suitable for tests that don't exercise
/// cross-process invalidation.
#[derive(Debug, Default)]
pub struct NoopClusterNotifier;

#[async_trait]
impl ClusterNotifier for NoopClusterNotifier {
    async fn subscribe(&self) -> Result<broadcast::Receiver<ReloadMessage>, NotifierError> {
        let (_tx, rx) = broadcast::channel(1);
        Ok(rx)
    }

    async fn publish(&self, _message: ReloadMessage) -> Result<(), NotifierError> {
        Ok(())
    }
}

#[must_use]
pub fn noop_notifier() -> Arc<dyn ClusterNotifier> {
    Arc::new(NoopClusterNotifier)
}

/// Builds a fresh in-memory store seeded with `(collection, documents)`
/// pairs and a [`crate::manager::CatalogManager`] wired up to it and a
/// [`NoopClusterNotifier`] - the common starting point for manager and
/// snapshot integration tests.
#[must_use]
pub fn seeded_manager(seed: &[(&'static str, Vec<Value>)]) -> Arc<crate::manager::CatalogManager> {
    let store = Arc::new(InMemoryDocumentStore::new());
    for (collection, documents) in seed {
        let docs: Vec<Document> = documents.iter().map(|v| v.as_object().unwrap().clone()).collect();
        store.seed(collection, docs);
    }
    crate::manager::CatalogManager::new(store as Arc<dyn DocumentStore>, noop_notifier())
}
