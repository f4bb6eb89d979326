//! Catalog Manager: loads and periodically refreshes the published
//! [`CatalogSnapshot`], and applies batched writes transactionally.
//!
//! Process-wide state with lifecycle `{lazy-init on first access, reloaded
//! on reconnect, never explicitly torn down}` (see design notes) - callers
//! are expected to hold it behind an injectable `Arc<CatalogManager>` rather
//! than reach for a real global, so tests can construct isolated managers.

mod changes;
mod notifier;

use std::sync::Mutex as StdMutex;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use self::changes::Changes;
pub use self::notifier::{ClusterNotifier, NotifierError, ReloadMessage};
use crate::{
    config::AppConfig,
    document::Document,
    error::{ConflictError, LoadError, StoreWriteError, ValidationError},
    ids::ObjectId,
    model::COLLECTIONS,
    schema::SchemaRegistry,
    snapshot::CatalogSnapshot,
    store::{self, BulkOp, DocumentStore, IndexDeclaration},
};

/// Mirrors the state machine in `SPEC_FULL.md` section 4.3. The snapshot
/// itself is *not* carried in this enum (it lives in
/// [`CatalogManager::snapshot`], an `ArcSwapOption` so publication is a
/// single atomic store); this tracks only what drives the refresh
/// decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Cold,
    Loading,
    Warm,
    Refreshing,
}

/// Unique-index declarations created at store init, derived from data-model
/// invariant 1 (`(system, name, deleted)` / `(name, deleted)` /
/// `(email, deleted)` per collection).
const DECLARED_INDEXES: &[IndexDeclaration] = &[
    IndexDeclaration { collection: "systems", fields: &["name", "deleted"], unique: true },
    IndexDeclaration { collection: "accounts", fields: &["email", "deleted"], unique: true },
    IndexDeclaration {
        collection: "roles",
        fields: &["account", "system", "role_name", "deleted"],
        unique: true,
    },
    IndexDeclaration { collection: "buckets", fields: &["system", "name", "deleted"], unique: true },
    IndexDeclaration {
        collection: "tiering_policies",
        fields: &["system", "name", "deleted"],
        unique: true,
    },
    IndexDeclaration { collection: "tiers", fields: &["system", "name", "deleted"], unique: true },
    IndexDeclaration { collection: "pools", fields: &["system", "name", "deleted"], unique: true },
];

type SharedLoad = Shared<BoxFuture<'static, Result<(), String>>>;

pub struct CatalogManager {
    store: std::sync::Arc<dyn DocumentStore>,
    notifier: std::sync::Arc<dyn ClusterNotifier>,
    schema: SchemaRegistry,
    config: AppConfig,

    snapshot: ArcSwapOption<CatalogSnapshot>,
    loaded_at: StdMutex<Option<DateTime<Utc>>>,
    phase: StdMutex<Phase>,

    in_flight: AsyncMutex<Option<SharedLoad>>,
    initialized: AsyncMutex<bool>,
    subscribed: tokio::sync::OnceCell<()>,

    pending: AsyncMutex<Option<Changes>>,
    timer_armed: AsyncMutex<bool>,
    cancellation: CancellationToken,

    /// Lets `&self` methods obtain an owned `Arc<Self>` to move into
    /// spawned tasks, without requiring callers to pass `Arc<Self>` as the
    /// method receiver (not supported on stable Rust for anything but the
    /// smart pointer itself).
    weak_self: std::sync::Weak<Self>,
}

impl std::fmt::Debug for CatalogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogManager")
            .field("phase", &*self.phase.lock().expect("phase mutex poisoned"))
            .finish_non_exhaustive()
    }
}

impl CatalogManager {
    #[must_use]
    pub fn new(
        store: std::sync::Arc<dyn DocumentStore>,
        notifier: std::sync::Arc<dyn ClusterNotifier>,
    ) -> std::sync::Arc<Self> {
        std::sync::Arc::new_cyclic(|weak_self| Self {
            store,
            notifier,
            schema: SchemaRegistry::new(),
            config: crate::CONFIG.clone(),
            snapshot: ArcSwapOption::empty(),
            loaded_at: StdMutex::new(None),
            phase: StdMutex::new(Phase::Cold),
            in_flight: AsyncMutex::new(None),
            initialized: AsyncMutex::new(false),
            subscribed: tokio::sync::OnceCell::new(),
            pending: AsyncMutex::new(None),
            timer_armed: AsyncMutex::new(false),
            cancellation: CancellationToken::new(),
            weak_self: weak_self.clone(),
        })
    }

    /// An owned handle to this manager, for moving into spawned tasks.
    ///
    /// # Panics
    /// Panics if called after every other `Arc<CatalogManager>` has been
    /// dropped - cannot happen from within a method call on `&self`, since
    /// that borrow implies at least one live `Arc`.
    fn arc(&self) -> std::sync::Arc<Self> {
        self.weak_self.upgrade().expect("CatalogManager outlives its own methods")
    }

    /// The currently published snapshot, if one has ever loaded
    /// successfully. Does not trigger a refresh - use [`Self::refresh`] for
    /// a read that's allowed to reload.
    #[must_use]
    pub fn current_snapshot(&self) -> Option<std::sync::Arc<CatalogSnapshot>> {
        self.snapshot.load_full()
    }

    /// Cooperative shutdown signal for the background coalescing task.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Returns a snapshot fresh enough to serve, reloading according to the
    /// age-based policy in `SPEC_FULL.md` section 4.3.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> Result<std::sync::Arc<CatalogSnapshot>, LoadError> {
        let phase = *self.phase.lock().expect("phase mutex poisoned");

        match phase {
            Phase::Warm => {
                let loaded_at = self
                    .loaded_at
                    .lock()
                    .expect("loaded_at mutex poisoned")
                    .expect("Warm implies loaded_at is set");
                let age_secs = (Utc::now() - loaded_at).num_seconds().max(0) as u64;

                if age_secs < self.config.refresh.start_refresh_threshold_secs {
                    debug!(age_secs, "snapshot fresh enough, skipping reload");
                    return Ok(self.published_snapshot());
                }
                if age_secs < self.config.refresh.force_refresh_threshold_secs {
                    debug!(age_secs, "snapshot stale, triggering background reload");
                    *self.phase.lock().expect("phase mutex poisoned") = Phase::Refreshing;
                    let this = self.arc();
                    tokio::spawn(async move {
                        if let Err(e) = this.load().await {
                            warn!(error = %e, "background reload failed, previous snapshot remains published");
                        }
                    });
                    return Ok(self.published_snapshot());
                }
                debug!(age_secs, "snapshot forced stale, awaiting fresh load");
            }
            Phase::Refreshing => return Ok(self.published_snapshot()),
            Phase::Cold | Phase::Loading => {}
        }

        self.load().await
    }

    fn published_snapshot(&self) -> std::sync::Arc<CatalogSnapshot> {
        self.snapshot
            .load_full()
            .expect("Warm/Refreshing phase implies a published snapshot")
    }

    /// Performs (or joins an in-flight) load, publishing a fresh snapshot on
    /// success. At most one load runs at a time per manager; concurrent
    /// callers share the same [`Shared`] future.
    async fn load(&self) -> Result<std::sync::Arc<CatalogSnapshot>, LoadError> {
        self.ensure_initialized().await?;
        self.ensure_subscribed().await;

        let shared = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(shared) = in_flight.as_ref() {
                shared.clone()
            } else {
                *self.phase.lock().expect("phase mutex poisoned") = Phase::Loading;
                let this = self.arc();
                let fut: BoxFuture<'static, Result<(), String>> =
                    Box::pin(async move { this.load_once().await.map_err(|e| e.to_string()) });
                let shared = fut.shared();
                *in_flight = Some(shared.clone());
                shared
            }
        };

        let result = shared.await;
        *self.in_flight.lock().await = None;

        match result {
            Ok(()) => Ok(self.published_snapshot()),
            Err(message) => {
                error!(error = %message, "catalog load failed; previous snapshot (if any) remains published");
                Err(LoadError {
                    source: Box::<dyn std::error::Error + Send + Sync>::from(message),
                    stack: Vec::new(),
                })
            }
        }
    }

    async fn load_once(&self) -> Result<(), LoadError> {
        let mut loaded = std::collections::HashMap::new();

        for &collection in COLLECTIONS {
            let documents = self.store.find_live(collection).await.map_err(|e| LoadError {
                source: Box::<dyn std::error::Error + Send + Sync>::from(e.0),
                stack: vec![format!("loading collection `{collection}`")],
            })?;

            for doc in &documents {
                if let Err(e) = self.schema.validate(collection, doc) {
                    warn!(collection, error = %e, "validation failed for a loaded document; keeping it (forward-compat)");
                }
            }

            loaded.insert(collection, documents);
        }

        let snapshot = CatalogSnapshot::build(loaded)?;
        let entity_count = snapshot.len();

        self.snapshot.store(Some(std::sync::Arc::new(snapshot)));
        *self.loaded_at.lock().expect("loaded_at mutex poisoned") = Some(Utc::now());
        *self.phase.lock().expect("phase mutex poisoned") = Phase::Warm;

        metrics::gauge!("storectl_catalog_entities").set(entity_count as f64);
        metrics::counter!("storectl_catalog_loads_total").increment(1);
        info!(entity_count, "catalog snapshot published");

        Ok(())
    }

    async fn ensure_initialized(&self) -> Result<(), LoadError> {
        let mut initialized = self.initialized.lock().await;
        if *initialized {
            return Ok(());
        }
        for &collection in COLLECTIONS {
            self.store.create_collection(collection).await.map_err(|e| LoadError {
                source: Box::<dyn std::error::Error + Send + Sync>::from(e.0),
                stack: vec![format!("creating collection `{collection}`")],
            })?;
        }
        for declaration in DECLARED_INDEXES {
            self.store.create_index(*declaration).await.map_err(|e| LoadError {
                source: Box::<dyn std::error::Error + Send + Sync>::from(e.0),
                stack: vec![format!("creating index on `{}`", declaration.collection)],
            })?;
        }
        *initialized = true;
        Ok(())
    }

    async fn ensure_subscribed(&self) {
        let _ = self
            .subscribed
            .get_or_init(|| async {
                match self.notifier.subscribe().await {
                    Ok(mut receiver) => {
                        let this = self.arc();
                        tokio::spawn(async move {
                            loop {
                                match receiver.recv().await {
                                    Ok(_message) => {
                                        if let Err(e) = this.load().await {
                                            warn!(error = %e, "reload triggered by cluster notification failed");
                                        }
                                    }
                                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                                }
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "failed to subscribe for cluster invalidations"),
                }
            })
            .await;
    }

    /// Called when the document store reconnects: clears the initialization
    /// memo so `create_collection`/`create_index` re-run on the next load,
    /// then reloads.
    pub async fn on_store_reconnect(&self) -> Result<(), LoadError> {
        *self.initialized.lock().await = false;
        self.load().await.map(|_| ())
    }

    /// Applies a batch of inserts/updates/removes transactionally: validate,
    /// check uniqueness, bulk-write, broadcast.
    #[tracing::instrument(skip(self, changes))]
    pub async fn make_changes(&self, changes: Changes) -> Result<(), ManagerError> {
        let snapshot = self.refresh().await?;
        let now = Utc::now();

        for (collection, docs) in &changes.insert {
            for doc in docs {
                self.schema.validate(collection, doc)?;
                snapshot.check_indexes(collection, doc)?;
            }
        }

        for (collection, updates) in &changes.update {
            for (id, payload) in updates {
                let candidate = merged_candidate(&snapshot, *id, payload);
                snapshot.check_indexes(collection, &candidate)?;
            }
        }

        let mut store_errors = Vec::new();

        for collection in changes.touched_collections() {
            let mut ops = Vec::new();
            if let Some(docs) = changes.insert.get(collection) {
                ops.extend(docs.iter().cloned().map(BulkOp::Insert));
            }
            if let Some(updates) = changes.update.get(collection) {
                ops.extend(updates.iter().map(|(id, payload)| BulkOp::Update {
                    id: *id,
                    update: store::as_operator_update(payload.clone()),
                }));
            }
            if let Some(ids) = changes.remove.get(collection) {
                ops.extend(ids.iter().map(|id| BulkOp::Update {
                    id: *id,
                    update: store::soft_delete_update(now),
                }));
            }
            if ops.is_empty() {
                continue;
            }

            match self.store.bulk_write(collection, ops).await {
                Ok(results) => {
                    for result in results {
                        if let Err(e) = result {
                            store_errors.push(format!("{collection}: {e}"));
                        }
                    }
                }
                Err(e) => store_errors.push(format!("{collection}: {e}")),
            }
        }

        if let Err(e) = self.notifier.publish(ReloadMessage::load_system_store()).await {
            warn!(error = %e, "failed to broadcast reload notification; self-heals via age-based refresh");
        }
        if let Err(e) = self.load().await {
            warn!(error = %e, "local reload after make_changes failed");
        }

        if store_errors.is_empty() {
            Ok(())
        } else {
            Err(ManagerError::StoreWrite(StoreWriteError {
                collection: "multiple".to_string(),
                source: Box::<dyn std::error::Error + Send + Sync>::from(store_errors.join("; ")),
                stack: Vec::new(),
            }))
        }
    }

    /// Merges `changes` into the pending batch and arms the coalescing
    /// timer if one isn't already running. Returns immediately; the actual
    /// `make_changes` call happens on the timer, asynchronously.
    pub async fn make_changes_in_background(&self, changes: Changes) {
        {
            let mut pending = self.pending.lock().await;
            match pending.as_mut() {
                Some(existing) => existing.merge(changes),
                None => *pending = Some(changes),
            }
        }

        let mut armed = self.timer_armed.lock().await;
        if *armed {
            return;
        }
        *armed = true;
        drop(armed);

        let this = self.arc();
        let interval = std::time::Duration::from_secs(self.config.coalesce.interval_secs);
        let cancellation = self.cancellation.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(interval) => {
                    let batch = this.pending.lock().await.take();
                    *this.timer_armed.lock().await = false;
                    if let Some(batch) = batch {
                        if let Err(e) = this.make_changes(batch).await {
                            error!(error = %e, "coalesced make_changes flush failed");
                        }
                    }
                }
                () = cancellation.cancelled() => {
                    *this.timer_armed.lock().await = false;
                }
            }
        });
    }
}

/// Applies an update payload's literal/`$set` fields on top of the
/// snapshot's current document for the same id, to get the document
/// `check_indexes` should evaluate - uniqueness is checked against the
/// *resulting* document, not the partial payload.
fn merged_candidate(snapshot: &CatalogSnapshot, id: ObjectId, payload: &Document) -> Document {
    let mut candidate = snapshot.by_id(id).cloned().unwrap_or_default();
    candidate.insert("_id".to_string(), serde_json::Value::String(id.to_string()));

    let set_fields = if store::is_operator_update(payload) {
        payload
            .get("$set")
            .and_then(serde_json::Value::as_object)
            .cloned()
            .unwrap_or_default()
    } else {
        payload.clone()
    };
    for (key, value) in set_fields {
        candidate.insert(key, value);
    }
    candidate
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    StoreWrite(#[from] StoreWriteError),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_support::{noop_notifier, seeded_manager};

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn cold_manager_loads_on_first_refresh() {
        let manager = seeded_manager(&[]);
        let snapshot = manager.refresh().await.unwrap();
        assert_eq!(snapshot.len(), 0);
    }

    #[tokio::test]
    async fn make_changes_rejects_a_duplicate_name_in_one_batch() {
        let manager = seeded_manager(&[]);
        let mut changes = Changes::new();
        let id_a = ObjectId::new_random();
        let id_b = ObjectId::new_random();
        changes.insert("systems", doc(json!({"_id": id_a.to_string(), "name": "prod"})));

        manager.make_changes(changes).await.unwrap();

        let mut conflicting = Changes::new();
        conflicting.insert("systems", doc(json!({"_id": id_b.to_string(), "name": "prod"})));
        let result = manager.make_changes(conflicting).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn make_changes_publishes_a_refreshed_snapshot() {
        let manager = seeded_manager(&[]);
        let id = ObjectId::new_random();
        let mut changes = Changes::new();
        changes.insert("systems", doc(json!({"_id": id.to_string(), "name": "prod"})));
        manager.make_changes(changes).await.unwrap();

        let snapshot = manager.current_snapshot().unwrap();
        assert!(snapshot.by_id(id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn make_changes_in_background_coalesces_within_one_flush() {
        let manager = seeded_manager(&[]);
        let id_a = ObjectId::new_random();
        let id_b = ObjectId::new_random();

        let mut first = Changes::new();
        first.insert("systems", doc(json!({"_id": id_a.to_string(), "name": "a"})));
        let mut second = Changes::new();
        second.insert("systems", doc(json!({"_id": id_b.to_string(), "name": "b"})));

        manager.make_changes_in_background(first).await;
        manager.make_changes_in_background(second).await;

        tokio::time::advance(std::time::Duration::from_secs(manager.config.coalesce.interval_secs + 1)).await;
        tokio::task::yield_now().await;

        let snapshot = manager.refresh().await.unwrap();
        assert!(snapshot.by_id(id_a).is_some());
        assert!(snapshot.by_id(id_b).is_some());
    }

    #[test]
    fn noop_notifier_builds() {
        let _ = noop_notifier();
    }
}
