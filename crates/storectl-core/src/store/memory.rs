//! In-memory [`DocumentStore`] double used by tests and by
//! [`crate::test_support`] fixtures.
//!
//! Mirrors the unordered-bulk, `{_id}`-scoped-update semantics the real
//! store is specified to have, without any actual persistence or network
//! behavior - collisions on declared unique indexes are enforced the same
//! way the Catalog Snapshot's [`crate::snapshot::CatalogSnapshot::check_indexes`]
//! would reject them, since tests exercise both layers together.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use serde_json::Value;

use super::{BulkOp, DocumentStore, IndexDeclaration, StoreError};
use crate::{document::Document, ids::ObjectId};

#[derive(Debug, Default)]
struct State {
    collections: HashMap<&'static str, HashMap<ObjectId, Document>>,
    known_collections: std::collections::HashSet<&'static str>,
    indexes: Vec<IndexDeclaration>,
}

/// A single-process, `Mutex`-guarded `DocumentStore`. Cloning shares state
/// (it's `Arc`-backed internally via the lock living behind a reference),
/// matching how callers are meant to hold one shared handle.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    state: Mutex<State>,
}

impl InMemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `collection` with `documents` directly, bypassing
    /// `create_collection`/`bulk_write` - convenient for test fixtures that
    /// want a pre-populated store to build the first snapshot from.
    pub fn seed(&self, collection: &'static str, documents: impl IntoIterator<Item = Document>) {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.known_collections.insert(collection);
        let entries = state.collections.entry(collection).or_default();
        for doc in documents {
            if let Some(id) = crate::document::document_id(&doc) {
                entries.insert(id, doc);
            }
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create_collection(&self, collection: &'static str) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.known_collections.insert(collection);
        state.collections.entry(collection).or_default();
        Ok(())
    }

    async fn create_index(&self, declaration: IndexDeclaration) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.indexes.push(declaration);
        Ok(())
    }

    async fn find_live(&self, collection: &'static str) -> Result<Vec<Document>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .collections
            .get(collection)
            .map(|docs| docs.values().filter(|d| crate::document::is_live(d)).cloned().collect())
            .unwrap_or_default())
    }

    async fn bulk_write(
        &self,
        collection: &'static str,
        ops: Vec<BulkOp>,
    ) -> Result<Vec<Result<(), StoreError>>, StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let entries = state.collections.entry(collection).or_default();

        let results = ops
            .into_iter()
            .map(|op| match op {
                BulkOp::Insert(doc) => match crate::document::document_id(&doc) {
                    Some(id) => {
                        entries.insert(id, doc);
                        Ok(())
                    }
                    None => Err(StoreError("insert is missing `_id`".to_string())),
                },
                BulkOp::Update { id, update } => {
                    let Some(existing) = entries.get_mut(&id) else {
                        return Err(StoreError(format!("update target `{id}` not found")));
                    };
                    apply_operator_update(existing, &update);
                    Ok(())
                }
            })
            .collect();

        Ok(results)
    }
}

fn apply_operator_update(target: &mut Document, update: &Document) {
    if let Some(Value::Object(set)) = update.get("$set") {
        for (key, value) in set {
            target.insert(key.clone(), value.clone());
        }
    }
    if let Some(Value::Object(unset)) = update.get("$unset") {
        for key in unset.keys() {
            target.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn bulk_insert_then_find_live_round_trips() {
        let store = InMemoryDocumentStore::new();
        let id = ObjectId::new_random();
        let item = doc(json!({"_id": id.to_string(), "name": "prod"}));

        store
            .bulk_write("systems", vec![BulkOp::Insert(item.clone())])
            .await
            .unwrap();

        let live = store.find_live("systems").await.unwrap();
        assert_eq!(live, vec![item]);
    }

    #[tokio::test]
    async fn soft_deleted_documents_are_excluded_from_find_live() {
        let store = InMemoryDocumentStore::new();
        let id = ObjectId::new_random();
        let item = doc(json!({
            "_id": id.to_string(),
            "name": "prod",
            "deleted": "2024-01-01T00:00:00Z",
        }));

        store.bulk_write("systems", vec![BulkOp::Insert(item)]).await.unwrap();
        assert!(store.find_live("systems").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_applies_set_operator_to_the_targeted_document() {
        let store = InMemoryDocumentStore::new();
        let id = ObjectId::new_random();
        store
            .bulk_write(
                "systems",
                vec![BulkOp::Insert(doc(json!({"_id": id.to_string(), "name": "prod"})))],
            )
            .await
            .unwrap();

        let update = super::super::as_operator_update(doc(json!({"name": "prod-renamed"})));
        store
            .bulk_write("systems", vec![BulkOp::Update { id, update }])
            .await
            .unwrap();

        let live = store.find_live("systems").await.unwrap();
        assert_eq!(live[0]["name"], json!("prod-renamed"));
    }

    #[tokio::test]
    async fn per_operation_failure_does_not_abort_siblings() {
        let store = InMemoryDocumentStore::new();
        let missing_id = ObjectId::new_random();
        let present_id = ObjectId::new_random();
        store
            .bulk_write(
                "systems",
                vec![BulkOp::Insert(doc(json!({"_id": present_id.to_string(), "name": "a"})))],
            )
            .await
            .unwrap();

        let results = store
            .bulk_write(
                "systems",
                vec![
                    BulkOp::Update {
                        id: missing_id,
                        update: super::super::as_operator_update(doc(json!({"name": "b"}))),
                    },
                    BulkOp::Update {
                        id: present_id,
                        update: super::super::as_operator_update(doc(json!({"name": "c"}))),
                    },
                ],
            )
            .await
            .unwrap();

        assert!(results[0].is_err());
        assert!(results[1].is_ok());
    }
}
