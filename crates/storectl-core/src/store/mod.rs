//! `DocumentStore`: the persistence interface the [`crate::manager`] loads
//! from and writes through.
//!
//! The real backend is out of scope for this crate - only the trait is
//! named here, the same way the reference catalog crate names its
//! `CatalogStore` trait boundary against Postgres without this crate
//! hand-rolling a driver. [`crate::test_support`] provides an in-memory
//! implementation for tests.

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::{document::Document, ids::ObjectId};

/// One write against a single collection, as issued by
/// [`crate::manager::CatalogManager::make_changes`].
#[derive(Debug, Clone)]
pub enum BulkOp {
    /// `insert(doc)` - the document must carry a pre-assigned `_id`.
    Insert(Document),
    /// `find({_id}).updateOne(update)`. Distinguishing a literal replacement
    /// from an operator update (first key begins with `$`) is the caller's
    /// job (see [`crate::manager`]); by the time a `BulkOp::Update` reaches
    /// the store, `update` is always already in operator form.
    Update { id: ObjectId, update: Document },
}

/// A declarative compound-uniqueness index, created at store init.
#[derive(Debug, Clone, Copy)]
pub struct IndexDeclaration {
    pub collection: &'static str,
    pub fields: &'static [&'static str],
    pub unique: bool,
}

/// The persistence boundary the Catalog Manager loads from and writes
/// through. Implementations are expected to be cheaply cloneable handles
/// onto a pooled connection (`Arc<dyn DocumentStore>` is the shape callers
/// hold).
#[async_trait]
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// Creates `collection` if it does not already exist. Idempotent.
    async fn create_collection(&self, collection: &'static str) -> Result<(), StoreError>;

    /// Declares a compound index, `background=true`. Idempotent.
    async fn create_index(&self, declaration: IndexDeclaration) -> Result<(), StoreError>;

    /// Returns every document in `collection` with `deleted = null`.
    async fn find_live(&self, collection: &'static str) -> Result<Vec<Document>, StoreError>;

    /// Executes an unordered bulk of operations against `collection`. A
    /// per-operation failure does not abort siblings; the returned vector
    /// has one entry per input operation, in order.
    async fn bulk_write(
        &self,
        collection: &'static str,
        ops: Vec<BulkOp>,
    ) -> Result<Vec<Result<(), StoreError>>, StoreError>;
}

/// Opaque store-level failure, wrapped into [`crate::error::StoreWriteError`]
/// or [`crate::error::LoadError`] by the manager depending on which
/// operation failed.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct StoreError(pub String);

/// Builds the "set `deleted = now`" update payload `make_changes.remove`
/// issues, already in operator form.
#[must_use]
pub fn soft_delete_update(now: chrono::DateTime<chrono::Utc>) -> Document {
    let mut set = serde_json::Map::new();
    set.insert("deleted".to_string(), Value::String(now.to_rfc3339()));
    let mut op = serde_json::Map::new();
    op.insert("$set".to_string(), Value::Object(set));
    op
}

/// `true` if `payload`'s first key begins with `$`, meaning it is already an
/// operator update rather than a literal-replacement document.
#[must_use]
pub fn is_operator_update(payload: &Document) -> bool {
    payload.keys().next().is_some_and(|k| k.starts_with('$'))
}

/// Wraps a literal-replacement payload as a `$set`-all-fields operator
/// update, the way `make_changes.update` normalizes its input before
/// queuing a [`BulkOp::Update`].
#[must_use]
pub fn as_operator_update(payload: Document) -> Document {
    if is_operator_update(&payload) {
        return payload;
    }
    let mut op = serde_json::Map::new();
    op.insert("$set".to_string(), Value::Object(payload));
    op
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn literal_payload_is_wrapped_in_set() {
        let payload = json!({"name": "prod2"}).as_object().unwrap().clone();
        let wrapped = as_operator_update(payload);
        assert!(wrapped.contains_key("$set"));
    }

    #[test]
    fn operator_payload_passes_through_unchanged() {
        let payload = json!({"$inc": {"count": 1}}).as_object().unwrap().clone();
        assert!(is_operator_update(&payload));
        assert_eq!(as_operator_update(payload.clone()), payload);
    }
}
