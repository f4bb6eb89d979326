//! Catalog Snapshot: an immutable, point-in-time view of every live document
//! the catalog manages, plus the secondary indexes declared over it.
//!
//! A snapshot is built once from a full load of every collection and never
//! mutated afterwards - refreshing the catalog means building a new
//! snapshot and atomically swapping it in (see [`crate::manager`]), not
//! patching this one. Cross-references between documents are **not**
//! rewritten in place; per the design notes this would require
//! materializing reference cycles that Rust's ownership model can't
//! represent safely. Instead a snapshot is an arena of documents keyed by
//! id, and "resolving" a reference means dereferencing through
//! [`CatalogSnapshot::by_id`] on demand.

mod build;
mod index;

use std::collections::HashMap;

use serde_json::Value;

use self::build::Loaded;
pub use self::index::{IndexContext, IndexSpec, IndexVal};
use crate::{
    document::{self, Document},
    error::{ConflictError, LoadError},
    ids::ObjectId,
    XXHashMap,
};

/// An immutable point-in-time view of the catalog.
#[derive(Debug)]
pub struct CatalogSnapshot {
    idmap: XXHashMap<ObjectId, Document>,
    collections: XXHashMap<ObjectId, &'static str>,
    indexes: HashMap<&'static str, index::IndexTable>,
}

impl CatalogSnapshot {
    /// Builds a fresh snapshot from a full load of every collection.
    ///
    /// # Errors
    /// Returns [`LoadError`] if the loaded documents are internally
    /// inconsistent: a duplicate id, or a document missing `_id`. A
    /// reference to an id absent from the load is not an error - it is
    /// left unresolved, and later lookups through it behave as absence.
    pub fn build(loaded: Loaded) -> Result<Self, LoadError> {
        let built = build::build(loaded)?;
        Ok(Self {
            idmap: built.idmap,
            collections: built.collections,
            indexes: built.indexes,
        })
    }

    /// Looks up a document by id, regardless of which collection it lives in.
    #[must_use]
    pub fn by_id(&self, id: ObjectId) -> Option<&Document> {
        self.idmap.get(&id)
    }

    /// The name of the collection a live id belongs to.
    #[must_use]
    pub fn collection_of(&self, id: ObjectId) -> Option<&'static str> {
        self.collections.get(&id).copied()
    }

    /// Total number of live documents across all collections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.idmap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.idmap.is_empty()
    }

    /// Looks up a single id through a non-array declared index, e.g.
    /// `lookup_one("systems_by_name", None, &["prod"])`.
    #[must_use]
    pub fn lookup_one(&self, index_name: &str, owner: Option<ObjectId>, key: &[&str]) -> Option<ObjectId> {
        self.indexes.get(index_name)?.lookup_one(owner, key)
    }

    /// Looks up the id list through an array (`val_array`) declared index,
    /// e.g. `lookup_many("roles_by_account", Some(account_id), &[system_id])`.
    #[must_use]
    pub fn lookup_many(&self, index_name: &str, owner: Option<ObjectId>, key: &[&str]) -> Vec<ObjectId> {
        self.indexes
            .get(index_name)
            .map(|table| table.lookup_many(owner, key))
            .unwrap_or_default()
    }

    /// Pre-checks a candidate document against every index declared on its
    /// collection, before it is ever sent to the document store.
    ///
    /// This is the uniqueness half of the Catalog Manager's `make_changes`
    /// validate step; reference-integrity is re-derived by rebuilding the
    /// snapshot after the write, not checked here.
    ///
    /// # Errors
    /// Returns [`ConflictError`] naming the first index whose key the
    /// candidate collides on with a *different* existing id.
    pub fn check_indexes(&self, collection: &str, item: &Document) -> Result<(), ConflictError> {
        let candidate_id = document::document_id(item);
        let value = Value::Object(item.clone());

        for spec in build::indexes_for_collection(collection) {
            let Some(table) = self.indexes.get(spec.name) else {
                continue;
            };

            let owner = match spec.context {
                index::IndexContext::Root => None,
                index::IndexContext::Owner(path) => {
                    let Some(owner_id) = index::key_component(&value, path).and_then(|s| s.parse().ok())
                    else {
                        continue;
                    };
                    Some(owner_id)
                }
            };

            let Some(key) = spec
                .key
                .iter()
                .map(|path| index::key_component(&value, path))
                .collect::<Option<Vec<_>>>()
            else {
                continue;
            };

            let candidate = candidate_id.unwrap_or_else(ObjectId::new_random);
            if table.check(owner, &key, candidate) {
                return Err(ConflictError {
                    collection: collection.to_string(),
                    index: spec.name.to_string(),
                    stack: Vec::new(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    fn sample_loaded() -> Loaded {
        let system_id = "01975f3e-0000-7000-8000-000000000001";
        let account_id = "01975f3e-0000-7000-8000-000000000002";
        let role_id = "01975f3e-0000-7000-8000-000000000003";

        let mut loaded: Loaded = HashMap::new();
        loaded.insert(
            "systems",
            vec![doc(json!({"_id": system_id, "name": "prod"}))],
        );
        loaded.insert(
            "accounts",
            vec![doc(json!({"_id": account_id, "email": "a@example.com"}))],
        );
        loaded.insert(
            "roles",
            vec![doc(json!({
                "_id": role_id,
                "account": account_id,
                "system": system_id,
                "role_name": "admin",
            }))],
        );
        loaded
    }

    #[test]
    fn by_id_resolves_cross_references_through_the_arena() {
        let snapshot = CatalogSnapshot::build(sample_loaded()).unwrap();
        let role_id: ObjectId = "01975f3e-0000-7000-8000-000000000003".parse().unwrap();
        let role = snapshot.by_id(role_id).unwrap();

        let account_ref: ObjectId = role["account"].as_str().unwrap().parse().unwrap();
        let account = snapshot.by_id(account_ref).unwrap();
        assert_eq!(account["email"], json!("a@example.com"));
    }

    #[test]
    fn dangling_reference_is_left_unresolved_not_rejected() {
        let system_id = "01975f3e-0000-7000-8000-000000000001";
        let bucket_id = "01975f3e-0000-7000-8000-000000000099";
        let dangling_tiering_id = "01975f3e-0000-7000-8000-00000000dead";
        let mut loaded: Loaded = HashMap::new();
        loaded.insert(
            "buckets",
            vec![doc(json!({
                "_id": bucket_id,
                "system": system_id,
                "name": "b1",
                "tiering": dangling_tiering_id,
            }))],
        );

        let snapshot = CatalogSnapshot::build(loaded).unwrap();
        let bucket = snapshot.by_id(bucket_id.parse().unwrap()).unwrap();
        assert_eq!(bucket["tiering"], json!(dangling_tiering_id));
        assert!(snapshot.by_id(dangling_tiering_id.parse().unwrap()).is_none());
    }

    #[test]
    fn build_fails_on_duplicate_id() {
        let id = "01975f3e-0000-7000-8000-000000000001";
        let mut loaded: Loaded = HashMap::new();
        loaded.insert(
            "systems",
            vec![
                doc(json!({"_id": id, "name": "prod"})),
                doc(json!({"_id": id, "name": "prod2"})),
            ],
        );
        assert!(CatalogSnapshot::build(loaded).is_err());
    }

    #[test]
    fn non_array_index_lookup_finds_unique_key() {
        let snapshot = CatalogSnapshot::build(sample_loaded()).unwrap();
        let found = snapshot.lookup_one("systems_by_name", None, &["prod"]);
        assert!(found.is_some());
        assert!(snapshot.lookup_one("systems_by_name", None, &["staging"]).is_none());
    }

    #[test]
    fn array_index_lookup_collects_all_matches() {
        let snapshot = CatalogSnapshot::build(sample_loaded()).unwrap();
        let account_id: ObjectId = "01975f3e-0000-7000-8000-000000000002".parse().unwrap();
        let roles = snapshot.lookup_many("roles_by_account", Some(account_id), &[
            "01975f3e-0000-7000-8000-000000000001",
        ]);
        assert_eq!(roles.len(), 1);
    }

    #[test]
    fn check_indexes_rejects_a_colliding_name() {
        let snapshot = CatalogSnapshot::build(sample_loaded()).unwrap();
        let colliding = doc(json!({
            "_id": "01975f3e-0000-7000-8000-0000000000ff",
            "name": "prod",
        }));
        assert!(snapshot.check_indexes("systems", &colliding).is_err());
    }

    #[test]
    fn check_indexes_allows_a_document_updating_itself() {
        let snapshot = CatalogSnapshot::build(sample_loaded()).unwrap();
        let same_id = doc(json!({
            "_id": "01975f3e-0000-7000-8000-000000000001",
            "name": "prod",
        }));
        assert!(snapshot.check_indexes("systems", &same_id).is_ok());
    }
}
