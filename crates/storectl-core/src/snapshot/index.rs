//! Secondary index declarations and the table that backs them.
//!
//! An index is declared once, statically, as `{name, collection, context,
//! key, val, val_array}`. For every live item in `collection` the builder
//! resolves `key` as a dotted path (or a tuple of dotted paths for a
//! compound key), computes `val`, locates the `context` - either the
//! snapshot root or an owning entity - and stores `context[name][key] =
//! val`, pushing to a list instead of overwriting when `val_array` is set.

use std::collections::HashMap;

use serde_json::Value;

use crate::{document::get_path, ids::ObjectId};

/// What an index's stored value is.
#[derive(Debug, Clone, Copy)]
pub enum IndexVal {
    /// The item's own id - the common case; the index is effectively a
    /// `key -> id` pointer table into the arena.
    ItemId,
    /// A string extracted from the item at a dotted path.
    Path(&'static str),
}

/// Where an index's buckets live.
#[derive(Debug, Clone, Copy)]
pub enum IndexContext {
    /// The index lives at the snapshot root.
    Root,
    /// The index hangs off the entity referenced by the item's field at this
    /// dotted path (e.g. `"account"` for an index that hangs off the account
    /// a role belongs to).
    Owner(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct IndexSpec {
    pub name: &'static str,
    pub collection: &'static str,
    pub context: IndexContext,
    /// Dotted paths making up the (possibly compound) key.
    pub key: &'static [&'static str],
    pub val: IndexVal,
    pub val_array: bool,
}

/// A key is the string-encoded tuple of the declared `key` paths' values.
pub type IndexKey = Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum StoredValue {
    Id(ObjectId),
    Text(String),
}

/// All entries for one declared index, scoped by owner (`None` for `Root`).
#[derive(Debug, Default)]
pub struct IndexTable {
    single: HashMap<(Option<ObjectId>, IndexKey), StoredValue>,
    multi: HashMap<(Option<ObjectId>, IndexKey), Vec<StoredValue>>,
    val_array: bool,
    /// Keys that collided on insert (non-array only); kept for diagnostics,
    /// never aborts the build.
    pub(crate) collisions: Vec<(Option<ObjectId>, IndexKey)>,
}

/// Outcome of resolving a key for one item against one index declaration.
pub(crate) struct Resolved {
    pub owner: Option<ObjectId>,
    pub key: IndexKey,
    pub value: StoredValue,
}

impl IndexTable {
    pub(crate) fn new(val_array: bool) -> Self {
        Self {
            single: HashMap::new(),
            multi: HashMap::new(),
            val_array,
            collisions: Vec::new(),
        }
    }

    /// Inserts `resolved` into the table. Returns `true` if a non-array
    /// insert collided with a different existing value (the build logs
    /// this; [`IndexTable::check`] is what turns a collision into a hard
    /// [`crate::error::ConflictError`] for a specific write candidate).
    pub(crate) fn insert(&mut self, resolved: Resolved) -> bool {
        let owner_key = (resolved.owner, resolved.key.clone());
        if self.val_array {
            self.multi.entry(owner_key).or_default().push(resolved.value);
            false
        } else {
            match self.single.get(&owner_key) {
                Some(existing) if *existing != resolved.value => {
                    self.collisions.push(owner_key);
                    true
                }
                _ => {
                    self.single.insert(owner_key, resolved.value);
                    false
                }
            }
        }
    }

    /// `true` if a non-array index at this key already maps to an id other
    /// than `candidate`.
    pub(crate) fn check(&self, owner: Option<ObjectId>, key: &IndexKey, candidate: ObjectId) -> bool {
        if self.val_array {
            return false;
        }
        matches!(
            self.single.get(&(owner, key.clone())),
            Some(existing) if *existing != StoredValue::Id(candidate)
        )
    }

    #[must_use]
    pub fn lookup_one(&self, owner: Option<ObjectId>, key: &[&str]) -> Option<ObjectId> {
        let key: IndexKey = key.iter().map(|s| (*s).to_string()).collect();
        match self.single.get(&(owner, key)) {
            Some(StoredValue::Id(id)) => Some(*id),
            _ => None,
        }
    }

    #[must_use]
    pub fn lookup_many(&self, owner: Option<ObjectId>, key: &[&str]) -> Vec<ObjectId> {
        let key: IndexKey = key.iter().map(|s| (*s).to_string()).collect();
        self.multi
            .get(&(owner, key))
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| match v {
                        StoredValue::Id(id) => Some(*id),
                        StoredValue::Text(_) => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Extracts the string form of a dotted-path key component from a document
/// value, for use as an [`IndexKey`] segment.
pub(crate) fn key_component(item: &Value, path: &str) -> Option<String> {
    get_path(item, path).map(value_to_key_string)
}

fn value_to_key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn resolve_val(val: IndexVal, item_id: ObjectId, item: &Value) -> Option<StoredValue> {
    match val {
        IndexVal::ItemId => Some(StoredValue::Id(item_id)),
        IndexVal::Path(path) => get_path(item, path)
            .map(value_to_key_string)
            .map(StoredValue::Text),
    }
}
