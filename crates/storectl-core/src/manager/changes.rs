//! The `{insert, update, remove}` batch payload `make_changes` accepts, and
//! the coalescing merge `make_changes_in_background` performs on it.

use std::collections::HashMap;

use crate::{document::Document, ids::ObjectId};

/// One transactional batch of mutations, grouped per collection.
#[derive(Debug, Clone, Default)]
pub struct Changes {
    pub insert: HashMap<&'static str, Vec<Document>>,
    pub update: HashMap<&'static str, Vec<(ObjectId, Document)>>,
    pub remove: HashMap<&'static str, Vec<ObjectId>>,
}

impl Changes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insert.values().all(Vec::is_empty)
            && self.update.values().all(Vec::is_empty)
            && self.remove.values().all(Vec::is_empty)
    }

    pub fn insert(&mut self, collection: &'static str, doc: Document) {
        self.insert.entry(collection).or_default().push(doc);
    }

    pub fn update(&mut self, collection: &'static str, id: ObjectId, payload: Document) {
        self.update.entry(collection).or_default().push((id, payload));
    }

    pub fn remove(&mut self, collection: &'static str, id: ObjectId) {
        self.remove.entry(collection).or_default().push(id);
    }

    /// Merges `other` into `self` the way the background coordinator
    /// coalesces two calls that land within the same coalescing window:
    /// arrays concatenate, nothing is deduplicated or deep-merged beyond
    /// that (a later `update` for the same id simply queues another
    /// operator update, applied after the earlier one in the resulting
    /// bulk).
    pub fn merge(&mut self, other: Changes) {
        for (collection, docs) in other.insert {
            self.insert.entry(collection).or_default().extend(docs);
        }
        for (collection, updates) in other.update {
            self.update.entry(collection).or_default().extend(updates);
        }
        for (collection, ids) in other.remove {
            self.remove.entry(collection).or_default().extend(ids);
        }
    }

    /// Every collection name touched by this batch, in no particular order.
    pub(crate) fn touched_collections(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.insert
            .keys()
            .chain(self.update.keys())
            .chain(self.remove.keys())
            .copied()
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn merge_concatenates_per_collection_arrays() {
        let mut a = Changes::new();
        a.insert("systems", doc(json!({"_id": "a", "name": "x"})));

        let mut b = Changes::new();
        b.insert("systems", doc(json!({"_id": "b", "name": "y"})));

        a.merge(b);
        assert_eq!(a.insert["systems"].len(), 2);
    }

    #[test]
    fn empty_changes_report_is_empty() {
        assert!(Changes::new().is_empty());
    }
}
