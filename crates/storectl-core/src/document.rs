//! Generic document representation and the structural visitor used to
//! resolve cross-references when a [`crate::snapshot::CatalogSnapshot`] is
//! built.
//!
//! Raw documents, as read from the document store, are plain JSON objects
//! (`serde_json::Value`). Resolution and indexing both need to walk an
//! arbitrary document without knowing its schema ahead of time, so both
//! operate on this representation rather than on typed entity structs.

use serde_json::Value;

use crate::ids::ObjectId;

/// A raw document as read from (or about to be written to) the document
/// store: a JSON object that always carries `_id` and, for soft-deletable
/// collections, a nullable `deleted` timestamp.
pub type Document = serde_json::Map<String, Value>;

/// Returns the document's `_id` field, if present and well-formed.
#[must_use]
pub fn document_id(doc: &Document) -> Option<ObjectId> {
    doc.get("_id")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

/// Returns `true` if the document is live (its `deleted` field is absent or
/// JSON `null`).
#[must_use]
pub fn is_live(doc: &Document) -> bool {
    matches!(doc.get("deleted"), None | Some(Value::Null))
}

/// Recursively visits every value in a JSON document, invoking `f` for each
/// leaf encountered while descending through objects and arrays.
///
/// `f` receives the enclosing object's field name (`None` at the document
/// root or while inside an array) alongside the leaf value, which mirrors
/// the resolution rule in the specification: identifier detection is by
/// value kind, not field name, except that fields literally named `_id` or
/// `id` are never substituted.
pub fn walk_mut(value: &mut Value, f: &mut impl FnMut(Option<&str>, &mut Value)) {
    walk_mut_inner(None, value, f);
}

fn walk_mut_inner(
    field_name: Option<&str>,
    value: &mut Value,
    f: &mut impl FnMut(Option<&str>, &mut Value),
) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                walk_mut_inner(Some(key.as_str()), child, f);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                walk_mut_inner(field_name, item, f);
            }
        }
        leaf => f(field_name, leaf),
    }
}

/// Extracts the value at a dotted path (`"a.b.c"`) from a document, the way
/// secondary index declarations resolve their `key`/`val` expressions.
///
/// An empty path returns the whole document as a [`Value::Object`] clone.
#[must_use]
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
