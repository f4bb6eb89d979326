//! Three-phase [`super::CatalogSnapshot`] builder.
//!
//! 1. **ID index** - every live document from every collection is inserted
//!    into a flat `id -> document` arena. A duplicate `_id` across (or
//!    within) collections is a fatal load error; it means the document
//!    store itself is inconsistent and no snapshot can be trusted.
//! 2. **Reference resolution** - every leaf in every document is visited via
//!    [`crate::document::walk_mut`]; string leaves that parse as an
//!    [`ObjectId`] and are not the document's own `_id`/`id` field are
//!    checked against the id index. An id the index doesn't know about (a
//!    live document pointing at a soft-deleted or concurrently-removed one)
//!    is left exactly as it was written - unresolvable identifiers are not a
//!    load failure, they're treated as absence by callers that later try to
//!    dereference them through [`super::CatalogSnapshot::by_id`].
//! 3. **Secondary indexes** - each declared [`IndexSpec`] is populated from
//!    its source collection's live documents.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use super::index::{self, IndexContext, IndexKey, IndexSpec, IndexTable, IndexVal, Resolved};
use crate::{
    document::{self, Document},
    error::LoadError,
    ids::ObjectId,
    XXHashMap,
};

/// Declared indexes, in the order they are populated. See `SPEC_FULL.md`
/// section 4.2 for the full `{name, collection, context, key, val,
/// val_array}` table these mirror.
pub(crate) const INDEXES: &[IndexSpec] = &[
    IndexSpec {
        name: "systems_by_name",
        collection: "systems",
        context: IndexContext::Root,
        key: &["name"],
        val: IndexVal::ItemId,
        val_array: false,
    },
    IndexSpec {
        name: "accounts_by_email",
        collection: "accounts",
        context: IndexContext::Root,
        key: &["email"],
        val: IndexVal::ItemId,
        val_array: false,
    },
    IndexSpec {
        name: "buckets_by_system_and_name",
        collection: "buckets",
        context: IndexContext::Root,
        key: &["system", "name"],
        val: IndexVal::ItemId,
        val_array: false,
    },
    IndexSpec {
        name: "pools_by_system_and_name",
        collection: "pools",
        context: IndexContext::Root,
        key: &["system", "name"],
        val: IndexVal::ItemId,
        val_array: false,
    },
    IndexSpec {
        name: "roles_by_account",
        collection: "roles",
        context: IndexContext::Owner("account"),
        key: &["system"],
        val: IndexVal::ItemId,
        val_array: true,
    },
    IndexSpec {
        name: "roles_by_system",
        collection: "roles",
        context: IndexContext::Owner("system"),
        key: &["account"],
        val: IndexVal::ItemId,
        val_array: true,
    },
];

/// Per-collection live documents, as fetched by the Catalog Manager's load
/// protocol. Keys are collection names from [`crate::model::COLLECTIONS`].
pub type Loaded = HashMap<&'static str, Vec<Document>>;

pub(crate) struct Built {
    pub idmap: XXHashMap<ObjectId, Document>,
    pub collections: XXHashMap<ObjectId, &'static str>,
    pub indexes: HashMap<&'static str, IndexTable>,
}

pub(crate) fn build(loaded: Loaded) -> Result<Built, LoadError> {
    let (idmap, collections) = build_idmap(&loaded)?;
    log_dangling_references(&idmap);
    let indexes = build_indexes(&loaded, &idmap);

    Ok(Built {
        idmap,
        collections,
        indexes,
    })
}

fn build_idmap(
    loaded: &Loaded,
) -> Result<(XXHashMap<ObjectId, Document>, XXHashMap<ObjectId, &'static str>), LoadError> {
    let mut idmap = XXHashMap::default();
    let mut collections = XXHashMap::default();

    for (&collection, documents) in loaded {
        for doc in documents {
            if !document::is_live(doc) {
                continue;
            }
            let Some(id) = document::document_id(doc) else {
                return Err(load_error(format!(
                    "document in collection `{collection}` has no usable `_id`"
                )));
            };
            if idmap.insert(id, doc.clone()).is_some() {
                return Err(load_error(format!(
                    "duplicate id `{id}` encountered while indexing collection `{collection}`"
                )));
            }
            collections.insert(id, collection);
        }
    }

    Ok((idmap, collections))
}

/// Walks every document for diagnostic purposes only. An id that doesn't
/// resolve is left in the document exactly as loaded - this never fails the
/// build; see the module doc for why. Logged at `debug` since a dangling
/// reference is routine (the referenced entity may have been soft-deleted
/// between the referencing write and this load) rather than a condition an
/// operator needs to act on.
fn log_dangling_references(idmap: &XXHashMap<ObjectId, Document>) {
    for (id, doc) in idmap {
        let mut value = Value::Object(doc.clone());
        document::walk_mut(&mut value, &mut |field, leaf| {
            if matches!(field, Some("_id") | Some("id")) {
                return;
            }
            let Value::String(s) = leaf else {
                return;
            };
            let Ok(referenced) = s.parse::<ObjectId>() else {
                return;
            };
            if !idmap.contains_key(&referenced) {
                debug!(
                    document = %id,
                    field = field.unwrap_or("<array element>"),
                    referenced = %referenced,
                    "reference left unresolved: target id not present in this load"
                );
            }
        });
    }
}

fn build_indexes(
    loaded: &Loaded,
    idmap: &XXHashMap<ObjectId, Document>,
) -> HashMap<&'static str, IndexTable> {
    let mut tables: HashMap<&'static str, IndexTable> =
        INDEXES.iter().map(|spec| (spec.name, IndexTable::new(spec.val_array))).collect();

    for spec in INDEXES {
        let Some(documents) = loaded.get(spec.collection) else {
            continue;
        };
        let table = tables.get_mut(spec.name).expect("table created above");

        for doc in documents {
            if !document::is_live(doc) {
                continue;
            }
            let Some(item_id) = document::document_id(doc) else {
                continue;
            };
            let value = Value::Object(doc.clone());
            let Some(resolved) = resolve_index_entry(spec, item_id, &value, idmap) else {
                warn!(
                    index = spec.name,
                    id = %item_id,
                    "skipping index entry: key or owner could not be resolved"
                );
                continue;
            };
            if table.insert(resolved) {
                warn!(
                    index = spec.name,
                    id = %item_id,
                    "index collision recorded; candidate writes against this key will be rejected"
                );
            }
        }
    }

    tables
}

fn resolve_index_entry(
    spec: &IndexSpec,
    item_id: ObjectId,
    item: &Value,
    idmap: &XXHashMap<ObjectId, Document>,
) -> Option<Resolved> {
    let owner = match spec.context {
        IndexContext::Root => None,
        IndexContext::Owner(path) => {
            let owner_id: ObjectId = index::key_component(item, path)?.parse().ok()?;
            idmap.contains_key(&owner_id).then_some(owner_id)
        }
    };
    if matches!(spec.context, IndexContext::Owner(_)) && owner.is_none() {
        return None;
    }

    let key: IndexKey = spec
        .key
        .iter()
        .map(|path| index::key_component(item, path))
        .collect::<Option<_>>()?;

    let value = index::resolve_val(spec.val, item_id, item)?;

    Some(Resolved { owner, key, value })
}

pub(crate) fn indexes_for_collection(collection: &str) -> impl Iterator<Item = &'static IndexSpec> {
    INDEXES.iter().filter(move |spec| spec.collection == collection)
}

fn load_error(message: String) -> LoadError {
    load_error_details(message, Vec::new())
}

fn load_error_details(message: String, details: Vec<String>) -> LoadError {
    LoadError {
        source: Box::<dyn std::error::Error + Send + Sync>::from(if details.is_empty() {
            message
        } else {
            format!("{message}: {}", details.join("; "))
        }),
        stack: Vec::new(),
    }
}
