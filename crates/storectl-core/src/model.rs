//! Typed entity views.
//!
//! The [`crate::snapshot`] builder operates on generic JSON documents (see
//! [`crate::document`]); these structs are the typed read surface callers
//! actually use, parsed from a snapshot's resolved documents on demand.
//! Cross-references are stored as the *referenced entity's own id* even
//! after "resolution" - per the design notes, cyclic references are not
//! materialized as owned Rust values; the snapshot is an arena keyed by id
//! and these ids are non-owning pointers back into it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, BucketId, NodeId, PoolId, RoleId, SystemId, TierId, TieringPolicyId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum DataPlacement {
    Mirror,
    Spread,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SrvMode {
    Decommissioning,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
    #[serde(rename = "_id")]
    pub id: SystemId,
    pub name: String,
    #[serde(default)]
    pub deleted: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "_id")]
    pub id: AccountId,
    pub email: String,
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub deleted: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    #[serde(rename = "_id")]
    pub id: RoleId,
    pub account: AccountId,
    pub system: SystemId,
    pub role_name: String,
    #[serde(default)]
    pub deleted: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    #[serde(rename = "_id")]
    pub id: BucketId,
    pub system: SystemId,
    pub name: String,
    pub tiering: TieringPolicyId,
    #[serde(default)]
    pub deleted: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieringPolicy {
    #[serde(rename = "_id")]
    pub id: TieringPolicyId,
    pub system: SystemId,
    pub name: String,
    /// Ordered; entry 0 is this version's only consulted tier (see Open Questions).
    pub tiers: Vec<TierId>,
    #[serde(default)]
    pub deleted: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    #[serde(rename = "_id")]
    pub id: TierId,
    pub system: SystemId,
    pub name: String,
    pub data_placement: DataPlacement,
    /// Ordered.
    pub pools: Vec<PoolId>,
    #[serde(default)]
    pub deleted: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    #[serde(rename = "_id")]
    pub id: PoolId,
    pub system: SystemId,
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<NodeId>,
    #[serde(default)]
    pub deleted: Option<DateTime<Utc>>,
}

/// Node records are reported by storage agents rather than administratively
/// authored, so they are not validated by the [`crate::schema::SchemaRegistry`]
/// in this version; the analyzer trusts whatever the document store returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "_id")]
    pub id: NodeId,
    pub pool: PoolId,
    pub heartbeat: DateTime<Utc>,
    #[serde(default)]
    pub srvmode: Option<SrvMode>,
    #[serde(default)]
    pub deleted: Option<DateTime<Utc>>,
}

/// Every collection name the catalog knows about, in the order the Catalog
/// Manager's load protocol fetches and indexes them.
pub const COLLECTIONS: &[&str] = &[
    "systems",
    "accounts",
    "roles",
    "buckets",
    "tiering_policies",
    "tiers",
    "pools",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_placement_serializes_uppercase() {
        assert_eq!(
            serde_json::to_value(DataPlacement::Mirror).unwrap(),
            serde_json::json!("MIRROR")
        );
    }

    #[test]
    fn srvmode_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(SrvMode::Decommissioning).unwrap(),
            serde_json::json!("decommissioning")
        );
    }
}
