//! Opaque identifiers used across the catalog.
//!
//! The document store's native identifier is an opaque `ObjectId`; the
//! typed newtypes below exist so that a caller can't accidentally hand a
//! [`BucketId`] to an API expecting a [`PoolId`]. All of them are
//! structurally identical - a thin wrapper around [`ObjectId`] - generated
//! by [`define_id_type`].

use std::{ops::Deref, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The document store's native identifier format.
///
/// Corresponds to the `objectid` format the [`crate::schema`] registry
/// recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ObjectId(Uuid);

impl ObjectId {
    #[must_use]
    pub fn new_random() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Deref for ObjectId {
    type Target = Uuid;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Uuid> for ObjectId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<ObjectId> for Uuid {
    fn from(value: ObjectId) -> Self {
        value.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ObjectId::from_str(&s).map_err(|_| {
            serde::de::Error::custom(format!("`{s}` is not a valid objectid"))
        })
    }
}

macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(ObjectId);

        impl $name {
            #[must_use]
            pub fn new(id: ObjectId) -> Self {
                Self(id)
            }

            #[must_use]
            pub fn new_random() -> Self {
                Self(ObjectId::new_random())
            }

            #[must_use]
            pub fn as_object_id(&self) -> ObjectId {
                self.0
            }
        }

        impl Deref for $name {
            type Target = ObjectId;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<ObjectId> for $name {
            fn from(value: ObjectId) -> Self {
                Self(value)
            }
        }

        impl From<$name> for ObjectId {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<$name, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                ObjectId::deserialize(deserializer).map($name)
            }
        }
    };
}

define_id_type!(SystemId);
define_id_type!(AccountId);
define_id_type!(RoleId);
define_id_type!(BucketId);
define_id_type!(TieringPolicyId);
define_id_type!(TierId);
define_id_type!(PoolId);
define_id_type!(NodeId);
define_id_type!(ChunkId);
define_id_type!(BlockId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let id = BucketId::new_random();
        let serialized = serde_json::to_value(id).unwrap();
        assert_eq!(serialized, serde_json::json!(id.to_string()));
        let deserialized: BucketId = serde_json::from_value(serialized).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn distinct_id_types_do_not_coerce() {
        let object_id = ObjectId::new_random();
        let bucket_id = BucketId::from(object_id);
        let pool_id = PoolId::from(object_id);
        assert_eq!(bucket_id.as_object_id(), pool_id.as_object_id());
    }
}
