#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::large_enum_variant,
    clippy::missing_errors_doc
)]
#![forbid(unsafe_code)]

mod config;
pub mod error;
pub mod ids;

pub mod document;
pub mod model;
pub mod schema;
pub mod snapshot;
pub mod store;

pub mod manager;

pub mod allocator;
pub mod placement;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use config::{AppConfig, CONFIG};
pub use error::CatalogError;
pub use tokio_util::sync::CancellationToken;

pub(crate) type XXHashSet<T> = std::collections::HashSet<T, xxhash_rust::xxh3::Xxh3Builder>;
pub(crate) type XXHashMap<K, V> = std::collections::HashMap<K, V, xxhash_rust::xxh3::Xxh3Builder>;
