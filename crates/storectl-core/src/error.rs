//! Error taxonomy for the catalog core.
//!
//! Every leaf error carries a `stack: Vec<String>` of contextual detail
//! strings, appended as the error crosses call-site boundaries - the same
//! shape the reference catalog crate's `impl_error_stack_methods!` gives its
//! errors, minus the HTTP-response conversion that crate layers on top
//! (there is no HTTP surface here).

/// Implements `append_detail`/`append_detail_mut` (builder-style and
/// in-place) for a struct with a `stack: Vec<String>` field.
macro_rules! impl_error_stack_methods {
    ($error_type:ty) => {
        impl $error_type {
            #[must_use]
            pub fn append_details(mut self, details: impl IntoIterator<Item = String>) -> Self {
                self.stack.extend(details);
                self
            }

            #[must_use]
            pub fn append_detail(mut self, detail: impl Into<String>) -> Self {
                self.stack.push(detail.into());
                self
            }

            pub fn append_detail_mut(&mut self, detail: impl Into<String>) {
                self.stack.push(detail.into());
            }
        }
    };
}

macro_rules! define_stacked_error {
    ($(#[$meta:meta])* $vis:vis struct $name:ident { $($field_vis:vis $field:ident : $ty:ty),* $(,)? }, $msg:literal) => {
        $(#[$meta])*
        #[derive(thiserror::Error, Debug)]
        #[error($msg)]
        $vis struct $name {
            $($field_vis $field: $ty,)*
            pub stack: Vec<String>,
        }

        impl_error_stack_methods!($name);
    };
}

pub(crate) use impl_error_stack_methods;

/// Schema validation failed for a document being inserted or read.
define_stacked_error!(
    #[derive(Clone, PartialEq, Eq)]
    pub struct ValidationError {
        pub collection: String,
        pub details: Vec<String>,
    },
    "validation failed for collection `{collection}`: {details:?}"
);

/// A uniqueness or reference-integrity check failed before any write was issued.
define_stacked_error!(
    #[derive(Clone, PartialEq, Eq)]
    pub struct ConflictError {
        pub collection: String,
        pub index: String,
    },
    "conflict in collection `{collection}` on index `{index}`"
);

/// The document store could not be queried while building a fresh snapshot.
define_stacked_error!(
    pub struct LoadError {
        pub source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
    "failed to load catalog from the document store: {source}"
);

/// A bulk write to the document store failed after passing local validation.
define_stacked_error!(
    pub struct StoreWriteError {
        pub collection: String,
        pub source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
    "bulk write to collection `{collection}` failed: {source}"
);

/// Unifying error type for callers that don't need to match on a specific kind.
#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    StoreWrite(#[from] StoreWriteError),
}
