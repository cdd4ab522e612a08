//! Error taxonomy of the tuple layer.

use snafu::Snafu;
use strata_kv::KvError;
use strata_values::ValueError;

/// Errors returned by tuple stores.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum TupleError {
    /// The tuple does not exist.
    #[snafu(display("tuple: not found"))]
    NotFound,

    /// A tuple with this key already exists.
    #[snafu(display("tuple: this key already exists"))]
    Exists,

    /// The named table does not exist.
    #[snafu(display("tuple: table not found"))]
    TableNotFound,

    /// A table with this name already exists.
    #[snafu(display("tuple: table already exists"))]
    TableExists,

    /// A write was attempted on a read-only transaction.
    #[snafu(display("tuple: read only"))]
    ReadOnly,

    /// The transaction lost an optimistic-concurrency race; retried
    /// automatically by [`update`](crate::update).
    #[snafu(display("tuple: conflict, transaction must be retried"))]
    Conflict,

    /// A header, key, or payload does not match the schema.
    #[snafu(display("tuple: validation failed: {reason}"))]
    Validation { reason: String },

    /// The operation is not supported by this store.
    #[snafu(display("tuple: unsupported: {what}"))]
    Unsupported { what: String },

    /// A stored value failed to decode against the schema.
    #[snafu(display("tuple: cannot decode stored value: {source}"))]
    Decode { source: ValueError },

    /// An error from the underlying key-value store.
    #[snafu(display("tuple: {source}"))]
    Kv { source: KvError },
}

impl TupleError {
    pub(crate) fn validation(reason: impl Into<String>) -> TupleError {
        TupleError::Validation {
            reason: reason.into(),
        }
    }
}

/// Translate an error from the underlying KV store, preserving the shared
/// kinds and wrapping everything else.
pub(crate) fn from_kv(err: KvError) -> TupleError {
    match err {
        KvError::NotFound => TupleError::NotFound,
        KvError::ReadOnly => TupleError::ReadOnly,
        KvError::Conflict => TupleError::Conflict,
        other => TupleError::Kv { source: other },
    }
}
