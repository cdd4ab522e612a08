//! Error taxonomy shared by the flat and hierarchical layers.
//!
//! Engine-specific failures must be translated into these variants at the
//! driver boundary; no error strings participate in any contract.

use snafu::Snafu;

/// Errors returned by key-value stores at every layer.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum KvError {
    /// The key does not exist.
    #[snafu(display("kv: not found"))]
    NotFound,

    /// A write was attempted on a read-only transaction.
    #[snafu(display("kv: read only"))]
    ReadOnly,

    /// The transaction lost an optimistic-concurrency race and must be
    /// retried from the start. [`update`](crate::flat::update) does this
    /// automatically.
    #[snafu(display("kv: conflict, transaction must be retried"))]
    Conflict,

    /// An in-memory driver was opened with a path.
    #[snafu(display("kv: database is in-memory"))]
    Volatile,

    /// A driver-specific failure, translated at the boundary.
    #[snafu(display("kv: backend error: {message}"))]
    Backend { message: String },
}

impl KvError {
    /// Translate an arbitrary engine error into the backend variant.
    pub fn backend(err: impl std::fmt::Display) -> KvError {
        KvError::Backend {
            message: err.to_string(),
        }
    }
}
