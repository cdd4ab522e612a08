//! Conformance suites shared by every strata backend.
//!
//! The same behavioral contract applies to each driver, so the tests are
//! written once against the layer traits and every backend's integration
//! tests invoke them with a store factory:
//!
//! ```
//! use strata_testing::{run_kv_suite, SuiteOptions};
//!
//! run_kv_suite(
//!     || strata_kv::upgrade(strata_kv::mem::MemKv::new()),
//!     SuiteOptions::default(),
//! );
//! ```
//!
//! Each call to the factory must produce a fresh, empty store.

mod kv;
mod tuple;

pub use kv::run_kv_suite;
pub use tuple::run_tuple_suite;

/// Capability flags for a backend under test.
///
/// Suites skip the checks a backend declares itself unable to satisfy.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuiteOptions {
    /// The store is not safe for concurrent writers; concurrency checks
    /// are skipped.
    pub no_locks: bool,
    /// The store has no real transactions; conflict-dependent checks
    /// (including auto-increment keys) are skipped.
    pub no_tx: bool,
}
