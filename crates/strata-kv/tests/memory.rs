//! The in-memory driver against the shared KV conformance suite.

use strata_testing::run_kv_suite;
use strata_testing::SuiteOptions;

#[test]
fn memory_driver_conformance() {
    run_kv_suite(
        || strata_kv::upgrade(strata_kv::mem::MemKv::new()),
        SuiteOptions::default(),
    );
}
