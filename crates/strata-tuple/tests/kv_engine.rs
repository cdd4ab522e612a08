//! The tuple-over-KV engine against the shared conformance suites.

use strata_testing::run_kv_suite;
use strata_testing::run_tuple_suite;
use strata_testing::SuiteOptions;

fn new_store() -> strata_tuple::kv::TupleKv<strata_kv::Upgraded<strata_kv::mem::MemKv>> {
    strata_tuple::kv::TupleKv::new(strata_kv::upgrade(strata_kv::mem::MemKv::new()))
}

#[test]
fn tuple_engine_conformance() {
    run_tuple_suite(new_store, SuiteOptions::default());
}

#[test]
fn underlying_kv_conformance_through_upgrade() {
    // The engine builds on the same KV contract the memory driver passes;
    // re-run the KV suite on the exact composition the engine uses.
    run_kv_suite(
        || strata_kv::upgrade(strata_kv::mem::MemKv::new()),
        SuiteOptions::default(),
    );
}
