//! Conformance suite for hierarchical key-value stores.

use strata_kv::Cursor;
use strata_kv::Key;
use strata_kv::KvError;
use strata_kv::Pair;
use strata_kv::ScanOptions;
use strata_kv::Store;
use strata_kv::Tx;

use crate::SuiteOptions;

/// Run every KV contract check against fresh stores from `new_store`.
pub fn run_kv_suite<S, F>(new_store: F, opts: SuiteOptions)
where
    S: Store + Send + Sync,
    F: Fn() -> S,
{
    basic(&new_store());
    scan_prefixes(&new_store());
    read_only(&new_store());
    seek(&new_store());
    if !opts.no_locks && !opts.no_tx {
        increment(&new_store());
    }
}

fn test_keys() -> Vec<Key> {
    vec![
        Key::from_strings(["a"]),
        Key::from_strings(["b", "a"]),
        Key::from_strings(["b", "a1"]),
        Key::from_strings(["b", "a2"]),
        Key::from_strings(["b", "b"]),
        Key::from_strings(["c"]),
    ]
}

fn fill(store: &impl Store) -> Vec<Pair> {
    let keys = test_keys();
    let mut all = Vec::new();
    for (i, key) in keys.iter().enumerate() {
        let value = i.to_string().into_bytes();
        strata_kv::update(store, |tx| tx.put(key, &value)).unwrap();
        all.push(Pair {
            key: key.clone(),
            value,
        });
    }
    all
}

fn expect_scan(tx: &dyn Tx, opts: ScanOptions, want: &[Pair]) {
    let mut cursor = tx.scan(opts);
    let got = strata_kv::collect(&mut *cursor).unwrap();
    assert_eq!(got, want);
}

fn expect_rest(cursor: &mut (impl Cursor + ?Sized), want: &[Pair]) {
    let mut got = Vec::new();
    while cursor.advance() {
        got.push(Pair {
            key: cursor.key().clone(),
            value: cursor.val().to_vec(),
        });
    }
    assert!(cursor.err().is_none());
    assert_eq!(got, want);
}

fn basic(store: &impl Store) {
    let keys = test_keys();

    strata_kv::view(store, |tx| {
        for key in &keys {
            assert!(matches!(tx.get(key), Err(KvError::NotFound)));
        }
        Ok(())
    })
    .unwrap();

    let all = fill(store);

    strata_kv::view(store, |tx| {
        for pair in &all {
            assert_eq!(tx.get(&pair.key).unwrap(), pair.value);
        }

        // Batch get: every key plus one miss.
        let mut batch_keys = keys.clone();
        batch_keys.push(Key::from_strings(["missing"]));
        let got = tx.get_batch(&batch_keys).unwrap();
        assert_eq!(got.len(), keys.len() + 1);
        for (i, pair) in all.iter().enumerate() {
            assert_eq!(got[i].as_deref(), Some(pair.value.as_slice()));
        }
        assert_eq!(got[keys.len()], None);
        Ok(())
    })
    .unwrap();

    for key in &keys {
        strata_kv::update(store, |tx| tx.del(key)).unwrap();
    }
    strata_kv::view(store, |tx| {
        for key in &keys {
            assert!(matches!(tx.get(key), Err(KvError::NotFound)));
        }
        Ok(())
    })
    .unwrap();
}

fn scan_prefixes(store: &impl Store) {
    let all = fill(store);

    strata_kv::view(store, |tx| {
        // Full scan in ascending order, twice through a reset.
        let mut cursor = tx.scan(ScanOptions::all());
        expect_rest(&mut *cursor, &all);
        cursor.reset();
        expect_rest(&mut *cursor, &all);
        drop(cursor);

        // Whole-key prefixes at both ends.
        expect_scan(
            tx,
            ScanOptions::with_prefix(Key::from_strings(["a"])),
            &all[..1],
        );
        expect_scan(
            tx,
            ScanOptions::with_prefix(Key::from_strings(["c"])),
            &all[5..],
        );

        // One complete segment: everything under "b".
        expect_scan(
            tx,
            ScanOptions::with_prefix(Key::from_strings(["b"])),
            &all[1..5],
        );

        // Partial final segment: ["b", "a"] covers "a", "a1", "a2".
        expect_scan(
            tx,
            ScanOptions::with_prefix(Key::from_strings(["b", "a"])),
            &all[1..4],
        );

        // A prefix matching nothing.
        expect_scan(
            tx,
            ScanOptions::with_prefix(Key::from_strings(["z"])),
            &[],
        );
        Ok(())
    })
    .unwrap();
}

fn read_only(store: &impl Store) {
    let key = Key::from_strings(["a"]);
    let missing = Key::from_strings(["b"]);
    strata_kv::update(store, |tx| tx.put(&key, b"v")).unwrap();

    let mut tx = store.tx(false).unwrap();
    assert!(matches!(tx.put(&key, b"v"), Err(KvError::ReadOnly)));
    assert!(matches!(tx.put(&missing, b"v"), Err(KvError::ReadOnly)));
    assert!(matches!(tx.del(&key), Err(KvError::ReadOnly)));
    assert!(matches!(tx.del(&missing), Err(KvError::ReadOnly)));

    // Reads still work on the same transaction.
    assert_eq!(tx.get(&key).unwrap(), b"v");
}

fn seek(store: &impl Store) {
    let all = fill(store);

    let tx = store.tx(false).unwrap();
    let mut cursor = tx.scan(ScanOptions::all());

    // Reset support is the basis for the generic seek.
    expect_rest(&mut *cursor, &all);
    cursor.reset();
    expect_rest(&mut *cursor, &all);

    // Seek to every key; the cursor lands on it and the remainder follows.
    for (i, pair) in all.iter().enumerate() {
        assert!(strata_kv::seek(&mut *cursor, &pair.key));
        assert_eq!(cursor.key(), &pair.key);
        assert_eq!(cursor.val(), pair.value);
        expect_rest(&mut *cursor, &all[i + 1..]);
    }

    // Forward then backward jumps at offsets 1 and 2.
    for off in [1usize, 2] {
        for i in 0..all.len().saturating_sub(off) {
            assert!(strata_kv::seek(&mut *cursor, &all[i].key));
            assert!(strata_kv::seek(&mut *cursor, &all[i + off].key));
            assert_eq!(cursor.key(), &all[i + off].key);
            expect_rest(&mut *cursor, &all[i + off + 1..]);
        }
        for i in off..all.len() {
            assert!(strata_kv::seek(&mut *cursor, &all[i].key));
            assert!(strata_kv::seek(&mut *cursor, &all[i - off].key));
            assert_eq!(cursor.key(), &all[i - off].key);
            expect_rest(&mut *cursor, &all[i - off + 1..]);
        }
    }

    // A key between entries lands on the next one; past the end fails.
    assert!(strata_kv::seek(&mut *cursor, &Key::from_strings(["b", "a11"])));
    assert_eq!(cursor.key(), &all[3].key);
    assert!(!strata_kv::seek(&mut *cursor, &Key::from_strings(["zz"])));

    cursor.reset();
    expect_rest(&mut *cursor, &all);
}

fn increment(store: &(impl Store + Send + Sync)) {
    let key = Key::from_strings(["a"]);
    strata_kv::update(store, |tx| tx.put(&key, b"0")).unwrap();

    const WORKERS: usize = 10;
    std::thread::scope(|scope| {
        for _ in 0..WORKERS {
            scope.spawn(|| {
                strata_kv::update(store, |tx| {
                    let raw = tx.get(&key)?;
                    let n: u64 = std::str::from_utf8(&raw)
                        .map_err(KvError::backend)?
                        .parse()
                        .map_err(KvError::backend)?;
                    tx.put(&key, (n + 1).to_string().as_bytes())
                })
                .unwrap();
            });
        }
    });

    strata_kv::view(store, |tx| {
        assert_eq!(tx.get(&key).unwrap(), WORKERS.to_string().into_bytes());
        Ok(())
    })
    .unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_driver_passes() {
        run_kv_suite(
            || strata_kv::upgrade(strata_kv::mem::MemKv::new()),
            SuiteOptions::default(),
        );
    }
}
