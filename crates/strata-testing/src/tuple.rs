//! Conformance suite for tuple stores.

use std::collections::BTreeSet;

use chrono::TimeZone;
use chrono::Utc;
use strata_filter as filter;
use strata_tuple::string_data;
use strata_tuple::DataFilter;
use strata_tuple::Field;
use strata_tuple::Filter;
use strata_tuple::Header;
use strata_tuple::Key;
use strata_tuple::KeyField;
use strata_tuple::KeyFilter;
use strata_tuple::ScanOptions;
use strata_tuple::Sorting;
use strata_tuple::Store;
use strata_tuple::TableSize;
use strata_tuple::Tuple;
use strata_tuple::TupleError;
use strata_values::SortableType;
use strata_values::SortableValue;
use strata_values::Value;
use strata_values::ValueType;

use crate::SuiteOptions;

/// Run every tuple contract check against fresh stores from `new_store`.
pub fn run_tuple_suite<S, F>(new_store: F, opts: SuiteOptions)
where
    S: Store + Send + Sync,
    F: Fn() -> S,
{
    basic(&new_store());
    typed(&new_store());
    scans(&new_store());
    updates(&new_store());
    deletes(&new_store());
    tables(&new_store());
    size(&new_store());
    descending_unsupported(&new_store());
    if !opts.no_tx {
        auto_sequential(&new_store());
        if !opts.no_locks {
            auto_concurrent(&new_store());
        }
    }
}

fn string_header(name: &str, keys: &[&str], data: &[&str]) -> Header {
    Header {
        name: name.to_string(),
        key: keys
            .iter()
            .map(|k| KeyField {
                name: k.to_string(),
                ty: SortableType::String,
                auto: false,
            })
            .collect(),
        data: data
            .iter()
            .map(|d| Field {
                name: d.to_string(),
                ty: ValueType::String,
            })
            .collect(),
    }
}

fn basic(store: &impl Store) {
    strata_tuple::update(store, |tx| {
        let mut tbl = tx.create_table(string_header("test", &["k1"], &["f1"]))?;

        let key = Key::from_strings(["a"]);
        let data = string_data(["1"]);
        let returned = tbl.insert_tuple(Tuple {
            key: key.clone(),
            data: data.clone(),
        })?;
        assert_eq!(returned, key);

        assert_eq!(tbl.get_tuple(&key)?, data);

        // Duplicate insert is rejected.
        assert!(matches!(
            tbl.insert_tuple(Tuple {
                key: key.clone(),
                data: data.clone(),
            }),
            Err(TupleError::Exists)
        ));

        let mut cursor = tbl.scan(ScanOptions::default());
        let all = strata_tuple::collect(&mut *cursor)?;
        drop(cursor);
        assert_eq!(all, vec![Tuple { key, data }]);

        // A missing tuple is NotFound; a batch marks it as None.
        let missing = Key::from_strings(["zz"]);
        assert!(matches!(tbl.get_tuple(&missing), Err(TupleError::NotFound)));
        let batch = tbl.get_tuple_batch(&[Key::from_strings(["a"]), missing])?;
        assert_eq!(batch[0].as_ref().unwrap(), &string_data(["1"]));
        assert!(batch[1].is_none());
        Ok(())
    })
    .unwrap();
}

fn typed(store: &impl Store) {
    let sortables = vec![
        SortableValue::String("foo".to_string()),
        SortableValue::Bytes(b"b\x00r".to_vec()),
        SortableValue::Int(-42),
        SortableValue::UInt(42),
        SortableValue::Bool(false),
        SortableValue::Time(Utc.timestamp_opt(123, 456).unwrap()),
    ];
    let mut payload: Vec<Value> = sortables
        .iter()
        .map(|s| s.clone().into_value())
        .collect();
    payload.push(Value::Float(-1.25));

    let header = Header {
        name: "test".to_string(),
        key: sortables
            .iter()
            .enumerate()
            .map(|(i, v)| KeyField {
                name: format!("k{}", i + 1),
                ty: v.sortable_type(),
                auto: false,
            })
            .collect(),
        data: payload
            .iter()
            .enumerate()
            .map(|(i, v)| Field {
                name: format!("p{}", i + 1),
                ty: v.value_type(),
            })
            .collect(),
    };

    let key = Key::from(sortables);
    strata_tuple::update(store, |tx| {
        let mut tbl = tx.create_table(header.clone())?;
        tbl.insert_tuple(Tuple {
            key: key.clone(),
            data: payload.clone(),
        })?;

        assert_eq!(tbl.get_tuple(&key)?, payload);

        let mut cursor = tbl.scan(ScanOptions::default());
        let all = strata_tuple::collect(&mut *cursor)?;
        drop(cursor);
        assert_eq!(
            all,
            vec![Tuple {
                key: key.clone(),
                data: payload.clone(),
            }]
        );
        Ok(())
    })
    .unwrap();
}

/// Key filters for a string-key prefix walk: complete segments become
/// equality checks, the final non-empty one a prefix check, and a trailing
/// empty part means "previous segments exactly".
fn prefix_filter(parts: &[&str]) -> Option<Filter> {
    if parts.is_empty() {
        return None;
    }
    let mut fields = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        if i == parts.len() - 1 {
            if part.is_empty() {
                break;
            }
            fields.push(filter::prefix(SortableValue::String(part.to_string())));
        } else {
            fields.push(filter::eq(Value::String(part.to_string())));
        }
    }
    Some(Filter::with_key(KeyFilter::Fields(fields)))
}

fn scans(store: &impl Store) {
    strata_tuple::update(store, |tx| {
        let mut tbl = tx.create_table(Header {
            name: "test".to_string(),
            key: string_header("test", &["k1", "k2", "k3"], &[]).key,
            data: vec![Field {
                name: "f1".to_string(),
                ty: ValueType::Int,
            }],
        })?;

        for (key, n) in [
            (["a", "a", "a"], 1i64),
            (["b", "b", "b"], 2),
            (["a", "aa", "b"], 3),
            (["a", "ba", "c"], 4),
            (["a", "a", "ab"], 5),
            (["a", "b", "c"], 6),
        ] {
            tbl.insert_tuple(Tuple {
                key: Key::from_strings(key),
                data: vec![Value::Int(n)],
            })?;
        }

        let scan = |parts: &[&str], want: &[i64]| {
            let mut cursor = tbl.scan(ScanOptions {
                filter: prefix_filter(parts),
                ..ScanOptions::default()
            });
            let mut got = Vec::new();
            while cursor.advance() {
                match cursor.data().as_slice() {
                    [Value::Int(n)] => got.push(*n),
                    other => panic!("unexpected payload: {other:?}"),
                }
            }
            assert!(cursor.err().is_none(), "scan {parts:?}: {:?}", cursor.err());
            assert_eq!(got, want, "scan {parts:?}");
        };

        scan(&[], &[1, 5, 3, 6, 4, 2]);
        scan(&[""], &[1, 5, 3, 6, 4, 2]);
        scan(&["a"], &[1, 5, 3, 6, 4]);
        scan(&["b"], &[2]);
        scan(&["a", "a"], &[1, 5, 3]);
        scan(&["a", "a", ""], &[1, 5]);
        scan(&["a", "aa"], &[3]);
        scan(&["a", "aa", ""], &[3]);
        scan(&["a", "aa", "b"], &[3]);

        // Keys-only scans yield the same keys without payloads.
        let mut cursor = tbl.scan(ScanOptions {
            keys_only: true,
            filter: prefix_filter(&["a", "a", ""]),
            ..ScanOptions::default()
        });
        let mut keys = Vec::new();
        while cursor.advance() {
            assert!(cursor.data().is_empty());
            keys.push(cursor.key().clone());
        }
        drop(cursor);
        assert_eq!(
            keys,
            vec![
                Key::from_strings(["a", "a", "a"]),
                Key::from_strings(["a", "a", "ab"]),
            ]
        );

        // Limit cuts the scan short.
        let mut cursor = tbl.scan(ScanOptions {
            limit: 2,
            ..ScanOptions::default()
        });
        let limited = strata_tuple::collect(&mut *cursor)?;
        drop(cursor);
        assert_eq!(limited.len(), 2);
        Ok(())
    })
    .unwrap();
}

fn updates(store: &impl Store) {
    strata_tuple::update(store, |tx| {
        let mut tbl = tx.create_table(string_header("test", &["k1"], &["f1"]))?;
        let key = Key::from_strings(["a"]);

        // Plain update of a missing tuple fails; upsert creates it.
        assert!(matches!(
            tbl.update_tuple(
                Tuple {
                    key: key.clone(),
                    data: string_data(["1"]),
                },
                Default::default(),
            ),
            Err(TupleError::NotFound)
        ));
        tbl.update_tuple(
            Tuple {
                key: key.clone(),
                data: string_data(["1"]),
            },
            strata_tuple::UpdateOpt { upsert: true },
        )?;
        assert_eq!(tbl.get_tuple(&key)?, string_data(["1"]));

        // Overwrite in place.
        tbl.update_tuple(
            Tuple {
                key: key.clone(),
                data: string_data(["2"]),
            },
            Default::default(),
        )?;
        assert_eq!(tbl.get_tuple(&key)?, string_data(["2"]));

        // Shape violations are validation errors.
        assert!(matches!(
            tbl.insert_tuple(Tuple {
                key: Key::from(vec![SortableValue::Int(1)]),
                data: string_data(["x"]),
            }),
            Err(TupleError::Validation { .. })
        ));
        assert!(matches!(
            tbl.insert_tuple(Tuple {
                key: Key::from_strings(["b"]),
                data: Vec::new(),
            }),
            Err(TupleError::Validation { .. })
        ));
        Ok(())
    })
    .unwrap();
}

fn deletes(store: &impl Store) {
    strata_tuple::update(store, |tx| {
        let mut tbl = tx.create_table(string_header("test", &["k1"], &["f1"]))?;
        for k in ["a", "b", "c", "d"] {
            tbl.insert_tuple(Tuple {
                key: Key::from_strings([k]),
                data: string_data([k]),
            })?;
        }

        // Direct deletion by key list.
        tbl.delete_tuples(Some(&Filter::with_key(KeyFilter::Keys(vec![
            Key::from_strings(["a"]),
            Key::from_strings(["c"]),
        ]))))?;
        assert!(matches!(
            tbl.get_tuple(&Key::from_strings(["a"])),
            Err(TupleError::NotFound)
        ));
        assert_eq!(tbl.get_tuple(&Key::from_strings(["b"]))?, string_data(["b"]));

        // Filtered deletion goes through a scan.
        tbl.delete_tuples(Some(&Filter {
            key: None,
            data: Some(DataFilter::Fields(vec![Some(filter::eq(Value::String(
                "d".to_string(),
            )))])),
        }))?;
        assert!(matches!(
            tbl.get_tuple(&Key::from_strings(["d"])),
            Err(TupleError::NotFound)
        ));

        // Delete everything.
        tbl.delete_tuples(None)?;
        let mut cursor = tbl.scan(ScanOptions::default());
        assert!(strata_tuple::collect(&mut *cursor)?.is_empty());
        Ok(())
    })
    .unwrap();
}

fn tables(store: &impl Store) {
    strata_tuple::update(store, |tx| {
        tx.create_table(string_header("one", &["k"], &[]))?;
        let mut tbl = tx.create_table(string_header("two", &["k"], &["v"]))?;
        tbl.insert_tuple(Tuple {
            key: Key::from_strings(["x"]),
            data: string_data(["y"]),
        })?;
        Ok(())
    })
    .unwrap();

    // Store-level reads see committed schemas.
    let names: Vec<String> = store
        .list_tables()
        .unwrap()
        .into_iter()
        .map(|h| h.name)
        .collect();
    assert_eq!(names, vec!["one".to_string(), "two".to_string()]);
    assert_eq!(store.table("two").unwrap().data.len(), 1);
    assert!(matches!(
        store.table("missing"),
        Err(TupleError::TableNotFound)
    ));

    // Creating a duplicate table fails.
    strata_tuple::update(store, |tx| {
        assert!(matches!(
            tx.create_table(string_header("one", &["k"], &[])),
            Err(TupleError::TableExists)
        ));
        Ok(())
    })
    .unwrap();

    // Clear keeps the table; drop removes it.
    strata_tuple::update(store, |tx| {
        let mut tbl = tx.table("two")?;
        tbl.clear()?;
        let mut cursor = tbl.scan(ScanOptions::default());
        assert!(strata_tuple::collect(&mut *cursor)?.is_empty());
        Ok(())
    })
    .unwrap();
    assert!(store.table("two").is_ok());

    strata_tuple::update(store, |tx| {
        let mut tbl = tx.table("two")?;
        tbl.drop_table()?;
        Ok(())
    })
    .unwrap();
    assert!(matches!(
        store.table("two"),
        Err(TupleError::TableNotFound)
    ));
}

fn size(store: &impl Store) {
    strata_tuple::update(store, |tx| {
        let mut tbl = tx.create_table(string_header("test", &["k1"], &[]))?;
        for k in ["a", "b", "c"] {
            tbl.insert_tuple(Tuple {
                key: Key::from_strings([k]),
                data: Vec::new(),
            })?;
        }

        assert_eq!(tbl.table_size(None, true)?, TableSize::Exact(3));
        assert_eq!(
            tbl.table_size(Some(&prefix_filter(&["a"]).unwrap()), true)?,
            TableSize::Exact(1)
        );

        // The estimate is a marked guess, not a count.
        match tbl.table_size(None, false)? {
            TableSize::WildGuess(_) => {}
            TableSize::Exact(n) => assert_eq!(n, 3),
        }
        Ok(())
    })
    .unwrap();
}

fn descending_unsupported(store: &impl Store) {
    strata_tuple::update(store, |tx| {
        let tbl = tx.create_table(string_header("test", &["k1"], &[]))?;
        let mut cursor = tbl.scan(ScanOptions {
            sort: Sorting::Desc,
            ..ScanOptions::default()
        });
        // The failure is reported at open time, before any row.
        assert!(!cursor.advance());
        match cursor.err() {
            Some(TupleError::Unsupported { .. }) => {}
            None => {} // stores with native descending support
            other => panic!("unexpected scan error: {other:?}"),
        }
        Ok(())
    })
    .unwrap();
}

fn auto_header() -> Header {
    Header {
        name: "seq".to_string(),
        key: vec![KeyField {
            name: "k1".to_string(),
            ty: SortableType::UInt,
            auto: true,
        }],
        data: vec![Field {
            name: "f1".to_string(),
            ty: ValueType::String,
        }],
    }
}

fn auto_sequential(store: &impl Store) {
    strata_tuple::update(store, |tx| {
        tx.create_table(auto_header())?;
        Ok(())
    })
    .unwrap();

    for want in 1u64..=10 {
        let key = strata_tuple::update(store, |tx| {
            let mut tbl = tx.table("seq")?;
            tbl.insert_tuple(Tuple {
                key: Key::auto(),
                data: string_data(["v"]),
            })
        })
        .unwrap();
        assert_eq!(key, Key::from(vec![SortableValue::UInt(want)]));
    }

    // An explicit key on an auto table is ignored in favor of the counter.
    let key = strata_tuple::update(store, |tx| {
        let mut tbl = tx.table("seq")?;
        tbl.insert_tuple(Tuple {
            key: Key::from(vec![SortableValue::UInt(1000)]),
            data: string_data(["v"]),
        })
    })
    .unwrap();
    assert_eq!(key, Key::from(vec![SortableValue::UInt(11)]));
}

fn auto_concurrent(store: &(impl Store + Send + Sync)) {
    strata_tuple::update(store, |tx| {
        tx.create_table(auto_header())?;
        Ok(())
    })
    .unwrap();

    const WORKERS: u64 = 8;
    let mut keys: Vec<Key> = Vec::new();
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..WORKERS)
            .map(|_| {
                scope.spawn(|| {
                    strata_tuple::update(store, |tx| {
                        let mut tbl = tx.table("seq")?;
                        tbl.insert_tuple(Tuple {
                            key: Key::auto(),
                            data: string_data(["v"]),
                        })
                    })
                    .unwrap()
                })
            })
            .collect();
        for handle in handles {
            keys.push(handle.join().unwrap());
        }
    });

    // Every worker got a distinct key in [1, WORKERS].
    let mut seen = BTreeSet::new();
    for key in keys {
        match key.get(0) {
            Some(SortableValue::UInt(n)) => {
                assert!((1..=WORKERS).contains(n), "key out of range: {n}");
                assert!(seen.insert(*n), "duplicate auto key: {n}");
            }
            other => panic!("unexpected auto key: {other:?}"),
        }
    }
    assert_eq!(seen.len(), WORKERS as usize);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_engine_passes() {
        run_tuple_suite(
            || {
                strata_tuple::kv::TupleKv::new(strata_kv::upgrade(
                    strata_kv::mem::MemKv::new(),
                ))
            },
            SuiteOptions::default(),
        );
    }
}
