//! In-memory B-tree reference driver.
//!
//! The `btree` driver keeps everything in a `BTreeMap` behind a mutex and
//! gives every transaction a snapshot of the tree plus a private write
//! overlay. Commit is optimistic: the store carries a version stamp, and a
//! read-write transaction whose base version is stale fails with
//! [`KvError::Conflict`] so that [`flat::update`](crate::flat::update) can
//! retry it. That makes this driver suitable for exercising the full
//! transaction contract, including concurrent counter increments and
//! auto-increment keys.
//!
//! Registered as `btree` (local, volatile); opening it with a path fails
//! with [`KvError::Volatile`].

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use strata_core::DriverInfo;

use crate::errors::KvError;
use crate::flat::FlatCursor;
use crate::flat::FlatStore;
use crate::flat::FlatTx;
use crate::flat::ScanOptions;
use crate::flat::SeekCursor;
use crate::registry;
use crate::registry::FlatRegistration;

/// Registry name of this driver.
pub const NAME: &str = "btree";

type Tree = BTreeMap<Vec<u8>, Vec<u8>>;

/// A flat in-memory key-value store.
///
/// Cloning produces another handle to the same tree.
#[derive(Debug, Default, Clone)]
pub struct MemKv {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    map: Tree,
    /// Bumped on every committed write set; transactions compare against it
    /// to detect races.
    version: u64,
}

impl MemKv {
    /// Create an empty store.
    pub fn new() -> MemKv {
        MemKv::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // The tree holds plain data; a poisoned lock cannot leave it in a
        // torn state.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Register the driver in the flat registry (and, through the automatic
/// upgrade, as `flat.btree` in the hierarchical registry).
///
/// Panics if a driver named `btree` is already registered.
pub fn register() {
    registry::register_flat(FlatRegistration {
        info: DriverInfo {
            name: NAME.to_string(),
            title: "B-Tree".to_string(),
            local: true,
            volatile: true,
        },
        open: Arc::new(|path| {
            if path.is_some() {
                return Err(KvError::Volatile);
            }
            Ok(Box::new(MemKv::new()))
        }),
    });
}

impl FlatStore for MemKv {
    fn tx(&self, rw: bool) -> Result<Box<dyn FlatTx + '_>, KvError> {
        let inner = self.lock();
        Ok(Box::new(MemTx {
            store: self,
            snapshot: inner.map.clone(),
            base_version: inner.version,
            writes: BTreeMap::new(),
            rw,
        }))
    }
}

/// A snapshot transaction over [`MemKv`].
pub struct MemTx<'a> {
    store: &'a MemKv,
    snapshot: Tree,
    base_version: u64,
    /// Buffered writes; `None` marks a deletion.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    rw: bool,
}

impl FlatTx for MemTx<'_> {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>, KvError> {
        if let Some(write) = self.writes.get(key) {
            return match write {
                Some(v) => Ok(v.clone()),
                None => Err(KvError::NotFound),
            };
        }
        self.snapshot.get(key).cloned().ok_or(KvError::NotFound)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        if !self.rw {
            return Err(KvError::ReadOnly);
        }
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn del(&mut self, key: &[u8]) -> Result<(), KvError> {
        if !self.rw {
            return Err(KvError::ReadOnly);
        }
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    fn scan<'a>(&'a self, opts: ScanOptions) -> Box<dyn FlatCursor + 'a> {
        let prefix = opts.prefix.unwrap_or_default();
        Box::new(MemCursor {
            pairs: self.merged_pairs(&prefix),
            pos: None,
        })
    }

    fn commit(self: Box<Self>) -> Result<(), KvError> {
        if !self.rw || self.writes.is_empty() {
            return Ok(());
        }
        let mut inner = self.store.lock();
        if inner.version != self.base_version {
            return Err(KvError::Conflict);
        }
        for (key, write) in self.writes {
            match write {
                Some(value) => {
                    inner.map.insert(key, value);
                }
                None => {
                    inner.map.remove(&key);
                }
            }
        }
        inner.version += 1;
        Ok(())
    }
}

impl MemTx<'_> {
    /// Merge the snapshot with the write overlay under a prefix, in key
    /// order. Materialized up front; the reference driver favors simplicity
    /// over large-scan performance.
    fn merged_pairs<'a>(&'a self, prefix: &[u8]) -> Vec<(&'a [u8], &'a [u8])> {
        let range = (Bound::Included(prefix.to_vec()), Bound::Unbounded);
        let mut base = self
            .snapshot
            .range::<Vec<u8>, _>(range.clone())
            .take_while(|(k, _)| k.starts_with(prefix))
            .peekable();
        let mut overlay = self
            .writes
            .range::<Vec<u8>, _>(range)
            .take_while(|(k, _)| k.starts_with(prefix))
            .peekable();

        let mut out: Vec<(&[u8], &[u8])> = Vec::new();
        loop {
            match (base.peek(), overlay.peek()) {
                (Some((bk, _)), Some((ok, _))) => {
                    if bk < ok {
                        let (k, v) = base.next().expect("peeked");
                        out.push((k.as_slice(), v.as_slice()));
                    } else {
                        if bk == ok {
                            base.next();
                        }
                        let (k, w) = overlay.next().expect("peeked");
                        if let Some(v) = w {
                            out.push((k.as_slice(), v.as_slice()));
                        }
                    }
                }
                (Some(_), None) => {
                    let (k, v) = base.next().expect("peeked");
                    out.push((k.as_slice(), v.as_slice()));
                }
                (None, Some(_)) => {
                    let (k, w) = overlay.next().expect("peeked");
                    if let Some(v) = w {
                        out.push((k.as_slice(), v.as_slice()));
                    }
                }
                (None, None) => break,
            }
        }
        out
    }
}

/// Cursor over a materialized, ordered pair list.
struct MemCursor<'a> {
    pairs: Vec<(&'a [u8], &'a [u8])>,
    /// `None` before the first advance; `pairs.len()` after the end.
    pos: Option<usize>,
}

impl MemCursor<'_> {
    fn current(&self) -> Option<(&[u8], &[u8])> {
        match self.pos {
            Some(p) if p < self.pairs.len() => Some(self.pairs[p]),
            _ => None,
        }
    }
}

impl FlatCursor for MemCursor<'_> {
    fn advance(&mut self) -> bool {
        let next = self.pos.map_or(0, |p| p.saturating_add(1));
        self.pos = Some(next.min(self.pairs.len()));
        next < self.pairs.len()
    }

    fn key(&self) -> &[u8] {
        self.current().map_or(&[], |(k, _)| k)
    }

    fn val(&self) -> &[u8] {
        self.current().map_or(&[], |(_, v)| v)
    }

    fn reset(&mut self) {
        self.pos = None;
    }

    fn err(&self) -> Option<&KvError> {
        None
    }
}

impl SeekCursor for MemCursor<'_> {
    fn seek(&mut self, key: &[u8]) -> bool {
        let idx = self.pairs.partition_point(|(k, _)| *k < key);
        self.pos = Some(idx);
        idx < self.pairs.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::flat;

    use super::*;

    fn put(tx: &mut dyn FlatTx, key: &[u8], val: &[u8]) {
        tx.put(key, val).unwrap();
    }

    #[test]
    fn put_get_del_within_tx() {
        let db = MemKv::new();
        let mut tx = db.tx(true).unwrap();

        assert!(matches!(tx.get(b"a"), Err(KvError::NotFound)));
        put(&mut *tx, b"a", b"1");
        assert_eq!(tx.get(b"a").unwrap(), b"1");

        tx.del(b"a").unwrap();
        assert!(matches!(tx.get(b"a"), Err(KvError::NotFound)));
    }

    #[test]
    fn commit_makes_writes_visible() {
        let db = MemKv::new();
        let mut tx = db.tx(true).unwrap();
        put(&mut *tx, b"a", b"1");
        tx.commit().unwrap();

        let tx = db.tx(false).unwrap();
        assert_eq!(tx.get(b"a").unwrap(), b"1");
    }

    #[test]
    fn drop_rolls_back() {
        let db = MemKv::new();
        {
            let mut tx = db.tx(true).unwrap();
            put(&mut *tx, b"a", b"1");
        }
        let tx = db.tx(false).unwrap();
        assert!(matches!(tx.get(b"a"), Err(KvError::NotFound)));
    }

    #[test]
    fn read_only_rejects_writes() {
        let db = MemKv::new();
        let mut tx = db.tx(false).unwrap();
        assert!(matches!(tx.put(b"a", b"1"), Err(KvError::ReadOnly)));
        assert!(matches!(tx.del(b"a"), Err(KvError::ReadOnly)));
    }

    #[test]
    fn snapshot_isolation() {
        let db = MemKv::new();
        flat::update(&db, |tx| tx.put(b"a", b"1")).unwrap();

        let reader = db.tx(false).unwrap();
        flat::update(&db, |tx| tx.put(b"a", b"2")).unwrap();

        // The earlier snapshot still sees the old value.
        assert_eq!(reader.get(b"a").unwrap(), b"1");
        drop(reader);
        flat::view(&db, |tx| {
            assert_eq!(tx.get(b"a").unwrap(), b"2");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn stale_commit_conflicts() {
        let db = MemKv::new();
        let mut tx1 = db.tx(true).unwrap();
        let mut tx2 = db.tx(true).unwrap();
        put(&mut *tx1, b"a", b"1");
        put(&mut *tx2, b"a", b"2");
        tx1.commit().unwrap();
        assert!(matches!(tx2.commit(), Err(KvError::Conflict)));
    }

    #[test]
    fn scan_is_ordered_and_read_your_writes() {
        let db = MemKv::new();
        flat::update(&db, |tx| {
            tx.put(b"b", b"2")?;
            tx.put(b"d", b"4")
        })
        .unwrap();

        let mut tx = db.tx(true).unwrap();
        put(&mut *tx, b"a", b"1");
        put(&mut *tx, b"c", b"3");
        tx.del(b"d").unwrap();

        let mut cursor = tx.scan(ScanOptions::all());
        let pairs = flat::collect(&mut *cursor).unwrap();
        let keys: Vec<_> = pairs.iter().map(|p| p.key.clone()).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn scan_with_prefix() {
        let db = MemKv::new();
        flat::update(&db, |tx| {
            for key in [&b"a"[..], b"ba", b"bb", b"c"] {
                tx.put(key, b"v")?;
            }
            Ok(())
        })
        .unwrap();

        let tx = db.tx(false).unwrap();
        let mut cursor = tx.scan(ScanOptions::with_prefix(b"b".to_vec()));
        let pairs = flat::collect(&mut *cursor).unwrap();
        let keys: Vec<_> = pairs.iter().map(|p| p.key.clone()).collect();
        assert_eq!(keys, vec![b"ba".to_vec(), b"bb".to_vec()]);
    }

    #[test]
    fn cursor_reset_and_seek() {
        let db = MemKv::new();
        flat::update(&db, |tx| {
            for key in [&b"a"[..], b"b", b"c"] {
                tx.put(key, b"v")?;
            }
            Ok(())
        })
        .unwrap();

        let tx = db.tx(false).unwrap();
        let mut cursor = tx.scan(ScanOptions::all());
        assert!(cursor.advance());
        assert_eq!(cursor.key(), b"a");
        cursor.reset();
        assert!(cursor.advance());
        assert_eq!(cursor.key(), b"a");

        // Generic seek over the boxed cursor.
        assert!(flat::seek(&mut *cursor, b"b"));
        assert_eq!(cursor.key(), b"b");
        assert!(!flat::seek(&mut *cursor, b"z"));
    }

    #[test]
    fn concurrent_updates_serialize() {
        let db = MemKv::new();
        flat::update(&db, |tx| tx.put(b"n", b"0")).unwrap();

        const WORKERS: usize = 8;
        std::thread::scope(|scope| {
            for _ in 0..WORKERS {
                scope.spawn(|| {
                    flat::update(&db, |tx| {
                        let raw = tx.get(b"n")?;
                        let n: u64 = std::str::from_utf8(&raw)
                            .map_err(KvError::backend)?
                            .parse()
                            .map_err(KvError::backend)?;
                        tx.put(b"n", (n + 1).to_string().as_bytes())
                    })
                    .unwrap();
                });
            }
        });

        flat::view(&db, |tx| {
            assert_eq!(tx.get(b"n").unwrap(), WORKERS.to_string().as_bytes());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn open_with_path_is_volatile_error() {
        // Exercise the opener the registry uses without going through the
        // global registry (tests share one process).
        let open = |path: Option<&std::path::Path>| -> Result<MemKv, KvError> {
            if path.is_some() {
                return Err(KvError::Volatile);
            }
            Ok(MemKv::new())
        };
        assert!(matches!(
            open(Some(std::path::Path::new("/tmp/db"))),
            Err(KvError::Volatile)
        ));
        assert!(open(None).is_ok());
    }
}
