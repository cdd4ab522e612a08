//! Instrumentation wrapper for hierarchical stores.
//!
//! [`Traced`] forwards every operation to an inner store while counting it
//! and emitting `tracing` events at trace level. Useful in tests to assert
//! how many reads or scan steps an operation really performed, and in
//! debugging sessions with a trace subscriber attached.
//!
//! ```
//! use strata_kv::debug::Traced;
//! use strata_kv::Key;
//!
//! let store = Traced::new(strata_kv::upgrade(strata_kv::mem::MemKv::new()));
//! strata_kv::update(&store, |tx| tx.put(&Key::from_strings(["a"]), b"1")).unwrap();
//! assert_eq!(store.stats().puts, 1);
//! ```

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::errors::KvError;
use crate::key::Key;
use crate::store::Cursor;
use crate::store::ScanOptions;
use crate::store::Store;
use crate::store::Tx;

/// A snapshot of operation counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub tx_ro: u64,
    pub tx_rw: u64,
    pub gets: u64,
    pub get_misses: u64,
    pub batch_keys: u64,
    pub puts: u64,
    pub dels: u64,
    pub scans: u64,
    pub advances: u64,
    pub commits: u64,
    pub errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    tx_ro: AtomicU64,
    tx_rw: AtomicU64,
    gets: AtomicU64,
    get_misses: AtomicU64,
    batch_keys: AtomicU64,
    puts: AtomicU64,
    dels: AtomicU64,
    scans: AtomicU64,
    advances: AtomicU64,
    commits: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn bump(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn track_err<T>(&self, res: &Result<T, KvError>) {
        if let Err(e) = res {
            if !matches!(e, KvError::NotFound) {
                self.bump(&self.errors);
            }
        }
    }
}

/// A hierarchical store that counts and traces every operation.
pub struct Traced<S> {
    inner: S,
    counters: Arc<Counters>,
}

impl<S: Store> Traced<S> {
    /// Wrap a store.
    pub fn new(inner: S) -> Traced<S> {
        Traced {
            inner,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Unwrap the inner store.
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Current operation counts.
    pub fn stats(&self) -> Stats {
        let c = &self.counters;
        Stats {
            tx_ro: c.tx_ro.load(Ordering::Relaxed),
            tx_rw: c.tx_rw.load(Ordering::Relaxed),
            gets: c.gets.load(Ordering::Relaxed),
            get_misses: c.get_misses.load(Ordering::Relaxed),
            batch_keys: c.batch_keys.load(Ordering::Relaxed),
            puts: c.puts.load(Ordering::Relaxed),
            dels: c.dels.load(Ordering::Relaxed),
            scans: c.scans.load(Ordering::Relaxed),
            advances: c.advances.load(Ordering::Relaxed),
            commits: c.commits.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
        }
    }
}

impl<S: Store> Store for Traced<S> {
    fn tx(&self, rw: bool) -> Result<Box<dyn Tx + '_>, KvError> {
        let res = self.inner.tx(rw);
        self.counters.track_err(&res);
        let tx = res?;
        if rw {
            self.counters.bump(&self.counters.tx_rw);
        } else {
            self.counters.bump(&self.counters.tx_ro);
        }
        Ok(Box::new(TracedTx {
            tx,
            counters: self.counters.clone(),
        }))
    }
}

struct TracedTx<'a> {
    tx: Box<dyn Tx + 'a>,
    counters: Arc<Counters>,
}

impl Tx for TracedTx<'_> {
    fn get(&self, key: &Key) -> Result<Vec<u8>, KvError> {
        let res = self.tx.get(key);
        self.counters.bump(&self.counters.gets);
        match &res {
            Err(KvError::NotFound) => self.counters.bump(&self.counters.get_misses),
            other => self.counters.track_err(other),
        }
        tracing::trace!(%key, ok = res.is_ok(), "get");
        res
    }

    fn get_batch(&self, keys: &[Key]) -> Result<Vec<Option<Vec<u8>>>, KvError> {
        let res = self.tx.get_batch(keys);
        self.counters
            .batch_keys
            .fetch_add(keys.len() as u64, Ordering::Relaxed);
        self.counters.track_err(&res);
        if let Ok(vals) = &res {
            let misses = vals.iter().filter(|v| v.is_none()).count() as u64;
            self.counters
                .get_misses
                .fetch_add(misses, Ordering::Relaxed);
        }
        tracing::trace!(keys = keys.len(), ok = res.is_ok(), "get batch");
        res
    }

    fn put(&mut self, key: &Key, value: &[u8]) -> Result<(), KvError> {
        let res = self.tx.put(key, value);
        self.counters.bump(&self.counters.puts);
        self.counters.track_err(&res);
        tracing::trace!(%key, len = value.len(), ok = res.is_ok(), "put");
        res
    }

    fn del(&mut self, key: &Key) -> Result<(), KvError> {
        let res = self.tx.del(key);
        self.counters.bump(&self.counters.dels);
        self.counters.track_err(&res);
        tracing::trace!(%key, ok = res.is_ok(), "del");
        res
    }

    fn scan<'a>(&'a self, opts: ScanOptions) -> Box<dyn Cursor + 'a> {
        self.counters.bump(&self.counters.scans);
        match &opts.prefix {
            Some(prefix) => tracing::trace!(%prefix, "scan"),
            None => tracing::trace!("scan"),
        }
        Box::new(TracedCursor {
            inner: self.tx.scan(opts),
            counters: self.counters.clone(),
        })
    }

    fn commit(self: Box<Self>) -> Result<(), KvError> {
        let res = self.tx.commit();
        self.counters.bump(&self.counters.commits);
        self.counters.track_err(&res);
        tracing::trace!(ok = res.is_ok(), "commit");
        res
    }
}

struct TracedCursor<'a> {
    inner: Box<dyn Cursor + 'a>,
    counters: Arc<Counters>,
}

impl Cursor for TracedCursor<'_> {
    fn advance(&mut self) -> bool {
        let more = self.inner.advance();
        if more {
            self.counters.bump(&self.counters.advances);
        }
        more
    }

    fn key(&self) -> &Key {
        self.inner.key()
    }

    fn val(&self) -> &[u8] {
        self.inner.val()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn err(&self) -> Option<&KvError> {
        self.inner.err()
    }
}
