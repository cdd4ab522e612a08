//! Exposing a flat store through the hierarchical API.
//!
//! Keys are serialized with the [escape codec](crate::escape) on the way
//! down and recovered on the way back up. A hierarchical scan prefix is
//! escaped into a flat byte prefix before delegation, which yields exactly
//! the hierarchical prefix semantics: complete leading segments match
//! whole segments, the final one matches by byte prefix.

use crate::errors::KvError;
use crate::escape::escape;
use crate::escape::unescape;
use crate::flat;
use crate::flat::FlatCursor;
use crate::flat::FlatStore;
use crate::flat::FlatTx;
use crate::key::Key;
use crate::store::Cursor;
use crate::store::ScanOptions;
use crate::store::Store;
use crate::store::Tx;

/// Upgrade a flat store to a hierarchical one.
pub fn upgrade<S: FlatStore>(flat: S) -> Upgraded<S> {
    Upgraded { flat }
}

/// A flat store wearing the hierarchical API. See [`upgrade`].
pub struct Upgraded<S> {
    flat: S,
}

impl<S> Upgraded<S> {
    /// Unwrap the flat store.
    pub fn into_inner(self) -> S {
        self.flat
    }
}

impl<S: FlatStore> Store for Upgraded<S> {
    fn tx(&self, rw: bool) -> Result<Box<dyn Tx + '_>, KvError> {
        Ok(Box::new(UpgradedTx {
            tx: self.flat.tx(rw)?,
        }))
    }
}

struct UpgradedTx<'a> {
    tx: Box<dyn FlatTx + 'a>,
}

impl Tx for UpgradedTx<'_> {
    fn get(&self, key: &Key) -> Result<Vec<u8>, KvError> {
        self.tx.get(&escape(key))
    }

    fn get_batch(&self, keys: &[Key]) -> Result<Vec<Option<Vec<u8>>>, KvError> {
        let flat_keys: Vec<Vec<u8>> = keys.iter().map(escape).collect();
        let borrowed: Vec<&[u8]> = flat_keys.iter().map(Vec::as_slice).collect();
        self.tx.get_batch(&borrowed)
    }

    fn put(&mut self, key: &Key, value: &[u8]) -> Result<(), KvError> {
        self.tx.put(&escape(key), value)
    }

    fn del(&mut self, key: &Key) -> Result<(), KvError> {
        self.tx.del(&escape(key))
    }

    fn scan<'a>(&'a self, opts: ScanOptions) -> Box<dyn Cursor + 'a> {
        let flat_opts = match &opts.prefix {
            Some(prefix) if !prefix.is_empty() => flat::ScanOptions::with_prefix(escape(prefix)),
            _ => flat::ScanOptions::all(),
        };
        Box::new(UpgradedCursor {
            inner: self.tx.scan(flat_opts),
            key: Key::new(),
        })
    }

    fn commit(self: Box<Self>) -> Result<(), KvError> {
        self.tx.commit()
    }
}

struct UpgradedCursor<'a> {
    inner: Box<dyn FlatCursor + 'a>,
    key: Key,
}

impl Cursor for UpgradedCursor<'_> {
    fn advance(&mut self) -> bool {
        if self.inner.advance() {
            self.key = unescape(self.inner.key());
            true
        } else {
            self.key = Key::new();
            false
        }
    }

    fn key(&self) -> &Key {
        &self.key
    }

    fn val(&self) -> &[u8] {
        self.inner.val()
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.key = Key::new();
    }

    fn err(&self) -> Option<&KvError> {
        self.inner.err()
    }
}
