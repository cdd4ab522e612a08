//! Hierarchical key-value stores.
//!
//! The same contract as the flat layer with [`Key`] segments instead of
//! byte strings; see [`crate::flat`] for the transaction and cursor
//! lifecycle rules. Most implementations are flat stores wearing the
//! [`upgrade`](crate::upgrade) adapter.

use crate::errors::KvError;
use crate::key::Key;
use crate::key::Pair;

/// Options for [`Tx::scan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct ScanOptions {
    /// Restrict iteration to keys with this prefix. All but the last
    /// prefix segment must match exactly; the last matches by byte prefix
    /// (see [`Key::has_prefix`]).
    pub prefix: Option<Key>,
}

impl ScanOptions {
    /// Scan everything.
    pub fn all() -> ScanOptions {
        ScanOptions::default()
    }

    /// Scan keys under the given prefix.
    pub fn with_prefix(prefix: Key) -> ScanOptions {
        ScanOptions {
            prefix: Some(prefix),
        }
    }
}

/// A hierarchical key-value database.
pub trait Store {
    /// Open a transaction. `rw` selects read-write over read-only.
    fn tx(&self, rw: bool) -> Result<Box<dyn Tx + '_>, KvError>;
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn tx(&self, rw: bool) -> Result<Box<dyn Tx + '_>, KvError> {
        (**self).tx(rw)
    }
}

impl<S: Store + ?Sized> Store for &S {
    fn tx(&self, rw: bool) -> Result<Box<dyn Tx + '_>, KvError> {
        (**self).tx(rw)
    }
}

/// A transaction over a hierarchical store.
pub trait Tx {
    /// Fetch the value for a key, or [`KvError::NotFound`].
    fn get(&self, key: &Key) -> Result<Vec<u8>, KvError>;

    /// Fetch values for several keys; missing keys yield `None`.
    fn get_batch(&self, keys: &[Key]) -> Result<Vec<Option<Vec<u8>>>, KvError> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            match self.get(key) {
                Ok(v) => out.push(Some(v)),
                Err(KvError::NotFound) => out.push(None),
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Write a key-value pair.
    fn put(&mut self, key: &Key, value: &[u8]) -> Result<(), KvError>;

    /// Remove a key. Deleting an absent key is not an error.
    fn del(&mut self, key: &Key) -> Result<(), KvError>;

    /// Start iterating key-value pairs in ascending key order.
    fn scan<'a>(&'a self, opts: ScanOptions) -> Box<dyn Cursor + 'a>;

    /// Apply all writes; [`KvError::Conflict`] demands a retry.
    fn commit(self: Box<Self>) -> Result<(), KvError>;
}

/// A forward cursor over a hierarchical store.
pub trait Cursor {
    /// Move to the next pair. Returns `false` at the end or on error.
    fn advance(&mut self) -> bool;

    /// Current key. Empty before the first `advance` and after the end.
    fn key(&self) -> &Key;

    /// Current value.
    fn val(&self) -> &[u8];

    /// Rewind to the starting state, keeping the original options.
    fn reset(&mut self);

    /// The terminal error, if iteration stopped on one.
    fn err(&self) -> Option<&KvError>;
}

impl<C: Cursor + ?Sized> Cursor for Box<C> {
    fn advance(&mut self) -> bool {
        (**self).advance()
    }

    fn key(&self) -> &Key {
        (**self).key()
    }

    fn val(&self) -> &[u8] {
        (**self).val()
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn err(&self) -> Option<&KvError> {
        (**self).err()
    }
}

/// Position a cursor at the first key `>= key` without native support.
///
/// Same walk as [`crate::flat::seek`], over hierarchical keys: no-op when
/// already on the target, advance when before it, reset and re-walk when
/// past it or unpositioned.
pub fn seek(cursor: &mut (impl Cursor + ?Sized), key: &Key) -> bool {
    if key.is_empty() {
        cursor.reset();
        return cursor.advance();
    }

    let current = cursor.key();
    if current.is_empty() {
        cursor.reset();
    } else {
        match current.cmp(key) {
            std::cmp::Ordering::Equal => return true,
            std::cmp::Ordering::Less => {}
            std::cmp::Ordering::Greater => cursor.reset(),
        }
    }

    while cursor.advance() {
        if cursor.key() >= key {
            return true;
        }
    }
    false
}

/// Run a read-only closure in a transaction.
pub fn view<S, F, T>(store: &S, f: F) -> Result<T, KvError>
where
    S: Store + ?Sized,
    F: FnOnce(&dyn Tx) -> Result<T, KvError>,
{
    let tx = store.tx(false)?;
    f(&*tx)
}

/// Run a read-write closure in a transaction, retrying the whole closure
/// while it or the commit reports [`KvError::Conflict`].
pub fn update<S, F, T>(store: &S, mut f: F) -> Result<T, KvError>
where
    S: Store + ?Sized,
    F: FnMut(&mut dyn Tx) -> Result<T, KvError>,
{
    loop {
        let mut tx = store.tx(true)?;
        match f(&mut *tx) {
            Ok(value) => match tx.commit() {
                Ok(()) => return Ok(value),
                Err(KvError::Conflict) => {
                    tracing::trace!("update conflict, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            },
            Err(KvError::Conflict) => {
                tracing::trace!("update conflict, retrying");
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Call `f` for every pair the scan visits.
pub fn each<F>(tx: &dyn Tx, opts: ScanOptions, mut f: F) -> Result<(), KvError>
where
    F: FnMut(&Key, &[u8]) -> Result<(), KvError>,
{
    let mut cursor = tx.scan(opts);
    while cursor.advance() {
        f(cursor.key(), cursor.val())?;
    }
    match cursor.err() {
        Some(e) => Err(e.clone()),
        None => Ok(()),
    }
}

/// Collect every pair the cursor will visit, cloning keys and values.
pub fn collect(cursor: &mut (impl Cursor + ?Sized)) -> Result<Vec<Pair>, KvError> {
    let mut out = Vec::new();
    while cursor.advance() {
        out.push(Pair {
            key: cursor.key().clone(),
            value: cursor.val().to_vec(),
        });
    }
    match cursor.err() {
        Some(e) => Err(e.clone()),
        None => Ok(out),
    }
}
