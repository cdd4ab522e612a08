//! Flat key-value stores: a single ordered map from byte keys to byte
//! values.
//!
//! This is the lowest storage layer. Drivers implement [`FlatStore`],
//! [`FlatTx`], and [`FlatCursor`]; everything above (the hierarchical layer,
//! the tuple store) composes on top of these traits.
//!
//! # Cursor contract
//!
//! A cursor starts unpositioned; each [`FlatCursor::advance`] moves to the
//! next pair in ascending key order and returns `false` at the end or on a
//! terminal error (check [`FlatCursor::err`]). The slices returned by
//! `key`/`val` borrow from the cursor and are only valid until the next
//! `advance`; clone them for longer retention. `reset` rewinds to the
//! starting state with the same options. Dropping the cursor releases its
//! resources.

mod prefix;

pub use prefix::PrefixCursor;

use crate::errors::KvError;

/// A flat binary key.
pub type FlatKey = Vec<u8>;

/// A key-value pair from a flat store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatPair {
    pub key: FlatKey,
    pub value: Vec<u8>,
}

/// Options for [`FlatTx::scan`].
///
/// The option set is open-ended; `prefix` is the one option every backend
/// must honor, natively or through [`PrefixCursor`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct ScanOptions {
    /// Restrict iteration to keys with this byte prefix.
    pub prefix: Option<FlatKey>,
}

impl ScanOptions {
    /// Scan everything.
    pub fn all() -> ScanOptions {
        ScanOptions::default()
    }

    /// Scan keys with the given byte prefix.
    pub fn with_prefix(prefix: impl Into<FlatKey>) -> ScanOptions {
        ScanOptions {
            prefix: Some(prefix.into()),
        }
    }
}

/// A flat key-value database.
pub trait FlatStore {
    /// Open a transaction. `rw` selects read-write over read-only.
    fn tx(&self, rw: bool) -> Result<Box<dyn FlatTx + '_>, KvError>;
}

impl<S: FlatStore + ?Sized> FlatStore for Box<S> {
    fn tx(&self, rw: bool) -> Result<Box<dyn FlatTx + '_>, KvError> {
        (**self).tx(rw)
    }
}

impl<S: FlatStore + ?Sized> FlatStore for &S {
    fn tx(&self, rw: bool) -> Result<Box<dyn FlatTx + '_>, KvError> {
        (**self).tx(rw)
    }
}

/// A transaction over a flat store.
///
/// Writes are visible to subsequent reads on the same transaction, and only
/// become visible to others after [`FlatTx::commit`]. Dropping an
/// uncommitted transaction rolls it back.
pub trait FlatTx {
    /// Fetch the value for a key, or [`KvError::NotFound`].
    fn get(&self, key: &[u8]) -> Result<Vec<u8>, KvError>;

    /// Fetch values for several keys; missing keys yield `None`, never a
    /// whole-batch error.
    fn get_batch(&self, keys: &[&[u8]]) -> Result<Vec<Option<Vec<u8>>>, KvError> {
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

    /// Write a key-value pair. Fails with [`KvError::ReadOnly`] on a
    /// read-only transaction.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvError>;

    /// Remove a key. Deleting an absent key is not an error. Fails with
    /// [`KvError::ReadOnly`] on a read-only transaction.
    fn del(&mut self, key: &[u8]) -> Result<(), KvError>;

    /// Start iterating key-value pairs in ascending key order.
    fn scan<'a>(&'a self, opts: ScanOptions) -> Box<dyn FlatCursor + 'a>;

    /// Apply all writes. Fails with [`KvError::Conflict`] when another
    /// transaction won an optimistic race; the caller must retry.
    fn commit(self: Box<Self>) -> Result<(), KvError>;
}

/// A forward cursor over a flat store. See the module docs for the
/// lifecycle contract.
pub trait FlatCursor {
    /// Move to the next pair. Returns `false` at the end of iteration or on
    /// error.
    fn advance(&mut self) -> bool;

    /// Current key. Empty before the first `advance` and after the end.
    fn key(&self) -> &[u8];

    /// Current value. Empty before the first `advance` and after the end.
    fn val(&self) -> &[u8];

    /// Rewind to the starting state, keeping the original options.
    fn reset(&mut self);

    /// The terminal error, if iteration stopped on one.
    fn err(&self) -> Option<&KvError>;
}

impl<C: FlatCursor + ?Sized> FlatCursor for Box<C> {
    fn advance(&mut self) -> bool {
        (**self).advance()
    }

    fn key(&self) -> &[u8] {
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

/// A cursor with native support for positioning at a key.
pub trait SeekCursor: FlatCursor {
    /// Position at the first key `>= key`. Returns `false` when no such key
    /// exists.
    fn seek(&mut self, key: &[u8]) -> bool;
}

/// Position a cursor at the first key `>= key` without native support.
///
/// When the cursor is already on the target this is a no-op; when it is
/// before the target it only advances; otherwise it resets and walks from
/// the start.
pub fn seek(cursor: &mut (impl FlatCursor + ?Sized), key: &[u8]) -> bool {
    if key.is_empty() {
        cursor.reset();
        return cursor.advance();
    }

    let current = cursor.key();
    if current.is_empty() {
        // Unpositioned: could be the start or the end, restart to be sure.
        cursor.reset();
    } else {
        match current.cmp(key) {
            std::cmp::Ordering::Equal => return true,
            std::cmp::Ordering::Less => {} // can walk forward from here
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
    S: FlatStore + ?Sized,
    F: FnOnce(&dyn FlatTx) -> Result<T, KvError>,
{
    let tx = store.tx(false)?;
    f(&*tx)
}

/// Run a read-write closure in a transaction, retrying the whole closure
/// while the commit (or any operation inside) reports [`KvError::Conflict`].
pub fn update<S, F, T>(store: &S, mut f: F) -> Result<T, KvError>
where
    S: FlatStore + ?Sized,
    F: FnMut(&mut dyn FlatTx) -> Result<T, KvError>,
{
    loop {
        let mut tx = store.tx(true)?;
        match f(&mut *tx) {
            Ok(value) => match tx.commit() {
                Ok(()) => return Ok(value),
                Err(KvError::Conflict) => {
                    tracing::trace!("flat update conflict, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            },
            Err(KvError::Conflict) => {
                tracing::trace!("flat update conflict, retrying");
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Collect every pair the cursor will visit, cloning keys and values.
pub fn collect(cursor: &mut (impl FlatCursor + ?Sized)) -> Result<Vec<FlatPair>, KvError> {
    let mut out = Vec::new();
    while cursor.advance() {
        out.push(FlatPair {
            key: cursor.key().to_vec(),
            value: cursor.val().to_vec(),
        });
    }
    match cursor.err() {
        Some(e) => Err(e.clone()),
        None => Ok(out),
    }
}
