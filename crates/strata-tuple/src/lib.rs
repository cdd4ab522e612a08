//! Schemaful tables of typed tuples over ordered key-value stores.
//!
//! A table is declared once with a [`Header`]: named, typed primary-key
//! fields (sortable types only) and named, typed payload fields. Rows are
//! [`Tuple`]s whose shapes must match the header exactly. The one engine in
//! this crate, [`kv::TupleKv`], materializes tables on any hierarchical
//! key-value store: key fields become order-preserving key segments, so a
//! plain prefix scan visits rows in key order, and payloads are
//! length-prefixed binary fields.
//!
//! # Example
//!
//! ```
//! use strata_tuple::{Header, KeyField, Field, Key, Tuple, ScanOptions};
//! use strata_values::{SortableType, ValueType, Value};
//!
//! let db = strata_kv::upgrade(strata_kv::mem::MemKv::new());
//! let store = strata_tuple::kv::TupleKv::new(db);
//!
//! strata_tuple::update(&store, |tx| {
//!     let mut tbl = tx.create_table(Header {
//!         name: "users".to_string(),
//!         key: vec![KeyField {
//!             name: "id".to_string(),
//!             ty: SortableType::String,
//!             auto: false,
//!         }],
//!         data: vec![Field {
//!             name: "bio".to_string(),
//!             ty: ValueType::String,
//!         }],
//!     })?;
//!     tbl.insert_tuple(Tuple {
//!         key: Key::from_strings(["ada"]),
//!         data: vec![Value::String("pioneer".to_string())],
//!     })?;
//!     Ok(())
//! })
//! .unwrap();
//! ```

pub mod kv;
pub mod registry;

mod errors;
mod filter;
mod schema;

pub use errors::TupleError;
pub use filter::DataFilter;
pub use filter::Filter;
pub use filter::KeyFilter;

use std::collections::BTreeSet;

use strata_values::SortableType;
use strata_values::SortableValue;
use strata_values::Value;
use strata_values::ValueType;

/// A payload field of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: ValueType,
}

/// A primary-key field of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyField {
    pub name: String,
    pub ty: SortableType,
    /// Allocate values from a per-table counter on insert. Only a sole
    /// `UInt` key field may be auto-increment.
    pub auto: bool,
}

/// The schema of a tuple table. Immutable for the life of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub key: Vec<KeyField>,
    pub data: Vec<Field>,
}

impl Header {
    /// Find a key field and its position by name.
    pub fn key_by_name(&self, name: &str) -> Option<(&KeyField, usize)> {
        self.key
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
            .map(|(i, f)| (f, i))
    }

    /// Find a payload field and its position by name.
    pub fn data_by_name(&self, name: &str) -> Option<(&Field, usize)> {
        self.data
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
            .map(|(i, f)| (f, i))
    }

    /// Whether the header declares an auto-increment key.
    pub fn has_auto_key(&self) -> bool {
        self.key.first().is_some_and(|f| f.auto)
    }

    /// Verify the header invariants: non-empty table name, at least one key
    /// field, unique field names, and an auto key only alone and only of
    /// type `UInt`.
    pub fn validate(&self) -> Result<(), TupleError> {
        if self.name.is_empty() {
            return Err(TupleError::validation("table name should be set"));
        }
        if self.key.is_empty() {
            return Err(TupleError::validation("at least one key field is required"));
        }
        let mut names = BTreeSet::new();
        for field in &self.key {
            if field.name.is_empty() {
                return Err(TupleError::validation("field name should not be empty"));
            }
            if field.auto {
                if self.key.len() != 1 {
                    return Err(TupleError::validation("only one auto key is allowed"));
                }
                if field.ty != SortableType::UInt {
                    return Err(TupleError::validation(
                        "only uint keys can be auto-incremented",
                    ));
                }
            }
            if !names.insert(field.name.as_str()) {
                return Err(TupleError::validation(format!(
                    "duplicate field name: {:?}",
                    field.name
                )));
            }
        }
        for field in &self.data {
            if field.name.is_empty() {
                return Err(TupleError::validation("field name should not be empty"));
            }
            if !names.insert(field.name.as_str()) {
                return Err(TupleError::validation(format!(
                    "duplicate field name: {:?}",
                    field.name
                )));
            }
        }
        Ok(())
    }

    /// Verify a key against the schema. With `insert` set, an empty key
    /// ([`Key::auto`]) is accepted for auto-increment tables.
    pub fn validate_key(&self, key: &Key, insert: bool) -> Result<(), TupleError> {
        if key.is_empty() {
            if insert && self.has_auto_key() {
                return Ok(());
            }
            return Err(TupleError::NotFound);
        }
        if key.len() != self.key.len() {
            return Err(TupleError::validation(format!(
                "wrong key size: {} vs {}",
                self.key.len(),
                key.len()
            )));
        }
        for (field, value) in self.key.iter().zip(key.values()) {
            if value.sortable_type() != field.ty {
                return Err(TupleError::validation(format!(
                    "key {:?}: expected {:?}, got {:?}",
                    field.name,
                    field.ty,
                    value.sortable_type()
                )));
            }
        }
        Ok(())
    }

    /// Verify a key prefix against the schema.
    pub fn validate_prefix(&self, prefix: &Key) -> Result<(), TupleError> {
        if prefix.len() > self.key.len() {
            return Err(TupleError::validation(format!(
                "key prefix too long: {} vs {}",
                self.key.len(),
                prefix.len()
            )));
        }
        for (field, value) in self.key.iter().zip(prefix.values()) {
            if value.sortable_type() != field.ty {
                return Err(TupleError::validation(format!(
                    "key {:?}: expected {:?}, got {:?}",
                    field.name,
                    field.ty,
                    value.sortable_type()
                )));
            }
        }
        Ok(())
    }

    /// Verify a payload against the schema.
    pub fn validate_data(&self, data: &Data) -> Result<(), TupleError> {
        if data.len() != self.data.len() {
            return Err(TupleError::validation(format!(
                "wrong payload size: {} vs {}",
                self.data.len(),
                data.len()
            )));
        }
        for (field, value) in self.data.iter().zip(data.iter()) {
            if value.value_type() != field.ty {
                return Err(TupleError::validation(format!(
                    "payload {:?}: expected {:?}, got {:?}",
                    field.name,
                    field.ty,
                    value.value_type()
                )));
            }
        }
        Ok(())
    }
}

/// A tuple primary key: sortable values matching the header's key fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Key(Vec<SortableValue>);

impl Key {
    /// The insert placeholder for tables with an auto-increment key; the
    /// engine allocates and returns the real key.
    pub fn auto() -> Key {
        Key(Vec::new())
    }

    /// Build a key of `String` values.
    pub fn from_strings<I, S>(parts: I) -> Key
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Key(parts
            .into_iter()
            .map(|s| SortableValue::String(s.as_ref().to_string()))
            .collect())
    }

    /// Append a value.
    pub fn push(mut self, value: impl Into<SortableValue>) -> Key {
        self.0.push(value.into());
        self
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the [`Key::auto`] placeholder.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value at `index`.
    pub fn get(&self, index: usize) -> Option<&SortableValue> {
        self.0.get(index)
    }

    /// Iterate over values.
    pub fn values(&self) -> std::slice::Iter<'_, SortableValue> {
        self.0.iter()
    }

    /// Compare component-wise by encoded order; a shorter key that matches
    /// on its length is less.
    pub fn compare(&self, other: &Key) -> std::cmp::Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            let ord = a.compare(b);
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

impl From<Vec<SortableValue>> for Key {
    fn from(values: Vec<SortableValue>) -> Key {
        Key(values)
    }
}

impl FromIterator<SortableValue> for Key {
    fn from_iter<I: IntoIterator<Item = SortableValue>>(iter: I) -> Key {
        Key(iter.into_iter().collect())
    }
}

/// A tuple payload: values matching the header's data fields.
pub type Data = Vec<Value>;

/// Build a payload of `String` values.
pub fn string_data<I, S>(parts: I) -> Data
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts
        .into_iter()
        .map(|s| Value::String(s.as_ref().to_string()))
        .collect()
}

/// A data tuple: primary key plus payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    pub key: Key,
    pub data: Data,
}

/// Options for [`Table::update_tuple`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOpt {
    /// Create the tuple when it does not exist instead of failing with
    /// [`TupleError::NotFound`].
    pub upsert: bool,
}

/// Requested ordering of a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Sorting {
    /// Whatever order the backend produces natively.
    #[default]
    Any,
    /// Ascending key order.
    Asc,
    /// Descending key order; optional, stores without support fail the
    /// scan at open time instead of buffering.
    Desc,
}

/// Options for [`Table::scan`].
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Skip decoding payloads; [`TupleCursor::data`] stays empty unless a
    /// data predicate needs it.
    pub keys_only: bool,
    /// Requested ordering.
    pub sort: Sorting,
    /// Row filter; key predicates narrow the underlying scan where
    /// possible.
    pub filter: Option<Filter>,
    /// Maximum number of tuples to yield; `0` means unlimited.
    pub limit: usize,
}

/// Row count returned by [`Table::table_size`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSize {
    /// An exact count.
    Exact(u64),
    /// A placeholder the store made up without scanning; do not trust it
    /// for anything but rough planning.
    WildGuess(u64),
}

impl TableSize {
    /// The count, however reliable.
    pub fn rows(&self) -> u64 {
        match *self {
            TableSize::Exact(n) | TableSize::WildGuess(n) => n,
        }
    }
}

/// A tuple store with a strict schema.
pub trait Store {
    /// Open a transaction. `rw` selects read-write over read-only.
    fn tx(&self, rw: bool) -> Result<Box<dyn Tx + '_>, TupleError>;

    /// Fetch a table's header, or [`TupleError::TableNotFound`].
    fn table(&self, name: &str) -> Result<Header, TupleError>;

    /// Headers of all tables.
    fn list_tables(&self) -> Result<Vec<Header>, TupleError>;
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn tx(&self, rw: bool) -> Result<Box<dyn Tx + '_>, TupleError> {
        (**self).tx(rw)
    }

    fn table(&self, name: &str) -> Result<Header, TupleError> {
        (**self).table(name)
    }

    fn list_tables(&self) -> Result<Vec<Header>, TupleError> {
        (**self).list_tables()
    }
}

/// A transaction over a tuple store.
///
/// A [`Table`] handle borrows the transaction exclusively; drop it before
/// opening another table or committing.
pub trait Tx {
    /// Open a table, or fail with [`TupleError::TableNotFound`].
    fn table<'a>(&'a mut self, name: &str) -> Result<Box<dyn Table + 'a>, TupleError>;

    /// Headers of all tables, as visible to this transaction.
    fn list_tables(&self) -> Result<Vec<Header>, TupleError>;

    /// Create and open a table; fails with [`TupleError::TableExists`] when
    /// the name is taken.
    fn create_table<'a>(&'a mut self, header: Header) -> Result<Box<dyn Table + 'a>, TupleError>;

    /// Apply all writes; [`TupleError::Conflict`] demands a retry.
    fn commit(self: Box<Self>) -> Result<(), TupleError>;
}

/// An opened tuple table bound to a transaction.
pub trait Table {
    /// The table's schema.
    fn header(&self) -> &Header;

    /// Remove all rows, the schema, and the auto counter.
    fn drop_table(&mut self) -> Result<(), TupleError>;

    /// Remove all rows, keeping the table.
    fn clear(&mut self) -> Result<(), TupleError>;

    /// Fetch one tuple's payload, or [`TupleError::NotFound`].
    fn get_tuple(&self, key: &Key) -> Result<Data, TupleError>;

    /// Fetch payloads for several keys; missing tuples yield `None`.
    fn get_tuple_batch(&self, keys: &[Key]) -> Result<Vec<Option<Data>>, TupleError>;

    /// Create a tuple, returning its final key (the allocated one for
    /// auto-increment tables). Fails with [`TupleError::Exists`] when the
    /// key is taken.
    fn insert_tuple(&mut self, tuple: Tuple) -> Result<Key, TupleError>;

    /// Overwrite a tuple's payload. Without `upsert`, fails with
    /// [`TupleError::NotFound`] when the tuple is missing.
    fn update_tuple(&mut self, tuple: Tuple, opt: UpdateOpt) -> Result<(), TupleError>;

    /// Remove every tuple matching the filter (all of them for `None`).
    fn delete_tuples(&mut self, filter: Option<&Filter>) -> Result<(), TupleError>;

    /// Iterate tuples. See [`ScanOptions`].
    fn scan<'a>(&'a self, opts: ScanOptions) -> Box<dyn TupleCursor + 'a>;

    /// Count rows matching the filter. With `exact` unset the store may
    /// return [`TableSize::WildGuess`] instead of scanning.
    fn table_size(&self, filter: Option<&Filter>, exact: bool) -> Result<TableSize, TupleError> {
        if !exact {
            // No estimator: the traditional wild guess.
            return Ok(TableSize::WildGuess(1000));
        }
        let mut cursor = self.scan(ScanOptions {
            keys_only: true,
            filter: filter.cloned(),
            ..ScanOptions::default()
        });
        let mut n = 0u64;
        while cursor.advance() {
            n += 1;
        }
        if let Some(e) = cursor.err() {
            return Err(e.clone());
        }
        Ok(TableSize::Exact(n))
    }
}

/// A forward cursor over tuples. Same lifecycle contract as the KV
/// cursors: `advance` then borrow `key`/`data` until the next `advance`.
pub trait TupleCursor {
    /// Move to the next tuple. Returns `false` at the end or on error.
    fn advance(&mut self) -> bool;

    /// Current primary key.
    fn key(&self) -> &Key;

    /// Current payload; empty under `keys_only`.
    fn data(&self) -> &Data;

    /// Rewind to the starting state, keeping the original options.
    fn reset(&mut self);

    /// The terminal error, if iteration stopped on one.
    fn err(&self) -> Option<&TupleError>;
}

/// Run a read-only closure in a transaction.
pub fn view<S, F, T>(store: &S, f: F) -> Result<T, TupleError>
where
    S: Store + ?Sized,
    F: FnOnce(&mut dyn Tx) -> Result<T, TupleError>,
{
    let mut tx = store.tx(false)?;
    f(&mut *tx)
}

/// Run a read-write closure in a transaction, retrying the whole closure
/// while it or the commit reports [`TupleError::Conflict`].
pub fn update<S, F, T>(store: &S, mut f: F) -> Result<T, TupleError>
where
    S: Store + ?Sized,
    F: FnMut(&mut dyn Tx) -> Result<T, TupleError>,
{
    loop {
        let mut tx = store.tx(true)?;
        match f(&mut *tx) {
            Ok(value) => match tx.commit() {
                Ok(()) => return Ok(value),
                Err(TupleError::Conflict) => {
                    tracing::trace!("tuple update conflict, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            },
            Err(TupleError::Conflict) => {
                tracing::trace!("tuple update conflict, retrying");
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Collect every tuple the cursor will visit.
pub fn collect(cursor: &mut (impl TupleCursor + ?Sized)) -> Result<Vec<Tuple>, TupleError> {
    let mut out = Vec::new();
    while cursor.advance() {
        out.push(Tuple {
            key: cursor.key().clone(),
            data: cursor.data().clone(),
        });
    }
    match cursor.err() {
        Some(e) => Err(e.clone()),
        None => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header {
            name: "t".to_string(),
            key: vec![KeyField {
                name: "k".to_string(),
                ty: SortableType::String,
                auto: false,
            }],
            data: vec![Field {
                name: "v".to_string(),
                ty: ValueType::Int,
            }],
        }
    }

    #[test]
    fn valid_header() {
        header().validate().unwrap();
    }

    #[test]
    fn header_requires_name_and_key() {
        let mut h = header();
        h.name = String::new();
        assert!(matches!(h.validate(), Err(TupleError::Validation { .. })));

        let mut h = header();
        h.key.clear();
        assert!(matches!(h.validate(), Err(TupleError::Validation { .. })));
    }

    #[test]
    fn header_rejects_duplicate_names_across_key_and_data() {
        let mut h = header();
        h.data[0].name = "k".to_string();
        assert!(matches!(h.validate(), Err(TupleError::Validation { .. })));
    }

    #[test]
    fn auto_key_must_be_sole_uint() {
        let mut h = header();
        h.key[0].auto = true;
        assert!(matches!(h.validate(), Err(TupleError::Validation { .. })));

        h.key[0].ty = SortableType::UInt;
        h.validate().unwrap();

        h.key.push(KeyField {
            name: "k2".to_string(),
            ty: SortableType::UInt,
            auto: false,
        });
        assert!(matches!(h.validate(), Err(TupleError::Validation { .. })));
    }

    #[test]
    fn key_shape_and_types_checked() {
        let h = header();
        h.validate_key(&Key::from_strings(["a"]), false).unwrap();
        assert!(matches!(
            h.validate_key(&Key::from_strings(["a", "b"]), false),
            Err(TupleError::Validation { .. })
        ));
        assert!(matches!(
            h.validate_key(&Key::from(vec![SortableValue::Int(1)]), false),
            Err(TupleError::Validation { .. })
        ));
    }

    #[test]
    fn empty_key_only_for_auto_insert() {
        let h = header();
        assert!(matches!(
            h.validate_key(&Key::auto(), true),
            Err(TupleError::NotFound)
        ));

        let auto = Header {
            name: "t".to_string(),
            key: vec![KeyField {
                name: "id".to_string(),
                ty: SortableType::UInt,
                auto: true,
            }],
            data: Vec::new(),
        };
        auto.validate_key(&Key::auto(), true).unwrap();
        assert!(matches!(
            auto.validate_key(&Key::auto(), false),
            Err(TupleError::NotFound)
        ));
    }

    #[test]
    fn data_shape_and_types_checked() {
        let h = header();
        h.validate_data(&vec![Value::Int(1)]).unwrap();
        assert!(matches!(
            h.validate_data(&Vec::new()),
            Err(TupleError::Validation { .. })
        ));
        assert!(matches!(
            h.validate_data(&vec![Value::Bool(true)]),
            Err(TupleError::Validation { .. })
        ));
    }

    #[test]
    fn key_compare_is_component_wise() {
        use std::cmp::Ordering;

        let ab = Key::from_strings(["a", "b"]);
        let ac = Key::from_strings(["a", "c"]);
        let a = Key::from_strings(["a"]);
        assert_eq!(ab.compare(&ac), Ordering::Less);
        assert_eq!(a.compare(&ab), Ordering::Less);
        assert_eq!(ab.compare(&ab), Ordering::Equal);
    }

    #[test]
    fn field_lookup_by_name() {
        let h = header();
        assert_eq!(h.key_by_name("k").unwrap().1, 0);
        assert!(h.key_by_name("v").is_none());
        assert_eq!(h.data_by_name("v").unwrap().1, 0);
    }
}
