//! Tuple store engine over a hierarchical key-value store.
//!
//! # Layout
//!
//! The engine occupies three key regions of the underlying store:
//!
//! | Region | Key | Value |
//! |---|---|---|
//! | Schema | `("system", "table", <name>)` | schema blob, opaque serialized header |
//! | Auto counter | `("system", "auto", <name>)` | current counter, 8-byte big-endian |
//! | Rows | `("data", "table", <name>, k0, k1, …)` | length-prefixed payload |
//!
//! Row key segments are the order-preserving encodings of the primary-key
//! values, so the hierarchical order of row keys equals the tuple key
//! order and a prefix scan yields rows in ascending key order. Payloads
//! concatenate, per data field, an unsigned varint of the encoded length
//! followed by the field's binary encoding.
//!
//! # Auto-increment
//!
//! Inserting into a table with an auto key reads the counter (absent means
//! zero), increments it, writes it back, and uses the new value as the
//! key — all in the caller's transaction, so a concurrent allocation makes
//! the commit fail with a conflict and [`crate::update`] retries the whole
//! closure. Stores without real transactions cannot keep this safe; do not
//! use auto keys on them.

use strata_kv as kv;
use strata_kv::KvError;
use strata_values::read_uvarint;
use strata_values::write_uvarint;
use strata_values::SortableValue;

use crate::errors::from_kv;
use crate::filter::Filter;
use crate::filter::KeyFilter;
use crate::schema;
use crate::Data;
use crate::Header;
use crate::Key;
use crate::ScanOptions;
use crate::Sorting;
use crate::Store;
use crate::Table;
use crate::Tuple;
use crate::TupleCursor;
use crate::TupleError;
use crate::Tx;
use crate::UpdateOpt;

/// A tuple store materialized on a hierarchical key-value store.
pub struct TupleKv<S> {
    db: S,
}

impl<S: kv::Store> TupleKv<S> {
    /// Wrap a hierarchical store.
    pub fn new(db: S) -> TupleKv<S> {
        TupleKv { db }
    }

    /// Unwrap the underlying store.
    pub fn into_inner(self) -> S {
        self.db
    }
}

impl<S: kv::Store> Store for TupleKv<S> {
    fn tx(&self, rw: bool) -> Result<Box<dyn Tx + '_>, TupleError> {
        Ok(Box::new(TupleKvTx {
            tx: self.db.tx(rw).map_err(from_kv)?,
        }))
    }

    fn table(&self, name: &str) -> Result<Header, TupleError> {
        let tx = self.db.tx(false).map_err(from_kv)?;
        read_header(&*tx, name)
    }

    fn list_tables(&self) -> Result<Vec<Header>, TupleError> {
        let tx = self.db.tx(false).map_err(from_kv)?;
        list_headers(&*tx)
    }
}

struct TupleKvTx<'a> {
    tx: Box<dyn kv::Tx + 'a>,
}

impl Tx for TupleKvTx<'_> {
    fn table<'a>(&'a mut self, name: &str) -> Result<Box<dyn Table + 'a>, TupleError> {
        let header = read_header(&*self.tx, name)?;
        Ok(Box::new(KvTable {
            tx: &mut *self.tx,
            header,
        }))
    }

    fn list_tables(&self) -> Result<Vec<Header>, TupleError> {
        list_headers(&*self.tx)
    }

    fn create_table<'a>(&'a mut self, header: Header) -> Result<Box<dyn Table + 'a>, TupleError> {
        header.validate()?;
        let key = schema_key(&header.name);
        match self.tx.get(&key) {
            Ok(_) => return Err(TupleError::TableExists),
            Err(KvError::NotFound) => {}
            Err(e) => return Err(from_kv(e)),
        }
        let blob = schema::encode(&header)?;
        self.tx.put(&key, &blob).map_err(from_kv)?;
        tracing::debug!(table = %header.name, "created tuple table");
        Ok(Box::new(KvTable {
            tx: &mut *self.tx,
            header,
        }))
    }

    fn commit(self: Box<Self>) -> Result<(), TupleError> {
        self.tx.commit().map_err(from_kv)
    }
}

/// An opened table bound to a KV transaction.
struct KvTable<'a, 'b> {
    tx: &'a mut (dyn kv::Tx + 'b),
    header: Header,
}

impl KvTable<'_, '_> {
    fn row_key(&self, key: &Key) -> kv::Key {
        let mut out = table_prefix(&self.header.name);
        for value in key.values() {
            out = out.push(value.marshal_sortable());
        }
        out
    }

    fn next_auto(&mut self) -> Result<Key, TupleError> {
        let counter_key = auto_key(&self.header.name);
        let last = match self.tx.get(&counter_key) {
            Ok(raw) => {
                let bytes: [u8; 8] = raw.as_slice().try_into().map_err(|_| {
                    TupleError::validation(format!(
                        "bad auto counter size: {} bytes",
                        raw.len()
                    ))
                })?;
                u64::from_be_bytes(bytes)
            }
            Err(KvError::NotFound) => 0,
            Err(e) => return Err(from_kv(e)),
        };
        let next = last + 1;
        self.tx
            .put(&counter_key, &next.to_be_bytes())
            .map_err(from_kv)?;
        Ok(Key::from(vec![SortableValue::UInt(next)]))
    }

    /// Delete every row a keys-only scan matches. The cursor is drained
    /// before any mutation; a cursor cannot stay open across writes on the
    /// same transaction.
    fn delete_scanned(&mut self, filter: Option<&Filter>) -> Result<(), TupleError> {
        let mut keys = Vec::new();
        {
            let mut cursor = scan_table(
                &*self.tx,
                &self.header,
                ScanOptions {
                    keys_only: true,
                    filter: filter.cloned(),
                    ..ScanOptions::default()
                },
            );
            while cursor.advance() {
                keys.push(cursor.key().clone());
            }
            if let Some(e) = cursor.err() {
                return Err(e.clone());
            }
        }
        for key in keys {
            let row = self.row_key(&key);
            self.tx.del(&row).map_err(from_kv)?;
        }
        Ok(())
    }
}

impl Table for KvTable<'_, '_> {
    fn header(&self) -> &Header {
        &self.header
    }

    fn drop_table(&mut self) -> Result<(), TupleError> {
        self.clear()?;
        self.tx.del(&schema_key(&self.header.name)).map_err(from_kv)?;
        self.tx.del(&auto_key(&self.header.name)).map_err(from_kv)?;
        tracing::debug!(table = %self.header.name, "dropped tuple table");
        Ok(())
    }

    fn clear(&mut self) -> Result<(), TupleError> {
        let prefix = scan_prefix(&self.header.name, None);
        let mut keys = Vec::new();
        {
            let mut cursor = self.tx.scan(kv::ScanOptions::with_prefix(prefix));
            while cursor.advance() {
                keys.push(cursor.key().clone());
            }
            if let Some(e) = cursor.err() {
                return Err(from_kv(e.clone()));
            }
        }
        for key in keys {
            self.tx.del(&key).map_err(from_kv)?;
        }
        Ok(())
    }

    fn get_tuple(&self, key: &Key) -> Result<Data, TupleError> {
        self.header.validate_key(key, false)?;
        match self.tx.get(&self.row_key(key)) {
            Ok(raw) => decode_payload(&self.header, &raw),
            Err(KvError::NotFound) => Err(TupleError::NotFound),
            Err(e) => Err(from_kv(e)),
        }
    }

    fn get_tuple_batch(&self, keys: &[Key]) -> Result<Vec<Option<Data>>, TupleError> {
        let mut kv_keys = Vec::with_capacity(keys.len());
        for key in keys {
            self.header.validate_key(key, false)?;
            kv_keys.push(self.row_key(key));
        }
        let raw = self.tx.get_batch(&kv_keys).map_err(from_kv)?;
        raw.into_iter()
            .map(|entry| {
                entry
                    .map(|bytes| decode_payload(&self.header, &bytes))
                    .transpose()
            })
            .collect()
    }

    fn insert_tuple(&mut self, tuple: Tuple) -> Result<Key, TupleError> {
        self.header.validate_key(&tuple.key, true)?;
        self.header.validate_data(&tuple.data)?;

        let key = if self.header.has_auto_key() {
            self.next_auto()?
        } else {
            tuple.key
        };

        let row = self.row_key(&key);
        match self.tx.get(&row) {
            Ok(_) => return Err(TupleError::Exists),
            Err(KvError::NotFound) => {}
            Err(e) => return Err(from_kv(e)),
        }
        let payload = encode_payload(&tuple.data);
        self.tx.put(&row, &payload).map_err(from_kv)?;
        Ok(key)
    }

    fn update_tuple(&mut self, tuple: Tuple, opt: UpdateOpt) -> Result<(), TupleError> {
        self.header.validate_key(&tuple.key, false)?;
        self.header.validate_data(&tuple.data)?;

        let row = self.row_key(&tuple.key);
        if !opt.upsert {
            match self.tx.get(&row) {
                Ok(_) => {}
                Err(KvError::NotFound) => return Err(TupleError::NotFound),
                Err(e) => return Err(from_kv(e)),
            }
        }
        let payload = encode_payload(&tuple.data);
        self.tx.put(&row, &payload).map_err(from_kv)
    }

    fn delete_tuples(&mut self, filter: Option<&Filter>) -> Result<(), TupleError> {
        if let Some(f) = filter {
            if let Some(KeyFilter::Keys(keys)) = &f.key {
                for key in keys {
                    self.header.validate_key(key, false)?;
                }
                if f.data.is_none() {
                    // The key list is known and data does not matter:
                    // delete directly.
                    for key in keys {
                        let row = self.row_key(key);
                        self.tx.del(&row).map_err(from_kv)?;
                    }
                    return Ok(());
                }
            }
        }
        self.delete_scanned(filter)
    }

    fn scan<'a>(&'a self, opts: ScanOptions) -> Box<dyn TupleCursor + 'a> {
        scan_table(&*self.tx, &self.header, opts)
    }
}

// =============================================================================
// Region keys
// =============================================================================

// The row prefix for a whole table ends with an empty segment so that its
// flat encoding carries a trailing separator: children of the table match,
// the sibling "users2" of table "users" does not.

const TABLE_PREFIX_SEGMENTS: usize = 3;

fn schema_key(name: &str) -> kv::Key {
    kv::Key::from_strings(["system", "table", name])
}

fn schema_region() -> kv::Key {
    kv::Key::from_strings(["system", "table"]).push(Vec::new())
}

fn auto_key(name: &str) -> kv::Key {
    kv::Key::from_strings(["system", "auto", name])
}

fn table_prefix(name: &str) -> kv::Key {
    kv::Key::from_strings(["data", "table", name])
}

/// The narrowest KV prefix a filter permits for a table scan.
///
/// Walks positional key filters left to right: an equality on a sortable
/// value appends a complete segment and keeps narrowing; a range that
/// describes a binary-string prefix appends a partial segment and stops;
/// anything else stops. With no narrowing at all the open-prefix marker
/// (trailing empty segment) restricts the scan to the table's region. The
/// caller re-evaluates the full filter on each row, so over-matching on
/// the final byte-prefixed segment is harmless.
fn scan_prefix(name: &str, filter: Option<&Filter>) -> kv::Key {
    let mut prefix = table_prefix(name);
    let mut narrowed = false;

    if let Some(Filter {
        key: Some(KeyFilter::Fields(fields)),
        ..
    }) = filter
    {
        for f in fields {
            if let strata_filter::ValueFilter::Equal(v) = f {
                if let Some(s) = v.as_sortable() {
                    prefix = prefix.push(s.marshal_sortable());
                    narrowed = true;
                    continue;
                }
                break;
            }
            if let Some(range) = f.sortable_range() {
                if let Some(p) = range.as_prefix() {
                    prefix = prefix.push(p.marshal_sortable());
                    narrowed = true;
                }
            }
            break;
        }
    }

    if !narrowed {
        prefix = prefix.push(Vec::new());
    }
    prefix
}

// =============================================================================
// Row codec
// =============================================================================

fn read_header(tx: &dyn kv::Tx, name: &str) -> Result<Header, TupleError> {
    match tx.get(&schema_key(name)) {
        Ok(blob) => schema::decode(&blob),
        Err(KvError::NotFound) => Err(TupleError::TableNotFound),
        Err(e) => Err(from_kv(e)),
    }
}

fn list_headers(tx: &dyn kv::Tx) -> Result<Vec<Header>, TupleError> {
    let mut cursor = tx.scan(kv::ScanOptions::with_prefix(schema_region()));
    let mut out = Vec::new();
    while cursor.advance() {
        out.push(schema::decode(cursor.val())?);
    }
    match cursor.err() {
        Some(e) => Err(from_kv(e.clone())),
        None => Ok(out),
    }
}

fn encode_payload(data: &Data) -> Vec<u8> {
    let mut out = Vec::new();
    for value in data {
        let field = value.marshal_binary();
        write_uvarint(&mut out, field.len() as u64);
        out.extend_from_slice(&field);
    }
    out
}

fn decode_payload(header: &Header, mut data: &[u8]) -> Result<Data, TupleError> {
    let mut out = Vec::with_capacity(header.data.len());
    for field in &header.data {
        let (len, n) = read_uvarint(data).map_err(|source| TupleError::Decode { source })?;
        data = &data[n..];
        let len = usize::try_from(len)
            .ok()
            .filter(|&l| l <= data.len())
            .ok_or_else(|| {
                TupleError::validation(format!("invalid tuple field size: {len}"))
            })?;
        let value = field
            .ty
            .unmarshal_binary(&data[..len])
            .map_err(|source| TupleError::Decode { source })?;
        data = &data[len..];
        out.push(value);
    }
    Ok(out)
}

// =============================================================================
// Scanning
// =============================================================================

fn scan_table<'a>(
    tx: &'a (dyn kv::Tx + '_),
    header: &'a Header,
    opts: ScanOptions,
) -> Box<dyn TupleCursor + 'a> {
    if opts.sort == Sorting::Desc {
        return Box::new(FailedCursor {
            err: TupleError::Unsupported {
                what: "descending scans".to_string(),
            },
            key: Key::default(),
            data: Data::default(),
        });
    }
    let prefix = scan_prefix(&header.name, opts.filter.as_ref());
    tracing::trace!(table = %header.name, prefix = %prefix, "opening tuple scan");
    Box::new(KvTupleCursor {
        inner: tx.scan(kv::ScanOptions::with_prefix(prefix)),
        header,
        filter: opts.filter,
        keys_only: opts.keys_only,
        limit: opts.limit,
        yielded: 0,
        key: Key::default(),
        data: Data::default(),
        err: None,
    })
}

struct KvTupleCursor<'a> {
    inner: Box<dyn kv::Cursor + 'a>,
    header: &'a Header,
    filter: Option<Filter>,
    keys_only: bool,
    limit: usize,
    yielded: usize,
    key: Key,
    data: Data,
    err: Option<TupleError>,
}

impl TupleCursor for KvTupleCursor<'_> {
    fn advance(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }
        if self.limit != 0 && self.yielded >= self.limit {
            return false;
        }

        loop {
            if !self.inner.advance() {
                if let Some(e) = self.inner.err() {
                    self.err = Some(from_kv(e.clone()));
                }
                return false;
            }

            let header = self.header;
            self.key = match decode_cursor_key(header, self.inner.key()) {
                Ok(key) => key,
                Err(e) => {
                    self.err = Some(e);
                    return false;
                }
            };

            if let Some(filter) = &self.filter {
                if !filter.matches_key(&self.key) {
                    continue;
                }
            }

            let needs_data =
                !self.keys_only || self.filter.as_ref().is_some_and(|f| f.data.is_some());
            if needs_data {
                self.data = match decode_payload(header, self.inner.val()) {
                    Ok(data) => data,
                    Err(e) => {
                        self.err = Some(e);
                        return false;
                    }
                };
                if let Some(filter) = &self.filter {
                    if !filter.matches_data(&self.data) {
                        continue;
                    }
                }
            } else {
                self.data = Data::default();
            }

            self.yielded += 1;
            return true;
        }
    }

    fn key(&self) -> &Key {
        &self.key
    }

    fn data(&self) -> &Data {
        &self.data
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.yielded = 0;
        self.key = Key::default();
        self.data = Data::default();
        self.err = None;
    }

    fn err(&self) -> Option<&TupleError> {
        self.err.as_ref()
    }
}

fn decode_cursor_key(header: &Header, raw: &kv::Key) -> Result<Key, TupleError> {
    let tail = raw.clone().split_off_prefix(TABLE_PREFIX_SEGMENTS);
    if tail.len() != header.key.len() {
        return Err(TupleError::validation(format!(
            "wrong row key size: {} vs {}",
            tail.len(),
            header.key.len()
        )));
    }
    header
        .key
        .iter()
        .zip(tail.segments())
        .map(|(field, seg)| {
            field
                .ty
                .unmarshal_sortable(seg)
                .map_err(|source| TupleError::Decode { source })
        })
        .collect()
}

/// A cursor that failed at open time; the error is terminal.
struct FailedCursor {
    err: TupleError,
    key: Key,
    data: Data,
}

impl TupleCursor for FailedCursor {
    fn advance(&mut self) -> bool {
        false
    }

    fn key(&self) -> &Key {
        &self.key
    }

    fn data(&self) -> &Data {
        &self.data
    }

    fn reset(&mut self) {}

    fn err(&self) -> Option<&TupleError> {
        Some(&self.err)
    }
}

#[cfg(test)]
mod tests {
    use strata_filter::eq;
    use strata_filter::gte;
    use strata_filter::prefix as prefix_filter;
    use strata_values::Value;
    use strata_values::ValueType;

    use super::*;
    use crate::Field;

    fn test_header() -> Header {
        Header {
            name: "t".to_string(),
            key: Vec::new(),
            data: vec![
                Field {
                    name: "a".to_string(),
                    ty: ValueType::String,
                },
                Field {
                    name: "b".to_string(),
                    ty: ValueType::Int,
                },
            ],
        }
    }

    #[test]
    fn payload_roundtrip() {
        let header = test_header();
        let data = vec![Value::String("hi".to_string()), Value::Int(-3)];
        let encoded = encode_payload(&data);
        assert_eq!(decode_payload(&header, &encoded).unwrap(), data);
    }

    #[test]
    fn payload_rejects_overlong_field() {
        let header = test_header();
        let mut encoded = Vec::new();
        write_uvarint(&mut encoded, 100);
        encoded.extend_from_slice(b"short");
        assert!(matches!(
            decode_payload(&header, &encoded),
            Err(TupleError::Validation { .. })
        ));
    }

    #[test]
    fn unnarrowed_scan_prefix_has_open_marker() {
        let prefix = scan_prefix("t", None);
        assert_eq!(
            prefix,
            kv::Key::from_strings(["data", "table", "t"]).push(Vec::new())
        );
    }

    #[test]
    fn equal_filters_narrow_and_continue() {
        let filter = Filter::with_key(KeyFilter::Fields(vec![
            eq(Value::String("a".to_string())),
            eq(Value::String("b".to_string())),
        ]));
        let prefix = scan_prefix("t", Some(&filter));
        assert_eq!(
            prefix,
            kv::Key::from_strings(["data", "table", "t", "a", "b"])
        );
    }

    #[test]
    fn prefix_range_narrows_and_stops() {
        let filter = Filter::with_key(KeyFilter::Fields(vec![
            eq(Value::String("a".to_string())),
            prefix_filter(strata_values::SortableValue::String("b".to_string())),
            eq(Value::String("ignored".to_string())),
        ]));
        let prefix = scan_prefix("t", Some(&filter));
        assert_eq!(
            prefix,
            kv::Key::from_strings(["data", "table", "t", "a", "b"])
        );
    }

    #[test]
    fn non_narrowing_filter_stops_at_region() {
        let filter = Filter::with_key(KeyFilter::Fields(vec![gte(
            strata_values::SortableValue::String("a".to_string()),
        )]));
        let prefix = scan_prefix("t", Some(&filter));
        assert_eq!(
            prefix,
            kv::Key::from_strings(["data", "table", "t"]).push(Vec::new())
        );
    }

    #[test]
    fn float_equality_does_not_narrow() {
        let filter = Filter::with_key(KeyFilter::Fields(vec![eq(Value::Float(1.0))]));
        let prefix = scan_prefix("t", Some(&filter));
        assert_eq!(
            prefix,
            kv::Key::from_strings(["data", "table", "t"]).push(Vec::new())
        );
    }
}
