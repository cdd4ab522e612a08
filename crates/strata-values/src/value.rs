//! Value and type descriptor unions.

use std::cmp::Ordering;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::binary;
use crate::sortable;
use crate::ValueError;

/// A primitive value stored in a tuple payload.
///
/// The variant set is closed; anything a backend stores decomposes into
/// these seven primitives.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Bytes(Vec<u8>),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    /// An instant with nanosecond resolution, always in UTC.
    Time(DateTime<Utc>),
}

/// A value usable as a primary-key segment.
///
/// Same variants as [`Value`] minus `Float`: floats have no encoding whose
/// byte order matches their numeric order, so they cannot participate in
/// ordered keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortableValue {
    String(String),
    Bytes(Vec<u8>),
    Int(i64),
    UInt(u64),
    Bool(bool),
    Time(DateTime<Utc>),
}

/// Type descriptor for [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    String,
    Bytes,
    Int,
    UInt,
    Float,
    Bool,
    Time,
}

/// Type descriptor for [`SortableValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortableType {
    String,
    Bytes,
    Int,
    UInt,
    Bool,
    Time,
}

impl Value {
    /// The type descriptor of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::Bytes(_) => ValueType::Bytes,
            Value::Int(_) => ValueType::Int,
            Value::UInt(_) => ValueType::UInt,
            Value::Float(_) => ValueType::Float,
            Value::Bool(_) => ValueType::Bool,
            Value::Time(_) => ValueType::Time,
        }
    }

    /// Convert into a sortable value. Fails for `Float`.
    pub fn into_sortable(self) -> Option<SortableValue> {
        match self {
            Value::String(v) => Some(SortableValue::String(v)),
            Value::Bytes(v) => Some(SortableValue::Bytes(v)),
            Value::Int(v) => Some(SortableValue::Int(v)),
            Value::UInt(v) => Some(SortableValue::UInt(v)),
            Value::Bool(v) => Some(SortableValue::Bool(v)),
            Value::Time(v) => Some(SortableValue::Time(v)),
            Value::Float(_) => None,
        }
    }

    /// Borrowing variant of [`Value::into_sortable`].
    pub fn as_sortable(&self) -> Option<SortableValue> {
        self.clone().into_sortable()
    }

    /// Encode with the binary (payload) encoding.
    pub fn marshal_binary(&self) -> Vec<u8> {
        binary::marshal(self)
    }
}

impl SortableValue {
    /// The sortable type descriptor of this value.
    pub fn sortable_type(&self) -> SortableType {
        match self {
            SortableValue::String(_) => SortableType::String,
            SortableValue::Bytes(_) => SortableType::Bytes,
            SortableValue::Int(_) => SortableType::Int,
            SortableValue::UInt(_) => SortableType::UInt,
            SortableValue::Bool(_) => SortableType::Bool,
            SortableValue::Time(_) => SortableType::Time,
        }
    }

    /// Encode with the order-preserving encoding.
    pub fn marshal_sortable(&self) -> Vec<u8> {
        sortable::marshal(self)
    }

    /// Encode with the binary (payload) encoding of the equivalent [`Value`].
    pub fn marshal_binary(&self) -> Vec<u8> {
        binary::marshal(&self.clone().into_value())
    }

    /// Compare by encoded byte order.
    ///
    /// For two values of the same variant this matches their natural order.
    /// Across variants the result is the raw byte order of the encodings,
    /// which is total but carries no particular meaning; it exists so that
    /// filters can compare a `String` bound against the `Bytes` value
    /// produced by [`prefix_end`](crate::prefix_end).
    pub fn compare(&self, other: &SortableValue) -> Ordering {
        self.marshal_sortable().cmp(&other.marshal_sortable())
    }

    /// True for the binary-string variants (`String`, `Bytes`), which
    /// support [`SortableValue::prefix_end`].
    pub fn is_binary_string(&self) -> bool {
        matches!(self, SortableValue::String(_) | SortableValue::Bytes(_))
    }

    /// The smallest value strictly greater than every value with this
    /// binary-string prefix.
    ///
    /// Returns `None` for non-binary-string variants, and for prefixes with
    /// no finite upper bound (empty, or all bytes 0xFF). The result is
    /// always a `Bytes` value: incrementing the last byte of a valid UTF-8
    /// string does not necessarily produce one.
    pub fn prefix_end(&self) -> Option<SortableValue> {
        let bytes = match self {
            SortableValue::String(s) => s.as_bytes(),
            SortableValue::Bytes(b) => b.as_slice(),
            _ => return None,
        };
        binary::prefix_end(bytes).map(SortableValue::Bytes)
    }

    /// Convert into the equivalent [`Value`].
    pub fn into_value(self) -> Value {
        match self {
            SortableValue::String(v) => Value::String(v),
            SortableValue::Bytes(v) => Value::Bytes(v),
            SortableValue::Int(v) => Value::Int(v),
            SortableValue::UInt(v) => Value::UInt(v),
            SortableValue::Bool(v) => Value::Bool(v),
            SortableValue::Time(v) => Value::Time(v),
        }
    }
}

impl From<SortableValue> for Value {
    fn from(v: SortableValue) -> Value {
        v.into_value()
    }
}

macro_rules! value_from {
    ($($native:ty => $value:ident :: $variant:ident ( $conv:expr )),* $(,)?) => {
        $(impl From<$native> for $value {
            fn from(v: $native) -> $value {
                $value::$variant($conv(v))
            }
        })*
    };
}

value_from! {
    String => Value::String(std::convert::identity),
    &str => Value::String(str::to_string),
    Vec<u8> => Value::Bytes(std::convert::identity),
    i64 => Value::Int(std::convert::identity),
    u64 => Value::UInt(std::convert::identity),
    f64 => Value::Float(std::convert::identity),
    bool => Value::Bool(std::convert::identity),
    DateTime<Utc> => Value::Time(std::convert::identity),
}

value_from! {
    String => SortableValue::String(std::convert::identity),
    &str => SortableValue::String(str::to_string),
    Vec<u8> => SortableValue::Bytes(std::convert::identity),
    i64 => SortableValue::Int(std::convert::identity),
    u64 => SortableValue::UInt(std::convert::identity),
    bool => SortableValue::Bool(std::convert::identity),
    DateTime<Utc> => SortableValue::Time(std::convert::identity),
}

impl ValueType {
    /// Decode a value of this type from its binary (payload) encoding.
    pub fn unmarshal_binary(&self, data: &[u8]) -> Result<Value, ValueError> {
        binary::unmarshal(*self, data)
    }

    /// The sortable descriptor, if values of this type are sortable.
    pub fn as_sortable(&self) -> Option<SortableType> {
        match self {
            ValueType::String => Some(SortableType::String),
            ValueType::Bytes => Some(SortableType::Bytes),
            ValueType::Int => Some(SortableType::Int),
            ValueType::UInt => Some(SortableType::UInt),
            ValueType::Bool => Some(SortableType::Bool),
            ValueType::Time => Some(SortableType::Time),
            ValueType::Float => None,
        }
    }
}

impl SortableType {
    /// Decode a value of this type from its order-preserving encoding.
    pub fn unmarshal_sortable(&self, data: &[u8]) -> Result<SortableValue, ValueError> {
        sortable::unmarshal(*self, data)
    }

    /// The plain value descriptor for this sortable type.
    pub fn as_value_type(&self) -> ValueType {
        match self {
            SortableType::String => ValueType::String,
            SortableType::Bytes => ValueType::Bytes,
            SortableType::Int => ValueType::Int,
            SortableType::UInt => ValueType::UInt,
            SortableType::Bool => ValueType::Bool,
            SortableType::Time => ValueType::Time,
        }
    }
}

impl From<SortableType> for ValueType {
    fn from(t: SortableType) -> ValueType {
        t.as_value_type()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn float_is_not_sortable() {
        assert_eq!(Value::Float(1.5).into_sortable(), None);
        assert_eq!(ValueType::Float.as_sortable(), None);
    }

    #[test]
    fn sortable_roundtrips_through_value() {
        let vals = [
            SortableValue::String("foo".to_string()),
            SortableValue::Bytes(b"b\x00r".to_vec()),
            SortableValue::Int(-42),
            SortableValue::UInt(42),
            SortableValue::Bool(false),
            SortableValue::Time(Utc.timestamp_opt(123, 456).unwrap()),
        ];
        for v in vals {
            let through = v.clone().into_value().into_sortable().unwrap();
            assert_eq!(through, v);
        }
    }

    #[test]
    fn prefix_end_only_for_binary_strings() {
        assert!(SortableValue::Int(1).prefix_end().is_none());
        assert!(SortableValue::Bool(true).prefix_end().is_none());

        let end = SortableValue::String("a".to_string()).prefix_end().unwrap();
        assert_eq!(end, SortableValue::Bytes(b"b".to_vec()));
    }

    #[test]
    fn prefix_end_saturated() {
        assert!(SortableValue::Bytes(vec![0xFF, 0xFF]).prefix_end().is_none());
        assert!(SortableValue::Bytes(Vec::new()).prefix_end().is_none());
    }

    #[test]
    fn compare_matches_natural_order_within_variant() {
        assert_eq!(
            SortableValue::Int(-5).compare(&SortableValue::Int(3)),
            Ordering::Less
        );
        assert_eq!(
            SortableValue::UInt(7).compare(&SortableValue::UInt(7)),
            Ordering::Equal
        );
        assert_eq!(
            SortableValue::String("b".into()).compare(&SortableValue::String("a".into())),
            Ordering::Greater
        );
    }

    #[test]
    fn compare_string_against_prefix_end_bytes() {
        // "a" < prefix_end("a") == Bytes("b") < "c"
        let end = SortableValue::String("a".to_string()).prefix_end().unwrap();
        assert_eq!(
            SortableValue::String("a".into()).compare(&end),
            Ordering::Less
        );
        assert_eq!(
            SortableValue::String("c".into()).compare(&end),
            Ordering::Greater
        );
    }
}
