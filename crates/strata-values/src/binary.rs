//! Binary (payload) encoding.
//!
//! Compact and order-free: integers are varints, floats raw IEEE-754 bits,
//! timestamps a fixed 12-byte seconds+nanos pair. Used for row payload
//! fields where byte order never matters. Encodings do not include their own
//! length; the caller frames them.

use chrono::DateTime;
use chrono::TimeZone;
use chrono::Utc;
use snafu::ensure;
use snafu::ResultExt;

use crate::value::Value;
use crate::value::ValueType;
use crate::varint;
use crate::InvalidUtf8Snafu;
use crate::TrailingDataSnafu;
use crate::UnexpectedSizeSnafu;
use crate::ValueError;

/// Encode a value with the binary encoding.
pub fn marshal(v: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    marshal_into(v, &mut buf);
    buf
}

/// Encode a value with the binary encoding, appending to `buf`.
pub fn marshal_into(v: &Value, buf: &mut Vec<u8>) {
    match v {
        Value::String(s) => buf.extend_from_slice(s.as_bytes()),
        Value::Bytes(b) => buf.extend_from_slice(b),
        Value::Int(i) => varint::write_varint(buf, *i),
        Value::UInt(u) => varint::write_uvarint(buf, *u),
        Value::Float(f) => buf.extend_from_slice(&f.to_bits().to_le_bytes()),
        Value::Bool(b) => buf.push(u8::from(*b)),
        Value::Time(t) => {
            buf.extend_from_slice(&t.timestamp().to_be_bytes());
            buf.extend_from_slice(&t.timestamp_subsec_nanos().to_be_bytes());
        }
    }
}

/// Decode a value of type `ty` from its binary encoding.
///
/// The whole of `data` must be consumed.
pub fn unmarshal(ty: ValueType, data: &[u8]) -> Result<Value, ValueError> {
    match ty {
        ValueType::String => {
            let s = std::str::from_utf8(data).context(InvalidUtf8Snafu)?;
            Ok(Value::String(s.to_string()))
        }
        ValueType::Bytes => Ok(Value::Bytes(data.to_vec())),
        ValueType::Int => {
            let (v, n) = varint::read_varint(data)?;
            ensure_consumed(data.len(), n)?;
            Ok(Value::Int(v))
        }
        ValueType::UInt => {
            let (v, n) = varint::read_uvarint(data)?;
            ensure_consumed(data.len(), n)?;
            Ok(Value::UInt(v))
        }
        ValueType::Float => {
            let bytes = fixed::<8>(data)?;
            Ok(Value::Float(f64::from_bits(u64::from_le_bytes(bytes))))
        }
        ValueType::Bool => {
            let bytes = fixed::<1>(data)?;
            Ok(Value::Bool(bytes[0] != 0))
        }
        ValueType::Time => {
            ensure!(
                data.len() == 12,
                UnexpectedSizeSnafu {
                    want: 12usize,
                    got: data.len(),
                }
            );
            let secs = i64::from_be_bytes(data[..8].try_into().expect("8 bytes"));
            let nanos = u32::from_be_bytes(data[8..].try_into().expect("4 bytes"));
            time_from_parts(secs, nanos).map(Value::Time)
        }
    }
}

/// The smallest byte string strictly greater than every string that starts
/// with `prefix`: increment the last byte below 0xFF and truncate after it.
///
/// Returns `None` when no finite upper bound exists (empty prefix, or all
/// bytes are 0xFF).
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(&last) = end.last() {
        if last < 0xFF {
            *end.last_mut().expect("non-empty") = last + 1;
            return Some(end);
        }
        end.pop();
    }
    None
}

pub(crate) fn time_from_parts(secs: i64, nanos: u32) -> Result<DateTime<Utc>, ValueError> {
    match Utc.timestamp_opt(secs, nanos) {
        chrono::LocalResult::Single(t) => Ok(t),
        _ => Err(ValueError::TimeOutOfRange),
    }
}

fn ensure_consumed(len: usize, n: usize) -> Result<(), ValueError> {
    ensure!(len == n, TrailingDataSnafu { extra: len - n });
    Ok(())
}

fn fixed<const N: usize>(data: &[u8]) -> Result<[u8; N], ValueError> {
    data.try_into().map_err(|_| ValueError::UnexpectedSize {
        want: N,
        got: data.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(v: Value) {
        let data = marshal(&v);
        let back = unmarshal(v.value_type(), &data).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn roundtrip_all_variants() {
        roundtrip(Value::String("hello".to_string()));
        roundtrip(Value::String(String::new()));
        roundtrip(Value::Bytes(b"b\x00r".to_vec()));
        roundtrip(Value::Bytes(Vec::new()));
        roundtrip(Value::Int(i64::MIN));
        roundtrip(Value::Int(-1));
        roundtrip(Value::Int(0));
        roundtrip(Value::Int(1));
        roundtrip(Value::Int(i64::MAX));
        roundtrip(Value::UInt(0));
        roundtrip(Value::UInt(u64::MAX));
        roundtrip(Value::Float(0.0));
        roundtrip(Value::Float(-1.5));
        roundtrip(Value::Float(f64::INFINITY));
        roundtrip(Value::Bool(true));
        roundtrip(Value::Bool(false));
        roundtrip(Value::Time(time_from_parts(123, 456).unwrap()));
        roundtrip(Value::Time(time_from_parts(-1, 999_999_999).unwrap()));
    }

    #[test]
    fn nan_roundtrips_bitwise() {
        let data = marshal(&Value::Float(f64::NAN));
        match unmarshal(ValueType::Float, &data).unwrap() {
            Value::Float(f) => assert!(f.is_nan()),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn int_rejects_trailing_bytes() {
        let mut data = marshal(&Value::Int(7));
        data.push(0);
        assert!(matches!(
            unmarshal(ValueType::Int, &data),
            Err(ValueError::TrailingData { extra: 1 })
        ));
    }

    #[test]
    fn string_rejects_invalid_utf8() {
        assert!(matches!(
            unmarshal(ValueType::String, &[0xFF, 0xFE]),
            Err(ValueError::InvalidUtf8 { .. })
        ));
    }

    #[test]
    fn bool_rejects_wrong_size() {
        assert!(matches!(
            unmarshal(ValueType::Bool, &[]),
            Err(ValueError::UnexpectedSize { want: 1, got: 0 })
        ));
        assert!(matches!(
            unmarshal(ValueType::Bool, &[1, 0]),
            Err(ValueError::UnexpectedSize { want: 1, got: 2 })
        ));
    }

    #[test]
    fn time_is_twelve_bytes() {
        let data = marshal(&Value::Time(time_from_parts(1, 2).unwrap()));
        assert_eq!(data.len(), 12);
    }

    #[test]
    fn prefix_end_increments_last_byte() {
        assert_eq!(prefix_end(b"abc"), Some(b"abd".to_vec()));
    }

    #[test]
    fn prefix_end_carries_over_ff() {
        assert_eq!(prefix_end(&[b'a', 0xFF, 0xFF]), Some(b"b".to_vec()));
    }

    #[test]
    fn prefix_end_unbounded() {
        assert_eq!(prefix_end(&[0xFF, 0xFF]), None);
        assert_eq!(prefix_end(&[]), None);
    }

    #[test]
    fn prefix_end_is_tight_bound() {
        // Everything with prefix p is < prefix_end(p), and prefix_end(p)
        // itself has no prefix p.
        let p = b"ab";
        let end = prefix_end(p).unwrap();
        for suffix in [&b""[..], b"\x00", b"zzz", &[0xFF, 0xFF]] {
            let mut k = p.to_vec();
            k.extend_from_slice(suffix);
            assert!(k < end, "{k:?} should sort below {end:?}");
        }
        assert!(!end.starts_with(p));
    }
}
