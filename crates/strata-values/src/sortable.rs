//! Order-preserving encoding.
//!
//! For two values of the same variant, `a < b` iff
//! `marshal(a) < marshal(b)` in byte-wise lexicographic order:
//!
//! - `String`/`Bytes`: verbatim bytes.
//! - `Int`: biased to unsigned (`v + 2^63`, i.e. the sign bit flipped),
//!   big-endian 8 bytes — `i64::MIN` becomes `00…0`, `0` becomes `80…0`,
//!   `i64::MAX` becomes `FF…F`.
//! - `UInt`: big-endian 8 bytes.
//! - `Bool`: one byte, 0 or 1.
//! - `Time`: the `Int` rule applied to the nanosecond offset from the
//!   Unix epoch.

use snafu::ensure;

use crate::binary;
use crate::value::SortableType;
use crate::value::SortableValue;
use crate::UnexpectedSizeSnafu;
use crate::ValueError;

/// Bias added to a signed 64-bit value to map it onto unsigned order.
const SIGN_BIAS: u64 = 1 << 63;

/// Encode a value with the order-preserving encoding.
pub fn marshal(v: &SortableValue) -> Vec<u8> {
    let mut buf = Vec::new();
    marshal_into(v, &mut buf);
    buf
}

/// Encode a value with the order-preserving encoding, appending to `buf`.
pub fn marshal_into(v: &SortableValue, buf: &mut Vec<u8>) {
    match v {
        SortableValue::String(s) => buf.extend_from_slice(s.as_bytes()),
        SortableValue::Bytes(b) => buf.extend_from_slice(b),
        SortableValue::Int(i) => buf.extend_from_slice(&bias(*i).to_be_bytes()),
        SortableValue::UInt(u) => buf.extend_from_slice(&u.to_be_bytes()),
        SortableValue::Bool(b) => buf.push(u8::from(*b)),
        SortableValue::Time(t) => {
            let nanos = t.timestamp_nanos_opt().unwrap_or_else(|| {
                // Out-of-range instants cannot come from unmarshal; clamp
                // rather than panic for hand-built ones.
                if t.timestamp() < 0 { i64::MIN } else { i64::MAX }
            });
            buf.extend_from_slice(&bias(nanos).to_be_bytes());
        }
    }
}

/// Decode a value of type `ty` from its order-preserving encoding.
pub fn unmarshal(ty: SortableType, data: &[u8]) -> Result<SortableValue, ValueError> {
    match ty {
        SortableType::String => {
            let s = std::str::from_utf8(data)
                .map_err(|source| ValueError::InvalidUtf8 { source })?;
            Ok(SortableValue::String(s.to_string()))
        }
        SortableType::Bytes => Ok(SortableValue::Bytes(data.to_vec())),
        SortableType::Int => Ok(SortableValue::Int(unbias(be_u64(data)?))),
        SortableType::UInt => Ok(SortableValue::UInt(be_u64(data)?)),
        SortableType::Bool => {
            ensure!(
                data.len() == 1,
                UnexpectedSizeSnafu {
                    want: 1usize,
                    got: data.len(),
                }
            );
            Ok(SortableValue::Bool(data[0] != 0))
        }
        SortableType::Time => {
            let nanos = unbias(be_u64(data)?);
            let secs = nanos.div_euclid(1_000_000_000);
            let subsec = nanos.rem_euclid(1_000_000_000) as u32;
            binary::time_from_parts(secs, subsec).map(SortableValue::Time)
        }
    }
}

fn bias(v: i64) -> u64 {
    (v as u64) ^ SIGN_BIAS
}

fn unbias(u: u64) -> i64 {
    (u ^ SIGN_BIAS) as i64
}

fn be_u64(data: &[u8]) -> Result<u64, ValueError> {
    let bytes: [u8; 8] = data.try_into().map_err(|_| ValueError::UnexpectedSize {
        want: 8,
        got: data.len(),
    })?;
    Ok(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;

    use super::*;

    fn roundtrip(v: SortableValue) {
        let data = marshal(&v);
        let back = unmarshal(v.sortable_type(), &data).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn roundtrip_all_variants() {
        roundtrip(SortableValue::String("hello".to_string()));
        roundtrip(SortableValue::Bytes(b"b\x00r".to_vec()));
        roundtrip(SortableValue::Int(i64::MIN));
        roundtrip(SortableValue::Int(-1));
        roundtrip(SortableValue::Int(0));
        roundtrip(SortableValue::Int(1));
        roundtrip(SortableValue::Int(i64::MAX));
        roundtrip(SortableValue::UInt(0));
        roundtrip(SortableValue::UInt(u64::MAX));
        roundtrip(SortableValue::Bool(true));
        roundtrip(SortableValue::Bool(false));
        roundtrip(SortableValue::Time(Utc.timestamp_opt(123, 456).unwrap()));
        roundtrip(SortableValue::Time(Utc.timestamp_opt(-5, 999_999_999).unwrap()));
    }

    #[test]
    fn int_bias_landmarks() {
        assert_eq!(marshal(&SortableValue::Int(i64::MIN)), vec![0; 8]);
        assert_eq!(
            marshal(&SortableValue::Int(0)),
            vec![0x80, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(marshal(&SortableValue::Int(i64::MAX)), vec![0xFF; 8]);
    }

    #[test]
    fn int_encoded_order() {
        let order = [i64::MIN, -1, 0, 1, i64::MAX];
        let encoded: Vec<_> = order
            .iter()
            .map(|&v| marshal(&SortableValue::Int(v)))
            .collect();
        for pair in encoded.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn uint_is_big_endian() {
        assert_eq!(
            marshal(&SortableValue::UInt(0x0102_0304_0506_0708)),
            vec![1, 2, 3, 4, 5, 6, 7, 8]
        );
    }

    #[test]
    fn time_orders_like_nanos() {
        let early = SortableValue::Time(Utc.timestamp_opt(-5, 0).unwrap());
        let epoch = SortableValue::Time(Utc.timestamp_opt(0, 0).unwrap());
        let late = SortableValue::Time(Utc.timestamp_opt(5, 1).unwrap());
        assert!(marshal(&early) < marshal(&epoch));
        assert!(marshal(&epoch) < marshal(&late));
    }

    #[test]
    fn int_rejects_wrong_size() {
        assert!(matches!(
            unmarshal(SortableType::Int, &[0; 7]),
            Err(ValueError::UnexpectedSize { want: 8, got: 7 })
        ));
    }
}
