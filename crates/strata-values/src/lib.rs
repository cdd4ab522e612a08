//! Typed values with binary and order-preserving encodings.
//!
//! This crate is the bottom layer of the strata stack. It defines the closed
//! set of primitive value variants stored in tuple tables and the two byte
//! encodings every variant carries:
//!
//! 1. **Binary** — a compact payload encoding with no ordering guarantees
//!    (varints for integers, raw IEEE-754 bits for floats). Used for row
//!    payloads where order does not matter.
//!
//! 2. **Sortable** — an order-preserving encoding: for two values of the
//!    same variant, `a < b` iff `encode(a) < encode(b)` byte-wise. Used for
//!    primary-key segments so that a plain lexicographic key scan visits
//!    rows in key order.
//!
//! `Float` has no sortable form (IEEE-754 bits do not sort), which is
//! enforced at the type level: [`SortableValue`] simply has no float
//! variant, so a float can never become a key segment.
//!
//! # Example
//!
//! ```
//! use strata_values::{SortableValue, SortableType};
//!
//! let a = SortableValue::Int(-1);
//! let b = SortableValue::Int(1);
//! assert!(a.marshal_sortable() < b.marshal_sortable());
//!
//! let back = SortableType::Int.unmarshal_sortable(&a.marshal_sortable()).unwrap();
//! assert_eq!(back, a);
//! ```

mod binary;
mod sortable;
mod value;
mod varint;

pub use binary::prefix_end;
pub use value::SortableType;
pub use value::SortableValue;
pub use value::Value;
pub use value::ValueType;
pub use varint::read_uvarint;
pub use varint::write_uvarint;

use snafu::Snafu;

/// Errors produced while decoding values from either encoding.
#[derive(Debug, Clone, Snafu)]
#[non_exhaustive]
pub enum ValueError {
    /// Encoded value has a different size than the type requires.
    #[snafu(display("unexpected value size: {got}, want {want}"))]
    UnexpectedSize { want: usize, got: usize },

    /// Varint ran past the end of the buffer.
    #[snafu(display("unexpected end of varint"))]
    UnexpectedEnd,

    /// Varint encodes a number that does not fit in 64 bits.
    #[snafu(display("varint overflows 64 bits"))]
    Overflow,

    /// Input contains bytes past the end of the encoded value.
    #[snafu(display("unexpected trailing data: {extra} bytes"))]
    TrailingData { extra: usize },

    /// String value is not valid UTF-8.
    #[snafu(display("invalid UTF-8 in string value"))]
    InvalidUtf8 { source: std::str::Utf8Error },

    /// Encoded timestamp cannot be represented.
    #[snafu(display("timestamp out of range"))]
    TimeOutOfRange,
}
