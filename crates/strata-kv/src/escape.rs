//! Reversible, order-preserving serialization of hierarchical keys onto
//! flat byte keys.
//!
//! Segments are joined with `/` (0x2F); occurrences of `/` and the escape
//! byte `\` (0x5C) inside a segment are prefixed with `\`. Because `\`
//! sorts after `/`, an escaped separator inside a longer segment sorts
//! after a real segment boundary, so a key that is a proper prefix of
//! another stays ahead of it after escaping.
//!
//! A trailing separator (an empty final segment) never round-trips: it is
//! the open-prefix marker used for region scans ("everything under this
//! key"), not addressable data, and [`unescape`] drops it.
//!
//! # Example
//!
//! ```
//! use strata_kv::escape::{escape, unescape};
//! use strata_kv::Key;
//!
//! let key = Key::from_strings(["a/b", "c"]);
//! let flat = escape(&key);
//! assert_eq!(flat, b"a\\/b/c".to_vec());
//! assert_eq!(unescape(&flat), key);
//! ```

use crate::key::Key;

/// Segment separator in the flat encoding.
pub const SEP: u8 = b'/';

/// Escape byte; must sort above [`SEP`] for order preservation.
pub const ESC: u8 = b'\\';

/// Serialize a hierarchical key to a flat key.
pub fn escape(key: &Key) -> Vec<u8> {
    let mut out = Vec::with_capacity(flat_len(key));
    for (i, seg) in key.segments().enumerate() {
        if i != 0 {
            out.push(SEP);
        }
        for &b in seg {
            if b == ESC || b == SEP {
                out.push(ESC);
            }
            out.push(b);
        }
    }
    out
}

/// Recover a hierarchical key from its flat encoding.
///
/// Inverse of [`escape`] except for a trailing empty segment (see the
/// module docs). A dangling escape byte at the end of the input is ignored.
pub fn unescape(data: &[u8]) -> Key {
    let mut segments: Vec<Vec<u8>> = Vec::new();
    let mut current: Option<Vec<u8>> = None;

    let mut i = 0;
    while i < data.len() {
        match data[i] {
            ESC => {
                if let Some(&next) = data.get(i + 1) {
                    current.get_or_insert_with(Vec::new).push(next);
                }
                i += 2;
            }
            SEP => {
                segments.push(current.take().unwrap_or_default());
                i += 1;
            }
            b => {
                current.get_or_insert_with(Vec::new).push(b);
                i += 1;
            }
        }
    }
    if let Some(last) = current {
        segments.push(last);
    }

    Key::from(segments)
}

fn flat_len(key: &Key) -> usize {
    let bytes: usize = key.segments().map(<[u8]>::len).sum();
    bytes + key.len().saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(key: Key) {
        assert_eq!(unescape(&escape(&key)), key);
    }

    #[test]
    fn plain_segments() {
        roundtrip(Key::from_strings(["a"]));
        roundtrip(Key::from_strings(["a", "b", "c"]));
    }

    #[test]
    fn separators_and_escapes_inside_segments() {
        roundtrip(Key::from_strings(["a/b"]));
        roundtrip(Key::from_strings(["a\\b"]));
        roundtrip(Key::from_strings(["\\", "/"]));
        roundtrip(Key::from_strings(["\\/", "/\\"]));
    }

    #[test]
    fn adversarial_vector() {
        // Both segments mix separators and escapes in every position.
        roundtrip(Key::from_strings(["\\/aa/b\\b/c/d/\\", "/aa/b\\b/c/d/"]));
    }

    #[test]
    fn empty_middle_segment_roundtrips() {
        roundtrip(Key::from_segments([b"a".to_vec(), Vec::new(), b"b".to_vec()]));
    }

    #[test]
    fn trailing_empty_segment_is_open_prefix() {
        let marker = Key::from_segments([b"a".to_vec(), Vec::new()]);
        let flat = escape(&marker);
        assert_eq!(flat, b"a/".to_vec());
        // The marker itself decodes without the trailing empty segment.
        assert_eq!(unescape(&flat), Key::from_strings(["a"]));
        // Every child of "a" starts with the marker bytes; "a" itself and
        // its siblings do not.
        assert!(escape(&Key::from_strings(["a", "x"])).starts_with(&flat));
        assert!(!escape(&Key::from_strings(["a"])).starts_with(&flat));
        assert!(!escape(&Key::from_strings(["ab"])).starts_with(&flat));
    }

    #[test]
    fn proper_prefix_sorts_before_extension() {
        let short = escape(&Key::from_strings(["a", "b"]));
        let long = escape(&Key::from_strings(["a", "b", "c"]));
        assert!(short < long);
    }

    #[test]
    fn segment_boundary_sorts_before_escaped_separator() {
        // ["a"] < ["a/"]: the bare separator (0x2F) in the extension of the
        // flat form sorts below the escape byte (0x5C).
        let a_then_x = escape(&Key::from_strings(["a", "x"]));
        let a_slash = escape(&Key::from_strings(["a/"]));
        assert!(a_then_x < a_slash);
    }

    #[test]
    fn partial_segment_prefix_matches_extensions() {
        let prefix = escape(&Key::from_strings(["b", "a"]));
        assert!(escape(&Key::from_strings(["b", "a"])).starts_with(&prefix));
        assert!(escape(&Key::from_strings(["b", "a1"])).starts_with(&prefix));
        assert!(!escape(&Key::from_strings(["b", "b"])).starts_with(&prefix));
    }

    #[test]
    fn empty_key_is_empty_bytes() {
        assert_eq!(escape(&Key::new()), Vec::<u8>::new());
        assert_eq!(unescape(&[]), Key::new());
    }
}
