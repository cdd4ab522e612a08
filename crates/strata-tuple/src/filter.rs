//! Tuple filters: key and payload predicates combined.

use strata_filter::ValueFilter;

use crate::Data;
use crate::Key;
use crate::Tuple;

/// A tuple filter; `None` parts match everything.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub key: Option<KeyFilter>,
    pub data: Option<DataFilter>,
}

/// Predicate over a tuple's primary key.
#[derive(Debug, Clone)]
pub enum KeyFilter {
    /// Exact membership in a key set.
    Keys(Vec<Key>),
    /// Positional predicates over key values; a key shorter than the
    /// vector feeds `None` to the remaining filters.
    Fields(Vec<ValueFilter>),
}

/// Predicate over a tuple's payload.
#[derive(Debug, Clone)]
pub enum DataFilter {
    /// Positional predicates over payload values; a payload of a different
    /// length is rejected. `None` entries skip their position.
    Fields(Vec<Option<ValueFilter>>),
}

impl Filter {
    /// Filter on the key only.
    pub fn with_key(key: KeyFilter) -> Filter {
        Filter {
            key: Some(key),
            data: None,
        }
    }

    /// Filter on the payload only.
    pub fn with_data(data: DataFilter) -> Filter {
        Filter {
            key: None,
            data: Some(data),
        }
    }

    /// True when the filter matches every tuple.
    pub fn is_any(&self) -> bool {
        self.key.is_none() && self.data.is_none()
    }

    /// Check a key against the key part.
    pub fn matches_key(&self, key: &Key) -> bool {
        self.key.as_ref().is_none_or(|f| f.matches(key))
    }

    /// Check a payload against the data part.
    pub fn matches_data(&self, data: &Data) -> bool {
        self.data.as_ref().is_none_or(|f| f.matches(data))
    }

    /// Check a whole tuple.
    pub fn matches(&self, tuple: &Tuple) -> bool {
        self.matches_key(&tuple.key) && self.matches_data(&tuple.data)
    }
}

impl KeyFilter {
    /// Check a key against the predicate.
    pub fn matches(&self, key: &Key) -> bool {
        match self {
            KeyFilter::Keys(keys) => keys
                .iter()
                .any(|k| k.compare(key) == std::cmp::Ordering::Equal),
            KeyFilter::Fields(fields) => fields
                .iter()
                .enumerate()
                .all(|(i, f)| f.matches_sortable(key.get(i))),
        }
    }
}

impl DataFilter {
    /// Check a payload against the predicate.
    pub fn matches(&self, data: &Data) -> bool {
        match self {
            DataFilter::Fields(fields) => {
                if fields.len() != data.len() {
                    return false;
                }
                fields
                    .iter()
                    .zip(data.iter())
                    .all(|(f, v)| f.as_ref().is_none_or(|f| f.matches(Some(v))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use strata_filter::eq;
    use strata_filter::gte;
    use strata_filter::prefix;
    use strata_values::SortableValue;
    use strata_values::Value;

    use super::*;

    fn key(parts: &[&str]) -> Key {
        Key::from_strings(parts.iter().copied())
    }

    #[test]
    fn empty_filter_matches_everything() {
        let f = Filter::default();
        assert!(f.is_any());
        assert!(f.matches(&Tuple {
            key: key(&["a"]),
            data: vec![Value::Int(1)],
        }));
    }

    #[test]
    fn keys_filter_is_exact_membership() {
        let f = KeyFilter::Keys(vec![key(&["a"]), key(&["b"])]);
        assert!(f.matches(&key(&["a"])));
        assert!(f.matches(&key(&["b"])));
        assert!(!f.matches(&key(&["c"])));
        assert!(!f.matches(&key(&["a", "b"])));
    }

    #[test]
    fn field_filters_apply_positionally() {
        let f = KeyFilter::Fields(vec![
            eq(Value::String("a".to_string())),
            prefix(SortableValue::String("b".to_string())),
        ]);
        assert!(f.matches(&key(&["a", "b1"])));
        assert!(!f.matches(&key(&["a", "c"])));
        assert!(!f.matches(&key(&["x", "b1"])));
    }

    #[test]
    fn short_key_feeds_none_to_remaining_filters() {
        // Equality rejects a missing value; bounds accept it.
        let f = KeyFilter::Fields(vec![
            eq(Value::String("a".to_string())),
            eq(Value::String("b".to_string())),
        ]);
        assert!(!f.matches(&key(&["a"])));

        let f = KeyFilter::Fields(vec![
            eq(Value::String("a".to_string())),
            gte(SortableValue::String("b".to_string())),
        ]);
        assert!(f.matches(&key(&["a"])));
    }

    #[test]
    fn data_filter_rejects_length_mismatch() {
        let f = DataFilter::Fields(vec![Some(eq(Value::Int(1)))]);
        assert!(f.matches(&vec![Value::Int(1)]));
        assert!(!f.matches(&vec![Value::Int(1), Value::Int(2)]));
        assert!(!f.matches(&Vec::new()));
    }

    #[test]
    fn data_filter_none_slots_skip() {
        let f = DataFilter::Fields(vec![None, Some(eq(Value::Int(2)))]);
        assert!(f.matches(&vec![Value::Bool(true), Value::Int(2)]));
        assert!(!f.matches(&vec![Value::Bool(true), Value::Int(3)]));
    }
}
