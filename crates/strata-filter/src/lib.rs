//! Value predicates used by tuple filters.
//!
//! A [`ValueFilter`] decides whether a single value matches. Filters over
//! sortable values can additionally describe themselves as a [`Range`] of
//! sortable values, which the tuple engine uses to narrow the key prefix of
//! a scan instead of visiting every row.
//!
//! A missing value (a key shorter than the filter vector) is passed as
//! `None`. Bounds match an absent value, equality does not; the scan
//! planner relies on both conventions.

use std::cmp::Ordering;

use strata_values::SortableValue;
use strata_values::Value;

/// A predicate over a single value.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueFilter {
    /// Matches any present value.
    Any,
    /// Matches a value equal to the given one (same variant, same bytes).
    Equal(Value),
    /// Matches sortable values below the bound.
    Less(Bound),
    /// Matches sortable values above the bound.
    Greater(Bound),
    /// Matches sortable values between two optional bounds.
    Range(Range),
    /// Matches when every inner filter matches.
    And(Vec<ValueFilter>),
    /// Matches when at least one inner filter matches.
    Or(Vec<ValueFilter>),
    /// Inverts the inner filter.
    Not(Box<ValueFilter>),
}

/// One endpoint of a range.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub value: SortableValue,
    pub inclusive: bool,
}

/// A range of sortable values; either endpoint may be absent.
///
/// `start` is a lower bound (as in [`ValueFilter::Greater`]) and `end` an
/// upper bound (as in [`ValueFilter::Less`]).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Range {
    pub start: Option<Bound>,
    pub end: Option<Bound>,
}

/// Shorthand for [`ValueFilter::Equal`].
pub fn eq(v: impl Into<Value>) -> ValueFilter {
    ValueFilter::Equal(v.into())
}

/// "Less than" filter.
pub fn lt(v: SortableValue) -> ValueFilter {
    ValueFilter::Less(Bound {
        value: v,
        inclusive: false,
    })
}

/// "Less than or equal" filter.
pub fn lte(v: SortableValue) -> ValueFilter {
    ValueFilter::Less(Bound {
        value: v,
        inclusive: true,
    })
}

/// "Greater than" filter.
pub fn gt(v: SortableValue) -> ValueFilter {
    ValueFilter::Greater(Bound {
        value: v,
        inclusive: false,
    })
}

/// "Greater than or equal" filter.
pub fn gte(v: SortableValue) -> ValueFilter {
    ValueFilter::Greater(Bound {
        value: v,
        inclusive: true,
    })
}

/// Binary-string prefix filter: everything in `[p, prefix_end(p))`, or
/// `>= p` when the prefix has no finite upper bound.
///
/// `p` must be a binary-string value (`String` or `Bytes`); other variants
/// yield a filter that matches nothing.
pub fn prefix(p: SortableValue) -> ValueFilter {
    if !p.is_binary_string() {
        return ValueFilter::Or(Vec::new());
    }
    let end = p.prefix_end();
    let start = Bound {
        value: p,
        inclusive: true,
    };
    match end {
        Some(end) => ValueFilter::Range(Range {
            start: Some(start),
            end: Some(Bound {
                value: end,
                inclusive: false,
            }),
        }),
        None => ValueFilter::Greater(start),
    }
}

impl ValueFilter {
    /// Check a (possibly missing) value against the filter.
    pub fn matches(&self, v: Option<&Value>) -> bool {
        match self {
            ValueFilter::Any => v.is_some(),
            ValueFilter::Equal(want) => match v {
                Some(got) => values_equal(want, got),
                None => false,
            },
            ValueFilter::Less(bound) => match_sortable(v, |s| bound.matches_upper(s)),
            ValueFilter::Greater(bound) => match_sortable(v, |s| bound.matches_lower(s)),
            ValueFilter::Range(range) => match v {
                None => range.start.is_some(),
                Some(val) => match val.as_sortable() {
                    Some(s) => range.contains(&s),
                    None => false,
                },
            },
            ValueFilter::And(filters) => filters.iter().all(|f| f.matches(v)),
            ValueFilter::Or(filters) => filters.iter().any(|f| f.matches(v)),
            ValueFilter::Not(inner) => !inner.matches(v),
        }
    }

    /// Check a (possibly missing) sortable value against the filter.
    pub fn matches_sortable(&self, v: Option<&SortableValue>) -> bool {
        let owned = v.map(|s| s.clone().into_value());
        self.matches(owned.as_ref())
    }

    /// The range of sortable values matching this filter, if it has one.
    ///
    /// Used by the scan planner; combinators and non-sortable equality
    /// return `None` and fall back to per-row evaluation.
    pub fn sortable_range(&self) -> Option<Range> {
        match self {
            ValueFilter::Equal(v) => {
                let s = v.as_sortable()?;
                Some(Range {
                    start: Some(Bound {
                        value: s.clone(),
                        inclusive: true,
                    }),
                    end: Some(Bound {
                        value: s,
                        inclusive: true,
                    }),
                })
            }
            ValueFilter::Less(bound) => Some(Range {
                start: None,
                end: Some(bound.clone()),
            }),
            ValueFilter::Greater(bound) => Some(Range {
                start: Some(bound.clone()),
                end: None,
            }),
            ValueFilter::Range(range) => Some(range.clone()),
            _ => None,
        }
    }
}

impl Bound {
    fn matches_upper(&self, v: &SortableValue) -> bool {
        match v.compare(&self.value) {
            Ordering::Less => true,
            Ordering::Equal => self.inclusive,
            Ordering::Greater => false,
        }
    }

    fn matches_lower(&self, v: &SortableValue) -> bool {
        match v.compare(&self.value) {
            Ordering::Greater => true,
            Ordering::Equal => self.inclusive,
            Ordering::Less => false,
        }
    }
}

impl Range {
    /// Whether the value lies within the range.
    pub fn contains(&self, v: &SortableValue) -> bool {
        if let Some(start) = &self.start {
            if !start.matches_lower(v) {
                return false;
            }
        }
        if let Some(end) = &self.end {
            if !end.matches_upper(v) {
                return false;
            }
        }
        true
    }

    /// If the range exactly covers all binary strings with some prefix,
    /// return that prefix.
    ///
    /// Such a range has an inclusive binary-string start whose `prefix_end`
    /// is the exclusive end (or no end at all when `prefix_end` does not
    /// exist).
    pub fn as_prefix(&self) -> Option<&SortableValue> {
        let start = self.start.as_ref()?;
        if !start.inclusive || !start.value.is_binary_string() {
            return None;
        }
        match (start.value.prefix_end(), &self.end) {
            (None, None) => Some(&start.value),
            (Some(pe), Some(end)) if !end.inclusive && pe.compare(&end.value) == Ordering::Equal => {
                Some(&start.value)
            }
            _ => None,
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        // Floats compare bitwise for filter purposes; NaN matches NaN.
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

fn match_sortable(v: Option<&Value>, f: impl FnOnce(&SortableValue) -> bool) -> bool {
    match v {
        // Bounds accept missing segments, as the scan planner relies on.
        None => true,
        Some(val) => match val.as_sortable() {
            Some(s) => f(&s),
            None => false,
        },
    }
}
