//! Generic prefix fallback for cursors without native prefix support.

use super::seek;
use super::FlatCursor;
use crate::errors::KvError;

/// Restricts a base cursor to keys with a byte prefix.
///
/// On the first [`advance`](FlatCursor::advance) the base cursor is
/// positioned at the first key `>= prefix` (using its native seek when it
/// has one, the generic [`seek`] walk otherwise); iteration ends at the
/// first key outside the prefix, which is correct because keys are sorted.
pub struct PrefixCursor<C> {
    base: C,
    prefix: Vec<u8>,
    seeked: bool,
    done: bool,
}

impl<C: FlatCursor> PrefixCursor<C> {
    /// Wrap `base`, keeping only keys starting with `prefix`.
    pub fn new(base: C, prefix: impl Into<Vec<u8>>) -> PrefixCursor<C> {
        PrefixCursor {
            base,
            prefix: prefix.into(),
            seeked: false,
            done: false,
        }
    }

    /// Unwrap the base cursor.
    pub fn into_inner(self) -> C {
        self.base
    }
}

impl<C: FlatCursor> FlatCursor for PrefixCursor<C> {
    fn advance(&mut self) -> bool {
        if self.done {
            return false;
        }

        let more = if self.seeked {
            self.base.advance()
        } else {
            self.seeked = true;
            seek(&mut self.base, &self.prefix)
        };
        if !more {
            self.done = true;
            return false;
        }

        if self.base.key().starts_with(&self.prefix) {
            return true;
        }
        // Keys are sorted; the first key past the prefix ends the scan.
        self.done = true;
        false
    }

    fn key(&self) -> &[u8] {
        if self.done {
            &[]
        } else {
            self.base.key()
        }
    }

    fn val(&self) -> &[u8] {
        if self.done {
            &[]
        } else {
            self.base.val()
        }
    }

    fn reset(&mut self) {
        self.base.reset();
        self.seeked = false;
        self.done = false;
    }

    fn err(&self) -> Option<&KvError> {
        self.base.err()
    }
}
