//! Track which fields of a model were explicitly assigned ("set").
//!
//! Only set fields take part in generated INSERT/UPDATE statements; values
//! stored by materialization stay unset so re-saving a loaded model writes
//! nothing it did not change.

/// A compact bitset representing "field is set" for indices `0..len`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldsSet {
    len: usize,
    bits: Box<[u64]>,
}

impl FieldsSet {
    /// Create an empty (all-unset) set for `len` fields.
    #[must_use]
    pub fn empty(len: usize) -> Self {
        Self {
            len,
            bits: vec![0u64; len.div_ceil(64)].into_boxed_slice(),
        }
    }

    /// Number of fields represented by this set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True if `len == 0`.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Mark a field index as set. Out-of-range indices are ignored.
    pub fn set(&mut self, idx: usize) {
        if idx >= self.len {
            return;
        }
        if let Some(w) = self.bits.get_mut(idx / 64) {
            *w |= 1u64 << (idx % 64);
        }
    }

    /// Check whether a field index is set.
    #[must_use]
    pub fn is_set(&self, idx: usize) -> bool {
        if idx >= self.len {
            return false;
        }
        self.bits
            .get(idx / 64)
            .is_some_and(|w| (w & (1u64 << (idx % 64))) != 0)
    }

    /// True if no field is set.
    #[must_use]
    pub fn none_set(&self) -> bool {
        self.bits.iter().all(|w| *w == 0)
    }

    /// Indices of all set fields, ascending.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|idx| self.is_set(*idx))
    }
}
