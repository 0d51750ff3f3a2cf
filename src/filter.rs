use bit_vec::BitVec;

/// Index of a dimension inside a [`FilterSet`].
pub type DimensionId = usize;

/// Per-dimension exclusion masks over a fixed record set.
///
/// Bit `r` of mask `d` is set when record `r` fails dimension `d`'s predicate.
/// A record is visible to an aggregate when no mask other than the
/// aggregate's own dimension has its bit set.
pub struct FilterSet {
    len: usize,
    masks: Vec<BitVec>,
    generations: Vec<u64>,
}

impl FilterSet {
    /// Create an empty filter set for `len` records.
    pub fn new(len: usize) -> Self {
        Self {
            len,
            masks: Vec::new(),
            generations: Vec::new(),
        }
    }

    pub fn record_count(&self) -> usize {
        self.len
    }

    /// Register a new dimension with nothing excluded.
    pub fn add_dimension(&mut self) -> DimensionId {
        self.masks.push(BitVec::from_elem(self.len, false));
        self.generations.push(0);
        self.masks.len() - 1
    }

    /// Replace a dimension's mask and advance its generation.
    pub fn replace(&mut self, dimension: DimensionId, mask: BitVec) {
        debug_assert_eq!(mask.len(), self.len);
        self.masks[dimension] = mask;
        self.generations[dimension] = self.generations[dimension].wrapping_add(1);
    }

    /// Whether `record` fails `dimension`'s own predicate.
    pub fn is_excluded(&self, dimension: DimensionId, record: usize) -> bool {
        self.masks[dimension].get(record).unwrap_or(false)
    }

    /// Records hidden by every dimension except `except`.
    ///
    /// Built word-wise, so cost is proportional to records / 32 per dimension.
    pub fn hidden_except(&self, except: Option<DimensionId>) -> BitVec {
        let mut hidden = BitVec::from_elem(self.len, false);
        for (id, mask) in self.masks.iter().enumerate() {
            if Some(id) != except && mask.any() {
                hidden.or(mask);
            }
        }
        hidden
    }

    /// Whether `record` passes every filter other than `except`.
    pub fn passes_except(&self, record: usize, except: Option<DimensionId>) -> bool {
        self.masks
            .iter()
            .enumerate()
            .all(|(id, mask)| Some(id) == except || !mask.get(record).unwrap_or(false))
    }

    /// Number of records passing every filter.
    pub fn visible_count(&self) -> usize {
        self.hidden_except(None).iter().filter(|hidden| !hidden).count()
    }

    /// Generation vector with `except`'s own slot blanked out.
    /// Aggregates compare stamps to decide whether they are stale.
    pub fn stamp_except(&self, except: DimensionId) -> Vec<u64> {
        self.generations
            .iter()
            .enumerate()
            .map(|(id, g)| if id == except { 0 } else { *g })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(bits: &[bool]) -> BitVec {
        let mut v = BitVec::from_elem(bits.len(), false);
        for (i, b) in bits.iter().enumerate() {
            v.set(i, *b);
        }
        v
    }

    #[test]
    fn own_dimension_does_not_hide_its_records() {
        let mut filters = FilterSet::new(4);
        let a = filters.add_dimension();
        let b = filters.add_dimension();
        filters.replace(a, mask(&[true, false, false, false]));
        filters.replace(b, mask(&[false, true, false, false]));

        assert!(filters.passes_except(0, Some(a)));
        assert!(!filters.passes_except(0, Some(b)));
        assert!(!filters.passes_except(1, None));
        assert_eq!(filters.visible_count(), 2);

        let hidden = filters.hidden_except(Some(b));
        assert_eq!(hidden, mask(&[true, false, false, false]));
    }

    #[test]
    fn stamps_ignore_own_generation() {
        let mut filters = FilterSet::new(2);
        let a = filters.add_dimension();
        let b = filters.add_dimension();
        let before = filters.stamp_except(a);
        filters.replace(a, mask(&[true, false]));
        assert_eq!(filters.stamp_except(a), before);
        filters.replace(b, mask(&[true, false]));
        assert_ne!(filters.stamp_except(a), before);
    }
}
