use std::collections::BTreeSet;

use bit_vec::BitVec;
use ordered_float::OrderedFloat;

use crate::filter::{DimensionId, FilterSet};
use crate::group::Quantizer;
use crate::model::RecordStore;

/// A facet key. Totally ordered so it can live in sets and ranges.
pub type Key = OrderedFloat<f64>;

/// Half-open interval `[low, high)` over a key domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub low: f64,
    pub high: f64,
}

impl Extent {
    /// Create an extent, swapping bounds if needed.
    pub fn new(mut low: f64, mut high: f64) -> Self {
        if low > high {
            std::mem::swap(&mut low, &mut high);
        }
        Self { low, high }
    }

    pub fn width(&self) -> f64 {
        self.high - self.low
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value < self.high
    }

    pub fn is_finite(&self) -> bool {
        self.low.is_finite() && self.high.is_finite()
    }
}

/// Filter predicate over a dimension's keys. Pure and total.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Key is one of the listed keys.
    In(BTreeSet<Key>),
    /// Key's quantized bucket is one of the listed buckets.
    Buckets {
        keys: BTreeSet<Key>,
        quantizer: Quantizer,
    },
    /// `low <= key < high`.
    Range(Extent),
}

impl Predicate {
    pub fn test(&self, key: Key) -> bool {
        match self {
            Predicate::In(keys) => keys.contains(&key),
            Predicate::Buckets { keys, quantizer } => {
                keys.contains(&OrderedFloat(quantizer.slot(key.into_inner())))
            }
            Predicate::Range(extent) => extent.contains(key.into_inner()),
        }
    }
}

/// Filterable projection of every record to a key.
pub struct Dimension {
    id: DimensionId,
    keys: Vec<Key>,
    predicate: Option<Predicate>,
}

impl Dimension {
    /// Project every record through `key_fn` and register with `filters`.
    pub fn new<F>(store: &RecordStore, filters: &mut FilterSet, key_fn: F) -> Self
    where
        F: Fn(&crate::model::Record) -> f64,
    {
        let keys = store.iter().map(|r| OrderedFloat(key_fn(r))).collect();
        Self {
            id: filters.add_dimension(),
            keys,
            predicate: None,
        }
    }

    pub fn id(&self) -> DimensionId {
        self.id
    }

    pub fn key_of(&self, record: usize) -> Key {
        self.keys[record]
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    pub fn is_filtered(&self) -> bool {
        self.predicate.is_some()
    }

    /// Replace the active predicate. An unchanged predicate leaves the
    /// exclusion mask and generation untouched, so aggregates stay cached.
    pub fn set_filter(&mut self, filters: &mut FilterSet, predicate: Option<Predicate>) {
        if self.predicate == predicate {
            return;
        }

        let mut mask = BitVec::from_elem(self.keys.len(), false);
        if let Some(p) = &predicate {
            for (record, key) in self.keys.iter().enumerate() {
                if !p.test(*key) {
                    mask.set(record, true);
                }
            }
        }

        filters.replace(self.id, mask);
        self.predicate = predicate;
    }

    pub fn filter_all(&mut self, filters: &mut FilterSet) {
        self.set_filter(filters, None);
    }

    /// Whether this dimension's own predicate excludes `record`.
    pub fn is_excluded(&self, filters: &FilterSet, record: usize) -> bool {
        filters.is_excluded(self.id, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{trip, Field};

    fn store() -> RecordStore {
        RecordStore::load(vec![
            trip("2017-10-01", 6, 0, 10, -1.0),
            trip("2017-10-01", 7, 0, 10, 5.0),
            trip("2017-10-02", 8, 1, 11, 13.0),
        ])
        .unwrap()
    }

    #[test]
    fn range_is_half_open() {
        let p = Predicate::Range(Extent::new(7.0, 8.0));
        assert!(p.test(OrderedFloat(7.0)));
        assert!(p.test(OrderedFloat(7.5)));
        assert!(!p.test(OrderedFloat(8.0)));
    }

    #[test]
    fn bucket_membership_uses_floor() {
        let quantizer = Quantizer::new(-120.0, 600.0, 12.0);
        let p = Predicate::Buckets {
            keys: [OrderedFloat(-12.0)].into_iter().collect(),
            quantizer,
        };
        assert!(p.test(OrderedFloat(-1.0)));
        assert!(p.test(OrderedFloat(-12.0)));
        assert!(!p.test(OrderedFloat(0.0)));
    }

    #[test]
    fn set_filter_updates_mask_and_clears() {
        let store = store();
        let mut filters = FilterSet::new(store.len());
        let mut hour = Dimension::new(&store, &mut filters, |r| r.value(Field::Hour));

        hour.set_filter(&mut filters, Some(Predicate::Range(Extent::new(7.0, 9.0))));
        assert!(hour.is_excluded(&filters, 0));
        assert!(!hour.is_excluded(&filters, 1));
        assert_eq!(filters.visible_count(), 2);

        hour.filter_all(&mut filters);
        assert!(!hour.is_filtered());
        assert_eq!(filters.visible_count(), 3);
    }

    #[test]
    fn equal_predicate_keeps_generation() {
        let store = store();
        let mut filters = FilterSet::new(store.len());
        let other = filters.add_dimension();
        let mut hour = Dimension::new(&store, &mut filters, |r| r.value(Field::Hour));
        let p = Predicate::In([OrderedFloat(6.0)].into_iter().collect());

        hour.set_filter(&mut filters, Some(p.clone()));
        let stamp = filters.stamp_except(other);
        hour.set_filter(&mut filters, Some(p));
        assert_eq!(filters.stamp_except(other), stamp);
    }
}
