use std::collections::HashMap;

use ordered_float::OrderedFloat;

use crate::dimension::{Dimension, Key};
use crate::error::FacetError;
use crate::filter::FilterSet;

/// One aggregated slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub key: Key,
    pub value: u64,
}

/// Fixed-width bucketing over a clamped numeric domain.
///
/// Values are clamped into `[min, max]`, then floored to a multiple of
/// `step` (true floor, so -1 with step 12 lands in -12).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantizer {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Quantizer {
    pub fn new(min: f64, max: f64, step: f64) -> Self {
        Self { min, max, step }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    /// Bucket key for a raw value. Total: NaN clamps to `min`.
    pub fn slot(&self, raw: f64) -> f64 {
        (self.clamp(raw) / self.step).floor() * self.step
    }

    /// `ceil((max - min) / step) + 1`
    pub fn bucket_count(&self) -> usize {
        ((self.max - self.min) / self.step).ceil().max(0.0) as usize + 1
    }

    pub fn key_at(&self, index: usize) -> f64 {
        self.min + index as f64 * self.step
    }

    fn index_of(&self, slot: f64) -> Option<usize> {
        if slot < self.min || slot > self.max {
            return None;
        }
        Some(((slot - self.min) / self.step).round() as usize)
    }
}

/// How a facet lays out its buckets.
#[derive(Debug, Clone, PartialEq)]
pub enum BucketLayout {
    /// Fixed enumeration, emitted in the given order.
    Enumerated(Vec<Key>),
    /// Gap-filled ascending slots.
    Stepped(Quantizer),
    /// No bucketing available for this facet kind.
    Unsupported,
}

/// Bucketed counts over the records that pass every *other* dimension.
pub struct Group {
    code: String,
    layout: BucketLayout,
    positions: HashMap<Key, usize>,
    stamp: Option<Vec<u64>>,
    buckets: Vec<Bucket>,
}

impl Group {
    pub fn new(code: impl Into<String>, layout: BucketLayout) -> Self {
        let positions = match &layout {
            BucketLayout::Enumerated(keys) => {
                keys.iter().enumerate().map(|(i, k)| (*k, i)).collect()
            }
            _ => HashMap::new(),
        };
        Self {
            code: code.into(),
            layout,
            positions,
            stamp: None,
            buckets: Vec::new(),
        }
    }

    pub fn layout(&self) -> &BucketLayout {
        &self.layout
    }

    /// True when some other dimension changed since the last compute.
    pub fn is_stale(&self, dimension: &Dimension, filters: &FilterSet) -> bool {
        self.stamp.as_ref() != Some(&filters.stamp_except(dimension.id()))
    }

    /// Recompute (or reuse) the buckets for `dimension`.
    pub fn compute(
        &mut self,
        dimension: &Dimension,
        filters: &FilterSet,
    ) -> Result<&[Bucket], FacetError> {
        let stamp = filters.stamp_except(dimension.id());
        if self.stamp.as_ref() == Some(&stamp) {
            return Ok(&self.buckets);
        }

        let mut buckets = self.empty_buckets()?;
        let hidden = filters.hidden_except(Some(dimension.id()));

        for (record, key) in dimension.keys().iter().enumerate() {
            if hidden.get(record).unwrap_or(false) {
                continue;
            }
            let position = self.position(*key)?;
            buckets[position].value += 1;
        }

        tracing::trace!(facet = %self.code, buckets = buckets.len(), "group recomputed");
        self.buckets = buckets;
        self.stamp = Some(stamp);
        Ok(&self.buckets)
    }

    /// Sum over the last computed buckets.
    pub fn total(&self) -> u64 {
        self.buckets.iter().map(|b| b.value).sum()
    }

    fn empty_buckets(&self) -> Result<Vec<Bucket>, FacetError> {
        match &self.layout {
            BucketLayout::Enumerated(keys) => {
                Ok(keys.iter().map(|key| Bucket { key: *key, value: 0 }).collect())
            }
            BucketLayout::Stepped(q) => Ok((0..q.bucket_count())
                .map(|i| Bucket {
                    key: OrderedFloat(q.key_at(i)),
                    value: 0,
                })
                .collect()),
            BucketLayout::Unsupported => Err(FacetError::NotImplemented {
                code: self.code.clone(),
            }),
        }
    }

    fn position(&self, key: Key) -> Result<usize, FacetError> {
        match &self.layout {
            BucketLayout::Enumerated(keys) => {
                self.positions.get(&key).copied().ok_or_else(|| FacetError::IllegalBucket {
                    code: self.code.clone(),
                    key: key.into_inner(),
                    min: keys.first().map_or(f64::NAN, |k| k.into_inner()),
                    max: keys.last().map_or(f64::NAN, |k| k.into_inner()),
                })
            }
            BucketLayout::Stepped(q) => {
                let slot = q.slot(key.into_inner());
                q.index_of(slot).ok_or_else(|| FacetError::IllegalBucket {
                    code: self.code.clone(),
                    key: slot,
                    min: q.min,
                    max: q.max,
                })
            }
            BucketLayout::Unsupported => Err(FacetError::NotImplemented {
                code: self.code.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{Extent, Predicate};
    use crate::model::{trip, Field, RecordStore};

    fn delay_store(delays: &[f64]) -> RecordStore {
        RecordStore::load(
            delays
                .iter()
                .map(|d| trip("2017-10-01", 8, 0, 10, *d))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn negative_values_floor_downwards() {
        let q = Quantizer::new(-120.0, 600.0, 12.0);
        assert_eq!(q.slot(-1.0), -12.0);
        assert_eq!(q.slot(-120.0), -120.0);
        assert_eq!(q.slot(-500.0), -120.0);
        assert_eq!(q.slot(11.9), 0.0);
        assert_eq!(q.slot(12.0), 12.0);
        assert_eq!(q.slot(9000.0), 600.0);
    }

    #[test]
    fn stepped_layout_has_no_holes() {
        let store = delay_store(&[-1.0, -120.0, 0.0, 5.0, 700.0]);
        let mut filters = FilterSet::new(store.len());
        let dim = Dimension::new(&store, &mut filters, |r| r.value(Field::LastDelay));
        let q = Quantizer::new(-120.0, 600.0, 12.0);
        let mut group = Group::new("delay", BucketLayout::Stepped(q));

        let buckets = group.compute(&dim, &filters).unwrap().to_vec();
        assert_eq!(buckets.len(), 61);
        assert_eq!(buckets.iter().map(|b| b.value).sum::<u64>(), 5);
        let at = |k: f64| buckets.iter().find(|b| b.key == OrderedFloat(k)).unwrap().value;
        assert_eq!(at(-120.0), 1);
        assert_eq!(at(-12.0), 1);
        assert_eq!(at(0.0), 2);
        assert_eq!(at(600.0), 1);
        assert!(buckets.windows(2).all(|w| w[0].key < w[1].key));
    }

    #[test]
    fn bucket_count_rounds_up_partial_steps() {
        assert_eq!(Quantizer::new(0.0, 10.0, 3.0).bucket_count(), 5);
        assert_eq!(Quantizer::new(3.0, 3.0, 1.0).bucket_count(), 1);
    }

    #[test]
    fn misaligned_minimum_is_an_illegal_bucket() {
        let store = delay_store(&[-100.0]);
        let mut filters = FilterSet::new(store.len());
        let dim = Dimension::new(&store, &mut filters, |r| r.value(Field::LastDelay));
        let mut group = Group::new("delay", BucketLayout::Stepped(Quantizer::new(-100.0, 600.0, 12.0)));
        let err = group.compute(&dim, &filters).unwrap_err();
        assert!(matches!(err, FacetError::IllegalBucket { key, .. } if key == -108.0));
    }

    #[test]
    fn enumerated_layout_keeps_order_and_rejects_strangers() {
        let store = RecordStore::load(vec![
            trip("2017-10-01", 3, 0, 10, 0.0),
            trip("2017-10-01", 3, 0, 10, 0.0),
            trip("2017-10-01", 30, 0, 10, 0.0),
        ])
        .unwrap();
        let mut filters = FilterSet::new(store.len());
        let dim = Dimension::new(&store, &mut filters, |r| r.value(Field::Hour));
        let keys = (0..24).map(|h| OrderedFloat(h as f64)).collect();
        let mut group = Group::new("hour", BucketLayout::Enumerated(keys));
        assert!(matches!(
            group.compute(&dim, &filters),
            Err(FacetError::IllegalBucket { .. })
        ));
    }

    #[test]
    fn unsupported_layout_fails_fast() {
        let store = delay_store(&[1.0]);
        let mut filters = FilterSet::new(store.len());
        let dim = Dimension::new(&store, &mut filters, |r| r.value(Field::LastDelay));
        let mut group = Group::new("raw", BucketLayout::Unsupported);
        assert_eq!(
            group.compute(&dim, &filters).unwrap_err(),
            FacetError::NotImplemented { code: "raw".into() }
        );
    }

    #[test]
    fn own_filter_is_ignored_but_others_apply() {
        let store = RecordStore::load(vec![
            trip("2017-10-01", 6, 0, 10, 0.0),
            trip("2017-10-01", 7, 1, 10, 0.0),
            trip("2017-10-01", 7, 1, 10, 0.0),
        ])
        .unwrap();
        let mut filters = FilterSet::new(store.len());
        let mut hour = Dimension::new(&store, &mut filters, |r| r.value(Field::Hour));
        let mut day = Dimension::new(&store, &mut filters, |r| r.value(Field::WeekDay));
        let mut hour_group = Group::new(
            "hour",
            BucketLayout::Enumerated((0..24).map(|h| OrderedFloat(h as f64)).collect()),
        );

        hour.set_filter(&mut filters, Some(Predicate::Range(Extent::new(6.0, 7.0))));
        assert_eq!(hour_group.compute(&hour, &filters).unwrap().iter().map(|b| b.value).sum::<u64>(), 3);

        day.set_filter(&mut filters, Some(Predicate::In([OrderedFloat(1.0)].into_iter().collect())));
        assert!(hour_group.is_stale(&hour, &filters));
        let buckets = hour_group.compute(&hour, &filters).unwrap();
        assert_eq!(buckets[6].value, 0);
        assert_eq!(buckets[7].value, 2);
        assert!(!hour_group.is_stale(&hour, &filters));
    }
}
