use std::collections::BTreeSet;

use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::brush::{BrushConfig, BrushEnd, BrushFrame, ClipWindow, MoveOrigin, RangeBrushController};
use crate::dimension::{Dimension, Extent, Key, Predicate};
use crate::error::FacetError;
use crate::filter::FilterSet;
use crate::group::{BucketLayout, Group, Quantizer};
use crate::model::{day_to_date, Field, RecordStore};

/// Sunday first, matching `x_week_day_local`.
const DAYS_OF_WEEK: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// The closed set of facet kinds. Each kind supplies a key function, a
/// bucket layout and a label function through the match arms below.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FacetKind {
    Weekday,
    Hour,
    Date,
    StationCount,
    /// Delay in seconds, bucketed over a clamped domain.
    Delay { field: Field, domain: Quantizer },
    /// Filterable but without bucketing; aggregating it is an error.
    Raw(Field),
}

impl FacetKind {
    pub fn field(&self) -> Field {
        match self {
            FacetKind::Weekday => Field::WeekDay,
            FacetKind::Hour => Field::Hour,
            FacetKind::Date => Field::Day,
            FacetKind::StationCount => Field::StationCount,
            FacetKind::Delay { field, .. } | FacetKind::Raw(field) => *field,
        }
    }

    fn layout(&self, store: &RecordStore) -> BucketLayout {
        match self {
            FacetKind::Weekday => BucketLayout::Enumerated(enumeration(0..7)),
            FacetKind::Hour => BucketLayout::Enumerated(enumeration(0..24)),
            FacetKind::Date | FacetKind::StationCount => {
                let (min, max) = store.extent(self.field());
                BucketLayout::Stepped(Quantizer::new(min.floor(), max, 1.0))
            }
            FacetKind::Delay { domain, .. } => BucketLayout::Stepped(*domain),
            FacetKind::Raw(_) => BucketLayout::Unsupported,
        }
    }

    fn label(&self, key: f64) -> String {
        match self {
            FacetKind::Weekday => DAYS_OF_WEEK
                .get(key as usize)
                .map_or_else(|| key.to_string(), |name| name.to_string()),
            FacetKind::Hour => {
                let hour = key as i64;
                format!("{hour:02}:00-{hour:02}:59")
            }
            FacetKind::Date => day_to_date(key as i64)
                .map_or_else(|| key.to_string(), |d| d.format("%d/%m/%Y").to_string()),
            FacetKind::Delay { domain, .. } => {
                format!("{:.1}", (key + domain.step / 2.0) / 60.0)
            }
            FacetKind::StationCount => format!("{}", key as i64),
            FacetKind::Raw(_) => key.to_string(),
        }
    }
}

fn enumeration(range: std::ops::Range<i32>) -> Vec<Key> {
    range.map(|k| OrderedFloat(f64::from(k))).collect()
}

/// How users select inside a facet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionMode {
    /// Toggle individual buckets.
    Discrete,
    /// Brush a contiguous range.
    Continuous(BrushConfig),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FacetConfig {
    pub code: String,
    pub title: String,
    pub kind: FacetKind,
    pub mode: SelectionMode,
}

impl FacetConfig {
    pub fn new(code: impl Into<String>, title: impl Into<String>, kind: FacetKind, mode: SelectionMode) -> Self {
        Self {
            code: code.into(),
            title: title.into(),
            kind,
            mode,
        }
    }
}

/// Current selection of a facet. The variant is fixed by the facet's mode.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Selected bucket keys; empty means no filter.
    Keys(BTreeSet<Key>),
    /// Selected range; `None` means no filter.
    Range(Option<Extent>),
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        match self {
            Selection::Keys(keys) => keys.is_empty(),
            Selection::Range(range) => range.is_none(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketView {
    pub key: f64,
    pub label: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SelectionView {
    Keys { keys: Vec<f64> },
    Range { range: Option<[f64; 2]> },
}

/// Render-ready state of one facet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetView {
    pub code: String,
    pub title: String,
    pub buckets: Vec<BucketView>,
    pub selection_active: bool,
    /// Records passing every other facet's filter.
    pub visible: u64,
    pub selection: SelectionView,
}

/// A dimension, its group, a bucketing policy and a selection.
pub struct Facet {
    code: String,
    title: String,
    kind: FacetKind,
    dimension: Dimension,
    group: Group,
    selection: Selection,
    brush: Option<RangeBrushController>,
}

impl Facet {
    pub fn new(config: FacetConfig, store: &RecordStore, filters: &mut FilterSet) -> Self {
        let field = config.kind.field();
        let dimension = Dimension::new(store, filters, |r| r.value(field));
        let layout = config.kind.layout(store);

        let (selection, brush) = match config.mode {
            SelectionMode::Discrete => (Selection::Keys(BTreeSet::new()), None),
            SelectionMode::Continuous(brush) => {
                let domain = axis_domain(&layout, store, field);
                (Selection::Range(None), Some(RangeBrushController::new(domain, brush)))
            }
        };

        Self {
            group: Group::new(config.code.clone(), layout),
            code: config.code,
            title: config.title,
            kind: config.kind,
            dimension,
            selection,
            brush,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn kind(&self) -> FacetKind {
        self.kind
    }

    pub fn dimension(&self) -> &Dimension {
        &self.dimension
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn brush(&self) -> Option<&RangeBrushController> {
        self.brush.as_ref()
    }

    pub fn is_continuous(&self) -> bool {
        self.brush.is_some()
    }

    /// Whether the reset affordance should be shown.
    pub fn selection_active(&self) -> bool {
        !self.selection.is_empty() || self.brush.as_ref().is_some_and(|b| b.state().active)
    }

    /// Flip `key` in a discrete selection. Keys of stepped facets are
    /// normalised to their bucket.
    pub fn toggle(&mut self, key: f64) -> Result<(), FacetError> {
        if self.is_continuous() {
            return Err(self.mismatch("toggle"));
        }
        let key = self.bucket_key(key)?;
        if let Selection::Keys(keys) = &mut self.selection {
            if !keys.remove(&key) {
                keys.insert(key);
            }
        }
        Ok(())
    }

    /// Check that `selection` fits this facet's mode and buckets without
    /// changing anything.
    pub fn check_selection(&self, selection: &Selection) -> Result<(), FacetError> {
        match (self.is_continuous(), selection) {
            (false, Selection::Keys(keys)) => keys
                .iter()
                .try_for_each(|k| self.bucket_key(k.into_inner()).map(|_| ())),
            (true, Selection::Range(_)) => Ok(()),
            _ => Err(self.mismatch("this selection")),
        }
    }

    /// Replace the whole selection. The variant must match the facet's mode.
    pub fn set_selection(&mut self, selection: Selection) -> Result<(), FacetError> {
        match (self.is_continuous(), selection) {
            (false, Selection::Keys(keys)) => {
                let keys = keys
                    .into_iter()
                    .map(|k| self.bucket_key(k.into_inner()))
                    .collect::<Result<BTreeSet<_>, _>>()?;
                self.selection = Selection::Keys(keys);
                Ok(())
            }
            (true, Selection::Range(range)) => {
                if let Some(brush) = self.brush.as_mut() {
                    let frame = brush.set_externally(range);
                    self.selection = Selection::Range(frame.map(|f| f.extent));
                }
                Ok(())
            }
            _ => Err(self.mismatch("this selection")),
        }
    }

    /// Derive the dimension's predicate from the current selection.
    pub fn apply_filter(&mut self, filters: &mut FilterSet) {
        let predicate = match &self.selection {
            Selection::Keys(keys) if keys.is_empty() => None,
            Selection::Keys(keys) => Some(match self.group.layout() {
                BucketLayout::Stepped(quantizer) => Predicate::Buckets {
                    keys: keys.clone(),
                    quantizer: *quantizer,
                },
                _ => Predicate::In(keys.clone()),
            }),
            Selection::Range(range) => range.map(Predicate::Range),
        };
        self.dimension.set_filter(filters, predicate);
    }

    /// Clear the selection and the brush, then drop the filter.
    pub fn reset(&mut self, filters: &mut FilterSet) {
        self.selection = match self.selection {
            Selection::Keys(_) => Selection::Keys(BTreeSet::new()),
            Selection::Range(_) => Selection::Range(None),
        };
        if let Some(brush) = self.brush.as_mut() {
            brush.clear();
        }
        self.apply_filter(filters);
    }

    pub fn brush_start(&mut self) -> Result<(), FacetError> {
        self.brush_mut("brush")?.start();
        Ok(())
    }

    /// Feed a move to the brush; on success the range becomes the selection
    /// and is applied. `Ok(None)` means the event was ignored.
    pub fn brush_move(
        &mut self,
        filters: &mut FilterSet,
        raw: Option<&[f64]>,
        origin: MoveOrigin,
    ) -> Result<Option<BrushFrame>, FacetError> {
        let Some(frame) = self.brush_mut("brush")?.move_to(raw, origin) else {
            return Ok(None);
        };
        self.selection = Selection::Range(Some(frame.extent));
        self.apply_filter(filters);
        Ok(Some(frame))
    }

    /// Finish a gesture. A cleared or zero-width result resets the facet.
    pub fn brush_end(&mut self, filters: &mut FilterSet, raw: Option<&[f64]>) -> Result<BrushEnd, FacetError> {
        let outcome = self.brush_mut("brush")?.end(raw);
        if outcome == BrushEnd::Cleared {
            self.reset(filters);
        }
        Ok(outcome)
    }

    /// Restore a range without a gesture; `None` clears the filter and hides the brush.
    pub fn brush_set_externally(
        &mut self,
        filters: &mut FilterSet,
        extent: Option<Extent>,
    ) -> Result<Option<BrushFrame>, FacetError> {
        let frame = self.brush_mut("brush")?.set_externally(extent);
        self.selection = Selection::Range(frame.map(|f| f.extent));
        self.apply_filter(filters);
        Ok(frame)
    }

    pub fn brush_resize(&mut self, width: f64) -> Result<ClipWindow, FacetError> {
        Ok(self.brush_mut("brush")?.resize(width))
    }

    /// Aggregate and label the buckets.
    pub fn build_display_data(&mut self, filters: &FilterSet) -> Result<FacetView, FacetError> {
        let kind = self.kind;
        let buckets = self
            .group
            .compute(&self.dimension, filters)?
            .iter()
            .map(|b| BucketView {
                key: b.key.into_inner(),
                label: kind.label(b.key.into_inner()),
                value: b.value,
            })
            .collect();

        Ok(FacetView {
            code: self.code.clone(),
            title: self.title.clone(),
            buckets,
            selection_active: self.selection_active(),
            visible: self.group.total(),
            selection: self.selection_view(),
        })
    }

    fn selection_view(&self) -> SelectionView {
        match &self.selection {
            Selection::Keys(keys) => SelectionView::Keys {
                keys: keys.iter().map(|k| k.into_inner()).collect(),
            },
            Selection::Range(range) => SelectionView::Range {
                range: range.map(|e| [e.low, e.high]),
            },
        }
    }

    fn bucket_key(&self, key: f64) -> Result<Key, FacetError> {
        match self.group.layout() {
            BucketLayout::Stepped(q) => Ok(OrderedFloat(q.slot(key))),
            BucketLayout::Enumerated(keys) => {
                let key = OrderedFloat(key);
                if keys.contains(&key) {
                    Ok(key)
                } else {
                    Err(FacetError::IllegalBucket {
                        code: self.code.clone(),
                        key: key.into_inner(),
                        min: keys.first().map_or(f64::NAN, |k| k.into_inner()),
                        max: keys.last().map_or(f64::NAN, |k| k.into_inner()),
                    })
                }
            }
            BucketLayout::Unsupported => Ok(OrderedFloat(key)),
        }
    }

    fn brush_mut(&mut self, operation: &'static str) -> Result<&mut RangeBrushController, FacetError> {
        let code = &self.code;
        self.brush.as_mut().ok_or_else(|| FacetError::ModeMismatch {
            code: code.clone(),
            operation,
        })
    }

    fn mismatch(&self, operation: &'static str) -> FacetError {
        FacetError::ModeMismatch {
            code: self.code.clone(),
            operation,
        }
    }
}

/// Brushable key domain: the bucket span including the last bucket's width.
fn axis_domain(layout: &BucketLayout, store: &RecordStore, field: Field) -> Extent {
    match layout {
        BucketLayout::Stepped(q) => Extent::new(q.min, q.max + q.step),
        BucketLayout::Enumerated(keys) => {
            let first = keys.first().map_or(0.0, |k| k.into_inner());
            let last = keys.last().map_or(0.0, |k| k.into_inner());
            Extent::new(first, last + 1.0)
        }
        BucketLayout::Unsupported => {
            let (min, max) = store.extent(field);
            Extent::new(min, max)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::Rounding;
    use crate::model::trip;

    fn store() -> RecordStore {
        RecordStore::load(vec![
            trip("2017-10-01", 6, 0, 10, -1.0),
            trip("2017-10-02", 7, 1, 12, 5.0),
            trip("2017-10-04", 7, 3, 12, 30.0),
        ])
        .unwrap()
    }

    fn delay_kind() -> FacetKind {
        FacetKind::Delay {
            field: Field::LastDelay,
            domain: Quantizer::new(-120.0, 600.0, 12.0),
        }
    }

    #[test]
    fn labels_per_kind() {
        assert_eq!(FacetKind::Weekday.label(0.0), "Sunday");
        assert_eq!(FacetKind::Hour.label(7.0), "07:00-07:59");
        assert_eq!(FacetKind::StationCount.label(12.0), "12");
        assert_eq!(delay_kind().label(-120.0), "-1.9");
        let day = crate::model::parse_day("2017-10-04").unwrap() as f64;
        assert_eq!(FacetKind::Date.label(day), "04/10/2017");
    }

    #[test]
    fn toggle_twice_restores_no_filter() {
        let store = store();
        let mut filters = FilterSet::new(store.len());
        let mut facet = Facet::new(
            FacetConfig::new("hour", "Hour", FacetKind::Hour, SelectionMode::Discrete),
            &store,
            &mut filters,
        );
        facet.toggle(7.0).unwrap();
        facet.apply_filter(&mut filters);
        assert_eq!(filters.visible_count(), 2);
        assert!(facet.selection_active());

        facet.toggle(7.0).unwrap();
        facet.apply_filter(&mut filters);
        assert!(facet.dimension().predicate().is_none());
        assert_eq!(filters.visible_count(), 3);
    }

    #[test]
    fn toggle_rejects_keys_outside_enumeration() {
        let store = store();
        let mut filters = FilterSet::new(store.len());
        let mut facet = Facet::new(
            FacetConfig::new("weekDay", "Weekday", FacetKind::Weekday, SelectionMode::Discrete),
            &store,
            &mut filters,
        );
        assert!(matches!(facet.toggle(9.0), Err(FacetError::IllegalBucket { .. })));
    }

    #[test]
    fn delay_selection_is_a_bucket_interval() {
        let store = store();
        let mut filters = FilterSet::new(store.len());
        let mut facet = Facet::new(
            FacetConfig::new("delay", "Delay", delay_kind(), SelectionMode::Discrete),
            &store,
            &mut filters,
        );
        // -5 normalises to the -12 bucket, which holds the -1 record.
        facet.toggle(-5.0).unwrap();
        facet.apply_filter(&mut filters);
        assert_eq!(filters.visible_count(), 1);
        assert!(!facet.dimension().is_excluded(&filters, 0));
    }

    #[test]
    fn reset_is_idempotent() {
        let store = store();
        let mut filters = FilterSet::new(store.len());
        let mut facet = Facet::new(
            FacetConfig::new("weekDay", "Weekday", FacetKind::Weekday, SelectionMode::Discrete),
            &store,
            &mut filters,
        );
        facet.toggle(1.0).unwrap();
        facet.apply_filter(&mut filters);
        facet.reset(&mut filters);
        let once = (facet.selection().clone(), filters.visible_count());
        facet.reset(&mut filters);
        assert_eq!((facet.selection().clone(), filters.visible_count()), once);
        assert!(facet.dimension().predicate().is_none());
        assert!(!facet.selection_active());
    }

    #[test]
    fn continuous_facet_rejects_toggle() {
        let store = store();
        let mut filters = FilterSet::new(store.len());
        let mode = SelectionMode::Continuous(BrushConfig {
            width: 100.0,
            rounding: Some(Rounding::Floor { step: 1.0 }),
        });
        let mut facet = Facet::new(
            FacetConfig::new("date", "Date", FacetKind::Date, mode),
            &store,
            &mut filters,
        );
        assert!(matches!(facet.toggle(0.0), Err(FacetError::ModeMismatch { .. })));
    }

    #[test]
    fn check_selection_rejects_without_mutating() {
        let store = store();
        let mut filters = FilterSet::new(store.len());
        let mut facet = Facet::new(
            FacetConfig::new("hour", "Hour", FacetKind::Hour, SelectionMode::Discrete),
            &store,
            &mut filters,
        );
        facet.toggle(6.0).unwrap();
        let before = facet.selection().clone();

        let bad_key = Selection::Keys([OrderedFloat(99.0)].into_iter().collect());
        assert!(matches!(facet.check_selection(&bad_key), Err(FacetError::IllegalBucket { .. })));
        let range = Selection::Range(Some(Extent::new(1.0, 2.0)));
        assert!(matches!(facet.check_selection(&range), Err(FacetError::ModeMismatch { .. })));
        assert_eq!(facet.selection(), &before);

        let good = Selection::Keys([OrderedFloat(7.0)].into_iter().collect());
        facet.check_selection(&good).unwrap();
    }

    #[test]
    fn raw_kind_fails_on_compute() {
        let store = store();
        let mut filters = FilterSet::new(store.len());
        let mut facet = Facet::new(
            FacetConfig::new("raw", "Raw", FacetKind::Raw(Field::AvgDelay), SelectionMode::Discrete),
            &store,
            &mut filters,
        );
        assert!(matches!(
            facet.build_display_data(&filters),
            Err(FacetError::NotImplemented { .. })
        ));
    }
}
