//! Continuous range selection ("brushing") over an ordered facet axis.
//!
//! The controller is a small state machine. It owns a [`RangeBrushState`]
//! and turns gesture ranges, given in display units, into snapped key-domain
//! extents. It never touches filters itself: the owning facet applies the
//! extent it returns and the coordinator refreshes.

use crate::dimension::Extent;

/// Absorbs the float error of a display → domain round trip before flooring.
const SNAP_EPSILON: f64 = 1e-9;

/// Linear mapping between a key domain and `[0, width]` display units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub domain: Extent,
    pub width: f64,
}

impl Scale {
    pub fn new(domain: Extent, width: f64) -> Self {
        Self { domain, width }
    }

    /// Domain value to display units.
    pub fn apply(&self, value: f64) -> f64 {
        let span = self.domain.width();
        if span <= 0.0 {
            return 0.0;
        }
        (value - self.domain.low) / span * self.width
    }

    /// Display units to domain value.
    pub fn invert(&self, pixel: f64) -> f64 {
        if self.width <= 0.0 {
            return self.domain.low;
        }
        self.domain.low + pixel / self.width * self.domain.width()
    }

    /// The whole axis in display units.
    pub fn range(&self) -> [f64; 2] {
        [0.0, self.width]
    }
}

/// Snap policy for brushed extents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rounding {
    /// Round down to a multiple of `step` (e.g. floor-to-day with step 1).
    Floor { step: f64 },
    /// Round to the nearest multiple of `step`.
    Nearest { step: f64 },
}

impl Rounding {
    pub fn round(&self, value: f64) -> f64 {
        match *self {
            Rounding::Floor { step } => (value / step + SNAP_EPSILON).floor() * step,
            Rounding::Nearest { step } => (value / step).round() * step,
        }
    }
}

/// Construction-time brush settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushConfig {
    /// Initial display width of the axis.
    pub width: f64,
    pub rounding: Option<Rounding>,
}

/// Where a move came from. Only gestures ask the view to re-align handles,
/// so replaying a stored range cannot start a snap/redraw loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOrigin {
    Gesture,
    Programmatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrushPhase {
    #[default]
    Idle,
    Dragging,
    ExternallySet,
}

/// Visible part of the foreground bars, in display units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipWindow {
    pub x: f64,
    pub width: f64,
}

/// Everything the presentation layer needs after an applied move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushFrame {
    /// Applied key-domain range, `[low, high)`.
    pub extent: Extent,
    /// Active range in display units, snapped when rounding is configured.
    pub pixels: [f64; 2],
    /// Handle positions to move the visual brush to, for snapped gestures.
    pub realign: Option<[f64; 2]>,
    pub clip: ClipWindow,
}

/// Result of finishing a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrushEnd {
    /// A non-empty selection remains in place.
    Kept,
    /// The selection was cleared or has zero width; the facet must reset.
    Cleared,
}

/// Mutable state of one brush session.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RangeBrushState {
    pub phase: BrushPhase,
    /// Show the reset affordance.
    pub active: bool,
    /// Last live range in display units.
    pub pixels: Option<[f64; 2]>,
    /// Last applied domain range.
    pub extent: Option<Extent>,
}

#[derive(Debug, Clone)]
pub struct RangeBrushController {
    scale: Scale,
    rounding: Option<Rounding>,
    state: RangeBrushState,
}

impl RangeBrushController {
    pub fn new(domain: Extent, config: BrushConfig) -> Self {
        Self {
            scale: Scale::new(domain, config.width),
            rounding: config.rounding,
            state: RangeBrushState::default(),
        }
    }

    pub fn state(&self) -> &RangeBrushState {
        &self.state
    }

    pub fn scale(&self) -> &Scale {
        &self.scale
    }

    /// Begin a gesture. Marks the selection active without filtering yet.
    pub fn start(&mut self) {
        self.state.phase = BrushPhase::Dragging;
        self.state.active = true;
    }

    /// Process a move. Returns `None` when the event is ignored: a gesture
    /// outside a drag, or a malformed range.
    pub fn move_to(&mut self, raw: Option<&[f64]>, origin: MoveOrigin) -> Option<BrushFrame> {
        if origin == MoveOrigin::Gesture && self.state.phase != BrushPhase::Dragging {
            return None;
        }

        let range = match raw {
            Some(values) => valid_range(values)?,
            None => self.state.pixels.unwrap_or_else(|| self.scale.range()),
        };

        let mut extent = [self.scale.invert(range[0]), self.scale.invert(range[1])];
        let mut pixels = range;
        let mut realign = None;

        if let Some(rounding) = self.rounding {
            extent = extent.map(|v| rounding.round(v));
            pixels = extent.map(|v| self.scale.apply(v));
            if origin == MoveOrigin::Gesture {
                realign = Some(pixels);
            }
        }

        if origin == MoveOrigin::Programmatic && self.state.phase != BrushPhase::Dragging {
            self.state.phase = BrushPhase::ExternallySet;
        }
        Some(self.commit(Extent::new(extent[0], extent[1]), pixels, realign))
    }

    /// Finish a gesture with the final selection, if any.
    pub fn end(&mut self, raw: Option<&[f64]>) -> BrushEnd {
        self.state.phase = BrushPhase::Idle;
        let cleared = match raw {
            None => true,
            Some(values) => match valid_range(values) {
                Some(range) => range[1] - range[0] <= 0.0,
                None => false,
            },
        };
        let collapsed = self.state.extent.map_or(true, |e| e.width() <= 0.0);
        if cleared || collapsed {
            self.clear();
            BrushEnd::Cleared
        } else {
            BrushEnd::Kept
        }
    }

    /// Inject a selection without a gesture. `None` clears everything;
    /// `Some` applies the (snapped) extent directly, skipping `start`.
    pub fn set_externally(&mut self, extent: Option<Extent>) -> Option<BrushFrame> {
        let Some(extent) = extent.filter(Extent::is_finite) else {
            self.clear();
            return None;
        };

        let snapped = match self.rounding {
            Some(r) => Extent::new(r.round(extent.low), r.round(extent.high)),
            None => extent,
        };
        let pixels = [self.scale.apply(snapped.low), self.scale.apply(snapped.high)];
        self.state.phase = BrushPhase::ExternallySet;
        Some(self.commit(snapped, pixels, None))
    }

    /// Forget the selection and hide the brush.
    pub fn clear(&mut self) {
        self.state = RangeBrushState::default();
    }

    /// New display width. Returns the clip window for the current selection,
    /// or the full axis when nothing is selected.
    pub fn resize(&mut self, width: f64) -> ClipWindow {
        self.scale.width = width.max(0.0);
        match self.state.extent {
            Some(extent) => {
                let pixels = [self.scale.apply(extent.low), self.scale.apply(extent.high)];
                self.state.pixels = Some(pixels);
                clip(pixels)
            }
            None => clip(self.scale.range()),
        }
    }

    fn commit(&mut self, extent: Extent, pixels: [f64; 2], realign: Option<[f64; 2]>) -> BrushFrame {
        self.state.active = true;
        self.state.pixels = Some(pixels);
        self.state.extent = Some(extent);
        BrushFrame {
            extent,
            pixels,
            realign,
            clip: clip(pixels),
        }
    }
}

/// A usable gesture range: exactly two finite values, sorted.
fn valid_range(values: &[f64]) -> Option<[f64; 2]> {
    match values {
        [a, b] if a.is_finite() && b.is_finite() => Some(if a <= b { [*a, *b] } else { [*b, *a] }),
        _ => None,
    }
}

fn clip(pixels: [f64; 2]) -> ClipWindow {
    ClipWindow {
        x: pixels[0],
        width: pixels[1] - pixels[0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ten days mapped onto 1000 display units.
    fn day_brush() -> RangeBrushController {
        RangeBrushController::new(
            Extent::new(0.0, 10.0),
            BrushConfig {
                width: 1000.0,
                rounding: Some(Rounding::Floor { step: 1.0 }),
            },
        )
    }

    #[test]
    fn scale_roundtrip() {
        let scale = Scale::new(Extent::new(100.0, 200.0), 50.0);
        assert_eq!(scale.apply(150.0), 25.0);
        assert!((scale.invert(scale.apply(137.0)) - 137.0).abs() < 1e-9);
    }

    #[test]
    fn gesture_snaps_to_whole_days_and_realigns() {
        let mut brush = day_brush();
        brush.start();
        let frame = brush.move_to(Some(&[320.0, 570.0]), MoveOrigin::Gesture).unwrap();
        assert_eq!(frame.extent, Extent::new(3.0, 5.0));
        assert_eq!(frame.pixels, [300.0, 500.0]);
        assert_eq!(frame.realign, Some([300.0, 500.0]));
        assert_eq!(frame.clip, ClipWindow { x: 300.0, width: 200.0 });
    }

    #[test]
    fn programmatic_move_never_realigns() {
        let mut brush = day_brush();
        let frame = brush.move_to(Some(&[320.0, 570.0]), MoveOrigin::Programmatic).unwrap();
        assert_eq!(frame.extent, Extent::new(3.0, 5.0));
        assert_eq!(frame.realign, None);
        assert_eq!(brush.state().phase, BrushPhase::ExternallySet);
    }

    #[test]
    fn gesture_outside_drag_is_ignored() {
        let mut brush = day_brush();
        assert!(brush.move_to(Some(&[0.0, 100.0]), MoveOrigin::Gesture).is_none());
        assert_eq!(brush.state().extent, None);
    }

    #[test]
    fn malformed_ranges_preserve_last_extent() {
        let mut brush = day_brush();
        brush.start();
        brush.move_to(Some(&[100.0, 400.0]), MoveOrigin::Gesture).unwrap();
        assert!(brush.move_to(Some(&[f64::NAN, 400.0]), MoveOrigin::Gesture).is_none());
        assert!(brush.move_to(Some(&[100.0]), MoveOrigin::Gesture).is_none());
        assert!(brush.move_to(Some(&[1.0, 2.0, 3.0]), MoveOrigin::Gesture).is_none());
        assert_eq!(brush.state().extent, Some(Extent::new(1.0, 4.0)));
    }

    #[test]
    fn live_range_beats_axis_default() {
        let mut brush = day_brush();
        brush.start();
        let first = brush.move_to(None, MoveOrigin::Gesture).unwrap();
        assert_eq!(first.extent, Extent::new(0.0, 10.0));

        brush.move_to(Some(&[200.0, 300.0]), MoveOrigin::Gesture).unwrap();
        let again = brush.move_to(None, MoveOrigin::Gesture).unwrap();
        assert_eq!(again.extent, Extent::new(2.0, 3.0));
    }

    #[test]
    fn zero_width_release_clears() {
        let mut brush = day_brush();
        brush.start();
        brush.move_to(Some(&[200.0, 300.0]), MoveOrigin::Gesture).unwrap();
        assert_eq!(brush.end(Some(&[250.0, 250.0])), BrushEnd::Cleared);
        assert_eq!(*brush.state(), RangeBrushState::default());
    }

    #[test]
    fn release_with_selection_keeps_it() {
        let mut brush = day_brush();
        brush.start();
        brush.move_to(Some(&[200.0, 300.0]), MoveOrigin::Gesture).unwrap();
        assert_eq!(brush.end(Some(&[200.0, 300.0])), BrushEnd::Kept);
        assert_eq!(brush.state().phase, BrushPhase::Idle);
        assert!(brush.state().active);
    }

    #[test]
    fn snapped_collapse_clears_on_release() {
        let mut brush = day_brush();
        brush.start();
        let frame = brush.move_to(Some(&[320.0, 370.0]), MoveOrigin::Gesture).unwrap();
        assert_eq!(frame.extent.width(), 0.0);
        assert_eq!(brush.end(Some(&[320.0, 370.0])), BrushEnd::Cleared);
    }

    #[test]
    fn external_set_and_clear() {
        let mut brush = day_brush();
        let frame = brush.set_externally(Some(Extent::new(2.5, 6.2))).unwrap();
        assert_eq!(frame.extent, Extent::new(2.0, 6.0));
        assert_eq!(frame.pixels, [200.0, 600.0]);
        assert_eq!(brush.state().phase, BrushPhase::ExternallySet);

        assert!(brush.set_externally(None).is_none());
        assert!(!brush.state().active);
        assert_eq!(brush.state().extent, None);
    }

    #[test]
    fn resize_reprojects_selection() {
        let mut brush = day_brush();
        brush.set_externally(Some(Extent::new(2.0, 4.0)));
        assert_eq!(brush.resize(500.0), ClipWindow { x: 100.0, width: 100.0 });
        brush.clear();
        assert_eq!(brush.resize(500.0), ClipWindow { x: 0.0, width: 500.0 });
    }
}
