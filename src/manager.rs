//! The coordinator: owns the record store, every facet and the refresh protocol.

use serde::Serialize;
use tracing::{debug, info};

use crate::brush::{BrushEnd, BrushFrame, ClipWindow, MoveOrigin};
use crate::dimension::Extent;
use crate::error::{ConfigError, FacetError, Result};
use crate::facet::{Facet, FacetConfig, FacetKind, FacetView, Selection};
use crate::filter::FilterSet;
use crate::model::RecordStore;
use crate::parser::{self, KeyFormat, LinkEntry, LinkValue};

/// Position of a facet in construction order.
pub type FacetId = usize;

/// Receives refresh notifications. Drawing is someone else's job.
pub trait Renderer: Send {
    fn render_facet(&mut self, view: &FacetView);
    fn render_total(&mut self, visible: usize, total: usize);
}

/// Writes refresh notifications to the log.
#[derive(Debug, Default)]
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn render_facet(&mut self, view: &FacetView) {
        debug!(
            facet = %view.code,
            buckets = view.buckets.len(),
            visible = view.visible,
            active = view.selection_active,
            "render facet"
        );
    }

    fn render_total(&mut self, visible: usize, total: usize) {
        debug!(visible, total, "render total");
    }
}

/// Outcome of one refresh pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshReport {
    pub facets: Vec<FacetView>,
    /// Records passing every filter.
    pub visible: usize,
    pub total: usize,
}

impl RefreshReport {
    pub fn facet(&self, code: &str) -> Option<&FacetView> {
        self.facets.iter().find(|f| f.code == code)
    }
}

/// A brush move that was applied, with the refresh it triggered.
#[derive(Debug, Clone, PartialEq)]
pub struct BrushUpdate {
    pub frame: BrushFrame,
    pub report: RefreshReport,
}

pub struct Coordinator {
    store: RecordStore,
    filters: FilterSet,
    facets: Vec<Facet>,
    renderers: Vec<Box<dyn Renderer>>,
}

impl Coordinator {
    /// Build every dimension and group over `store`. Facet codes must be unique.
    pub fn new(store: RecordStore, configs: Vec<FacetConfig>) -> Result<Self> {
        let mut filters = FilterSet::new(store.len());
        let mut facets: Vec<Facet> = Vec::with_capacity(configs.len());

        for config in configs {
            if facets.iter().any(|f| f.code() == config.code) {
                return Err(ConfigError::Invalid(format!("duplicate facet code '{}'", config.code)).into());
            }
            facets.push(Facet::new(config, &store, &mut filters));
        }

        info!(records = store.len(), facets = facets.len(), "coordinator ready");
        Ok(Self {
            store,
            filters,
            facets,
            renderers: Vec::new(),
        })
    }

    pub fn attach(&mut self, renderer: Box<dyn Renderer>) {
        self.renderers.push(renderer);
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn facets(&self) -> &[Facet] {
        &self.facets
    }

    pub fn facet(&self, id: FacetId) -> Option<&Facet> {
        self.facets.get(id)
    }

    pub fn facet_id(&self, code: &str) -> Result<FacetId, FacetError> {
        self.facets
            .iter()
            .position(|f| f.code() == code)
            .ok_or_else(|| FacetError::UnknownFacet(code.to_string()))
    }

    /// Records passing every filter.
    pub fn visible_count(&self) -> usize {
        self.filters.visible_count()
    }

    pub fn visible_indices(&self) -> Vec<usize> {
        let hidden = self.filters.hidden_except(None);
        hidden
            .iter()
            .enumerate()
            .filter(|(_, h)| !h)
            .map(|(i, _)| i)
            .collect()
    }

    /// Re-apply every filter, rebuild every facet, then notify renderers.
    pub fn refresh(&mut self) -> Result<RefreshReport> {
        for facet in &mut self.facets {
            facet.apply_filter(&mut self.filters);
        }

        let mut views = Vec::with_capacity(self.facets.len());
        for facet in &mut self.facets {
            views.push(facet.build_display_data(&self.filters)?);
        }

        let visible = self.filters.visible_count();
        let total = self.store.len();
        for renderer in &mut self.renderers {
            for view in &views {
                renderer.render_facet(view);
            }
            renderer.render_total(visible, total);
        }

        debug!(visible, total, "refresh complete");
        Ok(RefreshReport {
            facets: views,
            visible,
            total,
        })
    }

    /// Flip one key of a discrete facet.
    pub fn toggle(&mut self, id: FacetId, key: f64) -> Result<RefreshReport> {
        lookup(&mut self.facets, id)?.toggle(key)?;
        self.refresh()
    }

    pub fn reset(&mut self, id: FacetId) -> Result<RefreshReport> {
        lookup(&mut self.facets, id)?.reset(&mut self.filters);
        self.refresh()
    }

    pub fn reset_all(&mut self) -> Result<RefreshReport> {
        self.clear_all();
        self.refresh()
    }

    /// Replace a facet's selection programmatically.
    pub fn set_selection(&mut self, id: FacetId, selection: Selection) -> Result<RefreshReport> {
        lookup(&mut self.facets, id)?.set_selection(selection)?;
        self.refresh()
    }

    /// Begin a gesture. Renderers receive the facet so the reset
    /// affordance shows before the first move.
    pub fn brush_start(&mut self, id: FacetId) -> Result<FacetView> {
        let facet = lookup(&mut self.facets, id)?;
        facet.brush_start()?;
        let view = facet.build_display_data(&self.filters)?;
        for renderer in &mut self.renderers {
            renderer.render_facet(&view);
        }
        Ok(view)
    }

    /// Apply a brush move. `Ok(None)` when the event was ignored.
    pub fn brush_move(
        &mut self,
        id: FacetId,
        raw: Option<&[f64]>,
        origin: MoveOrigin,
    ) -> Result<Option<BrushUpdate>> {
        let facet = lookup(&mut self.facets, id)?;
        let Some(frame) = facet.brush_move(&mut self.filters, raw, origin)? else {
            return Ok(None);
        };
        let report = self.refresh()?;
        Ok(Some(BrushUpdate { frame, report }))
    }

    /// Finish a gesture. Returns the refresh when the facet was reset.
    pub fn brush_end(&mut self, id: FacetId, raw: Option<&[f64]>) -> Result<Option<RefreshReport>> {
        let facet = lookup(&mut self.facets, id)?;
        match facet.brush_end(&mut self.filters, raw)? {
            BrushEnd::Cleared => Ok(Some(self.refresh()?)),
            BrushEnd::Kept => Ok(None),
        }
    }

    pub fn brush_set_externally(&mut self, id: FacetId, extent: Option<Extent>) -> Result<RefreshReport> {
        lookup(&mut self.facets, id)?.brush_set_externally(&mut self.filters, extent)?;
        self.refresh()
    }

    pub fn brush_resize(&mut self, id: FacetId, width: f64) -> Result<ClipWindow> {
        Ok(lookup(&mut self.facets, id)?.brush_resize(width)?)
    }

    /// Encode every active selection as a shareable link.
    pub fn link(&self) -> String {
        let entries: Vec<LinkEntry> = self
            .facets
            .iter()
            .filter_map(|facet| {
                let value = match facet.selection() {
                    Selection::Keys(keys) if !keys.is_empty() => {
                        LinkValue::Keys(keys.iter().map(|k| k.into_inner()).collect())
                    }
                    Selection::Range(Some(extent)) => LinkValue::Range(extent.low, extent.high),
                    _ => return None,
                };
                let format = match facet.kind() {
                    FacetKind::Date => KeyFormat::Date,
                    _ => KeyFormat::Number,
                };
                Some(LinkEntry {
                    code: facet.code().to_string(),
                    value,
                    format,
                })
            })
            .collect();

        parser::format_link(&entries)
    }

    /// Replace every selection with the ones encoded in `link`.
    /// Ranges are replayed through the brush without a gesture.
    /// Every entry is checked first; on error nothing changes.
    pub fn restore_link(&mut self, link: &str) -> Result<RefreshReport> {
        let entries = parser::parse_link(link)?;
        let mut selections = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = self.facet_id(&entry.code)?;
            let selection = match entry.value {
                LinkValue::Keys(keys) => {
                    Selection::Keys(keys.into_iter().map(ordered_float::OrderedFloat).collect())
                }
                LinkValue::Range(low, high) => Selection::Range(Some(Extent::new(low, high))),
            };
            self.facets[id].check_selection(&selection)?;
            selections.push((id, selection));
        }

        self.clear_all();
        for (id, selection) in selections {
            let facet = lookup(&mut self.facets, id)?;
            match selection {
                Selection::Range(extent) => {
                    facet.brush_set_externally(&mut self.filters, extent)?;
                }
                keys => facet.set_selection(keys)?,
            }
        }

        info!(link, "selection restored");
        self.refresh()
    }

    fn clear_all(&mut self) {
        for facet in &mut self.facets {
            facet.reset(&mut self.filters);
        }
    }
}

fn lookup(facets: &mut [Facet], id: FacetId) -> Result<&mut Facet, FacetError> {
    facets
        .get_mut(id)
        .ok_or_else(|| FacetError::UnknownFacet(format!("#{id}")))
}
