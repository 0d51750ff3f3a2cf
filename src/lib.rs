//! Crossfiltered exploration of train trip delays.
//!
//! A [`RecordStore`] of trips is cut into facets (delay, hour, weekday,
//! station count, date). Each facet counts the records that pass every
//! *other* facet's filter, and the [`Coordinator`] keeps all of them in
//! step after each selection change.

pub mod brush;
pub mod config;
pub mod dimension;
pub mod error;
pub mod facet;
pub mod filter;
pub mod group;
pub mod manager;
pub mod model;
pub mod parser;
pub mod server;
pub mod source;
pub mod storage;

pub use config::ExplorerConfig;
pub use error::{ExplorerError, Result};
pub use facet::{FacetConfig, FacetKind, FacetView, Selection, SelectionMode};
pub use manager::{Coordinator, FacetId, LogRenderer, RefreshReport, Renderer};
pub use model::{RecordStore, Trip};
