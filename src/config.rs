//! Session configuration, loadable from JSON.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::brush::{BrushConfig, Rounding};
use crate::error::ConfigError;
use crate::facet::{FacetConfig, FacetKind, SelectionMode};
use crate::group::Quantizer;
use crate::model::{parse_day, Field};

/// Bucketing of the delay facets, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayDomain {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Default for DelayDomain {
    fn default() -> Self {
        Self {
            min: -120.0,
            max: 600.0,
            step: 12.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Trips API root, without a trailing slash.
    pub api_base: String,
    pub start_date: String,
    pub end_date: String,
    pub delay: DelayDomain,
    /// Display width of the date brush.
    pub brush_width: f64,
    /// File holding the last query's payload.
    pub cache_path: PathBuf,
    /// Address of the HTTP API.
    pub bind: String,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            api_base: "http://otrain.org".to_string(),
            start_date: "2017-10-01".to_string(),
            end_date: "2017-10-31".to_string(),
            delay: DelayDomain::default(),
            brush_width: 960.0,
            cache_path: PathBuf::from("tripfacets_last_query.bin"),
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl ExplorerConfig {
    /// Read a JSON file. Missing keys fall back to the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let start = parse_day(&self.start_date)
            .ok_or_else(|| ConfigError::Invalid(format!("bad start_date '{}'", self.start_date)))?;
        let end = parse_day(&self.end_date)
            .ok_or_else(|| ConfigError::Invalid(format!("bad end_date '{}'", self.end_date)))?;
        if start > end {
            return Err(ConfigError::Invalid("start_date is after end_date".into()));
        }

        let DelayDomain { min, max, step } = self.delay;
        if !(step > 0.0) || !min.is_finite() || !max.is_finite() || min > max {
            return Err(ConfigError::Invalid(format!(
                "delay domain [{min}, {max}] step {step} is not a valid range"
            )));
        }
        // Slots are multiples of the step, so the minimum must be one too.
        if (min / step).fract() != 0.0 {
            return Err(ConfigError::Invalid(format!(
                "delay minimum {min} is not a multiple of step {step}"
            )));
        }

        if !(self.brush_width > 0.0) {
            return Err(ConfigError::Invalid("brush_width must be positive".into()));
        }
        Ok(())
    }

    /// The standard facet set: three delay measures, hour, weekday,
    /// station count and a brushable date axis.
    pub fn facets(&self) -> Vec<FacetConfig> {
        let DelayDomain { min, max, step } = self.delay;
        let delay = |field: Field, title: &str| {
            FacetConfig::new(
                field.code(),
                title,
                FacetKind::Delay {
                    field,
                    domain: Quantizer::new(min, max, step),
                },
                SelectionMode::Discrete,
            )
        };

        vec![
            delay(Field::LastDelay, "Delay at last station (minutes)"),
            delay(Field::MaxDelay, "Maximum delay (minutes)"),
            delay(Field::AvgDelay, "Average delay (minutes)"),
            FacetConfig::new(Field::Hour.code(), "Hour of day", FacetKind::Hour, SelectionMode::Discrete),
            FacetConfig::new(Field::WeekDay.code(), "Day of week", FacetKind::Weekday, SelectionMode::Discrete),
            FacetConfig::new(
                Field::StationCount.code(),
                "Stations sampled",
                FacetKind::StationCount,
                SelectionMode::Discrete,
            ),
            FacetConfig::new(
                Field::Day.code(),
                "Date",
                FacetKind::Date,
                SelectionMode::Continuous(BrushConfig {
                    width: self.brush_width,
                    rounding: Some(Rounding::Floor { step: 1.0 }),
                }),
            ),
        ]
    }
}
