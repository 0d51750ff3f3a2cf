//! Error types for the explorer.

use thiserror::Error;

/// Failures while turning a raw payload into a record store.
/// Fatal to session start: no coordinator is built when one occurs.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("dataset is empty")]
    Empty,

    #[error("record {index}: unparseable date '{value}'")]
    BadDate { index: usize, value: String },

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Facet-level failures. `NotImplemented` and `IllegalBucket` are programming
/// errors; the rest come from callers naming the wrong facet or mode.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FacetError {
    #[error("facet '{code}' has no bucketing")]
    NotImplemented { code: String },

    #[error("facet '{code}': bucket {key} outside [{min}, {max}]")]
    IllegalBucket {
        code: String,
        key: f64,
        min: f64,
        max: f64,
    },

    #[error("unknown facet '{0}'")]
    UnknownFacet(String),

    #[error("facet '{code}' does not support {operation}")]
    ModeMismatch {
        code: String,
        operation: &'static str,
    },
}

/// Last-query cache failures.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache io: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache entry corrupt: {0}")]
    Corrupt(String),
}

/// Trip download failures.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Syntax error in a command or shareable link.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct ParseError(pub String);

/// Top-level error wrapping every concern.
#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("facet error: {0}")]
    Facet(#[from] FacetError),

    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
}

pub type Result<T, E = ExplorerError> = std::result::Result<T, E>;
