//! Where trips come from: the trips API, or a local JSON dump.

use std::path::Path;

use tracing::{info, warn};

use crate::error::{FetchError, Result};
use crate::model::{RecordStore, Trip};
use crate::storage::QueryCache;

const TRIPS_ROUTE: &str = "api/v1/trips/compact/";

/// Downloads trips for a date range, replaying the last query from cache.
pub struct TripFetcher {
    client: reqwest::Client,
    base: String,
    cache: Option<QueryCache>,
}

impl TripFetcher {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: base.into().trim_end_matches('/').to_string(),
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: QueryCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn url(&self) -> String {
        format!("{}/{}", self.base, TRIPS_ROUTE)
    }

    /// Trips with a service date in `[start, end]`, both `YYYY-MM-DD`.
    pub async fn fetch(&self, start: &str, end: &str) -> Result<Vec<Trip>, FetchError> {
        if let Some(cache) = &self.cache {
            match cache.get(start, end) {
                Ok(Some(trips)) => {
                    info!(start, end, trips = trips.len(), "replaying last query");
                    return Ok(trips);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "ignoring unreadable cache"),
            }
        }

        info!(url = %self.url(), start, end, "fetching trips");
        let trips: Vec<Trip> = self
            .client
            .get(self.url())
            .query(&[("start_date", start), ("end_date", end)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info!(trips = trips.len(), "trips received");

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(start, end, &trips) {
                warn!(error = %e, "could not store last query");
            }
        }
        Ok(trips)
    }

    /// Fetch and load in one step.
    pub async fn load(&self, start: &str, end: &str) -> Result<RecordStore> {
        let trips = self.fetch(start, end).await?;
        Ok(RecordStore::load(trips)?)
    }
}

/// Load a JSON array of trips from disk.
pub fn load_file(path: &Path) -> Result<RecordStore> {
    let bytes = std::fs::read(path).map_err(FetchError::from)?;
    let store = RecordStore::from_json(&bytes)?;
    info!(path = %path.display(), records = store.len(), "trips loaded from file");
    Ok(store)
}
