use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use rkyv::{AlignedVec, Archive, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::model::Trip;

/// The payload of the most recent successful query.
#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct CachedQuery {
    pub start: String,
    pub end: String,
    pub trips: Vec<Trip>,
}

/// Single-entry cache of the last trip query.
///
/// File layout: `[key (8b)][length (4b)][archived CachedQuery (N bytes)]`,
/// where the key is a seahash of the query's date bounds.
#[derive(Debug, Clone)]
pub struct QueryCache {
    path: PathBuf,
}

impl QueryCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Trips cached for exactly this query, if any.
    pub fn get(&self, start: &str, end: &str) -> Result<Option<Vec<Trip>>, CacheError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut key_buf = [0u8; 8];
        file.read_exact(&mut key_buf)?;
        if u64::from_le_bytes(key_buf) != query_key(start, end) {
            debug!(start, end, "cache holds a different query");
            return Ok(None);
        }

        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf)?;
        let len = u32::from_le_bytes(len_buf) as usize;
        let remaining = file.metadata()?.len().saturating_sub(12);
        if len as u64 > remaining {
            return Err(CacheError::Corrupt(format!("length {len} exceeds the {remaining} bytes on disk")));
        }

        let mut bytes = vec![0u8; len];
        file.read_exact(&mut bytes)?;

        // Archived data must be aligned before validation.
        let mut aligned = AlignedVec::with_capacity(len);
        aligned.extend_from_slice(&bytes);

        let archived = rkyv::check_archived_root::<CachedQuery>(&aligned)
            .map_err(|e| CacheError::Corrupt(e.to_string()))?;
        if archived.start.as_str() != start || archived.end.as_str() != end {
            warn!(start, end, "cache key collision");
            return Ok(None);
        }

        let query: CachedQuery = archived
            .deserialize(&mut rkyv::Infallible)
            .map_err(|_: std::convert::Infallible| CacheError::Corrupt("deserialize".into()))?;
        debug!(start, end, trips = query.trips.len(), "cache hit");
        Ok(Some(query.trips))
    }

    /// Replace the cached entry.
    pub fn put(&self, start: &str, end: &str, trips: &[Trip]) -> Result<(), CacheError> {
        let query = CachedQuery {
            start: start.to_string(),
            end: end.to_string(),
            trips: trips.to_vec(),
        };
        let bytes = rkyv::to_bytes::<_, 4096>(&query)
            .map_err(|e| CacheError::Corrupt(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write aside, then rename.
        let tmp = self.path.with_extension("tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(&query_key(start, end).to_le_bytes())?;
        file.write_all(&(bytes.len() as u32).to_le_bytes())?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;

        debug!(start, end, trips = trips.len(), bytes = bytes.len(), "cache stored");
        Ok(())
    }
}

fn query_key(start: &str, end: &str) -> u64 {
    seahash::hash(format!("{start}|{end}").as_bytes())
}
