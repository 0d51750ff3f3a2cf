use chrono::{Datelike, NaiveDate};
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Days between 0001-01-01 and 1970-01-01 in the proleptic Gregorian calendar.
const UNIX_EPOCH_FROM_CE: i32 = 719_163;

/// One trip as delivered by the trips API (compact form).
#[derive(Archive, RkyvDeserialize, RkyvSerialize, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct Trip {
    /// Service date, `YYYY-MM-DD`.
    pub date: String,

    /// Local departure hour, 0-23.
    pub x_hour_local: i64,

    /// Local weekday, Sunday is zero.
    pub x_week_day_local: i64,

    /// Number of stations sampled along the trip.
    pub samples_count: i64,

    /// Delays in seconds.
    pub x_last_delay_arrival: f64,
    pub x_max_delay_arrival: f64,
    pub x_avg_delay_arrival: f64,
}

/// Addressable record attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    LastDelay,
    MaxDelay,
    AvgDelay,
    Hour,
    WeekDay,
    StationCount,
    /// Service date as days since 1970-01-01.
    Day,
}

impl Field {
    /// Wire name of the field, also used as the facet code.
    pub fn code(self) -> &'static str {
        match self {
            Field::LastDelay => "x_last_delay_arrival",
            Field::MaxDelay => "x_max_delay_arrival",
            Field::AvgDelay => "x_avg_delay_arrival",
            Field::Hour => "hour",
            Field::WeekDay => "weekDay",
            Field::StationCount => "stopsCount",
            Field::Day => "date",
        }
    }
}

/// A loaded trip with its stable identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub index: usize,
    pub day: i64,
    pub trip: Trip,
}

impl Record {
    pub fn value(&self, field: Field) -> f64 {
        match field {
            Field::LastDelay => self.trip.x_last_delay_arrival,
            Field::MaxDelay => self.trip.x_max_delay_arrival,
            Field::AvgDelay => self.trip.x_avg_delay_arrival,
            Field::Hour => self.trip.x_hour_local as f64,
            Field::WeekDay => self.trip.x_week_day_local as f64,
            Field::StationCount => self.trip.samples_count as f64,
            Field::Day => self.day as f64,
        }
    }
}

/// Parse a `YYYY-MM-DD` date into days since the Unix epoch.
pub fn parse_day(value: &str) -> Option<i64> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()?;
    Some(i64::from(date.num_days_from_ce() - UNIX_EPOCH_FROM_CE))
}

/// Inverse of [`parse_day`].
pub fn day_to_date(day: i64) -> Option<NaiveDate> {
    let days = i32::try_from(day).ok()?.checked_add(UNIX_EPOCH_FROM_CE)?;
    NaiveDate::from_num_days_from_ce_opt(days)
}

/// The immutable record set shared by every facet for a session.
#[derive(Debug, Clone)]
pub struct RecordStore {
    records: Vec<Record>,
}

impl RecordStore {
    /// Validate and index trips in input order.
    pub fn load(trips: Vec<Trip>) -> Result<Self, DataError> {
        if trips.is_empty() {
            return Err(DataError::Empty);
        }

        let mut records = Vec::with_capacity(trips.len());
        for (index, trip) in trips.into_iter().enumerate() {
            let day = parse_day(&trip.date).ok_or_else(|| DataError::BadDate {
                index,
                value: trip.date.clone(),
            })?;
            records.push(Record { index, day, trip });
        }

        tracing::debug!(records = records.len(), "record store loaded");
        Ok(Self { records })
    }

    /// Decode a JSON array of trips and load it.
    pub fn from_json(bytes: &[u8]) -> Result<Self, DataError> {
        let trips: Vec<Trip> = serde_json::from_slice(bytes)?;
        Self::load(trips)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false for a loaded store; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Smallest and largest value of `field` across the store.
    pub fn extent(&self, field: Field) -> (f64, f64) {
        self.records.iter().map(|r| r.value(field)).fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), v| (lo.min(v), hi.max(v)),
        )
    }
}

#[cfg(test)]
pub(crate) fn trip(date: &str, hour: i64, week_day: i64, stations: i64, delay: f64) -> Trip {
    Trip {
        date: date.to_string(),
        x_hour_local: hour,
        x_week_day_local: week_day,
        samples_count: stations,
        x_last_delay_arrival: delay,
        x_max_delay_arrival: delay,
        x_avg_delay_arrival: delay,
    }
}
