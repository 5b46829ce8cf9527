//! Segment identity and time interval types
//!
//! A segment is the immutable unit of stored, queryable data: one datasource,
//! one time interval, one version, one partition. Segments are produced by
//! ingestion and never mutated; the coordinator only reads the catalog's
//! "used" set and decides where replicas should live.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open time interval, end exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> crate::Result<Self> {
        if start >= end {
            return Err(crate::Error::MalformedSegment(format!(
                "interval start {} is not before end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_interval(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn contains_instant(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.start.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.end.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        )
    }
}

/// Canonical segment identifier: datasource, interval, version, partition
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(String);

impl SegmentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SegmentId {
    fn from(s: String) -> Self {
        SegmentId(s)
    }
}

/// Immutable unit of stored data
///
/// Identity is `(datasource, interval, version, partition_num)`; a higher
/// version shadows lower versions over the same interval, but shadowing is
/// resolved by the metadata store — the coordinator only sees used segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    pub datasource: String,
    pub interval: Interval,
    pub version: String,
    pub partition_num: u32,
    pub size_bytes: u64,
}

impl Segment {
    pub fn id(&self) -> SegmentId {
        SegmentId(format!(
            "{}_{}_{}_{}",
            self.datasource, self.interval, self.version, self.partition_num
        ))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}
