//! Segment catalog boundary
//!
//! The metadata store owns segment lifecycle (used/unused); the coordinator
//! only reads the used set. Records arrive loosely typed and are validated
//! per entity — one bad row is excluded and counted, it never fails the
//! snapshot.

use crate::segment::{Interval, Segment};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw catalog row, before validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub datasource: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub version: Option<String>,
    pub partition_num: Option<u32>,
    pub size_bytes: Option<u64>,
}

impl SegmentRecord {
    /// Build a record from a segment; handy for fakes and tests.
    pub fn from_segment(segment: &Segment) -> Self {
        Self {
            datasource: Some(segment.datasource.clone()),
            start: Some(segment.interval.start),
            end: Some(segment.interval.end),
            version: Some(segment.version.clone()),
            partition_num: Some(segment.partition_num),
            size_bytes: Some(segment.size_bytes),
        }
    }

    /// Validate mandatory fields into a `Segment`.
    pub fn validate(self) -> crate::Result<Segment> {
        let missing =
            |field: &str| crate::Error::MalformedSegment(format!("missing field: {}", field));

        let datasource = self.datasource.ok_or_else(|| missing("datasource"))?;
        if datasource.is_empty() {
            return Err(crate::Error::MalformedSegment("empty datasource".into()));
        }
        let start = self.start.ok_or_else(|| missing("start"))?;
        let end = self.end.ok_or_else(|| missing("end"))?;
        let interval = Interval::new(start, end)?;

        Ok(Segment {
            datasource,
            interval,
            version: self.version.ok_or_else(|| missing("version"))?,
            partition_num: self.partition_num.ok_or_else(|| missing("partition_num"))?,
            size_bytes: self.size_bytes.ok_or_else(|| missing("size_bytes"))?,
        })
    }
}

/// Read access to the durable segment catalog
#[async_trait]
pub trait SegmentCatalog: Send + Sync {
    /// All currently-used segments. Staleness is tolerated; the loop
    /// re-snapshots every cycle.
    async fn used_segments(&self) -> crate::Result<Vec<SegmentRecord>>;
}

/// Catalog adapter over the metadata service's HTTP API
pub struct HttpSegmentCatalog {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSegmentCatalog {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }
}

#[async_trait]
impl SegmentCatalog for HttpSegmentCatalog {
    async fn used_segments(&self) -> crate::Result<Vec<SegmentRecord>> {
        let url = format!("{}/v1/segments/used", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(crate::Error::Catalog(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}
