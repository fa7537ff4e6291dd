//! Metric descriptors and time series, as handed to exporters by a metrics pipeline.
//!
//! A pipeline delivers metrics in batches. Each [`Metric`] pairs a [`MetricDescriptor`] (name, kind, and the ordered
//! list of label keys) with one or more [`TimeSeries`], where every time series carries label values aligned
//! positionally with the descriptor's label keys, and one or more [`Point`]s.
//!
//! Exporters generally work one series at a time, so [`MetricRecord`] provides a borrowed view over a descriptor and a
//! single series, along with helpers for turning the positional labels into a tag map.
//!
//! # Metric kinds
//!
//! The exporters in this workspace understand four kinds of metric:
//!
//! - [`MetricKind::CumulativeDouble`]: a monotonic counter carrying a single floating-point value
//! - [`MetricKind::GaugeDouble`]: a gauge carrying a single floating-point value
//! - [`MetricKind::Summary`]: a snapshot of percentiles, calculated upstream
//! - [`MetricKind::CumulativeDistribution`]: explicit histogram buckets, their counts, and a running sum
//!
//! Other kinds exist in the model so that pipelines can hand them over untouched, but exporters are free to skip
//! them.
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod descriptor;
pub use self::descriptor::{MetricDescriptor, MetricKind};

mod record;
pub use self::record::{LabelMismatch, MetricRecord, Tags};

mod series;
pub use self::series::{
    Bucket, BucketOptions, DistributionValue, Point, PointValue, Snapshot, SummaryValue, TimeSeries,
    ValueAtPercentile,
};

pub mod transform;

/// A metric: a descriptor and all of the time series reported for it.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    /// Describes the name, kind, and label keys shared by every series.
    pub descriptor: MetricDescriptor,

    /// Time series reported for this metric.
    pub timeseries: Vec<TimeSeries>,
}

impl Metric {
    /// Creates a new `Metric` with no time series.
    pub fn new(descriptor: MetricDescriptor) -> Self {
        Self { descriptor, timeseries: Vec::new() }
    }

    /// Adds a time series to the metric.
    #[must_use]
    pub fn with_series(mut self, series: TimeSeries) -> Self {
        self.timeseries.push(series);
        self
    }

    /// Returns an iterator of records, one per time series.
    pub fn records(&self) -> impl Iterator<Item = MetricRecord<'_>> + '_ {
        self.timeseries.iter().map(move |series| MetricRecord::new(&self.descriptor, series))
    }
}
