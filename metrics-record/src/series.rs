use std::time::SystemTime;

/// A single time series: label values and the points observed for them.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeries {
    /// When the series began accumulating, for cumulative kinds.
    pub start_timestamp: Option<SystemTime>,

    /// Label values, aligned positionally with the descriptor's label keys.
    ///
    /// A value of `None` means the label is not set for this series.
    pub label_values: Vec<Option<String>>,

    /// Points in this series.
    pub points: Vec<Point>,
}

impl TimeSeries {
    /// Creates an empty `TimeSeries`.
    pub fn new() -> Self {
        Self { start_timestamp: None, label_values: Vec::new(), points: Vec::new() }
    }

    /// Sets the label values.
    #[must_use]
    pub fn with_label_values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = Option<V>>,
        V: Into<String>,
    {
        self.label_values = values.into_iter().map(|v| v.map(Into::into)).collect();
        self
    }

    /// Sets the start timestamp.
    #[must_use]
    pub fn with_start_timestamp(mut self, start: SystemTime) -> Self {
        self.start_timestamp = Some(start);
        self
    }

    /// Adds a point.
    #[must_use]
    pub fn with_point(mut self, point: Point) -> Self {
        self.points.push(point);
        self
    }
}

impl Default for TimeSeries {
    fn default() -> Self {
        Self::new()
    }
}

/// A timestamped value.
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    /// When the value was observed.
    pub timestamp: SystemTime,

    /// The observed value.
    pub value: PointValue,
}

impl Point {
    /// Creates a new `Point`.
    pub fn new(timestamp: SystemTime, value: PointValue) -> Self {
        Self { timestamp, value }
    }

    /// Creates a new `Point` observed now.
    pub fn now(value: PointValue) -> Self {
        Self::new(SystemTime::now(), value)
    }

    /// Returns the floating-point value, if this point carries one.
    pub fn as_double(&self) -> Option<f64> {
        match self.value {
            PointValue::Double(value) => Some(value),
            _ => None,
        }
    }
}

/// The value of a point, shaped by the metric kind.
#[derive(Clone, Debug, PartialEq)]
pub enum PointValue {
    /// An integer value.
    Int64(i64),

    /// A floating-point value.
    Double(f64),

    /// A summary of percentiles.
    Summary(SummaryValue),

    /// A bucketed distribution.
    Distribution(DistributionValue),
}

impl PointValue {
    /// Returns a short name for the value's variant, for diagnostics.
    pub const fn variant_name(&self) -> &'static str {
        match self {
            PointValue::Int64(_) => "int64",
            PointValue::Double(_) => "double",
            PointValue::Summary(_) => "summary",
            PointValue::Distribution(_) => "distribution",
        }
    }
}

/// A summary value: optional totals, and a snapshot of percentiles.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SummaryValue {
    /// Total number of observations, if known.
    pub count: Option<i64>,

    /// Sum of all observations, if known.
    pub sum: Option<f64>,

    /// Percentile snapshot.
    pub snapshot: Option<Snapshot>,
}

impl SummaryValue {
    /// Creates a `SummaryValue` holding only a snapshot with the given `(percentile, value)` pairs.
    pub fn from_percentiles<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let percentile_values = pairs
            .into_iter()
            .map(|(percentile, value)| ValueAtPercentile { percentile, value })
            .collect();
        Self { count: None, sum: None, snapshot: Some(Snapshot { percentile_values }) }
    }
}

/// A set of percentile values observed at one instant.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    /// Percentile values. Order is not guaranteed.
    pub percentile_values: Vec<ValueAtPercentile>,
}

/// A value at a given percentile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValueAtPercentile {
    /// Percentile, in the range `(0.0, 100.0]`.
    pub percentile: f64,

    /// Value at the percentile.
    pub value: f64,
}

/// A cumulative distribution value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DistributionValue {
    /// Total number of observations.
    pub count: i64,

    /// Running sum of all observations.
    pub sum: f64,

    /// Bucket layout, if provided.
    pub bucket_options: Option<BucketOptions>,

    /// Bucket counts, including the trailing overflow bucket.
    pub buckets: Vec<Bucket>,
}

impl DistributionValue {
    /// Creates a `DistributionValue` with explicit bucket bounds and their counts.
    ///
    /// `counts` is expected to have one more element than `bounds`, the last one being the overflow bucket.
    pub fn explicit<B, C>(bounds: B, counts: C, sum: f64) -> Self
    where
        B: IntoIterator<Item = f64>,
        C: IntoIterator<Item = i64>,
    {
        let buckets: Vec<Bucket> = counts.into_iter().map(|count| Bucket { count }).collect();
        Self {
            count: buckets.iter().map(|b| b.count).sum(),
            sum,
            bucket_options: Some(BucketOptions::Explicit { bounds: bounds.into_iter().collect() }),
            buckets,
        }
    }

    /// Returns the explicit bucket bounds, if any were provided.
    pub fn explicit_bounds(&self) -> Option<&[f64]> {
        match &self.bucket_options {
            Some(BucketOptions::Explicit { bounds }) => Some(bounds),
            None => None,
        }
    }
}

/// Bucket layout of a distribution.
#[derive(Clone, Debug, PartialEq)]
pub enum BucketOptions {
    /// Buckets with explicit, ascending upper bounds.
    Explicit {
        /// Upper bounds, excluding the implicit overflow bucket.
        bounds: Vec<f64>,
    },
}

/// A single distribution bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bucket {
    /// Number of observations falling into the bucket.
    pub count: i64,
}
