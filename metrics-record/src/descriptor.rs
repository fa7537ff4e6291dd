use std::fmt;

/// The kind of a metric, which determines the shape of its point values.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum MetricKind {
    /// Kind was not specified by the producer.
    Unspecified,

    /// A gauge carrying integer values.
    GaugeInt64,

    /// A gauge carrying floating-point values.
    GaugeDouble,

    /// A gauge carrying distribution values.
    GaugeDistribution,

    /// A monotonic counter carrying integer values.
    CumulativeInt64,

    /// A monotonic counter carrying floating-point values.
    CumulativeDouble,

    /// A cumulative histogram with explicit buckets.
    CumulativeDistribution,

    /// Precomputed percentiles over some window.
    Summary,
}

impl MetricKind {
    /// Returns the canonical name of this kind, such as `GAUGE_DOUBLE`.
    pub const fn as_str(self) -> &'static str {
        match self {
            MetricKind::Unspecified => "METRIC_TYPE_UNSPECIFIED",
            MetricKind::GaugeInt64 => "GAUGE_INT64",
            MetricKind::GaugeDouble => "GAUGE_DOUBLE",
            MetricKind::GaugeDistribution => "GAUGE_DISTRIBUTION",
            MetricKind::CumulativeInt64 => "CUMULATIVE_INT64",
            MetricKind::CumulativeDouble => "CUMULATIVE_DOUBLE",
            MetricKind::CumulativeDistribution => "CUMULATIVE_DISTRIBUTION",
            MetricKind::Summary => "SUMMARY",
        }
    }

    /// Returns `true` if points of this kind carry a single floating-point value.
    pub const fn is_double(self) -> bool {
        matches!(self, MetricKind::GaugeDouble | MetricKind::CumulativeDouble)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata shared by every time series of a metric.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricDescriptor {
    /// Metric name.
    pub name: String,

    /// Human-readable description.
    pub description: String,

    /// Unit of measurement, if any.
    pub unit: String,

    /// Metric kind.
    pub kind: MetricKind,

    /// Label keys, in the order that each series provides its label values.
    pub label_keys: Vec<String>,
}

impl MetricDescriptor {
    /// Creates a new `MetricDescriptor` with the given name and kind, and no label keys.
    pub fn new<N>(name: N, kind: MetricKind) -> Self
    where
        N: Into<String>,
    {
        Self {
            name: name.into(),
            description: String::new(),
            unit: String::new(),
            kind,
            label_keys: Vec::new(),
        }
    }

    /// Sets the label keys.
    #[must_use]
    pub fn with_label_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.label_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description<D>(mut self, description: D) -> Self
    where
        D: Into<String>,
    {
        self.description = description.into();
        self
    }

    /// Sets the unit.
    #[must_use]
    pub fn with_unit<U>(mut self, unit: U) -> Self
    where
        U: Into<String>,
    {
        self.unit = unit.into();
        self
    }
}
