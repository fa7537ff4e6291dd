use std::collections::BTreeMap;

use thiserror::Error;

use crate::{MetricDescriptor, MetricKind, Point, TimeSeries};

/// Tags for a single series, keyed and ordered by tag name.
pub type Tags = BTreeMap<String, String>;

/// The label keys of a descriptor and the label values of a series have different lengths.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("label keys and values do not line up for metric '{metric}': {keys} keys, {values} values")]
pub struct LabelMismatch {
    /// Name of the offending metric.
    pub metric: String,

    /// Number of label keys on the descriptor.
    pub keys: usize,

    /// Number of label values on the series.
    pub values: usize,
}

/// A borrowed view over a metric descriptor and one of its time series.
#[derive(Clone, Copy, Debug)]
pub struct MetricRecord<'a> {
    descriptor: &'a MetricDescriptor,
    series: &'a TimeSeries,
}

impl<'a> MetricRecord<'a> {
    /// Creates a new `MetricRecord`.
    pub fn new(descriptor: &'a MetricDescriptor, series: &'a TimeSeries) -> Self {
        Self { descriptor, series }
    }

    /// Returns the metric name.
    pub fn name(&self) -> &'a str {
        &self.descriptor.name
    }

    /// Returns the metric kind.
    pub fn kind(&self) -> MetricKind {
        self.descriptor.kind
    }

    /// Returns the descriptor.
    pub fn descriptor(&self) -> &'a MetricDescriptor {
        self.descriptor
    }

    /// Returns the time series.
    pub fn series(&self) -> &'a TimeSeries {
        self.series
    }

    /// Returns the points of the series.
    pub fn points(&self) -> &'a [Point] {
        &self.series.points
    }

    /// Returns the single point of the series, or `None` if there is not exactly one.
    pub fn single_point(&self) -> Option<&'a Point> {
        match self.series.points.as_slice() {
            [point] => Some(point),
            _ => None,
        }
    }

    /// Returns the value of the label with the given key, if the label is present and set.
    pub fn label_value(&self, key: &str) -> Option<&'a str> {
        self.descriptor
            .label_keys
            .iter()
            .position(|k| k == key)
            .and_then(|i| self.series.label_values.get(i))
            .and_then(|v| v.as_deref())
    }

    fn check_labels(&self) -> Result<(), LabelMismatch> {
        let keys = self.descriptor.label_keys.len();
        let values = self.series.label_values.len();
        if keys == values {
            Ok(())
        } else {
            Err(LabelMismatch { metric: self.descriptor.name.clone(), keys, values })
        }
    }

    /// Builds the tag map for this series.
    ///
    /// Labels without a value are left out.
    ///
    /// # Errors
    ///
    /// If the number of label keys and label values differ, an error is returned.
    pub fn tags(&self) -> Result<Tags, LabelMismatch> {
        self.check_labels()?;

        let tags = self
            .descriptor
            .label_keys
            .iter()
            .zip(&self.series.label_values)
            .filter_map(|(key, value)| value.as_ref().map(|v| (key.clone(), v.clone())))
            .collect();
        Ok(tags)
    }

    /// Builds the tag map for this series, substituting `missing` for labels without a value.
    ///
    /// # Errors
    ///
    /// If the number of label keys and label values differ, an error is returned.
    pub fn tags_with_missing(&self, missing: &str) -> Result<Tags, LabelMismatch> {
        self.check_labels()?;

        let tags = self
            .descriptor
            .label_keys
            .iter()
            .zip(&self.series.label_values)
            .map(|(key, value)| {
                let value = value.clone().unwrap_or_else(|| missing.to_string());
                (key.clone(), value)
            })
            .collect();
        Ok(tags)
    }
}
