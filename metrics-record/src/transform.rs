//! In-place transformations applied to metrics before they are exported.
use std::num::ParseFloatError;

use tracing::debug;

use crate::{Metric, PointValue};

/// Multiplies every floating-point value of a double-valued metric by `factor`.
///
/// Metrics whose kind does not carry floating-point values are left untouched.
pub fn scale_values(metric: &mut Metric, factor: f64) {
    if !metric.descriptor.kind.is_double() {
        return;
    }

    for series in &mut metric.timeseries {
        for point in &mut series.points {
            if let PointValue::Double(value) = &mut point.value {
                *value *= factor;
            }
        }
    }
}

/// Parses `factor` and scales the metric by it.
///
/// # Errors
///
/// If `factor` cannot be parsed as a floating-point number, the metric is left unchanged and the parse error is
/// returned.
pub fn scale_values_str(metric: &mut Metric, factor: &str) -> Result<(), ParseFloatError> {
    let factor = factor.trim().parse::<f64>().map_err(|e| {
        debug!(metric_name = %metric.descriptor.name, factor, "Ignoring unparseable scale factor.");
        e
    })?;

    scale_values(metric, factor);
    Ok(())
}
