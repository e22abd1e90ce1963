//! IQR outlier bounds and anomaly detection.
//!
//! [`iqr_bounds`] computes the interquartile-range bounds for one numeric
//! column; [`AnomalyDetector`] folds those bounds over a set of columns into
//! a single boolean mask marking every row that is an outlier on at least
//! one of them.

use crate::error::{EtlError, Result};
use polars::prelude::*;
use tracing::debug;

/// Outlier bounds for a single column.
///
/// Columns without enough numeric data produce NaN bounds; such bounds
/// never exclude a row ([`contains`](Self::contains) is true for every
/// value).
#[derive(Debug, Clone, Copy)]
pub struct IqrBounds {
    pub lower: f64,
    pub upper: f64,
}

impl IqrBounds {
    fn undefined() -> Self {
        Self {
            lower: f64::NAN,
            upper: f64::NAN,
        }
    }

    /// Whether the bounds carry usable limits.
    pub fn is_defined(&self) -> bool {
        self.lower.is_finite() && self.upper.is_finite()
    }

    /// Whether `value` lies inside the closed interval `[lower, upper]`.
    ///
    /// NaN bounds and NaN values always count as inside, so degenerate
    /// columns exclude nothing.
    pub fn contains(&self, value: f64) -> bool {
        !(value < self.lower || value > self.upper)
    }
}

/// Compute IQR outlier bounds for one column.
///
/// Q1 and Q3 are the 25th/75th percentiles with linear interpolation
/// between ranks; the bounds are `Q3 + threshold * IQR` and
/// `Q1 - threshold * IQR`. A column with fewer than two distinct numeric
/// values yields undefined (NaN) bounds.
pub fn iqr_bounds(series: &Series, threshold: f64) -> Result<IqrBounds> {
    let values = sorted_numeric_values(series)?;

    // `values` is sorted, so a single distinct value shows as equal ends.
    if values.len() < 2 || values.first() == values.last() {
        return Ok(IqrBounds::undefined());
    }

    let q1 = quantile_sorted(&values, 0.25);
    let q3 = quantile_sorted(&values, 0.75);
    let iqr = q3 - q1;

    Ok(IqrBounds {
        lower: q1 - threshold * iqr,
        upper: q3 + threshold * iqr,
    })
}

/// Collect the non-null, non-NaN values of a column as sorted f64s.
fn sorted_numeric_values(series: &Series) -> Result<Vec<f64>> {
    let cast = series.cast(&DataType::Float64)?;
    let ca = cast.f64()?;

    let mut values: Vec<f64> = ca.into_iter().flatten().filter(|v| !v.is_nan()).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Ok(values)
}

/// Percentile of a sorted slice with linear interpolation between ranks.
fn quantile_sorted(values: &[f64], quantile: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let pos = quantile.clamp(0.0, 1.0) * (values.len() as f64 - 1.0);
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        return values[lower];
    }
    let weight = pos - lower as f64;
    values[lower] + (values[upper] - values[lower]) * weight
}

/// Flags rows that are outliers on any of a set of columns.
#[derive(Debug, Clone, Copy)]
pub struct AnomalyDetector {
    threshold: f64,
}

impl AnomalyDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Build the anomaly mask for `df` over `columns`.
    ///
    /// The mask is a pure fold: each column contributes its own out-of-bounds
    /// mask, OR-accumulated into the result, so a row flagged by one column
    /// stays flagged regardless of later columns. Rows are not dropped here.
    ///
    /// Null values and columns with undefined bounds contribute no flags.
    pub fn flag_outliers(&self, df: &DataFrame, columns: &[&str]) -> Result<BooleanChunked> {
        let mut flagged = vec![false; df.height()];

        for &name in columns {
            let column = df
                .column(name)
                .map_err(|_| EtlError::ColumnNotFound(name.to_string()))?;
            let series = column.as_materialized_series();

            let bounds = iqr_bounds(series, self.threshold)?;
            if !bounds.is_defined() {
                debug!("column '{}' has undefined IQR bounds, no rows excluded", name);
                continue;
            }

            let cast = series.cast(&DataType::Float64)?;
            let ca = cast.f64()?;
            let mut outliers = 0usize;
            for (i, value) in ca.into_iter().enumerate() {
                if let Some(v) = value {
                    if !bounds.contains(v) {
                        flagged[i] = true;
                        outliers += 1;
                    }
                }
            }

            debug!(
                "column '{}': bounds [{:.4}, {:.4}], {} outlier values",
                name, bounds.lower, bounds.upper, outliers
            );
        }

        Ok(BooleanChunked::from_slice("is_anomaly".into(), &flagged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iqr_bounds_linear_interpolation() {
        // For 1..=10: Q1 = 3.25, Q3 = 7.75, IQR = 4.5.
        let series = Series::new(
            "value".into(),
            (1..=10).map(|v| v as f64).collect::<Vec<f64>>(),
        );
        let bounds = iqr_bounds(&series, 1.5).unwrap();

        assert_eq!(bounds.upper, 14.5);
        assert_eq!(bounds.lower, -3.5);

        for v in 1..=10 {
            assert!(bounds.contains(v as f64));
        }
    }

    #[test]
    fn test_iqr_bounds_single_distinct_value() {
        let series = Series::new("value".into(), vec![5.0, 5.0, 5.0, 5.0]);
        let bounds = iqr_bounds(&series, 1.5).unwrap();
        assert!(!bounds.is_defined());
        // Undefined bounds exclude nothing.
        assert!(bounds.contains(5.0));
        assert!(bounds.contains(1e12));
    }

    #[test]
    fn test_iqr_bounds_empty_column() {
        let series = Series::new("value".into(), Vec::<Option<f64>>::new());
        let bounds = iqr_bounds(&series, 1.5).unwrap();
        assert!(!bounds.is_defined());
    }

    #[test]
    fn test_iqr_bounds_ignores_nulls() {
        let series = Series::new(
            "value".into(),
            vec![Some(1.0), None, Some(2.0), Some(3.0), None, Some(4.0)],
        );
        let bounds = iqr_bounds(&series, 1.5).unwrap();
        assert!(bounds.is_defined());
        assert!(bounds.contains(2.5));
    }

    #[test]
    fn test_contains_treats_nan_value_as_inside() {
        let bounds = IqrBounds {
            lower: 0.0,
            upper: 10.0,
        };
        assert!(bounds.contains(f64::NAN));
        assert!(bounds.contains(0.0));
        assert!(bounds.contains(10.0));
        assert!(!bounds.contains(-0.1));
        assert!(!bounds.contains(10.1));
    }

    #[test]
    fn test_flag_outliers_single_column() {
        let df = df![
            "value" => [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 100.0],
        ]
        .unwrap();

        let mask = AnomalyDetector::new(1.5)
            .flag_outliers(&df, &["value"])
            .unwrap();

        let flags: Vec<bool> = mask.into_iter().map(|v| v.unwrap()).collect();
        assert_eq!(flags.iter().filter(|f| **f).count(), 1);
        assert!(flags[9]);
    }

    #[test]
    fn test_flag_outliers_accumulates_across_columns() {
        // Row 0 is extreme on `a`, row 9 on `b`; both must end up flagged.
        let df = df![
            "a" => [-500.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0],
            "b" => [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 500.0],
        ]
        .unwrap();

        let mask = AnomalyDetector::new(1.5)
            .flag_outliers(&df, &["a", "b"])
            .unwrap();

        let flags: Vec<bool> = mask.into_iter().map(|v| v.unwrap()).collect();
        assert!(flags[0]);
        assert!(flags[9]);
        assert_eq!(flags.iter().filter(|f| **f).count(), 2);
    }

    #[test]
    fn test_flag_outliers_null_values_not_flagged() {
        let df = df![
            "value" => [Some(1.0), Some(2.0), None, Some(3.0), Some(4.0), Some(5.0)],
        ]
        .unwrap();

        let mask = AnomalyDetector::new(1.5)
            .flag_outliers(&df, &["value"])
            .unwrap();

        assert_eq!(mask.into_iter().filter(|v| v.unwrap()).count(), 0);
    }

    #[test]
    fn test_flag_outliers_missing_column() {
        let df = df!["value" => [1.0, 2.0]].unwrap();
        let err = AnomalyDetector::new(1.5)
            .flag_outliers(&df, &["absent"])
            .unwrap_err();
        assert!(matches!(err, EtlError::ColumnNotFound(name) if name == "absent"));
    }
}
