//! Percentile winsorization of measurement columns.
//!
//! Bounds are computed over the whole dataset, across all stations and years.

use crate::data_models::Dataset;
use crate::schema::{Column, ValueType};
use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipBounds {
    pub column: Column,
    pub lower: f64,
    pub upper: f64,
    pub clipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipReport {
    pub bounds: Vec<ClipBounds>,
}

impl ClipReport {
    pub fn clipped_cells(&self) -> usize {
        self.bounds.iter().map(|b| b.clipped).sum()
    }

    pub fn bounds_for(&self, column: Column) -> Option<&ClipBounds> {
        self.bounds.iter().find(|b| b.column == column)
    }
}

/// Quantile of already sorted values, interpolating linearly between the
/// order statistics around `h = (n - 1) * q`.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let h = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    Some(sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo]))
}

/// Clips every present float column not listed in `exclude` to its
/// `[lower_q, upper_q]` quantile range. Missing values stay missing.
pub fn clip_outliers(dataset: &mut Dataset, lower_q: f64, upper_q: f64, exclude: &[Column]) -> ClipReport {
    let candidates: Vec<Column> = dataset
        .columns_of_type(ValueType::Float)
        .into_iter()
        .filter(|c| !exclude.contains(c))
        .collect();

    let mut report = ClipReport::default();
    for column in candidates {
        let mut values: Vec<f64> = dataset.rows().iter().filter_map(|r| r.float(column)).collect();
        values.sort_by(|a, b| a.total_cmp(b));
        let (Some(lower), Some(upper)) = (quantile_sorted(&values, lower_q), quantile_sorted(&values, upper_q)) else {
            debug!("Skipping clip for '{}': no observed values", column);
            continue;
        };

        let mut clipped = 0;
        for row in dataset.rows_mut().iter_mut() {
            if let Some(Some(value)) = row.float_mut(column) {
                let bounded = value.clamp(lower, upper);
                if bounded != *value {
                    *value = bounded;
                    clipped += 1;
                }
            }
        }
        debug!("Clipped '{}' to [{:.4}, {:.4}] ({} values changed)", column, lower, upper, clipped);
        report.bounds.push(ClipBounds { column, lower, upper, clipped });
    }

    info!(
        "Outlier clipping bounded {} columns, {} values changed",
        report.bounds.len(),
        report.clipped_cells()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_models::Observation;
    use approx::assert_relative_eq;

    fn dataset_from(values: &[f64]) -> Dataset {
        let rows = values
            .iter()
            .map(|v| Observation { pm25: Some(*v), temp: Some(*v), ..Default::default() })
            .collect();
        Dataset::new(vec![Column::Pm25, Column::Temp], rows)
    }

    #[test]
    fn test_quantile_interpolates_linearly() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(quantile_sorted(&sorted, 0.5).unwrap(), 3.0);
        assert_relative_eq!(quantile_sorted(&sorted, 0.1).unwrap(), 1.4);
        assert_relative_eq!(quantile_sorted(&sorted, 1.0).unwrap(), 5.0);
        assert_eq!(quantile_sorted(&[], 0.5), None);
    }

    #[test]
    fn test_values_end_up_inside_bounds() {
        let mut values: Vec<f64> = (0..200).map(|i| i as f64).collect();
        values.push(10_000.0);
        values.push(-500.0);
        let mut dataset = dataset_from(&values);
        let report = clip_outliers(&mut dataset, 0.01, 0.99, &[]);

        let bounds = report.bounds_for(Column::Pm25).unwrap();
        for value in dataset.float_values(Column::Pm25).into_iter().flatten() {
            assert!(value >= bounds.lower && value <= bounds.upper);
        }
        assert!(bounds.clipped >= 2);
    }

    #[test]
    fn test_clipping_twice_is_a_no_op() {
        let values: Vec<f64> = (0..101).map(|i| ((i * 37) % 101) as f64 * 1.5).collect();
        let mut dataset = dataset_from(&values);
        clip_outliers(&mut dataset, 0.01, 0.99, &[]);
        let once = dataset.float_values(Column::Pm25);

        clip_outliers(&mut dataset, 0.01, 0.99, &[]);
        let twice = dataset.float_values(Column::Pm25);
        for (a, b) in once.iter().zip(&twice) {
            assert_relative_eq!(a.unwrap(), b.unwrap(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_second_pass_stays_within_interpolation_step() {
        // n = 202 puts h = 2.01 between order statistics
        let values: Vec<f64> = (0..202).map(|i| i as f64).collect();
        let mut dataset = dataset_from(&values);
        let first = clip_outliers(&mut dataset, 0.01, 0.99, &[]);
        let bounds = *first.bounds_for(Column::Pm25).unwrap();
        assert_relative_eq!(bounds.lower, 2.01, epsilon = 1e-9);
        assert_relative_eq!(bounds.upper, 198.99, epsilon = 1e-9);
        let once = dataset.float_values(Column::Pm25);

        clip_outliers(&mut dataset, 0.01, 0.99, &[]);
        let twice = dataset.float_values(Column::Pm25);

        // at most frac(h) times the unit spacing of the data
        let tolerance = 0.01 + 1e-9;
        let mut max_shift: f64 = 0.0;
        for (a, b) in once.iter().zip(&twice) {
            let (a, b) = (a.unwrap(), b.unwrap());
            max_shift = max_shift.max((a - b).abs());
            assert!(b >= bounds.lower - 1e-9 && b <= bounds.upper + 1e-9);
        }
        assert!(max_shift <= tolerance, "second pass moved a value by {}", max_shift);
        assert_relative_eq!(max_shift, 0.0099, epsilon = 1e-9);
    }

    #[test]
    fn test_excluded_columns_are_untouched() {
        let mut values: Vec<f64> = (0..50).map(|i| i as f64).collect();
        values.push(1e6);
        let mut dataset = dataset_from(&values);
        let report = clip_outliers(&mut dataset, 0.01, 0.99, &[Column::Temp]);

        assert!(report.bounds_for(Column::Temp).is_none());
        assert_eq!(dataset.rows().last().unwrap().temp, Some(1e6));
        assert!(dataset.rows().last().unwrap().pm25.unwrap() < 1e6);
    }

    #[test]
    fn test_missing_values_stay_missing() {
        let mut dataset = dataset_from(&[1.0, 2.0, 3.0]);
        dataset.rows_mut()[1].pm25 = None;
        clip_outliers(&mut dataset, 0.01, 0.99, &[]);
        assert_eq!(dataset.rows()[1].pm25, None);
    }
}
