//! Missing-value imputation.

use crate::data_models::Dataset;
use crate::errors::PipelineError;
use crate::schema::{Column, ValueType};
use log::{debug, info};
use std::collections::BTreeMap;

/// Fill values chosen for each imputed column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImputationReport {
    pub numeric_fills: Vec<(Column, f64, usize)>,
    pub text_fills: Vec<(Column, String, usize)>,
}

impl ImputationReport {
    pub fn filled_cells(&self) -> usize {
        self.numeric_fills.iter().map(|(_, _, n)| n).sum::<usize>()
            + self.text_fills.iter().map(|(_, _, n)| n).sum::<usize>()
    }
}

/// Mean of the present values, `None` when there are none.
pub fn column_mean(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Most frequent value; ties go to the lexicographically smallest.
pub fn column_mode<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values.flatten() {
        *counts.entry(value).or_insert(0) += 1;
    }
    // BTreeMap iterates in ascending key order, so the first maximum is the smallest key.
    counts
        .into_iter()
        .fold(None, |best: Option<(&str, usize)>, (value, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((value, count)),
        })
        .map(|(value, _)| value.to_string())
}

/// Replaces missing values in every present float column by the column mean
/// and in every present text column by the column mode.
///
/// Fails with `EmptyColumn` when a column has no observed value at all, and
/// with `EmptyInput` on a dataset without rows.
pub fn impute_missing(dataset: &mut Dataset) -> Result<ImputationReport, PipelineError> {
    if dataset.is_empty() {
        return Err(PipelineError::EmptyInput { stage: "impute".to_string() });
    }
    let mut report = ImputationReport::default();

    for column in dataset.columns_of_type(ValueType::Float) {
        let missing = dataset.missing_count(column);
        if missing == 0 {
            continue;
        }
        let mean = column_mean(dataset.rows().iter().map(|r| r.float(column)))
            .ok_or_else(|| PipelineError::EmptyColumn { column: column.name().to_string() })?;
        for row in dataset.rows_mut().iter_mut() {
            if let Some(slot) = row.float_mut(column) {
                if slot.is_none() {
                    *slot = Some(mean);
                }
            }
        }
        debug!("Imputed {} missing values in '{}' with mean {:.4}", missing, column, mean);
        report.numeric_fills.push((column, mean, missing));
    }

    for column in dataset.columns_of_type(ValueType::Text) {
        let missing = dataset.missing_count(column);
        if missing == 0 {
            continue;
        }
        let mode = column_mode(dataset.rows().iter().map(|r| r.text(column)))
            .ok_or_else(|| PipelineError::EmptyColumn { column: column.name().to_string() })?;
        for row in dataset.rows_mut().iter_mut() {
            if let Some(slot) = row.text_mut(column) {
                if slot.is_none() {
                    *slot = Some(mode.clone());
                }
            }
        }
        debug!("Imputed {} missing values in '{}' with mode '{}'", missing, column, mode);
        report.text_fills.push((column, mode, missing));
    }

    info!(
        "Imputation filled {} cells across {} columns",
        report.filled_cells(),
        report.numeric_fills.len() + report.text_fills.len()
    );
    Ok(report)
}
