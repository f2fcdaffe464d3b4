use crate::config::InvalidDatePolicy;
use crate::data_models::{Dataset, Observation};
use crate::errors::PipelineError;
use crate::schema::Column;
use chrono::{NaiveDate, NaiveDateTime};
use log::{info, warn};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimestampReport {
    pub dropped: usize,
    pub duplicate_keys: usize,
}

/// Hour-resolution timestamp from calendar fields, `None` when they do not
/// name a real date and hour.
pub fn timestamp_from_parts(year: i32, month: u32, day: u32, hour: u32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, 0, 0)
}

fn row_timestamp(row: &Observation) -> Option<NaiveDateTime> {
    if row.timestamp.is_some() {
        return row.timestamp;
    }
    timestamp_from_parts(row.year, row.month, row.day?, row.hour?)
}

/// Builds the `timestamp` column, orders rows chronologically (stable, so rows
/// sharing an hour keep their input order) and removes `No`, `day` and `hour`.
/// `year` and `month` are kept for grouping.
///
/// Rows that already carry a timestamp keep it.
pub fn build_timestamps(dataset: &mut Dataset, policy: InvalidDatePolicy) -> Result<TimestampReport, PipelineError> {
    let mut report = TimestampReport::default();
    let mut invalid_rows = Vec::new();

    for (index, row) in dataset.rows_mut().iter_mut().enumerate() {
        match row_timestamp(row) {
            Some(ts) => row.timestamp = Some(ts),
            None => match policy {
                InvalidDatePolicy::Reject => {
                    return Err(PipelineError::InvalidDate {
                        row: index,
                        year: row.year,
                        month: row.month,
                        day: row.day,
                        hour: row.hour,
                    });
                }
                InvalidDatePolicy::Drop => {
                    warn!(
                        "Dropping row {}: invalid date year={} month={} day={:?} hour={:?}",
                        index, row.year, row.month, row.day, row.hour
                    );
                    invalid_rows.push(index);
                }
            },
        }
    }

    if !invalid_rows.is_empty() {
        report.dropped = invalid_rows.len();
        dataset.retain_rows(|row| row.timestamp.is_some());
    }

    dataset.rows_mut().sort_by_key(|row| row.timestamp);
    dataset.add_column(Column::Timestamp);
    dataset.drop_columns(&[Column::No, Column::Day, Column::Hour]);

    let mut seen = HashSet::with_capacity(dataset.len());
    for row in dataset.rows() {
        if !seen.insert((row.station.as_deref(), row.timestamp)) {
            report.duplicate_keys += 1;
        }
    }
    if report.duplicate_keys > 0 {
        warn!(
            "{} rows share a (station, timestamp) key with an earlier row",
            report.duplicate_keys
        );
    }

    info!(
        "Built timestamps for {} rows ({} dropped for invalid dates)",
        dataset.len(),
        report.dropped
    );
    Ok(report)
}
