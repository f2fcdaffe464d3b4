//! Lag-1 features within each station.

use crate::data_models::Dataset;
use crate::errors::PipelineError;
use crate::schema::Column;
use log::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LagReport {
    pub kept: usize,
    pub dropped: usize,
}

/// Orders rows by (station, timestamp), adds the lag-1 companion of every
/// column in `columns` and removes rows without a complete history.
///
/// A row survives only if every lag value, the AQI and (when present) the AQI
/// category are defined; this removes the first observation of each station.
pub fn add_lag_features(dataset: &mut Dataset, columns: &[Column]) -> Result<LagReport, PipelineError> {
    let mut targets = Vec::with_capacity(columns.len());
    for column in columns {
        let lag = column
            .lag_column()
            .ok_or_else(|| PipelineError::UnsupportedLagColumn { column: column.name().to_string() })?;
        if !dataset.has_column(*column) {
            return Err(PipelineError::EmptyColumn { column: column.name().to_string() });
        }
        targets.push((*column, lag));
    }
    if let Some(row) = dataset.rows().iter().position(|r| r.timestamp.is_none()) {
        return Err(PipelineError::MissingTimestamp { row, stage: "lag".to_string() });
    }

    dataset
        .rows_mut()
        .sort_by(|a, b| (a.station.as_deref(), a.timestamp).cmp(&(b.station.as_deref(), b.timestamp)));

    let rows = dataset.rows_mut();
    for i in (0..rows.len()).rev() {
        let same_station = i > 0 && rows[i - 1].station == rows[i].station;
        for (source, lag) in &targets {
            let previous = if same_station { rows[i - 1].float(*source) } else { None };
            if let Some(slot) = rows[i].float_mut(*lag) {
                *slot = previous;
            }
        }
    }
    for (_, lag) in &targets {
        dataset.add_column(*lag);
    }

    let before = dataset.len();
    let check_category = dataset.has_column(Column::AqiCategory);
    dataset.retain_rows(|row| {
        targets.iter().all(|(_, lag)| row.float(*lag).is_some())
            && row.aqi.is_some()
            && (!check_category || row.aqi_category.is_some())
    });
    let report = LagReport { kept: dataset.len(), dropped: before - dataset.len() };

    debug!("Lag features added for {:?}", targets.iter().map(|(c, _)| c.name()).collect::<Vec<_>>());
    info!("Lag engine kept {} rows, dropped {} without history", report.kept, report.dropped);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aqi::AqiCategory;
    use crate::data_models::Observation;
    use crate::timestamp::timestamp_from_parts;

    fn obs(station: &str, hour: u32, pm25: f64, aqi: f64) -> Observation {
        Observation {
            station: Some(station.to_string()),
            timestamp: timestamp_from_parts(2015, 6, 1, hour),
            year: 2015,
            month: 6,
            pm25: Some(pm25),
            aqi: Some(aqi),
            aqi_category: AqiCategory::from_aqi(aqi),
            ..Default::default()
        }
    }

    fn dataset(rows: Vec<Observation>) -> Dataset {
        Dataset::new(
            vec![Column::Timestamp, Column::Station, Column::Pm25, Column::Aqi, Column::AqiCategory],
            rows,
        )
    }

    #[test]
    fn test_lag_uses_predecessor_in_same_station() {
        let mut data = dataset(vec![
            obs("B", 1, 50.0, 70.0),
            obs("A", 2, 12.0, 20.0),
            obs("A", 0, 10.0, 14.0),
            obs("B", 0, 40.0, 57.0),
            obs("A", 1, 11.0, 16.0),
        ]);
        let report = add_lag_features(&mut data, &[Column::Pm25, Column::Aqi]).unwrap();

        assert_eq!(report, LagReport { kept: 3, dropped: 2 });
        let rows = data.rows();
        assert_eq!(rows[0].station.as_deref(), Some("A"));
        assert_eq!((rows[0].pm25_lag1, rows[0].aqi_lag1), (Some(10.0), Some(14.0)));
        assert_eq!((rows[1].pm25_lag1, rows[1].aqi_lag1), (Some(11.0), Some(16.0)));
        assert_eq!(rows[2].station.as_deref(), Some("B"));
        assert_eq!((rows[2].pm25_lag1, rows[2].aqi_lag1), (Some(40.0), Some(57.0)));
        assert!(data.has_column(Column::Pm25Lag1) && data.has_column(Column::AqiLag1));
    }

    #[test]
    fn test_undefined_predecessor_drops_row() {
        let mut first = obs("A", 0, 10.0, 14.0);
        first.aqi = None;
        first.aqi_category = None;
        let mut data = dataset(vec![first, obs("A", 1, 11.0, 16.0), obs("A", 2, 12.0, 20.0)]);
        let report = add_lag_features(&mut data, &[Column::Aqi]).unwrap();

        // Hour 0 has no AQI, hour 1 has no AQI history.
        assert_eq!(report.dropped, 2);
        assert_eq!(data.rows()[0].aqi_lag1, Some(16.0));
    }

    #[test]
    fn test_unsupported_column() {
        let mut data = dataset(vec![obs("A", 0, 1.0, 1.0)]);
        let err = add_lag_features(&mut data, &[Column::So2]).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedLagColumn { .. }));
    }

    #[test]
    fn test_requires_timestamps() {
        let mut row = obs("A", 0, 1.0, 1.0);
        row.timestamp = None;
        let mut data = dataset(vec![row]);
        assert!(matches!(
            add_lag_features(&mut data, &[Column::Aqi]),
            Err(PipelineError::MissingTimestamp { row: 0, .. })
        ));
    }
}
