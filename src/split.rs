//! Station-grouped chronological train/test split.
//!
//! Each station's rows are ordered by time and cut once: the first
//! `floor(n * ratio)` rows train, the rest test. A cut that would separate
//! rows sharing a timestamp moves forward past them. Partitions concatenate the
//! per-station pieces in station first-appearance order, so no station's
//! future is placed before its past and stations are never interleaved.

use crate::data_models::{Dataset, Observation};
use crate::errors::PipelineError;
use crate::schema::Column;
use log::{debug, info};

/// Feature rows with the AQI removed, and the AQI values aligned by row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub features: Dataset,
    pub target: Vec<f64>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationSplit {
    pub station: String,
    pub train_rows: usize,
    pub test_rows: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainTestSplit {
    pub train: Partition,
    pub test: Partition,
    pub stations: Vec<StationSplit>,
}

/// Number of training rows for a group of `n` rows.
pub fn train_size(n: usize, ratio: f64) -> usize {
    ((n as f64 * ratio).floor() as usize).min(n)
}

fn partition(columns: &[Column], rows: Vec<Observation>) -> Partition {
    let target = rows.iter().filter_map(|r| r.aqi).collect();
    let mut features = Dataset::new(columns.to_vec(), rows);
    features.drop_columns(&[Column::Aqi]);
    Partition { features, target }
}

pub fn split_by_station(dataset: &Dataset, train_ratio: f64) -> Result<TrainTestSplit, PipelineError> {
    if dataset.is_empty() {
        return Err(PipelineError::EmptyInput { stage: "split".to_string() });
    }
    for (row, obs) in dataset.rows().iter().enumerate() {
        if obs.timestamp.is_none() {
            return Err(PipelineError::MissingTimestamp { row, stage: "split".to_string() });
        }
        if obs.aqi.is_none() {
            return Err(PipelineError::MissingTarget { row });
        }
    }

    let mut train_rows = Vec::new();
    let mut test_rows = Vec::new();
    let mut stations = Vec::new();

    for station in dataset.stations() {
        let mut group: Vec<Observation> = dataset
            .rows()
            .iter()
            .filter(|r| r.station.as_deref() == Some(station.as_str()))
            .cloned()
            .collect();
        group.sort_by_key(|r| r.timestamp);

        let mut cut = train_size(group.len(), train_ratio);
        // rows sharing the boundary hour stay on the training side
        while cut > 0 && cut < group.len() && group[cut].timestamp == group[cut - 1].timestamp {
            cut += 1;
        }
        let test_part = group.split_off(cut);
        debug!("Station '{}': {} train rows, {} test rows", station, group.len(), test_part.len());
        stations.push(StationSplit { station, train_rows: group.len(), test_rows: test_part.len() });
        train_rows.extend(group);
        test_rows.extend(test_part);
    }

    let unassigned = dataset.rows().iter().filter(|r| r.station.is_none()).count();
    if unassigned > 0 {
        debug!("{} rows without station were left out of the split", unassigned);
    }

    let split = TrainTestSplit {
        train: partition(dataset.columns(), train_rows),
        test: partition(dataset.columns(), test_rows),
        stations,
    };
    info!(
        "Split {} stations into {} train and {} test rows",
        split.stations.len(),
        split.train.len(),
        split.test.len()
    );
    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::timestamp_from_parts;

    fn obs(station: &str, day: u32, aqi: f64) -> Observation {
        Observation {
            station: Some(station.to_string()),
            timestamp: timestamp_from_parts(2016, 1, day, 0),
            year: 2016,
            month: 1,
            aqi: Some(aqi),
            ..Default::default()
        }
    }

    fn dataset(rows: Vec<Observation>) -> Dataset {
        Dataset::new(vec![Column::Timestamp, Column::Station, Column::Aqi], rows)
    }

    #[test]
    fn test_floor_split_per_station() {
        let mut rows: Vec<Observation> = (1..=10).map(|d| obs("A", d, d as f64)).collect();
        rows.extend((1..=4).map(|d| obs("B", d, 100.0 + d as f64)));
        let split = split_by_station(&dataset(rows), 0.8).unwrap();

        assert_eq!(
            split.stations,
            vec![
                StationSplit { station: "A".to_string(), train_rows: 8, test_rows: 2 },
                StationSplit { station: "B".to_string(), train_rows: 3, test_rows: 1 },
            ]
        );
        assert_eq!(split.train.target, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 101.0, 102.0, 103.0]);
        assert_eq!(split.test.target, vec![9.0, 10.0, 104.0]);
    }

    #[test]
    fn test_target_is_removed_from_features() {
        let rows = (1..=5).map(|d| obs("A", d, d as f64)).collect();
        let split = split_by_station(&dataset(rows), 0.8).unwrap();
        assert!(!split.train.features.has_column(Column::Aqi));
        assert!(split.train.features.rows().iter().all(|r| r.aqi.is_none()));
        assert_eq!(split.train.features.len(), split.train.target.len());
    }

    #[test]
    fn test_unsorted_input_is_split_chronologically() {
        let rows = vec![obs("A", 3, 3.0), obs("A", 1, 1.0), obs("A", 2, 2.0)];
        let split = split_by_station(&dataset(rows), 0.5).unwrap();
        assert_eq!(split.train.target, vec![1.0]);
        assert_eq!(split.test.target, vec![2.0, 3.0]);
    }

    #[test]
    fn test_duplicate_hours_stay_on_one_side() {
        // floor(6 * 0.5) = 3 would cut between the two day-3 rows
        let rows = vec![
            obs("A", 1, 1.0),
            obs("A", 2, 2.0),
            obs("A", 3, 3.0),
            obs("A", 3, 3.5),
            obs("A", 4, 4.0),
            obs("A", 5, 5.0),
        ];
        let split = split_by_station(&dataset(rows), 0.5).unwrap();

        assert_eq!(split.stations[0], StationSplit { station: "A".to_string(), train_rows: 4, test_rows: 2 });
        assert_eq!(split.train.target, vec![1.0, 2.0, 3.0, 3.5]);
        assert_eq!(split.test.target, vec![4.0, 5.0]);
        let last_train = split.train.features.rows().iter().filter_map(|r| r.timestamp).max();
        let first_test = split.test.features.rows().iter().filter_map(|r| r.timestamp).min();
        assert!(last_train < first_test);
    }

    #[test]
    fn test_single_row_station_goes_to_test() {
        let split = split_by_station(&dataset(vec![obs("A", 1, 1.0)]), 0.8).unwrap();
        assert!(split.train.is_empty());
        assert_eq!(split.test.len(), 1);
    }

    #[test]
    fn test_rejects_missing_target() {
        let mut row = obs("A", 1, 1.0);
        row.aqi = None;
        assert!(matches!(
            split_by_station(&dataset(vec![row]), 0.8),
            Err(PipelineError::MissingTarget { row: 0 })
        ));
    }
}
