//! Grouped aggregates and distributions of a transformed dataset.
//!
//! These are the tables behind the exploratory charts: yearly and monthly
//! AQI, pollution proxy trends, category shares and the correlation matrix.

use crate::aqi::AqiCategory;
use crate::data_models::{Dataset, Observation};
use crate::errors::PipelineError;
use crate::importance::pearson;
use crate::schema::{Column, CORRELATION_COLUMNS};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupKey {
    Station,
    Year,
    Month,
}

impl GroupKey {
    fn value(&self, row: &Observation) -> Option<KeyValue> {
        match self {
            GroupKey::Station => row.station.clone().map(KeyValue::Text),
            GroupKey::Year => Some(KeyValue::Int(i64::from(row.year))),
            GroupKey::Month => Some(KeyValue::Int(i64::from(row.month))),
        }
    }
}

/// One component of a group key. Integers order numerically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregation {
    Mean,
    Sum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRow {
    pub key: Vec<KeyValue>,
    pub count: usize,
    /// One entry per aggregated column; `None` when the group has no value.
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTable {
    pub keys: Vec<GroupKey>,
    pub columns: Vec<String>,
    pub aggregation: Aggregation,
    pub rows: Vec<GroupRow>,
}

impl GroupTable {
    pub fn get(&self, key: &[KeyValue]) -> Option<&GroupRow> {
        self.rows.iter().find(|r| r.key == key)
    }
}

/// Groups rows by `keys` (sorted ascending) and aggregates each column over
/// its present values.
pub fn group_aggregate(dataset: &Dataset, keys: &[GroupKey], columns: &[Column], aggregation: Aggregation) -> GroupTable {
    let mut groups: BTreeMap<Vec<KeyValue>, (usize, Vec<(f64, usize)>)> = BTreeMap::new();
    for row in dataset.rows() {
        let Some(key) = keys.iter().map(|k| k.value(row)).collect::<Option<Vec<_>>>() else {
            continue;
        };
        let (count, sums) = groups.entry(key).or_insert_with(|| (0, vec![(0.0, 0); columns.len()]));
        *count += 1;
        for (slot, column) in sums.iter_mut().zip(columns) {
            if let Some(v) = row.numeric(*column) {
                slot.0 += v;
                slot.1 += 1;
            }
        }
    }

    let rows = groups
        .into_iter()
        .map(|(key, (count, sums))| GroupRow {
            key,
            count,
            values: sums
                .into_iter()
                .map(|(sum, n)| match aggregation {
                    _ if n == 0 => None,
                    Aggregation::Mean => Some(sum / n as f64),
                    Aggregation::Sum => Some(sum),
                })
                .collect(),
        })
        .collect();

    GroupTable {
        keys: keys.to_vec(),
        columns: columns.iter().map(|c| c.name().to_string()).collect(),
        aggregation,
        rows,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: AqiCategory,
    pub count: usize,
    pub share: f64,
}

/// Count and share of every category, in severity order. Rows without a
/// category are left out of both.
pub fn category_distribution(dataset: &Dataset) -> Vec<CategoryCount> {
    let counts: Vec<usize> = AqiCategory::ALL
        .iter()
        .map(|c| dataset.rows().iter().filter(|r| r.aqi_category == Some(*c)).count())
        .collect();
    let total: usize = counts.iter().sum();
    AqiCategory::ALL
        .iter()
        .zip(counts)
        .map(|(category, count)| CategoryCount {
            category: *category,
            count,
            share: if total > 0 { count as f64 / total as f64 } else { 0.0 },
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    /// `values[i][j]` over rows where both columns are present; `None` when
    /// either side is constant.
    pub values: Vec<Vec<Option<f64>>>,
}

pub fn correlation_matrix(dataset: &Dataset, columns: &[Column]) -> CorrelationMatrix {
    let mut values = vec![vec![None; columns.len()]; columns.len()];
    for (i, a) in columns.iter().enumerate() {
        for (j, b) in columns.iter().enumerate().skip(i) {
            let (xs, ys): (Vec<f64>, Vec<f64>) = dataset
                .rows()
                .iter()
                .filter_map(|r| Some((r.numeric(*a)?, r.numeric(*b)?)))
                .unzip();
            let r = pearson(&xs, &ys);
            values[i][j] = r;
            values[j][i] = r;
        }
    }
    CorrelationMatrix { columns: columns.iter().map(|c| c.name().to_string()).collect(), values }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub rows: usize,
    pub stations: Vec<String>,
    pub yearly_aqi: GroupTable,
    pub station_yearly_aqi: GroupTable,
    pub monthly_aqi_by_year: GroupTable,
    pub yearly_pollution_mean: GroupTable,
    pub yearly_pollution_sum: GroupTable,
    pub monthly_pollution_pattern: GroupTable,
    pub station_yearly_pollution: GroupTable,
    pub monthly_temperature: GroupTable,
    pub categories: Vec<CategoryCount>,
    pub correlations: CorrelationMatrix,
}

/// All aggregates of a transformed dataset.
pub fn build_summary(dataset: &Dataset) -> Result<DatasetSummary, PipelineError> {
    if dataset.is_empty() {
        return Err(PipelineError::EmptyInput { stage: "summary".to_string() });
    }
    if !dataset.has_column(Column::Aqi) {
        return Err(PipelineError::EmptyColumn { column: Column::Aqi.name().to_string() });
    }
    let proxies = [Column::VehiclePollution, Column::IndustrialPollution];
    let correlation_columns: Vec<Column> = CORRELATION_COLUMNS
        .iter()
        .copied()
        .filter(|c| dataset.has_column(*c))
        .collect();

    let summary = DatasetSummary {
        rows: dataset.len(),
        stations: dataset.stations(),
        yearly_aqi: group_aggregate(dataset, &[GroupKey::Year], &[Column::Aqi], Aggregation::Mean),
        station_yearly_aqi: group_aggregate(
            dataset,
            &[GroupKey::Year, GroupKey::Station],
            &[Column::Aqi],
            Aggregation::Mean,
        ),
        monthly_aqi_by_year: group_aggregate(
            dataset,
            &[GroupKey::Year, GroupKey::Month],
            &[Column::Aqi],
            Aggregation::Mean,
        ),
        yearly_pollution_mean: group_aggregate(dataset, &[GroupKey::Year], &proxies, Aggregation::Mean),
        yearly_pollution_sum: group_aggregate(dataset, &[GroupKey::Year], &proxies, Aggregation::Sum),
        monthly_pollution_pattern: group_aggregate(dataset, &[GroupKey::Month], &proxies, Aggregation::Mean),
        station_yearly_pollution: group_aggregate(
            dataset,
            &[GroupKey::Station, GroupKey::Year],
            &proxies,
            Aggregation::Sum,
        ),
        monthly_temperature: group_aggregate(
            dataset,
            &[GroupKey::Month],
            &[Column::Temp, Column::Dewp],
            Aggregation::Mean,
        ),
        categories: category_distribution(dataset),
        correlations: correlation_matrix(dataset, &correlation_columns),
    };
    info!(
        "Built summary over {} rows, {} stations, {} years",
        summary.rows,
        summary.stations.len(),
        summary.yearly_aqi.rows.len()
    );
    Ok(summary)
}
