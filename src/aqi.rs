//! Air Quality Index derivation.
//!
//! Each pollutant maps concentration to index through a table of linear
//! segments `(C_low, C_high, I_low, I_high)`. PM2.5 and PM10 are evaluated on a
//! per-station rolling mean (24 observations by default), the gases on the
//! hourly reading. A concentration outside every segment has no sub-index;
//! the row's AQI is the rounded maximum of the defined sub-indices.

use crate::data_models::Dataset;
use crate::schema::Column;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// One interpolation segment of a breakpoint table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoint {
    pub c_low: f64,
    pub c_high: f64,
    pub i_low: f64,
    pub i_high: f64,
}

const fn bp(c_low: f64, c_high: f64, i_low: f64, i_high: f64) -> Breakpoint {
    Breakpoint { c_low, c_high, i_low, i_high }
}

/// PM2.5, 24-hour mean (µg/m³).
pub const PM25_24H: [Breakpoint; 7] = [
    bp(0.0, 35.0, 0.0, 50.0),
    bp(35.0, 75.0, 51.0, 100.0),
    bp(75.0, 115.0, 101.0, 150.0),
    bp(115.0, 150.0, 151.0, 200.0),
    bp(150.0, 250.0, 201.0, 300.0),
    bp(250.0, 350.0, 301.0, 400.0),
    bp(350.0, 500.0, 401.0, 500.0),
];

/// PM10, 24-hour mean (µg/m³).
pub const PM10_24H: [Breakpoint; 7] = [
    bp(0.0, 50.0, 0.0, 50.0),
    bp(51.0, 150.0, 51.0, 100.0),
    bp(151.0, 250.0, 101.0, 150.0),
    bp(251.0, 350.0, 151.0, 200.0),
    bp(350.0, 420.0, 201.0, 300.0),
    bp(420.0, 500.0, 301.0, 400.0),
    bp(500.0, 600.0, 401.0, 500.0),
];

/// SO2, hourly (µg/m³).
pub const SO2_1H: [Breakpoint; 7] = [
    bp(0.0, 150.0, 0.0, 50.0),
    bp(151.0, 500.0, 51.0, 100.0),
    bp(501.0, 650.0, 101.0, 150.0),
    bp(651.0, 800.0, 151.0, 200.0),
    bp(801.0, 1600.0, 201.0, 300.0),
    bp(1601.0, 2100.0, 301.0, 400.0),
    bp(2100.0, 2620.0, 401.0, 500.0),
];

/// NO2, hourly (µg/m³).
pub const NO2_1H: [Breakpoint; 7] = [
    bp(0.0, 100.0, 0.0, 50.0),
    bp(101.0, 200.0, 51.0, 100.0),
    bp(201.0, 700.0, 101.0, 150.0),
    bp(701.0, 1200.0, 151.0, 200.0),
    bp(1201.0, 2340.0, 201.0, 300.0),
    bp(2341.0, 3090.0, 301.0, 400.0),
    bp(3091.0, 3840.0, 401.0, 500.0),
];

/// CO, hourly (µg/m³).
pub const CO_1H: [Breakpoint; 7] = [
    bp(0.0, 5000.0, 0.0, 50.0),
    bp(5001.0, 10000.0, 51.0, 100.0),
    bp(10001.0, 35000.0, 101.0, 150.0),
    bp(35001.0, 60000.0, 151.0, 200.0),
    bp(60001.0, 90000.0, 201.0, 300.0),
    bp(90001.0, 120000.0, 301.0, 400.0),
    bp(120001.0, 150000.0, 401.0, 500.0),
];

/// O3, hourly (µg/m³).
pub const O3_1H: [Breakpoint; 7] = [
    bp(0.0, 160.0, 0.0, 50.0),
    bp(161.0, 200.0, 51.0, 100.0),
    bp(201.0, 300.0, 101.0, 150.0),
    bp(301.0, 400.0, 151.0, 200.0),
    bp(401.0, 800.0, 201.0, 300.0),
    bp(801.0, 1000.0, 301.0, 400.0),
    bp(1001.0, 1200.0, 401.0, 500.0),
];

/// Breakpoint table for a pollutant column.
pub fn breakpoints_for(column: Column) -> Option<&'static [Breakpoint]> {
    match column {
        Column::Pm25 => Some(&PM25_24H),
        Column::Pm10 => Some(&PM10_24H),
        Column::So2 => Some(&SO2_1H),
        Column::No2 => Some(&NO2_1H),
        Column::Co => Some(&CO_1H),
        Column::O3 => Some(&O3_1H),
        _ => None,
    }
}

/// Sub-index of `concentration` against `table`.
///
/// The first segment with `C_low <= c <= C_high` is used, so a value on a
/// shared edge takes the lower segment's `I_high`. Values in a gap between
/// segments, below the first or above the last segment, and NaN yield `None`.
pub fn sub_index(concentration: f64, table: &[Breakpoint]) -> Option<f64> {
    table
        .iter()
        .find(|b| b.c_low <= concentration && concentration <= b.c_high)
        .map(|b| b.i_low + (b.i_high - b.i_low) * (concentration - b.c_low) / (b.c_high - b.c_low))
}

/// Overall AQI from per-pollutant sub-indices: maximum of the defined ones,
/// rounded half to even. `None` when no sub-index is defined.
pub fn combine_sub_indices<I>(sub_indices: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    sub_indices
        .into_iter()
        .flatten()
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
        .map(f64::round_ties_even)
}

/// Severity label of an AQI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AqiCategory {
    #[serde(rename = "Good")]
    Good,
    #[serde(rename = "Moderate")]
    Moderate,
    #[serde(rename = "Unhealthy for sensitive group")]
    UnhealthyForSensitiveGroup,
    #[serde(rename = "Unhealthy")]
    Unhealthy,
    #[serde(rename = "Very Unhealthy")]
    VeryUnhealthy,
    #[serde(rename = "Hazardous")]
    Hazardous,
}

impl AqiCategory {
    pub const ALL: [AqiCategory; 6] = [
        AqiCategory::Good,
        AqiCategory::Moderate,
        AqiCategory::UnhealthyForSensitiveGroup,
        AqiCategory::Unhealthy,
        AqiCategory::VeryUnhealthy,
        AqiCategory::Hazardous,
    ];

    /// Bins `aqi` into `[0,50) [50,100) [100,150) [150,200) [200,300) [300,inf)`.
    /// Negative and NaN values have no category.
    pub fn from_aqi(aqi: f64) -> Option<AqiCategory> {
        if aqi.is_nan() || aqi < 0.0 {
            None
        } else if aqi < 50.0 {
            Some(AqiCategory::Good)
        } else if aqi < 100.0 {
            Some(AqiCategory::Moderate)
        } else if aqi < 150.0 {
            Some(AqiCategory::UnhealthyForSensitiveGroup)
        } else if aqi < 200.0 {
            Some(AqiCategory::Unhealthy)
        } else if aqi < 300.0 {
            Some(AqiCategory::VeryUnhealthy)
        } else {
            Some(AqiCategory::Hazardous)
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitiveGroup => "Unhealthy for sensitive group",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }

    pub fn from_label(label: &str) -> Option<AqiCategory> {
        let label = label.trim();
        AqiCategory::ALL.iter().copied().find(|c| c.label() == label)
    }
}

impl fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Trailing mean over the last `window` observations, counting only present
/// values. Constant work per pushed value.
#[derive(Debug, Clone)]
pub struct RollingMean {
    window: usize,
    min_periods: usize,
    values: VecDeque<Option<f64>>,
    sum: f64,
    count: usize,
}

impl RollingMean {
    pub fn new(window: usize, min_periods: usize) -> Self {
        Self {
            window: window.max(1),
            min_periods: min_periods.max(1),
            values: VecDeque::with_capacity(window.max(1)),
            sum: 0.0,
            count: 0,
        }
    }

    /// Adds the next value and returns the mean of the current window.
    pub fn push(&mut self, value: Option<f64>) -> Option<f64> {
        if self.values.len() == self.window {
            if let Some(Some(old)) = self.values.pop_front() {
                self.sum -= old;
                self.count -= 1;
            }
        }
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
        self.values.push_back(value);

        if self.count >= self.min_periods {
            Some(self.sum / self.count as f64)
        } else {
            None
        }
    }
}

/// Adds the `AQI` column.
///
/// Rows are visited in their current order, which the timestamp builder has
/// made chronological; rolling windows are kept separately per station.
pub fn compute_aqi(dataset: &mut Dataset, window: usize, min_periods: usize) {
    let mut windows: HashMap<Option<String>, (RollingMean, RollingMean)> = HashMap::new();
    let mut undefined = 0usize;

    for row in dataset.rows_mut().iter_mut() {
        let (pm25_window, pm10_window) = windows
            .entry(row.station.clone())
            .or_insert_with(|| (RollingMean::new(window, min_periods), RollingMean::new(window, min_periods)));
        let pm25_mean = pm25_window.push(row.pm25);
        let pm10_mean = pm10_window.push(row.pm10);

        let subs = [
            pm25_mean.and_then(|c| sub_index(c, &PM25_24H)),
            pm10_mean.and_then(|c| sub_index(c, &PM10_24H)),
            row.so2.and_then(|c| sub_index(c, &SO2_1H)),
            row.no2.and_then(|c| sub_index(c, &NO2_1H)),
            row.co.and_then(|c| sub_index(c, &CO_1H)),
            row.o3.and_then(|c| sub_index(c, &O3_1H)),
        ];
        row.aqi = combine_sub_indices(subs);
        if row.aqi.is_none() {
            undefined += 1;
        }
    }

    dataset.add_column(Column::Aqi);
    if undefined > 0 {
        debug!("{} rows have no defined sub-index; AQI left undefined", undefined);
    }
    info!(
        "Computed AQI for {} rows across {} stations ({} undefined)",
        dataset.len(),
        windows.len(),
        undefined
    );
}

/// Adds the `AQI_category` column from `AQI`.
pub fn assign_categories(dataset: &mut Dataset) {
    for row in dataset.rows_mut().iter_mut() {
        row.aqi_category = row.aqi.and_then(AqiCategory::from_aqi);
    }
    dataset.add_column(Column::AqiCategory);
}
