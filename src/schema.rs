//! Declared column schema.
//!
//! Every column the pipeline can read, derive or emit is listed here together
//! with its semantic role and storage type. Stages select the columns they
//! operate on from this table instead of inspecting values at runtime, so a
//! measurement column that happens to be entirely missing is still treated as
//! numeric.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a column means to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnRole {
    Identifier,
    RowSequence,
    Calendar,
    TimeKey,
    Measurement,
    Categorical,
    Derived,
    Target,
    Label,
    Lag,
}

/// How a column's values are stored on an [`Observation`](crate::data_models::Observation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Float,
    Integer,
    Text,
    Category,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Column {
    No,
    Year,
    Month,
    Day,
    Hour,
    Timestamp,
    Pm25,
    Pm10,
    So2,
    No2,
    Co,
    O3,
    Temp,
    Pres,
    Dewp,
    Rain,
    Wd,
    Wspm,
    Station,
    VehiclePollution,
    IndustrialPollution,
    Aqi,
    AqiCategory,
    Pm25Lag1,
    AqiLag1,
}

impl Column {
    pub const ALL: [Column; 25] = [
        Column::No,
        Column::Year,
        Column::Month,
        Column::Day,
        Column::Hour,
        Column::Timestamp,
        Column::Pm25,
        Column::Pm10,
        Column::So2,
        Column::No2,
        Column::Co,
        Column::O3,
        Column::Temp,
        Column::Pres,
        Column::Dewp,
        Column::Rain,
        Column::Wd,
        Column::Wspm,
        Column::Station,
        Column::VehiclePollution,
        Column::IndustrialPollution,
        Column::Aqi,
        Column::AqiCategory,
        Column::Pm25Lag1,
        Column::AqiLag1,
    ];

    /// External (file) name of the column.
    pub fn name(&self) -> &'static str {
        match self {
            Column::No => "No",
            Column::Year => "year",
            Column::Month => "month",
            Column::Day => "day",
            Column::Hour => "hour",
            Column::Timestamp => "timestamp",
            Column::Pm25 => "PM2.5",
            Column::Pm10 => "PM10",
            Column::So2 => "SO2",
            Column::No2 => "NO2",
            Column::Co => "CO",
            Column::O3 => "O3",
            Column::Temp => "TEMP",
            Column::Pres => "PRES",
            Column::Dewp => "DEWP",
            Column::Rain => "RAIN",
            Column::Wd => "wd",
            Column::Wspm => "WSPM",
            Column::Station => "station",
            Column::VehiclePollution => "vehicle_pollution",
            Column::IndustrialPollution => "industrial_pollution",
            Column::Aqi => "AQI",
            Column::AqiCategory => "AQI_category",
            Column::Pm25Lag1 => "PM2.5_lag1",
            Column::AqiLag1 => "AQI_lag1",
        }
    }

    pub fn from_name(name: &str) -> Option<Column> {
        let name = name.trim();
        Column::ALL.iter().copied().find(|c| c.name() == name)
    }

    pub fn role(&self) -> ColumnRole {
        match self {
            Column::Station => ColumnRole::Identifier,
            Column::No => ColumnRole::RowSequence,
            Column::Year | Column::Month | Column::Day | Column::Hour => ColumnRole::Calendar,
            Column::Timestamp => ColumnRole::TimeKey,
            Column::Pm25
            | Column::Pm10
            | Column::So2
            | Column::No2
            | Column::Co
            | Column::O3
            | Column::Temp
            | Column::Pres
            | Column::Dewp
            | Column::Rain
            | Column::Wspm => ColumnRole::Measurement,
            Column::Wd => ColumnRole::Categorical,
            Column::VehiclePollution | Column::IndustrialPollution => ColumnRole::Derived,
            Column::Aqi => ColumnRole::Target,
            Column::AqiCategory => ColumnRole::Label,
            Column::Pm25Lag1 | Column::AqiLag1 => ColumnRole::Lag,
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self.role() {
            ColumnRole::RowSequence | ColumnRole::Calendar => ValueType::Integer,
            ColumnRole::TimeKey => ValueType::Timestamp,
            ColumnRole::Identifier | ColumnRole::Categorical => ValueType::Text,
            ColumnRole::Label => ValueType::Category,
            ColumnRole::Measurement
            | ColumnRole::Derived
            | ColumnRole::Target
            | ColumnRole::Lag => ValueType::Float,
        }
    }

    /// The lag-1 companion column, for the columns that have one.
    pub fn lag_column(&self) -> Option<Column> {
        match self {
            Column::Pm25 => Some(Column::Pm25Lag1),
            Column::Aqi => Some(Column::AqiLag1),
            _ => None,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The six pollutants with breakpoint tables.
pub const POLLUTANTS: [Column; 6] = [
    Column::Pm25,
    Column::Pm10,
    Column::So2,
    Column::No2,
    Column::Co,
    Column::O3,
];

/// Columns a raw input file must provide.
pub const RAW_REQUIRED: [Column; 18] = [
    Column::No,
    Column::Year,
    Column::Month,
    Column::Day,
    Column::Hour,
    Column::Pm25,
    Column::Pm10,
    Column::So2,
    Column::No2,
    Column::Co,
    Column::O3,
    Column::Temp,
    Column::Pres,
    Column::Dewp,
    Column::Rain,
    Column::Wd,
    Column::Wspm,
    Column::Station,
];

/// Columns a re-ingested transformed file must provide.
pub const TRANSFORMED_REQUIRED: [Column; 6] = [
    Column::Timestamp,
    Column::Year,
    Column::Month,
    Column::Station,
    Column::Aqi,
    Column::AqiCategory,
];

/// Numeric columns used for the exploratory correlation matrix.
pub const CORRELATION_COLUMNS: [Column; 14] = [
    Column::Pm25,
    Column::Pm10,
    Column::So2,
    Column::No2,
    Column::Co,
    Column::O3,
    Column::Temp,
    Column::Pres,
    Column::Dewp,
    Column::Rain,
    Column::Wspm,
    Column::Aqi,
    Column::VehiclePollution,
    Column::IndustrialPollution,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_through_lookup() {
        for column in Column::ALL {
            assert_eq!(Column::from_name(column.name()), Some(column));
        }
        assert_eq!(Column::from_name(" PM2.5 "), Some(Column::Pm25));
        assert_eq!(Column::from_name("pm2.5"), None);
    }

    #[test]
    fn test_declared_types_follow_roles() {
        assert_eq!(Column::Station.value_type(), ValueType::Text);
        assert_eq!(Column::Wd.value_type(), ValueType::Text);
        assert_eq!(Column::Hour.value_type(), ValueType::Integer);
        assert_eq!(Column::AqiCategory.value_type(), ValueType::Category);
        assert_eq!(Column::AqiLag1.value_type(), ValueType::Float);
        assert_eq!(Column::Timestamp.value_type(), ValueType::Timestamp);
    }
}
