use crate::aqi::AqiCategory;
use crate::schema::{Column, ValueType};
use chrono::NaiveDateTime;

/// One station, one hour.
///
/// Fields are optional because the set of populated columns changes as the
/// row moves through the pipeline: calendar fields are cleared once the
/// timestamp exists, derived and lag fields are filled by later stages, and
/// the target is moved out of the row when features and target are separated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    // Identification & timing
    pub no: Option<i64>,
    pub year: i32,
    pub month: u32,
    pub day: Option<u32>,
    pub hour: Option<u32>,
    pub timestamp: Option<NaiveDateTime>,
    pub station: Option<String>,

    // Pollutants
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub so2: Option<f64>,
    pub no2: Option<f64>,
    pub co: Option<f64>,
    pub o3: Option<f64>,

    // Meteorology
    pub temp: Option<f64>,
    pub pres: Option<f64>,
    pub dewp: Option<f64>,
    pub rain: Option<f64>,
    pub wd: Option<String>,
    pub wspm: Option<f64>,

    // Derived
    pub vehicle_pollution: Option<f64>,
    pub industrial_pollution: Option<f64>,
    pub aqi: Option<f64>,
    pub aqi_category: Option<AqiCategory>,
    pub pm25_lag1: Option<f64>,
    pub aqi_lag1: Option<f64>,
}

impl Observation {
    /// Value of a float column, `None` for missing values and non-float columns.
    pub fn float(&self, column: Column) -> Option<f64> {
        match column {
            Column::Pm25 => self.pm25,
            Column::Pm10 => self.pm10,
            Column::So2 => self.so2,
            Column::No2 => self.no2,
            Column::Co => self.co,
            Column::O3 => self.o3,
            Column::Temp => self.temp,
            Column::Pres => self.pres,
            Column::Dewp => self.dewp,
            Column::Rain => self.rain,
            Column::Wspm => self.wspm,
            Column::VehiclePollution => self.vehicle_pollution,
            Column::IndustrialPollution => self.industrial_pollution,
            Column::Aqi => self.aqi,
            Column::Pm25Lag1 => self.pm25_lag1,
            Column::AqiLag1 => self.aqi_lag1,
            _ => None,
        }
    }

    pub fn float_mut(&mut self, column: Column) -> Option<&mut Option<f64>> {
        match column {
            Column::Pm25 => Some(&mut self.pm25),
            Column::Pm10 => Some(&mut self.pm10),
            Column::So2 => Some(&mut self.so2),
            Column::No2 => Some(&mut self.no2),
            Column::Co => Some(&mut self.co),
            Column::O3 => Some(&mut self.o3),
            Column::Temp => Some(&mut self.temp),
            Column::Pres => Some(&mut self.pres),
            Column::Dewp => Some(&mut self.dewp),
            Column::Rain => Some(&mut self.rain),
            Column::Wspm => Some(&mut self.wspm),
            Column::VehiclePollution => Some(&mut self.vehicle_pollution),
            Column::IndustrialPollution => Some(&mut self.industrial_pollution),
            Column::Aqi => Some(&mut self.aqi),
            Column::Pm25Lag1 => Some(&mut self.pm25_lag1),
            Column::AqiLag1 => Some(&mut self.aqi_lag1),
            _ => None,
        }
    }

    pub fn integer(&self, column: Column) -> Option<i64> {
        match column {
            Column::No => self.no,
            Column::Year => Some(self.year as i64),
            Column::Month => Some(self.month as i64),
            Column::Day => self.day.map(i64::from),
            Column::Hour => self.hour.map(i64::from),
            _ => None,
        }
    }

    /// Float or integer column as `f64`.
    pub fn numeric(&self, column: Column) -> Option<f64> {
        match column.value_type() {
            ValueType::Float => self.float(column),
            ValueType::Integer => self.integer(column).map(|v| v as f64),
            _ => None,
        }
    }

    pub fn text(&self, column: Column) -> Option<&str> {
        match column {
            Column::Station => self.station.as_deref(),
            Column::Wd => self.wd.as_deref(),
            _ => None,
        }
    }

    pub fn text_mut(&mut self, column: Column) -> Option<&mut Option<String>> {
        match column {
            Column::Station => Some(&mut self.station),
            Column::Wd => Some(&mut self.wd),
            _ => None,
        }
    }

    /// Text, category label or formatted integer, for columns encoded as labels.
    pub fn label(&self, column: Column) -> Option<String> {
        match column.value_type() {
            ValueType::Text => self.text(column).map(str::to_string),
            ValueType::Category => self.aqi_category.map(|c| c.label().to_string()),
            _ => None,
        }
    }

    pub fn is_missing(&self, column: Column) -> bool {
        match column.value_type() {
            ValueType::Float => self.float(column).is_none(),
            ValueType::Integer => self.integer(column).is_none(),
            ValueType::Text => self.text(column).is_none(),
            ValueType::Category => self.aqi_category.is_none(),
            ValueType::Timestamp => self.timestamp.is_none(),
        }
    }

    /// Clears the field behind `column`. Year and month are plain integers
    /// and are left untouched.
    pub fn clear(&mut self, column: Column) {
        match column {
            Column::No => self.no = None,
            Column::Day => self.day = None,
            Column::Hour => self.hour = None,
            Column::Timestamp => self.timestamp = None,
            Column::AqiCategory => self.aqi_category = None,
            Column::Year | Column::Month => {}
            other => {
                if let Some(slot) = self.float_mut(other) {
                    *slot = None;
                } else if let Some(slot) = self.text_mut(other) {
                    *slot = None;
                }
            }
        }
    }
}

/// The table passed through every stage: an ordered list of present columns
/// and the rows carrying their values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<Column>,
    rows: Vec<Observation>,
}

impl Dataset {
    pub fn new(columns: Vec<Column>, rows: Vec<Observation>) -> Self {
        let mut dataset = Self { columns: Vec::with_capacity(columns.len()), rows };
        for column in columns {
            dataset.add_column(column);
        }
        dataset
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut Vec<Observation> {
        &mut self.rows
    }

    pub fn into_rows(self) -> Vec<Observation> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }

    /// Appends `column` to the schema unless it is already present.
    pub fn add_column(&mut self, column: Column) {
        if !self.columns.contains(&column) {
            self.columns.push(column);
        }
    }

    /// Removes columns from the schema and clears their values in every row.
    pub fn drop_columns(&mut self, columns: &[Column]) {
        self.columns.retain(|c| !columns.contains(c));
        for row in &mut self.rows {
            for column in columns {
                row.clear(*column);
            }
        }
    }

    /// Present columns with the given storage type.
    pub fn columns_of_type(&self, value_type: ValueType) -> Vec<Column> {
        self.columns
            .iter()
            .copied()
            .filter(|c| c.value_type() == value_type)
            .collect()
    }

    pub fn float_values(&self, column: Column) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.float(column)).collect()
    }

    pub fn missing_count(&self, column: Column) -> usize {
        self.rows.iter().filter(|r| r.is_missing(column)).count()
    }

    /// Station identifiers in order of first appearance.
    pub fn stations(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for row in &self.rows {
            if let Some(station) = &row.station {
                if !seen.contains(station) {
                    seen.push(station.clone());
                }
            }
        }
        seen
    }

    pub fn extend(&mut self, rows: Vec<Observation>) {
        self.rows.extend(rows);
    }

    pub fn retain_rows<F>(&mut self, keep: F)
    where
        F: FnMut(&Observation) -> bool,
    {
        self.rows.retain(keep);
    }
}
