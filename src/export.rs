use crate::data_models::{Dataset, Observation};
use crate::encoding::{FeatureMatrix, ModelInputs};
use crate::errors::PipelineError;
use crate::schema::{Column, ValueType};
use csv::Writer;
use log::info;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Format used for the `timestamp` column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn export_error(path: &Path, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Export { path: path.to_path_buf(), message: e.to_string() }
}

fn cell(row: &Observation, column: Column) -> String {
    match column.value_type() {
        ValueType::Float => row.float(column).map(|v| v.to_string()).unwrap_or_default(),
        ValueType::Integer => row.integer(column).map(|v| v.to_string()).unwrap_or_default(),
        ValueType::Text | ValueType::Category => row.label(column).unwrap_or_default(),
        ValueType::Timestamp => row
            .timestamp
            .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_default(),
    }
}

/// Column order of an exported dataset: `timestamp` first when present,
/// then the remaining columns in schema order.
pub fn export_columns(dataset: &Dataset) -> Vec<Column> {
    let mut columns = Vec::with_capacity(dataset.columns().len());
    if dataset.has_column(Column::Timestamp) {
        columns.push(Column::Timestamp);
    }
    columns.extend(dataset.columns().iter().copied().filter(|c| *c != Column::Timestamp));
    columns
}

/// Writes the dataset as CSV to any writer. Missing values are empty fields.
pub fn write_dataset_to<W: Write>(writer: W, dataset: &Dataset) -> Result<(), csv::Error> {
    let columns = export_columns(dataset);
    let mut csv_writer = Writer::from_writer(writer);
    csv_writer.write_record(columns.iter().map(|c| c.name()))?;
    for row in dataset.rows() {
        csv_writer.write_record(columns.iter().map(|c| cell(row, *c)))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_dataset(path: &Path, dataset: &Dataset) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| export_error(parent, e))?;
    }
    let file = fs::File::create(path).map_err(|e| export_error(path, e))?;
    write_dataset_to(file, dataset).map_err(|e| export_error(path, e))?;
    info!("Wrote {} rows to {}", dataset.len(), path.display());
    Ok(())
}

fn write_matrix(path: &Path, matrix: &FeatureMatrix) -> Result<(), PipelineError> {
    let mut writer = Writer::from_path(path).map_err(|e| export_error(path, e))?;
    writer.write_record(&matrix.names).map_err(|e| export_error(path, e))?;
    for row in &matrix.rows {
        writer
            .write_record(row.iter().map(|v| v.to_string()))
            .map_err(|e| export_error(path, e))?;
    }
    writer.flush().map_err(|e| export_error(path, e))
}

fn write_target(path: &Path, target: &[f64]) -> Result<(), PipelineError> {
    let mut writer = Writer::from_path(path).map_err(|e| export_error(path, e))?;
    writer.write_record([Column::Aqi.name()]).map_err(|e| export_error(path, e))?;
    for value in target {
        writer.write_record([value.to_string()]).map_err(|e| export_error(path, e))?;
    }
    writer.flush().map_err(|e| export_error(path, e))
}

/// Writes `X_train.csv`, `y_train.csv`, `X_test.csv` and `y_test.csv` into
/// `dir` and returns their paths.
pub fn write_model_inputs(dir: &Path, inputs: &ModelInputs) -> Result<Vec<PathBuf>, PipelineError> {
    fs::create_dir_all(dir).map_err(|e| export_error(dir, e))?;
    let paths: Vec<PathBuf> = ["X_train.csv", "y_train.csv", "X_test.csv", "y_test.csv"]
        .iter()
        .map(|name| dir.join(name))
        .collect();
    write_matrix(&paths[0], &inputs.x_train)?;
    write_target(&paths[1], &inputs.y_train)?;
    write_matrix(&paths[2], &inputs.x_test)?;
    write_target(&paths[3], &inputs.y_test)?;
    info!("Wrote model inputs to {}", dir.display());
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aqi::AqiCategory;
    use crate::encoding::StandardScaler;
    use crate::timestamp::timestamp_from_parts;

    #[test]
    fn test_timestamp_first_and_labels_as_text() {
        let row = Observation {
            timestamp: timestamp_from_parts(2014, 7, 9, 13),
            year: 2014,
            month: 7,
            station: Some("Shunyi".to_string()),
            pm25: None,
            aqi: Some(57.0),
            aqi_category: Some(AqiCategory::Moderate),
            ..Default::default()
        };
        let dataset = Dataset::new(
            vec![Column::Year, Column::Month, Column::Station, Column::Pm25, Column::Timestamp, Column::Aqi, Column::AqiCategory],
            vec![row],
        );
        let mut buffer = Vec::new();
        write_dataset_to(&mut buffer, &dataset).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("timestamp,year,month,station,PM2.5,AQI,AQI_category"));
        assert_eq!(lines.next(), Some("2014-07-09 13:00:00,2014,7,Shunyi,,57,Moderate"));
    }

    #[test]
    fn test_write_model_inputs_creates_four_files() {
        let dir = tempfile::tempdir().unwrap();
        let matrix = FeatureMatrix { names: vec!["PM2.5".to_string()], rows: vec![vec![0.5], vec![-0.5]] };
        let inputs = ModelInputs {
            x_train: matrix.clone(),
            y_train: vec![10.0, 20.0],
            x_test: matrix,
            y_test: vec![30.0, 40.0],
            encoders: Vec::new(),
            scaler: StandardScaler::default(),
        };
        let paths = write_model_inputs(&dir.path().join("model"), &inputs).unwrap();

        assert_eq!(paths.len(), 4);
        let y_test = fs::read_to_string(&paths[3]).unwrap();
        assert_eq!(y_test, "AQI\n30\n40\n");
        let x_train = fs::read_to_string(&paths[0]).unwrap();
        assert!(x_train.starts_with("PM2.5\n0.5\n"));
    }
}
