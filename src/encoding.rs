//! Numeric model inputs from a train/test split.
//!
//! Text and category columns are label-encoded with classes fitted on the
//! training partition, then every feature is standardized with statistics
//! of the training partition. The test partition only ever sees
//! transformations fitted on training data.

use crate::data_models::Dataset;
use crate::errors::PipelineError;
use crate::schema::{Column, ValueType};
use crate::split::TrainTestSplit;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Maps the labels of one column to `0..n` in sorted label order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    pub column: Column,
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<I, S>(column: Column, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut classes: Vec<String> = labels.into_iter().map(Into::into).collect();
        classes.sort();
        classes.dedup();
        Self { column, classes }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn transform(&self, label: &str) -> Result<usize, PipelineError> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map_err(|_| PipelineError::UnseenLabel {
                column: self.column.name().to_string(),
                label: label.to_string(),
            })
    }

    pub fn inverse_transform(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(String::as_str)
    }
}

/// Per-feature standardization `(x - mean) / std` with population std; a
/// feature with zero spread is only centred.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>], width: usize) -> Self {
        let n = rows.len() as f64;
        let mut means = vec![0.0; width];
        let mut scales = vec![1.0; width];
        if rows.is_empty() {
            return Self { means, scales };
        }
        for (j, mean) in means.iter_mut().enumerate() {
            *mean = rows.iter().map(|r| r[j]).sum::<f64>() / n;
        }
        for (j, scale) in scales.iter_mut().enumerate() {
            let variance = rows.iter().map(|r| (r[j] - means[j]).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            *scale = if std > 0.0 { std } else { 1.0 };
        }
        Self { means, scales }
    }

    pub fn transform_row(&self, row: &mut [f64]) {
        for ((value, mean), scale) in row.iter_mut().zip(&self.means).zip(&self.scales) {
            *value = (*value - mean) / scale;
        }
    }

    /// Original scale of a standardized value of feature `index`.
    pub fn inverse_value(&self, index: usize, value: f64) -> f64 {
        match (self.means.get(index), self.scales.get(index)) {
            (Some(mean), Some(scale)) => value * scale + mean,
            _ => value,
        }
    }

    pub fn mean(&self, index: usize) -> Option<f64> {
        self.means.get(index).copied()
    }

    pub fn scale(&self, index: usize) -> Option<f64> {
        self.scales.get(index).copied()
    }
}

/// Dense row-major feature table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows.iter().filter_map(|r| r.get(index).copied()).collect()
    }
}

/// `(X_train, y_train, X_test, y_test)` plus the fitted transformations.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInputs {
    pub x_train: FeatureMatrix,
    pub y_train: Vec<f64>,
    pub x_test: FeatureMatrix,
    pub y_test: Vec<f64>,
    pub encoders: Vec<LabelEncoder>,
    pub scaler: StandardScaler,
}

/// Feature columns of a partition: everything except the time key and the target.
pub fn feature_columns(dataset: &Dataset) -> Vec<Column> {
    dataset
        .columns()
        .iter()
        .copied()
        .filter(|c| !matches!(c, Column::Timestamp | Column::Aqi))
        .collect()
}

fn encode_rows(
    dataset: &Dataset,
    columns: &[Column],
    encoders: &[LabelEncoder],
) -> Result<Vec<Vec<f64>>, PipelineError> {
    dataset
        .rows()
        .iter()
        .enumerate()
        .map(|(row_index, row)| {
            columns
                .iter()
                .map(|column| {
                    let missing = || PipelineError::MissingValue { column: column.name().to_string(), row: row_index };
                    match column.value_type() {
                        ValueType::Text | ValueType::Category => {
                            let label = row.label(*column).ok_or_else(missing)?;
                            let encoder = encoders
                                .iter()
                                .find(|e| e.column == *column)
                                .ok_or_else(missing)?;
                            Ok(encoder.transform(&label)? as f64)
                        }
                        _ => row.numeric(*column).ok_or_else(missing),
                    }
                })
                .collect::<Result<Vec<f64>, PipelineError>>()
        })
        .collect()
}

/// Encodes and scales both partitions with transformations fitted on the
/// training partition.
pub fn prepare_model_inputs(split: &TrainTestSplit) -> Result<ModelInputs, PipelineError> {
    let train = &split.train;
    let test = &split.test;
    if train.is_empty() {
        return Err(PipelineError::EmptyInput { stage: "prepare_model_inputs".to_string() });
    }
    let columns = feature_columns(&train.features);
    if feature_columns(&test.features) != columns {
        return Err(PipelineError::LengthMismatch {
            context: "train/test feature columns".to_string(),
            expected: columns.len(),
            found: feature_columns(&test.features).len(),
        });
    }

    let encoders: Vec<LabelEncoder> = columns
        .iter()
        .filter(|c| matches!(c.value_type(), ValueType::Text | ValueType::Category))
        .map(|c| LabelEncoder::fit(*c, train.features.rows().iter().filter_map(|r| r.label(*c))))
        .collect();
    for encoder in &encoders {
        debug!("Label encoder for '{}': {} classes", encoder.column, encoder.classes().len());
    }

    let mut train_rows = encode_rows(&train.features, &columns, &encoders)?;
    let mut test_rows = encode_rows(&test.features, &columns, &encoders)?;

    let scaler = StandardScaler::fit(&train_rows, columns.len());
    for row in train_rows.iter_mut().chain(test_rows.iter_mut()) {
        scaler.transform_row(row);
    }

    let names: Vec<String> = columns.iter().map(|c| c.name().to_string()).collect();
    info!(
        "Prepared model inputs: {} features, {} train rows, {} test rows",
        names.len(),
        train_rows.len(),
        test_rows.len()
    );
    Ok(ModelInputs {
        x_train: FeatureMatrix { names: names.clone(), rows: train_rows },
        y_train: train.target.clone(),
        x_test: FeatureMatrix { names, rows: test_rows },
        y_test: test.target.clone(),
        encoders,
        scaler,
    })
}
