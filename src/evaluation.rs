use crate::encoding::{FeatureMatrix, ModelInputs};
use crate::errors::PipelineError;
use crate::schema::Column;
use serde::{Deserialize, Serialize};

/// Regression error metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub r2: f64,
}

/// Any model that predicts the AQI from a feature matrix.
pub trait Regressor {
    fn name(&self) -> &str;
    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, PipelineError>;
}

pub fn evaluate(y_true: &[f64], y_pred: &[f64]) -> Result<RegressionMetrics, PipelineError> {
    if y_true.len() != y_pred.len() {
        return Err(PipelineError::LengthMismatch {
            context: "evaluation".to_string(),
            expected: y_true.len(),
            found: y_pred.len(),
        });
    }
    if y_true.is_empty() {
        return Err(PipelineError::EmptyInput { stage: "evaluation".to_string() });
    }

    let n = y_true.len() as f64;
    let mae = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).sum::<f64>() / n;
    let ss_res = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum::<f64>();
    let mse = ss_res / n;
    let mean = y_true.iter().sum::<f64>() / n;
    let ss_tot = y_true.iter().map(|t| (t - mean).powi(2)).sum::<f64>();
    // Constant target: perfect predictions score 1, anything else 0.
    let r2 = if ss_tot == 0.0 {
        if ss_res == 0.0 { 1.0 } else { 0.0 }
    } else {
        1.0 - ss_res / ss_tot
    };

    Ok(RegressionMetrics { mae, mse, rmse: mse.sqrt(), r2 })
}

/// Predicts the previous hour's AQI, read from the standardized
/// `AQI_lag1` feature and mapped back to its original scale.
#[derive(Debug, Clone)]
pub struct PersistenceModel {
    index: usize,
    mean: f64,
    scale: f64,
}

impl PersistenceModel {
    pub fn from_inputs(inputs: &ModelInputs) -> Result<Self, PipelineError> {
        let name = Column::AqiLag1.name();
        let index = inputs
            .x_train
            .column_index(name)
            .ok_or_else(|| PipelineError::EmptyColumn { column: name.to_string() })?;
        Ok(Self {
            index,
            mean: inputs.scaler.mean(index).unwrap_or(0.0),
            scale: inputs.scaler.scale(index).unwrap_or(1.0),
        })
    }
}

impl Regressor for PersistenceModel {
    fn name(&self) -> &str {
        "persistence"
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, PipelineError> {
        x.rows
            .iter()
            .enumerate()
            .map(|(row, values)| {
                values
                    .get(self.index)
                    .map(|v| v * self.scale + self.mean)
                    .ok_or_else(|| PipelineError::MissingValue { column: Column::AqiLag1.name().to_string(), row })
            })
            .collect()
    }
}

/// Predicts on the test partition and scores against `y_test`.
pub fn evaluate_model<R: Regressor + ?Sized>(model: &R, inputs: &ModelInputs) -> Result<RegressionMetrics, PipelineError> {
    let predictions = model.predict(&inputs.x_test)?;
    evaluate(&inputs.y_test, &predictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::StandardScaler;
    use approx::assert_relative_eq;

    #[test]
    fn test_metrics() {
        let metrics = evaluate(&[3.0, -0.5, 2.0, 7.0], &[2.5, 0.0, 2.0, 8.0]).unwrap();
        assert_relative_eq!(metrics.mae, 0.5);
        assert_relative_eq!(metrics.mse, 0.375);
        assert_relative_eq!(metrics.rmse, 0.375f64.sqrt());
        assert_relative_eq!(metrics.r2, 0.9486081370449679, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_target_r2() {
        assert_eq!(evaluate(&[5.0, 5.0], &[5.0, 5.0]).unwrap().r2, 1.0);
        assert_eq!(evaluate(&[5.0, 5.0], &[4.0, 5.0]).unwrap().r2, 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(matches!(evaluate(&[1.0], &[1.0, 2.0]), Err(PipelineError::LengthMismatch { .. })));
        assert!(matches!(evaluate(&[], &[]), Err(PipelineError::EmptyInput { .. })));
    }

    #[test]
    fn test_persistence_model_inverts_scaling() {
        let raw = vec![vec![1.0, 40.0], vec![2.0, 60.0]];
        let scaler = StandardScaler::fit(&raw, 2);
        let mut scaled = raw.clone();
        for row in &mut scaled {
            scaler.transform_row(row);
        }
        let names = vec!["PM2.5".to_string(), "AQI_lag1".to_string()];
        let inputs = ModelInputs {
            x_train: FeatureMatrix { names: names.clone(), rows: scaled.clone() },
            y_train: vec![45.0, 65.0],
            x_test: FeatureMatrix { names, rows: scaled },
            y_test: vec![45.0, 65.0],
            encoders: Vec::new(),
            scaler,
        };
        let model = PersistenceModel::from_inputs(&inputs).unwrap();
        let predictions = model.predict(&inputs.x_test).unwrap();
        assert_relative_eq!(predictions[0], 40.0, epsilon = 1e-9);
        assert_relative_eq!(predictions[1], 60.0, epsilon = 1e-9);

        let metrics = evaluate_model(&model, &inputs).unwrap();
        assert_relative_eq!(metrics.mae, 5.0, epsilon = 1e-9);
    }
}
