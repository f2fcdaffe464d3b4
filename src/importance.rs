//! Feature ranking.
//!
//! The estimator is a seam for any model that can score features; the
//! crate ships a correlation baseline.

use crate::encoding::FeatureMatrix;
use crate::errors::PipelineError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

pub trait ImportanceEstimator {
    /// One non-negative score per column of `x`, in column order.
    fn estimate(&self, x: &FeatureMatrix, y: &[f64]) -> Result<Vec<f64>, PipelineError>;
}

/// Absolute Pearson correlation of each feature with the target. Constant
/// features score zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationImportance;

pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let (dx, dy) = (a - mean_x, b - mean_y);
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

impl ImportanceEstimator for CorrelationImportance {
    fn estimate(&self, x: &FeatureMatrix, y: &[f64]) -> Result<Vec<f64>, PipelineError> {
        if x.len() != y.len() {
            return Err(PipelineError::LengthMismatch {
                context: "feature rows and target".to_string(),
                expected: x.len(),
                found: y.len(),
            });
        }
        Ok((0..x.width())
            .map(|j| pearson(&x.column(j), y).map(f64::abs).unwrap_or(0.0))
            .collect())
    }
}

/// Pairs scores with feature names and sorts them by importance, highest
/// first, ties by name. Every feature needs a finite non-negative score.
pub fn rank_features(names: &[String], scores: &[f64]) -> Result<Vec<FeatureImportance>, PipelineError> {
    if let Some(feature) = names.get(scores.len()) {
        return Err(PipelineError::MissingImportance { feature: feature.clone() });
    }
    if scores.len() != names.len() {
        return Err(PipelineError::LengthMismatch {
            context: "importance scores".to_string(),
            expected: names.len(),
            found: scores.len(),
        });
    }

    let mut ranked = Vec::with_capacity(names.len());
    for (feature, &importance) in names.iter().zip(scores) {
        if !importance.is_finite() || importance < 0.0 {
            return Err(PipelineError::InvalidImportance { feature: feature.clone(), score: importance });
        }
        ranked.push(FeatureImportance { feature: feature.clone(), importance });
    }
    ranked.sort_by(|a, b| {
        b.importance
            .total_cmp(&a.importance)
            .then_with(|| a.feature.cmp(&b.feature))
    });
    Ok(ranked)
}

pub fn top_features(ranked: &[FeatureImportance], k: usize) -> &[FeatureImportance] {
    &ranked[..k.min(ranked.len())]
}

/// Scores and ranks the columns of `x` with `estimator`.
pub fn feature_importances<E: ImportanceEstimator + ?Sized>(
    estimator: &E,
    x: &FeatureMatrix,
    y: &[f64],
) -> Result<Vec<FeatureImportance>, PipelineError> {
    let scores = estimator.estimate(x, y)?;
    rank_features(&x.names, &scores)
}
