//! Fixed-order feature pipeline.
//!
//! `transform` runs imputation, outlier clipping, timestamp construction,
//! pollution proxies, AQI and category binning, always in that order: clip
//! bounds must be computed before sub-indices, and the rolling means need the
//! chronological order the timestamp builder establishes. `prepare_training`
//! adds lag features and performs the station-grouped split.
//!
//! Every call works on its own copy of the input. Results are memoized in a
//! content-addressed cache shared by all callers of one `FeaturePipeline`.

use crate::aqi::{assign_categories, compute_aqi};
use crate::cache::{fingerprint_dataset, CacheKey, StageCache};
use crate::config::PipelineConfig;
use crate::data_models::Dataset;
use crate::derived::add_pollution_proxies;
use crate::errors::PipelineError;
use crate::imputation::impute_missing;
use crate::lag::add_lag_features;
use crate::metrics::METRICS;
use crate::outliers::clip_outliers;
use crate::schema::Column;
use crate::split::{split_by_station, TrainTestSplit};
use crate::time_operation;
use crate::timestamp::build_timestamps;
use log::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Impute,
    ClipOutliers,
    BuildTimestamps,
    PollutionProxies,
    ComputeAqi,
    AssignCategories,
    LagFeatures,
}

impl Stage {
    /// Stages of `FeaturePipeline::transform`, in execution order.
    pub const TRANSFORM: [Stage; 6] = [
        Stage::Impute,
        Stage::ClipOutliers,
        Stage::BuildTimestamps,
        Stage::PollutionProxies,
        Stage::ComputeAqi,
        Stage::AssignCategories,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Impute => "impute",
            Stage::ClipOutliers => "clip_outliers",
            Stage::BuildTimestamps => "build_timestamps",
            Stage::PollutionProxies => "pollution_proxies",
            Stage::ComputeAqi => "compute_aqi",
            Stage::AssignCategories => "assign_categories",
            Stage::LagFeatures => "lag_features",
        }
    }
}

/// Transformed dataset together with its train/test split.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub transformed: Dataset,
    pub split: TrainTestSplit,
}

pub struct FeaturePipeline {
    config: PipelineConfig,
    lag_columns: Vec<Column>,
    clip_exclude: Vec<Column>,
    config_fingerprint: u64,
    transform_cache: StageCache<Dataset>,
    training_cache: StageCache<TrainTestSplit>,
}

impl FeaturePipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let lag_columns = config.lag_targets()?;
        let clip_exclude = config.clip_excluded_columns()?;
        Ok(Self {
            config_fingerprint: config.fingerprint(),
            transform_cache: StageCache::new(config.cache_capacity),
            training_cache: StageCache::new(config.cache_capacity),
            lag_columns,
            clip_exclude,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn key(&self, stage: &'static str, input: &Dataset) -> CacheKey {
        CacheKey { stage, config: self.config_fingerprint, input: fingerprint_dataset(input) }
    }

    fn run_stage(&self, stage: Stage, dataset: &mut Dataset) -> Result<(), PipelineError> {
        match stage {
            Stage::Impute => {
                time_operation!(stage.name(), impute_missing(dataset))?;
            }
            Stage::ClipOutliers => {
                time_operation!(
                    stage.name(),
                    clip_outliers(
                        dataset,
                        self.config.clip_lower_quantile,
                        self.config.clip_upper_quantile,
                        &self.clip_exclude,
                    )
                );
            }
            Stage::BuildTimestamps => {
                let report = time_operation!(stage.name(), build_timestamps(dataset, self.config.invalid_dates))?;
                METRICS.lock().record_date_dropped(report.dropped as u64);
            }
            Stage::PollutionProxies => {
                time_operation!(stage.name(), add_pollution_proxies(dataset));
            }
            Stage::ComputeAqi => {
                time_operation!(
                    stage.name(),
                    compute_aqi(dataset, self.config.rolling_window, self.config.rolling_min_periods)
                );
            }
            Stage::AssignCategories => {
                time_operation!(stage.name(), assign_categories(dataset));
            }
            Stage::LagFeatures => {
                let report = time_operation!(stage.name(), add_lag_features(dataset, &self.lag_columns))?;
                METRICS.lock().record_lag_dropped(report.dropped as u64);
            }
        }
        Ok(())
    }

    /// Raw observations to the transformed dataset with AQI and category.
    pub fn transform(&self, raw: &Dataset) -> Result<Dataset, PipelineError> {
        let key = self.key("transform", raw);
        self.transform_cache.get_or_try_insert(key, || {
            let mut dataset = raw.clone();
            for stage in Stage::TRANSFORM {
                self.run_stage(stage, &mut dataset)?;
            }
            info!("Transformed {} raw rows into {} rows", raw.len(), dataset.len());
            Ok(dataset)
        })
    }

    /// Lag features and the station-grouped chronological split of a
    /// transformed dataset.
    pub fn prepare_training(&self, transformed: &Dataset) -> Result<TrainTestSplit, PipelineError> {
        let key = self.key("prepare_training", transformed);
        self.training_cache.get_or_try_insert(key, || {
            let mut dataset = transformed.clone();
            self.run_stage(Stage::LagFeatures, &mut dataset)?;
            time_operation!("split", split_by_station(&dataset, self.config.train_ratio))
        })
    }

    pub fn run(&self, raw: &Dataset) -> Result<PipelineOutput, PipelineError> {
        let transformed = self.transform(raw)?;
        let split = self.prepare_training(&transformed)?;
        Ok(PipelineOutput { transformed, split })
    }
}
