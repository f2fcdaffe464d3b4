use crate::errors::ConfigError;
use crate::schema::Column;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::BufReader;
use std::path::PathBuf;

/// What the timestamp builder does with a row whose calendar fields do not
/// form a real date/time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvalidDatePolicy {
    /// Abort the whole batch with `PipelineError::InvalidDate`.
    #[default]
    Reject,
    /// Remove the row and continue.
    Drop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub clip_lower_quantile: f64,
    pub clip_upper_quantile: f64,
    pub clip_exclude: Vec<String>,
    pub rolling_window: usize,
    pub rolling_min_periods: usize,
    pub lag_columns: Vec<String>,
    pub train_ratio: f64,
    pub null_markers: Vec<String>,
    pub invalid_dates: InvalidDatePolicy,
    pub cache_capacity: usize,
    pub top_features: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            clip_lower_quantile: 0.01,
            clip_upper_quantile: 0.99,
            clip_exclude: ["No", "year", "month", "day", "hour"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rolling_window: 24,
            rolling_min_periods: 1,
            lag_columns: vec!["PM2.5".to_string(), "AQI".to_string()],
            train_ratio: 0.8,
            null_markers: ["", "NA", "NaN", "nan"].iter().map(|s| s.to_string()).collect(),
            invalid_dates: InvalidDatePolicy::Reject,
            cache_capacity: 32,
            top_features: 10,
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `AQI_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(ratio) = std::env::var("AQI_TRAIN_RATIO") {
            self.train_ratio = ratio.parse().map_err(|_| invalid("AQI_TRAIN_RATIO", &ratio))?;
        }
        if let Ok(window) = std::env::var("AQI_ROLLING_WINDOW") {
            self.rolling_window = window.parse().map_err(|_| invalid("AQI_ROLLING_WINDOW", &window))?;
        }
        if let Ok(capacity) = std::env::var("AQI_CACHE_CAPACITY") {
            self.cache_capacity = capacity
                .parse()
                .map_err(|_| invalid("AQI_CACHE_CAPACITY", &capacity))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, q) in [
            ("clip_lower_quantile", self.clip_lower_quantile),
            ("clip_upper_quantile", self.clip_upper_quantile),
        ] {
            if !(0.0..=1.0).contains(&q) {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    message: format!("{} must be between 0 and 1", q),
                });
            }
        }
        if self.clip_lower_quantile >= self.clip_upper_quantile {
            return Err(ConfigError::Invalid {
                field: "clip_lower_quantile".to_string(),
                message: format!(
                    "{} must be less than clip_upper_quantile {}",
                    self.clip_lower_quantile, self.clip_upper_quantile
                ),
            });
        }
        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            return Err(ConfigError::Invalid {
                field: "train_ratio".to_string(),
                message: format!("{} must be strictly between 0 and 1", self.train_ratio),
            });
        }
        if self.rolling_window == 0 {
            return Err(ConfigError::Invalid {
                field: "rolling_window".to_string(),
                message: "window must hold at least one observation".to_string(),
            });
        }
        if self.rolling_min_periods == 0 || self.rolling_min_periods > self.rolling_window {
            return Err(ConfigError::Invalid {
                field: "rolling_min_periods".to_string(),
                message: format!("must be between 1 and rolling_window ({})", self.rolling_window),
            });
        }
        self.lag_targets()?;
        self.clip_excluded_columns()?;
        Ok(())
    }

    /// Hash of every setting that influences stage output.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.clip_lower_quantile.to_bits().hash(&mut hasher);
        self.clip_upper_quantile.to_bits().hash(&mut hasher);
        self.clip_exclude.hash(&mut hasher);
        self.rolling_window.hash(&mut hasher);
        self.rolling_min_periods.hash(&mut hasher);
        self.lag_columns.hash(&mut hasher);
        self.train_ratio.to_bits().hash(&mut hasher);
        self.invalid_dates.hash(&mut hasher);
        hasher.finish()
    }

    /// Columns that receive a lag-1 companion.
    pub fn lag_targets(&self) -> Result<Vec<Column>, ConfigError> {
        self.lag_columns
            .iter()
            .map(|name| {
                Column::from_name(name)
                    .filter(|c| c.lag_column().is_some())
                    .ok_or_else(|| ConfigError::Invalid {
                        field: "lag_columns".to_string(),
                        message: format!("no lag feature is defined for '{}'", name),
                    })
            })
            .collect()
    }

    pub fn clip_excluded_columns(&self) -> Result<Vec<Column>, ConfigError> {
        self.clip_exclude
            .iter()
            .map(|name| {
                Column::from_name(name).ok_or_else(|| ConfigError::Invalid {
                    field: "clip_exclude".to_string(),
                    message: format!("unknown column '{}'", name),
                })
            })
            .collect()
    }
}

fn invalid(field: &str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        message: format!("cannot parse '{}'", value),
    }
}

/// Loads a JSON configuration file. Missing fields take their defaults.
pub fn load_config(path_str: &str) -> Result<PipelineConfig, ConfigError> {
    let path = PathBuf::from(path_str);
    if !path.exists() {
        return Err(ConfigError::NotFound { path });
    }

    let file = File::open(&path).map_err(|e| ConfigError::IoError { path: path.clone(), source: e })?;
    let reader = BufReader::new(file);

    let config: PipelineConfig = serde_json::from_reader(reader).map_err(|e| ConfigError::JsonParseError {
        path: path.clone(),
        source: e,
    })?;
    debug!("Loaded configuration from {}: {:?}", path.display(), config);

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lag_targets().unwrap(), vec![Column::Pm25, Column::Aqi]);
    }

    #[test]
    fn test_rejects_inverted_quantiles() {
        let config = PipelineConfig {
            clip_lower_quantile: 0.99,
            clip_upper_quantile: 0.01,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_rejects_unsupported_lag_column() {
        let config = PipelineConfig {
            lag_columns: vec!["SO2".to_string()],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "lag_columns"));
    }

    #[test]
    fn test_rejects_ratio_out_of_range() {
        let config = PipelineConfig { train_ratio: 1.0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fingerprint_tracks_stage_settings() {
        let base = PipelineConfig::default();
        let other = PipelineConfig { rolling_window: 12, ..Default::default() };
        let cosmetic = PipelineConfig { top_features: 3, ..Default::default() };
        assert_ne!(base.fingerprint(), other.fingerprint());
        assert_eq!(base.fingerprint(), cosmetic.fingerprint());
    }

    #[test]
    fn test_load_partial_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"train_ratio": 0.75, "invalid_dates": "drop"}}"#).unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.train_ratio, 0.75);
        assert_eq!(config.invalid_dates, InvalidDatePolicy::Drop);
        assert_eq!(config.rolling_window, 24);
    }

    #[test]
    fn test_missing_config_file() {
        let result = load_config("/nonexistent/aqi_config.json");
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }
}
