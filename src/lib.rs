pub mod aqi;
pub mod cache;
pub mod config;
pub mod data_models;
pub mod derived;
pub mod encoding;
pub mod errors;
pub mod evaluation;
pub mod export;
pub mod imputation;
pub mod importance;
pub mod lag;
pub mod loader;
pub mod metrics;
pub mod outliers;
pub mod parsers;
pub mod pipeline;
pub mod schema;
pub mod split;
pub mod summary;
pub mod timestamp;
pub mod validation;

pub use config::{load_config, PipelineConfig};
pub use data_models::{Dataset, Observation};
pub use errors::{ConfigError, ParseError, PipelineError};
pub use pipeline::{FeaturePipeline, PipelineOutput};
