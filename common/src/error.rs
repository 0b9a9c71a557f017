//! Error taxonomy
//!
//! Every failure is scoped to one store call, one analysis cycle, one
//! persisted batch or one notification. Nothing here is meant to stop the
//! process except `ConfigError` at bootstrap.

use std::path::PathBuf;
use thiserror::Error;

/// Consistency problem found while storing klines. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestionInconsistency {
    #[error("gap between klines {prev} and {next}: delta {delta}ms, expected {expected}ms")]
    Gap {
        prev: i64,
        next: i64,
        delta: i64,
        expected: i64,
    },
    #[error("overlapping or unordered klines {prev} and {next}: delta {delta}ms, expected {expected}ms")]
    Overlap {
        prev: i64,
        next: i64,
        delta: i64,
        expected: i64,
    },
    #[error("{discarded} stored klines replaced by only {appended} new ones")]
    Shrinkage { discarded: usize, appended: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("empty kline batch for {symbol}")]
    EmptyBatch { symbol: String },
}

/// Reason an analysis cycle was aborted
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("no klines stored for {symbol}")]
    InsufficientData { symbol: String },

    #[error("feature generation failed: {reason}")]
    Feature { reason: String },

    #[error("predictor {predictor} failed: {reason}")]
    Predict { predictor: String, reason: String },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification request failed: {0}")]
    Http(String),

    #[error("notification output failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("metrics update failed: {0}")]
    Metrics(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
