//! Shared data model for the kline signaler workspace
//!
//! Everything that crosses a crate boundary lives here:
//! - Market data records (klines, streamed events, order book snapshots)
//! - The published trade signal
//! - The error taxonomy
//! - Service configuration

pub mod config;
pub mod error;
pub mod market;
pub mod signal;

pub use config::{
    CollectorConfig, NotifierConfig, OverflowPolicy, SignalerConfig, SignalerSection,
    load_config, save_config, create_config_template, parse_freq,
};
pub use error::{
    AnalysisError, ConfigError, IngestionInconsistency, NotificationError, PersistenceError,
    StoreError,
};
pub use market::{DepthSnapshot, Event, Kline};
pub use signal::{Signal, SignalSide};

// Re-export for downstream crates
pub use uuid::Uuid;
