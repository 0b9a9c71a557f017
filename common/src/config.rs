//! Service configuration
//!
//! Read once at startup and treated as read-only for the process lifetime.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Top-level signaler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalerConfig {
    /// Exchange symbol, e.g. BTCUSDT
    #[serde(default = "default_symbol")]
    pub symbol: String,

    #[serde(default = "default_base_asset")]
    pub base_asset: String,

    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,

    /// Kline frequency in exchange notation (1m, 5m, 1h, 1d)
    #[serde(default = "default_freq")]
    pub freq: String,

    /// Maximum tracing level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Folder with predictor weight files
    #[serde(default = "default_model_folder")]
    pub model_folder: PathBuf,

    /// Analysis and signal thresholds
    #[serde(default)]
    pub signaler: SignalerSection,

    /// Event collection and persistence
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Notification sinks
    #[serde(default)]
    pub notifier: NotifierConfig,
}

impl Default for SignalerConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            base_asset: default_base_asset(),
            quote_asset: default_quote_asset(),
            freq: default_freq(),
            log_level: default_log_level(),
            model_folder: default_model_folder(),
            signaler: SignalerSection::default(),
            collector: CollectorConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

impl SignalerConfig {
    /// Kline interval in milliseconds
    pub fn interval_ms(&self) -> Result<i64, ConfigError> {
        parse_freq(&self.freq)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.interval_ms()?;

        let s = &self.signaler;
        if s.features_horizon == 0 {
            return Err(ConfigError::Invalid("features_horizon must be positive".to_string()));
        }
        if s.buy_threshold <= s.sell_threshold {
            return Err(ConfigError::Invalid(format!(
                "buy_threshold {} must be greater than sell_threshold {}",
                s.buy_threshold, s.sell_threshold
            )));
        }
        if !(s.score_step > 0.0) {
            return Err(ConfigError::Invalid("score_step must be positive".to_string()));
        }
        if self.collector.buffer_capacity == 0 {
            return Err(ConfigError::Invalid("buffer_capacity must be positive".to_string()));
        }
        if self.symbol.is_empty() {
            return Err(ConfigError::Invalid("symbol must not be empty".to_string()));
        }
        if self.notifier.prometheus && self.notifier.metrics_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "metrics_addr {:?} is not a socket address",
                self.notifier.metrics_addr
            )));
        }
        Ok(())
    }
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_base_asset() -> String {
    "BTC".to_string()
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_freq() -> String {
    "1m".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_model_folder() -> PathBuf {
    PathBuf::from("MODELS")
}

/// Analysis parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalerSection {
    /// Number of klines retained per symbol
    #[serde(default = "default_features_horizon")]
    pub features_horizon: usize,

    /// Scores strictly above this are BUY
    #[serde(default = "default_buy_threshold")]
    pub buy_threshold: f64,

    /// Scores strictly below this are SELL
    #[serde(default = "default_sell_threshold")]
    pub sell_threshold: f64,

    /// Minimum number of score steps before a notification fires
    #[serde(default = "default_notification_threshold")]
    pub notification_threshold: u32,

    /// Size of one score step
    #[serde(default = "default_score_step")]
    pub score_step: f64,

    /// Predicted labels; names containing `high_` / `low_` form the two score groups
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,

    /// Rolling windows used by the kline feature set
    #[serde(default = "default_feature_windows")]
    pub feature_windows: Vec<usize>,
}

impl Default for SignalerSection {
    fn default() -> Self {
        Self {
            features_horizon: default_features_horizon(),
            buy_threshold: default_buy_threshold(),
            sell_threshold: default_sell_threshold(),
            notification_threshold: default_notification_threshold(),
            score_step: default_score_step(),
            labels: default_labels(),
            feature_windows: default_feature_windows(),
        }
    }
}

fn default_features_horizon() -> usize {
    1440
}

fn default_buy_threshold() -> f64 {
    0.2
}

fn default_sell_threshold() -> f64 {
    -0.2
}

fn default_notification_threshold() -> u32 {
    2
}

fn default_score_step() -> f64 {
    0.05
}

fn default_labels() -> Vec<String> {
    ["high_10", "high_15", "high_20", "low_10", "low_15", "low_20"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_feature_windows() -> Vec<usize> {
    vec![5, 15, 60]
}

/// What `ingest` does when the event buffer is full
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Reject the incoming event and count it as dropped
    #[default]
    DropNewest,
    /// Producers wait for the next drain to free capacity
    Block,
}

/// Event collection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Root folder for collected data
    #[serde(default = "default_collector_folder")]
    pub folder: PathBuf,

    /// Sub-folder for streamed events
    #[serde(default = "default_stream_folder")]
    pub stream_folder: String,

    /// Sub-folder for order book snapshots
    #[serde(default = "default_depth_folder")]
    pub depth_folder: String,

    /// Maximum number of queued events between drains
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    #[serde(default)]
    pub overflow_policy: OverflowPolicy,

    /// Seconds between drains
    #[serde(default = "default_drain_interval_secs")]
    pub drain_interval_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            folder: default_collector_folder(),
            stream_folder: default_stream_folder(),
            depth_folder: default_depth_folder(),
            buffer_capacity: default_buffer_capacity(),
            overflow_policy: OverflowPolicy::default(),
            drain_interval_secs: default_drain_interval_secs(),
        }
    }
}

fn default_collector_folder() -> PathBuf {
    PathBuf::from("COLLECT")
}

fn default_stream_folder() -> String {
    "STREAM".to_string()
}

fn default_depth_folder() -> String {
    "DEPTH".to_string()
}

fn default_buffer_capacity() -> usize {
    100_000
}

fn default_drain_interval_secs() -> u64 {
    60
}

/// Notification sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default = "default_true")]
    pub console: bool,

    /// File the console notifier appends its messages to
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_bot_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_chat_id: Option<String>,

    #[serde(default)]
    pub prometheus: bool,

    /// Listen address of the `/metrics` endpoint
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,

    /// Base asset held, exported as portfolio balance when both quantities are set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_quantity: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_quantity: Option<f64>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            console: true,
            output_file: default_output_file(),
            telegram_bot_token: None,
            telegram_chat_id: None,
            prometheus: false,
            metrics_addr: default_metrics_addr(),
            base_quantity: None,
            quote_quantity: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_output_file() -> PathBuf {
    PathBuf::from("trade-output.txt")
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9898".to_string()
}

/// Convert an exchange frequency like `1m`, `4h` or `1d` to milliseconds
pub fn parse_freq(freq: &str) -> Result<i64, ConfigError> {
    let freq = freq.trim();
    let split = freq
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| ConfigError::Invalid(format!("frequency {:?} has no unit", freq)))?;
    let (count, unit) = freq.split_at(split);

    let count: i64 = count
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("frequency {:?} has no count", freq)))?;
    if count <= 0 {
        return Err(ConfigError::Invalid(format!("frequency {:?} must be positive", freq)));
    }

    let unit_ms = match unit {
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        "w" => 604_800_000,
        _ => return Err(ConfigError::Invalid(format!("unknown frequency unit {:?}", unit))),
    };

    count
        .checked_mul(unit_ms)
        .ok_or_else(|| ConfigError::Invalid(format!("frequency {:?} is too large", freq)))
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<SignalerConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: SignalerConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to TOML file
pub fn save_config(config: &SignalerConfig, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Create a default configuration file template
pub fn create_config_template(path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let template = "# Kline Signaler Configuration

symbol = \"BTCUSDT\"
base_asset = \"BTC\"
quote_asset = \"USDT\"

# Kline frequency: 1m, 5m, 1h, 1d
freq = \"1m\"

log_level = \"info\"

# Folder with predictor weight files (*.json)
model_folder = \"MODELS\"

[signaler]
# Klines retained per symbol
features_horizon = 1440

# Scores strictly above buy / strictly below sell trigger a side
buy_threshold = 0.2
sell_threshold = -0.2

# Notify only from this many score steps on
notification_threshold = 2
score_step = 0.05

labels = [\"high_10\", \"high_15\", \"high_20\", \"low_10\", \"low_15\", \"low_20\"]
feature_windows = [5, 15, 60]

[collector]
folder = \"COLLECT\"
stream_folder = \"STREAM\"
depth_folder = \"DEPTH\"

# Events queued between drains; overflow_policy = drop_newest | block
buffer_capacity = 100000
overflow_policy = \"drop_newest\"
drain_interval_secs = 60

[notifier]
console = true
output_file = \"trade-output.txt\"
prometheus = false
# telegram_bot_token = \"\"
# telegram_chat_id = \"\"
";

    let path = path.as_ref();
    std::fs::write(path, template).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SignalerConfig::default();
        assert_eq!(config.symbol, "BTCUSDT");
        assert_eq!(config.interval_ms().unwrap(), 60_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_freq() {
        assert_eq!(parse_freq("1m").unwrap(), 60_000);
        assert_eq!(parse_freq("5m").unwrap(), 300_000);
        assert_eq!(parse_freq("1h").unwrap(), 3_600_000);
        assert_eq!(parse_freq("1d").unwrap(), 86_400_000);
        assert!(parse_freq("m").is_err());
        assert!(parse_freq("10").is_err());
        assert!(parse_freq("0m").is_err());
        assert!(parse_freq("3y").is_err());
    }

    #[test]
    fn test_metrics_addr_validated() {
        let mut config = SignalerConfig::default();
        config.notifier.metrics_addr = "not an address".to_string();
        assert!(config.validate().is_ok());

        config.notifier.prometheus = true;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.notifier.metrics_addr = "0.0.0.0:9898".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_freq_overflow() {
        assert!(matches!(
            parse_freq("999999999999999w"),
            Err(ConfigError::Invalid(msg)) if msg.contains("too large")
        ));
    }

    #[test]
    fn test_thresholds_validated() {
        let mut config = SignalerConfig::default();
        config.signaler.buy_threshold = -0.3;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = SignalerConfig::default();
        config.signaler.features_horizon = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_template_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signaler.toml");
        create_config_template(&path).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.signaler.features_horizon, 1440);
        assert_eq!(config.collector.overflow_policy, OverflowPolicy::DropNewest);
        assert_eq!(config.signaler.labels.len(), 6);
    }

    #[test]
    fn test_config_serialization() {
        let config = SignalerConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: SignalerConfig = toml::from_str(&serialized).unwrap();

        assert_eq!(config.signaler.buy_threshold, deserialized.signaler.buy_threshold);
        assert_eq!(config.collector.buffer_capacity, deserialized.collector.buffer_capacity);
    }
}
