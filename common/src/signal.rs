use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classification of a signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalSide {
    Buy,
    Sell,
    Hold,
    /// Score could not be computed
    Empty,
}

impl SignalSide {
    /// Classify a score against the buy/sell thresholds.
    ///
    /// Both comparisons are strict: a score sitting exactly on a threshold is a hold.
    pub fn classify(score: f64, buy_threshold: f64, sell_threshold: f64) -> Self {
        if score.is_nan() {
            SignalSide::Empty
        } else if score > buy_threshold {
            SignalSide::Buy
        } else if score < sell_threshold {
            SignalSide::Sell
        } else {
            SignalSide::Hold
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSide::Buy => "BUY",
            SignalSide::Sell => "SELL",
            SignalSide::Hold => "HOLD",
            SignalSide::Empty => "EMPTY",
        }
    }
}

impl std::fmt::Display for SignalSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one successful analysis cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub id: Uuid,
    pub symbol: String,
    pub side: SignalSide,
    /// Normalized score in [-1, 1]; `None` when the side is `Empty`
    pub score: Option<f64>,
    pub close_price: f64,
    /// End of the last analyzed kline
    pub close_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(symbol: &str, score: Option<f64>, side: SignalSide, close_price: f64, close_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side,
            score,
            close_price,
            close_time,
            created_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.side == SignalSide::Empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_strict_thresholds() {
        assert_eq!(SignalSide::classify(0.5, 0.4, -0.4), SignalSide::Buy);
        assert_eq!(SignalSide::classify(0.4, 0.4, -0.4), SignalSide::Hold);
        assert_eq!(SignalSide::classify(-0.4, 0.4, -0.4), SignalSide::Hold);
        assert_eq!(SignalSide::classify(-0.41, 0.4, -0.4), SignalSide::Sell);
        assert_eq!(SignalSide::classify(f64::NAN, 0.4, -0.4), SignalSide::Empty);
    }

    #[test]
    fn test_side_serialization() {
        let json = serde_json::to_string(&SignalSide::Buy).unwrap();
        assert_eq!(json, "\"BUY\"");
        assert_eq!(SignalSide::Empty.to_string(), "EMPTY");
    }
}
