//! Market data records

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One fixed-interval OHLCV candle
///
/// `open_time` is the left border of the interval and doubles as the record id
/// within a symbol. `close_time` is the last millisecond of the interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawKline")]
pub struct Kline {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
    pub quote_volume: f64,
    pub trade_count: u64,
    pub taker_base_volume: f64,
    pub taker_quote_volume: f64,
}

impl Kline {
    /// Build a kline for the given interval with `close_time` derived from `open_time`
    pub fn new(open_time: i64, interval_ms: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
            close_time: open_time + interval_ms - 1,
            quote_volume: volume * close,
            trade_count: 0,
            taker_base_volume: 0.0,
            taker_quote_volume: 0.0,
        }
    }

    /// Right border of the interval (exclusive)
    pub fn end_time(&self, interval_ms: i64) -> i64 {
        self.open_time + interval_ms
    }
}

/// Wire forms a kline arrives in: the exchange REST row or a named object
#[derive(Deserialize)]
#[serde(untagged)]
enum RawKline {
    Row(Vec<Value>),
    Named(NamedKline),
}

#[derive(Deserialize)]
struct NamedKline {
    open_time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    close_time: i64,
    #[serde(default)]
    quote_volume: f64,
    #[serde(default)]
    trade_count: u64,
    #[serde(default)]
    taker_base_volume: f64,
    #[serde(default)]
    taker_quote_volume: f64,
}

impl TryFrom<RawKline> for Kline {
    type Error = String;

    fn try_from(raw: RawKline) -> Result<Self, Self::Error> {
        match raw {
            RawKline::Named(k) => Ok(Kline {
                open_time: k.open_time,
                open: k.open,
                high: k.high,
                low: k.low,
                close: k.close,
                volume: k.volume,
                close_time: k.close_time,
                quote_volume: k.quote_volume,
                trade_count: k.trade_count,
                taker_base_volume: k.taker_base_volume,
                taker_quote_volume: k.taker_quote_volume,
            }),
            RawKline::Row(row) => {
                // [open_time, open, high, low, close, volume, close_time,
                //  quote_volume, trades, taker_base, taker_quote, ignore]
                if row.len() < 11 {
                    return Err(format!("kline row has {} fields, expected at least 11", row.len()));
                }
                Ok(Kline {
                    open_time: row_int(&row, 0)?,
                    open: row_float(&row, 1)?,
                    high: row_float(&row, 2)?,
                    low: row_float(&row, 3)?,
                    close: row_float(&row, 4)?,
                    volume: row_float(&row, 5)?,
                    close_time: row_int(&row, 6)?,
                    quote_volume: row_float(&row, 7)?,
                    trade_count: row_int(&row, 8)?.max(0) as u64,
                    taker_base_volume: row_float(&row, 9)?,
                    taker_quote_volume: row_float(&row, 10)?,
                })
            }
        }
    }
}

fn row_float(row: &[Value], idx: usize) -> Result<f64, String> {
    match &row[idx] {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("field {} is not a float", idx)),
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|e| format!("field {} ({:?}): {}", idx, s, e)),
        other => Err(format!("field {} has unexpected type: {}", idx, other)),
    }
}

fn row_int(row: &[Value], idx: usize) -> Result<i64, String> {
    match &row[idx] {
        Value::Number(n) => n.as_i64().ok_or_else(|| format!("field {} is not an integer", idx)),
        Value::String(s) => s
            .parse::<i64>()
            .map_err(|e| format!("field {} ({:?}): {}", idx, s, e)),
        other => Err(format!("field {} has unexpected type: {}", idx, other)),
    }
}

/// Streamed exchange event (trade, depth update, kline update, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub channel: String,
    pub symbol: String,
    pub payload: Value,
}

impl Event {
    pub fn new(channel: impl Into<String>, symbol: impl Into<String>, payload: Value) -> Self {
        Self {
            channel: channel.into(),
            symbol: symbol.into(),
            payload,
        }
    }

    /// Wrap a raw stream message, taking the channel from `"e"` and the symbol from `"s"`
    pub fn from_stream_message(message: Value) -> Self {
        let field = |name: &str| {
            message
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string()
        };
        let channel = field("e");
        let symbol = field("s");
        Self {
            channel,
            symbol,
            payload: message,
        }
    }
}

/// Order book response for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub symbol: String,
    #[serde(rename = "lastUpdateId", default)]
    pub last_update_id: u64,
    /// `[price, quantity]` pairs as delivered by the exchange
    pub bids: Vec<[String; 2]>,
    pub asks: Vec<[String; 2]>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kline_from_rest_row() {
        let row = json!([
            1502942400000i64, "4261.48", "4280.56", "4261.32", "4261.45", "9.58",
            1502942459999i64, "40826.15", 171, "8.33", "35504.97", "0"
        ]);
        let kline: Kline = serde_json::from_value(row).unwrap();
        assert_eq!(kline.open_time, 1502942400000);
        assert_eq!(kline.close_time, 1502942459999);
        assert_eq!(kline.close, 4261.45);
        assert_eq!(kline.trade_count, 171);
        assert_eq!(kline.taker_quote_volume, 35504.97);
    }

    #[test]
    fn test_kline_named_roundtrip() {
        let kline = Kline::new(60_000, 60_000, 1.0, 2.0, 0.5, 1.5, 10.0);
        assert_eq!(kline.close_time, 119_999);

        let text = serde_json::to_string(&kline).unwrap();
        let parsed: Kline = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, kline);
    }

    #[test]
    fn test_kline_short_row_rejected() {
        let row = json!([1, "1", "1"]);
        assert!(serde_json::from_value::<Kline>(row).is_err());
    }

    #[test]
    fn test_event_from_stream_message() {
        let msg = json!({"e": "aggTrade", "s": "BTCUSDT", "p": "100.0"});
        let event = Event::from_stream_message(msg.clone());
        assert_eq!(event.channel, "aggTrade");
        assert_eq!(event.symbol, "BTCUSDT");
        assert_eq!(event.payload, msg);

        let event = Event::from_stream_message(json!({"x": 1}));
        assert_eq!(event.channel, "unknown");
        assert_eq!(event.symbol, "unknown");
    }
}
