// Replay input
// Classifies JSON lines read from stdin into klines, stream events and depth snapshots

use anyhow::{bail, Context, Result};
use common::{DepthSnapshot, Event, Kline};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

/// One decoded input line
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayRecord {
    Kline(Kline),
    Event(Event),
    Depth(DepthSnapshot),
}

/// Decode one line
///
/// Objects carrying `lastUpdateId` are order book snapshots, objects with an
/// `"e"` event type are stream messages, everything else must be a kline
/// (REST row or named object).
pub fn parse_line(line: &str) -> Result<ReplayRecord> {
    let value: Value = serde_json::from_str(line).context("Invalid JSON")?;

    if let Some(object) = value.as_object() {
        if object.contains_key("lastUpdateId") {
            let depth = serde_json::from_value(value).context("Invalid depth snapshot")?;
            return Ok(ReplayRecord::Depth(depth));
        }
        if object.contains_key("e") {
            return Ok(ReplayRecord::Event(Event::from_stream_message(value)));
        }
    }

    if !(value.is_object() || value.is_array()) {
        bail!("Expected a JSON object or array");
    }
    let kline = serde_json::from_value(value).context("Invalid kline")?;
    Ok(ReplayRecord::Kline(kline))
}

/// Records read for one tick
#[derive(Debug, Default)]
pub struct ReplayBatch {
    pub klines: Vec<Kline>,
    pub events: Vec<Event>,
    pub depths: Vec<DepthSnapshot>,
    pub rejected: usize,
    pub eof: bool,
}

/// Read lines until `max_klines` klines were collected or the input ends
pub async fn read_batch<R>(lines: &mut Lines<R>, max_klines: usize) -> Result<ReplayBatch>
where
    R: AsyncBufRead + Unpin,
{
    let mut batch = ReplayBatch::default();

    while batch.klines.len() < max_klines {
        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            batch.eof = true;
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_line(line) {
            Ok(ReplayRecord::Kline(kline)) => batch.klines.push(kline),
            Ok(ReplayRecord::Event(event)) => batch.events.push(event),
            Ok(ReplayRecord::Depth(depth)) => batch.depths.push(depth),
            Err(e) => {
                tracing::warn!("Skipping input line: {:#}", e);
                batch.rejected += 1;
            }
        }
    }

    Ok(batch)
}
