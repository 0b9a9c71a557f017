use common::{IngestionInconsistency, Kline, StoreError};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Extra intervals requested on top of the estimated gap
pub const MISSING_SAFETY_MARGIN: usize = 2;

/// Bounded in-memory kline history per symbol
///
/// Every `store` builds a new immutable version of the symbol's history and
/// swaps it in, so a snapshot taken by the analysis path stays consistent no
/// matter what ingestion does afterwards. Concurrent `store` calls for the
/// same symbol are serialized by the map entry lock.
///
/// Merging trusts the producer: a batch starting at `ts0` replaces the whole
/// stored suffix from the first kline at or after `ts0`, even where the old
/// and new records differ. Callers must deliver contiguous ranges.
pub struct TimeSeriesStore {
    histories: DashMap<String, SymbolHistory>,
    horizon: usize,
    interval_ms: i64,
}

#[derive(Debug, Clone, Default)]
struct SymbolHistory {
    klines: Arc<Vec<Kline>>,
    version: u64,
}

/// Read-only view of one version of a symbol's history
#[derive(Debug, Clone)]
pub struct HistorySnapshot {
    pub symbol: String,
    pub version: u64,
    klines: Arc<Vec<Kline>>,
}

impl HistorySnapshot {
    pub fn klines(&self) -> &[Kline] {
        &self.klines
    }

    pub fn len(&self) -> usize {
        self.klines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.klines.is_empty()
    }

    pub fn last(&self) -> Option<&Kline> {
        self.klines.last()
    }
}

/// Outcome of one `store` call
#[derive(Debug, Clone, PartialEq)]
pub struct StoreReport {
    /// New klines appended
    pub appended: usize,
    /// Stored klines replaced by the overlapping batch
    pub discarded: usize,
    /// Oldest klines removed to respect the horizon
    pub trimmed: usize,
    /// History length after the call
    pub len: usize,
    pub version: u64,
    pub inconsistencies: Vec<IngestionInconsistency>,
}

impl StoreReport {
    pub fn is_consistent(&self) -> bool {
        self.inconsistencies.is_empty()
    }
}

impl TimeSeriesStore {
    pub fn new(horizon: usize, interval_ms: i64) -> Self {
        Self {
            histories: DashMap::new(),
            horizon,
            interval_ms,
        }
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn interval_ms(&self) -> i64 {
        self.interval_ms
    }

    /// Merge an ordered batch of klines into the symbol's history
    pub fn store(&self, symbol: &str, klines: &[Kline]) -> Result<StoreReport, StoreError> {
        let first = klines.first().ok_or_else(|| StoreError::EmptyBatch {
            symbol: symbol.to_string(),
        })?;
        let ts0 = first.open_time;

        let mut entry = self.histories.entry(symbol.to_string()).or_default();
        let current = &entry.klines;

        let mut inconsistencies = Vec::new();

        // Everything from the first kline at or after ts0 is replaced by the batch
        let start = current
            .iter()
            .position(|k| k.open_time >= ts0)
            .unwrap_or(current.len());
        let discarded = current.len() - start;
        if discarded > klines.len() {
            inconsistencies.push(IngestionInconsistency::Shrinkage {
                discarded,
                appended: klines.len(),
            });
        }

        let mut merged = Vec::with_capacity(start + klines.len());
        merged.extend_from_slice(&current[..start]);
        merged.extend_from_slice(klines);

        let trimmed = merged.len().saturating_sub(self.horizon);
        if trimmed > 0 {
            merged.drain(..trimmed);
        }

        inconsistencies.extend(self.check_sequence(&merged));

        let version = entry.version + 1;
        let len = merged.len();
        *entry = SymbolHistory {
            klines: Arc::new(merged),
            version,
        };
        drop(entry);

        for issue in &inconsistencies {
            warn!(symbol = %symbol, "Kline history inconsistency: {}", issue);
        }
        debug!(
            "Stored klines for {}. Total {} in db (+{} -{} trimmed {}). Version {}",
            symbol, len, klines.len(), discarded, trimmed, version
        );

        Ok(StoreReport {
            appended: klines.len(),
            discarded,
            trimmed,
            len,
            version,
            inconsistencies,
        })
    }

    /// Report every adjacent pair whose step differs from the interval
    fn check_sequence(&self, klines: &[Kline]) -> Vec<IngestionInconsistency> {
        klines
            .windows(2)
            .filter_map(|pair| {
                let prev = pair[0].open_time;
                let next = pair[1].open_time;
                let delta = next - prev;
                if delta > self.interval_ms {
                    Some(IngestionInconsistency::Gap {
                        prev,
                        next,
                        delta,
                        expected: self.interval_ms,
                    })
                } else if delta < self.interval_ms {
                    Some(IngestionInconsistency::Overlap {
                        prev,
                        next,
                        delta,
                        expected: self.interval_ms,
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    /// Number of stored klines for a symbol
    pub fn count(&self, symbol: &str) -> usize {
        self.histories
            .get(symbol)
            .map(|h| h.klines.len())
            .unwrap_or(0)
    }

    pub fn last_kline(&self, symbol: &str) -> Option<Kline> {
        self.histories
            .get(symbol)
            .and_then(|h| h.klines.last().cloned())
    }

    /// Open time of the last stored kline, or 0 when nothing is stored
    pub fn last_timestamp(&self, symbol: &str) -> i64 {
        self.last_kline(symbol).map(|k| k.open_time).unwrap_or(0)
    }

    /// Estimate how many intervals have to be fetched to catch up with `now_ms`
    ///
    /// Returns the full horizon when the symbol has no history yet or the
    /// interval is not positive.
    pub fn missing_count(&self, symbol: &str, interval_ms: i64, now_ms: i64) -> usize {
        let last_ts = self.last_timestamp(symbol);
        if last_ts == 0 || interval_ms <= 0 {
            return self.horizon;
        }

        let end_of_last = last_ts + interval_ms;
        let elapsed = now_ms - end_of_last;
        let intervals = if elapsed > 0 {
            ((elapsed + interval_ms - 1) / interval_ms) as usize
        } else {
            0
        };

        intervals + MISSING_SAFETY_MARGIN
    }

    /// Consistent read-only copy of the symbol's current history
    pub fn snapshot(&self, symbol: &str) -> HistorySnapshot {
        let (klines, version) = self
            .histories
            .get(symbol)
            .map(|h| (h.klines.clone(), h.version))
            .unwrap_or_default();

        HistorySnapshot {
            symbol: symbol.to_string(),
            version,
            klines,
        }
    }

    /// Symbols with a history
    pub fn symbols(&self) -> Vec<String> {
        self.histories.iter().map(|e| e.key().clone()).collect()
    }
}
