// Feature Generation
// Derives numeric feature columns from a kline window

use anyhow::{anyhow, bail, Result};
use common::Kline;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

/// Named numeric columns aligned row-for-row with the kline window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFrame {
    len: usize,
    columns: BTreeMap<String, Vec<f64>>,
}

impl FeatureFrame {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            columns: BTreeMap::new(),
        }
    }

    /// Add or replace a column; its length must match the frame
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.len {
            bail!(
                "column {} has {} rows, frame has {}",
                name,
                values.len(),
                self.len
            );
        }
        self.columns.insert(name, values);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|c| c.as_slice())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    /// Value of `name` in the last row
    pub fn last_value(&self, name: &str) -> Result<f64> {
        let column = self
            .column(name)
            .ok_or_else(|| anyhow!("feature column {} not found", name))?;
        column
            .last()
            .copied()
            .ok_or_else(|| anyhow!("feature frame is empty"))
    }
}

/// Turns a raw kline window into features. Must be deterministic.
pub trait FeaturePipeline: Send + Sync {
    fn generate(&self, klines: &[Kline]) -> Result<FeatureFrame>;
}

/// Kline feature set
///
/// Raw kline columns plus, for every window `w`:
/// - `close_SMA_w`: close relative to its rolling mean
/// - `close_STD_w`: rolling standard deviation of close relative to its mean
/// - `volume_SMA_w`: volume relative to its rolling mean
/// - `span_SMA_w`: rolling mean of (high - low) / close
///
/// and `taker_ratio` (taker base volume / volume). Rows without a full
/// window are NaN.
#[derive(Debug, Clone)]
pub struct KlineFeatures {
    windows: Vec<usize>,
}

impl KlineFeatures {
    pub fn new(windows: Vec<usize>) -> Self {
        Self { windows }
    }
}

impl Default for KlineFeatures {
    fn default() -> Self {
        Self::new(vec![5, 15, 60])
    }
}

impl FeaturePipeline for KlineFeatures {
    fn generate(&self, klines: &[Kline]) -> Result<FeatureFrame> {
        if let Some(w) = self.windows.iter().find(|w| **w == 0) {
            bail!("invalid feature window {}", w);
        }

        let mut frame = FeatureFrame::new(klines.len());
        let col = |f: fn(&Kline) -> f64| klines.iter().map(f).collect::<Vec<f64>>();

        let close = col(|k| k.close);
        let volume = col(|k| k.volume);
        let span: Vec<f64> = klines
            .iter()
            .map(|k| ratio(k.high - k.low, k.close))
            .collect();

        frame.insert("open", col(|k| k.open))?;
        frame.insert("high", col(|k| k.high))?;
        frame.insert("low", col(|k| k.low))?;
        frame.insert("close", close.clone())?;
        frame.insert("volume", volume.clone())?;
        frame.insert("quote_volume", col(|k| k.quote_volume))?;
        frame.insert("trade_count", col(|k| k.trade_count as f64))?;
        frame.insert(
            "taker_ratio",
            klines
                .iter()
                .map(|k| ratio(k.taker_base_volume, k.volume))
                .collect(),
        )?;

        for &w in &self.windows {
            let close_mean = rolling(&close, w, |s| s.mean());
            let close_std = rolling(&close, w, |s| s.std_dev());
            let volume_mean = rolling(&volume, w, |s| s.mean());

            frame.insert(
                format!("close_SMA_{}", w),
                close.iter().zip(&close_mean).map(|(c, m)| ratio(*c, *m) - 1.0).collect(),
            )?;
            frame.insert(
                format!("close_STD_{}", w),
                close_std.iter().zip(&close_mean).map(|(s, m)| ratio(*s, *m)).collect(),
            )?;
            frame.insert(
                format!("volume_SMA_{}", w),
                volume.iter().zip(&volume_mean).map(|(v, m)| ratio(*v, *m) - 1.0).collect(),
            )?;
            frame.insert(format!("span_SMA_{}", w), rolling(&span, w, |s| s.mean()))?;
        }

        Ok(frame)
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        f64::NAN
    } else {
        num / den
    }
}

/// Apply `f` to every trailing window of `w` values; NaN until the window is full
fn rolling(values: &[f64], w: usize, f: fn(&[f64]) -> f64) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if i + 1 < w {
                f64::NAN
            } else {
                f(&values[i + 1 - w..=i])
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: i64 = 60_000;

    fn klines(closes: &[f64]) -> Vec<Kline> {
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mut k = Kline::new(i as i64 * MINUTE, MINUTE, *c, c + 2.0, c - 2.0, *c, 10.0);
                k.taker_base_volume = 4.0;
                k
            })
            .collect()
    }

    #[test]
    fn test_frame_aligned_with_window() {
        let pipeline = KlineFeatures::new(vec![3]);
        let frame = pipeline.generate(&klines(&[100.0, 101.0, 102.0, 103.0])).unwrap();

        assert_eq!(frame.len(), 4);
        for name in frame.column_names() {
            assert_eq!(frame.column(name).unwrap().len(), 4);
        }
    }

    #[test]
    fn test_rolling_features() {
        let pipeline = KlineFeatures::new(vec![3]);
        let frame = pipeline.generate(&klines(&[100.0, 101.0, 102.0, 103.0])).unwrap();

        let sma = frame.column("close_SMA_3").unwrap();
        assert!(sma[0].is_nan());
        assert!(sma[1].is_nan());
        // 102 / mean(100, 101, 102) - 1 = 102 / 101 - 1
        assert!((sma[2] - (102.0 / 101.0 - 1.0)).abs() < 1e-12);

        // Sample std of (101, 102, 103) is 1
        let std = frame.column("close_STD_3").unwrap();
        assert!((std[3] - 1.0 / 102.0).abs() < 1e-12);

        assert!((frame.last_value("taker_ratio").unwrap() - 0.4).abs() < 1e-12);
        assert!((frame.last_value("volume_SMA_3").unwrap()).abs() < 1e-12);
    }

    #[test]
    fn test_deterministic() {
        let pipeline = KlineFeatures::default();
        let window = klines(&(0..80).map(|i| 100.0 + (i % 7) as f64).collect::<Vec<_>>());
        let a = pipeline.generate(&window).unwrap();
        let b = pipeline.generate(&window).unwrap();
        assert_eq!(a.last_value("close_SMA_60").unwrap(), b.last_value("close_SMA_60").unwrap());
    }

    #[test]
    fn test_zero_window_rejected() {
        let pipeline = KlineFeatures::new(vec![0]);
        assert!(pipeline.generate(&klines(&[1.0])).is_err());
    }

    #[test]
    fn test_insert_length_checked() {
        let mut frame = FeatureFrame::new(2);
        assert!(frame.insert("x", vec![1.0]).is_err());
        assert!(frame.last_value("x").is_err());
    }
}
