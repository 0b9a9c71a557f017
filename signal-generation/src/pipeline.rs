// Signal Generation Pipeline
// One analysis cycle: snapshot -> features -> predict -> aggregate -> classify -> publish

use crate::features::FeaturePipeline;
use crate::predictors::PredictorRegistry;
use crate::signals::{aggregate, PredictorScore};
use crate::storage::SignalStore;
use chrono::DateTime;
use common::{AnalysisError, ConfigError, Signal, SignalSide, SignalerConfig};
use data_ingestion::TimeSeriesStore;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Parameters of the analysis cycle
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub symbol: String,
    pub interval_ms: i64,
    pub buy_threshold: f64,
    pub sell_threshold: f64,
}

impl GeneratorConfig {
    pub fn from_config(config: &SignalerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            symbol: config.symbol.clone(),
            interval_ms: config.interval_ms()?,
            buy_threshold: config.signaler.buy_threshold,
            sell_threshold: config.signaler.sell_threshold,
        })
    }
}

/// Cycle stage, used to tag aborts in the logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Snapshot,
    Features,
    Predict,
    Aggregate,
    Classify,
    Publish,
}

/// Turns the stored kline window of one symbol into a published signal
pub struct SignalGenerator {
    config: GeneratorConfig,
    store: Arc<TimeSeriesStore>,
    features: Box<dyn FeaturePipeline>,
    predictors: PredictorRegistry,
    signals: Arc<dyn SignalStore>,
}

impl SignalGenerator {
    pub fn new(
        config: GeneratorConfig,
        store: Arc<TimeSeriesStore>,
        features: Box<dyn FeaturePipeline>,
        predictors: PredictorRegistry,
        signals: Arc<dyn SignalStore>,
    ) -> Self {
        info!(
            "Signal generator for {} with {} predictors (buy > {}, sell < {})",
            config.symbol,
            predictors.len(),
            config.buy_threshold,
            config.sell_threshold
        );
        Self {
            config,
            store,
            features,
            predictors,
            signals,
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn signals(&self) -> &Arc<dyn SignalStore> {
        &self.signals
    }

    /// Run one analysis cycle
    ///
    /// On success the new signal (possibly `Empty`) replaces the latest one in
    /// the signal store. On abort the previous signal is left untouched.
    pub async fn analyze(&self) -> Result<Signal, AnalysisError> {
        let (stage, result) = match self.compute() {
            Ok(signal) => (Stage::Publish, Ok(signal)),
            Err((stage, e)) => (stage, Err(e)),
        };

        match result {
            Ok(signal) => {
                self.signals.publish(Arc::new(signal.clone())).await;
                info!(
                    symbol = %signal.symbol,
                    side = %signal.side,
                    score = ?signal.score,
                    close_price = signal.close_price,
                    "Signal published"
                );
                Ok(signal)
            }
            Err(e) => {
                error!(symbol = %self.config.symbol, stage = ?stage, "Analysis aborted: {}", e);
                Err(e)
            }
        }
    }

    fn compute(&self) -> Result<Signal, (Stage, AnalysisError)> {
        let symbol = &self.config.symbol;

        // Snapshot
        let snapshot = self.store.snapshot(symbol);
        let last = snapshot.last().cloned().ok_or_else(|| {
            (
                Stage::Snapshot,
                AnalysisError::InsufficientData {
                    symbol: symbol.clone(),
                },
            )
        })?;
        debug!(
            "Analyzing {} klines of {} (version {})",
            snapshot.len(),
            symbol,
            snapshot.version
        );

        // Features
        let frame = self.features.generate(snapshot.klines()).map_err(|e| {
            (
                Stage::Features,
                AnalysisError::Feature {
                    reason: e.to_string(),
                },
            )
        })?;
        if frame.len() != snapshot.len() {
            return Err((
                Stage::Features,
                AnalysisError::Feature {
                    reason: format!(
                        "frame has {} rows for {} klines",
                        frame.len(),
                        snapshot.len()
                    ),
                },
            ));
        }

        // Predict
        let mut scores = Vec::with_capacity(self.predictors.len());
        for predictor in self.predictors.iter() {
            let value = predictor.predict(&frame).map_err(|e| {
                (
                    Stage::Predict,
                    AnalysisError::Predict {
                        predictor: predictor.name(),
                        reason: e.to_string(),
                    },
                )
            })?;
            debug!("{} = {}", predictor.name(), value);
            scores.push(PredictorScore {
                name: predictor.name(),
                group: predictor.group,
                value,
            });
        }

        // Aggregate
        let aggregated = aggregate(&scores);
        debug!(
            "Aggregated high {} low {} score {:?}",
            aggregated.high, aggregated.low, aggregated.score
        );

        // Classify
        let side = match aggregated.score {
            Some(score) => {
                SignalSide::classify(score, self.config.buy_threshold, self.config.sell_threshold)
            }
            None => SignalSide::Empty,
        };

        let close_time =
            DateTime::from_timestamp_millis(last.open_time + self.config.interval_ms)
                .unwrap_or_default();

        Ok(Signal::new(
            symbol,
            aggregated.score,
            side,
            last.close,
            close_time,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureFrame, KlineFeatures};
    use crate::predictors::{AlgorithmKind, Predictor};
    use crate::storage::InMemorySignalStore;
    use anyhow::{bail, Result};
    use common::Kline;

    const MINUTE: i64 = 60_000;

    struct Constant(f64);

    impl Predictor for Constant {
        fn predict(&self, _frame: &FeatureFrame) -> Result<f64> {
            Ok(self.0)
        }
    }

    struct Failing;

    impl Predictor for Failing {
        fn predict(&self, _frame: &FeatureFrame) -> Result<f64> {
            bail!("model file corrupted")
        }
    }

    /// Returns a frame one row short of the window
    struct Misaligned;

    impl FeaturePipeline for Misaligned {
        fn generate(&self, klines: &[Kline]) -> Result<FeatureFrame> {
            Ok(FeatureFrame::new(klines.len().saturating_sub(1)))
        }
    }

    struct FailingFeatures;

    impl FeaturePipeline for FailingFeatures {
        fn generate(&self, _klines: &[Kline]) -> Result<FeatureFrame> {
            bail!("taker volume column missing")
        }
    }

    fn config(buy: f64) -> GeneratorConfig {
        GeneratorConfig {
            symbol: "BTCUSDT".to_string(),
            interval_ms: MINUTE,
            buy_threshold: buy,
            sell_threshold: -buy,
        }
    }

    fn filled_store() -> Arc<TimeSeriesStore> {
        let store = Arc::new(TimeSeriesStore::new(100, MINUTE));
        let klines: Vec<Kline> = (0..10)
            .map(|i| {
                let c = 100.0 + i as f64;
                Kline::new(i * MINUTE, MINUTE, c, c + 1.0, c - 1.0, c, 5.0)
            })
            .collect();
        store.store("BTCUSDT", &klines).unwrap();
        store
    }

    fn registry(high: f64, low: f64) -> PredictorRegistry {
        PredictorRegistry::new()
            .with("high_10", AlgorithmKind::GradientBoosted, Box::new(Constant(high)))
            .unwrap()
            .with("low_10", AlgorithmKind::GradientBoosted, Box::new(Constant(low)))
            .unwrap()
    }

    fn generator(
        store: Arc<TimeSeriesStore>,
        predictors: PredictorRegistry,
        signals: Arc<InMemorySignalStore>,
        buy: f64,
    ) -> SignalGenerator {
        SignalGenerator::new(
            config(buy),
            store,
            Box::new(KlineFeatures::new(vec![3])),
            predictors,
            signals,
        )
    }

    #[tokio::test]
    async fn test_buy_signal() {
        let signals = Arc::new(InMemorySignalStore::new());
        let generator = generator(filled_store(), registry(0.9, 0.3), signals.clone(), 0.4);

        let signal = generator.analyze().await.unwrap();
        assert_eq!(signal.side, SignalSide::Buy);
        assert!((signal.score.unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(signal.close_price, 109.0);
        assert_eq!(signal.close_time.timestamp_millis(), 10 * MINUTE);

        let latest = signals.latest().await.unwrap();
        assert_eq!(latest.id, signal.id);
    }

    #[tokio::test]
    async fn test_score_on_threshold_is_hold() {
        let signals = Arc::new(InMemorySignalStore::new());
        let generator = generator(filled_store(), registry(0.9, 0.3), signals, 0.5);

        let signal = generator.analyze().await.unwrap();
        assert_eq!(signal.side, SignalSide::Hold);
    }

    #[tokio::test]
    async fn test_zero_scores_publish_empty_signal() {
        let signals = Arc::new(InMemorySignalStore::new());
        let generator = generator(filled_store(), registry(0.0, 0.0), signals.clone(), 0.2);

        let signal = generator.analyze().await.unwrap();
        assert_eq!(signal.side, SignalSide::Empty);
        assert_eq!(signal.score, None);
        assert_eq!(signal.close_price, 109.0);
        assert!(signals.latest().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_predictor_failure_keeps_previous_signal() {
        let signals = Arc::new(InMemorySignalStore::new());
        let store = filled_store();

        let ok = generator(store.clone(), registry(0.9, 0.3), signals.clone(), 0.4);
        let previous = ok.analyze().await.unwrap();

        let failing = PredictorRegistry::new()
            .with("high_10", AlgorithmKind::Neural, Box::new(Failing))
            .unwrap();
        let broken = generator(store, failing, signals.clone(), 0.4);

        let err = broken.analyze().await.unwrap_err();
        match err {
            AnalysisError::Predict { predictor, reason } => {
                assert_eq!(predictor, "high_10_nn");
                assert!(reason.contains("corrupted"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(signals.latest().await.unwrap().id, previous.id);
        assert_eq!(signals.published().await, 1);
    }

    #[tokio::test]
    async fn test_no_history_is_insufficient_data() {
        let signals = Arc::new(InMemorySignalStore::new());
        let store = Arc::new(TimeSeriesStore::new(100, MINUTE));
        let generator = generator(store, registry(0.9, 0.3), signals.clone(), 0.4);

        let err = generator.analyze().await.unwrap_err();
        assert_eq!(
            err,
            AnalysisError::InsufficientData {
                symbol: "BTCUSDT".to_string()
            }
        );
        assert!(signals.latest().await.is_none());
    }

    #[tokio::test]
    async fn test_misaligned_frame_is_feature_error() {
        let signals = Arc::new(InMemorySignalStore::new());
        let generator = SignalGenerator::new(
            config(0.4),
            filled_store(),
            Box::new(Misaligned),
            registry(0.9, 0.3),
            signals.clone(),
        );

        let err = generator.analyze().await.unwrap_err();
        assert!(matches!(err, AnalysisError::Feature { .. }));
        assert_eq!(signals.published().await, 0);
    }

    #[tokio::test]
    async fn test_feature_failure_keeps_previous_signal() {
        let signals = Arc::new(InMemorySignalStore::new());
        let store = filled_store();

        let ok = generator(store.clone(), registry(0.9, 0.3), signals.clone(), 0.4);
        let previous = ok.analyze().await.unwrap();

        let broken = SignalGenerator::new(
            config(0.4),
            store,
            Box::new(FailingFeatures),
            registry(0.9, 0.3),
            signals.clone(),
        );

        match broken.analyze().await.unwrap_err() {
            AnalysisError::Feature { reason } => assert!(reason.contains("taker volume")),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(signals.latest().await.unwrap().id, previous.id);
        assert_eq!(signals.published().await, 1);
    }
}
