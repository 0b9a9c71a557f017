use anyhow::{Context, Result};
use common::{load_config, OverflowPolicy, Signal, SignalerConfig};
use data_ingestion::{
    event_buffer, DepthWriter, DrainReport, EventDrain, EventSender, JsonlEventSink, TimeSeriesStore,
};
use monitoring::{dispatcher_from_config, serve_metrics, NotificationDispatcher};
use signal_generation::{
    load_models, GeneratorConfig, InMemorySignalStore, KlineFeatures, PredictorRegistry,
    SignalGenerator, SignalStore,
};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::fmt;

mod replay;

use replay::{read_batch, ReplayBatch};

const DEFAULT_CONFIG: &str = "signaler.toml";

/// Klines replayed per tick
const REPLAY_BATCH: usize = 60;

const REPLAY_TICK: Duration = Duration::from_millis(200);

struct Service {
    config: SignalerConfig,
    store: Arc<TimeSeriesStore>,
    events: EventSender,
    drain: EventDrain,
    event_sink: JsonlEventSink,
    depth_writer: DepthWriter,
    generator: SignalGenerator,
    dispatcher: NotificationDispatcher,
}

impl Service {
    async fn build(config: SignalerConfig) -> Result<Self> {
        let interval_ms = config.interval_ms()?;
        let store = Arc::new(TimeSeriesStore::new(config.signaler.features_horizon, interval_ms));

        let collector = &config.collector;
        let (events, drain) = event_buffer(collector.buffer_capacity, collector.overflow_policy);
        let event_sink = JsonlEventSink::new(collector.folder.join(&collector.stream_folder));
        let depth_writer = DepthWriter::new(collector.folder.join(&collector.depth_folder));

        let predictors = if config.model_folder.is_dir() {
            load_models(&config.model_folder, &config.signaler.labels)
                .context("Failed to load models")?
        } else {
            warn!(
                "Model folder {} not found, all signals will be empty",
                config.model_folder.display()
            );
            PredictorRegistry::new()
        };

        let signals: Arc<dyn SignalStore> = Arc::new(InMemorySignalStore::new());
        let generator = SignalGenerator::new(
            GeneratorConfig::from_config(&config)?,
            store.clone(),
            Box::new(KlineFeatures::new(config.signaler.feature_windows.clone())),
            predictors,
            signals,
        );

        let (dispatcher, metrics) = dispatcher_from_config(&config)?;
        if let Some(registry) = metrics {
            let addr = &config.notifier.metrics_addr;
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind metrics endpoint {}", addr))?;
            tokio::spawn(async move {
                if let Err(e) = serve_metrics(listener, registry).await {
                    error!("{:#}", e);
                }
            });
        }

        Ok(Self {
            config,
            store,
            events,
            drain,
            event_sink,
            depth_writer,
            generator,
            dispatcher,
        })
    }

    /// Store -> analyze -> notify for one replayed batch, then drain the event buffer
    ///
    /// Returns the signal of this tick's analysis cycle, if it succeeded.
    async fn tick(&mut self, batch: ReplayBatch) -> Option<Signal> {
        let symbol = self.config.symbol.clone();

        for event in batch.events {
            // This loop is the only producer, waiting on a full buffer would never end
            if self.events.policy() == OverflowPolicy::Block && self.events.is_full() {
                self.drain_events().await;
            }
            self.events.ingest(event).await;
        }

        if !batch.depths.is_empty() {
            if let Err(e) = self.depth_writer.store_depth(&batch.depths, &self.config.freq).await {
                error!("Failed to store depth: {}", e);
            }
        }

        let mut signal = None;
        if !batch.klines.is_empty() {
            match self.store.store(&symbol, &batch.klines) {
                Ok(report) if !report.is_consistent() => {
                    warn!("{} inconsistencies while storing {}", report.inconsistencies.len(), symbol)
                }
                Ok(report) => debug!("Stored {} klines, history {}", report.appended, report.len),
                Err(e) => warn!("{}", e),
            }

            // Aborted cycles are logged by the generator
            if let Ok(analyzed) = self.generator.analyze().await {
                self.dispatcher.dispatch(&analyzed).await;
                signal = Some(analyzed);
            }
        }

        self.drain_events().await;
        signal
    }

    async fn drain_events(&mut self) -> DrainReport {
        let report = self.drain.drain_and_persist(&self.event_sink).await;
        if report.drained > 0 {
            info!(
                "Drained {} events in {} groups ({} failed)",
                report.drained, report.groups, report.failed_groups
            );
        }
        report
    }

    /// Persist whatever is still buffered
    async fn shutdown(&mut self) -> DrainReport {
        let report = self.drain_events().await;
        info!(
            "Final drain: {} events, {} dropped on overflow",
            report.drained,
            self.drain.dropped()
        );
        report
    }
}

fn read_config(path: &str) -> Result<SignalerConfig> {
    if Path::new(path).exists() {
        load_config(path).with_context(|| format!("Failed to load config {}", path))
    } else {
        let config = SignalerConfig::default();
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = read_config(&config_path)?;

    // Initialize logging
    let level = Level::from_str(&config.log_level).unwrap_or(Level::INFO);
    fmt().with_max_level(level).init();

    info!("Kline signaler for {} ({})", config.symbol, config.freq);
    info!("==========================");

    let mut service = Service::build(config).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut ticker = interval(REPLAY_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            _ = ticker.tick() => {
                let batch = read_batch(&mut lines, REPLAY_BATCH).await?;
                let eof = batch.eof;
                service.tick(batch).await;
                if eof {
                    info!("Input exhausted");
                    break;
                }
            }
        }
    }

    service.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Event, Kline, SignalSide};
    use serde_json::json;

    const MINUTE: i64 = 60_000;

    fn config(dir: &Path, capacity: usize, policy: OverflowPolicy) -> SignalerConfig {
        let mut config = SignalerConfig::default();
        config.freq = "1m".to_string();
        config.model_folder = dir.join("MODELS");
        config.collector.folder = dir.to_path_buf();
        config.collector.buffer_capacity = capacity;
        config.collector.overflow_policy = policy;
        config.notifier.console = false;
        config
    }

    fn trades(count: u64) -> Vec<Event> {
        (0..count)
            .map(|seq| Event::new("trade", "BTCUSDT", json!({"e": "trade", "seq": seq})))
            .collect()
    }

    /// Sequence numbers of every persisted stream event, file by file
    fn persisted(dir: &Path) -> Vec<u64> {
        let Ok(entries) = std::fs::read_dir(dir.join("STREAM")) else {
            return Vec::new();
        };
        let mut paths: Vec<_> = entries.map(|e| e.unwrap().path()).collect();
        paths.sort();
        paths
            .iter()
            .flat_map(|p| {
                std::fs::read_to_string(p)
                    .unwrap()
                    .lines()
                    .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["seq"].as_u64().unwrap())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_last_tick_events_reach_the_sink() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = Service::build(config(dir.path(), 100, OverflowPolicy::DropNewest))
            .await
            .unwrap();

        let batch = ReplayBatch {
            events: trades(5),
            eof: true,
            ..Default::default()
        };
        service.tick(batch).await;
        service.shutdown().await;

        assert_eq!(persisted(dir.path()), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_block_policy_batch_larger_than_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = Service::build(config(dir.path(), 2, OverflowPolicy::Block))
            .await
            .unwrap();

        let batch = ReplayBatch {
            events: trades(7),
            eof: true,
            ..Default::default()
        };
        service.tick(batch).await;
        service.shutdown().await;

        assert_eq!(persisted(dir.path()), (0..7).collect::<Vec<_>>());
        assert_eq!(service.drain.dropped(), 0);
    }

    #[tokio::test]
    async fn test_tick_returns_the_analyzed_signal() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = Service::build(config(dir.path(), 100, OverflowPolicy::DropNewest))
            .await
            .unwrap();

        let klines: Vec<Kline> = (0..3)
            .map(|i| Kline::new(i * MINUTE, MINUTE, 100.0, 101.0, 99.0, 100.5, 2.0))
            .collect();
        let batch = ReplayBatch {
            klines,
            ..Default::default()
        };

        // No models configured: the cycle succeeds with an empty signal
        let signal = service.tick(batch).await.unwrap();
        assert_eq!(signal.side, SignalSide::Empty);
        assert_eq!(signal.close_price, 100.5);

        let latest = service.generator.signals().latest().await.unwrap();
        assert_eq!(latest.id, signal.id);
    }
}
