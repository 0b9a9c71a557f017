use crate::notification::{NotificationContext, Notifier};
use anyhow::Context;
use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use common::{NotificationError, Signal};
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tracing::{error, info};

/// Exposes the latest signal as Prometheus gauges
///
/// Fires on every signal regardless of the notification threshold. An
/// undefined score is exported as 0.
pub struct PrometheusNotifier {
    registry: Registry,
    trade_score: GaugeVec,
    asset_quote: GaugeVec,
    portfolio_balance: GaugeVec,
}

impl PrometheusNotifier {
    pub fn new() -> Result<Self, NotificationError> {
        let registry = Registry::new();

        let trade_score = gauge_vec(
            "trading_bot_trade_score",
            "Signal to buy, hold, or sell",
            &["symbol", "base_asset"],
        )?;
        let asset_quote = gauge_vec("trading_bot_asset_quote", "Asset quote", &["symbol", "base_asset"])?;
        let portfolio_balance = gauge_vec("trading_bot_portfolio_balance", "Portfolio balance", &["symbol"])?;

        for gauge in [&trade_score, &asset_quote, &portfolio_balance] {
            registry
                .register(Box::new(gauge.clone()))
                .map_err(metrics_error)?;
        }

        Ok(Self {
            registry,
            trade_score,
            asset_quote,
            portfolio_balance,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current gauges in the Prometheus text exposition format
    pub fn render(&self) -> Result<String, NotificationError> {
        render_registry(&self.registry)
    }
}

pub fn render_registry(registry: &Registry) -> Result<String, NotificationError> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .map_err(metrics_error)?;
    String::from_utf8(buffer).map_err(|e| NotificationError::Metrics(e.to_string()))
}

/// Scrape endpoint for a registry
pub fn metrics_router(registry: Registry) -> Router {
    Router::new()
        .route("/metrics", get(api_prometheus))
        .with_state(registry)
}

/// Serve `/metrics` on an already bound listener until the process exits
pub async fn serve_metrics(listener: TcpListener, registry: Registry) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!("Metrics listening on http://{}/metrics", addr);
    axum::serve(listener, metrics_router(registry))
        .await
        .context("Metrics server failed")
}

async fn api_prometheus(State(registry): State<Registry>) -> impl IntoResponse {
    match render_registry(&registry) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        ),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                format!("# {}\n", e),
            )
        }
    }
}

#[async_trait]
impl Notifier for PrometheusNotifier {
    fn name(&self) -> &str {
        "prometheus"
    }

    async fn notify(&self, signal: &Signal, ctx: &NotificationContext) -> Result<(), NotificationError> {
        let score = signal.score.filter(|s| !s.is_nan()).unwrap_or(0.0);
        let labels = [ctx.symbol.as_str(), ctx.base_asset.as_str()];

        self.trade_score
            .get_metric_with_label_values(&labels)
            .map_err(metrics_error)?
            .set(score);
        self.asset_quote
            .get_metric_with_label_values(&labels)
            .map_err(metrics_error)?
            .set(signal.close_price);

        if let Some(balances) = ctx.balances {
            self.portfolio_balance
                .get_metric_with_label_values(&[ctx.base_asset.as_str()])
                .map_err(metrics_error)?
                .set(balances.base * signal.close_price);
            self.portfolio_balance
                .get_metric_with_label_values(&[ctx.quote_asset.as_str()])
                .map_err(metrics_error)?
                .set(balances.quote);
        }

        Ok(())
    }
}

fn gauge_vec(name: &str, help: &str, labels: &[&str]) -> Result<GaugeVec, NotificationError> {
    GaugeVec::new(Opts::new(name, help), labels).map_err(metrics_error)
}

fn metrics_error(e: prometheus::Error) -> NotificationError {
    NotificationError::Metrics(e.to_string())
}
