// Signal notifications
// Shared message formatting, the notifier contract and the dispatcher

use async_trait::async_trait;
use common::{NotificationError, Signal, SignalerConfig};
use tracing::{debug, error};

/// Portfolio holdings reported alongside the signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Balances {
    pub base: f64,
    pub quote: f64,
}

/// Static context every notifier needs besides the signal itself
#[derive(Debug, Clone)]
pub struct NotificationContext {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    /// Minimum number of score steps before a message fires
    pub notification_threshold: u32,
    pub score_step: f64,
    pub balances: Option<Balances>,
}

impl NotificationContext {
    /// Balances are only known when both quantities are configured
    pub fn from_config(config: &SignalerConfig) -> Self {
        let balances = match (config.notifier.base_quantity, config.notifier.quote_quantity) {
            (Some(base), Some(quote)) => Some(Balances { base, quote }),
            _ => None,
        };
        Self {
            symbol: config.symbol.clone(),
            base_asset: config.base_asset.clone(),
            quote_asset: config.quote_asset.clone(),
            notification_threshold: config.signaler.notification_threshold,
            score_step: config.signaler.score_step,
            balances,
        }
    }

    pub fn with_balances(mut self, base: f64, quote: f64) -> Self {
        self.balances = Some(Balances { base, quote });
        self
    }

    /// Number of arrows for a score, `None` when nothing should fire
    pub fn escalation(&self, score: Option<f64>) -> Option<usize> {
        escalation(score, self.score_step, self.notification_threshold)
    }
}

/// `floor(|score| / step) - threshold + 1` directional units
///
/// `None` for an undefined score or when fewer than `threshold` steps are reached.
pub fn escalation(score: Option<f64>, step: f64, threshold: u32) -> Option<usize> {
    let score = score.filter(|s| s.is_finite())?;
    if !(step > 0.0) {
        return None;
    }

    let steps = (score.abs() / step).floor() as u64;
    let threshold = threshold as u64;
    if steps < threshold {
        return None;
    }
    Some((steps - threshold + 1) as usize)
}

/// Display sign of a base asset
pub fn asset_sign(base_asset: &str) -> &str {
    match base_asset {
        "BTC" => "₿",
        "ETH" => "Ξ",
        other => other,
    }
}

/// Integer part of a price with `,` thousands separators
pub fn format_price(price: f64) -> String {
    let value = price.trunc() as i64;
    let digits = value.unsigned_abs().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    if value < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

/// Human-readable signal message, `None` when the score does not escalate
///
/// `₿ 43,210 📈📈 Score: +0.12`
pub fn format_message(signal: &Signal, ctx: &NotificationContext) -> Option<String> {
    let units = ctx.escalation(signal.score)?;
    let score = signal.score.unwrap_or_default();

    let arrows = if score > 0.0 {
        "📈".repeat(units)
    } else if score < 0.0 {
        "📉".repeat(units)
    } else {
        String::new()
    };

    Some(format!(
        "{} {} {} Score: {:+.2}",
        asset_sign(&ctx.base_asset),
        format_price(signal.close_price),
        arrows,
        score
    ))
}

/// Delivery channel for published signals
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one signal. Implementations decide themselves whether it escalates.
    async fn notify(&self, signal: &Signal, ctx: &NotificationContext) -> Result<(), NotificationError>;
}

/// Fans a signal out to every configured notifier
///
/// Failures are logged and counted, never propagated: a broken channel must
/// not block the next analysis cycle.
pub struct NotificationDispatcher {
    ctx: NotificationContext,
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotificationDispatcher {
    pub fn new(ctx: NotificationContext) -> Self {
        Self {
            ctx,
            notifiers: Vec::new(),
        }
    }

    pub fn add_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        debug!("Adding notifier: {}", notifier.name());
        self.notifiers.push(notifier);
        self
    }

    pub fn context(&self) -> &NotificationContext {
        &self.ctx
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// Notify every channel; returns the number of failed deliveries
    pub async fn dispatch(&self, signal: &Signal) -> usize {
        let mut failed = 0;
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(signal, &self.ctx).await {
                error!(notifier = notifier.name(), "Notification failed: {}", e);
                failed += 1;
            }
        }
        failed
    }
}
