//! Monitoring (Layer 4)
//!
//! Delivers published signals to the outside world:
//! - Console and output file
//! - Telegram bot messages
//! - Prometheus gauges

pub mod console;
pub mod metrics;
pub mod notification;
pub mod telegram;

pub use console::ConsoleNotifier;
pub use metrics::{metrics_router, render_registry, serve_metrics, PrometheusNotifier};
pub use notification::{
    asset_sign, escalation, format_message, format_price, Balances, NotificationContext,
    NotificationDispatcher, Notifier,
};
pub use telegram::TelegramNotifier;

use common::SignalerConfig;
use prometheus::Registry;
use tracing::info;

/// Build a dispatcher with every notifier enabled in the configuration
///
/// When Prometheus is enabled its registry is returned alongside, for the
/// caller to serve.
pub fn dispatcher_from_config(
    config: &SignalerConfig,
) -> anyhow::Result<(NotificationDispatcher, Option<Registry>)> {
    let mut dispatcher = NotificationDispatcher::new(NotificationContext::from_config(config));
    let notifier = &config.notifier;

    if notifier.console {
        dispatcher = dispatcher.add_notifier(Box::new(ConsoleNotifier::new(&notifier.output_file)));
    }

    if let (Some(token), Some(chat_id)) = (&notifier.telegram_bot_token, &notifier.telegram_chat_id) {
        dispatcher = dispatcher.add_notifier(Box::new(TelegramNotifier::new(token, chat_id)));
    }

    let mut registry = None;
    if notifier.prometheus {
        let prometheus = PrometheusNotifier::new()?;
        registry = Some(prometheus.registry().clone());
        dispatcher = dispatcher.add_notifier(Box::new(prometheus));
    }

    info!("Notification dispatcher ready with {} notifiers", dispatcher.len());
    Ok((dispatcher, registry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_from_config() {
        let mut config = SignalerConfig::default();
        let (dispatcher, registry) = dispatcher_from_config(&config).unwrap();
        assert_eq!(dispatcher.len(), 1);
        assert!(registry.is_none());

        config.notifier.telegram_bot_token = Some("123:abc".to_string());
        assert_eq!(dispatcher_from_config(&config).unwrap().0.len(), 1);

        config.notifier.telegram_chat_id = Some("42".to_string());
        config.notifier.prometheus = true;
        config.notifier.console = false;
        let (dispatcher, registry) = dispatcher_from_config(&config).unwrap();
        assert_eq!(dispatcher.len(), 2);
        assert!(registry.is_some());
    }
}
