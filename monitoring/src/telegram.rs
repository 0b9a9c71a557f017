use crate::notification::{format_message, NotificationContext, Notifier};
use async_trait::async_trait;
use common::{NotificationError, Signal};
use reqwest::{Client, Request};
use tracing::{debug, info};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Sends escalating signals to a Telegram chat through the bot API
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: TELEGRAM_API.to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    /// Point the notifier at another bot API host
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// `sendMessage` request for one message
    pub fn request(&self, text: &str) -> Result<Request, NotificationError> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.bot_token);
        self.client
            .get(url)
            .query(&[
                ("chat_id", self.chat_id.as_str()),
                ("parse_mode", "markdown"),
                ("text", text),
            ])
            .build()
            .map_err(|e| NotificationError::Http(e.to_string()))
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn notify(&self, signal: &Signal, ctx: &NotificationContext) -> Result<(), NotificationError> {
        let Some(message) = format_message(signal, ctx) else {
            debug!("Score {:?} below notification threshold", signal.score);
            return Ok(());
        };

        let request = self.request(&message)?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| NotificationError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotificationError::Http(format!(
                "Telegram API error: {}",
                response.status()
            )));
        }

        info!("✅ Sent Telegram notification for {}", signal.symbol);
        Ok(())
    }
}
