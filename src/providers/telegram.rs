/*!
 * Telegram bot notifier.
 */

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::app_config::NotificationConfig;
use crate::errors::ProviderError;
use crate::notifications::NotificationEvent;
use crate::providers::Notifier;

const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    api_base: String,
    bot_token: String,
    chat_id: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'static str,
}

impl TelegramNotifier {
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            api_base: TELEGRAM_API.to_string(),
            bot_token: config.telegram_bot_token.clone(),
            chat_id: config.telegram_chat_id.clone(),
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Point at a different Bot API host (self-hosted API server)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), ProviderError> {
        let message = SendMessage {
            chat_id: &self.chat_id,
            text: event.to_string(),
            parse_mode: "Markdown",
        };

        let response = self.client.post(self.endpoint()).json(&message).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), format!("Telegram: {}", body.trim())));
        }
        debug!("Sent {} notification to Telegram", event.kind());
        Ok(())
    }
}
