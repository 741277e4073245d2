//! 📱 Notification sinks
//!
//! Watchers hand finished notification text to a `NotificationSink`. The
//! Telegram sink posts it to the subscriber's chat through the Bot API;
//! the log sink only writes it to the log (no bot token configured).

use crate::types::SubscriptionKey;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Delivery target for watcher notifications. Shared by every watcher, so
/// implementations must tolerate concurrent calls.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, key: &SubscriptionKey, text: &str) -> Result<()>;
}

/// Telegram Bot API sink; the subscription's subscriber is the chat id
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    bot_token: String,
    /// Rate limiting: Track last message timestamp
    last_message_time: Mutex<Instant>,
    /// Minimum delay between messages
    min_message_delay: Duration,
}

impl TelegramNotifier {
    pub fn new(bot_token: String) -> Result<Self> {
        Self::with_api_url(bot_token, TELEGRAM_API_URL.to_string())
    }

    pub fn with_api_url(bot_token: String, api_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            bot_token,
            last_message_time: Mutex::new(Instant::now()),
            min_message_delay: Duration::from_millis(100),
        })
    }

    /// Send a raw text message to one chat
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        // Rate limiting
        {
            let mut last_time = self.last_message_time.lock().await;
            let elapsed = last_time.elapsed();
            if elapsed < self.min_message_delay {
                tokio::time::sleep(self.min_message_delay - elapsed).await;
            }
            *last_time = Instant::now();
        }

        let url = format!("{}/bot{}/sendMessage", self.api_url, self.bot_token);
        let payload = json!({
            "chat_id": chat_id,
            "text": text,
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .context("Failed to reach Telegram API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Telegram API error ({}): {}", status, error_text);
        }

        Ok(())
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn deliver(&self, key: &SubscriptionKey, text: &str) -> Result<()> {
        self.send_message(&key.subscriber, text).await
    }
}

/// Writes notifications to the log instead of a chat
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn deliver(&self, key: &SubscriptionKey, text: &str) -> Result<()> {
        info!("📨 [{}] {}", key, text.replace('\n', " | "));
        Ok(())
    }
}
