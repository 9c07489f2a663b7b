// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::app::config::GlobalSettings;
use crate::domain::error::AppError;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Clone)]
struct TelegramSink {
    client: Client,
    base_url: String,
    token: String,
    chat_id: String,
}

/// Pulse/alert sink. Without Telegram credentials messages only reach the log.
#[derive(Clone, Default)]
pub struct Notifier {
    telegram: Option<TelegramSink>,
}

impl Notifier {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn telegram(token: String, chat_id: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            telegram: Some(TelegramSink {
                client,
                base_url: TELEGRAM_API.to_string(),
                token,
                chat_id,
            }),
        }
    }

    pub fn from_settings(settings: &GlobalSettings) -> Self {
        match settings.telegram_credentials() {
            Some((token, chat_id)) => Self::telegram(token, chat_id),
            None => Self::disabled(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        if let Some(sink) = self.telegram.as_mut() {
            sink.base_url = base_url.into().trim_end_matches('/').to_string();
        }
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.telegram.is_some()
    }

    /// Log the message and forward it to Telegram when configured. Delivery
    /// failures are logged, never returned.
    pub async fn notify(&self, text: &str) {
        tracing::info!(target: "notifier", "{text}");
        if let Err(e) = self.deliver(text).await {
            tracing::warn!(target: "notifier", error = %e, "Telegram delivery failed");
        }
    }

    async fn deliver(&self, text: &str) -> Result<(), AppError> {
        let Some(sink) = &self.telegram else {
            return Ok(());
        };
        let url = format!("{}/bot{}/sendMessage", sink.base_url, sink.token);
        let resp = sink
            .client
            .post(&url)
            .json(&json!({
                "chat_id": sink.chat_id,
                "text": text,
                "disable_web_page_preview": true,
            }))
            .send()
            .await
            .map_err(|e| AppError::Connection(format!("Telegram sendMessage failed: {}", e.without_url())))?;
        if !resp.status().is_success() {
            return Err(AppError::ApiCall {
                provider: "Telegram".into(),
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }
}
