use std::time::Duration;
use async_trait::async_trait;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use crate::config::DiscordConfig;
use super::delivery::{Delivery, DeliveryError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest message body the platform accepts
const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Deserialize)]
struct Guild {
    owner_id: String,
}

#[derive(Deserialize)]
struct DmChannel {
    id: String,
}

/// Delivery through the Discord REST API with a bot token
pub struct DiscordDelivery {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl DiscordDelivery {
    pub fn new(config: &DiscordConfig, token: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create Discord HTTP client")?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
        })
    }

    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), DeliveryError> {
        let response = self
            .http
            .post(format!("{}/channels/{}/messages", self.api_base, channel_id))
            .header("Authorization", format!("Bot {}", self.token))
            .json(&json!({ "content": truncate_content(text) }))
            .send()
            .await
            .map_err(classify)?;

        check_status(response.status().as_u16())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, DeliveryError> {
        let response = self
            .http
            .get(format!("{}{}", self.api_base, path))
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await
            .map_err(classify)?;

        check_status(response.status().as_u16())?;
        response.json::<T>().await.map_err(classify)
    }
}

#[async_trait]
impl Delivery for DiscordDelivery {
    async fn publish_to_channel(&self, channel_id: &str, text: &str) -> Result<(), DeliveryError> {
        self.post_message(channel_id, text).await
    }

    async fn fetch_owner(&self, tenant_id: &str) -> Result<String, DeliveryError> {
        let guild: Guild = self.get_json(&format!("/guilds/{}", tenant_id)).await?;
        Ok(guild.owner_id)
    }

    async fn send_direct_message(&self, user_id: &str, text: &str) -> Result<(), DeliveryError> {
        let response = self
            .http
            .post(format!("{}/users/@me/channels", self.api_base))
            .header("Authorization", format!("Bot {}", self.token))
            .json(&json!({ "recipient_id": user_id }))
            .send()
            .await
            .map_err(classify)?;

        check_status(response.status().as_u16())?;
        let channel: DmChannel = response.json().await.map_err(classify)?;
        self.post_message(&channel.id, text).await
    }
}

fn check_status(status: u16) -> Result<(), DeliveryError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(DeliveryError::Status(status))
    }
}

/// Map transport failures onto the retry classification
fn classify(e: reqwest::Error) -> DeliveryError {
    if let Some(status) = e.status() {
        DeliveryError::Status(status.as_u16())
    } else if e.is_timeout() {
        DeliveryError::Connection("ETIMEDOUT".to_string())
    } else if e.is_connect() {
        DeliveryError::Connection("ECONNREFUSED".to_string())
    } else if e.is_request() {
        DeliveryError::Connection("ECONNRESET".to_string())
    } else {
        DeliveryError::Rejected(e.to_string())
    }
}

fn truncate_content(text: &str) -> String {
    if text.chars().count() <= MAX_CONTENT_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(MAX_CONTENT_CHARS - 1).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_content() {
        assert_eq!(truncate_content("short"), "short");

        let long = "🚨".repeat(2500);
        let truncated = truncate_content(&long);
        assert_eq!(truncated.chars().count(), MAX_CONTENT_CHARS);
        assert!(truncated.ends_with('…'));
    }

    #[test]
    fn test_check_status() {
        assert!(check_status(200).is_ok());
        assert!(check_status(204).is_ok());
        assert_eq!(check_status(403), Err(DeliveryError::Status(403)));
        assert!(check_status(502).unwrap_err().is_transient());
    }

    #[test]
    fn test_api_base_is_normalized() {
        let config = DiscordConfig {
            api_base: "https://discord.test/api/v10/".to_string(),
            ..Default::default()
        };
        let delivery = DiscordDelivery::new(&config, " token \n".to_string()).unwrap();
        assert_eq!(delivery.api_base, "https://discord.test/api/v10");
        assert_eq!(delivery.token, "token");
    }
}
