//! Chat widget token issuance

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

const CHAT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Chat token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Chat token request failed: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Transport(e.to_string())
    }
}

#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    url: String,
    api_key: String,
    chatbot_id: String,
}

impl ChatClient {
    pub fn new(url: &str, api_key: &str, chatbot_id: &str) -> Result<Self, ChatError> {
        let client = Client::builder()
            .timeout(CHAT_TIMEOUT)
            .build()
            .map_err(|e| ChatError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
            api_key: api_key.to_string(),
            chatbot_id: chatbot_id.to_string(),
        })
    }

    /// Request a widget token; the upstream JSON is returned unchanged
    pub async fn issue_token(&self) -> Result<Value, ChatError> {
        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .json(&json!({ "chatbotId": self.chatbot_id }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<Value>().await?)
    }
}
