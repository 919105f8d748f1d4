#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM API error ({kind}): {message}")]
    Api { kind: String, message: String },

    #[error("LLM returned no text content")]
    EmptyResponse,
}

/// Text-completion service used to classify issues.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, prompt: &str, max_output_tokens: u32) -> Result<String, OracleError>;
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// [`Oracle`] backed by the Anthropic Messages API.
pub struct AnthropicOracle {
    client: Client,
    api_key: String,
    model: String,
}

impl AnthropicOracle {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl Oracle for AnthropicOracle {
    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_chars = prompt.len()))]
    async fn complete(&self, prompt: &str, max_output_tokens: u32) -> Result<String, OracleError> {
        let request = MessageRequest {
            model: &self.model,
            max_tokens: max_output_tokens,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            return Err(match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(parsed) => OracleError::Api {
                    kind: parsed.error.kind,
                    message: parsed.error.message,
                },
                Err(_) => OracleError::Api {
                    kind: status.to_string(),
                    message: body,
                },
            });
        }

        let parsed = response.json::<MessageResponse>().await?;
        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text)
            .collect();

        if text.trim().is_empty() {
            return Err(OracleError::EmptyResponse);
        }
        debug!(response_chars = text.len(), "received completion");
        Ok(text)
    }
}
