// src/provider/anthropic.rs — Anthropic Messages API text generator

use async_trait::async_trait;
use std::time::Duration;

use super::{GenerationOptions, TextGenerator};
use crate::infra::errors::RaceError;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        }
    }

    /// Build from `ANTHROPIC_API_KEY`, if set and non-empty.
    pub fn from_env() -> Option<Self> {
        std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(Self::new)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    fn build_request_body(
        &self,
        context: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": options.model,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature.clamp(0.0, 1.0),
            "messages": [{ "role": "user", "content": prompt }],
        });
        if !context.is_empty() {
            body["system"] = serde_json::json!(context);
        }
        body
    }
}

/// Concatenate every text block of a Messages API response.
fn extract_text(resp: &serde_json::Value) -> String {
    resp["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter(|c| c["type"] == "text")
                .filter_map(|c| c["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

#[async_trait]
impl TextGenerator for AnthropicProvider {
    fn id(&self) -> &str {
        "anthropic"
    }

    async fn generate_text(
        &self,
        context: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, RaceError> {
        let body = self.build_request_body(context, prompt, options);

        let response = self
            .client
            .post(self.api_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RaceError::Provider {
                provider: "anthropic".into(),
                message: e.to_string(),
                retriable: e.is_timeout() || e.is_connect(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5);
            return Err(RaceError::RateLimited {
                provider: "anthropic".into(),
                retry_after_ms: retry_after * 1000,
            });
        }

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(RaceError::Provider {
                provider: "anthropic".into(),
                message: format!("HTTP {}: {}", status, error_body),
                retriable: status.is_server_error(),
            });
        }

        let resp: serde_json::Value = response.json().await.map_err(|e| RaceError::Provider {
            provider: "anthropic".into(),
            message: format!("Failed to parse response: {}", e),
            retriable: false,
        })?;

        let text = extract_text(&resp);
        if text.trim().is_empty() {
            return Err(RaceError::Provider {
                provider: "anthropic".into(),
                message: "Empty completion".into(),
                retriable: true,
            });
        }

        tracing::debug!(
            model = %options.model,
            input_tokens = resp["usage"]["input_tokens"].as_u64().unwrap_or(0),
            output_tokens = resp["usage"]["output_tokens"].as_u64().unwrap_or(0),
            "Completion received"
        );

        Ok(text)
    }
}
