use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

use crate::error::{PipelineError, Result};
use crate::models::SamplingOptions;
use crate::traits::{Completion, CompletionClient};

pub const DEFAULT_COMPLETIONS_BASE_URL: &str = "https://api.openai.com/v1";

pub struct ChatCompletionsClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl ChatCompletionsClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = Url::parse(&base_url.into())?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }
}

fn parse_completion(payload: &Value) -> Option<Completion> {
    let text = payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)?
        .to_string();
    let tokens_used = payload
        .pointer("/usage/total_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);

    Some(Completion { text, tokens_used })
}

#[async_trait]
impl CompletionClient for ChatCompletionsClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        sampling: &SamplingOptions,
    ) -> Result<Completion> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": sampling.model,
                "messages": [
                    { "role": "system", "content": system_prompt },
                    { "role": "user", "content": user_prompt },
                ],
                "temperature": sampling.temperature,
                "top_p": sampling.top_p,
                "max_tokens": sampling.max_tokens,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::BackendResponse {
                backend: "openai".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        parse_completion(&parsed).ok_or_else(|| PipelineError::BackendResponse {
            backend: "openai".to_string(),
            details: "completion response had no message content".to_string(),
        })
    }
}
