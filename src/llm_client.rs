use crate::errors::AppError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const TEMPERATURE: f64 = 0.7;

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

impl LlmClient {
    pub fn new(base_url: String, api_key: String, model: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create LLM client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Runs one completion constrained to `schema` and returns the parsed JSON.
    pub async fn generate_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema_name: &str,
        schema: &Value,
    ) -> Result<Value, AppError> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::info!(
            "Requesting structured completion '{}' from {}",
            schema_name,
            self.model
        );
        tracing::debug!("Prompt length: {} chars", user_prompt.len());

        let body = json!({
            "model": self.model,
            "temperature": TEMPERATURE,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema_name,
                    "strict": true,
                    "schema": schema,
                },
            },
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("LLM request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "LLM returned {}: {}",
                status, error_text
            )));
        }

        let completion: ChatCompletion = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse LLM response: {}", e))
        })?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::ExternalApiError("LLM returned no choices".to_string()))?;

        if let Some(refusal) = choice.message.refusal {
            return Err(AppError::ExternalApiError(format!(
                "LLM refused the request: {}",
                refusal
            )));
        }
        if choice.finish_reason.as_deref() == Some("length") {
            tracing::warn!("Completion '{}' was truncated", schema_name);
        }

        let content = choice
            .message
            .content
            .ok_or_else(|| AppError::ExternalApiError("LLM returned empty content".to_string()))?;

        serde_json::from_str(&content).map_err(|e| {
            AppError::ExternalApiError(format!("LLM content is not valid JSON: {}", e))
        })
    }
}
