// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use async_trait::async_trait;
use llm_contracts::{LLMError, LLMResult, ProviderRequest, ProviderResponse, Usage};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::ApiClient;

/// Client for a local Ollama server. No API key; generation options ride
/// in the `options` object and token budget maps to `num_predict`.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>) -> Self {
        // Local models can be slow to load on first request.
        let timeout = Duration::from_secs(120);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
            timeout,
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn build_payload(&self, request: &ProviderRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({"role": m.role, "content": m.content}))
            .collect();

        let mut options = json!({});
        if let Some(max_tokens) = request.max_tokens {
            options["num_predict"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            options["temperature"] = json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            options["top_p"] = json!(top_p);
        }
        if let Some(stop) = &request.stop_sequences {
            options["stop"] = json!(stop);
        }

        json!({
            "model": request.model,
            "messages": messages,
            "stream": false,
            "options": options,
        })
    }

    fn parse_response(&self, data: Value, model: String) -> LLMResult<ProviderResponse> {
        let content = data["message"]["content"].as_str().ok_or_else(|| {
            LLMError::Provider("no message content in Ollama response".to_string())
        })?;
        let usage = Usage {
            prompt_tokens: data["prompt_eval_count"].as_u64().unwrap_or(0) as u32,
            completion_tokens: data["eval_count"].as_u64().unwrap_or(0) as u32,
            total_tokens: (data["prompt_eval_count"].as_u64().unwrap_or(0)
                + data["eval_count"].as_u64().unwrap_or(0)) as u32,
        };
        Ok(ProviderResponse {
            content: content.to_string(),
            model,
            usage,
            finish_reason: data["done_reason"].as_str().map(str::to_string),
            raw_response: data,
        })
    }

    async fn send_with_retry(&self, payload: Value) -> LLMResult<Value> {
        let url = format!("{}/api/chat", self.base_url);
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            debug!(attempt = attempt + 1, "sending request to Ollama");
            let response = tokio::time::timeout(
                self.timeout,
                self.client.post(&url).json(&payload).send(),
            )
            .await;

            match response {
                Ok(Ok(resp)) => {
                    let status = resp.status();
                    if status.is_success() {
                        match resp.json::<Value>().await {
                            Ok(data) => return Ok(data),
                            Err(e) => {
                                last_error = Some(LLMError::Serialisation(format!(
                                    "invalid JSON from Ollama: {e}"
                                )));
                            }
                        }
                    } else if status == 404 {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(LLMError::ModelNotFound(format!(
                            "Ollama has no such model: {body}"
                        )));
                    } else {
                        let body = resp.text().await.unwrap_or_default();
                        last_error = Some(LLMError::Provider(format!("Ollama {status}: {body}")));
                    }
                }
                Ok(Err(e)) => {
                    last_error = Some(LLMError::Network(format!("request failed: {e}")));
                }
                Err(_) => {
                    warn!(timeout_secs = self.timeout.as_secs(), "Ollama request timed out");
                    last_error = Some(LLMError::Timeout);
                }
            }

            if attempt < self.max_retries {
                tokio::time::sleep(Duration::from_secs(2_u64.pow(attempt.min(3)))).await;
            }
        }
        Err(last_error.unwrap_or_else(|| LLMError::Internal("unknown error".to_string())))
    }
}

#[async_trait]
impl ApiClient for OllamaClient {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        let payload = self.build_payload(&request);
        let data = self.send_with_retry(payload).await?;
        self.parse_response(data, request.model)
    }

    fn provider_name(&self) -> &'static str {
        "ollama"
    }

    /// Asks the server to list its models, which confirms both that it is
    /// reachable and that the API is the one we expect.
    async fn health_check(&self) -> LLMResult<()> {
        let url = format!("{}/api/tags", self.base_url);
        let response = tokio::time::timeout(Duration::from_secs(5), self.client.get(&url).send())
            .await
            .map_err(|_| LLMError::Timeout)?
            .map_err(|e| LLMError::Network(format!("Ollama unreachable: {e}")))?;
        if !response.status().is_success() {
            return Err(LLMError::Provider(format!(
                "Ollama /api/tags returned {}",
                response.status()
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| LLMError::Serialisation(format!("invalid /api/tags response: {e}")))?;
        if body.get("models").and_then(Value::as_array).is_none() {
            return Err(LLMError::Provider(
                "unexpected /api/tags response shape".to_string(),
            ));
        }
        Ok(())
    }
}
