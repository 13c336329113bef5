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

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    endpoint: String,
    api_version: String,
    timeout: Duration,
    max_retries: u32,
}

impl AnthropicClient {
    pub fn new(api_key: String, endpoint: Option<String>) -> Self {
        let timeout = Duration::from_secs(60);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            api_key,
            endpoint: endpoint
                .unwrap_or_else(|| "https://api.anthropic.com/v1/messages".to_string()),
            api_version: "2023-06-01".to_string(),
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
        let mut system_parts = Vec::new();
        let mut messages = Vec::new();
        for msg in &request.messages {
            if msg.role == "system" {
                system_parts.push(msg.content.clone());
            } else {
                messages.push(json!({"role": msg.role, "content": msg.content}));
            }
        }

        let mut payload = json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(1024),
        });
        if !system_parts.is_empty() {
            payload["system"] = json!(system_parts.join("\n\n"));
        }
        if let Some(temperature) = request.temperature {
            payload["temperature"] = json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            payload["top_p"] = json!(top_p);
        }
        if let Some(stop) = &request.stop_sequences {
            payload["stop_sequences"] = json!(stop);
        }
        for (key, value) in &request.provider_specific {
            payload[key] = value.clone();
        }
        payload
    }

    fn parse_response(&self, data: Value, model: String) -> LLMResult<ProviderResponse> {
        let content = data["content"][0]["text"].as_str().ok_or_else(|| {
            LLMError::Provider("no text content in Anthropic response".to_string())
        })?;
        let usage = Usage {
            prompt_tokens: data["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: data["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
            total_tokens: (data["usage"]["input_tokens"].as_u64().unwrap_or(0)
                + data["usage"]["output_tokens"].as_u64().unwrap_or(0)) as u32,
        };
        Ok(ProviderResponse {
            content: content.to_string(),
            model,
            usage,
            finish_reason: data["stop_reason"].as_str().map(str::to_string),
            raw_response: data,
        })
    }

    async fn send_with_retry(&self, payload: Value) -> LLMResult<Value> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            debug!(attempt = attempt + 1, "sending request to Anthropic");
            let response = tokio::time::timeout(
                self.timeout,
                self.client
                    .post(&self.endpoint)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", &self.api_version)
                    .header("content-type", "application/json")
                    .json(&payload)
                    .send(),
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
                                    "invalid JSON from Anthropic: {e}"
                                )));
                            }
                        }
                    } else if status == 429 {
                        warn!("rate limited by Anthropic");
                        last_error = Some(LLMError::RateLimit);
                    } else if status == 401 || status == 403 {
                        return Err(LLMError::Authentication(format!(
                            "Anthropic rejected the API key ({status})"
                        )));
                    } else {
                        let body = resp.text().await.unwrap_or_default();
                        last_error =
                            Some(LLMError::Provider(format!("Anthropic {status}: {body}")));
                    }
                }
                Ok(Err(e)) => {
                    last_error = Some(LLMError::Network(format!("request failed: {e}")));
                }
                Err(_) => {
                    warn!(timeout_secs = self.timeout.as_secs(), "Anthropic request timed out");
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
impl ApiClient for AnthropicClient {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        let payload = self.build_payload(&request);
        let data = self.send_with_retry(payload).await?;
        self.parse_response(data, request.model)
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }

    async fn health_check(&self) -> LLMResult<()> {
        let probe = ProviderRequest {
            model: "claude-3-5-haiku-latest".to_string(),
            messages: vec![llm_contracts::Message {
                role: "user".to_string(),
                content: "Hi".to_string(),
            }],
            max_tokens: Some(10),
            temperature: Some(0.1),
            top_p: None,
            stop_sequences: None,
            provider_specific: std::collections::HashMap::new(),
        };
        self.send_request(probe).await?;
        Ok(())
    }
}
