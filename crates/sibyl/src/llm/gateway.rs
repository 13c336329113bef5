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

use crate::config::ModelConfig;
use crate::error::{AgentError, Result};
use crate::llm::providers::{AnthropicClient, ApiClient, OllamaClient, OpenAIClient};
use chrono::Utc;
use llm_contracts::{
    LLMRequest, LLMResponse, LLMResult, Message, Provider, ProviderRequest, ResponseMetadata,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Binds one configured model to its provider client and translates the
/// generic request shape into the provider wire shape.
pub struct ModelGateway {
    client: Arc<dyn ApiClient>,
    config: ModelConfig,
}

impl ModelGateway {
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let client: Arc<dyn ApiClient> = match &config.provider {
            Provider::Anthropic => {
                let api_key = config.api_key.clone().ok_or_else(|| {
                    AgentError::Configuration(
                        "ANTHROPIC_API_KEY is not set but an Anthropic model is configured"
                            .to_string(),
                    )
                })?;
                Arc::new(AnthropicClient::new(api_key, config.endpoint.clone()))
            }
            Provider::OpenAI => {
                let api_key = config.api_key.clone().ok_or_else(|| {
                    AgentError::Configuration(
                        "OPENAI_API_KEY is not set but an OpenAI model is configured".to_string(),
                    )
                })?;
                Arc::new(OpenAIClient::new(api_key, config.endpoint.clone()))
            }
            Provider::Ollama => Arc::new(OllamaClient::new(config.endpoint.clone())),
            Provider::Custom(name) => {
                return Err(AgentError::Configuration(format!(
                    "unsupported provider '{name}'"
                )));
            }
        };
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Test seam: any ApiClient impl can stand in for a real provider.
    pub fn with_client(client: Arc<dyn ApiClient>, config: ModelConfig) -> Self {
        Self { client, config }
    }

    pub fn model_name(&self) -> &str {
        &self.config.model
    }

    pub async fn generate(&self, request: LLMRequest) -> Result<LLMResponse> {
        let started = Instant::now();

        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(Message {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(Message {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        let generation = &request.generation_config;
        let provider_request = ProviderRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: generation.max_tokens.or(Some(self.config.max_tokens)),
            temperature: generation.temperature.or(Some(self.config.temperature)),
            top_p: generation.top_p,
            stop_sequences: generation.stop_sequences.clone(),
            provider_specific: HashMap::new(),
        };

        let response = self.client.send_request(provider_request).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            provider = self.client.provider_name(),
            model = %response.model,
            elapsed_ms,
            tokens = response.usage.total_tokens,
            "model call completed"
        );

        Ok(LLMResponse {
            id: Uuid::new_v4(),
            request_id: request.id,
            content: response.content,
            model_used: response.model,
            provider_used: self.client.provider_name().to_string(),
            usage: response.usage,
            metadata: ResponseMetadata {
                processing_time_ms: elapsed_ms,
                retry_count: 0,
            },
            created_at: Utc::now(),
        })
    }

    pub async fn health_check(&self) -> LLMResult<()> {
        self.client.health_check().await
    }
}
