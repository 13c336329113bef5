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

use crate::error::{AgentError, Result};
use llm_contracts::Provider;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// One entry in the model catalogue. The yaml file carries the stable
/// facts about a model; secrets and endpoints come from the environment
/// at load time, never from the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub provider: Provider,
    pub model: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_max_tokens() -> u32 {
    512
}

fn default_temperature() -> f32 {
    0.2
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogueFile {
    default_model: String,
    models: Vec<ModelConfig>,
}

/// The set of models the agent can talk to, loaded from `llm_models.yml`
/// with environment overrides applied.
#[derive(Debug, Clone)]
pub struct ModelCatalogue {
    models: Vec<ModelConfig>,
    default_model: String,
}

impl ModelCatalogue {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AgentError::Configuration(format!(
                "failed to read model catalogue {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let file: CatalogueFile = serde_yaml::from_str(raw)
            .map_err(|e| AgentError::Configuration(format!("invalid model catalogue: {e}")))?;
        if file.models.is_empty() {
            return Err(AgentError::Configuration(
                "model catalogue contains no models".to_string(),
            ));
        }
        let mut catalogue = Self {
            models: file.models,
            default_model: file.default_model,
        };
        catalogue.apply_env_overrides();
        catalogue.resolve(catalogue.default_model.as_str())?;
        info!(
            models = catalogue.models.len(),
            default = %catalogue.default_model,
            "loaded model catalogue"
        );
        Ok(catalogue)
    }

    /// A single-model catalogue for when no yaml file is present. Defaults
    /// to a local Ollama endpoint so the app works without any API keys.
    pub fn local_default() -> Self {
        let mut catalogue = Self {
            models: vec![ModelConfig {
                name: "local".to_string(),
                provider: Provider::Ollama,
                model: "phi3:mini".to_string(),
                endpoint: Some("http://localhost:11434".to_string()),
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
                api_key: None,
            }],
            default_model: "local".to_string(),
        };
        catalogue.apply_env_overrides();
        catalogue
    }

    /// Environment beats file: API keys are only ever read from the
    /// environment, and `OLLAMA_BASE_URL` replaces any configured Ollama
    /// endpoint. Call sites load `.env` via dotenvy before this runs.
    fn apply_env_overrides(&mut self) {
        for model in &mut self.models {
            match model.provider {
                Provider::Anthropic => {
                    model.api_key = std::env::var("ANTHROPIC_API_KEY").ok();
                }
                Provider::OpenAI => {
                    model.api_key = std::env::var("OPENAI_API_KEY").ok();
                }
                Provider::Ollama => {
                    if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
                        model.endpoint = Some(url);
                    }
                }
                Provider::Custom(_) => {}
            }
            debug!(model = %model.name, provider = %model.provider.as_str(), "configured model");
        }
        if let Ok(name) = std::env::var("SIBYL_MODEL") {
            if self.models.iter().any(|m| m.name == name) {
                self.default_model = name;
            }
        }
    }

    pub fn resolve(&self, name: &str) -> Result<&ModelConfig> {
        self.models
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| AgentError::Configuration(format!("unknown model '{name}'")))
    }

    pub fn default_model(&self) -> &ModelConfig {
        // Validated at load time.
        self.models
            .iter()
            .find(|m| m.name == self.default_model)
            .unwrap_or(&self.models[0])
    }

    pub fn models(&self) -> &[ModelConfig] {
        &self.models
    }
}
