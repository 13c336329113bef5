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

use llm_contracts::LLMError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LLMError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] tessera::DatasetError),

    #[error("No dataset attached to the session")]
    NoDataset,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Message shown in the chat pane when a turn fails. Turns are never
    /// retried automatically; the user re-sends their message.
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Llm(LLMError::Timeout) => {
                "The model took too long to respond. Please try again.".to_string()
            }
            AgentError::Llm(LLMError::Network(_)) => {
                "Could not reach the model endpoint. Is the model server running?".to_string()
            }
            AgentError::NoDataset => {
                "Please upload a dataset before asking for a dashboard.".to_string()
            }
            AgentError::Dataset(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}
