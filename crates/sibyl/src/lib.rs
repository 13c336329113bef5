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

//! Agent layer of the dashboard analyst: conversation session state,
//! deterministic prompt assembly, LLM provider clients, the reply
//! interpreter, and the per-turn pipeline that ties them together.

pub mod agent;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod llm;
pub mod prompt;
pub mod session;

pub use agent::{Agent, TurnOutcome};
pub use config::{ModelCatalogue, ModelConfig};
pub use error::{AgentError, Result};
pub use interpreter::{interpret_response, ModelReply};
pub use llm::gateway::ModelGateway;
pub use llm::providers::{AnthropicClient, ApiClient, OllamaClient, OpenAIClient};
pub use prompt::{PromptBudget, PromptBuilder};
pub use session::{AnalystSession, ChatMessage, Role};
