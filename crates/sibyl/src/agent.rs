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

//! The per-turn pipeline: decide what kind of prompt this turn needs,
//! call the model, interpret the reply and fold it back into the session.

use crate::error::{AgentError, Result};
use crate::interpreter::{interpret_response, ModelReply};
use crate::llm::gateway::ModelGateway;
use crate::prompt::PromptBuilder;
use crate::session::AnalystSession;
use llm_contracts::{GenerationConfig, LLMRequest};
use std::sync::Arc;
use tessera::Dataset;
use tracing::{debug, info, warn};

/// What the UI shows for one completed turn. The dashboard itself lives
/// in the session; the outcome carries only the chat-facing text.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The session's dashboard was replaced; `message` explains the plan.
    DashboardUpdated { message: String },
    /// The agent asked a question and is waiting for the answer.
    Clarification(String),
    /// Free-text answer, no dashboard change.
    Insight(String),
}

const NEW_DASHBOARD_PHRASES: &[&str] = &["new dashboard", "start over", "from scratch"];

const VAGUE_PHRASES: &[&str] = &[
    "make it better",
    "improve it",
    "something nice",
    "do something",
    "make it good",
];

pub struct Agent {
    gateway: ModelGateway,
    prompts: PromptBuilder,
}

impl Agent {
    pub fn new(gateway: ModelGateway) -> Self {
        Self {
            gateway,
            prompts: PromptBuilder::default(),
        }
    }

    pub fn with_prompts(gateway: ModelGateway, prompts: PromptBuilder) -> Self {
        Self { gateway, prompts }
    }

    pub fn model_name(&self) -> &str {
        self.gateway.model_name()
    }

    /// Runs one conversational turn. The user message is recorded even
    /// when the turn fails, so a retry reads naturally in the history.
    pub async fn handle_turn(
        &self,
        session: &mut AnalystSession,
        message: &str,
    ) -> Result<TurnOutcome> {
        session.push_user(message);
        let dataset = session
            .dataset()
            .cloned()
            .ok_or(AgentError::NoDataset)?;

        // History excluding the message this turn is about.
        let history_len = session.history().len().saturating_sub(1);
        let history = session.history()[..history_len].to_vec();

        if let Some(question) = session.take_pending_clarification() {
            debug!("resuming from clarification");
            let prompt =
                self.prompts
                    .clarification_answer(&dataset, &history, &question, message);
            let reply = self.call_model(prompt).await?;
            return self.apply_reply(session, &dataset, reply);
        }

        let revising = session.dashboard().is_some() && !wants_new_dashboard(message);

        if self.is_ambiguous(&dataset, message).await {
            let question = format!(
                "Could you be more specific? For example, which of these columns should the \
                 dashboard focus on: {}?",
                dataset.column_names().join(", ")
            );
            session.set_pending_clarification(question.clone());
            session.push_assistant(question.clone());
            return Ok(TurnOutcome::Clarification(question));
        }

        let prompt = if revising {
            // Checked above that a dashboard exists.
            let current = session.dashboard().cloned().unwrap_or_default();
            self.prompts
                .revise_dashboard(&dataset, &history, &current, message)
        } else {
            self.prompts.create_dashboard(&dataset, &history, message)
        };

        let reply = self.call_model(prompt).await?;
        self.apply_reply(session, &dataset, reply)
    }

    async fn call_model(&self, prompt: String) -> Result<ModelReply> {
        let request = LLMRequest::new(prompt)
            .with_system_prompt(self.prompts.system_preamble())
            .with_generation_config(GenerationConfig::default());
        let response = self.gateway.generate(request).await?;
        Ok(interpret_response(&response.content))
    }

    /// Cheap one-word classification before committing to a plan. On any
    /// model failure a phrase heuristic decides, so classification never
    /// sinks a turn on its own.
    async fn is_ambiguous(&self, dataset: &Dataset, message: &str) -> bool {
        let lowered = message.to_lowercase();
        let heuristic = VAGUE_PHRASES.iter().any(|p| lowered.contains(p));

        let prompt = self.prompts.classify_ambiguity(dataset, message);
        let request = LLMRequest::new(prompt).with_generation_config(GenerationConfig {
            max_tokens: Some(8),
            temperature: Some(0.0),
            ..Default::default()
        });
        match self.gateway.generate(request).await {
            Ok(response) => {
                let answer = response.content.to_uppercase();
                if answer.contains("AMBIGUOUS") {
                    true
                } else if answer.contains("SPECIFIC") {
                    false
                } else {
                    heuristic
                }
            }
            Err(e) => {
                warn!(error = %e, "ambiguity classification failed, using heuristic");
                heuristic
            }
        }
    }

    fn apply_reply(
        &self,
        session: &mut AnalystSession,
        dataset: &Arc<Dataset>,
        reply: ModelReply,
    ) -> Result<TurnOutcome> {
        match reply {
            ModelReply::Dashboard { spec, message } => {
                spec.validate(dataset)?;
                if let Some(summary) = &spec.analysis_summary {
                    for line in &summary.reasoning {
                        session.record_assumption(line.clone());
                    }
                }
                info!(
                    charts = spec.charts.len(),
                    kpis = spec.kpis.len(),
                    "dashboard updated"
                );
                session.set_dashboard(*spec);
                session.push_assistant(message.clone());
                Ok(TurnOutcome::DashboardUpdated { message })
            }
            ModelReply::Clarification(question) => {
                session.set_pending_clarification(question.clone());
                session.push_assistant(question.clone());
                Ok(TurnOutcome::Clarification(question))
            }
            ModelReply::Insight(text) => {
                session.push_assistant(text.clone());
                Ok(TurnOutcome::Insight(text))
            }
        }
    }
}

fn wants_new_dashboard(message: &str) -> bool {
    let lowered = message.to_lowercase();
    NEW_DASHBOARD_PHRASES.iter().any(|p| lowered.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_dashboard_phrases_are_detected() {
        assert!(wants_new_dashboard("give me a NEW dashboard"));
        assert!(wants_new_dashboard("let's start over"));
        assert!(wants_new_dashboard("build one from scratch please"));
        assert!(!wants_new_dashboard("add a pie chart"));
    }
}
