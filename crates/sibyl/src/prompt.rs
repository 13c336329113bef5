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

//! Deterministic prompt assembly. Every prompt the agent sends is built
//! here from the session state; nothing about prompt shape lives in the
//! provider clients.

use crate::session::ChatMessage;
use tessera::{DashboardSpec, Dataset, DimensionProfile};

/// Caps on how much session state is spent on a single prompt. History
/// is dropped oldest-first when either cap is exceeded; the schema block
/// and the current message are never truncated, so `max_context_chars`
/// bounds the history window only, not the total prompt length.
#[derive(Debug, Clone)]
pub struct PromptBudget {
    pub max_history_entries: usize,
    pub max_context_chars: usize,
}

impl Default for PromptBudget {
    fn default() -> Self {
        Self {
            max_history_entries: 10,
            max_context_chars: 8000,
        }
    }
}

const SYSTEM_PREAMBLE: &str = "You are a data analyst assistant. The user has uploaded a tabular \
dataset and wants a dashboard built from it. You propose charts and KPI cards, ask a clarifying \
question when the request is ambiguous, and explain your analytical choices.\n\n\
Always reply with a single fenced ```json block containing one object with a \"kind\" field:\n\
- {\"kind\": \"dashboard\", \"spec\": {...}, \"message\": \"...\"} when you are proposing or revising a dashboard\n\
- {\"kind\": \"clarification\", \"question\": \"...\"} when you need the user to disambiguate\n\
- {\"kind\": \"insight\", \"message\": \"...\"} when answering a question about the data\n\n\
The \"spec\" object has \"charts\", \"kpis\" and \"analysis_summary\". Each chart has \"kind\" \
(bar, line, scatter, pie, histogram, box), \"x\", optional \"y\", optional \"color\", \
\"aggregation\" (sum, mean, count, min, max, none) and \"title\". Each KPI has \"column\", \
\"aggregation\" and \"label\". \"analysis_summary\" has \"approach\" and \"reasoning\". \
Only reference columns that exist in the schema below. Text outside the json block is ignored.";

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    budget: PromptBudget,
}

impl PromptBuilder {
    pub fn new(budget: PromptBudget) -> Self {
        Self { budget }
    }

    pub fn system_preamble(&self) -> String {
        SYSTEM_PREAMBLE.to_string()
    }

    /// Prompt for a fresh dashboard plan from the user's request.
    pub fn create_dashboard(
        &self,
        dataset: &Dataset,
        history: &[ChatMessage],
        request: &str,
    ) -> String {
        let mut prompt = String::new();
        prompt.push_str(&self.schema_block(dataset));
        self.push_history(&mut prompt, history);
        prompt.push_str("\nUser request:\n");
        prompt.push_str(request);
        prompt.push_str(
            "\n\nPropose a dashboard for this request. If the request is too vague to pick \
             columns or chart types, ask one clarifying question instead.",
        );
        prompt
    }

    /// Prompt for revising the active plan. The current plan is included
    /// verbatim; the model returns a complete replacement, not a diff.
    pub fn revise_dashboard(
        &self,
        dataset: &Dataset,
        history: &[ChatMessage],
        current: &DashboardSpec,
        request: &str,
    ) -> String {
        let current_json =
            serde_json::to_string_pretty(current).unwrap_or_else(|_| "{}".to_string());
        let mut prompt = String::new();
        prompt.push_str(&self.schema_block(dataset));
        self.push_history(&mut prompt, history);
        prompt.push_str("\nCurrent dashboard:\n```json\n");
        prompt.push_str(&current_json);
        prompt.push_str("\n```\n\nUser request:\n");
        prompt.push_str(request);
        prompt.push_str(
            "\n\nRevise the dashboard to satisfy the request. Return the full revised \
             dashboard, keeping every chart and KPI the user did not ask to change.",
        );
        prompt
    }

    /// Prompt for resuming after the user answered a clarifying question.
    pub fn clarification_answer(
        &self,
        dataset: &Dataset,
        history: &[ChatMessage],
        question: &str,
        answer: &str,
    ) -> String {
        let mut prompt = String::new();
        prompt.push_str(&self.schema_block(dataset));
        self.push_history(&mut prompt, history);
        prompt.push_str("\nYou previously asked:\n");
        prompt.push_str(question);
        prompt.push_str("\n\nThe user answered:\n");
        prompt.push_str(answer);
        prompt.push_str("\n\nUsing that answer, propose the dashboard now.");
        prompt
    }

    /// Yes/no classification prompt used before committing to a plan.
    /// Kept short and history-free so cheap models answer it reliably.
    pub fn classify_ambiguity(&self, dataset: &Dataset, request: &str) -> String {
        let mut prompt = String::new();
        prompt.push_str(&self.schema_block(dataset));
        prompt.push_str("\nUser request:\n");
        prompt.push_str(request);
        prompt.push_str(
            "\n\nCan a dashboard be built from this request without guessing which columns \
             or chart types the user means? Answer with exactly one word: SPECIFIC or AMBIGUOUS.",
        );
        prompt
    }

    /// One line per column so the model can ground chart choices in real
    /// schema facts instead of guessing from the column names alone.
    pub fn schema_block(&self, dataset: &Dataset) -> String {
        let mut block = format!(
            "Dataset \"{}\" with {} rows and {} columns:\n",
            dataset.name,
            dataset.frame.height(),
            dataset.profiles.len()
        );
        for profile in &dataset.profiles {
            block.push_str(&describe_column(profile));
            block.push('\n');
        }
        block
    }

    fn push_history(&self, prompt: &mut String, history: &[ChatMessage]) {
        let recent = self.trim_history(history);
        if recent.is_empty() {
            return;
        }
        prompt.push_str("\nConversation so far:\n");
        for message in recent {
            prompt.push_str(message.role.as_str());
            prompt.push_str(": ");
            prompt.push_str(&message.content);
            prompt.push('\n');
        }
    }

    /// Keeps the newest messages that fit both budget caps.
    fn trim_history<'a>(&self, history: &'a [ChatMessage]) -> &'a [ChatMessage] {
        let start = history.len().saturating_sub(self.budget.max_history_entries);
        let mut window = &history[start..];
        while !window.is_empty() {
            let chars: usize = window.iter().map(|m| m.content.len()).sum();
            if chars <= self.budget.max_context_chars {
                break;
            }
            window = &window[1..];
        }
        window
    }
}

fn describe_column(profile: &DimensionProfile) -> String {
    let mut line = format!("- {} ({})", profile.name, profile.data_type.as_str());
    if let Some(stats) = &profile.numeric_stats {
        if let (Some(min), Some(max)) = (stats.min, stats.max) {
            line.push_str(&format!(", range {min:.2} to {max:.2}"));
        }
        if let Some(mean) = stats.mean {
            line.push_str(&format!(", mean {mean:.2}"));
        }
    }
    if let Some(cardinality) = profile.cardinality {
        line.push_str(&format!(", {cardinality} distinct values"));
    }
    if let Some(stats) = &profile.temporal_stats {
        if let (Some(min), Some(max)) = (&stats.min_date, &stats.max_date) {
            line.push_str(&format!(", spans {min} to {max}"));
        }
    }
    if profile.null_count > 0 {
        line.push_str(&format!(", {:.1}% null", profile.null_percentage));
    }
    if !profile.sample_values.is_empty() {
        line.push_str(&format!(
            ", e.g. {}",
            profile.sample_values.join(", ")
        ));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ChatMessage;
    use polars::prelude::*;
    use proptest::prelude::*;
    use tessera::Dataset;

    fn dataset() -> Dataset {
        let frame = df![
            "region" => ["north", "south", "north", "east"],
            "sales" => [10.0f64, 20.0, 30.0, 40.0],
        ]
        .unwrap();
        Dataset::from_dataframe("sales.csv", frame).unwrap()
    }

    #[test]
    fn schema_block_names_every_column() {
        let builder = PromptBuilder::default();
        let block = builder.schema_block(&dataset());
        assert!(block.contains("- region (categorical)"));
        assert!(block.contains("- sales (numeric)"));
        assert!(block.contains("4 rows"));
    }

    #[test]
    fn create_prompt_carries_request_and_schema() {
        let builder = PromptBuilder::default();
        let prompt = builder.create_dashboard(&dataset(), &[], "bar chart of sales by region");
        assert!(prompt.contains("bar chart of sales by region"));
        assert!(prompt.contains("region"));
        assert!(!prompt.contains("Conversation so far"));
    }

    #[test]
    fn history_keeps_newest_entries() {
        let builder = PromptBuilder::new(PromptBudget {
            max_history_entries: 2,
            max_context_chars: 8000,
        });
        let history = vec![
            ChatMessage::user("oldest"),
            ChatMessage::assistant("middle"),
            ChatMessage::user("newest"),
        ];
        let prompt = builder.create_dashboard(&dataset(), &history, "req");
        assert!(!prompt.contains("oldest"));
        assert!(prompt.contains("middle"));
        assert!(prompt.contains("newest"));
    }

    #[test]
    fn revise_prompt_embeds_current_plan() {
        let builder = PromptBuilder::default();
        let mut spec = tessera::DashboardSpec::default();
        spec.analysis_summary = Some(tessera::AnalysisSummary {
            approach: "overview".to_string(),
            reasoning: Vec::new(),
        });
        let prompt = builder.revise_dashboard(&dataset(), &[], &spec, "add a pie chart");
        assert!(prompt.contains("Current dashboard"));
        assert!(prompt.contains("overview"));
        assert!(prompt.contains("add a pie chart"));
    }

    proptest! {
        #[test]
        fn trimmed_history_always_fits_budget(
            lengths in proptest::collection::vec(0usize..2000, 0..30),
            max_entries in 1usize..20,
            max_chars in 100usize..10_000,
        ) {
            let history: Vec<ChatMessage> = lengths
                .iter()
                .map(|n| ChatMessage::user("x".repeat(*n)))
                .collect();
            let builder = PromptBuilder::new(PromptBudget {
                max_history_entries: max_entries,
                max_context_chars: max_chars,
            });
            let window = builder.trim_history(&history);
            prop_assert!(window.len() <= max_entries);
            let chars: usize = window.iter().map(|m| m.content.len()).sum();
            // A single oversize message is dropped rather than split.
            prop_assert!(window.is_empty() || chars <= max_chars);
        }
    }
}
