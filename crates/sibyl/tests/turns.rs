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

//! End-to-end turn tests with a scripted model standing in for a real
//! provider, so outcomes depend only on the pipeline logic.

use async_trait::async_trait;
use llm_contracts::{LLMResult, ProviderRequest, ProviderResponse, Usage};
use polars::prelude::*;
use sibyl::{Agent, AgentError, AnalystSession, ApiClient, ModelGateway, TurnOutcome};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tessera::{ChartKind, Dataset};

struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedModel {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
        })
    }
}

#[async_trait]
impl ApiClient for ScriptedModel {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        let content = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted model ran out of replies");
        Ok(ProviderResponse {
            content,
            model: request.model,
            usage: Usage::default(),
            finish_reason: None,
            raw_response: serde_json::Value::Null,
        })
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    async fn health_check(&self) -> LLMResult<()> {
        Ok(())
    }
}

fn agent_with_script(replies: &[&str]) -> Agent {
    let config = sibyl::ModelCatalogue::local_default().default_model().clone();
    Agent::new(ModelGateway::with_client(ScriptedModel::new(replies), config))
}

fn sales_dataset() -> Dataset {
    let frame = df![
        "region" => ["north", "south", "north", "east"],
        "product" => ["a", "b", "a", "c"],
        "sales" => [10.0f64, 20.0, 30.0, 40.0],
    ]
    .unwrap();
    Dataset::from_dataframe("sales.csv", frame).unwrap()
}

const BAR_CHART_REPLY: &str = r#"```json
{
  "kind": "dashboard",
  "message": "A bar chart of total sales per region.",
  "spec": {
    "charts": [
      {"kind": "bar", "x": "region", "y": "sales", "aggregation": "sum", "title": "Sales by region"}
    ],
    "kpis": [
      {"column": "sales", "aggregation": "sum", "label": "Total sales"}
    ],
    "analysis_summary": {
      "approach": "categorical comparison",
      "reasoning": ["region has 3 distinct values, well suited to bars"]
    }
  }
}
```"#;

#[tokio::test]
async fn specific_request_produces_a_dashboard() {
    let agent = agent_with_script(&["SPECIFIC", BAR_CHART_REPLY]);
    let mut session = AnalystSession::new();
    session.attach_dataset(sales_dataset());

    let outcome = agent
        .handle_turn(&mut session, "bar chart of sales by region")
        .await
        .unwrap();

    assert!(matches!(outcome, TurnOutcome::DashboardUpdated { .. }));
    let spec = session.dashboard().unwrap();
    assert_eq!(spec.charts.len(), 1);
    assert_eq!(spec.charts[0].kind, ChartKind::Bar);
    assert_eq!(spec.charts[0].x, "region");
    assert_eq!(spec.charts[0].y.as_deref(), Some("sales"));
    // user turn plus assistant explanation
    assert_eq!(session.history().len(), 2);
    assert!(!session.assumptions().is_empty());
}

#[tokio::test]
async fn vague_request_asks_for_clarification() {
    let agent = agent_with_script(&["AMBIGUOUS"]);
    let mut session = AnalystSession::new();
    session.attach_dataset(sales_dataset());
    session.set_dashboard(Default::default());

    let outcome = agent
        .handle_turn(&mut session, "make it better")
        .await
        .unwrap();

    match outcome {
        TurnOutcome::Clarification(question) => assert!(question.contains("region")),
        other => panic!("expected clarification, got {other:?}"),
    }
    assert!(session.awaiting_clarification());
}

#[tokio::test]
async fn clarification_answer_resumes_planning() {
    // Turn 1 classifies as ambiguous; turn 2 goes straight to planning.
    let agent = agent_with_script(&["AMBIGUOUS", BAR_CHART_REPLY]);
    let mut session = AnalystSession::new();
    session.attach_dataset(sales_dataset());

    let first = agent.handle_turn(&mut session, "make it better").await.unwrap();
    assert!(matches!(first, TurnOutcome::Clarification(_)));

    let second = agent
        .handle_turn(&mut session, "focus on sales per region")
        .await
        .unwrap();
    assert!(matches!(second, TurnOutcome::DashboardUpdated { .. }));
    assert!(!session.awaiting_clarification());
    assert!(session.dashboard().is_some());
}

#[tokio::test]
async fn unstructured_reply_becomes_an_insight() {
    let agent = agent_with_script(&["SPECIFIC", "Sales are concentrated in the north region."]);
    let mut session = AnalystSession::new();
    session.attach_dataset(sales_dataset());

    let outcome = agent
        .handle_turn(&mut session, "which region sells the most?")
        .await
        .unwrap();

    match outcome {
        TurnOutcome::Insight(text) => assert!(text.contains("north")),
        other => panic!("expected insight, got {other:?}"),
    }
    assert!(session.dashboard().is_none());
}

#[tokio::test]
async fn turn_without_dataset_is_rejected() {
    let agent = agent_with_script(&[]);
    let mut session = AnalystSession::new();

    let error = agent
        .handle_turn(&mut session, "show me a dashboard")
        .await
        .unwrap_err();
    assert!(matches!(error, AgentError::NoDataset));
    // the message is still recorded for the retry
    assert_eq!(session.history().len(), 1);
}

#[tokio::test]
async fn plan_referencing_unknown_column_keeps_previous_dashboard() {
    let bad_reply = r#"```json
{
  "kind": "dashboard",
  "message": "Profit by region.",
  "spec": {
    "charts": [
      {"kind": "bar", "x": "region", "y": "profit", "aggregation": "sum", "title": ""}
    ],
    "kpis": []
  }
}
```"#;
    let agent = agent_with_script(&["SPECIFIC", bad_reply]);
    let mut session = AnalystSession::new();
    session.attach_dataset(sales_dataset());

    let error = agent
        .handle_turn(&mut session, "bar chart of profit by region")
        .await
        .unwrap_err();
    assert!(matches!(error, AgentError::Dataset(_)));
    assert!(session.dashboard().is_none());
}
