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

//! Turns raw model text into a typed reply. Interpretation never fails:
//! output that doesn't match the json contract degrades to an insight
//! carrying the raw text, so the chat keeps flowing.

use serde_json::Value;
use tessera::DashboardSpec;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// A complete dashboard plan plus the explanation shown in chat.
    Dashboard {
        spec: Box<DashboardSpec>,
        message: String,
    },
    /// The model needs the user to disambiguate before planning.
    Clarification(String),
    /// Free-text answer about the data, no dashboard change.
    Insight(String),
}

pub fn interpret_response(content: &str) -> ModelReply {
    let Some(json_str) = extract_json(content) else {
        debug!("no json object in model response, treating as insight");
        return ModelReply::Insight(content.trim().to_string());
    };
    let Ok(value) = serde_json::from_str::<Value>(&json_str) else {
        return ModelReply::Insight(content.trim().to_string());
    };

    match value.get("kind").and_then(Value::as_str) {
        Some("dashboard") => {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Here is the dashboard I propose.")
                .to_string();
            match value.get("spec") {
                Some(spec_value) => match serde_json::from_value::<DashboardSpec>(
                    spec_value.clone(),
                ) {
                    Ok(spec) => ModelReply::Dashboard {
                        spec: Box::new(spec),
                        message,
                    },
                    Err(e) => {
                        debug!(error = %e, "dashboard spec failed to deserialize");
                        ModelReply::Insight(content.trim().to_string())
                    }
                },
                None => ModelReply::Insight(content.trim().to_string()),
            }
        }
        Some("clarification") => {
            let question = value
                .get("question")
                .and_then(Value::as_str)
                .unwrap_or("Could you say more about what you want to see?")
                .to_string();
            ModelReply::Clarification(question)
        }
        Some("insight") => {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| content.trim().to_string());
            ModelReply::Insight(message)
        }
        _ => ModelReply::Insight(content.trim().to_string()),
    }
}

/// Prefers a fenced ```json block, then falls back to the first balanced
/// top-level object anywhere in the text.
fn extract_json(content: &str) -> Option<String> {
    if let Some(start) = content.find("```json") {
        if let Some(end) = content[start + 7..].find("```") {
            let block = content[start + 7..start + 7 + end].trim();
            if serde_json::from_str::<Value>(block).is_ok() {
                return Some(block.to_string());
            }
        }
    }

    let start_pos = content.find('{')?;
    let mut brace_count = 0;
    let mut in_string = false;
    let mut escape_next = false;
    for (i, ch) in content[start_pos..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '"' => in_string = !in_string,
            '\\' if in_string => escape_next = true,
            '{' if !in_string => brace_count += 1,
            '}' if !in_string => {
                brace_count -= 1;
                if brace_count == 0 {
                    let candidate = &content[start_pos..start_pos + i + 1];
                    if serde_json::from_str::<Value>(candidate).is_ok() {
                        return Some(candidate.to_string());
                    }
                    break;
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_dashboard_reply_parses() {
        let content = r#"Here you go.
```json
{
  "kind": "dashboard",
  "message": "A bar chart of sales per region.",
  "spec": {
    "charts": [
      {"kind": "bar", "x": "region", "y": "sales", "aggregation": "sum", "title": "Sales by region"}
    ],
    "kpis": [
      {"column": "sales", "aggregation": "sum", "label": "Total sales"}
    ],
    "analysis_summary": {"approach": "comparison", "reasoning": ["region is low cardinality"]}
  }
}
```"#;
        match interpret_response(content) {
            ModelReply::Dashboard { spec, message } => {
                assert_eq!(spec.charts.len(), 1);
                assert_eq!(spec.kpis.len(), 1);
                assert!(message.contains("bar chart"));
            }
            other => panic!("expected dashboard, got {other:?}"),
        }
    }

    #[test]
    fn clarification_reply_carries_question() {
        let content = r#"```json
{"kind": "clarification", "question": "Which column holds the revenue?"}
```"#;
        assert_eq!(
            interpret_response(content),
            ModelReply::Clarification("Which column holds the revenue?".to_string())
        );
    }

    #[test]
    fn bare_object_without_fence_still_parses() {
        let content = r#"Sure: {"kind": "insight", "message": "Sales peak in March."} hope that helps"#;
        assert_eq!(
            interpret_response(content),
            ModelReply::Insight("Sales peak in March.".to_string())
        );
    }

    #[test]
    fn unstructured_text_degrades_to_insight() {
        let content = "The data shows a clear upward trend in Q3.";
        assert_eq!(
            interpret_response(content),
            ModelReply::Insight(content.to_string())
        );
    }

    #[test]
    fn malformed_spec_degrades_to_insight() {
        let content = r#"```json
{"kind": "dashboard", "spec": {"charts": "not-a-list"}}
```"#;
        assert!(matches!(
            interpret_response(content),
            ModelReply::Insight(_)
        ));
    }

    #[test]
    fn unknown_kind_degrades_to_insight() {
        let content = r#"{"kind": "surprise", "message": "hello"}"#;
        assert!(matches!(
            interpret_response(content),
            ModelReply::Insight(_)
        ));
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_extraction() {
        let content = r#"{"kind": "insight", "message": "use {column} syntax"}"#;
        assert_eq!(
            interpret_response(content),
            ModelReply::Insight("use {column} syntax".to_string())
        );
    }
}
