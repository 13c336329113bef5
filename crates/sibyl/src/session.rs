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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera::{DashboardSpec, Dataset};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One chat turn. Messages are appended and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The agent's memory for one UI session: the chat history, the active
/// dataset, the active dashboard plan, and the clarification the agent is
/// waiting on. At most one dataset and one dashboard are active at a
/// time; both are replaced wholesale, never merged.
pub struct AnalystSession {
    pub id: Uuid,
    history: Vec<ChatMessage>,
    dataset: Option<Arc<Dataset>>,
    dashboard: Option<DashboardSpec>,
    pending_clarification: Option<String>,
    assumptions: Vec<String>,
}

impl AnalystSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            history: Vec::new(),
            dataset: None,
            dashboard: None,
            pending_clarification: None,
            assumptions: Vec::new(),
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::assistant(content));
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Replaces the active dataset wholesale. The previous dashboard and
    /// any pending clarification refer to the old schema, so both are
    /// dropped.
    pub fn attach_dataset(&mut self, dataset: Dataset) {
        self.dataset = Some(Arc::new(dataset));
        self.dashboard = None;
        self.pending_clarification = None;
    }

    pub fn dataset(&self) -> Option<&Arc<Dataset>> {
        self.dataset.as_ref()
    }

    pub fn set_dashboard(&mut self, spec: DashboardSpec) {
        self.dashboard = Some(spec);
    }

    pub fn dashboard(&self) -> Option<&DashboardSpec> {
        self.dashboard.as_ref()
    }

    pub fn set_pending_clarification(&mut self, question: impl Into<String>) {
        self.pending_clarification = Some(question.into());
    }

    pub fn take_pending_clarification(&mut self) -> Option<String> {
        self.pending_clarification.take()
    }

    pub fn awaiting_clarification(&self) -> bool {
        self.pending_clarification.is_some()
    }

    pub fn record_assumption(&mut self, assumption: impl Into<String>) {
        self.assumptions.push(assumption.into());
    }

    pub fn assumptions(&self) -> &[String] {
        &self.assumptions
    }
}

impl Default for AnalystSession {
    fn default() -> Self {
        Self::new()
    }
}
