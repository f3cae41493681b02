//! Task plans attached to a conversation.
//!
//! A plan is a shallow tree: top-level steps may own sub-steps via
//! `parent_step_uuid`. Nesting deeper than one level is not produced by the
//! backend, and lookups by id only consider the top level.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::EnumString;

use crate::ids::{ConversationId, PlanStepId};

/// Execution status of a plan step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive, serialize_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    #[serde(alias = "running")]
    #[strum(serialize = "in_progress", serialize = "running")]
    InProgress,
    #[serde(alias = "complete", alias = "completed")]
    #[strum(serialize = "done", serialize = "complete", serialize = "completed")]
    Done,
    Failed,
    Skipped,
    #[serde(other)]
    Other,
}

/// One step of a plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub uuid: PlanStepId,
    #[serde(default)]
    pub parent_step_uuid: Option<PlanStepId>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub sub_steps: Vec<PlanStep>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlanStep {
    pub fn new(uuid: PlanStepId, title: impl Into<String>) -> Self {
        Self {
            uuid,
            parent_step_uuid: None,
            title: title.into(),
            status: StepStatus::Pending,
            content: Value::Null,
            sub_steps: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Builder: nest under `parent`.
    pub fn with_parent(mut self, parent: PlanStepId) -> Self {
        self.parent_step_uuid = Some(parent);
        self
    }
}

/// The plan for one conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub steps: Vec<Arc<PlanStep>>,
}

impl Plan {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            steps: Vec::new(),
        }
    }

    /// Find a top-level step.
    pub fn step(&self, id: &PlanStepId) -> Option<&PlanStep> {
        self.steps.iter().map(|s| s.as_ref()).find(|s| s.uuid == *id)
    }

    /// Total steps including nested ones.
    pub fn step_count(&self) -> usize {
        self.steps.iter().map(|s| 1 + s.sub_steps.len()).sum()
    }
}
