//! Change operations pushed by the backend.
//!
//! Operations arrive in ordered batches scoped to a document and/or a
//! conversation. Each operation is decoded on its own: a kind this client
//! doesn't know (or a malformed one) must not poison the rest of the batch.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::block::Block;
use crate::conversation::ConversationMessage;
use crate::ids::{BlockId, ConversationId, DocumentId, MessageId, PlanStepId};
use crate::plan::PlanStep;

/// A nested-path field mutation.
///
/// Walks `path` from the entity root, creating intermediate objects as needed,
/// then replaces the final key with `value`. When `incremental`, it appends
/// the string `value` to the existing string at that key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldMutation {
    pub path: Vec<String>,
    pub value: Value,
    #[serde(default)]
    pub incremental: bool,
}

impl FieldMutation {
    /// Whole-value replacement.
    pub fn replace<P: Into<String>>(path: impl IntoIterator<Item = P>, value: Value) -> Self {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            value,
            incremental: false,
        }
    }

    /// Streamed-text append.
    pub fn append<P: Into<String>>(
        path: impl IntoIterator<Item = P>,
        fragment: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            value: Value::String(fragment.into()),
            incremental: true,
        }
    }

    /// Dotted path for logging.
    pub fn path_display(&self) -> String {
        self.path.join(".")
    }
}

/// One change operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatchOp {
    /// Insert (or upsert) a block below `block.block_above_uuid`.
    CreateBlock { block: Block },
    DeleteBlock { uuid: BlockId },
    UpdateBlock { uuid: BlockId, mutation: FieldMutation },
    CreateBotConversationMessage { message: ConversationMessage },
    UpdateBotConversationMessage { uuid: MessageId, mutation: FieldMutation },
    DeleteBotConversationMessage { uuid: MessageId },
    UpdateBotConversation { mutation: FieldMutation },
    CreatePlanStep { step: PlanStep },
    UpdatePlanStep { uuid: PlanStepId, mutation: FieldMutation },
    /// Rewrite one top-level key of the document's metadata.
    UpdateProject { key: String, value: Value },
}

impl PatchOp {
    /// Wire name of this operation kind.
    pub fn kind(&self) -> &'static str {
        match self {
            PatchOp::CreateBlock { .. } => "create_block",
            PatchOp::DeleteBlock { .. } => "delete_block",
            PatchOp::UpdateBlock { .. } => "update_block",
            PatchOp::CreateBotConversationMessage { .. } => "create_bot_conversation_message",
            PatchOp::UpdateBotConversationMessage { .. } => "update_bot_conversation_message",
            PatchOp::DeleteBotConversationMessage { .. } => "delete_bot_conversation_message",
            PatchOp::UpdateBotConversation { .. } => "update_bot_conversation",
            PatchOp::CreatePlanStep { .. } => "create_plan_step",
            PatchOp::UpdatePlanStep { .. } => "update_plan_step",
            PatchOp::UpdateProject { .. } => "update_project",
        }
    }

    /// Check if this operation targets a document's blocks or metadata.
    pub fn is_document_op(&self) -> bool {
        matches!(
            self,
            PatchOp::CreateBlock { .. }
                | PatchOp::DeleteBlock { .. }
                | PatchOp::UpdateBlock { .. }
                | PatchOp::UpdateProject { .. }
        )
    }

    /// Check if this operation touches conversation messages.
    pub fn is_message_op(&self) -> bool {
        matches!(
            self,
            PatchOp::CreateBotConversationMessage { .. }
                | PatchOp::UpdateBotConversationMessage { .. }
                | PatchOp::DeleteBotConversationMessage { .. }
        )
    }

    /// Check if this operation touches the conversation's plan.
    pub fn is_plan_op(&self) -> bool {
        matches!(self, PatchOp::CreatePlanStep { .. } | PatchOp::UpdatePlanStep { .. })
    }
}

/// Why a raw operation couldn't be decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeFailure {
    /// The `type` tag names an operation this client doesn't know.
    UnknownKind(String),
    /// Known kind (or no tag at all) but the body didn't match.
    Malformed { kind: Option<String>, reason: String },
}

const KNOWN_KINDS: &[&str] = &[
    "create_block",
    "delete_block",
    "update_block",
    "create_bot_conversation_message",
    "update_bot_conversation_message",
    "delete_bot_conversation_message",
    "update_bot_conversation",
    "create_plan_step",
    "update_plan_step",
    "update_project",
];

/// An inbound batch of operations, routed by id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchBatch {
    #[serde(default)]
    pub document_id: Option<DocumentId>,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    /// Raw operations, decoded one at a time by [`PatchBatch::decode`].
    #[serde(default)]
    pub operations: Vec<Value>,
}

impl PatchBatch {
    /// Build a batch from typed operations.
    pub fn from_ops(
        document_id: Option<DocumentId>,
        conversation_id: Option<ConversationId>,
        ops: &[PatchOp],
    ) -> Self {
        let operations = ops
            .iter()
            .filter_map(|op| serde_json::to_value(op).ok())
            .collect();
        Self {
            document_id,
            conversation_id,
            operations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Decode every operation, keeping array order.
    pub fn decode(&self) -> Vec<Result<PatchOp, DecodeFailure>> {
        self.operations.iter().map(decode_op).collect()
    }
}

/// Decode a single raw operation.
pub fn decode_op(raw: &Value) -> Result<PatchOp, DecodeFailure> {
    let kind = raw.get("type").and_then(Value::as_str).map(str::to_owned);
    if let Some(k) = kind.as_deref() {
        if !KNOWN_KINDS.contains(&k) {
            return Err(DecodeFailure::UnknownKind(k.to_owned()));
        }
    }
    serde_json::from_value(raw.clone()).map_err(|e| DecodeFailure::Malformed {
        kind,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_update_block() {
        let raw = json!({
            "type": "update_block",
            "uuid": "8f14e45f-ceea-4e7a-9f5c-2b8d7a7c1d11",
            "mutation": {"path": ["content", "source"], "value": "x", "incremental": true}
        });
        let op = decode_op(&raw).unwrap();
        assert_eq!(op.kind(), "update_block");
        match op {
            PatchOp::UpdateBlock { mutation, .. } => {
                assert!(mutation.incremental);
                assert_eq!(mutation.path_display(), "content.source");
            }
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn test_decode_unknown_kind() {
        let raw = json!({"type": "create_dashboard_widget", "id": 1});
        assert_eq!(
            decode_op(&raw),
            Err(DecodeFailure::UnknownKind("create_dashboard_widget".into()))
        );
    }

    #[test]
    fn test_decode_malformed_known_kind() {
        let raw = json!({"type": "delete_block", "uuid": 12});
        assert!(matches!(
            decode_op(&raw),
            Err(DecodeFailure::Malformed { kind: Some(k), .. }) if k == "delete_block"
        ));
    }

    #[test]
    fn test_known_kinds_match_serialized_tags() {
        let ops = [
            PatchOp::DeleteBlock { uuid: BlockId::new() },
            PatchOp::DeleteBotConversationMessage { uuid: MessageId::new() },
            PatchOp::UpdateProject { key: "name".into(), value: json!("x") },
        ];
        for op in ops {
            let v = serde_json::to_value(&op).unwrap();
            assert_eq!(v["type"], json!(op.kind()));
            assert!(KNOWN_KINDS.contains(&op.kind()));
        }
    }

    #[test]
    fn test_batch_from_ops_preserves_order() {
        let a = BlockId::new();
        let b = BlockId::new();
        let batch = PatchBatch::from_ops(
            Some(DocumentId(1)),
            None,
            &[PatchOp::DeleteBlock { uuid: a }, PatchOp::DeleteBlock { uuid: b }],
        );
        let decoded: Vec<_> = batch.decode().into_iter().map(Result::unwrap).collect();
        assert_eq!(
            decoded,
            vec![PatchOp::DeleteBlock { uuid: a }, PatchOp::DeleteBlock { uuid: b }]
        );
    }
}
