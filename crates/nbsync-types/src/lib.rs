//! Shared identity, document model, and wire types for nbsync.
//!
//! This crate is the leaf of the workspace: typed ids, the entities the
//! reconciler mutates, the change-operation enum, and the message envelopes
//! exchanged over the persistent connection. It has **no internal nbsync
//! dependencies**.
//!
//! # Entity Overview
//!
//! ```text
//! Document (DocumentId) ← notebook / project
//!     └── owns Blocks (BlockId), ordered by block_above_uuid links
//!     └── listed in paginated Document listings (denormalized copy)
//!
//! Conversation (ConversationId)
//!     └── owns paginated ConversationMessages (MessageId)
//!     └── owns one Plan → PlanSteps (PlanStepId), nested one level
//!
//! BatchTable (BatchTableId) ← tabular batch-data feed, subscription only
//! ```

pub mod ids;
pub mod block;
pub mod conversation;
pub mod document;
pub mod ops;
pub mod page;
pub mod plan;
pub mod wire;

// Re-export primary types at crate root for convenience.
pub use ids::{BatchTableId, BlockId, ConversationId, DocumentId, MessageId, PlanStepId, TopicId};
pub use block::{Block, BlockType};
pub use conversation::{Conversation, ConversationMessage, MessageRole, MessageStatus};
pub use document::{Document, LinkError};
pub use ops::{FieldMutation, PatchBatch, PatchOp};
pub use page::{Page, Paginated};
pub use plan::{Plan, PlanStep, StepStatus};
pub use wire::{InboundMessage, OutboundMessage, Topic};

/// Current time as Unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
