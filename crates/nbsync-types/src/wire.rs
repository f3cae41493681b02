//! Message envelopes for the persistent connection.
//!
//! Outbound: every message carries a type, a correlation request id, the
//! client-tab identity, and a timestamp. Sends are fire-and-forget; the only
//! replies the client relies on are the `subscribed-to-*` confirmations.
//!
//! Inbound: subscription confirmations plus change-operation batches.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{BatchTableId, ConversationId, DocumentId};
use crate::ops::PatchBatch;

/// Outbound topic messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message_type", content = "payload", rename_all = "snake_case")]
pub enum Topic {
    Authenticate { token: String },
    SubscribeDocument { id: DocumentId },
    UnsubscribeDocument { id: DocumentId },
    SubscribeConversation { id: ConversationId },
    UnsubscribeConversation { id: ConversationId },
    SubscribeBatchTable { id: BatchTableId },
    UnsubscribeBatchTable { id: BatchTableId },
    StopStreaming { stream_id: String },
}

impl Topic {
    /// Wire name of this message type.
    pub fn message_type(&self) -> &'static str {
        match self {
            Topic::Authenticate { .. } => "authenticate",
            Topic::SubscribeDocument { .. } => "subscribe_document",
            Topic::UnsubscribeDocument { .. } => "unsubscribe_document",
            Topic::SubscribeConversation { .. } => "subscribe_conversation",
            Topic::UnsubscribeConversation { .. } => "unsubscribe_conversation",
            Topic::SubscribeBatchTable { .. } => "subscribe_batch_table",
            Topic::UnsubscribeBatchTable { .. } => "unsubscribe_batch_table",
            Topic::StopStreaming { .. } => "stop_streaming",
        }
    }
}

/// A topic wrapped with correlation metadata, ready for the transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(flatten)]
    pub topic: Topic,
    pub request_id: Uuid,
    pub client_tab_id: String,
    /// Unix millis at envelope creation.
    pub timestamp: u64,
}

impl OutboundMessage {
    /// Wrap a topic with a fresh request id and the current time.
    pub fn new(topic: Topic, client_tab_id: impl Into<String>) -> Self {
        Self {
            topic,
            request_id: Uuid::new_v4(),
            client_tab_id: client_tab_id.into(),
            timestamp: crate::now_millis(),
        }
    }

    /// Serialize for a text transport.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Messages pushed by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "kebab-case")]
pub enum InboundMessage {
    SubscribedToDocument { id: DocumentId },
    SubscribedToConversation { id: ConversationId },
    SubscribedToBatchTable { id: BatchTableId },
    /// A batch of change operations.
    Patch(PatchBatch),
    /// Anything else. Ignored by this layer.
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    /// Parse a text frame.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
