//! Conversations with the assistant and the messages inside them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::EnumString;

use crate::ids::{ConversationId, MessageId};

/// Lifecycle of a single message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive, serialize_all = "snake_case")]
pub enum MessageStatus {
    /// Created, no content yet.
    #[default]
    Pending,
    /// Content is arriving as append fragments.
    Streaming,
    /// Final content received.
    #[serde(alias = "completed", alias = "done")]
    #[strum(serialize = "complete", serialize = "completed", serialize = "done")]
    Complete,
    /// Generation failed.
    Error,
    /// Stopped by the user.
    Cancelled,
    /// Unknown to this client.
    #[serde(other)]
    Other,
}

impl MessageStatus {
    /// Check if no further content is expected.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MessageStatus::Complete | MessageStatus::Error | MessageStatus::Cancelled
        )
    }
}

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    #[default]
    User,
    Assistant,
    System,
    #[serde(other)]
    Other,
}

/// One message in a conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub uuid: MessageId,
    pub conversation_id: ConversationId,
    /// Unix millis. Pages are kept sorted ascending by this field.
    pub created_at: u64,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default)]
    pub role: MessageRole,
    /// Rendered text; grows by incremental append while streaming.
    #[serde(default)]
    pub content: String,
    /// Structured attachments (tool calls, citations, …). Free-form.
    #[serde(default)]
    pub payload: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConversationMessage {
    pub fn new(uuid: MessageId, conversation_id: ConversationId, created_at: u64) -> Self {
        Self {
            uuid,
            conversation_id,
            created_at,
            status: MessageStatus::Pending,
            role: MessageRole::Assistant,
            content: String::new(),
            payload: Value::Object(Map::new()),
            extra: Map::new(),
        }
    }

    /// Builder: set the text content.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Builder: set the role.
    pub fn with_role(mut self, role: MessageRole) -> Self {
        self.role = role;
        self
    }
}

/// Conversation-level metadata (title, status, …).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Conversation {
    pub fn new(id: ConversationId) -> Self {
        Self {
            id,
            title: String::new(),
            status: None,
            extra: Map::new(),
        }
    }
}
