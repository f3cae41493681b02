//! Content blocks: the ordered units of a document.
//!
//! Blocks form a singly linked list through `block_above_uuid`: the head has
//! no predecessor, every other block points at the block rendered directly
//! above it. [`Document`](crate::Document) keeps its blocks in that order and
//! can rebuild it from an unordered set.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::EnumString;

use crate::ids::{BlockId, DocumentId};

/// What a block *is*.
///
/// Deliberately closed. Anything the backend adds later deserializes as
/// [`BlockType::Other`] so a newer server never breaks an older client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive, serialize_all = "snake_case")]
pub enum BlockType {
    /// Rich text paragraph.
    #[default]
    Text,
    /// Markdown source.
    Markdown,
    /// Executable code cell.
    Code,
    /// SQL query cell.
    Sql,
    /// Tabular result view.
    Table,
    /// Chart / visualization.
    Chart,
    /// Embedded image.
    Image,
    /// Unknown to this client.
    #[serde(other)]
    Other,
}

impl BlockType {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Text => "text",
            BlockType::Markdown => "markdown",
            BlockType::Code => "code",
            BlockType::Sql => "sql",
            BlockType::Table => "table",
            BlockType::Chart => "chart",
            BlockType::Image => "image",
            BlockType::Other => "other",
        }
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single content unit within a document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub uuid: BlockId,
    pub document_id: DocumentId,
    /// Predecessor in document order. `None` = head of the list.
    #[serde(default)]
    pub block_above_uuid: Option<BlockId>,
    #[serde(default)]
    pub block_type: BlockType,
    /// Typed payload (source text, cell output, chart options …). Free-form.
    #[serde(default)]
    pub content: Value,
    /// Unix millis of the last local or remote mutation.
    #[serde(default)]
    pub last_modified_at: u64,
    /// Fields this client doesn't model, kept so round-trips are lossless.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Block {
    /// Create a block with empty content.
    pub fn new(
        uuid: BlockId,
        document_id: DocumentId,
        block_above_uuid: Option<BlockId>,
        block_type: BlockType,
    ) -> Self {
        Self {
            uuid,
            document_id,
            block_above_uuid,
            block_type,
            content: Value::Object(Map::new()),
            last_modified_at: 0,
            extra: Map::new(),
        }
    }

    /// Builder: set the content payload.
    pub fn with_content(mut self, content: Value) -> Self {
        self.content = content;
        self
    }

    /// Whether this block is the head of its list.
    pub fn is_head(&self) -> bool {
        self.block_above_uuid.is_none()
    }
}
