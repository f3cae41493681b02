//! Typed identifiers for entities and subscription topics.
//!
//! Entity ids (`BlockId`, `MessageId`, `PlanStepId`) wrap UUIDs assigned by the
//! backend or by local optimistic writes (v4). They're plain UUID text on the
//! wire and display as `short()` (first 8 hex chars) in debug output.
//!
//! Topic ids (`DocumentId`, `ConversationId`, `BatchTableId`) are the numeric
//! primary keys the backend uses for subscription channels. They usually arrive
//! as raw route parameters, so [`TopicId::parse`] is the single place that
//! decides whether a raw value names a valid target.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A content block identifier.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(uuid::Uuid);

/// A conversation message identifier.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(uuid::Uuid);

/// A plan step identifier.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanStepId(uuid::Uuid);

// ── Entity ids ──────────────────────────────────────────────────────────────

macro_rules! impl_entity_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Create a new random ID (UUIDv4), as used for optimistic local writes.
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// First 8 hex characters, for display only.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s).map(Self)
            }

            /// The wrapped UUID.
            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_entity_id!(BlockId, "BlockId");
impl_entity_id!(MessageId, "MessageId");
impl_entity_id!(PlanStepId, "PlanStepId");

// ── Topic ids ───────────────────────────────────────────────────────────────

/// A document (notebook / project) identifier.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

/// A conversation identifier.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub u64);

/// A tabular batch-data feed identifier.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchTableId(pub u64);

/// Common behavior for numeric topic ids.
pub trait TopicId: Copy + Eq + fmt::Debug + From<u64> {
    /// The raw numeric id.
    fn get(&self) -> u64;

    /// Validate a raw route parameter.
    ///
    /// Absent, empty, or non-numeric input is not a valid target and yields
    /// `None`. Surrounding whitespace is tolerated.
    fn parse(raw: Option<&str>) -> Option<Self> {
        raw.map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Self::from)
    }
}

macro_rules! impl_topic_id {
    ($T:ident) => {
        impl TopicId for $T {
            fn get(&self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $T {
            fn from(v: u64) -> Self {
                Self(v)
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

impl_topic_id!(DocumentId);
impl_topic_id!(ConversationId);
impl_topic_id!(BatchTableId);
