//! Typed field patches for each mutable entity.
//!
//! The first key of a mutation path selects a field. Known fields are
//! type-checked here (a status must parse as a status, text must be a
//! string); schemaless fields and unknown keys fall through to the generic
//! walk in [`crate::path`]. Identity and structural fields are refused so a
//! mutation can never break list order or tree shape.

use serde::de::DeserializeOwned;
use serde_json::Value;

use nbsync_types::{Block, Conversation, ConversationMessage, FieldMutation, PlanStep};

use crate::error::{PatchError, Result};
use crate::path::{Assignment, assign_in_map, assign_path};

/// An entity that accepts [`FieldMutation`]s.
pub trait Patchable {
    /// Apply one mutation. On error the entity is unchanged.
    fn apply_mutation(&mut self, mutation: &FieldMutation) -> Result<()>;
}

impl Patchable for Block {
    fn apply_mutation(&mut self, mutation: &FieldMutation) -> Result<()> {
        let assign = Assignment::from_mutation(mutation)?;
        let full = mutation.path_display();
        let (field, rest) = split(&mutation.path)?;
        match field {
            "uuid" | "document_id" | "block_above_uuid" => immutable(field),
            "block_type" => typed_value(&mut self.block_type, field, rest, &full, assign),
            "last_modified_at" => typed_value(&mut self.last_modified_at, field, rest, &full, assign),
            "content" => assign_path(&mut self.content, rest, &full, assign),
            _ => assign_in_map(&mut self.extra, &mutation.path, &full, assign),
        }
    }
}

impl Patchable for ConversationMessage {
    fn apply_mutation(&mut self, mutation: &FieldMutation) -> Result<()> {
        let assign = Assignment::from_mutation(mutation)?;
        let full = mutation.path_display();
        let (field, rest) = split(&mutation.path)?;
        match field {
            "uuid" | "conversation_id" => immutable(field),
            "created_at" => typed_value(&mut self.created_at, field, rest, &full, assign),
            "status" => typed_value(&mut self.status, field, rest, &full, assign),
            "role" => typed_value(&mut self.role, field, rest, &full, assign),
            "content" => typed_string(&mut self.content, field, rest, &full, assign),
            "payload" => assign_path(&mut self.payload, rest, &full, assign),
            _ => assign_in_map(&mut self.extra, &mutation.path, &full, assign),
        }
    }
}

impl Patchable for Conversation {
    fn apply_mutation(&mut self, mutation: &FieldMutation) -> Result<()> {
        let assign = Assignment::from_mutation(mutation)?;
        let full = mutation.path_display();
        let (field, rest) = split(&mutation.path)?;
        match field {
            "id" => immutable(field),
            "title" => typed_string(&mut self.title, field, rest, &full, assign),
            "status" => optional_string(&mut self.status, field, rest, &full, assign),
            _ => assign_in_map(&mut self.extra, &mutation.path, &full, assign),
        }
    }
}

impl Patchable for PlanStep {
    fn apply_mutation(&mut self, mutation: &FieldMutation) -> Result<()> {
        let assign = Assignment::from_mutation(mutation)?;
        let full = mutation.path_display();
        let (field, rest) = split(&mutation.path)?;
        match field {
            "uuid" | "parent_step_uuid" | "sub_steps" => immutable(field),
            "title" => typed_string(&mut self.title, field, rest, &full, assign),
            "status" => typed_value(&mut self.status, field, rest, &full, assign),
            "content" => assign_path(&mut self.content, rest, &full, assign),
            _ => assign_in_map(&mut self.extra, &mutation.path, &full, assign),
        }
    }
}

// ── Field helpers ───────────────────────────────────────────────────────────

fn split(path: &[String]) -> Result<(&str, &[String])> {
    path.split_first()
        .map(|(f, rest)| (f.as_str(), rest))
        .ok_or(PatchError::EmptyPath)
}

fn immutable(field: &str) -> Result<()> {
    Err(PatchError::ImmutableField {
        field: field.to_string(),
    })
}

fn scalar_only(field: &str, rest: &[String], full: &str) -> Result<()> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(PatchError::NotAContainer {
            path: full.to_string(),
            at: field.to_string(),
        })
    }
}

fn typed_string(
    slot: &mut String,
    field: &str,
    rest: &[String],
    full: &str,
    assign: Assignment<'_>,
) -> Result<()> {
    scalar_only(field, rest, full)?;
    match assign {
        Assignment::Replace(Value::String(s)) => {
            *slot = s.clone();
            Ok(())
        }
        Assignment::Replace(other) => Err(PatchError::InvalidValue {
            field: field.to_string(),
            reason: format!("expected string, got {}", kind_of(other)),
        }),
        Assignment::Append(fragment) => {
            slot.push_str(fragment);
            Ok(())
        }
    }
}

fn optional_string(
    slot: &mut Option<String>,
    field: &str,
    rest: &[String],
    full: &str,
    assign: Assignment<'_>,
) -> Result<()> {
    scalar_only(field, rest, full)?;
    match assign {
        Assignment::Replace(Value::Null) => {
            *slot = None;
            Ok(())
        }
        Assignment::Replace(Value::String(s)) => {
            *slot = Some(s.clone());
            Ok(())
        }
        Assignment::Replace(other) => Err(PatchError::InvalidValue {
            field: field.to_string(),
            reason: format!("expected string or null, got {}", kind_of(other)),
        }),
        Assignment::Append(fragment) => match slot {
            Some(s) => {
                s.push_str(fragment);
                Ok(())
            }
            None => Err(PatchError::NotAString {
                path: full.to_string(),
            }),
        },
    }
}

/// Replace a typed, non-string field by deserializing the new value.
fn typed_value<T: DeserializeOwned>(
    slot: &mut T,
    field: &str,
    rest: &[String],
    full: &str,
    assign: Assignment<'_>,
) -> Result<()> {
    scalar_only(field, rest, full)?;
    match assign {
        Assignment::Replace(v) => {
            *slot = T::deserialize(v).map_err(|e| PatchError::InvalidValue {
                field: field.to_string(),
                reason: e.to_string(),
            })?;
            Ok(())
        }
        Assignment::Append(_) => Err(PatchError::NotAString {
            path: full.to_string(),
        }),
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
