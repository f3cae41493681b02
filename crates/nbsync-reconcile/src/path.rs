//! Nested key-path mutation over free-form JSON values.
//!
//! Used for the parts of an entity that are schemaless (`content`, `payload`,
//! unknown top-level fields). Typed fields go through [`crate::fields`] instead.
//!
//! Walk rules:
//! - missing or `null` intermediates become empty objects;
//! - arrays are indexed by a numeric key that must be in range;
//! - anything else in the middle of the path is [`PatchError::NotAContainer`].
//!
//! A failed mutation never leaves partial writes behind: errors on the walk
//! are found before anything is created, and appends are checked read-only
//! before the walk starts.

use serde_json::{Map, Value};

use nbsync_types::FieldMutation;

use crate::error::{PatchError, Result};

/// What to do at the final key.
#[derive(Debug, Clone, Copy)]
pub enum Assignment<'a> {
    Replace(&'a Value),
    Append(&'a str),
}

impl<'a> Assignment<'a> {
    /// Interpret a wire mutation.
    pub fn from_mutation(mutation: &'a FieldMutation) -> Result<Self> {
        if mutation.path.is_empty() {
            return Err(PatchError::EmptyPath);
        }
        if mutation.incremental {
            match mutation.value.as_str() {
                Some(fragment) => Ok(Assignment::Append(fragment)),
                None => Err(PatchError::FragmentNotAString {
                    path: mutation.path_display(),
                }),
            }
        } else {
            Ok(Assignment::Replace(&mutation.value))
        }
    }
}

/// Apply `assign` at `path` below `root`.
///
/// `full_path` is only used for error messages (it may include a prefix that
/// was consumed before reaching `root`).
pub fn assign_path(
    root: &mut Value,
    path: &[String],
    full_path: &str,
    assign: Assignment<'_>,
) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        return assign_leaf(root, full_path, assign);
    };

    if let Assignment::Append(_) = assign {
        check_append_target(root, path, full_path)?;
    }

    let mut cursor = root;
    let mut walked: Vec<&str> = Vec::with_capacity(path.len());
    for key in parents {
        cursor = descend_mut(cursor, key, &walked, full_path)?;
        walked.push(key);
    }

    match cursor {
        Value::Object(map) => match assign {
            Assignment::Replace(v) => {
                map.insert(last.clone(), v.clone());
                Ok(())
            }
            Assignment::Append(fragment) => match map.get_mut(last.as_str()) {
                Some(Value::String(s)) => {
                    s.push_str(fragment);
                    Ok(())
                }
                _ => Err(PatchError::NotAString {
                    path: full_path.to_string(),
                }),
            },
        },
        Value::Array(items) => {
            let len = items.len();
            let slot = last
                .parse::<usize>()
                .ok()
                .filter(|i| *i < len)
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| PatchError::BadIndex {
                    path: full_path.to_string(),
                    at: walked.join("."),
                    key: last.clone(),
                })?;
            assign_leaf(slot, full_path, assign)
        }
        // `descend_mut` only yields containers; a scalar root with a
        // single-key path ends up here.
        _ => Err(PatchError::NotAContainer {
            path: full_path.to_string(),
            at: walked.join("."),
        }),
    }
}

/// Apply `assign` directly to `slot`.
pub fn assign_leaf(slot: &mut Value, full_path: &str, assign: Assignment<'_>) -> Result<()> {
    match assign {
        Assignment::Replace(v) => {
            *slot = v.clone();
            Ok(())
        }
        Assignment::Append(fragment) => match slot {
            Value::String(s) => {
                s.push_str(fragment);
                Ok(())
            }
            _ => Err(PatchError::NotAString {
                path: full_path.to_string(),
            }),
        },
    }
}

/// Apply `assign` at `path` inside a JSON object map (entity `extra` fields).
pub fn assign_in_map(
    map: &mut Map<String, Value>,
    path: &[String],
    full_path: &str,
    assign: Assignment<'_>,
) -> Result<()> {
    let mut root = Value::Object(std::mem::take(map));
    let result = assign_path(&mut root, path, full_path, assign);
    if let Value::Object(m) = root {
        *map = m;
    }
    result
}

fn descend_mut<'v>(
    cursor: &'v mut Value,
    key: &str,
    walked: &[&str],
    full_path: &str,
) -> Result<&'v mut Value> {
    match cursor {
        Value::Object(map) => {
            let child = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if child.is_null() {
                *child = Value::Object(Map::new());
            }
            ensure_container(child, key, walked, full_path)?;
            Ok(child)
        }
        Value::Array(items) => {
            let len = items.len();
            let child = key
                .parse::<usize>()
                .ok()
                .filter(|i| *i < len)
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| PatchError::BadIndex {
                    path: full_path.to_string(),
                    at: walked.join("."),
                    key: key.to_string(),
                })?;
            if child.is_null() {
                *child = Value::Object(Map::new());
            }
            ensure_container(child, key, walked, full_path)?;
            Ok(child)
        }
        _ => Err(PatchError::NotAContainer {
            path: full_path.to_string(),
            at: walked.join("."),
        }),
    }
}

fn ensure_container(child: &Value, key: &str, walked: &[&str], full_path: &str) -> Result<()> {
    if child.is_object() || child.is_array() {
        return Ok(());
    }
    let mut at = walked.to_vec();
    at.push(key);
    Err(PatchError::NotAContainer {
        path: full_path.to_string(),
        at: at.join("."),
    })
}

/// Read-only check that `path` already leads to a string.
fn check_append_target(root: &Value, path: &[String], full_path: &str) -> Result<()> {
    let mut cursor = root;
    for key in path {
        let next = match cursor {
            Value::Object(map) => map.get(key.as_str()),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(v) => cursor = v,
            None => {
                return Err(PatchError::NotAString {
                    path: full_path.to_string(),
                });
            }
        }
    }
    if cursor.is_string() {
        Ok(())
    } else {
        Err(PatchError::NotAString {
            path: full_path.to_string(),
        })
    }
}
