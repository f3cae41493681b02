//! Project metadata updates.
//!
//! Project fields are denormalized: the document carries them in `metadata`
//! and every cached document listing carries a summary entry with the same
//! keys. An update writes one value to both places.

use std::sync::Arc;

use serde_json::{Map, Value};

use nbsync_types::{Document, DocumentId, Page};

/// One entry of a document listing page.
pub type DocumentSummary = Map<String, Value>;

/// Set `key` on the document's metadata.
pub fn update_metadata(doc: &mut Document, key: &str, value: &Value) {
    doc.metadata.insert(key.to_string(), value.clone());
}

/// Set `key` on every entry of `page` that describes document `id`.
///
/// Entries are matched by their numeric `"id"` field. Returns how many
/// entries were rewritten; untouched entries stay shared.
pub fn update_listing(page: &mut Page<DocumentSummary>, id: DocumentId, key: &str, value: &Value) -> usize {
    let mut rewritten = 0;
    for entry in page.results.iter_mut() {
        if entry.get("id").and_then(Value::as_u64) == Some(id.0) {
            Arc::make_mut(entry).insert(key.to_string(), value.clone());
            rewritten += 1;
        }
    }
    rewritten
}
