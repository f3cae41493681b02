//! Block list operations.
//!
//! A document keeps its blocks in linked-list order (see
//! [`Document`](nbsync_types::Document)). Every function here preserves that:
//! an insert re-points the block that used to follow the insertion point, a
//! delete splices its successor onto its own predecessor.
//!
//! Blocks are `Arc`-shared with the snapshot the document was cloned from;
//! only blocks that actually change are copied (`Arc::make_mut`).

use std::sync::Arc;

use nbsync_types::{Block, BlockId, Document, FieldMutation};
use tracing::{debug, trace};

use crate::error::{PatchError, Result};
use crate::fields::Patchable;

/// What a successful [`create_block`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockInsert {
    /// New block inserted at this index.
    Inserted { index: usize },
    /// Block with the same id already existed and was replaced in place.
    Replaced { index: usize },
}

/// Insert `block` below its declared predecessor.
///
/// - Same id already present → replace in place. The existing predecessor
///   pointer is kept so the list stays consistent.
/// - Predecessor `None` → becomes the head; the former head now points at it.
/// - Predecessor not in the document → [`PatchError::PredecessorNotFound`].
pub fn create_block(doc: &mut Document, mut block: Block) -> Result<BlockInsert> {
    if let Some(index) = doc.position(&block.uuid) {
        let existing = &doc.blocks[index];
        if existing.block_above_uuid != block.block_above_uuid {
            debug!(
                "create_block upsert {:?}: keeping predecessor {:?}, ignoring {:?}",
                block.uuid, existing.block_above_uuid, block.block_above_uuid
            );
            block.block_above_uuid = existing.block_above_uuid;
        }
        doc.blocks[index] = Arc::new(block);
        return Ok(BlockInsert::Replaced { index });
    }

    let index = match block.block_above_uuid {
        None => 0,
        Some(above) => match doc.position(&above) {
            Some(i) => i + 1,
            None => {
                return Err(PatchError::PredecessorNotFound {
                    block: block.uuid,
                    predecessor: above,
                });
            }
        },
    };

    // The follower is whoever points at the insertion point, wherever it sits.
    let follower = follower_of(doc, block.block_above_uuid).map(|i| i + usize::from(i >= index));
    let new_id = block.uuid;
    doc.blocks.insert(index, Arc::new(block));
    if let Some(next) = follower.and_then(|i| doc.blocks.get_mut(i)) {
        Arc::make_mut(next).block_above_uuid = Some(new_id);
    }
    trace!("inserted block {:?} at {}", new_id, index);
    Ok(BlockInsert::Inserted { index })
}

/// Remove a block and splice its successor onto its predecessor.
///
/// Returns the removed block, or `None` when the id isn't present.
pub fn delete_block(doc: &mut Document, id: &BlockId) -> Option<Arc<Block>> {
    let index = doc.position(id)?;
    let removed = doc.blocks.remove(index);
    if let Some(next) = follower_of(doc, Some(*id)).and_then(|i| doc.blocks.get_mut(i)) {
        Arc::make_mut(next).block_above_uuid = removed.block_above_uuid;
    }
    Some(removed)
}

/// Index of the block whose predecessor is `above`.
fn follower_of(doc: &Document, above: Option<BlockId>) -> Option<usize> {
    doc.blocks.iter().position(|b| b.block_above_uuid == above)
}

/// Apply a field mutation to one block and stamp `last_modified_at`.
///
/// Returns `Ok(false)` when the block isn't present.
pub fn update_block(
    doc: &mut Document,
    id: &BlockId,
    mutation: &FieldMutation,
    now: u64,
) -> Result<bool> {
    let Some(index) = doc.position(id) else {
        return Ok(false);
    };

    // Mutate a scratch copy so a failed mutation leaves the shared block
    // (and its Arc identity) untouched.
    let mut updated = Block::clone(&doc.blocks[index]);
    updated.apply_mutation(mutation)?;
    updated.last_modified_at = now;
    doc.blocks[index] = Arc::new(updated);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbsync_types::{BlockType, DocumentId};
    use serde_json::json;

    fn doc() -> Document {
        Document::new(DocumentId(1))
    }

    fn block(id: BlockId, above: Option<BlockId>) -> Block {
        Block::new(id, DocumentId(1), above, BlockType::Text)
    }

    #[test]
    fn test_insert_into_empty() {
        let mut d = doc();
        let b = BlockId::new();
        assert_eq!(create_block(&mut d, block(b, None)), Ok(BlockInsert::Inserted { index: 0 }));
        assert_eq!(d.block_ids(), vec![b]);
    }

    #[test]
    fn test_insert_in_middle_repoints_follower() {
        let mut d = doc();
        let (a, b, c) = (BlockId::new(), BlockId::new(), BlockId::new());
        create_block(&mut d, block(a, None)).unwrap();
        create_block(&mut d, block(c, Some(a))).unwrap();
        create_block(&mut d, block(b, Some(a))).unwrap();

        assert_eq!(d.block_ids(), vec![a, b, c]);
        assert_eq!(d.block(&c).unwrap().block_above_uuid, Some(b));
        assert_eq!(d.validate_links(), Ok(()));
    }

    #[test]
    fn test_insert_new_head() {
        let mut d = doc();
        let (a, b) = (BlockId::new(), BlockId::new());
        create_block(&mut d, block(a, None)).unwrap();
        create_block(&mut d, block(b, None)).unwrap();

        assert_eq!(d.block_ids(), vec![b, a]);
        assert_eq!(d.block(&a).unwrap().block_above_uuid, Some(b));
        assert_eq!(d.validate_links(), Ok(()));
    }

    #[test]
    fn test_missing_predecessor_is_error() {
        let mut d = doc();
        let a = BlockId::new();
        create_block(&mut d, block(a, None)).unwrap();

        let ghost = BlockId::new();
        let b = BlockId::new();
        let err = create_block(&mut d, block(b, Some(ghost))).unwrap_err();
        assert_eq!(err, PatchError::PredecessorNotFound { block: b, predecessor: ghost });
        assert_eq!(d.block_ids(), vec![a]);
    }

    #[test]
    fn test_missing_predecessor_on_empty_is_error() {
        let mut d = doc();
        let err = create_block(&mut d, block(BlockId::new(), Some(BlockId::new())));
        assert!(matches!(err, Err(PatchError::PredecessorNotFound { .. })));
        assert_eq!(d.block_count(), 0);
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut d = doc();
        let (a, b) = (BlockId::new(), BlockId::new());
        create_block(&mut d, block(a, None)).unwrap();
        create_block(&mut d, block(b, Some(a))).unwrap();

        let replacement = block(a, None).with_content(json!({"text": "new"}));
        assert_eq!(create_block(&mut d, replacement), Ok(BlockInsert::Replaced { index: 0 }));
        assert_eq!(d.block_ids(), vec![a, b]);
        assert_eq!(d.block(&a).unwrap().content, json!({"text": "new"}));
    }

    #[test]
    fn test_upsert_keeps_existing_predecessor() {
        let mut d = doc();
        let (a, b) = (BlockId::new(), BlockId::new());
        create_block(&mut d, block(a, None)).unwrap();
        create_block(&mut d, block(b, Some(a))).unwrap();

        create_block(&mut d, block(b, None)).unwrap();
        assert_eq!(d.block(&b).unwrap().block_above_uuid, Some(a));
        assert_eq!(d.validate_links(), Ok(()));
    }

    #[test]
    fn test_delete_splices() {
        let mut d = doc();
        let (a, b, c) = (BlockId::new(), BlockId::new(), BlockId::new());
        create_block(&mut d, block(a, None)).unwrap();
        create_block(&mut d, block(b, Some(a))).unwrap();
        create_block(&mut d, block(c, Some(b))).unwrap();

        assert!(delete_block(&mut d, &b).is_some());
        assert_eq!(d.block_ids(), vec![a, c]);
        assert_eq!(d.block(&c).unwrap().block_above_uuid, Some(a));

        assert!(delete_block(&mut d, &a).is_some());
        assert_eq!(d.block(&c).unwrap().block_above_uuid, None);
        assert_eq!(d.validate_links(), Ok(()));
    }

    #[test]
    fn test_refetched_document_accepts_inserts() {
        let (a, b, c) = (BlockId::new(), BlockId::new(), BlockId::new());
        let wire = json!({
            "id": 1,
            "blocks": [block(b, Some(a)), block(a, None)],
        });
        let mut d: Document = serde_json::from_value(wire).unwrap();

        create_block(&mut d, block(c, Some(a))).unwrap();
        assert_eq!(d.block_ids(), vec![a, c, b]);
        assert_eq!(d.block(&b).unwrap().block_above_uuid, Some(c));
        assert_eq!(d.validate_links(), Ok(()));

        delete_block(&mut d, &c).unwrap();
        assert_eq!(d.block(&b).unwrap().block_above_uuid, Some(a));
        assert_eq!(d.validate_links(), Ok(()));
    }

    #[test]
    fn test_follower_found_by_link_not_position() {
        let (a, b, c) = (BlockId::new(), BlockId::new(), BlockId::new());
        // Stored out of order on purpose: b follows a but sits first.
        let mut d = Document {
            id: DocumentId(1),
            metadata: Default::default(),
            blocks: vec![Arc::new(block(b, Some(a))), Arc::new(block(a, None))],
        };

        create_block(&mut d, block(c, Some(a))).unwrap();
        let below_a: Vec<_> = d
            .blocks
            .iter()
            .filter(|x| x.block_above_uuid == Some(a))
            .map(|x| x.uuid)
            .collect();
        assert_eq!(below_a, vec![c]);
        assert_eq!(d.block(&b).unwrap().block_above_uuid, Some(c));
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let mut d = doc();
        let a = BlockId::new();
        create_block(&mut d, block(a, None)).unwrap();
        assert!(delete_block(&mut d, &BlockId::new()).is_none());
        assert_eq!(d.block_ids(), vec![a]);
    }

    #[test]
    fn test_update_stamps_modified_time() {
        let mut d = doc();
        let a = BlockId::new();
        create_block(&mut d, block(a, None).with_content(json!({"text": "Hello"}))).unwrap();

        let m = FieldMutation::append(["content", "text"], " world");
        assert_eq!(update_block(&mut d, &a, &m, 1234), Ok(true));
        let b = d.block(&a).unwrap();
        assert_eq!(b.content, json!({"text": "Hello world"}));
        assert_eq!(b.last_modified_at, 1234);
    }

    #[test]
    fn test_update_error_leaves_block_shared() {
        let mut d = doc();
        let a = BlockId::new();
        create_block(&mut d, block(a, None).with_content(json!({"n": 1}))).unwrap();
        let before = Arc::clone(&d.blocks[0]);

        let m = FieldMutation::append(["content", "n"], "x");
        assert!(matches!(
            update_block(&mut d, &a, &m, 99),
            Err(PatchError::NotAString { .. })
        ));
        assert!(Arc::ptr_eq(&before, &d.blocks[0]));
    }

    #[test]
    fn test_update_missing_is_noop() {
        let mut d = doc();
        let m = FieldMutation::replace(["content"], json!({}));
        assert_eq!(update_block(&mut d, &BlockId::new(), &m, 1), Ok(false));
    }

    #[test]
    fn test_untouched_blocks_stay_shared() {
        let mut d = doc();
        let (a, b, c) = (BlockId::new(), BlockId::new(), BlockId::new());
        create_block(&mut d, block(a, None)).unwrap();
        create_block(&mut d, block(b, Some(a))).unwrap();
        let snapshot = d.clone();

        create_block(&mut d, block(c, Some(b))).unwrap();
        assert!(Arc::ptr_eq(&snapshot.blocks[0], &d.blocks[0]));
        assert!(Arc::ptr_eq(&snapshot.blocks[1], &d.blocks[1]));
        assert_eq!(snapshot.block_count(), 2);
    }
}
