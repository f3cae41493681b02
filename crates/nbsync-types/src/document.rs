//! Documents (notebooks / projects) and their ordered blocks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::block::Block;
use crate::ids::{BlockId, DocumentId};

/// A violated linked-list invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("block {0:?} appears more than once")]
    DuplicateBlock(BlockId),
    #[error("more than one head: {first:?} and {second:?}")]
    MultipleHeads { first: BlockId, second: BlockId },
    #[error("block {block:?} points at missing predecessor {predecessor:?}")]
    DanglingPredecessor { block: BlockId, predecessor: BlockId },
    #[error("block {block:?} is not directly below its predecessor {predecessor:?}")]
    OutOfOrder { block: BlockId, predecessor: BlockId },
}

/// A document with its blocks in linked-list order.
///
/// `blocks[0]` is the head; `blocks[i].block_above_uuid == blocks[i-1].uuid`
/// for every `i > 0`. The reconciler maintains this; [`Document::from_unordered`]
/// establishes it for data fetched in arbitrary order, and deserializing
/// always goes through it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawDocument")]
pub struct Document {
    pub id: DocumentId,
    /// Top-level project fields (name, description, settings …).
    pub metadata: Map<String, Value>,
    pub blocks: Vec<Arc<Block>>,
}

/// Wire shape of a document: blocks in whatever order the server sent them.
#[derive(Deserialize)]
struct RawDocument {
    id: DocumentId,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default)]
    blocks: Vec<Block>,
}

impl From<RawDocument> for Document {
    fn from(raw: RawDocument) -> Self {
        Document::from_unordered(raw.id, raw.metadata, raw.blocks)
    }
}

impl Document {
    /// An empty document.
    pub fn new(id: DocumentId) -> Self {
        Self {
            id,
            metadata: Map::new(),
            blocks: Vec::new(),
        }
    }

    /// Build a document from blocks in arbitrary order.
    ///
    /// Walks from the head by following "the block whose predecessor is the
    /// current block". Blocks the walk can't reach (extra heads, dangling
    /// predecessors, cycles) are appended afterwards in input order so no data
    /// is lost; [`validate_links`](Self::validate_links) will report them.
    pub fn from_unordered(id: DocumentId, metadata: Map<String, Value>, blocks: Vec<Block>) -> Self {
        let mut below: HashMap<Option<BlockId>, usize> = HashMap::new();
        for (i, b) in blocks.iter().enumerate() {
            below.entry(b.block_above_uuid).or_insert(i);
        }

        let mut order = Vec::with_capacity(blocks.len());
        let mut seen = HashSet::with_capacity(blocks.len());
        let mut cursor = below.get(&None).copied();
        while let Some(i) = cursor {
            if !seen.insert(i) {
                break;
            }
            order.push(i);
            cursor = below.get(&Some(blocks[i].uuid)).copied();
        }
        for i in 0..blocks.len() {
            if !seen.contains(&i) {
                order.push(i);
            }
        }

        let mut slots: Vec<Option<Block>> = blocks.into_iter().map(Some).collect();
        let blocks = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .map(Arc::new)
            .collect();

        Self { id, metadata, blocks }
    }

    /// Number of blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Look up a block by id.
    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.iter().map(|b| b.as_ref()).find(|b| b.uuid == *id)
    }

    /// Index of a block in document order.
    pub fn position(&self, id: &BlockId) -> Option<usize> {
        self.blocks.iter().position(|b| b.uuid == *id)
    }

    /// Block ids in document order.
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks.iter().map(|b| b.uuid).collect()
    }

    /// Check the linked-list invariants against the stored order.
    pub fn validate_links(&self) -> Result<(), LinkError> {
        let mut ids = HashSet::with_capacity(self.blocks.len());
        for b in &self.blocks {
            if !ids.insert(b.uuid) {
                return Err(LinkError::DuplicateBlock(b.uuid));
            }
        }

        let mut head: Option<BlockId> = None;
        for (i, b) in self.blocks.iter().enumerate() {
            let expected = i.checked_sub(1).map(|p| self.blocks[p].uuid);
            match (b.block_above_uuid, expected) {
                (None, None) => head = Some(b.uuid),
                (None, Some(_)) => {
                    return Err(LinkError::MultipleHeads {
                        first: head.unwrap_or(self.blocks[0].uuid),
                        second: b.uuid,
                    });
                }
                (Some(p), _) if !ids.contains(&p) => {
                    return Err(LinkError::DanglingPredecessor {
                        block: b.uuid,
                        predecessor: p,
                    });
                }
                (Some(p), Some(e)) if p == e => {}
                (Some(p), _) => {
                    return Err(LinkError::OutOfOrder {
                        block: b.uuid,
                        predecessor: p,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockType;

    fn block(id: BlockId, above: Option<BlockId>) -> Block {
        Block::new(id, DocumentId(1), above, BlockType::Text)
    }

    #[test]
    fn test_from_unordered_rebuilds_order() {
        let (a, b, c) = (BlockId::new(), BlockId::new(), BlockId::new());
        let doc = Document::from_unordered(
            DocumentId(1),
            Map::new(),
            vec![block(c, Some(b)), block(a, None), block(b, Some(a))],
        );
        assert_eq!(doc.block_ids(), vec![a, b, c]);
        assert_eq!(doc.validate_links(), Ok(()));
    }

    #[test]
    fn test_from_unordered_keeps_unreachable_blocks() {
        let (a, b, orphan) = (BlockId::new(), BlockId::new(), BlockId::new());
        let doc = Document::from_unordered(
            DocumentId(1),
            Map::new(),
            vec![block(orphan, Some(BlockId::new())), block(b, Some(a)), block(a, None)],
        );
        assert_eq!(doc.block_ids(), vec![a, b, orphan]);
        assert!(matches!(
            doc.validate_links(),
            Err(LinkError::DanglingPredecessor { block, .. }) if block == orphan
        ));
    }

    #[test]
    fn test_validate_links_detects_second_head() {
        let (a, b) = (BlockId::new(), BlockId::new());
        let doc = Document {
            id: DocumentId(1),
            metadata: Map::new(),
            blocks: vec![Arc::new(block(a, None)), Arc::new(block(b, None))],
        };
        assert_eq!(
            doc.validate_links(),
            Err(LinkError::MultipleHeads { first: a, second: b })
        );
    }

    #[test]
    fn test_deserialize_restores_link_order() {
        let (a, b, c) = (BlockId::new(), BlockId::new(), BlockId::new());
        let json = serde_json::json!({
            "id": 1,
            "blocks": [block(c, Some(b)), block(b, Some(a)), block(a, None)],
        });
        let doc: Document = serde_json::from_value(json).unwrap();
        assert_eq!(doc.block_ids(), vec![a, b, c]);
        assert_eq!(doc.validate_links(), Ok(()));
        assert!(doc.metadata.is_empty());

        let again: Document = serde_json::from_value(serde_json::to_value(&doc).unwrap()).unwrap();
        assert_eq!(again, doc);
    }

    #[test]
    fn test_validate_links_detects_cycle() {
        let (a, b) = (BlockId::new(), BlockId::new());
        let doc = Document::from_unordered(
            DocumentId(1),
            Map::new(),
            vec![block(a, Some(b)), block(b, Some(a))],
        );
        assert_eq!(doc.block_count(), 2);
        assert!(doc.validate_links().is_err());
    }
}
