//! Linked-list properties of block reconciliation under arbitrary
//! create/delete sequences.

use nbsync_reconcile::reconcile_document;
use nbsync_types::{Block, BlockId, BlockType, Document, DocumentId, PatchOp};
use proptest::prelude::*;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Action {
    /// Insert a new block. `None` makes it the head; `Some(i)` puts it
    /// below the `i`-th existing block (mod length).
    Insert(Option<usize>),
    /// Delete the `i`-th existing block (mod length).
    Delete(usize),
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => any::<Option<usize>>().prop_map(Action::Insert),
        1 => any::<usize>().prop_map(Action::Delete),
    ]
}

/// Turn actions into ops, tracking the expected order alongside.
fn build(actions: &[Action]) -> (Vec<PatchOp>, Vec<BlockId>) {
    let mut ops = Vec::new();
    let mut model: Vec<BlockId> = Vec::new();
    for (n, action) in actions.iter().enumerate() {
        match action {
            Action::Insert(after) => {
                let id = BlockId::from(Uuid::from_u128(n as u128 + 1));
                let (above, index) = match after {
                    Some(i) if !model.is_empty() => {
                        let i = i % model.len();
                        (Some(model[i]), i + 1)
                    }
                    _ => (None, 0),
                };
                model.insert(index, id);
                ops.push(PatchOp::CreateBlock {
                    block: Block::new(id, DocumentId(1), above, BlockType::Code),
                });
            }
            Action::Delete(i) => {
                if model.is_empty() {
                    continue;
                }
                let id = model.remove(i % model.len());
                ops.push(PatchOp::DeleteBlock { uuid: id });
            }
        }
    }
    (ops, model)
}

/// Walk from the head by "the block whose predecessor is the current one".
fn walk(doc: &Document) -> Vec<BlockId> {
    let mut visited = Vec::new();
    let mut current: Option<BlockId> = None;
    loop {
        let next: Vec<&Block> = doc
            .blocks
            .iter()
            .map(|b| b.as_ref())
            .filter(|b| b.block_above_uuid == current)
            .collect();
        match next.as_slice() {
            [] => break,
            [b] => {
                visited.push(b.uuid);
                current = Some(b.uuid);
            }
            many => panic!("{} blocks share predecessor {:?}", many.len(), current),
        }
        assert!(visited.len() <= doc.blocks.len(), "cycle in block list");
    }
    visited
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn walk_visits_every_block_in_insertion_order(
        actions in prop::collection::vec(action_strategy(), 0..40)
    ) {
        let (ops, expected) = build(&actions);
        let out = reconcile_document(&Document::new(DocumentId(1)), &ops, 1);

        prop_assert!(out.errors.is_empty(), "errors: {:?}", out.errors);
        prop_assert_eq!(out.value.block_ids(), expected.clone());
        prop_assert_eq!(walk(&out.value), expected);
        prop_assert!(out.value.validate_links().is_ok());
    }

    #[test]
    fn repeated_create_is_idempotent(
        actions in prop::collection::vec(action_strategy(), 0..40)
    ) {
        let (ops, _) = build(&actions);
        let doubled: Vec<PatchOp> = ops
            .iter()
            .flat_map(|op| match op {
                PatchOp::CreateBlock { .. } => vec![op.clone(), op.clone()],
                _ => vec![op.clone()],
            })
            .collect();

        let empty = Document::new(DocumentId(1));
        let once = reconcile_document(&empty, &ops, 1);
        let twice = reconcile_document(&empty, &doubled, 1);
        prop_assert_eq!(once.value, twice.value);
        prop_assert!(twice.errors.is_empty());
    }
}
