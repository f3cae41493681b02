//! End-to-end batch application through the in-memory store.

use std::sync::{Arc, Once};

use nbsync_reconcile::{DocumentStore, DocumentSummary, MemoryStore, apply_batch};
use nbsync_types::{
    Block, BlockId, BlockType, ConversationId, ConversationMessage, DocumentId, FieldMutation,
    InboundMessage, MessageId, Page, Paginated, PatchBatch, PatchOp,
};
use serde_json::{Value, json};

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("nbsync_reconcile=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

const DOC: DocumentId = DocumentId(42);
const CONV: ConversationId = ConversationId(7);

fn doc_batch(ops: &[PatchOp]) -> PatchBatch {
    PatchBatch::from_ops(Some(DOC), None, ops)
}

fn conv_batch(ops: &[PatchOp]) -> PatchBatch {
    PatchBatch::from_ops(None, Some(CONV), ops)
}

fn create(id: BlockId, above: Option<BlockId>) -> PatchOp {
    PatchOp::CreateBlock {
        block: Block::new(id, DOC, above, BlockType::Text),
    }
}

#[test]
fn create_create_delete_leaves_single_head() {
    init_tracing();
    let store = MemoryStore::new();
    let (b, c) = (BlockId::new(), BlockId::new());

    apply_batch(&store, &doc_batch(&[create(b, None)]), 1);
    assert_eq!(store.document(DOC).unwrap().block_ids(), vec![b]);

    apply_batch(&store, &doc_batch(&[create(c, Some(b))]), 2);
    assert_eq!(store.document(DOC).unwrap().block_ids(), vec![b, c]);

    apply_batch(&store, &doc_batch(&[PatchOp::DeleteBlock { uuid: b }]), 3);
    let doc = store.document(DOC).unwrap();
    assert_eq!(doc.block_ids(), vec![c]);
    assert_eq!(doc.block(&c).unwrap().block_above_uuid, None);
}

#[test]
fn streamed_append_builds_text() {
    init_tracing();
    let store = MemoryStore::new();
    let id = MessageId::new();
    let msg = ConversationMessage::new(id, CONV, 10).with_content("Hello");

    apply_batch(
        &store,
        &conv_batch(&[
            PatchOp::CreateBotConversationMessage { message: msg },
            PatchOp::UpdateBotConversationMessage {
                uuid: id,
                mutation: FieldMutation::append(["content"], " world"),
            },
        ]),
        1,
    );

    let pages = store.messages(CONV).unwrap();
    assert_eq!(pages.iter().next().unwrap().content, "Hello world");
}

#[test]
fn append_to_non_string_is_reported_and_leaves_field() {
    init_tracing();
    let store = MemoryStore::new();
    let id = MessageId::new();
    let mut msg = ConversationMessage::new(id, CONV, 10);
    msg.payload = json!({"rows": 3});
    store.set_messages(CONV, Arc::new(Paginated::new(vec![Page::from_results(vec![msg])])));

    let report = apply_batch(
        &store,
        &conv_batch(&[PatchOp::UpdateBotConversationMessage {
            uuid: id,
            mutation: FieldMutation::append(["payload", "rows"], "x"),
        }]),
        1,
    );

    assert_eq!(report.skipped.len(), 1);
    assert!(!report.touched.messages);
    assert_eq!(store.messages(CONV).unwrap().iter().next().unwrap().payload, json!({"rows": 3}));
}

#[test]
fn pages_stay_chronological() {
    init_tracing();
    let store = MemoryStore::new();
    let late = ConversationMessage::new(MessageId::new(), CONV, 300);
    let early = ConversationMessage::new(MessageId::new(), CONV, 100);
    let middle_id = MessageId::new();
    let middle = ConversationMessage::new(middle_id, CONV, 900);

    apply_batch(
        &store,
        &conv_batch(&[
            PatchOp::CreateBotConversationMessage { message: late },
            PatchOp::CreateBotConversationMessage { message: early },
            PatchOp::CreateBotConversationMessage { message: middle },
            // Backend corrects the timestamp after the fact.
            PatchOp::UpdateBotConversationMessage {
                uuid: middle_id,
                mutation: FieldMutation::replace(["created_at"], json!(200)),
            },
        ]),
        1,
    );

    let times: Vec<u64> = store.messages(CONV).unwrap().iter().map(|m| m.created_at).collect();
    assert_eq!(times, vec![100, 200, 300]);
}

#[test]
fn unknown_operation_is_skipped_rest_applies() {
    init_tracing();
    let store = MemoryStore::new();
    let a = BlockId::new();
    let raw = json!({
        "message_type": "patch",
        "document_id": 42,
        "operations": [
            {"type": "create_dashboard_widget", "widget": {}},
            serde_json::to_value(create(a, None)).unwrap(),
        ]
    });
    let InboundMessage::Patch(batch) = serde_json::from_value::<InboundMessage>(raw).unwrap() else {
        panic!("expected a patch message");
    };

    let report = apply_batch(&store, &batch, 1);
    assert_eq!(report.applied, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].kind.as_deref(), Some("create_dashboard_widget"));
    assert_eq!(store.document(DOC).unwrap().block_ids(), vec![a]);
}

#[test]
fn update_project_writes_document_and_listings() {
    init_tracing();
    let store = MemoryStore::new();
    store.set_document(Arc::new(nbsync_types::Document::new(DOC)));

    let entry = |id: u64| -> DocumentSummary {
        match json!({"id": id, "name": "old"}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    };
    let untouched = Arc::new(Page::from_results(vec![entry(1)]));
    store.set_document_listing("page=1".into(), Arc::clone(&untouched));
    store.set_document_listing("page=2".into(), Arc::new(Page::from_results(vec![entry(42)])));

    let report = apply_batch(
        &store,
        &doc_batch(&[PatchOp::UpdateProject {
            key: "name".into(),
            value: json!("Churn analysis"),
        }]),
        1,
    );

    assert!(report.touched.document);
    assert_eq!(report.touched.listings, 1);
    let doc = store.document(DOC).unwrap();
    assert_eq!(doc.metadata.get("name"), Some(&json!("Churn analysis")));

    let listings = store.document_listings();
    assert!(Arc::ptr_eq(&listings[0].1, &untouched));
    assert_eq!(listings[1].1.results[0].get("name"), Some(&json!("Churn analysis")));
}

#[test]
fn each_entity_written_once_per_batch() {
    init_tracing();
    let store = MemoryStore::new();
    let (a, b, c) = (BlockId::new(), BlockId::new(), BlockId::new());
    apply_batch(&store, &doc_batch(&[create(a, None)]), 1);
    let before = store.document(DOC).unwrap();

    let report = apply_batch(
        &store,
        &doc_batch(&[create(b, Some(a)), create(c, Some(b)), PatchOp::DeleteBlock { uuid: b }]),
        2,
    );

    assert_eq!(report.applied, 3);
    assert!(report.touched.document);
    let after = store.document(DOC).unwrap();
    assert_eq!(after.block_ids(), vec![a, c]);
    assert_eq!(before.block_ids(), vec![a]);
    assert!(Arc::ptr_eq(&before.blocks[0], &after.blocks[0]));
}
