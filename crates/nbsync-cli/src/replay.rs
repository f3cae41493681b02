//! Offline replay of recorded inbound traffic.
//!
//! Messages are pushed through a real connection actor with no transport
//! attached, so patch batches hit the same reconcile path the live client
//! uses. Confirmations for topics nobody subscribed to are ignored.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use nbsync_client::{ClientConfig, StaticToken, SyncEvent, spawn_connection};
use nbsync_reconcile::{DocumentStore, MemoryStore};
use nbsync_types::{ConversationId, DocumentId, InboundMessage};
use serde_json::{Map, Value, json};
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, info, warn};

/// Parse a recording: either one JSON array or one message per line.
pub fn parse_messages(text: &str) -> Result<Vec<InboundMessage>> {
    if text.trim_start().starts_with('[') {
        return serde_json::from_str(text).context("invalid message array");
    }
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            InboundMessage::from_json(line).with_context(|| format!("line {}", i + 1))
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct ReplaySummary {
    pub batches: usize,
    pub applied: usize,
    pub noops: usize,
    pub skipped: usize,
}

pub struct Replay {
    store: Arc<MemoryStore>,
    documents: BTreeSet<DocumentId>,
    conversations: BTreeSet<ConversationId>,
    pub summary: ReplaySummary,
}

impl Replay {
    pub async fn run(config: ClientConfig, messages: Vec<InboundMessage>) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let handle = spawn_connection(
            config,
            Arc::new(StaticToken(String::new())),
            Arc::clone(&store) as Arc<dyn DocumentStore>,
        );
        let mut events = handle.subscribe_sync();

        let mut documents = BTreeSet::new();
        let mut conversations = BTreeSet::new();
        let mut summary = ReplaySummary::default();

        for message in messages {
            if let InboundMessage::Patch(batch) = &message {
                documents.extend(batch.document_id);
                conversations.extend(batch.conversation_id);
            }
            handle.deliver(message)?;
            // Snapshot round-trips through the actor, so the batch is done.
            handle.snapshot().await?;

            loop {
                match events.try_recv() {
                    Ok(SyncEvent::BatchApplied { report, .. }) => {
                        summary.batches += 1;
                        summary.applied += report.applied;
                        summary.noops += report.noops;
                        summary.skipped += report.skipped.len();
                    }
                    Err(TryRecvError::Lagged(n)) => warn!("missed {} sync events", n),
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }
        }

        info!(
            "replayed {} batch(es): {} applied, {} no-op, {} skipped",
            summary.batches, summary.applied, summary.noops, summary.skipped
        );
        Ok(Self {
            store,
            documents,
            conversations,
            summary,
        })
    }

    /// Everything the replay touched, as one JSON object.
    pub fn to_json(&self) -> Result<Value> {
        let mut documents = Map::new();
        for id in &self.documents {
            match self.store.document(*id) {
                Some(doc) => {
                    documents.insert(id.0.to_string(), serde_json::to_value(doc.as_ref())?);
                }
                None => debug!("document {:?} never materialised", id),
            }
        }

        let mut conversations = Map::new();
        for id in &self.conversations {
            let messages = self.store.messages(*id);
            let conversation = self.store.conversation(*id);
            let plan = self.store.plan(*id);
            conversations.insert(
                id.0.to_string(),
                json!({
                    "conversation": conversation.as_deref(),
                    "messages": messages.as_deref(),
                    "plan": plan.as_deref(),
                }),
            );
        }

        let mut listings = Map::new();
        for (key, page) in self.store.document_listings() {
            listings.insert(key, serde_json::to_value(page.as_ref())?);
        }

        Ok(json!({
            "documents": documents,
            "conversations": conversations,
            "listings": listings,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbsync_types::{Block, BlockId, BlockType, PatchBatch, PatchOp};

    fn create_block_line(doc: u64, id: BlockId) -> String {
        let batch = PatchBatch::from_ops(
            Some(DocumentId(doc)),
            None,
            &[PatchOp::CreateBlock {
                block: Block::new(id, DocumentId(doc), None, BlockType::Code),
            }],
        );
        serde_json::to_string(&InboundMessage::Patch(batch)).unwrap()
    }

    #[test]
    fn test_parse_json_lines_skips_blanks() {
        let text = format!(
            "{}\n\n{}\n",
            r#"{"message_type":"subscribed-to-document","id":1}"#,
            create_block_line(1, BlockId::new())
        );
        let messages = parse_messages(&text).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[1], InboundMessage::Patch(_)));
    }

    #[test]
    fn test_parse_array() {
        let text = r#"[{"message_type":"patch","document_id":3,"operations":[]},
                       {"message_type":"presence"}]"#;
        let messages = parse_messages(text).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1], InboundMessage::Unknown);
    }

    #[test]
    fn test_parse_error_names_line() {
        let err = parse_messages("{\"message_type\":\"presence\"}\nnot json\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[tokio::test]
    async fn test_replay_builds_document() {
        let (a, b) = (BlockId::new(), BlockId::new());
        let text = format!("{}\n{}\n", create_block_line(9, a), create_block_line(9, b));
        let messages = parse_messages(&text).unwrap();

        let replay = Replay::run(ClientConfig::default(), messages).await.unwrap();
        assert_eq!(replay.summary.batches, 2);
        assert_eq!(replay.summary.applied, 2);

        let out = replay.to_json().unwrap();
        let blocks = out["documents"]["9"]["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        // Second create with no predecessor becomes the new head.
        assert_eq!(blocks[0]["uuid"], serde_json::to_value(b).unwrap());
    }
}
