//! Document store: the cache the reconciler reads from and writes to.
//!
//! Snapshots go in and out as `Arc`s. A writer replaces the whole snapshot;
//! readers holding the previous `Arc` keep a consistent view.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use nbsync_types::{Conversation, ConversationId, ConversationMessage, Document, DocumentId, Page, Paginated, Plan};

use crate::project::DocumentSummary;

/// Repository of cached entities, keyed by id.
///
/// Implementations must be cheap to call; the reconciler calls each getter at
/// most once per entity per batch.
pub trait DocumentStore: Send + Sync {
    fn document(&self, id: DocumentId) -> Option<Arc<Document>>;
    fn set_document(&self, doc: Arc<Document>);

    fn messages(&self, id: ConversationId) -> Option<Arc<Paginated<ConversationMessage>>>;
    fn set_messages(&self, id: ConversationId, pages: Arc<Paginated<ConversationMessage>>);

    fn conversation(&self, id: ConversationId) -> Option<Arc<Conversation>>;
    fn set_conversation(&self, conversation: Arc<Conversation>);

    fn plan(&self, id: ConversationId) -> Option<Arc<Plan>>;
    fn set_plan(&self, plan: Arc<Plan>);

    /// Every cached document listing page, with its listing key.
    fn document_listings(&self) -> Vec<(String, Arc<Page<DocumentSummary>>)>;
    fn set_document_listing(&self, key: String, page: Arc<Page<DocumentSummary>>);

    /// Drop everything (session or document switch).
    fn clear(&self);
}

#[derive(Default)]
struct Tables {
    documents: HashMap<DocumentId, Arc<Document>>,
    messages: HashMap<ConversationId, Arc<Paginated<ConversationMessage>>>,
    conversations: HashMap<ConversationId, Arc<Conversation>>,
    plans: HashMap<ConversationId, Arc<Plan>>,
    listings: HashMap<String, Arc<Page<DocumentSummary>>>,
}

/// In-process [`DocumentStore`].
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached documents.
    pub fn document_count(&self) -> usize {
        self.tables.read().documents.len()
    }
}

impl DocumentStore for MemoryStore {
    fn document(&self, id: DocumentId) -> Option<Arc<Document>> {
        self.tables.read().documents.get(&id).cloned()
    }

    fn set_document(&self, doc: Arc<Document>) {
        self.tables.write().documents.insert(doc.id, doc);
    }

    fn messages(&self, id: ConversationId) -> Option<Arc<Paginated<ConversationMessage>>> {
        self.tables.read().messages.get(&id).cloned()
    }

    fn set_messages(&self, id: ConversationId, pages: Arc<Paginated<ConversationMessage>>) {
        self.tables.write().messages.insert(id, pages);
    }

    fn conversation(&self, id: ConversationId) -> Option<Arc<Conversation>> {
        self.tables.read().conversations.get(&id).cloned()
    }

    fn set_conversation(&self, conversation: Arc<Conversation>) {
        self.tables.write().conversations.insert(conversation.id, conversation);
    }

    fn plan(&self, id: ConversationId) -> Option<Arc<Plan>> {
        self.tables.read().plans.get(&id).cloned()
    }

    fn set_plan(&self, plan: Arc<Plan>) {
        self.tables.write().plans.insert(plan.conversation_id, plan);
    }

    fn document_listings(&self) -> Vec<(String, Arc<Page<DocumentSummary>>)> {
        let tables = self.tables.read();
        let mut listings: Vec<_> = tables
            .listings
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();
        listings.sort_by(|a, b| a.0.cmp(&b.0));
        listings
    }

    fn set_document_listing(&self, key: String, page: Arc<Page<DocumentSummary>>) {
        self.tables.write().listings.insert(key, page);
    }

    fn clear(&self) {
        *self.tables.write() = Tables::default();
    }
}
