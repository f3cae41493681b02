//! Batch application.
//!
//! [`apply_batch`] routes each operation of a batch to the entity it targets,
//! loading every entity from the store at most once and writing back only the
//! ones that changed. Operations are independent: one that fails to decode or
//! to apply is skipped and reported, the rest still land.
//!
//! The `reconcile_*` functions are the same per-entity logic for callers that
//! hold a snapshot directly and don't want a store.

use std::sync::Arc;

use nbsync_types::ops::DecodeFailure;
use nbsync_types::{
    Conversation, ConversationId, ConversationMessage, Document, DocumentId, Page, Paginated,
    PatchBatch, PatchOp, Plan,
};
use tracing::{debug, warn};

use crate::blocks::{create_block, delete_block, update_block};
use crate::error::{PatchError, Result};
use crate::fields::Patchable;
use crate::messages::{create_message, delete_message, sort_pages, update_message};
use crate::plan::{create_step, update_step};
use crate::project::{DocumentSummary, update_listing, update_metadata};
use crate::store::DocumentStore;

/// An operation that was not applied.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedOp {
    /// Position in the batch.
    pub index: usize,
    /// The operation's `type` tag, when it had one.
    pub kind: Option<String>,
    pub reason: String,
}

/// Which cached entities a batch wrote back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Touched {
    pub document: bool,
    pub messages: bool,
    pub conversation: bool,
    pub plan: bool,
    /// Number of listing pages rewritten.
    pub listings: usize,
}

impl Touched {
    pub fn any(&self) -> bool {
        self.document || self.messages || self.conversation || self.plan || self.listings > 0
    }
}

/// Result of [`apply_batch`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Operations that changed something.
    pub applied: usize,
    /// Operations whose target wasn't cached (or that changed nothing).
    pub noops: usize,
    pub skipped: Vec<SkippedOp>,
    pub touched: Touched,
}

/// A snapshot after reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled<T> {
    pub value: T,
    pub changed: bool,
    /// Failed operations by index into the input slice.
    pub errors: Vec<(usize, PatchError)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Changed,
    Noop,
}

impl From<bool> for Outcome {
    fn from(changed: bool) -> Self {
        if changed { Outcome::Changed } else { Outcome::Noop }
    }
}

// ── Per-entity operation handlers ───────────────────────────────────────────

fn apply_document_op(doc: &mut Document, op: &PatchOp, now: u64) -> Result<Outcome> {
    Ok(match op {
        PatchOp::CreateBlock { block } => {
            create_block(doc, block.clone())?;
            Outcome::Changed
        }
        PatchOp::DeleteBlock { uuid } => delete_block(doc, uuid).is_some().into(),
        PatchOp::UpdateBlock { uuid, mutation } => update_block(doc, uuid, mutation, now)?.into(),
        PatchOp::UpdateProject { key, value } => {
            update_metadata(doc, key, value);
            Outcome::Changed
        }
        _ => Outcome::Noop,
    })
}

fn apply_message_op(pages: &mut Paginated<ConversationMessage>, op: &PatchOp) -> Result<Outcome> {
    Ok(match op {
        PatchOp::CreateBotConversationMessage { message } => {
            create_message(pages, message.clone());
            Outcome::Changed
        }
        PatchOp::UpdateBotConversationMessage { uuid, mutation } => {
            update_message(pages, uuid, mutation)?.into()
        }
        PatchOp::DeleteBotConversationMessage { uuid } => (delete_message(pages, uuid) > 0).into(),
        _ => Outcome::Noop,
    })
}

fn apply_plan_op(plan: &mut Plan, op: &PatchOp) -> Result<Outcome> {
    Ok(match op {
        PatchOp::CreatePlanStep { step } => {
            create_step(plan, step.clone());
            Outcome::Changed
        }
        PatchOp::UpdatePlanStep { uuid, mutation } => update_step(plan, uuid, mutation)?.into(),
        _ => Outcome::Noop,
    })
}

/// Apply the document operations in `ops` to a copy of `doc`.
///
/// Operations for other entities are ignored. `UpdateProject` only touches
/// the document's own metadata here; listings need [`apply_batch`].
pub fn reconcile_document(doc: &Document, ops: &[PatchOp], now: u64) -> Reconciled<Document> {
    reconcile(doc, ops, PatchOp::is_document_op, |d, op| apply_document_op(d, op, now))
}

/// Apply the message operations in `ops` to a copy of `pages`, then restore
/// chronological order.
pub fn reconcile_messages(
    pages: &Paginated<ConversationMessage>,
    ops: &[PatchOp],
) -> Reconciled<Paginated<ConversationMessage>> {
    let mut out = reconcile(pages, ops, PatchOp::is_message_op, apply_message_op);
    if out.changed {
        sort_pages(&mut out.value);
    }
    out
}

/// Apply the plan operations in `ops` to a copy of `plan`.
pub fn reconcile_plan(plan: &Plan, ops: &[PatchOp]) -> Reconciled<Plan> {
    reconcile(plan, ops, PatchOp::is_plan_op, apply_plan_op)
}

fn reconcile<T: Clone>(
    input: &T,
    ops: &[PatchOp],
    wants: fn(&PatchOp) -> bool,
    mut apply: impl FnMut(&mut T, &PatchOp) -> Result<Outcome>,
) -> Reconciled<T> {
    let mut value = input.clone();
    let mut changed = false;
    let mut errors = Vec::new();
    for (index, op) in ops.iter().enumerate().filter(|(_, op)| wants(op)) {
        match apply(&mut value, op) {
            Ok(Outcome::Changed) => changed = true,
            Ok(Outcome::Noop) => {}
            Err(e) => {
                warn!("skipping {} at {}: {}", op.kind(), index, e);
                errors.push((index, e));
            }
        }
    }
    Reconciled { value, changed, errors }
}

// ── Store-backed batch application ──────────────────────────────────────────

/// An entity loaded from the store for the duration of one batch.
struct Slot<T> {
    loaded: bool,
    value: Option<T>,
    dirty: bool,
}

impl<T: Clone> Slot<T> {
    fn new() -> Self {
        Self {
            loaded: false,
            value: None,
            dirty: false,
        }
    }

    /// The cached entity, if the store has one.
    fn get(&mut self, load: impl FnOnce() -> Option<Arc<T>>) -> Option<&mut T> {
        if !self.loaded {
            self.value = load().map(Arc::unwrap_or_clone);
            self.loaded = true;
        }
        self.value.as_mut()
    }

    /// The cached entity, or a fresh one when the store has none.
    fn get_or_create(
        &mut self,
        load: impl FnOnce() -> Option<Arc<T>>,
        create: impl FnOnce() -> T,
    ) -> &mut T {
        if !self.loaded {
            self.value = load().map(Arc::unwrap_or_clone);
            self.loaded = true;
        }
        self.value.get_or_insert_with(create)
    }

    fn mark(&mut self, outcome: Outcome) {
        if outcome == Outcome::Changed {
            self.dirty = true;
        }
    }

    /// The value to write back, if it changed.
    fn take_dirty(self) -> Option<T> {
        if self.dirty { self.value } else { None }
    }
}

struct Workspace<'s> {
    store: &'s dyn DocumentStore,
    document_id: Option<DocumentId>,
    conversation_id: Option<ConversationId>,
    document: Slot<Document>,
    messages: Slot<Paginated<ConversationMessage>>,
    conversation: Slot<Conversation>,
    plan: Slot<Plan>,
    listings: Option<Vec<(String, Page<DocumentSummary>, bool)>>,
}

impl<'s> Workspace<'s> {
    fn new(store: &'s dyn DocumentStore, batch: &PatchBatch) -> Self {
        Self {
            store,
            document_id: batch.document_id,
            conversation_id: batch.conversation_id,
            document: Slot::new(),
            messages: Slot::new(),
            conversation: Slot::new(),
            plan: Slot::new(),
            listings: None,
        }
    }

    fn document_id(&self, op: &PatchOp) -> Result<DocumentId> {
        self.document_id.ok_or(PatchError::MissingRoute {
            op: op.kind(),
            route: "document_id",
        })
    }

    fn conversation_id(&self, op: &PatchOp) -> Result<ConversationId> {
        self.conversation_id.ok_or(PatchError::MissingRoute {
            op: op.kind(),
            route: "conversation_id",
        })
    }

    fn apply(&mut self, op: &PatchOp, now: u64) -> Result<Outcome> {
        let store = self.store;
        match op {
            PatchOp::CreateBlock { .. } => {
                let id = self.document_id(op)?;
                let doc = self
                    .document
                    .get_or_create(|| store.document(id), || Document::new(id));
                let outcome = apply_document_op(doc, op, now)?;
                self.document.mark(outcome);
                Ok(outcome)
            }
            PatchOp::DeleteBlock { .. } | PatchOp::UpdateBlock { .. } => {
                let id = self.document_id(op)?;
                let Some(doc) = self.document.get(|| store.document(id)) else {
                    debug!("{} for uncached document {:?}", op.kind(), id);
                    return Ok(Outcome::Noop);
                };
                let outcome = apply_document_op(doc, op, now)?;
                self.document.mark(outcome);
                Ok(outcome)
            }
            PatchOp::UpdateProject { key, value } => {
                let id = self.document_id(op)?;
                let mut outcome = Outcome::Noop;
                if let Some(doc) = self.document.get(|| store.document(id)) {
                    update_metadata(doc, key, value);
                    self.document.mark(Outcome::Changed);
                    outcome = Outcome::Changed;
                }
                let listings = self.listings.get_or_insert_with(|| {
                    store
                        .document_listings()
                        .into_iter()
                        .map(|(k, page)| (k, Arc::unwrap_or_clone(page), false))
                        .collect()
                });
                for (_, page, dirty) in listings.iter_mut() {
                    if update_listing(page, id, key, value) > 0 {
                        *dirty = true;
                        outcome = Outcome::Changed;
                    }
                }
                Ok(outcome)
            }
            PatchOp::CreateBotConversationMessage { .. } => {
                let id = self.conversation_id(op)?;
                let pages = self
                    .messages
                    .get_or_create(|| store.messages(id), Paginated::default);
                let outcome = apply_message_op(pages, op)?;
                self.messages.mark(outcome);
                Ok(outcome)
            }
            PatchOp::UpdateBotConversationMessage { .. }
            | PatchOp::DeleteBotConversationMessage { .. } => {
                let id = self.conversation_id(op)?;
                let Some(pages) = self.messages.get(|| store.messages(id)) else {
                    debug!("{} for uncached conversation {:?}", op.kind(), id);
                    return Ok(Outcome::Noop);
                };
                let outcome = apply_message_op(pages, op)?;
                self.messages.mark(outcome);
                Ok(outcome)
            }
            PatchOp::UpdateBotConversation { mutation } => {
                let id = self.conversation_id(op)?;
                let Some(conversation) = self.conversation.get(|| store.conversation(id)) else {
                    debug!("update_bot_conversation for uncached conversation {:?}", id);
                    return Ok(Outcome::Noop);
                };
                conversation.apply_mutation(mutation)?;
                self.conversation.mark(Outcome::Changed);
                Ok(Outcome::Changed)
            }
            PatchOp::CreatePlanStep { .. } => {
                let id = self.conversation_id(op)?;
                let plan = self.plan.get_or_create(|| store.plan(id), || Plan::new(id));
                let outcome = apply_plan_op(plan, op)?;
                self.plan.mark(outcome);
                Ok(outcome)
            }
            PatchOp::UpdatePlanStep { .. } => {
                let id = self.conversation_id(op)?;
                let Some(plan) = self.plan.get(|| store.plan(id)) else {
                    debug!("update_plan_step for uncached plan {:?}", id);
                    return Ok(Outcome::Noop);
                };
                let outcome = apply_plan_op(plan, op)?;
                self.plan.mark(outcome);
                Ok(outcome)
            }
        }
    }

    /// Write every changed entity back to the store, once each.
    fn commit(self) -> Touched {
        let mut touched = Touched::default();
        let store = self.store;

        if let Some(doc) = self.document.take_dirty() {
            store.set_document(Arc::new(doc));
            touched.document = true;
        }
        if let (Some(id), Some(mut pages)) = (self.conversation_id, self.messages.take_dirty()) {
            sort_pages(&mut pages);
            store.set_messages(id, Arc::new(pages));
            touched.messages = true;
        }
        if let Some(conversation) = self.conversation.take_dirty() {
            store.set_conversation(Arc::new(conversation));
            touched.conversation = true;
        }
        if let Some(plan) = self.plan.take_dirty() {
            store.set_plan(Arc::new(plan));
            touched.plan = true;
        }
        for (key, page, dirty) in self.listings.into_iter().flatten() {
            if dirty {
                store.set_document_listing(key, Arc::new(page));
                touched.listings += 1;
            }
        }
        touched
    }
}

/// Apply a batch of operations against the store.
///
/// Operations apply in order. An empty batch returns immediately and never
/// touches the store.
#[tracing::instrument(
    skip_all,
    fields(
        document = ?batch.document_id,
        conversation = ?batch.conversation_id,
        ops = batch.operations.len()
    )
)]
pub fn apply_batch(store: &dyn DocumentStore, batch: &PatchBatch, now: u64) -> BatchReport {
    let mut report = BatchReport::default();
    if batch.is_empty() {
        return report;
    }

    let mut ws = Workspace::new(store, batch);
    for (index, decoded) in batch.decode().into_iter().enumerate() {
        let op = match decoded {
            Ok(op) => op,
            Err(DecodeFailure::UnknownKind(kind)) => {
                warn!("skipping unknown operation '{}' at {}", kind, index);
                report.skipped.push(SkippedOp {
                    index,
                    kind: Some(kind),
                    reason: "unknown operation".into(),
                });
                continue;
            }
            Err(DecodeFailure::Malformed { kind, reason }) => {
                warn!("skipping malformed operation {:?} at {}: {}", kind, index, reason);
                report.skipped.push(SkippedOp { index, kind, reason });
                continue;
            }
        };

        match ws.apply(&op, now) {
            Ok(Outcome::Changed) => report.applied += 1,
            Ok(Outcome::Noop) => report.noops += 1,
            Err(e) => {
                warn!("skipping {} at {}: {}", op.kind(), index, e);
                report.skipped.push(SkippedOp {
                    index,
                    kind: Some(op.kind().to_string()),
                    reason: e.to_string(),
                });
            }
        }
    }

    report.touched = ws.commit();
    debug!(
        applied = report.applied,
        noops = report.noops,
        skipped = report.skipped.len(),
        "batch applied"
    );
    report
}
