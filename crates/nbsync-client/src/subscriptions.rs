//! Broadcast event types.
//!
//! [`ConnectionStatus`] tracks the lifecycle controller; [`SyncEvent`] reports
//! what inbound batches did to the store. Subscribe via
//! [`ConnectionHandle::subscribe_status`](crate::ConnectionHandle::subscribe_status)
//! and [`ConnectionHandle::subscribe_sync`](crate::ConnectionHandle::subscribe_sync).

use nbsync_reconcile::BatchReport;
use nbsync_types::{ConversationId, DocumentId};

use crate::lifecycle::ControllerSnapshot;

/// Connection lifecycle status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Controller state changed.
    Changed(ControllerSnapshot),
    /// The transport rejected a send.
    SendFailed(String),
}

/// Reconciliation results pushed to consumers (renderers, persistence).
#[derive(Clone, Debug, PartialEq)]
pub enum SyncEvent {
    /// A non-empty batch was applied to the store.
    BatchApplied {
        document_id: Option<DocumentId>,
        conversation_id: Option<ConversationId>,
        report: BatchReport,
    },
}
