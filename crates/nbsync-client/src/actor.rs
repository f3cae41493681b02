//! Connection actor.
//!
//! Owns the lifecycle [`Controller`], the current transport and the shared
//! document store. Everything that can change connection state goes through
//! one mpsc channel, so controller events and inbound batches are processed
//! strictly in arrival order by a single task.
//!
//! ```text
//!   ConnectionHandle (Clone)     mpsc      ConnectionActor (tokio task)
//!   ┌──────────────────────┐  ────────▶  ┌─────────────────────────────┐
//!   │ .attach_transport()  │             │ Controller (pure FSM)       │
//!   │ .subscribe_*()       │             │ executes Effects:           │
//!   │ .deliver()           │             │   Send → transport          │
//!   │ .close() / .resume() │             │   Authenticate → auth task  │
//!   └──────────────────────┘             │   Schedule → sleep task     │
//!          ▲         ▲                   │ Patch → apply_batch(store)  │
//!          │         └── broadcast ───── │                             │
//!          └──────────── oneshot ─────── └─────────────────────────────┘
//! ```
//!
//! Auth handshakes and timers run as their own tasks and report back through
//! a weak sender, so they never keep the actor alive after every handle is
//! dropped.

use std::sync::Arc;

use nbsync_reconcile::{DocumentStore, apply_batch};
use nbsync_types::{InboundMessage, OutboundMessage, Topic, now_millis};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ConnectionError;
use crate::config::ClientConfig;
use crate::lifecycle::{Controller, ControllerSnapshot, Effect, Event};
use crate::subscriptions::{ConnectionStatus, SyncEvent};
use crate::transport::{TokenProvider, Transport};

// ============================================================================
// Commands (internal)
// ============================================================================

enum Command {
    AttachTransport(Arc<dyn Transport>),
    Lifecycle(Event),
    StopStreaming(String),
    Deliver(InboundMessage),
    Snapshot(oneshot::Sender<ControllerSnapshot>),
}

// ============================================================================
// ConnectionHandle (public API)
// ============================================================================

/// Handle to a running connection actor.
///
/// Cheap to clone; the actor stops once every handle has been dropped.
#[derive(Clone)]
pub struct ConnectionHandle {
    tx: mpsc::UnboundedSender<Command>,
    status_tx: broadcast::Sender<ConnectionStatus>,
    sync_tx: broadcast::Sender<SyncEvent>,
}

impl ConnectionHandle {
    fn send(&self, cmd: Command) -> Result<(), ConnectionError> {
        self.tx.send(cmd).map_err(|_| ConnectionError::Shutdown)
    }

    /// Hand over a freshly opened transport. Supersedes the previous one and
    /// starts authentication.
    pub fn attach_transport(&self, transport: Arc<dyn Transport>) -> Result<(), ConnectionError> {
        self.send(Command::AttachTransport(transport))
    }

    /// Subscribe to a document and a conversation, given as raw route
    /// parameters. Replaces any earlier document/conversation subscription.
    pub fn subscribe_document_and_conversation(
        &self,
        document: Option<&str>,
        conversation: Option<&str>,
    ) -> Result<(), ConnectionError> {
        self.send(Command::Lifecycle(Event::SubscribeDocumentAndConversation {
            document: document.map(String::from),
            conversation: conversation.map(String::from),
        }))
    }

    /// Subscribe to a batch-table feed. Replaces any earlier one.
    pub fn subscribe_batch_table(&self, batch_table: Option<&str>) -> Result<(), ConnectionError> {
        self.send(Command::Lifecycle(Event::SubscribeBatchTable {
            batch_table: batch_table.map(String::from),
        }))
    }

    /// Ask the backend to stop a streaming response.
    pub fn stop_streaming(&self, stream_id: &str) -> Result<(), ConnectionError> {
        self.send(Command::StopStreaming(stream_id.to_string()))
    }

    /// Feed one inbound message from the transport.
    pub fn deliver(&self, message: InboundMessage) -> Result<(), ConnectionError> {
        self.send(Command::Deliver(message))
    }

    /// Parse and feed one inbound text frame.
    pub fn deliver_text(&self, text: &str) -> Result<(), ConnectionError> {
        let message = InboundMessage::from_json(text)?;
        self.deliver(message)
    }

    /// Drop auth and subscriptions; nothing happens until `resume` or a new
    /// transport.
    pub fn close(&self) -> Result<(), ConnectionError> {
        self.send(Command::Lifecycle(Event::Close))
    }

    pub fn resume(&self) -> Result<(), ConnectionError> {
        self.send(Command::Lifecycle(Event::Resume))
    }

    /// Current controller state and subscription flags.
    pub async fn snapshot(&self) -> Result<ControllerSnapshot, ConnectionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply))?;
        rx.await.map_err(|_| ConnectionError::Shutdown)
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_sync(&self) -> broadcast::Receiver<SyncEvent> {
        self.sync_tx.subscribe()
    }
}

// ============================================================================
// ConnectionActor (internal)
// ============================================================================

struct ConnectionActor {
    config: ClientConfig,
    controller: Controller,
    transport: Option<Arc<dyn Transport>>,
    generation: u64,
    tokens: Arc<dyn TokenProvider>,
    store: Arc<dyn DocumentStore>,
    self_tx: mpsc::WeakUnboundedSender<Command>,
    timers: Vec<JoinHandle<()>>,
    status_tx: broadcast::Sender<ConnectionStatus>,
    sync_tx: broadcast::Sender<SyncEvent>,
    last_status: ControllerSnapshot,
}

impl ConnectionActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            self.handle_command(cmd).await;
        }
        self.cancel_timers();
        debug!("connection actor shutting down: channel closed");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::AttachTransport(transport) => {
                self.generation += 1;
                self.transport = Some(transport);
                self.lifecycle(Event::TransportAvailable {
                    generation: self.generation,
                })
                .await;
            }
            Command::Lifecycle(event) => self.lifecycle(event).await,
            Command::StopStreaming(stream_id) => {
                self.send_topic(Topic::StopStreaming { stream_id }).await;
            }
            Command::Deliver(message) => self.on_inbound(message).await,
            Command::Snapshot(reply) => {
                let _ = reply.send(self.controller.snapshot());
            }
        }
    }

    async fn lifecycle(&mut self, event: Event) {
        let effects = self.controller.handle(event);
        for effect in effects {
            self.execute(effect).await;
        }
        self.publish_status();
    }

    async fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Send(topic) => self.send_topic(topic).await,
            Effect::Authenticate { generation } => self.spawn_auth(generation),
            Effect::Schedule { delay, event } => {
                let tx = self.self_tx.clone();
                self.timers.retain(|t| !t.is_finished());
                self.timers.push(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(tx) = tx.upgrade() {
                        let _ = tx.send(Command::Lifecycle(event));
                    }
                }));
            }
            Effect::CancelScheduled => self.cancel_timers(),
        }
    }

    async fn send_topic(&mut self, topic: Topic) {
        let kind = topic.message_type();
        let Some(transport) = self.transport.clone() else {
            error!("cannot send {}: no transport attached", kind);
            let _ = self.status_tx.send(ConnectionStatus::SendFailed(format!(
                "{kind}: no transport attached"
            )));
            return;
        };
        let message = OutboundMessage::new(topic, self.config.client_tab_id.clone());
        debug!("sending {} (request {})", kind, message.request_id);
        if let Err(e) = transport.send(message).await {
            error!("send {} failed: {}", kind, e);
            let _ = self
                .status_tx
                .send(ConnectionStatus::SendFailed(format!("{kind}: {e}")));
        }
    }

    fn spawn_auth(&self, generation: u64) {
        let transport = self.transport.clone();
        let tokens = Arc::clone(&self.tokens);
        let tab = self.config.client_tab_id.clone();
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            let event = match authenticate(transport, tokens, tab).await {
                Ok(()) => Event::AuthSucceeded { generation },
                Err(e) => Event::AuthFailed {
                    generation,
                    reason: e.to_string(),
                },
            };
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::Lifecycle(event));
            }
        });
    }

    async fn on_inbound(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::SubscribedToDocument { id } => {
                self.lifecycle(Event::SubscribedToDocument(id)).await
            }
            InboundMessage::SubscribedToConversation { id } => {
                self.lifecycle(Event::SubscribedToConversation(id)).await
            }
            InboundMessage::SubscribedToBatchTable { id } => {
                self.lifecycle(Event::SubscribedToBatchTable(id)).await
            }
            InboundMessage::Patch(batch) => {
                if batch.is_empty() {
                    debug!("ignoring empty batch");
                    return;
                }
                let report = apply_batch(self.store.as_ref(), &batch, now_millis());
                if !report.skipped.is_empty() {
                    warn!(
                        "batch for {:?}/{:?}: {} operation(s) skipped",
                        batch.document_id,
                        batch.conversation_id,
                        report.skipped.len()
                    );
                }
                let _ = self.sync_tx.send(SyncEvent::BatchApplied {
                    document_id: batch.document_id,
                    conversation_id: batch.conversation_id,
                    report,
                });
            }
            InboundMessage::Unknown => debug!("ignoring unrecognised inbound message"),
        }
    }

    fn publish_status(&mut self) {
        let snapshot = self.controller.snapshot();
        if snapshot != self.last_status {
            self.last_status = snapshot.clone();
            let _ = self.status_tx.send(ConnectionStatus::Changed(snapshot));
        }
    }

    fn cancel_timers(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }
}

/// One auth handshake: fetch a token and send it over the transport.
///
/// Success means the message was handed to the socket; the backend doesn't
/// acknowledge authentication.
async fn authenticate(
    transport: Option<Arc<dyn Transport>>,
    tokens: Arc<dyn TokenProvider>,
    client_tab_id: String,
) -> Result<(), ConnectionError> {
    let transport = transport
        .filter(|t| t.is_ready())
        .ok_or(ConnectionError::TransportNotReady)?;
    let token = tokens.token().await.ok_or(ConnectionError::NoToken)?;
    transport
        .send(OutboundMessage::new(Topic::Authenticate { token }, client_tab_id))
        .await?;
    Ok(())
}

// ============================================================================
// Public spawn function
// ============================================================================

/// Spawn a connection actor on the current tokio runtime.
///
/// No transport is attached yet; call
/// [`ConnectionHandle::attach_transport`] once the socket is open.
pub fn spawn_connection(
    config: ClientConfig,
    tokens: Arc<dyn TokenProvider>,
    store: Arc<dyn DocumentStore>,
) -> ConnectionHandle {
    // broadcast::channel panics on zero; configs built in code skip validation.
    let capacity = config.event_channel_capacity.max(1);
    if capacity != config.event_channel_capacity {
        warn!("event_channel_capacity 0 is invalid, using {}", capacity);
    }
    let (tx, rx) = mpsc::unbounded_channel();
    let (status_tx, _) = broadcast::channel(capacity);
    let (sync_tx, _) = broadcast::channel(capacity);

    info!("spawning connection actor (tab {})", config.client_tab_id);
    let controller = Controller::new(config.auth_retry_backoff(), config.subscribe_retry_delay());
    let actor = ConnectionActor {
        last_status: controller.snapshot(),
        controller,
        config,
        transport: None,
        generation: 0,
        tokens,
        store,
        self_tx: tx.downgrade(),
        timers: Vec::new(),
        status_tx: status_tx.clone(),
        sync_tx: sync_tx.clone(),
    };
    tokio::spawn(actor.run(rx));

    ConnectionHandle {
        tx,
        status_tx,
        sync_tx,
    }
}
