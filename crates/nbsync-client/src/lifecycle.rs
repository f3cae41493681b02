//! Connection lifecycle controller.
//!
//! A pure state machine: [`Controller::handle`] takes one [`Event`] and returns
//! the [`Effect`]s the caller must execute. It never touches a socket or a
//! clock, which keeps every transition testable without a runtime.
//!
//! ```text
//!                   TransportAvailable (from any state)
//!                                │
//!                                ▼
//!      ┌──── AuthFailed ───▶ Authenticating ◀──── not authenticated ────┐
//!      │  (retry after 1s)       │                                       │
//!      └─────────────────────────┤ AuthSucceeded                         │
//!                                ▼                                       │
//!                     last requested state ──────────────────────────────┤
//!                                                                        │
//!   Idle ──SubscribeDocumentAndConversation──▶ SubscribingToDocumentAndConversation
//!    ▲   ──SubscribeBatchTable──────────────▶ SubscribingToBatchTable
//!    │                                                │
//!    └──────── all confirmations received ────────────┘
//!
//!   Close ──▶ Closed ──Resume──▶ Idle
//! ```
//!
//! Asynchronous work (auth handshakes, delayed retries) is handed out as
//! effects tagged with the transport generation or timer epoch current at the
//! time. Results carrying an older tag are dropped, so a superseded transport
//! or a cancelled timer can never move the machine.

use std::time::Duration;

use nbsync_types::{BatchTableId, ConversationId, DocumentId, Topic, TopicId};
use tracing::{debug, info, warn};

use crate::constants::{AUTH_RETRY_BACKOFF, SUBSCRIBE_RETRY_DELAY};

/// Controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Idle,
    Authenticating,
    SubscribingToDocumentAndConversation,
    SubscribingToBatchTable,
    Closed,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Authenticating => "authenticating",
            State::SubscribingToDocumentAndConversation => "subscribing_to_document_and_conversation",
            State::SubscribingToBatchTable => "subscribing_to_batch_table",
            State::Closed => "closed",
        }
    }
}

/// Inputs to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A new transport replaced whatever was there before.
    TransportAvailable { generation: u64 },
    AuthSucceeded { generation: u64 },
    AuthFailed { generation: u64, reason: String },
    /// Backoff timer after a failed auth.
    RetryAuth { epoch: u64 },
    /// Raw route parameters; validated by the controller.
    SubscribeDocumentAndConversation {
        document: Option<String>,
        conversation: Option<String>,
    },
    SubscribeBatchTable { batch_table: Option<String> },
    /// Retry timer after an invalid batch-table id.
    RetryBatchTable { epoch: u64 },
    SubscribedToDocument(DocumentId),
    SubscribedToConversation(ConversationId),
    SubscribedToBatchTable(BatchTableId),
    Close,
    Resume,
}

/// Side effects requested by the controller, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send a topic message, fire-and-forget.
    Send(Topic),
    /// Start one auth handshake against transport `generation` and report
    /// back with `AuthSucceeded` / `AuthFailed`.
    Authenticate { generation: u64 },
    /// Feed `event` back after `delay`.
    Schedule { delay: Duration, event: Event },
    /// Drop every pending scheduled event.
    CancelScheduled,
}

/// Read-only view of the controller for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ControllerSnapshot {
    pub state: State,
    pub authenticated: bool,
    pub document: Option<DocumentId>,
    pub conversation: Option<ConversationId>,
    pub batch_table: Option<BatchTableId>,
    pub document_subscribed: bool,
    pub conversation_subscribed: bool,
    pub batch_table_subscribed: bool,
}

/// The lifecycle state machine.
#[derive(Debug)]
pub struct Controller {
    state: State,
    /// Where to go once authenticated.
    last_requested: State,
    authenticated: bool,

    generation: u64,
    epoch: u64,
    /// Transport generation of the handshake currently running.
    auth_in_flight: Option<u64>,

    document: Option<DocumentId>,
    conversation: Option<ConversationId>,
    batch_table: Option<BatchTableId>,
    document_subscribed: bool,
    conversation_subscribed: bool,
    batch_table_subscribed: bool,

    // Subscriptions lost to a transport change or close, to be re-sent once
    // the machine is back in Idle.
    resubscribe_document_and_conversation: bool,
    resubscribe_batch_table: bool,

    auth_backoff: Duration,
    subscribe_retry_delay: Duration,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(AUTH_RETRY_BACKOFF, SUBSCRIBE_RETRY_DELAY)
    }
}

impl Controller {
    pub fn new(auth_backoff: Duration, subscribe_retry_delay: Duration) -> Self {
        Self {
            state: State::Idle,
            last_requested: State::Idle,
            authenticated: false,
            generation: 0,
            epoch: 0,
            auth_in_flight: None,
            document: None,
            conversation: None,
            batch_table: None,
            document_subscribed: false,
            conversation_subscribed: false,
            batch_table_subscribed: false,
            resubscribe_document_and_conversation: false,
            resubscribe_batch_table: false,
            auth_backoff,
            subscribe_retry_delay,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Current timer epoch; scheduled events from older epochs are ignored.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            state: self.state,
            authenticated: self.authenticated,
            document: self.document,
            conversation: self.conversation,
            batch_table: self.batch_table,
            document_subscribed: self.document_subscribed,
            conversation_subscribed: self.conversation_subscribed,
            batch_table_subscribed: self.batch_table_subscribed,
        }
    }

    /// Process one event.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        let mut fx = Vec::new();
        let before = self.state;
        self.dispatch(event, &mut fx);
        if self.state != before {
            debug!("lifecycle {} → {}", before.as_str(), self.state.as_str());
        }
        fx
    }

    fn dispatch(&mut self, event: Event, fx: &mut Vec<Effect>) {
        match event {
            Event::TransportAvailable { generation } => {
                info!("transport available (generation {})", generation);
                self.generation = generation;
                self.auth_in_flight = None;
                self.drop_connection_state(fx);
                self.enter(State::Authenticating, fx);
            }

            Event::AuthSucceeded { generation } => {
                if !self.auth_result_is_current(generation) {
                    debug!("ignoring stale auth success (generation {})", generation);
                    return;
                }
                self.auth_in_flight = None;
                self.authenticated = true;
                info!("authenticated");
                self.enter(self.last_requested, fx);
            }

            Event::AuthFailed { generation, reason } => {
                if !self.auth_result_is_current(generation) {
                    debug!("ignoring stale auth failure (generation {})", generation);
                    return;
                }
                self.auth_in_flight = None;
                warn!("authentication failed: {}; retrying in {:?}", reason, self.auth_backoff);
                fx.push(Effect::Schedule {
                    delay: self.auth_backoff,
                    event: Event::RetryAuth { epoch: self.epoch },
                });
            }

            Event::RetryAuth { epoch } => {
                if epoch != self.epoch || self.state != State::Authenticating {
                    debug!("ignoring stale auth retry (epoch {})", epoch);
                    return;
                }
                self.enter(State::Authenticating, fx);
            }

            Event::SubscribeDocumentAndConversation { document, conversation } => {
                let document = DocumentId::parse(document.as_deref());
                let conversation = ConversationId::parse(conversation.as_deref());
                self.request_document_and_conversation(document, conversation, fx);
            }

            Event::SubscribeBatchTable { batch_table } => {
                let batch_table = BatchTableId::parse(batch_table.as_deref());
                self.request_batch_table(batch_table, fx);
            }

            Event::RetryBatchTable { epoch } => {
                if epoch != self.epoch || self.state != State::SubscribingToBatchTable {
                    debug!("ignoring stale batch-table retry (epoch {})", epoch);
                    return;
                }
                self.enter(State::SubscribingToBatchTable, fx);
            }

            Event::SubscribedToDocument(id) => {
                if self.state == State::Closed || self.document != Some(id) {
                    debug!("ignoring confirmation for document {:?}", id);
                    return;
                }
                self.document_subscribed = true;
                self.check_document_and_conversation_done(fx);
            }

            Event::SubscribedToConversation(id) => {
                if self.state == State::Closed || self.conversation != Some(id) {
                    debug!("ignoring confirmation for conversation {:?}", id);
                    return;
                }
                self.conversation_subscribed = true;
                self.check_document_and_conversation_done(fx);
            }

            Event::SubscribedToBatchTable(id) => {
                if self.state == State::Closed || self.batch_table != Some(id) {
                    debug!("ignoring confirmation for batch table {:?}", id);
                    return;
                }
                self.batch_table_subscribed = true;
                if self.state == State::SubscribingToBatchTable {
                    self.enter(State::Idle, fx);
                }
            }

            Event::Close => self.enter(State::Closed, fx),

            Event::Resume => {
                if self.state == State::Closed {
                    self.enter(State::Idle, fx);
                }
            }
        }
    }

    // ── Requests ─────────────────────────────────────────────────────────

    fn request_document_and_conversation(
        &mut self,
        document: Option<DocumentId>,
        conversation: Option<ConversationId>,
        fx: &mut Vec<Effect>,
    ) {
        let changed = (self.document, self.conversation) != (document, conversation);
        if changed && self.can_send() {
            if let Some(old) = self.document {
                fx.push(Effect::Send(Topic::UnsubscribeDocument { id: old }));
            }
            if let Some(old) = self.conversation {
                fx.push(Effect::Send(Topic::UnsubscribeConversation { id: old }));
            }
        }

        self.document_subscribed = false;
        self.conversation_subscribed = false;
        self.document = document;
        self.conversation = conversation;
        self.last_requested = State::SubscribingToDocumentAndConversation;

        if self.state == State::Closed {
            self.resubscribe_document_and_conversation = true;
            return;
        }
        self.enter(State::SubscribingToDocumentAndConversation, fx);
    }

    fn request_batch_table(&mut self, batch_table: Option<BatchTableId>, fx: &mut Vec<Effect>) {
        if self.batch_table != batch_table && self.can_send() {
            if let Some(old) = self.batch_table {
                fx.push(Effect::Send(Topic::UnsubscribeBatchTable { id: old }));
            }
        }

        self.batch_table_subscribed = false;
        self.batch_table = batch_table;
        self.last_requested = State::SubscribingToBatchTable;
        // A retry timer for the previous request must not fire into this one.
        self.epoch += 1;

        if self.state == State::Closed {
            self.resubscribe_batch_table = true;
            return;
        }
        self.enter(State::SubscribingToBatchTable, fx);
    }

    // ── State entry ──────────────────────────────────────────────────────

    fn enter(&mut self, state: State, fx: &mut Vec<Effect>) {
        self.state = state;
        match state {
            State::Idle => self.enter_idle(fx),
            State::Authenticating => self.enter_authenticating(fx),
            State::SubscribingToDocumentAndConversation => {
                self.resubscribe_document_and_conversation = false;
                if !self.authenticated {
                    return self.enter(State::Authenticating, fx);
                }
                let (Some(document), Some(conversation)) = (self.document, self.conversation)
                else {
                    debug!("document/conversation target invalid, waiting for a new request");
                    return self.enter(State::Idle, fx);
                };
                fx.push(Effect::Send(Topic::SubscribeDocument { id: document }));
                fx.push(Effect::Send(Topic::SubscribeConversation { id: conversation }));
            }
            State::SubscribingToBatchTable => {
                self.resubscribe_batch_table = false;
                if !self.authenticated {
                    return self.enter(State::Authenticating, fx);
                }
                match self.batch_table {
                    Some(id) => fx.push(Effect::Send(Topic::SubscribeBatchTable { id })),
                    None => {
                        debug!(
                            "batch table target invalid, retrying in {:?}",
                            self.subscribe_retry_delay
                        );
                        fx.push(Effect::Schedule {
                            delay: self.subscribe_retry_delay,
                            event: Event::RetryBatchTable { epoch: self.epoch },
                        });
                    }
                }
            }
            State::Closed => {
                info!("connection closed");
                self.auth_in_flight = None;
                self.drop_connection_state(fx);
            }
        }
    }

    fn enter_idle(&mut self, fx: &mut Vec<Effect>) {
        if self.resubscribe_document_and_conversation {
            self.enter(State::SubscribingToDocumentAndConversation, fx);
        } else if self.resubscribe_batch_table {
            self.enter(State::SubscribingToBatchTable, fx);
        }
    }

    fn enter_authenticating(&mut self, fx: &mut Vec<Effect>) {
        if self.auth_in_flight == Some(self.generation) {
            return;
        }
        self.auth_in_flight = Some(self.generation);
        fx.push(Effect::Authenticate {
            generation: self.generation,
        });
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    /// Forget everything tied to the current connection: auth, live
    /// subscriptions and pending timers. Targets are kept and marked for
    /// re-subscription.
    fn drop_connection_state(&mut self, fx: &mut Vec<Effect>) {
        self.authenticated = false;
        self.document_subscribed = false;
        self.conversation_subscribed = false;
        self.batch_table_subscribed = false;
        self.resubscribe_document_and_conversation |=
            self.document.is_some() && self.conversation.is_some();
        self.resubscribe_batch_table |= self.batch_table.is_some();
        self.epoch += 1;
        fx.push(Effect::CancelScheduled);
    }

    fn auth_result_is_current(&self, generation: u64) -> bool {
        self.state == State::Authenticating && self.auth_in_flight == Some(generation)
    }

    /// Unsubscribes only make sense on a live, authenticated connection.
    fn can_send(&self) -> bool {
        self.authenticated && self.state != State::Closed
    }

    fn check_document_and_conversation_done(&mut self, fx: &mut Vec<Effect>) {
        if self.state == State::SubscribingToDocumentAndConversation
            && self.document_subscribed
            && self.conversation_subscribed
        {
            self.enter(State::Idle, fx);
        }
    }
}
