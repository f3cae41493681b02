//! nbsync connection client
//!
//! Keeps one persistent connection authenticated and subscribed to the
//! document, conversation and batch-table topics the app asks for, and feeds
//! inbound change batches into the patch reconciler.
//!
//! - [`lifecycle`]: the pure connection state machine
//! - [`actor`]: the tokio task that executes it against a [`Transport`]
//! - [`config`]: RON-backed [`ClientConfig`]

pub mod actor;
pub mod config;
pub mod constants;
pub mod lifecycle;
pub mod subscriptions;
pub mod transport;

pub use actor::{ConnectionHandle, spawn_connection};
pub use config::{ClientConfig, ConfigError};
pub use lifecycle::{Controller, ControllerSnapshot, Effect, Event, State};
pub use subscriptions::{ConnectionStatus, SyncEvent};
pub use transport::{StaticToken, TokenProvider, Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("transport not ready")]
    TransportNotReady,
    #[error("no auth token available")]
    NoToken,
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("invalid inbound message: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("connection actor shut down")]
    Shutdown,
}
