//! Collaborator seams: the socket and the credential source.
//!
//! The actor never owns a socket directly. Whoever opens the connection hands
//! it over as an `Arc<dyn Transport>` and feeds inbound frames back through
//! [`ConnectionHandle::deliver`](crate::ConnectionHandle::deliver).

use async_trait::async_trait;
use nbsync_types::OutboundMessage;

/// Errors a transport can report on send.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("transport not initialized")]
    NotReady,
    #[error("transport closed")]
    Closed,
    #[error("send failed: {0}")]
    Send(String),
}

/// A persistent bidirectional message channel.
///
/// Sends are fire-and-forget: `Ok` only means the message was handed to the
/// socket, never that the backend acted on it.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the underlying socket is open.
    fn is_ready(&self) -> bool;

    async fn send(&self, message: OutboundMessage) -> Result<(), TransportError>;
}

/// Supplies the current user's auth token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// `None` when no token is available yet (logged out, refresh pending).
    async fn token(&self) -> Option<String>;
}

/// A [`TokenProvider`] that always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}
