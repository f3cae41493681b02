//! Error types for patch reconciliation.

use thiserror::Error;

use nbsync_types::BlockId;

/// Why a single operation could not be applied.
///
/// None of these abort a batch: the failing operation is skipped and logged,
/// the entity it targeted is left as it was.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// CreateBlock named a predecessor that isn't in the document.
    #[error("predecessor {predecessor:?} of block {block:?} not found")]
    PredecessorNotFound { block: BlockId, predecessor: BlockId },

    /// The mutation path ran into a value that can't hold children.
    #[error("cannot descend into non-container at '{at}' (path '{path}')")]
    NotAContainer { path: String, at: String },

    /// An array was addressed with a key that isn't a valid index.
    #[error("bad array index '{key}' at '{at}' (path '{path}')")]
    BadIndex { path: String, at: String, key: String },

    /// Incremental append onto something that isn't a string.
    #[error("incremental append target '{path}' is not a string")]
    NotAString { path: String },

    /// Incremental append with a non-string fragment.
    #[error("incremental fragment for '{path}' is not a string")]
    FragmentNotAString { path: String },

    /// Mutation with an empty key path.
    #[error("mutation has an empty path")]
    EmptyPath,

    /// Identity or structural fields can't be rewritten by a mutation.
    #[error("field '{field}' is immutable")]
    ImmutableField { field: String },

    /// Replacement value has the wrong shape for a typed field.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// The batch lacks the id needed to route this operation.
    #[error("{op} requires a {route} on the batch")]
    MissingRoute { op: &'static str, route: &'static str },
}

/// Result type for reconciliation steps.
pub type Result<T> = std::result::Result<T, PatchError>;
