//! Patch reconciler for nbsync.
//!
//! Applies batches of change operations pushed by the backend to the locally
//! cached document model:
//!
//! - [`blocks`]: ordered block list (linked by `block_above_uuid`)
//! - [`messages`]: paginated conversation messages, kept chronological
//! - [`plan`]: conversation plans and their one-level step tree
//! - [`project`]: project metadata, dual-written to document listings
//!
//! Field updates go through [`Patchable`], which type-checks known fields and
//! falls back to a nested key-path walk ([`path`]) for schemaless ones.
//!
//! The reconciler keeps no state between calls. [`apply_batch`] reads the
//! entities a batch needs from a [`DocumentStore`], mutates local copies, and
//! writes each changed entity back once.

mod error;

pub mod batch;
pub mod blocks;
pub mod fields;
pub mod messages;
pub mod path;
pub mod plan;
pub mod project;
pub mod store;

pub use batch::{
    BatchReport, Reconciled, SkippedOp, Touched, apply_batch, reconcile_document,
    reconcile_messages, reconcile_plan,
};
pub use error::{PatchError, Result};
pub use fields::Patchable;
pub use project::DocumentSummary;
pub use store::{DocumentStore, MemoryStore};
