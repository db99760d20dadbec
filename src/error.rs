//! Error types
//!
//! No error here is fatal: each is isolated to the operation that raised it.

use std::time::Duration;
use thiserror::Error;

use crate::graph::NodeId;

/// Errors raised while expanding a node.
#[derive(Debug, Clone, Error)]
pub enum ExpansionError {
    /// The word-expansion collaborator failed.
    #[error("word expansion failed: {0}")]
    Collaborator(String),

    /// The collaborator did not answer in time.
    #[error("word expansion timed out after {0:?}")]
    TimedOut(Duration),

    /// The node disappeared (canvas cleared) while the call was in flight.
    #[error("node not found: {0}")]
    UnknownNode(NodeId),
}

impl ExpansionError {
    /// Whether the user can simply try again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ExpansionError::Collaborator(_) | ExpansionError::TimedOut(_)
        )
    }
}

/// Errors raised by local snapshot persistence.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Storage unavailable.
    #[error("snapshot storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A slot held data that does not parse.
    #[error("snapshot slot {slot} is corrupt: {reason}")]
    Corrupt { slot: &'static str, reason: String },

    /// Encoding a slot failed.
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PersistenceError {
    pub fn is_recoverable(&self) -> bool {
        // Startup falls back to an empty canvas for every variant
        true
    }
}

/// Errors raised by the document library.
#[derive(Debug, Clone, Error)]
pub enum DocumentError {
    /// Nothing selected to bundle.
    #[error("no concepts selected")]
    EmptySelection,

    /// Another generation is still running.
    #[error("a document is already being generated")]
    Busy,

    /// The document-generation collaborator failed.
    #[error("document generation failed: {0}")]
    Generation(String),

    /// The collaborator did not answer in time.
    #[error("document generation timed out after {0:?}")]
    TimedOut(Duration),

    /// Saving to the remote store failed.
    #[error("failed to save document: {0}")]
    StoreInsert(String),

    /// Deleting from the remote store failed; local state left untouched.
    #[error("failed to delete document: {0}")]
    StoreDelete(String),

    /// Listing the remote store failed.
    #[error("failed to list documents: {0}")]
    StoreList(String),
}

impl DocumentError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DocumentError::EmptySelection)
    }
}
