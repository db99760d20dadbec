//! Graph data model - nodes, links, history
//!
//! Link endpoints are always stored as bare [`NodeId`]s. Resolved views are
//! produced on demand by [`GraphStore::resolve_link`](super::GraphStore::resolve_link)
//! and never kept as state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// IDS
// =============================================================================

/// Opaque node identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque link identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(pub Uuid);

impl LinkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque history entry identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryId(pub Uuid);

impl HistoryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HistoryId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// NODE
// =============================================================================

/// Role of a node in the forest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    Child,
}

impl NodeKind {
    pub fn is_root(&self) -> bool {
        matches!(self, NodeKind::Root)
    }
}

/// A concept bubble
///
/// `text`, `kind` and `level` never change after creation. `x`/`y` hold the
/// last known position; while the canvas is live the simulation owns the
/// authoritative copy and writes it back before persisting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub level: u32,
    /// Expansion in flight for this node (never persisted as true)
    #[serde(default, rename = "isLoading")]
    pub loading: bool,
    pub x: f32,
    pub y: f32,
}

impl Node {
    pub fn root(text: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            id: NodeId::new(),
            text: text.into(),
            kind: NodeKind::Root,
            level: 0,
            loading: false,
            x,
            y,
        }
    }

    pub fn child(text: impl Into<String>, level: u32, x: f32, y: f32) -> Self {
        Self {
            id: NodeId::new(),
            text: text.into(),
            kind: NodeKind::Child,
            level,
            loading: false,
            x,
            y,
        }
    }

    /// Text normalised for duplicate detection (case-insensitive, trimmed)
    pub fn normalized_text(&self) -> String {
        normalize_text(&self.text)
    }
}

/// Case-insensitive, whitespace-trimmed form of a concept text
pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

// =============================================================================
// LINK
// =============================================================================

/// Directed parent → child expansion edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub source: NodeId,
    pub target: NodeId,
}

impl Link {
    pub fn new(source: NodeId, target: NodeId) -> Self {
        Self {
            id: LinkId::new(),
            source,
            target,
        }
    }
}

/// A link with both endpoints looked up
#[derive(Debug, Clone, Copy)]
pub struct ResolvedLink<'a> {
    pub link: &'a Link,
    pub source: &'a Node,
    pub target: &'a Node,
}

// =============================================================================
// HISTORY
// =============================================================================

/// What a history entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Create,
    Expand,
}

/// Append-only log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: HistoryId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub action: HistoryAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
}

impl HistoryEntry {
    pub fn new(text: impl Into<String>, action: HistoryAction, node_id: Option<NodeId>) -> Self {
        Self {
            id: HistoryId::new(),
            timestamp: Utc::now(),
            text: text.into(),
            action,
            node_id,
        }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Counts used to detect structural change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StructureCounts {
    pub nodes: usize,
    pub links: usize,
    pub history: usize,
}

/// Borrowed view of the three collections
#[derive(Debug, Clone, Copy)]
pub struct GraphSnapshot<'a> {
    pub nodes: &'a [Node],
    pub links: &'a [Link],
    pub history: &'a [HistoryEntry],
}
