//! Local snapshot persistence
//!
//! Three key-value slots (nodes, links, history), each holding a JSON array.
//! Link endpoints are stored as bare ids. Loading never fails: a slot that
//! is missing or corrupt comes back empty.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::types::{HistoryEntry, Link, Node, NodeId, NodeKind};
use crate::error::PersistenceError;

// =============================================================================
// SLOTS
// =============================================================================

/// Storage slot for one collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotSlot {
    Nodes,
    Links,
    History,
}

impl SnapshotSlot {
    pub fn key(&self) -> &'static str {
        match self {
            SnapshotSlot::Nodes => "idea-spark-nodes",
            SnapshotSlot::Links => "idea-spark-links",
            SnapshotSlot::History => "idea-spark-history",
        }
    }

    pub fn all() -> &'static [SnapshotSlot] {
        &[
            SnapshotSlot::Nodes,
            SnapshotSlot::Links,
            SnapshotSlot::History,
        ]
    }
}

/// Durable key-value storage for the graph snapshot
pub trait SnapshotStore: Send + Sync {
    /// Read a slot; `Ok(None)` if it was never written
    fn load(&self, slot: SnapshotSlot) -> Result<Option<String>, PersistenceError>;

    fn save(&self, slot: SnapshotSlot, json: &str) -> Result<(), PersistenceError>;

    fn remove(&self, slot: SnapshotSlot) -> Result<(), PersistenceError>;
}

// =============================================================================
// FILE STORE
// =============================================================================

/// One `<key>.json` file per slot inside a directory
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, slot: SnapshotSlot) -> PathBuf {
        self.dir.join(format!("{}.json", slot.key()))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self, slot: SnapshotSlot) -> Result<Option<String>, PersistenceError> {
        match std::fs::read_to_string(self.path(slot)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, slot: SnapshotSlot, json: &str) -> Result<(), PersistenceError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path(slot), json)?;
        Ok(())
    }

    fn remove(&self, slot: SnapshotSlot) -> Result<(), PersistenceError> {
        match std::fs::remove_file(self.path(slot)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-process store; clones share the same slots, so a second store built
/// from a clone behaves like a reload.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    slots: Arc<Mutex<HashMap<SnapshotSlot, String>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw slot contents (for tests and diagnostics)
    pub fn raw(&self, slot: SnapshotSlot) -> Option<String> {
        self.slots
            .lock()
            .ok()
            .and_then(|slots| slots.get(&slot).cloned())
    }

    /// Overwrite a slot directly (e.g. to simulate corrupt data)
    pub fn put_raw(&self, slot: SnapshotSlot, json: impl Into<String>) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.insert(slot, json.into());
        }
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, slot: SnapshotSlot) -> Result<Option<String>, PersistenceError> {
        Ok(self.raw(slot))
    }

    fn save(&self, slot: SnapshotSlot, json: &str) -> Result<(), PersistenceError> {
        self.put_raw(slot, json);
        Ok(())
    }

    fn remove(&self, slot: SnapshotSlot) -> Result<(), PersistenceError> {
        if let Ok(mut slots) = self.slots.lock() {
            slots.remove(&slot);
        }
        Ok(())
    }
}

// =============================================================================
// ENCODE / DECODE
// =============================================================================

/// Node as written by any version of the canvas; `level` may be absent in
/// older data and the loading flag is ignored.
#[derive(Debug, Deserialize)]
struct StoredNode {
    id: NodeId,
    text: String,
    #[serde(rename = "type")]
    kind: NodeKind,
    #[serde(default)]
    level: Option<u32>,
    #[serde(default)]
    x: Option<f32>,
    #[serde(default)]
    y: Option<f32>,
}

impl From<StoredNode> for Node {
    fn from(stored: StoredNode) -> Self {
        let level = stored.level.unwrap_or(match stored.kind {
            NodeKind::Root => 0,
            NodeKind::Child => 1,
        });
        Node {
            id: stored.id,
            text: stored.text,
            kind: stored.kind,
            level,
            loading: false,
            x: stored.x.unwrap_or(0.0),
            y: stored.y.unwrap_or(0.0),
        }
    }
}

/// Restored collections
#[derive(Debug, Clone, Default)]
pub struct LoadedSnapshot {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
    pub history: Vec<HistoryEntry>,
}

fn load_slot<T: DeserializeOwned>(store: &dyn SnapshotStore, slot: SnapshotSlot) -> Vec<T> {
    let raw = match store.load(slot) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(slot = slot.key(), "Snapshot slot unavailable: {}", e);
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<T>>(&raw) {
        Ok(items) => items,
        Err(e) => {
            let err = PersistenceError::Corrupt {
                slot: slot.key(),
                reason: e.to_string(),
            };
            warn!("{}, starting empty", err);
            Vec::new()
        }
    }
}

/// Restore a snapshot, repairing anything that would break graph invariants
pub fn load_snapshot(store: &dyn SnapshotStore) -> LoadedSnapshot {
    let stored_nodes: Vec<StoredNode> = load_slot(store, SnapshotSlot::Nodes);
    let stored_links: Vec<Link> = load_slot(store, SnapshotSlot::Links);
    let history: Vec<HistoryEntry> = load_slot(store, SnapshotSlot::History);

    let mut seen = HashSet::new();
    let mut nodes = Vec::with_capacity(stored_nodes.len());
    for stored in stored_nodes {
        if seen.insert(stored.id) {
            nodes.push(Node::from(stored));
        } else {
            warn!(node_id = %stored.id, "Dropping duplicate node id from snapshot");
        }
    }

    let mut has_parent = HashSet::new();
    let mut links = Vec::with_capacity(stored_links.len());
    for link in stored_links {
        if !seen.contains(&link.source) || !seen.contains(&link.target) {
            warn!(
                source = %link.source,
                target = %link.target,
                "Dropping dangling link from snapshot"
            );
            continue;
        }
        if !has_parent.insert(link.target) {
            warn!(target = %link.target, "Dropping second parent link from snapshot");
            continue;
        }
        links.push(link);
    }

    debug!(
        nodes = nodes.len(),
        links = links.len(),
        history = history.len(),
        "Snapshot loaded"
    );

    LoadedSnapshot {
        nodes,
        links,
        history,
    }
}

/// Write all three slots
pub fn save_snapshot(
    store: &dyn SnapshotStore,
    nodes: &[Node],
    links: &[Link],
    history: &[HistoryEntry],
) -> Result<(), PersistenceError> {
    store.save(SnapshotSlot::Nodes, &serde_json::to_string(nodes)?)?;
    store.save(SnapshotSlot::Links, &serde_json::to_string(links)?)?;
    store.save(SnapshotSlot::History, &serde_json::to_string(history)?)?;
    Ok(())
}

/// Remove all three slots
pub fn clear_snapshot(store: &dyn SnapshotStore) -> Result<(), PersistenceError> {
    for slot in SnapshotSlot::all() {
        store.remove(*slot)?;
    }
    Ok(())
}
