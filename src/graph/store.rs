//! Graph Store - canonical nodes, links and history
//!
//! Pure data, no rendering. Every structural change (node, link or history
//! count changed) re-serialises the full snapshot to the attached
//! [`SnapshotStore`], if any.

use egui::Pos2;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use super::persistence::{self, SnapshotStore};
use super::types::{
    normalize_text, GraphSnapshot, HistoryAction, HistoryEntry, Link, Node, NodeId, ResolvedLink,
    StructureCounts,
};

/// Result of a batch expansion append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionBatch {
    pub parent: NodeId,
    pub children: Vec<NodeId>,
}

/// Owns the node, link and history collections
pub struct GraphStore {
    nodes: Vec<Node>,
    node_index: HashMap<NodeId, usize>,
    links: Vec<Link>,
    /// child id → parent id
    parent_index: HashMap<NodeId, NodeId>,
    history: Vec<HistoryEntry>,
    persistence: Option<Box<dyn SnapshotStore>>,
    last_persisted: StructureCounts,
    viewport_center: Pos2,
    manual_jitter: f32,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("nodes", &self.nodes.len())
            .field("links", &self.links.len())
            .field("history", &self.history.len())
            .field("persistent", &self.persistence.is_some())
            .finish()
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore {
    /// Empty, non-persistent store
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            node_index: HashMap::new(),
            links: Vec::new(),
            parent_index: HashMap::new(),
            history: Vec::new(),
            persistence: None,
            last_persisted: StructureCounts::default(),
            viewport_center: Pos2::ZERO,
            manual_jitter: 50.0,
        }
    }

    /// Restore from `store` and keep saving into it
    pub fn with_persistence(store: Box<dyn SnapshotStore>) -> Self {
        let loaded = persistence::load_snapshot(store.as_ref());
        let mut graph = Self::new();
        for node in loaded.nodes {
            graph.insert_node(node);
        }
        for link in loaded.links {
            graph.insert_link(link);
        }
        graph.history = loaded.history;
        graph.last_persisted = graph.counts();
        graph.persistence = Some(store);

        info!(
            nodes = graph.nodes.len(),
            links = graph.links.len(),
            history = graph.history.len(),
            "Graph store restored"
        );
        graph
    }

    /// Builder: full width of the random offset used by [`add_node`](Self::add_node)
    pub fn with_manual_jitter(mut self, jitter: f32) -> Self {
        self.manual_jitter = jitter;
        self
    }

    /// Roots added by hand are placed around this point
    pub fn set_viewport_center(&mut self, center: Pos2) {
        self.viewport_center = center;
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Chronological
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn snapshot(&self) -> GraphSnapshot<'_> {
        GraphSnapshot {
            nodes: &self.nodes,
            links: &self.links,
            history: &self.history,
        }
    }

    pub fn counts(&self) -> StructureCounts {
        StructureCounts {
            nodes: self.nodes.len(),
            links: self.links.len(),
            history: self.history.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.node_index.get(&id).map(|&idx| &self.nodes[idx])
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node_index.contains_key(&id)
    }

    /// Source of the unique link targeting `id`
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.parent_index.get(&id).copied()
    }

    /// Nodes whose parent link originates at `id`, in insertion order
    pub fn children_of(&self, id: NodeId) -> impl Iterator<Item = &Node> + '_ {
        self.links
            .iter()
            .filter(move |l| l.source == id)
            .filter_map(move |l| self.node(l.target))
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        self.links.iter().any(|l| l.source == id)
    }

    /// Look up both endpoints of a link
    pub fn resolve_link<'a>(&'a self, link: &'a Link) -> Option<ResolvedLink<'a>> {
        Some(ResolvedLink {
            link,
            source: self.node(link.source)?,
            target: self.node(link.target)?,
        })
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Add a node by direct user action
    ///
    /// With a parent the node becomes its child one level deeper, placed
    /// near the parent. An unknown parent degrades to a parentless node at
    /// level 1 (no link is created, so no link can dangle).
    pub fn add_node(&mut self, text: impl Into<String>, parent_id: Option<NodeId>) -> Node {
        let text = text.into();
        let width = self.manual_jitter;
        let mut rng = rand::thread_rng();
        let mut jitter = || (rng.gen::<f32>() - 0.5) * width;

        let parent = parent_id.and_then(|id| self.node(id).cloned());
        let node = match (parent_id, parent) {
            (Some(_), Some(parent)) => {
                let (dx, dy) = (jitter(), jitter());
                Node::child(text, parent.level + 1, parent.x + dx, parent.y + dy)
            }
            (Some(missing), None) => {
                warn!(parent_id = %missing, "Parent not found, adding node at level 1");
                let (dx, dy) = (jitter(), jitter());
                let mut node = Node::root(
                    text,
                    self.viewport_center.x + dx,
                    self.viewport_center.y + dy,
                );
                node.level = 1;
                node
            }
            (None, _) => {
                let (dx, dy) = (jitter(), jitter());
                Node::root(text, self.viewport_center.x + dx, self.viewport_center.y + dy)
            }
        };

        let action = if parent_id.is_some() {
            HistoryAction::Expand
        } else {
            HistoryAction::Create
        };

        if let Some(parent_id) = parent_id.filter(|id| self.contains(*id)) {
            self.insert_node(node.clone());
            self.insert_link(Link::new(parent_id, node.id));
        } else {
            self.insert_node(node.clone());
        }
        self.history
            .push(HistoryEntry::new(node.text.clone(), action, Some(node.id)));

        debug!(node_id = %node.id, level = node.level, "Node added");
        self.persist_if_changed();
        node
    }

    /// Append one expansion batch: a child and a link per text, one history entry
    ///
    /// Returns `None` (and records nothing) when the parent is gone or
    /// `texts` is empty.
    pub fn add_expansion(
        &mut self,
        parent_id: NodeId,
        texts: &[String],
        jitter: f32,
    ) -> Option<ExpansionBatch> {
        let parent = self.node(parent_id)?.clone();
        if texts.is_empty() {
            return None;
        }

        let mut rng = rand::thread_rng();
        let mut children = Vec::with_capacity(texts.len());
        for text in texts {
            let dx = (rng.gen::<f32>() - 0.5) * jitter;
            let dy = (rng.gen::<f32>() - 0.5) * jitter;
            let child = Node::child(text.clone(), parent.level + 1, parent.x + dx, parent.y + dy);
            let child_id = child.id;
            self.insert_node(child);
            self.insert_link(Link::new(parent_id, child_id));
            children.push(child_id);
        }

        self.history.push(HistoryEntry::new(
            format!("Expanded: {} (+{})", parent.text, children.len()),
            HistoryAction::Expand,
            Some(parent_id),
        ));

        info!(parent_id = %parent_id, count = children.len(), "Expansion appended");
        self.persist_if_changed();

        Some(ExpansionBatch {
            parent: parent_id,
            children,
        })
    }

    /// Normalised texts of the existing children of `id`
    pub fn child_texts(&self, id: NodeId) -> HashSet<String> {
        self.children_of(id)
            .map(|n| normalize_text(&n.text))
            .collect()
    }

    /// Toggle the transient loading flag
    pub fn set_loading(&mut self, id: NodeId, loading: bool) -> bool {
        match self.node_index.get(&id) {
            Some(&idx) => {
                self.nodes[idx].loading = loading;
                true
            }
            None => false,
        }
    }

    /// Copy live positions back (engine-owned state) without persisting
    pub fn update_positions<I>(&mut self, positions: I)
    where
        I: IntoIterator<Item = (NodeId, Pos2)>,
    {
        for (id, pos) in positions {
            if let Some(&idx) = self.node_index.get(&id) {
                self.nodes[idx].x = pos.x;
                self.nodes[idx].y = pos.y;
            }
        }
    }

    /// Clear everything, including persisted state
    pub fn remove_all(&mut self) {
        self.nodes.clear();
        self.node_index.clear();
        self.links.clear();
        self.parent_index.clear();
        self.history.clear();
        self.last_persisted = StructureCounts::default();

        if let Some(ref store) = self.persistence {
            if let Err(e) = persistence::clear_snapshot(store.as_ref()) {
                warn!("Failed to clear persisted snapshot: {}", e);
            }
        }
        info!("Graph cleared");
    }

    // =========================================================================
    // PERSISTENCE
    // =========================================================================

    /// Save if node, link or history count changed since the last save
    pub fn persist_if_changed(&mut self) -> bool {
        if self.counts() == self.last_persisted {
            return false;
        }
        self.persist()
    }

    /// Save unconditionally; failures are logged, never raised
    pub fn persist(&mut self) -> bool {
        let Some(ref store) = self.persistence else {
            self.last_persisted = self.counts();
            return false;
        };

        match persistence::save_snapshot(store.as_ref(), &self.nodes, &self.links, &self.history)
        {
            Ok(()) => {
                self.last_persisted = self.counts();
                debug!(nodes = self.nodes.len(), "Snapshot persisted");
                true
            }
            Err(e) => {
                warn!("Failed to persist snapshot: {}", e);
                false
            }
        }
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn insert_node(&mut self, node: Node) {
        if self.node_index.contains_key(&node.id) {
            warn!(node_id = %node.id, "Duplicate node id ignored");
            return;
        }
        self.node_index.insert(node.id, self.nodes.len());
        self.nodes.push(node);
    }

    fn insert_link(&mut self, link: Link) {
        if !self.contains(link.source) || !self.contains(link.target) {
            warn!(source = %link.source, target = %link.target, "Link endpoint missing, ignored");
            return;
        }
        if self.parent_index.contains_key(&link.target) {
            warn!(target = %link.target, "Node already has a parent, link ignored");
            return;
        }
        self.parent_index.insert(link.target, link.source);
        self.links.push(link);
    }
}
