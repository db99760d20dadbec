//! Expansion Workflow - select-then-confirm node expansion
//!
//! Per node: `idle -> selected -> expanding -> idle`. The first request on a
//! node only selects it; a second request on the already selected node
//! starts an expansion. A single job slot holds the node being expanded,
//! so at most one expansion is in flight across the whole canvas.
//!
//! The workflow is split around the collaborator call:
//!
//! ```text
//! request(node) ──► ExpandStep::Start(ticket)
//!                         │
//!                         ▼  (no lock held)
//!               WordExpander::expand(concept)
//!                         │
//!                         ▼
//! finish(ticket, result) ──► ExpansionOutcome
//! ```
//!
//! `finish` always empties the job slot and clears the node's loading flag,
//! whatever the result. A ticket dropped before `finish` (caller cancelled)
//! is released through `abandon` instead.

use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::ExpansionConfig;
use crate::error::ExpansionError;
use crate::generation::GeneratedWord;
use crate::graph::{normalize_text, ExpansionBatch, GraphStore, NodeId};

/// Proof that an expansion was started; must be handed back to `finish`
#[derive(Debug)]
#[must_use = "an expansion ticket must be passed to ExpansionWorkflow::finish"]
pub struct ExpansionTicket {
    node_id: NodeId,
    concept: String,
}

impl ExpansionTicket {
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Text sent to the collaborator
    pub fn concept(&self) -> &str {
        &self.concept
    }
}

/// Result of [`ExpansionWorkflow::request`]
#[derive(Debug)]
pub enum ExpandStep {
    /// Another expansion is in flight; nothing changed
    Busy,
    /// The node became the selected node; no expansion yet
    Selected(NodeId),
    /// Expansion started; call the collaborator, then `finish`
    Start(ExpansionTicket),
    /// No such node
    UnknownNode(NodeId),
    /// Selection mode is on; clicks only toggle the multi-select set
    Ignored,
}

/// Result of [`ExpansionWorkflow::finish`]
#[derive(Debug)]
pub enum ExpansionOutcome {
    /// New children appended in one batch
    Expanded(ExpansionBatch),
    /// Every candidate already existed (or none came back); nothing recorded
    NoNewConcepts,
    /// Collaborator failed or the node vanished; graph unchanged
    Failed(ExpansionError),
}

impl ExpansionOutcome {
    pub fn added(&self) -> usize {
        match self {
            ExpansionOutcome::Expanded(batch) => batch.children.len(),
            _ => 0,
        }
    }
}

/// Selection and job slot of the expansion state machine
#[derive(Debug, Clone)]
pub struct ExpansionWorkflow {
    /// Node selected for expansion (also the canvas's focused node)
    selected: Option<NodeId>,
    /// Node currently being expanded
    job: Option<NodeId>,
    child_jitter: f32,
}

impl Default for ExpansionWorkflow {
    fn default() -> Self {
        Self::new(&ExpansionConfig::default())
    }
}

impl ExpansionWorkflow {
    pub fn new(config: &ExpansionConfig) -> Self {
        Self {
            selected: None,
            job: None,
            child_jitter: config.child_jitter,
        }
    }

    pub fn selected(&self) -> Option<NodeId> {
        self.selected
    }

    pub fn set_selected(&mut self, node: Option<NodeId>) {
        self.selected = node;
    }

    /// Node currently being expanded
    pub fn job(&self) -> Option<NodeId> {
        self.job
    }

    pub fn is_busy(&self) -> bool {
        self.job.is_some()
    }

    /// Select-or-expand step
    ///
    /// While busy the request is dropped without touching the selection.
    pub fn request(&mut self, store: &mut GraphStore, node_id: NodeId) -> ExpandStep {
        if let Some(busy) = self.job {
            debug!(node_id = %node_id, busy_with = %busy, "Expansion busy, request ignored");
            return ExpandStep::Busy;
        }

        let Some(node) = store.node(node_id) else {
            return ExpandStep::UnknownNode(node_id);
        };

        if self.selected != Some(node_id) {
            self.selected = Some(node_id);
            debug!(node_id = %node_id, "Node selected");
            return ExpandStep::Selected(node_id);
        }

        let concept = node.text.clone();
        self.job = Some(node_id);
        store.set_loading(node_id, true);
        info!(node_id = %node_id, concept = %concept, "Expansion started");

        ExpandStep::Start(ExpansionTicket { node_id, concept })
    }

    /// Complete an expansion started by [`request`](Self::request)
    pub fn finish(
        &mut self,
        store: &mut GraphStore,
        ticket: ExpansionTicket,
        result: Result<Vec<GeneratedWord>, ExpansionError>,
    ) -> ExpansionOutcome {
        let node_id = ticket.node_id;
        if self.job != Some(node_id) {
            warn!(node_id = %node_id, "Finishing an expansion that does not own the job slot");
        }
        self.job = None;
        store.set_loading(node_id, false);

        let words = match result {
            Ok(words) => words,
            Err(e) => {
                warn!(node_id = %node_id, "Expansion failed: {}", e);
                return ExpansionOutcome::Failed(e);
            }
        };

        if !store.contains(node_id) {
            warn!(node_id = %node_id, "Expanded node no longer exists");
            return ExpansionOutcome::Failed(ExpansionError::UnknownNode(node_id));
        }

        let texts = new_concepts(&store.child_texts(node_id), words);
        if texts.is_empty() {
            info!(node_id = %node_id, "Expansion produced no new concepts");
            return ExpansionOutcome::NoNewConcepts;
        }

        match store.add_expansion(node_id, &texts, self.child_jitter) {
            Some(batch) => ExpansionOutcome::Expanded(batch),
            None => ExpansionOutcome::NoNewConcepts,
        }
    }

    /// Release the job slot of an expansion whose ticket never reached
    /// `finish`; the graph is left unchanged
    pub fn abandon(&mut self, store: &mut GraphStore, node_id: NodeId) -> bool {
        if self.job != Some(node_id) {
            return false;
        }
        self.job = None;
        store.set_loading(node_id, false);
        warn!(node_id = %node_id, "Expansion abandoned before completion");
        true
    }

    /// Forget the selection (canvas cleared); an in-flight job still finishes
    pub fn clear_selection(&mut self) {
        self.selected = None;
    }
}

/// Candidates not already present under the parent, first occurrence wins
///
/// Comparison is case-insensitive and ignores surrounding whitespace, both
/// against existing children and within the candidate list itself.
pub fn new_concepts(existing: &HashSet<String>, words: Vec<GeneratedWord>) -> Vec<String> {
    let mut seen = existing.clone();
    words
        .into_iter()
        .filter_map(|word| {
            let text = word.text.trim().to_string();
            if text.is_empty() {
                return None;
            }
            seen.insert(normalize_text(&text)).then_some(text)
        })
        .collect()
}
