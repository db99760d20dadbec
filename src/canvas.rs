//! IdeaCanvas - the core facade
//!
//! Owns the graph store, the simulation working copy, the camera, the
//! expansion workflow and the interaction controller, and keeps them in
//! step: every structural store change is followed by a simulation sync,
//! and live positions are written back to the store before it persists.
//!
//! # Usage
//! ```ignore
//! let mut canvas = IdeaCanvas::open(&settings);
//! canvas.submit_text("ocean");
//!
//! // Each frame:
//! canvas.frame(dt);
//! for view in canvas.node_views() {
//!     draw(view.screen_pos, view.radius, &view.text);
//! }
//! ```

use egui::{Pos2, Vec2};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::CanvasSettings;
use crate::error::ExpansionError;
use crate::expansion::{ExpandStep, ExpansionOutcome, ExpansionTicket, ExpansionWorkflow};
use crate::generation::GeneratedWord;
use crate::graph::{
    Camera2D, FileSnapshotStore, ForceSimulation, GraphStore, HistoryId, Node, NodeId, NodeKind,
    SnapshotStore,
};
use crate::interaction::{
    ClearConfirmation, InteractionController, InteractionMode, PointerAction, PointerEvent,
};

/// Per-frame read model of one node for a renderer
#[derive(Debug, Clone, PartialEq)]
pub struct NodeView {
    pub id: NodeId,
    pub text: String,
    pub kind: NodeKind,
    pub level: u32,
    pub loading: bool,
    pub world_pos: Pos2,
    pub screen_pos: Pos2,
    /// Rendered radius in screen pixels
    pub radius: f32,
    /// Single-node selection (focus)
    pub focused: bool,
    pub multi_selected: bool,
}

/// The canvas core
#[derive(Debug)]
pub struct IdeaCanvas {
    store: GraphStore,
    sim: ForceSimulation,
    camera: Camera2D,
    workflow: ExpansionWorkflow,
    controller: InteractionController,
    viewport: Vec2,
    expansion_timeout: Duration,
    document_timeout: Duration,
}

impl IdeaCanvas {
    /// Canvas without persistence
    pub fn new(settings: &CanvasSettings) -> Self {
        Self::from_store(settings, GraphStore::new())
    }

    /// Canvas restored from (and saving into) `snapshots`
    pub fn with_persistence(settings: &CanvasSettings, snapshots: Box<dyn SnapshotStore>) -> Self {
        Self::from_store(settings, GraphStore::with_persistence(snapshots))
    }

    /// Canvas persisted under `storage.snapshot_dir`
    pub fn open(settings: &CanvasSettings) -> Self {
        let snapshots = FileSnapshotStore::new(&settings.storage.snapshot_dir);
        Self::with_persistence(settings, Box::new(snapshots))
    }

    fn from_store(settings: &CanvasSettings, store: GraphStore) -> Self {
        let viewport = Vec2::new(settings.viewport.width, settings.viewport.height);
        let mut canvas = Self {
            store: store.with_manual_jitter(settings.expansion.manual_jitter),
            sim: ForceSimulation::with_config(settings.physics.clone()),
            camera: Camera2D::with_config(settings.camera.clone()),
            workflow: ExpansionWorkflow::new(&settings.expansion),
            controller: InteractionController::new(),
            viewport,
            expansion_timeout: settings.expansion.timeout(),
            document_timeout: settings.documents.timeout(),
        };
        canvas.set_viewport_size(viewport.x, viewport.y);
        canvas.sim.sync(&canvas.store);
        info!(nodes = canvas.store.nodes().len(), "Canvas ready");
        canvas
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn simulation(&self) -> &ForceSimulation {
        &self.sim
    }

    pub fn camera(&self) -> &Camera2D {
        &self.camera
    }

    pub fn workflow(&self) -> &ExpansionWorkflow {
        &self.workflow
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn mode(&self) -> InteractionMode {
        self.controller.mode()
    }

    /// The single selected (focused) node
    pub fn focused(&self) -> Option<NodeId> {
        self.workflow.selected()
    }

    pub fn viewport(&self) -> Vec2 {
        self.viewport
    }

    /// Upper bound for one word-expansion call
    pub fn expansion_timeout(&self) -> Duration {
        self.expansion_timeout
    }

    /// Upper bound for one document-generation call
    pub fn document_timeout(&self) -> Duration {
        self.document_timeout
    }

    /// Live position of a node
    pub fn position(&self, id: NodeId) -> Option<Pos2> {
        self.sim.position(id)
    }

    /// Snapshot of everything a renderer draws for nodes
    pub fn node_views(&self) -> Vec<NodeView> {
        let scale = self.camera.scale();
        let focused = self.focused();
        self.sim
            .nodes()
            .iter()
            .filter_map(|sim_node| {
                let node = self.store.node(sim_node.id)?;
                Some(NodeView {
                    id: node.id,
                    text: node.text.clone(),
                    kind: node.kind,
                    level: node.level,
                    loading: node.loading,
                    world_pos: sim_node.position,
                    screen_pos: self.camera.world_to_screen(sim_node.position),
                    radius: self.sim.display_radius(node.level) * scale,
                    focused: focused == Some(node.id),
                    multi_selected: self.controller.is_multi_selected(node.id),
                })
            })
            .collect()
    }

    /// Link segments in screen coordinates
    pub fn link_views(&self) -> Vec<(Pos2, Pos2)> {
        self.sim
            .link_segments()
            .map(|(a, b)| (self.camera.world_to_screen(a), self.camera.world_to_screen(b)))
            .collect()
    }

    // =========================================================================
    // FRAME
    // =========================================================================

    /// Advance physics and camera by `dt` seconds; returns ticks run
    pub fn frame(&mut self, dt: f32) -> usize {
        let ticks = self.sim.advance(dt);
        self.camera.update(dt);
        ticks
    }

    pub fn set_viewport_size(&mut self, width: f32, height: f32) {
        self.viewport = Vec2::new(width, height);
        self.sim.set_viewport_size(width, height);
        self.store
            .set_viewport_center(Pos2::new(width / 2.0, height / 2.0));
    }

    // =========================================================================
    // GRAPH MUTATIONS
    // =========================================================================

    /// Add a concept typed by the user
    ///
    /// In normal mode the focused node (if any) becomes the parent and the
    /// new node takes focus. Blank text is ignored.
    pub fn submit_text(&mut self, text: &str) -> Option<Node> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let parent = match self.controller.mode() {
            InteractionMode::Normal => self.workflow.selected(),
            InteractionMode::Selection => None,
        };

        self.write_back_positions();
        let node = self.store.add_node(text, parent);
        self.sync_simulation();

        if !self.controller.is_selection_mode() {
            self.workflow.set_selected(Some(node.id));
            self.focus_camera(node.id);
        }
        Some(node)
    }

    /// Select-or-expand a node (normal mode only)
    ///
    /// In selection mode nothing changes and [`ExpandStep::Ignored`] is
    /// returned; clicks there only toggle the multi-select set.
    pub fn request_expand(&mut self, id: NodeId) -> ExpandStep {
        if self.controller.is_selection_mode() {
            debug!(node_id = %id, "Expand ignored in selection mode");
            return ExpandStep::Ignored;
        }
        let step = self.workflow.request(&mut self.store, id);
        if let ExpandStep::Selected(id) = step {
            self.focus_camera(id);
        }
        step
    }

    /// Apply a collaborator result to an expansion started by
    /// [`request_expand`](Self::request_expand)
    pub fn finish_expansion(
        &mut self,
        ticket: ExpansionTicket,
        result: Result<Vec<GeneratedWord>, ExpansionError>,
    ) -> ExpansionOutcome {
        self.write_back_positions();
        let outcome = self.workflow.finish(&mut self.store, ticket, result);
        if let ExpansionOutcome::Expanded(_) = outcome {
            self.sync_simulation();
        }
        outcome
    }

    /// Release the job slot of an expansion whose ticket was dropped
    /// without reaching [`finish_expansion`](Self::finish_expansion)
    pub fn abandon_expansion(&mut self, node_id: NodeId) -> bool {
        self.workflow.abandon(&mut self.store, node_id)
    }

    // =========================================================================
    // CLICK ROUTING
    // =========================================================================

    /// Process a raw pointer event
    ///
    /// Returns a ticket when the event started an expansion; the caller runs
    /// the collaborator and hands the ticket to
    /// [`finish_expansion`](Self::finish_expansion).
    pub fn handle_pointer(&mut self, event: PointerEvent) -> Option<ExpansionTicket> {
        let action = self
            .controller
            .handle_pointer(event, &mut self.sim, &mut self.camera);
        self.apply_action(action)
    }

    fn apply_action(&mut self, action: PointerAction) -> Option<ExpansionTicket> {
        match action {
            PointerAction::Expand(id) => match self.request_expand(id) {
                ExpandStep::Start(ticket) => return Some(ticket),
                other => debug!(?other, "Expand request handled"),
            },
            PointerAction::ToggleFocus(id) => self.right_click_node(id),
            PointerAction::ClearFocus => self.click_background(),
            PointerAction::DragEnded(_) => self.write_back_positions(),
            PointerAction::MultiSelect { .. } | PointerAction::None => {}
        }
        None
    }

    /// Left click on a node by id
    pub fn click_node(&mut self, id: NodeId) -> Option<ExpansionTicket> {
        if !self.store.contains(id) {
            return None;
        }
        match self.controller.mode() {
            InteractionMode::Selection => {
                self.controller.toggle_multi_select(id);
                None
            }
            InteractionMode::Normal => self.apply_action(PointerAction::Expand(id)),
        }
    }

    /// Toggle the focused node (normal mode only)
    pub fn right_click_node(&mut self, id: NodeId) {
        if self.controller.is_selection_mode() || !self.store.contains(id) {
            return;
        }
        if self.workflow.selected() == Some(id) {
            self.workflow.set_selected(None);
        } else {
            self.workflow.set_selected(Some(id));
            self.focus_camera(id);
        }
    }

    /// Click on empty canvas: clears focus in normal mode
    pub fn click_background(&mut self) {
        if !self.controller.is_selection_mode() {
            self.workflow.set_selected(None);
        }
    }

    /// Focus the node a history entry refers to, if it still exists
    pub fn navigate_history(&mut self, entry: HistoryId) -> bool {
        if self.controller.is_selection_mode() {
            return false;
        }
        let target = self
            .store
            .history()
            .iter()
            .find(|h| h.id == entry)
            .and_then(|h| h.node_id)
            .filter(|id| self.store.contains(*id));

        match target {
            Some(id) => {
                self.workflow.set_selected(Some(id));
                self.focus_camera(id);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // MODES AND OVERLAYS
    // =========================================================================

    pub fn toggle_selection_mode(&mut self) -> InteractionMode {
        self.workflow.set_selected(None);
        self.controller.toggle_selection_mode()
    }

    /// Multi-selected node texts, in toggle order
    pub fn selected_texts(&self) -> Vec<String> {
        self.controller
            .multi_selected()
            .iter()
            .filter_map(|id| self.store.node(*id))
            .map(|node| node.text.clone())
            .collect()
    }

    /// After a document was generated: drop the multi-select set and leave
    /// selection mode
    pub fn finish_document_selection(&mut self) {
        self.controller.finish_selection();
    }

    pub fn document_panel_open(&self) -> bool {
        self.controller.document_panel_open()
    }

    pub fn set_document_panel_open(&mut self, open: bool) {
        self.controller.set_document_panel_open(open);
    }

    // =========================================================================
    // CLEAR
    // =========================================================================

    /// Ask for a clear; nothing happens until the token is confirmed
    pub fn request_clear(&mut self) -> ClearConfirmation {
        self.controller.request_clear()
    }

    /// Clear the graph, persisted state, multi-select set and selection mode
    pub fn confirm_clear(&mut self, token: ClearConfirmation) -> bool {
        if !self.controller.confirm_clear(token) {
            debug!("Clear confirmation rejected");
            return false;
        }
        self.store.remove_all();
        self.sim.clear();
        self.sim.sync(&self.store);
        self.workflow.clear_selection();
        self.controller.reset();
        info!("Canvas cleared");
        true
    }

    // =========================================================================
    // PERSISTENCE
    // =========================================================================

    /// Write live positions back and save unconditionally (e.g. on exit)
    pub fn save(&mut self) -> bool {
        self.write_back_positions();
        self.store.persist()
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn write_back_positions(&mut self) {
        self.store.update_positions(self.sim.positions());
    }

    fn sync_simulation(&mut self) {
        self.sim.sync(&self.store);
    }

    /// One-shot camera centering, suppressed in selection mode
    fn focus_camera(&mut self, id: NodeId) {
        if self.controller.is_selection_mode() {
            return;
        }
        if let Some(pos) = self.sim.position(id) {
            self.camera.focus_on(pos, self.viewport);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemorySnapshotStore;
    use pretty_assertions::assert_eq;

    fn canvas() -> IdeaCanvas {
        IdeaCanvas::new(&CanvasSettings::default())
    }

    #[test]
    fn test_submit_text_chains_under_focus() {
        let mut canvas = canvas();
        let ocean = canvas.submit_text("ocean").unwrap();
        assert_eq!(canvas.focused(), Some(ocean.id));
        assert!(canvas.camera().is_animating());

        let wave = canvas.submit_text("  wave ").unwrap();
        assert_eq!(wave.text, "wave");
        assert_eq!(wave.level, 1);
        assert_eq!(canvas.store().parent_of(wave.id), Some(ocean.id));
        assert!(canvas.submit_text("   ").is_none());
        assert_eq!(canvas.simulation().len(), 2);
    }

    #[test]
    fn test_submit_in_selection_mode_adds_root() {
        let mut canvas = canvas();
        canvas.submit_text("ocean").unwrap();
        canvas.toggle_selection_mode();
        let desert = canvas.submit_text("desert").unwrap();
        assert_eq!(desert.level, 0);
        assert_eq!(canvas.focused(), None);
    }

    #[test]
    fn test_click_expand_flow() {
        let mut canvas = canvas();
        let ocean = canvas.submit_text("ocean").unwrap();
        canvas.click_background();
        assert_eq!(canvas.focused(), None);

        assert!(canvas.click_node(ocean.id).is_none());
        assert_eq!(canvas.focused(), Some(ocean.id));

        let ticket = canvas.click_node(ocean.id).expect("second click expands");
        let outcome = canvas.finish_expansion(
            ticket,
            Ok(vec![GeneratedWord::new("wave"), GeneratedWord::new("reef")]),
        );
        assert_eq!(outcome.added(), 2);
        assert_eq!(canvas.simulation().len(), 3);
        assert_eq!(canvas.simulation().alpha(), 1.0);
    }

    #[test]
    fn test_request_expand_ignored_in_selection_mode() {
        let mut canvas = canvas();
        let ocean = canvas.submit_text("ocean").unwrap();
        canvas.toggle_selection_mode();
        assert_eq!(canvas.focused(), None);

        // Twice: neither a selection nor an expansion may result
        assert!(matches!(canvas.request_expand(ocean.id), ExpandStep::Ignored));
        assert!(matches!(canvas.request_expand(ocean.id), ExpandStep::Ignored));
        assert_eq!(canvas.focused(), None);
        assert!(!canvas.workflow().is_busy());
        assert!(!canvas.store().node(ocean.id).unwrap().loading);
    }

    #[test]
    fn test_abandon_expansion_clears_flags() {
        let mut canvas = canvas();
        let ocean = canvas.submit_text("ocean").unwrap();
        let ticket = match canvas.request_expand(ocean.id) {
            ExpandStep::Start(ticket) => ticket,
            other => panic!("expected Start, got {:?}", other),
        };
        drop(ticket);
        assert!(canvas.workflow().is_busy());

        assert!(canvas.abandon_expansion(ocean.id));
        assert!(!canvas.workflow().is_busy());
        assert!(!canvas.store().node(ocean.id).unwrap().loading);
        assert_eq!(canvas.store().nodes().len(), 1);
    }

    #[test]
    fn test_right_click_toggles_focus() {
        let mut canvas = canvas();
        let ocean = canvas.submit_text("ocean").unwrap();
        canvas.right_click_node(ocean.id);
        assert_eq!(canvas.focused(), None);
        canvas.right_click_node(ocean.id);
        assert_eq!(canvas.focused(), Some(ocean.id));
    }

    #[test]
    fn test_navigate_history() {
        let mut canvas = canvas();
        let ocean = canvas.submit_text("ocean").unwrap();
        canvas.click_background();
        let entry = canvas.store().history()[0].id;

        assert!(canvas.navigate_history(entry));
        assert_eq!(canvas.focused(), Some(ocean.id));
        assert!(!canvas.navigate_history(HistoryId::new()));

        canvas.toggle_selection_mode();
        assert!(!canvas.navigate_history(entry));
    }

    #[test]
    fn test_selected_texts_and_finish() {
        let mut canvas = canvas();
        let a = canvas.submit_text("ocean").unwrap();
        canvas.click_background();
        let b = canvas.submit_text("desert").unwrap();

        canvas.toggle_selection_mode();
        canvas.click_node(b.id);
        canvas.click_node(a.id);
        assert_eq!(canvas.selected_texts(), vec!["desert", "ocean"]);

        canvas.finish_document_selection();
        assert_eq!(canvas.mode(), InteractionMode::Normal);
        assert!(canvas.selected_texts().is_empty());
    }

    #[test]
    fn test_clear_needs_confirmation() {
        let snapshots = MemorySnapshotStore::new();
        let settings = CanvasSettings::default();
        let mut canvas = IdeaCanvas::with_persistence(&settings, Box::new(snapshots.clone()));
        canvas.submit_text("ocean");
        canvas.toggle_selection_mode();

        let token = canvas.request_clear();
        assert_eq!(canvas.store().nodes().len(), 1);
        assert!(canvas.confirm_clear(token));

        assert!(canvas.store().is_empty());
        assert!(canvas.simulation().is_empty());
        assert_eq!(canvas.mode(), InteractionMode::Normal);

        let reloaded = IdeaCanvas::with_persistence(&settings, Box::new(snapshots));
        assert!(reloaded.store().is_empty());
    }

    #[test]
    fn test_positions_written_back_on_save() {
        let snapshots = MemorySnapshotStore::new();
        let settings = CanvasSettings::default();
        let mut canvas = IdeaCanvas::with_persistence(&settings, Box::new(snapshots.clone()));
        let ocean = canvas.submit_text("ocean").unwrap();
        canvas.submit_text("wave").unwrap();
        for _ in 0..30 {
            canvas.frame(1.0 / 60.0);
        }
        let live = canvas.position(ocean.id).unwrap();
        assert!(canvas.save());

        let reloaded = IdeaCanvas::with_persistence(&settings, Box::new(snapshots));
        assert_eq!(reloaded.position(ocean.id), Some(live));
    }

    #[test]
    fn test_node_views_reflect_state() {
        let mut canvas = canvas();
        let ocean = canvas.submit_text("ocean").unwrap();
        let views = canvas.node_views();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].id, ocean.id);
        assert!(views[0].focused);
        assert_eq!(views[0].radius, 65.0);
        assert!(canvas.link_views().is_empty());
    }
}
