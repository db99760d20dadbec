//! Interaction Controller - pointer input and mode flags
//!
//! Maps raw pointer events (screen coordinates) onto the simulation and the
//! camera, and reports the semantic action a click produced so the canvas
//! can route it to the graph store or the expansion workflow.
//!
//! Gestures handled here directly:
//! - press on a node pins it to the pointer until release (drag)
//! - press on empty canvas pans the camera until release
//! - wheel zooms around the pointer
//!
//! A click that ends a gesture which actually moved is swallowed, so
//! dropping a dragged node does not also expand it.

use egui::Pos2;
use tracing::debug;
use uuid::Uuid;

use crate::graph::{Camera2D, ForceSimulation, NodeId};

// =============================================================================
// TYPES
// =============================================================================

/// Mutually exclusive interaction modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionMode {
    /// Clicks select/expand, right-click focuses
    #[default]
    Normal,
    /// Clicks toggle multi-select membership
    Selection,
}

/// Raw pointer input, screen coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Click { pos: Pos2 },
    RightClick { pos: Pos2 },
    Press { pos: Pos2 },
    Move { pos: Pos2 },
    Release { pos: Pos2 },
    /// Scroll; negative `delta_y` zooms in
    Wheel { pos: Pos2, delta_y: f32 },
}

/// What a pointer event asks the canvas to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerAction {
    None,
    /// Normal-mode click on a node: select-or-expand
    Expand(NodeId),
    /// Normal-mode right-click: toggle the focused node
    ToggleFocus(NodeId),
    /// Normal-mode click on empty canvas
    ClearFocus,
    /// Selection-mode click toggled membership; `selected` is the new state
    MultiSelect { node: NodeId, selected: bool },
    /// A drag ended (pin released)
    DragEnded(NodeId),
}

/// Gesture in progress between press and release
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    Idle,
    Drag { node: NodeId, moved: bool },
    Pan { last: Pos2, moved: bool },
}

/// Token required to confirm a canvas clear
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a clear only happens once the confirmation is passed back"]
pub struct ClearConfirmation(Uuid);

// =============================================================================
// CONTROLLER
// =============================================================================

/// Mode flags, multi-select set and gesture state
#[derive(Debug, Clone)]
pub struct InteractionController {
    mode: InteractionMode,
    /// Multi-select set, in toggle order
    multi_selected: Vec<NodeId>,
    gesture: Gesture,
    /// Next click is the tail of a moved gesture
    suppress_click: bool,
    document_panel_open: bool,
    pending_clear: Option<ClearConfirmation>,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionController {
    pub fn new() -> Self {
        Self {
            mode: InteractionMode::Normal,
            multi_selected: Vec::new(),
            gesture: Gesture::Idle,
            suppress_click: false,
            document_panel_open: false,
            pending_clear: None,
        }
    }

    // =========================================================================
    // MODE
    // =========================================================================

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn is_selection_mode(&self) -> bool {
        self.mode == InteractionMode::Selection
    }

    /// Flip between normal and selection mode
    ///
    /// Entering selection mode closes the document panel. The caller clears
    /// the single-node selection in both directions.
    pub fn toggle_selection_mode(&mut self) -> InteractionMode {
        self.mode = match self.mode {
            InteractionMode::Normal => {
                self.document_panel_open = false;
                InteractionMode::Selection
            }
            InteractionMode::Selection => InteractionMode::Normal,
        };
        debug!(mode = ?self.mode, "Interaction mode changed");
        self.mode
    }

    /// Leave selection mode and drop the multi-select set
    pub fn finish_selection(&mut self) {
        self.multi_selected.clear();
        self.mode = InteractionMode::Normal;
    }

    // =========================================================================
    // MULTI-SELECT
    // =========================================================================

    /// Toggle membership; returns whether the node is now selected
    pub fn toggle_multi_select(&mut self, node: NodeId) -> bool {
        if let Some(idx) = self.multi_selected.iter().position(|id| *id == node) {
            self.multi_selected.remove(idx);
            false
        } else {
            self.multi_selected.push(node);
            true
        }
    }

    pub fn multi_selected(&self) -> &[NodeId] {
        &self.multi_selected
    }

    pub fn is_multi_selected(&self, node: NodeId) -> bool {
        self.multi_selected.contains(&node)
    }

    // =========================================================================
    // OVERLAYS
    // =========================================================================

    pub fn document_panel_open(&self) -> bool {
        self.document_panel_open
    }

    pub fn set_document_panel_open(&mut self, open: bool) {
        self.document_panel_open = open;
    }

    // =========================================================================
    // CLEAR CONFIRMATION
    // =========================================================================

    /// First half of the destructive clear
    pub fn request_clear(&mut self) -> ClearConfirmation {
        let token = ClearConfirmation(Uuid::new_v4());
        self.pending_clear = Some(token);
        token
    }

    /// Consume a confirmation; only the latest requested token is accepted
    pub fn confirm_clear(&mut self, token: ClearConfirmation) -> bool {
        if self.pending_clear == Some(token) {
            self.pending_clear = None;
            true
        } else {
            false
        }
    }

    /// Abandon a pending clear
    pub fn cancel_clear(&mut self) {
        self.pending_clear = None;
    }

    /// State after the canvas was cleared
    pub fn reset(&mut self) {
        self.multi_selected.clear();
        self.mode = InteractionMode::Normal;
        self.gesture = Gesture::Idle;
        self.suppress_click = false;
    }

    // =========================================================================
    // POINTER
    // =========================================================================

    pub fn gesture(&self) -> Gesture {
        self.gesture
    }

    /// Node under a screen position
    pub fn hit_test(pos: Pos2, sim: &ForceSimulation, camera: &Camera2D) -> Option<NodeId> {
        sim.node_at(camera.screen_to_world(pos))
    }

    /// Process one pointer event
    pub fn handle_pointer(
        &mut self,
        event: PointerEvent,
        sim: &mut ForceSimulation,
        camera: &mut Camera2D,
    ) -> PointerAction {
        match event {
            PointerEvent::Click { pos } => {
                if std::mem::take(&mut self.suppress_click) {
                    return PointerAction::None;
                }
                self.click(Self::hit_test(pos, sim, camera))
            }
            PointerEvent::RightClick { pos } => {
                if self.is_selection_mode() {
                    return PointerAction::None;
                }
                match Self::hit_test(pos, sim, camera) {
                    Some(node) => PointerAction::ToggleFocus(node),
                    None => PointerAction::None,
                }
            }
            PointerEvent::Press { pos } => {
                self.suppress_click = false;
                self.gesture = match Self::hit_test(pos, sim, camera) {
                    Some(node) if sim.pin(node) => Gesture::Drag { node, moved: false },
                    _ => Gesture::Pan {
                        last: pos,
                        moved: false,
                    },
                };
                PointerAction::None
            }
            PointerEvent::Move { pos } => {
                match &mut self.gesture {
                    Gesture::Drag { node, moved } => {
                        *moved |= sim.move_pinned(*node, camera.screen_to_world(pos));
                    }
                    Gesture::Pan { last, moved } => {
                        let delta = pos - *last;
                        if delta != egui::Vec2::ZERO {
                            camera.pan(delta);
                            *moved = true;
                        }
                        *last = pos;
                    }
                    Gesture::Idle => {}
                }
                PointerAction::None
            }
            PointerEvent::Release { .. } => {
                match std::mem::replace(&mut self.gesture, Gesture::Idle) {
                    Gesture::Drag { node, moved } => {
                        sim.unpin(node);
                        self.suppress_click = moved;
                        PointerAction::DragEnded(node)
                    }
                    Gesture::Pan { moved, .. } => {
                        self.suppress_click = moved;
                        PointerAction::None
                    }
                    Gesture::Idle => PointerAction::None,
                }
            }
            PointerEvent::Wheel { pos, delta_y } => {
                camera.wheel(delta_y, pos);
                PointerAction::None
            }
        }
    }

    fn click(&mut self, hit: Option<NodeId>) -> PointerAction {
        match (self.mode, hit) {
            (InteractionMode::Selection, Some(node)) => PointerAction::MultiSelect {
                node,
                selected: self.toggle_multi_select(node),
            },
            (InteractionMode::Selection, None) => PointerAction::None,
            (InteractionMode::Normal, Some(node)) => PointerAction::Expand(node),
            (InteractionMode::Normal, None) => PointerAction::ClearFocus,
        }
    }
}
