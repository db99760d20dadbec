//! Force Simulation for the concept forest
//!
//! A force-directed layout that never settles. Each tick combines, in order:
//! - Link springs (long "trunk" links to nodes with children, short "twig"
//!   links to leaves)
//! - Many-body repulsion, capped at a maximum distance
//! - Centering (translates the whole layout toward the viewport center)
//! - Collision (level 0 circles reserve a larger radius)
//! - Drift (a per-node sine wave scaled by alpha, skipped while pinned)
//!
//! Alpha (heat) is reset to 1.0 whenever the node count changes. Otherwise
//! it relaxes toward a floor target, never to zero, so the drift keeps the
//! layout breathing indefinitely.
//!
//! # Usage
//! ```ignore
//! let mut sim = ForceSimulation::with_config(PhysicsConfig::default());
//! sim.sync(&store);
//!
//! // Each frame:
//! sim.advance(dt);
//! for node in sim.nodes() {
//!     draw_circle(camera.world_to_screen(node.position), radius);
//! }
//! ```

use egui::{Pos2, Vec2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use tracing::debug;

use super::store::GraphStore;
use super::types::{NodeId, NodeKind};
use crate::config::PhysicsConfig;

// =============================================================================
// SIM NODE
// =============================================================================

/// Working copy of a graph node inside the simulation
#[derive(Debug, Clone)]
pub struct SimNode {
    pub id: NodeId,

    pub kind: NodeKind,

    /// Depth in the forest; level 0 nodes get the larger radii
    pub level: u32,

    /// Current position (engine-owned, updated every tick)
    pub position: Pos2,

    /// Current velocity
    velocity: Vec2,

    /// Position override while dragged; forces ignore this node's motion
    pub pin: Option<Pos2>,
}

impl SimNode {
    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    pub fn is_pinned(&self) -> bool {
        self.pin.is_some()
    }
}

/// Link between two node slots
#[derive(Debug, Clone, Copy)]
struct SimLink {
    source: usize,
    target: usize,
    /// Resting length
    distance: f32,
    /// Share of the correction applied to the target (degree based)
    bias: f32,
}

/// What a [`ForceSimulation::sync`] did to the heat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    /// Node count changed: alpha reset to 1.0
    Structural,
    /// Same node count: alpha held at the ambient target
    Refresh,
}

// =============================================================================
// FORCE SIMULATION
// =============================================================================

/// Force-directed layout simulation
#[derive(Debug, Clone)]
pub struct ForceSimulation {
    /// Nodes in the simulation (store insertion order)
    nodes: Vec<SimNode>,

    /// Quick lookup by ID
    node_index: HashMap<NodeId, usize>,

    links: Vec<SimLink>,

    /// Simulation configuration
    pub config: PhysicsConfig,

    /// Current heat
    alpha: f32,

    /// Heat the simulation relaxes toward
    alpha_target: f32,

    /// Is simulation running? (view active)
    pub running: bool,

    /// Center point for the centering force
    pub center: Pos2,

    /// Simulated seconds (drives the drift wave)
    elapsed: f32,

    /// Unsimulated real time carried between `advance` calls
    accumulator: f32,

    /// Number of ticks run so far
    ticks: u64,

    /// Node count at the last sync
    synced_node_count: usize,

    /// A node is pinned by a drag gesture
    dragging: bool,

    /// Jiggle source for coincident nodes
    rng: StdRng,
}

impl Default for ForceSimulation {
    fn default() -> Self {
        Self::new()
    }
}

impl ForceSimulation {
    /// Create a new empty simulation with default physics
    pub fn new() -> Self {
        Self::with_config(PhysicsConfig::default())
    }

    /// Create with specific config
    pub fn with_config(config: PhysicsConfig) -> Self {
        let alpha_target = config.alpha_floor;
        Self {
            nodes: Vec::new(),
            node_index: HashMap::new(),
            links: Vec::new(),
            config,
            alpha: 1.0,
            alpha_target,
            running: true,
            center: Pos2::ZERO,
            elapsed: 0.0,
            accumulator: 0.0,
            ticks: 0,
            synced_node_count: 0,
            dragging: false,
            rng: StdRng::seed_from_u64(0x1dea_5a4c),
        }
    }

    // =========================================================================
    // SNAPSHOT SYNC
    // =========================================================================

    /// Reconcile the working copy with the store
    ///
    /// Surviving nodes keep their live position, velocity and pin. New nodes
    /// start at the position the store assigned them.
    pub fn sync(&mut self, store: &GraphStore) -> SyncKind {
        let mut previous: HashMap<NodeId, SimNode> =
            self.nodes.drain(..).map(|n| (n.id, n)).collect();

        self.node_index.clear();
        for node in store.nodes() {
            let sim_node = previous.remove(&node.id).unwrap_or(SimNode {
                id: node.id,
                kind: node.kind,
                level: node.level,
                position: Pos2::new(node.x, node.y),
                velocity: Vec2::ZERO,
                pin: None,
            });
            self.node_index.insert(node.id, self.nodes.len());
            self.nodes.push(sim_node);
        }

        self.rebuild_links(store);

        let kind = if self.nodes.len() != self.synced_node_count {
            self.synced_node_count = self.nodes.len();
            self.alpha = 1.0;
            SyncKind::Structural
        } else {
            SyncKind::Refresh
        };
        self.alpha_target = self.ambient_target();
        self.running = true;

        debug!(
            nodes = self.nodes.len(),
            links = self.links.len(),
            alpha = self.alpha,
            ?kind,
            "Simulation synced"
        );
        kind
    }

    fn rebuild_links(&mut self, store: &GraphStore) {
        let mut degree = vec![0usize; self.nodes.len()];
        let mut links = Vec::with_capacity(store.links().len());

        for link in store.links() {
            let (Some(&source), Some(&target)) = (
                self.node_index.get(&link.source),
                self.node_index.get(&link.target),
            ) else {
                continue;
            };
            let distance = if store.has_children(link.target) {
                self.config.trunk_link_distance
            } else {
                self.config.leaf_link_distance
            };
            degree[source] += 1;
            degree[target] += 1;
            links.push(SimLink {
                source,
                target,
                distance,
                bias: 0.0,
            });
        }

        for link in &mut links {
            let s = degree[link.source] as f32;
            let t = degree[link.target] as f32;
            link.bias = s / (s + t);
        }
        self.links = links;
    }

    /// Clear all nodes
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.node_index.clear();
        self.links.clear();
        self.synced_node_count = 0;
        self.dragging = false;
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// All nodes in store order
    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    /// Get node by ID
    pub fn get_node(&self, id: NodeId) -> Option<&SimNode> {
        self.node_index.get(&id).map(|&idx| &self.nodes[idx])
    }

    fn get_node_mut(&mut self, id: NodeId) -> Option<&mut SimNode> {
        self.node_index
            .get(&id)
            .copied()
            .map(|idx| &mut self.nodes[idx])
    }

    pub fn position(&self, id: NodeId) -> Option<Pos2> {
        self.get_node(id).map(|n| n.position)
    }

    /// Live positions, for writing back into the store
    pub fn positions(&self) -> impl Iterator<Item = (NodeId, Pos2)> + '_ {
        self.nodes.iter().map(|n| (n.id, n.position))
    }

    /// Link endpoints as (source, target) positions, for drawing lines
    pub fn link_segments(&self) -> impl Iterator<Item = (Pos2, Pos2)> + '_ {
        self.links
            .iter()
            .map(|l| (self.nodes[l.source].position, self.nodes[l.target].position))
    }

    /// Resting length of the link targeting `id`
    pub fn link_distance_to(&self, id: NodeId) -> Option<f32> {
        let idx = *self.node_index.get(&id)?;
        self.links
            .iter()
            .find(|l| l.target == idx)
            .map(|l| l.distance)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn alpha_target(&self) -> f32 {
        self.alpha_target
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    // =========================================================================
    // HEAT
    // =========================================================================

    fn ambient_target(&self) -> f32 {
        if self.dragging {
            self.config.drag_alpha_target
        } else {
            self.config.alpha_floor
        }
    }

    /// Full re-layout: alpha back to 1.0
    pub fn reheat(&mut self) {
        self.alpha = 1.0;
        self.running = true;
    }

    /// Position refresh without a structural change (e.g. style toggle)
    pub fn refresh(&mut self) {
        self.alpha_target = self.ambient_target();
        self.running = true;
    }

    // =========================================================================
    // SIMULATION
    // =========================================================================

    /// Run whole fixed-length ticks for `dt` seconds of real time
    ///
    /// Returns the number of ticks run (bounded by `max_ticks_per_advance`;
    /// excess time is dropped rather than replayed).
    pub fn advance(&mut self, dt: f32) -> usize {
        if !self.running {
            return 0;
        }
        let step = 1.0 / self.config.tick_rate;
        self.accumulator += dt.max(0.0);

        let mut ran = 0;
        while self.accumulator >= step && ran < self.config.max_ticks_per_advance {
            self.tick();
            self.accumulator -= step;
            ran += 1;
        }
        if ran == self.config.max_ticks_per_advance {
            self.accumulator = self.accumulator.min(step);
        }
        ran
    }

    /// Run one simulation step
    pub fn tick(&mut self) {
        if self.nodes.is_empty() {
            return;
        }

        self.alpha += (self.alpha_target - self.alpha) * self.config.alpha_decay();
        let alpha = self.alpha;

        self.apply_links(alpha);
        self.apply_charge(alpha);
        self.apply_center();
        self.apply_collision();
        self.apply_drift(alpha);

        let keep = 1.0 - self.config.velocity_decay;
        for node in &mut self.nodes {
            match node.pin {
                Some(pin) => {
                    node.position = pin;
                    node.velocity = Vec2::ZERO;
                }
                None => {
                    node.velocity *= keep;
                    node.position += node.velocity;
                }
            }
        }

        self.elapsed += 1.0 / self.config.tick_rate;
        self.ticks += 1;
    }

    fn jiggle(&mut self) -> f32 {
        (self.rng.gen::<f32>() - 0.5) * 1e-6
    }

    /// Springs toward each link's resting length
    fn apply_links(&mut self, alpha: f32) {
        let strength = self.config.link_strength;
        for i in 0..self.links.len() {
            let link = self.links[i];
            let s = &self.nodes[link.source];
            let t = &self.nodes[link.target];

            let mut delta = (t.position + t.velocity) - (s.position + s.velocity);
            if delta.x == 0.0 {
                delta.x = self.jiggle();
            }
            if delta.y == 0.0 {
                delta.y = self.jiggle();
            }
            let len = delta.length();
            let correction = delta * ((len - link.distance) / len * alpha * strength);

            self.nodes[link.target].velocity -= correction * link.bias;
            self.nodes[link.source].velocity += correction * (1.0 - link.bias);
        }
    }

    /// Pairwise repulsion, ignored beyond `charge_distance_max`
    fn apply_charge(&mut self, alpha: f32) {
        let n = self.nodes.len();
        let max_sq = self.config.charge_distance_max * self.config.charge_distance_max;
        let strength = self.config.charge_strength;

        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let mut delta = self.nodes[j].position - self.nodes[i].position;
                let mut dist_sq = delta.length_sq();
                if dist_sq >= max_sq {
                    continue;
                }
                if delta.x == 0.0 {
                    delta.x = self.jiggle();
                    dist_sq += delta.x * delta.x;
                }
                if delta.y == 0.0 {
                    delta.y = self.jiggle();
                    dist_sq += delta.y * delta.y;
                }
                // Soften below unit distance
                if dist_sq < 1.0 {
                    dist_sq = dist_sq.sqrt();
                }
                let w = strength * alpha / dist_sq;
                self.nodes[i].velocity += delta * w;
            }
        }
    }

    /// Translate the layout so its centroid moves toward `center`
    fn apply_center(&mut self) {
        let n = self.nodes.len() as f32;
        let sum = self
            .nodes
            .iter()
            .fold(Vec2::ZERO, |acc, node| acc + node.position.to_vec2());
        let shift = (sum / n - self.center.to_vec2()) * self.config.center_strength;
        for node in &mut self.nodes {
            node.position -= shift;
        }
    }

    fn collision_radius(&self, level: u32) -> f32 {
        if level == 0 {
            self.config.root_collision_radius
        } else {
            self.config.child_collision_radius
        }
    }

    /// Push overlapping circles apart, several relaxation passes
    fn apply_collision(&mut self) {
        let n = self.nodes.len();
        let strength = self.config.collision_strength;

        for _ in 0..self.config.collision_iterations {
            for i in 0..n {
                let ri = self.collision_radius(self.nodes[i].level);
                let ri_sq = ri * ri;
                let predicted_i = self.nodes[i].position + self.nodes[i].velocity;

                for j in (i + 1)..n {
                    let rj = self.collision_radius(self.nodes[j].level);
                    let r = ri + rj;
                    let mut delta =
                        predicted_i - (self.nodes[j].position + self.nodes[j].velocity);
                    let mut dist_sq = delta.length_sq();
                    if dist_sq >= r * r {
                        continue;
                    }
                    if delta.x == 0.0 {
                        delta.x = self.jiggle();
                        dist_sq += delta.x * delta.x;
                    }
                    if delta.y == 0.0 {
                        delta.y = self.jiggle();
                        dist_sq += delta.y * delta.y;
                    }
                    let dist = dist_sq.sqrt();
                    let push = delta * ((r - dist) / dist * strength);
                    let share = (rj * rj) / (ri_sq + rj * rj);

                    self.nodes[i].velocity += push * share;
                    self.nodes[j].velocity -= push * (1.0 - share);
                }
            }
        }
    }

    /// Perpetual breathing motion
    fn apply_drift(&mut self, alpha: f32) {
        let time = self.elapsed / self.config.drift_period_secs;
        let amplitude = self.config.drift_amplitude * alpha;
        let phase_step = self.config.drift_phase_step;

        for (i, node) in self.nodes.iter_mut().enumerate() {
            if node.pin.is_some() {
                continue;
            }
            let phase = i as f32 * phase_step;
            node.velocity.x += (time + phase).sin() * amplitude;
            node.velocity.y += (time + phase * 0.8).cos() * amplitude;
        }
    }

    // =========================================================================
    // HIT TESTING
    // =========================================================================

    /// Rendered radius of a node at `level`
    ///
    /// Keyed on depth, not kind: a node added under a vanished parent is
    /// parentless but sits at level 1 and renders like a child.
    pub fn display_radius(&self, level: u32) -> f32 {
        if level == 0 {
            self.config.root_display_radius
        } else {
            self.config.child_display_radius
        }
    }

    /// Find the topmost node at a world position (for click handling)
    pub fn node_at(&self, pos: Pos2) -> Option<NodeId> {
        // Reverse for top-first
        self.nodes
            .iter()
            .rev()
            .find(|node| (pos - node.position).length() <= self.display_radius(node.level))
            .map(|node| node.id)
    }

    // =========================================================================
    // PINNING (for drag)
    // =========================================================================

    /// Pin a node at its current position and warm the simulation
    pub fn pin(&mut self, id: NodeId) -> bool {
        let Some(node) = self.get_node_mut(id) else {
            return false;
        };
        node.pin = Some(node.position);
        node.velocity = Vec2::ZERO;
        self.dragging = true;
        self.alpha_target = self.config.drag_alpha_target;
        self.running = true;
        true
    }

    /// Move a pinned node (pin and position updated together)
    pub fn move_pinned(&mut self, id: NodeId, new_pos: Pos2) -> bool {
        match self.get_node_mut(id) {
            Some(node) if node.pin.is_some() => {
                node.pin = Some(new_pos);
                node.position = new_pos;
                true
            }
            _ => false,
        }
    }

    /// Release a pin; heat returns to the ambient floor (no cold restart)
    pub fn unpin(&mut self, id: NodeId) -> bool {
        let released = match self.get_node_mut(id) {
            Some(node) => node.pin.take().is_some(),
            None => false,
        };
        self.dragging = self.nodes.iter().any(|n| n.pin.is_some());
        self.alpha_target = self.ambient_target();
        released
    }

    // =========================================================================
    // VIEWPORT
    // =========================================================================

    /// Center the layout in a viewport of the given size
    pub fn set_viewport_size(&mut self, width: f32, height: f32) {
        self.center = Pos2::new(width / 2.0, height / 2.0);
    }

    pub fn set_center(&mut self, center: Pos2) {
        self.center = center;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_chain() -> (GraphStore, NodeId, NodeId, NodeId) {
        let mut store = GraphStore::new();
        let root = store.add_node("ocean", None);
        let a = store.add_node("wave", Some(root.id));
        let b = store.add_node("surf", Some(a.id));
        (store, root.id, a.id, b.id)
    }

    #[test]
    fn test_sync_structural_reheats() {
        let (store, ..) = store_with_chain();
        let mut sim = ForceSimulation::new();
        assert_eq!(sim.sync(&store), SyncKind::Structural);
        assert_eq!(sim.alpha(), 1.0);
        assert_eq!(sim.len(), 3);

        for _ in 0..50 {
            sim.tick();
        }
        let cooled = sim.alpha();
        assert!(cooled < 1.0);

        assert_eq!(sim.sync(&store), SyncKind::Refresh);
        assert_eq!(sim.alpha(), cooled);
        assert_eq!(sim.alpha_target(), sim.config.alpha_floor);
    }

    #[test]
    fn test_alpha_never_settles_below_floor() {
        let (store, ..) = store_with_chain();
        let mut sim = ForceSimulation::new();
        sim.sync(&store);

        for _ in 0..2000 {
            sim.tick();
        }
        assert!(sim.alpha() >= sim.config.alpha_floor - 1e-4);
        assert!(sim.alpha() > sim.config.alpha_min);
    }

    #[test]
    fn test_link_distance_depends_on_topology() {
        let (store, _root, a, b) = store_with_chain();
        let mut sim = ForceSimulation::new();
        sim.sync(&store);

        assert_eq!(sim.link_distance_to(a), Some(180.0));
        assert_eq!(sim.link_distance_to(b), Some(100.0));
    }

    #[test]
    fn test_positions_preserved_across_refresh() {
        let (store, root, ..) = store_with_chain();
        let mut sim = ForceSimulation::new();
        sim.sync(&store);
        for _ in 0..30 {
            sim.tick();
        }
        let live = sim.position(root).unwrap();
        let stored = store.node(root).unwrap();
        assert_ne!(live, Pos2::new(stored.x, stored.y));

        sim.sync(&store);
        assert_eq!(sim.position(root), Some(live));
    }

    #[test]
    fn test_simulation_separates_nodes() {
        let mut store = GraphStore::new().with_manual_jitter(0.0);
        store.add_node("ocean", None);
        store.set_viewport_center(Pos2::new(10.0, 0.0));
        store.add_node("desert", None);

        let mut sim = ForceSimulation::new();
        sim.sync(&store);
        let nodes = sim.nodes();
        let initial_dist = (nodes[0].position - nodes[1].position).length();

        for _ in 0..300 {
            sim.tick();
        }

        let nodes = sim.nodes();
        let final_dist = (nodes[0].position - nodes[1].position).length();

        // Both roots reserve 90 units; they must not overlap
        assert!(final_dist > initial_dist);
        assert!(final_dist > 170.0, "got {final_dist}");
    }

    #[test]
    fn test_pinned_node_holds_position_and_skips_drift() {
        let (store, root, a, _) = store_with_chain();
        let mut sim = ForceSimulation::new();
        sim.sync(&store);

        assert!(sim.pin(a));
        assert_eq!(sim.alpha_target(), sim.config.drag_alpha_target);
        let target = Pos2::new(500.0, 500.0);
        assert!(sim.move_pinned(a, target));

        for _ in 0..20 {
            sim.tick();
            assert_eq!(sim.position(a), Some(target));
            assert_eq!(sim.get_node(a).unwrap().velocity(), Vec2::ZERO);
        }
        // Others still move
        assert!(sim.get_node(root).unwrap().velocity() != Vec2::ZERO);
    }

    #[test]
    fn test_release_returns_to_ambient_heat() {
        let (store, _, a, _) = store_with_chain();
        let mut sim = ForceSimulation::new();
        sim.sync(&store);
        for _ in 0..100 {
            sim.tick();
        }

        sim.pin(a);
        let target = Pos2::new(500.0, 500.0);
        sim.move_pinned(a, target);
        sim.tick();
        let alpha_before_release = sim.alpha();

        assert!(sim.unpin(a));
        assert!(!sim.get_node(a).unwrap().is_pinned());
        assert_eq!(sim.position(a), Some(target));
        assert_eq!(sim.alpha_target(), sim.config.alpha_floor);
        // No cold restart
        assert!(sim.alpha() <= alpha_before_release);

        sim.tick();
        let after = sim.position(a).unwrap();
        assert!((after - target).length() < 50.0);
        // Drift applies again once released
        assert!(sim.get_node(a).unwrap().velocity() != Vec2::ZERO);
    }

    #[test]
    fn test_move_requires_pin() {
        let (store, root, ..) = store_with_chain();
        let mut sim = ForceSimulation::new();
        sim.sync(&store);
        assert!(!sim.move_pinned(root, Pos2::new(1.0, 1.0)));
        assert!(!sim.unpin(root));
    }

    #[test]
    fn test_fixed_timestep_advance() {
        let (store, ..) = store_with_chain();
        let mut sim = ForceSimulation::new();
        sim.sync(&store);

        assert_eq!(sim.advance(1.0 / 120.0), 0);
        assert_eq!(sim.advance(1.0 / 120.0 + 1e-4), 1);
        assert_eq!(sim.advance(1.0), 4);
        assert_eq!(sim.ticks(), 5);

        sim.running = false;
        assert_eq!(sim.advance(1.0), 0);
    }

    #[test]
    fn test_hit_testing() {
        let mut store = GraphStore::new().with_manual_jitter(0.0);
        store.set_viewport_center(Pos2::new(100.0, 100.0));
        let root = store.add_node("ocean", None);
        let mut sim = ForceSimulation::new();
        sim.sync(&store);

        assert_eq!(sim.node_at(Pos2::new(100.0, 100.0)), Some(root.id));
        assert_eq!(sim.node_at(Pos2::new(100.0, 160.0)), Some(root.id)); // Within radius
        assert_eq!(sim.node_at(Pos2::new(500.0, 500.0)), None); // Far away
    }

    #[test]
    fn test_radius_follows_level_not_kind() {
        let mut store = GraphStore::new().with_manual_jitter(0.0);
        store.set_viewport_center(Pos2::new(100.0, 100.0));
        let orphan = store.add_node("stray", Some(NodeId::new()));
        store.set_viewport_center(Pos2::new(400.0, 100.0));
        let root = store.add_node("ocean", None);
        assert_eq!(orphan.kind, NodeKind::Root);
        assert_eq!(orphan.level, 1);

        let mut sim = ForceSimulation::new();
        sim.sync(&store);

        assert_eq!(sim.get_node(orphan.id).unwrap().level, 1);
        assert_eq!(sim.display_radius(1), sim.config.child_display_radius);
        // 60 units out: inside a level 0 circle, outside a deeper one
        assert_eq!(sim.node_at(Pos2::new(100.0, 160.0)), None);
        assert_eq!(sim.node_at(Pos2::new(400.0, 160.0)), Some(root.id));
    }

    #[test]
    fn test_clear() {
        let (store, ..) = store_with_chain();
        let mut sim = ForceSimulation::new();
        sim.sync(&store);
        sim.clear();
        assert!(sim.is_empty());
        assert_eq!(sim.link_segments().count(), 0);
    }
}
