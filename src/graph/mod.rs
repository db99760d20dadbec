//! Concept Graph Module
//!
//! Data model, persistence, force layout and camera for the concept forest.
//!
//! # Architecture
//!
//! ```text
//! GraphStore (nodes, links, history)
//!        │
//!        ├──► SnapshotStore (three JSON slots, count-change saves)
//!        │
//!        ▼
//! ForceSimulation (working copy, live positions)
//!        │
//!        ├──► hit testing (node_at)
//!        │
//!        ▼
//! Camera2D (world ⇄ screen transform, eased focus)
//! ```

pub mod animation;
pub mod camera;
pub mod force_sim;
pub mod persistence;
pub mod store;
pub mod types;

pub use camera::Camera2D;
pub use force_sim::{ForceSimulation, SimNode, SyncKind};
pub use persistence::{FileSnapshotStore, MemorySnapshotStore, SnapshotSlot, SnapshotStore};
pub use store::{ExpansionBatch, GraphStore};
pub use types::*;
