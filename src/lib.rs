//! Idea Spark canvas core
//!
//! A user seeds a concept, the canvas expands it into associated concepts
//! and lays the growing forest out with a continuously running force
//! simulation. Selected concepts can be bundled into a generated document.
//!
//! This crate contains ONLY the core - no rendering, no panels. A renderer
//! polls [`IdeaCanvas`] each frame for node positions and the camera
//! transform.
//!
//! # Architecture
//!
//! ```text
//! PointerEvent ──► InteractionController ──► GraphStore ──► SnapshotStore
//!                        │        │               │
//!                        │        ▼               ▼
//!                        │  ExpansionWorkflow  ForceSimulation (per tick)
//!                        │        │               │
//!                        ▼        ▼               ▼
//!                    Camera2D  WordExpander    positions ──► renderer
//! ```

pub mod canvas;
pub mod config;
pub mod documents;
pub mod error;
pub mod expansion;
pub mod generation;
pub mod graph;
pub mod interaction;
pub mod runtime;

pub use canvas::{IdeaCanvas, NodeView};
pub use config::{global_config, CanvasSettings};
pub use documents::{
    DocumentId, DocumentLibrary, DocumentStore, GeneratedDocument, MemoryDocumentStore,
};
pub use error::{DocumentError, ExpansionError, PersistenceError};
pub use expansion::{ExpandStep, ExpansionOutcome, ExpansionTicket, ExpansionWorkflow};
pub use generation::{DocumentGenerator, GeminiClient, GeneratedWord, WordExpander};
pub use graph::{
    Camera2D, FileSnapshotStore, ForceSimulation, GraphStore, HistoryAction, HistoryEntry, Link,
    MemorySnapshotStore, Node, NodeId, NodeKind, SnapshotStore,
};
pub use interaction::{
    ClearConfirmation, InteractionController, InteractionMode, PointerAction, PointerEvent,
};
pub use runtime::{ExpandReport, SharedCanvas, SharedLibrary};
