//! Runtime - scheduling around the canvas lock
//!
//! The canvas lives behind one `tokio::sync::Mutex`. Frame ticks run under
//! the lock, so no tick overlaps another and readers never see a tick in
//! progress. Collaborator calls never hold it:
//!
//! ```text
//! lock ─ request ─ unlock ─► collaborator (timeout) ─► lock ─ finish ─ unlock
//! ```
//!
//! The expansion job slot lives inside the canvas, so concurrent callers
//! racing on the lock still see at most one expansion in flight. Dropping
//! an expansion future part way (an outer timeout, `select!`, an aborted
//! task) still releases the slot and the node's loading flag.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::canvas::IdeaCanvas;
use crate::documents::{run_generation, DocumentId, DocumentLibrary, DocumentStore, GeneratedDocument};
use crate::error::{DocumentError, ExpansionError};
use crate::expansion::{ExpandStep, ExpansionOutcome, ExpansionTicket};
use crate::generation::{DocumentGenerator, WordExpander};
use crate::graph::NodeId;
use crate::interaction::PointerEvent;

/// Canvas shared between the frame loop, input handling and collaborators
pub type SharedCanvas = Arc<Mutex<IdeaCanvas>>;

/// Document library shared with the panel
pub type SharedLibrary = Arc<Mutex<DocumentLibrary>>;

pub fn shared(canvas: IdeaCanvas) -> SharedCanvas {
    Arc::new(Mutex::new(canvas))
}

// =============================================================================
// FRAME LOOP
// =============================================================================

/// Tick the canvas every `period` until the handle is aborted
pub fn spawn_frame_loop(canvas: SharedCanvas, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Skip the first immediate tick
        timer.tick().await;
        let mut last = Instant::now();

        info!(period_ms = period.as_millis() as u64, "Frame loop started");

        loop {
            timer.tick().await;
            let now = Instant::now();
            let dt = now.duration_since(last).as_secs_f32();
            last = now;

            let ticks = canvas.lock().await.frame(dt);
            if ticks == 0 {
                debug!(dt, "Frame ran no simulation ticks");
            }
        }
    })
}

// =============================================================================
// EXPANSION
// =============================================================================

/// What an expand invocation did
#[derive(Debug)]
pub enum ExpandReport {
    /// Another expansion was in flight
    Busy,
    /// First invocation: the node is now selected
    Selected(NodeId),
    UnknownNode(NodeId),
    /// Selection mode is on; nothing changed
    Ignored,
    /// Second invocation: the expansion ran to completion or failure
    Finished(ExpansionOutcome),
}

/// Select-or-expand `node`
pub async fn expand(
    canvas: &SharedCanvas,
    expander: &dyn WordExpander,
    node: NodeId,
) -> ExpandReport {
    let step = canvas.lock().await.request_expand(node);
    match step {
        ExpandStep::Busy => ExpandReport::Busy,
        ExpandStep::Selected(id) => ExpandReport::Selected(id),
        ExpandStep::UnknownNode(id) => ExpandReport::UnknownNode(id),
        ExpandStep::Ignored => ExpandReport::Ignored,
        ExpandStep::Start(ticket) => {
            ExpandReport::Finished(run_expansion(canvas, expander, ticket).await)
        }
    }
}

/// Route a pointer event; runs the expansion it started, if any
pub async fn handle_pointer(
    canvas: &SharedCanvas,
    expander: &dyn WordExpander,
    event: PointerEvent,
) -> Option<ExpansionOutcome> {
    let ticket = canvas.lock().await.handle_pointer(event)?;
    Some(run_expansion(canvas, expander, ticket).await)
}

/// Releases the job slot if an expansion future is dropped before it
/// reaches `finish_expansion`
struct JobGuard {
    canvas: SharedCanvas,
    node: Option<NodeId>,
}

impl JobGuard {
    fn new(canvas: &SharedCanvas, node: NodeId) -> Self {
        Self {
            canvas: Arc::clone(canvas),
            node: Some(node),
        }
    }

    /// Call with the canvas lock held, right before finishing
    fn disarm(&mut self) {
        self.node = None;
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        let Some(node) = self.node.take() else {
            return;
        };

        if let Ok(mut canvas) = self.canvas.try_lock() {
            canvas.abandon_expansion(node);
            return;
        }

        // Lock busy: release from a task once it frees up
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let canvas = Arc::clone(&self.canvas);
                handle.spawn(async move {
                    canvas.lock().await.abandon_expansion(node);
                });
            }
            Err(_) => warn!(node_id = %node, "No runtime to release abandoned expansion"),
        }
    }
}

/// Call the collaborator for a started expansion and complete it
///
/// Cancel-safe: if this future is dropped early the job slot and the
/// node's loading flag are still cleared, and the graph is unchanged.
pub async fn run_expansion(
    canvas: &SharedCanvas,
    expander: &dyn WordExpander,
    ticket: ExpansionTicket,
) -> ExpansionOutcome {
    let mut guard = JobGuard::new(canvas, ticket.node_id());
    let timeout = canvas.lock().await.expansion_timeout();

    let result = match tokio::time::timeout(timeout, expander.expand(ticket.concept())).await {
        Ok(Ok(words)) => Ok(words),
        Ok(Err(e)) => Err(ExpansionError::Collaborator(format!("{:#}", e))),
        Err(_) => Err(ExpansionError::TimedOut(timeout)),
    };

    let outcome = {
        let mut canvas = canvas.lock().await;
        guard.disarm();
        canvas.finish_expansion(ticket, result)
    };
    debug!(added = outcome.added(), "Expansion finished");
    outcome
}

// =============================================================================
// DOCUMENTS
// =============================================================================

/// Generate a document from the multi-selected concepts
///
/// On success the multi-select set is cleared and selection mode exits.
pub async fn generate_document(
    canvas: &SharedCanvas,
    library: &SharedLibrary,
    generator: &dyn DocumentGenerator,
    store: &dyn DocumentStore,
) -> Result<GeneratedDocument, DocumentError> {
    let (keywords, timeout) = {
        let canvas = canvas.lock().await;
        (canvas.selected_texts(), canvas.document_timeout())
    };

    let ticket = library.lock().await.begin_generation(keywords)?;
    let (document, insert) = run_generation(generator, store, ticket.keywords(), timeout).await;
    let result = library
        .lock()
        .await
        .complete_generation(ticket, document, insert);

    match &result {
        Ok(document) => {
            canvas.lock().await.finish_document_selection();
            info!(document_id = %document.id, "Document ready");
        }
        Err(e) => warn!("Document not generated: {}", e),
    }
    result
}

/// Delete remotely, then locally; local state is untouched on failure
pub async fn delete_document(
    library: &SharedLibrary,
    store: &dyn DocumentStore,
    id: DocumentId,
) -> Result<(), DocumentError> {
    let result = store
        .delete(id)
        .await
        .map_err(|e| DocumentError::StoreDelete(e.to_string()));
    library.lock().await.apply_delete(id, result)
}

/// Reload the library from the store
pub async fn refresh_documents(
    library: &SharedLibrary,
    store: &dyn DocumentStore,
) -> Result<usize, DocumentError> {
    let result = store
        .list()
        .await
        .map_err(|e| DocumentError::StoreList(e.to_string()));
    match result {
        Ok(documents) => {
            let mut library = library.lock().await;
            library.replace_all(documents);
            Ok(library.documents().len())
        }
        Err(e) => {
            warn!("{}", e);
            Err(e)
        }
    }
}
