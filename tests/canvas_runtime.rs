//! Canvas runtime flows through the shared canvas
//!
//! - at most one node loading while concurrent expands race
//! - collaborator timeout / failure leaves the graph unchanged
//! - clear while an expansion is in flight discards the result
//! - a dropped or aborted expansion still releases the job slot
//! - drag pins, follows the pointer and releases
//! - shipped settings file parses

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use egui::Pos2;
use pretty_assertions::assert_eq;

use idea_spark::runtime::{self, ExpandReport, SharedCanvas};
use idea_spark::{
    CanvasSettings, ExpansionError, ExpansionOutcome, GeneratedWord, IdeaCanvas, MemorySnapshotStore,
    PointerEvent, WordExpander,
};

fn canvas_with(settings: &CanvasSettings) -> SharedCanvas {
    runtime::shared(IdeaCanvas::new(settings))
}

fn words(texts: &[&str]) -> Vec<GeneratedWord> {
    texts.iter().map(|t| GeneratedWord::new(*t)).collect()
}

/// Records how many nodes were loading while it ran, then answers
struct ObservingExpander {
    canvas: SharedCanvas,
    loading_seen: Arc<StdMutex<Vec<usize>>>,
}

#[async_trait]
impl WordExpander for ObservingExpander {
    async fn expand(&self, _concept: &str) -> Result<Vec<GeneratedWord>> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let loading = self
            .canvas
            .lock()
            .await
            .store()
            .nodes()
            .iter()
            .filter(|n| n.loading)
            .count();
        self.loading_seen.lock().unwrap().push(loading);
        Ok(words(&["wave", "reef"]))
    }
}

struct Hanging;

#[async_trait]
impl WordExpander for Hanging {
    async fn expand(&self, _concept: &str) -> Result<Vec<GeneratedWord>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(words(&["too", "late"]))
    }
}

struct Failing;

#[async_trait]
impl WordExpander for Failing {
    async fn expand(&self, _concept: &str) -> Result<Vec<GeneratedWord>> {
        anyhow::bail!("quota exceeded")
    }
}

/// Clears the canvas mid-call
struct Clearing(SharedCanvas);

#[async_trait]
impl WordExpander for Clearing {
    async fn expand(&self, _concept: &str) -> Result<Vec<GeneratedWord>> {
        let mut canvas = self.0.lock().await;
        let token = canvas.request_clear();
        assert!(canvas.confirm_clear(token));
        Ok(words(&["wave"]))
    }
}

struct Scripted(&'static [&'static str]);

#[async_trait]
impl WordExpander for Scripted {
    async fn expand(&self, _concept: &str) -> Result<Vec<GeneratedWord>> {
        Ok(words(self.0))
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_expands_run_one_at_a_time() {
    let canvas = canvas_with(&CanvasSettings::default());
    // Submitting focuses the node, so the next expand starts immediately
    let ocean = canvas.lock().await.submit_text("ocean").unwrap();

    let loading_seen = Arc::new(StdMutex::new(Vec::new()));
    let expander = ObservingExpander {
        canvas: canvas.clone(),
        loading_seen: loading_seen.clone(),
    };

    let reports =
        futures::future::join_all((0..5).map(|_| runtime::expand(&canvas, &expander, ocean.id)))
            .await;

    let finished = reports
        .iter()
        .filter(|r| matches!(r, ExpandReport::Finished(_)))
        .count();
    let busy = reports
        .iter()
        .filter(|r| matches!(r, ExpandReport::Busy))
        .count();
    assert_eq!(finished, 1);
    assert_eq!(busy, 4);
    assert_eq!(*loading_seen.lock().unwrap(), vec![1]);

    let canvas = canvas.lock().await;
    assert_eq!(canvas.store().nodes().len(), 3);
    assert!(canvas.store().nodes().iter().all(|n| !n.loading));
    assert!(!canvas.workflow().is_busy());
}

#[tokio::test(start_paused = true)]
async fn hung_collaborator_times_out() {
    let mut settings = CanvasSettings::default();
    settings.expansion.timeout_ms = 1_000;
    let canvas = canvas_with(&settings);
    let ocean = canvas.lock().await.submit_text("ocean").unwrap();

    let report = runtime::expand(&canvas, &Hanging, ocean.id).await;
    match report {
        ExpandReport::Finished(ExpansionOutcome::Failed(ExpansionError::TimedOut(after))) => {
            assert_eq!(after, Duration::from_secs(1));
        }
        other => panic!("expected timeout, got {:?}", other),
    }

    let canvas = canvas.lock().await;
    assert_eq!(canvas.store().nodes().len(), 1);
    assert!(!canvas.store().node(ocean.id).unwrap().loading);
    assert!(!canvas.workflow().is_busy());
}

#[tokio::test]
async fn failed_collaborator_leaves_graph_unchanged() {
    let canvas = canvas_with(&CanvasSettings::default());
    let ocean = canvas.lock().await.submit_text("ocean").unwrap();
    let history_before = canvas.lock().await.store().history().len();

    match runtime::expand(&canvas, &Failing, ocean.id).await {
        ExpandReport::Finished(ExpansionOutcome::Failed(e)) => {
            assert!(e.is_recoverable());
            assert!(e.to_string().contains("quota exceeded"));
        }
        other => panic!("expected failure, got {:?}", other),
    }

    let canvas = canvas.lock().await;
    assert_eq!(canvas.store().nodes().len(), 1);
    assert_eq!(canvas.store().history().len(), history_before);
    assert!(!canvas.store().node(ocean.id).unwrap().loading);
}

#[tokio::test]
async fn clear_during_expansion_discards_result() {
    let canvas = canvas_with(&CanvasSettings::default());
    let ocean = canvas.lock().await.submit_text("ocean").unwrap();

    let report = runtime::expand(&canvas, &Clearing(canvas.clone()), ocean.id).await;
    assert!(matches!(
        report,
        ExpandReport::Finished(ExpansionOutcome::Failed(ExpansionError::UnknownNode(_)))
    ));

    let canvas = canvas.lock().await;
    assert!(canvas.store().is_empty());
    assert!(canvas.simulation().is_empty());
    assert!(!canvas.workflow().is_busy());
}

#[tokio::test(start_paused = true)]
async fn dropped_expansion_releases_job_slot() {
    let canvas = canvas_with(&CanvasSettings::default());
    let ocean = canvas.lock().await.submit_text("ocean").unwrap();

    // Caller gives up long before the collaborator answers
    let gave_up =
        tokio::time::timeout(Duration::from_secs(1), runtime::expand(&canvas, &Hanging, ocean.id))
            .await;
    assert!(gave_up.is_err());

    {
        let canvas = canvas.lock().await;
        assert!(!canvas.workflow().is_busy());
        assert!(!canvas.store().node(ocean.id).unwrap().loading);
        assert_eq!(canvas.store().nodes().len(), 1);
    }

    // Still selected, so the next expand goes straight through
    let report = runtime::expand(&canvas, &Scripted(&["wave"]), ocean.id).await;
    assert!(matches!(report, ExpandReport::Finished(ref o) if o.added() == 1));
}

#[tokio::test(start_paused = true)]
async fn aborted_expansion_releases_slot_once_lock_frees() {
    let canvas = canvas_with(&CanvasSettings::default());
    let ocean = canvas.lock().await.submit_text("ocean").unwrap();

    let task = {
        let canvas = canvas.clone();
        tokio::spawn(async move { runtime::expand(&canvas, &Hanging, ocean.id).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let held = canvas.lock().await;
    assert!(held.workflow().is_busy());
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    // Cleanup waits for the lock
    assert!(held.store().node(ocean.id).unwrap().loading);
    drop(held);

    tokio::time::sleep(Duration::from_millis(10)).await;
    let canvas = canvas.lock().await;
    assert!(!canvas.workflow().is_busy());
    assert!(!canvas.store().node(ocean.id).unwrap().loading);
}

#[tokio::test]
async fn expand_in_selection_mode_is_ignored() {
    let canvas = canvas_with(&CanvasSettings::default());
    let ocean = canvas.lock().await.submit_text("ocean").unwrap();
    canvas.lock().await.toggle_selection_mode();

    let report = runtime::expand(&canvas, &Scripted(&["wave"]), ocean.id).await;
    assert!(matches!(report, ExpandReport::Ignored));

    let canvas = canvas.lock().await;
    assert_eq!(canvas.store().nodes().len(), 1);
    assert!(!canvas.workflow().is_busy());
}

#[tokio::test]
async fn repeat_expansion_only_adds_new_concepts() {
    let canvas = canvas_with(&CanvasSettings::default());
    let ocean = canvas.lock().await.submit_text("ocean").unwrap();

    let first = runtime::expand(&canvas, &Scripted(&["wave", "reef"]), ocean.id).await;
    assert!(matches!(first, ExpandReport::Finished(ref o) if o.added() == 2));

    let second = runtime::expand(&canvas, &Scripted(&["Wave", "reef", "tide"]), ocean.id).await;
    assert!(matches!(second, ExpandReport::Finished(ref o) if o.added() == 1));

    let third = runtime::expand(&canvas, &Scripted(&["wave", "tide"]), ocean.id).await;
    assert!(matches!(
        third,
        ExpandReport::Finished(ExpansionOutcome::NoNewConcepts)
    ));

    let canvas = canvas.lock().await;
    let children: Vec<_> = canvas
        .store()
        .children_of(ocean.id)
        .map(|n| n.text.clone())
        .collect();
    assert_eq!(children, vec!["wave", "reef", "tide"]);
    // Children spawn in the simulation too
    assert_eq!(canvas.simulation().len(), 4);
}

#[tokio::test]
async fn click_pointer_event_expands_focused_node() {
    let canvas = canvas_with(&CanvasSettings::default());
    let ocean = canvas.lock().await.submit_text("ocean").unwrap();
    let screen = {
        let mut canvas = canvas.lock().await;
        canvas.frame(1.0);
        let world = canvas.position(ocean.id).unwrap();
        canvas.camera().world_to_screen(world)
    };

    let outcome = runtime::handle_pointer(
        &canvas,
        &Scripted(&["wave"]),
        PointerEvent::Click { pos: screen },
    )
    .await
    .expect("click on focused node starts expansion");
    assert_eq!(outcome.added(), 1);
}

#[test]
fn drag_pins_follows_and_releases() {
    let mut canvas = IdeaCanvas::new(&CanvasSettings::default());
    let ocean = canvas.submit_text("ocean").unwrap();

    // Let the focus transition finish so the transform is stable
    for _ in 0..60 {
        canvas.frame(1.0 / 60.0);
    }
    assert!(!canvas.camera().is_animating());

    let start = canvas
        .camera()
        .world_to_screen(canvas.position(ocean.id).unwrap());
    let target_world = Pos2::new(500.0, 500.0);
    let target = canvas.camera().world_to_screen(target_world);

    assert!(canvas.handle_pointer(PointerEvent::Press { pos: start }).is_none());
    assert!(canvas.simulation().get_node(ocean.id).unwrap().is_pinned());

    assert!(canvas.handle_pointer(PointerEvent::Move { pos: target }).is_none());
    let dragged = canvas.position(ocean.id).unwrap();
    assert!((dragged - target_world).length() < 1e-2);

    assert!(canvas.handle_pointer(PointerEvent::Release { pos: target }).is_none());
    assert!(!canvas.simulation().get_node(ocean.id).unwrap().is_pinned());
    let released = canvas.position(ocean.id).unwrap();
    assert!((released - target_world).length() < 1e-2);
    // Released positions are written back to the store
    let stored = canvas.store().node(ocean.id).unwrap();
    assert!((Pos2::new(stored.x, stored.y) - target_world).length() < 1e-2);

    // The click that ends a drag does not expand
    assert!(canvas.handle_pointer(PointerEvent::Click { pos: target }).is_none());
    assert!(!canvas.workflow().is_busy());

    // Forces act on it again once released
    canvas.frame(0.05);
    assert!(canvas.position(ocean.id).unwrap() != released);
}

#[test]
fn canvas_reloads_from_snapshot() {
    let snapshots = MemorySnapshotStore::new();
    let settings = CanvasSettings::default();
    let ocean_id = {
        let mut canvas = IdeaCanvas::with_persistence(&settings, Box::new(snapshots.clone()));
        let ocean = canvas.submit_text("ocean").unwrap();
        canvas.submit_text("wave").unwrap();
        for _ in 0..30 {
            canvas.frame(1.0 / 60.0);
        }
        assert!(canvas.save());
        ocean.id
    };

    let canvas = IdeaCanvas::with_persistence(&settings, Box::new(snapshots));
    assert_eq!(canvas.store().nodes().len(), 2);
    assert_eq!(canvas.store().links().len(), 1);
    assert_eq!(canvas.simulation().len(), 2);
    assert!(canvas.focused().is_none());
    assert!(canvas.store().has_children(ocean_id));
}

#[test]
fn shipped_settings_file_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/canvas_settings.yaml");
    let settings = CanvasSettings::load(path).unwrap();
    assert_eq!(settings.physics.trunk_link_distance, 180.0);
    assert_eq!(settings.physics.leaf_link_distance, 100.0);
    assert_eq!(settings.camera.focus_duration_ms, 750);
    assert_eq!(settings.expansion.timeout(), Duration::from_secs(60));
    assert_eq!(settings.documents.timeout(), Duration::from_secs(120));
}
