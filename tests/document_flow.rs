//! Document generation from multi-selected concepts

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::sync::Mutex;

use idea_spark::runtime::{self, SharedCanvas, SharedLibrary};
use idea_spark::{
    CanvasSettings, DocumentError, DocumentGenerator, DocumentLibrary, IdeaCanvas,
    InteractionMode, MemoryDocumentStore,
};

struct Echo;

#[async_trait]
impl DocumentGenerator for Echo {
    async fn generate(&self, keywords: &[String]) -> Result<String> {
        Ok(format!("# Tides\n\nBuilt from {}", keywords.join(", ")))
    }
}

struct Broken;

#[async_trait]
impl DocumentGenerator for Broken {
    async fn generate(&self, _keywords: &[String]) -> Result<String> {
        anyhow::bail!("model overloaded")
    }
}

struct Slow;

#[async_trait]
impl DocumentGenerator for Slow {
    async fn generate(&self, _keywords: &[String]) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok("# Late".to_string())
    }
}

async fn selection_canvas() -> (SharedCanvas, SharedLibrary) {
    let mut canvas = IdeaCanvas::new(&CanvasSettings::default());
    let ocean = canvas.submit_text("ocean").unwrap();
    let wave = canvas.submit_text("wave").unwrap();

    assert_eq!(canvas.toggle_selection_mode(), InteractionMode::Selection);
    assert!(canvas.click_node(wave.id).is_none());
    assert!(canvas.click_node(ocean.id).is_none());
    assert_eq!(canvas.selected_texts(), vec!["wave", "ocean"]);

    (
        runtime::shared(canvas),
        Arc::new(Mutex::new(DocumentLibrary::new())),
    )
}

#[tokio::test]
async fn generated_document_is_saved_and_shown() {
    let (canvas, library) = selection_canvas().await;
    let store = MemoryDocumentStore::new();

    let document = runtime::generate_document(&canvas, &library, &Echo, &store)
        .await
        .unwrap();
    assert_eq!(document.title, "Tides");
    assert_eq!(document.keywords, vec!["wave", "ocean"]);
    assert!(document.content.contains("wave, ocean"));

    assert_eq!(store.len().await, 1);
    {
        let library = library.lock().await;
        assert_eq!(library.documents().len(), 1);
        assert_eq!(library.viewing().map(|d| d.id), Some(document.id));
        assert!(!library.is_generating());
        assert!(library.notice().is_none());
    }

    let canvas = canvas.lock().await;
    assert_eq!(canvas.mode(), InteractionMode::Normal);
    assert!(canvas.selected_texts().is_empty());
}

#[tokio::test]
async fn generation_failure_keeps_selection() {
    let (canvas, library) = selection_canvas().await;
    let store = MemoryDocumentStore::new();

    let err = runtime::generate_document(&canvas, &library, &Broken, &store)
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::Generation(_)));
    assert!(store.is_empty().await);
    assert!(!library.lock().await.is_generating());

    let canvas = canvas.lock().await;
    assert_eq!(canvas.mode(), InteractionMode::Selection);
    assert_eq!(canvas.selected_texts().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_generation_times_out() {
    let mut settings = CanvasSettings::default();
    settings.documents.timeout_ms = 5_000;
    let mut canvas = IdeaCanvas::new(&settings);
    let ocean = canvas.submit_text("ocean").unwrap();
    canvas.toggle_selection_mode();
    assert!(canvas.click_node(ocean.id).is_none());
    let canvas = runtime::shared(canvas);
    let library = Arc::new(Mutex::new(DocumentLibrary::new()));

    let err = runtime::generate_document(&canvas, &library, &Slow, &MemoryDocumentStore::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::TimedOut(d) if d == Duration::from_secs(5)));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn empty_selection_is_rejected() {
    let canvas = runtime::shared(IdeaCanvas::new(&CanvasSettings::default()));
    canvas.lock().await.toggle_selection_mode();
    let library = Arc::new(Mutex::new(DocumentLibrary::new()));

    let err = runtime::generate_document(&canvas, &library, &Echo, &MemoryDocumentStore::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::EmptySelection));
    assert!(!library.lock().await.is_generating());
}

#[tokio::test]
async fn insert_failure_still_shows_document_with_notice() {
    let (canvas, library) = selection_canvas().await;
    let store = MemoryDocumentStore::new();
    store.fail_insert(true);

    let document = runtime::generate_document(&canvas, &library, &Echo, &store)
        .await
        .unwrap();
    assert!(store.is_empty().await);

    let mut library = library.lock().await;
    assert!(library.get(document.id).is_some());
    assert!(library.take_notice().is_some());
    assert!(library.notice().is_none());
}

#[tokio::test]
async fn delete_failure_leaves_document_in_place() {
    let (canvas, library) = selection_canvas().await;
    let store = MemoryDocumentStore::new();
    let document = runtime::generate_document(&canvas, &library, &Echo, &store)
        .await
        .unwrap();

    store.fail_delete(true);
    let err = runtime::delete_document(&library, &store, document.id)
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::StoreDelete(_)));
    assert_eq!(library.lock().await.documents().len(), 1);
    assert_eq!(store.len().await, 1);

    store.fail_delete(false);
    runtime::delete_document(&library, &store, document.id)
        .await
        .unwrap();
    let library = library.lock().await;
    assert!(library.documents().is_empty());
    assert!(library.viewing().is_none());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn refresh_replaces_local_list() {
    let (canvas, library) = selection_canvas().await;
    let store = MemoryDocumentStore::new();
    runtime::generate_document(&canvas, &library, &Echo, &store)
        .await
        .unwrap();

    let fresh: SharedLibrary = Arc::new(Mutex::new(DocumentLibrary::new()));
    assert_eq!(runtime::refresh_documents(&fresh, &store).await.unwrap(), 1);

    store.fail_list(true);
    let err = runtime::refresh_documents(&fresh, &store).await.unwrap_err();
    assert!(matches!(err, DocumentError::StoreList(_)));
    // Failed refresh keeps what was there
    assert_eq!(fresh.lock().await.documents().len(), 1);
}
