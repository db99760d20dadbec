//! Generated document library
//!
//! Documents are produced from a bundle of selected concepts by a
//! [`DocumentGenerator`] and kept in a remote [`DocumentStore`]. The library
//! is the local view: newest first, with the currently viewed document and
//! the generating/notice flags a panel reads.
//!
//! Failure rules:
//! - generation failure leaves the library unchanged
//! - insert failure is surfaced as a notice, the document is still shown
//! - delete failure is surfaced and local state is left untouched

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::DocumentError;
use crate::generation::DocumentGenerator;

// =============================================================================
// DOCUMENT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A generated document and the concepts it was built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedDocument {
    pub id: DocumentId,
    pub title: String,
    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl GeneratedDocument {
    pub fn new(content: impl Into<String>, keywords: Vec<String>) -> Self {
        let content = content.into();
        Self {
            id: DocumentId::new(),
            title: document_title(&content, &keywords),
            content,
            timestamp: Utc::now(),
            keywords,
        }
    }
}

/// First level-1 heading, else `PRD: <first keyword>...`
pub fn document_title(content: &str, keywords: &[String]) -> String {
    content
        .lines()
        .filter_map(|line| line.strip_prefix('#'))
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map(str::trim)
        .find(|title| !title.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!(
                "PRD: {}...",
                keywords.first().map(String::as_str).unwrap_or_default()
            )
        })
}

// =============================================================================
// STORE
// =============================================================================

/// Remote document storage
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All documents, newest first
    async fn list(&self) -> Result<Vec<GeneratedDocument>>;

    async fn insert(&self, document: &GeneratedDocument) -> Result<()>;

    async fn delete(&self, id: DocumentId) -> Result<()>;
}

#[derive(Debug, Default)]
struct FailureSwitches {
    list: AtomicBool,
    insert: AtomicBool,
    delete: AtomicBool,
}

/// In-process store; clones share contents and failure switches
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<Mutex<Vec<GeneratedDocument>>>,
    failures: Arc<FailureSwitches>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_list(&self, fail: bool) {
        self.failures.list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_insert(&self, fail: bool) {
        self.failures.insert.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.failures.delete.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.lock().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list(&self) -> Result<Vec<GeneratedDocument>> {
        if self.failures.list.load(Ordering::SeqCst) {
            anyhow::bail!("document store unavailable");
        }
        let mut documents = self.documents.lock().await.clone();
        documents.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(documents)
    }

    async fn insert(&self, document: &GeneratedDocument) -> Result<()> {
        if self.failures.insert.load(Ordering::SeqCst) {
            anyhow::bail!("insert rejected");
        }
        self.documents.lock().await.push(document.clone());
        Ok(())
    }

    async fn delete(&self, id: DocumentId) -> Result<()> {
        if self.failures.delete.load(Ordering::SeqCst) {
            anyhow::bail!("delete rejected");
        }
        self.documents.lock().await.retain(|d| d.id != id);
        Ok(())
    }
}

// =============================================================================
// LIBRARY
// =============================================================================

/// Proof that a generation was started; hand back to `complete_generation`
#[derive(Debug)]
#[must_use = "a generation ticket must be passed to DocumentLibrary::complete_generation"]
pub struct GenerationTicket {
    keywords: Vec<String>,
}

impl GenerationTicket {
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

/// Local view of the document store
#[derive(Debug, Clone, Default)]
pub struct DocumentLibrary {
    /// Newest first
    documents: Vec<GeneratedDocument>,
    viewing: Option<DocumentId>,
    generating: bool,
    /// Last user-visible failure
    notice: Option<String>,
}

impl DocumentLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn documents(&self) -> &[GeneratedDocument] {
        &self.documents
    }

    pub fn get(&self, id: DocumentId) -> Option<&GeneratedDocument> {
        self.documents.iter().find(|d| d.id == id)
    }

    /// Document open in the viewer
    pub fn viewing(&self) -> Option<&GeneratedDocument> {
        self.viewing.and_then(|id| self.get(id))
    }

    pub fn view(&mut self, id: DocumentId) -> bool {
        if self.get(id).is_some() {
            self.viewing = Some(id);
            true
        } else {
            false
        }
    }

    pub fn close_view(&mut self) {
        self.viewing = None;
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    // =========================================================================
    // REFRESH
    // =========================================================================

    /// Replace the list from the store; on failure the list is kept
    pub async fn refresh(&mut self, store: &dyn DocumentStore) -> Result<usize, DocumentError> {
        match store.list().await {
            Ok(documents) => {
                self.replace_all(documents);
                Ok(self.documents.len())
            }
            Err(e) => {
                warn!("Failed to list documents: {:#}", e);
                Err(DocumentError::StoreList(e.to_string()))
            }
        }
    }

    /// Install a freshly listed set of documents
    pub fn replace_all(&mut self, mut documents: Vec<GeneratedDocument>) {
        documents.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        self.documents = documents;
        if let Some(id) = self.viewing {
            if self.get(id).is_none() {
                self.viewing = None;
            }
        }
    }

    // =========================================================================
    // GENERATION
    // =========================================================================

    /// Claim the single generation slot
    pub fn begin_generation(
        &mut self,
        keywords: Vec<String>,
    ) -> Result<GenerationTicket, DocumentError> {
        if keywords.is_empty() {
            return Err(DocumentError::EmptySelection);
        }
        if self.generating {
            return Err(DocumentError::Busy);
        }
        self.generating = true;
        info!(count = keywords.len(), "Document generation started");
        Ok(GenerationTicket { keywords })
    }

    /// Release the slot and record the result
    ///
    /// `generated` is the collaborator's text; `insert` is the store's answer
    /// for the document built from it (`None` when insertion was not tried).
    pub fn complete_generation(
        &mut self,
        _ticket: GenerationTicket,
        document: Result<GeneratedDocument, DocumentError>,
        insert: Option<Result<(), DocumentError>>,
    ) -> Result<GeneratedDocument, DocumentError> {
        self.generating = false;

        let document = match document {
            Ok(document) => document,
            Err(e) => {
                warn!("Document generation failed: {}", e);
                return Err(e);
            }
        };

        if let Some(Err(e)) = insert {
            warn!(document_id = %document.id, "{}", e);
            self.notice = Some(e.to_string());
        }

        self.documents.insert(0, document.clone());
        self.viewing = Some(document.id);
        info!(document_id = %document.id, title = %document.title, "Document added");
        Ok(document)
    }

    /// Generate, save and show a document for `keywords`
    pub async fn generate_and_save(
        &mut self,
        generator: &dyn DocumentGenerator,
        store: &dyn DocumentStore,
        keywords: Vec<String>,
        timeout: Duration,
    ) -> Result<GeneratedDocument, DocumentError> {
        let ticket = self.begin_generation(keywords)?;
        let (document, insert) = run_generation(generator, store, ticket.keywords(), timeout).await;
        self.complete_generation(ticket, document, insert)
    }

    // =========================================================================
    // DELETE
    // =========================================================================

    /// Delete remotely first; local state only changes on success
    pub async fn delete(
        &mut self,
        store: &dyn DocumentStore,
        id: DocumentId,
    ) -> Result<(), DocumentError> {
        let result = store
            .delete(id)
            .await
            .map_err(|e| DocumentError::StoreDelete(e.to_string()));
        self.apply_delete(id, result)
    }

    /// Record the store's answer to a delete
    pub fn apply_delete(
        &mut self,
        id: DocumentId,
        result: Result<(), DocumentError>,
    ) -> Result<(), DocumentError> {
        if let Err(e) = result {
            warn!(document_id = %id, "{}", e);
            self.notice = Some(e.to_string());
            return Err(e);
        }
        self.documents.retain(|d| d.id != id);
        if self.viewing == Some(id) {
            self.viewing = None;
        }
        info!(document_id = %id, "Document deleted");
        Ok(())
    }
}

/// Collaborator call plus store insert, without touching any library
pub async fn run_generation(
    generator: &dyn DocumentGenerator,
    store: &dyn DocumentStore,
    keywords: &[String],
    timeout: Duration,
) -> (
    Result<GeneratedDocument, DocumentError>,
    Option<Result<(), DocumentError>>,
) {
    let content = match tokio::time::timeout(timeout, generator.generate(keywords)).await {
        Ok(Ok(content)) => content,
        Ok(Err(e)) => return (Err(DocumentError::Generation(format!("{:#}", e))), None),
        Err(_) => return (Err(DocumentError::TimedOut(timeout)), None),
    };

    let document = GeneratedDocument::new(content, keywords.to_vec());
    let insert = store
        .insert(&document)
        .await
        .map_err(|e| DocumentError::StoreInsert(e.to_string()));
    (Ok(document), Some(insert))
}
