//! Generation collaborators
//!
//! Two opaque async services sit behind traits so the canvas never depends
//! on a concrete provider:
//! - [`WordExpander`] turns one concept into an unordered candidate list
//! - [`DocumentGenerator`] turns a keyword bundle into a Markdown document
//!
//! [`GeminiClient`] implements both against the Generative Language REST API.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default model for word expansion (fast)
const DEFAULT_WORD_MODEL: &str = "gemini-3-flash-preview";

/// Default model for document writing
const DEFAULT_DOCUMENT_MODEL: &str = "gemini-3-pro-preview";

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// One candidate concept returned by a [`WordExpander`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedWord {
    pub text: String,
}

impl GeneratedWord {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Expands a concept into related concepts
#[async_trait]
pub trait WordExpander: Send + Sync {
    /// Candidates for `concept`; may be empty, order carries no meaning
    async fn expand(&self, concept: &str) -> Result<Vec<GeneratedWord>>;
}

/// Writes a document combining the given keywords
#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    /// Markdown text, ideally opening with a `# ` title line
    async fn generate(&self, keywords: &[String]) -> Result<String>;
}

// =============================================================================
// GEMINI CLIENT
// =============================================================================

/// Gemini REST client
#[derive(Clone)]
pub struct GeminiClient {
    api_key: Option<String>,
    client: reqwest::Client,
    word_model: String,
    document_model: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("has_api_key", &self.api_key.is_some())
            .field("word_model", &self.word_model)
            .field("document_model", &self.document_model)
            .finish()
    }
}

impl GeminiClient {
    /// Create a client with the given API key and default models
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::build(Some(api_key.into()))
    }

    /// Create from environment variables
    ///
    /// `GEMINI_API_KEY` may be absent: expansion then yields no candidates
    /// and document generation fails. `GEMINI_WORD_MODEL` and
    /// `GEMINI_DOCUMENT_MODEL` override the models.
    pub fn from_env() -> Self {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!("GEMINI_API_KEY not set, generation is disabled");
        }
        Self::build(api_key)
    }

    fn build(api_key: Option<String>) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            word_model: std::env::var("GEMINI_WORD_MODEL")
                .unwrap_or_else(|_| DEFAULT_WORD_MODEL.to_string()),
            document_model: std::env::var("GEMINI_DOCUMENT_MODEL")
                .unwrap_or_else(|_| DEFAULT_DOCUMENT_MODEL.to_string()),
        }
    }

    /// Override both models
    pub fn with_models(mut self, word_model: &str, document_model: &str) -> Self {
        self.word_model = word_model.to_string();
        self.document_model = document_model.to_string();
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn word_model(&self) -> &str {
        &self.word_model
    }

    pub fn document_model(&self) -> &str {
        &self.document_model
    }

    /// Internal API call implementation
    async fn call_api(
        &self,
        model: &str,
        prompt: &str,
        generation_config: Option<serde_json::Value>,
    ) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("GEMINI_API_KEY environment variable not set"))?;

        let mut body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });
        if let Some(config) = generation_config {
            body["generationConfig"] = config;
        }

        let response = self
            .client
            .post(format!("{}/{}:generateContent", API_BASE, model))
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini API error {}: {}", status, body));
        }

        let api_response: ApiResponse = response.json().await?;
        let text = api_response.text();
        debug!(model, len = text.len(), "Gemini response received");

        if text.is_empty() {
            return Err(anyhow!("Gemini returned no content"));
        }
        Ok(text)
    }
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl ApiResponse {
    /// Concatenated text parts of the first candidate
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Parse a word-list payload: `{"items": [{"text": ..}]}` or a bare array
pub fn parse_word_list(json: &str) -> Result<Vec<GeneratedWord>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Payload {
        Wrapped {
            #[serde(default)]
            items: Vec<GeneratedWord>,
        },
        Bare(Vec<GeneratedWord>),
    }

    let payload: Payload = serde_json::from_str(json.trim())
        .map_err(|e| anyhow!("Failed to parse word list: {}", e))?;
    let words = match payload {
        Payload::Wrapped { items } => items,
        Payload::Bare(items) => items,
    };
    Ok(words
        .into_iter()
        .filter(|w| !w.text.trim().is_empty())
        .collect())
}

fn word_prompt(concept: &str) -> String {
    format!(
        "List 6 to 8 words or short phrases associated with the concept \"{concept}\". \
         Mix practical, functional, creative and divergent associations useful for \
         product ideation. Answer in the language of the concept. Return JSON."
    )
}

fn document_prompt(keywords: &[String]) -> String {
    format!(
        "You are an experienced product manager. Write a concise product requirement \
         document in Markdown for a product that combines these concepts: [{}].\n\
         Start with a level 1 heading (#) holding a creative project name, then cover: \
         executive summary, core philosophy, target audience, key features and \
         visual direction.",
        keywords.join(", ")
    )
}

fn word_schema() -> serde_json::Value {
    serde_json::json!({
        "responseMimeType": "application/json",
        "responseSchema": {
            "type": "OBJECT",
            "properties": {
                "items": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": { "text": { "type": "STRING" } },
                        "required": ["text"]
                    }
                }
            }
        }
    })
}

#[async_trait]
impl WordExpander for GeminiClient {
    async fn expand(&self, concept: &str) -> Result<Vec<GeneratedWord>> {
        if self.api_key.is_none() {
            warn!(concept, "No API key, expansion yields nothing");
            return Ok(Vec::new());
        }
        let raw = self
            .call_api(&self.word_model, &word_prompt(concept), Some(word_schema()))
            .await?;
        parse_word_list(&raw)
    }
}

#[async_trait]
impl DocumentGenerator for GeminiClient {
    async fn generate(&self, keywords: &[String]) -> Result<String> {
        self.call_api(&self.document_model, &document_prompt(keywords), None)
            .await
    }
}
