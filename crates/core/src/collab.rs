// crates/core/src/collab.rs
//! Interfaces for external collaborators.
//!
//! The dictionary scraper, handwriting recognizer, and blob store live in
//! other systems; the engine consumes them behind these traits so services
//! stay testable with in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CollabError {
    #[error("collaborator unreachable: {0}")]
    Unreachable(String),

    #[error("collaborator rejected the request: {0}")]
    Rejected(String),

    #[error("no dictionary entry for '{0}'")]
    NoEntry(char),
}

/// Metadata scraped for a dictionary character.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordInfo {
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub pronunciation_url: Option<String>,
    pub strokes_url: Option<String>,
}

/// Dictionary metadata source, consulted on the first sighting of a word.
#[async_trait]
pub trait DictionaryScraper: Send + Sync {
    async fn word_info(&self, word: char) -> Result<WordInfo, CollabError>;
}

/// Verdict for one handwritten character.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandwriteVerdict {
    pub is_correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrong_image_url: Option<String>,
}

/// One recognized character from a scanned page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannedChar {
    pub word: char,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrong_image_url: Option<String>,
}

/// Result of scanning a full page of handwriting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub items: Vec<ScannedChar>,
    pub not_found: Vec<ScannedChar>,
}

/// Handwriting-recognition collaborator.
#[async_trait]
pub trait HandwritingRecognizer: Send + Sync {
    async fn check_handwrite(
        &self,
        image_url: &str,
        target: char,
        user_id: Uuid,
    ) -> Result<HandwriteVerdict, CollabError>;

    async fn scan_page(&self, image_url: &str, user_id: Uuid) -> Result<ScanResult, CollabError>;
}

/// Stored-file record returned by the blob store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub file_id: String,
    pub url: String,
    pub size: u64,
    pub content_type: String,
}

/// Blob-store collaborator. `submit_url_for` is the endpoint handed to
/// writing questions for client uploads.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload_image(&self, bytes: Vec<u8>, filename: &str) -> Result<StoredFile, CollabError>;

    fn submit_url_for(&self, user_id: Uuid) -> String;
}
