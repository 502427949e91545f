// crates/server/src/collaborators.rs
//! HTTP-backed implementations of the collaborator traits: the dictionary
//! scraper, the handwriting recognizer, and the blob store.
//!
//! These are deliberately thin; the real systems live elsewhere and the
//! engine only depends on the traits in `zixue_core::collab`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use zixue_core::{
    BlobStore, CollabError, DictionaryScraper, HandwriteVerdict, HandwritingRecognizer,
    ScanResult, StoredFile, WordInfo,
};

fn transport(e: reqwest::Error) -> CollabError {
    CollabError::Unreachable(e.to_string())
}

/// Dictionary scraper over a metadata HTTP endpoint.
pub struct HttpDictionaryScraper {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDictionaryScraper {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }
}

#[async_trait]
impl DictionaryScraper for HttpDictionaryScraper {
    async fn word_info(&self, word: char) -> Result<WordInfo, CollabError> {
        let response = self
            .http
            .get(format!("{}/words/{}", self.base_url, word))
            .send()
            .await
            .map_err(transport)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CollabError::NoEntry(word));
        }
        if !response.status().is_success() {
            return Err(CollabError::Rejected(format!(
                "dictionary returned {}",
                response.status()
            )));
        }
        response.json::<WordInfo>().await.map_err(transport)
    }
}

/// Handwriting recognizer over the OCR service's HTTP surface.
pub struct HttpHandwritingRecognizer {
    http: reqwest::Client,
    base_url: String,
}

impl HttpHandwritingRecognizer {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }
}

#[async_trait]
impl HandwritingRecognizer for HttpHandwritingRecognizer {
    async fn check_handwrite(
        &self,
        image_url: &str,
        target: char,
        user_id: Uuid,
    ) -> Result<HandwriteVerdict, CollabError> {
        let response = self
            .http
            .post(format!("{}/check-handwrite", self.base_url))
            .json(&json!({
                "image_url": image_url,
                "target_word": target.to_string(),
                "user_id": user_id,
            }))
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(CollabError::Rejected(format!(
                "recognizer returned {}",
                response.status()
            )));
        }
        response.json::<HandwriteVerdict>().await.map_err(transport)
    }

    async fn scan_page(&self, image_url: &str, user_id: Uuid) -> Result<ScanResult, CollabError> {
        let response = self
            .http
            .post(format!("{}/scan-page", self.base_url))
            .json(&json!({"image_url": image_url, "user_id": user_id}))
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(CollabError::Rejected(format!(
                "recognizer returned {}",
                response.status()
            )));
        }
        response.json::<ScanResult>().await.map_err(transport)
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file_id: String,
    url: String,
    size: u64,
    content_type: String,
}

/// Blob store over the S3-like file service.
pub struct HttpBlobStore {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBlobStore {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload_image(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<StoredFile, CollabError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("image/png")
            .map_err(|e| CollabError::Rejected(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .http
            .post(format!("{}/files/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(CollabError::Rejected(format!(
                "blob store returned {}",
                response.status()
            )));
        }
        let uploaded: UploadResponse = response.json().await.map_err(transport)?;
        Ok(StoredFile {
            file_id: uploaded.file_id,
            url: uploaded.url,
            size: uploaded.size,
            content_type: uploaded.content_type,
        })
    }

    fn submit_url_for(&self, _user_id: Uuid) -> String {
        format!("{}/files/upload", self.base_url)
    }
}
