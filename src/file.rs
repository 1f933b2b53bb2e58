use actix_multipart::Multipart;
use futures_util::TryStreamExt as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::error::{ApiError, ErrorCode};
use crate::models::{File, Id, NewFile};
use crate::repo::{Repo, RepoError};
use crate::storage::ObjectStore;

pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

pub const ALLOWED_MIME: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "video/mp4",
    "video/webm",
    "application/pdf",
];

/// A file read out of a multipart body, not yet stored.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub ref_id: Option<String>,
    pub ref_type: Option<String>,
}

/// Multipart body accepted by the upload endpoint (documentation only).
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: String,
    pub ref_id: Option<String>,
    pub ref_type: Option<String>,
}

fn invalid_file(message: impl Into<String>) -> ApiError {
    ApiError::bad_request(message, ErrorCode::InvalidFile)
}

/// Collect the `file`, `refId` and `refType` fields. Unknown fields are skipped.
pub async fn read_upload(mut payload: Multipart) -> Result<Upload, ApiError> {
    let mut upload = Upload::default();
    let mut saw_file = false;
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        tracing::debug!(error = %e, "multipart error");
        invalid_file("Malformed multipart body")
    })? {
        let name = field.content_disposition().get_name().unwrap_or_default().to_string();
        let mut buf: Vec<u8> = Vec::new();
        let limit = if name == "file" { MAX_FILE_BYTES } else { 1024 };
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            tracing::debug!(error = %e, "multipart stream error");
            invalid_file("Malformed multipart body")
        })? {
            if buf.len() + chunk.len() > limit {
                return Err(invalid_file(format!("Field '{name}' is too large")));
            }
            buf.extend_from_slice(&chunk);
        }
        match name.as_str() {
            "file" => {
                saw_file = true;
                upload.bytes = buf;
            }
            "refId" => upload.ref_id = text_field(buf),
            "refType" => upload.ref_type = text_field(buf),
            _ => {}
        }
    }
    if !saw_file {
        return Err(invalid_file("No file provided"));
    }
    Ok(upload)
}

fn text_field(buf: Vec<u8>) -> Option<String> {
    String::from_utf8(buf).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub struct FileService<'a> {
    repo: &'a dyn Repo,
    store: &'a dyn ObjectStore,
}

impl<'a> FileService<'a> {
    pub fn new(repo: &'a dyn Repo, store: &'a dyn ObjectStore) -> Self {
        Self { repo, store }
    }

    /// Relay bytes to object storage and record where they went.
    pub async fn upload(&self, upload: Upload) -> Result<File, ApiError> {
        if upload.bytes.is_empty() {
            return Err(invalid_file("File is empty"));
        }
        if upload.bytes.len() > MAX_FILE_BYTES {
            return Err(invalid_file("File exceeds 10 MiB"));
        }
        let mime = infer::get(&upload.bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        if !ALLOWED_MIME.contains(&mime.as_str()) {
            return Err(invalid_file(format!("Unsupported file type {mime}")));
        }
        let hash = hex::encode(Sha256::digest(&upload.bytes));
        let stored = self.store.put(&hash, &mime, &upload.bytes).await.map_err(|e| {
            tracing::error!(error = %e, %hash, "object storage upload failed");
            ApiError::Internal { message: "Failed to store file".into(), code: ErrorCode::StorageError }
        })?;
        let file = self
            .repo
            .create_file(NewFile {
                public_id: stored.public_id,
                url: stored.url,
                ref_id: upload.ref_id,
                ref_type: upload.ref_type,
            })
            .await
            .map_err(store_failure("record file"))?;
        tracing::info!(file_id = %file.id, %mime, size = upload.bytes.len(), "file stored");
        Ok(file)
    }

    pub async fn ids_for_urls(&self, urls: &[String]) -> Result<Vec<Id>, ApiError> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        self.repo.file_ids_for_urls(urls).await.map_err(store_failure("look up files"))
    }
}

fn store_failure(op: &'static str) -> impl Fn(RepoError) -> ApiError {
    move |e| match e {
        RepoError::Internal(msg) => {
            tracing::error!(op, error = %msg, "file store failure");
            ApiError::database(format!("Failed to {op}"))
        }
        other => other.into(),
    }
}
