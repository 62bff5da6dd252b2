//! File uploads driven through the batch executor.
//!
//! Files are validated first; a file that breaks a [`ValidationRules`] rule becomes a
//! task failing with [`TaskError::Terminal`], so it consumes its result slot without a
//! network call or retry. Everything else goes through an [`Uploader`].

mod http;
mod validation;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, TaskError};
use crate::executor::{BatchOptions, run_batch};
use crate::types::{BatchSummary, Task, TaskResult, task};

pub use http::{HttpUploader, UploadedFile};
pub use validation::{ValidationReport, ValidationRules};

/// A file held in memory, ready to upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileUpload {
    /// File name sent with the multipart part
    pub filename: String,
    /// MIME type (e.g. `image/png`)
    pub content_type: String,
    /// File contents
    pub bytes: Vec<u8>,
}

impl FileUpload {
    /// File from in-memory contents
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, inferring its content type from the extension
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Other(format!("{} has no file name", path.display())))?;
        let content_type = content_type_for(path);

        Ok(Self {
            filename,
            content_type,
            bytes,
        })
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Best-effort content type from a file extension
fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Success payload of one upload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    /// Original file name
    pub filename: String,
    /// Size in bytes
    pub size: u64,
    /// MIME type
    pub content_type: String,
    /// Where the service stored the file
    pub src: String,
    /// When the upload completed
    pub uploaded_at: DateTime<Utc>,
}

impl UploadRecord {
    fn new(file: &FileUpload, uploaded: UploadedFile) -> Self {
        Self {
            filename: file.filename.clone(),
            size: file.size(),
            content_type: file.content_type.clone(),
            src: uploaded.src,
            uploaded_at: Utc::now(),
        }
    }
}

/// Performs one upload
///
/// Implementations classify their own failures: [`TaskError::Transient`] for anything
/// worth retrying, [`TaskError::Terminal`] for errors that will never succeed.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload `file` and report where it was stored
    async fn upload(&self, file: &FileUpload) -> std::result::Result<UploadedFile, TaskError>;
}

/// Build the task for one file, rejecting it up front if it breaks a rule
fn upload_task(uploader: Arc<dyn Uploader>, file: FileUpload, rules: &ValidationRules) -> Task<UploadRecord> {
    let report = rules.validate(&file);
    if !report.is_valid {
        let reason = report.errors.join("; ");
        tracing::warn!(filename = %file.filename, reason = %reason, "file rejected by validation");
        return task(move || {
            let reason = reason.clone();
            async move { Err(TaskError::Terminal(reason)) }
        });
    }

    let file = Arc::new(file);
    task(move || {
        let uploader = Arc::clone(&uploader);
        let file = Arc::clone(&file);
        async move {
            let uploaded = uploader.upload(&file).await?;
            tracing::debug!(filename = %file.filename, src = %uploaded.src, "file uploaded");
            Ok(UploadRecord::new(&file, uploaded))
        }
    })
}

/// Validate and upload `files` concurrently
///
/// The summary lists one result per file in the order given. To retry only the
/// failures, resubmit the files at [`BatchSummary::failed_indices`].
///
/// # Errors
///
/// Fails only on invalid `options`, before any upload starts.
pub async fn upload_files(
    uploader: Arc<dyn Uploader>,
    files: Vec<FileUpload>,
    rules: &ValidationRules,
    options: BatchOptions<UploadRecord>,
) -> Result<BatchSummary<UploadRecord>> {
    tracing::info!(files = files.len(), concurrency = options.concurrency, "Uploading files");

    let tasks = files
        .into_iter()
        .map(|file| upload_task(Arc::clone(&uploader), file, rules))
        .collect();

    run_batch(tasks, options).await
}

/// Validate and upload a single file with default retry settings
pub async fn upload_file(
    uploader: Arc<dyn Uploader>,
    file: FileUpload,
    rules: &ValidationRules,
) -> Result<TaskResult<UploadRecord>> {
    let summary = upload_files(
        uploader,
        vec![file],
        rules,
        BatchOptions::default().with_concurrency(1),
    )
    .await?;

    summary
        .results
        .into_iter()
        .next()
        .ok_or_else(|| Error::Other("single-file batch produced no result".into()))
}
