//! Request-scoped temporary files for chat attachments.
//!
//! Every file written here belongs to exactly one request. The owning
//! [`UploadBatch`] removes them when the response stream finishes, when the
//! client goes away, or when the request fails before streaming starts.

use std::path::{Path, PathBuf};

use axum::extract::multipart::{Field, MultipartError};
use axum::http::StatusCode;
use mediassist_chat::{AttachmentKind, UploadedFile};
use mediassist_core::{Error, Result};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Upper bound on attachments in a single request, used to size the body limit.
pub const MAX_FILES_PER_REQUEST: u64 = 10;

/// Room for the `messages` field and multipart framing on top of the files.
const ENVELOPE_BYTES: u64 = 1024 * 1024;

/// Whole-body ceiling. Per-file limits are enforced while streaming; this only
/// stops a request from carrying an unbounded number of files. JSON bodies
/// carry base64, hence the 4/3.
pub fn request_body_limit(max_file_size: u64) -> usize {
    let files = max_file_size.saturating_mul(MAX_FILES_PER_REQUEST);
    let limit = files.saturating_mul(4) / 3 + ENVELOPE_BYTES;
    usize::try_from(limit).unwrap_or(usize::MAX)
}

pub const UNSUPPORTED_FILE_TYPE: &str =
    "Unsupported file type. Please upload images, PDFs, or CSV files.";

/// Writes uploads into the configured temp directory.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_file_size: u64,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, max_file_size: u64) -> Self {
        Self {
            dir: dir.into(),
            max_file_size,
        }
    }

    pub fn body_limit(&self) -> usize {
        request_body_limit(self.max_file_size)
    }

    /// Map a failed multipart read. Hitting the body limit is a size error,
    /// anything else a malformed request.
    pub fn multipart_error(&self, name: &str, err: MultipartError) -> Error {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            warn!("Request body exceeded {} bytes while reading {}", self.body_limit(), name);
            Error::FileTooLarge {
                name: name.to_string(),
                limit: self.body_limit() as u64,
            }
        } else {
            Error::InvalidRequest(format!("Failed to read {}: {}", name, err.body_text()))
        }
    }

    /// Stream a multipart file field to disk, enforcing the size limit as
    /// chunks arrive. A partially written file is removed on failure.
    pub async fn store_field(&self, mut field: Field<'_>) -> Result<TempUpload> {
        let name = field.file_name().unwrap_or("file").to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        check_file_type(&name, &mime_type)?;

        let upload = self.reserve(&name, &mime_type);
        let mut file = tokio::fs::File::create(&upload.file.path).await?;
        let mut written: u64 = 0;

        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| self.multipart_error(&name, e))?
        {
            written += chunk.len() as u64;
            if written > self.max_file_size {
                warn!("Upload {} exceeds {} bytes", name, self.max_file_size);
                return Err(Error::FileTooLarge {
                    name,
                    limit: self.max_file_size,
                });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        debug!("Stored {} ({} bytes) at {}", name, written, upload.file.path.display());
        Ok(upload)
    }

    /// Write an already decoded attachment to disk.
    pub async fn store_bytes(&self, name: &str, mime_type: &str, bytes: &[u8]) -> Result<TempUpload> {
        check_file_type(name, mime_type)?;
        if bytes.len() as u64 > self.max_file_size {
            return Err(Error::FileTooLarge {
                name: name.to_string(),
                limit: self.max_file_size,
            });
        }

        let upload = self.reserve(name, mime_type);
        tokio::fs::write(&upload.file.path, bytes).await?;

        debug!("Stored {} ({} bytes) at {}", name, bytes.len(), upload.file.path.display());
        Ok(upload)
    }

    /// Claim a unique path. The guard exists before the file does, so a
    /// failed write still gets cleaned up.
    fn reserve(&self, name: &str, mime_type: &str) -> TempUpload {
        TempUpload::new(UploadedFile {
            path: self.dir.join(temp_file_name(name)),
            mime_type: mime_type.to_string(),
            original_name: name.to_string(),
        })
    }
}

fn check_file_type(name: &str, mime_type: &str) -> Result<()> {
    if AttachmentKind::classify(mime_type).is_none() {
        warn!("Rejected upload {} with type {}", name, mime_type);
        return Err(Error::UnsupportedContentType(UNSUPPORTED_FILE_TYPE.into()));
    }
    Ok(())
}

/// `files-<millis>-<uuid><ext>`, keeping the original extension.
fn temp_file_name(original_name: &str) -> String {
    let ext = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();

    format!(
        "files-{}-{}{}",
        chrono::Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4().simple(),
        ext
    )
}

/// Remove a temp file. Returns whether a file was actually deleted.
pub fn cleanup_file(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed temp file {}", path.display());
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to remove temp file {}: {}", path.display(), e);
            false
        }
    }
}

/// One temp file, removed exactly once: on [`TempUpload::release`] or on drop.
#[derive(Debug)]
pub struct TempUpload {
    file: UploadedFile,
    released: bool,
}

impl TempUpload {
    fn new(file: UploadedFile) -> Self {
        Self {
            file,
            released: false,
        }
    }

    pub fn file(&self) -> &UploadedFile {
        &self.file
    }

    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            cleanup_file(&self.file.path);
        }
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        self.release();
    }
}

/// All temp files of one request.
#[derive(Debug, Default)]
pub struct UploadBatch {
    uploads: Vec<TempUpload>,
}

impl UploadBatch {
    pub fn push(&mut self, upload: TempUpload) {
        self.uploads.push(upload);
    }

    pub fn files(&self) -> Vec<UploadedFile> {
        self.uploads.iter().map(|u| u.file.clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.uploads
            .iter()
            .map(|u| u.file.original_name.as_str())
            .collect()
    }

    pub fn release_all(&mut self) {
        for upload in &mut self.uploads {
            upload.release();
        }
    }
}
