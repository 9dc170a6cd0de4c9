//! Attachment normalization: uploaded files become image parts or synthetic messages.
//!
//! Images are base64-encoded into `data:` URIs and returned as trailing image
//! parts for the latest message. PDFs and CSVs are extracted to text and appended
//! as extra user messages, in upload order. Extraction failures degrade to a
//! placeholder string instead of failing the request.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use mediassist_core::{Error, Result};
use tracing::{debug, warn};

use crate::types::{ChatMessage, ContentPart, ImageDetail, MessageContent};

pub const PDF_EXTRACTION_FAILED: &str = "Error extracting text from PDF";
pub const CSV_EXTRACTION_FAILED: &str = "Error extracting data from CSV";

/// Category an uploaded file is handled as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    Pdf,
    Csv,
}

impl AttachmentKind {
    /// Classify a MIME type. `None` means the upload must be rejected.
    pub fn classify(mime_type: &str) -> Option<Self> {
        let mime = mime_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        if mime.starts_with("image/") {
            Some(Self::Image)
        } else if mime == "application/pdf" {
            Some(Self::Pdf)
        } else if mime == "text/csv" || mime == "application/vnd.ms-excel" {
            Some(Self::Csv)
        } else {
            None
        }
    }
}

/// A file received with the request, already on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub mime_type: String,
    pub original_name: String,
}

/// Output of [`normalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedConversation {
    /// Client messages followed by one synthetic message per PDF/CSV file.
    pub messages: Vec<ChatMessage>,
    /// Image parts belonging to the last message, in upload order.
    pub trailing_images: Vec<ContentPart>,
}

impl NormalizedConversation {
    /// Messages with the trailing images merged into the last one as
    /// `[text, image, image, ...]`. Provider formatters take the two halves
    /// separately; this view is for callers that want a single message list.
    pub fn into_merged_messages(self) -> Vec<ChatMessage> {
        let NormalizedConversation {
            mut messages,
            trailing_images,
        } = self;

        if trailing_images.is_empty() {
            return messages;
        }

        if let Some(last) = messages.last_mut() {
            let mut parts = Vec::with_capacity(trailing_images.len() + 1);
            parts.push(ContentPart::text(last.content.as_text()));
            parts.extend(trailing_images);
            last.content = MessageContent::Parts(parts);
        }

        messages
    }
}

/// Fold uploaded files into the conversation.
pub async fn normalize(
    mut messages: Vec<ChatMessage>,
    files: &[UploadedFile],
) -> Result<NormalizedConversation> {
    let mut trailing_images = Vec::new();

    for file in files {
        let kind = AttachmentKind::classify(&file.mime_type)
            .ok_or_else(|| Error::UnsupportedContentType(file.mime_type.clone()))?;

        match kind {
            AttachmentKind::Image => {
                let payload = encode_file_base64(&file.path).await?;
                trailing_images.push(ContentPart::image(
                    format!("data:{};base64,{}", file.mime_type, payload),
                    ImageDetail::High,
                ));
            }
            AttachmentKind::Pdf => {
                let text = extract_pdf_text(&file.path).await;
                messages.push(ChatMessage::user(format!(
                    "PDF Content ({}):\n{}",
                    file.original_name, text
                )));
            }
            AttachmentKind::Csv => {
                let text = extract_csv_text(&file.path).await;
                messages.push(ChatMessage::user(format!(
                    "CSV Data ({}):\n{}",
                    file.original_name, text
                )));
            }
        }

        debug!("Normalized {} as {:?}", file.original_name, kind);
    }

    Ok(NormalizedConversation {
        messages,
        trailing_images,
    })
}

async fn encode_file_base64(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(STANDARD.encode(bytes))
}

/// Extract PDF text, page contents newline-joined. Never fails.
pub async fn extract_pdf_text(path: &Path) -> String {
    match read_pdf(path).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Error extracting text from PDF {}: {}", path.display(), e);
            PDF_EXTRACTION_FAILED.to_string()
        }
    }
}

async fn read_pdf(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;

    // pdf-extract is synchronous and can panic on malformed input; a panic
    // surfaces here as a JoinError.
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| Error::AttachmentExtraction(format!("PDF worker failed: {}", e)))?
        .map_err(|e| Error::AttachmentExtraction(e.to_string()))?;

    let pages: Vec<&str> = text
        .split('\u{c}')
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect();

    Ok(pages.join("\n"))
}

/// Extract CSV rows as `header: value` lines. Never fails.
pub async fn extract_csv_text(path: &Path) -> String {
    let result = match tokio::fs::read(path).await {
        Ok(bytes) => csv_to_text(&bytes),
        Err(e) => Err(Error::Io(e)),
    };

    match result {
        Ok(text) => text,
        Err(e) => {
            warn!("Error extracting data from CSV {}: {}", path.display(), e);
            CSV_EXTRACTION_FAILED.to_string()
        }
    }
}

/// One block per row, each line `header: value`, rows newline-joined.
fn csv_to_text(bytes: &[u8]) -> Result<String> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| Error::AttachmentExtraction(e.to_string()))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::AttachmentExtraction(e.to_string()))?;
        let lines: Vec<String> = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| format!("{}: {}", header.trim(), value.trim()))
            .collect();
        rows.push(lines.join("\n"));
    }

    Ok(rows.join("\n"))
}

/// Decode a base64 `data:` URI into its MIME type and bytes.
pub fn decode_data_uri(url: &str) -> Result<(String, Vec<u8>)> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| Error::InvalidRequest("attachment url must be a data: URI".into()))?;

    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::InvalidRequest("data: URI has no payload".into()))?;

    let mime = meta
        .strip_suffix(";base64")
        .ok_or_else(|| Error::InvalidRequest("data: URI is not base64-encoded".into()))?;

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::InvalidRequest(format!("invalid base64 attachment: {}", e)))?;

    Ok((mime.to_string(), bytes))
}
