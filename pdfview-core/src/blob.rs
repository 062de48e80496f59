use std::fmt;
use std::path::Path;

use bytes::Bytes;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The only document type the viewer accepts.
pub const PDF_MIME_TYPE: &str = "application/pdf";

pub const OCTET_STREAM_MIME_TYPE: &str = "application/octet-stream";

const PDF_MAGIC: &[u8] = b"%PDF-";

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f1d0c52-8b7e-5d2a-9a61-2c4b7e90d1f3").expect("valid namespace UUID")
});

/// Content-derived id: the same bytes always map to the same document.
pub fn document_id_for_bytes(bytes: &[u8]) -> DocumentId {
    Uuid::new_v5(&DOCUMENT_NAMESPACE, bytes)
}

/// A file-like value handed over by a file source: a name, the declared MIME
/// type and the raw bytes. Cloning shares the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Blob {
    name: String,
    mime_type: String,
    bytes: Bytes,
}

impl Blob {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Builds a blob for a file read from disk, tagging it the way a browser
    /// file input would: by extension first, then by content.
    pub fn from_file(path: &Path, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let mime_type = guess_mime_type(path, &bytes);
        Self {
            name,
            mime_type: mime_type.to_string(),
            bytes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn id(&self) -> DocumentId {
        document_id_for_bytes(&self.bytes)
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// What the session keeps about the loaded blob for display and export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub name: String,
    pub mime_type: String,
    pub size: usize,
}

impl DocumentInfo {
    pub fn from_blob(blob: &Blob) -> Self {
        Self {
            id: blob.id(),
            name: blob.name().to_string(),
            mime_type: blob.mime_type().to_string(),
            size: blob.len(),
        }
    }
}

pub fn guess_mime_type(path: &Path, bytes: &[u8]) -> &'static str {
    let by_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .and_then(|ext| mime_for_extension(&ext));
    match by_extension {
        Some(mime) => mime,
        None if bytes.starts_with(PDF_MAGIC) => PDF_MIME_TYPE,
        None => OCTET_STREAM_MIME_TYPE,
    }
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "pdf" => PDF_MIME_TYPE,
        "txt" | "text" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "epub" => "application/epub+zip",
        "zip" => "application/zip",
        "json" => "application/json",
        _ => return None,
    };
    Some(mime)
}
