use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use pdfview_core::{Blob, FileSource};
use tracing::debug;

/// Reads picked or dropped files from the local filesystem.
pub struct DiskFileSource;

#[async_trait]
impl FileSource for DiskFileSource {
    async fn fetch(&self, path: &Path) -> Result<Blob> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {:?}", path))?;
        let blob = Blob::from_file(path, bytes);
        debug!(?path, mime = blob.mime_type(), len = blob.len(), "file fetched");
        Ok(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfview_core::PDF_MIME_TYPE;
    use tempfile::tempdir;

    #[tokio::test]
    async fn fetch_tags_pdf_by_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("paper.pdf");
        std::fs::write(&path, b"%PDF-1.7\n").unwrap();

        let blob = DiskFileSource.fetch(&path).await.unwrap();
        assert_eq!(blob.name(), "paper.pdf");
        assert_eq!(blob.mime_type(), PDF_MIME_TYPE);
        assert_eq!(&blob.bytes()[..], b"%PDF-1.7\n");
    }

    #[tokio::test]
    async fn fetch_tags_other_files_as_such() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"plain").unwrap();

        let blob = DiskFileSource.fetch(&path).await.unwrap();
        assert_eq!(blob.mime_type(), "text/plain");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(DiskFileSource.fetch(&dir.path().join("gone.pdf")).await.is_err());
    }
}
