use std::path::Path;

use anyhow::Result;

use crate::blob::Blob;
use crate::handle::DisplayHandle;
use crate::session::RenderRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentAnalysis {
    pub page_count: usize,
    pub is_encrypted: bool,
}

pub trait DocumentAnalyzer: Send + Sync {
    fn analyze(&self, blob: &Blob) -> Result<DocumentAnalysis>;
}

pub trait Decryptor: Send + Sync {
    /// Opens the blob with `password`; the returned analysis describes the
    /// unlocked document.
    fn decrypt(&self, blob: &Blob, password: &str) -> Result<DocumentAnalysis>;
}

/// External fullscreen mode. The session never assumes it is the only party
/// flipping it; see `DocumentSession::fullscreen_changed`.
pub trait FullscreenControl: Send + Sync {
    fn request(&self, enter: bool) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

pub trait PageRenderer: Send + Sync {
    fn render(&self, handle: &DisplayHandle, request: &RenderRequest) -> Result<RenderImage>;
}

#[async_trait::async_trait]
pub trait FileSource: Send + Sync {
    async fn fetch(&self, path: &Path) -> Result<Blob>;
}

/// Fullscreen control for front ends without such a mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFullscreen;

impl FullscreenControl for NoFullscreen {
    fn request(&self, _enter: bool) -> Result<()> {
        Ok(())
    }
}
