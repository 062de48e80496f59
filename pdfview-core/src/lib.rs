//! Viewing-session state for the pdfview front ends.
//!
//! [`DocumentSession`] owns every piece of mutable viewer state and exposes
//! the operations UI events map onto. PDF analysis, decryption, fullscreen
//! mode and pixel rendering stay behind the traits in [`backend`].

pub mod backend;
pub mod blob;
pub mod config;
pub mod error;
pub mod export;
pub mod handle;
pub mod session;

use std::path::PathBuf;

pub use backend::{
    Decryptor, DocumentAnalysis, DocumentAnalyzer, FileSource, FullscreenControl, NoFullscreen,
    PageRenderer, RenderImage,
};
pub use blob::{Blob, DocumentId, DocumentInfo, PDF_MIME_TYPE};
pub use config::ViewerConfig;
pub use error::{ConfigError, SessionError};
pub use handle::{DisplayHandle, ObjectUrlRegistry};
pub use session::{
    Annotation, Bookmark, Collaborators, DocumentSession, PageLayout, RenderRequest, Rotation,
    SessionState,
};

#[derive(Debug, Clone)]
pub enum Command {
    Open { blob: Blob },
    DragEnter,
    DragLeave,
    Drop { blob: Blob },
    NextPage { count: usize },
    PrevPage { count: usize },
    GotoPage { page: usize },
    FirstPage,
    LastPage,
    ZoomBy { delta: f32 },
    ZoomIn,
    ZoomOut,
    ResetZoom,
    Rotate,
    AddBookmark,
    AddNote { text: String },
    AddAnnotation { text: String },
    Search { query: String },
    ToggleDarkMode,
    ToggleTextLayer,
    ToggleFullscreen,
    FullscreenChanged { active: bool },
    CyclePageLayout,
    Decrypt { password: String },
    Download { dir: PathBuf },
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    DocumentLoaded(DocumentId),
    DocumentRejected { name: String },
    HandleRevoked(DisplayHandle),
    DocumentReset,
    Decrypted(DocumentId),
    FullscreenChanged(bool),
    RedrawNeeded(DocumentId),
}
