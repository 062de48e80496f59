pub mod compose;
#[cfg(feature = "pdf")]
mod pdfium;

use thiserror::Error;

pub use compose::{compose_horizontal, invert_pixels, SPREAD_GAP};
#[cfg(feature = "pdf")]
pub use pdfium::PdfiumEngine;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("display handle {0} is not registered")]
    UnknownHandle(String),
    #[error("document is password protected")]
    Locked,
    #[error("page {page} is outside 1..={total}")]
    PageOutOfRange { page: usize, total: usize },
    #[error("render request names no pages")]
    NothingToRender,
    #[error("rendered bitmap {width}x{height} has the wrong buffer size")]
    MalformedImage { width: u32, height: u32 },
}
