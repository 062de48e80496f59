use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use pdfview_core::{
    Blob, Decryptor, DisplayHandle, DocumentAnalysis, DocumentAnalyzer, ObjectUrlRegistry,
    PageRenderer, RenderImage, RenderRequest, Rotation,
};
use tracing::{debug, instrument, warn};

use crate::compose::{compose_horizontal, invert_pixels, SPREAD_GAP};
use crate::RenderError;

/// pdfium-backed document analysis, decryption and rasterisation. Blobs are
/// reached through the shared handle registry, never copied.
pub struct PdfiumEngine {
    pdfium: Arc<Pdfium>,
    urls: Arc<ObjectUrlRegistry>,
    cache: Mutex<Option<RenderCacheEntry>>,
}

struct RenderCacheEntry {
    handle: DisplayHandle,
    request: RenderRequest,
    image: RenderImage,
}

impl PdfiumEngine {
    pub fn new(urls: Arc<ObjectUrlRegistry>, library_path: Option<&Path>) -> Result<Self> {
        let pdfium = bind_pdfium(library_path)?;
        Ok(Self {
            pdfium: Arc::new(pdfium),
            urls,
            cache: Mutex::new(None),
        })
    }

    fn render_page(
        &self,
        document: &PdfDocument<'_>,
        page_number: usize,
        request: &RenderRequest,
    ) -> Result<RenderImage> {
        let total = usize::try_from(document.pages().len()).unwrap_or_default();
        if page_number == 0 || page_number > total {
            return Err(RenderError::PageOutOfRange {
                page: page_number,
                total,
            }
            .into());
        }
        let page_index: PdfPageIndex = (page_number - 1)
            .try_into()
            .map_err(|_| anyhow!("page {} is out of supported range", page_number))?;
        let page = document
            .pages()
            .get(page_index)
            .with_context(|| format!("page {} out of range", page_number))?;

        let config = PdfRenderConfig::new()
            .scale_page_by_factor(request.scale.max(0.1))
            .rotate(render_rotation(request.rotation), true);
        let bitmap = page
            .render_with_config(&config)
            .with_context(|| format!("failed to render page {}", page_number))?;
        let image = bitmap.as_image().to_rgba8();
        let (width, height) = image.dimensions();

        Ok(RenderImage {
            width,
            height,
            pixels: image.into_raw(),
        })
    }

    fn cached(&self, handle: &DisplayHandle, request: &RenderRequest) -> Option<RenderImage> {
        let cache = self.cache.lock();
        cache
            .as_ref()
            .filter(|entry| &entry.handle == handle && &entry.request == request)
            .map(|entry| entry.image.clone())
    }
}

impl DocumentAnalyzer for PdfiumEngine {
    #[instrument(skip(self, blob), fields(name = blob.name()))]
    fn analyze(&self, blob: &Blob) -> Result<DocumentAnalysis> {
        match self.pdfium.load_pdf_from_byte_slice(blob.bytes(), None) {
            Ok(document) => Ok(DocumentAnalysis {
                page_count: usize::try_from(document.pages().len()).unwrap_or_default(),
                is_encrypted: false,
            }),
            // pages of a locked document cannot be counted until it is opened
            Err(err) if is_password_error(&err) => Ok(DocumentAnalysis {
                page_count: 1,
                is_encrypted: true,
            }),
            Err(err) => Err(err).with_context(|| format!("failed to open {}", blob.name())),
        }
    }
}

impl Decryptor for PdfiumEngine {
    #[instrument(skip(self, blob, password), fields(name = blob.name()))]
    fn decrypt(&self, blob: &Blob, password: &str) -> Result<DocumentAnalysis> {
        match self
            .pdfium
            .load_pdf_from_byte_slice(blob.bytes(), Some(password))
        {
            Ok(document) => Ok(DocumentAnalysis {
                page_count: usize::try_from(document.pages().len()).unwrap_or_default(),
                is_encrypted: false,
            }),
            Err(err) if is_password_error(&err) => Err(anyhow!("incorrect password")),
            Err(err) => Err(err).with_context(|| format!("failed to open {}", blob.name())),
        }
    }
}

impl PageRenderer for PdfiumEngine {
    #[instrument(skip(self, request), fields(pages = ?request.pages))]
    fn render(&self, handle: &DisplayHandle, request: &RenderRequest) -> Result<RenderImage> {
        if let Some(image) = self.cached(handle, request) {
            return Ok(image);
        }

        let blob = self
            .urls
            .resolve(handle)
            .ok_or_else(|| RenderError::UnknownHandle(handle.to_string()))?;
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(blob.bytes(), request.password.as_deref())
            .map_err(|err| {
                if is_password_error(&err) {
                    anyhow::Error::from(RenderError::Locked)
                } else {
                    anyhow!("failed to open {}: {}", blob.name(), err)
                }
            })?;

        let mut pages = Vec::with_capacity(request.pages.len());
        for &page_number in &request.pages {
            pages.push(self.render_page(&document, page_number, request)?);
        }
        let mut image = compose_horizontal(pages, SPREAD_GAP)?;
        if request.dark_mode {
            invert_pixels(&mut image.pixels);
        }
        debug!(width = image.width, height = image.height, "rendered view");

        *self.cache.lock() = Some(RenderCacheEntry {
            handle: handle.clone(),
            request: request.clone(),
            image: image.clone(),
        });
        Ok(image)
    }
}

fn is_password_error(err: &PdfiumError) -> bool {
    matches!(
        err,
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError)
    )
}

fn render_rotation(rotation: Rotation) -> PdfPageRenderRotation {
    match rotation {
        Rotation::Deg0 => PdfPageRenderRotation::None,
        Rotation::Deg90 => PdfPageRenderRotation::Degrees90,
        Rotation::Deg180 => PdfPageRenderRotation::Degrees180,
        Rotation::Deg270 => PdfPageRenderRotation::Degrees270,
    }
}

/// Tries the configured library first, then the working directory, then the
/// system search path.
fn bind_pdfium(library_path: Option<&Path>) -> Result<Pdfium> {
    let mut errors = Vec::new();

    if let Some(path) = library_path {
        let candidate = if path.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(path)
        } else {
            path.to_path_buf()
        };
        match Pdfium::bind_to_library(&candidate) {
            Ok(bindings) => return Ok(Pdfium::new(bindings)),
            Err(err) => {
                warn!("failed to load pdfium from {}: {}", candidate.display(), err);
                errors.push(format!("{}: {}", candidate.display(), err));
            }
        }
    }

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("{}: {}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; ensure it is installed ({})",
                errors.join(", ")
            ))
        }
    }
}
