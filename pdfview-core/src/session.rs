use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::backend::{Decryptor, DocumentAnalyzer, FullscreenControl};
use crate::blob::{Blob, DocumentInfo};
use crate::config::{ViewerConfig, DEFAULT_SCALE};
use crate::error::SessionError;
use crate::export::write_blob;
use crate::handle::{DisplayHandle, ObjectUrlRegistry};
use crate::{Command, SessionEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Quarter turn clockwise.
    pub fn next(self) -> Self {
        match self {
            Rotation::Deg0 => Rotation::Deg90,
            Rotation::Deg90 => Rotation::Deg180,
            Rotation::Deg180 => Rotation::Deg270,
            Rotation::Deg270 => Rotation::Deg0,
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(format!("unsupported rotation {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageLayout {
    #[default]
    Single,
    Double,
}

impl PageLayout {
    pub fn next(self) -> Self {
        match self {
            PageLayout::Single => PageLayout::Double,
            PageLayout::Double => PageLayout::Single,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub page: usize,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub page: usize,
    pub text: String,
}

/// Everything the viewer shows about one viewing session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub document: Option<DocumentInfo>,
    pub scale: f32,
    pub rotation: Rotation,
    pub current_page: usize,
    pub total_pages: usize,
    pub search_text: String,
    pub is_dragging: bool,
    pub dark_mode: bool,
    pub bookmarks: Vec<Bookmark>,
    pub notes_by_page: BTreeMap<usize, Vec<String>>,
    pub annotations: Vec<Annotation>,
    pub text_layer_enabled: bool,
    pub page_layout: PageLayout,
    pub is_encrypted: bool,
    #[serde(skip_serializing)]
    pub password: String,
    pub is_fullscreen: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            document: None,
            scale: DEFAULT_SCALE,
            rotation: Rotation::Deg0,
            current_page: 1,
            total_pages: 1,
            search_text: String::new(),
            is_dragging: false,
            dark_mode: false,
            bookmarks: Vec::new(),
            notes_by_page: BTreeMap::new(),
            annotations: Vec::new(),
            text_layer_enabled: true,
            page_layout: PageLayout::Single,
            is_encrypted: false,
            password: String::new(),
            is_fullscreen: false,
        }
    }
}

impl SessionState {
    /// Fields tied to document identity.
    fn clear_document_scope(&mut self) {
        self.scale = DEFAULT_SCALE;
        self.rotation = Rotation::Deg0;
        self.current_page = 1;
        self.total_pages = 1;
        self.bookmarks.clear();
        self.notes_by_page.clear();
        self.annotations.clear();
        self.is_encrypted = false;
        self.password.clear();
    }

    pub fn notes_for_page(&self, page: usize) -> &[String] {
        self.notes_by_page
            .get(&page)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn annotations_for_page(&self, page: usize) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter().filter(move |a| a.page == page)
    }
}

/// What a renderer needs to paint the current view.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    /// 1-based page numbers, left to right.
    pub pages: Vec<usize>,
    pub scale: f32,
    pub rotation: Rotation,
    pub dark_mode: bool,
    pub password: Option<String>,
}

pub struct Collaborators {
    pub analyzer: Arc<dyn DocumentAnalyzer>,
    pub decryptor: Arc<dyn Decryptor>,
    pub fullscreen: Arc<dyn FullscreenControl>,
}

pub struct DocumentSession {
    state: SessionState,
    blob: Option<Blob>,
    handle: Option<DisplayHandle>,
    config: ViewerConfig,
    collaborators: Collaborators,
    urls: Arc<ObjectUrlRegistry>,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl DocumentSession {
    pub fn new(
        config: ViewerConfig,
        collaborators: Collaborators,
        urls: Arc<ObjectUrlRegistry>,
    ) -> Self {
        let state = SessionState {
            dark_mode: config.dark_mode,
            ..SessionState::default()
        };
        Self {
            state,
            blob: None,
            handle: None,
            config,
            collaborators,
            urls,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn display_handle(&self) -> Option<&DisplayHandle> {
        self.handle.as_ref()
    }

    pub fn events(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn state_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.state)
    }

    fn emit(&self, event: SessionEvent) {
        self.events.lock().push(event);
    }

    fn redraw(&self) {
        if let Some(doc) = &self.state.document {
            self.emit(SessionEvent::RedrawNeeded(doc.id));
        }
    }

    fn require_document(&self) -> Result<&Blob, SessionError> {
        self.blob.as_ref().ok_or(SessionError::NoDocument)
    }

    fn release_handle(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.urls.revoke(&handle);
            self.emit(SessionEvent::HandleRevoked(handle));
        }
    }

    #[instrument(skip(self, blob), fields(name = blob.name(), mime = blob.mime_type()))]
    pub fn load_document(&mut self, blob: Blob) -> Result<(), SessionError> {
        if blob.mime_type() != self.config.accepted_mime_type {
            warn!("rejected file with unsupported type");
            self.emit(SessionEvent::DocumentRejected {
                name: blob.name().to_string(),
            });
            return Err(SessionError::RejectedMimeType {
                name: blob.name().to_string(),
                found: blob.mime_type().to_string(),
                expected: self.config.accepted_mime_type.clone(),
            });
        }

        let analysis = self
            .collaborators
            .analyzer
            .analyze(&blob)
            .map_err(|err| {
                warn!(?err, "document analysis failed");
                SessionError::AnalysisFailed {
                    name: blob.name().to_string(),
                    reason: format!("{err:#}"),
                }
            })?;

        let handle = self.urls.create(&blob);
        self.release_handle();

        let info = DocumentInfo::from_blob(&blob);
        let id = info.id;
        self.state.clear_document_scope();
        self.state.document = Some(info);
        self.state.total_pages = analysis.page_count.max(1);
        self.state.is_encrypted = analysis.is_encrypted;
        self.blob = Some(blob);
        self.handle = Some(handle);

        debug!(
            pages = self.state.total_pages,
            encrypted = self.state.is_encrypted,
            "document loaded"
        );
        self.emit(SessionEvent::DocumentLoaded(id));
        self.redraw();
        Ok(())
    }

    pub fn drag_enter(&mut self) {
        self.state.is_dragging = true;
    }

    pub fn drag_leave(&mut self) {
        self.state.is_dragging = false;
    }

    /// Ends the drag gesture and loads the dropped blob. The drag flag is
    /// cleared even when the blob is rejected.
    pub fn drop_file(&mut self, blob: Blob) -> Result<(), SessionError> {
        self.state.is_dragging = false;
        self.load_document(blob)
    }

    pub fn set_zoom(&mut self, delta: f32) -> Result<(), SessionError> {
        self.require_document()?;
        if !delta.is_finite() {
            return Ok(());
        }
        let next = quantize_scale(self.state.scale + delta)
            .clamp(self.config.zoom_min, self.config.zoom_max);
        if (next - self.state.scale).abs() > f32::EPSILON {
            self.state.scale = next;
            self.redraw();
        }
        Ok(())
    }

    pub fn zoom_in(&mut self) -> Result<(), SessionError> {
        self.set_zoom(self.config.zoom_step)
    }

    pub fn zoom_out(&mut self) -> Result<(), SessionError> {
        self.set_zoom(-self.config.zoom_step)
    }

    pub fn reset_zoom(&mut self) -> Result<(), SessionError> {
        self.require_document()?;
        if self.state.scale != DEFAULT_SCALE {
            self.state.scale = DEFAULT_SCALE;
            self.redraw();
        }
        Ok(())
    }

    pub fn rotate(&mut self) -> Result<(), SessionError> {
        self.require_document()?;
        self.state.rotation = self.state.rotation.next();
        self.redraw();
        Ok(())
    }

    pub fn goto_page(&mut self, page: usize) -> Result<(), SessionError> {
        self.require_document()?;
        if page == 0 || page > self.state.total_pages {
            return Err(SessionError::PageOutOfRange {
                requested: page,
                total: self.state.total_pages,
            });
        }
        if page != self.state.current_page {
            self.state.current_page = page;
            self.redraw();
        }
        Ok(())
    }

    pub fn next_page(&mut self) -> Result<(), SessionError> {
        self.goto_page(self.state.current_page.saturating_add(1))
    }

    pub fn previous_page(&mut self) -> Result<(), SessionError> {
        self.goto_page(self.state.current_page.saturating_sub(1))
    }

    pub fn first_page(&mut self) -> Result<(), SessionError> {
        self.goto_page(1)
    }

    pub fn last_page(&mut self) -> Result<(), SessionError> {
        self.goto_page(self.state.total_pages)
    }

    pub fn add_bookmark(&mut self) -> Result<(), SessionError> {
        self.require_document()?;
        let page = self.state.current_page;
        self.state.bookmarks.push(Bookmark {
            page,
            label: format!("Page {page}"),
        });
        debug!(page, "bookmark added");
        Ok(())
    }

    pub fn add_note(&mut self, text: &str) -> Result<(), SessionError> {
        self.require_document()?;
        let text = non_blank(text, "note")?;
        self.state
            .notes_by_page
            .entry(self.state.current_page)
            .or_default()
            .push(text);
        Ok(())
    }

    pub fn add_annotation(&mut self, text: &str) -> Result<(), SessionError> {
        self.require_document()?;
        let text = non_blank(text, "annotation")?;
        self.state.annotations.push(Annotation {
            page: self.state.current_page,
            text,
        });
        Ok(())
    }

    pub fn set_search_text(&mut self, query: &str) {
        if self.state.search_text != query {
            debug!(query, "search text updated");
            self.state.search_text = query.to_string();
        }
    }

    pub fn toggle_dark_mode(&mut self) {
        self.state.dark_mode = !self.state.dark_mode;
        self.redraw();
    }

    pub fn toggle_text_layer(&mut self) {
        self.state.text_layer_enabled = !self.state.text_layer_enabled;
        self.redraw();
    }

    pub fn cycle_page_layout(&mut self) {
        self.state.page_layout = self.state.page_layout.next();
        self.redraw();
    }

    pub fn toggle_fullscreen(&mut self) -> Result<(), SessionError> {
        let target = !self.state.is_fullscreen;
        self.collaborators
            .fullscreen
            .request(target)
            .map_err(|err| {
                warn!(?err, target, "fullscreen request failed");
                SessionError::Fullscreen(format!("{err:#}"))
            })?;
        self.fullscreen_changed(target);
        Ok(())
    }

    /// Mirrors a fullscreen change, whoever triggered it.
    pub fn fullscreen_changed(&mut self, active: bool) {
        if self.state.is_fullscreen != active {
            self.state.is_fullscreen = active;
            self.emit(SessionEvent::FullscreenChanged(active));
            self.redraw();
        }
    }

    #[instrument(skip(self, password))]
    pub fn attempt_decrypt(&mut self, password: &str) -> Result<(), SessionError> {
        let blob = self.require_document()?;
        if !self.state.is_encrypted {
            return Err(SessionError::NotEncrypted);
        }
        let analysis = self
            .collaborators
            .decryptor
            .decrypt(blob, password)
            .map_err(|err| {
                warn!(?err, "decryption failed");
                SessionError::DecryptFailed(format!("{err:#}"))
            })?;

        self.state.is_encrypted = false;
        self.state.password = password.to_string();
        self.state.total_pages = analysis.page_count.max(1);
        self.state.current_page = self.state.current_page.min(self.state.total_pages);
        if let Some(doc) = &self.state.document {
            self.emit(SessionEvent::Decrypted(doc.id));
        }
        self.redraw();
        Ok(())
    }

    /// Drops the document and every document-scoped field. Dark mode and the
    /// transient drag/fullscreen flags are kept.
    pub fn reset(&mut self) {
        self.release_handle();
        self.blob = None;
        self.state = SessionState {
            dark_mode: self.state.dark_mode,
            is_dragging: self.state.is_dragging,
            is_fullscreen: self.state.is_fullscreen,
            ..SessionState::default()
        };
        debug!("session reset");
        self.emit(SessionEvent::DocumentReset);
    }

    pub fn download_to(&self, dir: &Path) -> Result<PathBuf, SessionError> {
        let blob = self.require_document()?;
        write_blob(dir, blob).map_err(|err| SessionError::ExportFailed {
            path: dir.to_path_buf(),
            reason: format!("{err:#}"),
        })
    }

    /// `None` while there is nothing displayable: no document, or one that is
    /// still locked.
    pub fn render_request(&self) -> Option<(DisplayHandle, RenderRequest)> {
        let handle = self.handle.clone()?;
        if self.state.is_encrypted {
            return None;
        }
        let current = self.state.current_page;
        let mut pages = vec![current];
        if self.state.page_layout == PageLayout::Double && current < self.state.total_pages {
            pages.push(current + 1);
        }
        let password = Some(self.state.password.clone()).filter(|p| !p.is_empty());
        Some((
            handle,
            RenderRequest {
                pages,
                scale: self.state.scale,
                rotation: self.state.rotation,
                dark_mode: self.state.dark_mode,
                password,
            },
        ))
    }

    pub fn apply(&mut self, command: Command) -> Result<(), SessionError> {
        match command {
            Command::Open { blob } => self.load_document(blob)?,
            Command::DragEnter => self.drag_enter(),
            Command::DragLeave => self.drag_leave(),
            Command::Drop { blob } => self.drop_file(blob)?,
            Command::NextPage { count } => {
                let target = self.state.current_page.saturating_add(count.max(1));
                self.goto_page(target)?
            }
            Command::PrevPage { count } => {
                let target = self.state.current_page.saturating_sub(count.max(1));
                self.goto_page(target)?
            }
            Command::GotoPage { page } => self.goto_page(page)?,
            Command::FirstPage => self.first_page()?,
            Command::LastPage => self.last_page()?,
            Command::ZoomBy { delta } => self.set_zoom(delta)?,
            Command::ZoomIn => self.zoom_in()?,
            Command::ZoomOut => self.zoom_out()?,
            Command::ResetZoom => self.reset_zoom()?,
            Command::Rotate => self.rotate()?,
            Command::AddBookmark => self.add_bookmark()?,
            Command::AddNote { text } => self.add_note(&text)?,
            Command::AddAnnotation { text } => self.add_annotation(&text)?,
            Command::Search { query } => self.set_search_text(&query),
            Command::ToggleDarkMode => self.toggle_dark_mode(),
            Command::ToggleTextLayer => self.toggle_text_layer(),
            Command::ToggleFullscreen => self.toggle_fullscreen()?,
            Command::FullscreenChanged { active } => self.fullscreen_changed(active),
            Command::CyclePageLayout => self.cycle_page_layout(),
            Command::Decrypt { password } => self.attempt_decrypt(&password)?,
            Command::Download { dir } => {
                let path = self.download_to(&dir)?;
                debug!(?path, "document exported");
            }
            Command::Reset => self.reset(),
        }
        Ok(())
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.urls.revoke(&handle);
        }
    }
}

fn quantize_scale(scale: f32) -> f32 {
    (scale * 1000.0).round() / 1000.0
}

fn non_blank(text: &str, kind: &'static str) -> Result<String, SessionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(SessionError::EmptyText(kind))
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DocumentAnalysis;
    use crate::blob::PDF_MIME_TYPE;
    use anyhow::{anyhow, Result};
    use proptest::prelude::*;
    use tempfile::tempdir;

    struct FakeAnalyzer {
        page_count: usize,
        is_encrypted: bool,
    }

    impl DocumentAnalyzer for FakeAnalyzer {
        fn analyze(&self, _blob: &Blob) -> Result<DocumentAnalysis> {
            Ok(DocumentAnalysis {
                page_count: self.page_count,
                is_encrypted: self.is_encrypted,
            })
        }
    }

    struct BrokenAnalyzer;

    impl DocumentAnalyzer for BrokenAnalyzer {
        fn analyze(&self, _blob: &Blob) -> Result<DocumentAnalysis> {
            Err(anyhow!("trailer not found"))
        }
    }

    struct FakeDecryptor {
        password: &'static str,
        page_count: usize,
    }

    impl Decryptor for FakeDecryptor {
        fn decrypt(&self, _blob: &Blob, password: &str) -> Result<DocumentAnalysis> {
            if password == self.password {
                Ok(DocumentAnalysis {
                    page_count: self.page_count,
                    is_encrypted: false,
                })
            } else {
                Err(anyhow!("incorrect password"))
            }
        }
    }

    #[derive(Default)]
    struct RecordingFullscreen {
        requests: Mutex<Vec<bool>>,
        refuse: bool,
    }

    impl FullscreenControl for RecordingFullscreen {
        fn request(&self, enter: bool) -> Result<()> {
            if self.refuse {
                return Err(anyhow!("fullscreen not permitted"));
            }
            self.requests.lock().push(enter);
            Ok(())
        }
    }

    struct Harness {
        session: DocumentSession,
        urls: Arc<ObjectUrlRegistry>,
        fullscreen: Arc<RecordingFullscreen>,
    }

    fn harness_with(analyzer: Arc<dyn DocumentAnalyzer>, fullscreen: RecordingFullscreen) -> Harness {
        let urls = Arc::new(ObjectUrlRegistry::new());
        let fullscreen = Arc::new(fullscreen);
        let collaborators = Collaborators {
            analyzer,
            decryptor: Arc::new(FakeDecryptor {
                password: "hunter2",
                page_count: 12,
            }),
            fullscreen: fullscreen.clone(),
        };
        let session = DocumentSession::new(ViewerConfig::default(), collaborators, urls.clone());
        Harness {
            session,
            urls,
            fullscreen,
        }
    }

    fn harness(page_count: usize) -> Harness {
        harness_with(
            Arc::new(FakeAnalyzer {
                page_count,
                is_encrypted: false,
            }),
            RecordingFullscreen::default(),
        )
    }

    fn encrypted_harness() -> Harness {
        harness_with(
            Arc::new(FakeAnalyzer {
                page_count: 1,
                is_encrypted: true,
            }),
            RecordingFullscreen::default(),
        )
    }

    fn pdf(name: &str) -> Blob {
        Blob::new(name, PDF_MIME_TYPE, format!("%PDF-1.7 {name}").into_bytes())
    }

    fn assert_document_scope_is_clear(state: &SessionState) {
        assert!(state.document.is_none());
        assert!(state.bookmarks.is_empty());
        assert!(state.notes_by_page.is_empty());
        assert!(state.annotations.is_empty());
        assert_eq!(state.current_page, 1);
        assert_eq!(state.scale, 1.0);
        assert_eq!(state.rotation, Rotation::Deg0);
    }

    #[test]
    fn fresh_session_has_defaults() {
        let h = harness(5);
        let state = h.session.state();
        assert_document_scope_is_clear(state);
        assert_eq!(state.total_pages, 1);
        assert!(state.text_layer_enabled);
        assert_eq!(state.page_layout, PageLayout::Single);
        assert!(!state.dark_mode);
        assert!(h.session.display_handle().is_none());
        assert!(h.session.render_request().is_none());
    }

    #[test]
    fn next_page_saturates_at_last_page() {
        let mut h = harness(5);
        h.session.load_document(pdf("five.pdf")).unwrap();
        for _ in 0..4 {
            h.session.next_page().unwrap();
        }
        assert_eq!(h.session.state().current_page, 5);

        let err = h.session.next_page().unwrap_err();
        assert_eq!(
            err,
            SessionError::PageOutOfRange {
                requested: 6,
                total: 5
            }
        );
        assert_eq!(h.session.state().current_page, 5);
    }

    #[test]
    fn previous_page_stops_at_first_page() {
        let mut h = harness(5);
        h.session.load_document(pdf("five.pdf")).unwrap();
        assert!(h.session.previous_page().is_err());
        assert_eq!(h.session.state().current_page, 1);
        h.session.last_page().unwrap();
        h.session.previous_page().unwrap();
        assert_eq!(h.session.state().current_page, 4);
    }

    #[test]
    fn zooming_in_nineteen_times_clamps_to_max() {
        let mut h = harness(5);
        h.session.load_document(pdf("a.pdf")).unwrap();
        for _ in 0..19 {
            h.session.set_zoom(0.1).unwrap();
        }
        assert_eq!(h.session.state().scale, 2.0);
    }

    #[test]
    fn zooming_out_clamps_to_min() {
        let mut h = harness(5);
        h.session.load_document(pdf("a.pdf")).unwrap();
        for _ in 0..10 {
            h.session.zoom_out().unwrap();
        }
        assert_eq!(h.session.state().scale, 0.5);
        h.session.zoom_in().unwrap();
        assert_eq!(h.session.state().scale, 0.6);
        h.session.reset_zoom().unwrap();
        assert_eq!(h.session.state().scale, 1.0);
    }

    #[test]
    fn non_finite_zoom_delta_is_ignored() {
        let mut h = harness(5);
        h.session.load_document(pdf("a.pdf")).unwrap();
        h.session.set_zoom(f32::NAN).unwrap();
        h.session.set_zoom(f32::INFINITY).unwrap();
        assert_eq!(h.session.state().scale, 1.0);
    }

    #[test]
    fn view_changes_need_a_document() {
        let mut h = harness(5);
        assert_eq!(h.session.set_zoom(0.1), Err(SessionError::NoDocument));
        assert_eq!(h.session.rotate(), Err(SessionError::NoDocument));
        assert_eq!(h.session.goto_page(1), Err(SessionError::NoDocument));
        assert_eq!(h.session.add_bookmark(), Err(SessionError::NoDocument));
        assert_eq!(h.session.add_note("x"), Err(SessionError::NoDocument));
        assert_eq!(h.session.add_annotation("x"), Err(SessionError::NoDocument));
        assert_document_scope_is_clear(h.session.state());
    }

    #[test]
    fn four_rotations_return_to_start() {
        let mut h = harness(5);
        h.session.load_document(pdf("a.pdf")).unwrap();
        let seen: Vec<u16> = (0..4)
            .map(|_| {
                h.session.rotate().unwrap();
                h.session.state().rotation.degrees()
            })
            .collect();
        assert_eq!(seen, vec![90, 180, 270, 0]);
    }

    #[test]
    fn out_of_range_goto_is_reported_and_ignored() {
        let mut h = harness(5);
        h.session.load_document(pdf("a.pdf")).unwrap();
        h.session.goto_page(3).unwrap();
        assert!(matches!(
            h.session.goto_page(0),
            Err(SessionError::PageOutOfRange { requested: 0, .. })
        ));
        assert!(h.session.goto_page(6).is_err());
        assert_eq!(h.session.state().current_page, 3);
    }

    #[test]
    fn bookmarking_same_page_twice_keeps_both() {
        let mut h = harness(5);
        h.session.load_document(pdf("a.pdf")).unwrap();
        h.session.goto_page(3).unwrap();
        h.session.add_bookmark().unwrap();
        h.session.add_bookmark().unwrap();

        let bookmarks = &h.session.state().bookmarks;
        assert_eq!(bookmarks.len(), 2);
        assert!(bookmarks.iter().all(|b| b.page == 3 && b.label == "Page 3"));
    }

    #[test]
    fn wrong_mime_type_leaves_session_untouched() {
        let mut h = harness(5);
        h.session.load_document(pdf("a.pdf")).unwrap();
        h.session.goto_page(2).unwrap();
        let before = h.session.state().clone();
        let handle_before = h.session.display_handle().cloned();

        let err = h
            .session
            .load_document(Blob::new("photo.png", "image/png", &b"\x89PNG"[..]))
            .unwrap_err();

        assert!(matches!(err, SessionError::RejectedMimeType { .. }));
        assert_eq!(h.session.state(), &before);
        assert_eq!(h.session.display_handle().cloned(), handle_before);
        assert_eq!(h.urls.live_handles(), 1);
        assert!(h
            .session
            .events()
            .lock()
            .iter()
            .any(|e| matches!(e, SessionEvent::DocumentRejected { name } if name == "photo.png")));
    }

    #[test]
    fn failed_analysis_leaves_session_untouched() {
        let mut h = harness_with(Arc::new(BrokenAnalyzer), RecordingFullscreen::default());
        let err = h.session.load_document(pdf("broken.pdf")).unwrap_err();
        assert!(matches!(err, SessionError::AnalysisFailed { .. }));
        assert_document_scope_is_clear(h.session.state());
        assert_eq!(h.urls.live_handles(), 0);
    }

    #[test]
    fn loading_resets_document_scope_but_keeps_preferences() {
        let mut h = harness(5);
        h.session.load_document(pdf("a.pdf")).unwrap();
        h.session.goto_page(4).unwrap();
        h.session.zoom_in().unwrap();
        h.session.rotate().unwrap();
        h.session.add_bookmark().unwrap();
        h.session.add_note("check figure").unwrap();
        h.session.add_annotation("typo").unwrap();
        h.session.toggle_dark_mode();
        h.session.set_search_text("lemma");

        h.session.load_document(pdf("b.pdf")).unwrap();
        let state = h.session.state();
        assert_eq!(state.document.as_ref().unwrap().name, "b.pdf");
        assert_eq!(state.current_page, 1);
        assert_eq!(state.scale, 1.0);
        assert_eq!(state.rotation, Rotation::Deg0);
        assert!(state.bookmarks.is_empty());
        assert!(state.notes_by_page.is_empty());
        assert!(state.annotations.is_empty());
        assert!(state.dark_mode);
        assert_eq!(state.search_text, "lemma");
    }

    #[test]
    fn reset_then_load_matches_fresh_load_except_dark_mode() {
        let mut fresh = harness(5);
        fresh.session.load_document(pdf("a.pdf")).unwrap();

        let mut used = harness(5);
        used.session.load_document(pdf("other.pdf")).unwrap();
        used.session.goto_page(5).unwrap();
        used.session.add_bookmark().unwrap();
        used.session.toggle_text_layer();
        used.session.cycle_page_layout();
        used.session.set_search_text("query");
        used.session.toggle_dark_mode();
        used.session.reset();
        assert_document_scope_is_clear(used.session.state());
        assert!(used.session.state().search_text.is_empty());
        used.session.load_document(pdf("a.pdf")).unwrap();

        let mut expected = fresh.session.state().clone();
        expected.dark_mode = true;
        assert_eq!(used.session.state(), &expected);
    }

    #[test]
    fn superseded_and_reset_handles_are_revoked() {
        let mut h = harness(5);
        h.session.load_document(pdf("a.pdf")).unwrap();
        let first = h.session.display_handle().cloned().unwrap();

        h.session.load_document(pdf("b.pdf")).unwrap();
        let second = h.session.display_handle().cloned().unwrap();
        assert_ne!(first, second);
        assert!(h.urls.resolve(&first).is_none());
        assert_eq!(h.urls.resolve(&second).unwrap().name(), "b.pdf");
        assert_eq!(h.urls.live_handles(), 1);

        h.session.reset();
        assert!(h.session.display_handle().is_none());
        assert_eq!(h.urls.live_handles(), 0);

        let revoked: Vec<_> = h
            .session
            .events()
            .lock()
            .iter()
            .filter_map(|e| match e {
                SessionEvent::HandleRevoked(handle) => Some(handle.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(revoked, vec![first, second]);
    }

    #[test]
    fn dropping_the_session_revokes_its_handle() {
        let mut h = harness(5);
        h.session.load_document(pdf("a.pdf")).unwrap();
        let urls = h.urls.clone();
        drop(h);
        assert_eq!(urls.live_handles(), 0);
    }

    #[test]
    fn notes_are_grouped_by_page_and_need_text() {
        let mut h = harness(5);
        h.session.load_document(pdf("a.pdf")).unwrap();
        h.session.add_note("first").unwrap();
        h.session.add_note("  second  ").unwrap();
        h.session.goto_page(2).unwrap();
        h.session.add_note("elsewhere").unwrap();
        assert_eq!(h.session.add_note("   "), Err(SessionError::EmptyText("note")));

        let state = h.session.state();
        assert_eq!(state.notes_for_page(1), ["first", "second"]);
        assert_eq!(state.notes_for_page(2), ["elsewhere"]);
        assert!(state.notes_for_page(3).is_empty());
    }

    #[test]
    fn annotations_record_current_page() {
        let mut h = harness(5);
        h.session.load_document(pdf("a.pdf")).unwrap();
        h.session.goto_page(4).unwrap();
        h.session.add_annotation("see appendix").unwrap();
        assert_eq!(
            h.session.add_annotation(""),
            Err(SessionError::EmptyText("annotation"))
        );

        let on_four: Vec<_> = h.session.state().annotations_for_page(4).collect();
        assert_eq!(
            on_four,
            vec![&Annotation {
                page: 4,
                text: "see appendix".to_string()
            }]
        );
    }

    #[test]
    fn decrypt_with_right_password_unlocks() {
        let mut h = encrypted_harness();
        h.session.load_document(pdf("locked.pdf")).unwrap();
        assert!(h.session.state().is_encrypted);
        assert!(h.session.render_request().is_none());

        h.session.attempt_decrypt("hunter2").unwrap();
        let state = h.session.state();
        assert!(!state.is_encrypted);
        assert_eq!(state.total_pages, 12);
        let (_, request) = h.session.render_request().unwrap();
        assert_eq!(request.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn decrypt_failure_reports_and_keeps_state() {
        let mut h = encrypted_harness();
        h.session.load_document(pdf("locked.pdf")).unwrap();
        let before = h.session.state().clone();

        let err = h.session.attempt_decrypt("wrong").unwrap_err();
        assert!(matches!(err, SessionError::DecryptFailed(ref reason) if reason.contains("incorrect")));
        assert_eq!(h.session.state(), &before);
    }

    #[test]
    fn decrypt_requires_encrypted_document() {
        let mut h = harness(3);
        assert_eq!(h.session.attempt_decrypt("x"), Err(SessionError::NoDocument));
        h.session.load_document(pdf("open.pdf")).unwrap();
        assert_eq!(h.session.attempt_decrypt("x"), Err(SessionError::NotEncrypted));
    }

    #[test]
    fn fullscreen_follows_requests_and_external_exit() {
        let mut h = harness(3);
        h.session.toggle_fullscreen().unwrap();
        assert!(h.session.state().is_fullscreen);

        h.session.fullscreen_changed(false);
        assert!(!h.session.state().is_fullscreen);

        h.session.toggle_fullscreen().unwrap();
        assert!(h.session.state().is_fullscreen);
        assert_eq!(*h.fullscreen.requests.lock(), vec![true, true]);
    }

    #[test]
    fn refused_fullscreen_request_keeps_flag() {
        let mut h = harness_with(
            Arc::new(FakeAnalyzer {
                page_count: 1,
                is_encrypted: false,
            }),
            RecordingFullscreen {
                refuse: true,
                ..RecordingFullscreen::default()
            },
        );
        assert!(matches!(
            h.session.toggle_fullscreen(),
            Err(SessionError::Fullscreen(_))
        ));
        assert!(!h.session.state().is_fullscreen);
    }

    #[test]
    fn transient_flags_survive_reset() {
        let mut h = harness(3);
        h.session.toggle_fullscreen().unwrap();
        h.session.drag_enter();
        h.session.toggle_dark_mode();
        h.session.reset();
        let state = h.session.state();
        assert!(state.is_fullscreen);
        assert!(state.is_dragging);
        assert!(state.dark_mode);
    }

    #[test]
    fn drop_clears_drag_flag_even_when_rejected() {
        let mut h = harness(3);
        h.session.drag_enter();
        assert!(h.session.state().is_dragging);
        assert!(h
            .session
            .drop_file(Blob::new("a.txt", "text/plain", &b"hi"[..]))
            .is_err());
        assert!(!h.session.state().is_dragging);

        h.session.drag_enter();
        h.session.drop_file(pdf("a.pdf")).unwrap();
        assert!(!h.session.state().is_dragging);
        assert!(h.session.state().document.is_some());
    }

    #[test]
    fn double_layout_requests_facing_pages() {
        let mut h = harness(3);
        h.session.load_document(pdf("a.pdf")).unwrap();
        h.session.cycle_page_layout();
        h.session.rotate().unwrap();

        let (handle, request) = h.session.render_request().unwrap();
        assert_eq!(Some(&handle), h.session.display_handle());
        assert_eq!(request.pages, vec![1, 2]);
        assert_eq!(request.rotation, Rotation::Deg90);
        assert_eq!(request.password, None);

        h.session.last_page().unwrap();
        let (_, request) = h.session.render_request().unwrap();
        assert_eq!(request.pages, vec![3]);
    }

    #[test]
    fn download_writes_original_bytes() {
        let mut h = harness(3);
        let dir = tempdir().unwrap();
        assert_eq!(h.session.download_to(dir.path()), Err(SessionError::NoDocument));

        let blob = pdf("paper.pdf");
        let bytes = blob.bytes().clone();
        h.session.load_document(blob).unwrap();
        let path = h.session.download_to(dir.path()).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), bytes.to_vec());
    }

    #[test]
    fn apply_dispatches_commands() {
        let mut h = harness(10);
        h.session
            .apply(Command::Open {
                blob: pdf("a.pdf"),
            })
            .unwrap();
        h.session.apply(Command::NextPage { count: 3 }).unwrap();
        assert_eq!(h.session.state().current_page, 4);
        h.session.apply(Command::PrevPage { count: 2 }).unwrap();
        assert_eq!(h.session.state().current_page, 2);
        h.session.apply(Command::ZoomBy { delta: 0.25 }).unwrap();
        assert_eq!(h.session.state().scale, 1.25);
        h.session.apply(Command::ZoomBy { delta: 5.0 }).unwrap();
        assert_eq!(h.session.state().scale, 2.0);
        h.session.apply(Command::LastPage).unwrap();
        assert_eq!(h.session.state().current_page, 10);
        assert!(h.session.apply(Command::NextPage { count: 1 }).is_err());
        h.session
            .apply(Command::Search {
                query: "theorem".to_string(),
            })
            .unwrap();
        assert_eq!(h.session.state().search_text, "theorem");
        h.session.apply(Command::Reset).unwrap();
        assert!(h.session.state().document.is_none());
    }

    #[test]
    fn state_json_omits_password() {
        let mut h = encrypted_harness();
        h.session.load_document(pdf("locked.pdf")).unwrap();
        h.session.attempt_decrypt("hunter2").unwrap();
        let json = h.session.state_json().unwrap();
        assert!(!json.contains("hunter2"));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["rotation"], 0);
        assert_eq!(value["page_layout"], "single");
        assert_eq!(value["total_pages"], 12);
    }

    proptest! {
        #[test]
        fn zoom_stays_within_bounds(deltas in prop::collection::vec(-3.0f32..3.0, 0..64)) {
            let mut h = harness(5);
            h.session.load_document(pdf("a.pdf")).unwrap();
            for delta in deltas {
                h.session.set_zoom(delta).unwrap();
                let scale = h.session.state().scale;
                prop_assert!((0.5..=2.0).contains(&scale), "scale {} escaped", scale);
            }
        }

        #[test]
        fn rotation_is_always_a_quarter_turn(turns in 0usize..32) {
            let mut h = harness(5);
            h.session.load_document(pdf("a.pdf")).unwrap();
            for _ in 0..turns {
                h.session.rotate().unwrap();
                prop_assert!([0, 90, 180, 270].contains(&h.session.state().rotation.degrees()));
            }
            prop_assert_eq!(h.session.state().rotation.degrees() as usize, (turns * 90) % 360);
        }

        #[test]
        fn goto_sets_valid_pages_only(start in 1usize..=7, target in 0usize..20) {
            let mut h = harness(7);
            h.session.load_document(pdf("a.pdf")).unwrap();
            h.session.goto_page(start).unwrap();
            let result = h.session.goto_page(target);
            if (1..=7).contains(&target) {
                prop_assert!(result.is_ok());
                prop_assert_eq!(h.session.state().current_page, target);
            } else {
                prop_assert!(result.is_err());
                prop_assert_eq!(h.session.state().current_page, start);
            }
        }
    }
}
