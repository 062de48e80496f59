use std::io::{self, Stdout};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use crossterm::cursor;
use crossterm::event;
use crossterm::style::Print;
use crossterm::terminal::{self, Clear, ClearType};
use pdfview_core::{
    Command, DocumentSession, FileSource, PageRenderer, SessionError, SessionEvent,
};
use pdfview_tty::{
    write_status_line, DrawParams, EventMapper, InputMode, KittyRenderer, PromptKind, UiEvent,
};
use tracing::{debug, info, warn};

use crate::status::{combine_status, fit_to_cells, format_status};

const DROP_HINT: &str = "Drag & drop a PDF file here, or press o to open one";
const LOCKED_HINT: &str = "This document is password protected. Press p to unlock it.";

enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

pub struct App<'a> {
    session: DocumentSession,
    renderer: &'a dyn PageRenderer,
    source: &'a dyn FileSource,
    mapper: EventMapper,
    notice: Option<String>,
    export_dir: PathBuf,
}

impl<'a> App<'a> {
    pub fn new(
        session: DocumentSession,
        renderer: &'a dyn PageRenderer,
        source: &'a dyn FileSource,
        export_dir: PathBuf,
    ) -> Self {
        Self {
            session,
            renderer,
            source,
            mapper: EventMapper::new(),
            notice: None,
            export_dir,
        }
    }

    pub fn with_notice(mut self, notice: Option<String>) -> Self {
        self.notice = notice;
        self
    }

    pub async fn run(&mut self, kitty: &mut KittyRenderer<Stdout>) -> Result<()> {
        let mut dirty = true;
        self.prompt_for_password_if_locked();

        loop {
            if dirty {
                self.redraw(kitty)?;
                dirty = false;
            }

            if !event::poll(Duration::from_millis(100))? {
                continue;
            }
            let ui_event = self.mapper.map_event(event::read()?);
            match self.handle_event(ui_event).await {
                LoopAction::Quit => break,
                LoopAction::ContinueRedraw => dirty = true,
                LoopAction::Continue => {}
            }
            if self.drain_session_events() {
                dirty = true;
            }
            if !dirty {
                self.draw_status(kitty)?;
            }
        }

        if self.session.state().is_fullscreen {
            if let Err(err) = self.session.toggle_fullscreen() {
                warn!(?err, "failed to leave fullscreen on exit");
            }
        }
        kitty.delete_image()?;
        kitty.clear_all()?;
        Ok(())
    }

    async fn handle_event(&mut self, event: UiEvent) -> LoopAction {
        match event {
            UiEvent::Command(command) => {
                self.apply(command);
                LoopAction::Continue
            }
            UiEvent::BeginPrompt(_) | UiEvent::PromptCancel { .. } => LoopAction::Continue,
            UiEvent::PromptChanged { kind, text } => {
                if kind == PromptKind::Search {
                    self.apply(Command::Search { query: text });
                }
                LoopAction::Continue
            }
            UiEvent::PromptSubmit { kind, text } => {
                self.submit_prompt(kind, text).await;
                LoopAction::Continue
            }
            UiEvent::FilesDropped { paths } => {
                self.session.drag_enter();
                if paths.len() > 1 {
                    debug!(count = paths.len(), "only the first dropped file is opened");
                }
                if let Some(path) = paths.into_iter().next() {
                    self.open_path(path, true).await;
                }
                LoopAction::Continue
            }
            UiEvent::Download => {
                let dir = self.export_dir.clone();
                if self.apply(Command::Download { dir: dir.clone() }) {
                    if let Some(doc) = &self.session.state().document {
                        self.notice = Some(format!("saved {} to {}", doc.name, dir.display()));
                    }
                }
                LoopAction::Continue
            }
            UiEvent::Resized => LoopAction::ContinueRedraw,
            UiEvent::Quit => LoopAction::Quit,
            UiEvent::None => LoopAction::Continue,
        }
    }

    async fn submit_prompt(&mut self, kind: PromptKind, text: String) {
        match kind {
            PromptKind::Search => {
                self.apply(Command::Search { query: text });
            }
            PromptKind::Note => {
                if self.apply(Command::AddNote { text }) {
                    self.notice = Some("note added".to_string());
                }
            }
            PromptKind::Annotation => {
                if self.apply(Command::AddAnnotation { text }) {
                    self.notice = Some("annotation added".to_string());
                }
            }
            PromptKind::Password => {
                if self.apply(Command::Decrypt { password: text }) {
                    self.notice = Some("document unlocked".to_string());
                }
            }
            PromptKind::Open => {
                let path = text.trim();
                if !path.is_empty() {
                    self.open_path(PathBuf::from(path), false).await;
                }
            }
        }
    }

    async fn open_path(&mut self, path: PathBuf, dropped: bool) {
        match self.source.fetch(&path).await {
            Ok(blob) => {
                let command = if dropped {
                    Command::Drop { blob }
                } else {
                    Command::Open { blob }
                };
                if self.apply(command) {
                    info!(?path, "document opened");
                    self.prompt_for_password_if_locked();
                }
            }
            Err(err) => {
                warn!(?err, ?path, "failed to fetch file");
                self.session.drag_leave();
                self.notice = Some(format!("{err:#}"));
            }
        }
    }

    /// Runs a command and turns a refusal into a status-line notice.
    fn apply(&mut self, command: Command) -> bool {
        self.notice = None;
        match self.session.apply(command) {
            Ok(()) => true,
            Err(err) => {
                match &err {
                    SessionError::PageOutOfRange { .. } | SessionError::NoDocument => {
                        debug!(%err, "command not applied")
                    }
                    _ => warn!(%err, "command not applied"),
                }
                self.notice = Some(err.to_string());
                false
            }
        }
    }

    fn prompt_for_password_if_locked(&mut self) {
        if self.session.state().is_encrypted && self.mapper.mode() == InputMode::Normal {
            self.mapper.set_mode(InputMode::Prompt(PromptKind::Password));
        }
    }

    /// True when something the picture depends on changed.
    fn drain_session_events(&mut self) -> bool {
        let events = std::mem::take(&mut *self.session.events().lock());
        events.iter().any(|event| {
            matches!(
                event,
                SessionEvent::RedrawNeeded(_)
                    | SessionEvent::DocumentLoaded(_)
                    | SessionEvent::DocumentReset
                    | SessionEvent::Decrypted(_)
                    | SessionEvent::FullscreenChanged(_)
            )
        })
    }

    fn status_text(&self) -> String {
        let pending = self.mapper.pending_input();
        combine_status(
            format_status(self.session.state()),
            pending.as_deref(),
            self.notice.as_deref(),
        )
    }

    fn redraw(&mut self, kitty: &mut KittyRenderer<Stdout>) -> Result<()> {
        let window = terminal::window_size()?;
        let total_cols = u32::from(window.columns).max(1);
        let total_rows = u32::from(window.rows).max(1);
        let image_rows = total_rows.saturating_sub(1).max(1);
        let cell_px = (
            f32::from(window.width) / total_cols as f32,
            f32::from(window.height) / total_rows as f32,
        );

        kitty.begin_sync_update()?;
        kitty.clear_all()?;

        match self.session.render_request() {
            Some((handle, request)) => match self.renderer.render(&handle, &request) {
                Ok(image) => {
                    let (cols, rows) =
                        fit_to_cells((image.width, image.height), cell_px, (total_cols, image_rows));
                    let start_col = total_cols.saturating_sub(cols) / 2;
                    let start_row = image_rows.saturating_sub(rows) / 2;
                    crossterm::execute!(
                        kitty.writer(),
                        cursor::MoveTo(start_col as u16, start_row as u16)
                    )?;
                    kitty.draw(&image, DrawParams::clamped(cols, rows))?;
                }
                Err(err) => {
                    warn!(?err, %handle, "render failed");
                    kitty.delete_image()?;
                    self.notice = Some(format!("render failed: {err:#}"));
                }
            },
            None => {
                kitty.delete_image()?;
                let hint = if self.session.state().document.is_some() {
                    LOCKED_HINT
                } else {
                    DROP_HINT
                };
                let col = total_cols.saturating_sub(hint.chars().count() as u32) / 2;
                crossterm::execute!(
                    kitty.writer(),
                    cursor::MoveTo(col as u16, (image_rows / 2) as u16),
                    Print(hint)
                )?;
            }
        }

        self.draw_status(kitty)?;
        kitty.end_sync_update()?;
        Ok(())
    }

    fn draw_status(&self, kitty: &mut KittyRenderer<Stdout>) -> Result<()> {
        let window = terminal::window_size()?;
        let row = window.rows.saturating_sub(1);
        let width = usize::from(window.columns);
        let status: String = self.status_text().chars().take(width).collect();
        let writer = kitty.writer();
        crossterm::execute!(writer, cursor::MoveTo(0, row), Clear(ClearType::CurrentLine))?;
        write_status_line(writer, &status)?;
        Ok(())
    }
}

pub fn stdout_renderer() -> KittyRenderer<Stdout> {
    KittyRenderer::new(io::stdout())
}
