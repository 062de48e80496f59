mod drop;

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{Clear, ClearType},
};
use pdfview_core::{Command, RenderImage};
use png::{BitDepth, ColorType, Encoder};

pub use drop::parse_dropped_paths;

const KITTY_CHUNK: usize = 4096;

/// Paints page bitmaps with the kitty graphics protocol. One image id is
/// reused, so each draw replaces the previous picture.
pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
}

pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn draw(&mut self, image: &RenderImage, params: DrawParams) -> Result<()> {
        let encoded = BASE64.encode(encode_png(image)?);
        let header = format!(
            "a=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1",
            self.image_id,
            self.placement_id,
            params.columns,
            params.rows,
            image.width,
            image.height
        );
        self.transmit(&header, encoded.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    /// Removes the picture, e.g. once the document is closed.
    pub fn delete_image(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=I,i={},q=2\u{1b}\\", self.image_id)?;
        self.writer.flush()?;
        Ok(())
    }

    fn transmit(&mut self, header: &str, payload: &[u8]) -> Result<()> {
        let mut chunks = payload.chunks(KITTY_CHUNK).peekable();
        let mut first = true;
        while let Some(chunk) = chunks.next() {
            let more = u8::from(chunks.peek().is_some());
            if first {
                write!(self.writer, "\u{1b}_G{},m={}", header, more)?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", more)?;
            }
            self.writer.write_all(b";")?;
            self.writer.write_all(chunk)?;
            write!(self.writer, "\u{1b}\\")?;
        }
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// The terminal paints everything buffered since `begin_sync_update`.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

fn encode_png(image: &RenderImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
    encoder.set_color(ColorType::Rgba);
    encoder.set_depth(BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&image.pixels)?;
    writer.finish()?;
    Ok(buffer)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Search,
    Note,
    Annotation,
    Password,
    Open,
}

impl PromptKind {
    pub fn label(self) -> &'static str {
        match self {
            PromptKind::Search => "/",
            PromptKind::Note => "note: ",
            PromptKind::Annotation => "annotate: ",
            PromptKind::Password => "password: ",
            PromptKind::Open => "open: ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Prompt(PromptKind),
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    Command(Command),
    BeginPrompt(PromptKind),
    PromptChanged { kind: PromptKind, text: String },
    PromptSubmit { kind: PromptKind, text: String },
    PromptCancel { kind: PromptKind },
    FilesDropped { paths: Vec<PathBuf> },
    Download,
    Resized,
    Quit,
    None,
}

/// Converts raw terminal events into typed UI events, keeping the numeric
/// prefix and prompt buffer between key presses.
#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    buffer: String,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.buffer.clear();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                kind: KeyEventKind::Release,
                ..
            }) => UiEvent::None,
            Event::Resize(..) => UiEvent::Resized,
            event => match self.mode {
                InputMode::Normal => self.map_event_normal(event),
                InputMode::Prompt(kind) => self.map_event_prompt(kind, event),
            },
        }
    }

    fn map_event_normal(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Paste(text) => {
                self.reset_count();
                let paths = parse_dropped_paths(&text);
                if paths.is_empty() {
                    UiEvent::None
                } else {
                    UiEvent::FilesDropped { paths }
                }
            }
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Char('0'), KeyModifiers::NONE) if self.pending_count.is_none() => {
                    UiEvent::Command(Command::ResetZoom)
                }
                (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                    if let Some(digit) = c.to_digit(10) {
                        self.push_digit(digit as usize);
                    }
                    UiEvent::None
                }
                (KeyCode::Char('j' | 'l' | ' '), KeyModifiers::NONE)
                | (KeyCode::Down | KeyCode::Right | KeyCode::PageDown, _) => {
                    let count = self.take_count();
                    UiEvent::Command(Command::NextPage { count })
                }
                (KeyCode::Char('k' | 'h'), KeyModifiers::NONE)
                | (KeyCode::Up | KeyCode::Left | KeyCode::PageUp, _) => {
                    let count = self.take_count();
                    UiEvent::Command(Command::PrevPage { count })
                }
                (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                    match self.take_explicit_count() {
                        Some(page) => UiEvent::Command(Command::GotoPage { page }),
                        None => UiEvent::Command(Command::FirstPage),
                    }
                }
                (KeyCode::Char('G'), _) | (KeyCode::End, _) => {
                    match self.take_explicit_count() {
                        Some(page) => UiEvent::Command(Command::GotoPage { page }),
                        None => UiEvent::Command(Command::LastPage),
                    }
                }
                (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                    self.reset_count();
                    UiEvent::Quit
                }
                (KeyCode::Char('q'), _) => {
                    self.reset_count();
                    UiEvent::Quit
                }
                (KeyCode::Char('/'), _) => self.begin_prompt(PromptKind::Search),
                (KeyCode::Char('a'), KeyModifiers::NONE) => self.begin_prompt(PromptKind::Note),
                (KeyCode::Char('A'), _) => self.begin_prompt(PromptKind::Annotation),
                (KeyCode::Char('p'), KeyModifiers::NONE) => {
                    self.begin_prompt(PromptKind::Password)
                }
                (KeyCode::Char('o'), KeyModifiers::NONE) => self.begin_prompt(PromptKind::Open),
                (code, _) => {
                    self.reset_count();
                    match code {
                        KeyCode::Char('+' | '=') => UiEvent::Command(Command::ZoomIn),
                        KeyCode::Char('-') => UiEvent::Command(Command::ZoomOut),
                        KeyCode::Char('r') => UiEvent::Command(Command::Rotate),
                        KeyCode::Char('b') => UiEvent::Command(Command::AddBookmark),
                        KeyCode::Char('d') => UiEvent::Command(Command::ToggleDarkMode),
                        KeyCode::Char('t') => UiEvent::Command(Command::ToggleTextLayer),
                        KeyCode::Char('f') => UiEvent::Command(Command::ToggleFullscreen),
                        KeyCode::Char('v') => UiEvent::Command(Command::CyclePageLayout),
                        KeyCode::Char('R') => UiEvent::Command(Command::Reset),
                        KeyCode::Char('s') => UiEvent::Download,
                        _ => UiEvent::None,
                    }
                }
            },
            _ => UiEvent::None,
        }
    }

    fn map_event_prompt(&mut self, kind: PromptKind, event: Event) -> UiEvent {
        match event {
            Event::Paste(text) => {
                self.buffer.push_str(text.trim_end_matches(&['\r', '\n'][..]));
                self.prompt_changed(kind)
            }
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Esc, _) => {
                    self.set_mode(InputMode::Normal);
                    UiEvent::PromptCancel { kind }
                }
                (KeyCode::Enter, _) => {
                    let text = std::mem::take(&mut self.buffer);
                    self.set_mode(InputMode::Normal);
                    UiEvent::PromptSubmit { kind, text }
                }
                (KeyCode::Backspace, _) => {
                    self.buffer.pop();
                    self.prompt_changed(kind)
                }
                (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                    self.buffer.push(c);
                    self.prompt_changed(kind)
                }
                _ => UiEvent::None,
            },
            _ => UiEvent::None,
        }
    }

    fn begin_prompt(&mut self, kind: PromptKind) -> UiEvent {
        self.set_mode(InputMode::Prompt(kind));
        UiEvent::BeginPrompt(kind)
    }

    fn prompt_changed(&self, kind: PromptKind) -> UiEvent {
        UiEvent::PromptChanged {
            kind,
            text: self.buffer.clone(),
        }
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_explicit_count(&mut self) -> Option<usize> {
        let count = self.pending_count.take();
        self.pending_digits.clear();
        count
    }

    fn take_count(&mut self) -> usize {
        self.take_explicit_count()
            .filter(|&count| count > 0)
            .unwrap_or(1)
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    /// Text for the status line: the typed prefix, or the prompt being
    /// edited. Passwords are masked.
    pub fn pending_input(&self) -> Option<String> {
        match self.mode {
            InputMode::Prompt(PromptKind::Password) => Some(format!(
                "{}{}",
                PromptKind::Password.label(),
                "*".repeat(self.buffer.chars().count())
            )),
            InputMode::Prompt(kind) => Some(format!("{}{}", kind.label(), self.buffer)),
            InputMode::Normal if !self.pending_digits.is_empty() => {
                Some(self.pending_digits.clone())
            }
            InputMode::Normal => None,
        }
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}
