use std::io;

use anyhow::Result;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use pdfview_core::FullscreenControl;

/// The terminal's alternate screen stands in for fullscreen mode.
pub struct AlternateScreen;

impl FullscreenControl for AlternateScreen {
    fn request(&self, enter: bool) -> Result<()> {
        let mut stdout = io::stdout();
        if enter {
            crossterm::execute!(stdout, EnterAlternateScreen)?;
        } else {
            crossterm::execute!(stdout, LeaveAlternateScreen)?;
        }
        Ok(())
    }
}
