mod app;
mod screen;
mod source;
mod startup;
mod status;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{DisableBracketedPaste, EnableBracketedPaste};
use crossterm::terminal::{self, LeaveAlternateScreen};
use directories::{ProjectDirs, UserDirs};
use pdfview_core::{
    Collaborators, DocumentSession, FileSource, FullscreenControl, NoFullscreen,
    ObjectUrlRegistry, ViewerConfig,
};
use pdfview_render::PdfiumEngine;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::app::{stdout_renderer, App};
use crate::screen::AlternateScreen;
use crate::source::DiskFileSource;
use crate::startup::apply_startup_options;

#[derive(Debug, Parser)]
#[command(
    name = "pdfview",
    version,
    about = "terminal PDF viewer for kitty-compatible terminals"
)]
struct Args {
    /// PDF file to open; drop or open one later when omitted
    file: Option<PathBuf>,

    /// Page to open the document on (1-based)
    #[arg(short = 'p', long = "page")]
    page: Option<usize>,

    /// Password for an encrypted document
    #[arg(long)]
    password: Option<String>,

    /// Start in dark mode
    #[arg(long)]
    dark: bool,

    /// Config file to use instead of the platform default
    #[arg(long)]
    config: Option<PathBuf>,

    /// Load the file, print the session state as JSON and exit
    #[arg(long)]
    print_state: bool,
}

struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        crossterm::execute!(io::stdout(), cursor::Hide, EnableBracketedPaste)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(
            stdout,
            DisableBracketedPaste,
            LeaveAlternateScreen,
            cursor::Show
        );
        let _ = terminal::disable_raw_mode();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ViewerConfig::project_dirs()
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs, args.print_state)?;

    let mut config = match args.config.clone().or_else(ViewerConfig::default_path) {
        Some(path) => ViewerConfig::load(&path)
            .with_context(|| format!("failed to load config {:?}", path))?,
        None => ViewerConfig::default(),
    };
    if args.dark {
        config.dark_mode = true;
    }

    let urls = Arc::new(ObjectUrlRegistry::new());
    let library_path = config.resolved_pdfium_library_path();
    let engine = Arc::new(PdfiumEngine::new(Arc::clone(&urls), library_path.as_deref())?);
    let fullscreen: Arc<dyn FullscreenControl> = if args.print_state {
        Arc::new(NoFullscreen)
    } else {
        Arc::new(AlternateScreen)
    };
    let collaborators = Collaborators {
        analyzer: engine.clone(),
        decryptor: engine.clone(),
        fullscreen,
    };
    let mut session = DocumentSession::new(config, collaborators, urls);

    let source = DiskFileSource;
    let mut notice = None;
    if let Some(path) = &args.file {
        let blob = source.fetch(path).await?;
        session
            .load_document(blob)
            .with_context(|| format!("failed to open {:?}", path))?;
        notice = apply_startup_options(&mut session, args.password.as_deref(), args.page);
    }

    if args.print_state {
        println!("{}", session.state_json()?);
        return Ok(());
    }

    let export_dir = UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(|dir| dir.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."));
    info!(?export_dir, "starting viewer");

    let _terminal = TerminalGuard::new()?;
    let mut kitty = stdout_renderer();
    let mut app = App::new(session, engine.as_ref(), &source, export_dir).with_notice(notice);
    app.run(&mut kitty).await
}

fn init_logging(project_dirs: &ProjectDirs, console: bool) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "pdfview.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    // the terminal belongs to the viewer unless we only print state
    let console_layer = console.then(|| tracing_subscriber::fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
