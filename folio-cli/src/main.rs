use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use arboard::Clipboard;
use clap::{Args, Parser, Subcommand};
use crossterm::cursor;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::terminal::{self, Clear, ClearType};
use folio_core::config::Theme;
use folio_core::pages::{
    export_pages, merge_documents, prepare_print, rotate_pages, split_document, DocumentSummary,
};
use folio_core::{
    parse_page_range, AppDirs, Command, DocumentProvider, FileSettingsStore, PageGeometryProvider,
    PageRangeSet, Rotation, Session, SessionEvent, Settings, SettingsStore, ViewerConfig,
};
use folio_render::PdfRenderFactory;
use folio_tty::{
    compose_viewport, status_text, write_status_line, CellMetrics, EventMapper, KittyRenderer,
    UiEvent, NIGHT_BACKGROUND, PAPER_BACKGROUND,
};
use tokio::runtime::Handle;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

const MAX_PASSWORD_ATTEMPTS: usize = 3;

#[derive(Debug, Parser)]
#[command(name = "folio", version, about = "Terminal document viewer and page tools")]
struct Cli {
    /// Password for encrypted documents; prompted for when missing or wrong
    #[arg(long, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Open documents in the terminal viewer
    View(ViewArgs),
    /// Copy the pages named by a range such as "1-3,5" into a new document
    Export {
        file: PathBuf,
        #[arg(long)]
        pages: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Copy a range of pages into a new document
    Extract(ExtractArgs),
    /// Set an absolute rotation on pages and save the result
    Rotate {
        file: PathBuf,
        #[arg(long)]
        pages: String,
        #[arg(long, value_parser = parse_rotation)]
        degrees: Rotation,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Write every page into its own file
    Split {
        file: PathBuf,
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Concatenate documents in the given order
    Merge {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Prepare a print-ready copy, shrinking oversized pages onto the target paper
    Print {
        file: PathBuf,
        #[arg(long)]
        pages: Option<String>,
        /// Keep oversized pages at their original size
        #[arg(long)]
        no_fit: bool,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Show metadata, page count and file size
    Info { file: PathBuf },
}

#[derive(Debug, Args)]
struct ViewArgs {
    /// Page to open the last document on (1-based)
    #[arg(short = 'p', long = "page")]
    page: Option<usize>,

    /// Start in dark mode regardless of the saved theme
    #[arg(long)]
    dark: bool,

    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct ExtractArgs {
    file: PathBuf,
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pages: Option<String>,
    /// First page, 1-based
    #[arg(long, requires = "to")]
    from: Option<usize>,
    /// Last page, 1-based and inclusive
    #[arg(long, requires = "from")]
    to: Option<usize>,
    #[arg(short, long)]
    output: PathBuf,
}

impl ExtractArgs {
    fn selection(&self, total_pages: usize) -> Result<PageRangeSet> {
        match (&self.pages, self.from, self.to) {
            (Some(spec), _, _) => Ok(parse_page_range(spec, total_pages)?),
            (None, Some(from), Some(to)) => Ok(PageRangeSet::span(from, to, total_pages)?),
            _ => Err(anyhow!("either --pages or --from/--to is required")),
        }
    }
}

fn parse_rotation(value: &str) -> Result<Rotation, String> {
    let degrees: u32 = value
        .parse()
        .map_err(|_| format!("{value:?} is not a number of degrees"))?;
    Rotation::from_degrees(degrees)
        .ok_or_else(|| format!("{degrees} is not one of 0, 90, 180, 270"))
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        crossterm::execute!(io::stdout(), EnableMouseCapture, cursor::Hide)?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(
            stdout,
            DisableMouseCapture,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0),
            cursor::Show
        );
        let _ = terminal::disable_raw_mode();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let dirs = AppDirs::discover()?;
    let interactive = matches!(cli.command, CliCommand::View(_));
    let _log_guard = init_logging(&dirs, !interactive)?;
    let config = ViewerConfig::load(&dirs.config_file())?;
    let password = cli.password;

    match cli.command {
        CliCommand::View(args) => run_viewer(args, password, &dirs, config).await,
        command => run_page_command(command, password, config).await,
    }
}

async fn run_page_command(
    command: CliCommand,
    password: Option<String>,
    config: ViewerConfig,
) -> Result<()> {
    let provider = PdfRenderFactory::new()?;
    match command {
        CliCommand::View(_) => Ok(()),
        CliCommand::Export {
            file,
            pages,
            output,
        } => {
            let document = open_document(&provider, &file, password).await?;
            let pages = parse_page_range(&pages, document.page_count())?;
            let count = export_pages(&provider, document.as_ref(), &pages, &output)?;
            println!("Exported {count} pages to {}", output.display());
            Ok(())
        }
        CliCommand::Extract(args) => {
            let document = open_document(&provider, &args.file, password).await?;
            let pages = args.selection(document.page_count())?;
            let count = export_pages(&provider, document.as_ref(), &pages, &args.output)?;
            println!("Extracted {count} pages to {}", args.output.display());
            Ok(())
        }
        CliCommand::Rotate {
            file,
            pages,
            degrees,
            output,
        } => {
            let document = open_document(&provider, &file, password).await?;
            let pages = parse_page_range(&pages, document.page_count())?;
            rotate_pages(document.as_ref(), &pages, degrees, &output)?;
            println!(
                "Rotated {} pages to {} degrees in {}",
                pages.len(),
                degrees.degrees(),
                output.display()
            );
            Ok(())
        }
        CliCommand::Split { file, out_dir } => {
            let document = open_document(&provider, &file, password).await?;
            let files = split_document(&provider, document.as_ref(), &out_dir)?;
            println!("Wrote {} files to {}", files.len(), out_dir.display());
            Ok(())
        }
        CliCommand::Merge { files, output } => {
            let mut documents: Vec<Arc<dyn PageGeometryProvider>> =
                Vec::with_capacity(files.len());
            for file in &files {
                documents.push(open_document(&provider, file, password.clone()).await?);
            }
            let count = merge_documents(&provider, &documents, &output)?;
            println!(
                "Merged {} documents ({count} pages) into {}",
                files.len(),
                output.display()
            );
            Ok(())
        }
        CliCommand::Print {
            file,
            pages,
            no_fit,
            output,
        } => {
            let document = open_document(&provider, &file, password).await?;
            let pages = match pages {
                Some(spec) => parse_page_range(&spec, document.page_count())?,
                None => PageRangeSet::all(document.page_count()),
            };
            let prepared = prepare_print(
                &provider,
                document.as_ref(),
                &pages,
                !no_fit,
                config.print_target,
                &output,
            )?;
            println!(
                "Prepared {} pages ({} fitted) in {}",
                prepared.pages,
                prepared.fitted,
                output.display()
            );
            Ok(())
        }
        CliCommand::Info { file } => {
            let document = open_document(&provider, &file, password).await?;
            for line in DocumentSummary::of(document.as_ref())?.lines() {
                println!("{line}");
            }
            Ok(())
        }
    }
}

/// Opens `path`, prompting for a password while the engine reports the wrong one.
async fn open_document(
    provider: &PdfRenderFactory,
    path: &Path,
    mut password: Option<String>,
) -> Result<Arc<dyn PageGeometryProvider>> {
    let mut attempts = 0;
    loop {
        match provider.open(path, password.as_deref()).await {
            Ok(document) => return Ok(document),
            Err(err) if err.is_recoverable_auth() && attempts < MAX_PASSWORD_ATTEMPTS => {
                attempts += 1;
                warn!(path = %path.display(), attempts, "password required");
                password = Some(prompt_password(path)?);
            }
            Err(err) => {
                return Err(anyhow::Error::new(err).context(format!("failed to open {:?}", path)))
            }
        }
    }
}

async fn open_in_session(
    session: &mut Session,
    provider: &PdfRenderFactory,
    path: &Path,
    mut password: Option<String>,
) -> Result<()> {
    let mut attempts = 0;
    loop {
        match session
            .open_with(provider, path.to_path_buf(), password.as_deref())
            .await
        {
            Ok(_) => return Ok(()),
            Err(err) if err.is_recoverable_auth() && attempts < MAX_PASSWORD_ATTEMPTS => {
                attempts += 1;
                warn!(path = %path.display(), attempts, "password required");
                password = Some(prompt_password(path)?);
            }
            Err(err) => {
                return Err(anyhow::Error::new(err).context(format!("failed to open {:?}", path)))
            }
        }
    }
}

fn prompt_password(path: &Path) -> Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "Password for {}: ", path.display())?;
    stderr.flush()?;
    terminal::enable_raw_mode()?;
    let entered = read_hidden_line();
    terminal::disable_raw_mode()?;
    writeln!(stderr)?;
    entered
}

fn read_hidden_line() -> Result<String> {
    let mut line = String::new();
    loop {
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) = event::read()?
        else {
            continue;
        };
        match code {
            KeyCode::Enter => return Ok(line),
            KeyCode::Esc => return Err(anyhow!("password entry cancelled")),
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(anyhow!("password entry cancelled"))
            }
            KeyCode::Backspace => {
                line.pop();
            }
            KeyCode::Char(c) => line.push(c),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

struct ViewState {
    cells: CellMetrics,
    mapper: EventMapper,
    clipboard: Option<Clipboard>,
    message: Option<String>,
}

async fn run_viewer(
    args: ViewArgs,
    password: Option<String>,
    dirs: &AppDirs,
    config: ViewerConfig,
) -> Result<()> {
    let store = FileSettingsStore::new(dirs.config_dir.clone())?;
    let mut settings = match store.load() {
        Ok(settings) => settings.unwrap_or_default(),
        Err(err) => {
            warn!(error = %err, "ignoring unreadable settings");
            Settings::default()
        }
    };

    let cells = CellMetrics::query().unwrap_or_default();
    let dark_mode = args.dark || settings.dark_mode();
    let mut session =
        Session::new(config, cells.viewport_size(), dark_mode).with_runtime(Handle::current());

    let provider = PdfRenderFactory::new()?;
    for path in &args.files {
        open_in_session(&mut session, &provider, path, password.clone()).await?;
    }
    if let Some(page) = args.page {
        session.apply(Command::GotoPage {
            page: page.saturating_sub(1),
        })?;
    }

    let clipboard = match Clipboard::new() {
        Ok(clipboard) => Some(clipboard),
        Err(err) => {
            warn!(error = %err, "clipboard unavailable");
            None
        }
    };
    let mut state = ViewState {
        cells,
        mapper: EventMapper::with_cells(cells),
        clipboard,
        message: None,
    };

    let raw = RawModeGuard::new()?;
    let mut renderer = KittyRenderer::new(io::stdout());
    renderer.clear_all()?;
    let mut dirty = true;

    loop {
        if let Some(viewer) = session.active_mut() {
            let summary = viewer.accept_background();
            if !summary.rendered.is_empty() || !summary.failed.is_empty() {
                dirty = true;
            }
            if let Some(message) = render_failure_message(&summary.failed) {
                state.message = Some(message);
            }
            viewer.request_visible();
        }

        if dirty {
            redraw(&mut renderer, &session, &state)?;
            dirty = false;
        }

        if event::poll(Duration::from_millis(50))? {
            let ui_event = state.mapper.map_event(event::read()?);
            match handle_event(ui_event, &mut session, &mut state)? {
                LoopAction::ContinueRedraw => dirty = true,
                LoopAction::Continue => {}
                LoopAction::Quit => break,
            }
        }

        for event in session.take_events() {
            match event {
                SessionEvent::SearchMissed(_) => {
                    state.message = Some("pattern not found".to_owned());
                    dirty = true;
                }
                SessionEvent::ActiveDocumentChanged(_) => {
                    renderer.clear_all()?;
                    dirty = true;
                }
                SessionEvent::RedrawNeeded(_)
                | SessionEvent::DocumentOpened(_)
                | SessionEvent::DocumentClosed(_) => dirty = true,
            }
        }

        if session.is_empty() {
            break;
        }
    }

    renderer.delete_all()?;
    drop(raw);

    settings.theme = if session.dark_mode() {
        Theme::Dark
    } else {
        Theme::Light
    };
    settings.window_geometry = Some(format!("{}x{}", state.cells.columns, state.cells.rows));
    session.close_all();
    store.save(&settings)?;
    info!("viewer closed");
    Ok(())
}

fn handle_event(
    event: UiEvent,
    session: &mut Session,
    state: &mut ViewState,
) -> Result<LoopAction> {
    match event {
        UiEvent::Command(command) => {
            apply_command(session, state, command);
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::PointerDown(point) => {
            if let Some(viewer) = session.active_mut() {
                viewer.on_pointer_down(point);
            }
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::PointerMove(point) => {
            let moved = session
                .active_mut()
                .and_then(|viewer| viewer.on_pointer_move(point))
                .is_some();
            Ok(if moved {
                LoopAction::ContinueRedraw
            } else {
                LoopAction::Continue
            })
        }
        UiEvent::PointerUp(point) => {
            if let Some(text) = session
                .active_mut()
                .and_then(|viewer| viewer.on_pointer_up(point))
            {
                state.message = Some(format!("{} characters selected", text.chars().count()));
            }
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::CopySelection => {
            let text = session
                .active()
                .map(|viewer| viewer.current_selection_text().to_owned())
                .unwrap_or_default();
            state.message = Some(copy_to_clipboard(state.clipboard.as_mut(), text));
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::NextDocument => {
            if session.len() > 1 {
                let index = (session.active_index() + 1) % session.len();
                apply_command(session, state, Command::SwitchDocument { index });
            }
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::CloseDocument => {
            let index = session.active_index();
            apply_command(session, state, Command::CloseDocument { index });
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::BeginSearch | UiEvent::SearchQueryChanged { .. } | UiEvent::SearchCancel => {
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::SearchSubmit { query } => {
            apply_command(session, state, Command::Search { query });
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::Resize { columns, rows } => {
            state.cells = CellMetrics::query()
                .unwrap_or_else(|_| CellMetrics::new(columns, rows, 0, 0));
            state.mapper.set_cells(state.cells);
            let size = state.cells.viewport_size();
            apply_command(
                session,
                state,
                Command::Resize {
                    width: size.width,
                    height: size.height,
                },
            );
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::Quit => Ok(LoopAction::Quit),
        UiEvent::None => Ok(LoopAction::Continue),
    }
}

/// Runs a command against the session. Failures become the status message.
fn apply_command(session: &mut Session, state: &mut ViewState, command: Command) {
    state.message = None;
    if let Err(err) = session.apply(command) {
        warn!(error = %err, "command failed");
        state.message = Some(err.to_string());
    }
}

fn render_failure_message(failed: &[usize]) -> Option<String> {
    let pages: Vec<String> = failed.iter().map(|page| (page + 1).to_string()).collect();
    match pages.as_slice() {
        [] => None,
        [page] => Some(format!("page {page} failed to render")),
        pages => Some(format!("pages {} failed to render", pages.join(", "))),
    }
}

fn copy_to_clipboard(clipboard: Option<&mut Clipboard>, text: String) -> String {
    if text.is_empty() {
        return "nothing selected".to_owned();
    }
    let Some(clipboard) = clipboard else {
        return "clipboard unavailable".to_owned();
    };
    let count = text.chars().count();
    match clipboard.set_text(text) {
        Ok(()) => format!("copied {count} characters"),
        Err(err) => {
            warn!(error = %err, "clipboard write failed");
            "copy failed".to_owned()
        }
    }
}

fn redraw(
    renderer: &mut KittyRenderer<io::Stdout>,
    session: &Session,
    state: &ViewState,
) -> Result<()> {
    let Some(viewer) = session.active() else {
        return Ok(());
    };
    let background = if viewer.dark_mode() {
        NIGHT_BACKGROUND
    } else {
        PAPER_BACKGROUND
    };
    let frame = compose_viewport(viewer, background);
    let pending = state.mapper.pending_input();
    let status = status_text(viewer, pending.as_deref(), state.message.as_deref());

    renderer.begin_sync_update()?;
    crossterm::queue!(renderer.writer(), cursor::MoveTo(0, 0))?;
    renderer.draw(&frame, state.cells.draw_params())?;
    write_status_line(renderer.writer(), state.cells.rows.saturating_sub(1), &status)?;
    renderer.end_sync_update()
}

fn init_logging(dirs: &AppDirs, console: bool) -> Result<WorkerGuard> {
    let log_dir = dirs.log_dir();
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {:?}", log_dir))?;

    let file_appender = tracing_appender::rolling::never(log_dir, "folio.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    // The viewer owns the terminal, so only the page commands also log to stderr.
    let console_layer = console.then(|| tracing_subscriber::fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(args: &[&str]) -> ExtractArgs {
        let mut argv = vec!["folio", "extract", "in.pdf", "-o", "out.pdf"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            CliCommand::Extract(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn extract_accepts_a_range_spec_or_a_span() {
        let by_spec = extract(&["--pages", "2,4-5"]);
        assert_eq!(by_spec.selection(6).unwrap().into_vec(), vec![1, 3, 4]);

        let by_span = extract(&["--from", "2", "--to", "3"]);
        assert_eq!(by_span.selection(6).unwrap().into_vec(), vec![1, 2]);
        assert!(by_span.selection(2).is_err());

        assert!(extract(&[]).selection(6).is_err());
    }

    #[test]
    fn extract_rejects_mixed_selection_flags() {
        let argv = [
            "folio", "extract", "in.pdf", "-o", "out.pdf", "--pages", "1", "--from", "1", "--to",
            "2",
        ];
        assert!(Cli::try_parse_from(argv).is_err());

        let argv = ["folio", "extract", "in.pdf", "-o", "out.pdf", "--from", "1"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn rotation_accepts_right_angles() {
        assert_eq!(parse_rotation("90"), Ok(Rotation::Clockwise90));
        assert_eq!(parse_rotation("0"), Ok(Rotation::None));
        assert!(parse_rotation("45").is_err());
        assert!(parse_rotation("left").is_err());
    }

    #[test]
    fn password_flag_is_global() {
        let cli = Cli::try_parse_from(["folio", "info", "locked.pdf", "--password", "s3cret"])
            .unwrap();
        assert_eq!(cli.password.as_deref(), Some("s3cret"));
        assert!(matches!(cli.command, CliCommand::Info { .. }));
    }

    #[test]
    fn view_requires_files() {
        assert!(Cli::try_parse_from(["folio", "view"]).is_err());
        let cli = Cli::try_parse_from(["folio", "view", "-p", "3", "a.pdf", "b.pdf"]).unwrap();
        match cli.command {
            CliCommand::View(args) => {
                assert_eq!(args.page, Some(3));
                assert_eq!(args.files.len(), 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn empty_selection_is_not_copied() {
        assert_eq!(copy_to_clipboard(None, String::new()), "nothing selected");
        assert_eq!(
            copy_to_clipboard(None, "words".to_owned()),
            "clipboard unavailable"
        );
    }

    #[test]
    fn render_failures_are_reported_with_page_numbers() {
        assert_eq!(render_failure_message(&[]), None);
        assert_eq!(
            render_failure_message(&[0]).as_deref(),
            Some("page 1 failed to render")
        );
        assert_eq!(
            render_failure_message(&[2, 4]).as_deref(),
            Some("pages 3, 5 failed to render")
        );
    }

    #[test]
    fn command_failures_do_not_end_the_session() {
        let mut session = Session::new(
            ViewerConfig::default(),
            folio_core::Size::new(340.0, 400.0),
            false,
        );
        let mut state = ViewState {
            cells: CellMetrics::default(),
            mapper: EventMapper::new(),
            clipboard: None,
            message: Some("stale".to_owned()),
        };
        let action = handle_event(UiEvent::CloseDocument, &mut session, &mut state).unwrap();
        assert_eq!(action, LoopAction::ContinueRedraw);
        assert_eq!(state.message, None);
    }
}
