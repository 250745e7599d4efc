//! Terminal front end: kitty graphics output, viewport composition and input mapping.

use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind},
    terminal::{self, Clear, ClearType},
};
use folio_core::highlight::SELECTION_BORDER;
use folio_core::{Command, Point, Rect, RenderImage, Rotation, Viewer};
use png::{BitDepth, ColorType, Encoder};
use tracing::debug;

const CHUNK_SIZE: usize = 4096;

pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
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
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Transmits `image` and places it at the cursor, replacing the previous frame.
    pub fn draw(&mut self, image: &RenderImage, params: DrawParams) -> Result<()> {
        let encoded = BASE64.encode(encode_png(image)?);
        let mut chunks = encoded.as_bytes().chunks(CHUNK_SIZE).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = u8::from(chunks.peek().is_some());
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},c={},r={},s={},v={},z=-1,m={}",
                    self.image_id, params.columns, params.rows, image.width, image.height, more
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", more)?;
            }
            self.writer.write_all(b";")?;
            self.writer.write_all(chunk)?;
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Removes every image this renderer placed.
    pub fn delete_all(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=A,q=2\u{1b}\\")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// The terminal shows everything buffered since `begin_sync_update` at once.
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

/// Terminal grid and the pixel size of one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellMetrics {
    pub columns: u16,
    pub rows: u16,
    pub cell_width: f32,
    pub cell_height: f32,
}

impl CellMetrics {
    /// Used when the terminal does not report its pixel size.
    pub const FALLBACK_CELL: (f32, f32) = (8.0, 16.0);

    pub fn new(columns: u16, rows: u16, width_px: u16, height_px: u16) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(1);
        let (cell_width, cell_height) = if width_px == 0 || height_px == 0 {
            Self::FALLBACK_CELL
        } else {
            (
                f32::from(width_px) / f32::from(columns),
                f32::from(height_px) / f32::from(rows),
            )
        };
        Self {
            columns,
            rows,
            cell_width,
            cell_height,
        }
    }

    pub fn query() -> Result<Self> {
        let size = terminal::window_size()?;
        let metrics = Self::new(size.columns, size.rows, size.width, size.height);
        debug!(?metrics, "terminal size");
        Ok(metrics)
    }

    /// Rows available to the page image; the last row holds the status line.
    pub fn viewport_rows(&self) -> u16 {
        self.rows.saturating_sub(1).max(1)
    }

    pub fn viewport_size(&self) -> folio_core::Size {
        folio_core::Size::new(
            f32::from(self.columns) * self.cell_width,
            f32::from(self.viewport_rows()) * self.cell_height,
        )
    }

    pub fn draw_params(&self) -> DrawParams {
        DrawParams::clamped(u32::from(self.columns), u32::from(self.viewport_rows()))
    }

    /// Pixel position of a cell's centre.
    pub fn cell_center(&self, column: u16, row: u16) -> Point {
        Point::new(
            (f32::from(column) + 0.5) * self.cell_width,
            (f32::from(row) + 0.5) * self.cell_height,
        )
    }
}

impl Default for CellMetrics {
    fn default() -> Self {
        Self::new(80, 24, 0, 0)
    }
}

pub const PAPER_BACKGROUND: [u8; 4] = [128, 128, 128, 255];
pub const NIGHT_BACKGROUND: [u8; 4] = [32, 32, 32, 255];
const PLACEHOLDER: [u8; 4] = [200, 200, 200, 255];

/// Stitches the visible page rasters into one viewport-sized frame.
///
/// Pages without a raster yet are drawn as flat placeholders. An in-progress drag is outlined.
pub fn compose_viewport(viewer: &Viewer, background: [u8; 4]) -> RenderImage {
    let viewport = viewer.viewport();
    let width = viewport.width.max(1.0).round() as u32;
    let height = viewport.height.max(1.0).round() as u32;
    let mut canvas = RenderImage::blank(width, height, background);

    for page_index in viewer.visible_pages() {
        let Some(entry) = viewer.layout().get(page_index) else {
            continue;
        };
        let x = (entry.left - viewport.scroll_x).round() as i64;
        let y = (entry.top - viewport.scroll_y).round() as i64;
        match viewer.display_raster(page_index) {
            Some(raster) => blit(&mut canvas, raster, x, y),
            None => fill(
                &mut canvas,
                x,
                y,
                entry.width.round() as i64,
                entry.height.round() as i64,
                PLACEHOLDER,
            ),
        }
    }

    if let Some(drag) = viewer.drag_rect() {
        let on_screen = drag.translated(-viewport.scroll_x, -viewport.scroll_y);
        let [r, g, b] = SELECTION_BORDER.rgb;
        outline(&mut canvas, &on_screen, [r, g, b, 255]);
    }
    canvas
}

fn blit(canvas: &mut RenderImage, source: &RenderImage, x: i64, y: i64) {
    let canvas_w = i64::from(canvas.width);
    let canvas_h = i64::from(canvas.height);
    let src_x0 = (-x).max(0);
    let src_x1 = i64::from(source.width).min(canvas_w - x);
    if src_x1 <= src_x0 {
        return;
    }
    let span = ((src_x1 - src_x0) * 4) as usize;

    for row in 0..i64::from(source.height) {
        let dest_y = y + row;
        if dest_y < 0 || dest_y >= canvas_h {
            continue;
        }
        let src = ((row * i64::from(source.width) + src_x0) * 4) as usize;
        let dest = ((dest_y * canvas_w + x + src_x0) * 4) as usize;
        canvas.pixels[dest..dest + span].copy_from_slice(&source.pixels[src..src + span]);
    }
}

fn fill(canvas: &mut RenderImage, x: i64, y: i64, width: i64, height: i64, rgba: [u8; 4]) {
    let canvas_w = i64::from(canvas.width);
    let x0 = x.clamp(0, canvas_w);
    let x1 = (x + width).clamp(0, canvas_w);
    let y0 = y.clamp(0, i64::from(canvas.height));
    let y1 = (y + height).clamp(0, i64::from(canvas.height));
    for row in y0..y1 {
        for col in x0..x1 {
            let idx = ((row * canvas_w + col) * 4) as usize;
            canvas.pixels[idx..idx + 4].copy_from_slice(&rgba);
        }
    }
}

fn outline(canvas: &mut RenderImage, rect: &Rect, rgba: [u8; 4]) {
    let x = rect.left.round() as i64;
    let y = rect.top.round() as i64;
    let w = (rect.width().round() as i64).max(1);
    let h = (rect.height().round() as i64).max(1);
    fill(canvas, x, y, w, 1, rgba);
    fill(canvas, x, y + h - 1, w, 1, rgba);
    fill(canvas, x, y, 1, h, rgba);
    fill(canvas, x + w - 1, y, 1, h, rgba);
}

/// One line summarising the active document, e.g. `report.pdf  3/12  125%`.
pub fn status_text(viewer: &Viewer, pending: Option<&str>, message: Option<&str>) -> String {
    let name = viewer
        .info()
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut status = format!(
        "{}  {}/{}  {:.0}%",
        name,
        viewer.current_page() + 1,
        viewer.page_count(),
        viewer.scale() * 100.0
    );
    if let Some(message) = message {
        status.push_str("  ");
        status.push_str(message);
    }
    if let Some(pending) = pending {
        status.push_str("  ");
        status.push_str(pending);
    }
    status
}

pub fn write_status_line<W: Write>(writer: &mut W, row: u16, label: &str) -> io::Result<()> {
    crossterm::queue!(
        writer,
        cursor::MoveTo(0, row),
        Clear(ClearType::CurrentLine)
    )?;
    write!(writer, "{}", label)?;
    writer.flush()
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Command(Command),
    PointerDown(Point),
    PointerMove(Point),
    PointerUp(Point),
    CopySelection,
    NextDocument,
    CloseDocument,
    BeginSearch,
    SearchQueryChanged { query: String },
    SearchSubmit { query: String },
    SearchCancel,
    Resize { columns: u16, rows: u16 },
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Search,
}

/// Turns terminal events into viewer commands, keeping numeric prefixes between keys.
#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    search_buffer: String,
    cells: CellMetrics,
}

impl EventMapper {
    /// Document pixels moved by one scroll step.
    pub const SCROLL_STEP: f32 = 60.0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cells(cells: CellMetrics) -> Self {
        Self {
            cells,
            ..Self::default()
        }
    }

    pub fn set_cells(&mut self, cells: CellMetrics) {
        self.cells = cells;
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.search_buffer.clear();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Mouse(mouse) => self.map_mouse(mouse),
            Event::Resize(columns, rows) => UiEvent::Resize { columns, rows },
            Event::Key(key) => match self.mode {
                InputMode::Normal => self.map_key_normal(key),
                InputMode::Search => self.map_key_search(key),
            },
            _ => UiEvent::None,
        }
    }

    fn map_mouse(&mut self, mouse: MouseEvent) -> UiEvent {
        let point = self.cells.cell_center(mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => UiEvent::PointerDown(point),
            MouseEventKind::Drag(MouseButton::Left) => UiEvent::PointerMove(point),
            MouseEventKind::Up(MouseButton::Left) => UiEvent::PointerUp(point),
            MouseEventKind::ScrollDown => self.scroll(0.0, Self::SCROLL_STEP),
            MouseEventKind::ScrollUp => self.scroll(0.0, -Self::SCROLL_STEP),
            _ => UiEvent::None,
        }
    }

    fn map_key_normal(&mut self, key: KeyEvent) -> UiEvent {
        let KeyEvent {
            code, modifiers, ..
        } = key;
        match (code, modifiers) {
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                UiEvent::Quit
            }
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                let count = self.take_count();
                UiEvent::Command(Command::NextPage { count })
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                let count = self.take_count();
                UiEvent::Command(Command::PrevPage { count })
            }
            (KeyCode::Char('J'), _) | (KeyCode::PageDown, _) | (KeyCode::Char(' '), _) => {
                self.scroll(0.0, Self::SCROLL_STEP)
            }
            (KeyCode::Char('K'), _) | (KeyCode::PageUp, _) => self.scroll(0.0, -Self::SCROLL_STEP),
            (KeyCode::Char('h'), KeyModifiers::NONE) | (KeyCode::Left, _) => {
                self.scroll(-Self::SCROLL_STEP, 0.0)
            }
            (KeyCode::Char('l'), KeyModifiers::NONE) | (KeyCode::Right, _) => {
                self.scroll(Self::SCROLL_STEP, 0.0)
            }
            (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                let page = self.take_page().unwrap_or(0);
                UiEvent::Command(Command::GotoPage { page })
            }
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => {
                let page = self.take_page().unwrap_or(usize::MAX);
                UiEvent::Command(Command::GotoPage { page })
            }
            (KeyCode::Char('+'), _) | (KeyCode::Char('='), _) => {
                self.reset_count();
                UiEvent::Command(Command::ZoomIn)
            }
            (KeyCode::Char('-'), _) => {
                self.reset_count();
                UiEvent::Command(Command::ZoomOut)
            }
            (KeyCode::Char('w'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::FitWidth)
            }
            (KeyCode::Char('d'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::ToggleDarkMode)
            }
            (KeyCode::Char('/'), KeyModifiers::NONE) => {
                self.set_mode(InputMode::Search);
                UiEvent::BeginSearch
            }
            (KeyCode::Char('n'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::SearchNext)
            }
            (KeyCode::Char('r'), KeyModifiers::NONE) => {
                let quarter_turns = self.take_prefix().unwrap_or(1) % 4;
                let rotation = Rotation::from_degrees((quarter_turns * 90) as u32)
                    .unwrap_or(Rotation::None);
                UiEvent::Command(Command::Rotate {
                    pages: None,
                    rotation,
                })
            }
            (KeyCode::Char('y'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::CopySelection
            }
            (KeyCode::Esc, _) => {
                self.reset_count();
                UiEvent::Command(Command::ClearSelection)
            }
            (KeyCode::Tab, _) => {
                self.reset_count();
                UiEvent::NextDocument
            }
            (KeyCode::Char('x'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::CloseDocument
            }
            (KeyCode::Char('q'), _) => {
                self.reset_count();
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_key_search(&mut self, key: KeyEvent) -> UiEvent {
        match (key.code, key.modifiers) {
            (KeyCode::Esc, _) => {
                self.set_mode(InputMode::Normal);
                UiEvent::SearchCancel
            }
            (KeyCode::Enter, _) => {
                let query = std::mem::take(&mut self.search_buffer);
                self.set_mode(InputMode::Normal);
                UiEvent::SearchSubmit { query }
            }
            (KeyCode::Backspace, _) => {
                self.search_buffer.pop();
                UiEvent::SearchQueryChanged {
                    query: self.search_buffer.clone(),
                }
            }
            (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                self.search_buffer.push(c);
                UiEvent::SearchQueryChanged {
                    query: self.search_buffer.clone(),
                }
            }
            _ => UiEvent::None,
        }
    }

    fn scroll(&mut self, dx: f32, dy: f32) -> UiEvent {
        let multiplier = self.take_count() as f32;
        UiEvent::Command(Command::ScrollBy {
            dx: dx * multiplier,
            dy: dy * multiplier,
        })
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        self.pending_count = Some(current.saturating_mul(10).saturating_add(digit));
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        self.take_prefix().filter(|&count| count > 0).unwrap_or(1)
    }

    /// A typed 1-based page number as a 0-based index.
    fn take_page(&mut self) -> Option<usize> {
        self.take_prefix().map(|page| page.saturating_sub(1))
    }

    fn take_prefix(&mut self) -> Option<usize> {
        self.pending_digits.clear();
        self.pending_count.take()
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    pub fn pending_input(&self) -> Option<String> {
        if matches!(self.mode, InputMode::Search) {
            return Some(format!("/{}", self.search_buffer));
        }
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}
