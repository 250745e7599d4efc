use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ViewerResult;
use crate::geometry::{Rect, Size};
use crate::words::Word;

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("0d5e1c7a-3f42-5b8e-9c61-4a7f2e90b3d1").expect("valid namespace UUID")
});

pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&DOCUMENT_NAMESPACE, rendered.as_bytes())
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Vec<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub path: PathBuf,
    pub page_count: usize,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: usize,
    pub scale: f32,
    pub dark_mode: bool,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self {
            page_index: 0,
            scale: 1.0,
            dark_mode: false,
        }
    }
}

/// RGBA8 raster, row-major, no padding.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RenderImage {
    pub fn blank(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            pixels.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.pixels.get(idx..idx + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// Absolute page rotation accepted by the document engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    None,
    Clockwise90,
    Clockwise180,
    Clockwise270,
}

impl Rotation {
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Clockwise90),
            180 => Some(Rotation::Clockwise180),
            270 => Some(Rotation::Clockwise270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Clockwise90 => 90,
            Rotation::Clockwise180 => 180,
            Rotation::Clockwise270 => 270,
        }
    }
}

/// The document engine for one open document.
///
/// Geometry is reported in page-native units with a top-left origin. Implementations must be
/// callable from the background render worker, hence `Send + Sync`.
pub trait PageGeometryProvider: Send + Sync {
    fn info(&self) -> &DocumentInfo;

    fn page_count(&self) -> usize {
        self.info().page_count
    }

    fn page_size(&self, page_index: usize) -> Result<Size>;
    fn render_page(&self, request: RenderRequest) -> Result<RenderImage>;
    fn words(&self, page_index: usize) -> Result<Vec<Word>>;
    fn search(&self, page_index: usize, query: &str) -> Result<Vec<Rect>>;
    fn rotate(&self, page_index: usize, rotation: Rotation) -> Result<()>;
    fn save(&self, path: &Path) -> Result<()>;

    /// Downcast hook so a writer from the same engine can copy pages out of this document.
    fn as_any(&self) -> &dyn Any;
}

/// A new, initially empty document being assembled from pages of open documents.
pub trait DocumentWriter: Send {
    fn page_count(&self) -> usize;

    /// Appends pages `from..=to` (0-based) of `source`.
    fn insert_range(&mut self, source: &dyn PageGeometryProvider, from: usize, to: usize)
        -> Result<()>;

    fn page_size(&self, page_index: usize) -> Result<Size>;

    /// Scales page content by `scale`, shifts it by the offsets and sets the media box to
    /// `target`.
    fn fit_page(
        &mut self,
        page_index: usize,
        scale: f32,
        offset_x: f32,
        offset_y: f32,
        target: Size,
    ) -> Result<()>;

    fn save(&mut self, path: &Path) -> Result<()>;
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> ViewerResult<Arc<dyn PageGeometryProvider>>;

    fn create(&self) -> Result<Box<dyn DocumentWriter>>;
}
