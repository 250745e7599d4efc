use std::any::Any;
use std::convert::TryFrom;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use folio_core::{
    document_id_for_path, DocumentInfo, DocumentMetadata, DocumentProvider, DocumentWriter,
    PageGeometryProvider, Rect, RenderImage, RenderRequest, Rotation, Size, ViewerError,
    ViewerResult, Word,
};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use tracing::{instrument, warn};

use crate::glyphs::group_glyphs;
use crate::orient::{orient_rect, unrotated_size};
use crate::raster::to_render_image;

const LIBRARY_PATH_ENV: &str = "FOLIO_PDFIUM_PATH";

pub struct PdfiumRenderFactory {
    pdfium: Arc<Pdfium>,
}

impl PdfiumRenderFactory {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumRenderFactory {
    async fn open(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> ViewerResult<Arc<dyn PageGeometryProvider>> {
        let absolute = path
            .canonicalize()
            .map_err(|err| ViewerError::DocumentOpen {
                path: path.to_path_buf(),
                source: anyhow!(err).context("failed to resolve path"),
            })?;
        let document = PdfiumDocument::open(Arc::clone(&self.pdfium), absolute, password)?;
        Ok(Arc::new(document))
    }

    fn create(&self) -> Result<Box<dyn DocumentWriter>> {
        Ok(Box::new(PdfiumWriter::new(Arc::clone(&self.pdfium))?))
    }
}

pub struct PdfiumDocument {
    document: Mutex<PdfDocument<'static>>,
    info: DocumentInfo,
    path: PathBuf,
    _pdfium: Arc<Pdfium>,
}

impl PdfiumDocument {
    #[instrument(skip(pdfium, password))]
    fn open(pdfium: Arc<Pdfium>, path: PathBuf, password: Option<&str>) -> ViewerResult<Self> {
        let document = pdfium
            .load_pdf_from_file(&path, password)
            .map_err(|err| match err {
                PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
                    ViewerError::Authentication { path: path.clone() }
                }
                other => ViewerError::DocumentOpen {
                    path: path.clone(),
                    source: anyhow!("{other:?}"),
                },
            })?;
        // SAFETY: the document borrows the bindings owned by `pdfium`. Fields drop in
        // declaration order, so `document` is dropped before the `Arc<Pdfium>` it borrows from.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        let info = build_document_info(&document, &path);
        Ok(Self {
            document: Mutex::new(document),
            info,
            path,
            _pdfium: pdfium,
        })
    }

    fn with_document<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut PdfDocument<'static>) -> Result<R>,
    {
        let mut guard = self.document.lock();
        f(&mut guard)
    }

    fn with_page<R, F>(&self, page_index: usize, f: F) -> Result<R>
    where
        F: FnOnce(&mut PdfPage<'_>) -> Result<R>,
    {
        self.with_document(|document| {
            let index = page_number(page_index)?;
            let mut page = document
                .pages()
                .get(index)
                .with_context(|| format!("page {} out of range", page_index))?;
            f(&mut page)
        })
    }
}

impl PageGeometryProvider for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page_size(&self, page_index: usize) -> Result<Size> {
        self.with_page(page_index, |page| {
            Ok(Size::new(page.width().value, page.height().value))
        })
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn render_page(&self, request: RenderRequest) -> Result<RenderImage> {
        self.with_page(request.page_index, |page| {
            let config = PdfRenderConfig::new().scale_page_by_factor(request.scale.max(0.1));
            let bitmap = page
                .render_with_config(&config)
                .with_context(|| format!("failed to render page {}", request.page_index))?;
            to_render_image(bitmap.as_image(), request.dark_mode)
        })
    }

    /// Words in top-left units of the displayed page. Characters are grouped on the unrotated
    /// page, where text runs left to right, and the finished words are turned with the page.
    fn words(&self, page_index: usize) -> Result<Vec<Word>> {
        self.with_page(page_index, |page| {
            let (unrotated, rotation) = page_orientation(page);
            let text = page
                .text()
                .with_context(|| format!("failed to extract text for page {}", page_index))?;
            let glyphs: Vec<(char, Rect)> = text
                .chars()
                .iter()
                .filter_map(|ch| {
                    let unicode = ch.unicode_char()?;
                    let bounds = ch.loose_bounds().ok()?;
                    Some((unicode, flip(&bounds, unrotated.height)))
                })
                .collect();
            Ok(group_glyphs(glyphs)
                .into_iter()
                .map(|mut word| {
                    word.bounds = orient_rect(&word.bounds, unrotated, rotation);
                    word
                })
                .collect())
        })
    }

    fn search(&self, page_index: usize, query: &str) -> Result<Vec<Rect>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.with_page(page_index, |page| {
            let (unrotated, rotation) = page_orientation(page);
            let text = page
                .text()
                .with_context(|| format!("failed to extract text for page {}", page_index))?;
            let options = PdfSearchOptions::new();
            let search = text
                .search(query, &options)
                .with_context(|| format!("failed to perform search on page {}", page_index))?;

            let mut boxes = Vec::new();
            while let Some(segments) = search.find_next() {
                for segment in segments.iter() {
                    let rect = orient_rect(
                        &flip(&segment.bounds(), unrotated.height),
                        unrotated,
                        rotation,
                    );
                    if rect.is_valid() {
                        boxes.push(rect);
                    }
                }
            }
            Ok(boxes)
        })
    }

    fn rotate(&self, page_index: usize, rotation: Rotation) -> Result<()> {
        self.with_page(page_index, |page| {
            page.set_rotation(match rotation {
                Rotation::None => PdfPageRenderRotation::None,
                Rotation::Clockwise90 => PdfPageRenderRotation::Degrees90,
                Rotation::Clockwise180 => PdfPageRenderRotation::Degrees180,
                Rotation::Clockwise270 => PdfPageRenderRotation::Degrees270,
            });
            Ok(())
        })
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.with_document(|document| {
            document
                .save_to_file(path)
                .with_context(|| format!("failed to save {:?}", path))
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct PdfiumWriter {
    document: PdfDocument<'static>,
    _pdfium: Arc<Pdfium>,
}

impl PdfiumWriter {
    fn new(pdfium: Arc<Pdfium>) -> Result<Self> {
        let document = pdfium
            .create_new_pdf()
            .map_err(|err| anyhow!("failed to create document: {err:?}"))?;
        // SAFETY: as for `PdfiumDocument`, `document` is declared before and dropped before the
        // bindings it borrows.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(Self {
            document,
            _pdfium: pdfium,
        })
    }

    fn page(&self, page_index: usize) -> Result<PdfPage<'_>> {
        self.document
            .pages()
            .get(page_number(page_index)?)
            .with_context(|| format!("page {} out of range", page_index))
    }
}

impl DocumentWriter for PdfiumWriter {
    fn page_count(&self) -> usize {
        usize::from(self.document.pages().len())
    }

    fn insert_range(
        &mut self,
        source: &dyn PageGeometryProvider,
        from: usize,
        to: usize,
    ) -> Result<()> {
        let source = source
            .as_any()
            .downcast_ref::<PdfiumDocument>()
            .ok_or_else(|| anyhow!("source document was not opened by pdfium"))?;
        let range = page_number(from)?..=page_number(to)?;
        let destination = page_number(self.page_count())?;
        let pages = self.document.pages_mut();
        source.with_document(|src| {
            pages
                .copy_page_range_from_document(src, range, destination)
                .map_err(|err| anyhow!("failed to copy pages {from}..={to}: {err:?}"))
        })
    }

    fn page_size(&self, page_index: usize) -> Result<Size> {
        let page = self.page(page_index)?;
        Ok(Size::new(page.width().value, page.height().value))
    }

    fn fit_page(
        &mut self,
        page_index: usize,
        scale: f32,
        offset_x: f32,
        offset_y: f32,
        target: Size,
    ) -> Result<()> {
        let mut page = self.page(page_index)?;
        page.transform(scale, 0.0, 0.0, scale, offset_x, offset_y)
            .map_err(|err| anyhow!("failed to scale page {page_index}: {err:?}"))?;
        page.boundaries_mut()
            .set_media(PdfRect::new_from_values(0.0, 0.0, target.height, target.width))
            .map_err(|err| anyhow!("failed to resize page {page_index}: {err:?}"))?;
        Ok(())
    }

    fn save(&mut self, path: &Path) -> Result<()> {
        self.document
            .save_to_file(path)
            .map_err(|err| anyhow!("failed to save {:?}: {err:?}", path))
    }
}

fn page_number(page_index: usize) -> Result<PdfPageIndex> {
    PdfPageIndex::try_from(page_index)
        .map_err(|_| anyhow!("page {} is out of supported range", page_index))
}

/// Unrotated page size and the rotation the page is displayed with.
fn page_orientation(page: &PdfPage<'_>) -> (Size, Rotation) {
    let rotation = match page.rotation() {
        Ok(PdfPageRenderRotation::Degrees90) => Rotation::Clockwise90,
        Ok(PdfPageRenderRotation::Degrees180) => Rotation::Clockwise180,
        Ok(PdfPageRenderRotation::Degrees270) => Rotation::Clockwise270,
        Ok(PdfPageRenderRotation::None) => Rotation::None,
        Err(err) => {
            warn!("failed to read page rotation: {:?}", err);
            Rotation::None
        }
    };
    let displayed = Size::new(page.width().value, page.height().value);
    (unrotated_size(displayed, rotation), rotation)
}

/// Engine rectangles grow upwards from the bottom edge; the core's grow downwards from the top.
fn flip(bounds: &PdfRect, page_height: f32) -> Rect {
    Rect::new(
        bounds.left().value,
        page_height - bounds.top().value,
        bounds.right().value,
        page_height - bounds.bottom().value,
    )
}

fn build_document_info(document: &PdfDocument<'_>, path: &Path) -> DocumentInfo {
    let page_count = usize::from(document.pages().len());
    let metadata = document.metadata();
    let tag = |kind| metadata.get(kind).map(|t| t.value().to_owned());

    let keywords = tag(PdfDocumentMetadataTagType::Keywords)
        .map(|value| {
            value
                .split(',')
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    DocumentInfo {
        id: document_id_for_path(path),
        path: path.to_path_buf(),
        page_count,
        metadata: DocumentMetadata {
            title: tag(PdfDocumentMetadataTagType::Title),
            author: tag(PdfDocumentMetadataTagType::Author),
            subject: tag(PdfDocumentMetadataTagType::Subject),
            keywords,
            creator: tag(PdfDocumentMetadataTagType::Creator),
            producer: tag(PdfDocumentMetadataTagType::Producer),
        },
    }
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    let path = std::env::var(LIBRARY_PATH_ENV).ok()?;
    if path.is_empty() {
        return None;
    }
    match Pdfium::bind_to_library(&path) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!("failed to load Pdfium from {LIBRARY_PATH_ENV}={}: {}", path, err);
            None
        }
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => errors.push(format!("{}: {}", cwd_path.display(), err)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; ensure it is installed or set {} ({})",
                LIBRARY_PATH_ENV,
                errors.join(", ")
            ))
        }
    }
}
