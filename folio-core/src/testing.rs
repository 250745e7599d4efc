//! In-memory document engine shared by the unit tests.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;

use crate::error::{ViewerError, ViewerResult};
use crate::geometry::{Rect, Size};
use crate::provider::{
    document_id_for_path, DocumentInfo, DocumentMetadata, DocumentProvider, DocumentWriter,
    PageGeometryProvider, RenderImage, RenderRequest, Rotation,
};
use crate::words::Word;

pub const PAPER: [u8; 4] = [255, 255, 255, 255];
pub const NIGHT: [u8; 4] = [0, 0, 0, 255];

pub struct FakeDocument {
    info: DocumentInfo,
    sizes: Vec<Size>,
    words: Vec<Vec<Word>>,
    failing: HashSet<usize>,
    rotations: Mutex<HashMap<usize, Rotation>>,
    delay: Option<Duration>,
    renders: AtomicUsize,
    word_queries: AtomicUsize,
}

impl FakeDocument {
    pub fn new(path: impl Into<PathBuf>, sizes: Vec<Size>) -> Self {
        let path = path.into();
        let words = vec![Vec::new(); sizes.len()];
        Self {
            info: DocumentInfo {
                id: document_id_for_path(&path),
                path,
                page_count: sizes.len(),
                metadata: DocumentMetadata {
                    title: Some("Fixture".into()),
                    ..DocumentMetadata::default()
                },
            },
            sizes,
            words,
            failing: HashSet::new(),
            rotations: Mutex::new(HashMap::new()),
            delay: None,
            renders: AtomicUsize::new(0),
            word_queries: AtomicUsize::new(0),
        }
    }

    /// Three pages 300 wide and 200/300/250 tall.
    pub fn three_pages(path: impl Into<PathBuf>) -> Self {
        Self::new(
            path,
            vec![
                Size::new(300.0, 200.0),
                Size::new(300.0, 300.0),
                Size::new(300.0, 250.0),
            ],
        )
    }

    pub fn with_words(mut self, page_index: usize, words: Vec<Word>) -> Self {
        self.words[page_index] = words;
        self
    }

    pub fn failing_on(mut self, page_index: usize) -> Self {
        self.failing.insert(page_index);
        self
    }

    /// Every render blocks the calling thread for `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Render attempts, failed ones included.
    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn word_queries(&self) -> usize {
        self.word_queries.load(Ordering::SeqCst)
    }

    pub fn rotation(&self, page_index: usize) -> Rotation {
        self.rotations
            .lock()
            .get(&page_index)
            .copied()
            .unwrap_or(Rotation::None)
    }

    fn check(&self, page_index: usize) -> Result<()> {
        if page_index >= self.sizes.len() {
            return Err(anyhow!("page {page_index} out of range"));
        }
        if self.failing.contains(&page_index) {
            return Err(anyhow!("page {page_index} is damaged"));
        }
        Ok(())
    }
}

impl PageGeometryProvider for FakeDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page_size(&self, page_index: usize) -> Result<Size> {
        let size = *self
            .sizes
            .get(page_index)
            .ok_or_else(|| anyhow!("page {page_index} out of range"))?;
        Ok(match self.rotation(page_index) {
            Rotation::Clockwise90 | Rotation::Clockwise270 => Size::new(size.height, size.width),
            Rotation::None | Rotation::Clockwise180 => size,
        })
    }

    fn render_page(&self, request: RenderRequest) -> Result<RenderImage> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.check(request.page_index)?;
        let size = self.page_size(request.page_index)?.scaled(request.scale);
        let paper = if request.dark_mode { NIGHT } else { PAPER };
        Ok(RenderImage::blank(
            size.width.round() as u32,
            size.height.round() as u32,
            paper,
        ))
    }

    fn words(&self, page_index: usize) -> Result<Vec<Word>> {
        self.check(page_index)?;
        self.word_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.words[page_index].clone())
    }

    fn search(&self, page_index: usize, query: &str) -> Result<Vec<Rect>> {
        self.check(page_index)?;
        let needle = query.to_lowercase();
        Ok(self.words[page_index]
            .iter()
            .filter(|word| word.text.to_lowercase().contains(&needle))
            .map(|word| word.bounds)
            .collect())
    }

    fn rotate(&self, page_index: usize, rotation: Rotation) -> Result<()> {
        self.check(page_index)?;
        self.rotations.lock().insert(page_index, rotation);
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, format!("fake document, {} pages", self.sizes.len()))?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// What a [`FakeWriter`] produced, recorded on save.
#[derive(Debug, Clone, Default)]
pub struct WrittenDocument {
    pub path: PathBuf,
    pub pages: Vec<(PathBuf, usize)>,
    pub sizes: Vec<Size>,
    pub fits: Vec<(usize, f32, f32, f32)>,
}

pub struct FakeWriter {
    current: WrittenDocument,
    log: Arc<Mutex<Vec<WrittenDocument>>>,
}

impl DocumentWriter for FakeWriter {
    fn page_count(&self) -> usize {
        self.current.pages.len()
    }

    fn insert_range(
        &mut self,
        source: &dyn PageGeometryProvider,
        from: usize,
        to: usize,
    ) -> Result<()> {
        let source = source
            .as_any()
            .downcast_ref::<FakeDocument>()
            .ok_or_else(|| anyhow!("foreign document"))?;
        for page_index in from..=to {
            let size = source.page_size(page_index)?;
            self.current
                .pages
                .push((source.info().path.clone(), page_index));
            self.current.sizes.push(size);
        }
        Ok(())
    }

    fn page_size(&self, page_index: usize) -> Result<Size> {
        self.current
            .sizes
            .get(page_index)
            .copied()
            .ok_or_else(|| anyhow!("page {page_index} out of range"))
    }

    fn fit_page(
        &mut self,
        page_index: usize,
        scale: f32,
        offset_x: f32,
        offset_y: f32,
        target: Size,
    ) -> Result<()> {
        let slot = self
            .current
            .sizes
            .get_mut(page_index)
            .ok_or_else(|| anyhow!("page {page_index} out of range"))?;
        *slot = target;
        self.current
            .fits
            .push((page_index, scale, offset_x, offset_y));
        Ok(())
    }

    fn save(&mut self, path: &Path) -> Result<()> {
        std::fs::write(path, format!("fake document, {} pages", self.page_count()))?;
        self.current.path = path.to_path_buf();
        self.log.lock().push(self.current.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeProvider {
    documents: Mutex<HashMap<PathBuf, Arc<FakeDocument>>>,
    password: Option<String>,
    written: Arc<Mutex<Vec<WrittenDocument>>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_password(password: &str) -> Self {
        Self {
            password: Some(password.to_owned()),
            ..Self::default()
        }
    }

    pub fn register(&self, document: FakeDocument) -> Arc<FakeDocument> {
        let document = Arc::new(document);
        self.documents
            .lock()
            .insert(document.info().path.clone(), Arc::clone(&document));
        document
    }

    pub fn written(&self) -> Vec<WrittenDocument> {
        self.written.lock().clone()
    }
}

#[async_trait::async_trait]
impl DocumentProvider for FakeProvider {
    async fn open(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> ViewerResult<Arc<dyn PageGeometryProvider>> {
        if let Some(expected) = &self.password {
            if password != Some(expected.as_str()) {
                return Err(ViewerError::Authentication {
                    path: path.to_path_buf(),
                });
            }
        }
        let document = self.documents.lock().get(path).cloned().ok_or_else(|| {
            ViewerError::DocumentOpen {
                path: path.to_path_buf(),
                source: anyhow!("no such document"),
            }
        })?;
        Ok(document)
    }

    fn create(&self) -> Result<Box<dyn DocumentWriter>> {
        Ok(Box::new(FakeWriter {
            current: WrittenDocument::default(),
            log: Arc::clone(&self.written),
        }))
    }
}
