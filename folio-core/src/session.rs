use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{info, instrument};

use crate::config::ViewerConfig;
use crate::error::ViewerResult;
use crate::geometry::Size;
use crate::layout::ScaleMode;
use crate::page_range::PageRangeSet;
use crate::provider::{DocumentId, DocumentProvider, Rotation};
use crate::viewer::Viewer;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    NextPage { count: usize },
    PrevPage { count: usize },
    GotoPage { page: usize },
    ScrollBy { dx: f32, dy: f32 },
    ZoomIn,
    ZoomOut,
    FitWidth,
    Resize { width: f32, height: f32 },
    ToggleDarkMode,
    Search { query: String },
    SearchNext,
    ClearSelection,
    /// Absolute rotation for a 1-based page range, or the current page when `pages` is `None`.
    Rotate {
        pages: Option<String>,
        rotation: Rotation,
    },
    SwitchDocument { index: usize },
    CloseDocument { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    DocumentOpened(DocumentId),
    DocumentClosed(DocumentId),
    ActiveDocumentChanged(DocumentId),
    RedrawNeeded(DocumentId),
    SearchMissed(DocumentId),
}

/// The open documents ("tabs") and which one receives input.
pub struct Session {
    viewers: Vec<Viewer>,
    active: usize,
    config: ViewerConfig,
    viewport: Size,
    dark_mode: bool,
    runtime: Option<Handle>,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Session {
    pub fn new(config: ViewerConfig, viewport: Size, dark_mode: bool) -> Self {
        Self {
            viewers: Vec::new(),
            active: 0,
            config,
            viewport,
            dark_mode,
            runtime: None,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Viewers opened afterwards rasterize on a background worker on `handle`.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn events(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn take_events(&self) -> Vec<SessionEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    fn emit(&self, event: SessionEvent) {
        self.events.lock().push(event);
    }

    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active(&self) -> Option<&Viewer> {
        self.viewers.get(self.active)
    }

    pub fn active_mut(&mut self) -> Option<&mut Viewer> {
        self.viewers.get_mut(self.active)
    }

    pub fn viewers(&self) -> &[Viewer] {
        &self.viewers
    }

    pub fn dark_mode(&self) -> bool {
        self.dark_mode
    }

    #[instrument(skip(self, provider, password))]
    pub async fn open_with<P: DocumentProvider + ?Sized>(
        &mut self,
        provider: &P,
        path: PathBuf,
        password: Option<&str>,
    ) -> ViewerResult<DocumentId> {
        let document = provider.open(&path, password).await?;
        let mut viewer = Viewer::new(document, self.config.clone(), self.viewport, self.dark_mode)?;
        if let Some(handle) = &self.runtime {
            viewer.attach_scheduler(handle);
        }
        let id = viewer.info().id;
        info!(pages = viewer.page_count(), "document opened");

        self.viewers.push(viewer);
        self.active = self.viewers.len() - 1;
        self.emit(SessionEvent::DocumentOpened(id));
        self.emit(SessionEvent::ActiveDocumentChanged(id));
        Ok(id)
    }

    pub fn apply(&mut self, command: Command) -> ViewerResult<()> {
        match command {
            Command::SwitchDocument { index } => {
                if index < self.viewers.len() && index != self.active {
                    self.active = index;
                    let id = self.viewers[index].info().id;
                    self.emit(SessionEvent::ActiveDocumentChanged(id));
                }
            }
            Command::CloseDocument { index } => {
                if index >= self.viewers.len() {
                    return Ok(());
                }
                let mut viewer = self.viewers.remove(index);
                viewer.close();
                self.emit(SessionEvent::DocumentClosed(viewer.info().id));
                if self.viewers.is_empty() {
                    self.active = 0;
                } else if self.active >= self.viewers.len() || index == self.active {
                    self.active = self.active.min(self.viewers.len() - 1);
                    let id = self.viewers[self.active].info().id;
                    self.emit(SessionEvent::ActiveDocumentChanged(id));
                } else if index < self.active {
                    self.active -= 1;
                }
            }
            Command::Resize { width, height } => {
                self.viewport = Size::new(width, height);
                for viewer in &mut self.viewers {
                    viewer.resize_viewport(width, height)?;
                }
                if let Some(id) = self.active().map(|viewer| viewer.info().id) {
                    self.emit(SessionEvent::RedrawNeeded(id));
                }
            }
            Command::ToggleDarkMode => {
                self.dark_mode = !self.dark_mode;
                let dark_mode = self.dark_mode;
                for viewer in &mut self.viewers {
                    viewer.set_dark_mode(dark_mode);
                }
                if let Some(id) = self.active().map(|viewer| viewer.info().id) {
                    self.emit(SessionEvent::RedrawNeeded(id));
                }
            }
            command => self.apply_to_active(command)?,
        }
        Ok(())
    }

    fn apply_to_active(&mut self, command: Command) -> ViewerResult<()> {
        let Some(viewer) = self.viewers.get_mut(self.active) else {
            return Ok(());
        };
        let id = viewer.info().id;
        let before = (viewer.viewport().scroll_x, viewer.viewport().scroll_y, viewer.scale());

        let mut redraw = false;
        let mut missed = false;
        match command {
            Command::NextPage { count } => {
                let target = viewer.current_page().saturating_add(count);
                viewer.scroll_to(target);
            }
            Command::PrevPage { count } => {
                let target = viewer.current_page().saturating_sub(count);
                viewer.scroll_to(target);
            }
            Command::GotoPage { page } => viewer.scroll_to(page),
            Command::ScrollBy { dx, dy } => viewer.scroll_by(dx, dy),
            Command::ZoomIn => {
                viewer.zoom_in()?;
            }
            Command::ZoomOut => {
                viewer.zoom_out()?;
            }
            Command::FitWidth => {
                viewer.set_scale(ScaleMode::FitWidth)?;
                redraw = true;
            }
            Command::Search { query } => {
                missed = !viewer.search(&query)?;
                redraw = true;
            }
            Command::SearchNext => {
                missed = !viewer.search_next()?;
                redraw = true;
            }
            Command::ClearSelection => {
                viewer.clear_selection();
                redraw = true;
            }
            Command::Rotate { pages, rotation } => {
                let pages = match pages {
                    Some(spec) => viewer.parse_page_range(&spec)?,
                    None => {
                        let page = viewer.current_page() + 1;
                        PageRangeSet::span(page, page, viewer.page_count())?
                    }
                };
                viewer.rotate_pages(&pages, rotation)?;
                redraw = true;
            }
            Command::SwitchDocument { .. }
            | Command::CloseDocument { .. }
            | Command::Resize { .. }
            | Command::ToggleDarkMode => return Ok(()),
        }

        let after = (viewer.viewport().scroll_x, viewer.viewport().scroll_y, viewer.scale());
        if missed {
            self.emit(SessionEvent::SearchMissed(id));
        }
        if redraw || before != after {
            self.emit(SessionEvent::RedrawNeeded(id));
        }
        Ok(())
    }

    /// Closes every viewer, cancelling their background work.
    pub fn close_all(&mut self) {
        for mut viewer in self.viewers.drain(..) {
            viewer.close();
            self.events
                .lock()
                .push(SessionEvent::DocumentClosed(viewer.info().id));
        }
        self.active = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViewerError;
    use crate::geometry::Rect;
    use crate::testing::{FakeDocument, FakeProvider};
    use crate::words::Word;

    fn provider() -> FakeProvider {
        let provider = FakeProvider::new();
        provider.register(FakeDocument::three_pages("/docs/a.pdf"));
        provider.register(
            FakeDocument::three_pages("/docs/b.pdf")
                .with_words(2, vec![Word::new("needle", Rect::new(1.0, 1.0, 9.0, 9.0))]),
        );
        provider
    }

    fn session() -> Session {
        Session::new(ViewerConfig::default(), Size::new(340.0, 100.0), false)
    }

    #[tokio::test]
    async fn session_navigation_scrolls_the_active_viewer() {
        let provider = provider();
        let mut session = session();
        session
            .open_with(&provider, PathBuf::from("/docs/a.pdf"), None)
            .await
            .unwrap();

        session.apply(Command::NextPage { count: 1 }).unwrap();
        assert_eq!(session.active().unwrap().current_page(), 1);
        session.apply(Command::NextPage { count: 10 }).unwrap();
        assert_eq!(session.active().unwrap().current_page(), 2);
        session.apply(Command::PrevPage { count: 5 }).unwrap();
        assert_eq!(session.active().unwrap().current_page(), 0);
        session.apply(Command::GotoPage { page: 150 }).unwrap();
        assert_eq!(session.active().unwrap().current_page(), 2);

        let events = session.take_events();
        let id = session.active().unwrap().info().id;
        assert_eq!(events[0], SessionEvent::DocumentOpened(id));
        assert_eq!(events[1], SessionEvent::ActiveDocumentChanged(id));
        assert!(events[2..]
            .iter()
            .all(|event| *event == SessionEvent::RedrawNeeded(id)));
    }

    #[tokio::test]
    async fn open_failures_surface_as_viewer_errors() {
        let provider = FakeProvider::with_password("secret");
        provider.register(FakeDocument::three_pages("/docs/locked.pdf"));
        let mut session = session();

        let err = session
            .open_with(&provider, PathBuf::from("/docs/locked.pdf"), Some("nope"))
            .await
            .unwrap_err();
        assert!(err.is_recoverable_auth());

        session
            .open_with(&provider, PathBuf::from("/docs/locked.pdf"), Some("secret"))
            .await
            .unwrap();

        let err = session
            .open_with(&provider, PathBuf::from("/docs/none.pdf"), Some("secret"))
            .await
            .unwrap_err();
        assert!(matches!(err, ViewerError::DocumentOpen { .. }));
        assert_eq!(session.len(), 1);
    }

    #[tokio::test]
    async fn switching_and_closing_tabs() {
        let provider = provider();
        let mut session = session();
        let a = session
            .open_with(&provider, PathBuf::from("/docs/a.pdf"), None)
            .await
            .unwrap();
        let b = session
            .open_with(&provider, PathBuf::from("/docs/b.pdf"), None)
            .await
            .unwrap();
        assert_eq!(session.active_index(), 1);
        session.take_events();

        session.apply(Command::SwitchDocument { index: 0 }).unwrap();
        assert_eq!(session.active().unwrap().info().id, a);

        session.apply(Command::CloseDocument { index: 0 }).unwrap();
        assert_eq!(session.len(), 1);
        assert_eq!(session.active().unwrap().info().id, b);

        let events = session.take_events();
        assert_eq!(
            events,
            vec![
                SessionEvent::ActiveDocumentChanged(a),
                SessionEvent::DocumentClosed(a),
                SessionEvent::ActiveDocumentChanged(b),
            ]
        );

        session.close_all();
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn search_misses_are_reported() {
        let provider = provider();
        let mut session = session();
        let b = session
            .open_with(&provider, PathBuf::from("/docs/b.pdf"), None)
            .await
            .unwrap();
        session.take_events();

        session
            .apply(Command::Search {
                query: "needle".into(),
            })
            .unwrap();
        assert_eq!(session.active().unwrap().current_page(), 2);
        session
            .apply(Command::Search {
                query: "absent".into(),
            })
            .unwrap();

        let events = session.take_events();
        assert!(events.contains(&SessionEvent::SearchMissed(b)));
    }

    #[tokio::test]
    async fn rotate_command_rejects_bad_ranges() {
        let provider = provider();
        let mut session = session();
        session
            .open_with(&provider, PathBuf::from("/docs/a.pdf"), None)
            .await
            .unwrap();
        let err = session
            .apply(Command::Rotate {
                pages: Some("1-9".into()),
                rotation: Rotation::Clockwise90,
            })
            .unwrap_err();
        assert!(matches!(err, ViewerError::InvalidRangeSpec { .. }));
        session
            .apply(Command::Rotate {
                pages: Some("1".into()),
                rotation: Rotation::Clockwise180,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn rotate_without_range_turns_the_current_page() {
        let provider = provider();
        let mut session = session();
        session
            .open_with(&provider, PathBuf::from("/docs/a.pdf"), None)
            .await
            .unwrap();
        session.apply(Command::GotoPage { page: 2 }).unwrap();
        assert_eq!(session.active().unwrap().current_page(), 2);
        session
            .apply(Command::Rotate {
                pages: None,
                rotation: Rotation::Clockwise90,
            })
            .unwrap();
        let layout = session.active().unwrap().layout();
        assert!(layout.entry(2).height > layout.entry(2).width);
        assert!(layout.entry(0).width > layout.entry(0).height);
    }
}
