//! Viewport core of the folio document viewer.
//!
//! Pages of arbitrary sizes are stacked into one scrollable document space. Pointer input in
//! that space is mapped back onto the engine's word boxes for drag selection, and highlights
//! are composited onto cached page rasters without going back to the engine.

pub mod arena;
pub mod background;
pub mod config;
pub mod coords;
pub mod error;
pub mod geometry;
pub mod highlight;
pub mod layout;
pub mod page_range;
pub mod pages;
pub mod print_fit;
pub mod provider;
pub mod search;
pub mod selection;
pub mod session;
pub mod viewer;
pub mod words;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{
    AppDirs, FileSettingsStore, MemorySettingsStore, Settings, SettingsStore, ViewerConfig,
};
pub use error::{ViewerError, ViewerResult};
pub use geometry::{Point, Rect, Size};
pub use layout::{DocumentLayout, PageLayoutEntry, ScaleMode};
pub use page_range::{parse_page_range, PageRangeSet};
pub use print_fit::{fit, FitTransform, A4};
pub use provider::{
    document_id_for_path, DocumentId, DocumentInfo, DocumentMetadata, DocumentProvider,
    DocumentWriter, PageGeometryProvider, RenderImage, RenderRequest, Rotation,
};
pub use session::{Command, Session, SessionEvent};
pub use viewer::Viewer;
pub use words::Word;
