//! Document engine implementations for the folio viewport core.

pub mod glyphs;
pub mod orient;
pub mod raster;

#[cfg(feature = "pdf")]
mod pdfium;

#[cfg(feature = "pdf")]
pub use pdfium::{PdfiumDocument, PdfiumRenderFactory, PdfiumWriter};

#[cfg(feature = "pdf")]
pub type PdfRenderFactory = PdfiumRenderFactory;
