//! Whole-document operations driven by page ranges: export, rotate, split, merge and print
//! preparation. Each produces a new file; the source documents are only read, except for
//! rotation which applies to the open document before it is saved.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::error::ViewerError;
use crate::geometry::Size;
use crate::page_range::PageRangeSet;
use crate::print_fit::fit;
use crate::provider::{DocumentMetadata, DocumentProvider, PageGeometryProvider, Rotation};

/// Writes the selected pages of `source`, in ascending order, to `output`.
#[instrument(skip(provider, source, pages), fields(count = pages.len()))]
pub fn export_pages(
    provider: &dyn DocumentProvider,
    source: &dyn PageGeometryProvider,
    pages: &PageRangeSet,
    output: &Path,
) -> Result<usize> {
    let mut writer = provider.create()?;
    for run in pages.runs() {
        writer
            .insert_range(source, *run.start(), *run.end())
            .with_context(|| format!("failed to copy pages {:?}", run))?;
    }
    writer
        .save(output)
        .with_context(|| format!("failed to write {:?}", output))?;
    info!(pages = writer.page_count(), "exported pages");
    Ok(writer.page_count())
}

/// Sets an absolute rotation on the selected pages and saves the document to `output`.
#[instrument(skip(source, pages), fields(count = pages.len()))]
pub fn rotate_pages(
    source: &dyn PageGeometryProvider,
    pages: &PageRangeSet,
    rotation: Rotation,
    output: &Path,
) -> Result<()> {
    for page_index in pages.iter() {
        source
            .rotate(page_index, rotation)
            .map_err(|err| ViewerError::provider(page_index, err))?;
    }
    source
        .save(output)
        .with_context(|| format!("failed to write {:?}", output))
}

/// `<stem>_page_<n>.pdf` with `n` 1-based.
pub fn split_file_name(source_path: &Path, page_index: usize) -> String {
    let stem = source_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_owned());
    format!("{stem}_page_{}.pdf", page_index + 1)
}

/// Writes every page of `source` into its own file inside `out_dir`.
#[instrument(skip(provider, source))]
pub fn split_document(
    provider: &dyn DocumentProvider,
    source: &dyn PageGeometryProvider,
    out_dir: &Path,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output directory {:?}", out_dir))?;

    let source_path = &source.info().path;
    let mut written = Vec::with_capacity(source.page_count());
    for page_index in 0..source.page_count() {
        let output = out_dir.join(split_file_name(source_path, page_index));
        let mut writer = provider.create()?;
        writer.insert_range(source, page_index, page_index)?;
        writer
            .save(&output)
            .with_context(|| format!("failed to write {:?}", output))?;
        written.push(output);
    }
    info!(files = written.len(), "split document");
    Ok(written)
}

/// Concatenates whole documents in the given order.
#[instrument(skip(provider, sources), fields(count = sources.len()))]
pub fn merge_documents(
    provider: &dyn DocumentProvider,
    sources: &[Arc<dyn PageGeometryProvider>],
    output: &Path,
) -> Result<usize> {
    if sources.len() < 2 {
        return Err(ViewerError::NotEnoughDocuments {
            count: sources.len(),
        }
        .into());
    }
    let mut writer = provider.create()?;
    for source in sources {
        let Some(last) = source.page_count().checked_sub(1) else {
            continue;
        };
        writer
            .insert_range(source.as_ref(), 0, last)
            .with_context(|| format!("failed to append {:?}", source.info().path))?;
    }
    writer
        .save(output)
        .with_context(|| format!("failed to write {:?}", output))?;
    Ok(writer.page_count())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintPreparation {
    pub pages: usize,
    pub fitted: usize,
}

/// Copies the selected pages into a print-ready document. With `fit_to_page`, every page
/// larger than `target` is shrunk uniformly and centred on a `target`-sized page.
#[instrument(skip(provider, source, pages), fields(count = pages.len()))]
pub fn prepare_print(
    provider: &dyn DocumentProvider,
    source: &dyn PageGeometryProvider,
    pages: &PageRangeSet,
    fit_to_page: bool,
    target: Size,
    output: &Path,
) -> Result<PrintPreparation> {
    let mut writer = provider.create()?;
    for run in pages.runs() {
        writer.insert_range(source, *run.start(), *run.end())?;
    }

    let mut fitted = 0;
    if fit_to_page {
        for page_index in 0..writer.page_count() {
            let size = writer.page_size(page_index)?;
            let transform = fit(size, target);
            if transform.is_identity() {
                continue;
            }
            writer.fit_page(
                page_index,
                transform.scale,
                transform.offset_x,
                transform.offset_y,
                target,
            )?;
            fitted += 1;
        }
    }

    writer
        .save(output)
        .with_context(|| format!("failed to write {:?}", output))?;
    Ok(PrintPreparation {
        pages: writer.page_count(),
        fitted,
    })
}

#[derive(Debug, Clone)]
pub struct DocumentSummary {
    pub path: PathBuf,
    pub page_count: usize,
    pub file_size: u64,
    pub metadata: DocumentMetadata,
}

impl DocumentSummary {
    pub fn of(source: &dyn PageGeometryProvider) -> Result<Self> {
        let info = source.info();
        let file_size = fs::metadata(&info.path)
            .with_context(|| format!("failed to stat {:?}", info.path))?
            .len();
        Ok(Self {
            path: info.path.clone(),
            page_count: info.page_count,
            file_size,
            metadata: info.metadata.clone(),
        })
    }

    /// Human-readable lines, `N/A` for missing fields.
    pub fn lines(&self) -> Vec<String> {
        fn or_na(value: &Option<String>) -> &str {
            value.as_deref().unwrap_or("N/A")
        }
        let keywords = if self.metadata.keywords.is_empty() {
            "N/A".to_owned()
        } else {
            self.metadata.keywords.join(", ")
        };
        vec![
            format!("Title: {}", or_na(&self.metadata.title)),
            format!("Author: {}", or_na(&self.metadata.author)),
            format!("Subject: {}", or_na(&self.metadata.subject)),
            format!("Keywords: {keywords}"),
            format!("Creator: {}", or_na(&self.metadata.creator)),
            format!("Producer: {}", or_na(&self.metadata.producer)),
            format!("Pages: {}", self.page_count),
            format!("File size: {:.1} KB", self.file_size as f64 / 1024.0),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_range::parse_page_range;
    use crate::print_fit::A4;
    use crate::testing::{FakeDocument, FakeProvider};
    use tempfile::tempdir;

    #[test]
    fn export_copies_runs_in_order() {
        let dir = tempdir().unwrap();
        let provider = FakeProvider::new();
        let doc = provider.register(FakeDocument::new(
            "/docs/long.pdf",
            vec![Size::new(100.0, 100.0); 6],
        ));
        let pages = parse_page_range("5,1-2,4", 6).unwrap();
        let output = dir.path().join("out.pdf");

        let count = export_pages(&provider, &*doc, &pages, &output).unwrap();
        assert_eq!(count, 4);
        let written = provider.written();
        let copied: Vec<usize> = written[0].pages.iter().map(|(_, page)| *page).collect();
        assert_eq!(copied, vec![0, 1, 3, 4]);
        assert!(output.exists());
    }

    #[test]
    fn split_names_files_after_the_source() {
        let dir = tempdir().unwrap();
        let provider = FakeProvider::new();
        let doc = provider.register(FakeDocument::three_pages("/docs/report.final.pdf"));

        let files = split_document(&provider, &*doc, &dir.path().join("parts")).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "report.final_page_1.pdf",
                "report.final_page_2.pdf",
                "report.final_page_3.pdf",
            ]
        );
        assert!(files.iter().all(|path| path.exists()));
    }

    #[test]
    fn merge_needs_two_documents() {
        let dir = tempdir().unwrap();
        let provider = FakeProvider::new();
        let a: Arc<dyn PageGeometryProvider> =
            provider.register(FakeDocument::three_pages("/docs/a.pdf"));
        let b: Arc<dyn PageGeometryProvider> =
            provider.register(FakeDocument::new("/docs/b.pdf", vec![Size::new(10.0, 10.0)]));
        let output = dir.path().join("merged.pdf");

        let err = merge_documents(&provider, &[Arc::clone(&a)], &output).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ViewerError>(),
            Some(ViewerError::NotEnoughDocuments { count: 1 })
        ));

        let count = merge_documents(&provider, &[a, b], &output).unwrap();
        assert_eq!(count, 4);
    }

    #[test]
    fn print_preparation_fits_only_oversized_pages() {
        let dir = tempdir().unwrap();
        let provider = FakeProvider::new();
        let doc = provider.register(FakeDocument::new(
            "/docs/mixed.pdf",
            vec![Size::new(800.0, 400.0), Size::new(300.0, 400.0)],
        ));
        let output = dir.path().join("print.pdf");

        let prepared = prepare_print(
            &provider,
            &*doc,
            &PageRangeSet::all(2),
            true,
            A4,
            &output,
        )
        .unwrap();
        assert_eq!(prepared, PrintPreparation { pages: 2, fitted: 1 });

        let written = &provider.written()[0];
        assert_eq!(written.sizes, vec![A4, Size::new(300.0, 400.0)]);
        let (page, scale, offset_x, offset_y) = written.fits[0];
        assert_eq!(page, 0);
        assert!((scale - 0.74375).abs() < 1e-6);
        assert!(offset_x.abs() < 1e-4);
        assert!((offset_y - 272.25).abs() < 1e-3);
    }

    #[test]
    fn rotation_is_saved_to_the_output() {
        let dir = tempdir().unwrap();
        let doc = FakeDocument::three_pages("/docs/turn.pdf");
        let output = dir.path().join("turned.pdf");
        let pages = parse_page_range("2-3", 3).unwrap();

        rotate_pages(&doc, &pages, Rotation::Clockwise270, &output).unwrap();
        assert_eq!(doc.rotation(0), Rotation::None);
        assert_eq!(doc.rotation(2), Rotation::Clockwise270);
        assert!(output.exists());
    }

    #[test]
    fn summary_reports_metadata_and_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("info.pdf");
        fs::write(&path, vec![0u8; 2048]).unwrap();
        let doc = FakeDocument::three_pages(path.clone());

        let summary = DocumentSummary::of(&doc).unwrap();
        let lines = summary.lines();
        assert_eq!(lines[0], "Title: Fixture");
        assert_eq!(lines[1], "Author: N/A");
        assert_eq!(lines[6], "Pages: 3");
        assert_eq!(lines[7], "File size: 2.0 KB");
    }
}
