//! Splitting multi-page PDFs into single-page units.

use std::sync::Arc;

use folio::utils::is_pdf;
use tempfile::TempPath;
use thiserror::Error;
use tracing::{debug, warn};

use super::document::{InputDocument, PageUnit};

/// Errors from counting or rendering pages.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("Renderer not available: {0}")]
    NotAvailable(String),

    #[error("Failed to count pages: {0}")]
    PageCount(String),

    #[error("Failed to render page {page}: {message}")]
    Render { page: u32, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Counts the pages of a PDF and renders one page into its own document.
pub trait PageRenderer: Send + Sync {
    fn count_pages(&self, document: &InputDocument) -> Result<u32, SplitError>;

    /// Write page `page` (1-based) as a standalone single-page PDF.
    fn extract_page(&self, document: &InputDocument, page: u32) -> Result<TempPath, SplitError>;

    /// Write pages `1..=pages` as single-page PDFs, in page order.
    ///
    /// On failure no rendered file is left behind. Renderers that can open
    /// the document once for every page should override this.
    fn extract_pages(
        &self,
        document: &InputDocument,
        pages: u32,
    ) -> Result<Vec<TempPath>, SplitError> {
        let mut paths = Vec::with_capacity(pages as usize);
        for page in 1..=pages {
            match self.extract_page(document, page) {
                Ok(path) => paths.push(path),
                Err(e) => {
                    discard(paths);
                    return Err(e);
                }
            }
        }
        Ok(paths)
    }
}

/// Produces the units of one document.
#[derive(Clone)]
pub struct PageSplitter {
    renderer: Arc<dyn PageRenderer>,
}

impl PageSplitter {
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        Self { renderer }
    }

    /// Split a document into units in page order.
    ///
    /// Non-PDFs are not opened. A PDF with at most one page is returned as the
    /// sole unit, unmodified. If rendering page k+1 fails, pages 1..=k are
    /// deleted before the error is returned.
    pub fn split<'a>(&self, document: &'a InputDocument) -> Result<Vec<PageUnit<'a>>, SplitError> {
        if !is_pdf(document.mime_type()) {
            debug!("Not a PDF ({}), no split", document.mime_type());
            return Ok(vec![PageUnit::original(document)]);
        }

        let pages = self.renderer.count_pages(document)?;
        if pages <= 1 {
            debug!("PDF has {} page(s), no split", pages);
            return Ok(vec![PageUnit::original(document)]);
        }

        debug!("Splitting PDF into {} pages", pages);
        let paths = self.renderer.extract_pages(document, pages)?;
        Ok((1..).zip(paths).map(|(page, path)| PageUnit::artifact(page, path)).collect())
    }
}

/// Delete rendered pages that will not be handed out.
pub(crate) fn discard(paths: Vec<TempPath>) {
    for path in paths {
        let shown = path.display().to_string();
        if let Err(e) = path.close() {
            warn!("Failed to delete rendered page {}: {}", shown, e);
        }
    }
}

/// Release every unit, ignoring individual failures.
///
/// Returns the number of units whose release failed.
pub(crate) fn release_all<'a, I>(units: I) -> usize
where
    I: IntoIterator<Item = PageUnit<'a>>,
{
    let mut failures = 0;
    for unit in units {
        let index = unit.index();
        if let Err(e) = unit.release() {
            warn!("Failed to delete rendered page {}: {}", index, e);
            failures += 1;
        }
    }
    failures
}
