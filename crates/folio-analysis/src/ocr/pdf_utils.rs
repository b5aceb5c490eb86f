//! PDF page counting and single-page extraction.
//!
//! Two renderers are available:
//! - [`LopdfRenderer`]: in-process, no external binaries
//! - [`PopplerRenderer`]: `pdfinfo` and `pdfseparate` from poppler-utils

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::process::Command;

use lopdf::{dictionary, Dictionary, Object, ObjectId};
use tempfile::{NamedTempFile, TempPath};
use tracing::debug;

use super::document::{DocumentContent, InputDocument};
use super::splitter::{discard, PageRenderer, SplitError};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITED_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

const POPPLER_NOT_FOUND: &str =
    "pdfinfo/pdfseparate not found. Install poppler-utils (apt install poppler-utils)";

/// Create an empty temporary file for one rendered page.
fn page_file(page: u32) -> Result<NamedTempFile, SplitError> {
    Ok(tempfile::Builder::new()
        .prefix(&format!("folio-page-{}-", page))
        .suffix(".pdf")
        .tempfile()?)
}

/// Splits PDFs in-process with lopdf.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfRenderer;

impl LopdfRenderer {
    pub fn new() -> Self {
        Self
    }

    fn load(document: &InputDocument) -> Result<lopdf::Document, String> {
        match document.content() {
            DocumentContent::Bytes(bytes) => lopdf::Document::load_mem(bytes),
            DocumentContent::File(path) => lopdf::Document::load(path),
        }
        .map_err(|e| e.to_string())
    }
}

impl PageRenderer for LopdfRenderer {
    fn count_pages(&self, document: &InputDocument) -> Result<u32, SplitError> {
        let pdf = Self::load(document).map_err(SplitError::PageCount)?;
        Ok(pdf.get_pages().len() as u32)
    }

    fn extract_page(&self, document: &InputDocument, page: u32) -> Result<TempPath, SplitError> {
        let pdf = Self::load(document).map_err(|message| SplitError::Render { page, message })?;
        write_page(&pdf, page)
    }

    fn extract_pages(
        &self,
        document: &InputDocument,
        pages: u32,
    ) -> Result<Vec<TempPath>, SplitError> {
        let pdf = Self::load(document).map_err(|message| SplitError::Render { page: 1, message })?;

        let mut paths = Vec::with_capacity(pages as usize);
        for page in 1..=pages {
            match write_page(&pdf, page) {
                Ok(path) => paths.push(path),
                Err(e) => {
                    discard(paths);
                    return Err(e);
                }
            }
        }
        debug!("Rendered {} pages from one parse", pages);
        Ok(paths)
    }
}

/// Write page `page` of a parsed PDF to its own temporary file.
fn write_page(pdf: &lopdf::Document, page: u32) -> Result<TempPath, SplitError> {
    let render_err = |message: String| SplitError::Render { page, message };

    let pages = pdf.get_pages();
    let page_id = *pages.get(&page).ok_or_else(|| {
        render_err(format!("page out of range (document has {})", pages.len()))
    })?;

    let mut single = single_page(pdf, page_id).map_err(|e| render_err(e.to_string()))?;
    let mut file = page_file(page)?;
    single
        .save_to(&mut file)
        .map_err(|e| render_err(e.to_string()))?;
    file.flush()?;

    Ok(file.into_temp_path())
}

/// Copy one page, and only the objects it references, into a new document.
///
/// Object ids are kept, so references inside copied objects stay valid.
/// Attributes the page inherits from the page tree are set on the page itself.
fn single_page(pdf: &lopdf::Document, page_id: ObjectId) -> lopdf::Result<lopdf::Document> {
    let mut page = pdf.get_dictionary(page_id)?.clone();
    for key in INHERITED_KEYS {
        if !page.has(key) {
            if let Some(value) = inherited(pdf, &page, key) {
                page.set(key.to_vec(), value);
            }
        }
    }
    page.remove(b"Parent");

    let mut out = lopdf::Document::with_version(pdf.version.clone());
    out.max_id = pdf.max_id;

    let mut pending = Vec::new();
    collect_refs(&Object::Dictionary(page.clone()), &mut pending);
    let mut seen = HashSet::from([page_id]);
    while let Some(id) = pending.pop() {
        if !seen.insert(id) {
            continue;
        }
        // Dangling references are written as-is; readers treat them as null.
        if let Ok(object) = pdf.get_object(id) {
            collect_refs(object, &mut pending);
            out.objects.insert(id, object.clone());
        }
    }

    let pages_id = out.new_object_id();
    page.set("Parent", pages_id);
    out.objects.insert(page_id, Object::Dictionary(page));
    out.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1i64,
        }),
    );
    let catalog_id = out.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    out.trailer.set("Root", catalog_id);
    Ok(out)
}

/// Look `key` up on the ancestors of a page.
fn inherited(pdf: &lopdf::Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut seen = HashSet::new();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    while let Some(id) = parent {
        if !seen.insert(id) {
            return None;
        }
        let node = pdf.get_dictionary(id).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

/// Push every object id `object` refers to, not following `Parent` links.
fn collect_refs(object: &Object, out: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => out.push(*id),
        Object::Array(items) => items.iter().for_each(|item| collect_refs(item, out)),
        Object::Dictionary(dict) => collect_dict_refs(dict, out),
        Object::Stream(stream) => collect_dict_refs(&stream.dict, out),
        _ => {}
    }
}

fn collect_dict_refs(dict: &Dictionary, out: &mut Vec<ObjectId>) {
    for (key, value) in dict.iter() {
        if key.as_slice() != b"Parent" {
            collect_refs(value, out);
        }
    }
}

/// Splits PDFs with poppler-utils subprocesses.
#[derive(Debug, Clone, Copy, Default)]
pub struct PopplerRenderer;

impl PopplerRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Whether `pdfinfo` and `pdfseparate` are on `PATH`.
    pub fn is_available(&self) -> bool {
        which::which("pdfinfo").is_ok() && which::which("pdfseparate").is_ok()
    }

    /// Run `f` with a filesystem path to the document, spilling in-memory
    /// content to a temporary file first.
    fn with_input_path<T>(
        document: &InputDocument,
        f: impl FnOnce(&Path) -> Result<T, SplitError>,
    ) -> Result<T, SplitError> {
        match document.content() {
            DocumentContent::File(path) => f(path),
            DocumentContent::Bytes(bytes) => {
                let mut spill = tempfile::Builder::new()
                    .prefix("folio-input-")
                    .suffix(".pdf")
                    .tempfile()?;
                spill.write_all(bytes)?;
                spill.flush()?;
                f(spill.path())
            }
        }
    }

    fn map_spawn_error(e: std::io::Error) -> SplitError {
        if e.kind() == std::io::ErrorKind::NotFound {
            SplitError::NotAvailable(POPPLER_NOT_FOUND.to_string())
        } else {
            SplitError::Io(e)
        }
    }
}

/// Read the page count from `pdfinfo` output.
pub(crate) fn parse_pdfinfo_pages(stdout: &str) -> Option<u32> {
    stdout
        .lines()
        .find(|line| line.starts_with("Pages:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|count| count.parse().ok())
}

impl PageRenderer for PopplerRenderer {
    fn count_pages(&self, document: &InputDocument) -> Result<u32, SplitError> {
        Self::with_input_path(document, |path| {
            let output = Command::new("pdfinfo")
                .arg(path)
                .output()
                .map_err(Self::map_spawn_error)?;

            if !output.status.success() {
                return Err(SplitError::PageCount(
                    String::from_utf8_lossy(&output.stderr).trim().to_string(),
                ));
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            parse_pdfinfo_pages(&stdout)
                .ok_or_else(|| SplitError::PageCount("no page count in pdfinfo output".to_string()))
        })
    }

    fn extract_page(&self, document: &InputDocument, page: u32) -> Result<TempPath, SplitError> {
        Self::with_input_path(document, |path| {
            let target = page_file(page)?.into_temp_path();
            let page_str = page.to_string();

            let output = Command::new("pdfseparate")
                .args(["-f", &page_str, "-l", &page_str])
                .arg(path)
                .arg(&*target)
                .output()
                .map_err(Self::map_spawn_error)?;

            if !output.status.success() {
                return Err(SplitError::Render {
                    page,
                    message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }

            Ok(target)
        })
    }
}
