//! MIME type helpers for deciding how a document is handled.

/// The only MIME type that is inspected for pages.
pub const PDF_MIME: &str = "application/pdf";

/// Lowercase a MIME type and drop parameters such as `; charset=`.
fn essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or(mime_type)
        .trim()
        .to_lowercase()
}

/// Check if a MIME type denotes a PDF.
pub fn is_pdf(mime_type: &str) -> bool {
    essence(mime_type) == PDF_MIME
}

/// Guess MIME type from a filename's extension.
pub fn guess_mime_from_filename(name: &str) -> &'static str {
    let ext = name
        .rsplit('.')
        .next()
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => PDF_MIME,
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "tif" | "tiff" => "image/tiff",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Detect a MIME type from content, falling back to the filename.
///
/// Magic bytes win over the extension, so a PDF saved as `scan.bin` is still
/// treated as a PDF.
pub fn detect_mime(content: &[u8], filename: &str) -> String {
    match infer::get(content) {
        Some(kind) => kind.mime_type().to_string(),
        None => guess_mime_from_filename(filename).to_string(),
    }
}
