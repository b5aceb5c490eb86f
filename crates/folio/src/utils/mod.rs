//! Utility functions.

pub mod mime;

pub use mime::{detect_mime, guess_mime_from_filename, is_pdf};
