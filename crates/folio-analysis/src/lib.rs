//! Multi-page text extraction through a remote analysis provider.
//!
//! [`ocr`] holds the orchestration core (splitting, payload selection,
//! provider calls, merging). [`services`] exposes it to a document host.

pub mod ocr;
pub mod services;
