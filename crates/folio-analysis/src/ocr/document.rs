//! Input documents and the per-page units dispatched to the provider.

use std::io;
use std::path::{Path, PathBuf};

use folio::storage::StorageRef;
use tempfile::TempPath;

/// Where a document's bytes are.
#[derive(Debug, Clone)]
pub enum DocumentContent {
    Bytes(Vec<u8>),
    File(PathBuf),
}

/// A document to analyze. Immutable once built.
#[derive(Debug, Clone)]
pub struct InputDocument {
    content: DocumentContent,
    mime_type: String,
    storage: Option<StorageRef>,
}

impl InputDocument {
    pub fn from_bytes(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            content: DocumentContent::Bytes(bytes),
            mime_type: mime_type.into(),
            storage: None,
        }
    }

    pub fn from_path(path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Self {
        Self {
            content: DocumentContent::File(path.into()),
            mime_type: mime_type.into(),
            storage: None,
        }
    }

    /// Attach the remote storage location of this content.
    pub fn with_storage(mut self, storage: StorageRef) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn content(&self) -> &DocumentContent {
        &self.content
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn storage(&self) -> Option<&StorageRef> {
        self.storage.as_ref()
    }

    /// Read the full content into memory.
    pub async fn read_bytes(&self) -> io::Result<Vec<u8>> {
        match &self.content {
            DocumentContent::Bytes(bytes) => Ok(bytes.clone()),
            DocumentContent::File(path) => tokio::fs::read(path).await,
        }
    }
}

enum UnitSource<'a> {
    /// The document itself, unsplit.
    Original(&'a InputDocument),
    /// A rendered single-page PDF owned by the unit until released.
    Artifact(TempPath),
}

/// One page's worth of content.
///
/// `index` is the 1-based page in the original document. A rendered page is a
/// standalone one-page PDF, so the provider itself always sees it as page 1.
pub struct PageUnit<'a> {
    index: u32,
    source: UnitSource<'a>,
}

impl<'a> PageUnit<'a> {
    /// The whole document as a single unit.
    pub fn original(document: &'a InputDocument) -> Self {
        Self {
            index: 1,
            source: UnitSource::Original(document),
        }
    }

    /// A rendered page stored in a temporary file.
    pub fn artifact(index: u32, path: TempPath) -> Self {
        debug_assert!(index >= 1, "page indices are 1-based");
        Self {
            index,
            source: UnitSource::Artifact(path),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_artifact(&self) -> bool {
        matches!(self.source, UnitSource::Artifact(_))
    }

    /// Path of the rendered page, if this unit is one.
    pub fn artifact_path(&self) -> Option<&Path> {
        match &self.source {
            UnitSource::Artifact(path) => Some(&**path),
            UnitSource::Original(_) => None,
        }
    }

    /// Storage reference of the content. Rendered pages never have one.
    pub fn storage(&self) -> Option<&StorageRef> {
        match &self.source {
            UnitSource::Original(document) => document.storage(),
            UnitSource::Artifact(_) => None,
        }
    }

    /// Read the unit's full content into memory.
    pub async fn read_bytes(&self) -> io::Result<Vec<u8>> {
        match &self.source {
            UnitSource::Original(document) => document.read_bytes().await,
            UnitSource::Artifact(path) => tokio::fs::read(path).await,
        }
    }

    /// Delete the rendered page backing this unit. No-op for the original.
    pub fn release(self) -> io::Result<()> {
        match self.source {
            UnitSource::Artifact(path) => path.close(),
            UnitSource::Original(_) => Ok(()),
        }
    }
}

impl std::fmt::Debug for PageUnit<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageUnit")
            .field("index", &self.index)
            .field("artifact", &self.artifact_path())
            .finish()
    }
}
