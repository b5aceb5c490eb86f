//! Document handles and the host that persists them.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use folio::storage::StorageRef;
use folio::utils::detect_mime;
use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::ocr::InputDocument;

/// Blob field holding a document's main file.
pub const MAIN_BLOB_FIELD: &str = "file:content";

/// Suffix of the sidecar file [`LocalDocumentHost`] keeps properties in.
pub const SIDECAR_SUFFIX: &str = ".folio.json";

/// Bytes inspected for magic-number MIME detection.
const SNIFF_LEN: u64 = 8192;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Document not found: {0}")]
    NotFound(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid properties in {path}: {source}")]
    Properties {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A document as seen by an operation: blob fields plus string properties.
#[derive(Debug, Clone, Default)]
pub struct DocumentHandle {
    id: String,
    blobs: HashMap<String, InputDocument>,
    properties: BTreeMap<String, Value>,
}

impl DocumentHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn with_blob(mut self, field: impl Into<String>, blob: InputDocument) -> Self {
        self.blobs.insert(field.into(), blob);
        self
    }

    pub fn blob(&self, field: &str) -> Option<&InputDocument> {
        self.blobs.get(field)
    }

    pub fn property(&self, field: &str) -> Option<&Value> {
        self.properties.get(field)
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    pub fn set_property(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(field.into(), value.into());
    }
}

/// Persists documents after an operation modified them.
#[async_trait]
pub trait DocumentHost: Send {
    async fn save(&mut self, document: DocumentHandle) -> Result<DocumentHandle, HostError>;
}

/// Host backed by local files: the file is the main blob, properties live in
/// a `<file>.folio.json` sidecar next to it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDocumentHost;

impl LocalDocumentHost {
    pub fn new() -> Self {
        Self
    }

    pub fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(SIDECAR_SUFFIX);
        PathBuf::from(name)
    }

    /// Open a local file as a document, loading properties saved earlier.
    ///
    /// `storage` marks the content as also stored remotely, e.g. in S3.
    pub async fn open(
        &self,
        path: &Path,
        storage: Option<StorageRef>,
    ) -> Result<DocumentHandle, HostError> {
        let io_err = |source| HostError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HostError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(io_err(e)),
        };

        let mut head = Vec::new();
        file.take(SNIFF_LEN)
            .read_to_end(&mut head)
            .await
            .map_err(io_err)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = detect_mime(&head, &filename);
        debug!("Opened {} as {}", path.display(), mime_type);

        let mut blob = InputDocument::from_path(path, mime_type);
        if let Some(storage) = storage {
            blob = blob.with_storage(storage);
        }

        let mut handle =
            DocumentHandle::new(path.display().to_string()).with_blob(MAIN_BLOB_FIELD, blob);
        handle.properties = Self::read_sidecar(&Self::sidecar_path(path)).await?;
        Ok(handle)
    }

    async fn read_sidecar(path: &Path) -> Result<BTreeMap<String, Value>, HostError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(HostError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&contents).map_err(|source| HostError::Properties {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[async_trait]
impl DocumentHost for LocalDocumentHost {
    async fn save(&mut self, document: DocumentHandle) -> Result<DocumentHandle, HostError> {
        let sidecar = Self::sidecar_path(Path::new(document.id()));
        let json = serde_json::to_string_pretty(&document.properties).map_err(|source| {
            HostError::Properties {
                path: sidecar.clone(),
                source,
            }
        })?;
        tokio::fs::write(&sidecar, json)
            .await
            .map_err(|source| HostError::Io {
                path: sidecar.clone(),
                source,
            })?;
        debug!("Saved properties to {}", sidecar.display());
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::DocumentContent;
    use tempfile::TempDir;

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            LocalDocumentHost::sidecar_path(Path::new("/tmp/scan.pdf")),
            PathBuf::from("/tmp/scan.pdf.folio.json")
        );
    }

    #[tokio::test]
    async fn test_open_detects_mime_and_attaches_storage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upload.bin");
        std::fs::write(&path, b"%PDF-1.5\n%fake").unwrap();

        let handle = LocalDocumentHost::new()
            .open(&path, Some(StorageRef::s3("s3:abc@2").with_bucket("scans")))
            .await
            .unwrap();
        let blob = handle.blob(MAIN_BLOB_FIELD).unwrap();

        assert_eq!(blob.mime_type(), "application/pdf");
        assert!(matches!(blob.content(), DocumentContent::File(p) if p == &path));
        let storage = blob.storage().unwrap();
        assert_eq!(storage.key, "s3:abc@2");
        assert_eq!(storage.bucket.as_deref(), Some("scans"));
        assert!(handle.properties().is_empty());
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = LocalDocumentHost::new()
            .open(&dir.path().join("missing.png"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_saved_properties_are_reloaded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, b"hello").unwrap();

        let mut host = LocalDocumentHost::new();
        let mut handle = host.open(&path, None).await.unwrap();
        handle.set_property("dc:description", "Invoice\nTotal");
        host.save(handle).await.unwrap();

        assert!(LocalDocumentHost::sidecar_path(&path).exists());
        let reopened = host.open(&path, None).await.unwrap();
        assert_eq!(
            reopened.property("dc:description"),
            Some(&Value::from("Invoice\nTotal"))
        );
    }

    #[tokio::test]
    async fn test_corrupt_sidecar_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, b"hello").unwrap();
        std::fs::write(LocalDocumentHost::sidecar_path(&path), b"{not json").unwrap();

        let err = LocalDocumentHost::new().open(&path, None).await.unwrap_err();
        assert!(matches!(err, HostError::Properties { .. }));
    }
}
