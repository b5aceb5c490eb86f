//! Choosing how a unit's content reaches the provider.

use std::sync::Arc;

use folio::storage::{BucketLocation, ObjectStorageProbe, StorageRef};
use thiserror::Error;
use tracing::debug;

use super::document::PageUnit;

/// What the provider is asked to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPayload {
    /// An object the provider fetches itself.
    ByReference { bucket: String, key: String },
    /// The content itself.
    ByBytes(Vec<u8>),
}

#[cfg(test)]
impl RequestPayload {
    pub(crate) fn is_reference(&self) -> bool {
        matches!(self, RequestPayload::ByReference { .. })
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Failed to read content of page {unit}: {source}")]
    Read {
        unit: u32,
        #[source]
        source: std::io::Error,
    },
}

/// Picks [`RequestPayload::ByReference`] when the content is in S3 and the
/// S3 integration is available, [`RequestPayload::ByBytes`] otherwise.
#[derive(Clone)]
pub struct SourceResolver {
    location: Option<BucketLocation>,
    probe: Arc<dyn ObjectStorageProbe>,
    force_reference: bool,
}

impl SourceResolver {
    /// `probe` should already be cached (see [`folio::storage::CachedProbe`]);
    /// it is consulted for every unit that carries an S3 reference.
    pub fn new(location: Option<BucketLocation>, probe: Arc<dyn ObjectStorageProbe>) -> Self {
        Self {
            location,
            probe,
            force_reference: false,
        }
    }

    /// Treat S3 references as usable even when the probe says otherwise
    /// (`storage.force_reference`).
    pub fn force_reference(mut self, force: bool) -> Self {
        self.force_reference = force;
        self
    }

    fn reference_for(&self, unit: &PageUnit<'_>) -> Option<RequestPayload> {
        let storage = unit.storage().filter(|s| s.is_s3())?;
        if !(self.force_reference || self.probe.is_available()) {
            return None;
        }
        let location = self.location.as_ref()?;

        if StorageRef::normalize_key(&storage.key).trim().is_empty() {
            return None;
        }
        let key = location.object_name(&storage.key);
        let bucket = storage
            .bucket
            .clone()
            .unwrap_or_else(|| location.bucket.clone());

        Some(RequestPayload::ByReference { bucket, key })
    }

    /// Build the payload for one unit.
    pub async fn resolve(&self, unit: &PageUnit<'_>) -> Result<RequestPayload, ResolveError> {
        if let Some(reference) = self.reference_for(unit) {
            debug!("Page {}: sending by reference", unit.index());
            return Ok(reference);
        }

        let bytes = unit
            .read_bytes()
            .await
            .map_err(|source| ResolveError::Read {
                unit: unit.index(),
                source,
            })?;
        debug!("Page {}: sending {} bytes", unit.index(), bytes.len());
        Ok(RequestPayload::ByBytes(bytes))
    }
}
