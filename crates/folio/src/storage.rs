//! Remote object-storage references and the capability probe.
//!
//! A document may already live in an object store that the analysis provider
//! can read directly. Sending a reference instead of the bytes only works when
//! the store integration is present in this process, which is answered by an
//! [`ObjectStorageProbe`].

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

/// Provider name for S3-backed storage references.
pub const S3_PROVIDER: &str = "s3";

/// Default key prefix inside the bucket.
pub const DEFAULT_BUCKET_PREFIX: &str = "binary_store/";

/// Separator between a blob key and its version suffix.
pub const VERSION_SEPARATOR: char = '@';

/// Where a document's content lives in remote object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRef {
    /// Storage provider name (e.g. "s3").
    pub provider: String,
    /// Bucket or container, when the reference carries its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    /// Raw blob key as stored by the host (may carry a provider prefix and a version).
    pub key: String,
}

impl StorageRef {
    /// Reference to a blob in the configured S3 bucket.
    pub fn s3(key: impl Into<String>) -> Self {
        Self {
            provider: S3_PROVIDER.to_string(),
            bucket: None,
            key: key.into(),
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn is_s3(&self) -> bool {
        self.provider.eq_ignore_ascii_case(S3_PROVIDER)
    }

    /// Strip the provider-type prefix (up to the first `:`) and the version
    /// suffix (from the first `@`) from a raw blob key.
    pub fn normalize_key(raw: &str) -> &str {
        let key = match raw.find(':') {
            Some(colon) => &raw[colon + 1..],
            None => raw,
        };
        match key.find(VERSION_SEPARATOR) {
            Some(sep) => &key[..sep],
            None => key,
        }
    }
}

/// Bucket and key prefix used to build object names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketLocation {
    pub bucket: String,
    prefix: String,
}

impl BucketLocation {
    /// Create a location. A blank prefix falls back to [`DEFAULT_BUCKET_PREFIX`]
    /// and a non-blank one always ends with `/`.
    pub fn new(bucket: impl Into<String>, prefix: Option<&str>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: normalize_prefix(prefix),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full object name for a raw blob key.
    pub fn object_name(&self, raw_key: &str) -> String {
        format!("{}{}", self.prefix, StorageRef::normalize_key(raw_key))
    }
}

/// Normalize a bucket prefix so it can be concatenated with a key.
pub fn normalize_prefix(prefix: Option<&str>) -> String {
    match prefix.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) if p.ends_with('/') => p.to_string(),
        Some(p) => format!("{}/", p),
        None => DEFAULT_BUCKET_PREFIX.to_string(),
    }
}

/// Answers whether the object-storage integration is usable in this process.
pub trait ObjectStorageProbe: Send + Sync {
    fn is_available(&self) -> bool;
}

/// A probe with a fixed answer, typically taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub bool);

impl ObjectStorageProbe for StaticProbe {
    fn is_available(&self) -> bool {
        self.0
    }
}

pub(crate) fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Evaluates the wrapped probe once and caches the answer.
///
/// Concurrent first callers block on the same initialization, so the inner
/// probe runs exactly once.
pub struct CachedProbe {
    inner: Arc<dyn ObjectStorageProbe>,
    answer: OnceLock<bool>,
}

impl CachedProbe {
    pub fn new(inner: Arc<dyn ObjectStorageProbe>) -> Self {
        Self {
            inner,
            answer: OnceLock::new(),
        }
    }
}

impl ObjectStorageProbe for CachedProbe {
    fn is_available(&self) -> bool {
        *self.answer.get_or_init(|| {
            let available = self.inner.is_available();
            tracing::debug!("Object storage probe evaluated: available={}", available);
            available
        })
    }
}
