//! Configuration management for folio using the prefer crate.
//!
//! Files are discovered by prefer (`folio.toml`, `folio.yaml`, `folio.json`, ...)
//! and parsed with serde. Environment variables override file values.

mod loader;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::storage::{parse_flag, BucketLocation};

pub use loader::{load_settings_with_options, LoadOptions};

/// Default AWS region for the analysis endpoint.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default per-call deadline for the analysis provider, in seconds.
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 120;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    #[error("Invalid provider endpoint '{0}'")]
    InvalidEndpoint(String),
}

/// How page texts are concatenated before the cross-page line dedup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageJoin {
    /// A real line break between pages.
    #[default]
    Newline,
    /// Each page prefixed with the two literal characters `/n`, as emitted by
    /// older releases. Kept for consumers that compare output byte for byte.
    #[serde(alias = "legacy")]
    LegacyMarker,
}

/// Which page renderer splits multi-page PDFs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererKind {
    /// In-process splitting with lopdf.
    #[default]
    Lopdf,
    /// `pdfinfo` / `pdfseparate` from poppler-utils.
    Poppler,
}

/// Remote analysis provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Region used to build the default endpoint.
    #[serde(default = "default_region")]
    pub region: String,
    /// Explicit endpoint (e.g. a signing gateway). Overrides the regional default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Deadline for a single provider call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra headers sent with every request.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_SECS
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            timeout_secs: default_timeout_secs(),
            headers: HashMap::new(),
        }
    }
}

impl ProviderSettings {
    /// Resolve the endpoint URL, defaulting to the regional Textract endpoint.
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let raw = self
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://textract.{}.amazonaws.com/", self.region));
        Url::parse(&raw).map_err(|_| ConfigError::InvalidEndpoint(raw))
    }
}

/// Object storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_prefix: Option<String>,
    /// Whether the S3 integration is deployed. Unset means it is not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_available: Option<bool>,
    /// Send S3-backed content by reference even when `s3_available` is off.
    /// Meant for test setups where the bucket is reachable but not deployed.
    #[serde(default)]
    pub force_reference: bool,
}

impl StorageSettings {
    /// Bucket location, if a bucket is configured.
    pub fn location(&self) -> Option<BucketLocation> {
        self.bucket
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(|bucket| BucketLocation::new(bucket, self.bucket_prefix.as_deref()))
    }
}

/// Orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Pages dispatched concurrently. 1 keeps dispatch strictly sequential.
    #[serde(default = "default_concurrency")]
    pub dispatch_concurrency: usize,
    #[serde(default)]
    pub page_join: PageJoin,
    #[serde(default)]
    pub renderer: RendererKind,
}

fn default_concurrency() -> usize {
    1
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            dispatch_concurrency: default_concurrency(),
            page_join: PageJoin::default(),
            renderer: RendererKind::default(),
        }
    }
}

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub analysis: AnalysisSettings,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Settings {
    /// Discover a config file via prefer and load it; fall back to defaults.
    pub async fn load() -> Self {
        match prefer::load("folio").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(settings) => settings,
                    Err(e) => {
                        tracing::warn!("Ignoring unreadable config: {}", e);
                        Self::default_with_env()
                    }
                },
                None => Self::default_with_env(),
            },
            Err(_) => Self::default_with_env(),
        }
    }

    /// Defaults with environment variable overrides applied.
    pub fn default_with_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load configuration from a specific file path.
    /// The format is chosen by extension: TOML, YAML, otherwise JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut settings = Self::parse(&contents, ext)?;
        settings.source_path = Some(path.to_path_buf());
        Ok(settings.with_env_overrides())
    }

    /// Parse settings text in the format named by `ext`.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, ConfigError> {
        match ext {
            "toml" => toml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "TOML",
                message: e.to_string(),
            }),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "YAML",
                message: e.to_string(),
            }),
            _ => serde_json::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            }),
        }
    }

    /// Apply `FOLIO_*` environment variables on top of the current values.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(bucket) = get("FOLIO_S3_BUCKET") {
            self.storage.bucket = Some(bucket);
        }
        if let Some(prefix) = get("FOLIO_S3_BUCKET_PREFIX") {
            self.storage.bucket_prefix = Some(prefix);
        }
        if let Some(flag) = get("FOLIO_S3_AVAILABLE") {
            self.storage.s3_available = Some(parse_flag(&flag));
        }
        if let Some(flag) = get("FOLIO_S3_FORCE_REFERENCE") {
            self.storage.force_reference = parse_flag(&flag);
        }
        if let Some(region) = get("FOLIO_REGION") {
            self.provider.region = region;
        }
        if let Some(endpoint) = get("FOLIO_TEXTRACT_ENDPOINT") {
            self.provider.endpoint = Some(endpoint);
        }
        if let Some(secs) = get("FOLIO_PROVIDER_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.provider.timeout_secs = secs;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.provider.region, "us-east-1");
        assert_eq!(settings.provider.timeout_secs, 120);
        assert_eq!(settings.analysis.dispatch_concurrency, 1);
        assert_eq!(settings.analysis.page_join, PageJoin::Newline);
        assert_eq!(settings.analysis.renderer, RendererKind::Lopdf);
        assert!(settings.storage.location().is_none());
    }

    #[test]
    fn test_parse_toml_sections() {
        let toml = r#"
            [provider]
            region = "eu-west-1"
            timeout_secs = 30

            [storage]
            bucket = "eu-west-1-demo-bucket"
            bucket_prefix = "POC/binary_store"
            s3_available = true

            [analysis]
            dispatch_concurrency = 4
            page_join = "legacy"
            renderer = "poppler"
        "#;
        let settings = Settings::parse(toml, "toml").unwrap();
        assert_eq!(settings.provider.timeout_secs, 30);
        assert_eq!(settings.storage.s3_available, Some(true));
        assert_eq!(settings.analysis.page_join, PageJoin::LegacyMarker);
        assert_eq!(settings.analysis.renderer, RendererKind::Poppler);

        let location = settings.storage.location().unwrap();
        assert_eq!(location.bucket, "eu-west-1-demo-bucket");
        assert_eq!(location.prefix(), "POC/binary_store/");

        assert_eq!(
            settings.provider.endpoint_url().unwrap().as_str(),
            "https://textract.eu-west-1.amazonaws.com/"
        );
    }

    #[test]
    fn test_parse_json_and_yaml() {
        let json = r#"{"analysis": {"page_join": "newline"}}"#;
        assert_eq!(
            Settings::parse(json, "json").unwrap().analysis.page_join,
            PageJoin::Newline
        );

        let yaml = "provider:\n  endpoint: http://localhost:4566/\n";
        let settings = Settings::parse(yaml, "yaml").unwrap();
        assert_eq!(
            settings.provider.endpoint_url().unwrap().as_str(),
            "http://localhost:4566/"
        );
    }

    #[test]
    fn test_parse_error_names_format() {
        let err = Settings::parse("provider = [", "toml").unwrap_err();
        assert!(err.to_string().contains("TOML"));
    }

    #[test]
    fn test_invalid_endpoint() {
        let mut settings = Settings::default();
        settings.provider.endpoint = Some("not a url".to_string());
        assert!(matches!(
            settings.provider.endpoint_url(),
            Err(ConfigError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_overrides_apply_non_blank_values() {
        let env: HashMap<&str, &str> = [
            ("FOLIO_S3_BUCKET", "bucket-from-env"),
            ("FOLIO_S3_AVAILABLE", "yes"),
            ("FOLIO_S3_FORCE_REFERENCE", "on"),
            ("FOLIO_REGION", "  "),
            ("FOLIO_PROVIDER_TIMEOUT_SECS", "15"),
        ]
        .into_iter()
        .collect();

        let settings =
            Settings::default().with_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(settings.storage.bucket.as_deref(), Some("bucket-from-env"));
        assert_eq!(settings.storage.s3_available, Some(true));
        assert!(settings.storage.force_reference);
        assert_eq!(settings.provider.region, "us-east-1");
        assert_eq!(settings.provider.timeout_secs, 15);
    }

    #[tokio::test]
    async fn test_load_from_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("folio.toml");
        std::fs::write(&path, "[storage]\nbucket = \"docs\"\n").unwrap();

        let settings = Settings::load_from_path(&path).await.unwrap();
        assert_eq!(settings.source_path.as_deref(), Some(path.as_path()));
        assert!(settings.storage.bucket.is_some());
    }

    #[tokio::test]
    async fn test_load_from_missing_path() {
        let err = Settings::load_from_path(Path::new("/nonexistent/folio.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
