//! Remote analysis provider abstraction and the per-unit client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use super::blocks::AnalysisResult;
use super::features::FeatureSet;
use super::source::RequestPayload;

/// Status reported when the per-call deadline expires.
pub const DEADLINE_STATUS: u16 = 408;

/// A failed provider call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Provider error ({status}): {message}")]
pub struct ProviderError {
    /// HTTP-like status code.
    pub status: u16,
    pub message: String,
}

impl ProviderError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// A remote text analysis service.
///
/// Implementations make exactly one request per call and never retry.
#[async_trait]
pub trait RemoteProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Plain text detection.
    async fn detect_text(&self, payload: &RequestPayload) -> Result<AnalysisResult, ProviderError>;

    /// Document analysis with the given features (never empty here).
    async fn analyze(
        &self,
        payload: &RequestPayload,
        features: &FeatureSet,
    ) -> Result<AnalysisResult, ProviderError>;
}

/// Sends one unit to the provider under an optional deadline.
#[derive(Clone)]
pub struct AnalysisClient {
    provider: Arc<dyn RemoteProvider>,
    timeout: Option<Duration>,
}

impl AnalysisClient {
    pub fn new(provider: Arc<dyn RemoteProvider>) -> Self {
        Self {
            provider,
            timeout: None,
        }
    }

    /// Fail any call that takes longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    async fn with_deadline<F>(&self, call: F) -> Result<AnalysisResult, ProviderError>
    where
        F: std::future::Future<Output = Result<AnalysisResult, ProviderError>>,
    {
        let start = Instant::now();
        let result = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, call).await.unwrap_or_else(|_| {
                Err(ProviderError::new(
                    DEADLINE_STATUS,
                    format!("no response within {:?}", timeout),
                ))
            }),
            None => call.await,
        };
        debug!(
            "{} call finished in {}ms",
            self.provider.name(),
            start.elapsed().as_millis()
        );
        result
    }

    pub async fn detect_text(
        &self,
        payload: &RequestPayload,
    ) -> Result<AnalysisResult, ProviderError> {
        self.with_deadline(self.provider.detect_text(payload)).await
    }

    /// Analyze with `features`, or TABLES and FORMS when it is empty.
    pub async fn analyze(
        &self,
        payload: &RequestPayload,
        features: &FeatureSet,
    ) -> Result<AnalysisResult, ProviderError> {
        let features = features.or_default();
        self.with_deadline(self.provider.analyze(payload, &features))
            .await
    }
}
