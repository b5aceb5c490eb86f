//! Textract-compatible provider over HTTP.
//!
//! Speaks the JSON 1.1 protocol: one POST per call with the operation named
//! in `X-Amz-Target`. Request signing is left to the endpoint (a signing
//! gateway or a local emulator); extra headers can be configured for it.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::backend::{ProviderError, RemoteProvider};
use super::blocks::AnalysisResult;
use super::features::FeatureSet;
use super::source::RequestPayload;

const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const TARGET_HEADER: &str = "x-amz-target";
const DETECT_TARGET: &str = "Textract.DetectDocumentText";
const ANALYZE_TARGET: &str = "Textract.AnalyzeDocument";

/// Status used for failures that never reached the provider.
const TRANSPORT_STATUS: u16 = 503;

const USER_AGENT: &str = concat!("folio/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TextractRequest<'a> {
    document: TextractDocument<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    feature_types: Option<Vec<&'a str>>,
}

#[derive(Debug, Serialize)]
enum TextractDocument<'a> {
    Bytes(String),
    S3Object(S3Object<'a>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct S3Object<'a> {
    bucket: &'a str,
    name: &'a str,
}

impl<'a> TextractDocument<'a> {
    fn from_payload(payload: &'a RequestPayload) -> Self {
        match payload {
            RequestPayload::ByReference { bucket, key } => TextractDocument::S3Object(S3Object {
                bucket,
                name: key,
            }),
            RequestPayload::ByBytes(bytes) => TextractDocument::Bytes(
                base64::engine::general_purpose::STANDARD.encode(bytes),
            ),
        }
    }
}

/// Pull a readable message out of an error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("Message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// HTTP client for a Textract-compatible endpoint.
pub struct TextractHttpProvider {
    client: Client,
    endpoint: Url,
}

impl TextractHttpProvider {
    /// Build the client. Calls carry no deadline of their own; wrap the
    /// provider in an [`AnalysisClient`](super::AnalysisClient) with a timeout.
    pub fn new(endpoint: Url, headers: &HashMap<String, String>) -> Result<Self, ProviderError> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ProviderError::new(TRANSPORT_STATUS, format!("Invalid header name '{}': {}", name, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ProviderError::new(TRANSPORT_STATUS, format!("Invalid header value: {}", e))
            })?;
            default_headers.insert(name, value);
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(default_headers)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| {
                ProviderError::new(
                    TRANSPORT_STATUS,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Self { client, endpoint })
    }

    async fn call(
        &self,
        target: &str,
        request: &TextractRequest<'_>,
    ) -> Result<AnalysisResult, ProviderError> {
        debug!("POST {} ({})", self.endpoint, target);

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(TARGET_HEADER, target)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                let status = e.status().map_or(TRANSPORT_STATUS, |s| s.as_u16());
                ProviderError::new(status, format!("HTTP request failed: {}", e))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ProviderError::new(status.as_u16(), format!("Failed to read response: {}", e))
        })?;

        if !status.is_success() {
            return Err(ProviderError::new(status.as_u16(), error_message(&body)));
        }

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::new(
                status.as_u16(),
                format!("Failed to parse response: {}", e),
            )
        })
    }
}

#[async_trait]
impl RemoteProvider for TextractHttpProvider {
    fn name(&self) -> &str {
        "textract"
    }

    async fn detect_text(&self, payload: &RequestPayload) -> Result<AnalysisResult, ProviderError> {
        let request = TextractRequest {
            document: TextractDocument::from_payload(payload),
            feature_types: None,
        };
        self.call(DETECT_TARGET, &request).await
    }

    async fn analyze(
        &self,
        payload: &RequestPayload,
        features: &FeatureSet,
    ) -> Result<AnalysisResult, ProviderError> {
        let request = TextractRequest {
            document: TextractDocument::from_payload(payload),
            feature_types: Some(features.iter().collect()),
        };
        self.call(ANALYZE_TARGET, &request).await
    }
}
