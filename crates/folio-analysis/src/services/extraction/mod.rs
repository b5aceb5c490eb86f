//! Text extraction exposed as a document operation.
//!
//! An operation reads a blob field of a [`DocumentHandle`], runs it through a
//! [`PageAggregator`] and writes the result into a property.

mod host;

pub use host::{DocumentHandle, DocumentHost, HostError, LocalDocumentHost, MAIN_BLOB_FIELD};

use thiserror::Error;
use tracing::info;

use crate::ocr::{
    AggregateError, AnalysisMode, AnalysisRequest, FeatureSet, Granularity, OutputMode,
    PageAggregator,
};

/// Provider operation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationKind {
    #[default]
    Detect,
    Analyze,
}

/// Parameters of one extraction call.
#[derive(Debug, Clone)]
pub struct ExtractionParams {
    /// Blob field to read.
    pub source_field: String,
    /// Property written with the result. Required.
    pub target_field: String,
    /// Comma-separated feature list; only used by [`OperationKind::Analyze`].
    pub features: Option<String>,
    pub granularity: Granularity,
    /// Write the provider JSON instead of extracted text.
    pub raw: bool,
    /// Persist the document through the host afterwards.
    pub save: bool,
    pub kind: OperationKind,
}

impl ExtractionParams {
    pub fn new(kind: OperationKind, target_field: impl Into<String>) -> Self {
        Self {
            source_field: MAIN_BLOB_FIELD.to_string(),
            target_field: target_field.into(),
            features: None,
            granularity: Granularity::default(),
            raw: false,
            save: false,
            kind,
        }
    }

    fn request(&self) -> AnalysisRequest {
        let mode = match self.kind {
            OperationKind::Detect => AnalysisMode::DetectText,
            OperationKind::Analyze => AnalysisMode::Analyze(
                self.features
                    .as_deref()
                    .map(FeatureSet::parse)
                    .unwrap_or_default(),
            ),
        };
        let output = if self.raw {
            OutputMode::Raw
        } else {
            OutputMode::Text(self.granularity)
        };
        AnalysisRequest::new(mode, output)
    }
}

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("No target field given")]
    MissingTarget,

    #[error("Document {document} has no blob in field '{field}'")]
    MissingBlob { document: String, field: String },

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Runs text extraction against documents of a host.
#[derive(Clone)]
pub struct ExtractionOperation {
    aggregator: PageAggregator,
}

impl ExtractionOperation {
    pub fn new(aggregator: PageAggregator) -> Self {
        Self { aggregator }
    }

    /// Extract text (or raw JSON) from `document` into the target field.
    ///
    /// On failure the target field is not touched and nothing is saved.
    pub async fn run(
        &self,
        host: &mut dyn DocumentHost,
        mut document: DocumentHandle,
        params: &ExtractionParams,
    ) -> Result<DocumentHandle, OperationError> {
        if params.target_field.trim().is_empty() {
            return Err(OperationError::MissingTarget);
        }
        let request = params.request();

        let blob = document
            .blob(&params.source_field)
            .ok_or_else(|| OperationError::MissingBlob {
                document: document.id().to_string(),
                field: params.source_field.clone(),
            })?;

        let result = self.aggregator.run(blob, &request).await?;
        info!(
            "{}: wrote {:?} result to {}",
            document.id(),
            params.kind,
            params.target_field
        );
        document.set_property(params.target_field.clone(), result.into_field_value());

        if params.save {
            document = host.save(document).await?;
        }
        Ok(document)
    }
}
