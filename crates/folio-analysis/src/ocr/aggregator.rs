//! Runs the split → dispatch → merge → cleanup pipeline for one document.

use std::fmt;

use folio::config::PageJoin;
use futures::{stream, StreamExt, TryStreamExt};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, info_span, Instrument};

use super::backend::{AnalysisClient, ProviderError};
use super::blocks::{self, AnalysisResult, Granularity};
use super::dedup::remove_duplicate_lines;
use super::document::{InputDocument, PageUnit};
use super::features::FeatureSet;
use super::source::{ResolveError, SourceResolver};
use super::splitter::{release_all, PageSplitter, SplitError};

/// Separator between extracted texts of one page and between merged lines.
const LINE_SEPARATOR: &str = "\n";

/// Page prefix written by [`PageJoin::LegacyMarker`].
const LEGACY_PAGE_MARKER: &str = "/n";

/// Pipeline stage a failure originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Split,
    Resolve,
    Provider,
    Merge,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Split => "split",
            Stage::Resolve => "resolve",
            Stage::Provider => "provider",
            Stage::Merge => "merge",
        };
        f.write_str(name)
    }
}

/// Why a single unit could not be analyzed.
#[derive(Debug, Error)]
pub enum UnitFailure {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl UnitFailure {
    fn stage(&self) -> Stage {
        match self {
            UnitFailure::Resolve(_) => Stage::Resolve,
            UnitFailure::Provider(_) => Stage::Provider,
        }
    }
}

/// A failed aggregation run. There is no partial success.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("Failed to split document: {0}")]
    Split(#[from] SplitError),

    #[error("Analysis failed for unit {unit} ({stage}): {source}")]
    Analysis {
        stage: Stage,
        unit: u32,
        #[source]
        source: UnitFailure,
    },

    #[error("Failed to serialize analysis result: {0}")]
    Merge(#[from] serde_json::Error),
}

impl AggregateError {
    fn unit(unit: u32, failure: impl Into<UnitFailure>) -> Self {
        let source = failure.into();
        AggregateError::Analysis {
            stage: source.stage(),
            unit,
            source,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            AggregateError::Split(_) => Stage::Split,
            AggregateError::Analysis { stage, .. } => *stage,
            AggregateError::Merge(_) => Stage::Merge,
        }
    }

    /// The 1-based unit that failed, for per-unit failures.
    pub fn unit_index(&self) -> Option<u32> {
        match self {
            AggregateError::Analysis { unit, .. } => Some(*unit),
            _ => None,
        }
    }
}

/// Which provider operation a run uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisMode {
    DetectText,
    Analyze(FeatureSet),
}

/// Shape of the run's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text(Granularity),
    Raw,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub mode: AnalysisMode,
    pub output: OutputMode,
}

impl AnalysisRequest {
    pub fn new(mode: AnalysisMode, output: OutputMode) -> Self {
        Self { mode, output }
    }
}

/// The merged outcome of one run.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregatedResult {
    Text(String),
    /// The bare result object for single-unit runs, an array in page order otherwise.
    Json(Value),
}

impl AggregatedResult {
    /// The value as written into a document field.
    pub fn into_field_value(self) -> String {
        match self {
            AggregatedResult::Text(text) => text,
            AggregatedResult::Json(value) => value.to_string(),
        }
    }
}

/// Analyzes every page of a document and merges the results.
#[derive(Clone)]
pub struct PageAggregator {
    splitter: PageSplitter,
    resolver: SourceResolver,
    client: AnalysisClient,
    concurrency: usize,
    page_join: PageJoin,
}

impl PageAggregator {
    pub fn new(splitter: PageSplitter, resolver: SourceResolver, client: AnalysisClient) -> Self {
        Self {
            splitter,
            resolver,
            client,
            concurrency: 1,
            page_join: PageJoin::default(),
        }
    }

    /// Number of pages in flight at once. Results are merged in page order
    /// whatever the completion order.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_page_join(mut self, page_join: PageJoin) -> Self {
        self.page_join = page_join;
        self
    }

    /// Analyze a document.
    ///
    /// Rendered pages are released before returning, whether the run
    /// succeeded or not.
    pub async fn run(
        &self,
        document: &InputDocument,
        request: &AnalysisRequest,
    ) -> Result<AggregatedResult, AggregateError> {
        let span = info_span!("aggregate", provider = self.client.provider_name());
        async move {
            let units = self.splitter.split(document)?;
            let unit_count = units.len();
            debug!("Dispatching {} unit(s)", unit_count);

            let outcome = match self.dispatch(&units, &request.mode).await {
                Ok(results) => self.merge(results, request.output),
                Err(e) => Err(e),
            };

            let failures = release_all(units);
            if failures > 0 {
                debug!("{} rendered page(s) could not be deleted", failures);
            }

            match &outcome {
                Ok(_) => info!("Analyzed {} unit(s)", unit_count),
                Err(e) => info!("Aggregation failed at {} stage: {}", e.stage(), e),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn dispatch(
        &self,
        units: &[PageUnit<'_>],
        mode: &AnalysisMode,
    ) -> Result<Vec<AnalysisResult>, AggregateError> {
        stream::iter(units)
            .map(|unit| self.dispatch_unit(unit, mode))
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    async fn dispatch_unit(
        &self,
        unit: &PageUnit<'_>,
        mode: &AnalysisMode,
    ) -> Result<AnalysisResult, AggregateError> {
        let payload = self
            .resolver
            .resolve(unit)
            .await
            .map_err(|e| AggregateError::unit(unit.index(), e))?;

        let result = match mode {
            AnalysisMode::DetectText => self.client.detect_text(&payload).await,
            AnalysisMode::Analyze(features) => self.client.analyze(&payload, features).await,
        };
        result.map_err(|e| AggregateError::unit(unit.index(), e))
    }

    fn merge(
        &self,
        mut results: Vec<AnalysisResult>,
        output: OutputMode,
    ) -> Result<AggregatedResult, AggregateError> {
        if results.len() == 1 {
            let result = results.remove(0);
            return Ok(match output {
                OutputMode::Raw => AggregatedResult::Json(serde_json::to_value(result)?),
                OutputMode::Text(granularity) => AggregatedResult::Text(blocks::extract_joined(
                    &result,
                    granularity,
                    LINE_SEPARATOR,
                )),
            });
        }

        match output {
            OutputMode::Raw => {
                let pages = results
                    .into_iter()
                    .map(serde_json::to_value)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(AggregatedResult::Json(Value::Array(pages)))
            }
            OutputMode::Text(granularity) => {
                let pages: Vec<String> = results
                    .iter()
                    .map(|r| blocks::extract_joined(r, granularity, LINE_SEPARATOR))
                    .collect();
                let joined = join_pages(&pages, self.page_join);
                Ok(AggregatedResult::Text(remove_duplicate_lines(
                    &joined,
                    LINE_SEPARATOR,
                )))
            }
        }
    }
}

/// Concatenate page texts before the cross-page dedup.
fn join_pages(pages: &[String], page_join: PageJoin) -> String {
    match page_join {
        PageJoin::Newline => pages.join(LINE_SEPARATOR),
        PageJoin::LegacyMarker => pages.iter().fold(String::new(), |mut acc, page| {
            acc.push_str(LEGACY_PAGE_MARKER);
            acc.push_str(page);
            acc
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::backend::RemoteProvider;
    use crate::ocr::blocks::Block;
    use crate::ocr::pdf_utils::{test_pdf, LopdfRenderer};
    use crate::ocr::source::RequestPayload;
    use crate::ocr::splitter::PageRenderer;
    use async_trait::async_trait;
    use folio::storage::StaticProbe;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempPath;

    /// Answers with the words configured for the page number found in the
    /// payload bytes (rendered test pages contain "(Page N)").
    struct ScriptedProvider {
        pages: Vec<Vec<&'static str>>,
        fail_page: Option<usize>,
        calls: Mutex<Vec<usize>>,
    }

    impl ScriptedProvider {
        fn new(pages: Vec<Vec<&'static str>>) -> Self {
            Self {
                pages,
                fail_page: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn page_of(payload: &RequestPayload) -> usize {
            let RequestPayload::ByBytes(bytes) = payload else {
                return 1;
            };
            let text = String::from_utf8_lossy(bytes);
            (1..=9)
                .rev()
                .find(|n| text.contains(&format!("(Page {})", n)))
                .unwrap_or(1)
        }

        fn respond(&self, payload: &RequestPayload) -> Result<AnalysisResult, ProviderError> {
            let page = Self::page_of(payload);
            self.calls.lock().unwrap().push(page);
            if self.fail_page == Some(page) {
                return Err(ProviderError::new(500, "InternalServerError"));
            }
            let mut blocks = vec![Block::new("PAGE", None)];
            for word in &self.pages[page - 1] {
                blocks.push(Block::new("LINE", Some(word)));
                blocks.push(Block::new("WORD", Some(word)));
            }
            let mut result = AnalysisResult::from_blocks(blocks);
            result
                .extra
                .insert("DocumentMetadata".to_string(), serde_json::json!({"Pages": 1}));
            Ok(result)
        }
    }

    #[async_trait]
    impl RemoteProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn detect_text(
            &self,
            payload: &RequestPayload,
        ) -> Result<AnalysisResult, ProviderError> {
            // Later pages answer first so out-of-order completion is exercised.
            let page = Self::page_of(payload) as u64;
            tokio::time::sleep(Duration::from_millis(30 / page)).await;
            self.respond(payload)
        }

        async fn analyze(
            &self,
            payload: &RequestPayload,
            _features: &FeatureSet,
        ) -> Result<AnalysisResult, ProviderError> {
            self.respond(payload)
        }
    }

    /// Wraps lopdf and records every rendered page path.
    struct TrackingRenderer {
        inner: LopdfRenderer,
        rendered: Mutex<Vec<PathBuf>>,
    }

    impl PageRenderer for TrackingRenderer {
        fn count_pages(&self, document: &InputDocument) -> Result<u32, SplitError> {
            self.inner.count_pages(document)
        }

        fn extract_page(&self, document: &InputDocument, page: u32) -> Result<TempPath, SplitError> {
            let path = self.inner.extract_page(document, page)?;
            self.rendered.lock().unwrap().push(path.to_path_buf());
            Ok(path)
        }
    }

    fn three_pages() -> Vec<Vec<&'static str>> {
        vec![
            vec!["Invoice", "ACME", "Total"],
            vec!["ACME", "Page", "Lines"],
            vec!["total", "Signature", "ACME"],
        ]
    }

    fn aggregator(
        provider: Arc<ScriptedProvider>,
        renderer: Arc<TrackingRenderer>,
    ) -> PageAggregator {
        PageAggregator::new(
            PageSplitter::new(renderer),
            SourceResolver::new(None, Arc::new(StaticProbe(false))),
            AnalysisClient::new(provider),
        )
    }

    fn tracking_renderer() -> Arc<TrackingRenderer> {
        Arc::new(TrackingRenderer {
            inner: LopdfRenderer::new(),
            rendered: Mutex::new(Vec::new()),
        })
    }

    fn pdf(pages: u32) -> InputDocument {
        InputDocument::from_bytes(test_pdf::build(pages), "application/pdf")
    }

    fn analyze_words() -> AnalysisRequest {
        AnalysisRequest::new(
            AnalysisMode::Analyze(FeatureSet::default()),
            OutputMode::Text(Granularity::Word),
        )
    }

    #[tokio::test]
    async fn test_three_page_words_are_merged_once() {
        let provider = Arc::new(ScriptedProvider::new(three_pages()));
        let renderer = tracking_renderer();
        let aggregator = aggregator(provider.clone(), renderer.clone());

        let result = aggregator.run(&pdf(3), &analyze_words()).await.unwrap();

        assert_eq!(
            result,
            AggregatedResult::Text("Invoice\nACME\nTotal\nPage\nLines\nSignature".to_string())
        );
        assert_eq!(*provider.calls.lock().unwrap(), vec![1, 2, 3]);

        let rendered = renderer.rendered.lock().unwrap();
        assert_eq!(rendered.len(), 3);
        assert!(rendered.iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn test_three_page_raw_is_array_in_page_order() {
        let provider = Arc::new(ScriptedProvider::new(three_pages()));
        let aggregator = aggregator(provider, tracking_renderer()).with_concurrency(3);
        let request = AnalysisRequest::new(AnalysisMode::DetectText, OutputMode::Raw);

        let AggregatedResult::Json(Value::Array(pages)) =
            aggregator.run(&pdf(3), &request).await.unwrap()
        else {
            panic!("expected a JSON array");
        };

        assert_eq!(pages.len(), 3);
        for (page, expected_first) in pages.iter().zip(["Invoice", "ACME", "total"]) {
            assert_eq!(page["DocumentMetadata"]["Pages"], 1);
            assert_eq!(page["Blocks"][1]["Text"], expected_first);
        }
    }

    #[tokio::test]
    async fn test_single_unit_raw_is_bare_object() {
        let provider = Arc::new(ScriptedProvider::new(three_pages()));
        let aggregator = aggregator(provider, tracking_renderer());
        let request = AnalysisRequest::new(AnalysisMode::DetectText, OutputMode::Raw);

        let result = aggregator.run(&pdf(1), &request).await.unwrap();
        let AggregatedResult::Json(value) = result else {
            panic!("expected JSON");
        };
        assert!(value.is_object());
        assert!(value["Blocks"].is_array());
    }

    #[tokio::test]
    async fn test_single_page_matches_multi_unit_merge() {
        let provider = Arc::new(ScriptedProvider::new(three_pages()));
        let aggregator = aggregator(provider.clone(), tracking_renderer());
        let output = OutputMode::Text(Granularity::Line);
        let request = AnalysisRequest::new(
            AnalysisMode::Analyze(FeatureSet::parse("TABLES")),
            output,
        );

        let direct = aggregator.run(&pdf(1), &request).await.unwrap();

        let page = provider
            .respond(&RequestPayload::ByBytes(b"(Page 1)".to_vec()))
            .unwrap();
        let repeated = aggregator.merge(vec![page.clone(), page], output).unwrap();

        assert_eq!(direct, AggregatedResult::Text("Invoice\nACME\nTotal".to_string()));
        assert_eq!(repeated, direct);
    }

    #[tokio::test]
    async fn test_provider_failure_aborts_and_cleans_up() {
        let mut scripted = ScriptedProvider::new(three_pages());
        scripted.fail_page = Some(2);
        let provider = Arc::new(scripted);
        let renderer = tracking_renderer();
        let aggregator = aggregator(provider.clone(), renderer.clone());

        let err = aggregator.run(&pdf(3), &analyze_words()).await.unwrap_err();

        assert_eq!(err.stage(), Stage::Provider);
        assert_eq!(err.unit_index(), Some(2));
        assert_eq!(*provider.calls.lock().unwrap(), vec![1, 2]);

        let rendered = renderer.rendered.lock().unwrap();
        assert_eq!(rendered.len(), 3);
        assert!(rendered.iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn test_split_failure_is_reported() {
        let provider = Arc::new(ScriptedProvider::new(three_pages()));
        let aggregator = aggregator(provider.clone(), tracking_renderer());
        let broken = InputDocument::from_bytes(b"%PDF-broken".to_vec(), "application/pdf");

        let err = aggregator.run(&broken, &analyze_words()).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Split);
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_pdf_is_one_unit() {
        let provider = Arc::new(ScriptedProvider::new(three_pages()));
        let aggregator = aggregator(provider.clone(), tracking_renderer());
        let image = InputDocument::from_bytes(b"\x89PNG".to_vec(), "image/png");

        let result = aggregator.run(&image, &analyze_words()).await.unwrap();
        assert_eq!(
            result,
            AggregatedResult::Text("Invoice\nACME\nTotal".to_string())
        );
        assert_eq!(provider.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_join_pages() {
        let pages = vec!["a\nb".to_string(), "c".to_string()];
        assert_eq!(join_pages(&pages, PageJoin::Newline), "a\nb\nc");
        assert_eq!(join_pages(&pages, PageJoin::LegacyMarker), "/na\nb/nc");
    }

    #[tokio::test]
    async fn test_legacy_marker_output() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            vec!["alpha", "beta"],
            vec!["gamma", "ALPHA"],
        ]));
        let aggregator =
            aggregator(provider, tracking_renderer()).with_page_join(PageJoin::LegacyMarker);

        let result = aggregator.run(&pdf(2), &analyze_words()).await.unwrap();
        assert_eq!(
            result.into_field_value(),
            "/nalpha\nbeta/ngamma\nALPHA"
        );
    }
}
