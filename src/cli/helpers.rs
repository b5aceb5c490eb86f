//! Composition root: builds the analysis pipeline from settings.

use std::sync::Arc;
use std::time::Duration;

use folio::config::{RendererKind, Settings};
use folio::storage::{CachedProbe, ObjectStorageProbe, StaticProbe};
use folio_analysis::ocr::{
    AnalysisClient, LopdfRenderer, PageAggregator, PageRenderer, PageSplitter, PopplerRenderer,
    SourceResolver, TextractHttpProvider,
};
use folio_analysis::services::ExtractionOperation;

/// The object storage probe, evaluated at most once per process.
///
/// S3 counts as available only when the settings say so.
pub fn build_probe(settings: &Settings) -> Arc<dyn ObjectStorageProbe> {
    let available = settings.storage.s3_available.unwrap_or(false);
    Arc::new(CachedProbe::new(Arc::new(StaticProbe(available))))
}

fn build_renderer(kind: RendererKind) -> anyhow::Result<Arc<dyn PageRenderer>> {
    match kind {
        RendererKind::Lopdf => Ok(Arc::new(LopdfRenderer::new())),
        RendererKind::Poppler => {
            let poppler = PopplerRenderer::new();
            if !poppler.is_available() {
                anyhow::bail!(
                    "Renderer 'poppler' selected but pdfinfo/pdfseparate were not found. \
                     Install poppler-utils or set analysis.renderer = \"lopdf\"."
                );
            }
            Ok(Arc::new(poppler))
        }
    }
}

/// Build the aggregator with the provider client shared by every run.
pub fn build_aggregator(settings: &Settings) -> anyhow::Result<PageAggregator> {
    let timeout = Duration::from_secs(settings.provider.timeout_secs);
    let provider =
        TextractHttpProvider::new(settings.provider.endpoint_url()?, &settings.provider.headers)?;
    tracing::debug!(
        "Provider endpoint {} (timeout {}s)",
        settings.provider.endpoint_url()?,
        settings.provider.timeout_secs
    );

    let resolver = SourceResolver::new(settings.storage.location(), build_probe(settings))
        .force_reference(settings.storage.force_reference);
    let client = AnalysisClient::new(Arc::new(provider)).with_timeout(timeout);

    Ok(PageAggregator::new(
        PageSplitter::new(build_renderer(settings.analysis.renderer)?),
        resolver,
        client,
    )
    .with_concurrency(settings.analysis.dispatch_concurrency)
    .with_page_join(settings.analysis.page_join))
}

pub fn build_operation(settings: &Settings) -> anyhow::Result<ExtractionOperation> {
    Ok(ExtractionOperation::new(build_aggregator(settings)?))
}
