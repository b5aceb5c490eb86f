//! Remote text analysis of multi-page documents.
//!
//! A document is split into single-page units, each unit is sent to the
//! analysis provider either by object-storage reference or as raw bytes, and
//! the per-page results are merged back into one text or JSON result:
//!
//! - [`PageSplitter`] decides whether to split and renders pages via a [`PageRenderer`]
//! - [`SourceResolver`] picks [`RequestPayload::ByReference`] or [`RequestPayload::ByBytes`]
//! - [`AnalysisClient`] makes exactly one [`RemoteProvider`] call per unit
//! - [`blocks`] and [`dedup`] flatten and clean provider output
//! - [`PageAggregator`] runs the whole thing and releases rendered pages

mod aggregator;
mod backend;
pub mod blocks;
pub mod dedup;
mod document;
mod features;
mod pdf_utils;
mod source;
mod splitter;
mod textract;

pub use aggregator::{
    AggregateError, AggregatedResult, AnalysisMode, AnalysisRequest, OutputMode, PageAggregator,
    Stage, UnitFailure,
};
pub use backend::{AnalysisClient, ProviderError, RemoteProvider, DEADLINE_STATUS};
pub use blocks::{AnalysisResult, Block, Granularity, UnknownGranularity};
pub use document::{DocumentContent, InputDocument, PageUnit};
pub use features::{FeatureSet, DEFAULT_FEATURES};
pub use pdf_utils::{LopdfRenderer, PopplerRenderer};
pub use source::{RequestPayload, ResolveError, SourceResolver};
pub use splitter::{PageRenderer, PageSplitter, SplitError};
pub use textract::TextractHttpProvider;
