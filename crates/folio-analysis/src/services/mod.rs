//! Operations that apply the OCR core to host documents.

pub mod extraction;

pub use extraction::{
    DocumentHandle, DocumentHost, ExtractionOperation, ExtractionParams, HostError,
    LocalDocumentHost, OperationError, OperationKind,
};
