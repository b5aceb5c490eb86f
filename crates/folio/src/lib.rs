//! Shared foundation for folio: configuration, storage references and
//! small utilities used by the analysis crate and the CLI.

pub mod config;
pub mod storage;
pub mod utils;
