#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod acquire;
pub mod browser;
pub mod extractor;
pub mod navigator;
pub mod pipeline;

pub use pipeline::{IngestionConfig, IngestionPipeline, IngestionReport};
