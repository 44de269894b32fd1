#![allow(clippy::missing_docs_in_private_items)]

pub mod chunker;
pub mod indexer;
pub mod pdf_text;

pub use indexer::{DocumentIndexer, IndexingReport};
