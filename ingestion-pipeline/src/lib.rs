#![allow(clippy::missing_docs_in_private_items)]
pub mod pipeline;

pub use pipeline::{IngestReceipt, IngestionPipeline};
