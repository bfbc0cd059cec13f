#![allow(clippy::missing_docs_in_private_items)]
pub mod client;
pub mod payloads;

pub use client::{HttpProcessingGateway, ProcessingGateway};
