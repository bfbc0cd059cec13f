#![allow(clippy::missing_docs_in_private_items)]
pub mod service;

pub use service::{ConversationService, TurnOutcome, VoiceOutcome, CONTEXT_WINDOW_MESSAGES};
