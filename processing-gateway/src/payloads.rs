//! Wire types for the document-processing service.
//!
//! The remote service speaks camelCase JSON; these types own the mapping so
//! the rest of the workspace never sees raw `serde_json::Value`s.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeriveChunksRequest {
    pub doc_id: String,
    pub user_id: String,
    pub file_url: String,
}

/// One derived chunk as the remote service reports it. `order` and `chunk_id`
/// are optional on the wire; callers fall back to positional values.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkFragment {
    pub text: String,
    #[serde(default)]
    pub order: Option<u32>,
    #[serde(default)]
    pub chunk_id: Option<String>,
    #[serde(default)]
    pub vector_ref: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeriveChunksResponse {
    #[serde(default)]
    pub chunks: Vec<ChunkFragment>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropVectorsRequest {
    pub doc_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ContextMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub user_id: String,
    pub query: String,
    pub emotion: String,
    pub history: Vec<ContextMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerPayload {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Transcription {
    pub text: String,
    #[serde(default = "default_emotion")]
    pub emotion: String,
}

fn default_emotion() -> String {
    "neutral".to_string()
}
