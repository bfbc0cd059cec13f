use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use common::{error::AppError, utils::config::AppConfig};
use reqwest::multipart;
use tracing::{debug, warn};

use crate::payloads::{
    AnswerPayload, AnswerRequest, ChunkFragment, DeriveChunksRequest, DeriveChunksResponse,
    DropVectorsRequest, Transcription,
};

/// Seam between the orchestrators and the remote document-processing service.
/// Tests swap in fakes; production wires up [`HttpProcessingGateway`].
#[async_trait]
pub trait ProcessingGateway: Send + Sync {
    /// Ask the remote service to extract, chunk and embed a stored document.
    async fn derive_chunks(
        &self,
        doc_id: &str,
        user_id: &str,
        file_url: &str,
    ) -> Result<Vec<ChunkFragment>, AppError>;

    /// Drop any vectors the remote service holds for a document.
    async fn drop_vectors(&self, doc_id: &str, user_id: &str) -> Result<(), AppError>;

    /// Answer a query grounded in the user's documents, given recent history.
    async fn answer(&self, request: AnswerRequest) -> Result<AnswerPayload, AppError>;

    /// Transcribe an audio clip and classify its emotional tone.
    async fn transcribe(&self, audio: Bytes) -> Result<Transcription, AppError>;
}

pub struct HttpProcessingGateway {
    http: reqwest::Client,
    base_url: String,
    derive_timeout: Duration,
    answer_timeout: Duration,
}

impl HttpProcessingGateway {
    pub fn new(base_url: String, derive_timeout: Duration, answer_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            derive_timeout,
            answer_timeout,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(
            cfg.gateway_base_url.clone(),
            Duration::from_secs(cfg.gateway_derive_timeout_secs),
            Duration::from_secs(cfg.gateway_answer_timeout_secs),
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Shared non-2xx handling: the remote body is logged but never surfaced
    /// verbatim to callers.
    async fn check_status(response: reqwest::Response, context: &str) -> Result<reqwest::Response, AppError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(%status, context, %body, "processing service returned an error");
        Err(AppError::Gateway(format!(
            "Processing service {context} failed with status {status}"
        )))
    }

    fn decode_error(context: &str, err: &reqwest::Error) -> AppError {
        AppError::Validation(format!(
            "Processing service {context} returned a malformed payload: {err}"
        ))
    }
}

#[async_trait]
impl ProcessingGateway for HttpProcessingGateway {
    async fn derive_chunks(
        &self,
        doc_id: &str,
        user_id: &str,
        file_url: &str,
    ) -> Result<Vec<ChunkFragment>, AppError> {
        let request = DeriveChunksRequest {
            doc_id: doc_id.to_string(),
            user_id: user_id.to_string(),
            file_url: file_url.to_string(),
        };

        debug!(doc_id, "requesting chunk derivation");
        let response = self
            .http
            .post(self.endpoint("/process-document"))
            .timeout(self.derive_timeout)
            .json(&request)
            .send()
            .await?;
        let response = Self::check_status(response, "chunk derivation").await?;

        let payload: DeriveChunksResponse = response
            .json()
            .await
            .map_err(|e| Self::decode_error("chunk derivation", &e))?;

        debug!(doc_id, chunk_count = payload.chunks.len(), "chunk derivation complete");
        Ok(payload.chunks)
    }

    async fn drop_vectors(&self, doc_id: &str, user_id: &str) -> Result<(), AppError> {
        let request = DropVectorsRequest {
            doc_id: doc_id.to_string(),
            user_id: user_id.to_string(),
        };

        let response = self
            .http
            .post(self.endpoint("/delete-document"))
            .timeout(self.answer_timeout)
            .json(&request)
            .send()
            .await?;
        Self::check_status(response, "vector removal").await?;

        Ok(())
    }

    async fn answer(&self, request: AnswerRequest) -> Result<AnswerPayload, AppError> {
        let response = self
            .http
            .post(self.endpoint("/query-rag"))
            .timeout(self.answer_timeout)
            .json(&request)
            .send()
            .await?;
        let response = Self::check_status(response, "answer").await?;

        response
            .json()
            .await
            .map_err(|e| Self::decode_error("answer", &e))
    }

    async fn transcribe(&self, audio: Bytes) -> Result<Transcription, AppError> {
        let part = multipart::Part::bytes(audio.to_vec())
            .file_name("voice-query.webm")
            .mime_str("audio/webm")
            .map_err(|e| AppError::Gateway(format!("Failed to build audio upload: {e}")))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(self.endpoint("/voice-to-text-emotion"))
            .timeout(self.answer_timeout)
            .multipart(form)
            .send()
            .await?;
        let response = Self::check_status(response, "transcription").await?;

        response
            .json()
            .await
            .map_err(|e| Self::decode_error("transcription", &e))
    }
}
