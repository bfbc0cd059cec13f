use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use bytes::Bytes;
use common::storage::types::{document::Document, user::User};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, TryFromMultipart)]
pub struct UploadParams {
    pub file: FieldData<Bytes>,
}

/// What a listing exposes about a document; storage internals stay private.
#[derive(Debug, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub file_name: String,
    pub status: String,
    pub mime_type: String,
    pub created_at: String,
}

impl From<Document> for DocumentSummary {
    fn from(document: Document) -> Self {
        Self {
            id: document.id,
            file_name: document.file_name,
            status: document.status.as_str().to_string(),
            mime_type: document.mime_type,
            created_at: document.created_at.to_rfc3339(),
        }
    }
}

pub async fn upload_document(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    TypedMultipart(input): TypedMultipart<UploadParams>,
) -> Result<impl IntoResponse, ApiError> {
    let file_name = input
        .file
        .metadata
        .file_name
        .ok_or_else(|| ApiError::ValidationError("Uploaded file must have a name".to_string()))?;

    if input.file.contents.len() > state.config.upload_max_body_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "Upload exceeds the {} byte limit",
            state.config.upload_max_body_bytes
        )));
    }

    info!(
        user_id = %user.id,
        %file_name,
        bytes = input.file.contents.len(),
        "Received document upload"
    );

    let receipt = state
        .ingestion
        .ingest(&user.id, input.file.contents, &file_name)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

pub async fn list_documents(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, ApiError> {
    let documents = state.ingestion.list(&user.id).await?;
    let summaries: Vec<DocumentSummary> = documents.into_iter().map(Into::into).collect();

    Ok((StatusCode::OK, Json(summaries)))
}

pub async fn delete_document(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Path(document_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.ingestion.delete(&user.id, &document_id).await?;

    Ok((StatusCode::OK, Json(json!({ "status": "success" }))))
}
