use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use bytes::Bytes;
use common::storage::types::user::User;
use serde::Deserialize;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub message: String,
    pub emotion: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, TryFromMultipart)]
pub struct VoiceParams {
    pub file: FieldData<Bytes>,
    pub session_id: Option<String>,
}

pub async fn ask(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Json(input): Json<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    info!(user_id = %user.id, "Received chat query");

    let session = state
        .conversation
        .resolve(&user.id, input.session_id.as_deref())
        .await?;
    let outcome = state
        .conversation
        .turn(&session, &input.message, input.emotion.as_deref())
        .await?;

    Ok((StatusCode::OK, Json(outcome)))
}

pub async fn voice(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    TypedMultipart(input): TypedMultipart<VoiceParams>,
) -> Result<impl IntoResponse, ApiError> {
    info!(
        user_id = %user.id,
        bytes = input.file.contents.len(),
        "Received voice query"
    );

    let outcome = state
        .conversation
        .voice_turn(&user.id, input.session_id.as_deref(), input.file.contents)
        .await?;

    Ok((StatusCode::OK, Json(outcome)))
}

pub async fn history(
    State(state): State<ApiState>,
    Extension(user): Extension<User>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state
        .conversation
        .fetch_history(&user.id, &session_id)
        .await?;

    Ok((StatusCode::OK, Json(messages)))
}
