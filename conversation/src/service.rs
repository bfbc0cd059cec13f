use std::sync::Arc;

use bytes::Bytes;
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::chat_session::{ChatMessage, ChatRole, ChatSession},
    },
};
use processing_gateway::{
    payloads::{AnswerRequest, ContextMessage},
    ProcessingGateway,
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// How many recent messages accompany a query to the answering service.
pub const CONTEXT_WINDOW_MESSAGES: usize = 8;

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub answer: String,
    pub sources: Vec<String>,
    pub confidence: Option<f64>,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceOutcome {
    pub transcript: String,
    pub answer: Option<String>,
    pub emotion: String,
    pub sources: Vec<String>,
    /// Absent when no turn ran and no session was started (silent clip
    /// without a supplied session).
    pub session_id: Option<String>,
}

/// Orchestrates chat turns: session resolution, history persistence and the
/// grounded answer call.
pub struct ConversationService {
    db: Arc<SurrealDbClient>,
    gateway: Arc<dyn ProcessingGateway>,
}

impl ConversationService {
    pub fn new(db: Arc<SurrealDbClient>, gateway: Arc<dyn ProcessingGateway>) -> Self {
        Self { db, gateway }
    }

    /// Return the caller's session when the supplied id resolves to one they
    /// own; otherwise start a fresh empty session. A foreign-owner id behaves
    /// exactly like a missing one.
    pub async fn resolve(
        &self,
        user_id: &str,
        supplied: Option<&str>,
    ) -> Result<ChatSession, AppError> {
        if let Some(id) = supplied {
            match ChatSession::find_owned(id, user_id, &self.db).await {
                Ok(session) => return Ok(session),
                Err(AppError::NotFound(_)) => {
                    debug!(supplied = id, "supplied session did not resolve, starting fresh");
                }
                Err(err) => return Err(err),
            }
        }

        let session = ChatSession::new(user_id.to_string());
        self.db.store_item(session.clone()).await?;
        info!(session_id = %session.id, "started new chat session");
        Ok(session)
    }

    /// Run one turn of the conversation on an already-resolved session.
    ///
    /// The user message is persisted before the answer call, so a downstream
    /// failure leaves it in the history with no synthetic assistant reply.
    pub async fn turn(
        &self,
        session: &ChatSession,
        user_text: &str,
        emotion_hint: Option<&str>,
    ) -> Result<TurnOutcome, AppError> {
        if user_text.trim().is_empty() {
            return Err(AppError::Validation("Message must not be empty".into()));
        }

        let user_message = ChatMessage::new(ChatRole::User, user_text.to_string());
        let after_user = ChatSession::append_messages(
            &session.id,
            &session.user_id,
            std::slice::from_ref(&user_message),
            &self.db,
        )
        .await?;

        let history = context_window(&after_user.messages);
        let payload = self
            .gateway
            .answer(AnswerRequest {
                user_id: session.user_id.clone(),
                query: user_text.to_string(),
                emotion: emotion_hint.unwrap_or("neutral").to_string(),
                history,
            })
            .await?;

        let assistant_message = ChatMessage::new(ChatRole::Assistant, payload.answer.clone());
        ChatSession::append_messages(
            &session.id,
            &session.user_id,
            std::slice::from_ref(&assistant_message),
            &self.db,
        )
        .await?;

        Ok(TurnOutcome {
            answer: payload.answer,
            sources: payload.sources,
            confidence: payload.confidence,
            session_id: session.id.clone(),
        })
    }

    /// Voice entry point: transcribe first, then run a normal turn.
    ///
    /// An empty transcript short-circuits with nothing appended and no
    /// session started. When the downstream answer call fails after a
    /// successful transcription, the transcript itself is returned as the
    /// answer; the history keeps the user message. Persistence failures are
    /// not covered by that fallback and propagate typed.
    pub async fn voice_turn(
        &self,
        user_id: &str,
        supplied_session: Option<&str>,
        audio: Bytes,
    ) -> Result<VoiceOutcome, AppError> {
        let transcription = self.gateway.transcribe(audio).await?;

        if transcription.text.trim().is_empty() {
            debug!("empty transcript, skipping turn");
            return Ok(VoiceOutcome {
                transcript: transcription.text,
                answer: None,
                emotion: transcription.emotion,
                sources: Vec::new(),
                session_id: supplied_session.map(str::to_string),
            });
        }

        let session = self.resolve(user_id, supplied_session).await?;

        match self
            .turn(&session, &transcription.text, Some(&transcription.emotion))
            .await
        {
            Ok(outcome) => Ok(VoiceOutcome {
                transcript: transcription.text,
                answer: Some(outcome.answer),
                emotion: transcription.emotion,
                sources: outcome.sources,
                session_id: Some(outcome.session_id),
            }),
            // Only a failed answer call falls back to the transcript
            Err(err) if matches!(err, AppError::Gateway(_) | AppError::Reqwest(_)) => {
                warn!(session_id = %session.id, error = %err, "voice turn fell back to transcript");
                Ok(VoiceOutcome {
                    answer: Some(transcription.text.clone()),
                    transcript: transcription.text,
                    emotion: transcription.emotion,
                    sources: Vec::new(),
                    session_id: Some(session.id),
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Owner-scoped history read; foreign or missing sessions are `NotFound`.
    pub async fn fetch_history(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<ChatMessage>, AppError> {
        let session = ChatSession::find_owned(session_id, user_id, &self.db).await?;
        Ok(session.messages)
    }
}

/// Most recent messages, oldest first, reduced to role and content.
fn context_window(messages: &[ChatMessage]) -> Vec<ContextMessage> {
    let start = messages.len().saturating_sub(CONTEXT_WINDOW_MESSAGES);
    messages[start..]
        .iter()
        .map(|message| ContextMessage {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        })
        .collect()
}
