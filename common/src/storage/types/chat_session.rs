#![allow(clippy::module_name_repetitions)]
use surrealdb::sql::Datetime as SurrealDatetime;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Sliding-window cap on a session's message history.
pub const MAX_SESSION_MESSAGES: usize = 32;

/// How many times an append is retried after losing a revision race.
const MAX_APPEND_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: String) -> Self {
        Self {
            role,
            content,
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role, self.content)
    }
}

stored_object!(ChatSession, "chat_session", {
    user_id: String,
    messages: Vec<ChatMessage>,
    revision: u64
});

impl ChatSession {
    pub fn new(user_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            user_id,
            messages: Vec::new(),
            revision: 0,
        }
    }

    /// Resolve a session by `(id, owner)`. A session owned by someone else
    /// resolves as not-found, never as the foreign record.
    pub async fn find_owned(
        id: &str,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let session: Option<ChatSession> = db.get_item(id).await?;
        match session {
            Some(session) if session.user_id == user_id => Ok(session),
            _ => Err(AppError::NotFound(format!("Session {id} not found"))),
        }
    }

    /// Evict oldest messages until the history fits the sliding window.
    /// Ordering of the retained suffix is untouched.
    pub fn apply_window(messages: &mut Vec<ChatMessage>) {
        if messages.len() > MAX_SESSION_MESSAGES {
            let overflow = messages.len() - MAX_SESSION_MESSAGES;
            messages.drain(..overflow);
        }
    }

    /// Append messages with an optimistic-concurrency check: the update only
    /// lands if the stored revision still matches the revision this copy read.
    /// Returns `None` when another writer got there first.
    pub async fn try_append(
        &self,
        new_messages: &[ChatMessage],
        db: &SurrealDbClient,
    ) -> Result<Option<ChatSession>, AppError> {
        let mut messages = self.messages.clone();
        messages.extend_from_slice(new_messages);
        Self::apply_window(&mut messages);

        const APPEND_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET messages = $messages,
                revision = revision + 1,
                updated_at = $now
            WHERE revision = $expected_version AND user_id = $user_id
            RETURN *;
        "#;

        let now = chrono::Utc::now();
        let mut result = db
            .client
            .query(APPEND_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("messages", messages))
            .bind(("expected_version", self.revision))
            .bind(("user_id", self.user_id.clone()))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let updated: Option<ChatSession> = result.take(0)?;
        Ok(updated)
    }

    /// Append with bounded re-read retries; surfaces `Conflict` once the
    /// budget is exhausted so the caller can retry the whole turn.
    pub async fn append_messages(
        session_id: &str,
        user_id: &str,
        new_messages: &[ChatMessage],
        db: &SurrealDbClient,
    ) -> Result<ChatSession, AppError> {
        for _ in 0..MAX_APPEND_ATTEMPTS {
            let current = Self::find_owned(session_id, user_id, db).await?;
            if let Some(updated) = current.try_append(new_messages, db).await? {
                return Ok(updated);
            }
            tracing::debug!(%session_id, "session append lost revision race, re-reading");
        }

        Err(AppError::Conflict(format!(
            "Concurrent updates to session {session_id}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_db() -> SurrealDbClient {
        let namespace = "test_ns";
        let database = Uuid::new_v4().to_string();
        SurrealDbClient::memory(namespace, &database)
            .await
            .expect("in-memory surrealdb")
    }

    fn user_message(content: &str) -> ChatMessage {
        ChatMessage::new(ChatRole::User, content.to_string())
    }

    #[tokio::test]
    async fn test_new_session_is_empty() {
        let session = ChatSession::new("user123".to_string());
        assert!(session.messages.is_empty());
        assert_eq!(session.revision, 0);
        assert!(!session.id.is_empty());
    }

    #[tokio::test]
    async fn test_append_and_fetch() {
        let db = memory_db().await;
        let session = ChatSession::new("user123".to_string());
        db.store_item(session.clone()).await.expect("store");

        let updated = ChatSession::append_messages(
            &session.id,
            "user123",
            &[user_message("hello")],
            &db,
        )
        .await
        .expect("append");

        assert_eq!(updated.messages.len(), 1);
        assert_eq!(updated.messages[0].content, "hello");
        assert_eq!(updated.revision, 1);
    }

    #[tokio::test]
    async fn test_sliding_window_keeps_most_recent_in_order() {
        let db = memory_db().await;
        let session = ChatSession::new("user123".to_string());
        db.store_item(session.clone()).await.expect("store");

        let mut latest = session;
        for i in 0..40 {
            latest = ChatSession::append_messages(
                &latest.id,
                "user123",
                &[user_message(&format!("message {i}"))],
                &db,
            )
            .await
            .expect("append");
        }

        assert_eq!(latest.messages.len(), MAX_SESSION_MESSAGES);
        // Exactly the most recent 32, original order preserved
        for (offset, message) in latest.messages.iter().enumerate() {
            assert_eq!(message.content, format!("message {}", 8 + offset));
        }
    }

    #[tokio::test]
    async fn test_stale_copy_append_conflicts() {
        let db = memory_db().await;
        let session = ChatSession::new("user123".to_string());
        db.store_item(session.clone()).await.expect("store");

        // A second writer bumps the revision
        ChatSession::append_messages(&session.id, "user123", &[user_message("first")], &db)
            .await
            .expect("append");

        // The stale copy's conditional write misses
        let raced = session
            .try_append(&[user_message("second")], &db)
            .await
            .expect("query ok");
        assert!(raced.is_none());

        // The re-reading helper converges anyway
        let converged = ChatSession::append_messages(
            &session.id,
            "user123",
            &[user_message("second")],
            &db,
        )
        .await
        .expect("append after race");
        assert_eq!(converged.messages.len(), 2);
        assert_eq!(converged.messages[1].content, "second");
    }

    #[tokio::test]
    async fn test_find_owned_cross_owner_is_not_found() {
        let db = memory_db().await;
        let session = ChatSession::new("owner".to_string());
        db.store_item(session.clone()).await.expect("store");

        let result = ChatSession::find_owned(&session.id, "intruder", &db).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_append_to_foreign_session_is_not_found() {
        let db = memory_db().await;
        let session = ChatSession::new("owner".to_string());
        db.store_item(session.clone()).await.expect("store");

        let result = ChatSession::append_messages(
            &session.id,
            "intruder",
            &[user_message("sneaky")],
            &db,
        )
        .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
