use state_machines::state_machine;
use surrealdb::sql::Datetime as SurrealDatetime;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum DocumentStatus {
    #[serde(rename = "Processing")]
    #[default]
    Processing,
    #[serde(rename = "Ready")]
    Ready,
    #[serde(rename = "Error")]
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "Processing",
            DocumentStatus::Ready => "Ready",
            DocumentStatus::Error => "Error",
        }
    }

    /// Ready and Error are terminal for one upload attempt; a retry is a new upload.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Ready | DocumentStatus::Error)
    }
}

#[derive(Debug, Clone, Copy)]
enum DocumentTransition {
    Complete,
    Fail,
}

impl DocumentTransition {
    fn as_str(&self) -> &'static str {
        match self {
            DocumentTransition::Complete => "complete",
            DocumentTransition::Fail => "fail",
        }
    }
}

mod lifecycle {
    use super::state_machine;

    state_machine! {
        name: DocumentLifecycleMachine,
        initial: Processing,
        states: [Processing, Ready, Error],
        events {
            complete {
                transition: { from: Processing, to: Ready }
            }
            fail {
                transition: { from: Processing, to: Error }
            }
        }
    }

    pub(super) fn processing() -> DocumentLifecycleMachine<(), Processing> {
        DocumentLifecycleMachine::new(())
    }
}

fn invalid_transition(status: &DocumentStatus, event: DocumentTransition) -> AppError {
    AppError::Validation(format!(
        "Invalid document transition: {} -> {}",
        status.as_str(),
        event.as_str()
    ))
}

fn compute_next_status(
    status: &DocumentStatus,
    event: DocumentTransition,
) -> Result<DocumentStatus, AppError> {
    use lifecycle::processing;
    match (status, event) {
        (DocumentStatus::Processing, DocumentTransition::Complete) => processing()
            .complete()
            .map(|_| DocumentStatus::Ready)
            .map_err(|_| invalid_transition(status, event)),
        (DocumentStatus::Processing, DocumentTransition::Fail) => processing()
            .fail()
            .map(|_| DocumentStatus::Error)
            .map_err(|_| invalid_transition(status, event)),
        _ => Err(invalid_transition(status, event)),
    }
}

stored_object!(Document, "document", {
    user_id: String,
    file_name: String,
    blob_locator: String,
    storage_path: String,
    sha256: String,
    mime_type: String,
    status: DocumentStatus
});

impl Document {
    pub fn new(
        id: String,
        user_id: String,
        file_name: String,
        blob_locator: String,
        storage_path: String,
        sha256: String,
        mime_type: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            user_id,
            file_name,
            blob_locator,
            storage_path,
            sha256,
            mime_type,
            status: DocumentStatus::Processing,
        }
    }

    /// Resolve a document by `(id, owner)`. A document owned by someone else
    /// resolves as not-found so existence never leaks across owners.
    pub async fn find_owned(
        id: &str,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let document: Option<Document> = db.get_item(id).await?;
        match document {
            Some(doc) if doc.user_id == user_id => Ok(doc),
            _ => Err(AppError::NotFound(format!("Document {id} not found"))),
        }
    }

    pub async fn list_for_user(
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let documents: Vec<Document> = db
            .client
            .query(
                "SELECT * FROM type::table($table) WHERE user_id = $user_id ORDER BY created_at DESC",
            )
            .bind(("table", Self::table_name()))
            .bind(("user_id", user_id.to_string()))
            .await?
            .take(0)?;

        Ok(documents)
    }

    pub async fn mark_ready(&self, db: &SurrealDbClient) -> Result<Document, AppError> {
        self.transition(DocumentTransition::Complete, db).await
    }

    pub async fn mark_error(&self, db: &SurrealDbClient) -> Result<Document, AppError> {
        self.transition(DocumentTransition::Fail, db).await
    }

    /// Conditional status update: only a currently-Processing record moves.
    async fn transition(
        &self,
        event: DocumentTransition,
        db: &SurrealDbClient,
    ) -> Result<Document, AppError> {
        let next = compute_next_status(&self.status, event)?;

        const TRANSITION_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET status = $next,
                updated_at = $now
            WHERE status = $processing
            RETURN *;
        "#;

        let now = chrono::Utc::now();
        let mut result = db
            .client
            .query(TRANSITION_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("next", next.as_str()))
            .bind(("processing", DocumentStatus::Processing.as_str()))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let updated: Option<Document> = result.take(0)?;
        updated.ok_or_else(|| invalid_transition(&self.status, event))
    }

    /// Replaces any character outside `[A-Za-z0-9._]` to keep storage paths flat.
    pub fn sanitize_file_name(file_name: &str) -> String {
        file_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}
