#![allow(clippy::module_name_repetitions)]
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(DocumentChunk, "document_chunk", {
    document_id: String,
    user_id: String,
    text: String,
    vector_ref: Option<String>,
    ordinal: u32
});

impl DocumentChunk {
    pub fn new(
        id: Option<String>,
        document_id: String,
        user_id: String,
        text: String,
        vector_ref: Option<String>,
        ordinal: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id
                .filter(|candidate| !candidate.trim().is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            created_at: now,
            updated_at: now,
            document_id,
            user_id,
            text,
            vector_ref,
            ordinal,
        }
    }

    pub async fn list_for_document(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let chunks: Vec<DocumentChunk> = db
            .client
            .query(
                "SELECT * FROM type::table($table) WHERE document_id = $document_id ORDER BY ordinal ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("document_id", document_id.to_string()))
            .await?
            .take(0)?;

        Ok(chunks)
    }

    pub async fn delete_by_document(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query("DELETE type::table($table) WHERE document_id = $document_id")
            .bind(("table", Self::table_name()))
            .bind(("document_id", document_id.to_string()))
            .await?;

        Ok(())
    }
}
