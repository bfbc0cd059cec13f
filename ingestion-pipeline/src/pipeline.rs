use std::sync::Arc;

use bytes::Bytes;
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        store::StorageManager,
        types::{chunk::DocumentChunk, document::Document},
    },
};
use processing_gateway::{payloads::ChunkFragment, ProcessingGateway};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Returned to the caller once the document record exists; processing may
/// still be in flight or already failed, observable via the listing status.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub document_id: String,
    pub file_name: String,
}

/// Orchestrates the upload lifecycle: blob write, metadata checkpoint, chunk
/// derivation via the processing service, and the terminal status transition.
pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    storage: StorageManager,
    gateway: Arc<dyn ProcessingGateway>,
}

impl IngestionPipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        storage: StorageManager,
        gateway: Arc<dyn ProcessingGateway>,
    ) -> Self {
        Self {
            db,
            storage,
            gateway,
        }
    }

    /// Ingest an uploaded document for a user.
    ///
    /// Ordered checkpoints: the blob write must succeed before any metadata
    /// exists, and the `Processing` record must exist before the gateway is
    /// involved. After that checkpoint the receipt is returned even when
    /// processing fails; callers observe the outcome through the status.
    pub async fn ingest(
        &self,
        user_id: &str,
        data: Bytes,
        file_name: &str,
    ) -> Result<IngestReceipt, AppError> {
        if file_name.trim().is_empty() {
            return Err(AppError::Validation("File name must not be empty".into()));
        }

        let document_id = Uuid::new_v4().to_string();
        let sanitized = Document::sanitize_file_name(file_name);
        let storage_path = format!("users/{user_id}/documents/{document_id}");
        let location = format!("{storage_path}/{sanitized}");

        let sha256 = format!("{:x}", Sha256::digest(&data));
        let mime_type = mime_guess::from_path(&sanitized)
            .first_or_octet_stream()
            .to_string();

        self.storage.put(&location, data).await?;
        info!(%document_id, %location, "stored uploaded document blob");

        let document = Document::new(
            document_id.clone(),
            user_id.to_string(),
            sanitized.clone(),
            location.clone(),
            storage_path,
            sha256,
            mime_type,
        );
        self.db.store_item(document.clone()).await?;

        match self.derive_and_store_chunks(&document).await {
            Ok(count) => {
                info!(%document_id, chunk_count = count, "document processing complete");
                self.finish(&document, true).await;
            }
            Err(err) => {
                error!(%document_id, error = %err, "document processing failed");
                self.finish(&document, false).await;
            }
        }

        Ok(IngestReceipt {
            document_id,
            file_name: sanitized,
        })
    }

    /// Chunks are durably written strictly before the Ready transition.
    async fn derive_and_store_chunks(&self, document: &Document) -> Result<usize, AppError> {
        let fragments = self
            .gateway
            .derive_chunks(&document.id, &document.user_id, &document.blob_locator)
            .await?;

        let chunks: Vec<DocumentChunk> = fragments
            .into_iter()
            .enumerate()
            .map(|(position, fragment)| build_chunk(document, position, fragment))
            .collect();

        let count = chunks.len();
        self.db.store_items(chunks).await?;
        Ok(count)
    }

    /// Terminal status write. Best-effort: a failure here leaves the record
    /// visibly `Processing` and is only logged, never retried.
    async fn finish(&self, document: &Document, success: bool) {
        let result = if success {
            document.mark_ready(&self.db).await
        } else {
            document.mark_error(&self.db).await
        };

        if let Err(err) = result {
            error!(
                document_id = %document.id,
                error = %err,
                "failed to record terminal document status, record remains Processing"
            );
        }
    }

    /// Delete a document and everything derived from it.
    ///
    /// Chunks go before the document record so a failure mid-way never leaves
    /// orphaned chunks behind a deleted document. Blob and remote-vector
    /// cleanup are best-effort.
    pub async fn delete(&self, user_id: &str, document_id: &str) -> Result<(), AppError> {
        let document = Document::find_owned(document_id, user_id, &self.db).await?;

        DocumentChunk::delete_by_document(&document.id, &self.db).await?;
        self.db.delete_item::<Document>(&document.id).await?;

        if let Err(err) = self.storage.delete_prefix(&document.storage_path).await {
            warn!(document_id, error = %err, "failed to delete document blobs");
        }

        if let Err(err) = self.gateway.drop_vectors(&document.id, user_id).await {
            warn!(document_id, error = %err, "failed to drop remote vectors");
        }

        info!(document_id, "document deleted");
        Ok(())
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<Document>, AppError> {
        Document::list_for_user(user_id, &self.db).await
    }
}

fn build_chunk(document: &Document, position: usize, fragment: ChunkFragment) -> DocumentChunk {
    let ordinal = fragment.order.unwrap_or(position as u32);
    DocumentChunk::new(
        fragment.chunk_id,
        document.id.clone(),
        document.user_id.clone(),
        fragment.text,
        fragment.vector_ref,
        ordinal,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::storage::types::document::DocumentStatus;
    use processing_gateway::payloads::{AnswerPayload, AnswerRequest, Transcription};
    use std::sync::Mutex;

    struct FakeGateway {
        fragments: Vec<ChunkFragment>,
        fail_derive: bool,
        fail_drop: bool,
        dropped: Mutex<Vec<String>>,
        /// When set, derivation flips the document to `Error` mid-flight,
        /// standing in for a writer racing the terminal transition.
        flip_to_error_in: Option<Arc<SurrealDbClient>>,
    }

    impl FakeGateway {
        fn with_fragments(fragments: Vec<ChunkFragment>) -> Self {
            Self {
                fragments,
                fail_derive: false,
                fail_drop: false,
                dropped: Mutex::new(Vec::new()),
                flip_to_error_in: None,
            }
        }

        fn failing() -> Self {
            Self {
                fail_derive: true,
                ..Self::with_fragments(Vec::new())
            }
        }
    }

    #[async_trait]
    impl ProcessingGateway for FakeGateway {
        async fn derive_chunks(
            &self,
            doc_id: &str,
            _user_id: &str,
            _file_url: &str,
        ) -> Result<Vec<ChunkFragment>, AppError> {
            if self.fail_derive {
                return Err(AppError::Gateway("derivation unavailable".into()));
            }
            if let Some(db) = &self.flip_to_error_in {
                let document: Document = db
                    .get_item(doc_id)
                    .await
                    .expect("get")
                    .expect("document exists");
                document.mark_error(db).await.expect("flip status");
            }
            Ok(self.fragments.clone())
        }

        async fn drop_vectors(&self, doc_id: &str, _user_id: &str) -> Result<(), AppError> {
            if self.fail_drop {
                return Err(AppError::Gateway("vector removal unavailable".into()));
            }
            self.dropped.lock().expect("lock").push(doc_id.to_string());
            Ok(())
        }

        async fn answer(&self, _request: AnswerRequest) -> Result<AnswerPayload, AppError> {
            unimplemented!("not used by ingestion tests")
        }

        async fn transcribe(&self, _audio: Bytes) -> Result<Transcription, AppError> {
            unimplemented!("not used by ingestion tests")
        }
    }

    fn fragment(text: &str, order: Option<u32>, chunk_id: Option<&str>) -> ChunkFragment {
        ChunkFragment {
            text: text.to_string(),
            order,
            chunk_id: chunk_id.map(str::to_string),
            vector_ref: None,
        }
    }

    async fn pipeline_with(
        gateway: FakeGateway,
    ) -> (IngestionPipeline, Arc<SurrealDbClient>, Arc<FakeGateway>) {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("in-memory surrealdb"),
        );
        let gateway = Arc::new(gateway);
        let pipeline =
            IngestionPipeline::new(db.clone(), StorageManager::memory(), gateway.clone());
        (pipeline, db, gateway)
    }

    #[tokio::test]
    async fn test_ingest_success_marks_ready_with_chunks() {
        let gateway = FakeGateway::with_fragments(vec![
            fragment("first", Some(0), Some("remote-0")),
            fragment("second", None, None),
        ]);
        let (pipeline, db, _gateway) = pipeline_with(gateway).await;

        let receipt = pipeline
            .ingest("user123", Bytes::from_static(b"contents"), "notes.txt")
            .await
            .expect("ingest");
        assert_eq!(receipt.file_name, "notes.txt");

        let document: Document = db
            .get_item(&receipt.document_id)
            .await
            .expect("get")
            .expect("document exists");
        assert_eq!(document.status, DocumentStatus::Ready);
        assert_eq!(document.mime_type, "text/plain");
        assert!(!document.sha256.is_empty());

        let chunks = DocumentChunk::list_for_document(&receipt.document_id, &db)
            .await
            .expect("chunks");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id, "remote-0");
        assert_eq!(chunks[0].ordinal, 0);
        // Missing order falls back to the fragment position
        assert_eq!(chunks[1].ordinal, 1);

        assert!(pipeline
            .storage
            .exists(&document.blob_locator)
            .await
            .expect("exists"));
    }

    #[tokio::test]
    async fn test_ingest_assigns_positional_ordinals() {
        let fake = FakeGateway::with_fragments(vec![
            fragment("a", None, None),
            fragment("b", None, None),
            fragment("c", None, None),
        ]);
        let (pipeline, db, _gateway) = pipeline_with(fake).await;

        let receipt = pipeline
            .ingest("user123", Bytes::from_static(b"contents"), "notes.txt")
            .await
            .expect("ingest");

        let chunks = DocumentChunk::list_for_document(&receipt.document_id, &db)
            .await
            .expect("chunks");
        let ordinals: Vec<u32> = chunks.iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_ingest_zero_chunks_is_still_ready() {
        let (pipeline, db, _gateway) = pipeline_with(FakeGateway::with_fragments(Vec::new())).await;

        let receipt = pipeline
            .ingest("user123", Bytes::from_static(b"empty"), "blank.txt")
            .await
            .expect("ingest");

        let document: Document = db
            .get_item(&receipt.document_id)
            .await
            .expect("get")
            .expect("document exists");
        assert_eq!(document.status, DocumentStatus::Ready);
    }

    #[tokio::test]
    async fn test_ingest_gateway_failure_marks_error_but_returns_receipt() {
        let (pipeline, db, _gateway) = pipeline_with(FakeGateway::failing()).await;

        let receipt = pipeline
            .ingest("user123", Bytes::from_static(b"contents"), "notes.txt")
            .await
            .expect("receipt is returned despite processing failure");

        let document: Document = db
            .get_item(&receipt.document_id)
            .await
            .expect("get")
            .expect("document exists");
        assert_eq!(document.status, DocumentStatus::Error);

        let chunks = DocumentChunk::list_for_document(&receipt.document_id, &db)
            .await
            .expect("chunks");
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_status_write_miss_still_returns_receipt() {
        // The document is flipped out of Processing while chunks are being
        // derived, so the Ready transition misses its guard. The receipt is
        // still returned and the flipped status stands.
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("in-memory surrealdb"),
        );
        let gateway = Arc::new(FakeGateway {
            flip_to_error_in: Some(db.clone()),
            ..FakeGateway::with_fragments(vec![fragment("a", None, None)])
        });
        let pipeline = IngestionPipeline::new(db.clone(), StorageManager::memory(), gateway);

        let receipt = pipeline
            .ingest("user123", Bytes::from_static(b"contents"), "notes.txt")
            .await
            .expect("receipt is returned despite the missed transition");

        let document: Document = db
            .get_item(&receipt.document_id)
            .await
            .expect("get")
            .expect("document exists");
        assert_eq!(document.status, DocumentStatus::Error);

        // Chunks were written before the terminal write was attempted
        let chunks = DocumentChunk::list_for_document(&receipt.document_id, &db)
            .await
            .expect("chunks");
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_sanitizes_file_name_in_path() {
        let (pipeline, db, _gateway) = pipeline_with(FakeGateway::with_fragments(Vec::new())).await;

        let receipt = pipeline
            .ingest("user123", Bytes::from_static(b"x"), "my report (v2).pdf")
            .await
            .expect("ingest");
        assert_eq!(receipt.file_name, "my_report__v2_.pdf");

        let document: Document = db
            .get_item(&receipt.document_id)
            .await
            .expect("get")
            .expect("document exists");
        assert!(document.blob_locator.ends_with("/my_report__v2_.pdf"));
        assert_eq!(document.mime_type, "application/pdf");
    }

    #[tokio::test]
    async fn test_ingest_rejects_empty_file_name() {
        let (pipeline, _db, _gateway) = pipeline_with(FakeGateway::with_fragments(Vec::new())).await;

        let result = pipeline
            .ingest("user123", Bytes::from_static(b"x"), "   ")
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_removes_chunks_document_blob_and_vectors() {
        let fake = FakeGateway::with_fragments(vec![fragment("a", None, None)]);
        let (pipeline, db, gateway) = pipeline_with(fake).await;

        let receipt = pipeline
            .ingest("user123", Bytes::from_static(b"contents"), "notes.txt")
            .await
            .expect("ingest");
        let document: Document = db
            .get_item(&receipt.document_id)
            .await
            .expect("get")
            .expect("document exists");

        pipeline
            .delete("user123", &receipt.document_id)
            .await
            .expect("delete");

        let gone: Option<Document> = db.get_item(&receipt.document_id).await.expect("get");
        assert!(gone.is_none());

        let chunks = DocumentChunk::list_for_document(&receipt.document_id, &db)
            .await
            .expect("chunks");
        assert!(chunks.is_empty());

        assert!(!pipeline
            .storage
            .exists(&document.blob_locator)
            .await
            .expect("exists"));

        let dropped = gateway.dropped.lock().expect("lock");
        assert_eq!(*dropped, vec![receipt.document_id.clone()]);
        drop(dropped);

        // Deleting again reports the document as gone
        let again = pipeline.delete("user123", &receipt.document_id).await;
        assert!(matches!(again, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_foreign_document_is_not_found() {
        let (pipeline, db, _gateway) = pipeline_with(FakeGateway::with_fragments(Vec::new())).await;

        let receipt = pipeline
            .ingest("owner", Bytes::from_static(b"contents"), "notes.txt")
            .await
            .expect("ingest");

        let result = pipeline.delete("intruder", &receipt.document_id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        // Nothing was deleted
        let still_there: Option<Document> =
            db.get_item(&receipt.document_id).await.expect("get");
        assert!(still_there.is_some());
    }

    #[tokio::test]
    async fn test_delete_survives_vector_drop_failure() {
        let gateway = FakeGateway {
            fail_drop: true,
            ..FakeGateway::with_fragments(Vec::new())
        };
        let (pipeline, db, _gateway) = pipeline_with(gateway).await;

        let receipt = pipeline
            .ingest("user123", Bytes::from_static(b"contents"), "notes.txt")
            .await
            .expect("ingest");

        pipeline
            .delete("user123", &receipt.document_id)
            .await
            .expect("delete succeeds despite vector drop failure");

        let gone: Option<Document> = db.get_item(&receipt.document_id).await.expect("get");
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn test_list_is_owner_scoped() {
        let (pipeline, _db, _gateway) = pipeline_with(FakeGateway::with_fragments(Vec::new())).await;

        pipeline
            .ingest("alice", Bytes::from_static(b"a"), "a.txt")
            .await
            .expect("ingest");
        pipeline
            .ingest("bob", Bytes::from_static(b"b"), "b.txt")
            .await
            .expect("ingest");

        let docs = pipeline.list("alice").await.expect("list");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].file_name, "a.txt");
    }
}
