use std::sync::Arc;

use common::{
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::config::AppConfig,
};
use conversation::ConversationService;
use ingestion_pipeline::IngestionPipeline;
use processing_gateway::ProcessingGateway;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub ingestion: Arc<IngestionPipeline>,
    pub conversation: Arc<ConversationService>,
}

impl ApiState {
    pub fn new(
        db: Arc<SurrealDbClient>,
        config: AppConfig,
        storage: StorageManager,
        gateway: Arc<dyn ProcessingGateway>,
    ) -> Self {
        let ingestion = Arc::new(IngestionPipeline::new(
            db.clone(),
            storage,
            gateway.clone(),
        ));
        let conversation = Arc::new(ConversationService::new(db.clone(), gateway));

        Self {
            db,
            config,
            ingestion,
            conversation,
        }
    }
}
