use std::sync::Arc;

use dashmap::DashMap;
use db::DBService;
use services::services::{
    dashboard::DashboardService, gemini_api::GeminiApiClient, inventory::InventoryService,
    visit_workflow::VisitWorkflow,
};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

/// Shared application state. Workflows for visits in progress live in
/// memory only; completed visits are persisted through the workflow's sink.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DBService>,
    pub inventory: InventoryService,
    pub dashboard: DashboardService,
    pub workflows: Arc<DashMap<Uuid, Arc<Mutex<VisitWorkflow>>>>,
    pub gemini: Option<GeminiApiClient>,
}

impl AppState {
    pub fn new(db: DBService) -> Self {
        let gemini = match GeminiApiClient::from_env() {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("Assistant disabled: {}", e);
                None
            }
        };

        Self {
            inventory: InventoryService::new(db.pool.clone()),
            dashboard: DashboardService::new(db.pool.clone()),
            db: Arc::new(db),
            workflows: Arc::new(DashMap::new()),
            gemini,
        }
    }
}
