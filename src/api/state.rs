use std::sync::Arc;

use crate::admin::AdminService;
use crate::config::AppConfig;
use crate::ranking::RankingEngine;
use crate::storage::ScoreStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ScoreStore>,
    pub ranking: RankingEngine,
    pub admin: AdminService,
    /// Trimmed admin secret; `None` disables the admin API.
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(store: Arc<dyn ScoreStore>, config: &AppConfig) -> Self {
        Self {
            ranking: RankingEngine::new(Arc::clone(&store), config.ranking.clone()),
            admin: AdminService::new(Arc::clone(&store)),
            admin_token: config.admin_token().map(Arc::from),
            store,
        }
    }
}
