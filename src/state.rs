use std::sync::Arc;

use crate::auth::{AuthError, TokenService};
use crate::config::AppConfig;
use crate::database::Stores;
use crate::filter::QueryCompiler;
use crate::observer::ObserverPipeline;
use crate::services::{Mailer, ResourceService};

/// Shared, read-only request context. Built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub stores: Stores,
    pub tokens: Arc<TokenService>,
    pub compiler: QueryCompiler,
    pub resources: ResourceService,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(config: AppConfig, stores: Stores, mailer: Arc<dyn Mailer>) -> Result<Self, AuthError> {
        let tokens = TokenService::new(stores.credentials.clone(), &config.security)?;
        let compiler = QueryCompiler::new(config.filter.clone());
        let resources = ResourceService::new(stores.documents.clone(), ObserverPipeline::with_defaults());

        Ok(Self {
            config: Arc::new(config),
            stores,
            tokens: Arc::new(tokens),
            compiler,
            resources,
            mailer,
        })
    }
}
