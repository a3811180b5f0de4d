//! Process-wide state shared by the CLI handlers.
//!
//! Built once after configuration is loaded. Cloning is cheap: every member
//! is reference counted.

use std::sync::Arc;

use crate::config::Settings;
use crate::error::AppResult;
use crate::jobs::Engine;
use crate::repositories::{JobStore, open_store};
use crate::services::JobService;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn JobStore>,
    pub engine: Arc<Engine>,
    pub jobs: JobService,
}

impl AppState {
    /// Opens the configured store and wires the engine and job service on
    /// top of it. The scheduler backend is created but not started.
    pub async fn initialize(settings: Settings) -> AppResult<Self> {
        let store = open_store(&settings.database).await?;
        Self::with_store(settings, store).await
    }

    pub async fn with_store(settings: Settings, store: Arc<dyn JobStore>) -> AppResult<Self> {
        let engine = Arc::new(Engine::from_settings(&settings, Arc::clone(&store)).await?);
        let jobs = JobService::new(Arc::clone(&store), Arc::clone(&engine));

        Ok(Self {
            settings: Arc::new(settings),
            store,
            engine,
            jobs,
        })
    }
}
