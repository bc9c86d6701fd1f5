use crate::{config::AppConfig, db::DbPool};

/// Application context built once in `main` and handed to every handler.
/// Nothing reads process-wide state after startup.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: AppConfig,
}
