use ashva_core::MembershipEngine;
use sqlx::{Pool, Postgres};
use std::sync::Arc;

use crate::config::AppConfig;

/// Shared application state across all routes and services
pub struct AppState {
    pub engine: MembershipEngine,

    /// Database connection pool, absent when running on the in-memory store
    pub db_pool: Option<Arc<Pool<Postgres>>>,

    pub config: AppConfig,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        engine: MembershipEngine,
        db_pool: Option<Arc<Pool<Postgres>>>,
        config: AppConfig,
    ) -> Self {
        Self {
            engine,
            db_pool,
            config,
        }
    }

    pub fn engine(&self) -> &MembershipEngine {
        &self.engine
    }

    /// Get a reference to the database pool (if available)
    pub fn db_pool(&self) -> Option<&Pool<Postgres>> {
        self.db_pool.as_deref()
    }
}
