#![allow(dead_code)]

pub mod config;
pub mod operations;
pub mod state_machine;

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::db::config::{DbConfig, DbConfigError};
use crate::db::state_machine::{DatabaseState, DatabaseStateMachine};

/// Single-primary Postgres repository. The donor's dual-write manager,
/// conflict resolver, and sqlite/cross-database sync machinery have no
/// counterpart here — this crate talks to one Postgres instance.
#[derive(Clone)]
pub struct DatabaseProxy {
    pool: PgPool,
    state_machine: Arc<RwLock<DatabaseStateMachine>>,
}

impl DatabaseProxy {
    pub async fn from_env() -> Result<Arc<Self>, DbInitError> {
        let config = DbConfig::from_env()?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await?;

        Ok(Arc::new(Self {
            pool,
            state_machine: Arc::new(RwLock::new(DatabaseStateMachine::default())),
        }))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn state_machine(&self) -> Arc<RwLock<DatabaseStateMachine>> {
        Arc::clone(&self.state_machine)
    }

    /// `SELECT 1` against the primary pool, with a bounded timeout; updates
    /// the connectivity state used by `/health`.
    pub async fn check_health(&self) -> DatabaseState {
        let result = tokio::time::timeout(Duration::from_secs(3), sqlx::query("SELECT 1").execute(&self.pool)).await;

        let state = match result {
            Ok(Ok(_)) => DatabaseState::Normal,
            _ => DatabaseState::Unavailable,
        };

        self.state_machine.write().await.set_state(state);
        state
    }
}

#[derive(Debug, Error)]
pub enum DbInitError {
    #[error(transparent)]
    Config(#[from] DbConfigError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
