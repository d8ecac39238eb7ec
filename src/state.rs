use std::sync::Arc;
use std::time::{Instant, SystemTime};

use tokio::sync::RwLock;

use crate::amas::AMASEngine;
use crate::db::state_machine::DatabaseStateMachine;
use crate::db::DatabaseProxy;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    started_at_system: SystemTime,
    db_proxy: Option<Arc<DatabaseProxy>>,
    amas_engine: Arc<AMASEngine>,
}

impl AppState {
    pub fn new(db_proxy: Option<Arc<DatabaseProxy>>) -> Self {
        let amas_engine = AMASEngine::new(crate::amas::AMASConfig::from_env(), db_proxy.clone());

        Self {
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
            db_proxy,
            amas_engine: Arc::new(amas_engine),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    pub fn db_state(&self) -> Option<Arc<RwLock<DatabaseStateMachine>>> {
        self.db_proxy.as_ref().map(|proxy| proxy.state_machine())
    }

    pub fn db_proxy(&self) -> Option<Arc<DatabaseProxy>> {
        self.db_proxy.clone()
    }

    pub fn amas_engine(&self) -> Arc<AMASEngine> {
        Arc::clone(&self.amas_engine)
    }
}
