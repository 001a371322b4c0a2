use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

use crate::appointments::repo::{AppointmentLedger, MemoryAppointmentLedger, PgAppointmentLedger};
use crate::config::{AppConfig, StorageBackend};
use crate::messages::repo::{MemoryMessageStore, MessageStore, PgMessageStore};
use crate::users::repo::{MemoryUserDirectory, PgUserDirectory, UserDirectory};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Option<PgPool>,
    pub users: Arc<dyn UserDirectory>,
    pub messages: Arc<dyn MessageStore>,
    pub appointments: Arc<dyn AppointmentLedger>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        match config.storage {
            StorageBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL must be set")?;
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(config.db_max_connections)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                Ok(Self::postgres(db, config))
            }
            StorageBackend::Memory => {
                tracing::warn!("using in-memory storage; data is lost on restart");
                Ok(Self::in_memory_with(config))
            }
        }
    }

    pub fn postgres(db: PgPool, config: Arc<AppConfig>) -> Self {
        Self {
            config,
            users: Arc::new(PgUserDirectory::new(db.clone())) as Arc<dyn UserDirectory>,
            messages: Arc::new(PgMessageStore::new(db.clone())) as Arc<dyn MessageStore>,
            appointments: Arc::new(PgAppointmentLedger::new(db.clone()))
                as Arc<dyn AppointmentLedger>,
            db: Some(db),
        }
    }

    pub fn in_memory_with(config: Arc<AppConfig>) -> Self {
        Self {
            config,
            db: None,
            users: Arc::new(MemoryUserDirectory::new()) as Arc<dyn UserDirectory>,
            messages: Arc::new(MemoryMessageStore::new()) as Arc<dyn MessageStore>,
            appointments: Arc::new(MemoryAppointmentLedger::new()) as Arc<dyn AppointmentLedger>,
        }
    }

    /// Fresh state over empty in-memory stores with test JWT settings.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::in_memory_with(Arc::new(AppConfig::for_tests()))
    }
}
