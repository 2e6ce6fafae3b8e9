use std::{future::Future, sync::Arc};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::sync::OnceCell;

use crate::config::AppConfig;

/// Failure of a repository call, independent of the backing store.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db_err) = e.as_database_error() {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                return RepoError::UniqueViolation(constraint);
            }
        }
        RepoError::Database(e)
    }
}

/// Builds the pool without connecting, so the service starts (and reports 503
/// on `/healthz`) while the database is unreachable.
pub fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect_lazy(&config.database_url)
        .context("parse database url")
}

/// Migration state shared by the repositories. Migrations run on first use
/// and are retried on every call until one attempt succeeds.
#[derive(Clone, Default)]
pub struct Schema {
    applied: Arc<OnceCell<()>>,
}

impl Schema {
    pub async fn ready(&self, db: &PgPool) -> Result<(), RepoError> {
        self.ensure(|| async {
            sqlx::migrate!("./migrations")
                .run(db)
                .await
                .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
        })
        .await
    }

    async fn ensure<F, Fut>(&self, apply: F) -> Result<(), RepoError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), sqlx::Error>>,
    {
        self.applied.get_or_try_init(apply).await?;
        Ok(())
    }
}

pub async fn ping(db: &PgPool) -> Result<(), RepoError> {
    sqlx::query("SELECT 1").execute(db).await?;
    Ok(())
}
