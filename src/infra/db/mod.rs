//! Postgres-backed repository implementations.

mod todos;
mod util;

pub use util::map_sqlx_error;

use std::{str::FromStr, sync::Arc};

use sqlx::{
    Postgres, Transaction,
    postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode},
    query_scalar,
};

use crate::config::{DatabaseSettings, DbSslMode};

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Start a transaction. Dropping it without `commit` rolls it back, which
    /// covers early returns and unwinding alike.
    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Open a bounded pool. Callers beyond `max_connections` wait for a free
    /// connection; idle connections are closed after `idle_timeout`.
    pub async fn connect(url: &str, settings: &DatabaseSettings) -> Result<PgPool, sqlx::Error> {
        let options = PgConnectOptions::from_str(url)?.ssl_mode(pg_ssl_mode(settings.ssl_mode));

        PgPoolOptions::new()
            .max_connections(settings.max_connections.get())
            .idle_timeout(Some(settings.idle_timeout))
            .connect_with(options)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query_scalar::<_, i32>("SELECT 1")
            .fetch_one(self.pool())
            .await
            .map(|_| ())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn pg_ssl_mode(mode: DbSslMode) -> PgSslMode {
    match mode {
        DbSslMode::Require => PgSslMode::Require,
        DbSslMode::VerifyCa => PgSslMode::VerifyCa,
        DbSslMode::VerifyFull => PgSslMode::VerifyFull,
    }
}
