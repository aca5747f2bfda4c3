use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::results::ResultsError;

/// Postgres error code for a foreign key violation
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Errors from DatabaseManager and the Postgres store
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl DatabaseError {
    fn is_foreign_key_violation(&self) -> bool {
        match self {
            DatabaseError::Sqlx(sqlx::Error::Database(db)) => db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION),
            _ => false,
        }
    }
}

impl From<DatabaseError> for ResultsError {
    fn from(err: DatabaseError) -> Self {
        if err.is_foreign_key_violation() {
            return ResultsError::not_found("referenced student or subject does not exist");
        }
        // detail stays in the log; callers get a generic storage failure
        tracing::error!("Database error: {}", err);
        ResultsError::Storage("database operation failed".to_string())
    }
}

impl From<sqlx::Error> for ResultsError {
    fn from(err: sqlx::Error) -> Self {
        DatabaseError::from(err).into()
    }
}

/// Builds the shared connection pool
pub struct DatabaseManager;

impl DatabaseManager {
    /// Connect using `database.url`, falling back to `DATABASE_URL`
    pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
        let connection_string = Self::connection_string(config)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(&connection_string)
            .await?;

        info!("Created database pool for: {}", Self::describe(&connection_string));
        Ok(pool)
    }

    fn connection_string(config: &DatabaseConfig) -> Result<String, DatabaseError> {
        let base = match &config.url {
            Some(url) => url.clone(),
            None => std::env::var("DATABASE_URL").map_err(|_| DatabaseError::ConfigMissing("DATABASE_URL"))?,
        };
        let url = url::Url::parse(&base).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(DatabaseError::InvalidDatabaseUrl);
        }
        Ok(url.into())
    }

    /// host/database without credentials, for logs
    fn describe(connection_string: &str) -> String {
        match url::Url::parse(connection_string) {
            Ok(url) => format!("{}{}", url.host_str().unwrap_or("localhost"), url.path()),
            Err(_) => "<unparseable url>".to_string(),
        }
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }
}
