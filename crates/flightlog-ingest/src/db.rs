//! Postgres connection pool

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::Result;

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(&config.url)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlightlogConfig;

    #[tokio::test]
    async fn test_create_pool_reports_unreachable_database() {
        let mut config = FlightlogConfig::default().database;
        config.url = "postgresql://flightlog@127.0.0.1:1/flightlog".to_string();
        config.min_connections = 0;
        config.connect_timeout_secs = 1;

        let result = create_pool(&config).await;
        assert!(matches!(result, Err(crate::error::IngestError::Database(_))));
    }
}
