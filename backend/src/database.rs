use sqlx::{migrate::MigrateDatabase, postgres::PgPoolOptions, PgPool, Postgres};
use std::time::Duration;

use crate::config::parse_env;

/// Connection pool sizing and timeouts
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl PoolConfig {
    const fn sized(max: u32, min: u32, acquire: u64, idle: u64, lifetime: u64) -> Self {
        Self {
            max_connections: max,
            min_connections: min,
            acquire_timeout: Duration::from_secs(acquire),
            idle_timeout: Duration::from_secs(idle),
            max_lifetime: Duration::from_secs(lifetime),
        }
    }

    /// Baseline for an `APP_ENV` value; unknown or missing names get the middle preset
    pub fn preset(app_env: Option<&str>) -> Self {
        match app_env {
            Some("production") => Self::sized(50, 10, 10, 300, 3600),
            Some("development") => Self::sized(10, 2, 60, 900, 7200),
            _ => Self::sized(20, 5, 30, 600, 1800),
        }
    }

    /// Apply `DB_*` overrides on top of `base`
    pub fn with_env_overrides(base: Self) -> anyhow::Result<Self> {
        let secs = |key: &str, current: Duration| -> anyhow::Result<Duration> {
            Ok(Duration::from_secs(parse_env(key, current.as_secs())?))
        };

        Ok(Self {
            max_connections: parse_env("DB_MAX_CONNECTIONS", base.max_connections)?,
            min_connections: parse_env("DB_MIN_CONNECTIONS", base.min_connections)?,
            acquire_timeout: secs("DB_ACQUIRE_TIMEOUT", base.acquire_timeout)?,
            idle_timeout: secs("DB_IDLE_TIMEOUT", base.idle_timeout)?,
            max_lifetime: secs("DB_MAX_LIFETIME", base.max_lifetime)?,
        })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let app_env = std::env::var("APP_ENV").ok();
        Self::with_env_overrides(Self::preset(app_env.as_deref()))
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::preset(None)
    }
}

/// Connect to Postgres, creating the database first if it does not exist
pub async fn create_pool(database_url: &str, config: PoolConfig) -> anyhow::Result<PgPool> {
    if !Postgres::database_exists(database_url).await? {
        tracing::warn!("Database missing, creating it");
        Postgres::create_database(database_url).await?;
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .test_before_acquire(true)
        .connect(database_url)
        .await?;

    tracing::info!(
        max = config.max_connections,
        min = config.min_connections,
        "Connected to database"
    );

    Ok(pool)
}

pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Migrations applied");
    Ok(())
}
