//! Configuration management

use flightlog_common::types::validate_identifier;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::inserter::{IngestOptions, DEFAULT_EXISTENCE_THRESHOLD};
use crate::provisioning::{ProvisionRole, UserCredentials};

// ============================================================================
// Airline API Constants
// ============================================================================

/// Default Lufthansa Open API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.lufthansa.com/v1";

/// Default departure airport (IATA code).
pub const DEFAULT_AIRPORT_IATA: &str = "FRA";

/// Default number of flights requested per page. The API caps it at 100.
pub const DEFAULT_PAGE_LIMIT: u32 = 100;

/// Default maximum number of pages fetched per run.
pub const DEFAULT_MAX_PAGES: u32 = 20;

/// Default HTTP timeout in seconds.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Database Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/flightlog";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Storage / Ingestion Constants
// ============================================================================

/// Default document collection holding raw flight-status records.
pub const DEFAULT_COLLECTION: &str = "flight_status_resource";

/// Default warehouse table for structured flights.
pub const DEFAULT_FLIGHTS_TABLE: &str = "flights";

/// Default directory for raw departure files.
pub const DEFAULT_RAW_DIR: &str = "data/1_raw";

/// Flightlog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightlogConfig {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub ingestion: IngestionConfig,
    pub provisioning: ProvisioningConfig,
}

/// Lufthansa API configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub client_id: Option<String>,
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    pub base_url: String,
    pub airport_iata: String,
    pub page_limit: u32,
    pub max_pages: u32,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("airport_iata", &self.airport_iata)
            .field("page_limit", &self.page_limit)
            .field("max_pages", &self.max_pages)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Collection and table names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub collection: String,
    pub flights_table: String,
}

/// Raw file ingestion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    pub raw_dir: PathBuf,
    pub existence_threshold: usize,
    pub force_full_scan: bool,
}

impl IngestionConfig {
    pub fn options(&self) -> IngestOptions {
        IngestOptions {
            existence_threshold: self.existence_threshold,
            force_full_scan: self.force_full_scan,
        }
    }
}

/// Database users created by the `provision` command
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    #[serde(skip_serializing)]
    pub users: Vec<UserCredentials>,
    pub role: ProvisionRole,
}

impl ProvisioningConfig {
    /// Check that every configured user has credentials. Only the
    /// `provision` command needs them, so [`FlightlogConfig::validate`]
    /// leaves this out.
    pub fn validate(&self) -> anyhow::Result<()> {
        for user in &self.users {
            if user.username.is_empty() || user.password.is_empty() {
                anyhow::bail!(
                    "Provisioning user '{}' needs both {}_USERNAME and {}_PASSWORD",
                    user.label,
                    user.label.to_uppercase(),
                    user.label.to_uppercase()
                );
            }
        }

        Ok(())
    }
}

impl FlightlogConfig {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_env()?;
        config.validate()?;

        Ok(config)
    }

    /// Read configuration from the process environment without validating it
    pub fn from_env() -> anyhow::Result<Self> {
        let role = match std::env::var("FLIGHTLOG_PROVISION_ROLE") {
            Ok(value) => value.parse()?,
            Err(_) => ProvisionRole::default(),
        };

        Ok(Self {
            api: ApiConfig {
                client_id: env_opt("LH_CLIENT_ID"),
                client_secret: env_opt("LH_CLIENT_SECRET"),
                base_url: env_or("LH_API_BASE_URL", DEFAULT_API_BASE_URL.to_string()),
                airport_iata: env_or("LH_AIRPORT_IATA", DEFAULT_AIRPORT_IATA.to_string()),
                page_limit: env_or("LH_PAGE_LIMIT", DEFAULT_PAGE_LIMIT),
                max_pages: env_or("LH_MAX_PAGES", DEFAULT_MAX_PAGES),
                timeout_secs: env_or("LH_TIMEOUT_SECS", DEFAULT_API_TIMEOUT_SECS),
            },
            database: DatabaseConfig {
                url: env_or("DATABASE_URL", DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_or(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
            },
            storage: StorageConfig {
                collection: env_or("FLIGHTLOG_COLLECTION", DEFAULT_COLLECTION.to_string()),
                flights_table: env_or("FLIGHTLOG_FLIGHTS_TABLE", DEFAULT_FLIGHTS_TABLE.to_string()),
            },
            ingestion: IngestionConfig {
                raw_dir: env_or("FLIGHTLOG_RAW_DIR", PathBuf::from(DEFAULT_RAW_DIR)),
                existence_threshold: env_or(
                    "FLIGHTLOG_EXISTENCE_THRESHOLD",
                    DEFAULT_EXISTENCE_THRESHOLD,
                ),
                force_full_scan: env_flag("FLIGHTLOG_FORCE_FULL_SCAN"),
            },
            provisioning: ProvisioningConfig {
                users: provision_users_from_env(),
                role,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        validate_identifier(&self.storage.collection)?;
        validate_identifier(&self.storage.flights_table)?;

        if self.api.page_limit == 0 {
            anyhow::bail!("LH_PAGE_LIMIT must be greater than 0");
        }

        if self.api.base_url.is_empty() {
            anyhow::bail!("LH_API_BASE_URL cannot be empty");
        }

        if self.api.client_id.is_none() || self.api.client_secret.is_none() {
            tracing::debug!("LH_CLIENT_ID / LH_CLIENT_SECRET not set; fetching is disabled");
        }

        Ok(())
    }
}

impl Default for FlightlogConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                client_id: None,
                client_secret: None,
                base_url: DEFAULT_API_BASE_URL.to_string(),
                airport_iata: DEFAULT_AIRPORT_IATA.to_string(),
                page_limit: DEFAULT_PAGE_LIMIT,
                max_pages: DEFAULT_MAX_PAGES,
                timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            storage: StorageConfig {
                collection: DEFAULT_COLLECTION.to_string(),
                flights_table: DEFAULT_FLIGHTS_TABLE.to_string(),
            },
            ingestion: IngestionConfig {
                raw_dir: PathBuf::from(DEFAULT_RAW_DIR),
                existence_threshold: DEFAULT_EXISTENCE_THRESHOLD,
                force_full_scan: false,
            },
            provisioning: ProvisioningConfig::default(),
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// `FLIGHTLOG_PROVISION_USERS=admin,analyst` reads `ADMIN_USERNAME`,
/// `ADMIN_PASSWORD`, `ANALYST_USERNAME` and `ANALYST_PASSWORD`.
fn provision_users_from_env() -> Vec<UserCredentials> {
    let Ok(names) = std::env::var("FLIGHTLOG_PROVISION_USERS") else {
        return Vec::new();
    };

    names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            let prefix = name.to_uppercase();
            UserCredentials {
                label: name.to_string(),
                username: std::env::var(format!("{}_USERNAME", prefix)).unwrap_or_default(),
                password: std::env::var(format!("{}_PASSWORD", prefix)).unwrap_or_default(),
            }
        })
        .collect()
}
