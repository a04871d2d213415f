//! Runtime configuration from environment variables
//!
//! Binaries call `dotenvy::dotenv()` first, so a `.env` file works too.

use crate::error::ConfigError;
use crate::warehouse::{validate_identifier, DimensionWriteMode};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_STORAGE_ROOT: &str = "./storage";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3001";
pub const DEFAULT_PUBLIC_BASE_URL: &str = "https://storage.googleapis.com";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub project_id: String,
    /// Also the Postgres schema holding the warehouse tables
    pub dataset_id: String,
    pub reports_bucket: String,
    pub database_url: String,
    pub storage_root: PathBuf,
    pub bind_addr: SocketAddr,
    pub dimension_write_mode: DimensionWriteMode,
    pub public_base_url: String,
    pub db_max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let dataset_id = required("DATASET_ID")?;
        if validate_identifier(&dataset_id).is_err() {
            return Err(ConfigError::Invalid {
                name: "DATASET_ID",
                value: dataset_id,
            });
        }

        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr: SocketAddr = bind_addr.parse().map_err(|_| ConfigError::Invalid {
            name: "BIND_ADDR",
            value: bind_addr.clone(),
        })?;

        let dimension_write_mode: DimensionWriteMode = match get("DIMENSION_WRITE_MODE") {
            Some(mode) => mode.parse().map_err(|_| ConfigError::Invalid {
                name: "DIMENSION_WRITE_MODE",
                value: mode.clone(),
            })?,
            None => DimensionWriteMode::default(),
        };

        let db_max_connections = match get("DB_MAX_CONNECTIONS") {
            Some(n) => n
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::Invalid {
                    name: "DB_MAX_CONNECTIONS",
                    value: n,
                })?,
            None => DEFAULT_DB_MAX_CONNECTIONS,
        };

        Ok(Self {
            project_id: required("PROJECT_ID")?,
            dataset_id,
            reports_bucket: required("REPORTS_BUCKET")?,
            database_url: required("DATABASE_URL")?,
            storage_root: get("STORAGE_ROOT")
                .unwrap_or_else(|| DEFAULT_STORAGE_ROOT.to_string())
                .into(),
            bind_addr,
            dimension_write_mode,
            public_base_url: get("PUBLIC_BASE_URL")
                .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            db_max_connections,
        })
    }
}
