//! Service configuration sourced from environment variables.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::util::env as env_util;

/// Everything the binary needs to wire itself up.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub upload_dir: PathBuf,
    pub allowed_origins: String,
}

impl AppConfig {
    /// Build configuration from environment variables (.env honored).
    pub fn from_env() -> Result<Self> {
        env_util::init_env();

        let host = env_util::env_or("API_HOST", "0.0.0.0");
        let port = env_util::env_or("API_PORT", "8080")
            .parse()
            .context("Invalid API_PORT")?;

        let database_url =
            env_util::env_req("DATABASE_URL").context("DATABASE_URL is required")?;

        let db_max_connections = env_util::env_parse("DB_MAX_CONNS", 10u32);

        let upload_dir = PathBuf::from(env_util::env_or("UPLOAD_DIR", "./uploads"));

        let allowed_origins = env_util::env_or(
            "ALLOWED_ORIGINS",
            "http://localhost:3000,http://localhost:5173",
        );

        Ok(Self {
            host,
            port,
            database_url,
            db_max_connections,
            upload_dir,
            allowed_origins,
        })
    }
}
