use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: String,
    pub max_upload_bytes: usize,
    pub log_level: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let database_path =
            env::var("DATABASE_PATH").unwrap_or_else(|_| "calibration.db".to_string());
        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| "10485760".to_string())
            .parse()
            .unwrap_or(10 * 1024 * 1024);
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            bind_addr,
            database_path,
            max_upload_bytes,
            log_level,
        })
    }
}
