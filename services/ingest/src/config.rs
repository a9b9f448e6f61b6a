use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{IngestError, Result};

pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Fs,
    Memory,
}

impl FromStr for StorageKind {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fs" | "local" => Ok(StorageKind::Fs),
            "memory" => Ok(StorageKind::Memory),
            other => Err(IngestError::Config(format!(
                "STORAGE_TYPE '{}' is not one of fs, memory",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Required by anything that talks to Postgres; checked there.
    pub db_url: Option<String>,
    pub db_max_connections: u32,
    pub storage: StorageKind,
    pub upload_dir: PathBuf,
    pub max_file_size: usize,
    pub api_bind: String,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            db_url: var("DB_URL").filter(|url| !url.trim().is_empty()),
            db_max_connections: var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|| "5".to_string())
                .parse()
                .unwrap_or(5),
            storage: var("STORAGE_TYPE")
                .unwrap_or_else(|| "fs".to_string())
                .parse()?,
            upload_dir: PathBuf::from(var("UPLOAD_DIR").unwrap_or_else(|| "./uploads".to_string())),
            max_file_size: var("MAX_FILE_SIZE")
                .unwrap_or_else(|| DEFAULT_MAX_FILE_SIZE.to_string())
                .parse()
                .unwrap_or(DEFAULT_MAX_FILE_SIZE),
            api_bind: var("API_BIND").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            cors_origins: var("CORS_ORIGINS")
                .unwrap_or_else(|| "*".to_string())
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
        })
    }

    pub fn require_db_url(&self) -> Result<&str> {
        self.db_url
            .as_deref()
            .ok_or_else(|| IngestError::Config("DB_URL env var missing".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.db_url, None);
        assert_eq!(config.storage, StorageKind::Fs);
        assert_eq!(config.upload_dir, PathBuf::from("./uploads"));
        assert_eq!(config.max_file_size, 10_485_760);
        assert_eq!(config.api_bind, "127.0.0.1:8080");
        assert_eq!(config.cors_origins, vec!["*"]);
        assert!(config.require_db_url().is_err());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("DB_URL", "postgres://localhost/carga"),
            ("STORAGE_TYPE", "MEMORY"),
            ("MAX_FILE_SIZE", "1024"),
            ("CORS_ORIGINS", "http://a.test, http://b.test"),
        ])
        .unwrap();
        assert_eq!(config.require_db_url().unwrap(), "postgres://localhost/carga");
        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(config.max_file_size, 1024);
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn test_bad_numbers_fall_back() {
        let config = config(&[("MAX_FILE_SIZE", "lots")]).unwrap();
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
    }

    #[test]
    fn test_unknown_storage_rejected() {
        assert!(matches!(
            config(&[("STORAGE_TYPE", "s3")]),
            Err(IngestError::Config(_))
        ));
    }
}
