use thiserror::Error;

use crate::service::ServiceLimits;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub library: LibraryConfig,
    /// Enables dangerous operations like purge. Must never be true in production.
    pub test_mode: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding the metadata database
    pub data_dir: String,
    /// Directory holding uploaded book files
    pub upload_dir: String,
}

#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            upload_dir: "./uploads".to_string(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 50 * 1024 * 1024, // 50MB
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

impl LibraryConfig {
    pub fn service_limits(&self) -> ServiceLimits {
        ServiceLimits {
            max_upload_size: self.max_upload_size,
            max_page_size: self.max_page_size,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address = match (std::env::var("BIND_ADDRESS"), std::env::var("PORT")) {
            (Ok(addr), _) => addr,
            (Err(_), Ok(port)) => format!("0.0.0.0:{port}"),
            _ => ServerConfig::default().bind_address,
        };

        let defaults = StorageConfig::default();
        let data_dir = std::env::var("DATA_DIR").unwrap_or(defaults.data_dir);
        let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or(defaults.upload_dir);

        let defaults = LibraryConfig::default();
        let max_upload_size = env_parse("MAX_UPLOAD_SIZE")?.unwrap_or(defaults.max_upload_size);
        let default_page_size =
            env_parse("DEFAULT_PAGE_SIZE")?.unwrap_or(defaults.default_page_size);
        let max_page_size = env_parse("MAX_PAGE_SIZE")?.unwrap_or(defaults.max_page_size);

        let test_mode = std::env::var("TEST_MODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let config = Config {
            server: ServerConfig { bind_address },
            storage: StorageConfig {
                data_dir,
                upload_dir,
            },
            library: LibraryConfig {
                max_upload_size,
                default_page_size,
                max_page_size,
            },
            test_mode,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.upload_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "UPLOAD_DIR cannot be empty".to_string(),
            ));
        }

        if self.storage.data_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "DATA_DIR cannot be empty".to_string(),
            ));
        }

        if self.library.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.library.default_page_size == 0
            || self.library.default_page_size > self.library.max_page_size
        {
            return Err(ConfigError::ValidationError(format!(
                "DEFAULT_PAGE_SIZE must be between 1 and MAX_PAGE_SIZE ({})",
                self.library.max_page_size
            )));
        }

        if self.test_mode {
            tracing::warn!("TEST_MODE is enabled. Do not run this configuration in production.");
        }

        Ok(())
    }
}

/// Parse an optional numeric environment variable, rejecting malformed values.
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            ConfigError::ValidationError(format!("{key} must be a non-negative integer, got {raw:?}"))
        }),
        Err(_) => Ok(None),
    }
}
