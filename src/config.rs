use crate::repositories::StoreConfig;

/// Runtime configuration of the snipvault server
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the hosted backend; `None` runs against the in-process store
    pub store_url: Option<String>,
    pub api_key: String,
    /// Base used to build public share URLs
    pub public_url: String,
    pub port: u16,
    pub timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_url: None,
            api_key: String::new(),
            public_url: "http://localhost:8080".to_string(),
            port: 8080,
            timeout_seconds: 10,
        }
    }
}

impl AppConfig {
    pub fn uses_remote_store(&self) -> bool {
        self.store_url.as_deref().is_some_and(|url| !url.trim().is_empty())
    }
}

impl From<AppConfig> for StoreConfig {
    fn from(config: AppConfig) -> Self {
        let defaults = StoreConfig::default();
        Self {
            base_url: config.store_url.unwrap_or(defaults.base_url),
            api_key: config.api_key,
            timeout_seconds: config.timeout_seconds,
        }
    }
}
