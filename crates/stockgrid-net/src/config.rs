//! API endpoint configuration.
//!
//! The administration front end talks to one REST server whose URL depends on
//! the deployment mode. Configuration comes either from the process
//! environment or from a TOML document.
//!
//! # Environment
//!
//! | Variable | Meaning |
//! |---|---|
//! | `APP_MODE` | `development` or `production` |
//! | `APP_API_URL_DEV` | API origin used in development mode |
//! | `APP_API_URL_PROD` | API origin used in production mode |
//! | `APP_BUCKET_URL` | Public URL prefix of uploaded files |
//!
//! # TOML
//!
//! ```toml
//! mode = "production"
//! api_url = "https://stock.example.com"
//! bucket_url = "https://files.example.com/"
//! ```

use serde::Deserialize;

use crate::error::{NetworkError, Result};

/// Path prefix every API resource lives under.
pub const API_PREFIX: &str = "api/v1";

/// Deployment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    /// Local development server.
    #[default]
    Development,
    /// Production deployment.
    Production,
}

impl AppMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }
}

/// Where the REST API lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiConfig {
    /// Deployment mode.
    #[serde(default)]
    pub mode: AppMode,
    /// API origin, without the `/api/v1` prefix.
    pub api_url: String,
    /// Public URL prefix of uploaded files.
    #[serde(default)]
    pub bucket_url: String,
}

impl ApiConfig {
    /// Create a configuration for `api_url` in development mode.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            mode: AppMode::Development,
            api_url: api_url.into(),
            bucket_url: String::new(),
        }
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode = match lookup("APP_MODE") {
            Some(raw) => AppMode::parse(&raw)
                .ok_or_else(|| NetworkError::Config(format!("unknown APP_MODE '{raw}'")))?,
            None => AppMode::default(),
        };
        let url_key = match mode {
            AppMode::Development => "APP_API_URL_DEV",
            AppMode::Production => "APP_API_URL_PROD",
        };
        let api_url = lookup(url_key)
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| NetworkError::Config(format!("{url_key} is not set")))?;

        let config = Self {
            mode,
            api_url,
            bucket_url: lookup("APP_BUCKET_URL").unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse the configuration from a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Base URL of the versioned API, e.g. `https://host/api/v1`.
    pub fn api_base(&self) -> String {
        format!("{}/{API_PREFIX}", self.api_url.trim_end_matches('/'))
    }

    /// Strip the bucket prefix from a stored file URL, leaving the file name.
    pub fn file_name_from_url<'a>(&self, url: &'a str) -> &'a str {
        if self.bucket_url.is_empty() {
            return url;
        }
        url.strip_prefix(self.bucket_url.as_str()).unwrap_or(url)
    }

    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api_url)?;
        Ok(())
    }
}
