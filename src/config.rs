use std::collections::HashMap;
use thiserror::Error;

pub const DEFAULT_PRICE_API_URL: &str = "https://api.coingecko.com/api/v3";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub price_api_url: String,
    pub week_start: WeekStart,
}

/// First day of the week for the `this_week` P&L bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WeekStart {
    #[default]
    Sunday,
    Monday,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let price_api_url = env_map
            .get("PRICE_API_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_PRICE_API_URL.to_string());

        let week_start = match env_map
            .get("WEEK_START")
            .map(|s| s.trim().to_lowercase())
            .as_deref()
            .unwrap_or("sunday")
        {
            "sunday" => WeekStart::Sunday,
            "monday" => WeekStart::Monday,
            other => {
                return Err(ConfigError::InvalidValue(
                    "WEEK_START".to_string(),
                    format!("must be sunday or monday, got {}", other),
                ))
            }
        };

        Ok(Config {
            port,
            database_path,
            price_api_url,
            week_start,
        })
    }
}
