use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY (or API_KEY) environment variable not set")]
    MissingCredential,
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub captions_dir: PathBuf,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source; the credential is the only
    /// required value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = non_blank("GEMINI_API_KEY")
            .or_else(|| non_blank("API_KEY"))
            .ok_or(ConfigError::MissingCredential)?;

        let port = match non_blank("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name: "PORT", value: raw })?,
            None => 8080,
        };

        Ok(Self {
            api_key,
            api_base: non_blank("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: non_blank("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            captions_dir: non_blank("CAPTIONS_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data")),
            port,
        })
    }

    /// Safe to log.
    pub fn redacted_key(&self) -> String {
        let prefix: String = self.api_key.chars().take(4).collect();
        format!("{prefix}...")
    }
}
