use std::time::Duration;
use std::{env, error, fmt};

use reqwest::Client;

use crate::apis::google_aistudio::DEFAULT_BASE_URL;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8192;

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    MissingApiKey,
    InvalidValue { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApiKey => write!(f, "GEMINI_API_KEY is not set"),
            Self::InvalidValue { name, value } => write!(f, "invalid value for {name}: {value:?}"),
        }
    }
}

impl error::Error for ConfigError {}

/// Process-wide settings for talking to the Gemini API.
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_output_tokens: u32,
    pub user_agent: Option<String>,
    /// `None` leaves the timeout to reqwest.
    pub request_timeout: Option<Duration>,
}

impl Config {
    /// Reads the process environment, after loading a `.env` file if one exists.
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => log::debug!("loaded environment from {}", path.display()),
            Err(err) if err.not_found() => {}
            Err(err) => log::warn!("failed to load the .env file: {err}"),
        }

        Self::from_vars(|name| env::var(name).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = var("GEMINI_API_KEY")
            .filter(|api_key| !api_key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let max_output_tokens = match var("GEMINI_MAX_OUTPUT_TOKENS") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: "GEMINI_MAX_OUTPUT_TOKENS",
                value,
            })?,
            None => DEFAULT_MAX_OUTPUT_TOKENS,
        };

        let request_timeout = match var("REQUEST_TIMEOUT_SECS") {
            Some(value) => Some(Duration::from_secs(value.trim().parse().map_err(|_| {
                ConfigError::InvalidValue { name: "REQUEST_TIMEOUT_SECS", value }
            })?)),
            None => None,
        };

        Ok(Self {
            api_key,
            model: var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            base_url: var("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            max_output_tokens,
            user_agent: var("USER_AGENT"),
            request_timeout,
        })
    }

    pub fn http_client(&self) -> reqwest::Result<Client> {
        let mut http_client = Client::builder();

        if let Some(user_agent) = &self.user_agent {
            http_client = http_client.user_agent(user_agent);
        }

        if let Some(request_timeout) = self.request_timeout {
            http_client = http_client.timeout(request_timeout);
        }

        http_client.build()
    }
}
