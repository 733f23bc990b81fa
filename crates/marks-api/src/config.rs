use std::collections::HashMap;
use std::env;
use std::fmt;

use thiserror::Error;
use url::Url;

use marks_core::util::is_http_url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub supabase_url: String,
    /// Service-role key used for PostgREST calls
    pub supabase_service_key: String,
    /// `apikey` header for identity checks; the service key when unset
    pub supabase_anon_key: String,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("supabase_url", &self.supabase_url)
            .field("supabase_service_key", &"[REDACTED]")
            .field("supabase_anon_key", &"[REDACTED]")
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = value_or_default(&lookup, "BIND_HOST", "0.0.0.0");
        let port = value_or_default(&lookup, "PORT", "4000")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::Invalid("PORT must be an integer in [0, 65535]".to_string())
            })?;
        let bind_addr = format!("{host}:{port}");

        let supabase_url = trim_trailing(&required_trimmed(&lookup, "SUPABASE_URL")?).to_string();
        if !is_http_url(&supabase_url) || Url::parse(&supabase_url).is_err() {
            return Err(ConfigError::Invalid(
                "SUPABASE_URL must be an absolute http:// or https:// URL".to_string(),
            ));
        }

        let supabase_service_key = optional_trimmed(&lookup, "SUPABASE_SERVICE_KEY")
            .or_else(|| optional_trimmed(&lookup, "SUPABASE_KEY"))
            .ok_or(ConfigError::MissingVar("SUPABASE_SERVICE_KEY"))?;
        let supabase_anon_key = optional_trimmed(&lookup, "SUPABASE_ANON_KEY")
            .unwrap_or_else(|| supabase_service_key.clone());

        Ok(Self {
            bind_addr,
            supabase_url,
            supabase_service_key,
            supabase_anon_key,
        })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn trim_trailing(value: &str) -> &str {
    value.trim_end_matches('/')
}
