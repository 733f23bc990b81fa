//! Client configuration shared by the Marks front ends.
//!
//! Values come from the environment (a `.env` file is loaded by the binaries
//! before this runs). Nothing here is secret: the anon key is a public key.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::auth::resolve_optional_supabase_config;
use crate::sync::{SyncOptions, DEFAULT_POLL_INTERVAL};
use crate::util::{is_http_url, normalize_text_option};

pub const API_URL_VAR: &str = "MARKS_API_URL";
pub const SUPABASE_URL_VAR: &str = "SUPABASE_URL";
pub const SUPABASE_ANON_KEY_VAR: &str = "SUPABASE_ANON_KEY";
pub const POLL_INTERVAL_VAR: &str = "MARKS_POLL_INTERVAL_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the bookmarks API; `None` means bookmarks are unavailable.
    pub api_base_url: Option<String>,
    pub supabase: Option<SupabaseConfig>,
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            supabase: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_base_url = normalize_text_option(lookup(API_URL_VAR))
            .map(|url| url.trim_end_matches('/').to_string());
        if let Some(url) = api_base_url.as_deref() {
            if !is_http_url(url) {
                return Err(ConfigError::Invalid(format!(
                    "{API_URL_VAR} must start with http:// or https://"
                )));
            }
        }

        let supabase = resolve_optional_supabase_config(
            lookup(SUPABASE_URL_VAR),
            lookup(SUPABASE_ANON_KEY_VAR),
        )
        .map_err(|_| {
            ConfigError::Invalid(format!(
                "{SUPABASE_URL_VAR} and {SUPABASE_ANON_KEY_VAR} must be set together"
            ))
        })?
        .map(|(url, anon_key)| SupabaseConfig { url, anon_key });

        let poll_interval = match normalize_text_option(lookup(POLL_INTERVAL_VAR)) {
            None => DEFAULT_POLL_INTERVAL,
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|_| {
                    ConfigError::Invalid(format!(
                        "{POLL_INTERVAL_VAR} must be an integer in [1, 3600]"
                    ))
                })?;
                if !(1..=3_600).contains(&secs) {
                    return Err(ConfigError::Invalid(format!(
                        "{POLL_INTERVAL_VAR} must be in [1, 3600]"
                    )));
                }
                Duration::from_secs(secs)
            }
        };

        Ok(Self {
            api_base_url,
            supabase,
            poll_interval,
        })
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            poll_interval: self.poll_interval,
            ..SyncOptions::default()
        }
    }
}
