//! Runtime configuration, read from the environment

use crate::utils::env_flag_or;
use crate::utils::env_var_optional;
use crate::utils::env_var_or_else;

const DEFAULT_APP_URL: &str = "http://localhost:6000";
const DEFAULT_COUNTRY_HEADER: &str = "x-country-code";
const DEFAULT_LOOPBACK_COUNTRY: &str = "IN";
const DEFAULT_FALLBACK_COUNTRY: &str = "US";

/// Settings for the link services
#[derive(Clone, Debug)]
pub struct Config {
    /// Public base URL short codes are appended to
    pub app_url: String,

    /// Postgres connection string, the in-memory store is used when absent
    pub database_url: Option<String>,

    /// Should password challenges and rejected passwords count as clicks?
    pub count_on_challenge: bool,

    /// Request header that carries an explicit country code
    pub country_header: String,

    /// Country used for callers connecting over loopback
    pub loopback_country: String,

    /// Country used when nothing else yields one
    pub fallback_country: String,

    /// Path to a MaxMind database used for IP to country lookups
    pub geoip_database: Option<String>,
}

impl Config {
    /// Read the configuration from the environment
    pub fn from_env() -> Self {
        Self {
            app_url: env_var_or_else("APP_URL", || DEFAULT_APP_URL.to_string()),
            database_url: env_var_optional("DATABASE_URL"),
            count_on_challenge: env_flag_or("COUNT_CLICKS_ON_CHALLENGE", true),
            country_header: env_var_or_else("COUNTRY_HEADER", || {
                DEFAULT_COUNTRY_HEADER.to_string()
            })
            .to_ascii_lowercase(),
            loopback_country: env_var_or_else("LOOPBACK_COUNTRY", || {
                DEFAULT_LOOPBACK_COUNTRY.to_string()
            })
            .to_ascii_uppercase(),
            fallback_country: env_var_or_else("FALLBACK_COUNTRY", || {
                DEFAULT_FALLBACK_COUNTRY.to_string()
            })
            .to_ascii_uppercase(),
            geoip_database: env_var_optional("GEOIP_DATABASE"),
        }
    }

    /// Public short URL for a code
    pub fn short_url(&self, code: &str) -> String {
        format!("{}/{code}", self.app_url.trim_end_matches('/'))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_url: DEFAULT_APP_URL.to_string(),
            database_url: None,
            count_on_challenge: true,
            country_header: DEFAULT_COUNTRY_HEADER.to_string(),
            loopback_country: DEFAULT_LOOPBACK_COUNTRY.to_string(),
            fallback_country: DEFAULT_FALLBACK_COUNTRY.to_string(),
            geoip_database: None,
        }
    }
}
