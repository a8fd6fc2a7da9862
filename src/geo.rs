//! Country resolution for callers
//!
//! In order of preference:
//! 1. an explicit country header
//! 2. a fixed region for loopback callers
//! 3. an IP to country lookup
//! 4. a fixed fallback region

use std::net::IpAddr;
use std::sync::Arc;

use axum::http::HeaderMap;
use maxminddb::Reader;

use crate::config::Config;

/// IP to country lookup capability
pub trait GeoLookup: Send + Sync {
    /// ISO 3166-1 alpha-2 code of the country of the IP address, if known
    fn resolve_country(&self, ip_address: &IpAddr) -> Option<String>;

    /// Name of the lookup, for logging
    fn name(&self) -> &'static str;
}

/// Lookup that never knows the country
#[derive(Clone, Copy, Debug, Default)]
pub struct NoLookup;

impl GeoLookup for NoLookup {
    fn resolve_country(&self, _ip_address: &IpAddr) -> Option<String> {
        None
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Lookup in a local MaxMind GeoLite2/GeoIP2 database
pub struct MaxMindLookup {
    reader: Reader<Vec<u8>>,
}

impl MaxMindLookup {
    /// Open the database at the given path
    pub fn open(path: &str) -> Result<Self, maxminddb::MaxMindDbError> {
        let reader = Reader::open_readfile(path)?;

        Ok(Self { reader })
    }
}

impl GeoLookup for MaxMindLookup {
    fn resolve_country(&self, ip_address: &IpAddr) -> Option<String> {
        let result = self.reader.lookup(*ip_address).ok()?;
        let city: maxminddb::geoip2::City = result.decode().ok()??;

        city.country.iso_code.map(String::from)
    }

    fn name(&self) -> &'static str {
        "MaxMind"
    }
}

/// Resolves the country of a caller
#[derive(Clone)]
pub struct CountryResolver {
    /// Lowercase name of the header with an explicit country
    header: String,

    /// Country for loopback callers
    loopback_country: String,

    /// Country when nothing else yields one
    fallback_country: String,

    lookup: Arc<dyn GeoLookup>,
}

impl CountryResolver {
    pub fn new(config: &Config, lookup: Arc<dyn GeoLookup>) -> Self {
        Self {
            header: config.country_header.clone(),
            loopback_country: config.loopback_country.clone(),
            fallback_country: config.fallback_country.clone(),
            lookup,
        }
    }

    /// Setup the resolver with the lookup the configuration asks for
    ///
    /// A MaxMind database that can not be opened is logged and replaced by no lookup at all
    pub fn from_config(config: &Config) -> Self {
        let lookup: Arc<dyn GeoLookup> = match &config.geoip_database {
            Some(path) => match MaxMindLookup::open(path) {
                Ok(lookup) => Arc::new(lookup),
                Err(err) => {
                    tracing::warn!("Could not open GeoIP database at {path}: {err}");
                    Arc::new(NoLookup)
                }
            },
            None => Arc::new(NoLookup),
        };

        tracing::info!("Resolving countries with {} lookup", lookup.name());

        Self::new(config, lookup)
    }

    /// Resolve the country of a caller, always yields a country code
    pub fn resolve(&self, headers: &HeaderMap, ip_address: Option<&IpAddr>) -> String {
        let explicit = headers
            .get(self.header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        if let Some(country) = explicit {
            return country.to_ascii_uppercase();
        }

        let Some(ip_address) = ip_address else {
            return self.fallback_country.clone();
        };

        if is_loopback(ip_address) {
            return self.loopback_country.clone();
        }

        self.lookup
            .resolve_country(ip_address)
            .map(|country| country.to_ascii_uppercase())
            .unwrap_or_else(|| self.fallback_country.clone())
    }
}

/// Loopback, also for IPv4 addresses mapped into IPv6
fn is_loopback(ip_address: &IpAddr) -> bool {
    match ip_address {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback())
        }
    }
}
