//! Link creation
//!
//! Validates the input, allocates a unique code and persists the link.
//! Uniqueness is decided by the store: a conflicting insert either fails with
//! [`LinkError::AliasTaken`] for custom aliases or is retried with a fresh code.

use std::sync::Arc;

use chrono::DateTime;
use chrono::NaiveDateTime;
use chrono::Utc;
use unicode_normalization::UnicodeNormalization;
use url::Url;
use uuid::Uuid;

use crate::codes::CODE_LENGTH;
use crate::codes::CodeGenerator;
use crate::config::Config;
use crate::errors::LinkError;
use crate::links::GeoRule;
use crate::links::Link;
use crate::links::LinkKind;
use crate::password;
use crate::qr::QrRenderer;
use crate::storage;
use crate::storage::CreateLinkValues;
use crate::storage::Storage;

/// Maximum number of generated codes tried before giving up
pub const MAX_ATTEMPTS: usize = 5;

/// Maximum length of a custom alias, in characters
pub const MAX_ALIAS_LENGTH: usize = 64;

/// Aliases shadowed by fixed routes, links with these codes could not be managed
pub const RESERVED_ALIASES: &[&str] = &["analytics", "api", "location", "protected"];

/// Variant specific input of a new link
#[derive(Debug)]
pub enum VariantParams {
    /// Plain redirect, `custom` when an alias is given
    Standard,

    /// Expires at the given date, RFC 3339 or `YYYY-MM-DDTHH:MM[:SS]` in UTC
    Fire { expires_at: String },

    /// Gated by the password, only its hash is stored
    Protected { password: String },

    Location {
        rules: Vec<GeoRule>,
        default_url: Option<String>,
    },
}

/// Everything needed to create a link
#[derive(Debug)]
pub struct NewLink {
    pub destination: String,
    pub alias: Option<String>,
    pub params: VariantParams,
    pub owner_id: Option<Uuid>,
}

/// Creates links
#[derive(Clone)]
pub struct Shortener<S: Storage> {
    storage: S,
    codes: Arc<dyn CodeGenerator>,
    qr: Arc<dyn QrRenderer>,
    config: Config,
}

impl<S: Storage> Shortener<S> {
    pub fn new(
        storage: S,
        codes: Arc<dyn CodeGenerator>,
        qr: Arc<dyn QrRenderer>,
        config: Config,
    ) -> Self {
        Self {
            storage,
            codes,
            qr,
            config,
        }
    }

    /// Create a link
    ///
    /// All input is validated before anything is written
    pub async fn create(&self, new_link: NewLink) -> Result<Link, LinkError> {
        let destination = parse_destination(&new_link.destination)?;

        let alias = new_link
            .alias
            .as_deref()
            .filter(|alias| !alias.trim().is_empty())
            .map(parse_alias)
            .transpose()?;

        let kind = parse_kind(new_link.params, alias.is_some())?;
        let owner_id = new_link.owner_id.as_ref();

        let link = if let Some(alias) = alias {
            self.insert(&alias, &destination, owner_id, &kind)
                .await
                .map_err(|err| match err {
                    storage::Error::Conflict => LinkError::AliasTaken,
                    err => LinkError::Storage(err),
                })?
        } else {
            self.insert_with_generated_code(&destination, owner_id, &kind)
                .await?
        };

        tracing::info!(
            r#"Created {} link "{}" to {}"#,
            link.variant(),
            link.code,
            link.destination
        );

        Ok(link)
    }

    async fn insert_with_generated_code(
        &self,
        destination: &str,
        owner_id: Option<&Uuid>,
        kind: &LinkKind,
    ) -> Result<Link, LinkError> {
        for attempt in 1..=MAX_ATTEMPTS {
            let code = self.codes.generate(CODE_LENGTH);

            match self.insert(&code, destination, owner_id, kind).await {
                Ok(link) => return Ok(link),
                Err(storage::Error::Conflict) => {
                    tracing::debug!(
                        r#"Code "{code}" already taken (attempt {attempt} of {MAX_ATTEMPTS})"#
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        tracing::warn!("No unique code found after {MAX_ATTEMPTS} attempts");

        Err(LinkError::GenerationExhausted)
    }

    async fn insert(
        &self,
        code: &str,
        destination: &str,
        owner_id: Option<&Uuid>,
        kind: &LinkKind,
    ) -> storage::Result<Link> {
        let qr_code = self.render_qr(code);

        let values = CreateLinkValues {
            code,
            destination,
            owner_id,
            kind,
            qr_code: qr_code.as_deref(),
        };

        self.storage.create_link(&values).await
    }

    /// Render the QR code of the short URL, failures only end up in the logs
    fn render_qr(&self, code: &str) -> Option<String> {
        let short_url = self.config.short_url(code);

        match self.qr.render(&short_url) {
            Ok(qr_code) => Some(qr_code),
            Err(err) => {
                tracing::warn!("Could not render QR code for {short_url}: {err}");

                None
            }
        }
    }
}

/// Parse an absolute URL with a host
fn parse_url(url: &str, what: &str) -> Result<Url, LinkError> {
    let parsed = Url::parse(url.trim())
        .map_err(|err| LinkError::invalid_input(format!("Invalid {what}: {err}")))?;

    if parsed.host_str().is_none() {
        return Err(LinkError::invalid_input(format!(
            "Invalid {what}: missing host"
        )));
    }

    Ok(parsed)
}

fn parse_destination(destination: &str) -> Result<String, LinkError> {
    if destination.trim().is_empty() {
        return Err(LinkError::invalid_input("Destination URL is required"));
    }

    parse_url(destination, "destination URL").map(String::from)
}

/// Parse and normalize a custom alias
///
/// - Leading and trailing slashes are removed
/// - Unicode normalization (NFC)
/// - Route segments like `analytics` are reserved, matched case-sensitive like routes are
pub fn parse_alias(alias: &str) -> Result<String, LinkError> {
    let alias = alias.trim_matches('/').nfc().collect::<String>();

    if alias.is_empty() {
        return Err(LinkError::invalid_input("Custom alias can not be empty"));
    }

    if alias.chars().count() > MAX_ALIAS_LENGTH {
        return Err(LinkError::invalid_input(format!(
            "Custom alias can not be longer than {MAX_ALIAS_LENGTH} characters"
        )));
    }

    if RESERVED_ALIASES.contains(&alias.as_str()) {
        return Err(LinkError::invalid_input(format!(
            r#"Custom alias "{alias}" is reserved"#
        )));
    }

    for ch in alias.chars() {
        if matches!(ch, '/' | '?' | '#') {
            return Err(LinkError::invalid_input(format!(
                r#"Custom alias can not contain "{ch}""#
            )));
        }

        if ch.is_whitespace() {
            return Err(LinkError::invalid_input(
                "Custom alias can not contain whitespace",
            ));
        }
    }

    Ok(alias)
}

/// Parse an expiry date, naive dates are read as UTC
pub fn parse_expiry(expires_at: &str) -> Result<DateTime<Utc>, LinkError> {
    let expires_at = expires_at.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(expires_at) {
        return Ok(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(expires_at, format).ok())
        .map(|parsed| parsed.and_utc())
        .ok_or_else(|| LinkError::invalid_input(format!("Invalid expiry date: {expires_at}")))
}

/// Validate the geo rules, country codes are trimmed and upper-cased
fn parse_geo_rules(rules: Vec<GeoRule>) -> Result<Vec<GeoRule>, LinkError> {
    if rules.is_empty() {
        return Err(LinkError::invalid_input(
            "At least one geo rule is required",
        ));
    }

    rules
        .into_iter()
        .enumerate()
        .map(|(index, rule)| {
            let position = index + 1;
            let country_code = rule.country_code.trim().to_ascii_uppercase();

            if country_code.is_empty() {
                return Err(LinkError::invalid_input(format!(
                    "Geo rule {position} is missing a country code"
                )));
            }

            if rule.redirect_url.trim().is_empty() {
                return Err(LinkError::invalid_input(format!(
                    "Geo rule {position} ({country_code}) is missing a redirect URL"
                )));
            }

            let redirect_url = parse_url(
                &rule.redirect_url,
                &format!("redirect URL in geo rule {position} ({country_code})"),
            )?;

            Ok(GeoRule {
                country_code,
                redirect_url: redirect_url.into(),
            })
        })
        .collect()
}

fn parse_kind(params: VariantParams, has_alias: bool) -> Result<LinkKind, LinkError> {
    match params {
        VariantParams::Standard if has_alias => Ok(LinkKind::Custom),
        VariantParams::Standard => Ok(LinkKind::Standard),
        VariantParams::Fire { expires_at } => {
            let expires_at = parse_expiry(&expires_at)?;

            if expires_at <= Utc::now() {
                return Err(LinkError::invalid_input(
                    "Expiry date must be in the future",
                ));
            }

            Ok(LinkKind::Fire { expires_at })
        }
        VariantParams::Protected { password } => {
            if password.is_empty() {
                return Err(LinkError::invalid_input("Password can not be empty"));
            }

            let password_hash = password::hash(&password)?;

            Ok(LinkKind::Protected { password_hash })
        }
        VariantParams::Location { rules, default_url } => {
            let rules = parse_geo_rules(rules)?;

            let default_url = default_url
                .as_deref()
                .filter(|default_url| !default_url.trim().is_empty())
                .map(|default_url| parse_url(default_url, "default geo URL").map(String::from))
                .transpose()?;

            Ok(LinkKind::Location { rules, default_url })
        }
    }
}
