//! Link resolution
//!
//! Turns a code into an [`Outcome`] and records the click.
//!
//! A single path is taken per request, in order of precedence:
//! 1. geo rules, when present expiry and password are not consulted
//! 2. expiry
//! 3. password
//! 4. plain redirect

use chrono::DateTime;
use chrono::Utc;

use crate::errors::LinkError;
use crate::links::Click;
use crate::links::Link;
use crate::password;
use crate::storage::Storage;

/// Result of resolving a code
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// Unknown code, or the link has been deleted
    NotFound,

    /// The expiry of the link has passed
    Expired,

    /// Redirect decided by the country of the caller
    GeoRedirect(String),

    /// A password is needed to continue
    PasswordRequired,

    /// The given password is wrong
    PasswordRejected,

    Redirect(String),
}

impl Outcome {
    /// Does this outcome count as a click?
    fn records_click(&self, count_on_challenge: bool) -> bool {
        match self {
            Self::NotFound => false,
            Self::PasswordRequired | Self::PasswordRejected => count_on_challenge,
            Self::Expired | Self::GeoRedirect(_) | Self::Redirect(_) => true,
        }
    }
}

/// Resolves codes
#[derive(Clone)]
pub struct Resolver<S: Storage> {
    storage: S,

    /// Should password challenges and rejections record a click?
    count_on_challenge: bool,
}

impl<S: Storage> Resolver<S> {
    pub fn new(storage: S, count_on_challenge: bool) -> Self {
        Self {
            storage,
            count_on_challenge,
        }
    }

    /// Resolve a code for a caller from the given country
    pub async fn resolve(
        &self,
        code: &str,
        password: Option<&str>,
        country: &str,
    ) -> Result<Outcome, LinkError> {
        let link = self
            .storage
            .find_single_link_by_code(code)
            .await?
            .filter(|link| link.active);

        let Some(link) = link else {
            tracing::debug!(r#"Code "{code}" not found"#);

            return Ok(Outcome::NotFound);
        };

        let now = Utc::now();
        let outcome = evaluate(&link, password, country, now)?;

        tracing::debug!(r#"Code "{code}" from {country}: {outcome:?}"#);

        if outcome.records_click(self.count_on_challenge) {
            let click = Click {
                clicked_at: now,
                country: country.to_string(),
            };

            self.storage.record_click(&link, &click).await?;
        }

        Ok(outcome)
    }
}

/// Decide the outcome for a link, without side effects
fn evaluate(
    link: &Link,
    password: Option<&str>,
    country: &str,
    now: DateTime<Utc>,
) -> Result<Outcome, LinkError> {
    let rules = link.geo_rules();

    if !rules.is_empty() {
        let url = rules
            .iter()
            .find(|rule| rule.matches(country))
            .map(|rule| rule.redirect_url.as_str())
            .or(link.default_geo_url())
            .unwrap_or(&link.destination);

        return Ok(Outcome::GeoRedirect(url.to_string()));
    }

    if link.is_expired_at(now) {
        return Ok(Outcome::Expired);
    }

    if let Some(password_hash) = link.password_hash() {
        let Some(password) = password else {
            return Ok(Outcome::PasswordRequired);
        };

        if !password::verify(password_hash, password)? {
            return Ok(Outcome::PasswordRejected);
        }
    }

    Ok(Outcome::Redirect(link.destination.clone()))
}
