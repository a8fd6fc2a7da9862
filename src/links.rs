//! Links and their variants

use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Behavioral category of a link, as stored and as filtered on
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// Generated code, plain redirect
    Standard,
    /// Custom alias, plain redirect
    Custom,
    /// Password gate before the redirect
    Protected,
    /// Stops resolving after its expiry
    Fire,
    /// Destination depends on the country of the caller
    Location,
}

impl Variant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Custom => "custom",
            Self::Protected => "protected",
            Self::Fire => "fire",
            Self::Location => "location",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "standard" => Ok(Self::Standard),
            "custom" => Ok(Self::Custom),
            "protected" => Ok(Self::Protected),
            "fire" => Ok(Self::Fire),
            "location" => Ok(Self::Location),
            other => Err(format!("Unknown link variant: {other}")),
        }
    }
}

/// Country specific redirect of a location link
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoRule {
    /// ISO 3166-1 alpha-2 code, stored upper-cased
    pub country_code: String,

    /// Where callers from that country go
    pub redirect_url: String,
}

impl GeoRule {
    /// Does this rule apply to the given country? Case-insensitive
    pub fn matches(&self, country: &str) -> bool {
        self.country_code.eq_ignore_ascii_case(country)
    }
}

/// Variant with its variant-specific data
///
/// A single sum type, so the stored variant tag can never disagree with the fields implying it
#[derive(Clone, Debug, PartialEq)]
pub enum LinkKind {
    Standard,
    Custom,
    Protected {
        /// PHC string, never the plaintext
        password_hash: String,
    },
    Fire {
        expires_at: DateTime<Utc>,
    },
    Location {
        /// Evaluated in order, first match wins
        rules: Vec<GeoRule>,

        /// Used when no rule matches
        default_url: Option<String>,
    },
}

impl LinkKind {
    pub fn variant(&self) -> Variant {
        match self {
            Self::Standard => Variant::Standard,
            Self::Custom => Variant::Custom,
            Self::Protected { .. } => Variant::Protected,
            Self::Fire { .. } => Variant::Fire,
            Self::Location { .. } => Variant::Location,
        }
    }

    /// Rebuild the kind from its stored columns
    ///
    /// Fails when the columns required by the variant are missing
    pub fn from_parts(
        variant: Variant,
        password_hash: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        rules: Vec<GeoRule>,
        default_url: Option<String>,
    ) -> Result<Self, String> {
        match variant {
            Variant::Standard => Ok(Self::Standard),
            Variant::Custom => Ok(Self::Custom),
            Variant::Protected => password_hash
                .map(|password_hash| Self::Protected { password_hash })
                .ok_or_else(|| "Protected link without password hash".to_string()),
            Variant::Fire => expires_at
                .map(|expires_at| Self::Fire { expires_at })
                .ok_or_else(|| "Fire link without expiry".to_string()),
            Variant::Location if rules.is_empty() => {
                Err("Location link without geo rules".to_string())
            }
            Variant::Location => Ok(Self::Location { rules, default_url }),
        }
    }
}

/// One recorded resolution of a link
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Click {
    pub clicked_at: DateTime<Utc>,

    /// Country the caller was resolved to
    pub country: String,
}

/// A short link
#[derive(Clone, Debug)]
pub struct Link {
    pub id: Uuid,

    /// Unique forever, also after a soft-delete
    pub code: String,

    /// Where the link goes by default
    pub destination: String,

    /// Owner, `None` for anonymously created links
    pub owner_id: Option<Uuid>,

    pub kind: LinkKind,

    /// Rendered QR code as data URL, if rendering worked
    pub qr_code: Option<String>,

    /// Always equal to the number of recorded clicks
    pub click_count: i64,

    /// Soft-delete flag
    pub active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Link {
    pub fn variant(&self) -> Variant {
        self.kind.variant()
    }

    pub fn password_hash(&self) -> Option<&str> {
        match &self.kind {
            LinkKind::Protected { password_hash } => Some(password_hash),
            _ => None,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match &self.kind {
            LinkKind::Fire { expires_at } => Some(*expires_at),
            _ => None,
        }
    }

    /// Geo rules in stored order, empty for anything but location links
    pub fn geo_rules(&self) -> &[GeoRule] {
        match &self.kind {
            LinkKind::Location { rules, .. } => rules,
            _ => &[],
        }
    }

    pub fn default_geo_url(&self) -> Option<&str> {
        match &self.kind {
            LinkKind::Location { default_url, .. } => default_url.as_deref(),
            _ => None,
        }
    }

    /// Has the expiry of the link passed at the given instant?
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expires_at| expires_at <= now)
    }

    /// Is the link owned by the given owner?
    pub fn is_owned_by(&self, owner_id: &Uuid) -> bool {
        self.owner_id.as_ref() == Some(owner_id)
    }
}
