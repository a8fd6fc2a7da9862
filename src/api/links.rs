//! Links API endpoints
//!
//! Creation of all link variants, unlocking protected links and the management of the
//! links of an owner

use axum::Extension;
use axum::http::HeaderMap;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

use crate::analytics::Summary;
use crate::analytics::summarize;
use crate::client_ip::ClientIp;
use crate::config::Config;
use crate::creation::NewLink;
use crate::creation::Shortener;
use crate::creation::VariantParams;
use crate::errors::LinkError;
use crate::geo::CountryResolver;
use crate::links::Click;
use crate::links::GeoRule;
use crate::links::Link;
use crate::links::Variant;
use crate::resolution::Outcome;
use crate::resolution::Resolver;
use crate::storage::LinkFilter;
use crate::storage::Storage;

use super::Error;
use super::Form;
use super::Owner;
use super::PathParameters;
use super::QueryParameters;
use super::Success;

/// Default number of links per page
const DEFAULT_PAGE_SIZE: u64 = 10;

/// Maximum number of links per page
const MAX_PAGE_SIZE: u64 = 100;

/// Link response going to the user
///
/// Basically filtering which fields are shown to the user, the password hash never is
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    /// Code used to identify the link by the root
    pub code: String,

    /// Public short URL
    pub short_url: String,

    /// Url where root will redirect to
    pub destination: String,

    pub variant: Variant,

    /// Is a password needed to follow the link?
    pub is_protected: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub geo_rules: Vec<GeoRule>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_geo_url: Option<String>,

    /// QR code of the short URL, as data URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,

    pub click_count: i64,

    pub active: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl LinkResponse {
    /// Create a response from a [`Link`](Link)
    fn from_link(link: Link, config: &Config) -> Self {
        Self {
            short_url: config.short_url(&link.code),
            variant: link.variant(),
            is_protected: link.password_hash().is_some(),
            expires_at: link.expires_at(),
            geo_rules: link.geo_rules().to_vec(),
            default_geo_url: link.default_geo_url().map(ToString::to_string),
            code: link.code,
            destination: link.destination,
            qr_code: link.qr_code,
            click_count: link.click_count,
            active: link.active,
            created_at: link.created_at,
            updated_at: link.updated_at,
        }
    }
}

/// Create standard link form
///
/// An expiry date turns the link into a fire link
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateLinkForm {
    #[serde(alias = "fullUrl")]
    destination: String,

    /// The alias is normalized:
    /// - Leading and trailing slashes are removed
    /// - Unicode normalization
    custom_alias: Option<String>,

    /// RFC 3339 or `YYYY-MM-DDTHH:MM[:SS]` in UTC
    expires_at: Option<String>,
}

/// Create a standard, custom or fire link based on the [`CreateLinkForm`](CreateLinkForm) form
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -d '{ "destination": "https://www.example.com/", "customAlias": "promo" }' \
///     http://localhost:6000/api/links
/// ```
///
/// Response:
/// ```json
/// { "data": { "code": "promo", "shortUrl": "http://localhost:6000/promo" ... } }
/// ```
pub async fn create<S: Storage>(
    Extension(shortener): Extension<Shortener<S>>,
    Extension(config): Extension<Config>,
    owner: Option<Owner>,
    Form(form): Form<CreateLinkForm>,
) -> Result<Success<LinkResponse>, Error> {
    let params = match form.expires_at.filter(|expires_at| !expires_at.trim().is_empty()) {
        Some(expires_at) => VariantParams::Fire { expires_at },
        None => VariantParams::Standard,
    };

    create_link(&shortener, &config, owner, form.destination, form.custom_alias, params).await
}

/// Create protected link form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateProtectedLinkForm {
    #[serde(alias = "fullUrl")]
    destination: String,
    custom_alias: Option<String>,
    password: String,
}

/// Create a password protected link
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -d '{ "destination": "https://www.example.com/", "password": "secret" }' \
///     http://localhost:6000/api/links/protected
/// ```
pub async fn create_protected<S: Storage>(
    Extension(shortener): Extension<Shortener<S>>,
    Extension(config): Extension<Config>,
    owner: Option<Owner>,
    Form(form): Form<CreateProtectedLinkForm>,
) -> Result<Success<LinkResponse>, Error> {
    let params = VariantParams::Protected {
        password: form.password,
    };

    create_link(&shortener, &config, owner, form.destination, form.custom_alias, params).await
}

/// Create location link form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateLocationLinkForm {
    #[serde(alias = "fullUrl")]
    destination: String,
    custom_alias: Option<String>,

    /// Evaluated in order, first match wins
    geo_rules: Vec<GeoRule>,

    /// Used when no rule matches, the destination is used when absent
    default_geo_url: Option<String>,
}

/// Create a location link
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -d '{ "destination": "https://www.example.com/",
///           "geoRules": [ { "countryCode": "IN", "redirectUrl": "https://in.example.com/" } ] }' \
///     http://localhost:6000/api/links/location
/// ```
pub async fn create_location<S: Storage>(
    Extension(shortener): Extension<Shortener<S>>,
    Extension(config): Extension<Config>,
    owner: Option<Owner>,
    Form(form): Form<CreateLocationLinkForm>,
) -> Result<Success<LinkResponse>, Error> {
    let params = VariantParams::Location {
        rules: form.geo_rules,
        default_url: form.default_geo_url,
    };

    create_link(&shortener, &config, owner, form.destination, form.custom_alias, params).await
}

async fn create_link<S: Storage>(
    shortener: &Shortener<S>,
    config: &Config,
    owner: Option<Owner>,
    destination: String,
    alias: Option<String>,
    params: VariantParams,
) -> Result<Success<LinkResponse>, Error> {
    let new_link = NewLink {
        destination,
        alias,
        params,
        owner_id: owner.map(|owner| owner.id),
    };

    let link = shortener.create(new_link).await?;

    Ok(Success::created(LinkResponse::from_link(link, config)))
}

/// Unlock form
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnlockForm {
    password: String,
}

/// Where an unlocked link goes
#[derive(Debug, Serialize)]
pub struct UnlockResponse {
    url: String,
}

/// Unlock a protected link with its password
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -d '{ "password": "secret" }' \
///     http://localhost:6000/api/links/<code>/unlock
/// ```
///
/// Response:
/// ```json
/// { "data": { "url": "https://www.example.com/" } }
/// ```
pub async fn unlock<S: Storage>(
    ip_address: Option<ClientIp>,
    Extension(resolver): Extension<Resolver<S>>,
    Extension(countries): Extension<CountryResolver>,
    headers: HeaderMap,
    PathParameters(code): PathParameters<String>,
    Form(form): Form<UnlockForm>,
) -> Result<Success<UnlockResponse>, Error> {
    let country = countries.resolve(&headers, ip_address.as_ref().map(|ip| &ip.0));
    let code = normalize_code(&code);

    let outcome = resolver
        .resolve(&code, Some(&form.password), &country)
        .await?;

    match outcome {
        Outcome::Redirect(url) | Outcome::GeoRedirect(url) => {
            Ok(Success::ok(UnlockResponse { url }))
        }
        Outcome::PasswordRequired | Outcome::PasswordRejected => {
            Err(Error::unauthorized("Invalid password"))
        }
        Outcome::Expired => Err(Error::gone("Link has expired")),
        Outcome::NotFound => Err(LinkError::NotFound.into()),
    }
}

/// Query parameters for listing links
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// 1-based
    page: Option<u64>,
    page_size: Option<u64>,

    /// Case-insensitive substring of the code or the destination
    search: Option<String>,
    variant: Option<Variant>,
}

/// A page of links
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    links: Vec<LinkResponse>,
    total: u64,
    total_pages: u64,
    current_page: u64,
}

/// List the active links of the owner, newest first
///
/// Request:
/// ```sh
/// curl -v -H 'Authorization: Bearer tokentokentoken' \
///     'http://localhost:6000/api/links?page=1&pageSize=10&search=example&variant=custom'
/// ```
///
/// Response:
/// ```json
/// { "data": { "links": [ ... ], "total": 12, "totalPages": 2, "currentPage": 1 } }
/// ```
pub async fn list<S: Storage>(
    Extension(storage): Extension<S>,
    Extension(config): Extension<Config>,
    owner: Owner,
    QueryParameters(query): QueryParameters<ListQuery>,
) -> Result<Success<ListResponse>, Error> {
    let current_page = query.page.unwrap_or(1).max(1);
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|search| !search.is_empty());

    let filter = LinkFilter {
        search,
        variant: query.variant,
        offset: (current_page - 1).saturating_mul(page_size),
        limit: page_size,
    };

    let page = storage
        .find_links_by_owner(&owner.id, &filter)
        .await
        .map_err(LinkError::from)?;

    Ok(Success::ok(ListResponse {
        links: page
            .links
            .into_iter()
            .map(|link| LinkResponse::from_link(link, &config))
            .collect(),
        total: page.total,
        total_pages: page.total.div_ceil(page_size),
        current_page,
    }))
}

/// Link with its click log
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkDetailResponse {
    #[serde(flatten)]
    link: LinkResponse,
    clicks: Vec<Click>,
}

/// Get a single link of the owner, with its click log
///
/// Request:
/// ```sh
/// curl -v -H 'Authorization: Bearer tokentokentoken' \
///     http://localhost:6000/api/links/<code>
/// ```
pub async fn single<S: Storage>(
    Extension(storage): Extension<S>,
    Extension(config): Extension<Config>,
    owner: Owner,
    PathParameters(code): PathParameters<String>,
) -> Result<Success<LinkDetailResponse>, Error> {
    let link = fetch_owned_link(&storage, &owner, &code).await?;

    let clicks = storage
        .find_clicks_by_link(&link)
        .await
        .map_err(LinkError::from)?;

    Ok(Success::ok(LinkDetailResponse {
        link: LinkResponse::from_link(link, &config),
        clicks,
    }))
}

/// Soft-delete a link of the owner, its code stays reserved
///
/// Request:
/// ```sh
/// curl -v -X DELETE -H 'Authorization: Bearer tokentokentoken' \
///     http://localhost:6000/api/links/<code>
/// ```
pub async fn delete<S: Storage>(
    Extension(storage): Extension<S>,
    owner: Owner,
    PathParameters(code): PathParameters<String>,
) -> Result<Success<&'static str>, Error> {
    let link = fetch_owned_link(&storage, &owner, &code).await?;

    storage.delete_link(&link).await.map_err(LinkError::from)?;

    tracing::info!(r#"Deleted link "{code}""#);

    Ok(Success::<&'static str>::no_content())
}

/// Click analytics over all links of the owner
///
/// Request:
/// ```sh
/// curl -v -H 'Authorization: Bearer tokentokentoken' \
///     http://localhost:6000/api/links/analytics
/// ```
///
/// Response:
/// ```json
/// { "data": { "totalLinks": 3, "activeLinks": 2, "totalClicks": 12, ... } }
/// ```
pub async fn analytics<S: Storage>(
    Extension(storage): Extension<S>,
    owner: Owner,
) -> Result<Success<Summary>, Error> {
    let links = storage
        .find_all_links_by_owner(&owner.id)
        .await
        .map_err(LinkError::from)?;

    let clicks = storage
        .find_clicks_by_owner(&owner.id)
        .await
        .map_err(LinkError::from)?;

    Ok(Success::ok(summarize(&links, &clicks, Utc::now())))
}

/// Fetch an active link of the owner, links of others are not found
async fn fetch_owned_link<S: Storage>(
    storage: &S,
    owner: &Owner,
    code: &str,
) -> Result<Link, Error> {
    storage
        .find_single_link_by_code(&normalize_code(code))
        .await
        .map_err(LinkError::from)?
        .filter(|link| link.active && link.is_owned_by(&owner.id))
        .ok_or_else(|| LinkError::NotFound.into())
}

/// Codes in paths are matched the way the root matches them, NFC normalized
fn normalize_code(code: &str) -> String {
    code.nfc().collect()
}
