//! Postgres storage

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use uuid::Uuid;

use crate::links::Click;
use crate::links::GeoRule;
use crate::links::Link;
use crate::links::LinkKind;
use crate::links::Variant;

use super::CreateLinkValues;
use super::Error;
use super::LinkFilter;
use super::LinkPage;
use super::Result;
use super::Storage;

/// Migrator to run migrations on startup
static MIGRATOR: Migrator = sqlx::migrate!();

/// All columns of a link, in the order of [`LinkRow`]
const LINK_COLUMNS: &str = r"
    id,
    code,
    destination,
    owner_id,
    variant,
    password_hash,
    expires_at,
    geo_rules,
    default_geo_url,
    qr_code,
    click_count,
    active,
    created_at,
    updated_at
";

/// `SQLx` version of a link
#[derive(sqlx::FromRow)]
struct LinkRow {
    id: Uuid,
    code: String,
    destination: String,
    owner_id: Option<Uuid>,
    variant: String,
    password_hash: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    geo_rules: Json<Vec<GeoRule>>,
    default_geo_url: Option<String>,
    qr_code: Option<String>,
    click_count: i64,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LinkRow> for Link {
    type Error = Error;

    fn try_from(row: LinkRow) -> Result<Self> {
        let variant = row.variant.parse::<Variant>().map_err(Error::Corrupt)?;

        let kind = LinkKind::from_parts(
            variant,
            row.password_hash,
            row.expires_at,
            row.geo_rules.0,
            row.default_geo_url,
        )
        .map_err(|err| Error::Corrupt(format!("{}: {err}", row.code)))?;

        Ok(Self {
            id: row.id,
            code: row.code,
            destination: row.destination,
            owner_id: row.owner_id,
            kind,
            qr_code: row.qr_code,
            click_count: row.click_count,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// `SQLx` version of a click
#[derive(sqlx::FromRow)]
struct ClickRow {
    clicked_at: DateTime<Utc>,
    country: String,
}

impl From<ClickRow> for Click {
    fn from(row: ClickRow) -> Self {
        Self {
            clicked_at: row.clicked_at,
            country: row.country,
        }
    }
}

/// Postgres storage
#[derive(Clone)]
pub struct Postgres {
    /// Pool of connections
    connection_pool: PgPool,
}

impl Postgres {
    /// Create Postgres storage for a connection string
    ///
    /// Migrations will be run
    pub async fn connect(database_url: &str) -> Result<Self> {
        let connection_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await
            .map_err(connection_error)?;

        Self::new_with_pool(connection_pool).await
    }

    /// Create Postgres storage with existing pool
    ///
    /// Migrations will be run
    pub async fn new_with_pool(connection_pool: PgPool) -> Result<Self> {
        MIGRATOR
            .run(&connection_pool)
            .await
            .map_err(|err| Error::Connection(format!("Migrations could not run: {err}")))?;

        Ok(Self { connection_pool })
    }
}

#[async_trait]
impl Storage for Postgres {
    async fn create_link(&self, values: &CreateLinkValues<'_>) -> Result<Link> {
        let (password_hash, expires_at, geo_rules, default_geo_url) = match values.kind {
            LinkKind::Standard | LinkKind::Custom => (None, None, Vec::new(), None),
            LinkKind::Protected { password_hash } => {
                (Some(password_hash.as_str()), None, Vec::new(), None)
            }
            LinkKind::Fire { expires_at } => (None, Some(*expires_at), Vec::new(), None),
            LinkKind::Location { rules, default_url } => {
                (None, None, rules.clone(), default_url.as_deref())
            }
        };

        let row = sqlx::query_as::<_, LinkRow>(&format!(
            r"
            INSERT INTO links (
                id, code, destination, owner_id, variant,
                password_hash, expires_at, geo_rules, default_geo_url, qr_code
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {LINK_COLUMNS}
            "
        ))
        .bind(Uuid::new_v4())
        .bind(values.code)
        .bind(values.destination)
        .bind(values.owner_id)
        .bind(values.kind.variant().as_str())
        .bind(password_hash)
        .bind(expires_at)
        .bind(Json(geo_rules))
        .bind(default_geo_url)
        .bind(values.qr_code)
        .fetch_one(&self.connection_pool)
        .await
        .map_err(insert_error)?;

        Link::try_from(row)
    }

    async fn find_single_link_by_code(&self, code: &str) -> Result<Option<Link>> {
        let row = sqlx::query_as::<_, LinkRow>(&format!(
            r"
            SELECT {LINK_COLUMNS}
            FROM links
            WHERE code = $1
            LIMIT 1
            "
        ))
        .bind(code)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        row.map(Link::try_from).transpose()
    }

    async fn find_links_by_owner(
        &self,
        owner_id: &Uuid,
        filter: &LinkFilter<'_>,
    ) -> Result<LinkPage> {
        let search = filter.search.map(like_pattern);
        let variant = filter.variant.map(Variant::as_str);

        let rows = sqlx::query_as::<_, LinkRow>(&format!(
            r#"
            SELECT {LINK_COLUMNS}
            FROM links
            WHERE owner_id = $1
                AND active
                AND ($2::TEXT IS NULL OR code ILIKE $2 OR destination ILIKE $2)
                AND ($3::TEXT IS NULL OR variant = $3)
            ORDER BY created_at DESC, code COLLATE "C" ASC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(owner_id)
        .bind(search.as_deref())
        .bind(variant)
        .bind(i64::try_from(filter.limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(filter.offset).unwrap_or(i64::MAX))
        .fetch_all(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        let total: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*)
            FROM links
            WHERE owner_id = $1
                AND active
                AND ($2::TEXT IS NULL OR code ILIKE $2 OR destination ILIKE $2)
                AND ($3::TEXT IS NULL OR variant = $3)
            ",
        )
        .bind(owner_id)
        .bind(search.as_deref())
        .bind(variant)
        .fetch_one(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        let links = rows
            .into_iter()
            .map(Link::try_from)
            .collect::<Result<Vec<Link>>>()?;

        Ok(LinkPage {
            links,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn find_all_links_by_owner(&self, owner_id: &Uuid) -> Result<Vec<Link>> {
        let rows = sqlx::query_as::<_, LinkRow>(&format!(
            r#"
            SELECT {LINK_COLUMNS}
            FROM links
            WHERE owner_id = $1
            ORDER BY created_at DESC, code COLLATE "C" ASC
            "#
        ))
        .bind(owner_id)
        .fetch_all(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        rows.into_iter().map(Link::try_from).collect()
    }

    async fn record_click(&self, link: &Link, click: &Click) -> Result<i64> {
        // one statement, the counter and the log can not drift apart
        let click_count: Option<i64> = sqlx::query_scalar(
            r"
            WITH counted AS (
                UPDATE links
                SET click_count = click_count + 1
                WHERE id = $1
                RETURNING id, click_count
            ), logged AS (
                INSERT INTO clicks (id, link_id, clicked_at, country)
                SELECT $2, counted.id, $3, $4
                FROM counted
            )
            SELECT click_count FROM counted
            ",
        )
        .bind(link.id)
        .bind(Uuid::new_v4())
        .bind(click.clicked_at)
        .bind(&click.country)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        click_count.ok_or_else(|| Error::Corrupt(format!("Unknown link: {}", link.code)))
    }

    async fn find_clicks_by_link(&self, link: &Link) -> Result<Vec<Click>> {
        let rows = sqlx::query_as::<_, ClickRow>(
            r"
            SELECT clicked_at, country
            FROM clicks
            WHERE link_id = $1
            ORDER BY clicked_at ASC
            ",
        )
        .bind(link.id)
        .fetch_all(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(rows.into_iter().map(Click::from).collect())
    }

    async fn find_clicks_by_owner(&self, owner_id: &Uuid) -> Result<Vec<Click>> {
        let rows = sqlx::query_as::<_, ClickRow>(
            r"
            SELECT clicks.clicked_at, clicks.country
            FROM clicks
            INNER JOIN links ON links.id = clicks.link_id
            WHERE links.owner_id = $1
            ORDER BY clicks.clicked_at ASC
            ",
        )
        .bind(owner_id)
        .fetch_all(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(rows.into_iter().map(Click::from).collect())
    }

    async fn delete_link(&self, link: &Link) -> Result<()> {
        sqlx::query(
            r"
            UPDATE links
            SET active = FALSE, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            ",
        )
        .bind(link.id)
        .execute(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(())
    }
}

/// Convert `SQLx` to storage connection error
fn connection_error<E>(err: E) -> Error
where
    E: std::error::Error,
{
    Error::Connection(err.to_string())
}

/// Convert `SQLx` insert errors, a unique violation means the code is taken
fn insert_error(err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(database_error) = &err {
        if database_error.is_unique_violation() {
            return Error::Conflict;
        }
    }

    connection_error(err)
}

/// Escape a search term for use in `ILIKE`
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");

    format!("%{escaped}%")
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tokio::task::JoinSet;

    use super::*;

    fn values<'a>(
        code: &'a str,
        destination: &'a str,
        owner_id: Option<&'a Uuid>,
        kind: &'a LinkKind,
    ) -> CreateLinkValues<'a> {
        CreateLinkValues {
            code,
            destination,
            owner_id,
            kind,
            qr_code: None,
        }
    }

    fn click(country: &str) -> Click {
        Click {
            clicked_at: Utc::now(),
            country: country.to_string(),
        }
    }

    #[test]
    fn test_like_pattern() {
        assert_eq!("%example%", like_pattern("example"));
        assert_eq!("%100\\%\\_off%", like_pattern("100%_off"));
    }

    #[sqlx::test]
    async fn test_create_link_conflicts_on_existing_code(pool: PgPool) {
        let storage = Postgres::new_with_pool(pool).await.unwrap();
        let destination = "https://www.example.com/";

        let link = storage
            .create_link(&values("abc", destination, None, &LinkKind::Standard))
            .await
            .unwrap();
        assert_eq!(0, link.click_count);
        assert!(link.active);

        let result = storage
            .create_link(&values("abc", destination, None, &LinkKind::Custom))
            .await;
        assert!(matches!(result, Err(Error::Conflict)));

        // codes are case-sensitive
        assert!(
            storage
                .create_link(&values("ABC", destination, None, &LinkKind::Standard))
                .await
                .is_ok()
        );

        // and stay reserved after a soft-delete
        storage.delete_link(&link).await.unwrap();

        let result = storage
            .create_link(&values("abc", destination, None, &LinkKind::Standard))
            .await;
        assert!(matches!(result, Err(Error::Conflict)));

        let link = storage.find_single_link_by_code("abc").await.unwrap();
        assert!(!link.unwrap().active);
    }

    #[sqlx::test]
    async fn test_variants_survive_storage(pool: PgPool) {
        let storage = Postgres::new_with_pool(pool).await.unwrap();
        let destination = "https://www.example.com/";

        let expires_at = "2030-05-01T12:30:00Z".parse::<DateTime<Utc>>().unwrap();
        let kinds = [
            LinkKind::Protected {
                password_hash: "$argon2id$v=19$hash".to_string(),
            },
            LinkKind::Fire { expires_at },
            LinkKind::Location {
                rules: vec![
                    GeoRule {
                        country_code: "IN".to_string(),
                        redirect_url: "https://in.example.com/".to_string(),
                    },
                    GeoRule {
                        country_code: "US".to_string(),
                        redirect_url: "https://us.example.com/".to_string(),
                    },
                ],
                default_url: Some("https://world.example.com/".to_string()),
            },
        ];

        for (index, kind) in kinds.iter().enumerate() {
            let code = format!("link-{index}");

            storage
                .create_link(&values(&code, destination, None, kind))
                .await
                .unwrap();

            let link = storage
                .find_single_link_by_code(&code)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(kind, &link.kind);
        }

        assert!(storage.find_single_link_by_code("nope").await.unwrap().is_none());
    }

    #[sqlx::test]
    async fn test_concurrent_clicks_are_not_lost(pool: PgPool) {
        let storage = Postgres::new_with_pool(pool).await.unwrap();

        let link = storage
            .create_link(&values(
                "abc",
                "https://www.example.com/",
                None,
                &LinkKind::Standard,
            ))
            .await
            .unwrap();

        let mut clicks = JoinSet::new();
        for index in 0..20 {
            let storage = storage.clone();
            let link = link.clone();
            let country = if index % 2 == 0 { "US" } else { "IN" };

            clicks.spawn(async move { storage.record_click(&link, &click(country)).await });
        }

        let mut counts = Vec::new();
        while let Some(count) = clicks.join_next().await {
            counts.push(count.unwrap().unwrap());
        }

        // every click saw its own increment
        counts.sort_unstable();
        assert_eq!((1..=20).collect::<Vec<i64>>(), counts);

        let link = storage
            .find_single_link_by_code("abc")
            .await
            .unwrap()
            .unwrap();
        let clicks = storage.find_clicks_by_link(&link).await.unwrap();

        assert_eq!(20, link.click_count);
        assert_eq!(20, clicks.len());
        assert_eq!(10, clicks.iter().filter(|click| click.country == "IN").count());
    }

    #[sqlx::test]
    async fn test_find_links_by_owner_filters_and_pages(pool: PgPool) {
        let storage = Postgres::new_with_pool(pool.clone()).await.unwrap();
        let owner_id = Uuid::new_v4();
        let other_owner_id = Uuid::new_v4();

        let protected = LinkKind::Protected {
            password_hash: "$argon2id$v=19$hash".to_string(),
        };

        let links = [
            ("docs", "https://docs.example.com/", &LinkKind::Custom),
            ("half_off", "https://shop.example.com/sale", &LinkKind::Custom),
            ("Xy12345", "https://vault.example.com/", &protected),
            ("Ab12345", "https://www.example.com/100%25", &LinkKind::Standard),
        ];
        for (code, destination, kind) in links {
            storage
                .create_link(&values(code, destination, Some(&owner_id), kind))
                .await
                .unwrap();
        }

        let other = storage
            .create_link(&values(
                "other-docs",
                "https://docs.example.com/",
                Some(&other_owner_id),
                &LinkKind::Custom,
            ))
            .await
            .unwrap();
        storage.record_click(&other, &click("FR")).await.unwrap();

        let deleted = storage
            .create_link(&values(
                "deleted-docs",
                "https://docs.example.com/",
                Some(&owner_id),
                &LinkKind::Custom,
            ))
            .await
            .unwrap();
        storage.record_click(&deleted, &click("US")).await.unwrap();
        storage.delete_link(&deleted).await.unwrap();

        let filter = |search, variant| LinkFilter {
            search,
            variant,
            offset: 0,
            limit: 10,
        };

        let page = storage
            .find_links_by_owner(&owner_id, &filter(None, None))
            .await
            .unwrap();
        assert_eq!(4, page.total);

        // search is case-insensitive, over code and destination
        let page = storage
            .find_links_by_owner(&owner_id, &filter(Some("DOCS"), None))
            .await
            .unwrap();
        assert_eq!(1, page.total);
        assert_eq!("docs", page.links[0].code);

        let page = storage
            .find_links_by_owner(&owner_id, &filter(Some("vault"), None))
            .await
            .unwrap();
        assert_eq!("Xy12345", page.links[0].code);

        // wildcards are searched for literally
        let page = storage
            .find_links_by_owner(&owner_id, &filter(Some("_"), None))
            .await
            .unwrap();
        assert_eq!(1, page.total);
        assert_eq!("half_off", page.links[0].code);

        let page = storage
            .find_links_by_owner(&owner_id, &filter(Some("%"), None))
            .await
            .unwrap();
        assert_eq!(1, page.total);
        assert_eq!("Ab12345", page.links[0].code);

        let page = storage
            .find_links_by_owner(&owner_id, &filter(None, Some(Variant::Protected)))
            .await
            .unwrap();
        assert_eq!(1, page.total);
        assert_eq!("Xy12345", page.links[0].code);

        let page = storage
            .find_links_by_owner(&owner_id, &filter(Some("example"), Some(Variant::Custom)))
            .await
            .unwrap();
        assert_eq!(2, page.total);

        // paging over links created at the same instant, newest first then by code
        sqlx::query("UPDATE links SET created_at = $1")
            .bind(Utc::now() - Duration::hours(1))
            .execute(&pool)
            .await
            .unwrap();

        let mut codes = Vec::new();
        for offset in [0, 2] {
            let page = storage
                .find_links_by_owner(
                    &owner_id,
                    &LinkFilter {
                        offset,
                        limit: 2,
                        ..LinkFilter::default()
                    },
                )
                .await
                .unwrap();
            assert_eq!(4, page.total);
            codes.extend(page.links.into_iter().map(|link| link.code));
        }
        assert_eq!(vec!["Ab12345", "Xy12345", "docs", "half_off"], codes);

        // deleted links still count for the analytics
        let all = storage.find_all_links_by_owner(&owner_id).await.unwrap();
        assert_eq!(5, all.len());

        let clicks = storage.find_clicks_by_owner(&owner_id).await.unwrap();
        assert_eq!(1, clicks.len());
        assert_eq!("US", clicks[0].country);
    }
}
