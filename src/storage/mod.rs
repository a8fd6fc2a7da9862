//! All things related to the storage of links and their clicks

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::links::Click;
use crate::links::Link;
use crate::links::LinkKind;
use crate::links::Variant;

pub use memory::Memory;
pub use postgres::Postgres;

mod memory;
mod postgres;

/// Storage errors
#[derive(Debug, Error)]
pub enum Error {
    /// A connection error with the storage
    #[error("Connection error: {0}")]
    Connection(String),

    /// A link with the same code already exists
    #[error("Code already exists")]
    Conflict,

    /// A stored record could not be turned into a link
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Result type for all storage interactions
pub type Result<T> = core::result::Result<T, Error>;

/// Values to create a Link
pub struct CreateLinkValues<'a> {
    /// The unique code of the link
    pub code: &'a str,

    /// The URL the link redirects to by default
    pub destination: &'a str,

    /// The owner creating the link, if any
    pub owner_id: Option<&'a Uuid>,

    /// Variant with its data
    pub kind: &'a LinkKind,

    /// Rendered QR code
    pub qr_code: Option<&'a str>,
}

/// Filter for listing the links of an owner
#[derive(Debug, Default)]
pub struct LinkFilter<'a> {
    /// Case-insensitive substring of the code or the destination
    pub search: Option<&'a str>,

    /// Only links of this variant
    pub variant: Option<Variant>,

    /// Number of links to skip
    pub offset: u64,

    /// Maximum number of links to return
    pub limit: u64,
}

impl LinkFilter<'_> {
    /// Does a link match the search and variant of the filter?
    ///
    /// Only used by stores that filter in process
    fn matches(&self, link: &Link) -> bool {
        let matches_variant = self.variant.is_none_or(|variant| link.variant() == variant);

        let matches_search = self.search.is_none_or(|search| {
            let search = search.to_lowercase();

            link.code.to_lowercase().contains(&search)
                || link.destination.to_lowercase().contains(&search)
        });

        matches_variant && matches_search
    }
}

/// A page of links, with the total amount of matching links
#[derive(Debug)]
pub struct LinkPage {
    pub links: Vec<Link>,
    pub total: u64,
}

/// Storage with all supported operations
#[async_trait]
pub trait Storage: Clone + Send + Sync + 'static {
    /// Create a link
    ///
    /// Fails with [`Error::Conflict`] when the code is already taken by any link, deleted or not
    async fn create_link(&self, values: &CreateLinkValues<'_>) -> Result<Link>;

    /// Find a single link by code
    ///
    /// DOES NOT respect the soft-delete, handle with care
    async fn find_single_link_by_code(&self, code: &str) -> Result<Option<Link>>;

    /// Find a page of links of an owner, newest first
    ///
    /// Respects the soft-delete
    async fn find_links_by_owner(
        &self,
        owner_id: &Uuid,
        filter: &LinkFilter<'_>,
    ) -> Result<LinkPage>;

    /// Find all links of an owner
    ///
    /// DOES NOT respect the soft-delete
    async fn find_all_links_by_owner(&self, owner_id: &Uuid) -> Result<Vec<Link>>;

    /// Record a click: increment the counter and append to the click log as one atomic update
    ///
    /// Returns the new click count
    async fn record_click(&self, link: &Link, click: &Click) -> Result<i64>;

    /// Find the click log of a link, oldest first
    async fn find_clicks_by_link(&self, link: &Link) -> Result<Vec<Click>>;

    /// Find the click logs of all links of an owner
    ///
    /// DOES NOT respect the soft-delete
    async fn find_clicks_by_owner(&self, owner_id: &Uuid) -> Result<Vec<Click>>;

    /// Soft-delete a link, its code stays reserved
    async fn delete_link(&self, link: &Link) -> Result<()>;
}
