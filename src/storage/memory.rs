//! Memory storage
//!
//! Will be destroyed on system shutdown

use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::links::Click;
use crate::links::Link;

use super::CreateLinkValues;
use super::LinkFilter;
use super::LinkPage;
use super::Result;
use super::Storage;

/// A link with its click log
#[derive(Debug)]
struct Record {
    link: Link,
    clicks: Vec<Click>,
}

/// An in-memory storage
///
/// Will be destroyed on system shutdown
#[derive(Clone, Debug, Default)]
pub struct Memory {
    /// All links in storage, by code
    links: Arc<Mutex<HashMap<String, Record>>>,
}

impl Memory {
    /// Create a new empty Memory storage
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for Memory {
    async fn create_link(&self, values: &CreateLinkValues<'_>) -> Result<Link> {
        let mut links = self.links.lock().await;

        // check and insert under the same lock, the code is the unique key
        let Entry::Vacant(entry) = links.entry(values.code.to_string()) else {
            return Err(super::Error::Conflict);
        };

        let now = Utc::now();

        let link = Link {
            id: Uuid::new_v4(),
            code: values.code.to_string(),
            destination: values.destination.to_string(),
            owner_id: values.owner_id.copied(),
            kind: values.kind.clone(),
            qr_code: values.qr_code.map(ToString::to_string),
            click_count: 0,
            active: true,
            created_at: now,
            updated_at: now,
        };

        entry.insert(Record {
            link: link.clone(),
            clicks: Vec::new(),
        });

        Ok(link)
    }

    async fn find_single_link_by_code(&self, code: &str) -> Result<Option<Link>> {
        Ok(self
            .links
            .lock()
            .await
            .get(code)
            .map(|record| record.link.clone()))
    }

    async fn find_links_by_owner(
        &self,
        owner_id: &Uuid,
        filter: &LinkFilter<'_>,
    ) -> Result<LinkPage> {
        let mut links = self
            .links
            .lock()
            .await
            .values()
            .map(|record| &record.link)
            .filter(|link| link.active && link.is_owned_by(owner_id) && filter.matches(link))
            .cloned()
            .collect::<Vec<Link>>();

        links.sort_by(newest_first);

        let total = links.len() as u64;

        let links = links
            .into_iter()
            .skip(usize::try_from(filter.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(filter.limit).unwrap_or(usize::MAX))
            .collect();

        Ok(LinkPage { links, total })
    }

    async fn find_all_links_by_owner(&self, owner_id: &Uuid) -> Result<Vec<Link>> {
        let mut links = self
            .links
            .lock()
            .await
            .values()
            .filter(|record| record.link.is_owned_by(owner_id))
            .map(|record| record.link.clone())
            .collect::<Vec<Link>>();

        links.sort_by(newest_first);

        Ok(links)
    }

    async fn record_click(&self, link: &Link, click: &Click) -> Result<i64> {
        let mut links = self.links.lock().await;

        let record = links
            .get_mut(&link.code)
            .ok_or_else(|| super::Error::Corrupt(format!("Unknown link: {}", link.code)))?;

        record.clicks.push(click.clone());
        record.link.click_count += 1;

        Ok(record.link.click_count)
    }

    async fn find_clicks_by_link(&self, link: &Link) -> Result<Vec<Click>> {
        Ok(self
            .links
            .lock()
            .await
            .get(&link.code)
            .map(|record| record.clicks.clone())
            .unwrap_or_default())
    }

    async fn find_clicks_by_owner(&self, owner_id: &Uuid) -> Result<Vec<Click>> {
        Ok(self
            .links
            .lock()
            .await
            .values()
            .filter(|record| record.link.is_owned_by(owner_id))
            .flat_map(|record| record.clicks.iter().cloned())
            .collect())
    }

    async fn delete_link(&self, link: &Link) -> Result<()> {
        if let Some(record) = self.links.lock().await.get_mut(&link.code) {
            record.link.active = false;
            record.link.updated_at = Utc::now();
        }

        Ok(())
    }
}

/// Newest first, links created at the same instant by code
fn newest_first(a: &Link, b: &Link) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.code.cmp(&b.code))
}
