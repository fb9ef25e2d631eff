use crate::{ItipError, Result};
use async_trait::async_trait;
use caldav::{CalendarObject, DavClient, Folder, Url};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(10);

/// The calendar store consumed by the handlers. The wire implementation
/// is the CalDAV client; tests substitute an in-memory store.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    async fn list_folders(&self, component: &str) -> Result<Vec<Folder>>;
    async fn search_by_uid(
        &self,
        folder_href: &str,
        component: &str,
        uid: &str,
    ) -> Result<Vec<CalendarObject>>;
    async fn create(&self, object: &CalendarObject) -> Result<()>;
    async fn update(&self, object: &CalendarObject) -> Result<()>;
    async fn delete(&self, href: &str) -> Result<()>;
}

/// Mints a short-lived credential to act on a user's behalf against the
/// calendar store.
pub trait TokenMinter: Send + Sync {
    fn mint(&self, user: &str) -> Result<String>;
}

/// Hands out a store authenticated as the given recipient.
#[async_trait]
pub trait CalendarStoreProvider: Send + Sync {
    async fn store_for(&self, user: &str) -> Result<Arc<dyn CalendarStore>>;
}

struct DavStore {
    client: DavClient,
}

#[async_trait]
impl CalendarStore for DavStore {
    async fn list_folders(&self, component: &str) -> Result<Vec<Folder>> {
        Ok(self.client.list_folders(component).await?)
    }

    async fn search_by_uid(
        &self,
        folder_href: &str,
        component: &str,
        uid: &str,
    ) -> Result<Vec<CalendarObject>> {
        Ok(self.client.search_by_uid(folder_href, component, uid).await?)
    }

    async fn create(&self, object: &CalendarObject) -> Result<()> {
        Ok(self.client.put(object).await?)
    }

    async fn update(&self, object: &CalendarObject) -> Result<()> {
        Ok(self.client.put(object).await?)
    }

    async fn delete(&self, href: &str) -> Result<()> {
        Ok(self.client.delete(href).await?)
    }
}

struct CachedStore {
    user: String,
    expires_at: Instant,
    store: Arc<dyn CalendarStore>,
}

/// CalDAV-backed provider. A credential is minted lazily and reused
/// until one second before its TTL runs out; the cache lives in this
/// provider instance only.
pub struct DavStoreProvider {
    base_url: Url,
    minter: Arc<dyn TokenMinter>,
    token_ttl: Duration,
    cached: Mutex<Option<CachedStore>>,
}

impl DavStoreProvider {
    pub fn new(base_url: Url, minter: Arc<dyn TokenMinter>, token_ttl: Duration) -> Self {
        Self {
            base_url,
            minter,
            token_ttl,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl CalendarStoreProvider for DavStoreProvider {
    async fn store_for(&self, user: &str) -> Result<Arc<dyn CalendarStore>> {
        {
            let cached = self.cached.lock();
            if let Some(entry) = cached.as_ref() {
                if entry.user == user && Instant::now() < entry.expires_at {
                    return Ok(entry.store.clone());
                }
            }
        }

        let token = self.minter.mint(user)?;
        let client = DavClient::new(self.base_url.clone(), user, token)
            .map_err(|err| ItipError::Store(err.to_string()))?;
        let store: Arc<dyn CalendarStore> = Arc::new(DavStore { client });

        *self.cached.lock() = Some(CachedStore {
            user: user.to_string(),
            expires_at: Instant::now() + self.token_ttl.saturating_sub(Duration::from_secs(1)),
            store: store.clone(),
        });

        Ok(store)
    }
}
