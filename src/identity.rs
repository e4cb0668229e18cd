//! Identity resolution: player UUID → display name and linked chat account.
//!
//! Names are cached in the local store and trusted for a fixed TTL. Past
//! that, the profile service is asked again. If it cannot be reached, the
//! stale name is served instead (optionally only up to a hard ceiling), so
//! a service outage never blocks an ingestion pass for known players.
//!
//! Refreshes are serialized per UUID: two concurrent lookups of the same
//! stale player make one remote call, and the second sees its result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use serde::Deserialize;
use uuid::Uuid;

use crate::model::IdentityRecord;
use crate::storage::{IdentityStore, StorageError};

/// HTTP timeout for a single profile request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("profile request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("profile service returned HTTP {0}")]
    HttpStatus(u16),

    #[error("no profile exists for {0}")]
    UnknownProfile(Uuid),

    #[error("cached name for {uuid} is {age:#} old and could not be refreshed: {source}")]
    TooStale {
        uuid: Uuid,
        age: SignedDuration,
        source: Box<IdentityError>,
    },

    #[error("no known player matches {0:?}")]
    NoMatch(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("storage task failed: {0}")]
    Task(String),
}

pub type Result<T> = core::result::Result<T, IdentityError>;

/// Source of canonical player names.
#[async_trait]
pub trait ProfileService: Send + Sync {
    async fn fetch_name(&self, uuid: Uuid) -> Result<String>;
}

/// The Mojang session server profile endpoint.
pub struct MojangService {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct Profile {
    name: String,
}

impl MojangService {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl ProfileService for MojangService {
    async fn fetch_name(&self, uuid: Uuid) -> Result<String> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), uuid.simple());
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT || status == reqwest::StatusCode::NOT_FOUND {
            return Err(IdentityError::UnknownProfile(uuid));
        }
        if !status.is_success() {
            return Err(IdentityError::HttpStatus(status.as_u16()));
        }

        let profile: Profile = response.json().await?;
        Ok(profile.name)
    }
}

/// A resolved player: what projection needs from the identity layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub account_id: Option<u64>,
}

impl From<IdentityRecord> for Identity {
    fn from(record: IdentityRecord) -> Self {
        Self {
            name: record.name,
            account_id: record.account_id,
        }
    }
}

type UuidLocks = HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>;

pub struct IdentityResolver {
    store: Arc<dyn IdentityStore>,
    service: Arc<dyn ProfileService>,
    ttl: SignedDuration,
    max_stale: Option<SignedDuration>,
    locks: Mutex<UuidLocks>,
}

impl IdentityResolver {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        service: Arc<dyn ProfileService>,
        ttl: SignedDuration,
        max_stale: Option<SignedDuration>,
    ) -> Self {
        Self {
            store,
            service,
            ttl,
            max_stale,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Name and linked account for `uuid`, refreshing the cached name when
    /// it is missing or older than the TTL.
    pub async fn resolve(&self, uuid: Uuid) -> Result<Identity> {
        let lock = self.lock_for(uuid);
        let _guard = lock.lock().await;

        let now = Timestamp::now();
        let cached = self.with_store(move |s| s.find_by_uuid(uuid)).await?;

        if let Some(record) = &cached
            && now.duration_since(record.refreshed_at) <= self.ttl
        {
            return Ok(record.clone().into());
        }

        match self.service.fetch_name(uuid).await {
            Ok(name) => {
                let record = IdentityRecord {
                    uuid,
                    name,
                    account_id: cached.as_ref().and_then(|r| r.account_id),
                    refreshed_at: now,
                };
                self.save(record.clone(), cached.is_some()).await?;
                tracing::debug!(%uuid, name = %record.name, "Refreshed player name");
                Ok(record.into())
            }
            Err(e) => {
                let Some(record) = cached else {
                    return Err(e);
                };
                let age = now.duration_since(record.refreshed_at);
                if let Some(max) = self.max_stale
                    && age > max
                {
                    return Err(IdentityError::TooStale {
                        uuid,
                        age,
                        source: Box::new(e),
                    });
                }
                tracing::warn!(%uuid, error = %e, age = %format!("{age:#}"), "Serving stale player name");
                Ok(record.into())
            }
        }
    }

    /// Link (or with `None`, unlink) a chat account to a player given by
    /// UUID or by name. A UUID not yet stored is resolved first.
    pub async fn link(&self, query: &str, account_id: Option<u64>) -> Result<IdentityRecord> {
        let uuid = match query.parse::<Uuid>() {
            Ok(uuid) => {
                self.resolve(uuid).await?;
                uuid
            }
            Err(_) => {
                let name = query.to_string();
                self.with_store(move |s| s.find_by_name(&name))
                    .await?
                    .ok_or_else(|| IdentityError::NoMatch(query.to_string()))?
                    .uuid
            }
        };

        let lock = self.lock_for(uuid);
        let _guard = lock.lock().await;

        let mut record = self
            .with_store(move |s| s.find_by_uuid(uuid))
            .await?
            .ok_or_else(|| IdentityError::NoMatch(query.to_string()))?;
        record.account_id = account_id;
        self.save(record.clone(), true).await?;

        tracing::info!(%uuid, name = %record.name, ?account_id, "Updated account link");
        Ok(record)
    }

    /// Stored identity by name, without contacting the profile service.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<IdentityRecord>> {
        let name = name.to_string();
        self.with_store(move |s| s.find_by_name(&name)).await
    }

    fn lock_for(&self, uuid: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(uuid).or_default())
    }

    async fn save(&self, record: IdentityRecord, exists: bool) -> Result<()> {
        self.with_store(move |s| {
            if exists {
                s.update(&record)
            } else {
                s.insert(&record)
            }
        })
        .await
    }

    /// Run a store operation on the blocking pool.
    async fn with_store<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn IdentityStore) -> crate::storage::Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| IdentityError::Task(e.to_string()))?;
        Ok(result?)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use super::fake::FakeProfiles;
    use crate::storage::Storage;

    struct Setup {
        _dir: TempDir,
        storage: Arc<Storage>,
        profiles: Arc<FakeProfiles>,
    }

    impl Setup {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let storage = Arc::new(Storage::new(dir.path().join("mirror.sqlite")).unwrap());
            Self {
                _dir: dir,
                storage,
                profiles: Arc::new(FakeProfiles::default()),
            }
        }

        fn resolver(&self, max_stale: Option<SignedDuration>) -> IdentityResolver {
            IdentityResolver::new(
                self.storage.clone(),
                self.profiles.clone(),
                SignedDuration::from_hours(24),
                max_stale,
            )
        }

        fn seed(&self, uuid: Uuid, name: &str, age_hours: i64, account_id: Option<u64>) {
            let refreshed_at = Timestamp::now()
                .checked_sub(SignedDuration::from_hours(age_hours))
                .unwrap();
            self.storage
                .insert(&IdentityRecord {
                    uuid,
                    name: name.to_string(),
                    account_id,
                    refreshed_at,
                })
                .unwrap();
        }
    }

    #[tokio::test]
    async fn fresh_record_makes_no_remote_call() {
        let setup = Setup::new();
        let uuid = Uuid::new_v4();
        setup.seed(uuid, "Luffy", 1, Some(7));

        let identity = setup.resolver(None).resolve(uuid).await.unwrap();

        assert_eq!(identity.name, "Luffy");
        assert_eq!(identity.account_id, Some(7));
        assert_eq!(setup.profiles.calls(), 0);
    }

    #[tokio::test]
    async fn expired_record_is_refreshed_once_and_keeps_link() {
        let setup = Setup::new();
        let uuid = Uuid::new_v4();
        setup.seed(uuid, "OldName", 25, Some(7));
        setup.profiles.set_name(uuid, "NewName");

        let identity = setup.resolver(None).resolve(uuid).await.unwrap();

        assert_eq!(identity.name, "NewName");
        assert_eq!(identity.account_id, Some(7));
        assert_eq!(setup.profiles.calls(), 1);

        let stored = setup.storage.find_by_uuid(uuid).unwrap().unwrap();
        assert_eq!(stored.name, "NewName");
    }

    #[tokio::test]
    async fn unknown_uuid_is_fetched_and_inserted() {
        let setup = Setup::new();
        let uuid = Uuid::new_v4();
        setup.profiles.set_name(uuid, "Zoro");

        let identity = setup.resolver(None).resolve(uuid).await.unwrap();

        assert_eq!(identity, Identity { name: "Zoro".into(), account_id: None });
        assert!(setup.storage.find_by_uuid(uuid).unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_stale_lookups_share_one_refresh() {
        let setup = Setup::new();
        let uuid = Uuid::new_v4();
        setup.seed(uuid, "Nami", 30, None);
        setup.profiles.set_name(uuid, "Navigator");
        setup.profiles.set_delay(Duration::from_millis(50));
        let resolver = setup.resolver(None);

        let (a, b) = tokio::join!(resolver.resolve(uuid), resolver.resolve(uuid));

        assert_eq!(a.unwrap().name, "Navigator");
        assert_eq!(b.unwrap().name, "Navigator");
        assert_eq!(setup.profiles.calls(), 1);
    }

    #[tokio::test]
    async fn service_outage_serves_stale_name() {
        let setup = Setup::new();
        let uuid = Uuid::new_v4();
        setup.seed(uuid, "Usopp", 48, None);
        setup.profiles.set_down(true);

        let identity = setup.resolver(None).resolve(uuid).await.unwrap();

        assert_eq!(identity.name, "Usopp");
        assert_eq!(setup.profiles.calls(), 1);
    }

    #[tokio::test]
    async fn staleness_ceiling_rejects_very_old_names() {
        let setup = Setup::new();
        let uuid = Uuid::new_v4();
        setup.seed(uuid, "Sanji", 48, None);
        setup.profiles.set_down(true);

        let err = setup
            .resolver(Some(SignedDuration::from_hours(36)))
            .resolve(uuid)
            .await
            .unwrap_err();

        assert!(matches!(err, IdentityError::TooStale { .. }));
    }

    #[tokio::test]
    async fn outage_without_cached_record_fails() {
        let setup = Setup::new();
        setup.profiles.set_down(true);

        let err = setup.resolver(None).resolve(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, IdentityError::HttpStatus(503)));
    }

    #[tokio::test]
    async fn link_by_name_sets_account() {
        let setup = Setup::new();
        let uuid = Uuid::new_v4();
        setup.seed(uuid, "Robin", 1, None);
        let resolver = setup.resolver(None);

        let record = resolver.link("robin", Some(1234)).await.unwrap();
        assert_eq!(record.uuid, uuid);
        assert_eq!(record.account_id, Some(1234));

        resolver.link(&uuid.to_string(), None).await.unwrap();
        let stored = setup.storage.find_by_uuid(uuid).unwrap().unwrap();
        assert_eq!(stored.account_id, None);
    }

    #[tokio::test]
    async fn link_unknown_name_fails() {
        let setup = Setup::new();
        let err = setup.resolver(None).link("Brook", Some(1)).await.unwrap_err();
        assert!(matches!(err, IdentityError::NoMatch(_)));
    }
}
