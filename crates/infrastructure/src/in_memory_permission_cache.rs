use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use entitlements_application::{
    CacheSource, PermissionCache, PermissionCacheLookup, PermissionLoader,
};
use entitlements_core::{AppResult, OrganizationId};
use entitlements_domain::{Permission, UserId};


#[derive(Debug, Clone)]
struct PermissionCacheEntry {
    permissions: Vec<Permission>,
    expires_at: Instant,
}

/// In-memory read-through cache adapter for permission snapshots.
///
/// Misses are resolved through the supplied loader and stored for `ttl`.
#[derive(Debug)]
pub struct InMemoryPermissionCache {
    entries: RwLock<HashMap<String, PermissionCacheEntry>>,
    key_prefix: String,
    ttl: Duration,
}

impl InMemoryPermissionCache {
    /// Creates an empty cache; a zero `ttl` stores nothing.
    #[must_use]
    pub fn new(key_prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            key_prefix: key_prefix.into(),
            ttl,
        }
    }

    fn key_for(&self, user_id: &UserId, organization_id: &OrganizationId) -> String {
        subject_cache_key(self.key_prefix.as_str(), user_id, organization_id)
    }

    async fn read_entry(&self, key: &str) -> Option<Vec<Permission>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.permissions.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|entry| entry.expires_at <= Instant::now())
        {
            entries.remove(key);
        }

        None
    }

    async fn write_entry(&self, key: String, permissions: Vec<Permission>) {
        if self.ttl.is_zero() {
            return;
        }

        let now = Instant::now();
        let expires_at = now.checked_add(self.ttl).unwrap_or(now);
        self.entries.write().await.insert(
            key,
            PermissionCacheEntry {
                permissions,
                expires_at,
            },
        );
    }
}

#[async_trait]
impl PermissionCache for InMemoryPermissionCache {
    async fn get_permissions<'a>(
        &'a self,
        user_id: &'a UserId,
        organization_id: &'a OrganizationId,
        loader: PermissionLoader<'a>,
    ) -> AppResult<PermissionCacheLookup> {
        let started = Instant::now();
        let cache_key = self.key_for(user_id, organization_id);

        if let Some(permissions) = self.read_entry(&cache_key).await {
            return Ok(PermissionCacheLookup {
                permissions: Some(permissions),
                source: CacheSource::Hit,
                cache_key,
                latency_ms: elapsed_millis(started),
            });
        }

        let permissions = loader().await?;
        self.write_entry(cache_key.clone(), permissions.clone())
            .await;

        Ok(PermissionCacheLookup {
            permissions: Some(permissions),
            source: CacheSource::Miss,
            cache_key,
            latency_ms: elapsed_millis(started),
        })
    }

    async fn set_permissions(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        permissions: &[Permission],
    ) -> AppResult<()> {
        self.write_entry(self.key_for(user_id, organization_id), permissions.to_vec())
            .await;
        Ok(())
    }

    async fn invalidate(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> AppResult<()> {
        self.entries
            .write()
            .await
            .remove(&self.key_for(user_id, organization_id));
        Ok(())
    }
}

/// Builds `{prefix}:{len}:{organization}:{len}:{user}`.
///
/// Each id is preceded by its byte length, so ids containing `:` cannot make
/// two different subjects share a key.
pub(crate) fn subject_cache_key(
    prefix: &str,
    user_id: &UserId,
    organization_id: &OrganizationId,
) -> String {
    let organization_id = organization_id.as_str();
    let user_id = user_id.as_str();
    format!(
        "{prefix}:{}:{organization_id}:{}:{user_id}",
        organization_id.len(),
        user_id.len()
    )
}

pub(crate) fn elapsed_millis(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
