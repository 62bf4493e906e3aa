use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use entitlements_core::OrganizationId;
use entitlements_domain::{Permission, UserId};

type LocalCacheKey = (UserId, OrganizationId);

#[derive(Debug, Clone)]
struct LocalCacheEntry {
    permissions: Vec<Permission>,
    expires_at: DateTime<Utc>,
}

/// Process-local permission cache used when no shared cache is configured.
#[derive(Debug, Default)]
pub(super) struct LocalPermissionCache {
    entries: RwLock<HashMap<LocalCacheKey, LocalCacheEntry>>,
}

impl LocalPermissionCache {
    pub(super) async fn get(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        now: DateTime<Utc>,
    ) -> Option<Vec<Permission>> {
        let key = (user_id.clone(), organization_id.clone());

        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                Some(entry) if entry.expires_at > now => return Some(entry.permissions.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        if entries
            .get(&key)
            .is_some_and(|entry| entry.expires_at <= now)
        {
            entries.remove(&key);
        }

        None
    }

    pub(super) async fn insert(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        permissions: Vec<Permission>,
        expires_at: DateTime<Utc>,
    ) {
        self.entries.write().await.insert(
            (user_id.clone(), organization_id.clone()),
            LocalCacheEntry {
                permissions,
                expires_at,
            },
        );
    }

    pub(super) async fn remove(&self, user_id: &UserId, organization_id: &OrganizationId) {
        self.entries
            .write()
            .await
            .remove(&(user_id.clone(), organization_id.clone()));
    }
}
