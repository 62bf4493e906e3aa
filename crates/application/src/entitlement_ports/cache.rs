use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use entitlements_core::{AppResult, OrganizationId};
use entitlements_domain::{Permission, UserId};

/// Future returned by a [`PermissionLoader`].
pub type PermissionLoaderFuture<'a> =
    Pin<Box<dyn Future<Output = AppResult<Vec<Permission>>> + Send + 'a>>;

/// Callback computing the full permission set on a cache miss.
pub type PermissionLoader<'a> = Box<dyn FnOnce() -> PermissionLoaderFuture<'a> + Send + 'a>;

/// Where a cached lookup was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    /// Value was already cached.
    Hit,
    /// Value was absent and may have been loaded.
    Miss,
}

impl CacheSource {
    /// Returns a stable label for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
        }
    }
}

/// Result of one permission cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionCacheLookup {
    /// Cached or loaded permissions, `None` when the cache could not resolve them.
    pub permissions: Option<Vec<Permission>>,
    /// Hit or miss.
    pub source: CacheSource,
    /// Resolved storage key.
    pub cache_key: String,
    /// Time spent in the lookup, in milliseconds.
    pub latency_ms: u64,
}

/// Optional shared cache port for permission snapshots.
#[async_trait]
pub trait PermissionCache: Send + Sync {
    /// Returns cached permissions, optionally resolving a miss through `loader`.
    async fn get_permissions<'a>(
        &'a self,
        user_id: &'a UserId,
        organization_id: &'a OrganizationId,
        loader: PermissionLoader<'a>,
    ) -> AppResult<PermissionCacheLookup>;

    /// Stores permissions for a user and organization.
    async fn set_permissions(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        permissions: &[Permission],
    ) -> AppResult<()>;

    /// Drops any cached permissions for a user and organization.
    async fn invalidate(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> AppResult<()>;
}
