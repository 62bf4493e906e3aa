//! Permission snapshot computation, caching and permission checks.
//!
//! Snapshots are cached cache-aside in exactly one tier: a shared
//! [`PermissionCache`] when one is configured, otherwise a short-lived
//! process-local map. Callers must invalidate after role or membership
//! changes when a shared cache is in use.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use entitlements_core::{AppError, AppResult, OrganizationId};
use entitlements_domain::{Permission, Role, UserId, sort_permissions};

use crate::{
    Clock, MembershipStore, PermissionCache, PermissionLoader, PermissionLoaderFuture,
    PermissionResolution, ResolutionScratch, RoleHierarchyResolver, SystemClock,
};

mod config;
mod export;
mod local_cache;
mod snapshot;


pub use config::{
    DEFAULT_CACHE_NAMESPACE, DEFAULT_LOCAL_CACHE_TTL, EmptyResolutionPolicy, EntitlementConfig,
};

use local_cache::LocalPermissionCache;
use snapshot::snapshot_cache_key;

/// Application service resolving and caching user entitlements.
#[derive(Clone)]
pub struct EntitlementService {
    membership_store: MembershipStore,
    resolver: RoleHierarchyResolver,
    permission_cache: Option<Arc<dyn PermissionCache>>,
    local_cache: Arc<LocalPermissionCache>,
    clock: Arc<dyn Clock>,
    config: EntitlementConfig,
}

impl EntitlementService {
    /// Creates a service using the process-local cache tier.
    #[must_use]
    pub fn new(
        membership_store: MembershipStore,
        resolver: RoleHierarchyResolver,
        config: EntitlementConfig,
    ) -> Self {
        Self {
            membership_store,
            resolver: resolver.with_empty_resolution(config.empty_resolution),
            permission_cache: None,
            local_cache: Arc::new(LocalPermissionCache::default()),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Switches caching to a shared permission cache.
    #[must_use]
    pub fn with_permission_cache(mut self, permission_cache: Arc<dyn PermissionCache>) -> Self {
        self.permission_cache = Some(permission_cache);
        self
    }

    /// Replaces the clock used for expiry and snapshot timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns roles directly bound to the user in the organization.
    pub async fn get_user_roles(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> AppResult<Vec<Role>> {
        self.membership_store
            .list_user_roles(user_id, organization_id)
            .await
    }

    /// Returns the user's effective permissions, served through the cache tier.
    pub async fn get_user_permissions(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> AppResult<Vec<Permission>> {
        match &self.permission_cache {
            Some(permission_cache) => {
                self.shared_cached_permissions(permission_cache.as_ref(), user_id, organization_id)
                    .await
            }
            None => {
                self.locally_cached_permissions(user_id, organization_id)
                    .await
            }
        }
    }

    /// Returns whether the user holds a permission, matched by id when the
    /// input is a UUID and by case-insensitive name otherwise.
    ///
    /// Blank input is never granted and does not trigger resolution.
    pub async fn has_permission(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        permission: &str,
    ) -> AppResult<bool> {
        let requested = permission.trim();
        if requested.is_empty() {
            return Ok(false);
        }

        let permissions = self
            .get_user_permissions(user_id, organization_id)
            .await?;

        if let Ok(permission_id) = Uuid::parse_str(requested) {
            return Ok(permissions
                .iter()
                .any(|permission| permission.id() == permission_id));
        }

        Ok(permissions
            .iter()
            .any(|permission| permission.name().as_str().eq_ignore_ascii_case(requested)))
    }

    /// Computes a fresh snapshot without reading or writing any cache.
    pub async fn resolve_user_permissions(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> AppResult<PermissionResolution> {
        self.compute_permission_snapshot(user_id, organization_id)
            .await
    }

    /// Drops cached permissions for the user in both cache tiers.
    pub async fn invalidate_user_permissions(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> AppResult<()> {
        self.local_cache.remove(user_id, organization_id).await;
        if let Some(permission_cache) = &self.permission_cache {
            permission_cache
                .invalidate(user_id, organization_id)
                .await?;
        }

        Ok(())
    }

    async fn locally_cached_permissions(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> AppResult<Vec<Permission>> {
        if let Some(permissions) = self
            .local_cache
            .get(user_id, organization_id, self.clock.now())
            .await
        {
            debug!(
                user_id = %user_id,
                organization_id = %organization_id,
                "local permission cache hit"
            );
            return Ok(permissions);
        }

        let snapshot = self
            .compute_permission_snapshot(user_id, organization_id)
            .await?;

        if let Some(expires_at) = self.local_expiry() {
            self.local_cache
                .insert(
                    user_id,
                    organization_id,
                    snapshot.permissions.clone(),
                    expires_at,
                )
                .await;
        }

        Ok(snapshot.permissions)
    }

    async fn shared_cached_permissions(
        &self,
        permission_cache: &dyn PermissionCache,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> AppResult<Vec<Permission>> {
        let loader: PermissionLoader<'_> = Box::new(move || {
            Box::pin(async move {
                self.compute_permission_snapshot(user_id, organization_id)
                    .await
                    .map(|snapshot| snapshot.permissions)
            }) as PermissionLoaderFuture<'_>
        });

        let lookup = permission_cache
            .get_permissions(user_id, organization_id, loader)
            .await?;

        info!(
            user_id = %user_id,
            organization_id = %organization_id,
            cache_source = lookup.source.as_str(),
            cache_key = %lookup.cache_key,
            latency_ms = lookup.latency_ms,
            "permission cache lookup"
        );

        if let Some(permissions) = lookup.permissions {
            return Ok(permissions);
        }

        let snapshot = self
            .compute_permission_snapshot(user_id, organization_id)
            .await?;
        permission_cache
            .set_permissions(user_id, organization_id, &snapshot.permissions)
            .await?;

        Ok(snapshot.permissions)
    }

    async fn compute_permission_snapshot(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> AppResult<PermissionResolution> {
        let roles = self
            .membership_store
            .list_user_roles(user_id, organization_id)
            .await?;

        if roles.is_empty() {
            if self.config.empty_resolution == EmptyResolutionPolicy::Reject {
                return Err(AppError::NotFound(format!(
                    "user '{user_id}' has no roles in organization '{organization_id}'"
                )));
            }

            return Ok(PermissionResolution {
                permissions: Vec::new(),
                cache_key: self.cache_key(user_id, organization_id, &roles),
                roles,
                generated_at: self.clock.now(),
            });
        }

        let mut scratch = ResolutionScratch::default();
        let mut merged: HashMap<Uuid, Permission> = HashMap::new();
        for role in &roles {
            for permission in self.resolver.resolve_with(role.id(), &mut scratch).await? {
                merged.insert(permission.id(), permission);
            }
        }

        let mut permissions = merged.into_values().collect::<Vec<_>>();
        sort_permissions(&mut permissions);

        Ok(PermissionResolution {
            permissions,
            cache_key: self.cache_key(user_id, organization_id, &roles),
            roles,
            generated_at: self.clock.now(),
        })
    }

    fn cache_key(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        roles: &[Role],
    ) -> String {
        snapshot_cache_key(
            self.config.cache_namespace.as_str(),
            user_id,
            organization_id,
            roles.iter().map(Role::id),
        )
    }

    fn local_expiry(&self) -> Option<DateTime<Utc>> {
        if self.config.local_cache_ttl.is_zero() {
            return None;
        }

        let now = self.clock.now();
        let ttl = TimeDelta::from_std(self.config.local_cache_ttl).unwrap_or(TimeDelta::MAX);
        Some(
            now.checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }
}
