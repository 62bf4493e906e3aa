//! Redis-backed permission snapshot cache.

use std::time::Instant;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::warn;

use entitlements_application::{
    CacheSource, PermissionCache, PermissionCacheLookup, PermissionLoader,
};
use entitlements_core::{AppError, AppResult, OrganizationId};
use entitlements_domain::{Permission, UserId};

use crate::in_memory_permission_cache::{elapsed_millis, subject_cache_key};

/// Redis implementation of the permission cache port.
///
/// Entries are JSON arrays written with `SET EX`. Misses are reported to the
/// caller, which computes and writes the snapshot back.
#[derive(Clone)]
pub struct RedisPermissionCache {
    client: redis::Client,
    key_prefix: String,
    ttl_seconds: u64,
}

impl RedisPermissionCache {
    /// Creates a cache adapter with a configured Redis client, key prefix and
    /// entry lifetime. A zero lifetime disables writes.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>, ttl_seconds: u64) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
            ttl_seconds,
        }
    }

    fn key_for(&self, user_id: &UserId, organization_id: &OrganizationId) -> String {
        subject_cache_key(
            format!("{}:permissions", self.key_prefix).as_str(),
            user_id,
            organization_id,
        )
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }

    fn decode_permissions(cache_key: &str, value: &str) -> Option<Vec<Permission>> {
        match serde_json::from_str::<Vec<Permission>>(value) {
            Ok(permissions) => Some(permissions),
            Err(error) => {
                warn!(
                    cache_key = %cache_key,
                    error = %error,
                    "discarding undecodable permission cache entry"
                );
                None
            }
        }
    }
}

#[async_trait]
impl PermissionCache for RedisPermissionCache {
    async fn get_permissions<'a>(
        &'a self,
        user_id: &'a UserId,
        organization_id: &'a OrganizationId,
        _loader: PermissionLoader<'a>,
    ) -> AppResult<PermissionCacheLookup> {
        let started = Instant::now();
        let cache_key = self.key_for(user_id, organization_id);
        let mut connection = self.connection().await?;

        let encoded: Option<String> = connection.get(&cache_key).await.map_err(|error| {
            AppError::Internal(format!("failed to read permission cache entry: {error}"))
        })?;

        let permissions = encoded
            .as_deref()
            .and_then(|value| Self::decode_permissions(&cache_key, value));
        let source = if permissions.is_some() {
            CacheSource::Hit
        } else {
            CacheSource::Miss
        };

        Ok(PermissionCacheLookup {
            permissions,
            source,
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
        if self.ttl_seconds == 0 {
            return Ok(());
        }

        let value = serde_json::to_string(permissions).map_err(|error| {
            AppError::Internal(format!("failed to encode permission cache entry: {error}"))
        })?;
        let mut connection = self.connection().await?;

        connection
            .set_ex(self.key_for(user_id, organization_id), value, self.ttl_seconds)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to write permission cache entry: {error}"))
            })
    }

    async fn invalidate(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> AppResult<()> {
        let mut connection = self.connection().await?;

        connection
            .del::<_, ()>(self.key_for(user_id, organization_id))
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to invalidate permission cache entry: {error}"
                ))
            })
    }
}
