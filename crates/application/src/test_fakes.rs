use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use entitlements_core::{AppError, AppResult, OrganizationId};
use entitlements_domain::{Membership, Permission, Role, RoleId, SodPolicy, SodScope, UserId};

use crate::{
    CacheSource, Clock, MembershipRepository, PermissionCache, PermissionCacheLookup,
    PermissionLoader, RoleHierarchyRepository, SodPolicyRepository, SodWriteOutcome,
};

pub(crate) fn user(value: &str) -> UserId {
    UserId::new(value).unwrap_or_else(|_| unreachable!())
}

pub(crate) fn organization(value: &str) -> OrganizationId {
    OrganizationId::new(value).unwrap_or_else(|_| unreachable!())
}

pub(crate) fn role_id(value: &str) -> RoleId {
    RoleId::new(value).unwrap_or_else(|_| unreachable!())
}

pub(crate) fn permission(name: &str) -> Permission {
    Permission::new(Uuid::new_v4(), name, None, None).unwrap_or_else(|_| unreachable!())
}

pub(crate) struct FixedClock {
    now: StdMutex<DateTime<Utc>>,
}

impl FixedClock {
    pub(crate) fn new() -> Self {
        Self {
            now: StdMutex::new(
                Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
                    .single()
                    .unwrap_or_else(|| unreachable!()),
            ),
        }
    }

    pub(crate) fn advance_millis(&self, millis: i64) {
        if let Ok(mut now) = self.now.lock() {
            *now += TimeDelta::milliseconds(millis);
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}

/// Role graph and memberships held in memory with lookup counters.
#[derive(Default)]
pub(crate) struct FakeEntitlementStore {
    roles: HashMap<RoleId, Role>,
    grants: HashMap<RoleId, Vec<Permission>>,
    parents: HashMap<RoleId, Vec<RoleId>>,
    memberships: Mutex<Vec<Membership>>,
    pub(crate) role_lookups: AtomicUsize,
    pub(crate) user_role_lookups: AtomicUsize,
}

impl FakeEntitlementStore {
    pub(crate) fn with_role(mut self, id: &str, permissions: Vec<Permission>) -> Self {
        let role = Role::new(id, id, None).unwrap_or_else(|_| unreachable!());
        self.roles.insert(role_id(id), role);
        self.grants.insert(role_id(id), permissions);
        self
    }

    pub(crate) fn with_parent(mut self, child: &str, parent: &str) -> Self {
        self.parents
            .entry(role_id(child))
            .or_default()
            .push(role_id(parent));
        self
    }

    pub(crate) fn with_membership(
        mut self,
        user_id: &str,
        organization_id: &str,
        role: &str,
    ) -> Self {
        let now = Utc::now();
        let membership = Membership::new(
            Uuid::new_v4(),
            user(user_id),
            organization(organization_id),
            role_id(role),
            now,
            now,
        )
        .unwrap_or_else(|_| unreachable!());
        self.memberships.get_mut().push(membership);
        self
    }
}

#[async_trait]
impl MembershipRepository for FakeEntitlementStore {
    async fn list_user_memberships(
        &self,
        user_id: &UserId,
        organization_id: Option<&OrganizationId>,
    ) -> AppResult<Vec<Membership>> {
        Ok(self
            .memberships
            .lock()
            .await
            .iter()
            .filter(|membership| membership.user_id() == user_id)
            .filter(|membership| {
                organization_id.is_none_or(|scoped| membership.organization_id() == scoped)
            })
            .cloned()
            .collect())
    }

    async fn list_memberships_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> AppResult<Vec<Membership>> {
        Ok(self
            .memberships
            .lock()
            .await
            .iter()
            .filter(|membership| membership.organization_id() == organization_id)
            .cloned()
            .collect())
    }

    async fn list_user_roles(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> AppResult<Vec<Role>> {
        self.user_role_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .list_user_memberships(user_id, Some(organization_id))
            .await?
            .iter()
            .filter_map(|membership| self.roles.get(membership.role_id()).cloned())
            .collect())
    }

    async fn insert_membership(&self, membership: Membership) -> AppResult<Membership> {
        let mut memberships = self.memberships.lock().await;
        if memberships.iter().any(|existing| {
            existing.binds(
                membership.user_id(),
                membership.organization_id(),
                membership.role_id(),
            )
        }) {
            return Err(AppError::Conflict("membership already exists".to_owned()));
        }

        memberships.push(membership.clone());
        Ok(membership)
    }

    async fn delete_membership(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        role_id: &RoleId,
    ) -> AppResult<bool> {
        let mut memberships = self.memberships.lock().await;
        let before = memberships.len();
        memberships.retain(|membership| !membership.binds(user_id, organization_id, role_id));
        Ok(memberships.len() != before)
    }
}

#[async_trait]
impl RoleHierarchyRepository for FakeEntitlementStore {
    async fn find_role(&self, role_id: &RoleId) -> AppResult<Option<Role>> {
        self.role_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.roles.get(role_id).cloned())
    }

    async fn list_role_permissions(&self, role_id: &RoleId) -> AppResult<Vec<Permission>> {
        Ok(self.grants.get(role_id).cloned().unwrap_or_default())
    }

    async fn list_parent_role_ids(&self, role_id: &RoleId) -> AppResult<Vec<RoleId>> {
        Ok(self.parents.get(role_id).cloned().unwrap_or_default())
    }
}

/// Policy repository returning a scripted write outcome.
#[derive(Default)]
pub(crate) struct FakeSodPolicyRepository {
    pub(crate) policies: Mutex<Vec<SodPolicy>>,
    pub(crate) scripted_outcome: Mutex<Option<SodWriteOutcome>>,
}

#[async_trait]
impl SodPolicyRepository for FakeSodPolicyRepository {
    async fn find_policy(&self, policy_id: Uuid) -> AppResult<Option<SodPolicy>> {
        Ok(self
            .policies
            .lock()
            .await
            .iter()
            .find(|policy| policy.id() == policy_id)
            .cloned())
    }

    async fn create_policy(&self, policy: SodPolicy) -> AppResult<SodWriteOutcome> {
        if let Some(outcome) = self.scripted_outcome.lock().await.take() {
            return Ok(outcome);
        }

        self.policies.lock().await.push(policy.clone());
        Ok(SodWriteOutcome::Written(policy))
    }

    async fn update_policy(&self, policy: SodPolicy) -> AppResult<SodWriteOutcome> {
        if let Some(outcome) = self.scripted_outcome.lock().await.take() {
            return Ok(outcome);
        }

        let mut policies = self.policies.lock().await;
        let Some(existing) = policies.iter_mut().find(|existing| existing.id() == policy.id())
        else {
            return Ok(SodWriteOutcome::NotFound);
        };
        *existing = policy.clone();
        Ok(SodWriteOutcome::Written(policy))
    }

    async fn delete_policy(&self, policy_id: Uuid) -> AppResult<bool> {
        let mut policies = self.policies.lock().await;
        let before = policies.len();
        policies.retain(|policy| policy.id() != policy_id);
        Ok(policies.len() != before)
    }

    async fn list_policies(&self, scope: &SodScope) -> AppResult<Vec<SodPolicy>> {
        Ok(self
            .policies
            .lock()
            .await
            .iter()
            .filter(|policy| policy.scope().is_visible_from(scope))
            .cloned()
            .collect())
    }
}

/// Shared cache double; resolves misses through the loader when read-through.
#[derive(Default)]
pub(crate) struct FakePermissionCache {
    pub(crate) entries: Mutex<HashMap<(UserId, OrganizationId), Vec<Permission>>>,
    pub(crate) read_through: bool,
    pub(crate) writes: AtomicUsize,
    pub(crate) invalidations: AtomicUsize,
}

#[async_trait]
impl PermissionCache for FakePermissionCache {
    async fn get_permissions<'a>(
        &'a self,
        user_id: &'a UserId,
        organization_id: &'a OrganizationId,
        loader: PermissionLoader<'a>,
    ) -> AppResult<PermissionCacheLookup> {
        let key = (user_id.clone(), organization_id.clone());
        let cache_key = format!("fake:{organization_id}:{user_id}");

        if let Some(permissions) = self.entries.lock().await.get(&key).cloned() {
            return Ok(PermissionCacheLookup {
                permissions: Some(permissions),
                source: CacheSource::Hit,
                cache_key,
                latency_ms: 0,
            });
        }

        let permissions = if self.read_through {
            let permissions = loader().await?;
            self.entries.lock().await.insert(key, permissions.clone());
            Some(permissions)
        } else {
            None
        };

        Ok(PermissionCacheLookup {
            permissions,
            source: CacheSource::Miss,
            cache_key,
            latency_ms: 0,
        })
    }

    async fn set_permissions(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        permissions: &[Permission],
    ) -> AppResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().await.insert(
            (user_id.clone(), organization_id.clone()),
            permissions.to_vec(),
        );
        Ok(())
    }

    async fn invalidate(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> AppResult<()> {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .await
            .remove(&(user_id.clone(), organization_id.clone()));
        Ok(())
    }
}
