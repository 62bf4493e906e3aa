use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use entitlements_application::{
    MembershipCollision, MembershipRepository, RoleHierarchyRepository, SodPolicyRepository,
    SodWriteOutcome,
};
use entitlements_core::{AppError, AppResult, OrganizationId};
use entitlements_domain::{
    Membership, Permission, Role, RoleHierarchyEdge, RoleId, SodPolicy, SodScope, UserId,
    sort_permissions,
};


#[derive(Debug, Default)]
struct EntitlementState {
    roles: HashMap<RoleId, Role>,
    permissions: HashMap<Uuid, Permission>,
    grants: HashMap<RoleId, Vec<Uuid>>,
    edges: Vec<RoleHierarchyEdge>,
    memberships: Vec<Membership>,
    policies: Vec<SodPolicy>,
}

impl EntitlementState {
    fn guard_policy_write(&self, policy: &SodPolicy) -> Option<SodWriteOutcome> {
        if !policy.is_active() {
            return None;
        }

        if let Some(existing) = self.policies.iter().find(|existing| {
            existing.id() != policy.id()
                && existing.pair() == policy.pair()
                && existing.scope().overlaps(policy.scope())
        }) {
            return Some(SodWriteOutcome::Duplicate(existing.clone()));
        }

        let pair = policy.pair();
        self.memberships
            .iter()
            .filter(|membership| membership.role_id() == pair.role_a_id())
            .filter(|membership| policy.scope().covers(membership.organization_id()))
            .find(|membership| {
                self.memberships.iter().any(|other| {
                    other.binds(
                        membership.user_id(),
                        membership.organization_id(),
                        pair.role_b_id(),
                    )
                })
            })
            .map(|membership| {
                SodWriteOutcome::Collision(MembershipCollision {
                    user_id: membership.user_id().clone(),
                    organization_id: membership.organization_id().clone(),
                })
            })
    }
}

/// In-memory entitlement store implementing every repository port.
///
/// A single lock guards roles, memberships and policies so policy writes see
/// a consistent membership set.
#[derive(Debug, Default)]
pub struct InMemoryEntitlementStore {
    state: RwLock<EntitlementState>,
}

impl InMemoryEntitlementStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a role.
    pub async fn insert_role(&self, role: Role) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.roles.contains_key(role.id()) {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists",
                role.id()
            )));
        }

        state.roles.insert(role.id().clone(), role);
        Ok(())
    }

    /// Registers a permission; names are unique.
    pub async fn insert_permission(&self, permission: Permission) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state
            .permissions
            .values()
            .any(|existing| existing.name() == permission.name() || existing.id() == permission.id())
        {
            return Err(AppError::Conflict(format!(
                "permission '{}' already exists",
                permission.name()
            )));
        }

        state.permissions.insert(permission.id(), permission);
        Ok(())
    }

    /// Grants a registered permission directly to a registered role.
    pub async fn grant_permission(&self, role_id: &RoleId, permission_id: Uuid) -> AppResult<()> {
        let mut state = self.state.write().await;
        if !state.roles.contains_key(role_id) {
            return Err(AppError::NotFound(format!("role '{role_id}' was not found")));
        }
        if !state.permissions.contains_key(&permission_id) {
            return Err(AppError::NotFound(format!(
                "permission '{permission_id}' was not found"
            )));
        }

        let grants = state.grants.entry(role_id.clone()).or_default();
        if !grants.contains(&permission_id) {
            grants.push(permission_id);
        }

        Ok(())
    }

    /// Records that `edge.child_role_id()` inherits from `edge.parent_role_id()`.
    pub async fn add_inheritance(&self, edge: RoleHierarchyEdge) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.edges.iter().any(|existing| {
            existing.parent_role_id() == edge.parent_role_id()
                && existing.child_role_id() == edge.child_role_id()
        }) {
            return Err(AppError::Conflict(format!(
                "role '{}' already inherits from '{}'",
                edge.child_role_id(),
                edge.parent_role_id()
            )));
        }

        state.edges.push(edge);
        Ok(())
    }
}

#[async_trait]
impl MembershipRepository for InMemoryEntitlementStore {
    async fn list_user_memberships(
        &self,
        user_id: &UserId,
        organization_id: Option<&OrganizationId>,
    ) -> AppResult<Vec<Membership>> {
        let state = self.state.read().await;
        Ok(state
            .memberships
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
        let state = self.state.read().await;
        Ok(state
            .memberships
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
        let state = self.state.read().await;
        Ok(state
            .memberships
            .iter()
            .filter(|membership| {
                membership.user_id() == user_id && membership.organization_id() == organization_id
            })
            .filter_map(|membership| state.roles.get(membership.role_id()).cloned())
            .collect())
    }

    async fn insert_membership(&self, membership: Membership) -> AppResult<Membership> {
        let mut state = self.state.write().await;
        if state.memberships.iter().any(|existing| {
            existing.binds(
                membership.user_id(),
                membership.organization_id(),
                membership.role_id(),
            )
        }) {
            return Err(AppError::Conflict(format!(
                "role '{}' is already assigned to user '{}' in organization '{}'",
                membership.role_id(),
                membership.user_id(),
                membership.organization_id()
            )));
        }

        state.memberships.push(membership.clone());
        Ok(membership)
    }

    async fn delete_membership(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        role_id: &RoleId,
    ) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let before = state.memberships.len();
        state
            .memberships
            .retain(|membership| !membership.binds(user_id, organization_id, role_id));
        Ok(state.memberships.len() != before)
    }
}

#[async_trait]
impl RoleHierarchyRepository for InMemoryEntitlementStore {
    async fn find_role(&self, role_id: &RoleId) -> AppResult<Option<Role>> {
        Ok(self.state.read().await.roles.get(role_id).cloned())
    }

    async fn list_role_permissions(&self, role_id: &RoleId) -> AppResult<Vec<Permission>> {
        let state = self.state.read().await;
        let mut permissions: Vec<Permission> = state
            .grants
            .get(role_id)
            .into_iter()
            .flatten()
            .filter_map(|permission_id| state.permissions.get(permission_id).cloned())
            .collect();
        sort_permissions(&mut permissions);
        Ok(permissions)
    }

    async fn list_parent_role_ids(&self, role_id: &RoleId) -> AppResult<Vec<RoleId>> {
        let state = self.state.read().await;
        let mut edges: Vec<&RoleHierarchyEdge> = state
            .edges
            .iter()
            .filter(|edge| edge.child_role_id() == role_id)
            .collect();
        edges.sort_by(|left, right| {
            left.depth()
                .cmp(&right.depth())
                .then_with(|| left.parent_role_id().cmp(right.parent_role_id()))
        });

        Ok(edges
            .into_iter()
            .map(|edge| edge.parent_role_id().clone())
            .collect())
    }
}

#[async_trait]
impl SodPolicyRepository for InMemoryEntitlementStore {
    async fn find_policy(&self, policy_id: Uuid) -> AppResult<Option<SodPolicy>> {
        Ok(self
            .state
            .read()
            .await
            .policies
            .iter()
            .find(|policy| policy.id() == policy_id)
            .cloned())
    }

    async fn create_policy(&self, policy: SodPolicy) -> AppResult<SodWriteOutcome> {
        let mut state = self.state.write().await;
        if state.policies.iter().any(|existing| existing.id() == policy.id()) {
            return Err(AppError::Conflict(format!(
                "role conflict '{}' already exists",
                policy.id()
            )));
        }

        if let Some(rejected) = state.guard_policy_write(&policy) {
            return Ok(rejected);
        }

        state.policies.push(policy.clone());
        Ok(SodWriteOutcome::Written(policy))
    }

    async fn update_policy(&self, policy: SodPolicy) -> AppResult<SodWriteOutcome> {
        let mut state = self.state.write().await;
        let Some(index) = state
            .policies
            .iter()
            .position(|existing| existing.id() == policy.id())
        else {
            return Ok(SodWriteOutcome::NotFound);
        };

        if let Some(rejected) = state.guard_policy_write(&policy) {
            return Ok(rejected);
        }

        state.policies[index] = policy.clone();
        Ok(SodWriteOutcome::Written(policy))
    }

    async fn delete_policy(&self, policy_id: Uuid) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let before = state.policies.len();
        state.policies.retain(|policy| policy.id() != policy_id);
        Ok(state.policies.len() != before)
    }

    async fn list_policies(&self, scope: &SodScope) -> AppResult<Vec<SodPolicy>> {
        let state = self.state.read().await;
        let mut policies: Vec<SodPolicy> = state
            .policies
            .iter()
            .filter(|policy| policy.scope().is_visible_from(scope))
            .cloned()
            .collect();
        policies.sort_by_key(SodPolicy::created_at);
        Ok(policies)
    }
}
