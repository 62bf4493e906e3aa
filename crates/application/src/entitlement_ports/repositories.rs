use async_trait::async_trait;
use uuid::Uuid;

use entitlements_core::{AppResult, OrganizationId};
use entitlements_domain::{Membership, Permission, Role, RoleId, SodPolicy, SodScope, UserId};

/// Repository port for user, organization and role bindings.
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    /// Lists bindings for a user, optionally restricted to one organization.
    async fn list_user_memberships(
        &self,
        user_id: &UserId,
        organization_id: Option<&OrganizationId>,
    ) -> AppResult<Vec<Membership>>;

    /// Lists every binding inside an organization.
    async fn list_memberships_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> AppResult<Vec<Membership>>;

    /// Lists roles directly bound to a user in an organization.
    ///
    /// Bindings whose role no longer exists are not returned.
    async fn list_user_roles(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> AppResult<Vec<Role>>;

    /// Persists a new binding, failing with a conflict on a duplicate triple.
    async fn insert_membership(&self, membership: Membership) -> AppResult<Membership>;

    /// Deletes a binding and returns whether one existed.
    async fn delete_membership(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        role_id: &RoleId,
    ) -> AppResult<bool>;
}

/// Repository port for roles, their direct grants and inheritance edges.
#[async_trait]
pub trait RoleHierarchyRepository: Send + Sync {
    /// Finds a role by id.
    async fn find_role(&self, role_id: &RoleId) -> AppResult<Option<Role>>;

    /// Lists permissions granted directly to a role.
    async fn list_role_permissions(&self, role_id: &RoleId) -> AppResult<Vec<Permission>>;

    /// Lists the roles whose permissions `role_id` inherits.
    async fn list_parent_role_ids(&self, role_id: &RoleId) -> AppResult<Vec<RoleId>>;
}

/// User holding both roles of a pair inside one organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipCollision {
    /// Offending user.
    pub user_id: UserId,
    /// Organization in which both roles are held.
    pub organization_id: OrganizationId,
}

/// Result of a guarded policy write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SodWriteOutcome {
    /// Policy was persisted.
    Written(SodPolicy),
    /// Another policy for the same pair exists in an overlapping scope.
    Duplicate(SodPolicy),
    /// A current membership set already violates the policy.
    Collision(MembershipCollision),
    /// Policy to update does not exist.
    NotFound,
}

/// Repository port for separation-of-duties policies.
///
/// Writes are guarded: when the written policy is active, the adapter checks
/// for duplicates in overlapping scopes and for membership collisions and
/// performs the write atomically with those checks.
#[async_trait]
pub trait SodPolicyRepository: Send + Sync {
    /// Finds a policy by id.
    async fn find_policy(&self, policy_id: Uuid) -> AppResult<Option<SodPolicy>>;

    /// Inserts a new policy after duplicate and collision checks.
    async fn create_policy(&self, policy: SodPolicy) -> AppResult<SodWriteOutcome>;

    /// Replaces a policy, excluding its own id from the duplicate check.
    async fn update_policy(&self, policy: SodPolicy) -> AppResult<SodWriteOutcome>;

    /// Deletes a policy and returns whether one existed.
    async fn delete_policy(&self, policy_id: Uuid) -> AppResult<bool>;

    /// Lists global policies plus policies scoped exactly to `scope`,
    /// oldest first.
    async fn list_policies(&self, scope: &SodScope) -> AppResult<Vec<SodPolicy>>;
}
