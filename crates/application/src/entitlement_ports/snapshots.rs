use chrono::{DateTime, Utc};
use serde::Serialize;

use entitlements_core::OrganizationId;
use entitlements_domain::{Membership, Permission, Role, UserId};

/// Computed permission snapshot for one user in one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionResolution {
    /// Deduplicated permissions sorted by name.
    pub permissions: Vec<Permission>,
    /// Direct roles the permissions were resolved from.
    pub roles: Vec<Role>,
    /// Namespaced hash of user, organization and sorted role ids.
    pub cache_key: String,
    /// Computation timestamp.
    pub generated_at: DateTime<Utc>,
}

/// Resolved entitlements for one user in an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserEntitlements {
    /// Exported user.
    pub user_id: UserId,
    /// Direct roles sorted by name.
    pub roles: Vec<Role>,
    /// Effective permissions sorted by name.
    pub permissions: Vec<Permission>,
}

/// Organization-wide permission export for audit tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionExport {
    /// Exported organization.
    pub organization_id: OrganizationId,
    /// Export timestamp.
    pub generated_at: DateTime<Utc>,
    /// Per-user entitlements ordered by user id.
    pub users: Vec<UserEntitlements>,
    /// Bindings skipped because their role does not exist.
    pub orphaned_memberships: Vec<Membership>,
}
