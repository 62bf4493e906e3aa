use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use entitlements_core::{AppError, AppResult, OrganizationId};
use entitlements_domain::{Membership, Role, RoleId, UserId};

use crate::{Clock, MembershipRepository, SystemClock};

/// Reads and writes user, organization and role bindings.
#[derive(Clone)]
pub struct MembershipStore {
    repository: Arc<dyn MembershipRepository>,
    clock: Arc<dyn Clock>,
}

impl MembershipStore {
    /// Creates a store over a repository implementation.
    #[must_use]
    pub fn new(repository: Arc<dyn MembershipRepository>) -> Self {
        Self {
            repository,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used for binding timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Lists all bindings for a user, optionally scoped to one organization.
    pub async fn list_user_memberships(
        &self,
        user_id: &UserId,
        organization_id: Option<&OrganizationId>,
    ) -> AppResult<Vec<Membership>> {
        self.repository
            .list_user_memberships(user_id, organization_id)
            .await
    }

    /// Lists all bindings inside an organization.
    pub async fn list_memberships_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> AppResult<Vec<Membership>> {
        self.repository
            .list_memberships_for_organization(organization_id)
            .await
    }

    /// Lists the roles directly bound to a user, sorted by name.
    pub async fn list_user_roles(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> AppResult<Vec<Role>> {
        let mut roles = self
            .repository
            .list_user_roles(user_id, organization_id)
            .await?;
        roles.sort_by(|left, right| {
            left.name()
                .cmp(right.name())
                .then_with(|| left.id().cmp(right.id()))
        });
        roles.dedup_by(|left, right| left.id() == right.id());
        Ok(roles)
    }

    /// Binds a role to a user inside an organization.
    ///
    /// A duplicate binding surfaces as [`AppError::Conflict`].
    pub async fn assign_role(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        role_id: &RoleId,
    ) -> AppResult<Membership> {
        let now = self.clock.now();
        let membership = Membership::new(
            Uuid::new_v4(),
            user_id.clone(),
            organization_id.clone(),
            role_id.clone(),
            now,
            now,
        )?;

        let membership = self.repository.insert_membership(membership).await?;
        info!(
            user_id = %user_id,
            organization_id = %organization_id,
            role_id = %role_id,
            membership_id = %membership.id(),
            "role assigned"
        );

        Ok(membership)
    }

    /// Removes a binding, failing when it does not exist.
    pub async fn revoke_role(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        role_id: &RoleId,
    ) -> AppResult<()> {
        let deleted = self
            .repository
            .delete_membership(user_id, organization_id, role_id)
            .await?;

        if !deleted {
            return Err(AppError::NotFound(format!(
                "role '{role_id}' is not assigned to user '{user_id}' in organization '{organization_id}'"
            )));
        }

        info!(
            user_id = %user_id,
            organization_id = %organization_id,
            role_id = %role_id,
            "role revoked"
        );

        Ok(())
    }
}
