//! Separation-of-duties policy administration.
//!
//! Requests are normalized into a canonical [`RolePair`] and validated
//! (blank ids, self-conflict, blank reason) before reaching the repository,
//! whose guarded writes perform the duplicate and membership-collision checks
//! atomically with the insert or update.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use entitlements_core::{AppResult, OrganizationId, SodPolicyError};
use entitlements_domain::{RoleId, RolePair, SodPolicy, SodScope, UserId};

use crate::{
    Clock, MembershipCollision, MembershipRepository, SodPolicyRepository, SodWriteOutcome,
    SystemClock,
};

#[cfg(test)]
mod tests;

/// Partial update applied to an existing policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SodPolicyUpdate {
    /// New justification.
    pub reason: Option<String>,
    /// New enforcement flag; `false` soft-disables the policy.
    pub active: Option<bool>,
    /// New scope.
    pub scope: Option<SodScope>,
}

/// Application service creating, updating and listing role conflicts.
#[derive(Clone)]
pub struct SodPolicyBuilder {
    repository: Arc<dyn SodPolicyRepository>,
    membership_repository: Arc<dyn MembershipRepository>,
    clock: Arc<dyn Clock>,
}

impl SodPolicyBuilder {
    /// Creates a builder from required repositories.
    #[must_use]
    pub fn new(
        repository: Arc<dyn SodPolicyRepository>,
        membership_repository: Arc<dyn MembershipRepository>,
    ) -> Self {
        Self {
            repository,
            membership_repository,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used for creation timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Creates an active policy forbidding one user from holding both roles.
    ///
    /// `organization_id = None` creates a global policy.
    pub async fn create_role_conflict(
        &self,
        role_a_id: &str,
        role_b_id: &str,
        reason: &str,
        organization_id: Option<OrganizationId>,
    ) -> AppResult<SodPolicy> {
        let pair = RolePair::new(role_a_id, role_b_id)?;
        let policy = SodPolicy::new(
            Uuid::new_v4(),
            pair.clone(),
            SodScope::from_organization(organization_id),
            reason,
            true,
            self.clock.now(),
        )?;

        let outcome = self.repository.create_policy(policy).await?;
        let policy = accept_write(outcome, &pair, None)?;
        info!(
            policy_id = %policy.id(),
            role_a_id = %policy.pair().role_a_id(),
            role_b_id = %policy.pair().role_b_id(),
            scope = %policy.scope(),
            "role conflict created"
        );

        Ok(policy)
    }

    /// Updates reason, activation or scope of an existing policy.
    ///
    /// Duplicate and collision checks run only when the result is active.
    pub async fn update_role_conflict(
        &self,
        policy_id: Uuid,
        update: SodPolicyUpdate,
    ) -> AppResult<SodPolicy> {
        let existing = self.get_role_conflict(policy_id).await?;
        let revised = existing.revised(update.reason, update.active, update.scope)?;
        let pair = revised.pair().clone();

        let outcome = self.repository.update_policy(revised).await?;
        let policy = accept_write(outcome, &pair, Some(policy_id))?;
        info!(
            policy_id = %policy.id(),
            active = policy.is_active(),
            scope = %policy.scope(),
            "role conflict updated"
        );

        Ok(policy)
    }

    /// Deletes a policy and returns whether it existed.
    pub async fn delete_role_conflict(&self, policy_id: Uuid) -> AppResult<bool> {
        let deleted = self.repository.delete_policy(policy_id).await?;
        if deleted {
            info!(policy_id = %policy_id, "role conflict deleted");
        }

        Ok(deleted)
    }

    /// Returns one policy by id.
    pub async fn get_role_conflict(&self, policy_id: Uuid) -> AppResult<SodPolicy> {
        self.repository
            .find_policy(policy_id)
            .await?
            .ok_or_else(|| not_found(policy_id).into())
    }

    /// Lists global policies plus policies scoped exactly to the organization,
    /// oldest first. Without an organization only global policies are listed.
    pub async fn list_conflicts(
        &self,
        organization_id: Option<&OrganizationId>,
    ) -> AppResult<Vec<SodPolicy>> {
        let scope = SodScope::from_organization(organization_id.cloned());
        let mut policies = self.repository.list_policies(&scope).await?;
        policies.retain(|policy| policy.scope().is_visible_from(&scope));
        policies.sort_by_key(SodPolicy::created_at);
        Ok(policies)
    }

    /// Returns active policies that granting `role_id` would violate given the
    /// user's current roles in the organization.
    pub async fn check_assignment(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        role_id: &RoleId,
    ) -> AppResult<Vec<SodPolicy>> {
        let held_role_ids = self
            .membership_repository
            .list_user_memberships(user_id, Some(organization_id))
            .await?
            .into_iter()
            .map(|membership| membership.role_id().clone())
            .collect::<HashSet<_>>();

        let violated = self
            .list_conflicts(Some(organization_id))
            .await?
            .into_iter()
            .filter(|policy| policy.is_active())
            .filter(|policy| {
                policy
                    .pair()
                    .counterpart(role_id)
                    .is_some_and(|counterpart| held_role_ids.contains(counterpart))
            })
            .collect();

        Ok(violated)
    }
}

fn accept_write(
    outcome: SodWriteOutcome,
    pair: &RolePair,
    policy_id: Option<Uuid>,
) -> Result<SodPolicy, SodPolicyError> {
    match outcome {
        SodWriteOutcome::Written(policy) => Ok(policy),
        SodWriteOutcome::Duplicate(existing) => Err(SodPolicyError::Validation(format!(
            "a role conflict between {} already exists in {} (policy '{}')",
            pair,
            existing.scope(),
            existing.id()
        ))),
        SodWriteOutcome::Collision(MembershipCollision {
            user_id,
            organization_id,
        }) => Err(SodPolicyError::Validation(format!(
            "user '{user_id}' currently holds both roles {pair} in organization '{organization_id}'"
        ))),
        SodWriteOutcome::NotFound => Err(not_found(policy_id.unwrap_or_default())),
    }
}

fn not_found(policy_id: Uuid) -> SodPolicyError {
    SodPolicyError::NotFound(format!("role conflict '{policy_id}' was not found"))
}
