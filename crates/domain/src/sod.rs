//! Separation-of-duties policy types.
//!
//! A policy forbids one user from holding both roles of a [`RolePair`] within
//! its [`SodScope`]. Pairs are stored in canonical order so that `(a, b)` and
//! `(b, a)` describe the same policy.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use entitlements_core::{OrganizationId, SodPolicyError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::RoleId;

/// Scope a policy applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "organization_id", rename_all = "snake_case")]
pub enum SodScope {
    /// Applies in every organization.
    Global,
    /// Applies only inside one organization.
    Organization(OrganizationId),
}

impl SodScope {
    /// Maps an optional organization onto a scope, `None` meaning global.
    #[must_use]
    pub fn from_organization(organization_id: Option<OrganizationId>) -> Self {
        organization_id.map_or(Self::Global, Self::Organization)
    }

    /// Returns the scoped organization, `None` for global policies.
    #[must_use]
    pub fn organization_id(&self) -> Option<&OrganizationId> {
        match self {
            Self::Global => None,
            Self::Organization(organization_id) => Some(organization_id),
        }
    }

    /// Returns whether two scopes can hold duplicate policies for one pair.
    ///
    /// Global overlaps every scope; organization scopes overlap only themselves.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Global, _) | (_, Self::Global) => true,
            (Self::Organization(left), Self::Organization(right)) => left == right,
        }
    }

    /// Returns whether this scope governs memberships in the organization.
    #[must_use]
    pub fn covers(&self, organization_id: &OrganizationId) -> bool {
        match self {
            Self::Global => true,
            Self::Organization(scoped) => scoped == organization_id,
        }
    }

    /// Returns whether a policy in this scope is listed for `requested`.
    ///
    /// Global policies are always listed; organization policies only for an
    /// exact organization match.
    #[must_use]
    pub fn is_visible_from(&self, requested: &Self) -> bool {
        match self {
            Self::Global => true,
            Self::Organization(_) => self == requested,
        }
    }
}

impl Display for SodScope {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => formatter.write_str("global scope"),
            Self::Organization(organization_id) => {
                write!(formatter, "organization '{organization_id}'")
            }
        }
    }
}

/// Canonically ordered pair of conflicting roles, `role_a < role_b`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RolePair {
    role_a_id: RoleId,
    role_b_id: RoleId,
}

impl RolePair {
    /// Trims and orders both identifiers, then rejects blank or equal roles.
    pub fn new(first: &str, second: &str) -> Result<Self, SodPolicyError> {
        let first = first.trim();
        let second = second.trim();
        let (low, high) = if first <= second {
            (first, second)
        } else {
            (second, first)
        };

        if low.is_empty() || high.is_empty() {
            return Err(SodPolicyError::Validation(
                "both role ids are required".to_owned(),
            ));
        }

        if low == high {
            return Err(SodPolicyError::Validation(format!(
                "role '{low}' cannot conflict with itself"
            )));
        }

        let role_a_id = RoleId::new(low)
            .map_err(|error| SodPolicyError::Validation(error.to_string()))?;
        let role_b_id = RoleId::new(high)
            .map_err(|error| SodPolicyError::Validation(error.to_string()))?;

        Ok(Self {
            role_a_id,
            role_b_id,
        })
    }

    /// Returns the lexicographically smaller role.
    #[must_use]
    pub fn role_a_id(&self) -> &RoleId {
        &self.role_a_id
    }

    /// Returns the lexicographically greater role.
    #[must_use]
    pub fn role_b_id(&self) -> &RoleId {
        &self.role_b_id
    }

    /// Returns the opposite role when `role_id` is part of the pair.
    #[must_use]
    pub fn counterpart(&self, role_id: &RoleId) -> Option<&RoleId> {
        if role_id == &self.role_a_id {
            Some(&self.role_b_id)
        } else if role_id == &self.role_b_id {
            Some(&self.role_a_id)
        } else {
            None
        }
    }
}

impl Display for RolePair {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "'{}' and '{}'", self.role_a_id, self.role_b_id)
    }
}

/// Persisted separation-of-duties policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SodPolicy {
    id: Uuid,
    pair: RolePair,
    scope: SodScope,
    reason: String,
    active: bool,
    created_at: DateTime<Utc>,
}

impl SodPolicy {
    /// Creates a policy, rejecting a blank reason.
    pub fn new(
        id: Uuid,
        pair: RolePair,
        scope: SodScope,
        reason: impl Into<String>,
        active: bool,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SodPolicyError> {
        Ok(Self {
            id,
            pair,
            scope,
            reason: validate_reason(reason.into())?,
            active,
            created_at,
        })
    }

    /// Returns a copy with the supplied fields replaced.
    pub fn revised(
        &self,
        reason: Option<String>,
        active: Option<bool>,
        scope: Option<SodScope>,
    ) -> Result<Self, SodPolicyError> {
        let reason = match reason {
            Some(reason) => validate_reason(reason)?,
            None => self.reason.clone(),
        };

        Ok(Self {
            id: self.id,
            pair: self.pair.clone(),
            scope: scope.unwrap_or_else(|| self.scope.clone()),
            reason,
            active: active.unwrap_or(self.active),
            created_at: self.created_at,
        })
    }

    /// Returns the policy identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the conflicting role pair.
    #[must_use]
    pub fn pair(&self) -> &RolePair {
        &self.pair
    }

    /// Returns the policy scope.
    #[must_use]
    pub fn scope(&self) -> &SodScope {
        &self.scope
    }

    /// Returns the human-readable justification.
    #[must_use]
    pub fn reason(&self) -> &str {
        self.reason.as_str()
    }

    /// Returns whether the policy is enforced.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

fn validate_reason(reason: String) -> Result<String, SodPolicyError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(SodPolicyError::Validation(
            "a reason is required for a role conflict".to_owned(),
        ));
    }

    Ok(trimmed.to_owned())
}
