use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use entitlements_core::{AppError, AppResult, OrganizationId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::RoleId;

/// Stable user identifier supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user identifier from a trimmed, non-empty value.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation("user id must not be empty".to_owned()));
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for UserId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Binding of one user to one role inside one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    id: Uuid,
    user_id: UserId,
    organization_id: OrganizationId,
    role_id: RoleId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Membership {
    /// Creates a membership, rejecting `updated_at` earlier than `created_at`.
    pub fn new(
        id: Uuid,
        user_id: UserId,
        organization_id: OrganizationId,
        role_id: RoleId,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        if updated_at < created_at {
            return Err(AppError::Validation(format!(
                "membership '{id}' has updated_at earlier than created_at"
            )));
        }

        Ok(Self {
            id,
            user_id,
            organization_id,
            role_id,
            created_at,
            updated_at,
        })
    }

    /// Returns the membership identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the bound user.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Returns the owning organization.
    #[must_use]
    pub fn organization_id(&self) -> &OrganizationId {
        &self.organization_id
    }

    /// Returns the granted role.
    #[must_use]
    pub fn role_id(&self) -> &RoleId {
        &self.role_id
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last update timestamp.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns whether this membership binds the given triple.
    #[must_use]
    pub fn binds(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        role_id: &RoleId,
    ) -> bool {
        &self.user_id == user_id
            && &self.organization_id == organization_id
            && &self.role_id == role_id
    }
}
