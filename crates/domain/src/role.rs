use std::fmt::{Display, Formatter};

use entitlements_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Minimum role name length.
pub const ROLE_NAME_MIN_LENGTH: usize = 2;

/// Maximum role name length.
pub const ROLE_NAME_MAX_LENGTH: usize = 64;

/// Stable role identifier.
///
/// Ordering is plain lexicographic string ordering, which is what SoD pair
/// normalization relies on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(String);

impl RoleId {
    /// Creates a role identifier from a trimmed, non-empty value.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation("role id must not be empty".to_owned()));
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for RoleId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Validated role name: 2 to 64 ASCII alphanumeric or underscore characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleName(String);

impl RoleName {
    /// Creates a validated role name.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        let length = trimmed.chars().count();

        if !(ROLE_NAME_MIN_LENGTH..=ROLE_NAME_MAX_LENGTH).contains(&length) {
            return Err(AppError::Validation(format!(
                "role name '{trimmed}' must be between {ROLE_NAME_MIN_LENGTH} and {ROLE_NAME_MAX_LENGTH} characters"
            )));
        }

        if !trimmed
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || character == '_')
        {
            return Err(AppError::Validation(format!(
                "role name '{trimmed}' may only contain letters, digits and underscores"
            )));
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Role that can be bound to users within an organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role {
    id: RoleId,
    name: RoleName,
    description: Option<String>,
}

impl Role {
    /// Creates a validated role.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: Option<String>,
    ) -> AppResult<Self> {
        let description = description.and_then(|value| {
            let trimmed = value.trim().to_owned();
            (!trimmed.is_empty()).then_some(trimmed)
        });

        Ok(Self {
            id: RoleId::new(id)?,
            name: RoleName::new(name)?,
            description,
        })
    }

    /// Returns the role identifier.
    #[must_use]
    pub fn id(&self) -> &RoleId {
        &self.id
    }

    /// Returns the role name.
    #[must_use]
    pub fn name(&self) -> &RoleName {
        &self.name
    }

    /// Returns the optional role description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Directed inheritance edge: the child role inherits the parent's permissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleHierarchyEdge {
    parent_role_id: RoleId,
    child_role_id: RoleId,
    depth: u32,
}

impl RoleHierarchyEdge {
    /// Creates a hierarchy edge, rejecting self-edges.
    pub fn new(parent_role_id: RoleId, child_role_id: RoleId, depth: u32) -> AppResult<Self> {
        if parent_role_id == child_role_id {
            return Err(AppError::Validation(format!(
                "role '{parent_role_id}' cannot inherit from itself"
            )));
        }

        Ok(Self {
            parent_role_id,
            child_role_id,
            depth,
        })
    }

    /// Returns the role whose permissions are inherited.
    #[must_use]
    pub fn parent_role_id(&self) -> &RoleId {
        &self.parent_role_id
    }

    /// Returns the inheriting role.
    #[must_use]
    pub fn child_role_id(&self) -> &RoleId {
        &self.child_role_id
    }

    /// Returns the recorded distance, kept for diagnostics.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }
}
