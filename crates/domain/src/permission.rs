use std::fmt::{Display, Formatter};

use entitlements_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Validated `resource:action` permission name.
///
/// Both segments start with a lowercase ASCII letter followed by lowercase
/// letters, digits, `.`, `_` or `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionName(String);

impl PermissionName {
    /// Creates a validated permission name.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim();

        let Some((resource, action)) = trimmed.split_once(':') else {
            return Err(AppError::Validation(format!(
                "permission name '{trimmed}' must use the 'resource:action' format"
            )));
        };

        if !is_valid_segment(resource) || !is_valid_segment(action) {
            return Err(AppError::Validation(format!(
                "permission name '{trimmed}' must match ^[a-z][a-z0-9._-]*:[a-z][a-z0-9._-]*$"
            )));
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the resource segment.
    #[must_use]
    pub fn resource(&self) -> &str {
        self.0.split_once(':').map_or("", |(resource, _)| resource)
    }

    /// Returns the action segment.
    #[must_use]
    pub fn action(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, action)| action)
    }

    /// Returns the full name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for PermissionName {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

fn is_valid_segment(segment: &str) -> bool {
    let mut characters = segment.chars();
    let Some(first) = characters.next() else {
        return false;
    };

    first.is_ascii_lowercase()
        && characters.all(|character| {
            character.is_ascii_lowercase()
                || character.is_ascii_digit()
                || matches!(character, '.' | '_' | '-')
        })
}

/// Permission that roles grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    id: Uuid,
    name: PermissionName,
    description: Option<String>,
    resource_type: Option<String>,
}

impl Permission {
    /// Creates a validated permission.
    pub fn new(
        id: Uuid,
        name: impl Into<String>,
        description: Option<String>,
        resource_type: Option<String>,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            name: PermissionName::new(name)?,
            description: non_blank(description),
            resource_type: non_blank(resource_type),
        })
    }

    /// Returns the permission identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the permission name.
    #[must_use]
    pub fn name(&self) -> &PermissionName {
        &self.name
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the optional resource type.
    #[must_use]
    pub fn resource_type(&self) -> Option<&str> {
        self.resource_type.as_deref()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim().to_owned();
        (!trimmed.is_empty()).then_some(trimmed)
    })
}

/// Sorts permissions by name for deterministic output, tie-breaking by id.
pub fn sort_permissions(permissions: &mut [Permission]) {
    permissions.sort_by(|left, right| {
        left.name
            .cmp(&right.name)
            .then_with(|| left.id.cmp(&right.id))
    });
}
