//! Shared primitives for all entitlement crates.

#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across entitlement crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Organization identifier used as the scoping boundary for role assignments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(String);

impl OrganizationId {
    /// Creates an organization identifier from a trimmed, non-empty value.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation(
                "organization id must not be empty".to_owned(),
            ));
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for OrganizationId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Failures raised while managing separation-of-duties policies.
///
/// `Validation` is the expected, caller-recoverable kind; `NotFound` is the
/// base kind used when a policy id does not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SodPolicyError {
    /// Policy input or the current membership state rejects the change.
    #[error("sod policy validation failed: {0}")]
    Validation(String),

    /// Referenced policy does not exist.
    #[error("sod policy error: {0}")]
    NotFound(String),
}

impl SodPolicyError {
    /// Returns whether this is a validation failure.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Separation-of-duties policy failure.
    #[error(transparent)]
    SodPolicy(#[from] SodPolicyError),

    /// Internal unexpected error, including store failures.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the SoD policy failure carried by this error, if any.
    #[must_use]
    pub fn as_sod_policy_error(&self) -> Option<&SodPolicyError> {
        match self {
            Self::SodPolicy(error) => Some(error),
            _ => None,
        }
    }
}
