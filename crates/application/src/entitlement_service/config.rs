use std::str::FromStr;
use std::time::Duration;

use entitlements_core::AppError;

/// Default namespace prefixed to snapshot cache keys.
pub const DEFAULT_CACHE_NAMESPACE: &str = "entitlements";

/// Default lifetime of process-local permission cache entries.
pub const DEFAULT_LOCAL_CACHE_TTL: Duration = Duration::from_millis(500);

/// How resolution treats users without memberships and unknown roles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyResolutionPolicy {
    /// Resolve to an empty permission set.
    #[default]
    AllowEmpty,
    /// Fail with [`AppError::NotFound`].
    Reject,
}

impl EmptyResolutionPolicy {
    /// Returns a stable configuration value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllowEmpty => "allow",
            Self::Reject => "reject",
        }
    }
}

impl FromStr for EmptyResolutionPolicy {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::AllowEmpty),
            "reject" => Ok(Self::Reject),
            other => Err(AppError::Validation(format!(
                "empty resolution policy must be either 'allow' or 'reject', got '{other}'"
            ))),
        }
    }
}

/// Tunables for permission resolution and caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementConfig {
    /// Prefix of snapshot cache keys.
    pub cache_namespace: String,
    /// Lifetime of process-local cache entries; zero disables the local tier.
    pub local_cache_ttl: Duration,
    /// Treatment of empty resolutions.
    pub empty_resolution: EmptyResolutionPolicy,
}

impl Default for EntitlementConfig {
    fn default() -> Self {
        Self {
            cache_namespace: DEFAULT_CACHE_NAMESPACE.to_owned(),
            local_cache_ttl: DEFAULT_LOCAL_CACHE_TTL,
            empty_resolution: EmptyResolutionPolicy::default(),
        }
    }
}

impl EntitlementConfig {
    /// Sets the cache key namespace.
    #[must_use]
    pub fn with_cache_namespace(mut self, cache_namespace: impl Into<String>) -> Self {
        self.cache_namespace = cache_namespace.into();
        self
    }

    /// Sets the process-local cache lifetime.
    #[must_use]
    pub fn with_local_cache_ttl(mut self, local_cache_ttl: Duration) -> Self {
        self.local_cache_ttl = local_cache_ttl;
        self
    }

    /// Sets the empty resolution policy.
    #[must_use]
    pub fn with_empty_resolution(mut self, empty_resolution: EmptyResolutionPolicy) -> Self {
        self.empty_resolution = empty_resolution;
        self
    }
}
