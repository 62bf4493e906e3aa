//! Application services and ports.

#![forbid(unsafe_code)]

mod entitlement_ports;
mod entitlement_service;
mod membership_store;
mod role_hierarchy_resolver;
mod sod_policy_builder;

#[cfg(test)]
mod test_fakes;

pub use entitlement_ports::{
    CacheSource, Clock, MembershipCollision, MembershipRepository, PermissionCache,
    PermissionCacheLookup, PermissionExport, PermissionLoader, PermissionLoaderFuture,
    PermissionResolution, RoleHierarchyRepository, SodPolicyRepository, SodWriteOutcome,
    SystemClock, UserEntitlements,
};
pub use entitlement_service::{
    DEFAULT_CACHE_NAMESPACE, DEFAULT_LOCAL_CACHE_TTL, EmptyResolutionPolicy, EntitlementConfig,
    EntitlementService,
};
pub use membership_store::MembershipStore;
pub use role_hierarchy_resolver::{ResolutionScratch, RoleHierarchyResolver};
pub use sod_policy_builder::{SodPolicyBuilder, SodPolicyUpdate};
