//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_entitlement_store;
mod in_memory_permission_cache;
mod postgres_membership_repository;
mod postgres_role_hierarchy_repository;
mod postgres_sod_policy_repository;
mod redis_permission_cache;

#[cfg(test)]
mod postgres_test_support;

pub use in_memory_entitlement_store::InMemoryEntitlementStore;
pub use in_memory_permission_cache::InMemoryPermissionCache;
pub use postgres_membership_repository::PostgresMembershipRepository;
pub use postgres_role_hierarchy_repository::PostgresRoleHierarchyRepository;
pub use postgres_sod_policy_repository::PostgresSodPolicyRepository;
pub use redis_permission_cache::RedisPermissionCache;
