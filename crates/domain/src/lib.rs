//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod membership;
mod permission;
mod role;
mod sod;

pub use membership::{Membership, UserId};
pub use permission::{Permission, PermissionName, sort_permissions};
pub use role::{
    ROLE_NAME_MAX_LENGTH, ROLE_NAME_MIN_LENGTH, Role, RoleHierarchyEdge, RoleId, RoleName,
};
pub use sod::{RolePair, SodPolicy, SodScope};
