mod cache;
mod clock;
mod repositories;
mod snapshots;

pub use cache::{
    CacheSource, PermissionCache, PermissionCacheLookup, PermissionLoader, PermissionLoaderFuture,
};
pub use clock::{Clock, SystemClock};
pub use repositories::{
    MembershipCollision, MembershipRepository, RoleHierarchyRepository, SodPolicyRepository,
    SodWriteOutcome,
};
pub use snapshots::{PermissionExport, PermissionResolution, UserEntitlements};
