use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use entitlements_core::{AppError, AppResult};
use entitlements_domain::{Permission, Role, RoleId, sort_permissions};

use crate::{EmptyResolutionPolicy, RoleHierarchyRepository};


/// Role record with its direct grants and inheritance edges.
#[derive(Debug, Clone)]
struct RoleNode {
    role: Role,
    permissions: Vec<Permission>,
    parent_role_ids: Vec<RoleId>,
}

/// Memo shared by every role resolved within one snapshot computation.
#[derive(Debug, Default)]
pub struct ResolutionScratch {
    nodes: HashMap<RoleId, Option<RoleNode>>,
    closures: HashMap<RoleId, Vec<Permission>>,
}

enum Visit {
    Enter(RoleId),
    Leave(RoleId),
}

/// Resolves the transitive permission closure of a role.
#[derive(Clone)]
pub struct RoleHierarchyResolver {
    repository: Arc<dyn RoleHierarchyRepository>,
    empty_resolution: EmptyResolutionPolicy,
}

impl RoleHierarchyResolver {
    /// Creates a resolver over a repository implementation.
    #[must_use]
    pub fn new(repository: Arc<dyn RoleHierarchyRepository>) -> Self {
        Self {
            repository,
            empty_resolution: EmptyResolutionPolicy::default(),
        }
    }

    /// Sets how unknown role ids are treated.
    #[must_use]
    pub fn with_empty_resolution(mut self, empty_resolution: EmptyResolutionPolicy) -> Self {
        self.empty_resolution = empty_resolution;
        self
    }

    /// Returns permissions granted to the role directly or through any ancestor,
    /// deduplicated by id and sorted by name.
    ///
    /// An unknown role yields an empty list unless the resolver rejects empty
    /// resolutions.
    pub async fn get_inherited_permissions(
        &self,
        role_id: &RoleId,
    ) -> AppResult<Vec<Permission>> {
        let mut scratch = ResolutionScratch::default();
        self.resolve_with(role_id, &mut scratch).await
    }

    /// Looks a role up through the scratch memo.
    pub async fn lookup_role(
        &self,
        role_id: &RoleId,
        scratch: &mut ResolutionScratch,
    ) -> AppResult<Option<Role>> {
        Ok(self
            .load_node(role_id, scratch)
            .await?
            .map(|node| node.role))
    }

    /// Resolves a role's closure, reusing lookups already recorded in `scratch`.
    pub async fn resolve_with(
        &self,
        role_id: &RoleId,
        scratch: &mut ResolutionScratch,
    ) -> AppResult<Vec<Permission>> {
        if let Some(closure) = scratch.closures.get(role_id) {
            return Ok(closure.clone());
        }

        if self.load_node(role_id, scratch).await?.is_none() {
            return match self.empty_resolution {
                EmptyResolutionPolicy::AllowEmpty => {
                    debug!(role_id = %role_id, "unknown role resolves to no permissions");
                    Ok(Vec::new())
                }
                EmptyResolutionPolicy::Reject => {
                    Err(AppError::NotFound(format!("role '{role_id}' was not found")))
                }
            };
        }

        let mut collected: HashMap<Uuid, Permission> = HashMap::new();
        let mut on_path: HashSet<RoleId> = HashSet::new();
        let mut finished: HashSet<RoleId> = HashSet::new();
        let mut stack = vec![Visit::Enter(role_id.clone())];

        while let Some(visit) = stack.pop() {
            let current = match visit {
                Visit::Leave(current) => {
                    on_path.remove(&current);
                    finished.insert(current);
                    continue;
                }
                Visit::Enter(current) => current,
            };

            if on_path.contains(&current) {
                warn!(
                    role_id = %role_id,
                    cycle_role_id = %current,
                    "role hierarchy cycle detected, skipping revisit"
                );
                continue;
            }

            if finished.contains(&current) {
                continue;
            }

            let Some(node) = self.load_node(&current, scratch).await? else {
                warn!(
                    role_id = %role_id,
                    missing_role_id = %current,
                    "role hierarchy references a missing role"
                );
                finished.insert(current);
                continue;
            };

            for permission in node.permissions {
                collected.insert(permission.id(), permission);
            }

            on_path.insert(current.clone());
            stack.push(Visit::Leave(current));
            for parent_role_id in node.parent_role_ids.into_iter().rev() {
                stack.push(Visit::Enter(parent_role_id));
            }
        }

        let mut permissions = collected.into_values().collect::<Vec<_>>();
        sort_permissions(&mut permissions);
        scratch
            .closures
            .insert(role_id.clone(), permissions.clone());

        Ok(permissions)
    }

    async fn load_node(
        &self,
        role_id: &RoleId,
        scratch: &mut ResolutionScratch,
    ) -> AppResult<Option<RoleNode>> {
        if let Some(node) = scratch.nodes.get(role_id) {
            return Ok(node.clone());
        }

        let node = match self.repository.find_role(role_id).await? {
            Some(role) => Some(RoleNode {
                role,
                permissions: self.repository.list_role_permissions(role_id).await?,
                parent_role_ids: self.repository.list_parent_role_ids(role_id).await?,
            }),
            None => None,
        };

        scratch.nodes.insert(role_id.clone(), node.clone());
        Ok(node)
    }
}
