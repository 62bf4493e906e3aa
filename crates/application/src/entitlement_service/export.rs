use std::collections::{BTreeMap, HashMap};

use tracing::{info, warn};
use uuid::Uuid;

use entitlements_core::{AppResult, OrganizationId};
use entitlements_domain::{Membership, Permission, UserId, sort_permissions};

use crate::{PermissionExport, ResolutionScratch, UserEntitlements};

use super::EntitlementService;

impl EntitlementService {
    /// Resolves entitlements for every user bound inside an organization.
    ///
    /// Bindings that reference a missing role are reported in
    /// `orphaned_memberships` instead of aborting the export.
    pub async fn export_organization_permissions(
        &self,
        organization_id: &OrganizationId,
    ) -> AppResult<PermissionExport> {
        let memberships = self
            .membership_store
            .list_memberships_for_organization(organization_id)
            .await?;

        let mut by_user: BTreeMap<UserId, Vec<Membership>> = BTreeMap::new();
        for membership in memberships {
            by_user
                .entry(membership.user_id().clone())
                .or_default()
                .push(membership);
        }

        let mut scratch = ResolutionScratch::default();
        let mut users = Vec::with_capacity(by_user.len());
        let mut orphaned_memberships = Vec::new();

        for (user_id, memberships) in by_user {
            let mut roles = Vec::new();
            let mut merged: HashMap<Uuid, Permission> = HashMap::new();

            for membership in memberships {
                let Some(role) = self
                    .resolver
                    .lookup_role(membership.role_id(), &mut scratch)
                    .await?
                else {
                    warn!(
                        organization_id = %organization_id,
                        user_id = %user_id,
                        role_id = %membership.role_id(),
                        "skipping membership bound to a missing role"
                    );
                    orphaned_memberships.push(membership);
                    continue;
                };

                for permission in self.resolver.resolve_with(role.id(), &mut scratch).await? {
                    merged.insert(permission.id(), permission);
                }
                roles.push(role);
            }

            roles.sort_by(|left, right| left.name().cmp(right.name()));
            let mut permissions = merged.into_values().collect::<Vec<_>>();
            sort_permissions(&mut permissions);

            users.push(UserEntitlements {
                user_id,
                roles,
                permissions,
            });
        }

        info!(
            organization_id = %organization_id,
            user_count = users.len(),
            orphaned_count = orphaned_memberships.len(),
            "permission export completed"
        );

        Ok(PermissionExport {
            organization_id: organization_id.clone(),
            generated_at: self.clock.now(),
            users,
            orphaned_memberships,
        })
    }
}
