use std::sync::Arc;

use entitlements_application::{MembershipRepository, MembershipStore, RoleHierarchyRepository};
use entitlements_core::{AppError, OrganizationId};
use entitlements_domain::{RoleId, UserId};

use super::PostgresMembershipRepository;
use crate::PostgresRoleHierarchyRepository;
use crate::postgres_test_support::{seed_named_role, seed_role, test_pool, unique};

fn ids(user: &str, organization: &str, role: &str) -> (UserId, OrganizationId, RoleId) {
    (
        UserId::new(user).unwrap_or_else(|_| unreachable!()),
        OrganizationId::new(organization).unwrap_or_else(|_| unreachable!()),
        RoleId::new(role).unwrap_or_else(|_| unreachable!()),
    )
}

#[tokio::test]
async fn assign_list_and_revoke_round_trip() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let role = unique("viewer");
    seed_role(&pool, &role).await;
    let (user_id, organization_id, role_id) = ids(&unique("user"), &unique("org"), &role);
    let repository = Arc::new(PostgresMembershipRepository::new(pool));
    let store = MembershipStore::new(repository.clone());

    let assigned = store.assign_role(&user_id, &organization_id, &role_id).await;
    assert!(assigned.is_ok());

    let roles = store
        .list_user_roles(&user_id, &organization_id)
        .await
        .unwrap_or_default();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].id(), &role_id);

    let memberships = repository
        .list_memberships_for_organization(&organization_id)
        .await
        .unwrap_or_default();
    assert_eq!(memberships.len(), 1);

    assert!(
        store
            .revoke_role(&user_id, &organization_id, &role_id)
            .await
            .is_ok()
    );
    let remaining = repository
        .list_user_memberships(&user_id, None)
        .await
        .unwrap_or_default();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn duplicate_binding_maps_to_conflict() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let role = unique("viewer");
    seed_role(&pool, &role).await;
    let (user_id, organization_id, role_id) = ids(&unique("user"), &unique("org"), &role);
    let store = MembershipStore::new(Arc::new(PostgresMembershipRepository::new(pool)));

    let first = store.assign_role(&user_id, &organization_id, &role_id).await;
    let second = store.assign_role(&user_id, &organization_id, &role_id).await;

    assert!(first.is_ok());
    assert!(matches!(second, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn user_roles_skip_bindings_to_missing_roles() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let (user_id, organization_id, role_id) =
        ids(&unique("user"), &unique("org"), &unique("retired"));
    let store = MembershipStore::new(Arc::new(PostgresMembershipRepository::new(pool)));

    assert!(
        store
            .assign_role(&user_id, &organization_id, &role_id)
            .await
            .is_ok()
    );

    let roles = store.list_user_roles(&user_id, &organization_id).await;
    let memberships = store
        .list_user_memberships(&user_id, Some(&organization_id))
        .await
        .unwrap_or_default();

    assert!(roles.is_ok_and(|roles| roles.is_empty()));
    assert_eq!(memberships.len(), 1);
}

#[tokio::test]
async fn invalid_stored_role_is_skipped_not_fatal() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let legacy = unique("legacy");
    let viewer = unique("viewer");
    seed_named_role(&pool, &legacy, "read-only").await;
    seed_role(&pool, &viewer).await;
    let user = unique("user");
    let organization = unique("org");
    let (user_id, organization_id, legacy_id) = ids(&user, &organization, &legacy);
    let (_, _, viewer_id) = ids(&user, &organization, &viewer);
    let store = MembershipStore::new(Arc::new(PostgresMembershipRepository::new(pool.clone())));

    for role_id in [&legacy_id, &viewer_id] {
        assert!(
            store
                .assign_role(&user_id, &organization_id, role_id)
                .await
                .is_ok()
        );
    }

    let roles = store.list_user_roles(&user_id, &organization_id).await;
    assert!(roles.is_ok_and(|roles| roles.len() == 1 && roles[0].id() == &viewer_id));

    let found = PostgresRoleHierarchyRepository::new(pool)
        .find_role(&legacy_id)
        .await;
    assert!(found.is_ok_and(|role| role.is_none()));
}
