use std::sync::Arc;

use entitlements_core::{AppError, SodPolicyError};
use entitlements_domain::{RolePair, SodPolicy, SodScope};
use uuid::Uuid;

use crate::test_fakes::{
    FakeEntitlementStore, FakeSodPolicyRepository, FixedClock, organization, role_id, user,
};
use crate::{MembershipCollision, SodPolicyBuilder, SodPolicyUpdate, SodWriteOutcome};

fn build(
    repository: Arc<FakeSodPolicyRepository>,
    memberships: FakeEntitlementStore,
) -> SodPolicyBuilder {
    SodPolicyBuilder::new(repository, Arc::new(memberships))
}

fn policy(role_a: &str, role_b: &str, scope: SodScope) -> SodPolicy {
    SodPolicy::new(
        Uuid::new_v4(),
        RolePair::new(role_a, role_b).unwrap_or_else(|_| unreachable!()),
        scope,
        "four eyes",
        true,
        chrono::Utc::now(),
    )
    .unwrap_or_else(|_| unreachable!())
}

fn is_validation(error: &AppError) -> bool {
    error
        .as_sod_policy_error()
        .is_some_and(SodPolicyError::is_validation)
}

#[tokio::test]
async fn create_normalizes_pair_order() {
    let repository = Arc::new(FakeSodPolicyRepository::default());
    let builder = build(repository.clone(), FakeEntitlementStore::default());

    let created = builder
        .create_role_conflict(" payer ", "approver", "payments need two people", None)
        .await;
    let Ok(created) = created else { unreachable!() };

    assert_eq!(created.pair().role_a_id().as_str(), "approver");
    assert_eq!(created.pair().role_b_id().as_str(), "payer");
    assert_eq!(created.scope(), &SodScope::Global);
    assert!(created.is_active());
    assert_eq!(repository.policies.lock().await.len(), 1);
}

#[tokio::test]
async fn create_rejects_self_conflict_before_repository() {
    let repository = Arc::new(FakeSodPolicyRepository::default());
    let builder = build(repository.clone(), FakeEntitlementStore::default());

    let result = builder
        .create_role_conflict("approver", "approver", "invalid", None)
        .await;

    assert!(result.is_err_and(|error| is_validation(&error)));
    assert!(repository.policies.lock().await.is_empty());
}

#[tokio::test]
async fn create_rejects_blank_reason() {
    let builder = build(
        Arc::new(FakeSodPolicyRepository::default()),
        FakeEntitlementStore::default(),
    );

    let result = builder
        .create_role_conflict("payer", "approver", "  ", None)
        .await;

    assert!(result.is_err_and(|error| is_validation(&error)));
}

#[tokio::test]
async fn duplicate_outcome_becomes_validation_error() {
    let existing = policy("approver", "payer", SodScope::Global);
    let repository = Arc::new(FakeSodPolicyRepository::default());
    *repository.scripted_outcome.lock().await = Some(SodWriteOutcome::Duplicate(existing.clone()));
    let builder = build(repository, FakeEntitlementStore::default());

    let result = builder
        .create_role_conflict(
            "payer",
            "approver",
            "again",
            Some(organization("org-123")),
        )
        .await;

    let Err(error) = result else { unreachable!() };
    assert!(is_validation(&error));
    assert!(error.to_string().contains("already exists in global scope"));
    assert!(error.to_string().contains(&existing.id().to_string()));
}

#[tokio::test]
async fn collision_outcome_names_user_and_organization() {
    let repository = Arc::new(FakeSodPolicyRepository::default());
    *repository.scripted_outcome.lock().await =
        Some(SodWriteOutcome::Collision(MembershipCollision {
            user_id: user("alice"),
            organization_id: organization("org-1"),
        }));
    let builder = build(repository, FakeEntitlementStore::default());

    let result = builder
        .create_role_conflict("payer", "approver", "four eyes", None)
        .await;

    let Err(error) = result else { unreachable!() };
    assert!(is_validation(&error));
    assert!(error.to_string().contains("'alice'"));
    assert!(error.to_string().contains("'org-1'"));
}

#[tokio::test]
async fn update_applies_partial_changes() {
    let repository = Arc::new(FakeSodPolicyRepository::default());
    let existing = policy("approver", "payer", SodScope::Global);
    repository.policies.lock().await.push(existing.clone());
    let builder = build(repository.clone(), FakeEntitlementStore::default());

    let updated = builder
        .update_role_conflict(
            existing.id(),
            SodPolicyUpdate {
                active: Some(false),
                scope: Some(SodScope::Organization(organization("org-9"))),
                ..SodPolicyUpdate::default()
            },
        )
        .await;
    let Ok(updated) = updated else { unreachable!() };

    assert!(!updated.is_active());
    assert_eq!(updated.reason(), "four eyes");
    assert_eq!(updated.created_at(), existing.created_at());
    assert_eq!(updated.scope().organization_id(), Some(&organization("org-9")));
}

#[tokio::test]
async fn update_of_missing_policy_is_not_found() {
    let builder = build(
        Arc::new(FakeSodPolicyRepository::default()),
        FakeEntitlementStore::default(),
    );

    let result = builder
        .update_role_conflict(Uuid::new_v4(), SodPolicyUpdate::default())
        .await;

    assert!(matches!(
        result,
        Err(AppError::SodPolicy(SodPolicyError::NotFound(_)))
    ));
}

#[tokio::test]
async fn delete_reports_whether_policy_existed() {
    let repository = Arc::new(FakeSodPolicyRepository::default());
    let existing = policy("approver", "payer", SodScope::Global);
    repository.policies.lock().await.push(existing.clone());
    let builder = build(repository, FakeEntitlementStore::default());

    assert!(builder.delete_role_conflict(existing.id()).await.unwrap_or_default());
    assert!(!builder.delete_role_conflict(existing.id()).await.unwrap_or(true));
}

#[tokio::test]
async fn list_returns_global_and_exact_scope_oldest_first() {
    let repository = Arc::new(FakeSodPolicyRepository::default());
    let clock = Arc::new(FixedClock::new());
    let builder =
        build(repository, FakeEntitlementStore::default()).with_clock(clock.clone());

    let scoped = builder
        .create_role_conflict("buyer", "receiver", "procurement", Some(organization("org-1")))
        .await;
    clock.advance_millis(10);
    let global = builder
        .create_role_conflict("approver", "payer", "payments", None)
        .await;
    clock.advance_millis(10);
    let other = builder
        .create_role_conflict("buyer", "receiver", "procurement", Some(organization("org-2")))
        .await;
    let (Ok(scoped), Ok(global), Ok(_other)) = (scoped, global, other) else {
        unreachable!()
    };

    let listed = builder
        .list_conflicts(Some(&organization("org-1")))
        .await
        .unwrap_or_default();
    assert_eq!(
        listed.iter().map(SodPolicy::id).collect::<Vec<_>>(),
        vec![scoped.id(), global.id()]
    );

    let global_only = builder.list_conflicts(None).await.unwrap_or_default();
    assert_eq!(
        global_only.iter().map(SodPolicy::id).collect::<Vec<_>>(),
        vec![global.id()]
    );
}

#[tokio::test]
async fn check_assignment_reports_violated_policies() {
    let repository = Arc::new(FakeSodPolicyRepository::default());
    let memberships = FakeEntitlementStore::default()
        .with_membership("alice", "org-1", "payer")
        .with_membership("alice", "org-2", "approver");
    let builder = build(repository.clone(), memberships);
    let active = policy("approver", "payer", SodScope::Global);
    let mut inactive = policy("auditor", "payer", SodScope::Global);
    inactive = inactive
        .revised(None, Some(false), None)
        .unwrap_or_else(|_| unreachable!());
    repository.policies.lock().await.extend([active.clone(), inactive]);

    let violated = builder
        .check_assignment(&user("alice"), &organization("org-1"), &role_id("approver"))
        .await
        .unwrap_or_default();
    assert_eq!(
        violated.iter().map(SodPolicy::id).collect::<Vec<_>>(),
        vec![active.id()]
    );

    let unaffected = builder
        .check_assignment(&user("alice"), &organization("org-1"), &role_id("auditor"))
        .await
        .unwrap_or_default();
    assert!(unaffected.is_empty());

    let other_org = builder
        .check_assignment(&user("alice"), &organization("org-3"), &role_id("approver"))
        .await
        .unwrap_or_default();
    assert!(other_org.is_empty());
}
