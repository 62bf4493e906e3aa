use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use entitlements_application::{MembershipCollision, SodPolicyRepository, SodWriteOutcome};
use entitlements_core::{AppError, AppResult, OrganizationId};
use entitlements_domain::{RolePair, SodPolicy, SodScope, UserId};


/// PostgreSQL-backed repository for separation-of-duties policies.
///
/// Writes run in a transaction holding an advisory lock on the role pair, so
/// concurrent writers for one pair are serialized across processes.
#[derive(Clone)]
pub struct PostgresSodPolicyRepository {
    pool: PgPool,
}

impl PostgresSodPolicyRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin_pair_write(&self, pair: &RolePair) -> AppResult<Transaction<'static, Postgres>> {
        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("sod:{}:{}", pair.role_a_id(), pair.role_b_id()))
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to lock role pair {pair}: {error}"))
            })?;

        Ok(transaction)
    }
}

#[derive(Debug, FromRow)]
struct SodPolicyRow {
    id: Uuid,
    role_a_id: String,
    role_b_id: String,
    organization_id: Option<String>,
    reason: String,
    active: bool,
    created_at: DateTime<Utc>,
}

impl SodPolicyRow {
    fn into_policy(self) -> AppResult<SodPolicy> {
        let scope = SodScope::from_organization(
            self.organization_id
                .map(OrganizationId::new)
                .transpose()?,
        );

        Ok(SodPolicy::new(
            self.id,
            RolePair::new(&self.role_a_id, &self.role_b_id)?,
            scope,
            self.reason,
            self.active,
            self.created_at,
        )?)
    }
}

#[derive(Debug, FromRow)]
struct CollisionRow {
    user_id: String,
    organization_id: String,
}

#[async_trait]
impl SodPolicyRepository for PostgresSodPolicyRepository {
    async fn find_policy(&self, policy_id: Uuid) -> AppResult<Option<SodPolicy>> {
        let row = sqlx::query_as::<_, SodPolicyRow>(
            r#"
            SELECT id, role_a_id, role_b_id, organization_id, reason, active, created_at
            FROM sod_role_conflicts
            WHERE id = $1
            "#,
        )
        .bind(policy_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to find role conflict '{policy_id}': {error}"))
        })?;

        row.map(SodPolicyRow::into_policy).transpose()
    }

    async fn create_policy(&self, policy: SodPolicy) -> AppResult<SodWriteOutcome> {
        let mut transaction = self.begin_pair_write(policy.pair()).await?;

        if let Some(rejected) = guard_policy_write(&mut transaction, &policy).await? {
            return Ok(rejected);
        }

        let row = sqlx::query_as::<_, SodPolicyRow>(
            r#"
            INSERT INTO sod_role_conflicts
                (id, role_a_id, role_b_id, organization_id, reason, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, role_a_id, role_b_id, organization_id, reason, active, created_at
            "#,
        )
        .bind(policy.id())
        .bind(policy.pair().role_a_id().as_str())
        .bind(policy.pair().role_b_id().as_str())
        .bind(policy.scope().organization_id().map(OrganizationId::as_str))
        .bind(policy.reason())
        .bind(policy.is_active())
        .bind(policy.created_at())
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| map_policy_conflict(error, &policy))?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(SodWriteOutcome::Written(row.into_policy()?))
    }

    async fn update_policy(&self, policy: SodPolicy) -> AppResult<SodWriteOutcome> {
        let mut transaction = self.begin_pair_write(policy.pair()).await?;

        let existing_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM sod_role_conflicts WHERE id = $1 FOR UPDATE",
        )
        .bind(policy.id())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load role conflict '{}': {error}",
                policy.id()
            ))
        })?;
        if existing_id.is_none() {
            return Ok(SodWriteOutcome::NotFound);
        }

        if let Some(rejected) = guard_policy_write(&mut transaction, &policy).await? {
            return Ok(rejected);
        }

        let row = sqlx::query_as::<_, SodPolicyRow>(
            r#"
            UPDATE sod_role_conflicts
            SET organization_id = $2, reason = $3, active = $4
            WHERE id = $1
            RETURNING id, role_a_id, role_b_id, organization_id, reason, active, created_at
            "#,
        )
        .bind(policy.id())
        .bind(policy.scope().organization_id().map(OrganizationId::as_str))
        .bind(policy.reason())
        .bind(policy.is_active())
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| map_policy_conflict(error, &policy))?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(SodWriteOutcome::Written(row.into_policy()?))
    }

    async fn delete_policy(&self, policy_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM sod_role_conflicts WHERE id = $1")
            .bind(policy_id)
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to delete role conflict '{policy_id}': {error}"
                ))
            })?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_policies(&self, scope: &SodScope) -> AppResult<Vec<SodPolicy>> {
        let rows = sqlx::query_as::<_, SodPolicyRow>(
            r#"
            SELECT id, role_a_id, role_b_id, organization_id, reason, active, created_at
            FROM sod_role_conflicts
            WHERE organization_id IS NULL
               OR organization_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(scope.organization_id().map(OrganizationId::as_str))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list role conflicts: {error}")))?;

        rows.into_iter().map(SodPolicyRow::into_policy).collect()
    }
}

async fn guard_policy_write(
    transaction: &mut Transaction<'_, Postgres>,
    policy: &SodPolicy,
) -> AppResult<Option<SodWriteOutcome>> {
    if !policy.is_active() {
        return Ok(None);
    }

    let organization_id = policy.scope().organization_id().map(OrganizationId::as_str);

    let duplicate = sqlx::query_as::<_, SodPolicyRow>(
        r#"
        SELECT id, role_a_id, role_b_id, organization_id, reason, active, created_at
        FROM sod_role_conflicts
        WHERE role_a_id = $1
          AND role_b_id = $2
          AND id <> $3
          AND (organization_id IS NULL OR $4::TEXT IS NULL OR organization_id = $4)
        ORDER BY created_at, id
        LIMIT 1
        "#,
    )
    .bind(policy.pair().role_a_id().as_str())
    .bind(policy.pair().role_b_id().as_str())
    .bind(policy.id())
    .bind(organization_id)
    .fetch_optional(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!("failed to check duplicate role conflicts: {error}"))
    })?;

    if let Some(existing) = duplicate {
        return Ok(Some(SodWriteOutcome::Duplicate(existing.into_policy()?)));
    }

    let collision = sqlx::query_as::<_, CollisionRow>(
        r#"
        SELECT first.user_id, first.organization_id
        FROM memberships AS first
        INNER JOIN memberships AS second
            ON second.user_id = first.user_id
           AND second.organization_id = first.organization_id
        WHERE first.role_id = $1
          AND second.role_id = $2
          AND ($3::TEXT IS NULL OR first.organization_id = $3)
        ORDER BY first.organization_id, first.user_id
        LIMIT 1
        "#,
    )
    .bind(policy.pair().role_a_id().as_str())
    .bind(policy.pair().role_b_id().as_str())
    .bind(organization_id)
    .fetch_optional(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!("failed to check membership collisions: {error}"))
    })?;

    collision
        .map(|row| -> AppResult<SodWriteOutcome> {
            Ok(SodWriteOutcome::Collision(MembershipCollision {
                user_id: UserId::new(row.user_id)?,
                organization_id: OrganizationId::new(row.organization_id)?,
            }))
        })
        .transpose()
}

fn map_policy_conflict(error: sqlx::Error, policy: &SodPolicy) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!(
            "an active role conflict between {} already exists in {}",
            policy.pair(),
            policy.scope()
        ));
    }

    AppError::Internal(format!(
        "failed to write role conflict '{}': {error}",
        policy.id()
    ))
}
