use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use entitlements_application::MembershipRepository;
use entitlements_core::{AppError, AppResult, OrganizationId};
use entitlements_domain::{Membership, Role, RoleId, UserId};

use crate::postgres_role_hierarchy_repository::RoleRow;

#[cfg(test)]
mod tests;

/// PostgreSQL-backed repository for user, organization and role bindings.
#[derive(Clone)]
pub struct PostgresMembershipRepository {
    pool: PgPool,
}

impl PostgresMembershipRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct MembershipRow {
    id: Uuid,
    user_id: String,
    organization_id: String,
    role_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MembershipRow {
    fn into_membership(self) -> AppResult<Membership> {
        Membership::new(
            self.id,
            UserId::new(self.user_id)?,
            OrganizationId::new(self.organization_id)?,
            RoleId::new(self.role_id)?,
            self.created_at,
            self.updated_at,
        )
    }
}

#[async_trait]
impl MembershipRepository for PostgresMembershipRepository {
    async fn list_user_memberships(
        &self,
        user_id: &UserId,
        organization_id: Option<&OrganizationId>,
    ) -> AppResult<Vec<Membership>> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT id, user_id, organization_id, role_id, created_at, updated_at
            FROM memberships
            WHERE user_id = $1
              AND ($2::TEXT IS NULL OR organization_id = $2)
            ORDER BY organization_id, created_at, role_id
            "#,
        )
        .bind(user_id.as_str())
        .bind(organization_id.map(OrganizationId::as_str))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list memberships for user '{user_id}': {error}"
            ))
        })?;

        rows.into_iter().map(MembershipRow::into_membership).collect()
    }

    async fn list_memberships_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> AppResult<Vec<Membership>> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT id, user_id, organization_id, role_id, created_at, updated_at
            FROM memberships
            WHERE organization_id = $1
            ORDER BY user_id, created_at, role_id
            "#,
        )
        .bind(organization_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list memberships for organization '{organization_id}': {error}"
            ))
        })?;

        rows.into_iter().map(MembershipRow::into_membership).collect()
    }

    async fn list_user_roles(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> AppResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT DISTINCT roles.id, roles.name, roles.description
            FROM memberships
            INNER JOIN roles ON roles.id = memberships.role_id
            WHERE memberships.user_id = $1
              AND memberships.organization_id = $2
            ORDER BY roles.name, roles.id
            "#,
        )
        .bind(user_id.as_str())
        .bind(organization_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list roles for user '{user_id}' in organization '{organization_id}': {error}"
            ))
        })?;

        Ok(rows.into_iter().filter_map(RoleRow::into_valid_role).collect())
    }

    async fn insert_membership(&self, membership: Membership) -> AppResult<Membership> {
        let row = sqlx::query_as::<_, MembershipRow>(
            r#"
            INSERT INTO memberships (id, user_id, organization_id, role_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, organization_id, role_id, created_at, updated_at
            "#,
        )
        .bind(membership.id())
        .bind(membership.user_id().as_str())
        .bind(membership.organization_id().as_str())
        .bind(membership.role_id().as_str())
        .bind(membership.created_at())
        .bind(membership.updated_at())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| map_membership_conflict(error, &membership))?;

        row.into_membership()
    }

    async fn delete_membership(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        role_id: &RoleId,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM memberships
            WHERE user_id = $1 AND organization_id = $2 AND role_id = $3
            "#,
        )
        .bind(user_id.as_str())
        .bind(organization_id.as_str())
        .bind(role_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to delete membership: {error}")))?;

        Ok(result.rows_affected() > 0)
    }
}

fn map_membership_conflict(error: sqlx::Error, membership: &Membership) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!(
            "role '{}' is already assigned to user '{}' in organization '{}'",
            membership.role_id(),
            membership.user_id(),
            membership.organization_id()
        ));
    }

    AppError::Internal(format!("failed to insert membership: {error}"))
}
