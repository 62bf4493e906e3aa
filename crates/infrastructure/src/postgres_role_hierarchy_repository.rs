use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

use entitlements_application::RoleHierarchyRepository;
use entitlements_core::{AppError, AppResult};
use entitlements_domain::{Permission, Role, RoleId};


/// PostgreSQL-backed repository for roles, direct grants and inheritance edges.
#[derive(Clone)]
pub struct PostgresRoleHierarchyRepository {
    pool: PgPool,
}

impl PostgresRoleHierarchyRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct RoleRow {
    id: String,
    name: String,
    description: Option<String>,
}

impl RoleRow {
    /// Converts a stored row, skipping rows that no longer pass validation.
    pub(crate) fn into_valid_role(self) -> Option<Role> {
        let role_id = self.id.clone();
        match Role::new(self.id, self.name, self.description) {
            Ok(role) => Some(role),
            Err(error) => {
                warn!(role_id = %role_id, error = %error, "skipping invalid stored role");
                None
            }
        }
    }
}

#[derive(Debug, FromRow)]
struct PermissionRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    resource_type: Option<String>,
}

#[async_trait]
impl RoleHierarchyRepository for PostgresRoleHierarchyRepository {
    async fn find_role(&self, role_id: &RoleId) -> AppResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, name, description
            FROM roles
            WHERE id = $1
            "#,
        )
        .bind(role_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find role '{role_id}': {error}")))?;

        Ok(row.and_then(RoleRow::into_valid_role))
    }

    async fn list_role_permissions(&self, role_id: &RoleId) -> AppResult<Vec<Permission>> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT permissions.id, permissions.name, permissions.description, permissions.resource_type
            FROM role_permissions
            INNER JOIN permissions ON permissions.id = role_permissions.permission_id
            WHERE role_permissions.role_id = $1
            ORDER BY permissions.name, permissions.id
            "#,
        )
        .bind(role_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list permissions for role '{role_id}': {error}"
            ))
        })?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let permission_id = row.id;
                Permission::new(row.id, row.name, row.description, row.resource_type)
                    .inspect_err(|error| {
                        warn!(
                            role_id = %role_id,
                            permission_id = %permission_id,
                            error = %error,
                            "skipping invalid stored permission"
                        );
                    })
                    .ok()
            })
            .collect())
    }

    async fn list_parent_role_ids(&self, role_id: &RoleId) -> AppResult<Vec<RoleId>> {
        let parent_role_ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT parent_role_id
            FROM role_hierarchy
            WHERE child_role_id = $1
            ORDER BY depth, parent_role_id
            "#,
        )
        .bind(role_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list parent roles for role '{role_id}': {error}"
            ))
        })?;

        parent_role_ids.into_iter().map(RoleId::new).collect()
    }
}
