use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub(crate) async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres entitlement tests: {error}");
    }

    Some(pool)
}

/// Returns an identifier unique to one test run.
pub(crate) fn unique(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

pub(crate) async fn seed_role(pool: &PgPool, role_id: &str) {
    seed_named_role(pool, role_id, role_id).await;
}

/// Inserts a role row as-is, without domain validation of the name.
pub(crate) async fn seed_named_role(pool: &PgPool, role_id: &str, name: &str) {
    let insert = sqlx::query(
        r#"
        INSERT INTO roles (id, name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(role_id)
    .bind(name)
    .execute(pool)
    .await;

    assert!(insert.is_ok());
}

pub(crate) async fn seed_grant(pool: &PgPool, role_id: &str, permission_name: &str) -> Uuid {
    let permission_id = Uuid::new_v4();
    let insert = sqlx::query(
        r#"
        INSERT INTO permissions (id, name, resource_type)
        VALUES ($1, $2, 'document')
        "#,
    )
    .bind(permission_id)
    .bind(permission_name)
    .execute(pool)
    .await;
    assert!(insert.is_ok());

    let grant = sqlx::query(
        r#"
        INSERT INTO role_permissions (role_id, permission_id)
        VALUES ($1, $2)
        "#,
    )
    .bind(role_id)
    .bind(permission_id)
    .execute(pool)
    .await;
    assert!(grant.is_ok());

    permission_id
}

pub(crate) async fn seed_inheritance(
    pool: &PgPool,
    child_role_id: &str,
    parent_role_id: &str,
    depth: i32,
) {
    let insert = sqlx::query(
        r#"
        INSERT INTO role_hierarchy (parent_role_id, child_role_id, depth)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(parent_role_id)
    .bind(child_role_id)
    .bind(depth)
    .execute(pool)
    .await;

    assert!(insert.is_ok());
}
