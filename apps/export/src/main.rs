//! Organization entitlement export runtime.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use entitlements_application::{
    DEFAULT_CACHE_NAMESPACE, DEFAULT_LOCAL_CACHE_TTL, EmptyResolutionPolicy, EntitlementConfig,
    EntitlementService, MembershipStore, RoleHierarchyResolver,
};
use entitlements_core::{AppError, AppResult, OrganizationId};
use entitlements_infrastructure::{
    PostgresMembershipRepository, PostgresRoleHierarchyRepository, RedisPermissionCache,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct ExportConfig {
    database_url: String,
    redis_url: Option<String>,
    organization_id: OrganizationId,
    cache_ttl_seconds: u64,
    entitlement: EntitlementConfig,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    if migrate_requested(env::args()) {
        let pool = connect_pool(required_env("DATABASE_URL")?.as_str()).await?;
        run_migrations(&pool).await?;
        info!("database migrations applied successfully");
        return Ok(());
    }

    let config = ExportConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    run_migrations(&pool).await?;

    info!(
        organization_id = %config.organization_id,
        cache_namespace = %config.entitlement.cache_namespace,
        empty_resolution = config.entitlement.empty_resolution.as_str(),
        redis_cache = config.redis_url.is_some(),
        "entitlements-export started"
    );

    let service = build_entitlement_service(pool, &config)?;
    let export = service
        .export_organization_permissions(&config.organization_id)
        .await?;

    let rendered = serde_json::to_string_pretty(&export)
        .map_err(|error| AppError::Internal(format!("failed to render export: {error}")))?;
    println!("{rendered}");

    Ok(())
}

fn migrate_requested(mut args: impl Iterator<Item = String>) -> bool {
    args.nth(1).as_deref() == Some("migrate")
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))
}

fn build_entitlement_service(pool: PgPool, config: &ExportConfig) -> AppResult<EntitlementService> {
    let membership_store = MembershipStore::new(Arc::new(PostgresMembershipRepository::new(
        pool.clone(),
    )));
    let resolver =
        RoleHierarchyResolver::new(Arc::new(PostgresRoleHierarchyRepository::new(pool)));
    let service = EntitlementService::new(membership_store, resolver, config.entitlement.clone());

    let Some(redis_url) = config.redis_url.as_deref() else {
        return Ok(service);
    };

    let client = redis::Client::open(redis_url)
        .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))?;
    let cache = RedisPermissionCache::new(
        client,
        config.entitlement.cache_namespace.clone(),
        config.cache_ttl_seconds,
    );

    Ok(service.with_permission_cache(Arc::new(cache)))
}

impl ExportConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let redis_url = optional_env("REDIS_URL");
        let organization_id = OrganizationId::new(required_env("EXPORT_ORGANIZATION_ID")?)?;
        let cache_ttl_seconds = parse_env_u64("ENTITLEMENT_CACHE_TTL_SECONDS", 60)?;
        let local_cache_ttl_ms = parse_env_u64(
            "ENTITLEMENT_LOCAL_CACHE_TTL_MS",
            u64::try_from(DEFAULT_LOCAL_CACHE_TTL.as_millis()).unwrap_or(u64::MAX),
        )?;
        let cache_namespace = optional_env("ENTITLEMENT_CACHE_NAMESPACE")
            .unwrap_or_else(|| DEFAULT_CACHE_NAMESPACE.to_owned());
        let empty_resolution = match optional_env("ENTITLEMENT_EMPTY_RESOLUTION") {
            Some(value) => value.parse::<EmptyResolutionPolicy>()?,
            None => EmptyResolutionPolicy::default(),
        };

        Ok(Self {
            database_url,
            redis_url,
            organization_id,
            cache_ttl_seconds,
            entitlement: EntitlementConfig::default()
                .with_cache_namespace(cache_namespace)
                .with_local_cache_ttl(Duration::from_millis(local_cache_ttl_ms))
                .with_empty_resolution(empty_resolution),
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
