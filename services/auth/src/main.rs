use std::sync::Arc;

use anyhow::Result;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use auth::audit::{AuditSink, TracingAuditSink};
use auth::identity::{IdentityProvider, MemoryIdentityProvider};
use auth::orchestrator::AuthOrchestrator;
use auth::routes;
use auth::session::{RedisSessionStore, SessionStore};
use auth::token::{TokenConfig, TokenService};
use auth::AppState;
use common::cache::{RedisConfig, RedisPool};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting authentication service");

    // Initialize token service
    let token_config = TokenConfig::from_env()?;
    let token_service = TokenService::new(token_config);

    // Initialize the shared session store
    let redis_config = RedisConfig::from_env()?;
    let redis_pool = RedisPool::new(&redis_config).await?;

    if redis_pool.health_check().await? {
        info!("Session store connection successful");
    } else {
        anyhow::bail!("Failed to connect to the session store");
    }

    let sessions: Arc<dyn SessionStore> = Arc::new(RedisSessionStore::new(redis_pool));

    // User records live with the identity service; the in-memory
    // provider backs local runs
    let identity: Arc<dyn IdentityProvider> = Arc::new(MemoryIdentityProvider::new());
    let audit_sink: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);

    let orchestrator = Arc::new(AuthOrchestrator::new(
        token_service,
        sessions,
        identity,
        audit_sink,
    ));

    orchestrator.rbac().seed_system_roles().await?;
    info!("System roles seeded");

    // Start the web server
    let app = routes::create_router(AppState { orchestrator });

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    info!("Authentication service listening on 0.0.0.0:3000");

    axum::serve(listener, app).await?;

    Ok(())
}
