use axum::{http::Method, routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod auth;
mod config;
mod database;
mod error;
mod handlers;
mod pagination;
mod store;
mod validation;
mod workflows;

#[cfg(test)]
mod tests;

pub struct AppState {
    pub store: Arc<dyn store::Store>,
    pub engine: workflows::WorkflowEngine,
    pub config: config::Config,
}

impl AppState {
    pub fn new(store: Arc<dyn store::Store>, config: config::Config) -> Self {
        let engine = workflows::WorkflowEngine::new(store.clone(), config.workflows.clone());
        Self { store, engine, config }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Keystone API v1.0.0" }))
        .route("/api/v1/health", get(handlers::health_check))
        .nest("/api/v1/event-types", handlers::event_type_routes())
        .nest("/api/v1/task-templates", handlers::task_template_routes())
        .nest("/api/v1/design-item-types", handlers::design_item_type_routes())
        .nest("/api/v1/workflows", handlers::workflow_routes())
        .nest("/api/v1/workflow-executions", handlers::execution_routes())
        .nest("/api/v1/events", handlers::event_routes())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("keystone_backend=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url, database::PoolConfig::from_env()?).await?;

    if config.run_migrations {
        database::migrate(&db_pool).await?;
    }

    let store: Arc<dyn store::Store> = Arc::new(store::PgStore::new(db_pool));
    let server_addr = config.server_addr.clone();
    let app = build_router(Arc::new(AppState::new(store, config)));

    let listener = tokio::net::TcpListener::bind(&server_addr).await?;
    tracing::info!("Server running on {}", server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
