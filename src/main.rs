use disaster_portal::{
    AppState,
    auth::provision_admin,
    config::{AppConfig, Env, StoreKind},
    create_router,
    repository::{MemoryRepository, PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Initializes configuration, logging, the store and the HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise sensible local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "disaster_portal=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for log aggregation.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Store
    let repo: RepositoryState = match config.store {
        StoreKind::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(&config.db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

            let repo = PostgresRepository::new(pool);
            repo.migrate()
                .await
                .expect("FATAL: Failed to run database migrations.");
            tracing::info!("Postgres connected and migrated.");
            Arc::new(repo)
        }
        StoreKind::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart.");
            Arc::new(MemoryRepository::new())
        }
    };

    // 4. Out-of-band admin provisioning
    if let Some(admin) = &config.bootstrap_admin {
        provision_admin(&repo, admin, config.bcrypt_cost)
            .await
            .expect("FATAL: Failed to provision the admin identity.");
    }

    // 5. Router and server
    let port = config.port;
    let app_state = AppState::new(repo, config).expect("FATAL: Failed to build application state.");
    app_state
        .credentials
        .calibrate()
        .await
        .expect("FATAL: Failed to read stored admin digests.");
    let app = create_router(app_state);

    let address = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&address)
        .await
        .unwrap_or_else(|e| panic!("FATAL: Failed to bind {address}: {e}"));

    tracing::info!("Listening on {address}");
    tracing::info!("API Documentation (Swagger UI) available at: http://localhost:{port}/swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
