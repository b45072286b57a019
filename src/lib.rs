use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;

// Routing segregation (Public, Admin).
pub mod routes;
use auth::{AdminUser, CredentialVerifier, TokenIssuer};
use routes::{admin, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};

/// Upper bound for JSON request bodies.
const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

/// ApiDoc
///
/// OpenAPI document aggregated from every `#[utoipa::path]` handler and `ToSchema`
/// payload. Served at `/api-docs/openapi.json`, browsable at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_markers, handlers::get_marker, handlers::list_updates,
        handlers::get_update, handlers::list_donations, handlers::list_image_groups,
        handlers::get_image_group, handlers::login,
        handlers::create_update, handlers::edit_update, handlers::delete_update,
        handlers::create_marker, handlers::edit_marker, handlers::delete_marker,
        handlers::create_image_group, handlers::edit_image_group, handlers::delete_image_group,
        handlers::add_image, handlers::delete_image
    ),
    components(
        schemas(
            models::Update, models::Donation, models::Marker, models::ImageGroup, models::Image,
            models::LoginRequest, models::LoginResponse, models::UpdateInput, models::MarkerInput,
            models::MarkerImageInput, models::ImageGroupInput, models::ImageInput,
            models::CreatedResponse, models::MessageResponse, error::ErrorResponse,
        )
    ),
    modifiers(&BearerSecurity),
    tags(
        (name = "disaster-portal", description = "Disaster information portal API")
    )
)]
struct ApiDoc;

/// Registers the `bearer` scheme referenced by the admin paths.
struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// AppState
///
/// The single, cloneable container of every service a request may need. Holds no
/// per-request mutable state; everything mutable lives behind the repository.
#[derive(Clone)]
pub struct AppState {
    /// Persistence: Postgres in production, in-memory for tests and local demos.
    pub repo: RepositoryState,
    /// Signs and verifies admin tokens.
    pub tokens: TokenIssuer,
    /// Checks username/password pairs against stored digests.
    pub credentials: CredentialVerifier,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

impl AppState {
    /// Wires the token issuer and credential verifier from `config`.
    pub fn new(repo: RepositoryState, config: AppConfig) -> AppResult<Self> {
        Ok(Self {
            tokens: TokenIssuer::from_config(&config),
            credentials: CredentialVerifier::new(repo.clone(), config.bcrypt_cost)?,
            repo,
            config,
        })
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for TokenIssuer {
    fn from_ref(app_state: &AppState) -> TokenIssuer {
        app_state.tokens.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// require_admin
///
/// Route layer for the admin router. Extracting `AdminUser` rejects the request
/// (401/403) before the handler runs; on success the identity is attached to the
/// request so handlers reuse it instead of verifying the token again.
async fn require_admin(admin: AdminUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(admin);
    next.run(request).await
}

/// create_router
///
/// Assembles the routing structure, applies global and scoped middleware, and
/// registers the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // Everything under /api. Admin routes get the token layer; public ones do not.
    let api = public::public_routes().merge(
        admin::admin_routes().route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin,
        )),
    );

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span so every log line of a request carries its
/// `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
