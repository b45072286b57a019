use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that need no token. All are reads, except the credential exchange
/// which is how a token is obtained in the first place.
///
/// Visibility rules (e.g. only active donations) are enforced in the repository,
/// not here.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /markers, /markers/{id}
        // Map markers with their images, newest first.
        .route("/markers", get(handlers::list_markers))
        .route("/markers/{id}", get(handlers::get_marker))
        // GET /updates, /updates/{id}
        .route("/updates", get(handlers::list_updates))
        .route("/updates/{id}", get(handlers::get_update))
        // GET /donations
        // Only entries with is_active = true.
        .route("/donations", get(handlers::list_donations))
        // GET /image-groups, /image-groups/{id}
        // Galleries with nested images and image_count.
        .route("/image-groups", get(handlers::list_image_groups))
        .route("/image-groups/{id}", get(handlers::get_image_group))
        // POST /admin/login
        // Exchanges username/password for a 24h bearer token.
        .route("/admin/login", post(handlers::login))
}
