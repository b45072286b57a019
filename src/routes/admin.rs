use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{post, put},
};

/// Admin Router Module
///
/// Every mutation of site content. `create_router` wraps this whole router in a
/// `route_layer` that resolves `AdminUser` from the bearer token before any handler
/// runs: no token is 401, a bad or expired token is 403.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // POST /admin/update, PUT/DELETE /admin/update/{id}
        .route("/admin/update", post(handlers::create_update))
        .route(
            "/admin/update/{id}",
            put(handlers::edit_update).delete(handlers::delete_update),
        )
        // POST /admin/marker, PUT/DELETE /admin/marker/{id}
        // Edits replace the marker's image list.
        .route("/admin/marker", post(handlers::create_marker))
        .route(
            "/admin/marker/{id}",
            put(handlers::edit_marker).delete(handlers::delete_marker),
        )
        // POST /admin/image-group, PUT/DELETE /admin/image-group/{id}
        // Deleting a group deletes its images in the same transaction.
        .route("/admin/image-group", post(handlers::create_image_group))
        .route(
            "/admin/image-group/{id}",
            put(handlers::edit_image_group).delete(handlers::delete_image_group),
        )
        // POST /admin/image, DELETE /admin/image/{id}
        .route("/admin/image", post(handlers::add_image))
        .route("/admin/image/{id}", axum::routing::delete(handlers::delete_image))
}
