use crate::{
    AppState,
    auth::AdminUser,
    error::{AppError, AppResult, ErrorResponse, ValidationError},
    models::{
        CreatedResponse, Donation, ImageGroup, ImageGroupInput, ImageInput, LoginRequest,
        LoginResponse, Marker, MarkerInput, MessageResponse, Update, UpdateInput,
    },
};
use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
};

/// Unwraps a JSON body, turning parse failures into a 400 validation error.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ValidationError::Malformed(rejection.body_text()).into())
}

/// Unwraps a numeric path id, rejecting anything else with the same 400 shape.
fn path_id(path: Result<Path<i64>, PathRejection>) -> AppResult<i64> {
    path.map(|Path(id)| id)
        .map_err(|rejection| ValidationError::Malformed(rejection.body_text()).into())
}

fn created(id: i64, message: &str) -> Json<CreatedResponse> {
    Json(CreatedResponse {
        id,
        message: message.to_string(),
    })
}

fn done(message: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: message.to_string(),
    })
}

// --- Public Handlers ---

/// list_markers
///
/// [Public Route] All markers, newest first, each with its images in display order.
#[utoipa::path(
    get,
    path = "/api/markers",
    responses(
        (status = 200, description = "Markers", body = [Marker]),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn list_markers(State(state): State<AppState>) -> AppResult<Json<Vec<Marker>>> {
    Ok(Json(state.repo.list_markers().await?))
}

/// get_marker
#[utoipa::path(
    get,
    path = "/api/markers/{id}",
    params(("id" = i64, Path, description = "Marker ID")),
    responses(
        (status = 200, description = "Found", body = Marker),
        (status = 404, description = "Unknown id", body = ErrorResponse)
    )
)]
pub async fn get_marker(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<Marker>> {
    let id = path_id(path)?;
    Ok(Json(state.repo.get_marker(id).await?))
}

/// list_updates
///
/// [Public Route] News-style updates, newest first.
#[utoipa::path(
    get,
    path = "/api/updates",
    responses(
        (status = 200, description = "Updates", body = [Update]),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn list_updates(State(state): State<AppState>) -> AppResult<Json<Vec<Update>>> {
    Ok(Json(state.repo.list_updates().await?))
}

/// get_update
#[utoipa::path(
    get,
    path = "/api/updates/{id}",
    params(("id" = i64, Path, description = "Update ID")),
    responses(
        (status = 200, description = "Found", body = Update),
        (status = 404, description = "Unknown id", body = ErrorResponse)
    )
)]
pub async fn get_update(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<Update>> {
    let id = path_id(path)?;
    Ok(Json(state.repo.get_update(id).await?))
}

/// list_donations
///
/// [Public Route] Donation channels. The repository filters on `is_active = true`
/// unconditionally, so inactive entries can never leak through this endpoint.
#[utoipa::path(
    get,
    path = "/api/donations",
    responses(
        (status = 200, description = "Active donations", body = [Donation]),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn list_donations(State(state): State<AppState>) -> AppResult<Json<Vec<Donation>>> {
    Ok(Json(state.repo.list_active_donations().await?))
}

/// list_image_groups
///
/// [Public Route] Galleries with nested images and their `image_count`.
#[utoipa::path(
    get,
    path = "/api/image-groups",
    responses(
        (status = 200, description = "Image groups", body = [ImageGroup]),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn list_image_groups(State(state): State<AppState>) -> AppResult<Json<Vec<ImageGroup>>> {
    Ok(Json(state.repo.list_image_groups().await?))
}

/// get_image_group
#[utoipa::path(
    get,
    path = "/api/image-groups/{id}",
    params(("id" = i64, Path, description = "Image group ID")),
    responses(
        (status = 200, description = "Found", body = ImageGroup),
        (status = 404, description = "Unknown id", body = ErrorResponse)
    )
)]
pub async fn get_image_group(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<ImageGroup>> {
    let id = path_id(path)?;
    Ok(Json(state.repo.get_image_group(id).await?))
}

/// login
///
/// [Public Route] Credential exchange. Unknown usernames and wrong passwords produce
/// the same 401 body.
#[utoipa::path(
    post,
    path = "/api/admin/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 400, description = "Missing username or password", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<LoginResponse>> {
    let (username, password) = body(payload)?.validate()?;

    let admin = match state.credentials.verify(&username, password).await {
        Ok(admin) => admin,
        Err(AppError::InvalidCredentials) => {
            tracing::warn!("rejected admin login attempt");
            return Err(AppError::InvalidCredentials);
        }
        Err(e) => return Err(e),
    };

    let token = state.tokens.issue(&admin)?;
    tracing::info!(admin_id = admin.id, "admin logged in");

    Ok(Json(LoginResponse {
        token,
        username: admin.username,
    }))
}

// --- Admin Handlers ---
//
// Every handler below receives the verified `AdminUser`; the admin route layer has
// already rejected requests without a valid token.

/// create_update
#[utoipa::path(
    post,
    path = "/api/admin/update",
    request_body = UpdateInput,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Created", body = CreatedResponse),
        (status = 400, description = "Missing title or content", body = ErrorResponse),
        (status = 401, description = "No token", body = ErrorResponse),
        (status = 403, description = "Invalid or expired token", body = ErrorResponse)
    )
)]
pub async fn create_update(
    admin: AdminUser,
    State(state): State<AppState>,
    payload: Result<Json<UpdateInput>, JsonRejection>,
) -> AppResult<Json<CreatedResponse>> {
    let new = body(payload)?.validate()?;
    let update = state.repo.create_update(new).await?;
    tracing::info!(admin = %admin.username, update_id = update.id, "update created");
    Ok(created(update.id, "Update added successfully"))
}

/// edit_update
#[utoipa::path(
    put,
    path = "/api/admin/update/{id}",
    params(("id" = i64, Path, description = "Update ID")),
    request_body = UpdateInput,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Edited", body = MessageResponse),
        (status = 400, description = "Missing title or content", body = ErrorResponse),
        (status = 404, description = "Unknown id", body = ErrorResponse)
    )
)]
pub async fn edit_update(
    admin: AdminUser,
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateInput>, JsonRejection>,
) -> AppResult<Json<MessageResponse>> {
    let id = path_id(path)?;
    let new = body(payload)?.validate()?;
    state.repo.edit_update(id, new).await?;
    tracing::info!(admin = %admin.username, update_id = id, "update edited");
    Ok(done("Update updated successfully"))
}

/// delete_update
#[utoipa::path(
    delete,
    path = "/api/admin/update/{id}",
    params(("id" = i64, Path, description = "Update ID")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Unknown id", body = ErrorResponse)
    )
)]
pub async fn delete_update(
    admin: AdminUser,
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<MessageResponse>> {
    let id = path_id(path)?;
    state.repo.delete_update(id).await?;
    tracing::info!(admin = %admin.username, update_id = id, "update deleted");
    Ok(done("Update deleted successfully"))
}

/// create_marker
///
/// [Admin Route] Latitude, longitude and description are required; coordinates are
/// range-checked. Images listed in the body are stored in the given order.
#[utoipa::path(
    post,
    path = "/api/admin/marker",
    request_body = MarkerInput,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Created", body = CreatedResponse),
        (status = 400, description = "Missing or out-of-range field", body = ErrorResponse),
        (status = 401, description = "No token", body = ErrorResponse),
        (status = 403, description = "Invalid or expired token", body = ErrorResponse)
    )
)]
pub async fn create_marker(
    admin: AdminUser,
    State(state): State<AppState>,
    payload: Result<Json<MarkerInput>, JsonRejection>,
) -> AppResult<Json<CreatedResponse>> {
    let new = body(payload)?.validate()?;
    let marker = state.repo.create_marker(new).await?;
    tracing::info!(
        admin = %admin.username,
        marker_id = marker.id,
        images = marker.images.len(),
        "marker created"
    );
    Ok(created(marker.id, "Marker added successfully"))
}

/// edit_marker
///
/// [Admin Route] Replaces the marker's fields and its image list.
#[utoipa::path(
    put,
    path = "/api/admin/marker/{id}",
    params(("id" = i64, Path, description = "Marker ID")),
    request_body = MarkerInput,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Edited", body = MessageResponse),
        (status = 400, description = "Missing or out-of-range field", body = ErrorResponse),
        (status = 404, description = "Unknown id", body = ErrorResponse)
    )
)]
pub async fn edit_marker(
    admin: AdminUser,
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<MarkerInput>, JsonRejection>,
) -> AppResult<Json<MessageResponse>> {
    let id = path_id(path)?;
    let new = body(payload)?.validate()?;
    state.repo.edit_marker(id, new).await?;
    tracing::info!(admin = %admin.username, marker_id = id, "marker edited");
    Ok(done("Marker updated successfully"))
}

/// delete_marker
#[utoipa::path(
    delete,
    path = "/api/admin/marker/{id}",
    params(("id" = i64, Path, description = "Marker ID")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Unknown id", body = ErrorResponse)
    )
)]
pub async fn delete_marker(
    admin: AdminUser,
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<MessageResponse>> {
    let id = path_id(path)?;
    state.repo.delete_marker(id).await?;
    tracing::info!(admin = %admin.username, marker_id = id, "marker deleted");
    Ok(done("Marker deleted successfully"))
}

/// create_image_group
#[utoipa::path(
    post,
    path = "/api/admin/image-group",
    request_body = ImageGroupInput,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Created", body = CreatedResponse),
        (status = 400, description = "Missing title or bad coordinates", body = ErrorResponse)
    )
)]
pub async fn create_image_group(
    admin: AdminUser,
    State(state): State<AppState>,
    payload: Result<Json<ImageGroupInput>, JsonRejection>,
) -> AppResult<Json<CreatedResponse>> {
    let new = body(payload)?.validate()?;
    let group = state.repo.create_image_group(new).await?;
    tracing::info!(admin = %admin.username, group_id = group.id, "image group created");
    Ok(created(group.id, "Image group added successfully"))
}

/// edit_image_group
#[utoipa::path(
    put,
    path = "/api/admin/image-group/{id}",
    params(("id" = i64, Path, description = "Image group ID")),
    request_body = ImageGroupInput,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Edited", body = MessageResponse),
        (status = 400, description = "Missing title or bad coordinates", body = ErrorResponse),
        (status = 404, description = "Unknown id", body = ErrorResponse)
    )
)]
pub async fn edit_image_group(
    admin: AdminUser,
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ImageGroupInput>, JsonRejection>,
) -> AppResult<Json<MessageResponse>> {
    let id = path_id(path)?;
    let new = body(payload)?.validate()?;
    state.repo.edit_image_group(id, new).await?;
    tracing::info!(admin = %admin.username, group_id = id, "image group edited");
    Ok(done("Image group updated successfully"))
}

/// delete_image_group
///
/// [Admin Route] Removes the group and every image it owns atomically.
#[utoipa::path(
    delete,
    path = "/api/admin/image-group/{id}",
    params(("id" = i64, Path, description = "Image group ID")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Unknown id", body = ErrorResponse)
    )
)]
pub async fn delete_image_group(
    admin: AdminUser,
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<MessageResponse>> {
    let id = path_id(path)?;
    state.repo.delete_image_group(id).await?;
    tracing::info!(admin = %admin.username, group_id = id, "image group deleted");
    Ok(done("Image group deleted successfully"))
}

/// add_image
///
/// [Admin Route] Attaches an image URL to an existing group. Image bytes are never
/// handled here; only the URL is stored.
#[utoipa::path(
    post,
    path = "/api/admin/image",
    request_body = ImageInput,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Created", body = CreatedResponse),
        (status = 400, description = "Missing group_id or image_url", body = ErrorResponse),
        (status = 409, description = "Group does not exist", body = ErrorResponse)
    )
)]
pub async fn add_image(
    admin: AdminUser,
    State(state): State<AppState>,
    payload: Result<Json<ImageInput>, JsonRejection>,
) -> AppResult<Json<CreatedResponse>> {
    let new = body(payload)?.validate()?;
    let image = state.repo.add_image(new).await?;
    tracing::info!(admin = %admin.username, image_id = image.id, group_id = ?image.group_id, "image added");
    Ok(created(image.id, "Image added successfully"))
}

/// delete_image
#[utoipa::path(
    delete,
    path = "/api/admin/image/{id}",
    params(("id" = i64, Path, description = "Image ID")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Unknown id", body = ErrorResponse)
    )
)]
pub async fn delete_image(
    admin: AdminUser,
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<MessageResponse>> {
    let id = path_id(path)?;
    state.repo.delete_image(id).await?;
    tracing::info!(admin = %admin.username, image_id = id, "image deleted");
    Ok(done("Image deleted successfully"))
}
