use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{
        AdminIdentity, Donation, Image, ImageGroup, Marker, NewImage, NewImageGroup, NewMarker,
        NewUpdate, Update,
    },
};

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// Repository Trait
///
/// The persistence contract behind every handler. Write methods take already
/// validated inputs (`New*` types can only be produced by `validate()`), so no
/// unchecked value ever reaches storage.
///
/// Multi-step writes (marker create/edit with images, group and marker deletes)
/// must be atomic: either every row changes or none does.
///
/// **Send + Sync + async_trait** make `Arc<dyn Repository>` shareable across Axum tasks.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Admin identities (provisioning only, never exposed via the API) ---
    async fn find_admin_by_username(&self, username: &str) -> AppResult<Option<AdminIdentity>>;
    /// The oldest admin, if any. Used to learn the cost of the stored digests.
    async fn find_first_admin(&self) -> AppResult<Option<AdminIdentity>>;
    /// Fails with `Conflict` if the username is taken.
    async fn insert_admin(&self, username: &str, password_digest: &str)
    -> AppResult<AdminIdentity>;

    // --- Updates ---
    // Newest first.
    async fn list_updates(&self) -> AppResult<Vec<Update>>;
    async fn get_update(&self, id: i64) -> AppResult<Update>;
    async fn create_update(&self, new: NewUpdate) -> AppResult<Update>;
    async fn edit_update(&self, id: i64, new: NewUpdate) -> AppResult<Update>;
    async fn delete_update(&self, id: i64) -> AppResult<()>;

    // --- Donations (read-only) ---
    // Only rows with is_active = true.
    async fn list_active_donations(&self) -> AppResult<Vec<Donation>>;

    // --- Markers ---
    // Newest first, each with its images in display order.
    async fn list_markers(&self) -> AppResult<Vec<Marker>>;
    async fn get_marker(&self, id: i64) -> AppResult<Marker>;
    async fn create_marker(&self, new: NewMarker) -> AppResult<Marker>;
    /// Replaces the marker's fields and its whole image list.
    async fn edit_marker(&self, id: i64, new: NewMarker) -> AppResult<Marker>;
    /// Deletes the marker and its images.
    async fn delete_marker(&self, id: i64) -> AppResult<()>;

    // --- Image groups ---
    // Newest first, with nested images and the aggregated image_count.
    async fn list_image_groups(&self) -> AppResult<Vec<ImageGroup>>;
    async fn get_image_group(&self, id: i64) -> AppResult<ImageGroup>;
    async fn create_image_group(&self, new: NewImageGroup) -> AppResult<ImageGroup>;
    async fn edit_image_group(&self, id: i64, new: NewImageGroup) -> AppResult<ImageGroup>;
    /// Deletes the group and every image it owns in one unit of work.
    async fn delete_image_group(&self, id: i64) -> AppResult<()>;

    // --- Images ---
    /// Fails with `Conflict` when the owning group does not exist.
    async fn add_image(&self, new: NewImage) -> AppResult<Image>;
    async fn delete_image(&self, id: i64) -> AppResult<()>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
