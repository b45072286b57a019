use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::Repository;
use crate::{
    error::{AppError, AppResult},
    models::{
        AdminIdentity, Donation, Image, ImageGroup, Marker, NewImage, NewImageGroup, NewMarker,
        NewUpdate, Update, sort_images,
    },
};

#[derive(Default)]
struct Tables {
    last_id: i64,
    admins: BTreeMap<i64, AdminIdentity>,
    updates: BTreeMap<i64, Update>,
    donations: BTreeMap<i64, Donation>,
    markers: BTreeMap<i64, Marker>,
    groups: BTreeMap<i64, ImageGroup>,
    images: BTreeMap<i64, Image>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn images_of(&self, owner: impl Fn(&Image) -> bool) -> Vec<Image> {
        let mut images: Vec<Image> = self.images.values().filter(|&i| owner(i)).cloned().collect();
        sort_images(&mut images);
        images
    }

    fn hydrate_marker(&self, marker: &Marker) -> Marker {
        let id = marker.id;
        let mut marker = marker.clone();
        marker.attach_images(self.images_of(|i| i.marker_id == Some(id)));
        marker
    }

    fn hydrate_group(&self, group: &ImageGroup) -> ImageGroup {
        let id = group.id;
        let mut group = group.clone();
        group.images = self.images_of(|i| i.group_id == Some(id));
        group.image_count = group.images.len() as i64;
        group
    }

    fn replace_marker_images(&mut self, marker_id: i64, new: &NewMarker) {
        self.images.retain(|_, i| i.marker_id != Some(marker_id));
        let now = Utc::now();
        for (position, image) in new.images.iter().enumerate() {
            let id = self.next_id();
            self.images.insert(
                id,
                Image {
                    id,
                    group_id: None,
                    marker_id: Some(marker_id),
                    image_url: image.image_url.clone(),
                    caption: image.caption.clone(),
                    display_order: position as i32,
                    created_at: now,
                },
            );
        }
    }
}

/// Sorts newest first; ids break timestamp ties so insertion order is kept.
fn newest_first<T>(rows: &mut [T], key: impl Fn(&T) -> (chrono::DateTime<Utc>, i64)) {
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
}

/// MemoryRepository
///
/// An in-process implementation of `Repository` for tests and local runs without
/// Postgres. Every operation holds one lock for its whole duration, which gives the
/// same all-or-nothing behaviour as a database transaction.
pub struct MemoryRepository {
    tables: RwLock<Tables>,
    /// When true, every operation fails as if the database were unreachable.
    pub should_fail: bool,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            should_fail: false,
        }
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new()
        }
    }

    fn check(&self) -> AppResult<()> {
        if self.should_fail {
            return Err(AppError::Store(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    /// Donations are provisioned out-of-band; this is that channel for the
    /// in-memory store. `id` and `created_at` are assigned here.
    pub async fn seed_donation(&self, donation: Donation) -> Donation {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        let donation = Donation {
            id,
            created_at: Utc::now(),
            ..donation
        };
        tables.donations.insert(id, donation.clone());
        donation
    }

    /// Total number of stored images, whatever their owner.
    pub async fn image_count(&self) -> usize {
        self.tables.read().await.images.len()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_admin_by_username(&self, username: &str) -> AppResult<Option<AdminIdentity>> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables
            .admins
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn find_first_admin(&self) -> AppResult<Option<AdminIdentity>> {
        self.check()?;
        Ok(self.tables.read().await.admins.values().next().cloned())
    }

    async fn insert_admin(
        &self,
        username: &str,
        password_digest: &str,
    ) -> AppResult<AdminIdentity> {
        self.check()?;
        let mut tables = self.tables.write().await;
        if tables.admins.values().any(|a| a.username == username) {
            return Err(AppError::Conflict(format!("admin {username} already exists")));
        }
        let id = tables.next_id();
        let admin = AdminIdentity {
            id,
            username: username.to_string(),
            password_digest: password_digest.to_string(),
        };
        tables.admins.insert(id, admin.clone());
        Ok(admin)
    }

    // --- UPDATES ---

    async fn list_updates(&self) -> AppResult<Vec<Update>> {
        self.check()?;
        let mut updates: Vec<Update> = self.tables.read().await.updates.values().cloned().collect();
        newest_first(&mut updates, |u| (u.created_at, u.id));
        Ok(updates)
    }

    async fn get_update(&self, id: i64) -> AppResult<Update> {
        self.check()?;
        self.tables
            .read()
            .await
            .updates
            .get(&id)
            .cloned()
            .ok_or(AppError::not_found("update"))
    }

    async fn create_update(&self, new: NewUpdate) -> AppResult<Update> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        let update = Update {
            id,
            title: new.title,
            content: new.content,
            created_at: Utc::now(),
        };
        tables.updates.insert(id, update.clone());
        Ok(update)
    }

    async fn edit_update(&self, id: i64, new: NewUpdate) -> AppResult<Update> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let update = tables
            .updates
            .get_mut(&id)
            .ok_or(AppError::not_found("update"))?;
        update.title = new.title;
        update.content = new.content;
        Ok(update.clone())
    }

    async fn delete_update(&self, id: i64) -> AppResult<()> {
        self.check()?;
        self.tables
            .write()
            .await
            .updates
            .remove(&id)
            .map(|_| ())
            .ok_or(AppError::not_found("update"))
    }

    // --- DONATIONS ---

    async fn list_active_donations(&self) -> AppResult<Vec<Donation>> {
        self.check()?;
        let mut donations: Vec<Donation> = self
            .tables
            .read()
            .await
            .donations
            .values()
            .filter(|d| d.is_active)
            .cloned()
            .collect();
        newest_first(&mut donations, |d| (d.created_at, d.id));
        Ok(donations)
    }

    // --- MARKERS ---

    async fn list_markers(&self) -> AppResult<Vec<Marker>> {
        self.check()?;
        let tables = self.tables.read().await;
        let mut markers: Vec<Marker> = tables
            .markers
            .values()
            .map(|m| tables.hydrate_marker(m))
            .collect();
        newest_first(&mut markers, |m| (m.created_at, m.id));
        Ok(markers)
    }

    async fn get_marker(&self, id: i64) -> AppResult<Marker> {
        self.check()?;
        let tables = self.tables.read().await;
        tables
            .markers
            .get(&id)
            .map(|m| tables.hydrate_marker(m))
            .ok_or(AppError::not_found("marker"))
    }

    async fn create_marker(&self, new: NewMarker) -> AppResult<Marker> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        let marker = Marker {
            id,
            latitude: new.latitude,
            longitude: new.longitude,
            description: new.description.clone(),
            created_at: Utc::now(),
            ..Default::default()
        };
        tables.markers.insert(id, marker.clone());
        tables.replace_marker_images(id, &new);
        Ok(tables.hydrate_marker(&marker))
    }

    async fn edit_marker(&self, id: i64, new: NewMarker) -> AppResult<Marker> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let marker = tables
            .markers
            .get_mut(&id)
            .ok_or(AppError::not_found("marker"))?;
        marker.latitude = new.latitude;
        marker.longitude = new.longitude;
        marker.description = new.description.clone();
        let marker = marker.clone();

        tables.replace_marker_images(id, &new);
        Ok(tables.hydrate_marker(&marker))
    }

    async fn delete_marker(&self, id: i64) -> AppResult<()> {
        self.check()?;
        let mut tables = self.tables.write().await;
        tables
            .markers
            .remove(&id)
            .ok_or(AppError::not_found("marker"))?;
        tables.images.retain(|_, i| i.marker_id != Some(id));
        Ok(())
    }

    // --- IMAGE GROUPS ---

    async fn list_image_groups(&self) -> AppResult<Vec<ImageGroup>> {
        self.check()?;
        let tables = self.tables.read().await;
        let mut groups: Vec<ImageGroup> = tables
            .groups
            .values()
            .map(|g| tables.hydrate_group(g))
            .collect();
        newest_first(&mut groups, |g| (g.created_at, g.id));
        Ok(groups)
    }

    async fn get_image_group(&self, id: i64) -> AppResult<ImageGroup> {
        self.check()?;
        let tables = self.tables.read().await;
        tables
            .groups
            .get(&id)
            .map(|g| tables.hydrate_group(g))
            .ok_or(AppError::not_found("image group"))
    }

    async fn create_image_group(&self, new: NewImageGroup) -> AppResult<ImageGroup> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        let group = ImageGroup {
            id,
            title: new.title,
            description: new.description,
            location_name: new.location_name,
            latitude: new.latitude,
            longitude: new.longitude,
            created_at: Utc::now(),
            image_count: 0,
            images: Vec::new(),
        };
        tables.groups.insert(id, group.clone());
        Ok(group)
    }

    async fn edit_image_group(&self, id: i64, new: NewImageGroup) -> AppResult<ImageGroup> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let group = tables
            .groups
            .get_mut(&id)
            .ok_or(AppError::not_found("image group"))?;
        group.title = new.title;
        group.description = new.description;
        group.location_name = new.location_name;
        group.latitude = new.latitude;
        group.longitude = new.longitude;
        let group = group.clone();
        Ok(tables.hydrate_group(&group))
    }

    async fn delete_image_group(&self, id: i64) -> AppResult<()> {
        self.check()?;
        let mut tables = self.tables.write().await;
        tables
            .groups
            .remove(&id)
            .ok_or(AppError::not_found("image group"))?;
        tables.images.retain(|_, i| i.group_id != Some(id));
        Ok(())
    }

    // --- IMAGES ---

    async fn add_image(&self, new: NewImage) -> AppResult<Image> {
        self.check()?;
        let mut tables = self.tables.write().await;
        if !tables.groups.contains_key(&new.group_id) {
            return Err(AppError::Conflict(format!(
                "image group {} does not exist",
                new.group_id
            )));
        }
        let id = tables.next_id();
        let image = Image {
            id,
            group_id: Some(new.group_id),
            marker_id: None,
            image_url: new.image_url,
            caption: new.caption,
            display_order: new.display_order,
            created_at: Utc::now(),
        };
        tables.images.insert(id, image.clone());
        Ok(image)
    }

    async fn delete_image(&self, id: i64) -> AppResult<()> {
        self.check()?;
        self.tables
            .write()
            .await
            .images
            .remove(&id)
            .map(|_| ())
            .ok_or(AppError::not_found("image"))
    }
}
