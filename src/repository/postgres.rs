use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::Repository;
use crate::{
    error::{AppError, AppResult},
    models::{
        AdminIdentity, Donation, Image, ImageGroup, Marker, NewImage, NewImageGroup, NewMarker,
        NewMarkerImage, NewUpdate, Update,
    },
};

const UPDATE_COLUMNS: &str = "id, title, content, created_at";
const MARKER_COLUMNS: &str = "id, latitude, longitude, description, created_at";
const GROUP_COLUMNS: &str =
    "id, title, description, location_name, latitude, longitude, created_at";
const IMAGE_COLUMNS: &str =
    "id, group_id, marker_id, image_url, caption, display_order, created_at";

/// PostgresRepository
///
/// The production implementation of `Repository`, backed by a `PgPool`.
/// Queries are runtime-checked (`query_as::<_, T>` with binds) so the crate builds
/// without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the embedded migrations in `./migrations`.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Loads the images of several owners in one query, grouped by owner id.
    async fn images_by_owner(
        &self,
        owner_column: &'static str,
        owner_ids: &[i64],
    ) -> AppResult<HashMap<i64, Vec<Image>>> {
        if owner_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE {owner_column} = ANY($1) \
             ORDER BY display_order, created_at, id"
        );
        let images = sqlx::query_as::<_, Image>(&sql)
            .bind(owner_ids)
            .fetch_all(&self.pool)
            .await?;

        let mut grouped: HashMap<i64, Vec<Image>> = HashMap::new();
        for image in images {
            let owner = match owner_column {
                "marker_id" => image.marker_id,
                _ => image.group_id,
            };
            if let Some(owner) = owner {
                grouped.entry(owner).or_default().push(image);
            }
        }
        Ok(grouped)
    }

    async fn insert_marker_images(
        tx: &mut Transaction<'_, Postgres>,
        marker_id: i64,
        images: &[NewMarkerImage],
    ) -> AppResult<Vec<Image>> {
        let sql = format!(
            "INSERT INTO images (marker_id, image_url, caption, display_order) \
             VALUES ($1, $2, $3, $4) RETURNING {IMAGE_COLUMNS}"
        );

        let mut inserted = Vec::with_capacity(images.len());
        for (position, image) in images.iter().enumerate() {
            let row = sqlx::query_as::<_, Image>(&sql)
                .bind(marker_id)
                .bind(&image.image_url)
                .bind(&image.caption)
                .bind(position as i32)
                .fetch_one(&mut **tx)
                .await?;
            inserted.push(row);
        }
        Ok(inserted)
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- ADMIN IDENTITIES ---

    async fn find_admin_by_username(&self, username: &str) -> AppResult<Option<AdminIdentity>> {
        let admin = sqlx::query_as::<_, AdminIdentity>(
            "SELECT id, username, password_hash FROM admins WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(admin)
    }

    async fn find_first_admin(&self) -> AppResult<Option<AdminIdentity>> {
        Ok(sqlx::query_as::<_, AdminIdentity>(
            "SELECT id, username, password_hash FROM admins ORDER BY id LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?)
    }

    /// insert_admin
    ///
    /// `ON CONFLICT DO NOTHING` keeps an existing identity untouched; an empty result
    /// means the username was already taken.
    async fn insert_admin(
        &self,
        username: &str,
        password_digest: &str,
    ) -> AppResult<AdminIdentity> {
        sqlx::query_as::<_, AdminIdentity>(
            "INSERT INTO admins (username, password_hash) VALUES ($1, $2) \
             ON CONFLICT (username) DO NOTHING RETURNING id, username, password_hash",
        )
        .bind(username)
        .bind(password_digest)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::Conflict(format!("admin {username} already exists")))
    }

    // --- UPDATES ---

    async fn list_updates(&self) -> AppResult<Vec<Update>> {
        let sql = format!("SELECT {UPDATE_COLUMNS} FROM updates ORDER BY created_at DESC, id DESC");
        Ok(sqlx::query_as::<_, Update>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_update(&self, id: i64) -> AppResult<Update> {
        let sql = format!("SELECT {UPDATE_COLUMNS} FROM updates WHERE id = $1");
        sqlx::query_as::<_, Update>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::not_found("update"))
    }

    async fn create_update(&self, new: NewUpdate) -> AppResult<Update> {
        let sql = format!(
            "INSERT INTO updates (title, content) VALUES ($1, $2) RETURNING {UPDATE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Update>(&sql)
            .bind(&new.title)
            .bind(&new.content)
            .fetch_one(&self.pool)
            .await?)
    }

    /// edit_update
    ///
    /// `created_at` is never part of the SET list.
    async fn edit_update(&self, id: i64, new: NewUpdate) -> AppResult<Update> {
        let sql = format!(
            "UPDATE updates SET title = $2, content = $3 WHERE id = $1 RETURNING {UPDATE_COLUMNS}"
        );
        sqlx::query_as::<_, Update>(&sql)
            .bind(id)
            .bind(&new.title)
            .bind(&new.content)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::not_found("update"))
    }

    async fn delete_update(&self, id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM updates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        match result.rows_affected() {
            0 => Err(AppError::not_found("update")),
            _ => Ok(()),
        }
    }

    // --- DONATIONS ---

    async fn list_active_donations(&self) -> AppResult<Vec<Donation>> {
        Ok(sqlx::query_as::<_, Donation>(
            "SELECT id, title, description, contact_info, image_url, is_active, created_at \
             FROM donations WHERE is_active = TRUE ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    // --- MARKERS ---

    /// list_markers
    ///
    /// Two queries in total: the markers, then all of their images via `= ANY($1)`.
    async fn list_markers(&self) -> AppResult<Vec<Marker>> {
        let sql = format!("SELECT {MARKER_COLUMNS} FROM markers ORDER BY created_at DESC, id DESC");
        let mut markers = sqlx::query_as::<_, Marker>(&sql)
            .fetch_all(&self.pool)
            .await?;

        let ids: Vec<i64> = markers.iter().map(|m| m.id).collect();
        let mut images = self.images_by_owner("marker_id", &ids).await?;
        for marker in &mut markers {
            marker.attach_images(images.remove(&marker.id).unwrap_or_default());
        }
        Ok(markers)
    }

    async fn get_marker(&self, id: i64) -> AppResult<Marker> {
        let sql = format!("SELECT {MARKER_COLUMNS} FROM markers WHERE id = $1");
        let mut marker = sqlx::query_as::<_, Marker>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::not_found("marker"))?;

        let images = self
            .images_by_owner("marker_id", &[id])
            .await?
            .remove(&id)
            .unwrap_or_default();
        marker.attach_images(images);
        Ok(marker)
    }

    async fn create_marker(&self, new: NewMarker) -> AppResult<Marker> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO markers (latitude, longitude, description) VALUES ($1, $2, $3) \
             RETURNING {MARKER_COLUMNS}"
        );
        let mut marker = sqlx::query_as::<_, Marker>(&sql)
            .bind(new.latitude)
            .bind(new.longitude)
            .bind(&new.description)
            .fetch_one(&mut *tx)
            .await?;

        let images = Self::insert_marker_images(&mut tx, marker.id, &new.images).await?;
        marker.attach_images(images);
        tx.commit().await?;
        Ok(marker)
    }

    /// edit_marker
    ///
    /// Update row, drop old images, insert new ones; all inside one transaction.
    /// An early return drops `tx`, which rolls everything back.
    async fn edit_marker(&self, id: i64, new: NewMarker) -> AppResult<Marker> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE markers SET latitude = $2, longitude = $3, description = $4 WHERE id = $1 \
             RETURNING {MARKER_COLUMNS}"
        );
        let mut marker = sqlx::query_as::<_, Marker>(&sql)
            .bind(id)
            .bind(new.latitude)
            .bind(new.longitude)
            .bind(&new.description)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::not_found("marker"))?;

        sqlx::query("DELETE FROM images WHERE marker_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let images = Self::insert_marker_images(&mut tx, id, &new.images).await?;
        marker.attach_images(images);
        tx.commit().await?;
        Ok(marker)
    }

    async fn delete_marker(&self, id: i64) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM images WHERE marker_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM markers WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("marker"));
        }
        tx.commit().await?;
        Ok(())
    }

    // --- IMAGE GROUPS ---

    /// list_image_groups
    ///
    /// `image_count` is aggregated with a LEFT JOIN so empty groups report 0.
    async fn list_image_groups(&self) -> AppResult<Vec<ImageGroup>> {
        let mut groups = sqlx::query_as::<_, ImageGroup>(
            r#"
            SELECT g.id, g.title, g.description, g.location_name, g.latitude, g.longitude,
                   g.created_at, COUNT(i.id) AS image_count
            FROM image_groups g
            LEFT JOIN images i ON i.group_id = g.id
            GROUP BY g.id
            ORDER BY g.created_at DESC, g.id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<i64> = groups.iter().map(|g| g.id).collect();
        let mut images = self.images_by_owner("group_id", &ids).await?;
        for group in &mut groups {
            group.images = images.remove(&group.id).unwrap_or_default();
        }
        Ok(groups)
    }

    async fn get_image_group(&self, id: i64) -> AppResult<ImageGroup> {
        let sql = format!("SELECT {GROUP_COLUMNS} FROM image_groups WHERE id = $1");
        let mut group = sqlx::query_as::<_, ImageGroup>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::not_found("image group"))?;

        group.images = self
            .images_by_owner("group_id", &[id])
            .await?
            .remove(&id)
            .unwrap_or_default();
        group.image_count = group.images.len() as i64;
        Ok(group)
    }

    async fn create_image_group(&self, new: NewImageGroup) -> AppResult<ImageGroup> {
        let sql = format!(
            "INSERT INTO image_groups (title, description, location_name, latitude, longitude) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {GROUP_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, ImageGroup>(&sql)
            .bind(&new.title)
            .bind(&new.description)
            .bind(&new.location_name)
            .bind(new.latitude)
            .bind(new.longitude)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn edit_image_group(&self, id: i64, new: NewImageGroup) -> AppResult<ImageGroup> {
        let sql = format!(
            "UPDATE image_groups SET title = $2, description = $3, location_name = $4, \
             latitude = $5, longitude = $6 WHERE id = $1 RETURNING {GROUP_COLUMNS}"
        );
        sqlx::query_as::<_, ImageGroup>(&sql)
            .bind(id)
            .bind(&new.title)
            .bind(&new.description)
            .bind(&new.location_name)
            .bind(new.latitude)
            .bind(new.longitude)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::not_found("image group"))
    }

    /// delete_image_group
    ///
    /// Images first, then the group, in one transaction. Does not rely on the FK's
    /// `ON DELETE CASCADE`.
    async fn delete_image_group(&self, id: i64) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let removed_images = sqlx::query("DELETE FROM images WHERE group_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let result = sqlx::query("DELETE FROM image_groups WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("image group"));
        }
        tx.commit().await?;
        tracing::debug!(group_id = id, removed_images, "image group deleted");
        Ok(())
    }

    // --- IMAGES ---

    /// add_image
    ///
    /// Locks the owning group row (`FOR SHARE`) so a concurrent group delete cannot
    /// slip in between the existence check and the insert.
    async fn add_image(&self, new: NewImage) -> AppResult<Image> {
        let mut tx = self.pool.begin().await?;

        let group: Option<i64> =
            sqlx::query_scalar("SELECT id FROM image_groups WHERE id = $1 FOR SHARE")
                .bind(new.group_id)
                .fetch_optional(&mut *tx)
                .await?;
        if group.is_none() {
            return Err(AppError::Conflict(format!(
                "image group {} does not exist",
                new.group_id
            )));
        }

        let sql = format!(
            "INSERT INTO images (group_id, image_url, caption, display_order) \
             VALUES ($1, $2, $3, $4) RETURNING {IMAGE_COLUMNS}"
        );
        let image = sqlx::query_as::<_, Image>(&sql)
            .bind(new.group_id)
            .bind(&new.image_url)
            .bind(&new.caption)
            .bind(new.display_order)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(image)
    }

    async fn delete_image(&self, id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        match result.rows_affected() {
            0 => Err(AppError::not_found("image")),
            _ => Ok(()),
        }
    }
}
