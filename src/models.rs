use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::error::ValidationError;

pub const LATITUDE_RANGE: (f64, f64) = (-90.0, 90.0);
pub const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);

// --- Core Application Schemas (Mapped to Database) ---

/// AdminIdentity
///
/// The single privileged principal, stored in the `admins` table. Rows are provisioned
/// out-of-band; the API never creates, edits or deletes them.
#[derive(Debug, Clone, Serialize, FromRow, Default)]
pub struct AdminIdentity {
    pub id: i64,
    pub username: String,
    /// bcrypt digest (salt and cost are embedded in the string).
    #[serde(skip_serializing)]
    #[sqlx(rename = "password_hash")]
    pub password_digest: String,
}

/// Update
///
/// A news-style announcement from the `updates` table. Listed newest-first.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Update {
    pub id: i64,
    pub title: String,
    pub content: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Donation
///
/// Donation/contact channel from the `donations` table. `is_active` is a visibility
/// switch: inactive rows are never served publicly.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Donation {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub contact_info: Option<String>,
    pub image_url: Option<String>,
    pub is_active: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Image
///
/// A single image URL from the `images` table. Exactly one of `group_id` / `marker_id`
/// is set; the database enforces this with a CHECK constraint and cascades deletes
/// from either owner.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Image {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker_id: Option<i64>,
    pub image_url: String,
    pub caption: Option<String>,
    pub display_order: i32,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Sorts images into display order: `display_order`, then creation time, then id.
pub fn sort_images(images: &mut [Image]) {
    images.sort_by(|a, b| {
        a.display_order
            .cmp(&b.display_order)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

/// Marker
///
/// A geotagged point of interest from the `markers` table, with its owned images.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Marker {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub description: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    /// Url of the first image, kept for clients that read a single cover image.
    #[sqlx(skip)]
    pub image_url: Option<String>,
    // Loaded by a second query in the repository.
    #[sqlx(skip)]
    pub images: Vec<Image>,
}

impl Marker {
    /// Sets the image list (already in display order) and the derived cover url.
    pub fn attach_images(&mut self, images: Vec<Image>) {
        self.image_url = images.first().map(|image| image.image_url.clone());
        self.images = images;
    }
}

/// ImageGroup
///
/// A titled gallery from the `image_groups` table. `image_count` is aggregated over
/// the owned images rather than stored.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ImageGroup {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub location_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub image_count: i64,
    #[sqlx(skip)]
    pub images: Vec<Image>,
}

// --- Request Payloads (Input Schemas) ---
//
// Every field is optional at the wire level so that absence is reported as a
// `ValidationError::Missing` instead of a generic deserialization failure.

/// LoginRequest
///
/// Credential exchange payload (POST /api/admin/login).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl LoginRequest {
    pub fn validate(self) -> Result<(String, String), ValidationError> {
        let username = required_text("username", self.username)?;
        // Passwords are compared verbatim, so only emptiness is checked.
        let password = match self.password {
            Some(p) if !p.is_empty() => p,
            _ => return Err(ValidationError::Missing { field: "password" }),
        };
        Ok((username, password))
    }
}

/// LoginResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
}

/// UpdateInput
///
/// Payload for creating or editing an Update.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateInput {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUpdate {
    pub(crate) title: String,
    pub(crate) content: String,
}

impl UpdateInput {
    pub fn validate(self) -> Result<NewUpdate, ValidationError> {
        Ok(NewUpdate {
            title: required_text("title", self.title)?,
            content: required_text("content", self.content)?,
        })
    }
}

/// MarkerImageInput
///
/// One entry of a marker's image list.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MarkerImageInput {
    pub image_url: Option<String>,
    pub caption: Option<String>,
}

/// MarkerInput
///
/// Payload for creating or editing a Marker. Coordinates accept JSON numbers or
/// numeric strings (HTML form values). `images` replaces the whole image list;
/// the legacy single `image_url` is stored as the first image.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MarkerInput {
    #[serde(default, deserialize_with = "coordinate")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "coordinate")]
    pub longitude: Option<f64>,
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<MarkerImageInput>>,
}

#[derive(Debug, Clone)]
pub struct NewMarkerImage {
    pub(crate) image_url: String,
    pub(crate) caption: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewMarker {
    pub(crate) latitude: f64,
    pub(crate) longitude: f64,
    pub(crate) description: String,
    /// In display order; position becomes `display_order`.
    pub(crate) images: Vec<NewMarkerImage>,
}

impl MarkerInput {
    pub fn validate(self) -> Result<NewMarker, ValidationError> {
        let latitude = required_coordinate("latitude", self.latitude, LATITUDE_RANGE)?;
        let longitude = required_coordinate("longitude", self.longitude, LONGITUDE_RANGE)?;
        let description = required_text("description", self.description)?;

        let mut images = Vec::new();
        if let Some(url) = optional_text(self.image_url) {
            images.push(NewMarkerImage {
                image_url: url,
                caption: None,
            });
        }
        for entry in self.images.unwrap_or_default() {
            images.push(NewMarkerImage {
                image_url: required_text("images.image_url", entry.image_url)?,
                caption: optional_text(entry.caption),
            });
        }

        Ok(NewMarker {
            latitude,
            longitude,
            description,
            images,
        })
    }
}

/// ImageGroupInput
///
/// Payload for creating or editing an ImageGroup. Only `title` is required;
/// coordinates are optional but must be supplied together and in range.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ImageGroupInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location_name: Option<String>,
    #[serde(default, deserialize_with = "coordinate")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "coordinate")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewImageGroup {
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) location_name: Option<String>,
    pub(crate) latitude: Option<f64>,
    pub(crate) longitude: Option<f64>,
}

impl ImageGroupInput {
    pub fn validate(self) -> Result<NewImageGroup, ValidationError> {
        let title = required_text("title", self.title)?;
        let (latitude, longitude) = match (self.latitude, self.longitude) {
            (None, None) => (None, None),
            (Some(_), None) => return Err(ValidationError::Missing { field: "longitude" }),
            (None, Some(_)) => return Err(ValidationError::Missing { field: "latitude" }),
            (lat, lng) => (
                Some(required_coordinate("latitude", lat, LATITUDE_RANGE)?),
                Some(required_coordinate("longitude", lng, LONGITUDE_RANGE)?),
            ),
        };

        Ok(NewImageGroup {
            title,
            description: optional_text(self.description),
            location_name: optional_text(self.location_name),
            latitude,
            longitude,
        })
    }
}

/// ImageInput
///
/// Payload for attaching an image URL to an existing group (POST /api/admin/image).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ImageInput {
    pub group_id: Option<i64>,
    pub image_url: Option<String>,
    pub caption: Option<String>,
    pub display_order: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewImage {
    pub(crate) group_id: i64,
    pub(crate) image_url: String,
    pub(crate) caption: Option<String>,
    pub(crate) display_order: i32,
}

impl ImageInput {
    pub fn validate(self) -> Result<NewImage, ValidationError> {
        let group_id = self
            .group_id
            .ok_or(ValidationError::Missing { field: "group_id" })?;
        Ok(NewImage {
            group_id,
            image_url: required_text("image_url", self.image_url)?,
            caption: optional_text(self.caption),
            display_order: self.display_order.unwrap_or(0),
        })
    }
}

// --- Response Payloads ---

/// CreatedResponse
///
/// Returned by every admin create operation.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreatedResponse {
    pub id: i64,
    pub message: String,
}

/// MessageResponse
///
/// Returned by admin edit and delete operations.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

// --- Validation helpers ---

fn required_text(field: &'static str, value: Option<String>) -> Result<String, ValidationError> {
    optional_text(value).ok_or(ValidationError::Missing { field })
}

/// Trims and drops blank strings.
fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required_coordinate(
    field: &'static str,
    value: Option<f64>,
    (min, max): (f64, f64),
) -> Result<f64, ValidationError> {
    let value = value.ok_or(ValidationError::Missing { field })?;
    // NaN and infinities fail the containment check.
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::OutOfRange { field, min, max })
    }
}

/// Accepts a JSON number, a numeric string, an empty string or null.
fn coordinate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid coordinate: {s}"))),
    }
}
