//! src/services/gallery_service.rs
//!
//! GalleryService — the image gallery operations. Metadata (uploader, likes,
//! location) lives in SQLite; payloads live in the [`BlobStore`]; addresses
//! come from the [`Geocoder`]. Handlers only parse input and render output.

use crate::{
    models::{
        image::{GeotaggedImage, ImageRecord, ImageSummary, NewImage, UploadForm},
        location::{GeoPoint, LocationDetails, Proximity},
    },
    services::{blob_store::BlobStore, geocoder::Geocoder},
};
use bytes::Bytes;
use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::{io, sync::Arc};
use thiserror::Error;
use tokio::fs::File;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("{0}")]
    Validation(String),
    #[error("image `{0}` not found")]
    ImageNotFound(String),
    #[error("could not retrieve location details")]
    LocationNotFound,
    #[error("you have already liked this image")]
    AlreadyLiked,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type GalleryResult<T> = Result<T, GalleryError>;

/// Treat missing, empty and whitespace-only form values alike.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Validate an upload form.
///
/// Coordinates are only considered when both are supplied; a lone latitude
/// or longitude is ignored.
pub fn validate_upload(form: UploadForm) -> GalleryResult<(NewImage, Bytes)> {
    let image = form
        .image
        .ok_or_else(|| GalleryError::Validation("No image file found".into()))?;

    let (Some(username), Some(email)) = (present(form.username), present(form.email)) else {
        return Err(GalleryError::Validation(
            "Username and email are required".into(),
        ));
    };

    let location = match (present(form.latitude), present(form.longitude)) {
        (Some(lat), Some(lon)) => Some(GeoPoint::parse(&lat, &lon).ok_or_else(|| {
            GalleryError::Validation("Invalid geolocation coordinates".into())
        })?),
        _ => None,
    };

    let new = NewImage {
        filename: image.filename.unwrap_or_else(|| "unnamed".into()),
        content_type: image.content_type,
        username,
        email,
        location,
    };
    Ok((new, image.data))
}

/// Validate the `lat`/`lon` pair of a standalone lookup.
pub fn parse_lookup_point(lat: Option<String>, lon: Option<String>) -> GalleryResult<GeoPoint> {
    let (Some(lat), Some(lon)) = (present(lat), present(lon)) else {
        return Err(GalleryError::Validation(
            "Latitude and longitude are required".into(),
        ));
    };
    GeoPoint::parse(&lat, &lon)
        .ok_or_else(|| GalleryError::Validation("Invalid geolocation coordinates".into()))
}

/// Validate an optional radius filter. All three values or none.
pub fn parse_proximity(
    near_lat: Option<String>,
    near_lon: Option<String>,
    radius_km: Option<String>,
) -> GalleryResult<Option<Proximity>> {
    match (present(near_lat), present(near_lon), present(radius_km)) {
        (None, None, None) => Ok(None),
        (Some(lat), Some(lon), Some(radius)) => {
            let center = GeoPoint::parse(&lat, &lon).ok_or_else(|| {
                GalleryError::Validation("Invalid geolocation coordinates".into())
            })?;
            let near = radius
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(|r| Proximity::new(center, r))
                .ok_or_else(|| {
                    GalleryError::Validation("radius_km must be a positive number".into())
                })?;
            Ok(Some(near))
        }
        _ => Err(GalleryError::Validation(
            "near_lat, near_lon and radius_km must be supplied together".into(),
        )),
    }
}

const IMAGE_SELECT: &str = "SELECT id, filename, content_type, size_bytes, etag, username, email, \
     latitude, longitude, district, state, country, city, postcode, uploaded_at, \
     (SELECT COUNT(*) FROM image_likes l WHERE l.image_id = images.id) AS likes \
     FROM images";

#[derive(Clone)]
pub struct GalleryService {
    /// Shared SQLite pool used for image metadata and likes.
    pub db: Arc<SqlitePool>,

    pub blobs: BlobStore,

    pub geocoder: Geocoder,
}

impl GalleryService {
    pub fn new(db: Arc<SqlitePool>, blobs: BlobStore, geocoder: Geocoder) -> Self {
        Self {
            db,
            blobs,
            geocoder,
        }
    }

    /// Ids arrive as path segments; anything that is not a UUID cannot exist.
    fn parse_id(id: &str) -> GalleryResult<Uuid> {
        Uuid::parse_str(id).map_err(|_| GalleryError::ImageNotFound(id.to_string()))
    }

    async fn fetch_image(&self, id: Uuid) -> GalleryResult<ImageRecord> {
        sqlx::query_as::<_, ImageRecord>(&format!("{IMAGE_SELECT} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&*self.db)
            .await?
            .ok_or_else(|| GalleryError::ImageNotFound(id.to_string()))
    }

    /// Every stored image, oldest first.
    pub async fn list_images(&self) -> GalleryResult<Vec<ImageSummary>> {
        let rows = sqlx::query_as::<_, ImageRecord>(&format!(
            "{IMAGE_SELECT} ORDER BY uploaded_at ASC, rowid ASC"
        ))
        .fetch_all(&*self.db)
        .await?;

        Ok(rows.iter().map(ImageSummary::from).collect())
    }

    /// Images that carry a location, optionally restricted to a radius.
    ///
    /// The bounding box of the radius is matched against the location index
    /// first; exact great-circle distance is checked afterwards.
    pub async fn list_geotagged(
        &self,
        near: Option<Proximity>,
    ) -> GalleryResult<Vec<GeotaggedImage>> {
        let mut builder = QueryBuilder::<Sqlite>::new(IMAGE_SELECT);
        builder.push(" WHERE latitude IS NOT NULL AND longitude IS NOT NULL");

        if let Some(near) = &near {
            let bbox = near.bounding_box();
            builder.push(" AND latitude BETWEEN ");
            builder.push_bind(bbox.min_lat);
            builder.push(" AND ");
            builder.push_bind(bbox.max_lat);
            builder.push(" AND longitude BETWEEN ");
            builder.push_bind(bbox.min_lon);
            builder.push(" AND ");
            builder.push_bind(bbox.max_lon);
        }

        builder.push(" ORDER BY uploaded_at ASC, rowid ASC");

        let rows: Vec<ImageRecord> = builder.build_query_as().fetch_all(&*self.db).await?;

        Ok(rows
            .iter()
            .filter(|rec| match (&near, rec.location()) {
                (Some(near), Some(point)) => near.contains(&point),
                _ => true,
            })
            .map(GeotaggedImage::from)
            .collect())
    }

    /// Store a new image.
    ///
    /// The payload is written first, then the metadata row. If the row
    /// cannot be inserted the payload is removed again. A failed address
    /// lookup only leaves `location_details` empty.
    pub async fn upload_image(&self, new: NewImage, data: Bytes) -> GalleryResult<ImageRecord> {
        let id = Uuid::new_v4();
        let stored = self.blobs.write_bytes(&id, data).await?;

        let details = match new.location {
            Some(point) => {
                let details = self.geocoder.reverse(point).await;
                if details.is_none() {
                    warn!("No location details for image {}", id);
                }
                details
            }
            None => None,
        };

        let record = ImageRecord {
            id,
            filename: new.filename,
            content_type: new.content_type,
            size_bytes: stored.size_bytes,
            etag: Some(stored.etag),
            username: new.username,
            email: new.email,
            latitude: new.location.map(|p| p.latitude()),
            longitude: new.location.map(|p| p.longitude()),
            district: details.as_ref().map(|d| d.district.clone()),
            state: details.as_ref().map(|d| d.state.clone()),
            country: details.as_ref().map(|d| d.country.clone()),
            city: details.as_ref().map(|d| d.city.clone()),
            postcode: details.as_ref().map(|d| d.postcode.clone()),
            uploaded_at: Utc::now(),
            likes: 0,
        };

        let insert_result = sqlx::query(
            r#"
            INSERT INTO images (
                id, filename, content_type, size_bytes, etag, username, email,
                latitude, longitude, district, state, country, city, postcode,
                uploaded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id)
        .bind(&record.filename)
        .bind(&record.content_type)
        .bind(record.size_bytes)
        .bind(&record.etag)
        .bind(&record.username)
        .bind(&record.email)
        .bind(record.latitude)
        .bind(record.longitude)
        .bind(&record.district)
        .bind(&record.state)
        .bind(&record.country)
        .bind(&record.city)
        .bind(&record.postcode)
        .bind(record.uploaded_at)
        .execute(&*self.db)
        .await;

        if let Err(err) = insert_result {
            if let Err(cleanup) = self.blobs.remove(&id).await {
                warn!("Could not remove orphaned blob {}: {}", id, cleanup);
            }
            return Err(GalleryError::Sqlx(err));
        }

        info!(
            "Stored image {} ({} bytes) for {}",
            id, record.size_bytes, record.username
        );
        Ok(record)
    }

    /// Metadata and an open payload handle for streaming out.
    pub async fn get_image(&self, id: &str) -> GalleryResult<(ImageRecord, File)> {
        let id = Self::parse_id(id)?;
        let record = self.fetch_image(id).await?;
        let file = self
            .blobs
            .open(&id)
            .await?
            .ok_or_else(|| GalleryError::ImageNotFound(id.to_string()))?;
        Ok((record, file))
    }

    /// Record a like from `liker` and return the new like count.
    ///
    /// The duplicate check and the write are one conditional insert, so
    /// concurrent requests from the same liker count once.
    pub async fn like_image(&self, id: &str, liker: &str) -> GalleryResult<i64> {
        let id = Self::parse_id(id)?;
        self.fetch_image(id).await?;

        let result = sqlx::query(
            "INSERT INTO image_likes (image_id, liker, liked_at) VALUES (?, ?, ?)
             ON CONFLICT (image_id, liker) DO NOTHING",
        )
        .bind(id)
        .bind(liker)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(GalleryError::AlreadyLiked);
        }

        let likes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM image_likes WHERE image_id = ?")
            .bind(id)
            .fetch_one(&*self.db)
            .await?;
        Ok(likes)
    }

    /// Standalone address lookup.
    pub async fn resolve_location(&self, point: GeoPoint) -> GalleryResult<LocationDetails> {
        self.geocoder
            .reverse(point)
            .await
            .ok_or(GalleryError::LocationNotFound)
    }
}
