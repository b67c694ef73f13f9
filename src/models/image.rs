//! Represents an uploaded image and the JSON views rendered from it.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::location::{GeoPoint, LocationDetails};

/// One row of the `images` table joined with its like count.
///
/// The binary payload lives in the blob store under the same `id`;
/// this struct only carries metadata.
#[derive(Clone, FromRow, Debug)]
pub struct ImageRecord {
    /// Identifier assigned at upload, shared with the blob store.
    pub id: Uuid,

    /// Original client-supplied filename.
    pub filename: String,

    /// MIME type reported by the uploading client, if any.
    pub content_type: Option<String>,

    /// Size of the stored payload in bytes.
    pub size_bytes: i64,

    /// MD5 of the payload, hex encoded.
    pub etag: Option<String>,

    pub username: String,
    pub email: String,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    pub district: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub postcode: Option<String>,

    /// When the upload completed.
    pub uploaded_at: DateTime<Utc>,

    /// Number of distinct likers.
    pub likes: i64,
}

impl ImageRecord {
    /// GeoJSON point, present only when both coordinates were stored.
    pub fn location(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        }
    }

    /// Resolved address, present only when geocoding succeeded at upload.
    pub fn location_details(&self) -> Option<LocationDetails> {
        // All five columns are written together; `district` stands in for the set.
        self.district.as_ref()?;
        Some(LocationDetails {
            district: self.district.clone().unwrap_or_else(LocationDetails::unknown),
            state: self.state.clone().unwrap_or_else(LocationDetails::unknown),
            country: self.country.clone().unwrap_or_else(LocationDetails::unknown),
            city: self.city.clone().unwrap_or_else(LocationDetails::unknown),
            postcode: self.postcode.clone().unwrap_or_else(LocationDetails::unknown),
        })
    }
}

/// Summary returned by `GET /images`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImageSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Like count, not the liker list.
    pub likes: i64,
    pub location: Option<GeoPoint>,
}

impl From<&ImageRecord> for ImageSummary {
    fn from(record: &ImageRecord) -> Self {
        Self {
            id: record.id,
            username: record.username.clone(),
            email: record.email.clone(),
            likes: record.likes,
            location: record.location(),
        }
    }
}

/// Entry returned by `GET /images/with-location`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GeotaggedImage {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub likes: i64,
    pub location: Option<GeoPoint>,
    pub location_details: Option<LocationDetails>,
}

impl From<&ImageRecord> for GeotaggedImage {
    fn from(record: &ImageRecord) -> Self {
        Self {
            id: record.id,
            username: record.username.clone(),
            email: record.email.clone(),
            likes: record.likes,
            location: record.location(),
            location_details: record.location_details(),
        }
    }
}

/// File part of an upload form.
#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Raw upload form as read from multipart, before validation.
#[derive(Clone, Debug, Default)]
pub struct UploadForm {
    pub image: Option<UploadedFile>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

/// Validated input for a new upload.
#[derive(Clone, Debug)]
pub struct NewImage {
    pub filename: String,
    pub content_type: Option<String>,
    pub username: String,
    pub email: String,
    pub location: Option<GeoPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ImageRecord {
        ImageRecord {
            id: Uuid::new_v4(),
            filename: "cat.jpg".into(),
            content_type: Some("image/jpeg".into()),
            size_bytes: 3,
            etag: None,
            username: "alice".into(),
            email: "a@x.com".into(),
            latitude: None,
            longitude: None,
            district: None,
            state: None,
            country: None,
            city: None,
            postcode: None,
            uploaded_at: Utc::now(),
            likes: 2,
        }
    }

    #[test]
    fn record_without_coordinates_has_no_location() {
        let rec = record();
        assert!(rec.location().is_none());
        assert!(rec.location_details().is_none());

        let summary = ImageSummary::from(&rec);
        assert_eq!(summary.likes, 2);
        assert!(summary.location.is_none());
    }

    #[test]
    fn details_fill_missing_columns_with_unknown() {
        let mut rec = record();
        rec.latitude = Some(13.05);
        rec.longitude = Some(80.25);
        rec.district = Some("Chennai".into());
        rec.country = Some("India".into());

        let details = rec.location_details().unwrap();
        assert_eq!(details.district, "Chennai");
        assert_eq!(details.country, "India");
        assert_eq!(details.state, "Unknown");
        assert_eq!(details.postcode, "Unknown");

        let view = GeotaggedImage::from(&rec);
        assert_eq!(view.location, Some(GeoPoint::new(13.05, 80.25)));
    }
}
