//! HTTP handlers for image upload, retrieval, likes and listings.
//! Image bodies are streamed back from disk; everything else is JSON.

use crate::{
    errors::AppError,
    models::{
        image::{GeotaggedImage, ImageRecord, ImageSummary, UploadForm, UploadedFile},
        location::{GeoPoint, LocationDetails},
    },
    services::gallery_service::{GalleryService, parse_proximity, validate_upload},
};
use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, Multipart, Path, Query, State, multipart::MultipartRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

/// Served when the uploader did not report an image content type.
const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// Optional radius filter for `GET /images/with-location`.
#[derive(Debug, Deserialize)]
pub struct NearQuery {
    pub near_lat: Option<String>,
    pub near_lon: Option<String>,
    pub radius_km: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub location: Option<GeoPoint>,
    pub location_details: Option<LocationDetails>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LikeResponse {
    pub message: String,
    pub likes: i64,
}

/// `GET /images` — every image, summarized.
pub async fn list_images(
    State(service): State<GalleryService>,
) -> Result<Json<Vec<ImageSummary>>, AppError> {
    Ok(Json(service.list_images().await?))
}

/// `POST /upload` — multipart upload with `image`, `username`, `email`
/// and optional `latitude`/`longitude`.
///
/// The whole form is read and validated before anything is stored.
pub async fn upload_image(
    State(service): State<GalleryService>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, AppError> {
    let mut multipart =
        multipart.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;

    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await?;
                form.image = Some(UploadedFile {
                    filename,
                    content_type,
                    data,
                });
            }
            "username" => form.username = Some(field.text().await?),
            "email" => form.email = Some(field.text().await?),
            "latitude" => form.latitude = Some(field.text().await?),
            "longitude" => form.longitude = Some(field.text().await?),
            other => debug!("ignoring form field `{}`", other),
        }
    }

    let (new, data) = validate_upload(form)?;
    let record = service.upload_image(new, data).await?;

    let body = UploadResponse {
        message: "Image uploaded successfully".into(),
        id: record.id,
        location: record.location(),
        location_details: record.location_details(),
        username: record.username,
        email: record.email,
    };
    Ok((StatusCode::CREATED, Json(body)))
}

/// `GET /image/{id}` — raw image bytes as a streaming response.
pub async fn get_image(
    State(service): State<GalleryService>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let (meta, file) = service.get_image(&id).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_image_headers(response.headers_mut(), &meta);
    Ok(response)
}

/// `POST /image/{id}/like` — like an image once per caller address.
pub async fn like_image(
    State(service): State<GalleryService>,
    Path(id): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Json<LikeResponse>, AppError> {
    // IPv4 peers on a dual-stack listener arrive as `::ffff:a.b.c.d`.
    let liker = addr.ip().to_canonical().to_string();
    let likes = service.like_image(&id, &liker).await?;
    Ok(Json(LikeResponse {
        message: "Image liked successfully".into(),
        likes,
    }))
}

/// `GET /images/with-location` — geotagged images, optionally within
/// `radius_km` of `near_lat`/`near_lon`.
pub async fn list_images_with_location(
    State(service): State<GalleryService>,
    Query(q): Query<NearQuery>,
) -> Result<Json<Vec<GeotaggedImage>>, AppError> {
    let near = parse_proximity(q.near_lat, q.near_lon, q.radius_km)?;
    Ok(Json(service.list_geotagged(near).await?))
}

/// Only `image/*` types are echoed back; anything else the uploader
/// declared is served as the default image type.
fn image_content_type(declared: Option<&str>) -> HeaderValue {
    declared
        .filter(|v| {
            v.get(..6)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
        })
        .and_then(|v| HeaderValue::from_str(v).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE))
}

fn set_image_headers(headers: &mut HeaderMap, meta: &ImageRecord) {
    headers.insert(
        header::CONTENT_TYPE,
        image_content_type(meta.content_type.as_deref()),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&meta.size_bytes.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    if let Some(etag) = meta.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            headers.insert(header::ETAG, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_image_types_are_echoed() {
        assert_eq!(image_content_type(Some("image/png")), "image/png");
        assert_eq!(image_content_type(Some("IMAGE/WebP")), "IMAGE/WebP");
        assert_eq!(image_content_type(Some("text/html")), DEFAULT_CONTENT_TYPE);
        assert_eq!(
            image_content_type(Some("application/xhtml+xml")),
            DEFAULT_CONTENT_TYPE
        );
        assert_eq!(image_content_type(Some("imag")), DEFAULT_CONTENT_TYPE);
        assert_eq!(image_content_type(None), DEFAULT_CONTENT_TYPE);
    }
}
