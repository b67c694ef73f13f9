//! Defines routes for the image gallery API.
//!
//! ## Structure
//! - **Images**
//!   - `GET  /images`                 — list all images (summary)
//!   - `GET  /images/with-location`   — list geotagged images
//!   - `POST /upload`                 — multipart upload
//!   - `GET  /image/{id}`             — raw image bytes
//!   - `POST /image/{id}/like`        — like once per caller address
//!
//! - **Location**
//!   - `GET  /get-location-details`   — reverse geocode `?lat=&lon=`
//!
//! - **Probes**: `GET /healthz`, `GET /readyz`

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        image_handlers::{
            get_image, like_image, list_images, list_images_with_location, upload_image,
        },
        location_handlers::get_location_details,
    },
    services::gallery_service::GalleryService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Method, header},
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// The gallery front end is served from a different origin.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
        .allow_origin(Any)
}

/// Build the router for all gallery routes.
///
/// `max_upload_bytes` bounds the request body of `POST /upload`.
pub fn routes(max_upload_bytes: usize) -> Router<GalleryService> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/images", get(list_images))
        .route("/images/with-location", get(list_images_with_location))
        .route(
            "/upload",
            post(upload_image).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/image/{id}", get(get_image))
        .route("/image/{id}/like", post(like_image))
        .route("/get-location-details", get(get_location_details))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}
