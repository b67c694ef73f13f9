//! Standalone reverse-geocoding endpoint.

use crate::{
    errors::AppError,
    models::location::LocationDetails,
    services::gallery_service::{GalleryService, parse_lookup_point},
};
use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    pub lat: Option<String>,
    pub lon: Option<String>,
}

/// `GET /get-location-details?lat=&lon=`
pub async fn get_location_details(
    State(service): State<GalleryService>,
    Query(q): Query<LocationQuery>,
) -> Result<Json<LocationDetails>, AppError> {
    let point = parse_lookup_point(q.lat, q.lon)?;
    Ok(Json(service.resolve_location(point).await?))
}
