//! Geographic types: GeoJSON points, resolved addresses and radius searches.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres (IUGG).
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

const UNKNOWN: &str = "Unknown";

/// A GeoJSON `Point`. Coordinates are stored `[longitude, latitude]`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(tag = "type", rename = "Point")]
pub struct GeoPoint {
    pub coordinates: [f64; 2],
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            coordinates: [longitude, latitude],
        }
    }

    pub fn latitude(&self) -> f64 {
        self.coordinates[1]
    }

    pub fn longitude(&self) -> f64 {
        self.coordinates[0]
    }

    /// Build a point from raw latitude/longitude, rejecting non-finite or
    /// out-of-range values.
    pub fn checked(latitude: f64, longitude: f64) -> Option<Self> {
        let lat_ok = latitude.is_finite() && (-90.0..=90.0).contains(&latitude);
        let lon_ok = longitude.is_finite() && (-180.0..=180.0).contains(&longitude);
        (lat_ok && lon_ok).then(|| Self::new(latitude, longitude))
    }

    /// Parse decimal strings as sent in upload forms.
    pub fn parse(latitude: &str, longitude: &str) -> Option<Self> {
        let lat = latitude.trim().parse::<f64>().ok()?;
        let lon = longitude.trim().parse::<f64>().ok()?;
        Self::checked(lat, lon)
    }

    /// Great-circle distance to `other` in kilometres (haversine).
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.latitude().to_radians(), other.latitude().to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.longitude() - self.longitude()).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// Human-readable address produced by reverse geocoding.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LocationDetails {
    pub district: String,
    pub state: String,
    pub country: String,
    pub city: String,
    pub postcode: String,
}

impl LocationDetails {
    /// Placeholder for fields the provider did not return.
    pub fn unknown() -> String {
        UNKNOWN.to_string()
    }
}

/// A radius search around a centre point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Proximity {
    pub center: GeoPoint,
    pub radius_km: f64,
}

/// Latitude/longitude rectangle enclosing a [`Proximity`] circle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Proximity {
    pub fn new(center: GeoPoint, radius_km: f64) -> Option<Self> {
        (radius_km.is_finite() && radius_km > 0.0).then_some(Self { center, radius_km })
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.center.distance_km(point) <= self.radius_km
    }

    /// Conservative rectangle used to prefilter rows on the location index.
    /// Falls back to the full longitude range near the poles or when the
    /// circle crosses the antimeridian.
    pub fn bounding_box(&self) -> BoundingBox {
        let lat = self.center.latitude();
        let lon = self.center.longitude();
        let d_lat = (self.radius_km / EARTH_RADIUS_KM).to_degrees();

        let min_lat = (lat - d_lat).max(-90.0);
        let max_lat = (lat + d_lat).min(90.0);

        let widest = lat.abs().max(min_lat.abs()).max(max_lat.abs());
        if widest >= 89.0 {
            return BoundingBox {
                min_lat,
                max_lat,
                min_lon: -180.0,
                max_lon: 180.0,
            };
        }

        let d_lon = d_lat / widest.to_radians().cos();
        if lon - d_lon < -180.0 || lon + d_lon > 180.0 {
            return BoundingBox {
                min_lat,
                max_lat,
                min_lon: -180.0,
                max_lon: 180.0,
            };
        }

        BoundingBox {
            min_lat,
            max_lat,
            min_lon: lon - d_lon,
            max_lon: lon + d_lon,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_serializes_as_geojson() {
        let point = GeoPoint::new(13.05, 80.25);
        let json = serde_json::to_value(point).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "Point", "coordinates": [80.25, 13.05]})
        );

        let back: GeoPoint = serde_json::from_value(json).unwrap();
        assert_eq!(back.latitude(), 13.05);
        assert_eq!(back.longitude(), 80.25);
    }

    #[test]
    fn parse_rejects_garbage_and_out_of_range() {
        assert!(GeoPoint::parse(" 13.05", "80.25 ").is_some());
        assert!(GeoPoint::parse("north", "80.25").is_none());
        assert!(GeoPoint::parse("13.05", "").is_none());
        assert!(GeoPoint::parse("91", "0").is_none());
        assert!(GeoPoint::parse("0", "-180.5").is_none());
        assert!(GeoPoint::parse("NaN", "0").is_none());
        assert!(GeoPoint::parse("inf", "0").is_none());
    }

    #[test]
    fn haversine_matches_known_distance() {
        // Chennai to Bengaluru, roughly 290 km.
        let chennai = GeoPoint::new(13.0827, 80.2707);
        let bengaluru = GeoPoint::new(12.9716, 77.5946);
        let d = chennai.distance_km(&bengaluru);
        assert!((280.0..300.0).contains(&d), "distance was {d}");
        assert_eq!(chennai.distance_km(&chennai), 0.0);
    }

    #[test]
    fn proximity_rejects_non_positive_radius() {
        let center = GeoPoint::new(0.0, 0.0);
        assert!(Proximity::new(center, 0.0).is_none());
        assert!(Proximity::new(center, -1.0).is_none());
        assert!(Proximity::new(center, f64::NAN).is_none());
        assert!(Proximity::new(center, 10.0).is_some());
    }

    #[test]
    fn bounding_box_encloses_circle() {
        let near = Proximity::new(GeoPoint::new(13.05, 80.25), 50.0).unwrap();
        let bbox = near.bounding_box();
        assert!(bbox.min_lat < 13.05 && bbox.max_lat > 13.05);
        assert!(bbox.min_lon < 80.25 && bbox.max_lon > 80.25);

        // A point just inside the radius must also be inside the box.
        let inside = GeoPoint::new(13.05 + 0.4, 80.25);
        assert!(near.contains(&inside));
        assert!(inside.latitude() <= bbox.max_lat);
    }

    #[test]
    fn bounding_box_widens_across_antimeridian() {
        let near = Proximity::new(GeoPoint::new(0.0, 179.9), 100.0).unwrap();
        let bbox = near.bounding_box();
        assert_eq!(bbox.min_lon, -180.0);
        assert_eq!(bbox.max_lon, 180.0);
    }
}
