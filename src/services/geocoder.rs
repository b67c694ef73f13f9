//! Reverse-geocoding client for a Nominatim-compatible API.
//!
//! Lookups never fail loudly: any transport, status or decoding problem is
//! logged and reported as `None`, and callers treat that as "no address".

use crate::models::location::{GeoPoint, LocationDetails};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    /// Base URL of the provider, without trailing `/reverse`.
    pub base_url: String,
    /// Fixed client tag sent as `User-Agent`; Nominatim rejects anonymous clients.
    pub user_agent: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Geocoder {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    address: Option<Address>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Address {
    county: Option<String>,
    state: Option<String>,
    country: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    postcode: Option<String>,
}

impl From<Address> for LocationDetails {
    fn from(addr: Address) -> Self {
        let city = addr.city.or(addr.town).or(addr.village);
        Self {
            district: addr.county.unwrap_or_else(LocationDetails::unknown),
            state: addr.state.unwrap_or_else(LocationDetails::unknown),
            country: addr.country.unwrap_or_else(LocationDetails::unknown),
            city: city.unwrap_or_else(LocationDetails::unknown),
            postcode: addr.postcode.unwrap_or_else(LocationDetails::unknown),
        }
    }
}

impl Geocoder {
    pub fn new(config: GeocoderConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Resolve a point to an address breakdown.
    #[instrument(skip(self), fields(lat = point.latitude(), lon = point.longitude()))]
    pub async fn reverse(&self, point: GeoPoint) -> Option<LocationDetails> {
        let url = format!("{}/reverse", self.base_url);
        let lat = point.latitude().to_string();
        let lon = point.longitude().to_string();
        debug!("Reverse geocoding via {}", url);

        let response = match self
            .client
            .get(&url)
            .query(&[
                ("format", "jsonv2"),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("addressdetails", "1"),
            ])
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) => {
                warn!("Location lookup error: {}", err);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("Location lookup returned status {}", response.status());
            return None;
        }

        let body: ReverseResponse = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                warn!("Location lookup returned an unreadable body: {}", err);
                return None;
            }
        };

        if let Some(err) = body.error {
            warn!("Location lookup failed: {}", err);
            return None;
        }

        body.address.map(LocationDetails::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn geocoder(base_url: String) -> Geocoder {
        Geocoder::new(GeocoderConfig {
            base_url,
            user_agent: "image_upload_app".into(),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn maps_address_fields_and_sends_client_tag() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/reverse")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("format".into(), "jsonv2".into()),
                Matcher::UrlEncoded("lat".into(), "13.05".into()),
                Matcher::UrlEncoded("lon".into(), "80.25".into()),
            ]))
            .match_header("user-agent", "image_upload_app")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"display_name":"Chennai","address":{
                    "county":"Chennai District","state":"Tamil Nadu",
                    "country":"India","town":"Mylapore","postcode":"600004"}}"#,
            )
            .create_async()
            .await;

        let details = geocoder(server.url())
            .reverse(GeoPoint::new(13.05, 80.25))
            .await
            .expect("address resolved");

        mock.assert_async().await;
        assert_eq!(details.district, "Chennai District");
        assert_eq!(details.state, "Tamil Nadu");
        assert_eq!(details.country, "India");
        assert_eq!(details.city, "Mylapore");
        assert_eq!(details.postcode, "600004");
    }

    #[tokio::test]
    async fn missing_fields_default_to_unknown() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/reverse")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"address":{"country":"Antarctica"}}"#)
            .create_async()
            .await;

        let details = geocoder(server.url())
            .reverse(GeoPoint::new(-80.0, 0.0))
            .await
            .unwrap();
        assert_eq!(details.country, "Antarctica");
        assert_eq!(details.city, "Unknown");
        assert_eq!(details.district, "Unknown");
    }

    #[tokio::test]
    async fn provider_error_is_no_result() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/reverse")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"error":"Unable to geocode"}"#)
            .create_async()
            .await;

        assert!(
            geocoder(server.url())
                .reverse(GeoPoint::new(0.0, 0.0))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn server_failure_and_garbage_are_no_result() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/reverse")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;
        assert!(
            geocoder(server.url())
                .reverse(GeoPoint::new(1.0, 1.0))
                .await
                .is_none()
        );

        let mut server = Server::new_async().await;
        server
            .mock("GET", "/reverse")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>rate limited</html>")
            .create_async()
            .await;
        assert!(
            geocoder(server.url())
                .reverse(GeoPoint::new(1.0, 1.0))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn unreachable_provider_is_no_result() {
        // Nothing listens on the discard port.
        let details = geocoder("http://127.0.0.1:9".into())
            .reverse(GeoPoint::new(1.0, 1.0))
            .await;
        assert!(details.is_none());
    }

    #[tokio::test]
    async fn stalled_provider_times_out_as_no_result() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stall = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let geocoder = Geocoder::new(GeocoderConfig {
            base_url: format!("http://{}", addr),
            user_agent: "image_upload_app".into(),
            timeout: Duration::from_millis(300),
        })
        .unwrap();

        let started = std::time::Instant::now();
        let details = geocoder.reverse(GeoPoint::new(13.05, 80.25)).await;
        let elapsed = started.elapsed();
        stall.abort();

        assert!(details.is_none());
        assert!(elapsed >= Duration::from_millis(250), "returned after {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "returned after {:?}", elapsed);
    }
}
