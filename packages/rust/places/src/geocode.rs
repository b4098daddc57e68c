//! Geocoding: postal address in, one coordinate pair (or a reason) out.

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use adventuremap_shared::Coordinates;

use crate::location_of;

/// Why an address could not be geocoded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeocodeFailure {
    #[error("Google Maps API key is not configured")]
    MissingApiKey,

    /// Network failure or non-success HTTP status.
    #[error("Geocoding API request failed: {0}")]
    Transport(String),

    /// The provider answered but had no usable result.
    #[error("Geocoding failed for {address}. Status: {status}")]
    Provider { address: String, status: String },

    #[error("Invalid JSON response from Geocoding API: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<serde_json::Value>,
    #[serde(default)]
    status: Option<String>,
}

#[instrument(skip_all, fields(address = %address))]
pub(crate) async fn geocode_address(
    client: &Client,
    url: &str,
    api_key: Option<&str>,
    address: &str,
) -> Result<Coordinates, GeocodeFailure> {
    let key = api_key.ok_or(GeocodeFailure::MissingApiKey)?;

    debug!("geocoding address");

    let response = client
        .get(url)
        .query(&[("address", address), ("key", key)])
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| GeocodeFailure::Transport(e.without_url().to_string()))?;

    let body: GeocodeResponse = response
        .json()
        .await
        .map_err(|e| GeocodeFailure::InvalidResponse(e.without_url().to_string()))?;

    let status = body.status.unwrap_or_else(|| "UNKNOWN".into());

    let Some(first) = body.results.first() else {
        warn!(%status, "geocoding returned no results");
        return Err(GeocodeFailure::Provider {
            address: address.to_string(),
            status,
        });
    };

    let coords = location_of(first).ok_or_else(|| {
        GeocodeFailure::InvalidResponse("first result has no geometry.location".into())
    })?;

    debug!(lat = coords.lat, lng = coords.lng, "address geocoded");
    Ok(coords)
}
