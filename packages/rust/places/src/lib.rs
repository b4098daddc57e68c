//! Google Maps Places (Text Search) and Geocoding clients.
//!
//! Both clients make exactly one attempt per call and never return `Err`
//! to the caller: search failures come back as a single error-tagged
//! pseudo-POI, geocoding failures as a [`GeocodeFailure`].

mod geocode;
mod search;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use adventuremap_shared::{AdventureMapError, Coordinates, MapsConfig, PoiEntry, Result};

pub use geocode::GeocodeFailure;

/// User-Agent string for Maps requests.
const USER_AGENT: &str = concat!("AdventureMap/", env!("CARGO_PKG_VERSION"));

/// Message used when no API key was available at startup.
pub const MISSING_KEY_MESSAGE: &str = "Google Maps API key is not configured";

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Free-text place search.
#[async_trait]
pub trait PlaceSearch: Send + Sync {
    /// Search for places matching `query`.
    ///
    /// Callers must check each POI's `error` before treating it as a place.
    async fn search(&self, query: &str) -> Vec<PoiEntry>;
}

/// Address to coordinate resolution.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> std::result::Result<Coordinates, GeocodeFailure>;
}

// ---------------------------------------------------------------------------
// GoogleMapsClient
// ---------------------------------------------------------------------------

/// HTTP client for the Places Text Search and Geocoding APIs.
#[derive(Debug, Clone)]
pub struct GoogleMapsClient {
    client: Client,
    places_url: String,
    geocode_url: String,
    api_key: Option<String>,
}

impl GoogleMapsClient {
    /// Build a client from config. A `None` key is allowed; every call then
    /// reports the missing key as data instead of hitting the network.
    pub fn new(config: &MapsConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AdventureMapError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            places_url: config.places_url.clone(),
            geocode_url: config.geocode_url.clone(),
            api_key,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl PlaceSearch for GoogleMapsClient {
    async fn search(&self, query: &str) -> Vec<PoiEntry> {
        search::search_places(&self.client, &self.places_url, self.api_key.as_deref(), query).await
    }
}

#[async_trait]
impl Geocoder for GoogleMapsClient {
    async fn geocode(&self, address: &str) -> std::result::Result<Coordinates, GeocodeFailure> {
        geocode::geocode_address(&self.client, &self.geocode_url, self.api_key.as_deref(), address)
            .await
    }
}

/// Read a coordinate component that may be a JSON number or a numeric string.
///
/// `"NaN"` and `"inf"` parse as floats but are not coordinates.
pub(crate) fn coordinate_component(value: &serde_json::Value) -> Option<f64> {
    let component = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    component.filter(|v| v.is_finite())
}

/// Extract `geometry.location.{lat,lng}` from a provider result.
pub(crate) fn location_of(result: &serde_json::Value) -> Option<Coordinates> {
    let location = result.get("geometry")?.get("location")?;
    let lat = coordinate_component(location.get("lat")?)?;
    let lng = coordinate_component(location.get("lng")?)?;
    Some(Coordinates::new(lat, lng))
}
