//! Core domain types: points of interest, coordinates, and session identity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AdventureMapError;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Identifier scoping one pipeline invocation's artifacts.
///
/// Used verbatim as a storage path segment, so only ASCII alphanumerics,
/// `-`, `_` and `.` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new time-sortable session identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = AdventureMapError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let valid = !s.is_empty()
            && s != "."
            && s != ".."
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(AdventureMapError::validation(format!(
                "invalid session id '{s}': use letters, digits, '-', '_' or '.'"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// A latitude/longitude pair in float degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Both components are real numbers (not NaN or infinite).
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

// ---------------------------------------------------------------------------
// Poi
// ---------------------------------------------------------------------------

/// A point of interest, accumulated across pipeline stages.
///
/// A POI is never removed mid-pipeline. Failures are recorded in `error`
/// and the POI is only filtered out when map data is formatted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Postal address; geocoding input and final description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Stable identifier from the search provider. Carried, never consumed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    /// Error marker. Once set, the POI is excluded from the map file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Offending input kept for diagnostics when the POI is a stand-in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<serde_json::Value>,
}

impl Poi {
    /// An error-tagged pseudo-POI with no other fields.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// The address, if it is present and non-empty. Passed to the geocoder
    /// unchanged.
    pub fn usable_address(&self) -> Option<&str> {
        self.address.as_deref().filter(|a| !a.is_empty())
    }

    pub fn is_errored(&self) -> bool {
        self.error.is_some()
    }
}

/// One raw result from place search.
///
/// `Malformed` holds a provider result that was not shaped like a place
/// at all; it is kept so the resolver can report it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PoiEntry {
    Poi(Poi),
    Malformed(serde_json::Value),
}

// Only JSON objects are places. A derived untagged impl would also read
// arrays into `Poi` by field position.
impl<'de> Deserialize<'de> for PoiEntry {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        if !value.is_object() {
            return Ok(Self::Malformed(value));
        }
        match Poi::deserialize(&value) {
            Ok(poi) => Ok(Self::Poi(poi)),
            Err(_) => Ok(Self::Malformed(value)),
        }
    }
}

impl From<Poi> for PoiEntry {
    fn from(poi: Poi) -> Self {
        Self::Poi(poi)
    }
}

// ---------------------------------------------------------------------------
// FormattedPoi
// ---------------------------------------------------------------------------

/// The minimal projection the map-file encoder consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedPoi {
    pub name: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
}
