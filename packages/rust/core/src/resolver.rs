//! Coordinate resolution: make every POI either located or error-tagged.

use tracing::{debug, info, instrument, warn};

use adventuremap_places::Geocoder;
use adventuremap_shared::{Poi, PoiEntry};

/// Error for a POI with neither coordinates nor a usable address.
pub const MISSING_ADDRESS_ERROR: &str = "Missing or invalid address for geocoding";

/// Error for a search result that was not shaped like a place.
pub const MALFORMED_ENTRY_ERROR: &str = "Invalid POI format, not an object.";

/// Counts from one resolution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    /// Already had coordinates; untouched.
    pub passed_through: usize,
    /// Coordinates obtained from the geocoder.
    pub geocoded: usize,
    /// Ended up error-tagged.
    pub failed: usize,
}

impl ResolveSummary {
    pub fn total(&self) -> usize {
        self.passed_through + self.geocoded + self.failed
    }
}

/// Resolve coordinates for every entry, in order.
///
/// The output has the same length as the input. Entries that already carry
/// coordinates are never sent to the geocoder. Geocoding calls are issued
/// one at a time.
#[instrument(skip_all, fields(entries = entries.len()))]
pub async fn resolve_coordinates(
    entries: &[PoiEntry],
    geocoder: &dyn Geocoder,
) -> (Vec<Poi>, ResolveSummary) {
    let mut resolved = Vec::with_capacity(entries.len());
    let mut summary = ResolveSummary::default();

    for entry in entries {
        let poi = match entry {
            PoiEntry::Malformed(original) => {
                warn!(?original, "malformed search entry");
                summary.failed += 1;
                Poi {
                    error: Some(MALFORMED_ENTRY_ERROR.into()),
                    original: Some(original.clone()),
                    ..Poi::default()
                }
            }
            PoiEntry::Poi(poi) => {
                let poi = resolve_one(poi, geocoder).await;
                match (&poi.error, &poi.coordinates) {
                    (Some(_), _) => summary.failed += 1,
                    (None, Some(_)) if entry_had_coordinates(entry) => summary.passed_through += 1,
                    _ => summary.geocoded += 1,
                }
                poi
            }
        };
        resolved.push(poi);
    }

    info!(
        passed_through = summary.passed_through,
        geocoded = summary.geocoded,
        failed = summary.failed,
        "coordinate resolution complete"
    );

    (resolved, summary)
}

fn entry_had_coordinates(entry: &PoiEntry) -> bool {
    matches!(entry, PoiEntry::Poi(p) if has_usable_coordinates(p))
}

/// Only a finite pair counts as located; anything else goes to the geocoder.
fn has_usable_coordinates(poi: &Poi) -> bool {
    poi.coordinates.is_some_and(|c| c.is_finite())
}

async fn resolve_one(poi: &Poi, geocoder: &dyn Geocoder) -> Poi {
    if has_usable_coordinates(poi) {
        return poi.clone();
    }

    let Some(address) = poi.usable_address() else {
        let mut tagged = poi.clone();
        if poi.is_errored() {
            // Keep the upstream failure visible for diagnostics.
            tagged.original = serde_json::to_value(poi).ok();
        }
        tagged.error = Some(MISSING_ADDRESS_ERROR.into());
        return tagged;
    };

    let mut resolved = poi.clone();
    match geocoder.geocode(address).await {
        Ok(coords) => {
            debug!(name = ?poi.name, lat = coords.lat, lng = coords.lng, "geocoded");
            resolved.coordinates = Some(coords);
        }
        Err(failure) => {
            warn!(name = ?poi.name, %failure, "geocoding failed");
            resolved.error = Some(format!("Geocoding failed: {failure}"));
        }
    }
    resolved
}
