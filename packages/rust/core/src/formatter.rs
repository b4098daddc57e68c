//! Projection of resolved POIs into map-ready records.

use tracing::{debug, instrument, warn};

use adventuremap_shared::{FormattedPoi, Poi};

pub const DEFAULT_NAME: &str = "Unknown POI";
pub const DEFAULT_DESCRIPTION: &str = "No description available";

/// Result of formatting one POI batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormatReport {
    /// Map-ready records, in input order.
    pub pois: Vec<FormattedPoi>,
    /// Excluded because they were error-tagged or had no coordinates.
    pub skipped: usize,
    /// Excluded because their coordinates were not usable numbers.
    /// These carry no error tag; they only show up here and in the log.
    pub dropped: Vec<Poi>,
}

/// Keep error-free POIs with usable coordinates and reduce them to the four
/// fields the encoder needs.
#[instrument(skip_all, fields(input = pois.len()))]
pub fn format_map_data(pois: &[Poi]) -> FormatReport {
    let mut report = FormatReport::default();

    for poi in pois {
        let coords = match (&poi.error, poi.coordinates) {
            (None, Some(coords)) => coords,
            _ => {
                report.skipped += 1;
                continue;
            }
        };

        if !coords.is_finite() {
            warn!(name = ?poi.name, lat = coords.lat, lng = coords.lng, "skipping POI with invalid coordinates");
            report.dropped.push(poi.clone());
            continue;
        }

        report.pois.push(FormattedPoi {
            name: poi.name.clone().unwrap_or_else(|| DEFAULT_NAME.to_string()),
            description: poi
                .address
                .clone()
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            latitude: coords.lat,
            longitude: coords.lng,
        });
    }

    debug!(
        kept = report.pois.len(),
        skipped = report.skipped,
        dropped = report.dropped.len(),
        "formatted map data"
    );
    report
}

#[cfg(test)]
mod tests {
    use adventuremap_shared::Coordinates;

    use super::*;

    fn located(name: Option<&str>, address: Option<&str>, lat: f64, lng: f64) -> Poi {
        Poi {
            name: name.map(String::from),
            address: address.map(String::from),
            coordinates: Some(Coordinates::new(lat, lng)),
            ..Poi::default()
        }
    }

    #[test]
    fn keeps_clean_pois_in_order() {
        let pois = vec![
            located(Some("First"), Some("1 Road"), 1.0, 2.0),
            Poi::failed("Geocoding failed: nope"),
            located(Some("Second"), Some("2 Road"), 3.0, 4.0),
        ];

        let report = format_map_data(&pois);

        assert_eq!(report.skipped, 1);
        let names: Vec<_> = report.pois.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["First", "Second"]);
        assert_eq!(report.pois[1].description, "2 Road");
        assert_eq!(report.pois[1].latitude, 3.0);
        assert_eq!(report.pois[1].longitude, 4.0);
    }

    #[test]
    fn missing_name_and_address_get_defaults() {
        let report = format_map_data(&[located(None, None, 10.0, 20.0)]);

        assert_eq!(report.pois[0].name, DEFAULT_NAME);
        assert_eq!(report.pois[0].description, DEFAULT_DESCRIPTION);
    }

    #[test]
    fn errored_pois_are_excluded_even_with_coordinates() {
        let mut poi = located(Some("Tagged"), Some("x"), 1.0, 1.0);
        poi.error = Some("earlier failure".into());

        let report = format_map_data(&[poi]);

        assert!(report.pois.is_empty());
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn output_never_longer_than_input() {
        let pois = vec![
            located(Some("a"), None, 1.0, 1.0),
            Poi {
                name: Some("no coords".into()),
                ..Poi::default()
            },
            located(Some("b"), None, f64::NAN, 1.0),
        ];

        let report = format_map_data(&pois);

        assert!(report.pois.len() <= pois.len());
        for poi in &report.pois {
            assert!(poi.latitude.is_finite() && poi.longitude.is_finite());
        }
    }

    // Non-finite coordinates are dropped without an error tag, unlike every
    // other failure path. The report is the only place they surface.
    #[test]
    fn non_finite_coordinates_are_dropped_silently_but_reported() {
        let pois = vec![
            located(Some("Infinite"), None, f64::INFINITY, 0.0),
            located(Some("Fine"), None, 0.0, 0.0),
        ];

        let report = format_map_data(&pois);

        assert_eq!(report.pois.len(), 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].name.as_deref(), Some("Infinite"));
        assert!(report.dropped[0].error.is_none());
    }

    #[test]
    fn empty_input_formats_to_empty_output() {
        assert_eq!(format_map_data(&[]), FormatReport::default());
    }
}
