//! KML 2.2 document encoding for formatted POIs.
//!
//! The encoder never fails: it always produces a complete document (XML
//! header, `<kml>` root, `<Document>`), with one `<Placemark>` per POI that
//! still has real coordinates.

use std::fmt::Write;

use tracing::{debug, instrument, warn};

use adventuremap_shared::FormattedPoi;

/// MIME type for KML uploads.
pub const KML_CONTENT_TYPE: &str = "application/vnd.google-earth.kml+xml";

/// KML 2.2 namespace.
pub const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// An encoded KML document. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct KmlDocument {
    content: String,
    placemarks: usize,
}

impl KmlDocument {
    /// The full XML text.
    pub fn as_str(&self) -> &str {
        &self.content
    }

    /// Number of `<Placemark>` elements written.
    pub fn placemark_count(&self) -> usize {
        self.placemarks
    }

    pub fn into_string(self) -> String {
        self.content
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Encode `pois` into a KML document.
///
/// `document_name`, when given, becomes the `<Document><name>`. POIs with
/// non-finite coordinates are skipped; the formatter should already have
/// dropped them.
#[instrument(skip_all, fields(pois = pois.len()))]
pub fn encode(document_name: Option<&str>, pois: &[FormattedPoi]) -> KmlDocument {
    let mut out = String::with_capacity(256 + pois.len() * 256);
    let mut placemarks = 0;

    out.push_str(XML_HEADER);
    out.push('\n');
    let _ = writeln!(out, r#"<kml xmlns="{KML_NAMESPACE}">"#);
    out.push_str("  <Document>\n");

    if let Some(name) = document_name {
        let _ = writeln!(out, "    <name>{}</name>", escape_text(name));
    }

    for poi in pois {
        if !poi.latitude.is_finite() || !poi.longitude.is_finite() {
            warn!(name = %poi.name, "skipping POI without usable coordinates");
            continue;
        }
        write_placemark(&mut out, poi);
        placemarks += 1;
    }

    out.push_str("  </Document>\n");
    out.push_str("</kml>\n");

    debug!(placemarks, bytes = out.len(), "KML document encoded");

    KmlDocument {
        content: out,
        placemarks,
    }
}

fn write_placemark(out: &mut String, poi: &FormattedPoi) {
    // KML orders coordinates longitude first.
    let _ = write!(
        out,
        "    <Placemark>\n      \
         <name>{}</name>\n      \
         <description>{}</description>\n      \
         <Point>\n        \
         <coordinates>{},{},0</coordinates>\n      \
         </Point>\n    \
         </Placemark>\n",
        escape_text(&poi.name),
        escape_text(&poi.description),
        poi.longitude,
        poi.latitude,
    );
}

/// Escape the three characters reserved in XML text content.
///
/// `&` must be replaced first so the entities produced for `<` and `>`
/// are not escaped again.
pub fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
