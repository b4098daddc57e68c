//! Places Text Search: query string in, POI entries out.

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use adventuremap_shared::{Poi, PoiEntry};

use crate::{MISSING_KEY_MESSAGE, location_of};

/// Provider statuses that are not failures.
const OK_STATUSES: &[&str] = &["OK", "ZERO_RESULTS"];

#[derive(Debug, Deserialize)]
struct TextSearchResponse {
    #[serde(default)]
    results: Vec<serde_json::Value>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[instrument(skip_all, fields(query = %query))]
pub(crate) async fn search_places(
    client: &Client,
    url: &str,
    api_key: Option<&str>,
    query: &str,
) -> Vec<PoiEntry> {
    let Some(key) = api_key else {
        warn!("places search skipped: no API key");
        return vec![Poi::failed(MISSING_KEY_MESSAGE).into()];
    };

    debug!("querying Places API");

    let response = match client
        .get(url)
        .query(&[("query", query), ("key", key)])
        .send()
        .await
        .and_then(|r| r.error_for_status())
    {
        Ok(r) => r,
        Err(e) => {
            // The request URL carries the API key.
            let e = e.without_url();
            warn!(error = %e, "Places API request failed");
            return vec![Poi::failed(format!("Places API request failed: {e}")).into()];
        }
    };

    let body: TextSearchResponse = match response.json().await {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "invalid JSON from Places API");
            return vec![Poi::failed("Invalid JSON response from Places API").into()];
        }
    };

    if body.results.is_empty() {
        if let Some(status) = body.status.as_deref().filter(|s| !OK_STATUSES.contains(s)) {
            let detail = body.error_message.unwrap_or_default();
            warn!(status, detail = %detail, "Places API returned an error status");
            return vec![
                Poi::failed(format!("Places API returned status {status}: {detail}")).into(),
            ];
        }
    }

    let entries: Vec<PoiEntry> = body.results.into_iter().map(to_entry).collect();
    info!(count = entries.len(), "places search complete");
    entries
}

/// Map one provider result to a POI, keeping non-objects as malformed.
fn to_entry(result: serde_json::Value) -> PoiEntry {
    if !result.is_object() {
        return PoiEntry::Malformed(result);
    }

    let text = |key: &str| result.get(key).and_then(|v| v.as_str()).map(String::from);

    PoiEntry::Poi(Poi {
        name: text("name"),
        address: text("formatted_address"),
        external_id: text("place_id"),
        coordinates: location_of(&result),
        ..Poi::default()
    })
}
