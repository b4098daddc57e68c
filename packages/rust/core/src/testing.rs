//! Fake collaborators shared by the core tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use adventuremap_places::{GeocodeFailure, Geocoder, PlaceSearch};
use adventuremap_shared::{Coordinates, Poi, PoiEntry, SessionId};
use adventuremap_storage::{ArtifactPublisher, InMemoryArtifactStore};

use crate::stages::Stages;

/// Returns the same entries for every query.
pub struct FixedSearch {
    pub entries: Vec<PoiEntry>,
    pub calls: AtomicUsize,
}

impl FixedSearch {
    pub fn new(entries: Vec<PoiEntry>) -> Self {
        Self {
            entries,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaceSearch for FixedSearch {
    async fn search(&self, _query: &str) -> Vec<PoiEntry> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entries.clone()
    }
}

/// Resolves every address to the same point and counts calls.
#[derive(Default)]
pub struct CountingGeocoder {
    pub calls: AtomicUsize,
}

impl CountingGeocoder {
    pub const POINT: Coordinates = Coordinates {
        lat: 44.5117,
        lng: -72.7632,
    };

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for CountingGeocoder {
    async fn geocode(&self, _address: &str) -> Result<Coordinates, GeocodeFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::POINT)
    }
}

pub fn located(name: &str, lat: f64, lng: f64) -> PoiEntry {
    PoiEntry::Poi(Poi {
        name: Some(name.into()),
        address: Some(format!("{name} Road, Vermont")),
        external_id: Some(format!("place-{name}")),
        coordinates: Some(Coordinates::new(lat, lng)),
        ..Poi::default()
    })
}

pub fn address_only(name: &str, address: &str) -> PoiEntry {
    PoiEntry::Poi(Poi {
        name: Some(name.into()),
        address: Some(address.into()),
        ..Poi::default()
    })
}

/// Everything a stage or pipeline test needs to observe.
pub struct Harness {
    pub search: Arc<FixedSearch>,
    pub geocoder: Arc<CountingGeocoder>,
    pub artifacts: Arc<InMemoryArtifactStore>,
    pub session: SessionId,
}

impl Harness {
    pub fn new(entries: Vec<PoiEntry>) -> Self {
        Self {
            search: Arc::new(FixedSearch::new(entries)),
            geocoder: Arc::new(CountingGeocoder::default()),
            artifacts: Arc::new(InMemoryArtifactStore::new()),
            session: SessionId::new(),
        }
    }

    pub fn stages(&self) -> Stages {
        Stages::new(
            self.search.clone(),
            self.geocoder.clone(),
            Arc::new(ArtifactPublisher::transient(self.artifacts.clone())),
        )
    }

    /// The single artifact name mentioned in `message`.
    pub fn artifact_name(message: &str) -> String {
        let re = regex::Regex::new(r"adventure_map_[0-9a-f]{8}\.kml").unwrap();
        re.find(message).unwrap().as_str().to_string()
    }
}
