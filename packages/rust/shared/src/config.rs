//! Application configuration for AdventureMap.
//!
//! User config lives at `~/.adventuremap/adventuremap.toml`.
//! Environment variables override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AdventureMapError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "adventuremap.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".adventuremap";

/// Placeholder project id shipped in the default config.
pub const PLACEHOLDER_PROJECT_ID: &str = "YOUR_GCS_PROJECT_ID_FOR_BUCKET";

/// Placeholder bucket name shipped in the default config.
pub const PLACEHOLDER_BUCKET: &str = "YOUR_GCS_BUCKET_NAME_FOR_KML_FILES";

/// Env var overriding `storage.project_id`.
pub const ENV_PROJECT_ID: &str = "GCS_PROJECT_ID_FOR_BUCKET";
/// Env var overriding `storage.bucket`.
pub const ENV_BUCKET: &str = "GCS_BUCKET_NAME_FOR_KML";
/// Env var overriding `storage.signer_service_account`.
pub const ENV_SIGNER: &str = "GCS_SIGNER_SERVICE_ACCOUNT";

// ---------------------------------------------------------------------------
// Config structs (matching adventuremap.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Google Maps Places / Geocoding settings.
    #[serde(default)]
    pub maps: MapsConfig,

    /// Durable storage settings for generated map files.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[maps]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapsConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Places Text Search endpoint.
    #[serde(default = "default_places_url")]
    pub places_url: String,

    /// Geocoding endpoint.
    #[serde(default = "default_geocode_url")]
    pub geocode_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            places_url: default_places_url(),
            geocode_url: default_geocode_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "GOOGLE_MAPS_API_KEY".into()
}
fn default_places_url() -> String {
    "https://maps.googleapis.com/maps/api/place/textsearch/json".into()
}
fn default_geocode_url() -> String {
    "https://maps.googleapis.com/maps/api/geocode/json".into()
}
fn default_timeout_secs() -> u64 {
    10
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// GCP project that owns the bucket.
    #[serde(default = "default_project_id")]
    pub project_id: String,

    /// Bucket receiving generated KML files.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Service account impersonated to sign download URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_service_account: Option<String>,

    /// Lifetime of signed download URLs.
    #[serde(default = "default_expiration_secs")]
    pub signed_url_expiration_secs: u64,

    /// Object path prefix; objects land at `<prefix>/<session>/<name>`.
    #[serde(default = "default_object_prefix")]
    pub object_prefix: String,

    /// Storage API base URL (upload endpoint and signed URL host).
    #[serde(default = "default_storage_url")]
    pub storage_url: String,

    /// IAM Credentials API base URL.
    #[serde(default = "default_iam_url")]
    pub iam_credentials_url: String,

    /// Metadata server base URL for ambient credentials.
    #[serde(default = "default_metadata_url")]
    pub metadata_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            project_id: default_project_id(),
            bucket: default_bucket(),
            signer_service_account: None,
            signed_url_expiration_secs: default_expiration_secs(),
            object_prefix: default_object_prefix(),
            storage_url: default_storage_url(),
            iam_credentials_url: default_iam_url(),
            metadata_url: default_metadata_url(),
        }
    }
}

fn default_project_id() -> String {
    PLACEHOLDER_PROJECT_ID.into()
}
fn default_bucket() -> String {
    PLACEHOLDER_BUCKET.into()
}
fn default_expiration_secs() -> u64 {
    3600
}
fn default_object_prefix() -> String {
    "adventure_maps".into()
}
fn default_storage_url() -> String {
    "https://storage.googleapis.com".into()
}
fn default_iam_url() -> String {
    "https://iamcredentials.googleapis.com".into()
}
fn default_metadata_url() -> String {
    "http://metadata.google.internal".into()
}

impl StorageConfig {
    /// Durable storage is enabled only when bucket and project are real values.
    pub fn durable_enabled(&self) -> bool {
        let real = |v: &str, sentinel: &str| !v.trim().is_empty() && v != sentinel;
        real(&self.bucket, PLACEHOLDER_BUCKET) && real(&self.project_id, PLACEHOLDER_PROJECT_ID)
    }
}

impl AppConfig {
    /// Apply `GCS_*` environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).filter(|v| !v.is_empty());
        if let Some(project) = lookup(ENV_PROJECT_ID) {
            self.storage.project_id = project;
        }
        if let Some(bucket) = lookup(ENV_BUCKET) {
            self.storage.bucket = bucket;
        }
        if let Some(signer) = lookup(ENV_SIGNER) {
            self.storage.signer_service_account = Some(signer);
        }
    }

    /// Read the Maps API key from the configured env var, if set.
    pub fn maps_api_key(&self) -> Option<String> {
        std::env::var(&self.maps.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.adventuremap/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AdventureMapError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.adventuremap/adventuremap.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk and apply env overrides.
/// Falls back to defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    let mut config = if path.exists() {
        load_config_from(&path)?
    } else {
        tracing::debug!(?path, "config file not found, using defaults");
        AppConfig::default()
    };

    config.apply_env_overrides();
    validate_config(&config)?;
    Ok(config)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AdventureMapError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        AdventureMapError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| AdventureMapError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| AdventureMapError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| AdventureMapError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check endpoint URLs parse and the durable-storage settings are coherent.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let urls = [
        ("maps.places_url", &config.maps.places_url),
        ("maps.geocode_url", &config.maps.geocode_url),
        ("storage.storage_url", &config.storage.storage_url),
        ("storage.iam_credentials_url", &config.storage.iam_credentials_url),
        ("storage.metadata_url", &config.storage.metadata_url),
    ];
    for (key, value) in urls {
        url::Url::parse(value)
            .map_err(|e| AdventureMapError::config(format!("{key} '{value}' is not a URL: {e}")))?;
    }

    if config.maps.timeout_secs == 0 {
        return Err(AdventureMapError::config("maps.timeout_secs must be positive"));
    }

    if config.storage.signed_url_expiration_secs == 0
        || config.storage.signed_url_expiration_secs > MAX_SIGNED_URL_SECS
    {
        return Err(AdventureMapError::config(format!(
            "storage.signed_url_expiration_secs must be between 1 and {MAX_SIGNED_URL_SECS}"
        )));
    }

    Ok(())
}

/// V4 signed URLs are valid for at most seven days.
const MAX_SIGNED_URL_SECS: u64 = 7 * 24 * 3600;
