//! Shared types, error model, and configuration for AdventureMap.
//!
//! This crate is the foundation depended on by all other AdventureMap crates.
//! It provides:
//! - [`AdventureMapError`]: the unified error type
//! - Domain types ([`Poi`], [`PoiEntry`], [`Coordinates`], [`FormattedPoi`], [`SessionId`])
//! - Configuration ([`AppConfig`], [`MapsConfig`], [`StorageConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, MapsConfig, StorageConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, validate_config,
};
pub use error::{AdventureMapError, Result};
pub use types::{Coordinates, FormattedPoi, Poi, PoiEntry, SessionId};
