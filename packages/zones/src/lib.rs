#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Zone feature loading, spatial indexing, and coordinate resolution.
//!
//! Loads the four static `GeoJSON` layers (governorates, districts,
//! blocks-as-points, police zones) at startup, builds an R-tree index per
//! layer, and resolves `(lat, lon)` pairs to the administrative zone
//! hierarchy. Feature data is read-only after load and safe to share
//! across workers without locking.

mod layer;
mod registry;
mod resolver;

pub use registry::{ZoneFeatureSet, ZoneLayerPaths, ZoneRegistry};
pub use resolver::{IndexBackend, ResolverConfig, ZoneResolver};

use crime_pulse_zones_models::ZoneKind;
use thiserror::Error;

/// Errors raised while loading zone feature layers.
///
/// All of these are fatal at startup: the resolver cannot serve without a
/// complete feature set.
#[derive(Debug, Error)]
pub enum ZoneError {
    /// A layer file could not be read.
    #[error("failed to read {kind} layer: {source}")]
    Io {
        /// Layer that failed to load.
        kind: ZoneKind,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A layer file was not valid `GeoJSON` or had the wrong shape.
    #[error("invalid GeoJSON in {kind} layer: {message}")]
    Geojson {
        /// Layer that failed to parse.
        kind: ZoneKind,
        /// Description of what went wrong.
        message: String,
    },

    /// A layer parsed but produced no usable features.
    #[error("{kind} layer contains no usable features")]
    EmptyLayer {
        /// The empty layer.
        kind: ZoneKind,
    },
}
