//! In-memory zone registry with per-layer spatial indexes.
//!
//! Built once at startup from the static `GeoJSON` layer files and
//! read-only thereafter. Polygon layers (governorates, districts, police
//! zones) get an R-tree of envelopes for fast point-in-polygon lookups;
//! the block layer (point features) gets an R-tree supporting
//! nearest-neighbor queries.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crime_pulse_zones_models::{ZoneKind, ZoneProperties};
use geo::{Area, BoundingRect, Centroid, Contains, MultiPolygon};
use rstar::{AABB, Envelope as _, PointDistance, RTree, RTreeObject};
use serde::Deserialize;

use crate::layer;
use crate::resolver::IndexBackend;
use crate::ZoneError;

/// A zone polygon stored in the R-tree with its metadata.
struct PolygonEntry {
    props: ZoneProperties,
    area: f64,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for PolygonEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// A block centroid stored in the R-tree.
struct BlockEntry {
    props: ZoneProperties,
    position: [f64; 2],
}

impl RTreeObject for BlockEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for BlockEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        dx.mul_add(dx, dy * dy)
    }
}

/// One indexed polygon layer.
struct PolygonLayer {
    kind: ZoneKind,
    index: RTree<PolygonEntry>,
}

impl PolygonLayer {
    fn build(kind: ZoneKind, features: Vec<(ZoneProperties, MultiPolygon<f64>)>) -> Self {
        let entries: Vec<PolygonEntry> = features
            .into_iter()
            .map(|(props, polygon)| PolygonEntry {
                area: polygon.unsigned_area(),
                envelope: compute_envelope(&polygon),
                props,
                polygon,
            })
            .collect();

        warn_on_overlaps(kind, &entries);

        Self {
            kind,
            index: RTree::bulk_load(entries),
        }
    }

    fn len(&self) -> usize {
        self.index.size()
    }

    /// Finds the zone containing the point.
    ///
    /// Layers are assumed non-overlapping; where polygons do overlap the
    /// smallest area wins, so a district inside a larger misdrawn shape
    /// still resolves correctly.
    fn locate(&self, lat: f64, lon: f64, backend: IndexBackend) -> Option<&ZoneProperties> {
        match backend {
            IndexBackend::Rtree => {
                let point = geo::Point::new(lon, lat);
                let query_env = AABB::from_point([lon, lat]);

                let mut best: Option<&PolygonEntry> = None;
                for entry in self.index.locate_in_envelope_intersecting(&query_env) {
                    if entry.polygon.contains(&point) {
                        match best {
                            None => best = Some(entry),
                            Some(current) if entry.area < current.area => best = Some(entry),
                            _ => {}
                        }
                    }
                }
                best.map(|e| &e.props)
            }
            // Degraded path: envelope containment only, no exact
            // point-in-polygon test. Same contract, coarser matches.
            IndexBackend::Aabb => {
                let mut best: Option<&PolygonEntry> = None;
                for entry in self.index.iter() {
                    if entry.envelope.contains_point(&[lon, lat]) {
                        match best {
                            None => best = Some(entry),
                            Some(current) if entry.area < current.area => best = Some(entry),
                            _ => {}
                        }
                    }
                }
                best.map(|e| &e.props)
            }
        }
    }
}

/// The indexed block-point layer.
struct BlockLayer {
    index: RTree<BlockEntry>,
}

impl BlockLayer {
    fn build(features: Vec<(ZoneProperties, [f64; 2])>) -> Self {
        let entries: Vec<BlockEntry> = features
            .into_iter()
            .map(|(props, position)| BlockEntry { props, position })
            .collect();

        Self {
            index: RTree::bulk_load(entries),
        }
    }

    fn len(&self) -> usize {
        self.index.size()
    }

    /// Finds the nearest block within `max_distance_deg` of the point.
    fn nearest(
        &self,
        lat: f64,
        lon: f64,
        max_distance_deg: f64,
        backend: IndexBackend,
    ) -> Option<&ZoneProperties> {
        let query = [lon, lat];
        let max_squared = max_distance_deg * max_distance_deg;

        let entry = match backend {
            IndexBackend::Rtree => self.index.nearest_neighbor(&query),
            IndexBackend::Aabb => self
                .index
                .iter()
                .min_by(|a, b| a.distance_2(&query).total_cmp(&b.distance_2(&query))),
        }?;

        (entry.distance_2(&query) <= max_squared).then_some(&entry.props)
    }
}

/// Paths to the four static `GeoJSON` layer files.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneLayerPaths {
    /// Governorate polygon collection.
    pub governorates: PathBuf,
    /// District polygon collection.
    pub districts: PathBuf,
    /// Block point collection.
    pub blocks: PathBuf,
    /// Police zone polygon collection.
    pub police_zones: PathBuf,
}

/// In-memory feature set for constructing a registry without files.
///
/// Used by tests and by callers that already hold parsed geometries.
#[derive(Default)]
pub struct ZoneFeatureSet {
    /// Governorate polygons.
    pub governorates: Vec<(ZoneProperties, MultiPolygon<f64>)>,
    /// District polygons.
    pub districts: Vec<(ZoneProperties, MultiPolygon<f64>)>,
    /// Police zone polygons.
    pub police_zones: Vec<(ZoneProperties, MultiPolygon<f64>)>,
    /// Block centroids as `[lon, lat]`.
    pub blocks: Vec<(ZoneProperties, [f64; 2])>,
}

/// Pre-built spatial indexes for all four zone layers.
///
/// Constructed once and shared across all consumers.
pub struct ZoneRegistry {
    governorates: PolygonLayer,
    districts: PolygonLayer,
    police_zones: PolygonLayer,
    blocks: BlockLayer,
}

impl ZoneRegistry {
    /// Loads all four layers from `GeoJSON` files and builds the indexes.
    ///
    /// # Errors
    ///
    /// Returns [`ZoneError`] if any layer file is missing, unparsable, or
    /// empty. All load failures are fatal: the resolver cannot serve with
    /// a partial feature set.
    pub fn load(paths: &ZoneLayerPaths) -> Result<Self, ZoneError> {
        let governorates =
            layer::parse_polygon_layer(&read_layer(&paths.governorates, ZoneKind::Governorate)?, ZoneKind::Governorate)?;
        let districts =
            layer::parse_polygon_layer(&read_layer(&paths.districts, ZoneKind::District)?, ZoneKind::District)?;
        let police_zones = layer::parse_polygon_layer(
            &read_layer(&paths.police_zones, ZoneKind::PoliceZone)?,
            ZoneKind::PoliceZone,
        )?;
        let blocks =
            layer::parse_point_layer(&read_layer(&paths.blocks, ZoneKind::Block)?, ZoneKind::Block)?;

        Ok(Self::from_features(ZoneFeatureSet {
            governorates,
            districts,
            police_zones,
            blocks,
        }))
    }

    /// Builds a registry from already-parsed features.
    #[must_use]
    pub fn from_features(features: ZoneFeatureSet) -> Self {
        validate_parent_links(
            ZoneKind::District,
            features.districts.iter().map(|(p, _)| p),
            features.governorates.iter().map(|(p, _)| p),
        );
        validate_parent_links(
            ZoneKind::Block,
            features.blocks.iter().map(|(p, _)| p),
            features.districts.iter().map(|(p, _)| p),
        );

        let registry = Self {
            governorates: PolygonLayer::build(ZoneKind::Governorate, features.governorates),
            districts: PolygonLayer::build(ZoneKind::District, features.districts),
            police_zones: PolygonLayer::build(ZoneKind::PoliceZone, features.police_zones),
            blocks: BlockLayer::build(features.blocks),
        };

        log::info!(
            "Zone registry loaded: {} governorates, {} districts, {} police zones, {} blocks",
            registry.governorates.len(),
            registry.districts.len(),
            registry.police_zones.len(),
            registry.blocks.len(),
        );

        registry
    }

    /// Looks up the governorate containing a point.
    #[must_use]
    pub fn locate_governorate(
        &self,
        lat: f64,
        lon: f64,
        backend: IndexBackend,
    ) -> Option<&ZoneProperties> {
        self.governorates.locate(lat, lon, backend)
    }

    /// Looks up the district containing a point.
    #[must_use]
    pub fn locate_district(
        &self,
        lat: f64,
        lon: f64,
        backend: IndexBackend,
    ) -> Option<&ZoneProperties> {
        self.districts.locate(lat, lon, backend)
    }

    /// Looks up the police zone containing a point.
    #[must_use]
    pub fn locate_police_zone(
        &self,
        lat: f64,
        lon: f64,
        backend: IndexBackend,
    ) -> Option<&ZoneProperties> {
        self.police_zones.locate(lat, lon, backend)
    }

    /// Finds the nearest block within the acceptance distance.
    #[must_use]
    pub fn nearest_block(
        &self,
        lat: f64,
        lon: f64,
        max_distance_deg: f64,
        backend: IndexBackend,
    ) -> Option<&ZoneProperties> {
        self.blocks.nearest(lat, lon, max_distance_deg, backend)
    }
}

fn read_layer(path: &std::path::Path, kind: ZoneKind) -> Result<String, ZoneError> {
    std::fs::read_to_string(path).map_err(|source| ZoneError::Io { kind, source })
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

/// Logs a warning for every pair of polygons in a layer that overlap.
///
/// Zone layers are supposed to tile without overlap, so an overlap is a
/// data defect worth surfacing at load time. Detection tests whether one
/// polygon's centroid falls inside the other, which ignores shared
/// borders between adjacent zones. Lookups still behave deterministically
/// either way: smallest area wins.
fn warn_on_overlaps(kind: ZoneKind, entries: &[PolygonEntry]) {
    for (i, a) in entries.iter().enumerate() {
        for b in entries.iter().skip(i + 1) {
            if !a.envelope.intersects(&b.envelope) {
                continue;
            }

            let a_covers_b = b
                .polygon
                .centroid()
                .is_some_and(|c| a.polygon.contains(&c));
            let b_covers_a = a
                .polygon
                .centroid()
                .is_some_and(|c| b.polygon.contains(&c));

            if a_covers_b || b_covers_a {
                log::warn!(
                    "Overlapping {kind} polygons: {} and {} (smallest area wins on lookup)",
                    a.props.code,
                    b.props.code
                );
            }
        }
    }
}

/// Warns about features whose `parent_code` does not exist in the parent
/// layer. Orphans still resolve; the hierarchy link is just unusable.
fn validate_parent_links<'a>(
    kind: ZoneKind,
    children: impl Iterator<Item = &'a ZoneProperties>,
    parents: impl Iterator<Item = &'a ZoneProperties>,
) {
    let parent_codes: BTreeSet<&str> = parents.map(|p| p.code.as_str()).collect();

    for child in children {
        if let Some(parent) = child.parent_code.as_deref()
            && !parent_codes.contains(parent)
        {
            log::warn!("{kind} {} references unknown parent {parent}", child.code);
        }
    }
}
