//! `GeoJSON` layer parsing.
//!
//! Each zone layer is a single `FeatureCollection`. Polygon layers accept
//! `Polygon` and `MultiPolygon` geometries; the block layer accepts `Point`
//! geometries. Features with missing codes or unusable geometry are
//! skipped with a warning rather than failing the whole layer.

use crime_pulse_zones_models::{ZoneKind, ZoneProperties};
use geo::MultiPolygon;
use geojson::GeoJson;

use crate::ZoneError;

/// Parses a polygon layer into `(properties, geometry)` pairs.
pub fn parse_polygon_layer(
    raw: &str,
    kind: ZoneKind,
) -> Result<Vec<(ZoneProperties, MultiPolygon<f64>)>, ZoneError> {
    let features = parse_feature_collection(raw, kind)?;
    let mut entries = Vec::new();

    for feature in features {
        let Some(props) = extract_properties(&feature, kind) else {
            continue;
        };

        let Some(multi_polygon) = feature.geometry.and_then(geometry_to_multipolygon) else {
            log::warn!("Skipping {kind} feature {} without polygon geometry", props.code);
            continue;
        };

        entries.push((props, multi_polygon));
    }

    if entries.is_empty() {
        return Err(ZoneError::EmptyLayer { kind });
    }

    Ok(entries)
}

/// Parses a point layer into `(properties, [lon, lat])` pairs.
pub fn parse_point_layer(
    raw: &str,
    kind: ZoneKind,
) -> Result<Vec<(ZoneProperties, [f64; 2])>, ZoneError> {
    let features = parse_feature_collection(raw, kind)?;
    let mut entries = Vec::new();

    for feature in features {
        let Some(props) = extract_properties(&feature, kind) else {
            continue;
        };

        let Some(position) = feature.geometry.and_then(geometry_to_point) else {
            log::warn!("Skipping {kind} feature {} without point geometry", props.code);
            continue;
        };

        entries.push((props, position));
    }

    if entries.is_empty() {
        return Err(ZoneError::EmptyLayer { kind });
    }

    Ok(entries)
}

fn parse_feature_collection(raw: &str, kind: ZoneKind) -> Result<Vec<geojson::Feature>, ZoneError> {
    let geojson: GeoJson = raw.parse().map_err(|e| ZoneError::Geojson {
        kind,
        message: format!("{e}"),
    })?;

    match geojson {
        GeoJson::FeatureCollection(collection) => Ok(collection.features),
        _ => Err(ZoneError::Geojson {
            kind,
            message: "expected a FeatureCollection".to_string(),
        }),
    }
}

/// Extracts the shared zone properties from a feature.
///
/// `code` is mandatory; `name_en`/`name_ar` default to the code when the
/// source file omits them.
fn extract_properties(feature: &geojson::Feature, kind: ZoneKind) -> Option<ZoneProperties> {
    let code = prop_string(feature, "code")?;

    Some(ZoneProperties {
        name_en: prop_string(feature, "name_en").unwrap_or_else(|| code.clone()),
        name_ar: prop_string(feature, "name_ar").unwrap_or_else(|| code.clone()),
        parent_code: prop_string(feature, "parent_code"),
        kind,
        code,
    })
}

/// Reads a property as a string, accepting numeric codes as well.
fn prop_string(feature: &geojson::Feature, key: &str) -> Option<String> {
    let value = feature.properties.as_ref()?.get(key)?;
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn geometry_to_multipolygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Converts a `GeoJSON` geometry into an `[lon, lat]` position.
fn geometry_to_point(geometry: geojson::Geometry) -> Option<[f64; 2]> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::Point(p) => Some([p.x(), p.y()]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISTRICTS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"code": "D01", "name_en": "Salmiya", "name_ar": "السالمية", "parent_code": "G1"},
                "geometry": {"type": "Polygon", "coordinates": [[[47.0, 29.0], [47.1, 29.0], [47.1, 29.1], [47.0, 29.1], [47.0, 29.0]]]}
            },
            {
                "type": "Feature",
                "properties": {"name_en": "missing code"},
                "geometry": {"type": "Polygon", "coordinates": [[[48.0, 29.0], [48.1, 29.0], [48.1, 29.1], [48.0, 29.0]]]}
            }
        ]
    }"#;

    #[test]
    fn parses_polygon_layer_and_skips_codeless_features() {
        let entries = parse_polygon_layer(DISTRICTS, ZoneKind::District).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0.code, "D01");
        assert_eq!(entries[0].0.parent_code.as_deref(), Some("G1"));
    }

    #[test]
    fn rejects_non_collection_input() {
        let err = parse_polygon_layer(
            r#"{"type": "Point", "coordinates": [47.0, 29.0]}"#,
            ZoneKind::Governorate,
        )
        .unwrap_err();
        assert!(matches!(err, ZoneError::Geojson { .. }));
    }

    #[test]
    fn parses_point_layer() {
        let blocks = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"code": "B7", "parent_code": "D01"},
                    "geometry": {"type": "Point", "coordinates": [47.05, 29.05]}
                }
            ]
        }"#;
        let entries = parse_point_layer(blocks, ZoneKind::Block).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, [47.05, 29.05]);
    }

    #[test]
    fn numeric_codes_accepted() {
        let layer = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"code": 12},
                    "geometry": {"type": "Point", "coordinates": [47.5, 29.2]}
                }
            ]
        }"#;
        let entries = parse_point_layer(layer, ZoneKind::Block).unwrap();
        assert_eq!(entries[0].0.code, "12");
    }
}
