//! GeoJSON `FeatureCollection` rendering (SPEC_FULL.md §4.7): always CRS84,
//! x/y, reprojected on the fly.

use serde::Serialize;
use serde_json::{json, Value};

use crate::collection::{FetchedPage, SimpleFeatureCollection};
use crate::datastore::Row;
use crate::geom::{Coord, Geometry};
use crate::query::Reprojector;
use crate::xsd::{FieldValue, SchemaGraph};

pub const CONTENT_TYPE: &str = "application/geo+json; charset=utf-8";
pub const CRS84_URI: &str = "urn:ogc:def:crs:OGC::CRS84";

#[derive(Debug, Clone, Serialize)]
pub struct GeoJsonLink {
    pub rel: String,
    pub href: String,
}

#[derive(Serialize)]
struct GeoJsonFeature {
    #[serde(rename = "type")]
    kind: &'static str,
    id: String,
    geometry: Value,
    properties: serde_json::Map<String, Value>,
}

#[derive(Serialize)]
struct GeoJsonFeatureCollection {
    #[serde(rename = "type")]
    kind: &'static str,
    features: Vec<GeoJsonFeature>,
    #[serde(rename = "numberMatched", skip_serializing_if = "Option::is_none")]
    number_matched: Option<u64>,
    #[serde(rename = "numberReturned")]
    number_returned: usize,
    crs: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    links: Vec<GeoJsonLink>,
}

fn round_coord(c: Coord) -> Value {
    json!([c.0, c.1])
}

fn coords_json(geometry: &Geometry) -> Value {
    match geometry {
        Geometry::Point { x, y, .. } => round_coord((*x, *y)),
        Geometry::LineString { points, .. } | Geometry::LinearRing { points, .. } | Geometry::MultiPoint { points, .. } => {
            Value::Array(points.iter().map(|c| round_coord(*c)).collect())
        }
        Geometry::Polygon { exterior, interiors, .. } => {
            let mut rings = vec![Value::Array(exterior.iter().map(|c| round_coord(*c)).collect())];
            rings.extend(interiors.iter().map(|ring| Value::Array(ring.iter().map(|c| round_coord(*c)).collect())));
            Value::Array(rings)
        }
        Geometry::MultiLineString { lines, .. } => {
            Value::Array(lines.iter().map(|l| Value::Array(l.iter().map(|c| round_coord(*c)).collect())).collect())
        }
        Geometry::MultiPolygon { polygons, .. } => Value::Array(
            polygons
                .iter()
                .map(|(ext, holes)| {
                    let mut rings = vec![Value::Array(ext.iter().map(|c| round_coord(*c)).collect())];
                    rings.extend(holes.iter().map(|ring| Value::Array(ring.iter().map(|c| round_coord(*c)).collect())));
                    Value::Array(rings)
                })
                .collect(),
        ),
        Geometry::GeometryCollection { .. } => Value::Null,
    }
}

/// Reproject `geometry` to CRS84 (SRID 4326) and render it as a GeoJSON
/// geometry object.
fn geometry_to_geojson(geometry: &Geometry, reprojector: &dyn Reprojector) -> Value {
    let projected = reprojector.reproject(geometry, 4326);
    if let Geometry::GeometryCollection { geometries, .. } = &projected {
        return json!({
            "type": "GeometryCollection",
            "geometries": geometries.iter().map(|g| geometry_to_geojson(g, reprojector)).collect::<Vec<_>>(),
        });
    }
    json!({ "type": projected.geometry_type_name(), "coordinates": coords_json(&projected) })
}

fn field_value_to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::String(s) => Value::String(s.clone()),
        FieldValue::Integer(i) => Value::from(*i),
        FieldValue::Double(d) => serde_json::Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null),
        FieldValue::Boolean(b) => Value::Bool(*b),
        FieldValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
        FieldValue::Geometry(_) | FieldValue::Array(_) => Value::Null,
    }
}

fn render_feature(graph: &SchemaGraph, sfc: &SimpleFeatureCollection, row: &Row, reprojector: &dyn Reprojector) -> GeoJsonFeature {
    let FieldValue::String(id) = row.get("id") else {
        return GeoJsonFeature { kind: "Feature", id: String::new(), geometry: Value::Null, properties: serde_json::Map::new() };
    };
    let mut geometry = Value::Null;
    let mut properties = serde_json::Map::new();

    for (element, value) in crate::projection::project_row(graph, &sfc.plan, row) {
        if element.is_geometry() {
            if let FieldValue::Geometry(g) = &value {
                geometry = geometry_to_geojson(g, reprojector);
            }
            continue;
        }
        properties.insert(element.local_name.clone(), field_value_to_json(&value));
    }

    GeoJsonFeature { kind: "Feature", id: format!("{}.{id}", sfc.feature.local_name), geometry, properties }
}

/// Render a GeoJSON `FeatureCollection` document across one or more
/// `SimpleFeatureCollection`s. Geometries are reprojected to CRS84
/// regardless of the requested output CRS, per SPEC_FULL.md §4.7.
pub fn render_geojson(
    graph: &SchemaGraph,
    collections: &[(SimpleFeatureCollection, FetchedPage)],
    reprojector: &dyn Reprojector,
    number_matched: Option<u64>,
    links: Vec<GeoJsonLink>,
) -> String {
    let mut features = Vec::new();
    for (sfc, page) in collections {
        for row in &page.rows {
            features.push(render_feature(graph, sfc, row, reprojector));
        }
    }
    let number_returned = features.len();
    let doc = GeoJsonFeatureCollection {
        kind: "FeatureCollection",
        features,
        number_matched,
        number_returned,
        crs: json!({ "type": "name", "properties": { "name": CRS84_URI } }),
        links,
    };
    serde_json::to_string(&doc).expect("GeoJSON feature collection is always serializable")
}

/// JSON exception document emitted when an error interrupts streaming
/// (SPEC_FULL.md §7's "an `exception` field in GeoJSON").
pub fn exception_marker(reason: &str) -> String {
    json!({ "exception": reason }).to_string()
}

/// Render `GetPropertyValue` rows as a flat JSON array of raw values,
/// rather than wrapping each one in a `Feature` envelope.
pub fn render_value_array(
    graph: &SchemaGraph,
    collections: &[(SimpleFeatureCollection, FetchedPage)],
    reprojector: &dyn Reprojector,
) -> String {
    let mut values = Vec::new();
    for (sfc, page) in collections {
        for row in &page.rows {
            for (element, value) in crate::projection::project_row(graph, &sfc.plan, row) {
                let json_value = if element.is_geometry() {
                    match &value {
                        FieldValue::Geometry(g) => geometry_to_geojson(g, reprojector),
                        _ => Value::Null,
                    }
                } else {
                    field_value_to_json(&value)
                };
                values.push(json_value);
            }
        }
    }
    serde_json::to_string(&values).expect("value array is always serializable")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::PageParams;
    use crate::crs::Crs;
    use crate::datastore::Predicate;
    use crate::query::{CompiledQuery, IdentityReprojector};
    use crate::registry::FeatureTypeInfo;
    use crate::xsd::{AtomicType, FieldSpec};
    use std::collections::HashMap;

    fn sample() -> (SchemaGraph, SimpleFeatureCollection, Row) {
        let mut graph = SchemaGraph::new();
        let type_id = graph.build_feature_type(
            "http://example.org/gisserver",
            "restaurant",
            "id",
            vec![
                FieldSpec::Scalar { name: "name", path: "name", atomic: AtomicType::String, nillable: false },
                FieldSpec::Geometry { name: "geometry", path: "geom", nillable: false },
            ],
        );
        let feature = FeatureTypeInfo {
            type_id,
            local_name: "restaurant".to_string(),
            namespace: "http://example.org/gisserver".to_string(),
            storage_crs: Crs::crs84(),
        };
        let compiled = CompiledQuery { type_id, predicate: Predicate::True, orderings: vec![], property_names: None, srs_name: None };
        let plan = crate::projection::build_projection_plan(&graph, &feature, "restaurant", None, None, false, false).unwrap();
        let sfc = SimpleFeatureCollection { feature, compiled, plan, page: PageParams { start_index: 0, count: 10 } };

        let mut values = HashMap::new();
        values.insert("id".to_string(), FieldValue::String("1".to_string()));
        values.insert("name".to_string(), FieldValue::String("Cafe Amsterdam".to_string()));
        values.insert("geom".to_string(), FieldValue::Geometry(Geometry::Point { srid: 4326, x: 5.0, y: 52.0 }));
        let row = Row { values };

        (graph, sfc, row)
    }

    #[test]
    fn renders_point_geometry_and_properties() {
        let (graph, sfc, row) = sample();
        let feature = render_feature(&graph, &sfc, &row, &IdentityReprojector);
        assert_eq!(feature.id, "restaurant.1");
        assert_eq!(feature.geometry["type"], "Point");
        assert_eq!(feature.geometry["coordinates"], json!([5.0, 52.0]));
        assert_eq!(feature.properties["name"], "Cafe Amsterdam");
    }

    #[test]
    fn feature_collection_includes_crs84_and_counts() {
        let (graph, sfc, row) = sample();
        let page = FetchedPage { rows: vec![row], prefetched: HashMap::new() };
        let json_text = render_geojson(&graph, &[(sfc, page)], &IdentityReprojector, Some(1), vec![]);
        let parsed: Value = serde_json::from_str(&json_text).unwrap();
        assert_eq!(parsed["numberMatched"], 1);
        assert_eq!(parsed["numberReturned"], 1);
        assert_eq!(parsed["crs"]["properties"]["name"], CRS84_URI);
    }

    #[test]
    fn omits_number_matched_when_unknown() {
        let (graph, sfc, row) = sample();
        let page = FetchedPage { rows: vec![row], prefetched: HashMap::new() };
        let json_text = render_geojson(&graph, &[(sfc, page)], &IdentityReprojector, None, vec![]);
        let parsed: Value = serde_json::from_str(&json_text).unwrap();
        assert!(parsed.get("numberMatched").is_none());
    }

    #[test]
    fn value_array_flattens_selected_properties() {
        let (graph, sfc, row) = sample();
        let page = FetchedPage { rows: vec![row], prefetched: HashMap::new() };
        let json_text = render_value_array(&graph, &[(sfc, page)], &IdentityReprojector);
        let parsed: Value = serde_json::from_str(&json_text).unwrap();
        assert_eq!(parsed, json!(["Cafe Amsterdam", {"type": "Point", "coordinates": [5.0, 52.0]}]));
    }
}
