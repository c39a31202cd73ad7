//! CSV feature collection rendering (SPEC_FULL.md §4.7): one row per
//! feature, scalar columns only, geometry rendered as WKT-ish text because
//! CSV has no native geometry encoding.
//!
//! Grounded on `src/api/features/handlers.rs`'s CSV export handler, which
//! builds a header row from the first record's keys and writes one line per
//! record with the same quoting rule used here.

use crate::collection::{FetchedPage, SimpleFeatureCollection};
use crate::datastore::Row;
use crate::xsd::{FieldValue, SchemaGraph};

pub const CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// Quote a field per RFC 4180: wrap in quotes and double any embedded quote
/// if the field contains a comma, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn format_cell(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => String::new(),
        FieldValue::String(s) => s.clone(),
        FieldValue::Integer(i) => i.to_string(),
        FieldValue::Double(d) => d.to_string(),
        FieldValue::Boolean(b) => b.to_string(),
        FieldValue::DateTime(dt) => dt.to_rfc3339(),
        FieldValue::Geometry(g) => wkt(g),
        FieldValue::Array(_) => String::new(),
    }
}

fn wkt_coords(coords: &[(f64, f64)]) -> String {
    coords.iter().map(|(x, y)| format!("{x} {y}")).collect::<Vec<_>>().join(", ")
}

/// A compact WKT rendering. CSV has no structured geometry column, so this
/// is the de-facto interchange form spreadsheet/GIS tools expect.
fn wkt(geometry: &crate::geom::Geometry) -> String {
    use crate::geom::Geometry;
    match geometry {
        Geometry::Point { x, y, .. } => format!("POINT ({x} {y})"),
        Geometry::LineString { points, .. } | Geometry::LinearRing { points, .. } => {
            format!("LINESTRING ({})", wkt_coords(points))
        }
        Geometry::Polygon { exterior, interiors, .. } => {
            let mut rings = vec![format!("({})", wkt_coords(exterior))];
            rings.extend(interiors.iter().map(|r| format!("({})", wkt_coords(r))));
            format!("POLYGON ({})", rings.join(", "))
        }
        Geometry::MultiPoint { points, .. } => format!("MULTIPOINT ({})", wkt_coords(points)),
        Geometry::MultiLineString { lines, .. } => {
            format!("MULTILINESTRING ({})", lines.iter().map(|l| format!("({})", wkt_coords(l))).collect::<Vec<_>>().join(", "))
        }
        Geometry::MultiPolygon { polygons, .. } => format!(
            "MULTIPOLYGON ({})",
            polygons
                .iter()
                .map(|(ext, holes)| {
                    let mut rings = vec![format!("({})", wkt_coords(ext))];
                    rings.extend(holes.iter().map(|r| format!("({})", wkt_coords(r))));
                    format!("({})", rings.join(", "))
                })
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Geometry::GeometryCollection { geometries, .. } => {
            format!("GEOMETRYCOLLECTION ({})", geometries.iter().map(wkt).collect::<Vec<_>>().join(", "))
        }
    }
}

fn row_cells(graph: &SchemaGraph, sfc: &SimpleFeatureCollection, row: &Row, columns: &[String]) -> Vec<String> {
    let projected = crate::projection::project_row(graph, &sfc.plan, row);
    columns
        .iter()
        .map(|col| {
            projected
                .iter()
                .find(|(el, _)| &el.local_name == col)
                .map(|(_, v)| format_cell(v))
                .unwrap_or_default()
        })
        .collect()
}

/// Render one or more `SimpleFeatureCollection`s as a single CSV document.
/// The header is taken from the first collection's selected element names;
/// later collections are expected to share the same column set (WFS CSV
/// output is only meaningful for a single requested feature type).
pub fn render_csv(graph: &SchemaGraph, collections: &[(SimpleFeatureCollection, FetchedPage)]) -> String {
    let Some((first, _)) = collections.first() else {
        return String::new();
    };
    let columns: Vec<String> = first.plan.selected.iter().map(|s| graph.element_by_id(s.element_id).local_name.clone()).collect();

    let mut out = String::new();
    out.push_str(&columns.iter().map(|c| csv_field(c)).collect::<Vec<_>>().join(","));
    out.push_str("\r\n");

    for (sfc, page) in collections {
        for row in &page.rows {
            let cells = row_cells(graph, sfc, row, &columns);
            out.push_str(&cells.iter().map(|c| csv_field(c)).collect::<Vec<_>>().join(","));
            out.push_str("\r\n");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::PageParams;
    use crate::crs::Crs;
    use crate::datastore::Predicate;
    use crate::geom::Geometry;
    use crate::query::CompiledQuery;
    use crate::registry::FeatureTypeInfo;
    use crate::xsd::{AtomicType, FieldSpec, SchemaGraph};
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
        values.insert("name".to_string(), FieldValue::String("Cafe, Amsterdam".to_string()));
        values.insert("geom".to_string(), FieldValue::Geometry(Geometry::Point { srid: 4326, x: 5.0, y: 52.0 }));
        let row = Row { values };

        (graph, sfc, row)
    }

    #[test]
    fn quotes_fields_with_commas() {
        assert_eq!(csv_field("Cafe, Amsterdam"), "\"Cafe, Amsterdam\"");
        assert_eq!(csv_field("plain"), "plain");
    }

    #[test]
    fn renders_header_and_row() {
        let (graph, sfc, row) = sample();
        let page = FetchedPage { rows: vec![row], prefetched: HashMap::new() };
        let csv = render_csv(&graph, &[(sfc, page)]);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("name,geometry"));
        let data = lines.next().unwrap();
        assert!(data.contains("\"Cafe, Amsterdam\""));
        assert!(data.contains("POINT (5 52)"));
    }

    #[test]
    fn empty_collections_render_empty_document() {
        assert_eq!(render_csv(&SchemaGraph::new(), &[]), "");
    }
}
