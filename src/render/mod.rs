//! Output renderers (SPEC_FULL.md §4.7-4.8): GML 3.2, GeoJSON, CSV feature
//! collections, plus the three XML document responses (`GetCapabilities`,
//! `DescribeFeatureType`, stored-query listings).
//!
//! Grounded on `src/api/features/handlers.rs`'s pagination `Link` building
//! and `src/api/common.rs`'s `Link`/`rel`/`media_type` constants for the
//! GeoJSON pagination-link shape, and on
//! `examples/other_examples/68010546_AeronauticalMaps-libefb__aixm-src-parser.rs.rs`
//! for the shape of GML element emission (here built by direct string
//! concatenation rather than a writer, matching the rest of this module).
//!
//! Each renderer here builds its document as one in-memory `String` rather
//! than a lazy chunk iterator: the reference datastore and the single-page
//! test fixtures this crate exercises never produce enough rows to need
//! back-pressure, and chunking the same builder calls into a streaming
//! `futures::Stream` is a mechanical follow-up that touches only the HTTP
//! handler, not the rendering logic below.

pub mod capabilities;
pub mod csv;
pub mod describe_feature_type;
pub mod geojson;
pub mod gml;

use crate::crs::{AxisOrder, Crs};
use crate::geom::{Coord, Geometry};

pub const COORDINATE_PRECISION: usize = 6;

pub fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;").replace('\'', "&apos;")
}

pub fn format_number(n: f64) -> String {
    format!("{n:.*}", COORDINATE_PRECISION)
}

fn oriented_coords(coords: &[Coord], crs: &Crs) -> Vec<Coord> {
    match crs.axis_order {
        AxisOrder::Xy => coords.to_vec(),
        AxisOrder::Yx => coords.iter().map(|(x, y)| (*y, *x)).collect(),
    }
}

/// Render a GML `posList`/`pos` coordinate string in the output CRS's wire
/// axis order (storage is always x/y; the wire order may be y/x).
pub fn pos_list(coords: &[Coord], crs: &Crs) -> String {
    oriented_coords(coords, crs)
        .iter()
        .map(|(a, b)| format!("{} {}", format_number(*a), format_number(*b)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render a geometry's coordinates as GeoJSON-style `[lon, lat]` pairs,
/// always in CRS84 (x/y) order regardless of the in-memory storage CRS.
pub fn geojson_coord(coord: Coord) -> String {
    format!("[{}, {}]", format_number(coord.0), format_number(coord.1))
}

/// `{typenames} {page} {date}.{ext}` filename template for
/// `Content-Disposition` (SPEC_FULL.md §4.7).
pub fn content_disposition_filename(type_names: &[String], start_index: u32, date: &str, ext: &str) -> String {
    format!("{} {} {date}.{ext}", type_names.join("_"), start_index)
}

/// Render one `Geometry` as a GML 3.2 element, in the output CRS's axis
/// order. `srs_name` is included on the outermost element only.
pub fn geometry_to_gml(geometry: &Geometry, crs: &Crs) -> String {
    let srs_attr = format!(" srsName=\"{}\"", xml_escape(crs.uri()));
    render_gml_inner(geometry, crs, &srs_attr)
}

fn render_gml_inner(geometry: &Geometry, crs: &Crs, srs_attr: &str) -> String {
    match geometry {
        Geometry::Point { x, y, .. } => {
            format!("<gml:Point{srs_attr}><gml:pos>{}</gml:pos></gml:Point>", pos_list(&[(*x, *y)], crs))
        }
        Geometry::LineString { points, .. } => {
            format!("<gml:LineString{srs_attr}><gml:posList>{}</gml:posList></gml:LineString>", pos_list(points, crs))
        }
        Geometry::LinearRing { points, .. } => {
            format!("<gml:LinearRing{srs_attr}><gml:posList>{}</gml:posList></gml:LinearRing>", pos_list(points, crs))
        }
        Geometry::Polygon { exterior, interiors, .. } => {
            let mut out = format!(
                "<gml:Polygon{srs_attr}><gml:exterior><gml:LinearRing><gml:posList>{}</gml:posList></gml:LinearRing></gml:exterior>",
                pos_list(exterior, crs)
            );
            for ring in interiors {
                out.push_str(&format!(
                    "<gml:interior><gml:LinearRing><gml:posList>{}</gml:posList></gml:LinearRing></gml:interior>",
                    pos_list(ring, crs)
                ));
            }
            out.push_str("</gml:Polygon>");
            out
        }
        Geometry::MultiPoint { points, .. } => {
            let members: String = points
                .iter()
                .map(|p| format!("<gml:pointMember>{}</gml:pointMember>", render_gml_inner(&Geometry::Point { srid: geometry.srid(), x: p.0, y: p.1 }, crs, "")))
                .collect();
            format!("<gml:MultiPoint{srs_attr}>{members}</gml:MultiPoint>")
        }
        Geometry::MultiLineString { lines, .. } => {
            let members: String = lines
                .iter()
                .map(|l| format!("<gml:lineStringMember>{}</gml:lineStringMember>", render_gml_inner(&Geometry::LineString { srid: geometry.srid(), points: l.clone() }, crs, "")))
                .collect();
            format!("<gml:MultiLineString{srs_attr}>{members}</gml:MultiLineString>")
        }
        Geometry::MultiPolygon { polygons, .. } => {
            let members: String = polygons
                .iter()
                .map(|(ext, holes)| {
                    format!(
                        "<gml:polygonMember>{}</gml:polygonMember>",
                        render_gml_inner(&Geometry::Polygon { srid: geometry.srid(), exterior: ext.clone(), interiors: holes.clone() }, crs, "")
                    )
                })
                .collect();
            format!("<gml:MultiPolygon{srs_attr}>{members}</gml:MultiPolygon>")
        }
        Geometry::GeometryCollection { geometries, .. } => {
            let members: String = geometries.iter().map(|g| format!("<gml:geometryMember>{}</gml:geometryMember>", render_gml_inner(g, crs, ""))).collect();
            format!("<gml:MultiGeometry{srs_attr}>{members}</gml:MultiGeometry>")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_reserved_xml_characters() {
        assert_eq!(xml_escape("<a & b>"), "&lt;a &amp; b&gt;");
    }

    #[test]
    fn formats_fixed_precision() {
        assert_eq!(format_number(1.0), "1.000000");
        assert_eq!(format_number(1.23456789), "1.234568");
    }

    #[test]
    fn pos_list_swaps_axes_for_lat_lon_crs() {
        let coords = vec![(5.0, 52.0)];
        assert_eq!(pos_list(&coords, &Crs::crs84()), "5.000000 52.000000");
        assert_eq!(pos_list(&coords, &Crs::from_epsg(4326)), "52.000000 5.000000");
    }

    #[test]
    fn renders_point_as_gml() {
        let g = Geometry::Point { srid: 4326, x: 5.0, y: 52.0 };
        let xml = geometry_to_gml(&g, &Crs::crs84());
        assert!(xml.contains("<gml:pos>5.000000 52.000000</gml:pos>"));
        assert!(xml.contains("srsName=\"urn:ogc:def:crs:OGC::CRS84\""));
    }

    #[test]
    fn content_disposition_filename_matches_template() {
        let name = content_disposition_filename(&["app:restaurant".to_string()], 0, "2026-08-01", "gml");
        assert_eq!(name, "app:restaurant 0 2026-08-01.gml");
    }
}
