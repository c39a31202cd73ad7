//! GML 3.2 geometry literal parsing.
//!
//! Grounded on the generic XML tree in `ast::xml` (itself grounded on the
//! AIXM parser file) plus the axis-order handling in `crs`/`geom`.

use crate::crs::Crs;
use crate::error::WfsError;
use crate::geom::Geometry;

use super::xml::XmlElement;

fn parse_coord_list(text: &str) -> Result<Vec<(f64, f64)>, WfsError> {
    let numbers: Result<Vec<f64>, _> =
        text.split_whitespace().map(|tok| tok.parse::<f64>()).collect();
    let numbers = numbers.map_err(|_| WfsError::parsing_failed("invalid GML coordinate list"))?;
    if numbers.len() % 2 != 0 {
        return Err(WfsError::parsing_failed("GML coordinate list has an odd number of values"));
    }
    Ok(numbers.chunks(2).map(|c| (c[0], c[1])).collect())
}

fn coords_of(el: &XmlElement) -> Result<Vec<(f64, f64)>, WfsError> {
    if let Some(pos_list) = el.child("posList") {
        return parse_coord_list(pos_list.text_trimmed());
    }
    let positions: Vec<&XmlElement> = el.children_named("pos").collect();
    if !positions.is_empty() {
        let mut out = Vec::new();
        for p in positions {
            let coords = parse_coord_list(p.text_trimmed())?;
            out.extend(coords);
        }
        return Ok(out);
    }
    Err(WfsError::parsing_failed(format!("{} has no posList/pos content", el.local_name)))
}

fn srs_name_of(el: &XmlElement, force_xy_epsg4326: bool, force_xy_old_crs: bool) -> Result<Crs, WfsError> {
    match el.attr("srsName") {
        Some(uri) => Crs::parse(uri, force_xy_epsg4326, force_xy_old_crs),
        None => Ok(Crs::crs84()),
    }
}

/// Parse any supported GML 3.2 geometry literal element.
pub fn parse_geometry(
    el: &XmlElement,
    force_xy_epsg4326: bool,
    force_xy_old_crs: bool,
) -> Result<Geometry, WfsError> {
    let crs = srs_name_of(el, force_xy_epsg4326, force_xy_old_crs)?;
    let raw = parse_geometry_inner(el, &crs, force_xy_epsg4326, force_xy_old_crs)?;
    Ok(raw.orient_for(&crs))
}

fn parse_geometry_inner(
    el: &XmlElement,
    crs: &Crs,
    force_xy_epsg4326: bool,
    force_xy_old_crs: bool,
) -> Result<Geometry, WfsError> {
    match el.local_name.as_str() {
        "Point" => {
            let coords = coords_of(el)?;
            let (x, y) = *coords
                .first()
                .ok_or_else(|| WfsError::parsing_failed("gml:Point has no coordinates"))?;
            Ok(Geometry::Point { srid: crs.srid, x, y })
        }
        "LineString" => Ok(Geometry::LineString { srid: crs.srid, points: coords_of(el)? }),
        "LinearRing" => Ok(Geometry::LinearRing { srid: crs.srid, points: coords_of(el)? }),
        "Polygon" => {
            let exterior = el
                .child("exterior")
                .and_then(|e| e.child("LinearRing"))
                .map(coords_of)
                .transpose()?
                .ok_or_else(|| WfsError::parsing_failed("gml:Polygon has no exterior ring"))?;
            let mut interiors = Vec::new();
            for interior in el.children_named("interior") {
                if let Some(ring) = interior.child("LinearRing") {
                    interiors.push(coords_of(ring)?);
                }
            }
            Ok(Geometry::Polygon { srid: crs.srid, exterior, interiors })
        }
        "MultiPoint" => {
            let mut points = Vec::new();
            for member in el.children_named("pointMember") {
                if let Some(point) = member.child("Point") {
                    let coords = coords_of(point)?;
                    points.extend(coords);
                }
            }
            Ok(Geometry::MultiPoint { srid: crs.srid, points })
        }
        "MultiLineString" => {
            let mut lines = Vec::new();
            for member in el.children_named("lineStringMember") {
                if let Some(ls) = member.child("LineString") {
                    lines.push(coords_of(ls)?);
                }
            }
            Ok(Geometry::MultiLineString { srid: crs.srid, lines })
        }
        "MultiPolygon" | "MultiSurface" => {
            let member_tag = if el.local_name == "MultiPolygon" { "polygonMember" } else { "surfaceMember" };
            let mut polygons = Vec::new();
            for member in el.children_named(member_tag) {
                if let Some(polygon) = member.child("Polygon") {
                    let Geometry::Polygon { exterior, interiors, .. } =
                        parse_geometry_inner(polygon, crs, force_xy_epsg4326, force_xy_old_crs)?
                    else {
                        unreachable!("child of Polygon tag always parses to Geometry::Polygon")
                    };
                    polygons.push((exterior, interiors));
                }
            }
            Ok(Geometry::MultiPolygon { srid: crs.srid, polygons })
        }
        "Envelope" => {
            let lower = el
                .child("lowerCorner")
                .ok_or_else(|| WfsError::parsing_failed("gml:Envelope has no lowerCorner"))?;
            let upper = el
                .child("upperCorner")
                .ok_or_else(|| WfsError::parsing_failed("gml:Envelope has no upperCorner"))?;
            let lower = parse_coord_list(lower.text_trimmed())?;
            let upper = parse_coord_list(upper.text_trimmed())?;
            let (lx, ly) = lower[0];
            let (ux, uy) = upper[0];
            Ok(Geometry::Polygon {
                srid: crs.srid,
                exterior: vec![(lx, ly), (ux, ly), (ux, uy), (lx, uy), (lx, ly)],
                interiors: vec![],
            })
        }
        other => Err(WfsError::parsing_failed_at(format!("unsupported GML geometry element: {other}"), other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::xml::parse_document;

    #[test]
    fn parses_point_xy_crs() {
        let doc = r#"<gml:Point xmlns:gml="http://www.opengis.net/gml/3.2" srsName="urn:ogc:def:crs:OGC::CRS84">
            <gml:pos>5.0 52.0</gml:pos>
        </gml:Point>"#;
        let el = parse_document(doc).unwrap();
        let g = parse_geometry(&el, false, false).unwrap();
        assert_eq!(g, Geometry::Point { srid: 4326, x: 5.0, y: 52.0 });
    }

    #[test]
    fn parses_point_lat_lon_crs_and_swaps() {
        let doc = r#"<gml:Point xmlns:gml="http://www.opengis.net/gml/3.2" srsName="urn:ogc:def:crs:EPSG::4326">
            <gml:pos>52.0 5.0</gml:pos>
        </gml:Point>"#;
        let el = parse_document(doc).unwrap();
        let g = parse_geometry(&el, false, false).unwrap();
        // EPSG:4326 is lat/lon on the wire; in-memory storage is x/y.
        assert_eq!(g, Geometry::Point { srid: 4326, x: 5.0, y: 52.0 });
    }

    #[test]
    fn parses_polygon_with_hole() {
        let doc = r#"<gml:Polygon xmlns:gml="http://www.opengis.net/gml/3.2" srsName="urn:ogc:def:crs:EPSG::28992">
            <gml:exterior><gml:LinearRing><gml:posList>0 0 10 0 10 10 0 10 0 0</gml:posList></gml:LinearRing></gml:exterior>
            <gml:interior><gml:LinearRing><gml:posList>2 2 3 2 3 3 2 2</gml:posList></gml:LinearRing></gml:interior>
        </gml:Polygon>"#;
        let el = parse_document(doc).unwrap();
        let g = parse_geometry(&el, false, false).unwrap();
        let Geometry::Polygon { exterior, interiors, .. } = g else { panic!("expected polygon") };
        assert_eq!(exterior.len(), 5);
        assert_eq!(interiors.len(), 1);
    }

    #[test]
    fn rejects_odd_coordinate_count() {
        let doc = r#"<gml:Point xmlns:gml="http://www.opengis.net/gml/3.2"><gml:pos>1.0 2.0 3.0</gml:pos></gml:Point>"#;
        let el = parse_document(doc).unwrap();
        // odd count ok here (3 values -> error expected since we require pairs)
        let err = parse_geometry(&el, false, false).unwrap_err();
        assert_eq!(err.exception_code(), "OperationParsingFailed");
    }
}
