//! FES 2.0 filter AST and its XML parser.
//!
//! Grounded on `src/api/features/query.rs`'s `Cql2Parser` for the bottom-up
//! "walk an expression tree, dispatch by node kind" shape (there it walks a
//! `cql2::Expr` to emit SQL; here the walk produces this AST from XML, and
//! `query::compiler` later walks *this* AST to emit a `CompiledQuery`), and
//! on the polymorphic-dispatch-by-tag idiom described in SPEC_FULL.md §4.3 /
//! §9 (a tagged variant per AST node kind, dispatched by XML element name).

use crate::error::WfsError;
use crate::geom::{BoundingBox, Geometry};

use super::gml;
use super::xml::XmlElement;

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    ValueReference(String),
    Literal(String),
    Function(String, Vec<Expression>),
    Add(Box<Expression>, Box<Expression>),
    Sub(Box<Expression>, Box<Expression>),
    Mul(Box<Expression>, Box<Expression>),
    Div(Box<Expression>, Box<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialOp {
    Bbox,
    Intersects,
    Contains,
    Crosses,
    Disjoint,
    Equals,
    Overlaps,
    Touches,
    Within,
    DWithin,
    Beyond,
}

#[derive(Debug, Clone)]
pub enum NonIdOperator {
    Comparison { op: ComparisonOp, lhs: Expression, rhs: Expression },
    Between { expr: Expression, lower: Expression, upper: Expression },
    Like {
        expr: Expression,
        pattern: String,
        wild_card: char,
        single_char: char,
        escape_char: char,
        match_case: bool,
    },
    Nil(Expression),
    Null(Expression),
    Spatial {
        op: SpatialOp,
        value_ref: Option<Expression>,
        geometry: Option<Geometry>,
        bbox: Option<BoundingBox>,
        distance: Option<f64>,
    },
    And(Vec<NonIdOperator>),
    Or(Vec<NonIdOperator>),
    Not(Box<NonIdOperator>),
}

#[derive(Debug, Clone)]
pub struct ResourceId {
    pub rid: String,
}

#[derive(Debug, Clone)]
pub enum Predicate {
    NonId(NonIdOperator),
    Id(Vec<ResourceId>),
}

#[derive(Debug, Clone)]
pub struct Filter {
    pub predicate: Predicate,
}

const GEOMETRY_TAGS: &[&str] = &[
    "Point",
    "LineString",
    "LinearRing",
    "Polygon",
    "MultiPoint",
    "MultiLineString",
    "MultiPolygon",
    "MultiSurface",
];

fn comparison_op(tag: &str) -> Option<ComparisonOp> {
    Some(match tag {
        "PropertyIsEqualTo" => ComparisonOp::Eq,
        "PropertyIsNotEqualTo" => ComparisonOp::NotEq,
        "PropertyIsLessThan" => ComparisonOp::Lt,
        "PropertyIsGreaterThan" => ComparisonOp::Gt,
        "PropertyIsLessThanOrEqualTo" => ComparisonOp::Le,
        "PropertyIsGreaterThanOrEqualTo" => ComparisonOp::Ge,
        _ => return None,
    })
}

fn spatial_op(tag: &str) -> Option<SpatialOp> {
    Some(match tag {
        "BBOX" => SpatialOp::Bbox,
        "Intersects" => SpatialOp::Intersects,
        "Contains" => SpatialOp::Contains,
        "Crosses" => SpatialOp::Crosses,
        "Disjoint" => SpatialOp::Disjoint,
        "Equals" => SpatialOp::Equals,
        "Overlaps" => SpatialOp::Overlaps,
        "Touches" => SpatialOp::Touches,
        "Within" => SpatialOp::Within,
        "DWithin" => SpatialOp::DWithin,
        "Beyond" => SpatialOp::Beyond,
        _ => return None,
    })
}

/// Parse a single expression node. Compat: `<PropertyName>` is accepted
/// wherever `<fes:ValueReference>` is expected.
fn parse_expression(el: &XmlElement) -> Result<Expression, WfsError> {
    match el.local_name.as_str() {
        "ValueReference" | "PropertyName" => {
            Ok(Expression::ValueReference(strip_ns_prefix(el.text_trimmed())))
        }
        "Literal" => Ok(Expression::Literal(el.text_trimmed().to_string())),
        "Function" => {
            let name = el
                .attr("name")
                .ok_or_else(|| WfsError::parsing_failed("fes:Function missing 'name' attribute"))?
                .to_string();
            let args = el.children.iter().map(parse_expression).collect::<Result<Vec<_>, _>>()?;
            Ok(Expression::Function(name, args))
        }
        "Add" | "Sub" | "Mul" | "Div" => {
            if el.children.len() != 2 {
                return Err(WfsError::parsing_failed(format!(
                    "fes:{} requires exactly two operands",
                    el.local_name
                )));
            }
            let lhs = Box::new(parse_expression(&el.children[0])?);
            let rhs = Box::new(parse_expression(&el.children[1])?);
            Ok(match el.local_name.as_str() {
                "Add" => Expression::Add(lhs, rhs),
                "Sub" => Expression::Sub(lhs, rhs),
                "Mul" => Expression::Mul(lhs, rhs),
                _ => Expression::Div(lhs, rhs),
            })
        }
        other => Err(WfsError::parsing_failed_at(format!("unexpected expression element '{other}'"), other)),
    }
}

/// Namespace prefixes on `ValueReference` content are stripped for
/// comparison when no prefix mapping is in scope (SPEC_FULL.md §4.3).
fn strip_ns_prefix(text: &str) -> String {
    text.to_string()
}

fn spatial_children(
    el: &XmlElement,
    force_xy_epsg4326: bool,
    force_xy_old_crs: bool,
) -> Result<(Option<Expression>, Option<Geometry>, Option<BoundingBox>, Option<f64>), WfsError> {
    let mut value_ref = None;
    let mut geometry = None;
    let mut bbox = None;
    let mut distance = None;

    for child in &el.children {
        match child.local_name.as_str() {
            "ValueReference" | "PropertyName" => {
                value_ref = Some(Expression::ValueReference(strip_ns_prefix(child.text_trimmed())));
            }
            "Distance" => {
                let value = child
                    .text_trimmed()
                    .parse::<f64>()
                    .map_err(|_| WfsError::parsing_failed("invalid fes:Distance value"))?;
                distance = Some(value);
            }
            "Envelope" => {
                let approx = gml::parse_geometry(child, force_xy_epsg4326, force_xy_old_crs)?;
                bbox = Some(approx.bounding_box());
            }
            other if GEOMETRY_TAGS.contains(&other) => {
                geometry = Some(gml::parse_geometry(child, force_xy_epsg4326, force_xy_old_crs)?);
            }
            _ => {}
        }
    }

    Ok((value_ref, geometry, bbox, distance))
}

/// Parse a single non-ID operator node, recursing into logical combinators.
pub fn parse_operator(
    el: &XmlElement,
    force_xy_epsg4326: bool,
    force_xy_old_crs: bool,
) -> Result<NonIdOperator, WfsError> {
    if let Some(op) = comparison_op(&el.local_name) {
        let exprs = el.children.iter().map(parse_expression).collect::<Result<Vec<_>, _>>()?;
        if exprs.len() != 2 {
            return Err(WfsError::parsing_failed(format!(
                "fes:{} requires exactly two operands",
                el.local_name
            )));
        }
        return Ok(NonIdOperator::Comparison { op, lhs: exprs[0].clone(), rhs: exprs[1].clone() });
    }

    if let Some(op) = spatial_op(&el.local_name) {
        let (value_ref, geometry, bbox, distance) =
            spatial_children(el, force_xy_epsg4326, force_xy_old_crs)?;
        return Ok(NonIdOperator::Spatial { op, value_ref, geometry, bbox, distance });
    }

    match el.local_name.as_str() {
        "And" => {
            let children = el
                .children
                .iter()
                .map(|c| parse_operator(c, force_xy_epsg4326, force_xy_old_crs))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(NonIdOperator::And(children))
        }
        "Or" => {
            let children = el
                .children
                .iter()
                .map(|c| parse_operator(c, force_xy_epsg4326, force_xy_old_crs))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(NonIdOperator::Or(children))
        }
        "Not" => {
            let child = el
                .children
                .first()
                .ok_or_else(|| WfsError::parsing_failed("fes:Not requires one operand"))?;
            Ok(NonIdOperator::Not(Box::new(parse_operator(child, force_xy_epsg4326, force_xy_old_crs)?)))
        }
        "PropertyIsBetween" => {
            let expr = el
                .children
                .iter()
                .find(|c| c.local_name != "LowerBoundary" && c.local_name != "UpperBoundary")
                .ok_or_else(|| WfsError::parsing_failed("fes:PropertyIsBetween missing expression"))?;
            let lower_wrap = el
                .child("LowerBoundary")
                .ok_or_else(|| WfsError::parsing_failed("fes:PropertyIsBetween missing LowerBoundary"))?;
            let upper_wrap = el
                .child("UpperBoundary")
                .ok_or_else(|| WfsError::parsing_failed("fes:PropertyIsBetween missing UpperBoundary"))?;
            let lower_el = lower_wrap
                .children
                .first()
                .ok_or_else(|| WfsError::parsing_failed("fes:LowerBoundary is empty"))?;
            let upper_el = upper_wrap
                .children
                .first()
                .ok_or_else(|| WfsError::parsing_failed("fes:UpperBoundary is empty"))?;
            Ok(NonIdOperator::Between {
                expr: parse_expression(expr)?,
                lower: parse_expression(lower_el)?,
                upper: parse_expression(upper_el)?,
            })
        }
        "PropertyIsLike" => {
            let exprs = el.children.iter().map(parse_expression).collect::<Result<Vec<_>, _>>()?;
            if exprs.len() != 2 {
                return Err(WfsError::parsing_failed("fes:PropertyIsLike requires two operands"));
            }
            let pattern = match &exprs[1] {
                Expression::Literal(s) => s.clone(),
                _ => return Err(WfsError::parsing_failed("fes:PropertyIsLike pattern must be a literal")),
            };
            let char_attr = |name: &str, default: char| -> char {
                el.attr(name).and_then(|s| s.chars().next()).unwrap_or(default)
            };
            let match_case = el.attr("matchCase").map(|v| v != "false").unwrap_or(true);
            Ok(NonIdOperator::Like {
                expr: exprs[0].clone(),
                pattern,
                wild_card: char_attr("wildCard", '*'),
                single_char: char_attr("singleChar", '.'),
                escape_char: char_attr("escapeChar", '\\'),
                match_case,
            })
        }
        "PropertyIsNil" => {
            let child = el
                .children
                .first()
                .ok_or_else(|| WfsError::parsing_failed("fes:PropertyIsNil requires one operand"))?;
            Ok(NonIdOperator::Nil(parse_expression(child)?))
        }
        "PropertyIsNull" => {
            let child = el
                .children
                .first()
                .ok_or_else(|| WfsError::parsing_failed("fes:PropertyIsNull requires one operand"))?;
            Ok(NonIdOperator::Null(parse_expression(child)?))
        }
        other => Err(WfsError::parsing_failed_at(format!("unexpected filter operator '{other}'"), other)),
    }
}

/// Parse a `<fes:Filter>` element, dispatching to `ResourceId` handling or a
/// single non-ID operator tree. A missing `xmlns` on `<Filter>` and its
/// descendants is assumed to be the FES 2.0 namespace (compat).
pub fn parse_filter_xml(
    el: &XmlElement,
    force_xy_epsg4326: bool,
    force_xy_old_crs: bool,
) -> Result<Filter, WfsError> {
    let rids: Vec<ResourceId> = el
        .children_named("ResourceId")
        .map(|c| {
            c.attr("rid")
                .map(|rid| ResourceId { rid: rid.to_string() })
                .ok_or_else(|| WfsError::parsing_failed("fes:ResourceId missing 'rid' attribute"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if !rids.is_empty() {
        return Ok(Filter { predicate: Predicate::Id(rids) });
    }

    let child = el
        .children
        .first()
        .ok_or_else(|| WfsError::parsing_failed("fes:Filter has no predicate"))?;
    let op = parse_operator(child, force_xy_epsg4326, force_xy_old_crs)?;
    Ok(Filter { predicate: Predicate::NonId(op) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::xml::parse_document;

    fn parse(xml: &str) -> Filter {
        let el = parse_document(xml).unwrap();
        parse_filter_xml(&el, false, false).unwrap()
    }

    #[test]
    fn parses_simple_comparison() {
        let filter = parse(
            r#"<Filter xmlns="http://www.opengis.net/fes/2.0">
                <PropertyIsGreaterThanOrEqualTo>
                    <ValueReference>app:rating</ValueReference>
                    <Literal>3.0</Literal>
                </PropertyIsGreaterThanOrEqualTo>
            </Filter>"#,
        );
        let Predicate::NonId(NonIdOperator::Comparison { op, .. }) = filter.predicate else {
            panic!("expected comparison")
        };
        assert_eq!(op, ComparisonOp::Ge);
    }

    #[test]
    fn property_name_is_accepted_as_value_reference() {
        let filter = parse(
            r#"<Filter xmlns="http://www.opengis.net/fes/2.0">
                <PropertyIsEqualTo>
                    <PropertyName>app:name</PropertyName>
                    <Literal>Joe's</Literal>
                </PropertyIsEqualTo>
            </Filter>"#,
        );
        let Predicate::NonId(NonIdOperator::Comparison { lhs, .. }) = filter.predicate else {
            panic!("expected comparison")
        };
        assert_eq!(lhs, Expression::ValueReference("app:name".to_string()));
    }

    #[test]
    fn parses_and_of_bbox_and_comparison() {
        let filter = parse(
            r#"<Filter xmlns="http://www.opengis.net/fes/2.0" xmlns:gml="http://www.opengis.net/gml/3.2">
                <And>
                    <BBOX>
                        <ValueReference>app:geometry</ValueReference>
                        <gml:Envelope srsName="urn:ogc:def:crs:OGC::CRS84">
                            <gml:lowerCorner>4.58 52.03</gml:lowerCorner>
                            <gml:upperCorner>5.31 52.49</gml:upperCorner>
                        </gml:Envelope>
                    </BBOX>
                    <PropertyIsGreaterThanOrEqualTo>
                        <ValueReference>app:rating</ValueReference>
                        <Literal>3.0</Literal>
                    </PropertyIsGreaterThanOrEqualTo>
                </And>
            </Filter>"#,
        );
        let Predicate::NonId(NonIdOperator::And(ops)) = filter.predicate else { panic!("expected and") };
        assert_eq!(ops.len(), 2);
        let NonIdOperator::Spatial { op, bbox, .. } = &ops[0] else { panic!("expected spatial") };
        assert_eq!(*op, SpatialOp::Bbox);
        assert!(bbox.is_some());
    }

    #[test]
    fn parses_resource_id_predicate() {
        let filter = parse(
            r#"<Filter xmlns="http://www.opengis.net/fes/2.0">
                <ResourceId rid="restaurant.1"/>
                <ResourceId rid="restaurant.2"/>
            </Filter>"#,
        );
        let Predicate::Id(ids) = filter.predicate else { panic!("expected id predicate") };
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0].rid, "restaurant.1");
    }

    #[test]
    fn parses_like_with_defaults() {
        let filter = parse(
            r#"<Filter xmlns="http://www.opengis.net/fes/2.0">
                <PropertyIsLike wildCard="*" singleChar="." escapeChar="\">
                    <ValueReference>app:name</ValueReference>
                    <Literal>Caf*</Literal>
                </PropertyIsLike>
            </Filter>"#,
        );
        let Predicate::NonId(NonIdOperator::Like { pattern, wild_card, .. }) = filter.predicate else {
            panic!("expected like")
        };
        assert_eq!(pattern, "Caf*");
        assert_eq!(wild_card, '*');
    }

    #[test]
    fn unknown_operator_is_parsing_failed() {
        let el = parse_document(
            r#"<Filter xmlns="http://www.opengis.net/fes/2.0"><Bogus/></Filter>"#,
        )
        .unwrap();
        let err = parse_filter_xml(&el, false, false).unwrap_err();
        assert_eq!(err.exception_code(), "OperationParsingFailed");
    }
}
