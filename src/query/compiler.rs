//! Walks a `fes::Filter` bottom-up against a `SchemaGraph` to emit a
//! backend-agnostic `datastore::Predicate`.
//!
//! Grounded on `src/api/features/query.rs`'s `Cql2Parser::to_sql`, which
//! performs the same bottom-up walk to emit SQL fragments; here the walk
//! targets the `Datastore` trait instead of a query string, per DESIGN NOTES
//! §9.

use crate::ast::fes::{ComparisonOp, Expression, Filter, NonIdOperator, Predicate as FesPredicate, SpatialOp};
use crate::datastore::{CompareOp, Predicate};
use crate::error::WfsError;
use crate::geom::{BoundingBox, Geometry};
use crate::projection::default_geometry_element;
use crate::xsd::{resolve_xpath, FieldValue, SchemaGraph, TypeId, XsdElement};

use super::function_registry::FunctionRegistry;

/// Reprojects a geometry to a target SRID. The reference in-memory
/// datastore's implementation is an identity/axis-only approximation (see
/// DESIGN.md); a production backend plugs in a real transform here, cached
/// via `crs::cache::TransformCache`.
pub trait Reprojector: Send + Sync {
    fn reproject(&self, geometry: &Geometry, to_srid: i32) -> Geometry;
}

pub struct IdentityReprojector;

impl Reprojector for IdentityReprojector {
    fn reproject(&self, geometry: &Geometry, to_srid: i32) -> Geometry {
        if geometry.srid() == to_srid {
            geometry.clone()
        } else {
            // No coordinate transform is performed; callers targeting a
            // backend that needs real reprojection supply their own
            // `Reprojector`.
            geometry.clone()
        }
    }
}

fn reproject_bbox(bbox: &BoundingBox, to_srid: i32, reprojector: &dyn Reprojector) -> BoundingBox {
    if bbox.srid == to_srid {
        return *bbox;
    }
    let corners = Geometry::Polygon {
        srid: bbox.srid,
        exterior: vec![
            (bbox.min_x, bbox.min_y),
            (bbox.max_x, bbox.min_y),
            (bbox.max_x, bbox.max_y),
            (bbox.min_x, bbox.max_y),
            (bbox.min_x, bbox.min_y),
        ],
        interiors: vec![],
    };
    reprojector.reproject(&corners, to_srid).bounding_box()
}

fn resolve_path<'a>(
    graph: &'a SchemaGraph,
    root_type: TypeId,
    root_local_name: &str,
    expr: &Expression,
) -> Result<(String, Option<&'a XsdElement>), WfsError> {
    match expr {
        Expression::ValueReference(path) => {
            let m = resolve_xpath(graph, root_type, root_local_name, path)?;
            let element = m.element.map(|id| graph.element_by_id(id));
            Ok((m.absolute_path, element))
        }
        _ => Err(WfsError::processing_failed("only a bare property reference is supported here")),
    }
}

fn cast(element: Option<&XsdElement>, literal: &str) -> Result<FieldValue, WfsError> {
    match element {
        Some(el) => el.cast_literal(literal).map_err(WfsError::processing_failed),
        // No resolved element (e.g. function call target): fall back to the
        // literal's own textual form, letting comparison degrade to a string
        // match rather than failing outright.
        None => Ok(FieldValue::String(literal.to_string())),
    }
}

fn fold_numeric(node: &Expression, lhs: &Expression, rhs: &Expression, registry: &FunctionRegistry) -> Result<FieldValue, WfsError> {
    let l = match evaluate_constant(lhs, registry)? {
        FieldValue::Double(d) => d,
        FieldValue::Integer(i) => i as f64,
        _ => return Err(WfsError::processing_failed("arithmetic operand must be numeric")),
    };
    let r = match evaluate_constant(rhs, registry)? {
        FieldValue::Double(d) => d,
        FieldValue::Integer(i) => i as f64,
        _ => return Err(WfsError::processing_failed("arithmetic operand must be numeric")),
    };
    let result = match node {
        Expression::Add(..) => l + r,
        Expression::Sub(..) => l - r,
        Expression::Mul(..) => l * r,
        Expression::Div(..) => l / r,
        _ => unreachable!("fold_numeric only called for arithmetic nodes"),
    };
    Ok(FieldValue::Double(result))
}

/// Evaluate an expression that does not reference a row's property value:
/// a literal, a function call over such expressions, or arithmetic over
/// them. Used for the non-reference side of a comparison (SPEC_FULL.md
/// §4.4's `Function(name, args)` handling).
fn evaluate_constant(expr: &Expression, registry: &FunctionRegistry) -> Result<FieldValue, WfsError> {
    match expr {
        Expression::Literal(text) => Ok(FieldValue::String(text.clone())),
        Expression::Function(name, args) => {
            let evaluated =
                args.iter().map(|a| evaluate_constant(a, registry)).collect::<Result<Vec<_>, _>>()?;
            registry.call(name, &evaluated)
        }
        Expression::Add(l, r) | Expression::Sub(l, r) | Expression::Mul(l, r) | Expression::Div(l, r) => {
            fold_numeric(expr, l, r, registry)
        }
        Expression::ValueReference(_) => {
            Err(WfsError::processing_failed("a property reference cannot appear on both sides of a comparison"))
        }
    }
}

/// Value of the non-reference operand of a comparison/between, typed
/// against `element` when it is a plain literal and left in its native
/// function/arithmetic-result type otherwise.
fn compile_operand_value(
    element: Option<&XsdElement>,
    expr: &Expression,
    registry: &FunctionRegistry,
) -> Result<FieldValue, WfsError> {
    match expr {
        Expression::Literal(text) => cast(element, text),
        _ => evaluate_constant(expr, registry),
    }
}

fn reversed(op: ComparisonOp) -> ComparisonOp {
    match op {
        ComparisonOp::Lt => ComparisonOp::Gt,
        ComparisonOp::Gt => ComparisonOp::Lt,
        ComparisonOp::Le => ComparisonOp::Ge,
        ComparisonOp::Ge => ComparisonOp::Le,
        ComparisonOp::Eq => ComparisonOp::Eq,
        ComparisonOp::NotEq => ComparisonOp::NotEq,
    }
}

fn to_compare_op(op: ComparisonOp) -> CompareOp {
    match op {
        ComparisonOp::Eq => CompareOp::Eq,
        ComparisonOp::NotEq => CompareOp::NotEq,
        ComparisonOp::Lt => CompareOp::Lt,
        ComparisonOp::Gt => CompareOp::Gt,
        ComparisonOp::Le => CompareOp::Le,
        ComparisonOp::Ge => CompareOp::Ge,
    }
}

fn compile_comparison(
    graph: &SchemaGraph,
    root_type: TypeId,
    root_local_name: &str,
    op: ComparisonOp,
    lhs: &Expression,
    rhs: &Expression,
    registry: &FunctionRegistry,
) -> Result<Predicate, WfsError> {
    // Property-reference-vs-literal/function is the only supported shape;
    // the operand order is normalized so the resolved path always ends up
    // on the left, flipping directional operators when it started on the
    // right (`3.0 > app:rating` means the same as `app:rating < 3.0`).
    let (path, element, operand, op) = if matches!(lhs, Expression::ValueReference(_)) {
        let (path, element) = resolve_path(graph, root_type, root_local_name, lhs)?;
        (path, element, rhs, op)
    } else if matches!(rhs, Expression::ValueReference(_)) {
        let (path, element) = resolve_path(graph, root_type, root_local_name, rhs)?;
        (path, element, lhs, reversed(op))
    } else {
        return Err(WfsError::processing_failed("comparison requires a property reference operand"));
    };

    let value = compile_operand_value(element, operand, registry)?;
    Ok(Predicate::Compare { path, op: to_compare_op(op), value })
}

fn compile_spatial(
    graph: &SchemaGraph,
    root_type: TypeId,
    root_local_name: &str,
    op: SpatialOp,
    value_ref: &Option<Expression>,
    geometry: &Option<Geometry>,
    bbox: &Option<BoundingBox>,
    distance: Option<f64>,
    feature_srid: i32,
    reprojector: &dyn Reprojector,
) -> Result<Predicate, WfsError> {
    // A `BBOX` with no named property (bare KVP `BBOX=...`, or a
    // single-operand `<fes:BBOX>`) defaults to the feature type's own
    // geometry element rather than erroring.
    let path = match value_ref {
        Some(expr) => resolve_path(graph, root_type, root_local_name, expr)?.0,
        None => {
            let element_id = default_geometry_element(graph, root_type)
                .ok_or_else(|| WfsError::processing_failed("feature type has no geometry element to default BBOX to"))?;
            graph.element_by_id(element_id).data_source_path.clone()
        }
    };

    let envelope = match (bbox, geometry) {
        (Some(b), _) => reproject_bbox(b, feature_srid, reprojector),
        (None, Some(g)) => reprojector.reproject(g, feature_srid).bounding_box(),
        (None, None) => {
            return Err(WfsError::processing_failed("spatial operator has no geometry or envelope operand"))
        }
    };

    // Exact topology (Contains, Crosses, ...) is approximated by bounding
    // box intersection in the reference datastore; a backend with real
    // geometric predicates overrides this at the `Datastore` trait level
    // instead of in the compiler.
    let envelope = match op {
        SpatialOp::DWithin => {
            let d = distance.unwrap_or(0.0);
            BoundingBox::new(envelope.srid, envelope.min_x - d, envelope.min_y - d, envelope.max_x + d, envelope.max_y + d)
        }
        _ => envelope,
    };

    let predicate = Predicate::BboxIntersects { path, bbox: envelope };
    Ok(if op == SpatialOp::Beyond || op == SpatialOp::Disjoint {
        Predicate::Not(Box::new(predicate))
    } else {
        predicate
    })
}

fn compile_non_id(
    graph: &SchemaGraph,
    root_type: TypeId,
    root_local_name: &str,
    op: &NonIdOperator,
    feature_srid: i32,
    reprojector: &dyn Reprojector,
    registry: &FunctionRegistry,
) -> Result<Predicate, WfsError> {
    match op {
        NonIdOperator::Comparison { op, lhs, rhs } => {
            compile_comparison(graph, root_type, root_local_name, *op, lhs, rhs, registry)
        }
        NonIdOperator::Between { expr, lower, upper } => {
            let (path, element) = resolve_path(graph, root_type, root_local_name, expr)?;
            let lower = compile_operand_value(element, lower, registry)?;
            let upper = compile_operand_value(element, upper, registry)?;
            Ok(Predicate::Between { path, lower, upper })
        }
        NonIdOperator::Like { expr, pattern, wild_card, single_char, escape_char, match_case } => {
            let (path, _element) = resolve_path(graph, root_type, root_local_name, expr)?;
            Ok(Predicate::Like {
                path,
                pattern: pattern.clone(),
                wild_card: *wild_card,
                single_char: *single_char,
                escape_char: *escape_char,
                match_case: *match_case,
            })
        }
        // PropertyIsNil targets a nillable element explicitly marked absent;
        // PropertyIsNull targets a property whose value is simply missing.
        // The reference datastore does not distinguish the two states, so
        // both compile to the same null check (DESIGN.md Open Question).
        NonIdOperator::Nil(expr) | NonIdOperator::Null(expr) => {
            let (path, _element) = resolve_path(graph, root_type, root_local_name, expr)?;
            Ok(Predicate::IsNull { path })
        }
        NonIdOperator::Spatial { op, value_ref, geometry, bbox, distance } => compile_spatial(
            graph,
            root_type,
            root_local_name,
            *op,
            value_ref,
            geometry,
            bbox,
            *distance,
            feature_srid,
            reprojector,
        ),
        NonIdOperator::And(children) => {
            let compiled = children
                .iter()
                .map(|c| compile_non_id(graph, root_type, root_local_name, c, feature_srid, reprojector, registry))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Predicate::And(compiled))
        }
        NonIdOperator::Or(children) => {
            let compiled = children
                .iter()
                .map(|c| compile_non_id(graph, root_type, root_local_name, c, feature_srid, reprojector, registry))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Predicate::Or(compiled))
        }
        NonIdOperator::Not(child) => Ok(Predicate::Not(Box::new(compile_non_id(
            graph,
            root_type,
            root_local_name,
            child,
            feature_srid,
            reprojector,
            registry,
        )?))),
    }
}

/// Compile a parsed `fes:Filter` against `root_type` into a
/// `datastore::Predicate`. `feature_srid` is the feature type's storage
/// SRID; spatial literals are reprojected into it before being handed to
/// the datastore.
pub fn compile_filter(
    graph: &SchemaGraph,
    root_type: TypeId,
    root_local_name: &str,
    filter: &Filter,
    feature_srid: i32,
    reprojector: &dyn Reprojector,
    registry: &FunctionRegistry,
) -> Result<Predicate, WfsError> {
    match &filter.predicate {
        FesPredicate::Id(ids) => Ok(Predicate::IdIn(ids.iter().map(|r| r.rid.clone()).collect())),
        FesPredicate::NonId(op) => {
            compile_non_id(graph, root_type, root_local_name, op, feature_srid, reprojector, registry)
        }
    }
}

/// Compile a `SortBy` list into `datastore::Ordering`s.
pub fn compile_ordering(
    graph: &SchemaGraph,
    root_type: TypeId,
    root_local_name: &str,
    sort_by: &[(String, bool)],
) -> Result<Vec<crate::datastore::Ordering>, WfsError> {
    sort_by
        .iter()
        .map(|(field, ascending)| {
            let m = resolve_xpath(graph, root_type, root_local_name, field)?;
            Ok(crate::datastore::Ordering { path: m.absolute_path, ascending: *ascending })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::xml::parse_document;
    use crate::ast::fes::parse_filter_xml;
    use crate::xsd::{AtomicType, FieldSpec, SchemaGraph};

    fn registry() -> FunctionRegistry {
        FunctionRegistry::with_builtins()
    }

    fn sample() -> (SchemaGraph, TypeId) {
        let mut graph = SchemaGraph::new();
        let type_id = graph.build_feature_type(
            "http://example.org/gisserver",
            "restaurant",
            "id",
            vec![
                FieldSpec::Scalar { name: "name", path: "name", atomic: AtomicType::String, nillable: false },
                FieldSpec::Scalar { name: "rating", path: "rating", atomic: AtomicType::Double, nillable: true },
                FieldSpec::Geometry { name: "geometry", path: "geom", nillable: false },
            ],
        );
        (graph, type_id)
    }

    #[test]
    fn compiles_comparison() {
        let (graph, type_id) = sample();
        let registry = registry();
        let el = parse_document(
            r#"<Filter xmlns="http://www.opengis.net/fes/2.0">
                <PropertyIsGreaterThanOrEqualTo>
                    <ValueReference>rating</ValueReference>
                    <Literal>3.0</Literal>
                </PropertyIsGreaterThanOrEqualTo>
            </Filter>"#,
        )
        .unwrap();
        let filter = parse_filter_xml(&el, false, false).unwrap();
        let predicate = compile_filter(&graph, type_id, "restaurant", &filter, 4326, &IdentityReprojector, &registry).unwrap();
        let Predicate::Compare { op, .. } = predicate else { panic!("expected compare") };
        assert_eq!(op, CompareOp::Ge);
    }

    #[test]
    fn compiles_reversed_comparison() {
        let (graph, type_id) = sample();
        let registry = registry();
        let el = parse_document(
            r#"<Filter xmlns="http://www.opengis.net/fes/2.0">
                <PropertyIsLessThan>
                    <Literal>3.0</Literal>
                    <ValueReference>rating</ValueReference>
                </PropertyIsLessThan>
            </Filter>"#,
        )
        .unwrap();
        let filter = parse_filter_xml(&el, false, false).unwrap();
        let predicate = compile_filter(&graph, type_id, "restaurant", &filter, 4326, &IdentityReprojector, &registry).unwrap();
        // `3.0 < rating` means `rating > 3.0`.
        let Predicate::Compare { op, .. } = predicate else { panic!("expected compare") };
        assert_eq!(op, CompareOp::Gt);
    }

    #[test]
    fn compiles_bbox_to_envelope_intersects() {
        let (graph, type_id) = sample();
        let registry = registry();
        let el = parse_document(
            r#"<Filter xmlns="http://www.opengis.net/fes/2.0" xmlns:gml="http://www.opengis.net/gml/3.2">
                <BBOX>
                    <ValueReference>geometry</ValueReference>
                    <gml:Envelope srsName="urn:ogc:def:crs:OGC::CRS84">
                        <gml:lowerCorner>4.58 52.03</gml:lowerCorner>
                        <gml:upperCorner>5.31 52.49</gml:upperCorner>
                    </gml:Envelope>
                </BBOX>
            </Filter>"#,
        )
        .unwrap();
        let filter = parse_filter_xml(&el, false, false).unwrap();
        let predicate = compile_filter(&graph, type_id, "restaurant", &filter, 4326, &IdentityReprojector, &registry).unwrap();
        let Predicate::BboxIntersects { path, bbox } = predicate else { panic!("expected bbox") };
        assert_eq!(path, "geom");
        assert_eq!(bbox.min_x, 4.58);
    }

    #[test]
    fn bbox_with_no_property_reference_defaults_to_the_geometry_element() {
        let (graph, type_id) = sample();
        let registry = registry();
        let predicate = compile_spatial(
            &graph,
            type_id,
            "restaurant",
            SpatialOp::Bbox,
            &None,
            &None,
            &Some(BoundingBox::new(4326, 4.58, 52.03, 5.31, 52.49)),
            None,
            4326,
            &IdentityReprojector,
        )
        .unwrap();
        let Predicate::BboxIntersects { path, .. } = predicate else { panic!("expected bbox") };
        assert_eq!(path, "geom");
    }

    #[test]
    fn compiles_resource_id_filter() {
        let (graph, type_id) = sample();
        let registry = registry();
        let el = parse_document(
            r#"<Filter xmlns="http://www.opengis.net/fes/2.0"><ResourceId rid="restaurant.1"/></Filter>"#,
        )
        .unwrap();
        let filter = parse_filter_xml(&el, false, false).unwrap();
        let predicate = compile_filter(&graph, type_id, "restaurant", &filter, 4326, &IdentityReprojector, &registry).unwrap();
        let Predicate::IdIn(ids) = predicate else { panic!("expected id predicate") };
        assert_eq!(ids, vec!["restaurant.1".to_string()]);
    }

    #[test]
    fn compiles_comparison_against_function_call() {
        let (graph, type_id) = sample();
        let registry = registry();
        let el = parse_document(
            r#"<Filter xmlns="http://www.opengis.net/fes/2.0">
                <PropertyIsEqualTo>
                    <ValueReference>name</ValueReference>
                    <Function name="upper"><Literal>joe's</Literal></Function>
                </PropertyIsEqualTo>
            </Filter>"#,
        )
        .unwrap();
        let filter = parse_filter_xml(&el, false, false).unwrap();
        let predicate = compile_filter(&graph, type_id, "restaurant", &filter, 4326, &IdentityReprojector, &registry).unwrap();
        let Predicate::Compare { value, .. } = predicate else { panic!("expected compare") };
        assert_eq!(value, FieldValue::String("JOE'S".to_string()));
    }

    #[test]
    fn sort_by_resolves_paths() {
        let (graph, type_id) = sample();
        let orderings = compile_ordering(&graph, type_id, "restaurant", &[("rating".to_string(), false)]).unwrap();
        assert_eq!(orderings[0].path, "rating");
        assert!(!orderings[0].ascending);
    }
}
