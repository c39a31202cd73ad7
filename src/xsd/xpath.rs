use crate::error::WfsError;

use super::graph::{ElementId, SchemaGraph, TypeId};
use super::types::TypeRef;

/// Result of resolving an XPath-ish expression (WFS/FES `ValueReference`
/// content) against a feature type's schema graph.
#[derive(Debug, Clone)]
pub struct XPathMatch {
    pub element: Option<ElementId>,
    pub is_attribute: bool,
    pub field_name: String,
    pub absolute_path: String,
}

fn strip_prefix(segment: &str) -> &str {
    match segment.split_once(':') {
        Some((_, local)) => local,
        None => segment,
    }
}

/// Resolve a WFS/FES element path against `root_type` in `graph`.
///
/// Accepts: `app:local`, bare `local`, dotted paths `parent/child`,
/// attribute axis `@gml:id`, and root descent via the feature's own element
/// name (`app:restaurant/app:name` resolves the same as `app:name`).
pub fn resolve_xpath(
    graph: &SchemaGraph,
    root_type: TypeId,
    root_local_name: &str,
    expr: &str,
) -> Result<XPathMatch, WfsError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(WfsError::invalid_parameter_at("empty XPath expression", expr));
    }

    let mut segments: Vec<&str> = expr.split('/').filter(|s| !s.is_empty()).collect();

    // Root descent: "app:restaurant/app:name" == "app:name"
    if segments.len() > 1 && strip_prefix(segments[0]) == root_local_name {
        segments.remove(0);
    }

    if segments.is_empty() {
        return Err(WfsError::invalid_parameter_at("empty XPath expression", expr));
    }

    let mut current_type = root_type;
    let mut last_element: Option<ElementId> = None;

    for (idx, raw_segment) in segments.iter().enumerate() {
        let is_last = idx == segments.len() - 1;

        if let Some(attr_name) = raw_segment.strip_prefix('@') {
            if !is_last {
                return Err(WfsError::invalid_parameter_at(
                    "attribute axis must be the final path segment",
                    expr,
                ));
            }
            let attr_local = strip_prefix(attr_name);
            let ty = graph.type_by_id(current_type);
            if let Some(idx) = ty.gml_id_attribute {
                if ty.attributes[idx].local_name == attr_local {
                    return Ok(XPathMatch {
                        element: None,
                        is_attribute: true,
                        field_name: attr_local.to_string(),
                        absolute_path: ty.attributes[idx].data_source_path.clone(),
                    });
                }
            }
            if let Some(attr) = ty.attributes.iter().find(|a| a.local_name == attr_local) {
                return Ok(XPathMatch {
                    element: None,
                    is_attribute: true,
                    field_name: attr_local.to_string(),
                    absolute_path: attr.data_source_path.clone(),
                });
            }
            return Err(WfsError::invalid_parameter_at(
                format!("unknown attribute '{attr_local}' in path '{expr}'"),
                expr,
            ));
        }

        let local = strip_prefix(raw_segment);
        let ty = graph.type_by_id(current_type);
        let found = ty
            .elements
            .iter()
            .find(|eid| graph.element_by_id(**eid).local_name == local)
            .copied();

        let Some(element_id) = found else {
            return Err(WfsError::invalid_parameter_at(
                format!("unknown element '{local}' in path '{expr}'"),
                expr,
            ));
        };

        let element = graph.element_by_id(element_id);
        last_element = Some(element_id);

        if !is_last {
            match element.type_ref {
                TypeRef::Complex(child_type) => current_type = child_type,
                TypeRef::Atomic(_) => {
                    return Err(WfsError::invalid_parameter_at(
                        format!("'{local}' is a scalar element and cannot be descended into"),
                        expr,
                    ));
                }
            }
        }
    }

    let element_id = last_element.expect("non-empty segments guarantee at least one element");
    let element = graph.element_by_id(element_id);
    Ok(XPathMatch {
        element: Some(element_id),
        is_attribute: false,
        field_name: element.local_name.clone(),
        absolute_path: element.data_source_path.clone(),
    })
}

/// Resolve every element along the path to `expr`, including intermediate
/// complex ancestors. Used to compute a selection set closed under
/// ancestors (SPEC_FULL.md §4.5): selecting a nested element implies
/// selecting the complex elements that contain it. Attribute axis paths
/// (`@gml:id`) carry no element chain — the `gml:id` attribute is always
/// selected separately — so they resolve to an empty vector.
pub fn resolve_element_chain(
    graph: &SchemaGraph,
    root_type: TypeId,
    root_local_name: &str,
    expr: &str,
) -> Result<Vec<ElementId>, WfsError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(WfsError::invalid_parameter_at("empty XPath expression", expr));
    }

    let mut segments: Vec<&str> = expr.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() > 1 && strip_prefix(segments[0]) == root_local_name {
        segments.remove(0);
    }
    if segments.is_empty() {
        return Err(WfsError::invalid_parameter_at("empty XPath expression", expr));
    }
    if segments.last().is_some_and(|s| s.starts_with('@')) {
        return Ok(Vec::new());
    }

    let mut current_type = root_type;
    let mut chain = Vec::new();
    for (idx, raw_segment) in segments.iter().enumerate() {
        let is_last = idx == segments.len() - 1;
        let local = strip_prefix(raw_segment);
        let ty = graph.type_by_id(current_type);
        let found = ty
            .elements
            .iter()
            .find(|eid| graph.element_by_id(**eid).local_name == local)
            .copied();
        let Some(element_id) = found else {
            return Err(WfsError::invalid_parameter_at(
                format!("unknown element '{local}' in path '{expr}'"),
                expr,
            ));
        };
        chain.push(element_id);
        let element = graph.element_by_id(element_id);
        if !is_last {
            match element.type_ref {
                TypeRef::Complex(child_type) => current_type = child_type,
                TypeRef::Atomic(_) => {
                    return Err(WfsError::invalid_parameter_at(
                        format!("'{local}' is a scalar element and cannot be descended into"),
                        expr,
                    ));
                }
            }
        }
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xsd::{AtomicType, FieldSpec};

    fn sample() -> (SchemaGraph, TypeId) {
        let mut graph = SchemaGraph::new();
        let type_id = graph.build_feature_type(
            "http://example.org/gisserver",
            "restaurant",
            "id",
            vec![
                FieldSpec::Scalar { name: "name", path: "name", atomic: AtomicType::String, nillable: false },
                FieldSpec::Geometry { name: "geometry", path: "geom", nillable: false },
                FieldSpec::Complex {
                    name: "owner",
                    path: "owner",
                    many: false,
                    fields: vec![FieldSpec::Scalar {
                        name: "email",
                        path: "email",
                        atomic: AtomicType::String,
                        nillable: true,
                    }],
                },
            ],
        );
        (graph, type_id)
    }

    #[test]
    fn resolves_bare_local_name() {
        let (graph, type_id) = sample();
        let m = resolve_xpath(&graph, type_id, "restaurant", "name").unwrap();
        assert_eq!(m.field_name, "name");
        assert_eq!(m.absolute_path, "name");
    }

    #[test]
    fn resolves_prefixed_name() {
        let (graph, type_id) = sample();
        let m = resolve_xpath(&graph, type_id, "restaurant", "app:name").unwrap();
        assert_eq!(m.field_name, "name");
    }

    #[test]
    fn resolves_root_descent() {
        let (graph, type_id) = sample();
        let m = resolve_xpath(&graph, type_id, "restaurant", "app:restaurant/app:name").unwrap();
        assert_eq!(m.field_name, "name");
    }

    #[test]
    fn resolves_nested_dotted_path() {
        let (graph, type_id) = sample();
        let m = resolve_xpath(&graph, type_id, "restaurant", "owner/email").unwrap();
        assert_eq!(m.absolute_path, "owner.email");
    }

    #[test]
    fn resolves_gml_id_attribute() {
        let (graph, type_id) = sample();
        let m = resolve_xpath(&graph, type_id, "restaurant", "@gml:id").unwrap();
        assert!(m.is_attribute);
        assert_eq!(m.absolute_path, "id");
    }

    #[test]
    fn unknown_element_is_invalid_parameter() {
        let (graph, type_id) = sample();
        let err = resolve_xpath(&graph, type_id, "restaurant", "bogus").unwrap_err();
        assert_eq!(err.exception_code(), "InvalidParameterValue");
    }

    #[test]
    fn element_chain_includes_complex_ancestor() {
        let (graph, type_id) = sample();
        let chain = resolve_element_chain(&graph, type_id, "restaurant", "owner/email").unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(graph.element_by_id(chain[0]).local_name, "owner");
        assert_eq!(graph.element_by_id(chain[1]).local_name, "email");
    }

    #[test]
    fn element_chain_is_empty_for_attribute_axis() {
        let (graph, type_id) = sample();
        let chain = resolve_element_chain(&graph, type_id, "restaurant", "@gml:id").unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn descending_into_scalar_fails() {
        let (graph, type_id) = sample();
        let err = resolve_xpath(&graph, type_id, "restaurant", "name/sub").unwrap_err();
        assert_eq!(err.exception_code(), "InvalidParameterValue");
    }
}
