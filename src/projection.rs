//! Projection and result planning (SPEC_FULL.md §4.5): turns an
//! `AdhocQuery.property_names` list into a concrete selected-element set,
//! resolves the output CRS, and decides what needs prefetching.
//!
//! Grounded on `src/services/feature_service.rs`'s `get_assets_for_items`
//! batched prefetch (reused here as the model for `PrefetchTarget`) and on
//! DESIGN NOTES §9's "render against the schema graph, never against a
//! deserialized request struct" guidance.

use std::collections::HashSet;

use crate::crs::Crs;
use crate::datastore::Row;
use crate::error::WfsError;
use crate::registry::FeatureTypeInfo;
use crate::xsd::{resolve_element_chain, ElementId, FieldValue, SchemaGraph, TypeId, TypeRef, XsdElement};

/// One element selected for rendering, with its absolute data-source path.
#[derive(Debug, Clone)]
pub struct SelectedElement {
    pub element_id: ElementId,
    pub absolute_path: String,
    pub qname: String,
}

/// An unbounded (`many`) relation reachable from the selection, to be
/// fetched in a batch rather than row by row.
#[derive(Debug, Clone)]
pub struct PrefetchTarget {
    pub element_id: ElementId,
    pub relation_type: TypeId,
    pub relation_path: String,
}

#[derive(Debug, Clone)]
pub struct ProjectionPlan {
    pub selected: Vec<SelectedElement>,
    pub output_crs: Crs,
    pub reproject: bool,
    pub prefetch: Vec<PrefetchTarget>,
}

fn geometry_chains(graph: &SchemaGraph, type_id: TypeId) -> Vec<Vec<ElementId>> {
    let mut out = Vec::new();
    for &eid in &graph.type_by_id(type_id).elements {
        let el = graph.element_by_id(eid);
        if el.is_geometry() {
            out.push(vec![eid]);
        }
        if let TypeRef::Complex(child) = el.type_ref {
            for mut chain in geometry_chains(graph, child) {
                let mut full = vec![eid];
                full.append(&mut chain);
                out.push(full);
            }
        }
    }
    out
}

/// The feature type's default geometry element, i.e. the one `BBOX`
/// defaults to when the filter names no property (SPEC_FULL.md §4.3/§4.4).
/// Picks the first geometry chain in declaration order, mirroring
/// `compute_selection`'s own "geometry elements are always selected" rule.
pub fn default_geometry_element(graph: &SchemaGraph, type_id: TypeId) -> Option<ElementId> {
    geometry_chains(graph, type_id).into_iter().next().and_then(|chain| chain.into_iter().last())
}

/// Compute the selected-element set for a `PropertyName` list: closed under
/// ancestors, with geometry elements always included regardless of what was
/// requested. `None` (and an empty list, which means the same thing per
/// SPEC_FULL.md §4.5) select every top-level field of the feature type.
pub fn compute_selection(
    graph: &SchemaGraph,
    type_id: TypeId,
    root_local_name: &str,
    property_names: Option<&[String]>,
) -> Result<Vec<SelectedElement>, WfsError> {
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    let mut add_chain = |chain: Vec<ElementId>| {
        for eid in chain {
            if seen.insert(eid) {
                ordered.push(eid);
            }
        }
    };

    match property_names.filter(|names| !names.is_empty()) {
        None => {
            for &eid in &graph.type_by_id(type_id).elements {
                add_chain(vec![eid]);
            }
        }
        Some(names) => {
            for name in names {
                let chain = resolve_element_chain(graph, type_id, root_local_name, name)?;
                add_chain(chain);
            }
        }
    }

    for chain in geometry_chains(graph, type_id) {
        add_chain(chain);
    }

    Ok(ordered
        .into_iter()
        .map(|eid| {
            let el = graph.element_by_id(eid);
            SelectedElement { element_id: eid, absolute_path: el.data_source_path.clone(), qname: el.qname() }
        })
        .collect())
}

/// Resolve the output CRS: the request's `srsName` if present, else the
/// feature type's default storage CRS.
pub fn resolve_output_crs(
    feature: &FeatureTypeInfo,
    srs_name: Option<&str>,
    force_xy_epsg4326: bool,
    force_xy_old_crs: bool,
) -> Result<Crs, WfsError> {
    match srs_name {
        Some(uri) => Crs::parse(uri, force_xy_epsg4326, force_xy_old_crs),
        None => Ok(feature.storage_crs.clone()),
    }
}

fn unbounded_relations(graph: &SchemaGraph, selected: &[SelectedElement]) -> Vec<PrefetchTarget> {
    selected
        .iter()
        .filter_map(|sel| {
            let el = graph.element_by_id(sel.element_id);
            match (el.is_many(), el.type_ref) {
                (true, TypeRef::Complex(relation_type)) => Some(PrefetchTarget {
                    element_id: sel.element_id,
                    relation_type,
                    relation_path: el.data_source_path.clone(),
                }),
                _ => None,
            }
        })
        .collect()
}

/// Build the full projection plan for one feature type query.
pub fn build_projection_plan(
    graph: &SchemaGraph,
    feature: &FeatureTypeInfo,
    root_local_name: &str,
    property_names: Option<&[String]>,
    srs_name: Option<&str>,
    force_xy_epsg4326: bool,
    force_xy_old_crs: bool,
) -> Result<ProjectionPlan, WfsError> {
    let selected = compute_selection(graph, feature.type_id, root_local_name, property_names)?;
    let output_crs = resolve_output_crs(feature, srs_name, force_xy_epsg4326, force_xy_old_crs)?;
    let reproject = output_crs.srid != feature.storage_crs.srid;
    let prefetch = unbounded_relations(graph, &selected);
    Ok(ProjectionPlan { selected, output_crs, reproject, prefetch })
}

/// Project one row through a plan's selection, yielding the schema element
/// alongside its formatted value, in selection order.
pub fn project_row<'a>(graph: &'a SchemaGraph, plan: &'a ProjectionPlan, row: &Row) -> Vec<(&'a XsdElement, FieldValue)> {
    plan.selected
        .iter()
        .map(|sel| {
            let el = graph.element_by_id(sel.element_id);
            (el, el.format_raw_value(row.get(&sel.absolute_path)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xsd::{AtomicType, FieldSpec};
    use std::collections::HashMap;

    fn sample() -> (SchemaGraph, FeatureTypeInfo) {
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
                FieldSpec::Complex {
                    name: "reviews",
                    path: "reviews",
                    many: true,
                    fields: vec![FieldSpec::Scalar {
                        name: "text",
                        path: "text",
                        atomic: AtomicType::String,
                        nillable: false,
                    }],
                },
            ],
        );
        let feature = FeatureTypeInfo {
            type_id,
            local_name: "restaurant".to_string(),
            namespace: "http://example.org/gisserver".to_string(),
            storage_crs: Crs::crs84(),
        };
        (graph, feature)
    }

    #[test]
    fn no_property_names_selects_all_top_level_fields() {
        let (graph, feature) = sample();
        let selected = compute_selection(&graph, feature.type_id, "restaurant", None).unwrap();
        assert_eq!(selected.len(), 4);
    }

    #[test]
    fn selecting_nested_field_includes_ancestor() {
        let (graph, feature) = sample();
        let names = vec!["owner/email".to_string()];
        let selected = compute_selection(&graph, feature.type_id, "restaurant", Some(&names)).unwrap();
        let qnames: Vec<&str> = selected.iter().map(|s| s.qname.as_str()).collect();
        assert!(qnames.iter().any(|q| q.ends_with("}owner")));
        assert!(qnames.iter().any(|q| q.ends_with("}email")));
    }

    #[test]
    fn geometry_is_always_selected() {
        let (graph, feature) = sample();
        let names = vec!["name".to_string()];
        let selected = compute_selection(&graph, feature.type_id, "restaurant", Some(&names)).unwrap();
        assert!(selected.iter().any(|s| s.qname.ends_with("}geometry")));
    }

    #[test]
    fn output_crs_defaults_to_feature_storage_crs() {
        let (_, feature) = sample();
        let crs = resolve_output_crs(&feature, None, false, false).unwrap();
        assert_eq!(crs, feature.storage_crs);
    }

    #[test]
    fn output_crs_honors_srs_name_and_flags_reprojection() {
        let (graph, feature) = sample();
        let plan = build_projection_plan(&graph, &feature, "restaurant", None, Some("urn:ogc:def:crs:EPSG::28992"), false, false).unwrap();
        assert_eq!(plan.output_crs.srid, 28992);
        assert!(plan.reproject);
    }

    #[test]
    fn unbounded_relation_is_queued_for_prefetch() {
        let (graph, feature) = sample();
        let plan = build_projection_plan(&graph, &feature, "restaurant", None, None, false, false).unwrap();
        assert_eq!(plan.prefetch.len(), 1);
        assert_eq!(plan.prefetch[0].relation_path, "reviews");
    }

    #[test]
    fn project_row_pairs_elements_with_values() {
        let (graph, feature) = sample();
        let plan = build_projection_plan(&graph, &feature, "restaurant", None, None, false, false).unwrap();
        let mut values = HashMap::new();
        values.insert("name".to_string(), FieldValue::String("Cafe Amsterdam".to_string()));
        let row = Row { values };
        let pairs = project_row(&graph, &plan, &row);
        let name_pair = pairs.iter().find(|(el, _)| el.local_name == "name").unwrap();
        assert_eq!(name_pair.1, FieldValue::String("Cafe Amsterdam".to_string()));
    }
}
