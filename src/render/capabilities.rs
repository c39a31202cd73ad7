//! `GetCapabilities` XML rendering (SPEC_FULL.md §4.8): service identity,
//! operations metadata, feature type list, filter capabilities.
//!
//! Grounded on `src/openapi.rs`'s operation-by-operation metadata assembly
//! (there building an OpenAPI document from the registered routes; here
//! building the WFS capabilities document from the registered feature
//! types, function registry, and stored query registry), generalized from a
//! static document to one assembled from `ServerState` at request time.

use crate::datastore::{Datastore, Predicate};
use crate::query::FunctionRegistry;
use crate::query::stored_query::StoredQueryRegistry;
use crate::registry::{FeatureTypeInfo, NAMESPACE, NAMESPACE_PREFIX};

use super::xml_escape;

pub const CONTENT_TYPE: &str = "application/xml; charset=utf-8";

const COMPARISON_OPERATORS: &[&str] = &[
    "PropertyIsEqualTo",
    "PropertyIsNotEqualTo",
    "PropertyIsLessThan",
    "PropertyIsGreaterThan",
    "PropertyIsLessThanOrEqualTo",
    "PropertyIsGreaterThanOrEqualTo",
    "PropertyIsLike",
    "PropertyIsNull",
    "PropertyIsNil",
    "PropertyIsBetween",
];

const SPATIAL_OPERATORS: &[&str] = &[
    "BBOX",
    "Intersects",
    "Contains",
    "Crosses",
    "Disjoint",
    "Equals",
    "Overlaps",
    "Touches",
    "Within",
    "DWithin",
    "Beyond",
];

const OUTPUT_FORMATS: &[&str] = &["application/gml+xml; version=3.2", "application/geo+json", "text/csv"];

fn service_identification() -> String {
    "<ows:ServiceIdentification>\
<ows:Title>Feature server</ows:Title>\
<ows:ServiceType codeSpace=\"OGC\">WFS</ows:ServiceType>\
<ows:ServiceTypeVersion>2.0.0</ows:ServiceTypeVersion>\
<ows:Fees>NONE</ows:Fees>\
<ows:AccessConstraints>NONE</ows:AccessConstraints>\
</ows:ServiceIdentification>"
        .to_string()
}

fn operations_metadata(base_url: &str, stored_queries: &StoredQueryRegistry) -> String {
    let mut out = String::new();
    out.push_str("<ows:OperationsMetadata>");
    for (name, methods) in [
        ("GetCapabilities", &["Get", "Post"][..]),
        ("DescribeFeatureType", &["Get", "Post"][..]),
        ("GetFeature", &["Get", "Post"][..]),
        ("GetPropertyValue", &["Get", "Post"][..]),
        ("ListStoredQueries", &["Get", "Post"][..]),
        ("DescribeStoredQueries", &["Get", "Post"][..]),
    ] {
        out.push_str(&format!("<ows:Operation name=\"{name}\">"));
        for method in methods {
            out.push_str(&format!(
                "<ows:DCP><ows:HTTP><ows:{method} xlink:href=\"{}/wfs\"/></ows:HTTP></ows:DCP>",
                xml_escape(base_url)
            ));
        }
        out.push_str("</ows:Operation>");
    }

    out.push_str("<ows:Constraint name=\"ImplementsBasicWFS\"><ows:DefaultValue>TRUE</ows:DefaultValue></ows:Constraint>");
    out.push_str("<ows:Constraint name=\"KVPEncoding\"><ows:DefaultValue>TRUE</ows:DefaultValue></ows:Constraint>");
    out.push_str("<ows:Constraint name=\"XMLEncoding\"><ows:DefaultValue>TRUE</ows:DefaultValue></ows:Constraint>");

    for id in stored_queries.ids() {
        out.push_str(&format!("<ows:Constraint name=\"ImplementsStoredQuery\"><ows:DefaultValue>{}</ows:DefaultValue></ows:Constraint>", xml_escape(id)));
    }

    out.push_str("</ows:OperationsMetadata>");
    out
}

fn feature_type_entry(feature: &FeatureTypeInfo, bounding_box: Option<&crate::geom::BoundingBox>) -> String {
    let mut out = String::new();
    out.push_str("<FeatureType>");
    out.push_str(&format!("<Name>{}:{}</Name>", NAMESPACE_PREFIX, xml_escape(&feature.local_name)));
    out.push_str(&format!("<Title>{}</Title>", xml_escape(&feature.local_name)));
    out.push_str(&format!("<DefaultCRS>{}</DefaultCRS>", xml_escape(feature.storage_crs.uri())));
    out.push_str("<OtherCRS>urn:ogc:def:crs:OGC::CRS84</OtherCRS>");
    for format in OUTPUT_FORMATS {
        out.push_str(&format!("<OutputFormats><Format>{format}</Format></OutputFormats>"));
    }
    if let Some(bbox) = bounding_box {
        out.push_str(&format!(
            "<ows:WGS84BoundingBox><ows:LowerCorner>{} {}</ows:LowerCorner><ows:UpperCorner>{} {}</ows:UpperCorner></ows:WGS84BoundingBox>",
            bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y
        ));
    }
    out.push_str("</FeatureType>");
    out
}

fn filter_capabilities(functions: &FunctionRegistry, function_names: &[&str]) -> String {
    let mut out = String::new();
    out.push_str("<fes:Filter_Capabilities>");
    out.push_str("<fes:Conformance>");
    for name in ["ImplementsQuery", "ImplementsAdHocQuery", "ImplementsFunctions", "ImplementsResourceId", "ImplementsMinStandardFilter", "ImplementsStandardFilter", "ImplementsSpatialFilter"] {
        out.push_str(&format!("<fes:Constraint name=\"{name}\"><ows:DefaultValue>TRUE</ows:DefaultValue></fes:Constraint>"));
    }
    out.push_str("</fes:Conformance>");

    out.push_str("<fes:Id_Capabilities><fes:ResourceIdentifier name=\"fes:ResourceId\"/></fes:Id_Capabilities>");

    out.push_str("<fes:Scalar_Capabilities><fes:LogicalOperators/><fes:ComparisonOperators>");
    for op in COMPARISON_OPERATORS {
        out.push_str(&format!("<fes:ComparisonOperator name=\"{op}\"/>"));
    }
    out.push_str("</fes:ComparisonOperators></fes:Scalar_Capabilities>");

    out.push_str("<fes:Spatial_Capabilities><fes:GeometryOperands>");
    for tag in ["Point", "LineString", "Polygon", "MultiPoint", "MultiLineString", "MultiPolygon"] {
        out.push_str(&format!("<fes:GeometryOperand name=\"gml:{tag}\"/>"));
    }
    out.push_str("</fes:GeometryOperands><fes:SpatialOperators>");
    for op in SPATIAL_OPERATORS {
        out.push_str(&format!("<fes:SpatialOperator name=\"{op}\"/>"));
    }
    out.push_str("</fes:SpatialOperators></fes:Spatial_Capabilities>");

    out.push_str("<fes:Functions>");
    for name in function_names {
        if functions.is_registered(name) {
            out.push_str(&format!("<fes:Function name=\"{name}\"><fes:Returns>xs:anyType</fes:Returns></fes:Function>"));
        }
    }
    out.push_str("</fes:Functions>");

    out.push_str("</fes:Filter_Capabilities>");
    out
}

/// Render the `GetCapabilities` document. `bounding_boxes` supplies a
/// per-feature-type WGS84 bounding box when `capabilities_bounding_box` is
/// enabled; omit an entry (or pass an empty slice) to skip it.
pub fn render_capabilities(
    base_url: &str,
    feature_types: &[FeatureTypeInfo],
    bounding_boxes: &[(String, crate::geom::BoundingBox)],
    functions: &FunctionRegistry,
    stored_queries: &StoredQueryRegistry,
) -> String {
    const KNOWN_FUNCTIONS: &[&str] = &["lower", "upper", "concat", "length", "abs", "sqrt"];

    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<wfs:WFS_Capabilities version=\"2.0.0\" xmlns:wfs=\"http://www.opengis.net/wfs/2.0\" xmlns:ows=\"http://www.opengis.net/ows/1.1\" xmlns:fes=\"http://www.opengis.net/fes/2.0\" xmlns:gml=\"http://www.opengis.net/gml/3.2\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" xmlns:{NAMESPACE_PREFIX}=\"{}\">",
        xml_escape(NAMESPACE)
    ));

    out.push_str(&service_identification());
    out.push_str("<ows:ServiceProvider><ows:ProviderName>reference deployment</ows:ProviderName></ows:ServiceProvider>");
    out.push_str(&operations_metadata(base_url, stored_queries));

    out.push_str("<FeatureTypeList>");
    for feature in feature_types {
        let bbox = bounding_boxes.iter().find(|(name, _)| name == &feature.local_name).map(|(_, b)| b);
        out.push_str(&feature_type_entry(feature, bbox));
    }
    out.push_str("</FeatureTypeList>");

    out.push_str(&filter_capabilities(functions, KNOWN_FUNCTIONS));

    out.push_str("</wfs:WFS_Capabilities>");
    out
}

/// Compute a WGS84 bounding box for one feature type by scanning every row
/// in the reference datastore. Only meaningful for small, fully in-memory
/// collections; a production backend would maintain this as precomputed
/// metadata instead of a full scan per `GetCapabilities` request.
pub async fn scan_bounding_box(datastore: &dyn Datastore, type_name: &str, geometry_path: &str) -> Option<crate::geom::BoundingBox> {
    let mut cursor = datastore.open_cursor(type_name, &Predicate::True, &[], 0).await.ok()?;
    let rows = cursor.next_chunk(usize::MAX).await.ok()?;
    let mut bbox: Option<crate::geom::BoundingBox> = None;
    for row in rows {
        if let crate::xsd::FieldValue::Geometry(g) = row.get(geometry_path) {
            bbox = Some(match bbox {
                Some(existing) => existing.union(&g.bounding_box()),
                None => g.bounding_box(),
            });
        }
    }
    bbox.filter(|b| !b.is_empty())
}

/// Render the `ListStoredQueries` response: one entry per registered id.
pub fn render_stored_query_list(stored_queries: &StoredQueryRegistry) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<wfs:ListStoredQueriesResponse xmlns:wfs=\"http://www.opengis.net/wfs/2.0\">");
    for id in stored_queries.ids() {
        out.push_str(&format!(
            "<wfs:StoredQuery id=\"{}\"><wfs:Title>{}</wfs:Title></wfs:StoredQuery>",
            xml_escape(id),
            xml_escape(id),
        ));
    }
    out.push_str("</wfs:ListStoredQueriesResponse>");
    out
}

/// Render the `DescribeStoredQueries` response for the given ids, or every
/// registered id when `ids` is empty (mirroring `DescribeFeatureType`'s
/// no-filter-means-everything convention).
pub fn render_stored_query_descriptions(
    stored_queries: &StoredQueryRegistry,
    ids: &[String],
) -> Result<String, crate::error::WfsError> {
    let selected: Vec<&str> = if ids.is_empty() {
        stored_queries.ids().collect()
    } else {
        ids.iter()
            .map(|id| {
                stored_queries.get(id).map(|_| id.as_str()).ok_or_else(|| {
                    crate::error::WfsError::invalid_parameter_at(format!("unknown stored query '{id}'"), "STOREDQUERYID")
                })
            })
            .collect::<Result<_, _>>()?
    };

    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<wfs:DescribeStoredQueriesResponse xmlns:wfs=\"http://www.opengis.net/wfs/2.0\">");
    for id in selected {
        let definition = stored_queries.get(id).expect("id was resolved above");
        out.push_str(&format!("<wfs:StoredQueryDescription id=\"{}\">", xml_escape(id)));
        for param in definition.parameter_names {
            out.push_str(&format!("<wfs:Parameter name=\"{}\" type=\"xs:string\"/>", xml_escape(param)));
        }
        out.push_str("</wfs:StoredQueryDescription>");
    }
    out.push_str("</wfs:DescribeStoredQueriesResponse>");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::xsd::TypeId;

    fn sample_feature_types() -> Vec<FeatureTypeInfo> {
        vec![FeatureTypeInfo {
            type_id: TypeId(0),
            local_name: "restaurant".to_string(),
            namespace: NAMESPACE.to_string(),
            storage_crs: Crs::from_epsg(28992),
        }]
    }

    #[test]
    fn renders_feature_type_with_default_crs() {
        let xml = render_capabilities(
            "http://localhost:8080",
            &sample_feature_types(),
            &[],
            &FunctionRegistry::with_builtins(),
            &StoredQueryRegistry::with_builtins(),
        );
        assert!(xml.contains("<Name>app:restaurant</Name>"));
        assert!(xml.contains("<DefaultCRS>urn:ogc:def:crs:EPSG::28992</DefaultCRS>"));
        assert!(xml.contains("<Format>application/geo+json</Format>"));
    }

    #[test]
    fn lists_registered_stored_query_constraint() {
        let xml = render_capabilities(
            "http://localhost:8080",
            &sample_feature_types(),
            &[],
            &FunctionRegistry::with_builtins(),
            &StoredQueryRegistry::with_builtins(),
        );
        assert!(xml.contains("urn:ogc:def:query:OGC-WFS::GetFeatureById"));
    }

    #[test]
    fn includes_bounding_box_when_supplied() {
        let bbox = crate::geom::BoundingBox::new(4326, 4.0, 52.0, 5.0, 53.0);
        let xml = render_capabilities(
            "http://localhost:8080",
            &sample_feature_types(),
            &[("restaurant".to_string(), bbox)],
            &FunctionRegistry::with_builtins(),
            &StoredQueryRegistry::with_builtins(),
        );
        assert!(xml.contains("ows:WGS84BoundingBox"));
    }

    #[test]
    fn lists_only_registered_functions() {
        let xml = render_capabilities(
            "http://localhost:8080",
            &sample_feature_types(),
            &[],
            &FunctionRegistry::with_builtins(),
            &StoredQueryRegistry::with_builtins(),
        );
        assert!(xml.contains("name=\"concat\""));
    }

    #[test]
    fn stored_query_list_includes_builtin_id() {
        let xml = render_stored_query_list(&StoredQueryRegistry::with_builtins());
        assert!(xml.contains("urn:ogc:def:query:OGC-WFS::GetFeatureById"));
    }

    #[test]
    fn stored_query_descriptions_default_to_all_registered() {
        let xml = render_stored_query_descriptions(&StoredQueryRegistry::with_builtins(), &[]).unwrap();
        assert!(xml.contains("<wfs:Parameter name=\"ID\" type=\"xs:string\"/>"));
    }

    #[test]
    fn stored_query_descriptions_reject_unknown_id() {
        let err = render_stored_query_descriptions(&StoredQueryRegistry::with_builtins(), &["urn:bogus".to_string()])
            .unwrap_err();
        assert_eq!(err.exception_code(), "InvalidParameterValue");
    }
}
