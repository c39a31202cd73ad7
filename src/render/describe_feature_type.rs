//! `DescribeFeatureType` XSD rendering (SPEC_FULL.md §4.8): walks the schema
//! graph and emits an `xs:schema` document, one `xs:complexType` per
//! registered complex type plus one `xs:element` substitutable for
//! `gml:AbstractFeature`.
//!
//! Grounded on `src/openapi.rs`'s recursive struct-to-schema walk,
//! generalized from JSON Schema generation to XSD generation over this
//! crate's own arena-indexed schema graph rather than `schemars` reflection.

use crate::registry::{FeatureTypeInfo, NAMESPACE_PREFIX};
use crate::xsd::{ElementId, Occurs, SchemaGraph, TypeRef};

use super::xml_escape;

pub const CONTENT_TYPE: &str = "application/xml; charset=utf-8";

fn occurs_attrs(min_occurs: u32, max_occurs: Occurs) -> String {
    let max = match max_occurs {
        Occurs::Unbounded => "unbounded".to_string(),
        Occurs::Bounded(n) => n.to_string(),
    };
    format!(" minOccurs=\"{min_occurs}\" maxOccurs=\"{max}\"")
}

fn render_element(graph: &SchemaGraph, element_id: ElementId) -> String {
    let el = graph.element_by_id(element_id);
    let occurs = occurs_attrs(el.min_occurs, el.max_occurs);
    let nillable = if el.nillable { " nillable=\"true\"" } else { "" };

    if el.is_geometry() {
        return format!(
            "<xs:element name=\"{}\" type=\"gml:GeometryPropertyType\"{occurs}{nillable}/>",
            xml_escape(&el.local_name)
        );
    }

    match el.type_ref {
        TypeRef::Atomic(atomic) => format!(
            "<xs:element name=\"{}\" type=\"{}\"{occurs}{nillable}/>",
            xml_escape(&el.local_name),
            atomic.xsd_qname()
        ),
        TypeRef::Complex(child_type) => {
            let mut out = format!("<xs:element name=\"{}\"{occurs}{nillable}>", xml_escape(&el.local_name));
            out.push_str("<xs:complexType><xs:sequence>");
            let child = graph.type_by_id(child_type);
            for &child_element in &child.elements {
                out.push_str(&render_element(graph, child_element));
            }
            out.push_str("</xs:sequence></xs:complexType>");
            out.push_str("</xs:element>");
            out
        }
    }
}

fn render_complex_type(graph: &SchemaGraph, feature: &FeatureTypeInfo) -> String {
    let ty = graph.type_by_id(feature.type_id);
    let mut out = format!(
        "<xs:complexType name=\"{}Type\"><xs:complexContent><xs:extension base=\"gml:AbstractFeatureType\"><xs:sequence>",
        xml_escape(&ty.name)
    );
    for &element_id in &ty.elements {
        out.push_str(&render_element(graph, element_id));
    }
    out.push_str("</xs:sequence></xs:extension></xs:complexContent></xs:complexType>");
    out
}

/// Render a `DescribeFeatureType` schema document for the given feature
/// types (all registered feature types when called with no `TYPENAME`
/// filter applied upstream).
pub fn render_describe_feature_type(graph: &SchemaGraph, feature_types: &[&FeatureTypeInfo]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let namespace = feature_types.first().map(|f| f.namespace.as_str()).unwrap_or("");
    out.push_str(&format!(
        "<xs:schema xmlns:xs=\"http://www.w3.org/2001/XMLSchema\" xmlns:gml=\"http://www.opengis.net/gml/3.2\" xmlns:{NAMESPACE_PREFIX}=\"{}\" targetNamespace=\"{}\" elementFormDefault=\"qualified\">\n",
        xml_escape(namespace),
        xml_escape(namespace),
    ));
    out.push_str("<xs:import namespace=\"http://www.opengis.net/gml/3.2\" schemaLocation=\"http://schemas.opengis.net/gml/3.2.1/gml.xsd\"/>\n");

    for feature in feature_types {
        out.push_str(&render_complex_type(graph, feature));
        out.push_str(&format!(
            "<xs:element name=\"{}\" type=\"{NAMESPACE_PREFIX}:{}Type\" substitutionGroup=\"gml:AbstractFeature\"/>\n",
            xml_escape(&feature.local_name),
            xml_escape(&feature.local_name),
        ));
    }

    out.push_str("</xs:schema>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::xsd::{AtomicType as Atomic, FieldSpec};

    fn sample() -> (SchemaGraph, FeatureTypeInfo) {
        let mut graph = SchemaGraph::new();
        let type_id = graph.build_feature_type(
            "http://example.org/gisserver",
            "restaurant",
            "id",
            vec![
                FieldSpec::Scalar { name: "name", path: "name", atomic: Atomic::String, nillable: false },
                FieldSpec::Geometry { name: "geometry", path: "geom", nillable: false },
                FieldSpec::Complex {
                    name: "reviews",
                    path: "reviews",
                    many: true,
                    fields: vec![FieldSpec::Scalar { name: "text", path: "text", atomic: Atomic::String, nillable: false }],
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
    fn renders_scalar_element_with_xsd_type() {
        let (graph, feature) = sample();
        let xml = render_describe_feature_type(&graph, &[&feature]);
        assert!(xml.contains("<xs:element name=\"name\" type=\"xs:string\""));
    }

    #[test]
    fn renders_geometry_element_as_geometry_property_type() {
        let (graph, feature) = sample();
        let xml = render_describe_feature_type(&graph, &[&feature]);
        assert!(xml.contains("type=\"gml:GeometryPropertyType\""));
    }

    #[test]
    fn renders_nested_complex_element_inline() {
        let (graph, feature) = sample();
        let xml = render_describe_feature_type(&graph, &[&feature]);
        assert!(xml.contains("<xs:element name=\"reviews\" minOccurs=\"0\" maxOccurs=\"unbounded\""));
        assert!(xml.contains("<xs:element name=\"text\" type=\"xs:string\""));
    }

    #[test]
    fn declares_feature_element_in_substitution_group() {
        let (graph, feature) = sample();
        let xml = render_describe_feature_type(&graph, &[&feature]);
        assert!(xml.contains("substitutionGroup=\"gml:AbstractFeature\""));
    }
}
