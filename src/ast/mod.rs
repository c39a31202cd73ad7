//! Request AST: a unified representation of WFS 2.0 requests produced from
//! either KVP (`kvp::from_kvp`) or XML (`from_xml`) input.
//!
//! Grounded on SPEC_FULL.md §4.3's polymorphic-dispatch-by-tag design and,
//! for the XML half, on the AIXM parser file referenced in `ast::xml`.

pub mod fes;
pub mod gml;
pub mod kvp;
pub mod xml;

use std::collections::HashMap;

pub use fes::Filter;
pub use kvp::KvpParams;
use xml::XmlElement;

use crate::error::WfsError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeName {
    pub namespace: Option<String>,
    pub local: String,
}

impl TypeName {
    pub fn matches_qname(&self, qname: &str) -> bool {
        qname.ends_with(&format!("}}{}", self.local))
    }
}

#[derive(Debug, Clone)]
pub struct AdhocQuery {
    pub type_names: Vec<TypeName>,
    pub filter: Option<Filter>,
    pub sort_by: Vec<(String, bool)>,
    pub property_names: Option<Vec<String>>,
    pub srs_name: Option<String>,
}

#[derive(Debug, Clone)]
pub enum QueryExpression {
    Adhoc(AdhocQuery),
    Stored { id: String, parameters: HashMap<String, String> },
}

#[derive(Debug, Clone)]
pub struct GetFeatureRequest {
    pub queries: Vec<QueryExpression>,
    pub count: Option<u32>,
    pub start_index: u32,
    pub output_format: Option<String>,
    pub resolve: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GetPropertyValueRequest {
    pub query: QueryExpression,
    pub value_reference: String,
    pub count: Option<u32>,
    pub start_index: u32,
    pub output_format: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DescribeFeatureTypeRequest {
    pub type_names: Vec<TypeName>,
    pub output_format: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GetCapabilitiesRequest {
    pub accept_versions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ListStoredQueriesRequest {}

#[derive(Debug, Clone)]
pub struct DescribeStoredQueriesRequest {
    pub stored_query_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum WfsRequest {
    GetCapabilities(GetCapabilitiesRequest),
    DescribeFeatureType(DescribeFeatureTypeRequest),
    GetFeature(GetFeatureRequest),
    GetPropertyValue(GetPropertyValueRequest),
    ListStoredQueries(ListStoredQueriesRequest),
    DescribeStoredQueries(DescribeStoredQueriesRequest),
}

fn parse_type_names_attr(raw: &str) -> Vec<TypeName> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| match s.split_once(':') {
            Some((ns, local)) => TypeName { namespace: Some(ns.to_string()), local: local.to_string() },
            None => TypeName { namespace: None, local: s.to_string() },
        })
        .collect()
}

fn parse_adhoc_query_element(
    el: &XmlElement,
    force_xy_epsg4326: bool,
    force_xy_old_crs: bool,
) -> Result<AdhocQuery, WfsError> {
    let type_names = el
        .attr("typeNames")
        .or_else(|| el.attr("typeName"))
        .map(parse_type_names_attr)
        .ok_or_else(|| WfsError::MissingParameterValue("typeNames".to_string()))?;

    let filter = el
        .child("Filter")
        .map(|f| fes::parse_filter_xml(f, force_xy_epsg4326, force_xy_old_crs))
        .transpose()?;

    let sort_by = el
        .child("SortBy")
        .map(|sb| {
            sb.children_named("SortProperty")
                .map(|sp| {
                    let field = sp
                        .child("ValueReference")
                        .map(|v| v.text_trimmed().to_string())
                        .unwrap_or_default();
                    let ascending = sp
                        .child("SortOrder")
                        .map(|o| !matches!(o.text_trimmed(), "DESC" | "D"))
                        .unwrap_or(true);
                    (field, ascending)
                })
                .collect()
        })
        .unwrap_or_default();

    let property_names: Vec<String> =
        el.children_named("PropertyName").map(|p| p.text_trimmed().to_string()).collect();
    let property_names = if property_names.is_empty() { None } else { Some(property_names) };

    let srs_name = el.attr("srsName").map(|s| s.to_string());

    Ok(AdhocQuery { type_names, filter, sort_by, property_names, srs_name })
}

/// Parse a complete WFS 2.0 request from its XML document root.
pub fn from_xml(
    root: &XmlElement,
    force_xy_epsg4326: bool,
    force_xy_old_crs: bool,
) -> Result<WfsRequest, WfsError> {
    match root.local_name.as_str() {
        "GetCapabilities" => {
            let accept_versions = root
                .child("AcceptVersions")
                .map(|av| av.children_named("Version").map(|v| v.text_trimmed().to_string()).collect())
                .unwrap_or_default();
            Ok(WfsRequest::GetCapabilities(GetCapabilitiesRequest { accept_versions }))
        }
        "DescribeFeatureType" => {
            let type_names = root
                .children_named("TypeName")
                .map(|tn| match tn.text_trimmed().split_once(':') {
                    Some((ns, local)) => TypeName { namespace: Some(ns.to_string()), local: local.to_string() },
                    None => TypeName { namespace: None, local: tn.text_trimmed().to_string() },
                })
                .collect();
            let output_format = root.attr("outputFormat").map(|s| s.to_string());
            Ok(WfsRequest::DescribeFeatureType(DescribeFeatureTypeRequest { type_names, output_format }))
        }
        "GetFeature" => {
            let count = root.attr("count").map(|s| s.parse::<u32>()).transpose().map_err(|_| {
                WfsError::invalid_parameter_at("count must be a non-negative integer", "count")
            })?;
            let start_index = root
                .attr("startIndex")
                .map(|s| s.parse::<u32>())
                .transpose()
                .map_err(|_| WfsError::invalid_parameter_at("startIndex must be a non-negative integer", "startIndex"))?
                .unwrap_or(0);
            let output_format = root.attr("outputFormat").map(|s| s.to_string());
            let resolve = root.attr("resolve").map(|s| s.to_string());

            let mut queries = Vec::new();
            for query_el in root.children_named("Query") {
                queries.push(QueryExpression::Adhoc(parse_adhoc_query_element(
                    query_el,
                    force_xy_epsg4326,
                    force_xy_old_crs,
                )?));
            }
            for sq_el in root.children_named("StoredQuery") {
                let id = sq_el
                    .attr("id")
                    .ok_or_else(|| WfsError::MissingParameterValue("StoredQuery/@id".to_string()))?
                    .to_string();
                let mut parameters = HashMap::new();
                for p in sq_el.children_named("Parameter") {
                    if let Some(name) = p.attr("name") {
                        parameters.insert(name.to_string(), p.text_trimmed().to_string());
                    }
                }
                queries.push(QueryExpression::Stored { id, parameters });
            }
            if queries.is_empty() {
                return Err(WfsError::parsing_failed("wfs:GetFeature has no Query or StoredQuery"));
            }

            Ok(WfsRequest::GetFeature(GetFeatureRequest { queries, count, start_index, output_format, resolve }))
        }
        "GetPropertyValue" => {
            let value_reference = root
                .child("ValueReference")
                .map(|v| v.text_trimmed().to_string())
                .ok_or_else(|| WfsError::MissingParameterValue("ValueReference".to_string()))?;
            let count = root.attr("count").map(|s| s.parse::<u32>()).transpose().ok().flatten();
            let start_index =
                root.attr("startIndex").and_then(|s| s.parse::<u32>().ok()).unwrap_or(0);
            let output_format = root.attr("outputFormat").map(|s| s.to_string());
            let query_el = root
                .child("Query")
                .ok_or_else(|| WfsError::parsing_failed("wfs:GetPropertyValue has no Query"))?;
            let query =
                QueryExpression::Adhoc(parse_adhoc_query_element(query_el, force_xy_epsg4326, force_xy_old_crs)?);
            Ok(WfsRequest::GetPropertyValue(GetPropertyValueRequest {
                query,
                value_reference,
                count,
                start_index,
                output_format,
            }))
        }
        "ListStoredQueries" => Ok(WfsRequest::ListStoredQueries(ListStoredQueriesRequest {})),
        "DescribeStoredQueries" => {
            let ids = root.children_named("StoredQueryId").map(|e| e.text_trimmed().to_string()).collect();
            Ok(WfsRequest::DescribeStoredQueries(DescribeStoredQueriesRequest { stored_query_ids: ids }))
        }
        other => Err(WfsError::OperationNotSupported(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xml::parse_document;

    #[test]
    fn parses_get_feature_with_filter_xml() {
        let doc = r#"<wfs:GetFeature xmlns:wfs="http://www.opengis.net/wfs/2.0" xmlns:fes="http://www.opengis.net/fes/2.0" count="2">
            <wfs:Query typeNames="app:restaurant">
                <fes:Filter>
                    <fes:PropertyIsGreaterThanOrEqualTo>
                        <fes:ValueReference>app:rating</fes:ValueReference>
                        <fes:Literal>3.0</fes:Literal>
                    </fes:PropertyIsGreaterThanOrEqualTo>
                </fes:Filter>
            </wfs:Query>
        </wfs:GetFeature>"#;
        let root = parse_document(doc).unwrap();
        let req = from_xml(&root, false, false).unwrap();
        let WfsRequest::GetFeature(gf) = req else { panic!("expected GetFeature") };
        assert_eq!(gf.count, Some(2));
        assert_eq!(gf.queries.len(), 1);
    }

    #[test]
    fn kvp_and_xml_forms_produce_equivalent_type_names() {
        let kvp_params = KvpParams::from_pairs([
            ("REQUEST".to_string(), "GetFeature".to_string()),
            ("TYPENAMES".to_string(), "app:restaurant".to_string()),
        ]);
        let WfsRequest::GetFeature(from_kvp_req) = kvp::from_kvp(&kvp_params, false, false).unwrap() else {
            panic!("expected GetFeature")
        };

        let doc = r#"<wfs:GetFeature xmlns:wfs="http://www.opengis.net/wfs/2.0">
            <wfs:Query typeNames="app:restaurant"/>
        </wfs:GetFeature>"#;
        let root = parse_document(doc).unwrap();
        let WfsRequest::GetFeature(from_xml_req) = from_xml(&root, false, false).unwrap() else {
            panic!("expected GetFeature")
        };

        let QueryExpression::Adhoc(kvp_query) = &from_kvp_req.queries[0] else { panic!() };
        let QueryExpression::Adhoc(xml_query) = &from_xml_req.queries[0] else { panic!() };
        assert_eq!(kvp_query.type_names, xml_query.type_names);
    }

    #[test]
    fn missing_query_is_parsing_failure() {
        let doc = r#"<wfs:GetFeature xmlns:wfs="http://www.opengis.net/wfs/2.0"/>"#;
        let root = parse_document(doc).unwrap();
        let err = from_xml(&root, false, false).unwrap_err();
        assert_eq!(err.exception_code(), "OperationParsingFailed");
    }

    #[test]
    fn unsupported_request_tag() {
        let doc = r#"<wfs:LockFeature xmlns:wfs="http://www.opengis.net/wfs/2.0"/>"#;
        let root = parse_document(doc).unwrap();
        let err = from_xml(&root, false, false).unwrap_err();
        assert_eq!(err.exception_code(), "OperationNotSupported");
    }
}
