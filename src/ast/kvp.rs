//! KVP-to-AST lowering, defined as a strict lowering onto the XML request
//! forms built in `ast::mod`.
//!
//! Grounded on `src/api/features/query.rs`'s `FeatureQueryParams` (typed
//! query parameters with explicit `parse_*`/`validate_*` methods) for the
//! overall shape: each KVP parameter gets its own small, independently
//! testable parsing function.

use std::collections::HashMap;

use crate::crs::Crs;
use crate::error::WfsError;
use crate::geom::BoundingBox;

use super::fes::{Filter, NonIdOperator, Predicate, ResourceId, SpatialOp};
use super::{
    AdhocQuery, DescribeFeatureTypeRequest, DescribeStoredQueriesRequest, GetCapabilitiesRequest,
    GetFeatureRequest, GetPropertyValueRequest, ListStoredQueriesRequest, QueryExpression, TypeName,
    WfsRequest,
};

/// Case-insensitive KVP parameter map: normalizes keys to upper case at
/// construction, per the WFS convention that parameter names are
/// case-insensitive.
pub struct KvpParams {
    params: HashMap<String, String>,
}

impl KvpParams {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let params = pairs.into_iter().map(|(k, v)| (k.to_uppercase(), v)).collect();
        KvpParams { params }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(|s| s.as_str())
    }

    pub fn get_any<'a>(&'a self, keys: &[&str]) -> Option<&'a str> {
        keys.iter().find_map(|k| self.get(k))
    }
}

fn parse_type_names(raw: &str) -> Result<Vec<TypeName>, WfsError> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| match s.split_once(':') {
            Some((ns, local)) => Ok(TypeName { namespace: Some(ns.to_string()), local: local.to_string() }),
            None => Ok(TypeName { namespace: None, local: s.to_string() }),
        })
        .collect()
}

fn parse_bbox(raw: &str, force_xy_epsg4326: bool, force_xy_old_crs: bool) -> Result<BoundingBox, WfsError> {
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 4 && parts.len() != 5 {
        return Err(WfsError::invalid_parameter_at("BBOX requires 4 or 5 comma-separated values", "BBOX"));
    }
    let nums: Result<Vec<f64>, _> = parts[..4].iter().map(|s| s.trim().parse::<f64>()).collect();
    let nums = nums.map_err(|_| WfsError::invalid_parameter_at("BBOX values must be numeric", "BBOX"))?;
    let srid = match parts.get(4) {
        Some(crs_uri) => Crs::parse(crs_uri.trim(), force_xy_epsg4326, force_xy_old_crs)?.srid,
        None => Crs::crs84().srid,
    };
    Ok(BoundingBox::new(srid, nums[0], nums[1], nums[2], nums[3]))
}

fn parse_sort_by(raw: &str) -> Vec<(String, bool)> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|entry| {
            let entry = entry.trim();
            let mut tokens = entry.split_whitespace();
            let field = tokens.next().unwrap_or("").to_string();
            let direction = tokens.next().unwrap_or("ASC").to_uppercase();
            let ascending = !matches!(direction.as_str(), "DESC" | "D");
            (field, ascending)
        })
        .collect()
}

fn parse_property_names(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

fn parse_resource_ids(raw: &str) -> Vec<ResourceId> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| ResourceId { rid: s.to_string() })
        .collect()
}

fn parse_count(params: &KvpParams) -> Result<Option<u32>, WfsError> {
    // MAXFEATURES is the WFS 1.x name for COUNT; both are accepted (compat).
    match params.get_any(&["COUNT", "MAXFEATURES"]) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<u32>()
            .map(Some)
            .map_err(|_| WfsError::invalid_parameter_at("COUNT must be a non-negative integer", "COUNT")),
    }
}

fn parse_start_index(params: &KvpParams) -> Result<u32, WfsError> {
    match params.get("STARTINDEX") {
        None => Ok(0),
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| WfsError::invalid_parameter_at("STARTINDEX must be a non-negative integer", "STARTINDEX")),
    }
}

fn build_adhoc_queries(
    params: &KvpParams,
    force_xy_epsg4326: bool,
    force_xy_old_crs: bool,
) -> Result<Vec<AdhocQuery>, WfsError> {
    let type_names_raw = params
        .get_any(&["TYPENAMES", "TYPENAME"])
        .ok_or_else(|| WfsError::MissingParameterValue("TYPENAMES".to_string()))?;
    let type_names = parse_type_names(type_names_raw)?;

    let bbox_raw = params.get("BBOX");
    let filter_raw = params.get("FILTER");
    if bbox_raw.is_some() && filter_raw.is_some() {
        return Err(WfsError::invalid_parameter("BBOX and FILTER cannot be combined"));
    }

    let mut filter = None;
    if let Some(raw) = filter_raw {
        let el = super::xml::parse_document(raw)?;
        filter = Some(super::fes::parse_filter_xml(&el, force_xy_epsg4326, force_xy_old_crs)?);
    } else if let Some(raw) = bbox_raw {
        let bbox = parse_bbox(raw, force_xy_epsg4326, force_xy_old_crs)?;
        filter = Some(Filter {
            predicate: Predicate::NonId(NonIdOperator::Spatial {
                op: SpatialOp::Bbox,
                value_ref: None,
                geometry: None,
                bbox: Some(bbox),
                distance: None,
            }),
        });
    } else if let Some(raw) = params.get("RESOURCEID") {
        filter = Some(Filter { predicate: Predicate::Id(parse_resource_ids(raw)) });
    }

    let sort_by = params.get("SORTBY").map(parse_sort_by).unwrap_or_default();
    let property_names = params.get("PROPERTYNAME").map(parse_property_names);
    let srs_name = params.get("SRSNAME").map(|s| s.to_string());

    Ok(vec![AdhocQuery {
        type_names,
        filter,
        sort_by,
        property_names,
        srs_name,
    }])
}

pub fn from_kvp(
    params: &KvpParams,
    force_xy_epsg4326: bool,
    force_xy_old_crs: bool,
) -> Result<WfsRequest, WfsError> {
    let request = params
        .get("REQUEST")
        .ok_or_else(|| WfsError::MissingParameterValue("REQUEST".to_string()))?
        .to_uppercase();

    match request.as_str() {
        "GETCAPABILITIES" => {
            let accept_versions = params
                .get_any(&["ACCEPTVERSIONS", "VERSION"])
                .map(|s| s.split(',').map(|v| v.trim().to_string()).collect())
                .unwrap_or_default();
            Ok(WfsRequest::GetCapabilities(GetCapabilitiesRequest { accept_versions }))
        }
        "DESCRIBEFEATURETYPE" => {
            let type_names = params
                .get_any(&["TYPENAMES", "TYPENAME"])
                .map(|raw| parse_type_names(raw))
                .transpose()?
                .unwrap_or_default();
            let output_format = params.get("OUTPUTFORMAT").map(|s| s.to_string());
            Ok(WfsRequest::DescribeFeatureType(DescribeFeatureTypeRequest { type_names, output_format }))
        }
        "GETFEATURE" => {
            if let Some(id) = params.get("STOREDQUERY_ID") {
                let mut parameters = HashMap::new();
                for (key, value) in &params.params {
                    if !matches!(key.as_str(), "SERVICE" | "VERSION" | "REQUEST" | "STOREDQUERY_ID" | "COUNT" | "STARTINDEX" | "OUTPUTFORMAT") {
                        parameters.insert(key.to_string(), value.clone());
                    }
                }
                return Ok(WfsRequest::GetFeature(GetFeatureRequest {
                    queries: vec![QueryExpression::Stored { id: id.to_string(), parameters }],
                    count: parse_count(params)?,
                    start_index: parse_start_index(params)?,
                    output_format: params.get("OUTPUTFORMAT").map(|s| s.to_string()),
                    resolve: params.get("RESOLVE").map(|s| s.to_string()),
                }));
            }
            let queries = build_adhoc_queries(params, force_xy_epsg4326, force_xy_old_crs)?
                .into_iter()
                .map(QueryExpression::Adhoc)
                .collect();
            Ok(WfsRequest::GetFeature(GetFeatureRequest {
                queries,
                count: parse_count(params)?,
                start_index: parse_start_index(params)?,
                output_format: params.get("OUTPUTFORMAT").map(|s| s.to_string()),
                resolve: params.get("RESOLVE").map(|s| s.to_string()),
            }))
        }
        "GETPROPERTYVALUE" => {
            let value_reference = params
                .get("VALUEREFERENCE")
                .ok_or_else(|| WfsError::MissingParameterValue("VALUEREFERENCE".to_string()))?
                .to_string();
            let query = if let Some(id) = params.get("STOREDQUERY_ID") {
                QueryExpression::Stored { id: id.to_string(), parameters: HashMap::new() }
            } else {
                let queries = build_adhoc_queries(params, force_xy_epsg4326, force_xy_old_crs)?;
                QueryExpression::Adhoc(
                    queries.into_iter().next().expect("build_adhoc_queries always returns one query"),
                )
            };
            Ok(WfsRequest::GetPropertyValue(GetPropertyValueRequest {
                query,
                value_reference,
                count: parse_count(params)?,
                start_index: parse_start_index(params)?,
                output_format: params.get("OUTPUTFORMAT").map(|s| s.to_string()),
            }))
        }
        "LISTSTOREDQUERIES" => Ok(WfsRequest::ListStoredQueries(ListStoredQueriesRequest {})),
        "DESCRIBESTOREDQUERIES" => {
            let ids = params
                .get("STOREDQUERY_ID")
                .map(|raw| raw.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default();
            Ok(WfsRequest::DescribeStoredQueries(DescribeStoredQueriesRequest { stored_query_ids: ids }))
        }
        other => Err(WfsError::OperationNotSupported(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kvp(pairs: &[(&str, &str)]) -> KvpParams {
        KvpParams::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    #[test]
    fn parses_get_capabilities() {
        let params = kvp(&[("SERVICE", "WFS"), ("REQUEST", "GetCapabilities")]);
        let req = from_kvp(&params, false, false).unwrap();
        assert!(matches!(req, WfsRequest::GetCapabilities(_)));
    }

    #[test]
    fn missing_request_is_missing_parameter() {
        let params = kvp(&[("SERVICE", "WFS")]);
        let err = from_kvp(&params, false, false).unwrap_err();
        assert_eq!(err.exception_code(), "MissingParameterValue");
    }

    #[test]
    fn maxfeatures_is_accepted_as_count_alias() {
        let params = kvp(&[("REQUEST", "GetFeature"), ("TYPENAMES", "app:restaurant"), ("MAXFEATURES", "10")]);
        let WfsRequest::GetFeature(req) = from_kvp(&params, false, false).unwrap() else {
            panic!("expected GetFeature")
        };
        assert_eq!(req.count, Some(10));
    }

    #[test]
    fn bbox_and_filter_conflict() {
        let params = kvp(&[
            ("REQUEST", "GetFeature"),
            ("TYPENAMES", "app:restaurant"),
            ("BBOX", "1,2,3,4"),
            ("FILTER", "<Filter xmlns=\"http://www.opengis.net/fes/2.0\"><ResourceId rid=\"x.1\"/></Filter>"),
        ]);
        let err = from_kvp(&params, false, false).unwrap_err();
        assert_eq!(err.exception_code(), "InvalidParameterValue");
    }

    #[test]
    fn sortby_direction_aliases() {
        let sorted = parse_sort_by("name D, rating A");
        assert_eq!(sorted, vec![("name".to_string(), false), ("rating".to_string(), true)]);
    }

    #[test]
    fn typename_legacy_alias_accepted() {
        let params = kvp(&[("REQUEST", "GetFeature"), ("TYPENAME", "app:restaurant")]);
        let WfsRequest::GetFeature(req) = from_kvp(&params, false, false).unwrap() else {
            panic!("expected GetFeature")
        };
        assert_eq!(req.queries.len(), 1);
    }

    #[test]
    fn bbox_lowers_to_spatial_filter() {
        let params = kvp(&[("REQUEST", "GetFeature"), ("TYPENAMES", "app:restaurant"), ("BBOX", "4.5,52.0,5.3,52.5")]);
        let WfsRequest::GetFeature(req) = from_kvp(&params, false, false).unwrap() else {
            panic!("expected GetFeature")
        };
        let QueryExpression::Adhoc(q) = &req.queries[0] else { panic!("expected adhoc") };
        let Some(Filter { predicate: Predicate::NonId(NonIdOperator::Spatial { value_ref, bbox, .. }) }) = &q.filter else {
            panic!("expected spatial filter")
        };
        assert!(value_ref.is_none());
        assert_eq!(bbox.as_ref().unwrap().srid, 4326);
    }

    #[test]
    fn bbox_with_explicit_crs_resolves_its_srid() {
        let bbox = parse_bbox("4.58,52.03,5.31,52.49,urn:ogc:def:crs:EPSG::28992", false, false).unwrap();
        assert_eq!(bbox.srid, 28992);
        assert_eq!(bbox.min_x, 4.58);
    }

    #[test]
    fn bbox_with_no_crs_defaults_to_crs84() {
        let bbox = parse_bbox("4.58,52.03,5.31,52.49", false, false).unwrap();
        assert_eq!(bbox.srid, 4326);
    }
}
