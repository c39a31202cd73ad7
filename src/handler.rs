//! HTTP request dispatch (SPEC_FULL.md §4.3-4.9): turns a parsed
//! `WfsRequest` into a rendered response, wiring the query compiler,
//! projection planner, and output renderers together for each of the six
//! operations.
//!
//! Grounded on `src/api/features/handlers.rs`'s per-operation handler
//! functions, generalized from one CRUD resource behind a router to the six
//! WFS operations dispatched from a single `GET /wfs` and `POST /wfs` pair.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use crate::ast::kvp::KvpParams;
use crate::ast::{
    self, AdhocQuery, DescribeFeatureTypeRequest, DescribeStoredQueriesRequest, GetCapabilitiesRequest,
    GetFeatureRequest, GetPropertyValueRequest, ListStoredQueriesRequest, QueryExpression, WfsRequest,
};
use crate::collection::{resolve_page_params, SimpleFeatureCollection, DEFAULT_CHUNK_SIZE};
use crate::error::WfsError;
use crate::projection::build_projection_plan;
use crate::query::compile_adhoc_query;
use crate::registry::{FeatureTypeInfo, ServerState};
use crate::render::{capabilities, csv, describe_feature_type, geojson, gml};

/// Normalize a requested `outputFormat` to the short format key used by
/// `Config::max_page_size` and the renderer dispatch below. Unrecognized
/// values are rejected rather than silently falling back to GML.
fn normalize_format(raw: Option<&str>) -> Result<&'static str, WfsError> {
    match raw.map(|s| s.to_ascii_lowercase()) {
        None => Ok("gml"),
        Some(f) if f.contains("gml") || f.contains("xml") => Ok("gml"),
        Some(f) if f.contains("json") => Ok("geojson"),
        Some(f) if f.contains("csv") => Ok("csv"),
        Some(other) => Err(WfsError::invalid_parameter_at(format!("unsupported outputFormat '{other}'"), "OUTPUTFORMAT")),
    }
}

fn content_type_for(format: &str) -> &'static str {
    match format {
        "geojson" => geojson::CONTENT_TYPE,
        "csv" => csv::CONTENT_TYPE,
        _ => gml::CONTENT_TYPE,
    }
}

fn resolve_query(state: &ServerState, expr: &QueryExpression) -> Result<AdhocQuery, WfsError> {
    match expr {
        QueryExpression::Adhoc(query) => Ok(query.clone()),
        QueryExpression::Stored { id, parameters } => state.stored_query_registry.resolve(id, parameters),
    }
}

fn is_get_feature_by_id(expr: &QueryExpression) -> bool {
    matches!(expr, QueryExpression::Stored { id, .. } if id == crate::query::stored_query::GET_FEATURE_BY_ID)
}

/// CITE compat (SPEC_FULL.md §6/§8): `GetFeatureById` with a malformed or
/// nonexistent id returns 404, not the 400 an `InvalidParameterValue` would
/// normally carry. `WfsStrictStandard` turns this compat behavior off.
fn cite_compat_not_found(state: &ServerState, err: WfsError) -> WfsError {
    if state.config.wfs_strict_standard {
        err
    } else {
        WfsError::FeatureIdNotFound(err.to_string())
    }
}

/// Build one `SimpleFeatureCollection` for a resolved ad-hoc query. A
/// `wfs:Query` may in principle name more than one `typeNames` entry for a
/// join-style request; this server only supports a single type per query,
/// consistent with `ast::kvp::build_adhoc_queries`'s existing
/// single-`AdhocQuery` simplification (see DESIGN.md), so only the first
/// named type is honored here.
fn build_collection(
    state: &ServerState,
    query: &AdhocQuery,
    format: &str,
    start_index: u32,
    count: Option<u32>,
) -> Result<SimpleFeatureCollection, WfsError> {
    let type_name = query.type_names.first().ok_or_else(|| WfsError::MissingParameterValue("typeNames".to_string()))?;
    let feature = state
        .feature_type(&type_name.local)
        .ok_or_else(|| WfsError::invalid_parameter_at(format!("unknown feature type '{}'", type_name.local), "TYPENAMES"))?
        .clone();

    let compiled = compile_adhoc_query(
        &state.graph,
        feature.type_id,
        &feature.local_name,
        query,
        feature.storage_crs.srid,
        state.reprojector.as_ref(),
        &state.function_registry,
    )?;

    let plan = build_projection_plan(
        &state.graph,
        &feature,
        &feature.local_name,
        query.property_names.as_deref(),
        query.srs_name.as_deref(),
        state.config.force_xy_epsg4326,
        state.config.force_xy_old_crs,
    )?;

    let page = resolve_page_params(&state.config, format, start_index, count);
    Ok(SimpleFeatureCollection { feature, compiled, plan, page })
}

async fn handle_get_feature(state: &ServerState, req: &GetFeatureRequest) -> Result<(String, &'static str), WfsError> {
    let format = normalize_format(req.output_format.as_deref())?;

    let mut pages = Vec::new();
    let mut number_matched_total = Some(0u64);
    for expr in &req.queries {
        let by_id = is_get_feature_by_id(expr);
        let query = resolve_query(state, expr).map_err(|err| if by_id { cite_compat_not_found(state, err) } else { err })?;
        let sfc = build_collection(state, &query, format, req.start_index, req.count)?;
        let page = sfc.fetch_page(state.datastore.as_ref(), DEFAULT_CHUNK_SIZE).await?;
        if by_id && page.rows.is_empty() && !state.config.wfs_strict_standard {
            return Err(WfsError::FeatureIdNotFound("no feature matches the requested id".to_string()));
        }
        let matched = sfc.number_matched(state.datastore.as_ref(), state.config.count_number_matched).await?;
        number_matched_total = match (number_matched_total, matched) {
            (Some(total), Some(n)) => Some(total + n),
            _ => None,
        };
        pages.push((sfc, page));
    }

    let body = match format {
        "geojson" => geojson::render_geojson(&state.graph, &pages, state.reprojector.as_ref(), number_matched_total, Vec::new()),
        "csv" => csv::render_csv(&state.graph, &pages),
        _ => gml::render_feature_collection(&state.graph, &pages, number_matched_total, Utc::now()),
    };
    Ok((body, content_type_for(format)))
}

async fn handle_get_property_value(
    state: &ServerState,
    req: &GetPropertyValueRequest,
) -> Result<(String, &'static str), WfsError> {
    let format = normalize_format(req.output_format.as_deref())?;

    let mut query = resolve_query(state, &req.query)?;
    let requested_path = req.value_reference.rsplit(':').next().unwrap_or(&req.value_reference).to_string();
    query.property_names = Some(vec![requested_path]);

    let sfc = build_collection(state, &query, format, req.start_index, req.count)?;
    let page = sfc.fetch_page(state.datastore.as_ref(), DEFAULT_CHUNK_SIZE).await?;
    let matched = sfc.number_matched(state.datastore.as_ref(), state.config.count_number_matched).await?;
    let pages = vec![(sfc, page)];

    let body = match format {
        "geojson" => geojson::render_value_array(&state.graph, &pages, state.reprojector.as_ref()),
        "csv" => csv::render_csv(&state.graph, &pages),
        _ => gml::render_value_collection(&state.graph, &pages, matched, Utc::now()),
    };
    Ok((body, content_type_for(format)))
}

fn handle_describe_feature_type(
    state: &ServerState,
    req: &DescribeFeatureTypeRequest,
) -> Result<(String, &'static str), WfsError> {
    let feature_types: Vec<&FeatureTypeInfo> = if req.type_names.is_empty() {
        state.feature_types.iter().collect()
    } else {
        req.type_names
            .iter()
            .map(|tn| {
                state
                    .feature_type(&tn.local)
                    .ok_or_else(|| WfsError::invalid_parameter_at(format!("unknown feature type '{}'", tn.local), "TYPENAME"))
            })
            .collect::<Result<_, _>>()?
    };
    let body = describe_feature_type::render_describe_feature_type(&state.graph, &feature_types);
    Ok((body, describe_feature_type::CONTENT_TYPE))
}

async fn handle_get_capabilities(
    state: &ServerState,
    _req: &GetCapabilitiesRequest,
) -> Result<(String, &'static str), WfsError> {
    let mut bounding_boxes = Vec::new();
    if state.config.capabilities_bounding_box {
        for feature in &state.feature_types {
            let geometry_path = state
                .graph
                .type_by_id(feature.type_id)
                .elements
                .iter()
                .map(|&eid| state.graph.element_by_id(eid))
                .find(|el| el.is_geometry())
                .map(|el| el.data_source_path.clone());
            let Some(path) = geometry_path else { continue };
            if let Some(bbox) = capabilities::scan_bounding_box(state.datastore.as_ref(), &feature.local_name, &path).await {
                bounding_boxes.push((feature.local_name.clone(), bbox));
            }
        }
    }

    let body = capabilities::render_capabilities(
        &state.config.base_url,
        &state.feature_types,
        &bounding_boxes,
        &state.function_registry,
        &state.stored_query_registry,
    );
    Ok((body, capabilities::CONTENT_TYPE))
}

fn handle_list_stored_queries(state: &ServerState, _req: &ListStoredQueriesRequest) -> (String, &'static str) {
    (capabilities::render_stored_query_list(&state.stored_query_registry), capabilities::CONTENT_TYPE)
}

fn handle_describe_stored_queries(
    state: &ServerState,
    req: &DescribeStoredQueriesRequest,
) -> Result<(String, &'static str), WfsError> {
    let body = capabilities::render_stored_query_descriptions(&state.stored_query_registry, &req.stored_query_ids)?;
    Ok((body, capabilities::CONTENT_TYPE))
}

async fn dispatch(state: &ServerState, request: WfsRequest) -> Result<(String, &'static str), WfsError> {
    match request {
        WfsRequest::GetCapabilities(req) => handle_get_capabilities(state, &req).await,
        WfsRequest::DescribeFeatureType(req) => handle_describe_feature_type(state, &req),
        WfsRequest::GetFeature(req) => handle_get_feature(state, &req).await,
        WfsRequest::GetPropertyValue(req) => handle_get_property_value(state, &req).await,
        WfsRequest::ListStoredQueries(req) => Ok(handle_list_stored_queries(state, &req)),
        WfsRequest::DescribeStoredQueries(req) => handle_describe_stored_queries(state, &req),
    }
}

async fn respond(state: &ServerState, parsed: Result<WfsRequest, WfsError>) -> Response {
    let result = match parsed {
        Ok(request) => dispatch(state, request).await,
        Err(err) => Err(err),
    };
    match result {
        Ok((body, content_type)) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(err) => err.into_response(),
    }
}

/// `GET /wfs`: requests encoded as KVP query parameters.
pub async fn wfs_get(State(state): State<Arc<ServerState>>, RawQuery(query): RawQuery) -> Response {
    let pairs: Vec<(String, String)> = query
        .as_deref()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    let params = KvpParams::from_pairs(pairs);
    let parsed = ast::kvp::from_kvp(&params, state.config.force_xy_epsg4326, state.config.force_xy_old_crs);
    respond(&state, parsed).await
}

/// `POST /wfs`: requests encoded as an XML document body.
pub async fn wfs_post(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    let parsed = match std::str::from_utf8(&body) {
        Ok(text) => ast::xml::parse_document(text)
            .and_then(|root| ast::from_xml(&root, state.config.force_xy_epsg4326, state.config.force_xy_old_crs)),
        Err(_) => Err(WfsError::parsing_failed("request body is not valid UTF-8")),
    };
    respond(&state, parsed).await
}
