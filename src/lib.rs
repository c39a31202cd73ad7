//! A WFS 2.0 / FES 2.0 feature server: parses KVP and XML requests, compiles
//! filters against a typed schema graph, and renders GML, GeoJSON, and CSV
//! feature collections.

pub mod ast;
pub mod collection;
pub mod config;
pub mod crs;
pub mod datastore;
pub mod error;
pub mod geom;
pub mod handler;
pub mod projection;
pub mod query;
pub mod registry;
pub mod render;
pub mod xsd;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handler::{wfs_get, wfs_post};
use crate::registry::ServerState;

/// Builds the two-route `GET /wfs` + `POST /wfs` service (SPEC_FULL.md §4.9).
/// Shared between the binary entry point and integration tests so both drive
/// the exact same middleware stack.
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/wfs", get(wfs_get).post(wfs_post))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
