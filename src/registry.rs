//! Process-wide server state (SPEC_FULL.md §5): the schema graph, one
//! default CRS per feature type, the function and stored-query registries,
//! the datastore, and the reprojection seam. Populated once at bootstrap
//! and thereafter immutable except for the CRS transform cache, which is
//! the only piece of shared mutable state (see `crate::crs::cache`).
//!
//! Grounded on the teacher's `build_router` in `src/main.rs`, which builds
//! one `Arc`-wrapped service per resource and hands them all to the router;
//! generalized here into a single bundle because this crate's "services"
//! all close over the same schema graph and datastore rather than each
//! owning an independent `Database` handle.

use std::sync::Arc;

use crate::config::Config;
use crate::crs::{Crs, TransformCache};
use crate::datastore::{Datastore, InMemoryDatastore, Row};
use crate::geom::Geometry;
use crate::query::{FunctionRegistry, Reprojector};
use crate::query::stored_query::StoredQueryRegistry;
use crate::xsd::{AtomicType, FieldSpec, FieldValue, SchemaGraph, TypeId};

pub const NAMESPACE: &str = "http://example.org/gisserver";
pub const NAMESPACE_PREFIX: &str = "app";

/// One exposed feature type: its schema graph entry and the CRS its
/// geometries are stored in.
#[derive(Debug, Clone)]
pub struct FeatureTypeInfo {
    pub type_id: TypeId,
    pub local_name: String,
    pub namespace: String,
    pub storage_crs: Crs,
}

impl FeatureTypeInfo {
    pub fn qname(&self) -> String {
        format!("{{{}}}{}", self.namespace, self.local_name)
    }
}

/// Wraps a `Reprojector` with the shared LRU transform cache. The actual
/// coordinate transform is the identity function: this crate carries no
/// PROJ-equivalent dependency, so reprojection across genuinely different
/// SRIDs is a documented limitation (see DESIGN.md) rather than a silent
/// no-op — callers that need a real transform plug one in here via `build`.
pub struct CachingReprojector {
    cache: TransformCache,
}

impl CachingReprojector {
    pub fn new() -> Self {
        CachingReprojector { cache: TransformCache::new() }
    }
}

impl Default for CachingReprojector {
    fn default() -> Self {
        Self::new()
    }
}

impl Reprojector for CachingReprojector {
    fn reproject(&self, geometry: &Geometry, to_srid: i32) -> Geometry {
        self.cache.apply_or_build(geometry.srid(), to_srid, geometry, || {
            Arc::new(|g: &Geometry| g.clone())
        })
    }
}

/// Bundle of everything a request handler needs that outlives the request:
/// the schema graph, feature type catalog, datastore, reprojector, and the
/// function/stored-query registries. Built once in `bootstrap` and shared
/// behind an `Arc`.
pub struct ServerState {
    pub config: Arc<Config>,
    pub graph: SchemaGraph,
    pub feature_types: Vec<FeatureTypeInfo>,
    pub datastore: Arc<dyn Datastore>,
    pub reprojector: Arc<dyn Reprojector>,
    pub function_registry: FunctionRegistry,
    pub stored_query_registry: StoredQueryRegistry,
}

impl ServerState {
    pub fn feature_type(&self, local_name: &str) -> Option<&FeatureTypeInfo> {
        self.feature_types.iter().find(|ft| ft.local_name == local_name)
    }

    pub fn feature_type_by_qname(&self, qname: &str) -> Option<&FeatureTypeInfo> {
        self.feature_types.iter().find(|ft| ft.qname() == qname)
    }

    /// Build the demo schema and reference datastore, register the builtin
    /// functions and stored queries, and wrap it all in one `Arc`. This is
    /// the reference-datastore bootstrap described in SPEC_FULL.md §4.10;
    /// a production deployment would replace `seed_datastore` with a
    /// connection to a real backend implementing `Datastore`.
    pub fn bootstrap(config: Arc<Config>) -> Arc<Self> {
        let mut graph = SchemaGraph::new();

        let restaurant_id = graph.build_feature_type(
            NAMESPACE,
            "restaurant",
            "id",
            vec![
                FieldSpec::Scalar { name: "name", path: "name", atomic: AtomicType::String, nillable: false },
                FieldSpec::Scalar { name: "rating", path: "rating", atomic: AtomicType::Double, nillable: true },
                FieldSpec::Scalar { name: "cuisine", path: "cuisine", atomic: AtomicType::String, nillable: true },
                FieldSpec::Scalar { name: "openedOn", path: "opened_on", atomic: AtomicType::DateTime, nillable: true },
                FieldSpec::Geometry { name: "geometry", path: "geom", nillable: false },
            ],
        );

        let order_id = graph.build_feature_type(
            NAMESPACE,
            "order",
            "id",
            vec![
                FieldSpec::Scalar { name: "restaurantId", path: "restaurant_id", atomic: AtomicType::String, nillable: false },
                FieldSpec::Scalar { name: "total", path: "total", atomic: AtomicType::Double, nillable: false },
                FieldSpec::Complex {
                    name: "items",
                    path: "items",
                    many: true,
                    fields: vec![
                        FieldSpec::Scalar { name: "sku", path: "sku", atomic: AtomicType::String, nillable: false },
                        FieldSpec::Scalar { name: "quantity", path: "quantity", atomic: AtomicType::Integer, nillable: false },
                    ],
                },
                FieldSpec::Geometry { name: "deliveryLocation", path: "delivery_geom", nillable: true },
            ],
        );

        let feature_types = vec![
            FeatureTypeInfo {
                type_id: restaurant_id,
                local_name: "restaurant".to_string(),
                namespace: NAMESPACE.to_string(),
                storage_crs: Crs::crs84(),
            },
            FeatureTypeInfo {
                type_id: order_id,
                local_name: "order".to_string(),
                namespace: NAMESPACE.to_string(),
                storage_crs: Crs::crs84(),
            },
        ];

        let datastore = Arc::new(InMemoryDatastore::new());
        seed_datastore(&datastore);

        Arc::new(ServerState {
            config,
            graph,
            feature_types,
            datastore,
            reprojector: Arc::new(CachingReprojector::new()),
            function_registry: FunctionRegistry::with_builtins(),
            stored_query_registry: StoredQueryRegistry::with_builtins(),
        })
    }
}

fn field(values: &[(&str, FieldValue)]) -> Row {
    Row { values: values.iter().map(|(k, v)| (k.to_string(), v.clone())).collect() }
}

fn seed_datastore(datastore: &InMemoryDatastore) {
    datastore.seed(
        "restaurant",
        vec![
            field(&[
                ("id", FieldValue::String("1".to_string())),
                ("name", FieldValue::String("Cafe Amsterdam".to_string())),
                ("rating", FieldValue::Double(4.5)),
                ("cuisine", FieldValue::String("dutch".to_string())),
                ("geom", FieldValue::Geometry(Geometry::Point { srid: 4326, x: 4.895, y: 52.370 })),
            ]),
            field(&[
                ("id", FieldValue::String("2".to_string())),
                ("name", FieldValue::String("Trattoria Roma".to_string())),
                ("rating", FieldValue::Double(4.0)),
                ("cuisine", FieldValue::String("italian".to_string())),
                ("geom", FieldValue::Geometry(Geometry::Point { srid: 4326, x: 12.496, y: 41.903 })),
            ]),
            field(&[
                ("id", FieldValue::String("3".to_string())),
                ("name", FieldValue::String("Noodle Bar".to_string())),
                ("rating", FieldValue::Null),
                ("cuisine", FieldValue::String("thai".to_string())),
                ("geom", FieldValue::Geometry(Geometry::Point { srid: 4326, x: 100.523, y: 13.736 })),
            ]),
        ],
    );

    datastore.seed(
        "order",
        vec![field(&[
            ("id", FieldValue::String("1001".to_string())),
            ("restaurant_id", FieldValue::String("1".to_string())),
            ("parent_id", FieldValue::String("1".to_string())),
            ("total", FieldValue::Double(23.5)),
        ])],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_registers_demo_feature_types() {
        let state = ServerState::bootstrap(Arc::new(Config::default()));
        assert!(state.feature_type("restaurant").is_some());
        assert!(state.feature_type("order").is_some());
        assert_eq!(state.feature_type("restaurant").unwrap().qname(), "{http://example.org/gisserver}restaurant");
    }

    #[test]
    fn bootstrap_seeds_reference_datastore() {
        let state = ServerState::bootstrap(Arc::new(Config::default()));
        assert!(state.graph.feature_type("{http://example.org/gisserver}restaurant").is_some());
    }

    #[test]
    fn caching_reprojector_is_identity_across_srids() {
        let reprojector = CachingReprojector::new();
        let g = Geometry::Point { srid: 28992, x: 1.0, y: 2.0 };
        let out = reprojector.reproject(&g, 4326);
        assert_eq!(out, g);
    }
}
