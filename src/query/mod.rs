//! Compiles parsed ad-hoc queries into datastore-ready predicates and
//! orderings, and resolves stored queries into the ad-hoc form the compiler
//! understands.

pub mod compiler;
pub mod function_registry;
pub mod stored_query;

use crate::ast::AdhocQuery;
use crate::datastore::{Ordering, Predicate};
use crate::error::WfsError;
use crate::xsd::{SchemaGraph, TypeId};

pub use compiler::{IdentityReprojector, Reprojector};
pub use function_registry::FunctionRegistry;

/// The output of compiling one `AdhocQuery` against one feature type: a
/// datastore predicate plus orderings, ready to hand to `Datastore`.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub type_id: TypeId,
    pub predicate: Predicate,
    pub orderings: Vec<Ordering>,
    pub property_names: Option<Vec<String>>,
    pub srs_name: Option<String>,
}

/// Compile one feature type of an `AdhocQuery`. `root_local_name` is the
/// unqualified name of the feature type as registered in `graph`.
pub fn compile_adhoc_query(
    graph: &SchemaGraph,
    type_id: TypeId,
    root_local_name: &str,
    query: &AdhocQuery,
    feature_srid: i32,
    reprojector: &dyn Reprojector,
    registry: &FunctionRegistry,
) -> Result<CompiledQuery, WfsError> {
    let predicate = match &query.filter {
        Some(filter) => {
            compiler::compile_filter(graph, type_id, root_local_name, filter, feature_srid, reprojector, registry)?
        }
        None => Predicate::True,
    };
    let orderings = compiler::compile_ordering(graph, type_id, root_local_name, &query.sort_by)?;
    Ok(CompiledQuery {
        type_id,
        predicate,
        orderings,
        property_names: query.property_names.clone(),
        srs_name: query.srs_name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TypeName;
    use crate::xsd::{AtomicType, FieldSpec};

    #[test]
    fn compiles_query_without_filter_to_true() {
        let mut graph = SchemaGraph::new();
        let type_id = graph.build_feature_type(
            "http://example.org/gisserver",
            "restaurant",
            "id",
            vec![FieldSpec::Scalar { name: "name", path: "name", atomic: AtomicType::String, nillable: false }],
        );
        let query = AdhocQuery {
            type_names: vec![TypeName { namespace: None, local: "restaurant".to_string() }],
            filter: None,
            sort_by: vec![],
            property_names: None,
            srs_name: None,
        };
        let registry = FunctionRegistry::with_builtins();
        let compiled =
            compile_adhoc_query(&graph, type_id, "restaurant", &query, 4326, &IdentityReprojector, &registry).unwrap();
        assert!(matches!(compiled.predicate, Predicate::True));
    }
}
