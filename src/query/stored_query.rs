//! Stored query registry: resolves a `StoredQuery` id + parameters into an
//! `AdhocQuery` the compiler already knows how to handle.
//!
//! Grounded on SPEC_FULL.md §6's "Registered stored queries" table (built-in
//! `urn:ogc:def:query:OGC-WFS::GetFeatureById`) and on the teacher's
//! `FeatureQueryParams`-to-filter lowering in `src/api/features/query.rs`,
//! generalized from one hardcoded shape to a small name-keyed registry.

use std::collections::HashMap;

use crate::ast::fes::{Filter, Predicate as FesPredicate, ResourceId};
use crate::ast::{AdhocQuery, TypeName};
use crate::error::WfsError;

pub const GET_FEATURE_BY_ID: &str = "urn:ogc:def:query:OGC-WFS::GetFeatureById";

/// One registered stored query: a fixed id, the parameter names it accepts,
/// and a function lowering bound parameters to an `AdhocQuery`.
pub struct StoredQueryDefinition {
    pub id: &'static str,
    pub parameter_names: &'static [&'static str],
    resolve: fn(&HashMap<String, String>) -> Result<AdhocQuery, WfsError>,
}

fn resolve_get_feature_by_id(parameters: &HashMap<String, String>) -> Result<AdhocQuery, WfsError> {
    let id = parameters
        .get("ID")
        .or_else(|| parameters.get("id"))
        .ok_or_else(|| WfsError::MissingParameterValue("ID".to_string()))?;

    // "<typename>.<id>" splits on the last dot; a bare id with no typename
    // is rejected here and handled by the caller's 404 compat path instead.
    let (type_local, _) = id
        .rsplit_once('.')
        .ok_or_else(|| WfsError::invalid_parameter_at(format!("'{id}' is not a valid feature id"), "ID"))?;

    Ok(AdhocQuery {
        type_names: vec![TypeName { namespace: None, local: type_local.to_string() }],
        filter: Some(Filter { predicate: FesPredicate::Id(vec![ResourceId { rid: id.clone() }]) }),
        sort_by: vec![],
        property_names: None,
        srs_name: None,
    })
}

/// Process-wide registry of stored queries, seeded with the built-in
/// `GetFeatureById` and open to project-specific registrations.
pub struct StoredQueryRegistry {
    definitions: HashMap<&'static str, StoredQueryDefinition>,
}

impl StoredQueryRegistry {
    pub fn new() -> Self {
        StoredQueryRegistry { definitions: HashMap::new() }
    }

    pub fn with_builtins() -> Self {
        let mut registry = StoredQueryRegistry::new();
        registry.register(StoredQueryDefinition {
            id: GET_FEATURE_BY_ID,
            parameter_names: &["ID"],
            resolve: resolve_get_feature_by_id,
        });
        registry
    }

    pub fn register(&mut self, definition: StoredQueryDefinition) {
        self.definitions.insert(definition.id, definition);
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.definitions.keys().copied()
    }

    pub fn get(&self, id: &str) -> Option<&StoredQueryDefinition> {
        self.definitions.get(id)
    }

    /// Resolve a stored query invocation into the ad-hoc form the compiler
    /// understands.
    pub fn resolve(&self, id: &str, parameters: &HashMap<String, String>) -> Result<AdhocQuery, WfsError> {
        let definition = self
            .get(id)
            .ok_or_else(|| WfsError::invalid_parameter_at(format!("unknown stored query '{id}'"), "STOREDQUERY_ID"))?;
        (definition.resolve)(parameters)
    }
}

impl Default for StoredQueryRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_feature_by_id_decodes_typename_and_id() {
        let registry = StoredQueryRegistry::with_builtins();
        let mut params = HashMap::new();
        params.insert("ID".to_string(), "restaurant.1".to_string());
        let query = registry.resolve(GET_FEATURE_BY_ID, &params).unwrap();
        assert_eq!(query.type_names[0].local, "restaurant");
        let Some(Filter { predicate: FesPredicate::Id(ids) }) = query.filter else { panic!("expected id filter") };
        assert_eq!(ids[0].rid, "restaurant.1");
    }

    #[test]
    fn missing_id_parameter_is_missing_parameter_value() {
        let registry = StoredQueryRegistry::with_builtins();
        let err = registry.resolve(GET_FEATURE_BY_ID, &HashMap::new()).unwrap_err();
        assert_eq!(err.exception_code(), "MissingParameterValue");
    }

    #[test]
    fn malformed_id_is_invalid_parameter() {
        let registry = StoredQueryRegistry::with_builtins();
        let mut params = HashMap::new();
        params.insert("ID".to_string(), "garbage".to_string());
        let err = registry.resolve(GET_FEATURE_BY_ID, &params).unwrap_err();
        assert_eq!(err.exception_code(), "InvalidParameterValue");
    }

    #[test]
    fn unknown_stored_query_id() {
        let registry = StoredQueryRegistry::with_builtins();
        let err = registry.resolve("urn:bogus", &HashMap::new()).unwrap_err();
        assert_eq!(err.exception_code(), "InvalidParameterValue");
    }
}
