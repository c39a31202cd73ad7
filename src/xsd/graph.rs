use indexmap::IndexMap;

use super::types::{
    AtomicType, ElementRole, FieldSpec, Occurs, TypeRef, XsdAttribute, XsdComplexType, XsdElement,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub usize);

/// Arena-indexed graph of feature-type schemas. Elements and complex types
/// are referenced by index, never by owning handle, so cyclic/back
/// references between feature types (a relation whose target refers back to
/// its source) don't require `Rc`/`RefCell` gymnastics.
#[derive(Debug, Default)]
pub struct SchemaGraph {
    types: Vec<XsdComplexType>,
    elements: Vec<XsdElement>,
    feature_types: IndexMap<String, TypeId>,
}

impl SchemaGraph {
    pub fn new() -> Self {
        SchemaGraph::default()
    }

    pub fn type_by_id(&self, id: TypeId) -> &XsdComplexType {
        &self.types[id.0]
    }

    pub fn element_by_id(&self, id: ElementId) -> &XsdElement {
        &self.elements[id.0]
    }

    pub fn feature_type(&self, qname: &str) -> Option<TypeId> {
        self.feature_types.get(qname).copied()
    }

    pub fn feature_type_names(&self) -> impl Iterator<Item = &str> {
        self.feature_types.keys().map(|s| s.as_str())
    }

    /// Register a feature type from a declarative field list. `identity_path`
    /// is the data-source path to the field that carries the feature's
    /// primary key, exposed as the `gml:id` attribute (`<typename>.<id>`).
    pub fn build_feature_type(
        &mut self,
        namespace: &str,
        local_name: &str,
        identity_path: &str,
        fields: Vec<FieldSpec>,
    ) -> TypeId {
        let type_id = self.build_complex(namespace, local_name, "", fields);
        self.types[type_id.0].attributes.push(XsdAttribute {
            local_name: "id".to_string(),
            atomic_type: AtomicType::String,
            data_source_path: identity_path.to_string(),
        });
        let attr_idx = self.types[type_id.0].attributes.len() - 1;
        self.types[type_id.0].gml_id_attribute = Some(attr_idx);
        let qname = format!("{{{namespace}}}{local_name}");
        self.feature_types.insert(qname, type_id);
        type_id
    }

    fn build_complex(
        &mut self,
        namespace: &str,
        name: &str,
        base_path: &str,
        fields: Vec<FieldSpec>,
    ) -> TypeId {
        let type_id = TypeId(self.types.len());
        self.types.push(XsdComplexType {
            name: name.to_string(),
            namespace: namespace.to_string(),
            elements: Vec::new(),
            attributes: Vec::new(),
            gml_id_attribute: None,
        });

        let mut element_ids = Vec::new();
        for field in fields {
            let element_id = self.build_field(namespace, base_path, field);
            element_ids.push(element_id);
        }
        self.types[type_id.0].elements = element_ids;
        type_id
    }

    fn build_field(&mut self, namespace: &str, base_path: &str, field: FieldSpec) -> ElementId {
        let joined = |path: &str| {
            if base_path.is_empty() {
                path.to_string()
            } else {
                format!("{base_path}.{path}")
            }
        };

        let element = match field {
            FieldSpec::Scalar { name, path, atomic, nillable } => XsdElement {
                local_name: name.to_string(),
                namespace: namespace.to_string(),
                type_ref: TypeRef::Atomic(atomic),
                min_occurs: if nillable { 0 } else { 1 },
                max_occurs: Occurs::Bounded(1),
                nillable,
                data_source_path: joined(path),
                local_path: path.to_string(),
                role: ElementRole::Plain,
            },
            FieldSpec::Geometry { name, path, nillable } => XsdElement {
                local_name: name.to_string(),
                namespace: namespace.to_string(),
                type_ref: TypeRef::Atomic(AtomicType::AnyType),
                min_occurs: if nillable { 0 } else { 1 },
                max_occurs: Occurs::Bounded(1),
                nillable,
                data_source_path: joined(path),
                local_path: path.to_string(),
                role: ElementRole::Geometry,
            },
            FieldSpec::Complex { name, path, many, fields } => {
                let absolute = joined(path);
                let child_type = self.build_complex(namespace, name, &absolute, fields);
                XsdElement {
                    local_name: name.to_string(),
                    namespace: namespace.to_string(),
                    type_ref: TypeRef::Complex(child_type),
                    min_occurs: 0,
                    max_occurs: if many { Occurs::Unbounded } else { Occurs::Bounded(1) },
                    nillable: true,
                    data_source_path: absolute,
                    local_path: path.to_string(),
                    role: ElementRole::Plain,
                }
            }
        };

        let id = ElementId(self.elements.len());
        self.elements.push(element);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xsd::FieldSpec;

    fn sample_graph() -> (SchemaGraph, TypeId) {
        let mut graph = SchemaGraph::new();
        let type_id = graph.build_feature_type(
            "http://example.org/gisserver",
            "restaurant",
            "id",
            vec![
                FieldSpec::Scalar {
                    name: "name",
                    path: "name",
                    atomic: AtomicType::String,
                    nillable: false,
                },
                FieldSpec::Scalar {
                    name: "rating",
                    path: "rating",
                    atomic: AtomicType::Double,
                    nillable: true,
                },
                FieldSpec::Geometry { name: "geometry", path: "geom", nillable: false },
            ],
        );
        (graph, type_id)
    }

    #[test]
    fn builds_flat_feature_type() {
        let (graph, type_id) = sample_graph();
        let ty = graph.type_by_id(type_id);
        assert_eq!(ty.elements.len(), 3);
        assert!(ty.gml_id_attribute.is_some());

        let geom_el = graph.element_by_id(ty.elements[2]);
        assert!(geom_el.is_geometry());
        assert_eq!(geom_el.data_source_path, "geom");
    }

    #[test]
    fn feature_type_lookup_by_qname() {
        let (graph, type_id) = sample_graph();
        let looked_up = graph.feature_type("{http://example.org/gisserver}restaurant").unwrap();
        assert_eq!(looked_up, type_id);
    }

    #[test]
    fn nested_complex_field_gets_absolute_path() {
        let mut graph = SchemaGraph::new();
        let type_id = graph.build_feature_type(
            "http://example.org/gisserver",
            "order",
            "id",
            vec![FieldSpec::Complex {
                name: "items",
                path: "items",
                many: true,
                fields: vec![FieldSpec::Scalar {
                    name: "sku",
                    path: "sku",
                    atomic: AtomicType::String,
                    nillable: false,
                }],
            }],
        );
        let ty = graph.type_by_id(type_id);
        let items_el = graph.element_by_id(ty.elements[0]);
        assert!(items_el.is_many());
        let TypeRef::Complex(child_id) = items_el.type_ref else { panic!("expected complex") };
        let child = graph.type_by_id(child_id);
        let sku_el = graph.element_by_id(child.elements[0]);
        assert_eq!(sku_el.data_source_path, "items.sku");
    }
}
