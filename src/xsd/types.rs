use crate::geom::Geometry;
use chrono::{DateTime, Utc};

/// Atomic XSD types a scalar element/attribute can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicType {
    String,
    Integer,
    Long,
    Double,
    Boolean,
    DateTime,
    Date,
    AnyType,
}

impl AtomicType {
    pub fn xsd_qname(&self) -> &'static str {
        match self {
            AtomicType::String => "xs:string",
            AtomicType::Integer => "xs:int",
            AtomicType::Long => "xs:long",
            AtomicType::Double => "xs:double",
            AtomicType::Boolean => "xs:boolean",
            AtomicType::DateTime => "xs:dateTime",
            AtomicType::Date => "xs:date",
            AtomicType::AnyType => "xs:anyType",
        }
    }
}

/// A runtime value read out of (or cast for comparison against) the
/// datastore, after `XsdElement::format_raw_value`/`cast_literal`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Geometry(Geometry),
    Array(Vec<FieldValue>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

/// How many times an element may occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurs {
    Bounded(u32),
    Unbounded,
}

/// Role-specific behavior layered on top of a plain element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRole {
    Plain,
    GmlId,
    GmlName,
    GmlBoundedBy,
    Geometry,
}

/// Either an atomic leaf type or a reference to another complex type in the
/// same `SchemaGraph` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRef {
    Atomic(AtomicType),
    Complex(super::graph::TypeId),
}

#[derive(Debug, Clone)]
pub struct XsdElement {
    pub local_name: String,
    pub namespace: String,
    pub type_ref: TypeRef,
    pub min_occurs: u32,
    pub max_occurs: Occurs,
    pub nillable: bool,
    /// Absolute dotted data-source path from the feature type's root.
    pub data_source_path: String,
    /// Path segment relative to this element's parent.
    pub local_path: String,
    pub role: ElementRole,
}

impl XsdElement {
    pub fn is_geometry(&self) -> bool {
        matches!(self.role, ElementRole::Geometry)
    }

    pub fn is_many(&self) -> bool {
        matches!(self.max_occurs, Occurs::Unbounded) || self.min_occurs > 1
    }

    pub fn qname(&self) -> String {
        format!("{{{}}}{}", self.namespace, self.local_name)
    }

    /// Cast a literal's textual form to a value comparable against this
    /// element, per the atomic type. Complex/geometry elements must use
    /// their own cast paths and are rejected here.
    pub fn cast_literal(&self, literal: &str) -> Result<FieldValue, String> {
        let atomic = match self.type_ref {
            TypeRef::Atomic(a) => a,
            TypeRef::Complex(_) if self.is_geometry() => {
                return Err(format!("{} is a geometry element; use geometry literal parsing", self.local_name));
            }
            TypeRef::Complex(_) => {
                return Err(format!("{} is a complex element and has no scalar literal form", self.local_name));
            }
        };
        match atomic {
            AtomicType::String | AtomicType::AnyType => Ok(FieldValue::String(literal.to_string())),
            AtomicType::Integer | AtomicType::Long => literal
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| format!("'{literal}' is not a valid integer for {}", self.local_name)),
            AtomicType::Double => literal
                .parse::<f64>()
                .map(FieldValue::Double)
                .map_err(|_| format!("'{literal}' is not a valid number for {}", self.local_name)),
            AtomicType::Boolean => match literal {
                "true" | "1" => Ok(FieldValue::Boolean(true)),
                "false" | "0" => Ok(FieldValue::Boolean(false)),
                _ => Err(format!("'{literal}' is not a valid boolean for {}", self.local_name)),
            },
            AtomicType::DateTime | AtomicType::Date => DateTime::parse_from_rfc3339(literal)
                .map(|dt| FieldValue::DateTime(dt.with_timezone(&Utc)))
                .map_err(|_| format!("'{literal}' is not a valid dateTime for {}", self.local_name)),
        }
    }

    /// Pass a raw datastore value through for rendering. A no-op today, but
    /// the seam a renderer-specific formatting rule (locale-aware numbers,
    /// truncated timestamps) would hang off without touching every caller.
    pub fn format_raw_value(&self, value: FieldValue) -> FieldValue {
        value
    }
}

#[derive(Debug, Clone)]
pub struct XsdAttribute {
    pub local_name: String,
    pub atomic_type: AtomicType,
    pub data_source_path: String,
}

#[derive(Debug, Clone)]
pub struct XsdComplexType {
    pub name: String,
    pub namespace: String,
    pub elements: Vec<super::graph::ElementId>,
    pub attributes: Vec<XsdAttribute>,
    pub gml_id_attribute: Option<usize>,
}

pub use super::graph::ElementId;

/// Declarative, builder-friendly description of a feature type's fields,
/// consumed by `SchemaGraph::build_feature_type`. Mirrors the way
/// `src/db/models.rs` lists flat struct fields, generalized to allow nested
/// complex sub-trees and arrays.
#[derive(Debug, Clone)]
pub enum FieldSpec {
    Scalar { name: &'static str, path: &'static str, atomic: AtomicType, nillable: bool },
    Geometry { name: &'static str, path: &'static str, nillable: bool },
    Complex { name: &'static str, path: &'static str, many: bool, fields: Vec<FieldSpec> },
}
