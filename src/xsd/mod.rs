//! Typed schema model for exposed feature types: an arena-indexed graph of
//! `XsdComplexType`/`XsdElement`/`XsdAttribute`, with XPath resolution.
//!
//! Grounded on DESIGN NOTES §9 ("store elements in a flat arena and refer to
//! them by index; never by an owning handle... sidesteps cycles") and on
//! `src/db/models.rs`'s flat struct modeling for how a field list maps onto
//! concrete types.

mod graph;
mod types;
mod xpath;

pub use graph::{SchemaGraph, TypeId};
pub use types::{AtomicType, ElementId, FieldSpec, FieldValue, Occurs, TypeRef, XsdAttribute, XsdComplexType, XsdElement};
pub use xpath::{resolve_element_chain, resolve_xpath, XPathMatch};
