//! Generic, namespace-aware XML tree built from a single pass of a
//! `quick_xml::Reader` pull parser.
//!
//! Grounded on the streaming event-loop / local-name dispatch idiom in
//! `examples/other_examples/68010546_AeronauticalMaps-libefb__aixm-src-parser.rs.rs`
//! (`Features::next` loops `reader.read_event_into`, matches `Event::Start`,
//! extracts a local name, and bounds a subtree). WFS request/filter bodies
//! are small single documents rather than a feature stream, so this layer
//! builds a full tree in one pass instead of yielding a lazy iterator; the
//! WFS/FES/GML dispatch tables built on top of it (in `fes.rs`/`gml.rs`)
//! keep the same local-name-dispatch shape as the grounding file.
//!
//! This module owns no WFS semantics: it only resolves `xmlns` scoping and
//! exposes children/attributes by local name.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::WfsError;

#[derive(Debug, Clone)]
pub struct XmlAttribute {
    pub namespace: Option<String>,
    pub local_name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct XmlElement {
    pub namespace: String,
    pub local_name: String,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    pub fn child(&self, local_name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.local_name == local_name)
    }

    pub fn children_named<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.local_name == local_name)
    }

    pub fn attr(&self, local_name: &str) -> Option<&str> {
        self.attributes.iter().find(|a| a.local_name == local_name).map(|a| a.value.as_str())
    }

    pub fn text_trimmed(&self) -> &str {
        self.text.trim()
    }
}

struct NsScope {
    prefixes: HashMap<String, String>,
    default_ns: Option<String>,
}

fn split_prefix(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((p, l)) => (Some(p), l),
        None => (None, qname),
    }
}

fn resolve_ns<'a>(stack: &'a [NsScope], prefix: Option<&str>) -> Option<&'a str> {
    match prefix {
        Some(p) => stack.iter().rev().find_map(|s| s.prefixes.get(p)).map(|s| s.as_str()),
        None => stack.iter().rev().find_map(|s| s.default_ns.as_deref()),
    }
}

fn scope_for(start: &BytesStart) -> NsScope {
    let mut prefixes = HashMap::new();
    let mut default_ns = None;
    for attr in start.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if key == "xmlns" {
            default_ns = Some(String::from_utf8_lossy(&attr.value).into_owned());
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            prefixes.insert(prefix.to_string(), String::from_utf8_lossy(&attr.value).into_owned());
        }
    }
    NsScope { prefixes, default_ns }
}

fn build_element(start: &BytesStart, ns_stack: &[NsScope]) -> XmlElement {
    let qname = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let (prefix, local) = split_prefix(&qname);
    let namespace = resolve_ns(ns_stack, prefix).unwrap_or("").to_string();

    let mut attributes = Vec::new();
    for attr in start.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let (aprefix, alocal) = split_prefix(&key);
        let anamespace = aprefix.and_then(|p| resolve_ns(ns_stack, Some(p))).map(|s| s.to_string());
        let value = String::from_utf8_lossy(&attr.value).into_owned();
        attributes.push(XmlAttribute { namespace: anamespace, local_name: alocal.to_string(), value });
    }

    XmlElement { namespace, local_name: local.to_string(), attributes, children: Vec::new(), text: String::new() }
}

/// Parse a complete XML document into a tree rooted at its document element.
pub fn parse_document(input: &str) -> Result<XmlElement, WfsError> {
    let mut reader = Reader::from_str(input);
    reader.trim_text(true);

    let mut ns_stack: Vec<NsScope> = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                ns_stack.push(scope_for(&e));
                stack.push(build_element(&e, &ns_stack));
            }
            Event::Empty(e) => {
                ns_stack.push(scope_for(&e));
                let element = build_element(&e, &ns_stack);
                ns_stack.pop();
                attach_or_root(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                ns_stack.pop();
                let element = stack.pop().ok_or_else(|| {
                    WfsError::parsing_failed("unbalanced XML closing tag")
                })?;
                attach_or_root(&mut stack, &mut root, element);
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&t.unescape().map_err(WfsError::Xml)?);
                }
            }
            Event::CData(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(t.as_ref()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    root.ok_or_else(|| WfsError::parsing_failed("document has no root element"))
}

fn attach_or_root(stack: &mut Vec<XmlElement>, root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_namespaces() {
        let doc = r#"<wfs:GetFeature xmlns:wfs="http://www.opengis.net/wfs/2.0" count="5">
            <wfs:Query typeNames="app:restaurant"/>
        </wfs:GetFeature>"#;
        let root = parse_document(doc).unwrap();
        assert_eq!(root.local_name, "GetFeature");
        assert_eq!(root.namespace, "http://www.opengis.net/wfs/2.0");
        assert_eq!(root.attr("count"), Some("5"));
        let query = root.child("Query").unwrap();
        assert_eq!(query.attr("typeNames"), Some("app:restaurant"));
    }

    #[test]
    fn resolves_nested_text() {
        let doc = r#"<fes:Literal xmlns:fes="http://www.opengis.net/fes/2.0">3.0</fes:Literal>"#;
        let root = parse_document(doc).unwrap();
        assert_eq!(root.text_trimmed(), "3.0");
    }

    #[test]
    fn empty_elements_attach_as_children() {
        let doc = r#"<a><b/><c/></a>"#;
        let root = parse_document(doc).unwrap();
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].local_name, "b");
    }

    #[test]
    fn default_namespace_scopes_descendants() {
        let doc = r#"<Filter xmlns="http://www.opengis.net/fes/2.0"><ValueReference>app:name</ValueReference></Filter>"#;
        let root = parse_document(doc).unwrap();
        assert_eq!(root.namespace, "http://www.opengis.net/fes/2.0");
        assert_eq!(root.child("ValueReference").unwrap().namespace, "http://www.opengis.net/fes/2.0");
    }

    #[test]
    fn unbalanced_document_errors() {
        let err = parse_document("<a><b></a>").unwrap_err();
        // quick-xml itself detects the tag mismatch
        assert_eq!(err.exception_code(), "OperationParsingFailed");
    }
}
