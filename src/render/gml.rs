//! GML 3.2 `wfs:FeatureCollection` rendering (SPEC_FULL.md §4.7).

use chrono::{DateTime, Utc};

use crate::collection::{FetchedPage, SimpleFeatureCollection};
use crate::datastore::Row;
use crate::xsd::{FieldValue, SchemaGraph};

use super::{geometry_to_gml, xml_escape};

pub const CONTENT_TYPE: &str = "application/gml+xml; version=3.2";

fn format_scalar(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Null => None,
        FieldValue::String(s) => Some(xml_escape(s)),
        FieldValue::Integer(i) => Some(i.to_string()),
        FieldValue::Double(d) => Some(d.to_string()),
        FieldValue::Boolean(b) => Some(b.to_string()),
        FieldValue::DateTime(dt) => Some(dt.to_rfc3339()),
        FieldValue::Geometry(_) | FieldValue::Array(_) => None,
    }
}

fn render_feature(graph: &SchemaGraph, sfc: &SimpleFeatureCollection, row: &Row) -> String {
    let FieldValue::String(id) = row.get("id") else {
        return String::new();
    };
    let gml_id = format!("{}.{id}", sfc.feature.local_name);
    let mut out = format!("<app:{} gml:id=\"{}\">", sfc.feature.local_name, xml_escape(&gml_id));

    for (element, value) in crate::projection::project_row(graph, &sfc.plan, row) {
        if element.is_geometry() {
            if let FieldValue::Geometry(g) = value {
                out.push_str(&format!("<app:{}>{}</app:{}>", element.local_name, geometry_to_gml(&g, &sfc.plan.output_crs), element.local_name));
            }
            continue;
        }
        if let Some(text) = format_scalar(&value) {
            out.push_str(&format!("<app:{}>{}</app:{}>", element.local_name, text, element.local_name));
        }
    }

    out.push_str(&format!("</app:{}>", sfc.feature.local_name));
    out
}

/// Render a full `wfs:FeatureCollection` document for one or more
/// `SimpleFeatureCollection`s, each paired with its already-fetched page.
pub fn render_feature_collection(
    graph: &SchemaGraph,
    collections: &[(SimpleFeatureCollection, FetchedPage)],
    number_matched: Option<u64>,
    timestamp: DateTime<Utc>,
) -> String {
    let number_returned: usize = collections.iter().map(|(_, page)| page.rows.len()).sum();
    let number_matched_attr = number_matched.map(|n| n.to_string()).unwrap_or_else(|| "unknown".to_string());

    let namespaces = collections
        .first()
        .map(|(sfc, _)| format!(" xmlns:app=\"{}\"", xml_escape(&sfc.feature.namespace)))
        .unwrap_or_default();

    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<wfs:FeatureCollection xmlns:wfs=\"http://www.opengis.net/wfs/2.0\" xmlns:gml=\"http://www.opengis.net/gml/3.2\"{namespaces} numberMatched=\"{number_matched_attr}\" numberReturned=\"{number_returned}\" timeStamp=\"{}\">\n",
        timestamp.to_rfc3339(),
    ));

    for (sfc, page) in collections {
        for row in &page.rows {
            out.push_str("<wfs:member>");
            out.push_str(&render_feature(graph, sfc, row));
            out.push_str("</wfs:member>\n");
        }
    }

    out.push_str("</wfs:FeatureCollection>");
    out
}

/// `wfs:truncatedResponse` marker emitted when an error interrupts
/// streaming after the header has already been written (SPEC_FULL.md §7).
pub fn truncated_response_marker(reason: &str) -> String {
    format!("<wfs:truncatedResponse>{}</wfs:truncatedResponse></wfs:FeatureCollection>", xml_escape(reason))
}

/// Render a `wfs:ValueCollection` for `GetPropertyValue`: one bare value per
/// matching row rather than a full feature element, reusing the same
/// scalar/geometry formatting as `render_feature_collection`.
pub fn render_value_collection(
    graph: &SchemaGraph,
    collections: &[(SimpleFeatureCollection, FetchedPage)],
    number_matched: Option<u64>,
    timestamp: DateTime<Utc>,
) -> String {
    let number_returned: usize = collections.iter().map(|(_, page)| page.rows.len()).sum();
    let number_matched_attr = number_matched.map(|n| n.to_string()).unwrap_or_else(|| "unknown".to_string());

    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<wfs:ValueCollection xmlns:wfs=\"http://www.opengis.net/wfs/2.0\" xmlns:gml=\"http://www.opengis.net/gml/3.2\" numberMatched=\"{number_matched_attr}\" numberReturned=\"{number_returned}\" timeStamp=\"{}\">\n",
        timestamp.to_rfc3339(),
    ));

    for (sfc, page) in collections {
        for row in &page.rows {
            for (element, value) in crate::projection::project_row(graph, &sfc.plan, row) {
                out.push_str("<wfs:member>");
                if element.is_geometry() {
                    if let FieldValue::Geometry(g) = value {
                        out.push_str(&geometry_to_gml(&g, &sfc.plan.output_crs));
                    }
                } else if let Some(text) = format_scalar(&value) {
                    out.push_str(&text);
                }
                out.push_str("</wfs:member>\n");
            }
        }
    }

    out.push_str("</wfs:ValueCollection>");
    out
}
