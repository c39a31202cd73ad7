//! The datastore abstraction seam (DESIGN NOTES §9): the only interface the
//! query compiler and collection iterator are allowed to depend on. A
//! concrete deployment swaps `InMemoryDatastore` for a PostGIS-backed
//! implementation of the same trait without touching either.
//!
//! Grounded negatively on `src/services/feature_service.rs`, cited in
//! DESIGN NOTES §9 as the example of what *not* to do (tight coupling to one
//! ORM); grounded positively on that same file's row/struct modeling for
//! the reference implementation's `Row` shape, and on `src/db/models.rs`'s
//! flat `FromRow` style.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

use crate::geom::BoundingBox;
use crate::xsd::FieldValue;

#[derive(Debug, Error)]
pub enum DatastoreError {
    #[error("unknown feature type: {0}")]
    UnknownFeatureType(String),
    #[error("query execution failed: {0}")]
    ExecutionFailed(String),
}

/// One row of a feature type's backing table, keyed by absolute
/// data-source path (see `src/xsd`).
#[derive(Debug, Clone, Default)]
pub struct Row {
    pub values: HashMap<String, FieldValue>,
}

impl Row {
    pub fn get(&self, path: &str) -> FieldValue {
        self.values.get(path).cloned().unwrap_or(FieldValue::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
}

/// A backend-agnostic predicate, the output of `query::compiler`.
#[derive(Debug, Clone)]
pub enum Predicate {
    Compare { path: String, op: CompareOp, value: FieldValue },
    Between { path: String, lower: FieldValue, upper: FieldValue },
    Like { path: String, pattern: String, wild_card: char, single_char: char, escape_char: char, match_case: bool },
    IsNull { path: String },
    BboxIntersects { path: String, bbox: BoundingBox },
    IdIn(Vec<String>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    True,
    False,
}

#[derive(Debug, Clone)]
pub struct Ordering {
    pub path: String,
    pub ascending: bool,
}

/// A paginated cursor over a single feature type's matching rows.
#[async_trait]
pub trait Cursor: Send {
    async fn next_chunk(&mut self, size: usize) -> Result<Vec<Row>, DatastoreError>;
}

#[async_trait]
pub trait Datastore: Send + Sync {
    async fn open_cursor(
        &self,
        feature_type: &str,
        predicate: &Predicate,
        orderings: &[Ordering],
        start_index: u32,
    ) -> Result<Box<dyn Cursor>, DatastoreError>;

    async fn count(&self, feature_type: &str, predicate: &Predicate) -> Result<u64, DatastoreError>;

    /// Batched `IN (...)`-style prefetch for an unbounded relation, keyed by
    /// the parent identity values. Mirrors
    /// `src/services/feature_service.rs`'s `get_assets_for_items` to avoid
    /// N+1 queries.
    async fn prefetch(
        &self,
        feature_type: &str,
        relation_path: &str,
        parent_ids: &[String],
    ) -> Result<HashMap<String, Vec<Row>>, DatastoreError>;
}

fn field_value_cmp(a: &FieldValue, b: &FieldValue) -> Option<std::cmp::Ordering> {
    use FieldValue::*;
    match (a, b) {
        (Integer(x), Integer(y)) => x.partial_cmp(y),
        (Double(x), Double(y)) => x.partial_cmp(y),
        (Integer(x), Double(y)) => (*x as f64).partial_cmp(y),
        (Double(x), Integer(y)) => x.partial_cmp(&(*y as f64)),
        (String(x), String(y)) => x.partial_cmp(y),
        (DateTime(x), DateTime(y)) => x.partial_cmp(y),
        (Boolean(x), Boolean(y)) => x.partial_cmp(y),
        _ => None,
    }
}

enum LikeToken {
    Literal(char),
    Wildcard,
    AnyOne,
}

fn tokenize_like_pattern(pattern: &str, wild_card: char, single_char: char, escape_char: char) -> Vec<LikeToken> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == escape_char && i + 1 < chars.len() {
            tokens.push(LikeToken::Literal(chars[i + 1]));
            i += 2;
        } else if c == wild_card {
            tokens.push(LikeToken::Wildcard);
            i += 1;
        } else if c == single_char {
            tokens.push(LikeToken::AnyOne);
            i += 1;
        } else {
            tokens.push(LikeToken::Literal(c));
            i += 1;
        }
    }
    tokens
}

/// FES `PropertyIsLike` matching, via the standard O(n*m) wildcard DP rather
/// than backtracking recursion (which is exponential on patterns with
/// several wildcards against a long value).
fn like_matches(value: &str, pattern: &str, wild_card: char, single_char: char, escape_char: char, match_case: bool) -> bool {
    let (value, pattern) = if match_case {
        (value.to_string(), pattern.to_string())
    } else {
        (value.to_lowercase(), pattern.to_lowercase())
    };

    let v: Vec<char> = value.chars().collect();
    let tokens = tokenize_like_pattern(&pattern, wild_card, single_char, escape_char);

    let mut prev = vec![false; v.len() + 1];
    prev[0] = true;
    for j in 0..tokens.len() {
        prev = match tokens[j] {
            LikeToken::Wildcard => {
                let mut row = vec![false; v.len() + 1];
                row[0] = prev[0];
                for i in 1..=v.len() {
                    row[i] = row[i - 1] || prev[i];
                }
                row
            }
            LikeToken::AnyOne => {
                let mut row = vec![false; v.len() + 1];
                for i in 1..=v.len() {
                    row[i] = prev[i - 1];
                }
                row
            }
            LikeToken::Literal(c) => {
                let mut row = vec![false; v.len() + 1];
                for i in 1..=v.len() {
                    row[i] = prev[i - 1] && v[i - 1] == c;
                }
                row
            }
        };
    }
    prev[v.len()]
}

pub fn evaluate(predicate: &Predicate, row: &Row) -> bool {
    match predicate {
        Predicate::True => true,
        Predicate::False => false,
        Predicate::Compare { path, op, value } => {
            let field = row.get(path);
            if field.is_null() || value.is_null() {
                return false;
            }
            match field_value_cmp(&field, value) {
                Some(ord) => match op {
                    CompareOp::Eq => ord == std::cmp::Ordering::Equal,
                    CompareOp::NotEq => ord != std::cmp::Ordering::Equal,
                    CompareOp::Lt => ord == std::cmp::Ordering::Less,
                    CompareOp::Gt => ord == std::cmp::Ordering::Greater,
                    CompareOp::Le => ord != std::cmp::Ordering::Greater,
                    CompareOp::Ge => ord != std::cmp::Ordering::Less,
                },
                None => false,
            }
        }
        Predicate::Between { path, lower, upper } => {
            let field = row.get(path);
            if field.is_null() {
                return false;
            }
            let ge_lower = field_value_cmp(&field, lower).map(|o| o != std::cmp::Ordering::Less).unwrap_or(false);
            let le_upper = field_value_cmp(&field, upper).map(|o| o != std::cmp::Ordering::Greater).unwrap_or(false);
            ge_lower && le_upper
        }
        Predicate::Like { path, pattern, wild_card, single_char, escape_char, match_case } => {
            match row.get(path) {
                FieldValue::String(s) => {
                    like_matches(&s, pattern, *wild_card, *single_char, *escape_char, *match_case)
                }
                _ => false,
            }
        }
        Predicate::IsNull { path } => row.get(path).is_null(),
        Predicate::BboxIntersects { path, bbox } => match row.get(path) {
            FieldValue::Geometry(g) => g.bounding_box().intersects(bbox),
            _ => false,
        },
        Predicate::IdIn(ids) => match row.get("id") {
            FieldValue::String(s) => ids.iter().any(|id| id == &s || id.ends_with(&format!(".{s}"))),
            _ => false,
        },
        Predicate::And(ps) => ps.iter().all(|p| evaluate(p, row)),
        Predicate::Or(ps) => ps.iter().any(|p| evaluate(p, row)),
        Predicate::Not(p) => !evaluate(p, row),
    }
}

fn compare_rows(a: &Row, b: &Row, orderings: &[Ordering]) -> std::cmp::Ordering {
    for ordering in orderings {
        let av = a.get(&ordering.path);
        let bv = b.get(&ordering.path);
        // Nulls last, regardless of sort direction (SPEC_FULL.md / DESIGN.md
        // Open Question decision).
        let ord = match (av.is_null(), bv.is_null()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => field_value_cmp(&av, &bv).unwrap_or(std::cmp::Ordering::Equal),
        };
        let ord = if ordering.ascending { ord } else { ord.reverse() };
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }
    std::cmp::Ordering::Equal
}

/// In-memory reference implementation of `Datastore`, seeded at startup.
/// Intentionally a test/demo backend, not a production recommendation (see
/// DESIGN.md); a production deployment implements this trait against
/// PostGIS the way `src/services/feature_service.rs` used to, but behind
/// this seam instead of baked into the query/render layers.
pub struct InMemoryDatastore {
    tables: RwLock<HashMap<String, Vec<Row>>>,
}

impl InMemoryDatastore {
    pub fn new() -> Self {
        InMemoryDatastore { tables: RwLock::new(HashMap::new()) }
    }

    pub fn seed(&self, feature_type: &str, rows: Vec<Row>) {
        self.tables.write().expect("datastore mutex poisoned").insert(feature_type.to_string(), rows);
    }

    fn matching_sorted(&self, feature_type: &str, predicate: &Predicate, orderings: &[Ordering]) -> Result<Vec<Row>, DatastoreError> {
        let tables = self.tables.read().expect("datastore mutex poisoned");
        let table = tables.get(feature_type).ok_or_else(|| DatastoreError::UnknownFeatureType(feature_type.to_string()))?;
        let mut matching: Vec<Row> = table.iter().filter(|r| evaluate(predicate, r)).cloned().collect();
        if !orderings.is_empty() {
            matching.sort_by(|a, b| compare_rows(a, b, orderings));
        }
        Ok(matching)
    }
}

impl Default for InMemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

struct InMemoryCursor {
    rows: std::vec::IntoIter<Row>,
}

#[async_trait]
impl Cursor for InMemoryCursor {
    async fn next_chunk(&mut self, size: usize) -> Result<Vec<Row>, DatastoreError> {
        Ok((&mut self.rows).take(size).collect())
    }
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    async fn open_cursor(
        &self,
        feature_type: &str,
        predicate: &Predicate,
        orderings: &[Ordering],
        start_index: u32,
    ) -> Result<Box<dyn Cursor>, DatastoreError> {
        let mut matching = self.matching_sorted(feature_type, predicate, orderings)?;
        if orderings.is_empty() {
            // Stable tiebreaker on identity for pagination determinism
            // (DESIGN NOTES §5).
            matching.sort_by(|a, b| field_value_cmp(&a.get("id"), &b.get("id")).unwrap_or(std::cmp::Ordering::Equal));
        }
        let skipped: Vec<Row> = matching.into_iter().skip(start_index as usize).collect();
        Ok(Box::new(InMemoryCursor { rows: skipped.into_iter() }))
    }

    async fn count(&self, feature_type: &str, predicate: &Predicate) -> Result<u64, DatastoreError> {
        let tables = self.tables.read().expect("datastore mutex poisoned");
        let table = tables.get(feature_type).ok_or_else(|| DatastoreError::UnknownFeatureType(feature_type.to_string()))?;
        Ok(table.iter().filter(|r| evaluate(predicate, r)).count() as u64)
    }

    async fn prefetch(
        &self,
        feature_type: &str,
        relation_path: &str,
        parent_ids: &[String],
    ) -> Result<HashMap<String, Vec<Row>>, DatastoreError> {
        let tables = self.tables.read().expect("datastore mutex poisoned");
        let table = tables.get(feature_type).ok_or_else(|| DatastoreError::UnknownFeatureType(feature_type.to_string()))?;
        let mut out: HashMap<String, Vec<Row>> = HashMap::new();
        for row in table {
            if let FieldValue::String(parent_id) = row.get("parent_id") {
                if parent_ids.contains(&parent_id) {
                    out.entry(parent_id).or_default().push(row.clone());
                }
            }
        }
        let _ = relation_path;
        Ok(out)
    }
}
