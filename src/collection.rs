//! Collection iteration (SPEC_FULL.md §4.6): pagination, count policy, and
//! chunked cursor iteration with per-chunk relation prefetch.
//!
//! Grounded on `src/services/feature_service.rs`'s `list_features`/
//! `list_vector_features` count-then-page query pattern and its
//! `get_assets_for_items` batched `IN (...)` prefetch, generalized from one
//! ORM call chain to the `Datastore` seam.

use std::collections::HashMap;

use crate::config::{Config, CountPolicy};
use crate::datastore::{Datastore, DatastoreError, Row};
use crate::projection::ProjectionPlan;
use crate::query::CompiledQuery;
use crate::registry::FeatureTypeInfo;
use crate::xsd::FieldValue;

/// Rows fetched per chunk, tuned to the renderer: small enough to flush
/// output incrementally, large enough to keep prefetch batching effective.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

#[derive(Debug, Clone, Copy)]
pub struct PageParams {
    pub start_index: u32,
    pub count: u32,
}

/// Resolve `start_index`/`count` against the configured default and the
/// format's page-size cap (`None` meaning uncapped, per SPEC_FULL.md §4.6's
/// "∞ allowed for GeoJSON/CSV").
pub fn resolve_page_params(config: &Config, format: &str, start_index: u32, requested_count: Option<u32>) -> PageParams {
    let mut count = requested_count.unwrap_or(config.default_page_size);
    if let Some(max) = config.max_page_size(format) {
        count = count.min(max);
    }
    PageParams { start_index, count }
}

/// The result of fetching one page: the matching rows plus any prefetched
/// unbounded relations, keyed by relation path then parent feature id.
#[derive(Debug, Default)]
pub struct FetchedPage {
    pub rows: Vec<Row>,
    pub prefetched: HashMap<String, HashMap<String, Vec<Row>>>,
}

/// One feature type's worth of a `GetFeature`/`GetPropertyValue` response: a
/// compiled query, its projection plan, and the resolved page window.
pub struct SimpleFeatureCollection {
    pub feature: FeatureTypeInfo,
    pub compiled: CompiledQuery,
    pub plan: ProjectionPlan,
    pub page: PageParams,
}

impl SimpleFeatureCollection {
    /// `numberMatched`: the full cardinality of the filter, or `None` when
    /// the count policy says not to compute it for this page.
    pub async fn number_matched(&self, datastore: &dyn Datastore, policy: CountPolicy) -> Result<Option<u64>, DatastoreError> {
        let should_count = match policy {
            CountPolicy::Never => false,
            CountPolicy::Always => true,
            CountPolicy::FirstPageOnly => self.page.start_index == 0,
        };
        if !should_count {
            return Ok(None);
        }
        Ok(Some(datastore.count(&self.feature.local_name, &self.compiled.predicate).await?))
    }

    /// Iterate matching rows chunk by chunk up to `page.count`, then
    /// prefetch every unbounded relation the projection plan names for the
    /// fetched rows in one batch per relation.
    pub async fn fetch_page(&self, datastore: &dyn Datastore, chunk_size: usize) -> Result<FetchedPage, DatastoreError> {
        let mut cursor = datastore
            .open_cursor(&self.feature.local_name, &self.compiled.predicate, &self.compiled.orderings, self.page.start_index)
            .await?;

        let mut rows = Vec::new();
        while (rows.len() as u32) < self.page.count {
            let remaining = self.page.count as usize - rows.len();
            let take = remaining.min(chunk_size);
            let chunk = cursor.next_chunk(take).await?;
            let fetched = chunk.len();
            rows.extend(chunk);
            if fetched < take {
                break;
            }
        }

        let prefetched = self.prefetch_relations(datastore, &rows).await?;
        Ok(FetchedPage { rows, prefetched })
    }

    async fn prefetch_relations(
        &self,
        datastore: &dyn Datastore,
        rows: &[Row],
    ) -> Result<HashMap<String, HashMap<String, Vec<Row>>>, DatastoreError> {
        let mut out = HashMap::new();
        if self.plan.prefetch.is_empty() || rows.is_empty() {
            return Ok(out);
        }
        let parent_ids: Vec<String> = rows
            .iter()
            .filter_map(|r| match r.get("id") {
                FieldValue::String(s) => Some(s),
                _ => None,
            })
            .collect();
        for target in &self.plan.prefetch {
            let batch = datastore.prefetch(&self.feature.local_name, &target.relation_path, &parent_ids).await?;
            out.insert(target.relation_path.clone(), batch);
        }
        Ok(out)
    }
}

/// A full `GetFeature` response: one `SimpleFeatureCollection` per
/// requested feature type, rendered together as one `wfs:FeatureCollection`.
pub struct FeatureCollection {
    pub members: Vec<SimpleFeatureCollection>,
}

impl FeatureCollection {
    pub fn new(members: Vec<SimpleFeatureCollection>) -> Self {
        FeatureCollection { members }
    }
}
