use roaring::RoaringBitmap;
use crate::core::error::Result;
use crate::core::types::DocId;
use crate::index::inverted::InvertedIndex;
use crate::mvcc::controller::ReaderLease;
use crate::query::ast::Query;
use crate::query::planner::QueryPlanner;
use crate::search::facet::{FacetAggregator, FacetDefinition, FacetResults};

/// Executes queries against one pinned generation
///
/// Every call on the same searcher sees the same data, whatever the writer
/// does meanwhile.
pub struct Searcher {
    lease: ReaderLease,
}

impl Searcher {
    pub fn new(lease: ReaderLease) -> Self {
        Searcher { lease }
    }

    pub fn generation(&self) -> u64 {
        self.lease.generation()
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.lease.index
    }

    /// Live internal ids matching `query`
    pub fn doc_ids(&self, query: &Query) -> Result<RoaringBitmap> {
        let index = self.index();
        let plan = QueryPlanner::new(index).plan(query)?;

        Ok(plan
            .execute(index)
            .iter()
            .filter(|id| index.is_live(DocId(*id)))
            .collect())
    }

    /// External ids of matching documents in internal id order, at most
    /// `max_results`
    pub fn search(&self, query: &Query, max_results: usize) -> Result<Vec<String>> {
        let index = self.index();
        let ids = self.doc_ids(query)?;

        Ok(ids
            .iter()
            .filter_map(|id| index.external_id(DocId(id)))
            .take(max_results)
            .map(String::from)
            .collect())
    }

    pub fn count(&self, query: &Query) -> Result<u64> {
        Ok(self.doc_ids(query)?.len())
    }

    /// Facet counts over the documents matching `query`
    pub fn aggregate(&self, query: &Query, facets: &[FacetDefinition]) -> Result<FacetResults> {
        let docs = self.doc_ids(query)?;
        Ok(FacetAggregator::new(self.index()).aggregate(&docs, facets))
    }
}
