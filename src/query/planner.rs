use roaring::RoaringBitmap;
use crate::core::error::Result;
use crate::index::inverted::InvertedIndex;
use crate::index::term::Term;
use crate::query::ast::{Operator, Query};

/// Physical plan with posting-length cost estimates
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Seek { term: Term, estimate: usize },
    Intersection { inputs: Vec<Plan>, estimate: usize },
    Union { inputs: Vec<Plan>, estimate: usize },
}

impl Plan {
    /// Upper bound on matching doc ids before tombstone filtering
    pub fn estimate(&self) -> usize {
        match self {
            Plan::Seek { estimate, .. }
            | Plan::Intersection { estimate, .. }
            | Plan::Union { estimate, .. } => *estimate,
        }
    }

    /// Evaluate to the set of internal doc ids, live or not
    pub fn execute(&self, index: &InvertedIndex) -> RoaringBitmap {
        match self {
            Plan::Seek { term, .. } => index
                .postings(term)
                .map(|list| list.to_bitmap())
                .unwrap_or_default(),
            Plan::Intersection { inputs, .. } => {
                let mut inputs = inputs.iter();
                let Some(first) = inputs.next() else {
                    return RoaringBitmap::new();
                };
                let mut result = first.execute(index);
                for input in inputs {
                    if result.is_empty() {
                        break;
                    }
                    result &= input.execute(index);
                }
                result
            }
            Plan::Union { inputs, .. } => {
                let mut result = RoaringBitmap::new();
                for input in inputs {
                    result |= input.execute(index);
                }
                result
            }
        }
    }
}

/// Plans queries against one segment's postings
pub struct QueryPlanner<'a> {
    index: &'a InvertedIndex,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(index: &'a InvertedIndex) -> Self {
        QueryPlanner { index }
    }

    pub fn plan(&self, query: &Query) -> Result<Plan> {
        query.validate()?;
        Ok(self.plan_node(query))
    }

    fn plan_node(&self, query: &Query) -> Plan {
        match query {
            Query::Term(term_query) => {
                let term = Term::new(term_query.field.clone(), term_query.value.clone());
                let estimate = self.index.postings(&term).map(|list| list.len()).unwrap_or(0);
                Plan::Seek { term, estimate }
            }
            Query::Boolean(boolean) => {
                let mut inputs: Vec<Plan> = boolean.clauses.iter().map(|q| self.plan_node(q)).collect();
                // Cheapest postings first
                inputs.sort_by_key(Plan::estimate);

                match boolean.operator {
                    Operator::And => {
                        let estimate = inputs.first().map(Plan::estimate).unwrap_or(0);
                        Plan::Intersection { inputs, estimate }
                    }
                    Operator::Or => {
                        let estimate = inputs.iter().map(Plan::estimate).sum();
                        Plan::Union { inputs, estimate }
                    }
                }
            }
        }
    }
}
