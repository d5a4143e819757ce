use std::cmp::Ordering;
use std::collections::BTreeMap;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::index::inverted::InvertedIndex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FacetKind {
    /// One bucket per distinct lower-cased value
    Terms,
    /// Range expressions such as `[20000 TO 40000}`, tested in order
    Ranges(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetDefinition {
    /// Result key; defaults to the field name
    pub name: Option<String>,
    pub field: String,
    pub kind: FacetKind,
}

impl FacetDefinition {
    pub fn terms(field: impl Into<String>) -> Self {
        FacetDefinition {
            name: None,
            field: field.into(),
            kind: FacetKind::Terms,
        }
    }

    pub fn ranges<S: Into<String>>(field: impl Into<String>, ranges: impl IntoIterator<Item = S>) -> Self {
        FacetDefinition {
            name: None,
            field: field.into(),
            kind: FacetKind::Ranges(ranges.into_iter().map(Into::into).collect()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.field)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Bound {
    value: String,
    inclusive: bool,
}

/// One parsed range predicate
#[derive(Debug, Clone, PartialEq)]
pub struct FacetRange {
    pub label: String,
    low: Option<Bound>,
    high: Option<Bound>,
}

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidFacet, message)
}

// A numeric bound only admits numeric values; NaN never compares. A text
// bound compares in text order.
fn compare(value: &str, bound: &str) -> Option<Ordering> {
    match bound.parse::<f64>() {
        Ok(bound) => value.parse::<f64>().ok()?.partial_cmp(&bound),
        Err(_) => Some(value.cmp(bound)),
    }
}

impl FacetRange {
    /// `[low TO high]` inclusive, `{low TO high}` exclusive, brackets may be
    /// mixed, `NULL` or `*` leaves an end open
    pub fn parse(text: &str) -> Result<Self> {
        let label = text.trim().to_string();
        let mut chars = label.chars();

        let low_inclusive = match chars.next() {
            Some('[') => true,
            Some('{') => false,
            _ => return Err(invalid(format!("range '{}' must start with '[' or '{{'", label))),
        };
        let high_inclusive = match chars.next_back() {
            Some(']') => true,
            Some('}') => false,
            _ => return Err(invalid(format!("range '{}' must end with ']' or '}}'", label))),
        };

        let inner: Vec<&str> = chars.as_str().split_whitespace().collect();
        let [low, to, high] = inner.as_slice() else {
            return Err(invalid(format!("range '{}' is not of the form 'low TO high'", label)));
        };
        if *to != "TO" {
            return Err(invalid(format!("range '{}' is missing 'TO'", label)));
        }

        let bound = |value: &str, inclusive: bool| match value {
            "NULL" | "*" => None,
            _ => Some(Bound {
                value: value.to_string(),
                inclusive,
            }),
        };

        Ok(FacetRange {
            low: bound(*low, low_inclusive),
            high: bound(*high, high_inclusive),
            label,
        })
    }

    pub fn contains(&self, value: &str) -> bool {
        let above_low = match &self.low {
            None => true,
            Some(low) => match compare(value, &low.value) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => low.inclusive,
                Some(Ordering::Less) | None => false,
            },
        };
        let below_high = match &self.high {
            None => true,
            Some(high) => match compare(value, &high.value) {
                Some(Ordering::Less) => true,
                Some(Ordering::Equal) => high.inclusive,
                Some(Ordering::Greater) | None => false,
            },
        };
        above_low && below_high
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetValue {
    /// Range label or lower-cased term
    pub range: String,
    pub hits: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetResult {
    pub values: Vec<FacetValue>,
}

impl FacetResult {
    pub fn hits(&self, range: &str) -> Option<u64> {
        self.values.iter().find(|v| v.range == range).map(|v| v.hits)
    }
}

/// Per-facet outcome: a result or the reason that facet could not compute
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetResults {
    pub results: BTreeMap<String, FacetResult>,
    pub errors: BTreeMap<String, String>,
}

impl FacetResults {
    pub fn get(&self, name: &str) -> Option<&FacetResult> {
        self.results.get(name)
    }
}

/// Counts facet buckets over a set of internal doc ids
pub struct FacetAggregator<'a> {
    index: &'a InvertedIndex,
}

impl<'a> FacetAggregator<'a> {
    pub fn new(index: &'a InvertedIndex) -> Self {
        FacetAggregator { index }
    }

    pub fn aggregate(&self, docs: &RoaringBitmap, definitions: &[FacetDefinition]) -> FacetResults {
        let mut out = FacetResults::default();

        for definition in definitions {
            let name = definition.display_name().to_string();
            if out.results.contains_key(&name) || out.errors.contains_key(&name) {
                out.errors.insert(name, "duplicate facet name".to_string());
                continue;
            }

            match self.compute(docs, definition) {
                Ok(result) => {
                    out.results.insert(name, result);
                }
                Err(e) => {
                    out.errors.insert(name, e.context);
                }
            }
        }

        out
    }

    fn compute(&self, docs: &RoaringBitmap, definition: &FacetDefinition) -> Result<FacetResult> {
        if definition.field.trim().is_empty() {
            return Err(invalid("facet field name is empty"));
        }

        match &definition.kind {
            FacetKind::Terms => Ok(self.term_buckets(docs, &definition.field)),
            FacetKind::Ranges(texts) => {
                let ranges = texts
                    .iter()
                    .map(|text| FacetRange::parse(text))
                    .collect::<Result<Vec<_>>>()?;
                Ok(self.range_buckets(docs, &definition.field, &ranges))
            }
        }
    }

    fn range_buckets(&self, docs: &RoaringBitmap, field: &str, ranges: &[FacetRange]) -> FacetResult {
        // Each document is counted by the first range it matches
        let mut unassigned = docs.clone();
        let mut values = Vec::with_capacity(ranges.len());

        for range in ranges {
            let mut matched = RoaringBitmap::new();
            if !unassigned.is_empty() {
                for (term, postings) in self.index.field_terms(field) {
                    if range.contains(&term.text) {
                        matched |= postings.to_bitmap();
                    }
                }
                matched &= &unassigned;
                unassigned -= &matched;
            }

            values.push(FacetValue {
                range: range.label.clone(),
                hits: matched.len(),
            });
        }

        FacetResult { values }
    }

    fn term_buckets(&self, docs: &RoaringBitmap, field: &str) -> FacetResult {
        let mut buckets: BTreeMap<String, RoaringBitmap> = BTreeMap::new();

        for (term, postings) in self.index.field_terms(field) {
            let hits = postings.to_bitmap() & docs;
            if hits.is_empty() {
                continue;
            }
            *buckets.entry(term.text.to_lowercase()).or_default() |= hits;
        }

        FacetResult {
            values: buckets
                .into_iter()
                .map(|(range, docs)| FacetValue { range, hits: docs.len() })
                .collect(),
        }
    }
}
