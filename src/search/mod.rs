pub mod facet;
pub mod facet_setup;
pub mod searcher;

pub use facet::{FacetDefinition, FacetKind, FacetResult, FacetResults, FacetValue};
pub use facet_setup::{FacetSetup, FacetSetupStore, FacetSource};
pub use searcher::Searcher;
