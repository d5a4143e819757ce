pub mod ast;
pub mod parser;
pub mod planner;

pub use ast::{BooleanQuery, Operator, Query, TermQuery};
pub use parser::parse;
