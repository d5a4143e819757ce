use std::fmt;
use serde::{Deserialize, Serialize};
use crate::analysis::Tokenize;
use crate::core::error::{Error, ErrorKind, Result};

/// Query tree: exact term matches composed with AND / OR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Query {
    Term(TermQuery),
    Boolean(BooleanQuery),
}

/// Matches documents holding exactly `value` as a term of `field`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermQuery {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    And, // intersection
    Or,  // union
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BooleanQuery {
    pub operator: Operator,
    pub clauses: Vec<Query>,
}

impl Query {
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Query::Term(TermQuery {
            field: field.into(),
            value: value.into(),
        })
    }

    pub fn and(clauses: Vec<Query>) -> Self {
        Query::Boolean(BooleanQuery { operator: Operator::And, clauses })
    }

    pub fn or(clauses: Vec<Query>) -> Self {
        Query::Boolean(BooleanQuery { operator: Operator::Or, clauses })
    }

    /// Run every term value through the analyzer used at index time. A value
    /// yielding several terms requires all of them; one yielding none is kept
    /// as written.
    pub fn analyze(&self, tokenize: &Tokenize) -> Result<Query> {
        match self {
            Query::Term(term) => {
                let mut tokens = tokenize(&term.field, &term.value)?;
                Ok(match tokens.len() {
                    0 => self.clone(),
                    1 => Query::term(&term.field, tokens.remove(0)),
                    _ => Query::and(
                        tokens
                            .into_iter()
                            .map(|token| Query::term(&term.field, token))
                            .collect(),
                    ),
                })
            }
            Query::Boolean(boolean) => Ok(Query::Boolean(BooleanQuery {
                operator: boolean.operator,
                clauses: boolean
                    .clauses
                    .iter()
                    .map(|clause| clause.analyze(tokenize))
                    .collect::<Result<_>>()?,
            })),
        }
    }

    /// Boolean nodes need at least two clauses, at every depth
    pub fn validate(&self) -> Result<()> {
        match self {
            Query::Term(_) => Ok(()),
            Query::Boolean(boolean) => {
                if boolean.clauses.len() < 2 {
                    return Err(Error::new(
                        ErrorKind::InvalidArgument,
                        format!(
                            "{:?} query needs at least two clauses, got {}",
                            boolean.operator,
                            boolean.clauses.len()
                        ),
                    ));
                }
                boolean.clauses.iter().try_for_each(Query::validate)
            }
        }
    }
}

impl BooleanQuery {
    pub fn new(operator: Operator) -> Self {
        BooleanQuery {
            operator,
            clauses: Vec::new(),
        }
    }

    pub fn with_clause(mut self, query: Query) -> Self {
        self.clauses.push(query);
        self
    }
}

impl From<BooleanQuery> for Query {
    fn from(query: BooleanQuery) -> Self {
        Query::Boolean(query)
    }
}

impl From<TermQuery> for Query {
    fn from(query: TermQuery) -> Self {
        Query::Term(query)
    }
}

fn needs_quotes(value: &str) -> bool {
    value.is_empty()
        || value == "AND"
        || value == "OR"
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | ':' | '"' | '\\'))
}

/// Renders the text syntax accepted by `query::parse`
impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Query::Term(term) => {
                if needs_quotes(&term.value) {
                    let escaped = term.value.replace('\\', "\\\\").replace('"', "\\\"");
                    write!(f, "{}:\"{}\"", term.field, escaped)
                } else {
                    write!(f, "{}:{}", term.field, term.value)
                }
            }
            Query::Boolean(boolean) => {
                let separator = match boolean.operator {
                    Operator::And => " AND ",
                    Operator::Or => " OR ",
                };
                write!(f, "(")?;
                for (i, clause) in boolean.clauses.iter().enumerate() {
                    if i > 0 {
                        f.write_str(separator)?;
                    }
                    write!(f, "{}", clause)?;
                }
                write!(f, ")")
            }
        }
    }
}
