use crate::core::error::{Error, ErrorKind, Result};
use crate::query::ast::{Operator, Query};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
    Colon,
    LParen,
    RParen,
}

fn parse_error(position: usize, message: impl Into<String>) -> Error {
    Error::new(
        ErrorKind::Parse,
        format!("{} at position {}", message.into(), position),
    )
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push((pos, Token::LParen));
            }
            ')' => {
                chars.next();
                tokens.push((pos, Token::RParen));
            }
            ':' => {
                chars.next();
                tokens.push((pos, Token::Colon));
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        _ => value.push(c),
                    }
                }
                if !closed {
                    return Err(parse_error(pos, "unterminated quoted value"));
                }
                tokens.push((pos, Token::Quoted(value)));
            }
            _ => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | ':' | '"') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push((pos, Token::Word(word)));
            }
        }
    }

    Ok(tokens)
}

/// Recursive descent over `Field:value`, `AND`, `OR` and parentheses
///
/// ```text
/// expr    := and_expr ( "OR" and_expr )*
/// and_expr:= primary ( "AND" primary )*
/// primary := "(" expr ")" | field ":" ( word | "quoted" )
/// ```
struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|(p, _)| *p).unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w == keyword)
    }

    fn expr(&mut self) -> Result<Query> {
        let mut clauses = vec![self.and_expr()?];
        while self.at_keyword("OR") {
            self.next();
            clauses.push(self.and_expr()?);
        }
        Ok(combine(Operator::Or, clauses))
    }

    fn and_expr(&mut self) -> Result<Query> {
        let mut clauses = vec![self.primary()?];
        while self.at_keyword("AND") {
            self.next();
            clauses.push(self.primary()?);
        }
        Ok(combine(Operator::And, clauses))
    }

    fn primary(&mut self) -> Result<Query> {
        let position = self.position();
        match self.next() {
            Some(Token::LParen) => {
                let query = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(query),
                    _ => Err(parse_error(self.position(), "expected ')'")),
                }
            }
            Some(Token::Word(field)) if field != "AND" && field != "OR" => {
                if self.next() != Some(Token::Colon) {
                    return Err(parse_error(position, format!("expected ':' after field '{}'", field)));
                }
                let value_position = self.position();
                match self.next() {
                    Some(Token::Word(value)) | Some(Token::Quoted(value)) => Ok(Query::term(field, value)),
                    _ => Err(parse_error(value_position, format!("expected a value for field '{}'", field))),
                }
            }
            Some(token) => Err(parse_error(position, format!("unexpected {:?}", token))),
            None => Err(parse_error(position, "unexpected end of query")),
        }
    }
}

// Nested groups with the same operator collapse into one clause list
fn combine(operator: Operator, clauses: Vec<Query>) -> Query {
    if clauses.len() == 1 {
        return clauses.into_iter().next().unwrap_or_else(|| Query::or(Vec::new()));
    }

    let mut flat = Vec::with_capacity(clauses.len());
    for clause in clauses {
        match clause {
            Query::Boolean(inner) if inner.operator == operator => flat.extend(inner.clauses),
            other => flat.push(other),
        }
    }
    Query::Boolean(crate::query::ast::BooleanQuery { operator, clauses: flat })
}

/// Parse the text query syntax, e.g. `Name:arek OR (Age:30 AND City:"Tel Aviv")`
pub fn parse(input: &str) -> Result<Query> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(parse_error(0, "empty query"));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
    };
    let query = parser.expr()?;

    if parser.peek().is_some() {
        return Err(parse_error(parser.position(), "expected AND, OR or end of query"));
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_term() {
        assert_eq!(parse("Name:arek").unwrap(), Query::term("Name", "arek"));
        assert_eq!(parse(r#"Name:"Arek K""#).unwrap(), Query::term("Name", "Arek K"));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let query = parse("A:1 OR B:2 AND C:3").unwrap();
        assert_eq!(
            query,
            Query::or(vec![
                Query::term("A", "1"),
                Query::and(vec![Query::term("B", "2"), Query::term("C", "3")]),
            ])
        );
    }

    #[test]
    fn parentheses_and_flattening() {
        let query = parse("(A:1 OR B:2) OR C:3").unwrap();
        assert_eq!(
            query,
            Query::or(vec![Query::term("A", "1"), Query::term("B", "2"), Query::term("C", "3")])
        );

        let query = parse("(A:1 OR B:2) AND C:3").unwrap();
        assert_eq!(
            query,
            Query::and(vec![
                Query::or(vec![Query::term("A", "1"), Query::term("B", "2")]),
                Query::term("C", "3"),
            ])
        );
    }

    #[test]
    fn rejects_malformed_input() {
        for input in ["", "Name", "Name:", "A:1 B:2", "(A:1", "A:1 AND", r#"A:"open"#, "AND:1"] {
            let err = parse(input).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Parse, "input {:?}", input);
        }
    }

    #[test]
    fn display_output_parses_back() {
        let query = Query::and(vec![
            Query::term("Name", "Arek K"),
            Query::or(vec![Query::term("Id", "users/2"), Query::term("Quote", "say \"hi\"")]),
        ]);
        assert_eq!(parse(&query.to_string()).unwrap(), query);
    }
}
