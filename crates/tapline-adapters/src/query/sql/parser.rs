//! SQL Parser.

use super::ast::SqlQuery;
use super::lexer::{Lexer, Token, TokenKind};
use tapline_common::types::Value;
use tapline_common::utils::error::{Error, QueryError, QueryErrorKind, Result, SourceSpan};
use tapline_core::condition::{Condition, Operator};

/// SQL Parser.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    source: &'a str,
}

impl<'a> Parser<'a> {
    /// Creates a new parser for the given input.
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token();
        Self {
            lexer,
            current,
            source: input,
        }
    }

    /// Parses the input into a query.
    pub fn parse(&mut self) -> Result<SqlQuery> {
        let span_start = self.current.span.start;
        self.expect(TokenKind::Select)?;

        let projected_columns = if self.current.kind == TokenKind::Star {
            self.advance();
            Vec::new()
        } else {
            let mut columns = vec![self.parse_identifier("column name")?];
            while self.current.kind == TokenKind::Comma {
                self.advance();
                columns.push(self.parse_identifier("column name")?);
            }
            columns
        };

        self.expect(TokenKind::From)?;
        let service_name = self.parse_identifier("service name")?;

        let condition = if self.current.kind == TokenKind::Where {
            self.advance();
            Some(self.parse_or()?)
        } else {
            None
        };

        let limit = if self.current.kind == TokenKind::Limit {
            self.advance();
            if self.current.kind != TokenKind::Integer {
                return Err(self.error("Expected row count after LIMIT"));
            }
            let count = self
                .current
                .text
                .parse::<u64>()
                .map_err(|_| self.error("LIMIT must be a non-negative integer"))?;
            self.advance();
            Some(count)
        } else {
            None
        };

        let span_end = self.current.span.start;
        if self.current.kind == TokenKind::Semicolon {
            self.advance();
        }
        if self.current.kind != TokenKind::Eof {
            return Err(self.error(&format!("Unexpected '{}'", self.current.text)));
        }

        Ok(SqlQuery {
            service_name,
            projected_columns,
            condition,
            limit,
            span: Some(SourceSpan::new(span_start, span_end, 1, 1)),
        })
    }

    fn parse_or(&mut self) -> Result<Condition> {
        let mut children = vec![self.parse_and()?];
        while self.current.kind == TokenKind::Or {
            self.advance();
            children.push(self.parse_and()?);
        }
        Ok(if children.len() == 1 {
            children.pop().unwrap_or_else(|| Condition::and(Vec::new()))
        } else {
            Condition::or(children)
        })
    }

    fn parse_and(&mut self) -> Result<Condition> {
        let mut children = vec![self.parse_not()?];
        while self.current.kind == TokenKind::And {
            self.advance();
            children.push(self.parse_not()?);
        }
        Ok(if children.len() == 1 {
            children.pop().unwrap_or_else(|| Condition::and(Vec::new()))
        } else {
            Condition::and(children)
        })
    }

    fn parse_not(&mut self) -> Result<Condition> {
        if self.current.kind == TokenKind::Not {
            self.advance();
            return Ok(self.parse_not()?.negate());
        }
        if self.current.kind == TokenKind::LParen {
            self.advance();
            let inner = self.parse_or()?;
            self.expect(TokenKind::RParen)?;
            return Ok(inner);
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> Result<Condition> {
        let column = self.parse_identifier("column name")?;

        let negated = if self.current.kind == TokenKind::Not {
            self.advance();
            true
        } else {
            false
        };

        let condition = match self.current.kind {
            TokenKind::In => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let mut items = vec![self.parse_literal()?.to_string()];
                while self.current.kind == TokenKind::Comma {
                    self.advance();
                    items.push(self.parse_literal()?.to_string());
                }
                self.expect(TokenKind::RParen)?;
                Condition::in_list(column, items)
            }
            TokenKind::Like => {
                self.advance();
                if self.current.kind != TokenKind::String {
                    return Err(self.error("Expected pattern string after LIKE"));
                }
                let pattern = self.current.text.clone();
                self.advance();
                Condition::compare(column, Operator::Like, pattern)
            }
            _ if negated => return Err(self.error("Expected IN or LIKE after NOT")),
            kind => {
                let operator = match kind {
                    TokenKind::Eq => Operator::Eq,
                    TokenKind::Ne => Operator::Neq,
                    TokenKind::Lt => Operator::Lt,
                    TokenKind::Le => Operator::Lte,
                    TokenKind::Gt => Operator::Gt,
                    TokenKind::Ge => Operator::Gte,
                    _ => return Err(self.error("Expected comparison operator")),
                };
                self.advance();
                let value = self.parse_literal()?;
                Condition::compare(column, operator, value)
            }
        };

        Ok(if negated { condition.negate() } else { condition })
    }

    fn parse_literal(&mut self) -> Result<Value> {
        let value = match self.current.kind {
            TokenKind::String => Value::from(self.current.text.as_str()),
            TokenKind::Integer => self
                .current
                .text
                .parse::<i64>()
                .map(Value::Int64)
                .map_err(|_| self.error("Integer literal out of range"))?,
            TokenKind::Float => self
                .current
                .text
                .parse::<f64>()
                .map(Value::Float64)
                .map_err(|_| self.error("Invalid number"))?,
            TokenKind::True => Value::Bool(true),
            TokenKind::False => Value::Bool(false),
            _ => return Err(self.error("Expected literal value")),
        };
        self.advance();
        Ok(value)
    }

    fn parse_identifier(&mut self, what: &str) -> Result<String> {
        match self.current.kind {
            TokenKind::Identifier | TokenKind::QuotedIdentifier => {
                let name = self.current.text.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(&format!("Expected {what}"))),
        }
    }

    fn advance(&mut self) {
        self.current = self.lexer.next_token();
    }

    fn expect(&mut self, kind: TokenKind) -> Result<()> {
        if self.current.kind == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("Expected {:?}", kind)))
        }
    }

    fn error(&self, message: &str) -> Error {
        let message = if self.current.kind == TokenKind::Error {
            format!("{message}, found invalid input '{}'", self.current.text)
        } else {
            message.to_string()
        };
        Error::Query(
            QueryError::new(QueryErrorKind::Syntax, message)
                .with_span(self.current.span)
                .with_source(self.source.to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapline_core::condition::{Connector, Operand};

    fn parse(input: &str) -> SqlQuery {
        Parser::new(input).parse().unwrap()
    }

    #[test]
    fn test_parse_select_star() {
        let query = parse("SELECT * FROM people");
        assert_eq!(query.service_name, "people");
        assert!(query.selects_all());
        assert!(query.condition.is_none());
        assert!(query.limit.is_none());
    }

    #[test]
    fn test_parse_columns_and_limit() {
        let query = parse(r#"select name, "home city" from "my service" limit 10;"#);
        assert_eq!(query.service_name, "my service");
        assert_eq!(query.projected_columns, vec!["name", "home city"]);
        assert_eq!(query.limit, Some(10));
    }

    #[test]
    fn test_parse_where_precedence() {
        let query = parse("SELECT * FROM t WHERE a = 1 OR b = 'x' AND c > 2.5");
        let condition = query.condition.unwrap();
        let Condition::Compound(or) = &condition else {
            panic!("expected compound");
        };
        assert_eq!(or.connector, Connector::Or);
        assert_eq!(or.children.len(), 2);
        let Condition::Compound(and) = &or.children[1] else {
            panic!("expected nested AND");
        };
        assert_eq!(and.connector, Connector::And);
        assert_eq!(condition.to_string(), "(a = 1 OR (b = 'x' AND c > 2.5))");
    }

    #[test]
    fn test_parse_flat_conjunction() {
        let query = parse("SELECT * FROM t WHERE a = 1 AND b = 2 AND c = 3");
        let Condition::Compound(and) = query.condition.unwrap() else {
            panic!("expected compound");
        };
        assert_eq!(and.children.len(), 3);
    }

    #[test]
    fn test_parse_in_and_like() {
        let query = parse("SELECT * FROM t WHERE city NOT IN ('Oslo', 'a;b') AND name LIKE 'A%'");
        let Condition::Compound(and) = query.condition.unwrap() else {
            panic!("expected compound");
        };
        let Condition::Atom(city) = &and.children[0] else {
            panic!("expected atom");
        };
        assert_eq!(city.operator, Operator::In);
        assert!(city.negated);
        assert_eq!(city.operand, Operand::List("Oslo;a\\;b".to_string()));
        let Condition::Atom(name) = &and.children[1] else {
            panic!("expected atom");
        };
        assert_eq!(name.operator, Operator::Like);
    }

    #[test]
    fn test_parse_negated_group() {
        let query = parse("SELECT * FROM t WHERE NOT (a = 1 OR b = 2)");
        let condition = query.condition.unwrap();
        assert!(condition.is_negated());
        assert_eq!(condition.to_string(), "NOT (a = 1 OR b = 2)");
    }

    #[test]
    fn test_parse_errors() {
        let err = Parser::new("SELECT * people").parse().unwrap_err();
        match err {
            Error::Query(q) => {
                assert_eq!(q.kind, QueryErrorKind::Syntax);
                assert_eq!(q.span.unwrap().column, 10);
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(Parser::new("SELECT * FROM t WHERE a =").parse().is_err());
        assert!(Parser::new("SELECT * FROM t WHERE a NOT = 1").parse().is_err());
        assert!(Parser::new("SELECT * FROM t LIMIT -1").parse().is_err());
        assert!(Parser::new("SELECT * FROM t extra").parse().is_err());
        assert!(Parser::new("SELECT * FROM t WHERE a = 'open").parse().is_err());
    }
}
