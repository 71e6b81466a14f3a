//! Recursive descent parser for conditions expressions.
//!
//! ```text
//! expr    := and (OR and)*
//! and     := unary (AND unary)*
//! unary   := NOT unary | primary
//! primary := '(' expr ')' | operand (op operand)?
//! operand := path | literal | {param} | '[' operand (',' operand)* ']'
//! ```

use std::ops::Range;

use super::ast::{CompareOp, Expr, Literal, Operand};
use super::error::ConditionsError;
use super::lexer::{tokenize, SpannedToken, Token};

/// Deepest nesting of `!`, parentheses and list literals accepted.
pub const MAX_DEPTH: usize = 64;

pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    len: usize,
    depth: usize,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, ConditionsError> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
            len: source.len(),
            depth: 0,
        })
    }

    /// Parse the whole input as one expression.
    pub fn parse_expression(&mut self) -> Result<Expr, ConditionsError> {
        if self.tokens.is_empty() {
            return Err(ConditionsError::new("empty conditions", 0..self.len));
        }

        let expr = self.parse_or()?;
        match self.tokens.get(self.pos) {
            None => Ok(expr),
            Some(tok) => Err(ConditionsError::new(
                format!("unexpected {:?} after expression", tok.token),
                tok.span.clone(),
            )),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionsError> {
        let mut left = self.parse_and()?;

        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = match left {
                Expr::Or(mut terms) => {
                    terms.push(right);
                    Expr::Or(terms)
                }
                _ => Expr::Or(vec![left, right]),
            };
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionsError> {
        let mut left = self.parse_unary()?;

        while self.eat(&Token::And) {
            let right = self.parse_unary()?;
            left = match left {
                Expr::And(mut terms) => {
                    terms.push(right);
                    Expr::And(terms)
                }
                _ => Expr::And(vec![left, right]),
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ConditionsError> {
        if self.eat(&Token::Not) {
            self.descend()?;
            let inner = self.parse_unary();
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ConditionsError> {
        if self.eat(&Token::LParen) {
            self.descend()?;
            let expr = self.parse_or();
            self.depth -= 1;
            let expr = expr?;
            self.expect(&Token::RParen)?;
            return Ok(expr);
        }

        let left = self.parse_operand()?;
        let op = match self.peek() {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::Ne) => CompareOp::Ne,
            Some(Token::Lt) => CompareOp::Lt,
            Some(Token::Le) => CompareOp::Le,
            Some(Token::Gt) => CompareOp::Gt,
            Some(Token::Ge) => CompareOp::Ge,
            Some(Token::BeginsWith) => CompareOp::BeginsWith,
            Some(Token::EndsWith) => CompareOp::EndsWith,
            Some(Token::Contains) => CompareOp::Contains,
            Some(Token::Any) => CompareOp::Any,
            _ => return Ok(Expr::Truthy(left)),
        };
        self.pos += 1;

        let right = self.parse_operand()?;
        Ok(Expr::Compare { left, op, right })
    }

    fn parse_operand(&mut self) -> Result<Operand, ConditionsError> {
        let tok = self.next()?;
        let operand = match tok.token {
            Token::Ident(path) => Operand::Property(path.split('.').map(str::to_string).collect()),
            Token::Param(name) => Operand::Parameter(name),
            Token::String(s) => Operand::Literal(Literal::String(s)),
            Token::Int(n) => Operand::Literal(Literal::Int(n)),
            Token::Float(f) => Operand::Literal(Literal::Float(f)),
            Token::True => Operand::Literal(Literal::Bool(true)),
            Token::False => Operand::Literal(Literal::Bool(false)),
            Token::Null => Operand::Literal(Literal::Null),
            Token::LBracket => {
                self.descend()?;
                let items = self.parse_list();
                self.depth -= 1;
                Operand::List(items?)
            }
            other => {
                return Err(ConditionsError::new(
                    format!("expected a value, found {:?}", other),
                    tok.span,
                ))
            }
        };
        Ok(operand)
    }

    /// Items of a list literal; the opening bracket is already consumed.
    fn parse_list(&mut self) -> Result<Vec<Operand>, ConditionsError> {
        let mut items = Vec::new();
        if self.eat(&Token::RBracket) {
            return Ok(items);
        }

        loop {
            items.push(self.parse_operand()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(&Token::RBracket)?;
            return Ok(items);
        }
    }

    /// Enter one nesting level; the caller leaves it by decrementing `depth`.
    fn descend(&mut self) -> Result<(), ConditionsError> {
        if self.depth >= MAX_DEPTH {
            let start = self.tokens.get(self.pos.saturating_sub(1)).map_or(0, |t| t.span.start);
            return Err(ConditionsError::new(
                format!("conditions nested deeper than {}", MAX_DEPTH),
                start..self.len,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ConditionsError> {
        let tok = self.next()?;
        if &tok.token == expected {
            Ok(())
        } else {
            Err(ConditionsError::new(
                format!("expected {:?}, found {:?}", expected, tok.token),
                tok.span,
            ))
        }
    }

    fn next(&mut self) -> Result<SpannedToken, ConditionsError> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| ConditionsError::new("unexpected end of input", self.end()))?;
        self.pos += 1;
        Ok(tok)
    }

    fn end(&self) -> Range<usize> {
        self.len..self.len
    }
}

/// Parse a conditions string.
pub fn parse(source: &str) -> Result<Expr, ConditionsError> {
    Parser::new(source)?.parse_expression()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn prop(name: &str) -> Operand {
        Operand::Property(name.split('.').map(str::to_string).collect())
    }

    fn cmp(left: Operand, op: CompareOp, right: Operand) -> Expr {
        Expr::Compare { left, op, right }
    }

    #[test]
    fn test_parse_comparison() {
        assert_eq!(
            parse("status = 'open'").unwrap(),
            cmp(prop("status"), CompareOp::Eq, Operand::Literal(Literal::String("open".into())))
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        assert_eq!(
            parse("a = 1 OR b = 2 AND c = 3").unwrap(),
            Expr::Or(vec![
                cmp(prop("a"), CompareOp::Eq, Operand::Literal(Literal::Int(1))),
                Expr::And(vec![
                    cmp(prop("b"), CompareOp::Eq, Operand::Literal(Literal::Int(2))),
                    cmp(prop("c"), CompareOp::Eq, Operand::Literal(Literal::Int(3))),
                ]),
            ])
        );
    }

    #[test]
    fn test_parentheses_and_not() {
        assert_eq!(
            parse("!(done = true || archived)").unwrap(),
            Expr::Not(Box::new(Expr::Or(vec![
                cmp(prop("done"), CompareOp::Eq, Operand::Literal(Literal::Bool(true))),
                Expr::Truthy(prop("archived")),
            ])))
        );
    }

    #[test]
    fn test_params_lists_and_paths() {
        assert_eq!(
            parse("owner.name = {user} AND tag ANY ['a', {extra}]").unwrap(),
            Expr::And(vec![
                cmp(prop("owner.name"), CompareOp::Eq, Operand::Parameter("user".into())),
                cmp(
                    prop("tag"),
                    CompareOp::Any,
                    Operand::List(vec![
                        Operand::Literal(Literal::String("a".into())),
                        Operand::Parameter("extra".into()),
                    ])
                ),
            ])
        );
    }

    #[test]
    fn test_errors() {
        assert!(parse("").is_err());
        assert!(parse("a =").is_err());
        assert!(parse("(a = 1").is_err());
        assert!(parse("a = 1 b").is_err());
        assert!(parse("[1, 2").is_err());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let nots = format!("{}x", "!".repeat(100_000));
        let parens = format!("{}x{}", "(".repeat(100_000), ")".repeat(100_000));
        let lists = format!("x ANY {}1{}", "[".repeat(100_000), "]".repeat(100_000));

        for source in [nots, parens, lists] {
            let err = parse(&source).unwrap_err();
            assert!(err.message.contains("nested deeper"), "{}", err.message);
        }
    }

    #[test]
    fn test_nesting_up_to_limit_parses() {
        let source = format!("{}x{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert_eq!(parse(&source).unwrap(), Expr::Truthy(prop("x")));

        let source = format!("{}x", "!".repeat(MAX_DEPTH + 1));
        assert!(parse(&source).is_err());
    }
}
