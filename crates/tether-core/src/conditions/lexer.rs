//! Tokens of the conditions language.

use std::ops::Range;

use logos::Logos;

use super::error::ConditionsError;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // Comparison operators
    #[token("=")]
    #[token("==")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("BEGINS_WITH", ignore(ascii_case))]
    BeginsWith,
    #[token("ENDS_WITH", ignore(ascii_case))]
    EndsWith,
    #[token("CONTAINS", ignore(ascii_case))]
    Contains,
    #[token("ANY", ignore(ascii_case))]
    Any,

    // Logical operators
    #[token("&&")]
    #[token("AND", ignore(ascii_case))]
    And,
    #[token("||")]
    #[token("OR", ignore(ascii_case))]
    Or,
    #[token("!")]
    #[token("NOT", ignore(ascii_case))]
    Not,

    // Literals
    #[token("true", ignore(ascii_case))]
    True,
    #[token("false", ignore(ascii_case))]
    False,
    #[token("null", ignore(ascii_case))]
    Null,

    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape_string(&s[1..s.len() - 1])
    })]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| {
        let s = lex.slice();
        unescape_string(&s[1..s.len() - 1])
    })]
    String(String),

    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r"-?[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    /// `{name}` parameter placeholder.
    #[regex(r"\{[ \t]*[a-zA-Z_][a-zA-Z0-9_]*[ \t]*\}", |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].trim().to_string()
    })]
    Param(String),

    /// Property path, dot separated.
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z_][a-zA-Z0-9_]*)*", |lex| lex.slice().to_string())]
    Ident(String),

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
}

fn unescape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }

    result
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Range<usize>,
}

/// Tokenize a conditions string.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, ConditionsError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push(SpannedToken {
                token,
                span: lexer.span(),
            }),
            Err(()) => {
                return Err(ConditionsError::new(
                    format!("unexpected input '{}'", lexer.slice()),
                    lexer.span(),
                ))
            }
        }
    }

    Ok(tokens)
}
