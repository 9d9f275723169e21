// modrules-common/src/dependency/predicate.rs
//! Boolean conditions over target flags, e.g.
//! `editorBuild == true && (platform == Win64 || platform == Linux)`.
use std::collections::BTreeSet;
use std::fmt;

use logos::Logos;
use thiserror::Error;

use crate::model::{FlagValue, TargetContext};

/// Deepest run of `(` and `!` a predicate may open.
pub const MAX_NESTING: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at offset {offset}")]
pub struct PredicateError {
    pub offset: usize,
    pub message: String,
}

impl PredicateError {
    fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Right-hand side of a flag comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Bool(bool),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Const(bool),
    Eq(String, Literal),
    Ne(String, Literal),
    Not(Box<Predicate>),
    /// Two or more terms joined by `&&`.
    And(Vec<Predicate>),
    /// Two or more terms joined by `||`.
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn parse(source: &str) -> Result<Self, PredicateError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: source.len(),
            depth: 0,
        };
        let expr = parser.parse_or()?;
        match parser.peek() {
            None => Ok(expr),
            Some((offset, tok)) => Err(PredicateError::new(
                *offset,
                format!("unexpected {tok} after expression"),
            )),
        }
    }

    pub fn eval(&self, context: &TargetContext) -> bool {
        match self {
            Self::Const(b) => *b,
            Self::Eq(flag, lit) => matches(context, flag, lit),
            Self::Ne(flag, lit) => !matches(context, flag, lit),
            Self::Not(inner) => !inner.eval(context),
            Self::And(terms) => terms.iter().all(|t| t.eval(context)),
            Self::Or(terms) => terms.iter().any(|t| t.eval(context)),
        }
    }

    /// True when the predicate can only hold with `flag` switched on.
    ///
    /// Decided from the shape of the expression alone: `flag`, `flag == true`
    /// and `flag != false` require it, `&&` requires it if any term does and
    /// `||` only if every term does.
    pub fn requires_flag(&self, flag: &str) -> bool {
        match self {
            Self::Eq(f, Literal::Bool(true)) | Self::Ne(f, Literal::Bool(false)) => f == flag,
            Self::Const(_) | Self::Eq(..) | Self::Ne(..) => false,
            Self::Not(inner) => inner.excludes_flag(flag),
            Self::And(terms) => terms.iter().any(|t| t.requires_flag(flag)),
            Self::Or(terms) => terms.iter().all(|t| t.requires_flag(flag)),
        }
    }

    /// True when the predicate can only hold with `flag` switched off.
    pub fn excludes_flag(&self, flag: &str) -> bool {
        match self {
            Self::Eq(f, Literal::Bool(false)) | Self::Ne(f, Literal::Bool(true)) => f == flag,
            Self::Const(_) | Self::Eq(..) | Self::Ne(..) => false,
            Self::Not(inner) => inner.requires_flag(flag),
            Self::And(terms) => terms.iter().any(|t| t.excludes_flag(flag)),
            Self::Or(terms) => terms.iter().all(|t| t.excludes_flag(flag)),
        }
    }

    /// Names of every flag the predicate reads.
    pub fn flags(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_flags(&mut out);
        out
    }

    fn collect_flags<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Self::Const(_) => {}
            Self::Eq(flag, _) | Self::Ne(flag, _) => {
                out.insert(flag.as_str());
            }
            Self::Not(inner) => inner.collect_flags(out),
            Self::And(terms) | Self::Or(terms) => {
                for term in terms {
                    term.collect_flags(out);
                }
            }
        }
    }
}

fn matches(context: &TargetContext, flag: &str, literal: &Literal) -> bool {
    match literal {
        Literal::Bool(expected) => context.get(flag) == *expected,
        Literal::Text(expected) => {
            matches!(context.value(flag), Some(FlagValue::Text(actual)) if actual == expected)
        }
    }
}

#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum Token {
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("!")]
    Bang,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[regex(r"[A-Za-z_][A-Za-z0-9_.]*", |lex| lex.slice().to_string())]
    Ident(String),
    #[regex(r#""[^"]*""#, |lex| {
        let quoted = lex.slice();
        quoted[1..quoted.len() - 1].to_string()
    })]
    Str(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(s) => write!(f, "identifier '{s}'"),
            Self::Str(s) => write!(f, "string \"{s}\""),
            Self::True => f.write_str("'true'"),
            Self::False => f.write_str("'false'"),
            Self::EqEq => f.write_str("'=='"),
            Self::NotEq => f.write_str("'!='"),
            Self::Bang => f.write_str("'!'"),
            Self::AndAnd => f.write_str("'&&'"),
            Self::OrOr => f.write_str("'||'"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, PredicateError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next() {
        let offset = lexer.span().start;
        match token {
            Ok(token) => tokens.push((offset, token)),
            Err(_) => {
                let slice = lexer.slice();
                let message = if slice.starts_with('"') {
                    "unterminated string".to_string()
                } else {
                    format!("unexpected '{slice}'")
                };
                return Err(PredicateError::new(offset, message));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(usize, Token)> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek().is_some_and(|(_, t)| t == expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn descend(&mut self, offset: usize) -> Result<(), PredicateError> {
        if self.depth >= MAX_NESTING {
            return Err(PredicateError::new(
                offset,
                format!("nested more than {MAX_NESTING} levels deep"),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Predicate, PredicateError> {
        let mut terms = vec![self.parse_and()?];
        while self.eat(&Token::OrOr) {
            terms.push(self.parse_and()?);
        }
        Ok(match terms.len() {
            1 => terms.swap_remove(0),
            _ => Predicate::Or(terms),
        })
    }

    fn parse_and(&mut self) -> Result<Predicate, PredicateError> {
        let mut terms = vec![self.parse_unary()?];
        while self.eat(&Token::AndAnd) {
            terms.push(self.parse_unary()?);
        }
        Ok(match terms.len() {
            1 => terms.swap_remove(0),
            _ => Predicate::And(terms),
        })
    }

    fn parse_unary(&mut self) -> Result<Predicate, PredicateError> {
        if let Some((offset, Token::Bang)) = self.peek() {
            let offset = *offset;
            self.pos += 1;
            self.descend(offset)?;
            let inner = self.parse_unary();
            self.depth -= 1;
            return Ok(Predicate::Not(Box::new(inner?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Predicate, PredicateError> {
        match self.next() {
            Some((offset, Token::LParen)) => {
                self.descend(offset)?;
                let inner = self.parse_or();
                self.depth -= 1;
                let inner = inner?;
                match self.next() {
                    Some((_, Token::RParen)) => Ok(inner),
                    Some((offset, tok)) => {
                        Err(PredicateError::new(offset, format!("expected ')', found {tok}")))
                    }
                    None => Err(PredicateError::new(self.end, "expected ')'")),
                }
            }
            Some((_, Token::True)) => Ok(Predicate::Const(true)),
            Some((_, Token::False)) => Ok(Predicate::Const(false)),
            Some((_, Token::Ident(flag))) => {
                if self.eat(&Token::EqEq) {
                    Ok(Predicate::Eq(flag, self.parse_literal()?))
                } else if self.eat(&Token::NotEq) {
                    Ok(Predicate::Ne(flag, self.parse_literal()?))
                } else {
                    Ok(Predicate::Eq(flag, Literal::Bool(true)))
                }
            }
            Some((offset, tok)) => Err(PredicateError::new(
                offset,
                format!("expected a flag or '(', found {tok}"),
            )),
            None => Err(PredicateError::new(self.end, "expected an expression")),
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, PredicateError> {
        match self.next() {
            Some((_, Token::True)) => Ok(Literal::Bool(true)),
            Some((_, Token::False)) => Ok(Literal::Bool(false)),
            Some((_, Token::Ident(s))) | Some((_, Token::Str(s))) => Ok(Literal::Text(s)),
            Some((offset, tok)) => {
                Err(PredicateError::new(offset, format!("expected a value, found {tok}")))
            }
            None => Err(PredicateError::new(self.end, "expected a value")),
        }
    }
}
