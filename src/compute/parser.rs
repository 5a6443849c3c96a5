//! Recursive-descent parser for equation text.
//!
//! Precedence, loosest first:
//!   1. `a if cond else b`
//!   2. one comparison (`<`, `<=`, `>`, `>=`, `==`, `!=`); chains are rejected
//!   3. `+`, `-`
//!   4. `*`, `/`, `//`, `%`
//!   5. unary `-`, `+`
//!   6. `**` / `^` (right-associative, binds tighter than a unary on its left)
//!   7. atoms: numbers, names, references, calls, parentheses

use super::lexer::{LexError, Lexer, Spanned, Token};
use crate::store::{ReferenceError, VarRef};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error("Unrecognized token '{0}' on the left-hand side")]
    UnrecognizedToken(String),
    #[error("Missing '=' between outputs and expression")]
    MissingAssignment,
    #[error("No output on the left-hand side")]
    NoOutputs,
    #[error("Syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("Forbidden construct: {0}")]
    SandboxViolation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    /// A bare identifier: a scalar variable, `t`, or something the sandbox rejects.
    Name(String),
    /// An indexed reference such as `X[t-1]` or `X[2:5]`.
    Ref(VarRef),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    IfElse { cond: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
    Call { func: String, args: Vec<Expr>, kwargs: Vec<(String, Expr)> },
    Attribute(Box<Expr>, String),
}

impl Expr {
    /// Every variable mentioned, in source order without duplicates.
    pub fn references(&self) -> Vec<VarRef> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut Vec<VarRef>) {
        fn push(out: &mut Vec<VarRef>, r: VarRef) {
            if !out.contains(&r) {
                out.push(r);
            }
        }
        match self {
            Expr::Num(_) => {}
            Expr::Name(n) => {
                if let Ok(r) = VarRef::parse(n) {
                    push(out, r);
                }
            }
            Expr::Ref(r) => push(out, r.clone()),
            Expr::Unary(_, e) | Expr::Attribute(e, _) => e.collect_references(out),
            Expr::Binary(_, l, r) | Expr::Compare(_, l, r) => {
                l.collect_references(out);
                r.collect_references(out);
            }
            Expr::IfElse { cond, then, otherwise } => {
                // Source order: `then if cond else otherwise`.
                then.collect_references(out);
                cond.collect_references(out);
                otherwise.collect_references(out);
            }
            Expr::Call { args, kwargs, .. } => {
                for a in args {
                    a.collect_references(out);
                }
                for (_, v) in kwargs {
                    v.collect_references(out);
                }
            }
        }
    }
}

/// Splits `lhs = rhs` at the first `=`.
pub fn split_equation(text: &str) -> Result<(&str, &str), CompileError> {
    let at = text.find('=').ok_or(CompileError::MissingAssignment)?;
    Ok((&text[..at], &text[at + 1..]))
}

/// Parses the left-hand side: references separated by whitespace or commas.
pub fn parse_outputs(lhs: &str) -> Result<Vec<VarRef>, CompileError> {
    let mut parser = Parser::new(lhs)?;
    let mut outputs = Vec::new();

    while let Some(&(start, token, end)) = parser.peek() {
        parser.pos += 1;
        match token {
            Token::Comma => {}
            Token::Ident(name) => {
                let text = parser.reference_text(name)?;
                match VarRef::parse(&text) {
                    Ok(r) => outputs.push(r),
                    Err(ReferenceError::NotAReference(t)) => return Err(CompileError::UnrecognizedToken(t)),
                    Err(e) => return Err(e.into()),
                }
            }
            _ => return Err(CompileError::UnrecognizedToken(lhs[start..end].to_string())),
        }
    }

    if outputs.is_empty() {
        return Err(CompileError::NoOutputs);
    }
    Ok(outputs)
}

/// Parses a complete right-hand-side expression.
pub fn parse_expression(rhs: &str) -> Result<Expr, CompileError> {
    let mut parser = Parser::new(rhs)?;
    let expr = parser.ternary()?;
    match parser.peek() {
        None => Ok(expr),
        Some(&(offset, _, _)) => Err(parser.syntax(offset, "unexpected trailing input")),
    }
}

struct Parser<'input> {
    text: &'input str,
    tokens: Vec<Spanned<Token<'input>>>,
    pos: usize,
}

impl<'input> Parser<'input> {
    fn new(text: &'input str) -> Result<Self, CompileError> {
        Ok(Self { text, tokens: Lexer::tokenize(text)?, pos: 0 })
    }

    fn peek(&self) -> Option<&Spanned<Token<'input>>> { self.tokens.get(self.pos) }

    fn peek_token(&self) -> Option<Token<'input>> { self.peek().map(|&(_, t, _)| t) }

    fn eat(&mut self, expected: Token<'input>) -> bool {
        if self.peek_token() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token<'input>, what: &str) -> Result<Spanned<Token<'input>>, CompileError> {
        match self.peek() {
            Some(&tok) if tok.1 == expected => {
                self.pos += 1;
                Ok(tok)
            }
            Some(&(offset, _, _)) => Err(self.syntax(offset, &format!("expected {}", what))),
            None => Err(self.syntax(self.text.len(), &format!("expected {}, found end of input", what))),
        }
    }

    fn syntax(&self, offset: usize, message: &str) -> CompileError {
        CompileError::Syntax { offset, message: message.to_string() }
    }

    /// Called after an identifier; consumes an optional `[...]` and returns the
    /// reference text with whitespace removed.
    fn reference_text(&mut self, name: &str) -> Result<String, CompileError> {
        if self.peek_token() != Some(Token::LBracket) {
            return Ok(name.to_string());
        }
        let (_, _, open_end) = self.tokens[self.pos];
        self.pos += 1;
        loop {
            match self.peek() {
                Some(&(close_start, Token::RBracket, _)) => {
                    self.pos += 1;
                    let index: String =
                        self.text[open_end..close_start].chars().filter(|c| !c.is_whitespace()).collect();
                    return Ok(format!("{}[{}]", name, index));
                }
                Some(&(_, Token::Num(_), _))
                | Some(&(_, Token::Ident(_), _))
                | Some(&(_, Token::Plus, _))
                | Some(&(_, Token::Minus, _))
                | Some(&(_, Token::Colon, _)) => self.pos += 1,
                Some(&(offset, _, _)) => return Err(self.syntax(offset, "unexpected token inside an index")),
                None => return Err(self.syntax(self.text.len(), "unclosed '['")),
            }
        }
    }

    fn ternary(&mut self) -> Result<Expr, CompileError> {
        let then = self.comparison()?;
        if !self.eat(Token::If) {
            return Ok(then);
        }
        let cond = self.comparison()?;
        self.expect(Token::Else, "'else'")?;
        let otherwise = self.ternary()?;
        Ok(Expr::IfElse { cond: Box::new(cond), then: Box::new(then), otherwise: Box::new(otherwise) })
    }

    fn compare_op(&self) -> Option<CompareOp> {
        match self.peek_token()? {
            Token::Lt => Some(CompareOp::Lt),
            Token::Lte => Some(CompareOp::Lte),
            Token::Gt => Some(CompareOp::Gt),
            Token::Gte => Some(CompareOp::Gte),
            Token::EqEq => Some(CompareOp::Eq),
            Token::Neq => Some(CompareOp::Neq),
            _ => None,
        }
    }

    fn comparison(&mut self) -> Result<Expr, CompileError> {
        let lhs = self.additive()?;
        let op = match self.compare_op() {
            Some(op) => op,
            None => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.additive()?;
        if self.compare_op().is_some() {
            let offset = self.tokens[self.pos].0;
            return Err(self.syntax(offset, "chained comparisons are not supported"));
        }
        Ok(Expr::Compare(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Mul) => BinaryOp::Mul,
                Some(Token::Div) => BinaryOp::Div,
                Some(Token::FloorDiv) => BinaryOp::FloorDiv,
                Some(Token::Mod) => BinaryOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.peek_token() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.pos += 1;
        Ok(Expr::Unary(op, Box::new(self.unary()?)))
    }

    fn power(&mut self) -> Result<Expr, CompileError> {
        let base = self.postfix()?;
        if self.eat(Token::Pow) {
            let exponent = self.unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.atom()?;
        while self.eat(Token::Dot) {
            match self.peek() {
                Some(&(_, Token::Ident(attr), _)) => {
                    self.pos += 1;
                    expr = Expr::Attribute(Box::new(expr), attr.to_string());
                }
                Some(&(offset, _, _)) => return Err(self.syntax(offset, "expected an attribute name")),
                None => return Err(self.syntax(self.text.len(), "expected an attribute name")),
            }
        }
        Ok(expr)
    }

    fn atom(&mut self) -> Result<Expr, CompileError> {
        let (offset, token, _) = match self.peek() {
            Some(&tok) => tok,
            None => return Err(self.syntax(self.text.len(), "unexpected end of expression")),
        };
        self.pos += 1;

        match token {
            Token::Num(text) => text
                .parse::<f64>()
                .map(Expr::Num)
                .map_err(|_| self.syntax(offset, &format!("invalid number '{}'", text))),
            Token::LParen => {
                let inner = self.ternary()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Ident(name) => match self.peek_token() {
                Some(Token::LParen) => {
                    self.pos += 1;
                    self.call(name)
                }
                Some(Token::LBracket) => {
                    let text = self.reference_text(name)?;
                    Ok(Expr::Ref(VarRef::parse(&text)?))
                }
                _ => Ok(Expr::Name(name.to_string())),
            },
            _ => Err(self.syntax(offset, &format!("unexpected '{}'", self.slice_at(self.pos - 1)))),
        }
    }

    fn call(&mut self, func: &str) -> Result<Expr, CompileError> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();

        while !self.eat(Token::RParen) {
            let keyword = match (self.peek_token(), self.tokens.get(self.pos + 1).map(|t| t.1)) {
                (Some(Token::Ident(k)), Some(Token::Assign)) => Some(k),
                _ => None,
            };
            match keyword {
                Some(k) => {
                    self.pos += 2;
                    kwargs.push((k.to_string(), self.ternary()?));
                }
                None => {
                    if !kwargs.is_empty() {
                        let offset = self.peek().map_or(self.text.len(), |t| t.0);
                        return Err(self.syntax(offset, "positional argument follows keyword argument"));
                    }
                    args.push(self.ternary()?);
                }
            }
            if !self.eat(Token::Comma) {
                self.expect(Token::RParen, "',' or ')'")?;
                break;
            }
        }

        Ok(Expr::Call { func: func.to_string(), args, kwargs })
    }

    fn slice_at(&self, idx: usize) -> &'input str {
        let (start, _, end) = self.tokens[idx];
        &self.text[start..end]
    }
}
