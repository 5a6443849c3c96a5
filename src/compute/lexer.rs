//! Tokenizer for equation text.
//!
//! The accepted alphabet is deliberately small: numbers, identifiers, the
//! arithmetic/comparison operators and the punctuation needed for indexing and
//! calls. Anything else (quotes, `@`, `;`, ...) stops compilation here.

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token<'input> {
    If,
    Else,
    Plus,
    Minus,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Lt,
    Lte,
    Gt,
    Gte,
    EqEq,
    Neq,
    Assign,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Dot,
    Ident(&'input str),
    Num(&'input str),
}

pub type Spanned<T> = (usize, T, usize);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unexpected character '{ch}' at offset {offset}")]
pub struct LexError {
    pub offset: usize,
    pub ch: char,
}

pub struct Lexer<'input> {
    text: &'input str,
    pos: usize,
}

impl<'input> Lexer<'input> {
    pub fn new(text: &'input str) -> Self {
        Self { text, pos: 0 }
    }

    /// Collects every token, failing on the first unknown character.
    pub fn tokenize(text: &'input str) -> Result<Vec<Spanned<Token<'input>>>, LexError> {
        Lexer::new(text).collect()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.text.as_bytes().get(self.pos + offset).copied()
    }

    fn take_while(&mut self, keep: impl Fn(u8) -> bool) {
        while let Some(b) = self.peek_at(0) {
            if !keep(b) {
                break;
            }
            self.pos += 1;
        }
    }

    fn number(&mut self, start: usize) -> Spanned<Token<'input>> {
        self.take_while(|b| b.is_ascii_digit());
        if self.peek_at(0) == Some(b'.') {
            self.pos += 1;
            self.take_while(|b| b.is_ascii_digit());
        }
        if matches!(self.peek_at(0), Some(b'e') | Some(b'E')) {
            let signed = matches!(self.peek_at(1), Some(b'+') | Some(b'-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_at(digit_at).map_or(false, |b| b.is_ascii_digit()) {
                self.pos += digit_at;
                self.take_while(|b| b.is_ascii_digit());
            }
        }
        (start, Token::Num(&self.text[start..self.pos]), self.pos)
    }

    fn word(&mut self, start: usize) -> Spanned<Token<'input>> {
        self.take_while(|b| b.is_ascii_alphanumeric() || b == b'_');
        let word = &self.text[start..self.pos];
        let token = match word {
            "if" => Token::If,
            "else" => Token::Else,
            _ => Token::Ident(word),
        };
        (start, token, self.pos)
    }

    fn symbol(&mut self, start: usize, single: Token<'input>, second: u8, double: Token<'input>) -> Spanned<Token<'input>> {
        if self.peek_at(1) == Some(second) {
            self.pos += 2;
            (start, double, self.pos)
        } else {
            self.pos += 1;
            (start, single, self.pos)
        }
    }
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Result<Spanned<Token<'input>>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.take_while(|b| b.is_ascii_whitespace());
        let start = self.pos;
        let b = self.peek_at(0)?;

        let single = |lexer: &mut Self, token| {
            lexer.pos += 1;
            Some(Ok((start, token, lexer.pos)))
        };

        match b {
            b'0'..=b'9' => Some(Ok(self.number(start))),
            b'.' if self.peek_at(1).map_or(false, |n| n.is_ascii_digit()) => Some(Ok(self.number(start))),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => Some(Ok(self.word(start))),
            b'+' => single(self, Token::Plus),
            b'-' => single(self, Token::Minus),
            b'%' => single(self, Token::Mod),
            b'^' => single(self, Token::Pow),
            b'(' => single(self, Token::LParen),
            b')' => single(self, Token::RParen),
            b'[' => single(self, Token::LBracket),
            b']' => single(self, Token::RBracket),
            b',' => single(self, Token::Comma),
            b':' => single(self, Token::Colon),
            b'.' => single(self, Token::Dot),
            b'*' => Some(Ok(self.symbol(start, Token::Mul, b'*', Token::Pow))),
            b'/' => Some(Ok(self.symbol(start, Token::Div, b'/', Token::FloorDiv))),
            b'<' => Some(Ok(self.symbol(start, Token::Lt, b'=', Token::Lte))),
            b'>' => Some(Ok(self.symbol(start, Token::Gt, b'=', Token::Gte))),
            b'=' => Some(Ok(self.symbol(start, Token::Assign, b'=', Token::EqEq))),
            b'!' if self.peek_at(1) == Some(b'=') => {
                self.pos += 2;
                Some(Ok((start, Token::Neq, self.pos)))
            }
            _ => {
                let ch = self.text[start..].chars().next().unwrap_or('?');
                // Stop iterating after the error.
                self.pos = self.text.len();
                Some(Err(LexError { offset: start, ch }))
            }
        }
    }
}
