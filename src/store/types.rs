//! Variable references: the textual mention of a variable, possibly carrying a
//! time index (`X`, `X[5]`, `X[t-1]`, `X[2:5]`).
//!
//! A reference's identity is its exact text. `X[t+1]` evaluated at step 2 and
//! `X[3]` address the same cell but are distinct references; reconciling them is
//! the evaluation engine's job, not equality's.

use serde::{Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

use crate::compute::kernel::Builtin;

/// The identifier standing for the current simulated step.
pub const TIME_SYMBOL: &str = "t";

/// Words that can never name a variable.
const RESERVED: &[&str] = &[
    "if", "else", "elif", "and", "or", "not", "in", "is", "lambda", "import", "from", "as",
    "for", "while", "def", "class", "return", "yield", "del", "global", "nonlocal", "pass",
    "raise", "try", "except", "finally", "with", "assert", "break", "continue", "await",
    "async", "None", "True", "False",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("'{0}' is not a variable reference")]
    NotAReference(String),
    #[error("Using wrong index variable in '{0}'")]
    WrongIndexVariable(String),
    #[error("Malformed index in '{text}': {reason}")]
    MalformedIndex { text: String, reason: String },
    #[error("'{0}' is neither relatively nor absolutely indexed and cannot be actualized")]
    NotActualizable(String),
    #[error("Index of '{text}' is out of range at step {step}")]
    IndexOverflow { text: String, step: i64 },
}

/// How a reference addresses time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// `X`
    None,
    /// `X[5]`
    Absolute(i64),
    /// `X[t]`, `X[t+1]`, `X[t-2]`; the payload is the delay.
    Relative(i64),
    /// `X[2:5]`, `X[:5]`, `X[2:]`, `X[:]`. Bounds are absolute steps, upper exclusive.
    Sliced { lower: Option<i64>, upper: Option<i64> },
}

#[derive(Debug, Clone)]
pub struct VarRef {
    text: String,
    name: String,
    kind: IndexKind,
    length: Option<usize>,
}

impl PartialEq for VarRef {
    fn eq(&self, other: &Self) -> bool { self.text == other.text }
}

impl Eq for VarRef {}

impl Hash for VarRef {
    fn hash<H: Hasher>(&self, state: &mut H) { self.text.hash(state) }
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.text) }
}

impl Serialize for VarRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

/// Returns true when `text` names a builtin function or a reserved word.
pub fn is_reserved(word: &str) -> bool {
    RESERVED.contains(&word) || Builtin::from_name(word).is_some()
}

/// Recognizes a token as a variable mention (as opposed to an operator,
/// number, keyword or builtin).
pub fn is_reference(text: &str) -> bool {
    let first = match text.chars().next() {
        Some(c) => c,
        None => return false,
    };
    if !first.is_ascii_alphabetic() {
        return false;
    }
    if text.contains('[') && (text.matches('[').count() != 1 || text.matches(']').count() != 1) {
        return false;
    }
    let base = text.split(|c| c == '[' || c == '(').next().unwrap_or(text);
    !is_reserved(base)
}

impl VarRef {
    /// Parses a reference. Surrounding whitespace and whitespace inside the
    /// brackets are dropped, so `F[ t - 1 ]` is `F[t-1]`.
    pub fn parse(text: &str) -> Result<Self, ReferenceError> {
        let normalized = normalize(text);
        let text = normalized.as_str();
        if !is_reference(text) {
            return Err(ReferenceError::NotAReference(text.to_string()));
        }

        let (name, kind) = match text.find('[') {
            None => (text, IndexKind::None),
            Some(open) => {
                if !text.ends_with(']') {
                    return Err(ReferenceError::MalformedIndex {
                        text: text.to_string(),
                        reason: "trailing characters after ']'".into(),
                    });
                }
                let index = &text[open + 1..text.len() - 1];
                (&text[..open], parse_index(text, index)?)
            }
        };

        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ReferenceError::NotAReference(text.to_string()));
        }

        Ok(Self { text: text.to_string(), name: name.to_string(), kind, length: None })
    }

    /// Builds `name[index]`.
    pub fn absolute(name: &str, index: i64) -> Self {
        Self {
            text: format!("{}[{}]", name, index),
            name: name.to_string(),
            kind: IndexKind::Absolute(index),
            length: None,
        }
    }

    /// Builds `name[t]`, `name[t+N]` or `name[t-N]`.
    pub fn relative(name: &str, delay: i64) -> Self {
        let text = match delay {
            0 => format!("{}[t]", name),
            d if d > 0 => format!("{}[t+{}]", name, d),
            d => format!("{}[t{}]", name, d),
        };
        Self { text, name: name.to_string(), kind: IndexKind::Relative(delay), length: None }
    }

    /// Marks this reference as a vector input consuming `length` tokens.
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    pub fn text(&self) -> &str { &self.text }
    pub fn name(&self) -> &str { &self.name }
    pub fn kind(&self) -> IndexKind { self.kind }

    /// Number of input tokens this reference consumes.
    pub fn width(&self) -> usize { self.length.unwrap_or(1) }

    pub fn delay(&self) -> Option<i64> {
        match self.kind {
            IndexKind::Relative(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_indexed(&self) -> bool { !matches!(self.kind, IndexKind::None) }
    pub fn is_relative(&self) -> bool { matches!(self.kind, IndexKind::Relative(_)) }
    pub fn is_sliced(&self) -> bool { matches!(self.kind, IndexKind::Sliced { .. }) }

    pub fn is_time_symbol(&self) -> bool {
        self.kind == IndexKind::None && self.name == TIME_SYMBOL
    }

    /// The absolute step this reference addresses when the cursor is at `step`.
    pub fn resolve(&self, step: i64) -> Option<i64> {
        match self.kind {
            IndexKind::Absolute(i) => Some(i),
            IndexKind::Relative(d) => step.checked_add(d),
            IndexKind::None | IndexKind::Sliced { .. } => None,
        }
    }

    /// Absolute steps that pin this reference to the timeline.
    pub fn anchors(&self) -> Vec<i64> {
        match self.kind {
            IndexKind::Absolute(i) => vec![i],
            IndexKind::Sliced { lower, upper } => {
                lower.into_iter().chain(upper.and_then(|u| u.checked_sub(1))).collect()
            }
            IndexKind::None | IndexKind::Relative(_) => Vec::new(),
        }
    }

    /// Relative refs become the absolute ref at `step + delay`; absolute refs
    /// are returned unchanged.
    pub fn actualize(&self, step: i64) -> Result<VarRef, ReferenceError> {
        match self.kind {
            IndexKind::Relative(d) => step
                .checked_add(d)
                .map(|index| VarRef::absolute(&self.name, index))
                .ok_or_else(|| ReferenceError::IndexOverflow { text: self.text.clone(), step }),
            IndexKind::Absolute(_) => Ok(self.clone()),
            IndexKind::None | IndexKind::Sliced { .. } => {
                Err(ReferenceError::NotActualizable(self.text.clone()))
            }
        }
    }
}

fn normalize(text: &str) -> String {
    let text = text.trim();
    match text.find('[') {
        Some(open) => {
            let (name, index) = text.split_at(open);
            name.chars().chain(index.chars().filter(|c| !c.is_whitespace())).collect()
        }
        None => text.to_string(),
    }
}

fn parse_index(text: &str, index: &str) -> Result<IndexKind, ReferenceError> {
    let malformed = |reason: &str| ReferenceError::MalformedIndex {
        text: text.to_string(),
        reason: reason.to_string(),
    };

    if index.chars().any(|c| c.is_ascii_alphabetic() && c != 't') {
        return Err(ReferenceError::WrongIndexVariable(text.to_string()));
    }
    if !index.chars().all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ':' | 't')) {
        return Err(malformed("only digits, signs, ':' and 't' are allowed"));
    }
    if index.is_empty() {
        return Err(malformed("empty index"));
    }

    if index.contains(':') {
        if index.contains('t') {
            return Err(malformed("slice bounds must be absolute"));
        }
        let mut bounds = index.splitn(2, ':');
        let lower = bounds.next().unwrap_or("");
        let upper = bounds.next().unwrap_or("");
        if upper.contains(':') {
            return Err(malformed("a slice takes at most two bounds"));
        }
        let bound = |s: &str| -> Result<Option<i64>, ReferenceError> {
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse().map(Some).map_err(|_| malformed("slice bound is not an integer"))
            }
        };
        return Ok(IndexKind::Sliced { lower: bound(lower)?, upper: bound(upper)? });
    }

    if let Some(rest) = index.strip_prefix('t') {
        if rest.is_empty() {
            return Ok(IndexKind::Relative(0));
        }
        if !rest.starts_with('+') && !rest.starts_with('-') {
            return Err(malformed("expected 't+N' or 't-N'"));
        }
        return rest
            .parse()
            .map(IndexKind::Relative)
            .map_err(|_| malformed("delay is not an integer"));
    }

    if index.contains('t') {
        return Err(malformed("'t' must lead a relative index"));
    }
    index.parse().map(IndexKind::Absolute).map_err(|_| malformed("index is not an integer"))
}
