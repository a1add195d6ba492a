//! Requested character sets
//!
//! Charsets keep the order in which characters first appear so every
//! per-glyph library is emitted deterministically. Files use the atlas
//! generator's charset syntax:
//!
//! ```text
//! "ABC", 'x', 0x20, 65, [0x30, 0x39], ['a', 'z']
//! ```

use crate::core::errors::{FileContext, PipelineResult};
use std::collections::HashSet;
use std::path::Path;

/// Printable ASCII, what the atlas generator uses without `-charset`
const BASIC_RANGE: std::ops::RangeInclusive<u32> = 0x20..=0x7E;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Charset {
    chars: Vec<char>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharsetParseError {
    pub position: usize,
    pub message: String,
}

impl std::fmt::Display for CharsetParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "charset syntax error at byte {}: {}", self.position, self.message)
    }
}

impl std::error::Error for CharsetParseError {}

impl Charset {
    /// Build from any character sequence, dropping repeats
    pub fn from_chars(chars: impl IntoIterator<Item = char>) -> Self {
        let mut seen = HashSet::new();
        let chars = chars.into_iter().filter(|c| seen.insert(*c)).collect();
        Self { chars }
    }

    /// Every non-control character of a plain text string
    pub fn from_text(text: &str) -> Self {
        Self::from_chars(text.chars().filter(|c| !c.is_control()))
    }

    pub fn basic() -> Self {
        Self::from_chars(BASIC_RANGE.filter_map(char::from_u32))
    }

    pub fn parse(source: &str) -> Result<Self, CharsetParseError> {
        Parser::new(source).parse().map(Self::from_chars)
    }

    /// Load a charset file
    ///
    /// A file opening with a quote or a bracket must be valid generator
    /// syntax. Anything else that fails to parse is read as plain text.
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let source = std::fs::read_to_string(path).with_file_context("read", path)?;
        match Self::parse(&source) {
            Ok(charset) => Ok(charset),
            Err(e) if looks_like_generator_syntax(&source) => {
                Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
                    .with_file_context("parse charset", path)
            }
            Err(e) => {
                tracing::debug!("{:?} is not generator charset syntax ({}), reading as text", path, e);
                Ok(Self::from_text(&source))
            }
        }
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn contains(&self, c: char) -> bool {
        self.chars.contains(&c)
    }
}

fn looks_like_generator_syntax(source: &str) -> bool {
    matches!(source.trim_start().chars().next(), Some('"' | '\'' | '['))
}

struct Parser<'a> {
    source: &'a str,
    position: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            position: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> CharsetParseError {
        CharsetParseError {
            position: self.position,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.source[self.position..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace() || c == ',') {
            self.bump();
        }
    }

    fn parse(mut self) -> Result<Vec<char>, CharsetParseError> {
        let mut out = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                None => return Ok(out),
                Some('"') => out.extend(self.string()?),
                Some('[') => out.extend(self.range()?),
                Some(_) => out.push(self.single()?),
            }
        }
    }

    fn string(&mut self) -> Result<Vec<char>, CharsetParseError> {
        self.bump();
        let mut out = Vec::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some('"') => return Ok(out),
                Some('\\') => out.push(self.escaped()?),
                Some(c) => out.push(c),
            }
        }
    }

    fn escaped(&mut self) -> Result<char, CharsetParseError> {
        match self.bump() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some(c @ ('\\' | '"' | '\'')) => Ok(c),
            Some(c) => Err(self.error(format!("unknown escape \\{c}"))),
            None => Err(self.error("dangling escape")),
        }
    }

    fn range(&mut self) -> Result<Vec<char>, CharsetParseError> {
        self.bump();
        self.skip_separators();
        let start = self.single()?;
        self.skip_separators();
        let end = self.single()?;
        self.skip_separators();
        if self.bump() != Some(']') {
            return Err(self.error("expected ']'"));
        }
        if start > end {
            return Err(self.error(format!(
                "range start U+{:04X} is after end U+{:04X}",
                start as u32, end as u32
            )));
        }
        Ok((start..=end).collect())
    }

    fn single(&mut self) -> Result<char, CharsetParseError> {
        match self.peek() {
            Some('\'') => {
                self.bump();
                let c = match self.bump() {
                    Some('\\') => self.escaped()?,
                    Some(c) => c,
                    None => return Err(self.error("unterminated character literal")),
                };
                if self.bump() != Some('\'') {
                    return Err(self.error("expected closing quote"));
                }
                Ok(c)
            }
            Some(c) if c.is_ascii_digit() => {
                let start = self.position;
                while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric()) {
                    self.bump();
                }
                let literal = &self.source[start..self.position];
                let value = match literal
                    .strip_prefix("0x")
                    .or_else(|| literal.strip_prefix("0X"))
                {
                    Some(hex) => u32::from_str_radix(hex, 16),
                    None => literal.parse::<u32>(),
                }
                .map_err(|_| self.error(format!("invalid number {literal:?}")))?;
                char::from_u32(value)
                    .ok_or_else(|| self.error(format!("U+{value:04X} is not a scalar value")))
            }
            Some(c) => Err(self.error(format!("unexpected {c:?}"))),
            None => Err(self.error("unexpected end of charset")),
        }
    }
}
