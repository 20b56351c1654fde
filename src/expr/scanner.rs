use super::{ExprError, Operator, Token};
use crate::{Decimal, Location};
use std::iter::Peekable;
use std::str::CharIndices;

/// A single-pass scanner over the text of a balance expression.
///
/// The scanner yields tokens lazily together with the location of their first
/// character, so that a consumer stops at the first error it meets. Spaces,
/// tabs, carriage returns and newlines separate tokens and are otherwise
/// ignored, which allows an expression to span multiple indented lines.
pub struct Scanner<'t> {
    text: &'t str,
    chars: Peekable<CharIndices<'t>>,
    location: Location,
}

impl<'t> Scanner<'t> {
    pub fn new(text: &'t str) -> Self {
        Scanner {
            text,
            chars: text.char_indices().peekable(),
            location: (1, 1).into(),
        }
    }

    /// Returns the location of the next character to be scanned.
    pub fn location(&self) -> Location {
        self.location
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.location.line += 1;
            self.location.col = 1;
        } else {
            self.location.col += 1;
        }
        Some(c)
    }

    fn offset(&mut self) -> usize {
        self.chars
            .peek()
            .map_or(self.text.len(), |(offset, _)| *offset)
    }

    fn take_while(&mut self, start: usize, pred: impl Fn(char) -> bool) -> &'t str {
        while let Some(&(_, c)) = self.chars.peek() {
            if !pred(c) {
                break;
            }
            self.bump();
        }
        let end = self.offset();
        &self.text[start..end]
    }
}

impl<'t> Iterator for Scanner<'t> {
    type Item = Result<(Token<'t>, Location), ExprError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (start, c) = *self.chars.peek()?;
            let location = self.location;
            let token = if matches!(c, ' ' | '\t' | '\r' | '\n') {
                self.bump();
                continue;
            } else if c.is_alphabetic() {
                Token::Identifier(self.take_while(start, |c| c.is_alphanumeric() || c == ':'))
            } else if c.is_ascii_digit() {
                let text = self.take_while(start, |c| c.is_ascii_digit() || c == '.');
                match text.parse::<Decimal>() {
                    Ok(number) => Token::Number(number),
                    Err(_) if text.matches('.').count() <= 1 => {
                        return Some(Err(ExprError::Overflow { position: location }))
                    }
                    Err(_) => {
                        return Some(Err(ExprError::InvalidNumber {
                            position: location,
                            text: text.to_string(),
                        }))
                    }
                }
            } else if let Some(op) = Operator::from_char(c) {
                self.bump();
                Token::Operator(op)
            } else if c == '(' {
                self.bump();
                Token::LeftParen
            } else if c == ')' {
                self.bump();
                Token::RightParen
            } else {
                self.bump();
                return Some(Err(ExprError::UnknownCharacter {
                    position: location,
                    character: c,
                }));
            };
            return Some(Ok((token, location)));
        }
    }
}

/// Scans the whole `text`, returning its tokens or the first error.
pub fn scan(text: &str) -> Result<Vec<(Token<'_>, Location)>, ExprError> {
    Scanner::new(text).collect()
}
