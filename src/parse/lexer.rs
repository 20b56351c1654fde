use super::Token;
use crate::{Error, ErrorLevel, ErrorType, Location, Source, SrcFile};
use logos::{Lexer as LogosLexer, Logos};

pub struct Lexer<'source> {
    llex: LogosLexer<'source, Token>,
    location: Location,
    last_token_end: Location,
    peeked_token: Option<(Token, &'source str)>,
    file: SrcFile,
}

impl<'source> Lexer<'source> {
    pub fn new(src: &'source str, file: SrcFile) -> Self {
        let mut lexer = Lexer {
            llex: Token::lexer(src),
            location: (1, 1).into(),
            last_token_end: (1, 1).into(),
            peeked_token: None,
            file,
        };
        lexer.skip_comment_space();
        lexer
    }

    pub fn last_token_end(&self) -> Location {
        self.last_token_end
    }

    pub fn location(&self) -> Location {
        self.location
    }

    fn skip_comment_space(&mut self) {
        while let Some(token) = self.llex.next() {
            match token {
                Token::Comment => {}
                Token::NewLine => {
                    self.location.col = 1;
                    self.location.line += 1;
                }
                Token::WhiteSpace => self.location.col += self.llex.slice().chars().count(),
                _ => {
                    self.peeked_token = Some((token, self.llex.slice()));
                    return;
                }
            }
        }
    }

    pub fn peek(&mut self) -> Result<(Token, &'source str), Error> {
        let error = Error {
            msg: "Unexpected end of file.".to_string(),
            src: Source {
                file: self.file.clone(),
                start: self.location,
                end: self.location,
            },
            r#type: ErrorType::Syntax,
            level: ErrorLevel::Error,
        };
        self.peeked_token.ok_or(error)
    }

    /// Drops the peeked token. Strings may span lines, so the location is
    /// advanced character by character.
    #[inline]
    pub fn consume(&mut self) {
        if let Some((_, text)) = self.peeked_token.take() {
            for c in text.chars() {
                if c == '\n' {
                    self.location.line += 1;
                    self.location.col = 1;
                } else {
                    self.location.col += 1;
                }
            }
            self.last_token_end = self.location;
            self.skip_comment_space();
        }
    }

    pub fn take(&mut self, expected: Token) -> Result<&'source str, Error> {
        let (token, text) = self.peek()?;
        if token != expected {
            Err(Error {
                msg: format!("Expect {:?}, found {:?}({:?})", expected, &token, text),
                src: Source {
                    file: self.file.clone(),
                    start: self.location,
                    end: self.location.advance(text.chars().count()),
                },
                r#type: ErrorType::Syntax,
                level: ErrorLevel::Error,
            })
        } else {
            self.consume();
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn columns_count_characters() {
        let mut lexer = Lexer::new("\"日本\"\t open\n  \"a\nb\" USD", Arc::new("t.bean".into()));
        assert_eq!(lexer.take(Token::String), Ok("\"日本\""));
        assert_eq!(lexer.location(), (1, 7).into());
        lexer.consume();
        assert_eq!(lexer.location(), (2, 3).into());
        assert_eq!(lexer.take(Token::String), Ok("\"a\nb\""));
        assert_eq!(lexer.last_token_end(), (3, 3).into());
        assert_eq!(lexer.location(), (3, 4).into());
    }
}
