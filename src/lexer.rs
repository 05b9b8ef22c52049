//! ICL lexical analyzer.
//!
//! Single forward pass over the source text. Skips ASCII whitespace and `//`
//! line comments, resolves keywords, and tries multi-character operators
//! greedily before single-character fallbacks. Scanning is by byte for the
//! ASCII-only lexemes of the language; string and identifier content may carry
//! non-ASCII bytes preserved verbatim.

use crate::errors::CompileError;
use crate::source_map::SourceSpan;
use crate::tokens::{keyword, Token, TokenKind};

/// Converts ICL source text into a token stream.
pub struct Lexer<'a> {
    source: &'a [u8],
    filename: String,
    index: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, filename: &str) -> Self {
        Lexer {
            source: source.as_bytes(),
            filename: filename.to_string(),
            index: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the full source and return the token stream.
    ///
    /// Always terminates with an explicit [`TokenKind::Eof`] token whose span
    /// is the final position.
    pub fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
        let mut tokens: Vec<Token> = Vec::new();

        while !self.is_eof() {
            let ch = self.peek(0);
            if matches!(ch, b' ' | b'\t' | b'\r' | b'\n') {
                self.consume_whitespace();
                continue;
            }

            if ch == b'/' && self.peek(1) == b'/' {
                self.consume_comment();
                continue;
            }

            if ch.is_ascii_alphabetic() || ch == b'_' || !ch.is_ascii() {
                tokens.push(self.lex_identifier());
                continue;
            }

            if ch.is_ascii_digit() {
                tokens.push(self.lex_number());
                continue;
            }

            if ch == b'"' {
                tokens.push(self.lex_string()?);
                continue;
            }

            if let Some(token) = self.lex_multi_char_operator() {
                tokens.push(token);
                continue;
            }

            if let Some(kind) = single_char_kind(ch) {
                let (start_line, start_col) = (self.line, self.column);
                self.advance();
                let span = self.span(start_line, start_col, self.line, self.column);
                tokens.push(Token::new(kind, &(ch as char).to_string(), span));
                continue;
            }

            let span = self.span(self.line, self.column, self.line, self.column + 1);
            return Err(CompileError::lex(
                "LEX001",
                format!("Unexpected character {:?}.", ch as char),
                Some(span),
                "Remove the character or escape it inside a string literal.",
            ));
        }

        let eof_span = self.span(self.line, self.column, self.line, self.column);
        tokens.push(Token::new(TokenKind::Eof, "", eof_span));
        Ok(tokens)
    }

    fn lex_multi_char_operator(&mut self) -> Option<Token> {
        let (start_line, start_col) = (self.line, self.column);
        let kind = match (self.peek(0), self.peek(1)) {
            (b':', b'=') => TokenKind::Assign,
            (b'=', b'>') => TokenKind::Arrow,
            (b'.', b'.') => TokenKind::Range,
            (b'=', b'=') => TokenKind::Eq,
            (b'!', b'=') => TokenKind::Ne,
            (b'<', b'=') => TokenKind::Le,
            (b'>', b'=') => TokenKind::Ge,
            (b'&', b'&') => TokenKind::And,
            (b'|', b'|') => TokenKind::Or,
            _ => return None,
        };
        let lexeme = format!("{}{}", self.peek(0) as char, self.peek(1) as char);
        self.advance();
        self.advance();
        let span = self.span(start_line, start_col, self.line, self.column);
        Some(Token::new(kind, &lexeme, span))
    }

    fn lex_identifier(&mut self) -> Token {
        let (start_line, start_col) = (self.line, self.column);
        let start = self.index;
        while !self.is_eof() {
            let ch = self.peek(0);
            if ch.is_ascii_alphanumeric() || ch == b'_' || !ch.is_ascii() {
                self.advance();
            } else {
                break;
            }
        }
        let lexeme = String::from_utf8_lossy(&self.source[start..self.index]).into_owned();
        let kind = keyword(&lexeme).unwrap_or(TokenKind::Ident);
        let span = self.span(start_line, start_col, self.line, self.column);
        Token::new(kind, &lexeme, span)
    }

    fn lex_number(&mut self) -> Token {
        let (start_line, start_col) = (self.line, self.column);
        let start = self.index;
        let mut seen_dot = false;

        while !self.is_eof() {
            let ch = self.peek(0);
            if ch.is_ascii_digit() {
                self.advance();
                continue;
            }
            // The decimal point is only consumed when followed by a digit, so
            // `0..3` lexes as NUMBER RANGE NUMBER.
            if ch == b'.' && !seen_dot && self.peek(1).is_ascii_digit() {
                seen_dot = true;
                self.advance();
                continue;
            }
            break;
        }

        let lexeme = String::from_utf8_lossy(&self.source[start..self.index]).into_owned();
        let span = self.span(start_line, start_col, self.line, self.column);
        Token::new(TokenKind::Number, &lexeme, span)
    }

    fn lex_string(&mut self) -> Result<Token, CompileError> {
        let (start_line, start_col) = (self.line, self.column);
        self.advance(); // opening quote
        let mut value: Vec<u8> = Vec::new();

        while !self.is_eof() {
            let ch = self.advance();
            if ch == b'"' {
                let span = self.span(start_line, start_col, self.line, self.column);
                let lexeme = String::from_utf8_lossy(&value).into_owned();
                return Ok(Token::new(TokenKind::Str, &lexeme, span));
            }
            if ch == b'\\' {
                if self.is_eof() {
                    break;
                }
                let esc = self.advance();
                match esc {
                    b'n' => value.push(b'\n'),
                    b't' => value.push(b'\t'),
                    b'"' => value.push(b'"'),
                    b'\\' => value.push(b'\\'),
                    // Any other escaped byte passes through unchanged.
                    other => value.push(other),
                }
                continue;
            }
            value.push(ch);
        }

        Err(CompileError::lex(
            "LEX002",
            "Unterminated string literal.".to_string(),
            Some(self.span(start_line, start_col, self.line, self.column)),
            "Close the string with a double quote.",
        ))
    }

    fn consume_whitespace(&mut self) {
        while !self.is_eof() && matches!(self.peek(0), b' ' | b'\t' | b'\r' | b'\n') {
            self.advance();
        }
    }

    fn consume_comment(&mut self) {
        while !self.is_eof() && self.peek(0) != b'\n' {
            self.advance();
        }
    }

    fn peek(&self, offset: usize) -> u8 {
        *self.source.get(self.index + offset).unwrap_or(&0)
    }

    fn advance(&mut self) -> u8 {
        let ch = self.source[self.index];
        self.index += 1;
        if ch == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        ch
    }

    fn is_eof(&self) -> bool {
        self.index >= self.source.len()
    }

    fn span(&self, line: u32, column: u32, end_line: u32, end_column: u32) -> SourceSpan {
        SourceSpan::new(&self.filename, line, column, end_line, end_column)
    }
}

fn single_char_kind(ch: u8) -> Option<TokenKind> {
    match ch {
        b':' => Some(TokenKind::Colon),
        b'?' => Some(TokenKind::Question),
        b',' => Some(TokenKind::Comma),
        b';' => Some(TokenKind::Semicolon),
        b'(' => Some(TokenKind::LParen),
        b')' => Some(TokenKind::RParen),
        b'{' => Some(TokenKind::LBrace),
        b'}' => Some(TokenKind::RBrace),
        b'@' => Some(TokenKind::At),
        b'#' => Some(TokenKind::Hash),
        b'+' => Some(TokenKind::Plus),
        b'-' => Some(TokenKind::Minus),
        b'*' => Some(TokenKind::Star),
        b'/' => Some(TokenKind::Slash),
        b'%' => Some(TokenKind::Percent),
        b'<' => Some(TokenKind::Lt),
        b'>' => Some(TokenKind::Gt),
        b'!' => Some(TokenKind::Not),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source, "<test>")
            .tokenize()
            .expect("lex failure")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_assignment_statement() {
        assert_eq!(
            kinds("x := 1 + 2;"),
            vec![
                TokenKind::Ident,
                TokenKind::Assign,
                TokenKind::Number,
                TokenKind::Plus,
                TokenKind::Number,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_resolve_over_identifiers() {
        assert_eq!(
            kinds("fn loop ret lam looping"),
            vec![
                TokenKind::Fn,
                TokenKind::Loop,
                TokenKind::Ret,
                TokenKind::Lam,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn range_does_not_swallow_decimal_point() {
        let tokens = Lexer::new("0..3", "<test>").tokenize().expect("lex failure");
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::Number,
                TokenKind::Range,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
        assert_eq!(tokens[0].lexeme, "0");
        assert_eq!(tokens[2].lexeme, "3");
    }

    #[test]
    fn decimal_number_keeps_fraction() {
        let tokens = Lexer::new("1.25", "<test>").tokenize().expect("lex failure");
        assert_eq!(tokens[0].lexeme, "1.25");
    }

    #[test]
    fn string_escapes_resolve() {
        let tokens = Lexer::new("\"a\\n\\t\\\"\\\\b\\q\"", "<test>")
            .tokenize()
            .expect("lex failure");
        assert_eq!(tokens[0].lexeme, "a\n\t\"\\bq");
    }

    #[test]
    fn unterminated_string_is_lex002() {
        let err = Lexer::new("\"open", "<test>").tokenize().expect_err("should fail");
        assert_eq!(err.code(), "LEX002");
    }

    #[test]
    fn unknown_character_is_lex001_with_span() {
        let err = Lexer::new("x := ~1;", "<test>").tokenize().expect_err("should fail");
        assert_eq!(err.code(), "LEX001");
        let span = err.diagnostic().span.clone().expect("span");
        assert_eq!((span.line, span.column), (1, 6));
    }

    #[test]
    fn line_comments_are_skipped() {
        assert_eq!(
            kinds("x := 1; // trailing\n// full line\ny := 2;"),
            vec![
                TokenKind::Ident,
                TokenKind::Assign,
                TokenKind::Number,
                TokenKind::Semicolon,
                TokenKind::Ident,
                TokenKind::Assign,
                TokenKind::Number,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn eof_span_is_final_position() {
        let tokens = Lexer::new("x", "<test>").tokenize().expect("lex failure");
        let eof = tokens.last().expect("eof token");
        assert_eq!(eof.kind, TokenKind::Eof);
        assert_eq!((eof.span.line, eof.span.column), (1, 2));
    }
}
