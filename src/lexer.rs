//! Formula tokenizer: converts a source slice into a stream of located
//! tokens. Used both stand-alone (`parse_formula`) and from inside the
//! skeleton parser, which slices out an embedded formula's source text
//! first (see `skeleton_parser::find_end_of_formula`).

use crate::error::{Location, ParseError, ParseResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Integer(i64),
    Float(f64),
    String(String),
    Name(String),
    /// A loop variable reference, e.g. `$i`, `$$count`.
    LoopName(String),
    Operator(&'static str),
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

/// Longest operators first, so maximal-munch matching is a simple linear
/// scan without a trie.
const OPERATORS: &[&str] = &[
    "<<=", ">>=", "**", "<=>", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "++", "--", "+=",
    "-=", "*=", "/=", "%=", "&=", "^=", "|=", "->", "::", ".*", "!", "+", "-", "*", "/", "%", "<",
    ">", "=", "&", "|", "^", "~", "?", ":", ",", ".", "(", ")", "[", "]", "{", "}",
];

pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => {
                    self.advance();
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    self.advance();
                    self.advance();
                    while !(self.peek() == Some(b'*') && self.peek_at(1) == Some(b'/')) {
                        if self.advance().is_none() {
                            return;
                        }
                    }
                    self.advance();
                    self.advance();
                }
                _ => return,
            }
        }
    }

    pub fn tokenize(mut self) -> ParseResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_end = matches!(tok.kind, TokenKind::End);
            tokens.push(tok);
            if is_end {
                break;
            }
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> ParseResult<Token> {
        self.skip_whitespace_and_comments();
        let line = self.line;
        let column = self.column;

        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::End,
                line,
                column,
            });
        };

        if c == b'$' {
            return self.lex_loop_name(line, column);
        }
        if c.is_ascii_digit() {
            return self.lex_number(line, column);
        }
        if c == b'"' {
            return self.lex_string(line, column);
        }
        if c == b'_' || c.is_ascii_alphabetic() {
            return self.lex_name(line, column);
        }

        for op in OPERATORS {
            if self.source[self.pos..].starts_with(op) {
                for _ in 0..op.len() {
                    self.advance();
                }
                return Ok(Token {
                    kind: TokenKind::Operator(op),
                    line,
                    column,
                });
            }
        }

        Err(ParseError::new(
            self.location(),
            format!("unexpected character '{}'", c as char),
        ))
    }

    fn lex_loop_name(&mut self, line: usize, column: usize) -> ParseResult<Token> {
        let start = self.pos;
        while self.peek() == Some(b'$') {
            self.advance();
        }
        while matches!(self.peek(), Some(c) if c == b'_' || c.is_ascii_alphanumeric()) {
            self.advance();
        }
        let text = &self.source[start..self.pos];
        if text.trim_start_matches('$').is_empty() {
            return Err(ParseError::new(
                Location::new(line, column),
                "expected a name after '$'",
            ));
        }
        Ok(Token {
            kind: TokenKind::LoopName(text.to_string()),
            line,
            column,
        })
    }

    fn lex_name(&mut self, line: usize, column: usize) -> ParseResult<Token> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c == b'_' || c.is_ascii_alphanumeric()) {
            self.advance();
        }
        let text = self.source[start..self.pos].to_string();
        Ok(Token {
            kind: TokenKind::Name(text),
            line,
            column,
        })
    }

    fn lex_number(&mut self, line: usize, column: usize) -> ParseResult<Token> {
        let start = self.pos;

        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.advance();
            self.advance();
            let digits_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit() || c == b'_') {
                self.advance();
            }
            let digits: String = self.source[digits_start..self.pos]
                .chars()
                .filter(|c| *c != '_')
                .collect();
            let value = i64::from_str_radix(&digits, 16)
                .map_err(|e| ParseError::new(Location::new(line, column), e.to_string()))?;
            return Ok(Token {
                kind: TokenKind::Integer(value),
                line,
                column,
            });
        }
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'b' | b'B')) {
            self.advance();
            self.advance();
            let digits_start = self.pos;
            while matches!(self.peek(), Some(c) if c == b'0' || c == b'1' || c == b'_') {
                self.advance();
            }
            let digits: String = self.source[digits_start..self.pos]
                .chars()
                .filter(|c| *c != '_')
                .collect();
            let value = i64::from_str_radix(&digits, 2)
                .map_err(|e| ParseError::new(Location::new(line, column), e.to_string()))?;
            return Ok(Token {
                kind: TokenKind::Integer(value),
                line,
                column,
            });
        }
        if self.peek() == Some(b'0')
            && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit())
        {
            self.advance();
            let digits_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == b'_') {
                self.advance();
            }
            let digits: String = self.source[digits_start..self.pos]
                .chars()
                .filter(|c| *c != '_')
                .collect();
            let value = i64::from_str_radix(&digits, 8)
                .map_err(|e| ParseError::new(Location::new(line, column), e.to_string()))?;
            return Ok(Token {
                kind: TokenKind::Integer(value),
                line,
                column,
            });
        }

        let mut is_float = false;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == b'_') {
            self.advance();
        }
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == b'_') {
                self.advance();
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            is_float = true;
            self.advance();
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.advance();
            }
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }

        let text: String = self.source[start..self.pos]
            .chars()
            .filter(|c| *c != '_')
            .collect();

        if is_float {
            let value = text
                .parse::<f64>()
                .map_err(|e| ParseError::new(Location::new(line, column), e.to_string()))?;
            Ok(Token {
                kind: TokenKind::Float(value),
                line,
                column,
            })
        } else {
            let value = text
                .parse::<i64>()
                .map_err(|e| ParseError::new(Location::new(line, column), e.to_string()))?;
            Ok(Token {
                kind: TokenKind::Integer(value),
                line,
                column,
            })
        }
    }

    fn lex_string(&mut self, line: usize, column: usize) -> ParseResult<Token> {
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(ParseError::new(
                        Location::new(line, column),
                        "unterminated string literal",
                    ));
                }
                Some(b'"') => break,
                Some(b'\\') => {
                    let escaped = self.advance().ok_or_else(|| {
                        ParseError::new(Location::new(line, column), "unterminated escape sequence")
                    })?;
                    match escaped {
                        b'n' => value.push('\n'),
                        b't' => value.push('\t'),
                        b'\\' => value.push('\\'),
                        b'"' => value.push('"'),
                        b'x' => {
                            let hex: String = (0..2)
                                .filter_map(|_| self.advance().map(|c| c as char))
                                .collect();
                            let code = u8::from_str_radix(&hex, 16).map_err(|e| {
                                ParseError::new(Location::new(line, column), e.to_string())
                            })?;
                            value.push(code as char);
                        }
                        b'u' => {
                            let hex: String = (0..4)
                                .filter_map(|_| self.advance().map(|c| c as char))
                                .collect();
                            let code = u32::from_str_radix(&hex, 16).map_err(|e| {
                                ParseError::new(Location::new(line, column), e.to_string())
                            })?;
                            let ch = char::from_u32(code).ok_or_else(|| {
                                ParseError::new(Location::new(line, column), "invalid unicode escape")
                            })?;
                            value.push(ch);
                        }
                        other => {
                            return Err(ParseError::new(
                                Location::new(line, column),
                                format!("unknown escape sequence '\\{}'", other as char),
                            ));
                        }
                    }
                }
                Some(c) => value.push(c as char),
            }
        }
        Ok(Token {
            kind: TokenKind::String(value),
            line,
            column,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_arithmetic() {
        assert_eq!(
            kinds("4 - 2 - 1"),
            vec![
                TokenKind::Integer(4),
                TokenKind::Operator("-"),
                TokenKind::Integer(2),
                TokenKind::Operator("-"),
                TokenKind::Integer(1),
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn lexes_loop_names() {
        assert_eq!(
            kinds("$i $$count"),
            vec![
                TokenKind::LoopName("$i".to_string()),
                TokenKind::LoopName("$$count".to_string()),
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn lexes_string_escapes() {
        assert_eq!(
            kinds(r#""a\nb""#),
            vec![TokenKind::String("a\nb".to_string()), TokenKind::End]
        );
    }

    #[test]
    fn skips_block_comments() {
        assert_eq!(
            kinds("1 /* skip me */ + 2"),
            vec![
                TokenKind::Integer(1),
                TokenKind::Operator("+"),
                TokenKind::Integer(2),
                TokenKind::End,
            ]
        );
    }
}
