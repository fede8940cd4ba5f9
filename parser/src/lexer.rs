//! Streaming lexer.
//!
//! [`Lexer`] pulls bytes from any [`std::io::Read`] and yields [`Token`]s
//! through [`Iterator`]. Only a few bytes of lookahead are buffered, so a
//! source file never has to be loaded as a whole.
//!
//! | Syntax      | Token                                   |
//! |-------------|-----------------------------------------|
//! | `name:`     | [`TokenKind::Keyword`] (not before `=`) |
//! | `:=`        | [`TokenKind::Assign`]                   |
//! | `:`         | [`TokenKind::Colon`]                    |
//! | `// …`      | line comment                            |
//! | `/* … */`   | block comment, nestable                 |
//! | `"…"`       | string with `\n \t \r \0 \\ \"` escapes |
//!
//! A `-` is always an operator; the parser folds `-` followed by a
//! numeric literal into a negative literal. Inside an operator run, `-` and
//! `!` always start a new operator, so `x*-1` is `*` then `-`.
use std::collections::VecDeque;
use std::io::Read;

use crate::span::{Pos, Span};
use crate::token::{Token, TokenKind};

fn is_op_char(c: u8) -> bool {
    matches!(
        c,
        b'!' | b'@'
            | b'#'
            | b'$'
            | b'%'
            | b'^'
            | b'&'
            | b'*'
            | b'-'
            | b'+'
            | b'='
            | b'~'
            | b'/'
            | b'?'
            | b'<'
            | b'>'
            | b'|'
            | b'\\'
    )
}

fn is_word_start(ch: char) -> bool {
    ch == '_' || ch.is_alphabetic()
}

fn is_word_char(ch: char) -> bool {
    ch == '_' || ch.is_alphanumeric()
}

// ═══════════════════════════════════════════════════════════════════
// Read buffer
// ═══════════════════════════════════════════════════════════════════

/// Enough for two full UTF-8 scalars.
const LOOKAHEAD: usize = 8;

/// Byte lookahead over a `Read` with line/column tracking.
struct ReadBuf<R: Read> {
    reader: R,
    buf: VecDeque<u8>,
    reader_eof: bool,
    pos: Pos,
}

impl<R: Read> ReadBuf<R> {
    fn new(reader: R) -> Self {
        let mut rb = Self {
            reader,
            buf: VecDeque::with_capacity(LOOKAHEAD),
            reader_eof: false,
            pos: Pos::origin(),
        };
        rb.fill();
        rb
    }

    fn fill(&mut self) {
        let mut one = [0u8; 1];
        while !self.reader_eof && self.buf.len() < LOOKAHEAD {
            match self.reader.read(&mut one) {
                Ok(0) | Err(_) => self.reader_eof = true,
                Ok(_) => self.buf.push_back(one[0]),
            }
        }
    }

    fn peek_ahead(&self, n: usize) -> Option<u8> {
        self.buf.get(n).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.buf.pop_front()?;
        self.fill();
        self.pos.offset += 1;
        if b == b'\n' {
            self.pos.line += 1;
            self.pos.column = 1;
        } else {
            self.pos.column += 1;
        }
        Some(b)
    }

    /// Decodes the next UTF-8 scalar without consuming it. Malformed input
    /// decodes as U+FFFD with length 1.
    fn peek_char(&self) -> Option<(char, usize)> {
        let b0 = self.peek_ahead(0)?;
        let len = match b0 {
            0x00..=0x7F => return Some((b0 as char, 1)),
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => return Some((char::REPLACEMENT_CHARACTER, 1)),
        };
        let bytes: Vec<u8> = self.buf.iter().take(len).copied().collect();
        match std::str::from_utf8(&bytes).ok().and_then(|s| s.chars().next())
        {
            Some(ch) if bytes.len() == len => Some((ch, len)),
            _ => Some((char::REPLACEMENT_CHARACTER, 1)),
        }
    }

    fn advance_char(&mut self) -> Option<char> {
        let (ch, len) = self.peek_char()?;
        for _ in 0..len {
            self.advance();
        }
        Some(ch)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Lexer
// ═══════════════════════════════════════════════════════════════════

pub struct Lexer<R: Read> {
    rb: ReadBuf<R>,
    emitted_eof: bool,
}

impl<R: Read> Lexer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            rb: ReadBuf::new(reader),
            emitted_eof: false,
        }
    }
}

impl<'a> Lexer<&'a [u8]> {
    pub fn from_str(source: &'a str) -> Self {
        Self::new(source.as_bytes())
    }
}

impl<R: Read> Lexer<R> {
    fn pos(&self) -> Pos {
        self.rb.pos
    }

    fn peek(&self) -> Option<u8> {
        self.rb.peek_ahead(0)
    }

    fn peek_ahead(&self, n: usize) -> Option<u8> {
        self.rb.peek_ahead(n)
    }

    fn advance(&mut self) -> Option<u8> {
        self.rb.advance()
    }

    /// Consumes `n` bytes and returns a token of `kind` spanning them.
    fn single(&mut self, kind: TokenKind, n: usize) -> Token {
        let start = self.pos();
        let mut raw = Vec::with_capacity(n);
        for _ in 0..n {
            if let Some(b) = self.advance() {
                raw.push(b);
            }
        }
        let lexeme = String::from_utf8_lossy(&raw).into_owned();
        Token::new(kind, Span::new(start, self.pos()), lexeme)
    }

    fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r' | 0x0B | 0x0C) = self.peek() {
            self.advance();
        }
    }

    // ── Comments ──

    fn lex_line_comment(&mut self) -> Token {
        let start = self.pos();
        self.advance();
        self.advance();
        let mut text = Vec::new();
        while let Some(b) = self.peek() {
            if b == b'\n' {
                break;
            }
            text.push(b);
            self.advance();
        }
        let text = String::from_utf8_lossy(&text).into_owned();
        let raw = format!("//{text}");
        Token::new(
            TokenKind::LineComment(text),
            Span::new(start, self.pos()),
            raw,
        )
    }

    fn lex_block_comment(&mut self) -> Token {
        let start = self.pos();
        self.advance();
        self.advance();
        let mut text = Vec::new();
        let mut depth = 1usize;
        loop {
            match (self.peek(), self.peek_ahead(1)) {
                (None, _) => {
                    return Token::new(
                        TokenKind::Error("unterminated block comment".into()),
                        Span::new(start, self.pos()),
                        String::from_utf8_lossy(&text).into_owned(),
                    );
                }
                (Some(b'/'), Some(b'*')) => {
                    depth += 1;
                    text.extend_from_slice(b"/*");
                    self.advance();
                    self.advance();
                }
                (Some(b'*'), Some(b'/')) => {
                    self.advance();
                    self.advance();
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    text.extend_from_slice(b"*/");
                }
                (Some(b), _) => {
                    text.push(b);
                    self.advance();
                }
            }
        }
        let text = String::from_utf8_lossy(&text).into_owned();
        let raw = format!("/*{text}*/");
        Token::new(
            TokenKind::BlockComment(text),
            Span::new(start, self.pos()),
            raw,
        )
    }

    // ── Strings ──

    fn lex_string(&mut self) -> Token {
        let start = self.pos();
        self.advance();
        let mut value = Vec::new();
        let error = loop {
            match self.advance() {
                Some(b'"') => break None,
                Some(b'\\') => match self.advance() {
                    Some(b'n') => value.push(b'\n'),
                    Some(b't') => value.push(b'\t'),
                    Some(b'r') => value.push(b'\r'),
                    Some(b'0') => value.push(0),
                    Some(b) => value.push(b),
                    None => break Some("unterminated string escape"),
                },
                Some(b) => value.push(b),
                None => break Some("unterminated string"),
            }
        };
        let span = Span::new(start, self.pos());
        let value = String::from_utf8_lossy(&value).into_owned();
        match error {
            Some(message) => {
                Token::new(TokenKind::Error(message.into()), span, value)
            }
            None => {
                let raw = format!("{value:?}");
                Token::new(TokenKind::String(value), span, raw)
            }
        }
    }

    // ── Numbers ──

    fn take_digits(&mut self, raw: &mut String) {
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() || b == b'_' {
                raw.push(b as char);
                self.advance();
            } else {
                break;
            }
        }
    }

    /// `123`, `1_000`, `3.25`, `1e9`, `2.5e-3`.
    fn lex_number(&mut self) -> Token {
        let start = self.pos();
        let mut raw = String::new();
        self.take_digits(&mut raw);

        let mut is_float = false;
        if self.peek() == Some(b'.')
            && matches!(self.peek_ahead(1), Some(d) if d.is_ascii_digit())
        {
            is_float = true;
            raw.push('.');
            self.advance();
            self.take_digits(&mut raw);
        }

        let exponent = match (self.peek(), self.peek_ahead(1)) {
            (Some(b'e' | b'E'), Some(d)) if d.is_ascii_digit() => true,
            (Some(b'e' | b'E'), Some(b'+' | b'-')) => {
                matches!(self.peek_ahead(2), Some(d) if d.is_ascii_digit())
            }
            _ => false,
        };
        if exponent {
            is_float = true;
            for _ in 0..2 {
                if let Some(b) = self.advance() {
                    raw.push(b as char);
                }
            }
            self.take_digits(&mut raw);
        }

        let span = Span::new(start, self.pos());
        let normalized: String = raw.chars().filter(|c| *c != '_').collect();
        let kind = if is_float {
            match normalized.parse::<f64>() {
                Ok(v) => TokenKind::Float(v),
                Err(e) => TokenKind::Error(format!("invalid float: {e}")),
            }
        } else {
            match normalized.parse::<i64>() {
                Ok(v) => TokenKind::Integer(v),
                Err(e) => TokenKind::Error(format!("invalid integer: {e}")),
            }
        };
        Token::new(kind, span, raw)
    }

    // ── Words ──

    /// Identifier, reserved word, or keyword (`name:` not followed by `=`).
    fn lex_word(&mut self) -> Token {
        let start = self.pos();
        let mut raw = String::new();
        while let Some((ch, _)) = self.rb.peek_char() {
            if !is_word_char(ch) {
                break;
            }
            self.rb.advance_char();
            raw.push(ch);
        }

        if self.peek() == Some(b':') && self.peek_ahead(1) != Some(b'=') {
            self.advance();
            let span = Span::new(start, self.pos());
            let lexeme = format!("{raw}:");
            return Token::new(TokenKind::Keyword(raw), span, lexeme);
        }

        let span = Span::new(start, self.pos());
        let kind = TokenKind::reserved(&raw)
            .unwrap_or_else(|| TokenKind::Identifier(raw.clone()));
        Token::new(kind, span, raw)
    }

    fn lex_operator(&mut self) -> Token {
        let start = self.pos();
        let mut raw = String::new();
        while let Some(b) = self.peek() {
            if !is_op_char(b) {
                break;
            }
            if !raw.is_empty() {
                // `a*-1`, `!-x`: a prefix operator starts a new token
                if matches!(b, b'-' | b'!') {
                    break;
                }
                if b == b'/' && matches!(self.peek_ahead(1), Some(b'/' | b'*')) {
                    break;
                }
            }
            raw.push(b as char);
            self.advance();
        }
        let span = Span::new(start, self.pos());
        Token::new(TokenKind::Operator(raw.clone()), span, raw)
    }

    // ── Dispatch ──

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        let start = self.pos();

        let Some(b) = self.peek() else {
            self.emitted_eof = true;
            return Token::new(TokenKind::Eof, Span::point(start), "");
        };

        match b {
            b'/' if self.peek_ahead(1) == Some(b'/') => self.lex_line_comment(),
            b'/' if self.peek_ahead(1) == Some(b'*') => {
                self.lex_block_comment()
            }
            b'"' => self.lex_string(),
            b'(' => self.single(TokenKind::LParen, 1),
            b')' => self.single(TokenKind::RParen, 1),
            b'[' => self.single(TokenKind::LBracket, 1),
            b']' => self.single(TokenKind::RBracket, 1),
            b'{' => self.single(TokenKind::LBrace, 1),
            b'}' => self.single(TokenKind::RBrace, 1),
            b';' => self.single(TokenKind::Semicolon, 1),
            b',' => self.single(TokenKind::Comma, 1),
            b':' if self.peek_ahead(1) == Some(b'=') => {
                self.single(TokenKind::Assign, 2)
            }
            b':' => self.single(TokenKind::Colon, 1),
            b'0'..=b'9' => self.lex_number(),
            _ if is_op_char(b) => self.lex_operator(),
            _ => match self.rb.peek_char() {
                Some((ch, _)) if is_word_start(ch) => self.lex_word(),
                _ => {
                    let ch = self.rb.advance_char().unwrap_or('?');
                    Token::new(
                        TokenKind::Error(format!(
                            "unexpected character: {ch:?}"
                        )),
                        Span::new(start, self.pos()),
                        ch.to_string(),
                    )
                }
            },
        }
    }
}

impl<R: Read> Iterator for Lexer<R> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.emitted_eof {
            return None;
        }
        Some(self.next_token())
    }
}

// ═══════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::from_str(src)
            .map(|t| t.kind)
            .filter(|k| !matches!(k, TokenKind::Eof))
            .collect()
    }

    fn ident(s: &str) -> TokenKind {
        TokenKind::Identifier(s.into())
    }

    fn kw(s: &str) -> TokenKind {
        TokenKind::Keyword(s.into())
    }

    fn op(s: &str) -> TokenKind {
        TokenKind::Operator(s.into())
    }

    #[test]
    fn lex_numbers() {
        assert_eq!(
            kinds("42 1_000 3.25 1e3 2.5e-1"),
            vec![
                TokenKind::Integer(42),
                TokenKind::Integer(1000),
                TokenKind::Float(3.25),
                TokenKind::Float(1000.0),
                TokenKind::Float(0.25),
            ]
        );
    }

    #[test]
    fn minus_is_always_an_operator() {
        assert_eq!(kinds("-7"), vec![op("-"), TokenKind::Integer(7)]);
        assert_eq!(
            kinds("a-1"),
            vec![ident("a"), op("-"), TokenKind::Integer(1)]
        );
    }

    #[test]
    fn integer_overflow_is_an_error() {
        let ks = kinds("99999999999999999999");
        assert!(matches!(ks[0], TokenKind::Error(_)));
    }

    #[test]
    fn lex_string_escapes() {
        assert_eq!(
            kinds(r#""a\n\"b\"""#),
            vec![TokenKind::String("a\n\"b\"".into())]
        );
        assert_eq!(kinds("\"héllo\""), vec![TokenKind::String("héllo".into())]);
    }

    #[test]
    fn unterminated_string() {
        assert!(matches!(kinds("\"abc")[0], TokenKind::Error(_)));
    }

    #[test]
    fn keywords_and_assign() {
        assert_eq!(
            kinds("at: x:=1 y := 2"),
            vec![
                kw("at"),
                ident("x"),
                TokenKind::Assign,
                TokenKind::Integer(1),
                ident("y"),
                TokenKind::Assign,
                TokenKind::Integer(2),
            ]
        );
    }

    #[test]
    fn reserved_words() {
        assert_eq!(
            kinds("let var set on else do if then self true false"),
            vec![
                TokenKind::Let,
                TokenKind::Var,
                TokenKind::Set,
                TokenKind::On,
                TokenKind::Else,
                TokenKind::Do,
                TokenKind::If,
                TokenKind::Then,
                TokenKind::SelfKw,
                TokenKind::True,
                TokenKind::False,
            ]
        );
        // a reserved word followed by a colon is an ordinary key
        assert_eq!(kinds("if:"), vec![kw("if")]);
    }

    #[test]
    fn message_keys() {
        assert_eq!(
            kinds("{: x +: 1 ->count: f}"),
            vec![
                TokenKind::LBrace,
                TokenKind::Colon,
                ident("x"),
                op("+"),
                TokenKind::Colon,
                TokenKind::Integer(1),
                op("->"),
                kw("count"),
                ident("f"),
                TokenKind::RBrace,
            ]
        );
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds("== != <= ++ ?? && || !"),
            vec![
                op("=="),
                op("!="),
                op("<="),
                op("++"),
                op("??"),
                op("&&"),
                op("||"),
                op("!"),
            ]
        );
    }

    #[test]
    fn prefix_operators_split_runs() {
        assert_eq!(
            kinds("a*-1 !-x b!=-2 ->"),
            vec![
                ident("a"),
                op("*"),
                op("-"),
                TokenKind::Integer(1),
                op("!"),
                op("-"),
                ident("x"),
                ident("b"),
                op("!="),
                op("-"),
                TokenKind::Integer(2),
                op("->"),
            ]
        );
    }

    #[test]
    fn comments() {
        assert_eq!(
            kinds("a // rest\nb /* x /* y */ z */ c"),
            vec![
                ident("a"),
                TokenKind::LineComment(" rest".into()),
                ident("b"),
                TokenKind::BlockComment(" x /* y */ z ".into()),
                ident("c"),
            ]
        );
        assert!(matches!(kinds("/* open")[0], TokenKind::Error(_)));
    }

    #[test]
    fn slash_before_comment() {
        assert_eq!(
            kinds("a +// c"),
            vec![ident("a"), op("+"), TokenKind::LineComment(" c".into())]
        );
    }

    #[test]
    fn span_tracking() {
        let toks: Vec<Token> = Lexer::from_str("let\n  x").collect();
        assert_eq!(toks[1].span.start, Pos::new(6, 2, 3));
        assert_eq!(toks[1].span.end, Pos::new(7, 2, 4));
    }

    #[test]
    fn unicode_identifiers() {
        assert_eq!(kinds("größe"), vec![ident("größe")]);
        assert!(matches!(kinds("§")[0], TokenKind::Error(_)));
    }

    #[test]
    fn lex_from_cursor() {
        let lexer = Lexer::new(Cursor::new(b"x{y}".to_vec()));
        let ks: Vec<TokenKind> = lexer.map(|t| t.kind).collect();
        assert_eq!(
            ks,
            vec![
                ident("x"),
                TokenKind::LBrace,
                ident("y"),
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }
}
