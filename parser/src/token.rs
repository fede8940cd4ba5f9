//! Token kinds produced by the [`Lexer`](crate::Lexer).
use crate::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Integer(i64),
    Float(f64),
    /// String contents with escapes resolved.
    String(String),

    Identifier(String),
    /// An identifier immediately followed by `:`, e.g. `at:`. The text does
    /// not include the colon.
    Keyword(String),
    /// A run of operator characters, e.g. `+`, `==`, `->`, `??`.
    Operator(String),

    // ── Reserved words ──
    Let,
    Var,
    Set,
    Import,
    From,
    Provide,
    Using,
    Return,
    Defer,
    On,
    Else,
    Do,
    If,
    Then,
    SelfKw,
    True,
    False,

    /// `:=`
    Assign,
    /// A lone `:`; the positional key or the colon of an operator key.
    Colon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Semicolon,
    Comma,

    /// `// ...`, text without the leading slashes.
    LineComment(String),
    /// `/* ... */`, nestable, text without delimiters.
    BlockComment(String),

    Eof,
    Error(String),
}

impl TokenKind {
    /// Human-readable name for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Identifier(_) => "identifier",
            Self::Keyword(_) => "keyword",
            Self::Operator(_) => "operator",
            Self::Let => "`let`",
            Self::Var => "`var`",
            Self::Set => "`set`",
            Self::Import => "`import`",
            Self::From => "`from`",
            Self::Provide => "`provide`",
            Self::Using => "`using`",
            Self::Return => "`return`",
            Self::Defer => "`defer`",
            Self::On => "`on`",
            Self::Else => "`else`",
            Self::Do => "`do`",
            Self::If => "`if`",
            Self::Then => "`then`",
            Self::SelfKw => "`self`",
            Self::True => "`true`",
            Self::False => "`false`",
            Self::Assign => "`:=`",
            Self::Colon => "`:`",
            Self::LParen => "`(`",
            Self::RParen => "`)`",
            Self::LBracket => "`[`",
            Self::RBracket => "`]`",
            Self::LBrace => "`{`",
            Self::RBrace => "`}`",
            Self::Semicolon => "`;`",
            Self::Comma => "`,`",
            Self::LineComment(_) => "line comment",
            Self::BlockComment(_) => "block comment",
            Self::Eof => "end of input",
            Self::Error(_) => "error",
        }
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, Self::LineComment(_) | Self::BlockComment(_))
    }

    /// Maps a bare word to its reserved token, if it is one.
    pub fn reserved(word: &str) -> Option<TokenKind> {
        let kind = match word {
            "let" => Self::Let,
            "var" => Self::Var,
            "set" => Self::Set,
            "import" => Self::Import,
            "from" => Self::From,
            "provide" => Self::Provide,
            "using" => Self::Using,
            "return" => Self::Return,
            "defer" => Self::Defer,
            "on" => Self::On,
            "else" => Self::Else,
            "do" => Self::Do,
            "if" => Self::If,
            "then" => Self::Then,
            "self" => Self::SelfKw,
            "true" => Self::True,
            "false" => Self::False,
            _ => return None,
        };
        Some(kind)
    }
}

/// A token with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// Source text of this token.
    pub lexeme: String,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, lexeme: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            lexeme: lexeme.into(),
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    pub fn is_comment(&self) -> bool {
        self.kind.is_comment()
    }
}
