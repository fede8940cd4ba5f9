//! # Parser
//!
//! Streaming lexer and recursive-descent parser for Courier source.
//!
//! ```text
//!  impl Read (file, &[u8], …)
//!      │
//!      ▼
//!  ┌────────┐    Token stream     ┌────────┐    Stmt stream
//!  │ Lexer  │ ──────────────────▶ │ Parser │ ──────────────────▶
//!  └────────┘  (impl Iterator)    └────────┘  (impl Iterator)
//! ```
//!
//! ```rust
//! use parser::{Lexer, Parser};
//!
//! let parser = Parser::new(Lexer::from_str("let x := 1; x + 2"));
//! for result in parser {
//!     match result {
//!         Ok(stmt) => println!("{:?}", stmt.kind),
//!         Err(err) => eprintln!("parse error: {err}"),
//!     }
//! }
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod token;

pub use ast::{
    Arg, Expr, ExprKind, HandlerDecl, HandlerKind, Message, Pair, Param,
    ParamPair, Params, Stmt, StmtKind,
};
pub use lexer::Lexer;
pub use parser::{ParseError, Parser};
pub use span::{Pos, Span};
pub use token::{Token, TokenKind};

/// Parses a whole program held in memory.
pub fn parse_source(source: &str) -> Result<Vec<Stmt>, ParseError> {
    Parser::new(Lexer::from_str(source)).collect()
}
