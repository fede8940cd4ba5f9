use std::collections::VecDeque;
use std::mem::discriminant;

use crate::ast::{
    Arg, Expr, ExprKind, HandlerDecl, HandlerKind, Message, Pair, Param,
    ParamPair, Params, Stmt, StmtKind,
};
use crate::span::{Pos, Span};
use crate::token::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.message, self.span)
    }
}

impl std::error::Error for ParseError {}

static EOF: TokenKind = TokenKind::Eof;

/// Binding power of infix operators; `??` is handled above this table.
fn binary_precedence(op: &str) -> Option<u8> {
    match op {
        "||" => Some(1),
        "&&" => Some(2),
        "==" | "!=" | "<" | "<=" | ">" | ">=" => Some(3),
        "+" | "-" | "++" => Some(4),
        "*" | "/" | "%" => Some(5),
        _ => None,
    }
}

/// Recursive-descent parser over a token stream.
///
/// The parser is itself an [`Iterator`] over top-level statements. After
/// the first error it yields nothing more.
pub struct Parser<I: Iterator<Item = Token>> {
    tokens: I,
    lookahead: VecDeque<Token>,
    last_span: Span,
    failed: bool,
}

impl<I: Iterator<Item = Token>> Parser<I> {
    pub fn new(tokens: I) -> Self {
        Self {
            tokens,
            lookahead: VecDeque::new(),
            last_span: Span::point(Pos::origin()),
            failed: false,
        }
    }

    // ── Token plumbing ──

    /// Buffers at least `n + 1` significant tokens. Comments are dropped.
    fn fill(&mut self, n: usize) {
        while self.lookahead.len() <= n {
            match self.tokens.next() {
                Some(tok) if tok.is_comment() => {}
                Some(tok) => self.lookahead.push_back(tok),
                None => {
                    let end = self
                        .lookahead
                        .back()
                        .map_or(self.last_span.end, |t| t.span.end);
                    self.lookahead.push_back(Token::new(
                        TokenKind::Eof,
                        Span::point(end),
                        "",
                    ));
                }
            }
        }
    }

    fn peek_token(&mut self, n: usize) -> Option<&Token> {
        self.fill(n);
        self.lookahead.get(n)
    }

    fn peek_nth(&mut self, n: usize) -> &TokenKind {
        self.peek_token(n).map_or(&EOF, |t| &t.kind)
    }

    fn peek_kind(&mut self) -> &TokenKind {
        self.peek_nth(0)
    }

    fn peek_span(&mut self) -> Span {
        let fallback = self.last_span;
        self.peek_token(0).map_or(fallback, |t| t.span)
    }

    fn advance(&mut self) -> Token {
        self.fill(0);
        match self.lookahead.pop_front() {
            Some(tok) => {
                self.last_span = tok.span;
                tok
            }
            None => Token::new(TokenKind::Eof, self.last_span, ""),
        }
    }

    fn check(&mut self, kind: &TokenKind) -> bool {
        discriminant(self.peek_kind()) == discriminant(kind)
    }

    fn check_operator(&mut self, op: &str) -> bool {
        matches!(self.peek_kind(), TokenKind::Operator(o) if o == op)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(kind.name()))
        }
    }

    fn unexpected(&mut self, wanted: &str) -> ParseError {
        let span = self.peek_span();
        match self.peek_kind() {
            TokenKind::Error(message) => ParseError::new(message.clone(), span),
            found => ParseError::new(
                format!("expected {wanted}, found {}", found.name()),
                span,
            ),
        }
    }

    // ── Keys ──

    /// Whether the next tokens start a message or parameter key.
    fn at_key(&mut self) -> bool {
        match self.peek_nth(0).clone() {
            TokenKind::Keyword(_) | TokenKind::Colon => true,
            TokenKind::Operator(op) if op == "->" => {
                matches!(self.peek_nth(1), TokenKind::Keyword(_))
            }
            TokenKind::Operator(_) => {
                matches!(self.peek_nth(1), TokenKind::Colon)
            }
            _ => false,
        }
    }

    /// `name:`, `:`, `+:`, or `->name:`.
    fn parse_key(&mut self) -> Result<(String, Span), ParseError> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Keyword(key) => Ok((key, tok.span)),
            TokenKind::Colon => Ok((String::new(), tok.span)),
            TokenKind::Operator(op) if op == "->" => {
                let next = self.advance();
                match next.kind {
                    TokenKind::Keyword(key) => {
                        Ok((format!("->{key}"), tok.span.merge(next.span)))
                    }
                    other => Err(ParseError::new(
                        format!("expected keyword after `->`, found {}", other.name()),
                        next.span,
                    )),
                }
            }
            TokenKind::Operator(op) => {
                let colon = self.expect(&TokenKind::Colon)?;
                Ok((op, tok.span.merge(colon.span)))
            }
            other => Err(ParseError::new(
                format!("expected message key, found {}", other.name()),
                tok.span,
            )),
        }
    }

    /// A single bare word directly followed by `close`, e.g. `{next}` or
    /// `[none]`. Reserved words count, so `{true}` is a key.
    fn key_only(&mut self, close: &TokenKind) -> Option<String> {
        if discriminant(self.peek_nth(1)) != discriminant(close) {
            return None;
        }
        let tok = self.peek_token(0)?;
        match &tok.kind {
            TokenKind::Identifier(s) | TokenKind::Operator(s) => Some(s.clone()),
            _ if TokenKind::reserved(&tok.lexeme).is_some() => {
                Some(tok.lexeme.clone())
            }
            _ => None,
        }
    }

    /// Whether a key just read has no value (a pun).
    fn at_pun(&mut self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::RBrace
                | TokenKind::RBracket
                | TokenKind::Semicolon
                | TokenKind::Comma
                | TokenKind::On
                | TokenKind::Else
        ) || self.at_key()
    }

    // ── Messages and parameters ──

    fn parse_message(&mut self) -> Result<(Message, Span), ParseError> {
        let open = self.expect(&TokenKind::LBrace)?;
        if self.check(&TokenKind::RBrace) {
            let close = self.advance();
            return Ok((Message::Key(String::new()), open.span.merge(close.span)));
        }
        if let Some(key) = self.key_only(&TokenKind::RBrace) {
            self.advance();
            let close = self.advance();
            return Ok((Message::Key(key), open.span.merge(close.span)));
        }
        let mut pairs = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            pairs.push(self.parse_pair()?);
            self.eat(&TokenKind::Comma);
        }
        let close = self.expect(&TokenKind::RBrace)?;
        Ok((Message::Pairs(pairs), open.span.merge(close.span)))
    }

    fn parse_pair(&mut self) -> Result<Pair, ParseError> {
        if !self.at_key() {
            return Err(self.unexpected("message key"));
        }
        let (key, key_span) = self.parse_key()?;
        let value = if self.at_pun() {
            if key.is_empty() {
                return Err(ParseError::new(
                    "positional key needs a value",
                    key_span,
                ));
            }
            Arg::Pun
        } else if self.eat(&TokenKind::Var) {
            Arg::Var(self.parse_postfix()?)
        } else {
            Arg::Expr(self.parse_expression()?)
        };
        Ok(Pair {
            key,
            value,
            span: key_span.merge(self.last_span),
        })
    }

    fn parse_params(&mut self) -> Result<Params, ParseError> {
        self.expect(&TokenKind::LBrace)?;
        if self.eat(&TokenKind::RBrace) {
            return Ok(Params::Key(String::new()));
        }
        if let Some(key) = self.key_only(&TokenKind::RBrace) {
            self.advance();
            self.advance();
            return Ok(Params::Key(key));
        }
        let mut pairs = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            pairs.push(self.parse_param_pair()?);
            self.eat(&TokenKind::Comma);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Params::Pairs(pairs))
    }

    fn parse_param_pair(&mut self) -> Result<ParamPair, ParseError> {
        if !self.at_key() {
            return Err(self.unexpected("parameter key"));
        }
        let (key, key_span) = self.parse_key()?;
        let param = if self.check(&TokenKind::RBrace) || self.at_key() {
            if key.is_empty() {
                return Err(ParseError::new(
                    "positional parameter needs a name",
                    key_span,
                ));
            }
            Param::Pun
        } else if self.eat(&TokenKind::Var) {
            Param::Var(self.parse_primary()?)
        } else if self.eat(&TokenKind::Do) {
            Param::Do(self.parse_primary()?)
        } else {
            let binding = self.parse_unary()?;
            if self.eat(&TokenKind::Assign) {
                Param::Default {
                    binding,
                    default: self.parse_expression()?,
                }
            } else {
                Param::Binding(binding)
            }
        };
        Ok(ParamPair {
            key,
            param,
            span: key_span.merge(self.last_span),
        })
    }

    fn parse_handler(&mut self) -> Result<HandlerDecl, ParseError> {
        let tok = self.advance();
        let kind = match tok.kind {
            TokenKind::On => HandlerKind::On,
            TokenKind::Else => HandlerKind::Else,
            other => {
                return Err(ParseError::new(
                    format!("expected `on` or `else`, found {}", other.name()),
                    tok.span,
                ));
            }
        };
        let params = if kind == HandlerKind::On || self.check(&TokenKind::LBrace)
        {
            Some(self.parse_params()?)
        } else {
            None
        };
        let body = self.parse_expression()?;
        Ok(HandlerDecl {
            kind,
            params,
            span: tok.span.merge(body.span),
            body,
        })
    }

    /// Handlers until `]`; `;` and `,` separate entries.
    fn parse_handler_list(&mut self) -> Result<Vec<HandlerDecl>, ParseError> {
        let mut handlers = Vec::new();
        loop {
            match self.peek_kind() {
                TokenKind::RBracket => break,
                TokenKind::Semicolon | TokenKind::Comma => {
                    self.advance();
                }
                TokenKind::On | TokenKind::Else => {
                    handlers.push(self.parse_handler()?)
                }
                _ => return Err(self.unexpected("`on` or `else`")),
            }
        }
        Ok(handlers)
    }

    // ── Expressions ──

    /// `binary ['??' binary]`
    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_binary(1)?;
        if !self.check_operator("??") {
            return Ok(lhs);
        }
        let op_span = self.advance().span;
        let rhs = self.parse_binary(1)?;
        let span = lhs.span.merge(rhs.span);
        match lhs.kind {
            ExprKind::Send { target, message } => Ok(Expr::new(
                ExprKind::TrySend {
                    target,
                    message,
                    or_else: Box::new(rhs),
                },
                span,
            )),
            _ => Err(ParseError::new(
                "`??` needs a message send on its left",
                op_span,
            )),
        }
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            // `+:` or `->k:` starts the next pair, not an operand.
            if self.at_key() {
                break;
            }
            let (op, prec) = match self.peek_kind() {
                TokenKind::Operator(op) => match binary_precedence(op) {
                    Some(prec) if prec >= min_prec => (op.clone(), prec),
                    _ => break,
                },
                _ => break,
            };
            self.advance();
            let rhs = self.parse_binary(prec + 1)?;
            let span = lhs.span.merge(rhs.span);
            lhs = Expr::new(
                ExprKind::BinaryOp {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            TokenKind::Operator(op) if op == "-" || op == "!" => op.clone(),
            _ => return self.parse_postfix(),
        };
        let op_span = self.advance().span;
        if op == "-" {
            let literal = match self.peek_kind() {
                TokenKind::Integer(v) => Some(ExprKind::Integer(-*v)),
                TokenKind::Float(v) => Some(ExprKind::Float(-*v)),
                _ => None,
            };
            if let Some(kind) = literal {
                let tok = self.advance();
                let literal = Expr::new(kind, op_span.merge(tok.span));
                return self.parse_sends(literal);
            }
        }
        let operand = self.parse_unary()?;
        let span = op_span.merge(operand.span);
        Ok(Expr::new(
            ExprKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let primary = self.parse_primary()?;
        self.parse_sends(primary)
    }

    fn parse_sends(&mut self, mut expr: Expr) -> Result<Expr, ParseError> {
        while self.check(&TokenKind::LBrace) {
            let (message, span) = self.parse_message()?;
            let span = expr.span.merge(span);
            expr = Expr::new(
                ExprKind::Send {
                    target: Box::new(expr),
                    message,
                },
                span,
            );
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let kind = match self.peek_kind().clone() {
            TokenKind::Integer(v) => ExprKind::Integer(v),
            TokenKind::Float(v) => ExprKind::Float(v),
            TokenKind::String(s) => ExprKind::String(s),
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::SelfKw => ExprKind::SelfRef,
            TokenKind::Identifier(name) => ExprKind::Ident(name),
            TokenKind::LParen => return self.parse_parens(),
            TokenKind::LBracket => return self.parse_bracket(),
            TokenKind::Do => return self.parse_do(),
            TokenKind::If => return self.parse_if(),
            _ => return Err(self.unexpected("expression")),
        };
        let tok = self.advance();
        Ok(Expr::new(kind, tok.span))
    }

    fn parse_parens(&mut self) -> Result<Expr, ParseError> {
        let open = self.expect(&TokenKind::LParen)?;
        if self.check(&TokenKind::RParen) {
            let close = self.advance();
            return Ok(Expr::new(ExprKind::Unit, open.span.merge(close.span)));
        }
        let stmts = self.parse_statements_until(&TokenKind::RParen)?;
        let close = self.expect(&TokenKind::RParen)?;
        Ok(Expr::new(
            ExprKind::Parens(stmts),
            open.span.merge(close.span),
        ))
    }

    /// `[...]`: a frame when there are no handlers, an object otherwise.
    fn parse_bracket(&mut self) -> Result<Expr, ParseError> {
        let open = self.expect(&TokenKind::LBracket)?;
        if self.check(&TokenKind::RBracket) {
            let close = self.advance();
            return Ok(Expr::new(
                ExprKind::Frame(Message::Key(String::new())),
                open.span.merge(close.span),
            ));
        }
        if let Some(key) = self.key_only(&TokenKind::RBracket) {
            self.advance();
            let close = self.advance();
            return Ok(Expr::new(
                ExprKind::Frame(Message::Key(key)),
                open.span.merge(close.span),
            ));
        }

        let mut fields = Vec::new();
        let mut handlers = Vec::new();
        loop {
            match self.peek_kind().clone() {
                TokenKind::RBracket => break,
                TokenKind::Semicolon | TokenKind::Comma => {
                    self.advance();
                }
                TokenKind::On | TokenKind::Else => {
                    handlers.push(self.parse_handler()?)
                }
                _ if self.at_key() => fields.push(self.parse_pair()?),
                _ => return Err(self.unexpected("field, `on`, or `else`")),
            }
        }
        let close = self.expect(&TokenKind::RBracket)?;
        let span = open.span.merge(close.span);
        let kind = if handlers.is_empty() {
            ExprKind::Frame(Message::Pairs(fields))
        } else {
            ExprKind::Object { fields, handlers }
        };
        Ok(Expr::new(kind, span))
    }

    fn parse_do(&mut self) -> Result<Expr, ParseError> {
        let start = self.expect(&TokenKind::Do)?.span;
        let handlers = if self.check(&TokenKind::LBrace) {
            let params = self.parse_params()?;
            let body = self.parse_expression()?;
            vec![HandlerDecl {
                kind: HandlerKind::On,
                params: Some(params),
                span: start.merge(body.span),
                body,
            }]
        } else if self.check(&TokenKind::LBracket)
            && matches!(self.peek_nth(1), TokenKind::On | TokenKind::Else)
        {
            self.advance();
            let handlers = self.parse_handler_list()?;
            self.expect(&TokenKind::RBracket)?;
            handlers
        } else {
            let body = self.parse_expression()?;
            vec![HandlerDecl {
                kind: HandlerKind::On,
                params: Some(Params::Key(String::new())),
                span: start.merge(body.span),
                body,
            }]
        };
        Ok(Expr::new(
            ExprKind::Do(handlers),
            start.merge(self.last_span),
        ))
    }

    fn parse_if(&mut self) -> Result<Expr, ParseError> {
        let start = self.expect(&TokenKind::If)?.span;
        let cond = self.parse_expression()?;
        self.expect(&TokenKind::Then)?;
        let then_branch = self.parse_expression()?;
        let else_branch = if self.eat(&TokenKind::Else) {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        Ok(Expr::new(
            ExprKind::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch,
            },
            start.merge(self.last_span),
        ))
    }

    // ── Statements ──

    fn parse_statements_until(
        &mut self,
        close: &TokenKind,
    ) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            while self.eat(&TokenKind::Semicolon) {}
            if self.check(close) {
                break;
            }
            stmts.push(self.parse_statement()?);
            if !self.check(close) {
                self.expect(&TokenKind::Semicolon)?;
            }
        }
        Ok(stmts)
    }

    fn parse_binding_assign(&mut self) -> Result<(Expr, Expr), ParseError> {
        let binding = self.parse_unary()?;
        self.expect(&TokenKind::Assign)?;
        let value = self.parse_expression()?;
        Ok((binding, value))
    }

    pub fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let start = self.peek_span();
        let kind = match self.peek_kind().clone() {
            TokenKind::Let => {
                self.advance();
                let (binding, value) = self.parse_binding_assign()?;
                StmtKind::Let { binding, value }
            }
            TokenKind::Var => {
                self.advance();
                let (binding, value) = self.parse_binding_assign()?;
                StmtKind::Var { binding, value }
            }
            TokenKind::Set => {
                self.advance();
                StmtKind::SetInPlace(self.parse_postfix()?)
            }
            TokenKind::Import => {
                self.advance();
                let binding = self.parse_unary()?;
                self.expect(&TokenKind::From)?;
                let tok = self.advance();
                match tok.kind {
                    TokenKind::String(module) => {
                        StmtKind::Import { binding, module }
                    }
                    other => {
                        return Err(ParseError::new(
                            format!("expected module name string, found {}", other.name()),
                            tok.span,
                        ));
                    }
                }
            }
            TokenKind::Provide => {
                self.advance();
                StmtKind::Provide(self.parse_message()?.0)
            }
            TokenKind::Using => {
                self.advance();
                StmtKind::Using(self.parse_message()?.0)
            }
            TokenKind::Return => {
                self.advance();
                StmtKind::Return(self.parse_expression()?)
            }
            TokenKind::Defer => {
                self.advance();
                StmtKind::Defer(self.parse_expression()?)
            }
            _ => {
                let expr = self.parse_expression()?;
                if self.eat(&TokenKind::Assign) {
                    StmtKind::Set {
                        target: expr,
                        value: self.parse_expression()?,
                    }
                } else {
                    StmtKind::Expr(expr)
                }
            }
        };
        Ok(Stmt::new(kind, start.merge(self.last_span)))
    }
}

impl<I: Iterator<Item = Token>> Iterator for Parser<I> {
    type Item = Result<Stmt, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while self.eat(&TokenKind::Semicolon) {}
        if self.check(&TokenKind::Eof) {
            return None;
        }
        let result = match self.parse_statement() {
            Ok(stmt) if self.check(&TokenKind::Eof) => Ok(stmt),
            Ok(stmt) => self.expect(&TokenKind::Semicolon).map(|_| stmt),
            Err(err) => Err(err),
        };
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> Vec<Stmt> {
        Parser::new(Lexer::from_str(src))
            .collect::<Result<Vec<_>, _>>()
            .unwrap_or_else(|e| panic!("parse failed: {e}"))
    }

    fn parse_err(src: &str) -> ParseError {
        Parser::new(Lexer::from_str(src))
            .find_map(Result::err)
            .expect("expected a parse error")
    }

    fn expr(src: &str) -> ExprKind {
        let mut stmts = parse(src);
        assert_eq!(stmts.len(), 1);
        match stmts.remove(0).kind {
            StmtKind::Expr(e) => e.kind,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    fn ident(e: &Expr) -> &str {
        match &e.kind {
            ExprKind::Ident(name) => name,
            other => panic!("expected identifier, got {other:?}"),
        }
    }

    #[test]
    fn literals() {
        assert_eq!(expr("42"), ExprKind::Integer(42));
        assert_eq!(expr("-42"), ExprKind::Integer(-42));
        assert_eq!(expr("-2.5"), ExprKind::Float(-2.5));
        assert_eq!(expr("\"hi\""), ExprKind::String("hi".into()));
        assert_eq!(expr("true"), ExprKind::Bool(true));
        assert_eq!(expr("()"), ExprKind::Unit);
        assert_eq!(expr("self"), ExprKind::SelfRef);
    }

    #[test]
    fn key_only_and_blank_sends() {
        let ExprKind::Send { target, message } = expr("x{next}") else {
            panic!("expected send");
        };
        assert_eq!(ident(&target), "x");
        assert_eq!(message, Message::Key("next".into()));

        let ExprKind::Send { message, .. } = expr("f{}") else {
            panic!("expected send");
        };
        assert_eq!(message, Message::Key(String::new()));
    }

    #[test]
    fn pair_sends_with_all_key_forms() {
        let ExprKind::Send { message, .. } =
            expr("p{: 1 x: 2 +: 3 ->y: f z: var v w:}")
        else {
            panic!("expected send");
        };
        let Message::Pairs(pairs) = message else {
            panic!("expected pairs");
        };
        let keys: Vec<&str> = pairs.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["", "x", "+", "->y", "z", "w"]);
        assert!(matches!(pairs[4].value, Arg::Var(_)));
        assert_eq!(pairs[5].value, Arg::Pun);
    }

    #[test]
    fn operator_key_ends_the_previous_value() {
        let ExprKind::Send { message, .. } = expr("p{x: 2 + 1 -: 3 * 4 ->y: f}") else {
            panic!("expected send");
        };
        let Message::Pairs(pairs) = message else {
            panic!("expected pairs");
        };
        let keys: Vec<&str> = pairs.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["x", "-", "->y"]);
        let Arg::Expr(ref value) = pairs[0].value else {
            panic!("expected expression");
        };
        assert!(matches!(value.kind, ExprKind::BinaryOp { ref op, .. } if op == "+"));
        let Arg::Expr(ref value) = pairs[1].value else {
            panic!("expected expression");
        };
        assert!(matches!(value.kind, ExprKind::BinaryOp { ref op, .. } if op == "*"));
    }

    #[test]
    fn chained_sends() {
        let ExprKind::Send { target, message } = expr("a{b}{c: 1}") else {
            panic!("expected send");
        };
        assert!(matches!(target.kind, ExprKind::Send { .. }));
        assert!(matches!(message, Message::Pairs(_)));
    }

    #[test]
    fn binary_precedence_and_associativity() {
        let ExprKind::BinaryOp { op, lhs, rhs } = expr("1 + 2 * 3 - 4") else {
            panic!("expected binary op");
        };
        assert_eq!(op, "-");
        assert_eq!(rhs.kind, ExprKind::Integer(4));
        let ExprKind::BinaryOp { op, rhs, .. } = lhs.kind else {
            panic!("expected binary op");
        };
        assert_eq!(op, "+");
        assert!(matches!(rhs.kind, ExprKind::BinaryOp { ref op, .. } if op == "*"));

        let ExprKind::BinaryOp { op, .. } = expr("a < b && c || d") else {
            panic!("expected binary op");
        };
        assert_eq!(op, "||");
    }

    #[test]
    fn unary_operators() {
        let ExprKind::UnaryOp { op, operand } = expr("!-x") else {
            panic!("expected unary");
        };
        assert_eq!(op, "!");
        assert!(matches!(operand.kind, ExprKind::UnaryOp { ref op, .. } if op == "-"));
        // folded literal still accepts messages
        assert!(matches!(expr("-1{abs}"), ExprKind::Send { .. }));
    }

    #[test]
    fn try_send() {
        let ExprKind::TrySend { or_else, .. } = expr("a{b} ?? 1 + 2") else {
            panic!("expected try-send");
        };
        assert!(matches!(or_else.kind, ExprKind::BinaryOp { .. }));
        let err = parse_err("a ?? b");
        assert!(err.message.contains("??"));
    }

    #[test]
    fn frames_and_objects() {
        assert_eq!(
            expr("[]"),
            ExprKind::Frame(Message::Key(String::new()))
        );
        assert_eq!(expr("[none]"), ExprKind::Frame(Message::Key("none".into())));
        let ExprKind::Frame(Message::Pairs(pairs)) = expr("[x: 1, y: 2]") else {
            panic!("expected frame");
        };
        assert_eq!(pairs.len(), 2);

        let ExprKind::Object { fields, handlers } =
            expr("[n: 1; on {get} n; on {add: x} n + x; else 0]")
        else {
            panic!("expected object");
        };
        assert_eq!(fields.len(), 1);
        assert_eq!(handlers.len(), 3);
        assert_eq!(handlers[2].kind, HandlerKind::Else);
        assert!(handlers[2].params.is_none());
        assert_eq!(handlers[0].params, Some(Params::Key("get".into())));
    }

    #[test]
    fn handler_parameters() {
        let ExprKind::Object { handlers, .. } = expr(
            "[on {a: x b: var y c: do f d: e := 1 fib: 0 p: [x: q] k:} 0; else {: m} m]",
        ) else {
            panic!("expected object");
        };
        let Some(Params::Pairs(params)) = &handlers[0].params else {
            panic!("expected parameter pairs");
        };
        assert!(matches!(params[0].param, Param::Binding(_)));
        assert!(matches!(params[1].param, Param::Var(_)));
        assert!(matches!(params[2].param, Param::Do(_)));
        assert!(matches!(params[3].param, Param::Default { .. }));
        assert!(matches!(
            params[4].param,
            Param::Binding(Expr { kind: ExprKind::Integer(0), .. })
        ));
        assert!(matches!(
            params[5].param,
            Param::Binding(Expr { kind: ExprKind::Frame(_), .. })
        ));
        assert_eq!(params[6].param, Param::Pun);
        let Some(Params::Pairs(else_params)) = &handlers[1].params else {
            panic!("expected else parameters");
        };
        assert_eq!(else_params[0].key, "");
    }

    #[test]
    fn reserved_word_as_key() {
        let ExprKind::Send { message, .. } =
            expr("b{: do [on {true} 1; on {false} 0]}")
        else {
            panic!("expected send");
        };
        let Message::Pairs(pairs) = message else {
            panic!("expected pairs");
        };
        let Arg::Expr(Expr { kind: ExprKind::Do(handlers), .. }) = &pairs[0].value
        else {
            panic!("expected do literal");
        };
        assert_eq!(handlers[0].params, Some(Params::Key("true".into())));
        assert_eq!(handlers[1].params, Some(Params::Key("false".into())));
    }

    #[test]
    fn do_literal_forms() {
        let ExprKind::Send { message: Message::Pairs(pairs), .. } =
            expr("xs{each: do {: x} x z: do 1}")
        else {
            panic!("expected send");
        };
        let Arg::Expr(Expr { kind: ExprKind::Do(hs), .. }) = &pairs[1].value
        else {
            panic!("expected do literal");
        };
        assert_eq!(hs[0].params, Some(Params::Key(String::new())));
    }

    #[test]
    fn if_expression() {
        let ExprKind::If { else_branch, .. } = expr("if a then 1 else 2") else {
            panic!("expected if");
        };
        assert!(else_branch.is_some());
    }

    #[test]
    fn statements() {
        let stmts = parse(
            "let [x: a y:] := p; var n := 0; n := n + 1; set n{+: 1}; \
             import [print:] from \"core\"; provide {depth: 1}; using {depth}; \
             defer print{: 1}; return n",
        );
        let kinds: Vec<&StmtKind> = stmts.iter().map(|s| &s.kind).collect();
        assert!(matches!(kinds[0], StmtKind::Let { binding: Expr { kind: ExprKind::Frame(_), .. }, .. }));
        assert!(matches!(kinds[1], StmtKind::Var { .. }));
        assert!(matches!(kinds[2], StmtKind::Set { .. }));
        assert!(matches!(kinds[3], StmtKind::SetInPlace(_)));
        assert!(matches!(kinds[4], StmtKind::Import { module, .. } if module == "core"));
        assert!(matches!(kinds[5], StmtKind::Provide(Message::Pairs(_))));
        assert!(matches!(kinds[6], StmtKind::Using(Message::Key(_))));
        assert!(matches!(kinds[7], StmtKind::Defer(_)));
        assert!(matches!(kinds[8], StmtKind::Return(_)));
    }

    #[test]
    fn parens_block() {
        let ExprKind::Parens(stmts) = expr("(let a := 1; a + 1;)") else {
            panic!("expected parens");
        };
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn comments_are_skipped() {
        let stmts = parse("// leading\nlet a := /* inline */ 1; a");
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn missing_separator_is_an_error() {
        let err = parse_err("a b");
        assert!(err.message.contains("`;`"), "{}", err.message);
    }

    #[test]
    fn lexer_errors_surface() {
        let err = parse_err("let s := \"open");
        assert_eq!(err.message, "unterminated string");
    }

    #[test]
    fn stops_after_first_error() {
        let results: Vec<_> = Parser::new(Lexer::from_str("a b; c d")).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn error_positions() {
        let err = parse_err("let x := 1;\nlet := 2");
        assert_eq!(err.span.start.line, 2);
    }
}
