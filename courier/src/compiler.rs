//! Binding compiler: parse tree to IR.
//!
//! Resolves every identifier through [`Scope`], canonicalizes messages into
//! selectors, expands default parameters and literal guards into handler
//! candidates and builds the classes of object and do literals.
use std::rc::Rc;

use log::debug;
use parser::ast::{self, ExprKind, HandlerDecl, HandlerKind, Message, Param, ParamPair, Params, StmtKind};
use parser::Span;

use crate::error::CompileError;
use crate::frames;
use crate::ir::{
    selector_for, Arg, Body, ClassBuilder, Expr, FrameShape, Guard, Handler, IrClass, IrParam,
    Program, Send, Stmt,
};
use crate::scope::{BindingKind, Resolved, Scope};
use crate::value::Value;
use crate::VM;

type CompileResult<T> = Result<T, CompileError>;

/// Builds the error for a malformed pattern in a given position.
type InvalidPattern = fn(Span) -> CompileError;

fn invalid_let(span: Span) -> CompileError {
    CompileError::InvalidLetBinding { span }
}

fn invalid_import(span: Span) -> CompileError {
    CompileError::InvalidImportBinding { span }
}

fn invalid_param(span: Span) -> CompileError {
    CompileError::InvalidParam { span }
}

fn is_name(key: &str) -> bool {
    key.chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
}

/// Compiles one unit (a program or a module source) against `vm`, whose
/// frame cache is shared by every unit compiled with it.
pub fn compile_program(vm: &VM, stmts: &[ast::Stmt]) -> CompileResult<Program> {
    let mut compiler = Compiler::new(vm);
    let body = compiler.compile_block(stmts)?;
    let locals = compiler.scope.slot_count();
    debug!(
        "compiled {} statements into {} slots",
        stmts.len(),
        locals
    );
    Ok(Program { body, locals })
}

pub struct Compiler<'vm> {
    vm: &'vm VM,
    scope: Scope,
}

impl<'vm> Compiler<'vm> {
    pub fn new(vm: &'vm VM) -> Self {
        Self {
            vm,
            scope: Scope::new(),
        }
    }

    // ── Statements ──

    /// A statement list evaluating to its trailing expression statement, or
    /// unit when there is none.
    fn compile_block(&mut self, stmts: &[ast::Stmt]) -> CompileResult<Expr> {
        let mut out = Vec::new();
        let mut result = None;
        for (index, stmt) in stmts.iter().enumerate() {
            match &stmt.kind {
                StmtKind::Expr(expr) if index + 1 == stmts.len() => {
                    result = Some(self.compile_expr(expr)?);
                }
                _ => self.compile_stmt(stmt, &mut out)?,
            }
        }
        let result = result.unwrap_or_else(|| Expr::Constant(self.vm.unit()));
        Ok(Expr::Block {
            stmts: out,
            result: Box::new(result),
        })
    }

    fn compile_stmt(&mut self, stmt: &ast::Stmt, out: &mut Vec<Stmt>) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Let { binding, value } => {
                let value = self.compile_expr(value)?;
                self.bind_pattern(binding, value, out, invalid_let)
            }
            StmtKind::Var { binding, value } => {
                let ExprKind::Ident(name) = &binding.kind else {
                    return Err(CompileError::InvalidVarBinding { span: binding.span });
                };
                let value = self.compile_expr(value)?;
                let slot = self.scope.declare(name, BindingKind::Var)?;
                out.push(Stmt::Assign { slot, value });
                Ok(())
            }
            StmtKind::Set { target, value } => {
                let ExprKind::Ident(name) = &target.kind else {
                    return Err(CompileError::InvalidSetTarget { span: target.span });
                };
                let slot = self.scope.lookup_var_index(name, target.span)?;
                let value = self.compile_expr(value)?;
                out.push(Stmt::Assign { slot, value });
                Ok(())
            }
            StmtKind::SetInPlace(expr) => {
                let ExprKind::Send { target, .. } = &expr.kind else {
                    return Err(CompileError::InvalidSetTarget { span: expr.span });
                };
                let ExprKind::Ident(name) = &target.kind else {
                    return Err(CompileError::InvalidSetTarget { span: target.span });
                };
                let slot = self.scope.lookup_var_index(name, target.span)?;
                let value = self.compile_expr(expr)?;
                out.push(Stmt::Assign { slot, value });
                Ok(())
            }
            StmtKind::Import { binding, module } => {
                let value = Expr::Module(module.clone());
                self.bind_pattern(binding, value, out, invalid_import)
            }
            StmtKind::Provide(message) => self.compile_provide(message, stmt.span, out),
            StmtKind::Using(message) => self.compile_using(message, stmt.span, out),
            StmtKind::Return(expr) => {
                out.push(Stmt::Return(self.compile_expr(expr)?));
                Ok(())
            }
            StmtKind::Defer(expr) => {
                let deferred = vec![Stmt::Expr(self.compile_expr(expr)?)];
                out.push(Stmt::Defer(Rc::from(deferred)));
                Ok(())
            }
            StmtKind::Expr(expr) => {
                out.push(Stmt::Expr(self.compile_expr(expr)?));
                Ok(())
            }
        }
    }

    fn compile_provide(
        &mut self,
        message: &Message,
        span: Span,
        out: &mut Vec<Stmt>,
    ) -> CompileResult<()> {
        let Message::Pairs(pairs) = message else {
            return Err(CompileError::InvalidProvide { span });
        };
        for pair in sorted_pairs(pairs)? {
            if pair.key.is_empty() {
                return Err(CompileError::InvalidProvide { span: pair.span });
            }
            let value = match &pair.value {
                ast::Arg::Expr(expr) => self.compile_expr(expr)?,
                ast::Arg::Pun => self.compile_ident(&pair.key, pair.span)?,
                ast::Arg::Var(_) => return Err(CompileError::InvalidProvide { span: pair.span }),
            };
            out.push(Stmt::Provide {
                key: pair.key.clone(),
                value,
            });
        }
        Ok(())
    }

    fn compile_using(
        &mut self,
        message: &Message,
        span: Span,
        out: &mut Vec<Stmt>,
    ) -> CompileResult<()> {
        match message {
            Message::Key(key) if is_name(key) => {
                let slot = self.scope.declare(key, BindingKind::Let)?;
                out.push(Stmt::Using {
                    key: key.clone(),
                    slot,
                });
                Ok(())
            }
            Message::Pairs(pairs) => {
                for pair in sorted_pairs(pairs)? {
                    let name = match &pair.value {
                        ast::Arg::Pun if is_name(&pair.key) => pair.key.as_str(),
                        ast::Arg::Expr(ast::Expr {
                            kind: ExprKind::Ident(name),
                            ..
                        }) if !pair.key.is_empty() => name.as_str(),
                        _ => return Err(CompileError::InvalidUsing { span: pair.span }),
                    };
                    let slot = self.scope.declare(name, BindingKind::Let)?;
                    out.push(Stmt::Using {
                        key: pair.key.clone(),
                        slot,
                    });
                }
                Ok(())
            }
            Message::Key(_) => Err(CompileError::InvalidUsing { span }),
        }
    }

    // ── Patterns ──

    /// Binds `value` to a name or destructures it through a frame pattern.
    fn bind_pattern(
        &mut self,
        binding: &ast::Expr,
        value: Expr,
        out: &mut Vec<Stmt>,
        invalid: InvalidPattern,
    ) -> CompileResult<()> {
        match &binding.kind {
            ExprKind::Ident(name) => {
                let slot = self.scope.declare(name, BindingKind::Let)?;
                out.push(Stmt::Assign { slot, value });
                Ok(())
            }
            ExprKind::Frame(Message::Pairs(pairs)) => {
                let temp = self.scope.alloc_slot()?;
                out.push(Stmt::Assign { slot: temp, value });
                self.destructure(pairs, temp, out, invalid)
            }
            _ => Err(invalid(binding.span)),
        }
    }

    /// Getter sends on the hidden slot `temp`, one per pattern field.
    fn destructure(
        &mut self,
        pairs: &[ast::Pair],
        temp: usize,
        out: &mut Vec<Stmt>,
        invalid: InvalidPattern,
    ) -> CompileResult<()> {
        for pair in sorted_pairs(pairs)? {
            if !is_name(&pair.key) {
                return Err(invalid(pair.span));
            }
            let getter = Expr::Send(Box::new(Send {
                selector: pair.key.clone(),
                target: Expr::Local(temp),
                args: Vec::new(),
                or_else: None,
            }));
            match &pair.value {
                ast::Arg::Pun => {
                    let slot = self.scope.declare(&pair.key, BindingKind::Let)?;
                    out.push(Stmt::Assign {
                        slot,
                        value: getter,
                    });
                }
                ast::Arg::Expr(sub) => self.bind_pattern(sub, getter, out, invalid)?,
                ast::Arg::Var(_) => return Err(invalid(pair.span)),
            }
        }
        Ok(())
    }

    // ── Expressions ──

    fn compile_expr(&mut self, expr: &ast::Expr) -> CompileResult<Expr> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::SelfRef => Ok(Expr::SelfRef),
            ExprKind::Ident(name) => self.compile_ident(name, span),
            ExprKind::Parens(stmts) => {
                self.scope.push_level()?;
                let block = self.compile_block(stmts);
                self.scope.pop_level()?;
                block
            }
            ExprKind::Object { fields, handlers } => self.compile_object(fields, handlers, span),
            ExprKind::Frame(message) => self.compile_frame(message),
            ExprKind::Send { target, message } => self.compile_send(target, message, None, span),
            ExprKind::TrySend {
                target,
                message,
                or_else,
            } => self.compile_send(target, message, Some(or_else), span),
            ExprKind::Do(_) => Err(CompileError::InvalidDoUsage { span }),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.compile_expr(cond)?;
                let then_branch = self.compile_expr(then_branch)?;
                let else_branch = else_branch
                    .as_deref()
                    .map(|e| self.compile_expr(e))
                    .transpose()?;
                Ok(Expr::If {
                    cond: Box::new(cond),
                    then_branch: Box::new(then_branch),
                    else_branch: else_branch.map(Box::new),
                })
            }
            ExprKind::UnaryOp { op, operand } => self.compile_operator(op.clone(), operand, None),
            ExprKind::BinaryOp { op, lhs, rhs } => {
                self.compile_operator(format!("{op}:"), lhs, Some(rhs))
            }
            _ => match self.literal(expr) {
                Some(value) => Ok(Expr::Constant(value)),
                None => Err(CompileError::Unreachable(format!(
                    "unhandled expression at {span}"
                ))),
            },
        }
    }

    fn literal(&self, expr: &ast::Expr) -> Option<Value> {
        match &expr.kind {
            ExprKind::Unit => Some(self.vm.unit()),
            ExprKind::Integer(n) => Some(self.vm.int(*n)),
            ExprKind::Float(x) => Some(self.vm.float(*x)),
            ExprKind::String(s) => Some(self.vm.string(s.as_str())),
            ExprKind::Bool(b) => Some(self.vm.boolean(*b)),
            _ => None,
        }
    }

    fn compile_ident(&mut self, name: &str, span: Span) -> CompileResult<Expr> {
        match self.scope.lookup(name, span)? {
            Resolved::Ivar(index) => Ok(Expr::Ivar(index)),
            Resolved::Local(record) => match record.kind {
                BindingKind::Let => Ok(Expr::Local(record.index)),
                BindingKind::Var => {
                    self.scope.borrow_var(name, span)?;
                    Ok(Expr::Local(record.index))
                }
                BindingKind::Do => Err(CompileError::InvalidDoUsage { span }),
            },
        }
    }

    /// An expression in target or argument position, where do literals and
    /// do bindings are allowed.
    fn compile_passable(&mut self, expr: &ast::Expr) -> CompileResult<Arg> {
        match &expr.kind {
            ExprKind::Do(handlers) => Ok(Arg::Do(Expr::Do(self.compile_do(handlers, expr.span)?))),
            ExprKind::Ident(name) => match self.scope.lookup(name, expr.span)? {
                Resolved::Local(record) if record.kind == BindingKind::Do => {
                    Ok(Arg::Do(Expr::Local(record.index)))
                }
                _ => Ok(Arg::Value(self.compile_ident(name, expr.span)?)),
            },
            _ => Ok(Arg::Value(self.compile_expr(expr)?)),
        }
    }

    fn compile_target(&mut self, expr: &ast::Expr) -> CompileResult<Expr> {
        match self.compile_passable(expr)? {
            Arg::Value(target) | Arg::Do(target) => Ok(target),
            Arg::Var(_) => Err(CompileError::Unreachable("var target".into())),
        }
    }

    fn compile_arg(&mut self, pair: &ast::Pair) -> CompileResult<Arg> {
        match &pair.value {
            ast::Arg::Expr(expr) => self.compile_passable(expr),
            ast::Arg::Pun => {
                let ident = ast::Expr::new(ExprKind::Ident(pair.key.clone()), pair.span);
                self.compile_passable(&ident)
            }
            ast::Arg::Var(expr) => {
                let ExprKind::Ident(name) = &expr.kind else {
                    return Err(CompileError::InvalidVarArg { span: expr.span });
                };
                let slot = self.scope.lookup_var_index(name, expr.span)?;
                self.scope.borrow_var(name, expr.span)?;
                Ok(Arg::Var(slot))
            }
        }
    }

    // ── Sends ──

    fn compile_send(
        &mut self,
        target: &ast::Expr,
        message: &Message,
        or_else: Option<&ast::Expr>,
        span: Span,
    ) -> CompileResult<Expr> {
        if or_else.is_some()
            && matches!(target.kind, ExprKind::SelfRef)
            && self.scope.in_else_object()
        {
            return Err(CompileError::RedundantTrySend { span });
        }
        self.scope.begin_send()?;
        let parts = self.compile_send_parts(target, message);
        self.scope.end_send()?;
        let (target, selector, args) = parts?;
        let or_else = or_else.map(|e| self.compile_expr(e)).transpose()?;
        Ok(Expr::Send(Box::new(Send {
            selector,
            target,
            args,
            or_else,
        })))
    }

    fn compile_send_parts(
        &mut self,
        target: &ast::Expr,
        message: &Message,
    ) -> CompileResult<(Expr, String, Vec<Arg>)> {
        let target = self.compile_target(target)?;
        match message {
            Message::Key(key) => Ok((target, key.clone(), Vec::new())),
            Message::Pairs(pairs) => {
                let sorted = sorted_pairs(pairs)?;
                let keys: Vec<&str> = sorted.iter().map(|p| p.key.as_str()).collect();
                let selector = selector_for(&keys);
                let args = sorted
                    .into_iter()
                    .map(|pair| self.compile_arg(pair))
                    .collect::<CompileResult<Vec<_>>>()?;
                Ok((target, selector, args))
            }
        }
    }

    /// Operators are sugar: `a + b` is `a{+: b}`, `-a` is `a{-}`.
    fn compile_operator(
        &mut self,
        selector: String,
        target: &ast::Expr,
        arg: Option<&ast::Expr>,
    ) -> CompileResult<Expr> {
        self.scope.begin_send()?;
        let parts = self.compile_operator_parts(target, arg);
        self.scope.end_send()?;
        let (target, args) = parts?;
        Ok(Expr::Send(Box::new(Send {
            selector,
            target,
            args,
            or_else: None,
        })))
    }

    fn compile_operator_parts(
        &mut self,
        target: &ast::Expr,
        arg: Option<&ast::Expr>,
    ) -> CompileResult<(Expr, Vec<Arg>)> {
        let target = self.compile_target(target)?;
        let args = match arg {
            Some(arg) => vec![self.compile_passable(arg)?],
            None => Vec::new(),
        };
        Ok((target, args))
    }

    // ── Frames and objects ──

    fn compile_field(&mut self, pair: &ast::Pair) -> CompileResult<Expr> {
        if !is_name(&pair.key) {
            return Err(CompileError::InvalidFrameField { span: pair.span });
        }
        match &pair.value {
            ast::Arg::Expr(expr) => self.compile_expr(expr),
            ast::Arg::Pun => self.compile_ident(&pair.key, pair.span),
            ast::Arg::Var(_) => Err(CompileError::InvalidFrameField { span: pair.span }),
        }
    }

    fn compile_fields(&mut self, fields: &[ast::Pair]) -> CompileResult<(Vec<String>, Vec<Expr>)> {
        let mut keys = Vec::with_capacity(fields.len());
        let mut values = Vec::with_capacity(fields.len());
        for pair in sorted_pairs(fields)? {
            values.push(self.compile_field(pair)?);
            keys.push(pair.key.clone());
        }
        Ok((keys, values))
    }

    fn compile_frame(&mut self, message: &Message) -> CompileResult<Expr> {
        match message {
            Message::Key(tag) => Ok(Expr::Object {
                class: self.vm.frame_class(tag, &[]),
                ivars: Vec::new(),
            }),
            Message::Pairs(pairs) => {
                let (keys, ivars) = self.compile_fields(pairs)?;
                let class = self.vm.frame_class(&selector_for(&keys), &keys);
                Ok(Expr::Object { class, ivars })
            }
        }
    }

    fn compile_object(
        &mut self,
        fields: &[ast::Pair],
        handlers: &[HandlerDecl],
        span: Span,
    ) -> CompileResult<Expr> {
        let (keys, mut ivars) = self.compile_fields(fields)?;
        let has_else = handlers.iter().any(|h| h.kind == HandlerKind::Else);
        let mut builder = ClassBuilder::new(format!("object@{}", span.start));

        self.scope.push_instance(keys.clone(), has_else);
        let compiled = self.compile_handlers(&mut builder, handlers);
        let captures = self.scope.pop_instance()?;
        compiled?;

        if !keys.is_empty() {
            let shape = FrameShape::new(selector_for(&keys), keys);
            frames::install(&mut builder, &shape);
        }
        ivars.extend(captures);
        let class = builder.build();
        debug!(
            "compiled {} with {} ivars and selectors {:?}",
            class.name,
            ivars.len(),
            class.selectors()
        );
        Ok(Expr::Object {
            class: Rc::new(class),
            ivars,
        })
    }

    fn compile_do(&mut self, handlers: &[HandlerDecl], span: Span) -> CompileResult<Rc<IrClass>> {
        let mut builder = ClassBuilder::block(format!("do@{}", span.start));
        self.compile_handlers(&mut builder, handlers)?;
        Ok(Rc::new(builder.build()))
    }

    // ── Handlers ──

    fn compile_handlers(
        &mut self,
        builder: &mut ClassBuilder,
        handlers: &[HandlerDecl],
    ) -> CompileResult<()> {
        for decl in handlers {
            match decl.kind {
                HandlerKind::On => self.compile_on(builder, decl)?,
                HandlerKind::Else => self.compile_else(builder, decl)?,
            }
        }
        Ok(())
    }

    /// Runs `f` inside a handler's naming scope: a fresh activation for
    /// object handlers, a new level of the enclosing one for do bodies.
    fn in_handler<T>(
        &mut self,
        block: bool,
        f: impl FnOnce(&mut Self) -> CompileResult<T>,
    ) -> CompileResult<T> {
        if block {
            let saved = self.scope.enter_block()?;
            let result = f(self);
            self.scope.leave_block(saved)?;
            result
        } else {
            self.scope.push_activation();
            let result = f(self);
            self.scope.pop_activation()?;
            result
        }
    }

    fn compile_on(&mut self, builder: &mut ClassBuilder, decl: &HandlerDecl) -> CompileResult<()> {
        let block = builder.is_block();
        let params = decl
            .params
            .as_ref()
            .ok_or_else(|| CompileError::Unreachable("on handler without params".into()))?;
        let pairs = match params {
            Params::Key(key) => {
                let body = self.in_handler(block, |c| c.compile_variant(&[], &[], &decl.body))?;
                return builder.add_body(key.clone(), body, decl.span);
            }
            Params::Pairs(pairs) => pairs,
        };

        let mut keys: Vec<&ParamPair> = pairs.iter().collect();
        keys.sort_by(|a, b| a.key.cmp(&b.key));
        if let Some(dup) = keys.windows(2).find(|w| w[0].key == w[1].key) {
            return Err(CompileError::DuplicateKey {
                key: dup[1].key.clone(),
                span: dup[1].span,
            });
        }

        for variant in expand_defaults(pairs) {
            let mut present: Vec<&ParamPair> = Vec::new();
            let mut absent: Vec<&ParamPair> = Vec::new();
            for (pair, &is_present) in pairs.iter().zip(&variant) {
                if is_present {
                    present.push(pair);
                } else {
                    absent.push(pair);
                }
            }
            present.sort_by(|a, b| a.key.cmp(&b.key));
            let keys: Vec<&str> = present.iter().map(|p| p.key.as_str()).collect();
            let selector = selector_for(&keys);
            let body =
                self.in_handler(block, |c| c.compile_variant(&present, &absent, &decl.body))?;
            builder.add_body(selector, body, decl.span)?;
        }
        Ok(())
    }

    /// One handler candidate: `present` in selector order, `absent` the
    /// defaulted parameters in declaration order.
    fn compile_variant(
        &mut self,
        present: &[&ParamPair],
        absent: &[&ParamPair],
        body: &ast::Expr,
    ) -> CompileResult<Body> {
        let mut params = Vec::with_capacity(present.len());
        let mut guards = Vec::new();
        let mut prelude = Vec::new();
        for (position, pair) in present.iter().enumerate() {
            let param = match &pair.param {
                Param::Pun => {
                    if !is_name(&pair.key) {
                        return Err(invalid_param(pair.span));
                    }
                    IrParam::Value(Some(self.scope.declare(&pair.key, BindingKind::Let)?))
                }
                Param::Var(name) => IrParam::Var(self.declare_param(name, BindingKind::Var)?),
                Param::Do(name) => IrParam::Do(self.declare_param(name, BindingKind::Do)?),
                Param::Binding(binding) => {
                    self.compile_param_binding(binding, position, true, &mut guards, &mut prelude)?
                }
                Param::Default { binding, .. } => {
                    self.compile_param_binding(binding, position, false, &mut guards, &mut prelude)?
                }
            };
            params.push(param);
        }
        for pair in absent {
            let Param::Default { binding, default } = &pair.param else {
                return Err(CompileError::Unreachable("absent parameter without default".into()));
            };
            let value = self.compile_expr(default)?;
            self.bind_pattern(binding, value, &mut prelude, invalid_param)?;
        }
        let body = self.compile_expr(body)?;
        let body = if prelude.is_empty() {
            body
        } else {
            Expr::Block {
                stmts: prelude,
                result: Box::new(body),
            }
        };
        Ok(Body {
            params,
            guards,
            body,
        })
    }

    fn declare_param(&mut self, name: &ast::Expr, kind: BindingKind) -> CompileResult<usize> {
        match &name.kind {
            ExprKind::Ident(name) => self.scope.declare(name, kind),
            _ => Err(invalid_param(name.span)),
        }
    }

    fn compile_param_binding(
        &mut self,
        binding: &ast::Expr,
        position: usize,
        allow_guard: bool,
        guards: &mut Vec<Guard>,
        prelude: &mut Vec<Stmt>,
    ) -> CompileResult<IrParam> {
        match &binding.kind {
            ExprKind::Ident(name) => Ok(IrParam::Value(Some(
                self.scope.declare(name, BindingKind::Let)?,
            ))),
            ExprKind::Frame(Message::Pairs(pairs)) => {
                let slot = self.scope.alloc_slot()?;
                self.destructure(pairs, slot, prelude, invalid_param)?;
                Ok(IrParam::Value(Some(slot)))
            }
            _ => match self.literal(binding) {
                Some(value) if allow_guard => {
                    guards.push(Guard {
                        arg: position,
                        value,
                    });
                    Ok(IrParam::Value(None))
                }
                _ => Err(invalid_param(binding.span)),
            },
        }
    }

    fn compile_else(&mut self, builder: &mut ClassBuilder, decl: &HandlerDecl) -> CompileResult<()> {
        let block = builder.is_block();
        let receiver = match &decl.params {
            None => None,
            Some(Params::Key(key)) if key.is_empty() => None,
            Some(Params::Pairs(pairs)) if pairs.len() == 1 && pairs[0].key.is_empty() => {
                match &pairs[0].param {
                    Param::Binding(ast::Expr {
                        kind: ExprKind::Ident(name),
                        ..
                    }) => Some(name.as_str()),
                    _ => return Err(CompileError::InvalidElseParams { span: decl.span }),
                }
            }
            Some(_) => return Err(CompileError::InvalidElseParams { span: decl.span }),
        };

        let handler = match receiver {
            None => {
                let body = self.in_handler(block, |c| c.compile_variant(&[], &[], &decl.body))?;
                if block {
                    Handler::ElseBlock(Rc::new(body))
                } else {
                    Handler::Else(Rc::new(body))
                }
            }
            Some(name) => {
                let body = self.in_handler(block, |c| {
                    let slot = c.scope.declare(name, BindingKind::Do)?;
                    Ok(Body {
                        params: vec![IrParam::Do(slot)],
                        guards: Vec::new(),
                        body: c.compile_expr(&decl.body)?,
                    })
                })?;
                if block {
                    Handler::ForwardBlock(Rc::new(body))
                } else {
                    Handler::Forward(Rc::new(body))
                }
            }
        };
        builder.set_else(handler, decl.span)
    }
}

/// Pairs sorted by key; a repeated key is an error.
fn sorted_pairs(pairs: &[ast::Pair]) -> CompileResult<Vec<&ast::Pair>> {
    let mut sorted: Vec<&ast::Pair> = pairs.iter().collect();
    sorted.sort_by(|a, b| a.key.cmp(&b.key));
    if let Some(dup) = sorted.windows(2).find(|w| w[0].key == w[1].key) {
        return Err(CompileError::DuplicateKey {
            key: dup[1].key.clone(),
            span: dup[1].span,
        });
    }
    Ok(sorted)
}

/// Presence flags per parameter (declaration order) for every variant.
/// Each defaulted parameter doubles the set, present before absent.
fn expand_defaults(pairs: &[ParamPair]) -> Vec<Vec<bool>> {
    let mut variants = vec![Vec::with_capacity(pairs.len())];
    for pair in pairs {
        if matches!(pair.param, Param::Default { .. }) {
            variants = variants
                .into_iter()
                .flat_map(|variant| {
                    let mut with = variant.clone();
                    with.push(true);
                    let mut without = variant;
                    without.push(false);
                    [with, without]
                })
                .collect();
        } else {
            for variant in &mut variants {
                variant.push(true);
            }
        }
    }
    variants
}
