//! Tree-walking interpreter over IR.
//!
//! Errors and non-local `return` travel the same channel, [`Unwind`], so
//! every context has exactly one exit path where defers run.
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, trace};
use parser::Span;

use crate::activation::{Activation, ContextRef, ProvideMap};
use crate::error::{Error, RuntimeError};
use crate::frames;
use crate::ir::{Arg, Body, ClassBuilder, Expr, Handler, IrClass, IrParam, Program, Send, Stmt};
use crate::value::Value;
use crate::VM;

#[derive(Debug)]
pub enum Unwind {
    /// `return` from the context with this id.
    Return { context: usize, value: Value },
    Error(RuntimeError),
}

impl From<RuntimeError> for Unwind {
    fn from(err: RuntimeError) -> Self {
        Unwind::Error(err)
    }
}

pub type Exec<T> = Result<T, Unwind>;

/// An evaluated argument together with how it was passed.
#[derive(Debug, Clone)]
enum Passed {
    Value(Value),
    /// Copied back into the sender's `slot` after a normal return.
    Var { slot: usize, value: Value },
    Do(Value),
}

impl Passed {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Do(..) => Passed::Do(value),
            other => Passed::Value(other),
        }
    }

    fn value(&self) -> &Value {
        match self {
            Passed::Value(v) | Passed::Do(v) | Passed::Var { value: v, .. } => v,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Passed::Value(_) => "value",
            Passed::Var { .. } => "var",
            Passed::Do(_) => "do",
        }
    }
}

enum ModuleState {
    Source(Rc<Program>),
    Loading,
    Loaded(Value),
}

fn unreachable(message: impl Into<String>) -> Unwind {
    Unwind::Error(RuntimeError::Unreachable(message.into()))
}

fn no_handler(target: &Value, selector: &str) -> Unwind {
    RuntimeError::NoHandler {
        class: target.class().name.clone(),
        selector: selector.to_string(),
    }
    .into()
}

/// Converts a `return` aimed at `context` into that context's result.
fn catch_return(context: usize, outcome: Exec<Value>) -> Exec<Value> {
    match outcome {
        Err(Unwind::Return { context: target, value }) if target == context => Ok(value),
        other => other,
    }
}

pub struct Interpreter {
    vm: Rc<VM>,
    modules: HashMap<String, ModuleState>,
    /// Synthetic message classes used by forwarding, one per selector.
    message_classes: HashMap<String, Rc<IrClass>>,
    next_context: usize,
}

impl Interpreter {
    pub fn new(vm: Rc<VM>) -> Self {
        let mut modules = HashMap::new();
        modules.insert("core".to_string(), ModuleState::Loaded(vm.core()));
        Self {
            vm,
            modules,
            message_classes: HashMap::new(),
            next_context: 0,
        }
    }

    pub fn vm(&self) -> &Rc<VM> {
        &self.vm
    }

    /// Registers a module source. It is evaluated on first import.
    pub fn add_module(&mut self, key: impl Into<String>, program: Program) {
        self.modules
            .insert(key.into(), ModuleState::Source(Rc::new(program)));
    }

    /// Runs a compiled program in a fresh root context whose `self` is unit.
    pub fn run(&mut self, program: &Program) -> Result<Value, Error> {
        match self.run_root(program) {
            Ok(value) => Ok(value),
            Err(Unwind::Error(err)) => Err(err.into()),
            Err(Unwind::Return { context, .. }) => Err(Error::Internal(format!(
                "return to context #{context} escaped the program"
            ))),
        }
    }

    fn run_root(&mut self, program: &Program) -> Exec<Value> {
        let ctx = self.new_context(self.vm.unit(), ProvideMap::default(), program.locals);
        let outcome = self.eval(&ctx, &program.body);
        let outcome = self.leave_context(&ctx, outcome);
        ctx.finish();
        outcome
    }

    fn new_context(&mut self, self_value: Value, provides: ProvideMap, locals: usize) -> ContextRef {
        let id = self.next_context;
        self.next_context += 1;
        Activation::new(id, self_value, provides, locals)
    }

    /// Catches returns aimed at `ctx`, then runs its defers in LIFO order.
    /// A failing defer replaces a normal outcome or a passing return, never
    /// an earlier error.
    fn leave_context(&mut self, ctx: &ContextRef, outcome: Exec<Value>) -> Exec<Value> {
        let mut outcome = catch_return(ctx.id, outcome);
        while let Some(stmts) = ctx.pop_defer() {
            let result = stmts.iter().try_for_each(|stmt| self.exec(ctx, stmt));
            if let Err(unwind) = result {
                if !matches!(outcome, Err(Unwind::Error(_))) {
                    outcome = Err(unwind);
                }
            }
        }
        catch_return(ctx.id, outcome)
    }

    // ── Evaluation ──

    fn eval(&mut self, ctx: &ContextRef, expr: &Expr) -> Exec<Value> {
        match expr {
            Expr::SelfRef => Ok(ctx.self_value.clone()),
            Expr::Constant(value) => Ok(value.clone()),
            Expr::Local(slot) => ctx
                .local(*slot)
                .ok_or_else(|| unreachable(format!("slot {slot} read before assignment"))),
            Expr::Ivar(index) => ctx
                .self_value
                .as_object()
                .and_then(|obj| obj.ivars.get(*index).cloned())
                .ok_or_else(|| unreachable(format!("no ivar {index} on {:?}", ctx.self_value))),
            Expr::Object { class, ivars } => {
                let values = ivars
                    .iter()
                    .map(|ivar| self.eval(ctx, ivar))
                    .collect::<Exec<Vec<_>>>()?;
                Ok(Value::object(class.clone(), values))
            }
            Expr::Do(class) => Ok(Value::Do(class.clone(), ctx.clone())),
            Expr::Send(send) => self.eval_send(ctx, send),
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.eval(ctx, cond)?;
                match cond.as_bool() {
                    Some(true) => self.eval(ctx, then_branch),
                    Some(false) => match else_branch {
                        Some(branch) => self.eval(ctx, branch),
                        None => Ok(self.vm.unit()),
                    },
                    None => Err(RuntimeError::TypeMismatch {
                        expected: "boolean condition",
                        got: cond.kind_name(),
                    }
                    .into()),
                }
            }
            Expr::Block { stmts, result } => {
                for stmt in stmts {
                    self.exec(ctx, stmt)?;
                }
                self.eval(ctx, result)
            }
            Expr::Module(key) => self.load_module(key),
        }
    }

    fn exec(&mut self, ctx: &ContextRef, stmt: &Stmt) -> Exec<()> {
        match stmt {
            Stmt::Assign { slot, value } => {
                let value = self.eval(ctx, value)?;
                ctx.set_local(*slot, value);
            }
            Stmt::Expr(expr) => {
                self.eval(ctx, expr)?;
            }
            Stmt::Return(expr) => {
                let value = self.eval(ctx, expr)?;
                return Err(Unwind::Return {
                    context: ctx.id,
                    value,
                });
            }
            Stmt::Defer(stmts) => ctx.push_defer(stmts.clone()),
            Stmt::Provide { key, value } => {
                let value = self.eval(ctx, value)?;
                ctx.provide(key, value);
            }
            Stmt::Using { key, slot } => {
                let value = ctx
                    .provided(key)
                    .ok_or_else(|| RuntimeError::NoProvider { key: key.clone() })?;
                ctx.set_local(*slot, value);
            }
        }
        Ok(())
    }

    // ── Dispatch ──

    fn eval_send(&mut self, ctx: &ContextRef, send: &Send) -> Exec<Value> {
        let target = self.eval(ctx, &send.target)?;
        let mut args = Vec::with_capacity(send.args.len());
        for arg in &send.args {
            args.push(match arg {
                Arg::Value(expr) => Passed::Value(self.eval(ctx, expr)?),
                Arg::Do(expr) => Passed::Do(self.eval(ctx, expr)?),
                Arg::Var(slot) => Passed::Var {
                    slot: *slot,
                    value: ctx
                        .local(*slot)
                        .ok_or_else(|| unreachable(format!("var slot {slot} is empty")))?,
                },
            });
        }
        match self.dispatch(ctx, &send.selector, &target, &args)? {
            Some(value) => Ok(value),
            None => match &send.or_else {
                Some(alternate) => self.eval(ctx, alternate),
                None => Err(no_handler(&target, &send.selector)),
            },
        }
    }

    /// Sends plain values, as primitives and frame methods do. Do values
    /// travel as do arguments.
    pub fn send_values(
        &mut self,
        ctx: &ContextRef,
        selector: &str,
        target: Value,
        args: Vec<Value>,
    ) -> Exec<Value> {
        let args: Vec<Passed> = args.into_iter().map(Passed::from_value).collect();
        match self.dispatch(ctx, selector, &target, &args)? {
            Some(value) => Ok(value),
            None => Err(no_handler(&target, selector)),
        }
    }

    /// `value{debug}` as a host string. Values that cannot answer `debug`
    /// fall back to their host rendering.
    pub fn debug_string(&mut self, ctx: &ContextRef, value: Value) -> Exec<String> {
        let class = value.class().clone();
        if class.handler("debug").is_none() && !class.has_else() {
            return Ok(format!("{value:?}"));
        }
        let text = self.send_values(ctx, "debug", value, Vec::new())?;
        match text.as_str() {
            Some(s) => Ok(s.to_string()),
            None => Err(RuntimeError::TypeMismatch {
                expected: "string from debug",
                got: text.kind_name(),
            }
            .into()),
        }
    }

    /// [`Self::debug_string`] from the host side, in a throwaway root context.
    pub fn describe(&mut self, value: Value) -> Result<String, Error> {
        let ctx = self.new_context(self.vm.unit(), ProvideMap::default(), 0);
        let outcome = self.debug_string(&ctx, value);
        ctx.finish();
        match outcome {
            Ok(text) => Ok(text),
            Err(Unwind::Error(err)) => Err(err.into()),
            Err(Unwind::Return { context, .. }) => Err(Error::Internal(format!(
                "return to context #{context} escaped debug"
            ))),
        }
    }

    /// Exact selector first, then the else handler. `None` means neither
    /// applied and the caller decides between the alternate and `NoHandler`.
    fn dispatch(
        &mut self,
        ctx: &ContextRef,
        selector: &str,
        target: &Value,
        args: &[Passed],
    ) -> Exec<Option<Value>> {
        trace!("send `{selector}` to {}", target.kind_name());
        let class = target.class().clone();
        if let Some(handler) = class.handler(selector) {
            if let Some(value) = self.invoke(ctx, selector, handler, target, args)? {
                return Ok(Some(value));
            }
        }
        match class.else_handler() {
            Some(handler) => self.invoke(ctx, selector, handler, target, args),
            None => Ok(None),
        }
    }

    fn invoke(
        &mut self,
        ctx: &ContextRef,
        selector: &str,
        handler: &Handler,
        target: &Value,
        args: &[Passed],
    ) -> Exec<Option<Value>> {
        let value = match handler {
            Handler::Constant(value) => value.clone(),
            Handler::Getter(index) => target
                .as_object()
                .and_then(|obj| obj.ivars.get(*index).cloned())
                .ok_or_else(|| unreachable(format!("getter {index} on {}", target.kind_name())))?,
            Handler::Primitive(desc) => {
                let values = plain_values(selector, args)?;
                desc.call(self, ctx, target, &values)?
            }
            Handler::Frame(method) => {
                let values = plain_values(selector, args)?;
                frames::invoke(self, ctx, *method, target, &values)?
            }
            Handler::On(bodies) => match select(bodies, args) {
                Some(body) => self.call_object(ctx, selector, body, target, args)?,
                None => return Ok(None),
            },
            Handler::OnBlock(bodies) => match select(bodies, args) {
                Some(body) => self.call_block(ctx, selector, body, target, args)?,
                None => return Ok(None),
            },
            Handler::Else(body) => {
                plain_values(selector, args)?;
                self.call_object(ctx, selector, body, target, &[])?
            }
            Handler::ElseBlock(body) => {
                plain_values(selector, args)?;
                self.call_block(ctx, selector, body, target, &[])?
            }
            Handler::Forward(body) | Handler::ForwardBlock(body) => {
                let (message, message_ctx) = self.message_do(ctx, selector, args)?;
                let message = [Passed::Do(message)];
                let result = if matches!(handler, Handler::Forward(_)) {
                    self.call_object(ctx, selector, body, target, &message)
                } else {
                    self.call_block(ctx, selector, body, target, &message)
                };
                message_ctx.finish();
                result?
            }
            Handler::Resend(original) => self.resend(ctx, original, target, args)?,
        };
        Ok(Some(value))
    }

    // ── Calling conventions ──

    /// Runs an object handler in a fresh child context.
    fn call_object(
        &mut self,
        sender: &ContextRef,
        selector: &str,
        body: &Body,
        target: &Value,
        args: &[Passed],
    ) -> Exec<Value> {
        check_params(selector, &body.params, args)?;
        let callee = self.new_context(target.clone(), sender.provides(), 0);
        bind_params(&callee, &body.params, args);
        let outcome = self.eval(&callee, &body.body);
        let outcome = self.leave_context(&callee, outcome);
        if outcome.is_ok() {
            copy_out(sender, &callee, &body.params, args);
        }
        callee.finish();
        outcome
    }

    /// Runs a block handler inside the context its do value captured.
    /// Returns pass through to whoever owns their target context.
    fn call_block(
        &mut self,
        sender: &ContextRef,
        selector: &str,
        body: &Body,
        target: &Value,
        args: &[Passed],
    ) -> Exec<Value> {
        let Value::Do(_, owner) = target else {
            return Err(unreachable(format!("block handler on {}", target.kind_name())));
        };
        if !owner.is_alive() {
            return Err(RuntimeError::ExpiredDo.into());
        }
        check_params(selector, &body.params, args)?;
        bind_params(owner, &body.params, args);
        let value = self.eval(owner, &body.body)?;
        copy_out(sender, owner, &body.params, args);
        Ok(value)
    }

    /// The do value handed to a forwarding else handler. Sending it
    /// `{: receiver}` re-sends the original message to `receiver`.
    fn message_do(
        &mut self,
        ctx: &ContextRef,
        selector: &str,
        args: &[Passed],
    ) -> Exec<(Value, ContextRef)> {
        let values = plain_values(selector, args)?;
        let class = match self.message_classes.get(selector) {
            Some(class) => class.clone(),
            None => {
                let mut builder = ClassBuilder::block(format!("message {selector}"));
                builder
                    .add(":", Handler::Resend(selector.to_string()), Span::default())
                    .map_err(|err| unreachable(err.to_string()))?;
                let class = Rc::new(builder.build());
                self.message_classes.insert(selector.to_string(), class.clone());
                class
            }
        };
        let message_ctx = self.new_context(self.vm.unit(), ctx.provides(), 1);
        message_ctx.set_local(0, self.vm.array(values));
        Ok((Value::Do(class, message_ctx.clone()), message_ctx))
    }

    fn resend(
        &mut self,
        ctx: &ContextRef,
        selector: &str,
        message: &Value,
        args: &[Passed],
    ) -> Exec<Value> {
        let Value::Do(_, message_ctx) = message else {
            return Err(unreachable("resend on a non-do value"));
        };
        if !message_ctx.is_alive() {
            return Err(RuntimeError::ExpiredDo.into());
        }
        let original = message_ctx
            .local(0)
            .and_then(|v| v.as_array().map(|items| items.as_ref().clone()))
            .ok_or_else(|| unreachable("message without arguments"))?;
        let receiver = plain_values(":", args)?
            .into_iter()
            .next()
            .ok_or_else(|| unreachable("resend without a receiver"))?;
        self.send_values(ctx, selector, receiver, original)
    }

    // ── Modules ──

    fn load_module(&mut self, key: &str) -> Exec<Value> {
        match self.modules.get(key) {
            Some(ModuleState::Loaded(value)) => return Ok(value.clone()),
            Some(ModuleState::Loading) => {
                return Err(RuntimeError::CircularImport {
                    key: key.to_string(),
                }
                .into());
            }
            Some(ModuleState::Source(_)) => {}
            None => {
                return Err(RuntimeError::UnknownModule {
                    key: key.to_string(),
                }
                .into());
            }
        }
        let Some(ModuleState::Source(program)) =
            self.modules.insert(key.to_string(), ModuleState::Loading)
        else {
            return Err(unreachable(format!("module `{key}` changed state")));
        };
        debug!("loading module `{key}`");
        let outcome = self.run_root(&program);
        match outcome {
            Ok(value) => {
                debug!("module `{key}` loaded");
                self.modules
                    .insert(key.to_string(), ModuleState::Loaded(value.clone()));
                Ok(value)
            }
            Err(unwind) => {
                self.modules
                    .insert(key.to_string(), ModuleState::Source(program));
                Err(unwind)
            }
        }
    }
}

/// First candidate whose guards all hold.
fn select<'a>(bodies: &'a [Body], args: &[Passed]) -> Option<&'a Body> {
    bodies.iter().find(|body| {
        body.guards.iter().all(|guard| {
            args.get(guard.arg)
                .is_some_and(|arg| arg.value().literal_eq(&guard.value))
        })
    })
}

/// Primitive and else handlers take value and do arguments only.
fn plain_values(selector: &str, args: &[Passed]) -> Exec<Vec<Value>> {
    args.iter()
        .map(|arg| match arg {
            Passed::Var { .. } => Err(RuntimeError::ParamMismatch {
                selector: selector.to_string(),
                expected: "value",
                got: "var",
            }
            .into()),
            other => Ok(other.value().clone()),
        })
        .collect()
}

fn check_params(selector: &str, params: &[IrParam], args: &[Passed]) -> Exec<()> {
    if params.len() != args.len() {
        return Err(unreachable(format!(
            "`{selector}` takes {} arguments, got {}",
            params.len(),
            args.len()
        )));
    }
    for (param, arg) in params.iter().zip(args) {
        let matches = matches!(
            (param, arg),
            (IrParam::Value(_), Passed::Value(_))
                | (IrParam::Var(_), Passed::Var { .. })
                | (IrParam::Do(_), Passed::Do(_))
        );
        if !matches {
            return Err(RuntimeError::ParamMismatch {
                selector: selector.to_string(),
                expected: param.kind_name(),
                got: arg.kind_name(),
            }
            .into());
        }
    }
    Ok(())
}

fn bind_params(ctx: &ContextRef, params: &[IrParam], args: &[Passed]) {
    for (param, arg) in params.iter().zip(args) {
        match param {
            IrParam::Value(None) => {}
            IrParam::Value(Some(slot)) | IrParam::Var(slot) | IrParam::Do(slot) => {
                ctx.set_local(*slot, arg.value().clone());
            }
        }
    }
}

/// Writes var parameters back into the sender's slots.
fn copy_out(sender: &ContextRef, callee: &ContextRef, params: &[IrParam], args: &[Passed]) {
    for (param, arg) in params.iter().zip(args) {
        if let (IrParam::Var(slot), Passed::Var { slot: target, .. }) = (param, arg) {
            if let Some(value) = callee.local(*slot) {
                sender.set_local(*target, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::error::{Error, RuntimeError};
    use crate::special::bootstrap;
    use crate::testing::{run, run_err};
    use crate::{compile_source, Interpreter};

    const CORE: &str = "import core from \"core\";\n";

    fn runtime_err(src: &str) -> RuntimeError {
        match run_err(src) {
            Error::Runtime(err) => err,
            other => panic!("expected a runtime error, got {other}"),
        }
    }

    #[test]
    fn dispatch_fallback_order() {
        let src = "let o := [on {foo} 1; else 2];\n\
                   o{foo} * 10 + o{bar}";
        assert_eq!(run(src).as_int(), Some(12));
        assert_eq!(run("let p := [on {foo} 1]; p{bar} ?? 3").as_int(), Some(3));
        assert_eq!(run("let p := [on {foo} 1]; p{foo} ?? 3").as_int(), Some(1));
        assert!(matches!(
            runtime_err("let p := [on {foo} 1]; p{bar}"),
            RuntimeError::NoHandler { ref selector, .. } if selector == "bar"
        ));
    }

    #[test]
    fn guards_are_tried_in_order() {
        let src = "let fib := [\n\
                     on {fib: 0} 0;\n\
                     on {fib: 1} 1;\n\
                     on {fib: n} self{fib: n - 1} + self{fib: n - 2}\n\
                   ];\n\
                   fib{fib: 15}";
        assert_eq!(run(src).as_int(), Some(610));
    }

    #[test]
    fn unmatched_guards_fall_through() {
        let src = "let o := [on {is: \"yes\"} true; else false]; o{is: \"no\"}";
        assert_eq!(run(src).as_bool(), Some(false));
        let src = "let o := [on {is: 0} 1]; o{is: 5} ?? 7";
        assert_eq!(run(src).as_int(), Some(7));
    }

    #[test]
    fn var_parameters_copy_back() {
        let src = "var total := 1;\n\
                   let acc := [on {add: var t n: n} (t := t + n; 0)];\n\
                   acc{add: var total n: 5};\n\
                   acc{add: var total n: 10};\n\
                   total";
        assert_eq!(run(src).as_int(), Some(16));
    }

    #[test]
    fn value_parameters_do_not_copy_back() {
        let src = "var total := 1;\n\
                   let f := [on {take: t} t + 1];\n\
                   f{take: total};\n\
                   total";
        assert_eq!(run(src).as_int(), Some(1));
    }

    #[test]
    fn arguments_evaluate_in_key_order() {
        let src = format!(
            "{CORE}let log := core{{cell: \"\"}};\n\
             let o := [on {{a: x b: y}} 0];\n\
             o{{b: log{{update: do {{: s}} s ++ \"b\"}} a: log{{update: do {{: s}} s ++ \"a\"}}}};\n\
             log{{get}}"
        );
        assert_eq!(run(&src).as_str(), Some("ab"));
    }

    #[test]
    fn blocks_write_enclosing_vars() {
        let src = format!(
            "{CORE}var sum := 0;\n\
             core{{array}}{{push: 1}}{{push: 2}}{{push: 3}}{{each: do {{: x}} (sum := sum + x)}};\n\
             sum"
        );
        assert_eq!(run(&src).as_int(), Some(6));
    }

    #[test]
    fn param_kinds_are_checked_at_call_time() {
        assert!(matches!(
            runtime_err("let f := [on {x: var v} 0]; f{x: 1}"),
            RuntimeError::ParamMismatch { expected: "var", got: "value", .. }
        ));
        assert!(matches!(
            runtime_err("let f := [on {x: v} 0]; f{x: do 1}"),
            RuntimeError::ParamMismatch { expected: "value", got: "do", .. }
        ));
        assert!(matches!(
            runtime_err("var v := 1; 5{+: var v}"),
            RuntimeError::ParamMismatch { expected: "value", got: "var", .. }
        ));
    }

    #[test]
    fn defers_run_lifo_on_return() {
        let src = format!(
            "{CORE}let log := core{{cell: \"\"}};\n\
             let o := [on {{run}} (\n\
               defer log{{update: do {{: s}} s ++ \"A\"}};\n\
               defer log{{update: do {{: s}} s ++ \"B\"}};\n\
               return 1;\n\
               2\n\
             )];\n\
             let r := o{{run}};\n\
             log{{get}} ++ r{{debug}}"
        );
        assert_eq!(run(&src).as_str(), Some("BA1"));
    }

    #[test]
    fn defers_run_on_error_without_masking_it() {
        let src = format!(
            "{CORE}let log := core{{cell: 0}};\n\
             let o := [on {{run}} (\n\
               defer log{{set: 1}};\n\
               defer core{{panic: \"second\"}};\n\
               core{{panic: \"first\"}}\n\
             )];\n\
             o{{run}}"
        );
        assert!(matches!(runtime_err(&src), RuntimeError::Panic(ref m) if m == "first"));
    }

    #[test]
    fn failing_defer_overrides_a_passing_return() {
        let src = format!(
            "{CORE}let o := [on {{run: do f}} (defer core{{panic: \"cleanup failed\"}}; f{{}}; 0)];\n\
             o{{run: do (return 1)}};\n\
             2"
        );
        assert!(matches!(runtime_err(&src), RuntimeError::Panic(ref m) if m == "cleanup failed"));
    }

    #[test]
    fn defers_run_while_a_return_passes_through() {
        let src = format!(
            "{CORE}let log := core{{cell: \"\"}};\n\
             let inner := [on {{run: do f}} (defer log{{update: do {{: s}} s ++ \"d\"}}; f{{}}; 0)];\n\
             let outer := [on {{go}} (inner{{run: do (return 7)}}; 0)];\n\
             let r := outer{{go}};\n\
             log{{get}} ++ r{{debug}}"
        );
        assert_eq!(run(&src).as_str(), Some("d7"));
    }

    #[test]
    fn failing_defer_replaces_normal_result() {
        let src = format!("{CORE}let o := [on {{run}} (defer core{{panic: \"late\"}}; 5)]; o{{run}}");
        assert!(matches!(runtime_err(&src), RuntimeError::Panic(ref m) if m == "late"));
    }

    #[test]
    fn return_from_a_block_leaves_the_handler() {
        let src = format!(
            "{CORE}let finder := [on {{find: items}} (\n\
               items{{each: do {{: x}} if x > 2 then (return x)}};\n\
               0\n\
             )];\n\
             finder{{find: core{{array}}{{push: 1}}{{push: 3}}{{push: 5}}}}"
        );
        assert_eq!(run(&src).as_int(), Some(3));
    }

    #[test]
    fn top_level_return_ends_the_program() {
        assert_eq!(run("return 4; 5").as_int(), Some(4));
    }

    #[test]
    fn provide_reaches_nested_contexts_only() {
        let src = "let reader := [on {read} (using{depth}; depth)];\n\
                   let outer := [on {go: r} (provide{depth: 1}; r{read})];\n\
                   outer{go: reader}";
        assert_eq!(run(src).as_int(), Some(1));

        let src = "let reader := [on {read} (using{depth}; depth)];\n\
                   let sibling := [on {go} (provide{depth: 1}; 0)];\n\
                   sibling{go};\n\
                   reader{read}";
        assert!(matches!(
            runtime_err(src),
            RuntimeError::NoProvider { ref key } if key == "depth"
        ));
    }

    #[test]
    fn inner_provides_shadow_outer_ones() {
        let src = "let reader := [on {read} (using{d: value}; value)];\n\
                   let inner := [on {go: r} (provide{d: 2}; r{read})];\n\
                   provide{d: 1};\n\
                   inner{go: reader} * 10 + reader{read}";
        assert_eq!(run(src).as_int(), Some(21));
    }

    #[test]
    fn forwarding_resends_the_original_message() {
        let src = "let inner := [on {greet: n} n + 1; on {twice: n} n * 2];\n\
                   let proxy := [else {: m} m{: inner}];\n\
                   proxy{greet: 1} + proxy{twice: 5}";
        assert_eq!(run(src).as_int(), Some(12));
    }

    #[test]
    fn forwarded_do_arguments_stay_dos() {
        let src = "let inner := [on {apply: do f} f{: 20}];\n\
                   let proxy := [else {: m} m{: inner}];\n\
                   proxy{apply: do {: x} x + 1}";
        assert_eq!(run(src).as_int(), Some(21));
    }

    #[test]
    fn do_values_expire_with_their_context() {
        let src = format!(
            "{CORE}let c := core{{cell: 0}};\n\
             let maker := [on {{make}} c{{set: do 42}}];\n\
             maker{{make}};\n\
             c{{get}}{{}}"
        );
        assert!(matches!(runtime_err(&src), RuntimeError::ExpiredDo));
    }

    #[test]
    fn if_needs_a_boolean() {
        assert!(matches!(runtime_err("if 1 then 2"), RuntimeError::TypeMismatch { .. }));
        assert!(run("if false then 2").is_unit());
        assert_eq!(run("if 1 < 2 then 3 else 4").as_int(), Some(3));
    }

    #[test]
    fn modules_load_once_and_share_the_frame_cache() {
        let vm = Rc::new(bootstrap());
        let util = compile_source(
            &vm,
            "let helper := [on {double: n} n * 2];\n[helper: helper version: 3]",
        )
        .unwrap();
        let main = compile_source(
            &vm,
            "import [helper: h version:] from \"util\";\n\
             import again from \"util\";\n\
             [first: h second: again{helper} result: h{double: version}]",
        )
        .unwrap();
        let mut interp = Interpreter::new(vm.clone());
        interp.add_module("util", util);
        let value = interp.run(&main).unwrap();
        let frame = value.as_object().unwrap();
        // fields in key order: first, result, second
        assert_eq!(frame.ivars[1].as_int(), Some(6));
        let first = frame.ivars[0].as_object().unwrap();
        let second = frame.ivars[2].as_object().unwrap();
        assert!(Rc::ptr_eq(first, second));
        assert!(vm.cached_frames() >= 2);
    }

    #[test]
    fn module_errors() {
        let vm = Rc::new(bootstrap());
        let looping = compile_source(&vm, "import me from \"loop\"; me").unwrap();
        let main = compile_source(&vm, "import x from \"loop\"; x").unwrap();
        let mut interp = Interpreter::new(vm.clone());
        interp.add_module("loop", looping);
        assert!(matches!(
            interp.run(&main),
            Err(Error::Runtime(RuntimeError::CircularImport { ref key })) if key == "loop"
        ));
        assert!(matches!(
            runtime_err("import x from \"nope\"; x"),
            RuntimeError::UnknownModule { .. }
        ));
    }
}
