//! Name resolution pass that runs once after parsing: every call, method
//! call, and filter reference is looked up by name and the result cached
//! directly on its AST node, so evaluation never does a table lookup.
//!
//! `super()` is resolved here too, and only here: each `#function`/`#block`
//! definition records, at construction time, whatever was bound under its
//! own name a moment before it overwrote that binding. Walking into that
//! definition's body pushes the recorded binding onto `super_stack`, so a
//! `super()` call inside resolves to the override chain's previous link,
//! fixed for the lifetime of that one definition rather than re-resolved
//! against whatever the table holds at call time.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{EvalResult, Location, ParseError, ParseResult};
use crate::eval_context::EvaluationContext;
use crate::formula::{FormulaKind, FormulaNode};
use crate::value::Value;

/// Anything callable by name: built-in functions, and user-defined
/// `#function`/`#block` bodies.
pub trait Callable {
    fn call(&self, ctx: &mut EvaluationContext, args: Vec<Value>) -> EvalResult<Value>;
}

/// Anything callable as `receiver.name(args)`.
pub trait MethodCallable {
    fn call(&self, ctx: &mut EvaluationContext, receiver: &mut Value, args: Vec<Value>) -> EvalResult<Value>;
}

pub type FunctionFn = Rc<dyn Callable>;
pub type MethodFn = Rc<dyn MethodCallable>;
pub type FilterFn = Rc<dyn Fn(&str) -> String>;

struct NativeFunction<F>(F);

impl<F> Callable for NativeFunction<F>
where
    F: Fn(&mut EvaluationContext, Vec<Value>) -> EvalResult<Value>,
{
    fn call(&self, ctx: &mut EvaluationContext, args: Vec<Value>) -> EvalResult<Value> {
        (self.0)(ctx, args)
    }
}

/// Wraps a plain closure as a [`FunctionFn`]; used by built-in registration.
pub fn native_function<F>(f: F) -> FunctionFn
where
    F: Fn(&mut EvaluationContext, Vec<Value>) -> EvalResult<Value> + 'static,
{
    Rc::new(NativeFunction(f))
}

struct NativeMethod<F>(F);

impl<F> MethodCallable for NativeMethod<F>
where
    F: Fn(&mut EvaluationContext, &mut Value, Vec<Value>) -> EvalResult<Value>,
{
    fn call(&self, ctx: &mut EvaluationContext, receiver: &mut Value, args: Vec<Value>) -> EvalResult<Value> {
        (self.0)(ctx, receiver, args)
    }
}

/// Wraps a plain closure as a [`MethodFn`]; used by built-in registration.
pub fn native_method<F>(f: F) -> MethodFn
where
    F: Fn(&mut EvaluationContext, &mut Value, Vec<Value>) -> EvalResult<Value> + 'static,
{
    Rc::new(NativeMethod(f))
}

/// Wraps a plain closure as a [`FilterFn`]; used by built-in registration.
pub fn native_filter<F>(f: F) -> FilterFn
where
    F: Fn(&str) -> String + 'static,
{
    Rc::new(f)
}

/// The function/method/filter tables consulted while resolving names, plus
/// the `super()` resolution stack.
#[derive(Default)]
pub struct PostProcessContext {
    functions: HashMap<String, FunctionFn>,
    methods: HashMap<String, MethodFn>,
    filters: HashMap<String, FilterFn>,
    super_stack: Vec<Option<FunctionFn>>,
}

impl PostProcessContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context seeded with the built-in functions, methods, and filters.
    pub fn with_defaults() -> Self {
        let mut ctx = Self::new();
        crate::builtins::register_defaults(&mut ctx);
        ctx
    }

    pub fn register_function(&mut self, name: impl Into<String>, f: FunctionFn) {
        self.functions.insert(name.into(), f);
    }

    pub fn register_method(&mut self, name: impl Into<String>, f: MethodFn) {
        self.methods.insert(name.into(), f);
    }

    pub fn register_filter(&mut self, name: impl Into<String>, f: FilterFn) {
        self.filters.insert(name.into(), f);
    }

    pub fn get_function(&self, name: &str) -> Option<FunctionFn> {
        self.functions.get(name).cloned()
    }

    pub fn get_method(&self, name: &str) -> Option<MethodFn> {
        self.methods.get(name).cloned()
    }

    pub fn get_filter(&self, name: &str) -> Option<FilterFn> {
        self.filters.get(name).cloned()
    }

    /// Rebinds `name` and returns whatever was bound to it before, so a
    /// `#function`/`#block` definition can snapshot the binding it is about
    /// to shadow.
    pub fn set_function(&mut self, name: impl Into<String>, f: FunctionFn) -> Option<FunctionFn> {
        self.functions.insert(name.into(), f)
    }

    pub fn push_super(&mut self, binding: Option<FunctionFn>) {
        self.super_stack.push(binding);
    }

    pub fn pop_super(&mut self) {
        self.super_stack.pop();
    }

    pub fn current_super(&self) -> Option<FunctionFn> {
        self.super_stack.last().cloned().flatten()
    }
}

impl FormulaNode {
    /// Resolves every call, method call, and filter reference reachable
    /// from this node against `ctx`, caching the result on each node.
    pub fn post_process(&mut self, ctx: &mut PostProcessContext) -> ParseResult<()> {
        match &mut self.kind {
            FormulaKind::Literal(_) | FormulaKind::Name(_) | FormulaKind::LoopVar(_) => Ok(()),
            FormulaKind::Unary { rhs, .. } => rhs.post_process(ctx),
            FormulaKind::PrePostIncDec { target, .. } => target.post_process(ctx),
            FormulaKind::Binary { lhs, rhs, .. } => {
                lhs.post_process(ctx)?;
                rhs.post_process(ctx)
            }
            FormulaKind::Filter {
                expr,
                name,
                resolved,
            } => {
                expr.post_process(ctx)?;
                *resolved = Some(ctx.get_filter(name).ok_or_else(|| {
                    ParseError::new(self.location.clone(), format!("unknown filter '{name}'"))
                })?);
                Ok(())
            }
            FormulaKind::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                cond.post_process(ctx)?;
                then_branch.post_process(ctx)?;
                else_branch.post_process(ctx)
            }
            FormulaKind::Call {
                name,
                args,
                resolved,
            } => {
                for arg in args.iter_mut() {
                    arg.post_process(ctx)?;
                }
                *resolved = Some(if name == "super" {
                    ctx.current_super().ok_or_else(|| {
                        ParseError::new(
                            self.location.clone(),
                            "super() used outside of a function or block override",
                        )
                    })?
                } else {
                    ctx.get_function(name).ok_or_else(|| {
                        ParseError::new(self.location.clone(), format!("unknown function '{name}'"))
                    })?
                });
                Ok(())
            }
            FormulaKind::MethodCall {
                object,
                name,
                args,
                resolved,
            } => {
                object.post_process(ctx)?;
                for arg in args.iter_mut() {
                    arg.post_process(ctx)?;
                }
                *resolved = Some(ctx.get_method(name).ok_or_else(|| {
                    ParseError::new(self.location.clone(), format!("unknown method '{name}'"))
                })?);
                Ok(())
            }
            FormulaKind::Index { collection, key } => {
                collection.post_process(ctx)?;
                key.post_process(ctx)
            }
            FormulaKind::VectorLiteral(items) => {
                for item in items.iter_mut() {
                    item.post_process(ctx)?;
                }
                Ok(())
            }
            FormulaKind::MapLiteral(pairs) => {
                for (k, v) in pairs.iter_mut() {
                    k.post_process(ctx)?;
                    v.post_process(ctx)?;
                }
                Ok(())
            }
        }
    }
}

#[allow(dead_code)]
fn no_location() -> Location {
    Location::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parse_formula;

    #[test]
    fn resolves_known_function() {
        let mut ctx = PostProcessContext::new();
        ctx.register_function(
            "double",
            native_function(|_ctx, args| Ok(Value::Integer(args[0].as_int().unwrap_or(0) * 2))),
        );
        let mut tree = parse_formula("double(21)").unwrap();
        tree.post_process(&mut ctx).unwrap();
    }

    #[test]
    fn unknown_function_is_a_parse_error() {
        let mut ctx = PostProcessContext::new();
        let mut tree = parse_formula("mystery(1)").unwrap();
        assert!(tree.post_process(&mut ctx).is_err());
    }

    #[test]
    fn super_outside_override_errors() {
        let mut ctx = PostProcessContext::new();
        let mut tree = parse_formula("super()").unwrap();
        assert!(tree.post_process(&mut ctx).is_err());
    }

    #[test]
    fn super_resolves_to_pushed_binding() {
        let mut ctx = PostProcessContext::new();
        let original = native_function(|_ctx, _args| Ok(Value::Integer(1)));
        ctx.push_super(Some(original));
        let mut tree = parse_formula("super()").unwrap();
        tree.post_process(&mut ctx).unwrap();
        ctx.pop_super();
    }
}
