//! The skeleton document tree: text runs, placeholders, control-flow
//! statements, and named function/block definitions built on top of the
//! formula sublanguage.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Location, ParseError, ParseResult};
use crate::formula::FormulaNode;
use crate::post_process::{Callable, FunctionFn, PostProcessContext};
use crate::value::Value;

pub struct SkeletonNode {
    pub location: Location,
    pub kind: SkeletonKind,
}

pub enum SkeletonKind {
    Text(String),
    /// A directive line that is a bare formula, evaluated for side effects
    /// only (e.g. `#x = 5`); its value is discarded.
    Expression(FormulaNode),
    /// `${expr}`: evaluated and its stringified value appended to output.
    Placeholder(FormulaNode),
    If {
        /// `(condition, body)` pairs for `#if` and each `#elif`, in order.
        branches: Vec<(FormulaNode, Vec<SkeletonNode>)>,
        else_branch: Option<Vec<SkeletonNode>>,
    },
    For {
        var: String,
        iterable: FormulaNode,
        body: Vec<SkeletonNode>,
        /// Rendered instead of the loop when the iterable is empty.
        else_branch: Option<Vec<SkeletonNode>>,
    },
    While {
        cond: FormulaNode,
        body: Vec<SkeletonNode>,
        is_do_while: bool,
    },
    /// A `#function` definition: a pure no-op at its own render site. Called
    /// elsewhere through a formula `Call` node.
    Function(Rc<SkeletonFunction>),
    /// A `#block` definition, which is *also* an invocation at the exact
    /// point it appears, dispatched through whichever definition of `name`
    /// is current by the time post-processing runs (see `post_process.rs`).
    Block {
        name: String,
        self_fn: Option<FunctionFn>,
    },
    Break,
    Continue,
    Return(Option<FormulaNode>),
}

impl SkeletonNode {
    pub fn new(location: Location, kind: SkeletonKind) -> Self {
        Self { location, kind }
    }
}

/// The callable body shared by `#function` and `#block` definitions. Kept
/// behind a `RefCell` because it is registered into the function table (and
/// captured as another definition's `super_binding`) before the dedicated
/// post-process pass has a chance to resolve the names inside it.
pub struct SkeletonFunction {
    pub name: String,
    pub params: Vec<String>,
    pub body: RefCell<Vec<SkeletonNode>>,
    pub super_binding: Option<FunctionFn>,
    pub is_block: bool,
    pub location: Location,
}

/// A complete parsed document, plus every named definition it declared (in
/// document order) so post-processing can resolve each definition's body
/// exactly once without needing to downcast the type-erased function table.
pub struct Skeleton {
    pub nodes: Vec<SkeletonNode>,
    pub definitions: Vec<Rc<SkeletonFunction>>,
}

impl Skeleton {
    pub fn post_process(&mut self, ctx: &mut PostProcessContext) -> ParseResult<()> {
        post_process_body(&mut self.nodes, ctx)?;
        for def in &self.definitions {
            ctx.push_super(def.super_binding.clone());
            let result = post_process_body(&mut def.body.borrow_mut(), ctx);
            ctx.pop_super();
            result?;
        }
        Ok(())
    }
}

fn post_process_body(body: &mut [SkeletonNode], ctx: &mut PostProcessContext) -> ParseResult<()> {
    for node in body.iter_mut() {
        post_process_node(node, ctx)?;
    }
    Ok(())
}

fn post_process_node(node: &mut SkeletonNode, ctx: &mut PostProcessContext) -> ParseResult<()> {
    match &mut node.kind {
        SkeletonKind::Text(_) | SkeletonKind::Break | SkeletonKind::Continue => Ok(()),
        SkeletonKind::Expression(f) | SkeletonKind::Placeholder(f) => f.post_process(ctx),
        SkeletonKind::Return(Some(f)) => f.post_process(ctx),
        SkeletonKind::Return(None) => Ok(()),
        SkeletonKind::If {
            branches,
            else_branch,
        } => {
            for (cond, body) in branches.iter_mut() {
                cond.post_process(ctx)?;
                post_process_body(body, ctx)?;
            }
            if let Some(body) = else_branch {
                post_process_body(body, ctx)?;
            }
            Ok(())
        }
        SkeletonKind::For {
            iterable,
            body,
            else_branch,
            ..
        } => {
            iterable.post_process(ctx)?;
            post_process_body(body, ctx)?;
            if let Some(body) = else_branch {
                post_process_body(body, ctx)?;
            }
            Ok(())
        }
        SkeletonKind::While { cond, body, .. } => {
            cond.post_process(ctx)?;
            post_process_body(body, ctx)
        }
        // The definition's own body is post-processed once via
        // `Skeleton::definitions`, not from its in-tree position.
        SkeletonKind::Function(_) => Ok(()),
        SkeletonKind::Block { name, self_fn } => {
            *self_fn = Some(ctx.get_function(name).ok_or_else(|| {
                ParseError::new(node.location.clone(), format!("unknown block '{name}'"))
            })?);
            Ok(())
        }
    }
}

impl Callable for SkeletonFunction {
    fn call(
        &self,
        ctx: &mut crate::eval_context::EvaluationContext,
        args: Vec<Value>,
    ) -> crate::error::EvalResult<Value> {
        crate::skeleton_eval::call_skeleton_function(self, ctx, args)
    }
}
