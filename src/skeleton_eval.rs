//! Renders a post-processed [`Skeleton`] tree into text.

use crate::error::{EvalResult, EvaluationError, Location};
use crate::eval_context::{EvaluationContext, LoopFrame};
use crate::skeleton::{Skeleton, SkeletonFunction, SkeletonKind, SkeletonNode};
use crate::value::Value;

/// How a statement sequence finished: normally, or by hitting `#break`,
/// `#continue`, or `#return`, which must unwind to the nearest construct
/// that knows how to handle it.
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Renders a whole document from a fresh, empty output buffer.
pub fn render(skeleton: &Skeleton, ctx: &mut EvaluationContext) -> EvalResult<()> {
    match render_body(&skeleton.nodes, ctx)? {
        Flow::Normal => Ok(()),
        Flow::Break | Flow::Continue => Err(EvaluationError::new(
            Location::default(),
            "#break/#continue used outside of a loop",
        )),
        Flow::Return(_) => Err(EvaluationError::new(
            Location::default(),
            "#return used outside of a function",
        )),
    }
}

fn render_body(body: &[SkeletonNode], ctx: &mut EvaluationContext) -> EvalResult<Flow> {
    for node in body {
        match render_node(node, ctx)? {
            Flow::Normal => continue,
            other => return Ok(other),
        }
    }
    Ok(Flow::Normal)
}

fn render_node(node: &SkeletonNode, ctx: &mut EvaluationContext) -> EvalResult<Flow> {
    match &node.kind {
        SkeletonKind::Text(text) => {
            ctx.write(text);
            Ok(Flow::Normal)
        }
        SkeletonKind::Expression(formula) => {
            formula
                .evaluate(ctx)
                .map_err(|e| e.with_outer_location(&node.location))?;
            Ok(Flow::Normal)
        }
        SkeletonKind::Placeholder(formula) => {
            let mark = ctx.output_len();
            match formula.evaluate(ctx) {
                Ok(value) => {
                    ctx.write(&value.to_string());
                    Ok(Flow::Normal)
                }
                Err(e) => {
                    ctx.truncate_output(mark);
                    Err(e.with_outer_location(&node.location))
                }
            }
        }
        SkeletonKind::If {
            branches,
            else_branch,
        } => {
            for (cond, body) in branches {
                if cond
                    .evaluate(ctx)
                    .map_err(|e| e.with_outer_location(&node.location))?
                    .is_truthy()
                {
                    return render_body(body, ctx);
                }
            }
            match else_branch {
                Some(body) => render_body(body, ctx),
                None => Ok(Flow::Normal),
            }
        }
        SkeletonKind::For {
            var,
            iterable,
            body,
            else_branch,
        } => render_for(node, var, iterable, body, else_branch.as_deref(), ctx),
        SkeletonKind::While {
            cond,
            body,
            is_do_while,
        } => render_while(node, cond, body, *is_do_while, ctx),
        SkeletonKind::Function(_) => Ok(Flow::Normal),
        SkeletonKind::Block { name, self_fn } => {
            let f = self_fn.clone().ok_or_else(|| {
                EvaluationError::new(
                    node.location.clone(),
                    format!("internal error: block '{name}' was never resolved"),
                )
            })?;
            f.call(ctx, Vec::new())
                .map_err(|e| e.with_outer_location(&node.location))?;
            Ok(Flow::Normal)
        }
        SkeletonKind::Break => Ok(Flow::Break),
        SkeletonKind::Continue => Ok(Flow::Continue),
        SkeletonKind::Return(expr) => {
            let value = match expr {
                Some(f) => f
                    .evaluate(ctx)
                    .map_err(|e| e.with_outer_location(&node.location))?,
                None => Value::Undefined,
            };
            Ok(Flow::Return(value))
        }
    }
}

fn iterable_elements(value: &Value) -> Vec<Value> {
    match value {
        Value::Vector(items) => items.clone(),
        Value::Map(_) => value
            .items()
            .expect("Value::Map always has an items() representation"),
        other => vec![other.clone()],
    }
}

fn render_for(
    node: &SkeletonNode,
    var: &str,
    iterable: &crate::formula::FormulaNode,
    body: &[SkeletonNode],
    else_branch: Option<&[SkeletonNode]>,
    ctx: &mut EvaluationContext,
) -> EvalResult<Flow> {
    let value = iterable
        .evaluate(ctx)
        .map_err(|e| e.with_outer_location(&node.location))?;
    let elements = iterable_elements(&value);

    if elements.is_empty() {
        return match else_branch {
            Some(body) => render_body(body, ctx),
            None => Ok(Flow::Normal),
        };
    }

    let size = elements.len() as i64;
    for (index, element) in elements.into_iter().enumerate() {
        ctx.push_scope();
        ctx.set_local(var, element);
        ctx.push_loop(LoopFrame {
            count: index as i64,
            size: Some(size),
            first: index == 0,
            last: Some(index as i64 == size - 1),
        });
        let flow = render_body(body, ctx);
        ctx.pop_loop();
        ctx.pop_scope();
        match flow? {
            Flow::Normal | Flow::Continue => continue,
            Flow::Break => break,
            Flow::Return(v) => return Ok(Flow::Return(v)),
        }
    }
    Ok(Flow::Normal)
}

fn render_while(
    node: &SkeletonNode,
    cond: &crate::formula::FormulaNode,
    body: &[SkeletonNode],
    is_do_while: bool,
    ctx: &mut EvaluationContext,
) -> EvalResult<Flow> {
    let mut count = 0i64;
    let mut first = true;
    loop {
        if !is_do_while || count > 0 {
            let keep_going = cond
                .evaluate(ctx)
                .map_err(|e| e.with_outer_location(&node.location))?
                .is_truthy();
            if !keep_going {
                break;
            }
        }
        ctx.push_scope();
        ctx.push_loop(LoopFrame {
            count,
            size: None,
            first,
            last: None,
        });
        let flow = render_body(body, ctx);
        ctx.pop_loop();
        ctx.pop_scope();
        count += 1;
        first = false;
        match flow? {
            Flow::Normal | Flow::Continue => {
                if is_do_while {
                    let keep_going = cond
                        .evaluate(ctx)
                        .map_err(|e| e.with_outer_location(&node.location))?
                        .is_truthy();
                    if !keep_going {
                        break;
                    }
                }
                continue;
            }
            Flow::Break => break,
            Flow::Return(v) => return Ok(Flow::Return(v)),
        }
    }
    Ok(Flow::Normal)
}

/// The [`crate::post_process::Callable`] implementation for both
/// `#function` and `#block` bodies. Functions roll back whatever text their
/// body wrote and surface only their `#return` value; blocks keep their
/// text and must not `#return` at all.
pub fn call_skeleton_function(
    def: &SkeletonFunction,
    ctx: &mut EvaluationContext,
    args: Vec<Value>,
) -> EvalResult<Value> {
    if args.len() != def.params.len() {
        return Err(EvaluationError::new(
            def.location.clone(),
            format!(
                "wrong number of arguments to `{}()`: expected {}, got {}",
                def.name,
                def.params.len(),
                args.len()
            ),
        ));
    }

    ctx.push_scope();
    for (param, value) in def.params.iter().zip(args) {
        ctx.set_local(param, value);
    }

    let mark = ctx.output_len();
    let flow = render_body(&def.body.borrow(), ctx);
    ctx.pop_scope();

    if def.is_block {
        match flow? {
            Flow::Normal => Ok(Value::Undefined),
            Flow::Return(_) => Err(EvaluationError::new(
                def.location.clone(),
                format!("block '{}' must not #return a value", def.name),
            )),
            Flow::Break | Flow::Continue => Err(EvaluationError::new(
                def.location.clone(),
                format!("#break/#continue used outside of a loop in block '{}'", def.name),
            )),
        }
    } else {
        let flow = flow?;
        ctx.truncate_output(mark);
        match flow {
            Flow::Normal => Ok(Value::Undefined),
            Flow::Return(v) => Ok(v),
            Flow::Break | Flow::Continue => Err(EvaluationError::new(
                def.location.clone(),
                format!("#break/#continue used outside of a loop in function '{}'", def.name),
            )),
        }
    }
}
