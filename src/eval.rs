//! Tree-walking evaluator for formulas: turns a post-processed
//! [`FormulaNode`] plus an [`EvaluationContext`] into a [`Value`].

use crate::error::{EvalResult, EvaluationError};
use crate::eval_context::EvaluationContext;
use crate::formula::{FormulaKind, FormulaNode};
use crate::operators::{apply_binop, apply_unary, BinOp, UnaryOp};
use crate::value::Value;

impl FormulaNode {
    pub fn evaluate(&self, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        match &self.kind {
            FormulaKind::Literal(v) => Ok(v.clone()),
            FormulaKind::Name(name) => Ok(ctx.get(name)),
            FormulaKind::LoopVar(name) => Ok(ctx.loop_get(name)),
            FormulaKind::Unary { op, rhs } => {
                let value = rhs.evaluate(ctx)?;
                apply_unary(*op, &value, &self.location)
                    .map_err(|e| e.with_outer_location(&self.location))
            }
            FormulaKind::PrePostIncDec { op, target } => {
                let current = target.evaluate(ctx)?;
                let delta = Value::Integer(1);
                let base_op = match op {
                    UnaryOp::PreIncrement => BinOp::Add,
                    UnaryOp::PreDecrement => BinOp::Sub,
                    _ => unreachable!("only ++/-- produce a PrePostIncDec node"),
                };
                let updated = apply_binop(base_op, &current, &delta, &self.location)
                    .map_err(|e| e.with_outer_location(&self.location))?;
                target.assign(ctx, updated.clone())?;
                Ok(updated)
            }
            FormulaKind::Binary { op, lhs, rhs } => self.evaluate_binary(*op, lhs, rhs, ctx),
            FormulaKind::Filter {
                expr,
                name,
                resolved,
            } => {
                let value = expr.evaluate(ctx)?;
                let f = resolved.as_ref().cloned().ok_or_else(|| {
                    EvaluationError::new(
                        self.location.clone(),
                        format!("internal error: filter '{name}' was never resolved"),
                    )
                })?;
                Ok(Value::String(f(&value.to_string())))
            }
            FormulaKind::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                if cond.evaluate(ctx)?.is_truthy() {
                    then_branch.evaluate(ctx)
                } else {
                    else_branch.evaluate(ctx)
                }
            }
            FormulaKind::Call {
                name,
                args,
                resolved,
            } => {
                let f = resolved.as_ref().cloned().ok_or_else(|| {
                    EvaluationError::new(
                        self.location.clone(),
                        format!("internal error: call to '{name}' was never resolved"),
                    )
                })?;
                let arg_values = args
                    .iter()
                    .map(|a| a.evaluate(ctx))
                    .collect::<EvalResult<Vec<_>>>()?;
                f.call(ctx, arg_values)
                    .map_err(|e| e.with_outer_location(&self.location))
            }
            FormulaKind::MethodCall {
                object,
                name,
                args,
                resolved,
            } => {
                let f = resolved.as_ref().cloned().ok_or_else(|| {
                    EvaluationError::new(
                        self.location.clone(),
                        format!("internal error: method '{name}' was never resolved"),
                    )
                })?;
                let mut receiver = object.evaluate(ctx)?;
                let arg_values = args
                    .iter()
                    .map(|a| a.evaluate(ctx))
                    .collect::<EvalResult<Vec<_>>>()?;
                let result = f
                    .call(ctx, &mut receiver, arg_values)
                    .map_err(|e| e.with_outer_location(&self.location))?;
                // Best-effort write-back so in-place mutating methods (e.g.
                // `.append()`) stick when the receiver is itself an lvalue;
                // calling a method on a temporary (e.g. a vector literal)
                // simply has nothing to write back to.
                let _ = object.assign(ctx, receiver);
                Ok(result)
            }
            FormulaKind::Index { collection, key } => {
                let collection_value = collection.evaluate(ctx)?;
                let key_value = key.evaluate(ctx)?;
                index_value(&collection_value, &key_value, &self.location)
            }
            FormulaKind::VectorLiteral(items) => {
                let values = items
                    .iter()
                    .map(|i| i.evaluate(ctx))
                    .collect::<EvalResult<Vec<_>>>()?;
                Ok(Value::Vector(values))
            }
            FormulaKind::MapLiteral(pairs) => {
                let mut map = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    map.push((k.evaluate(ctx)?, v.evaluate(ctx)?));
                }
                Ok(Value::Map(map))
            }
        }
    }

    fn evaluate_binary(
        &self,
        op: BinOp,
        lhs: &FormulaNode,
        rhs: &FormulaNode,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<Value> {
        if op.is_assignment() {
            let new_value = if op == BinOp::Assign {
                rhs.evaluate(ctx)?
            } else {
                let base = op
                    .compound_base()
                    .expect("is_assignment() implies compound_base() except for plain '='");
                let current = lhs.evaluate(ctx)?;
                let rhs_value = rhs.evaluate(ctx)?;
                apply_binop(base, &current, &rhs_value, &self.location)
                    .map_err(|e| e.with_outer_location(&self.location))?
            };
            lhs.assign(ctx, new_value.clone())?;
            return Ok(new_value);
        }

        match op {
            BinOp::And => {
                let left = lhs.evaluate(ctx)?;
                if !left.is_truthy() {
                    Ok(left)
                } else {
                    rhs.evaluate(ctx)
                }
            }
            BinOp::Or => {
                let left = lhs.evaluate(ctx)?;
                if left.is_truthy() {
                    Ok(left)
                } else {
                    rhs.evaluate(ctx)
                }
            }
            _ => {
                let left = lhs.evaluate(ctx)?;
                let right = rhs.evaluate(ctx)?;
                apply_binop(op, &left, &right, &self.location)
                    .map_err(|e| e.with_outer_location(&self.location))
            }
        }
    }

    /// Evaluates this node as an assignment target and stores `value`
    /// through it. Returns an error for any node that is not an lvalue.
    pub fn assign(&self, ctx: &mut EvaluationContext, value: Value) -> EvalResult<()> {
        match &self.kind {
            FormulaKind::Name(name) => {
                ctx.set(name, value);
                Ok(())
            }
            FormulaKind::Index { collection, key } => {
                let mut container = collection.evaluate(ctx)?;
                let key_value = key.evaluate(ctx)?;
                assign_index(&mut container, &key_value, value, &self.location)?;
                collection.assign(ctx, container)
            }
            FormulaKind::VectorLiteral(targets) => {
                let Value::Vector(values) = value else {
                    return Err(EvaluationError::new(
                        self.location.clone(),
                        "cannot unpack a non-vector value into a vector pattern",
                    ));
                };
                if values.len() != targets.len() {
                    return Err(EvaluationError::new(
                        self.location.clone(),
                        format!(
                            "unpacking assignment expects {} values, got {}",
                            targets.len(),
                            values.len()
                        ),
                    ));
                }
                for (target, v) in targets.iter().zip(values) {
                    target.assign(ctx, v)?;
                }
                Ok(())
            }
            _ => Err(EvaluationError::new(
                self.location.clone(),
                "left-hand side is not assignable",
            )),
        }
    }
}

fn index_value(collection: &Value, key: &Value, loc: &crate::error::Location) -> EvalResult<Value> {
    match collection {
        Value::Vector(items) => {
            let i = key.as_int().ok_or_else(|| {
                EvaluationError::new(loc.clone(), "vector index must be an integer")
            })?;
            let idx = normalize_index(i, items.len());
            Ok(idx.and_then(|i| items.get(i)).cloned().unwrap_or(Value::Undefined))
        }
        Value::Map(_) => Ok(collection.map_get(key)),
        Value::String(s) => {
            let i = key.as_int().ok_or_else(|| {
                EvaluationError::new(loc.clone(), "string index must be an integer")
            })?;
            let chars: Vec<char> = s.chars().collect();
            let idx = normalize_index(i, chars.len());
            Ok(idx
                .and_then(|i| chars.get(i))
                .map(|c| Value::String(c.to_string()))
                .unwrap_or(Value::Undefined))
        }
        _ => Err(EvaluationError::new(
            loc.clone(),
            format!("cannot index a value of type {}", collection.type_name()),
        )),
    }
}

fn normalize_index(i: i64, len: usize) -> Option<usize> {
    if i >= 0 {
        let i = i as usize;
        (i < len).then_some(i)
    } else {
        let from_end = (-i) as usize;
        (from_end <= len).then(|| len - from_end)
    }
}

fn assign_index(
    container: &mut Value,
    key: &Value,
    value: Value,
    loc: &crate::error::Location,
) -> EvalResult<()> {
    match container {
        Value::Vector(items) => {
            let i = key
                .as_int()
                .ok_or_else(|| EvaluationError::new(loc.clone(), "vector index must be an integer"))?;
            let Some(idx) = normalize_index(i, items.len()) else {
                return Err(EvaluationError::new(loc.clone(), "vector index out of range"));
            };
            items[idx] = value;
            Ok(())
        }
        Value::Map(_) => {
            container.map_insert(key.clone(), value);
            Ok(())
        }
        _ => Err(EvaluationError::new(
            loc.clone(),
            format!("cannot index-assign into a value of type {}", container.type_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parse_formula;
    use crate::post_process::PostProcessContext;

    fn run(src: &str, ctx: &mut EvaluationContext) -> Value {
        let mut tree = parse_formula(src).unwrap();
        tree.post_process(&mut PostProcessContext::new()).unwrap();
        tree.evaluate(ctx).unwrap()
    }

    #[test]
    fn arithmetic_precedence() {
        let mut ctx = EvaluationContext::new();
        assert_eq!(run("1 + 2 * 3", &mut ctx), Value::Integer(7));
    }

    #[test]
    fn assignment_creates_and_reads_back() {
        let mut ctx = EvaluationContext::new();
        assert_eq!(run("x = 5", &mut ctx), Value::Integer(5));
        assert_eq!(ctx.get("x"), Value::Integer(5));
    }

    #[test]
    fn compound_assignment_is_right_associative_and_sequential() {
        let mut ctx = EvaluationContext::new();
        ctx.set_global("a", Value::Integer(10));
        ctx.set_global("b", Value::Integer(3));
        // a -= b -= 1  =>  b = b - 1 = 2, then a = a - b = 8
        assert_eq!(run("a -= b -= 1", &mut ctx), Value::Integer(8));
        assert_eq!(ctx.get("b"), Value::Integer(2));
    }

    #[test]
    fn short_circuit_or_skips_rhs() {
        let mut ctx = EvaluationContext::new();
        assert_eq!(run("1 || (x = 99)", &mut ctx), Value::Integer(1));
        assert_eq!(ctx.get("x"), Value::Undefined);
    }

    #[test]
    fn indexing_and_negative_index() {
        let mut ctx = EvaluationContext::new();
        assert_eq!(run("[10, 20, 30][-1]", &mut ctx), Value::Integer(30));
    }

    #[test]
    fn ternary_chooses_branch() {
        let mut ctx = EvaluationContext::new();
        assert_eq!(run("1 > 0 ? 1 : 2", &mut ctx), Value::Integer(1));
    }

    #[test]
    fn prefix_increment_mutates_and_returns_new_value() {
        let mut ctx = EvaluationContext::new();
        ctx.set_global("x", Value::Integer(4));
        assert_eq!(run("++x", &mut ctx), Value::Integer(5));
        assert_eq!(ctx.get("x"), Value::Integer(5));
    }
}
