//! Built-in functions, methods, and filters registered into every fresh
//! [`PostProcessContext`].
//!
//! - Type conversions: `float`, `integer`, `decimal`, `string`, `boolean`
//! - Collections: `size`, `keys`, `values`, `items`, `sort`
//! - Methods: `append`, `push`, `contains`, `pop`, `year`, `quarter`,
//!   `month`, `day`
//! - Filters: `id`, `url`

use crate::error::{EvalResult, EvaluationError, Location};
use crate::post_process::{native_filter, native_function, native_method, PostProcessContext};
use crate::value::Value;

fn arity_error(name: &str, expected: &str, got: usize) -> EvaluationError {
    EvaluationError::new(
        Location::default(),
        format!("{name}() expects {expected} argument(s), got {got}"),
    )
}

fn one_arg<'a>(name: &str, args: &'a [Value]) -> EvalResult<&'a Value> {
    if args.len() != 1 {
        return Err(arity_error(name, "1", args.len()));
    }
    Ok(&args[0])
}

pub fn register_defaults(ctx: &mut PostProcessContext) {
    ctx.register_function(
        "float",
        native_function(|_ctx, args| {
            let v = one_arg("float", &args)?;
            v.as_float().map(Value::Float).ok_or_else(|| {
                EvaluationError::new(
                    Location::default(),
                    format!("cannot convert {} to float", v.type_name()),
                )
            })
        }),
    );
    ctx.register_function(
        "integer",
        native_function(|_ctx, args| {
            let v = one_arg("integer", &args)?;
            v.as_int().map(Value::Integer).ok_or_else(|| {
                EvaluationError::new(
                    Location::default(),
                    format!("cannot convert {} to integer", v.type_name()),
                )
            })
        }),
    );
    ctx.register_function(
        "decimal",
        native_function(|_ctx, args| {
            let v = one_arg("decimal", &args)?;
            v.as_float().map(Value::Float).ok_or_else(|| {
                EvaluationError::new(
                    Location::default(),
                    format!("cannot convert {} to decimal", v.type_name()),
                )
            })
        }),
    );
    ctx.register_function(
        "string",
        native_function(|_ctx, args| {
            let v = one_arg("string", &args)?;
            Ok(Value::String(v.to_string()))
        }),
    );
    ctx.register_function(
        "boolean",
        native_function(|_ctx, args| {
            let v = one_arg("boolean", &args)?;
            Ok(Value::Bool(v.is_truthy()))
        }),
    );
    ctx.register_function(
        "size",
        native_function(|_ctx, args| {
            let v = one_arg("size", &args)?;
            v.len().map(|n| Value::Integer(n as i64)).ok_or_else(|| {
                EvaluationError::new(
                    Location::default(),
                    format!("{} has no size", v.type_name()),
                )
            })
        }),
    );
    ctx.register_function(
        "keys",
        native_function(|_ctx, args| {
            let v = one_arg("keys", &args)?;
            v.keys().map(Value::Vector).ok_or_else(|| {
                EvaluationError::new(Location::default(), "keys() requires a map")
            })
        }),
    );
    ctx.register_function(
        "values",
        native_function(|_ctx, args| {
            let v = one_arg("values", &args)?;
            v.values().map(Value::Vector).ok_or_else(|| {
                EvaluationError::new(Location::default(), "values() requires a map")
            })
        }),
    );
    ctx.register_function(
        "items",
        native_function(|_ctx, args| {
            let v = one_arg("items", &args)?;
            v.items().map(Value::Vector).ok_or_else(|| {
                EvaluationError::new(Location::default(), "items() requires a map")
            })
        }),
    );
    ctx.register_function(
        "sort",
        native_function(|_ctx, args| {
            let v = one_arg("sort", &args)?;
            let Value::Vector(items) = v else {
                return Err(EvaluationError::new(Location::default(), "sort() requires a vector"));
            };
            let mut sorted = items.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            Ok(Value::Vector(sorted))
        }),
    );

    ctx.register_method(
        "append",
        native_method(|_ctx, receiver, mut args| {
            if args.len() != 1 {
                return Err(arity_error("append", "1", args.len()));
            }
            let items = receiver.as_vector_mut().ok_or_else(|| {
                EvaluationError::new(Location::default(), "append() requires a vector receiver")
            })?;
            items.push(args.remove(0));
            Ok(Value::Undefined)
        }),
    );
    ctx.register_method(
        "push",
        native_method(|_ctx, receiver, mut args| {
            if args.len() != 1 {
                return Err(arity_error("push", "1", args.len()));
            }
            let items = receiver.as_vector_mut().ok_or_else(|| {
                EvaluationError::new(Location::default(), "push() requires a vector receiver")
            })?;
            items.push(args.remove(0));
            Ok(Value::Undefined)
        }),
    );
    ctx.register_method(
        "pop",
        native_method(|_ctx, receiver, args| {
            if !args.is_empty() {
                return Err(arity_error("pop", "0", args.len()));
            }
            let items = receiver.as_vector_mut().ok_or_else(|| {
                EvaluationError::new(Location::default(), "pop() requires a vector receiver")
            })?;
            Ok(items.pop().unwrap_or(Value::Undefined))
        }),
    );
    ctx.register_method(
        "contains",
        native_method(|_ctx, receiver, args| {
            if args.len() != 1 {
                return Err(arity_error("contains", "1", args.len()));
            }
            receiver.contains(&args[0]).map(Value::Bool).ok_or_else(|| {
                EvaluationError::new(
                    Location::default(),
                    format!("contains() is not defined for {}", receiver.type_name()),
                )
            })
        }),
    );
    ctx.register_method(
        "year",
        native_method(|_ctx, receiver, args| {
            if !args.is_empty() {
                return Err(arity_error("year", "0", args.len()));
            }
            match receiver {
                Value::Date(d) => Ok(Value::Integer(d.year as i64)),
                other => Err(EvaluationError::new(
                    Location::default(),
                    format!("year() requires a date, got {}", other.type_name()),
                )),
            }
        }),
    );
    ctx.register_method(
        "quarter",
        native_method(|_ctx, receiver, args| {
            if !args.is_empty() {
                return Err(arity_error("quarter", "0", args.len()));
            }
            match receiver {
                Value::Date(d) => Ok(d.quarter().map(|q| Value::Integer(q as i64)).unwrap_or(Value::Undefined)),
                other => Err(EvaluationError::new(
                    Location::default(),
                    format!("quarter() requires a date, got {}", other.type_name()),
                )),
            }
        }),
    );
    ctx.register_method(
        "month",
        native_method(|_ctx, receiver, args| {
            if !args.is_empty() {
                return Err(arity_error("month", "0", args.len()));
            }
            match receiver {
                Value::Date(d) => Ok(Value::Integer(d.month as i64)),
                other => Err(EvaluationError::new(
                    Location::default(),
                    format!("month() requires a date, got {}", other.type_name()),
                )),
            }
        }),
    );
    ctx.register_method(
        "day",
        native_method(|_ctx, receiver, args| {
            if !args.is_empty() {
                return Err(arity_error("day", "0", args.len()));
            }
            match receiver {
                Value::Date(d) => Ok(Value::Integer(d.day as i64)),
                other => Err(EvaluationError::new(
                    Location::default(),
                    format!("day() requires a date, got {}", other.type_name()),
                )),
            }
        }),
    );

    ctx.register_filter("id", native_filter(|s| s.to_string()));
    ctx.register_filter("url", native_filter(|s| url_encode(s)));
}

fn url_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval_context::EvaluationContext;
    use crate::formula::parse_formula;

    fn run(src: &str) -> Value {
        let mut ctx = PostProcessContext::with_defaults();
        let mut tree = parse_formula(src).unwrap();
        tree.post_process(&mut ctx).unwrap();
        tree.evaluate(&mut EvaluationContext::new()).unwrap()
    }

    #[test]
    fn size_of_vector() {
        assert_eq!(run("size([1, 2, 3])"), Value::Integer(3));
    }

    #[test]
    fn string_conversion() {
        assert_eq!(run("string(42)"), Value::String("42".to_string()));
    }

    #[test]
    fn sort_orders_ascending() {
        assert_eq!(
            run("sort([3, 1, 2])"),
            Value::Vector(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
        );
    }

    #[test]
    fn url_filter_escapes_reserved_characters() {
        assert_eq!(url_encode("a b/c"), "a%20b%2Fc");
    }
}
