//! skelform - a two-layer text templating engine.
//!
//! The **formula** sublanguage is a small C-like expression language:
//! arithmetic, comparisons, ternaries, vector/map literals, function and
//! method calls, and a `expr ! filter` pipeline operator. The **skeleton**
//! language is built on top of it: plain text interspersed with
//! `${formula}` placeholders and `#`-prefixed statements (`#if`/`#for`/
//! `#while`/`#function`/`#block`/`#include`, ...).
//!
//! # Quick Start
//!
//! ```
//! use skelform::{Template, Value};
//!
//! let template = Template::parse(r#"
//! #for item : items
//! - ${item.name}: ${item.price ! decimal}
//! #end
//! "#).unwrap();
//!
//! let items = Value::Vector(vec![Value::Map(vec![
//!     (Value::String("name".to_string()), Value::String("Coffee".to_string())),
//!     (Value::String("price".to_string()), Value::Float(3.5)),
//! ])]);
//!
//! let output = template.render([("items".to_string(), items)]).unwrap();
//! assert!(output.contains("Coffee"));
//! ```
//!
//! # Layers
//!
//! - [`parse_formula`] / [`FormulaNode`]: parse and hold a single formula.
//! - [`PostProcessContext`]: resolves every call/method/filter name once,
//!   after parsing and before evaluation.
//! - [`EvaluationContext`]: scopes, loop state, and the output buffer
//!   shared across one render.
//! - [`Skeleton`] / the `skeleton_parser` module: the document language.
//! - [`Template`]: the ergonomic parse-once, render-many entry point.
//!
//! # Extending
//!
//! Built-in functions, methods, and filters are registered into a
//! [`PostProcessContext`] (see [`PostProcessContext::with_defaults`]); a
//! host embedding skelform can register its own alongside or instead of
//! the defaults before parsing.
//!
//! # Errors
//!
//! [`ParseError`] covers lexing, parsing, and name resolution; it carries a
//! source [`Location`]. [`EvaluationError`] covers failures during
//! rendering.
//!
//! # Not Supported
//!
//! - Postfix `++`/`--` (prefix only)
//! - Bare (non-call) member access — only `.name(args)` method calls
//! - Concurrent rendering of one [`Template`] from multiple threads (the
//!   evaluator is intentionally single-threaded; wrap in your own `Mutex`
//!   if you need to share one across threads)

mod builtins;
mod error;
mod eval;
mod eval_context;
mod formula;
mod lexer;
mod loader;
mod operators;
mod post_process;
mod sandbox;
mod skeleton;
mod skeleton_eval;
mod skeleton_parser;
mod value;

pub use error::{EvalResult, EvaluationError, IoError, Location, ParseError, ParseResult};
pub use eval_context::{EvaluationContext, LoopFrame};
pub use formula::{parse_formula, FormulaKind, FormulaNode};
pub use loader::{FsLoader, Loader};
pub use post_process::{Callable, FilterFn, FunctionFn, MethodCallable, MethodFn, PostProcessContext};
pub use sandbox::Template;
pub use skeleton::{Skeleton, SkeletonFunction, SkeletonKind, SkeletonNode};
pub use skeleton_parser::{parse_skeleton, parse_skeleton_file};
pub use value::{Date, Value};
