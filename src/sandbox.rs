use crate::error::{EvalResult, ParseResult};
use crate::eval_context::EvaluationContext;
use crate::loader::{FsLoader, Loader};
use crate::post_process::PostProcessContext;
use crate::skeleton::Skeleton;
use crate::skeleton_parser::{parse_skeleton, parse_skeleton_file};
use crate::value::Value;
use std::path::Path;

/// A parsed, name-resolved skeleton document, ready to render.
///
/// Parsing and rendering are split on purpose: `parse`/`parse_file` do all
/// the work that only depends on the source text (lexing, the statement
/// stack, resolving every call/method/filter name against the built-ins),
/// so a single `Template` can be rendered many times against different
/// globals without repeating that work.
///
/// # Example
///
/// ```
/// use skelform::{Template, Value};
///
/// let template = Template::parse("Hello, ${name}!").unwrap();
/// let output = template.render([("name".to_string(), Value::String("Ada".to_string()))]).unwrap();
/// assert_eq!(output, "Hello, Ada!");
/// ```
pub struct Template {
    skeleton: Skeleton,
}

impl Template {
    /// Parses `source` with the default built-in functions, methods, and
    /// filters. `#include` directives are rejected, since there is no
    /// [`Loader`] to resolve them against.
    pub fn parse(source: &str) -> ParseResult<Self> {
        let mut ctx = PostProcessContext::with_defaults();
        let mut skeleton = parse_skeleton(source, &mut ctx)?;
        skeleton.post_process(&mut ctx)?;
        Ok(Self { skeleton })
    }

    /// Parses a skeleton file from the local filesystem, resolving any
    /// `#include` directives relative to its containing directory.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use skelform::Template;
    /// use std::path::Path;
    ///
    /// let template = Template::parse_file(Path::new("report.skel")).unwrap();
    /// ```
    pub fn parse_file(path: &Path) -> ParseResult<Self> {
        Self::parse_file_with_loader(path, &FsLoader)
    }

    /// Like [`Template::parse_file`], but resolves `#include` directives
    /// through a caller-supplied [`Loader`] instead of the real filesystem.
    pub fn parse_file_with_loader(path: &Path, loader: &dyn Loader) -> ParseResult<Self> {
        let mut ctx = PostProcessContext::with_defaults();
        let mut skeleton = parse_skeleton_file(path, loader, &mut ctx)?;
        skeleton.post_process(&mut ctx)?;
        Ok(Self { skeleton })
    }

    /// Renders this template against a fresh evaluation context seeded with
    /// `globals`.
    ///
    /// # Example
    ///
    /// ```
    /// use skelform::{Template, Value};
    ///
    /// let template = Template::parse("#for n : items\n${n} \n#end").unwrap();
    /// let items = Value::Vector(vec![Value::Integer(1), Value::Integer(2)]);
    /// let output = template.render([("items".to_string(), items)]).unwrap();
    /// assert_eq!(output, "1 \n2 \n");
    /// ```
    pub fn render(&self, globals: impl IntoIterator<Item = (String, Value)>) -> EvalResult<String> {
        let mut ctx = EvaluationContext::new();
        for (name, value) in globals {
            ctx.set_global(&name, value);
        }
        crate::skeleton_eval::render(&self.skeleton, &mut ctx)?;
        Ok(ctx.into_output())
    }

    /// Renders this template directly against a caller-built
    /// [`EvaluationContext`], for callers that need to pre-seed loop state
    /// or reuse a context across several templates.
    pub fn render_with(&self, ctx: &mut EvaluationContext) -> EvalResult<()> {
        crate::skeleton_eval::render(&self.skeleton, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_conditional_branches() {
        let template = Template::parse("#if flag\nyes\n#else\nno\n#end").unwrap();
        let out = template.render([("flag".to_string(), Value::Bool(true))]).unwrap();
        assert_eq!(out, "yes\n");
    }

    #[test]
    fn render_with_reuses_an_existing_context() {
        let template = Template::parse("${x + 1}").unwrap();
        let mut ctx = EvaluationContext::new();
        ctx.set_global("x", Value::Integer(41));
        template.render_with(&mut ctx).unwrap();
        assert_eq!(ctx.output(), "42");
    }
}
