//! Character-level scanner that turns skeleton source text into a
//! [`Skeleton`] tree: text runs, `${...}` placeholders, `\`-escapes, and
//! `#`-prefixed statements tracked on an explicit frame stack (rather than
//! true recursion, so one scan produces the whole tree without the call
//! stack growing with document depth).

use std::cell::RefCell;
use std::mem;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::{Location, ParseError, ParseResult};
use crate::formula::{parse_formula, FormulaKind, FormulaNode};
use crate::loader::Loader;
use crate::post_process::{Callable, PostProcessContext};
use crate::skeleton::{Skeleton, SkeletonFunction, SkeletonKind, SkeletonNode};
use crate::value::Value;

/// Parses a skeleton with no `#include` support (no loader is available).
pub fn parse_skeleton(source: &str, ctx: &mut PostProcessContext) -> ParseResult<Skeleton> {
    let mut parser = Parser::new(source, None, PathBuf::from("."), ctx);
    parser.run()
}

/// Parses a skeleton file, resolving any `#include` directives relative to
/// its containing directory through `loader`.
pub fn parse_skeleton_file(
    path: &Path,
    loader: &dyn Loader,
    ctx: &mut PostProcessContext,
) -> ParseResult<Skeleton> {
    let source = loader.read_file(path)?;
    let origin = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    let mut parser = Parser::new(&source, Some(loader), origin, ctx);
    parser.run()
}

/// Scans forward from `start` for the first top-level occurrence of
/// `terminator`, skipping over quoted strings (with backslash escapes) and
/// treating `( [ {` / `) ] }` as nesting so a formula containing its own
/// brackets (a map literal, a nested call) doesn't end the scan early.
/// Independent of the formula grammar itself — it only needs to know where
/// the formula's source text ends, not what it means.
fn find_end_of_formula(src: &str, start: usize, terminator: &str) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut depth = 0i32;
    let mut i = start;
    while i < bytes.len() {
        if depth == 0 && src[i..].starts_with(terminator) {
            return Some(i);
        }
        match bytes[i] {
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'{' | b'(' | b'[' => depth += 1,
            b'}' | b')' | b']' => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    None
}

/// One `#`-delimited block currently open on the parser's frame stack.
enum Frame {
    If {
        branches: Vec<(FormulaNode, Vec<SkeletonNode>)>,
        pending_cond: FormulaNode,
        current_body: Vec<SkeletonNode>,
        else_body: Option<Vec<SkeletonNode>>,
        in_else: bool,
    },
    For {
        var: String,
        iterable: FormulaNode,
        body: Vec<SkeletonNode>,
        else_body: Option<Vec<SkeletonNode>>,
        in_else: bool,
    },
    While {
        cond: FormulaNode,
        body: Vec<SkeletonNode>,
    },
    Do {
        body: Vec<SkeletonNode>,
    },
    Function {
        name: String,
        params: Vec<String>,
        body: Vec<SkeletonNode>,
        location: Location,
    },
    Block {
        name: String,
        body: Vec<SkeletonNode>,
        location: Location,
    },
}

struct Parser<'a> {
    chars: Vec<(usize, char)>,
    source: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    loader: Option<&'a dyn Loader>,
    origin: PathBuf,
    ctx: &'a mut PostProcessContext,
    stack: Vec<Frame>,
    root: Vec<SkeletonNode>,
    definitions: Vec<Rc<SkeletonFunction>>,
    text_buf: String,
    text_start_line: usize,
    text_start_column: usize,
}

const KEYWORDS: &[&str] = &[
    "if", "elif", "else", "end", "for", "while", "do", "function", "block", "break", "continue",
    "return", "include",
];

impl<'a> Parser<'a> {
    fn new(
        source: &'a str,
        loader: Option<&'a dyn Loader>,
        origin: PathBuf,
        ctx: &'a mut PostProcessContext,
    ) -> Self {
        Self {
            chars: source.char_indices().collect(),
            source,
            pos: 0,
            line: 1,
            column: 1,
            loader,
            origin,
            ctx,
            stack: Vec::new(),
            root: Vec::new(),
            definitions: Vec::new(),
            text_buf: String::new(),
            text_start_line: 1,
            text_start_column: 1,
        }
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).map(|(_, c)| *c)
    }

    fn byte_offset(&self) -> usize {
        self.chars.get(self.pos).map(|(i, _)| *i).unwrap_or(self.source.len())
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn advance_to_byte(&mut self, target: usize) {
        while self.byte_offset() < target && self.peek().is_some() {
            self.advance();
        }
    }

    fn run(mut self) -> ParseResult<Skeleton> {
        while let Some(c) = self.peek() {
            match c {
                '\\' => {
                    self.advance();
                    match self.peek() {
                        Some('\n') => {
                            self.advance();
                        }
                        Some(_) => {
                            if self.text_buf.is_empty() {
                                self.text_start_line = self.line;
                                self.text_start_column = self.column;
                            }
                            if let Some(escaped) = self.advance() {
                                self.text_buf.push(escaped);
                            }
                        }
                        None => {
                            return Err(ParseError::new(self.location(), "dangling '\\' escape at end of input"))
                        }
                    }
                }
                '$' if self.peek_at(1) == Some('{') => {
                    self.advance();
                    self.advance();
                    let formula = self.scan_braced_formula()?;
                    self.flush_text();
                    let location = self.location();
                    self.push_node(SkeletonNode::new(location, SkeletonKind::Placeholder(formula)));
                }
                '#' => {
                    self.advance();
                    self.handle_directive()?;
                }
                _ => {
                    if self.text_buf.is_empty() {
                        self.text_start_line = self.line;
                        self.text_start_column = self.column;
                    }
                    self.text_buf.push(c);
                    self.advance();
                }
            }
        }
        self.flush_text();

        if !self.stack.is_empty() {
            return Err(ParseError::new(self.location(), "unclosed block at end of input"));
        }

        Ok(Skeleton {
            nodes: self.root,
            definitions: self.definitions,
        })
    }

    fn flush_text(&mut self) {
        if self.text_buf.is_empty() {
            return;
        }
        let text = mem::take(&mut self.text_buf);
        let location = Location::new(self.text_start_line, self.text_start_column);
        self.current_body_mut().push(SkeletonNode::new(location, SkeletonKind::Text(text)));
    }

    /// Trims trailing spaces/tabs from the preceding text node, if there is
    /// one, since every `#`-statement occupies a full line of its own.
    fn left_align(&mut self) {
        if let Some(node) = self.current_body_mut().last_mut() {
            if let SkeletonKind::Text(text) = &mut node.kind {
                while matches!(text.chars().last(), Some(' ' | '\t')) {
                    text.pop();
                }
            }
        }
    }

    fn current_body_mut(&mut self) -> &mut Vec<SkeletonNode> {
        match self.stack.last_mut() {
            None => &mut self.root,
            Some(Frame::If {
                current_body,
                else_body,
                in_else,
                ..
            }) => {
                if *in_else {
                    else_body.as_mut().expect("in_else implies else_body is Some")
                } else {
                    current_body
                }
            }
            Some(Frame::For {
                body,
                else_body,
                in_else,
                ..
            }) => {
                if *in_else {
                    else_body.as_mut().expect("in_else implies else_body is Some")
                } else {
                    body
                }
            }
            Some(Frame::While { body, .. }) => body,
            Some(Frame::Do { body, .. }) => body,
            Some(Frame::Function { body, .. }) => body,
            Some(Frame::Block { body, .. }) => body,
        }
    }

    fn push_node(&mut self, node: SkeletonNode) {
        self.current_body_mut().push(node);
    }

    /// Finds the matching `}` for a `${` placeholder already consumed,
    /// parses the enclosed formula, and advances past the closing brace.
    fn scan_braced_formula(&mut self) -> ParseResult<FormulaNode> {
        let start = self.byte_offset();
        let end = find_end_of_formula(self.source, start, "}")
            .ok_or_else(|| ParseError::new(self.location(), "unterminated placeholder, missing '}'"))?;
        self.advance_to_byte(end);
        let text = &self.source[start..end];
        let formula = parse_formula(text)?;
        self.advance(); // consume closing '}'
        Ok(formula)
    }

    /// Reads the rest of the current line (not including the newline) and
    /// consumes the newline itself so it doesn't appear in surrounding text.
    /// A directive whose formula portion contains an unbalanced opening
    /// bracket (e.g. an unfinished map literal) spans further lines, since
    /// `find_end_of_formula` only stops on a top-level newline.
    fn read_rest_of_line(&mut self) -> String {
        let start = self.byte_offset();
        let end = find_end_of_formula(self.source, start, "\n").unwrap_or(self.source.len());
        self.advance_to_byte(end);
        let text = self.source[start..end].trim().to_string();
        if self.peek() == Some('\n') {
            self.advance();
        }
        text
    }

    fn handle_directive(&mut self) -> ParseResult<()> {
        let location = self.location();
        self.flush_text();
        self.left_align();

        let line = self.read_rest_of_line();
        let mut parts = line.splitn(2, char::is_whitespace);
        let keyword = parts.next().unwrap_or("").to_string();
        let rest = parts.next().unwrap_or("").trim().to_string();

        if !KEYWORDS.contains(&keyword.as_str()) {
            let expr = parse_formula(&line)?;
            self.push_node(SkeletonNode::new(location, SkeletonKind::Expression(expr)));
            return Ok(());
        }

        match keyword.as_str() {
            "if" => {
                let cond = parse_formula(&rest)?;
                self.stack.push(Frame::If {
                    branches: Vec::new(),
                    pending_cond: cond,
                    current_body: Vec::new(),
                    else_body: None,
                    in_else: false,
                });
                Ok(())
            }
            "elif" => {
                let Some(Frame::If {
                    branches,
                    pending_cond,
                    current_body,
                    in_else,
                    ..
                }) = self.stack.last_mut()
                else {
                    return Err(ParseError::new(location, "#elif without a matching #if"));
                };
                if *in_else {
                    return Err(ParseError::new(location, "#elif after #else"));
                }
                let new_cond = parse_formula(&rest)?;
                let old_cond = mem::replace(pending_cond, new_cond);
                let old_body = mem::take(current_body);
                branches.push((old_cond, old_body));
                Ok(())
            }
            "else" => match self.stack.last_mut() {
                Some(Frame::If {
                    branches,
                    pending_cond,
                    current_body,
                    else_body,
                    in_else,
                }) => {
                    if *in_else {
                        return Err(ParseError::new(location, "multiple #else for one #if"));
                    }
                    let dummy = FormulaNode {
                        location: location.clone(),
                        kind: FormulaKind::Literal(Value::Undefined),
                    };
                    let old_cond = mem::replace(pending_cond, dummy);
                    let old_body = mem::take(current_body);
                    branches.push((old_cond, old_body));
                    *in_else = true;
                    *else_body = Some(Vec::new());
                    Ok(())
                }
                Some(Frame::For { else_body, in_else, .. }) => {
                    if *in_else {
                        return Err(ParseError::new(location, "multiple #else for one #for"));
                    }
                    *in_else = true;
                    *else_body = Some(Vec::new());
                    Ok(())
                }
                _ => Err(ParseError::new(location, "#else without a matching #if or #for")),
            },
            "end" => self.handle_end(location),
            "for" => {
                let colon = rest
                    .find(':')
                    .ok_or_else(|| ParseError::new(location.clone(), "expected '#for NAME : EXPR'"))?;
                let var = rest[..colon].trim().to_string();
                let expr_src = rest[colon + 1..].trim();
                if var.is_empty() || expr_src.is_empty() {
                    return Err(ParseError::new(location, "expected '#for NAME : EXPR'"));
                }
                let iterable = parse_formula(expr_src)?;
                self.stack.push(Frame::For {
                    var,
                    iterable,
                    body: Vec::new(),
                    else_body: None,
                    in_else: false,
                });
                Ok(())
            }
            "while" => {
                if matches!(self.stack.last(), Some(Frame::Do { .. })) {
                    let Some(Frame::Do { body }) = self.stack.pop() else {
                        unreachable!()
                    };
                    let cond = parse_formula(&rest)?;
                    self.push_node(SkeletonNode::new(
                        location,
                        SkeletonKind::While {
                            cond,
                            body,
                            is_do_while: true,
                        },
                    ));
                    Ok(())
                } else {
                    let cond = parse_formula(&rest)?;
                    self.stack.push(Frame::While { cond, body: Vec::new() });
                    Ok(())
                }
            }
            "do" => {
                if !rest.is_empty() {
                    return Err(ParseError::new(location, "#do takes no arguments"));
                }
                self.stack.push(Frame::Do { body: Vec::new() });
                Ok(())
            }
            "function" => {
                let (name, params) = parse_signature(&rest, &location)?;
                self.stack.push(Frame::Function {
                    name,
                    params,
                    body: Vec::new(),
                    location,
                });
                Ok(())
            }
            "block" => {
                let name = rest.trim().to_string();
                if name.is_empty() || !is_identifier(&name) {
                    return Err(ParseError::new(location, "expected '#block NAME'"));
                }
                self.stack.push(Frame::Block {
                    name,
                    body: Vec::new(),
                    location,
                });
                Ok(())
            }
            "break" => {
                self.push_node(SkeletonNode::new(location, SkeletonKind::Break));
                Ok(())
            }
            "continue" => {
                self.push_node(SkeletonNode::new(location, SkeletonKind::Continue));
                Ok(())
            }
            "return" => {
                let expr = if rest.is_empty() {
                    None
                } else {
                    Some(parse_formula(&rest)?)
                };
                self.push_node(SkeletonNode::new(location, SkeletonKind::Return(expr)));
                Ok(())
            }
            "include" => self.handle_include(&rest, &location),
            _ => unreachable!("keyword already validated against KEYWORDS"),
        }
    }

    fn handle_end(&mut self, location: Location) -> ParseResult<()> {
        match self.stack.pop() {
            Some(Frame::If {
                mut branches,
                pending_cond,
                current_body,
                else_body,
                in_else,
            }) => {
                if !in_else {
                    branches.push((pending_cond, current_body));
                }
                self.push_node(SkeletonNode::new(
                    location,
                    SkeletonKind::If {
                        branches,
                        else_branch: else_body,
                    },
                ));
                Ok(())
            }
            Some(Frame::For {
                var,
                iterable,
                body,
                else_body,
                ..
            }) => {
                self.push_node(SkeletonNode::new(
                    location,
                    SkeletonKind::For {
                        var,
                        iterable,
                        body,
                        else_branch: else_body,
                    },
                ));
                Ok(())
            }
            Some(Frame::While { cond, body }) => {
                self.push_node(SkeletonNode::new(
                    location,
                    SkeletonKind::While {
                        cond,
                        body,
                        is_do_while: false,
                    },
                ));
                Ok(())
            }
            Some(Frame::Function {
                name,
                params,
                body,
                location: def_loc,
            }) => {
                let super_binding = self.ctx.get_function(&name);
                let def = Rc::new(SkeletonFunction {
                    name: name.clone(),
                    params,
                    body: RefCell::new(body),
                    super_binding,
                    is_block: false,
                    location: def_loc,
                });
                self.ctx.set_function(name, def.clone() as Rc<dyn Callable>);
                self.definitions.push(def.clone());
                self.push_node(SkeletonNode::new(location, SkeletonKind::Function(def)));
                Ok(())
            }
            Some(Frame::Block {
                name,
                body,
                location: def_loc,
            }) => {
                let super_binding = self.ctx.get_function(&name);
                let def = Rc::new(SkeletonFunction {
                    name: name.clone(),
                    params: Vec::new(),
                    body: RefCell::new(body),
                    super_binding,
                    is_block: true,
                    location: def_loc,
                });
                self.ctx.set_function(name.clone(), def.clone() as Rc<dyn Callable>);
                self.definitions.push(def);
                self.push_node(SkeletonNode::new(location, SkeletonKind::Block { name, self_fn: None }));
                Ok(())
            }
            Some(Frame::Do { .. }) => Err(ParseError::new(
                location,
                "#end cannot close a #do block; close it with '#while EXPR'",
            )),
            None => Err(ParseError::new(location, "#end without a matching opening statement")),
        }
    }

    fn handle_include(&mut self, expr_src: &str, location: &Location) -> ParseResult<()> {
        let Some(loader) = self.loader else {
            return Err(ParseError::new(
                location.clone(),
                "#include requires a loader, but this skeleton was parsed from a bare string",
            ));
        };
        let path_formula = parse_formula(expr_src)?;
        let mut throwaway_post = PostProcessContext::with_defaults();
        let mut resolved = path_formula;
        resolved.post_process(&mut throwaway_post)?;
        let mut throwaway_eval = crate::eval_context::EvaluationContext::new();
        let path_value = resolved
            .evaluate(&mut throwaway_eval)
            .map_err(|e| ParseError::new(location.clone(), e.message))?;
        let Value::String(relative) = path_value else {
            return Err(ParseError::new(location.clone(), "#include path must evaluate to a string"));
        };
        let full_path = self.origin.join(relative);
        let included = parse_skeleton_file(&full_path, loader, self.ctx)?;
        self.definitions.extend(included.definitions);
        for node in included.nodes {
            self.push_node(node);
        }
        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn parse_signature(rest: &str, location: &Location) -> ParseResult<(String, Vec<String>)> {
    let open = rest
        .find('(')
        .ok_or_else(|| ParseError::new(location.clone(), "expected '#function NAME(params)'"))?;
    let close = rest
        .rfind(')')
        .ok_or_else(|| ParseError::new(location.clone(), "expected closing ')' in function signature"))?;
    let name = rest[..open].trim().to_string();
    if !is_identifier(&name) {
        return Err(ParseError::new(location.clone(), format!("invalid function name '{name}'")));
    }
    let params = rest[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    Ok((name, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Skeleton {
        let mut ctx = PostProcessContext::with_defaults();
        parse_skeleton(source, &mut ctx).unwrap()
    }

    #[test]
    fn plain_text_round_trips() {
        let skeleton = parse("hello world");
        assert_eq!(skeleton.nodes.len(), 1);
        assert!(matches!(&skeleton.nodes[0].kind, SkeletonKind::Text(t) if t == "hello world"));
    }

    #[test]
    fn placeholder_is_parsed() {
        let skeleton = parse("x = ${1 + 2}");
        assert!(matches!(skeleton.nodes[1].kind, SkeletonKind::Placeholder(_)));
    }

    #[test]
    fn if_else_produces_branches() {
        let skeleton = parse("#if x\nyes\n#else\nno\n#end");
        let SkeletonKind::If { branches, else_branch } = &skeleton.nodes[0].kind else {
            panic!("expected an if node");
        };
        assert_eq!(branches.len(), 1);
        assert!(else_branch.is_some());
    }

    #[test]
    fn for_loop_header_parses_var_and_iterable() {
        let skeleton = parse("#for item : items\n${item}\n#end");
        assert!(matches!(skeleton.nodes[0].kind, SkeletonKind::For { .. }));
    }

    #[test]
    fn backslash_escapes_directive_marker() {
        let skeleton = parse("price: \\#5");
        assert!(matches!(&skeleton.nodes[0].kind, SkeletonKind::Text(t) if t == "price: #5"));
    }

    #[test]
    fn backslash_newline_is_a_line_continuation() {
        let skeleton = parse("a\\\nb");
        assert!(matches!(&skeleton.nodes[0].kind, SkeletonKind::Text(t) if t == "ab"));
    }

    #[test]
    fn left_align_trims_trailing_spaces_before_end() {
        let skeleton = parse("a   \n#if true\nb\n#end");
        assert!(matches!(&skeleton.nodes[0].kind, SkeletonKind::Text(t) if t == "a   \n"));
    }

    #[test]
    fn do_while_closes_on_while_not_end() {
        let skeleton = parse("#do\nx\n#while cond");
        let SkeletonKind::While { is_do_while, .. } = &skeleton.nodes[0].kind else {
            panic!("expected a while node");
        };
        assert!(*is_do_while);
    }

    #[test]
    fn unrecognized_directive_word_is_an_expression_statement() {
        let skeleton = parse("#x = 5");
        assert!(matches!(skeleton.nodes[0].kind, SkeletonKind::Expression(_)));
    }
}
