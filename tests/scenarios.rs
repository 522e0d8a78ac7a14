//! End-to-end rendering scenarios exercising the formula and skeleton
//! layers together through the public `Template` API.

use skelform::{parse_formula, PostProcessContext, Template, Value};

#[test]
fn arithmetic_is_left_associative() {
    let mut tree = parse_formula("4 - 2 - 1").unwrap();
    let mut ctx = PostProcessContext::with_defaults();
    tree.post_process(&mut ctx).unwrap();
    assert_eq!(tree.to_string(), "((4 - 2) - 1)");

    let mut eval_ctx = skelform::EvaluationContext::new();
    assert_eq!(tree.evaluate(&mut eval_ctx).unwrap(), Value::Integer(1));
}

#[test]
fn compound_assignment_is_right_associative() {
    let mut tree = parse_formula("4 -= 2 -= 1").unwrap();
    let mut ctx = PostProcessContext::with_defaults();
    tree.post_process(&mut ctx).unwrap();
    assert_eq!(tree.to_string(), "(4 -= (2 -= 1))");
}

#[test]
fn conditional_branches_render_the_matching_side() {
    let template = Template::parse("#if x > 0\npos\n#else\nneg\n#end").unwrap();

    let out = template.render([("x".to_string(), Value::Integer(3))]).unwrap();
    assert_eq!(out, "pos\n");

    let out = template.render([("x".to_string(), Value::Integer(-1))]).unwrap();
    assert_eq!(out, "neg\n");
}

#[test]
fn for_loop_exposes_the_index_loop_variable() {
    let template = Template::parse("#for n : [10, 20, 30]\n${$i}:${n}\n#end").unwrap();
    let out = template.render([]).unwrap();
    assert_eq!(out, "0:10\n1:20\n2:30\n");
}

#[test]
fn empty_iterable_renders_the_for_else_branch() {
    let template = Template::parse("#for n : items\n${n}\n#else\nempty\n#end").unwrap();
    let out = template
        .render([("items".to_string(), Value::Vector(vec![]))])
        .unwrap();
    assert_eq!(out, "empty\n");
}

#[test]
fn block_override_calls_super() {
    let source = "\
#block title
default
#end
#block title
overridden: ${super()}
#end
${title()}";
    let template = Template::parse(source).unwrap();
    let out = template.render([]).unwrap();
    assert!(out.contains("overridden: default"), "got: {out:?}");
}

#[test]
fn url_filter_percent_encodes_reserved_characters() {
    let mut tree = parse_formula("\"Hello World\" ! url").unwrap();
    let mut ctx = PostProcessContext::with_defaults();
    tree.post_process(&mut ctx).unwrap();
    let mut eval_ctx = skelform::EvaluationContext::new();
    assert_eq!(
        tree.evaluate(&mut eval_ctx).unwrap(),
        Value::String("Hello%20World".to_string())
    );
}

#[test]
fn while_loop_counts_down() {
    let template = Template::parse("#while n > 0\n${n}\n#n -= 1\n#end").unwrap();
    let out = template.render([("n".to_string(), Value::Integer(3))]).unwrap();
    assert_eq!(out, "3\n2\n1\n");
}

#[test]
fn do_while_runs_body_at_least_once() {
    let template = Template::parse("#do\n${n}\n#while false").unwrap();
    let out = template.render([("n".to_string(), Value::Integer(1))]).unwrap();
    assert_eq!(out, "1\n");
}

#[test]
fn break_and_continue_affect_loop_output() {
    let template = Template::parse(
        "#for n : [1, 2, 3, 4]\n\
         #if n == 2\n\
         #continue\n\
         #end\n\
         #if n == 4\n\
         #break\n\
         #end\n\
         ${n}\n\
         #end",
    )
    .unwrap();
    let out = template.render([]).unwrap();
    assert_eq!(out, "1\n3\n");
}

#[test]
fn break_outside_a_loop_is_a_render_error() {
    // #break is valid anywhere in the grammar, so parsing succeeds; the
    // violation is only observable once rendering tries to unwind it past
    // the top of the document.
    let template = Template::parse("#break").unwrap();
    assert!(template.render([]).is_err());
}

#[test]
fn user_defined_function_is_a_no_op_at_its_own_definition_site() {
    let template = Template::parse("#function greet(name)\nHi, ${name}!\n#end\n${greet(\"Ada\")}").unwrap();
    let out = template.render([]).unwrap();
    assert_eq!(out, "Hi, Ada!\n");
}

#[test]
fn include_splices_a_second_file() {
    let dir = std::env::temp_dir().join(format!("skelform-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let included_path = dir.join("greeting.skel");
    std::fs::write(&included_path, "Hello from the included file!").unwrap();
    let main_path = dir.join("main.skel");
    std::fs::write(&main_path, "#include \"greeting.skel\"").unwrap();

    let template = Template::parse_file(&main_path).unwrap();
    let out = template.render([]).unwrap();
    assert_eq!(out, "Hello from the included file!");

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn unrecognized_directive_word_is_treated_as_an_expression_statement() {
    let template = Template::parse("start#total = price * 2\n${total}").unwrap();
    let out = template.render([("price".to_string(), Value::Integer(5))]).unwrap();
    assert_eq!(out, "start\n10");
}

#[test]
fn backslash_escapes_a_literal_hash_and_continues_lines() {
    let template = Template::parse("cost: \\#5\\\nflat").unwrap();
    let out = template.render([]).unwrap();
    assert_eq!(out, "cost: #5flat");
}
