use nao::runtime::{reassemble, Function, RuntimeError, Value};
use nao::*;
use pretty_assertions::assert_eq;

const NEGATE: &str = r#"
    ["_sf_def_function", "neg", null,
        [["x", null, ["_sf_type", "float"]]],
        [["y", "y"]],
        ["_sf_apply", "y", "ops", "negative", null, ["_sf_local", "x"]]]
"#;

fn run(statements: &[&str]) -> RuntimeResult<Compiled> {
    let program = parse_program(&format!("[{}]", statements.join(",")))
        .expect("program should parse");
    Compiler::default().run(&program)
}

#[test]
fn test_disasm_then_reasm_splices_independent_copies() {
    let compiled = run(&[
        NEGATE,
        r#"["_sf_apply", "parts", "nao", "disasm", null, ["_sf_local", "neg"]]"#,
        r#"["_sf_apply", "negate", "nao", "reasm", null,
            ["_sf_index", ["_sf_local", "parts"], "inputs"],
            ["_sf_index", ["_sf_local", "parts"], "outputs"]]"#,
        r#"["_named_placeholder", "p", null, ["_sf_type", "float"]]"#,
        r#"["_sf_apply", "first", null, "negate", null, ["_sf_local", "p"]]"#,
        r#"["_sf_apply", "second", null, "negate", null, ["_sf_local", "p"]]"#,
    ])
    .unwrap();

    let def = compiled.graph.to_graph_def();
    assert_eq!(
        def.nodes.iter().map(|n| n.name.as_str()).collect::<Vec<_>>(),
        vec!["p", "first/y", "second/y"]
    );
    assert_eq!(def.node("first/y").unwrap().op, "Neg");
    assert_eq!(def.node("first/y").unwrap().inputs, vec!["p".to_string()]);
    assert_eq!(def.node("second/y").unwrap().inputs, vec!["p".to_string()]);

    match compiled.values.last().unwrap() {
        Value::Bag(bag) => {
            let y = bag.get(Some("y")).unwrap().as_node().unwrap();
            assert_eq!(y.name(), "second/y");
        }
        other => panic!("expected a bag, got {}", other),
    }
}

#[test]
fn test_indexing_a_declared_function_reuses_one_disassembly() {
    let compiled = run(&[
        NEGATE,
        r#"["_sf_apply", "negate", "nao", "reasm", null,
            ["_sf_index", ["_sf_local", "neg"], "inputs"],
            ["_sf_index", ["_sf_local", "neg"], "outputs"]]"#,
    ])
    .unwrap();

    match compiled.context.get_local("negate").unwrap() {
        Value::Function(Function::Synthetic(f)) => {
            assert_eq!(f.input_names(), ["x".to_string()]);
            assert_eq!(f.output_names(), ["y".to_string()]);
            assert_eq!(f.snapshot().len(), 2);
        }
        other => panic!("expected a synthetic function, got {}", other),
    }
    // disassembly happens in an isolated graph
    assert!(compiled.graph.is_empty());
}

#[test]
fn test_splice_inside_ordering_frame_gets_control_edges() {
    let compiled = run(&[
        NEGATE,
        r#"["_sf_apply", "negate", "nao", "reasm", null,
            ["_sf_index", ["_sf_local", "neg"], "inputs"],
            ["_sf_index", ["_sf_local", "neg"], "outputs"]]"#,
        r#"["_sf_graph", "main",
            ["_named_placeholder", "p", null, ["_sf_type", "float"]],
            ["_named_tensor", "pending", null, null, 1],
            ["__sf_after_leaves",
                ["__retval", "out", ["_sf_index",
                    ["_sf_apply", "call", null, "negate", null, ["_sf_local", "p"]],
                    null]]]]"#,
    ])
    .unwrap();

    let spliced = compiled.graph.node("main/_/call/y").unwrap();
    assert_eq!(spliced.inputs(), vec!["main/_/p".to_string()]);
    assert_eq!(
        spliced.control_inputs(),
        vec!["main/_/pending".to_string()]
    );
}

#[test]
fn test_synthetic_function_checks_arity() {
    let err = run(&[
        NEGATE,
        r#"["_sf_apply", "negate", "nao", "reasm", null,
            ["_sf_index", ["_sf_local", "neg"], "inputs"],
            ["_sf_index", ["_sf_local", "neg"], "outputs"]]"#,
        r#"["_sf_apply", "call", null, "negate", null]"#,
    ])
    .unwrap_err();
    assert!(matches!(err, RuntimeError::Apply { .. }));
}

#[test]
fn test_reassemble_then_apply_in_another_graph() {
    let source = Graph::new();
    let x = source.op("Placeholder").name("x").build().unwrap();
    let doubled = source
        .op("Add")
        .name("doubled")
        .inputs([x.clone(), x.clone()])
        .build()
        .unwrap();
    let function = reassemble(&[x], &[doubled]).unwrap();

    let mut evaluator = Evaluator::default();
    let input = evaluator.graph().op("Const").name("c").build().unwrap();
    let out = Function::Synthetic(std::rc::Rc::new(function))
        .apply(&mut evaluator, Some("twice"), None, vec![Value::Node(input)])
        .unwrap();

    let def = evaluator.graph().to_graph_def();
    assert_eq!(def.len(), 2);
    assert_eq!(
        def.node("twice/doubled").unwrap().inputs,
        vec!["c".to_string(), "c".to_string()]
    );
    match out {
        Value::Bag(bag) => assert_eq!(bag.keys().collect::<Vec<_>>(), vec!["doubled"]),
        other => panic!("expected a bag, got {}", other),
    }
}
