use nao::runtime::Value;
use nao::*;
use pretty_assertions::assert_eq;

fn run(program: &str) -> Compiled {
    let program = parse_program(program).expect("program should parse");
    Compiler::default()
        .run(&program)
        .expect("program should compile")
}

fn names(nodes: &[String]) -> Vec<&str> {
    nodes.iter().map(String::as_str).collect()
}

fn last_bag(compiled: &Compiled) -> &nao::runtime::RetvalBag {
    match compiled.values.last() {
        Some(Value::Bag(bag)) => bag,
        other => panic!("expected a bag, got {:?}", other),
    }
}

#[test]
fn test_declared_function_passes_input_through_identity() {
    let compiled = run(r#"[
        ["_named_placeholder", "x", null, ["_sf_type", "float"]],
        ["_sf_def_function", "addOne", null,
            [["x", null, ["_sf_type", "float"]]],
            [["out", "x"]]],
        ["_sf_apply", "call", null, "addOne", null, ["_sf_local", "x"]]
    ]"#);

    let bag = last_bag(&compiled);
    assert_eq!(bag.keys().collect::<Vec<_>>(), vec!["out"]);

    let out = bag.get(None).unwrap().as_node().unwrap().clone();
    let x = compiled.graph.node("x").unwrap();
    assert!(out != x);
    assert_eq!(out.name(), "call/out");
    assert_eq!(out.op(), "Identity");
    assert_eq!(names(&out.inputs()), vec!["x"]);
}

#[test]
fn test_unconsumed_constants_are_leaves() {
    let compiled = run(r#"[
        ["_named_tensor", null, null, null, 1],
        ["_named_tensor", null, null, null, 2.5]
    ]"#);

    let leaves: Vec<String> = compiled
        .context
        .leaves()
        .iter()
        .map(|n| n.name().to_string())
        .collect();
    assert_eq!(leaves, vec!["Const".to_string(), "Const_1".to_string()]);
}

#[test]
fn test_consumed_nodes_stop_being_leaves() {
    let compiled = run(r#"[
        ["_named_tensor", "a", null, null, 1],
        ["_named_tensor", "b", null, null, 2],
        ["_sf_apply", "c", "ops", "add", null, ["_sf_local", "a"], ["_sf_local", "b"]]
    ]"#);
    let leaves: Vec<String> = compiled
        .context
        .leaves()
        .iter()
        .map(|n| n.name().to_string())
        .collect();
    assert_eq!(leaves, vec!["c".to_string()]);
}

#[test]
fn test_after_leaves_orders_statements_after_pending_nodes() {
    let compiled = run(r#"[
        ["_sf_graph", "main",
            ["_named_tensor", "a", null, null, 1],
            ["_named_tensor", "b", null, null, 2],
            ["__sf_after_leaves",
                ["__retval", "done", ["_sf_apply", null, "ops", "no_op", null]]]]
    ]"#);

    let gated = compiled.graph.node("main/_/no_op_0").unwrap();
    assert_eq!(
        names(&gated.control_inputs()),
        vec!["main/_/a", "main/_/b"]
    );

    let bag = last_bag(&compiled);
    let done = bag.get(Some("done")).unwrap().as_node().unwrap();
    assert_eq!(done.name(), "main/done");
    assert_eq!(names(&done.inputs()), vec!["main/_/no_op_0"]);
    assert!(done.control_inputs().is_empty());
}

#[test]
fn test_graph_block_without_retvals_is_an_empty_bag() {
    let compiled = run(r#"[["_sf_graph", "empty", ["_named_tensor", null, null, null, 0]]]"#);
    assert!(last_bag(&compiled).is_empty());
    assert!(compiled.graph.node("empty/_/Const").is_some());
}

#[test]
fn test_graph_block_names_are_made_unique() {
    let compiled = run(r#"[
        ["_sf_graph", "g", ["__retval", "v", 1]],
        ["_sf_graph", "g", ["__retval", "v", 2]]
    ]"#);
    assert!(compiled.graph.node("g/v").is_some());
    assert!(compiled.graph.node("g_1/v").is_some());
}

#[test]
fn test_positional_arguments_and_named_outputs() {
    let compiled = run(r#"[
        ["_named_placeholder", "p", ["_sf_shape", 2], ["_sf_type", "int32"]],
        ["_named_placeholder", "q", ["_sf_shape", 2], ["_sf_type", "int32"]],
        ["_sf_def_function", "sumdiff", null,
            [["a", ["_sf_shape", 2], ["_sf_type", "int32"]], ["b", ["_sf_shape", 2], ["_sf_type", "int32"]]],
            [["sum", "s"], ["diff", "d"]],
            ["_sf_apply", "s", "ops", "add", null, ["_sf_local", "a"], ["_sf_local", "b"]],
            ["_sf_apply", "d", "ops", "subtract", null, ["_sf_local", "b"], ["_sf_local", "a"]]],
        ["_sf_apply", "f1", null, "sumdiff", null, ["_sf_local", "p"], ["_sf_local", "q"]],
        ["_sf_index", ["_sf_local", "f1"], "diff"]
    ]"#);

    let def = compiled.graph.to_graph_def();
    assert_eq!(names(&def.node("f1/s").unwrap().inputs), vec!["p", "q"]);
    assert_eq!(names(&def.node("f1/d").unwrap().inputs), vec!["q", "p"]);

    let diff = compiled.values.last().unwrap().as_node().unwrap();
    assert_eq!(diff.name(), "f1/diff");
    assert_eq!(names(&diff.inputs()), vec!["f1/d"]);

    match compiled.context.get_local("f1").unwrap() {
        Value::Bag(bag) => assert_eq!(bag.keys().collect::<Vec<_>>(), vec!["sum", "diff"]),
        other => panic!("expected a bag, got {}", other),
    }
}

#[test]
fn test_call_site_attributes_reach_the_body() {
    let compiled = run(r#"[
        ["_named_placeholder", "x", null, ["_sf_type", "float"]],
        ["_sf_def_function", "scaled", ["k"],
            [["v", null, ["_sf_type", "float"]]],
            [["out", "y"]],
            ["_sf_apply", "y", "ops", "multiply", null, ["_sf_local", "v"], ["_sf_attr", "k"]]],
        ["_sf_apply", "call", null, "scaled", ["_sf_attrs", ["k", 3]], ["_sf_local", "x"]]
    ]"#);

    let mul = compiled.graph.node("call/y").unwrap();
    assert_eq!(mul.op(), "Mul");
    assert_eq!(names(&mul.inputs()), vec!["x", "call/Const"]);
}

#[test]
fn test_unnamed_calls_of_the_same_function_get_distinct_scopes() {
    let compiled = run(r#"[
        ["_named_placeholder", "x", null, ["_sf_type", "float"]],
        ["_sf_def_function", "neg", null,
            [["v", null, ["_sf_type", "float"]]],
            [["out", "y"]],
            ["_sf_apply", "y", "ops", "negative", null, ["_sf_local", "v"]]],
        ["_sf_apply", null, null, "neg", null, ["_sf_local", "x"]],
        ["_sf_apply", null, null, "neg", null, ["_sf_local", "x"]]
    ]"#);
    assert!(compiled.graph.node("neg_0/out").is_some());
    assert!(compiled.graph.node("neg_1/out").is_some());
}

#[test]
fn test_function_values_can_be_passed_and_called() {
    let compiled = run(r#"[
        ["_named_placeholder", "x", null, ["_sf_type", "float"]],
        ["_sf_def_function", "call_with", null,
            [["g", null, null], ["v", null, null]],
            [["out", "r2"]],
            ["_sf_apply", "r", null, "g", null, ["_sf_local", "v"]],
            ["_sf_apply", "r2", "ops", "identity", null, ["_sf_local", "r"]]],
        ["_sf_apply", "outer", null, "call_with", null,
            ["_sf_function", "inner", null, [["w", null, null]], [["res", "w"]]],
            ["_sf_local", "x"]]
    ]"#);

    let res = compiled.graph.node("outer/r/res").unwrap();
    assert_eq!(names(&res.inputs()), vec!["x"]);
    let out = last_bag(&compiled).get(Some("out")).unwrap().as_node().unwrap();
    assert_eq!(out.name(), "outer/out");
    assert_eq!(names(&out.inputs()), vec!["outer/r2"]);
}

#[test]
fn test_cond_builds_switch_and_merge() {
    let compiled = run(r#"[
        ["_named_placeholder", "a", null, ["_sf_type", "float"]],
        ["_sf_apply", "p", "ops", "less", null, ["_sf_local", "a"], 0.0],
        ["_sf_cond", ["_sf_local", "p"],
            ["_sf_apply", "neg", "ops", "negative", null, ["_sf_local", "a"]],
            ["_sf_local", "a"]]
    ]"#);

    let merge = compiled.values.last().unwrap().as_node().unwrap();
    assert_eq!(merge.op(), "Merge");
    assert_eq!(names(&merge.inputs()), vec!["cond/neg", "a"]);

    let neg = compiled.graph.node("cond/neg").unwrap();
    assert_eq!(names(&neg.control_inputs()), vec!["cond/switch_t"]);
    let switch = compiled.graph.node("cond/switch").unwrap();
    assert_eq!(names(&switch.inputs()), vec!["p"]);
}

#[test]
fn test_compile_program_returns_a_serializable_snapshot() {
    let program = parse_program(
        r#"[
        ["_named_placeholder", "x", ["_sf_shape", null, 3], ["_sf_type", "double"]],
        ["_sf_apply", "y", "ops", "identity", null, ["_sf_local", "x"]]
    ]"#,
    )
    .unwrap();
    let def = compile_program(&program).unwrap();
    assert_eq!(
        def.nodes.iter().map(|n| n.name.as_str()).collect::<Vec<_>>(),
        vec!["x", "y"]
    );

    let json = def.to_json().unwrap();
    assert_eq!(GraphDef::from_json(&json).unwrap(), def);
}

#[test]
fn test_literal_forms_evaluate_to_typed_values() {
    let compiled = run(r#"[
        ["_sf_whole", "12"],
        ["_sf_fraction", "1.5"],
        ["_sf_list", 1, ["_sf_whole", "2"]]
    ]"#);
    assert_eq!(
        compiled.values,
        vec![
            Value::Integer(12),
            Value::Float(1.5),
            Value::List(vec![Value::Integer(1), Value::Integer(2)]),
        ]
    );
}
