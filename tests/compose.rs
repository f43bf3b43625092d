//! Tests for pipeline composition: merging, precedence, nesting.

use std::collections::HashMap;

use flowplan::testing::assert_op_names;
use flowplan::{
    Dep, GraphError, NameAction, Nest, Operation, Pipeline, RenKind, compose,
};

fn op_names(pipe: &Pipeline) -> Vec<&str> {
    pipe.ops().iter().map(|op| op.name.as_str()).collect()
}

#[test]
fn compose_merges_in_order() -> anyhow::Result<()> {
    let pipe = compose(
        "graph",
        [
            Operation::new("op1").needs(["x"]).provides(["a"]),
            Operation::new("op2").needs(["a"]).provides(["b"]),
        ],
    )?;

    assert_eq!(pipe.name(), "graph");
    assert_eq!(op_names(&pipe), ["op1", "op2"]);
    Ok(())
}

#[test]
fn earlier_operations_win_name_clashes() -> anyhow::Result<()> {
    let pipe = compose(
        "graph",
        [
            Operation::new("dup").needs(["x"]).provides(["a"]),
            Operation::new("dup").needs(["x"]).provides(["b"]),
        ],
    )?;

    assert_eq!(op_names(&pipe), ["dup"]);
    let kept = &pipe.ops()[0];
    assert_eq!(kept.provides[0].name(), "a");
    Ok(())
}

#[test]
fn tombstones_suppress_later_operations() -> anyhow::Result<()> {
    let pipe = compose(
        "graph",
        [
            Operation::new("keep").needs(["x"]).provides(["a"]),
            Operation::null("dup"),
            Operation::new("dup").needs(["x"]).provides(["b"]),
        ],
    )?;

    assert_eq!(op_names(&pipe), ["keep"]);
    Ok(())
}

#[test]
fn empty_pipelines_are_rejected() {
    let err = compose("empty", []).unwrap_err();
    assert!(matches!(err, GraphError::EmptyPipeline(_)), "{err}");

    let err = compose("all-dead", [Operation::null("x")]).unwrap_err();
    assert!(matches!(err, GraphError::EmptyPipeline(_)), "{err}");
}

#[test]
fn nested_pipelines_merge_their_members() -> anyhow::Result<()> {
    let inner = compose(
        "inner",
        [Operation::new("mul").needs(["x"]).provides(["x2"])],
    )?;

    let outer = Pipeline::builder("outer")
        .operation(Operation::new("add").needs(["x2"]).provides(["y"]))
        .pipeline(&inner)
        .build()?;

    assert_eq!(op_names(&outer), ["add", "mul"]);
    Ok(())
}

#[test]
fn nest_under_prefixes_members_with_the_parent() -> anyhow::Result<()> {
    let inner = compose(
        "sub",
        [Operation::new("mul").needs(["x"]).provides(["x2"])],
    )?;

    let outer = Pipeline::builder("main")
        .operation(Operation::new("seed").provides(["main.x"]))
        .pipeline(&inner)
        .nest(Nest::Under)
        .build()?;

    // Direct members have no parent and keep their names; nested
    // members (ops and deps alike) gain the `sub.` prefix.
    assert_eq!(op_names(&outer), ["seed", "sub.mul"]);
    let mul = &outer.ops()[1];
    assert_eq!(mul.needs[0].name(), "sub.x");
    assert_eq!(mul.provides[0].name(), "sub.x2");
    Ok(())
}

#[test]
fn nest_under_leaves_jsonp_deps_untouched() -> anyhow::Result<()> {
    let inner = compose(
        "sub",
        [Operation::new("read").needs(["cfg/opt"]).provides(["val"])],
    )?;

    let outer = Pipeline::builder("main")
        .pipeline(&inner)
        .nest(Nest::Under)
        .build()?;

    let read = &outer.ops()[0];
    assert_eq!(read.name, "sub.read");
    assert_eq!(read.needs[0].name(), "cfg/opt");
    assert_eq!(read.provides[0].name(), "sub.val");
    Ok(())
}

#[test]
fn nesting_twice_avoids_collisions() -> anyhow::Result<()> {
    let inner = compose(
        "stage",
        [Operation::new("work").needs(["in"]).provides(["out"])],
    )?;
    let first = Pipeline::builder("first").pipeline(&inner).nest(Nest::Under).build()?;
    let second = Pipeline::builder("second").pipeline(&inner).nest(Nest::Under).build()?;

    let both = Pipeline::builder("both")
        .pipeline(&first)
        .pipeline(&second)
        .build()?;

    // Same nested names merge into one when composed flat...
    assert_eq!(op_names(&both), ["stage.work"]);
    // ...but different parents give distinct names when re-nested.
    let renested = Pipeline::builder("both")
        .pipeline(&first)
        .pipeline(&second)
        .nest(Nest::Under)
        .build()?;
    assert_eq!(op_names(&renested), ["first.stage.work", "second.stage.work"]);
    Ok(())
}

#[test]
fn renames_map_rewrites_listed_names() -> anyhow::Result<()> {
    let mut renames = HashMap::new();
    renames.insert("mul".to_string(), "double".to_string());
    renames.insert("x2".to_string(), "doubled".to_string());

    let pipe = Pipeline::builder("graph")
        .operation(Operation::new("mul").needs(["x"]).provides(["x2"]))
        .nest(Nest::Renames(renames))
        .build()?;

    let op = &pipe.ops()[0];
    assert_eq!(op.name, "double");
    assert_eq!(op.needs[0].name(), "x");
    assert_eq!(op.provides[0].name(), "doubled");
    Ok(())
}

#[test]
fn renamers_preserve_dependency_modifiers() -> anyhow::Result<()> {
    let mut renames = HashMap::new();
    renames.insert("x".to_string(), "renamed".to_string());

    let pipe = Pipeline::builder("graph")
        .operation(
            Operation::new("op")
                .needs([Dep::new("x").optional().keyword("kw")])
                .provides(["a"]),
        )
        .nest(Nest::Renames(renames))
        .build()?;

    let need = &pipe.ops()[0].needs[0];
    assert_eq!(need.name(), "renamed");
    assert!(need.is_optional());
    assert_eq!(need.get_keyword(), Some("kw"));
    Ok(())
}

#[test]
fn callback_renamers_pick_per_kind() -> anyhow::Result<()> {
    let inner = compose(
        "sub",
        [Operation::new("mul").needs(["x"]).provides(["x2"])],
    )?;

    // Nest only operation names, share the data.
    let outer = Pipeline::builder("main")
        .pipeline(&inner)
        .nest(Nest::with(|ra| {
            if ra.kind == RenKind::Op {
                NameAction::Nest
            } else {
                NameAction::Keep
            }
        }))
        .build()?;

    let mul = &outer.ops()[0];
    assert_eq!(mul.name, "sub.mul");
    assert_eq!(mul.needs[0].name(), "x");
    assert_eq!(mul.provides[0].name(), "x2");
    Ok(())
}

#[test]
fn empty_renames_are_invalid() {
    let err = Pipeline::builder("graph")
        .operation(Operation::new("op").needs(["x"]).provides(["a"]))
        .nest(Nest::with(|_| NameAction::Rename(String::new())))
        .build()
        .unwrap_err();
    assert!(matches!(err, GraphError::InvalidRenamer { .. }), "{err}");
}

#[test]
fn aliases_follow_their_renamed_provides() -> anyhow::Result<()> {
    let inner = compose(
        "sub",
        [Operation::new("mul")
            .needs(["x"])
            .provides(["x2"])
            .alias("x2", "double")],
    )?;

    let outer = Pipeline::builder("main")
        .pipeline(&inner)
        .nest(Nest::Under)
        .build()?;

    let mul = &outer.ops()[0];
    assert_eq!(mul.aliases, [("sub.x2".to_string(), "sub.double".to_string())]);
    let mul_provides = mul.op_provides();
    let provides: Vec<&str> = mul_provides.iter().map(Dep::name).collect();
    assert_eq!(provides, ["sub.x2", "sub.double"]);
    Ok(())
}

#[test]
fn policy_flags_overlay_members() -> anyhow::Result<()> {
    let pipe = Pipeline::builder("graph")
        .operation(Operation::new("op1").needs(["x"]).provides(["a"]).endured(false))
        .operation(Operation::new("op2").needs(["a"]).provides(["b"]))
        .endured(true)
        .parallel(true)
        .node_prop("stage", "batch")
        .build()?;

    for op in pipe.ops() {
        assert_eq!(op.endured, Some(true));
        assert_eq!(op.parallel, Some(true));
        assert_eq!(op.marshalled, None);
        assert_eq!(op.node_props["stage"], "batch");
    }
    Ok(())
}

#[test]
fn pipelines_report_aggregate_requirements() -> anyhow::Result<()> {
    let pipe = compose(
        "graph",
        [
            Operation::new("op1").needs(["x"]).provides(["a"]),
            Operation::new("op2").needs(["a"]).provides(["b"]),
        ],
    )?;

    let needs: Vec<String> = pipe.needs().iter().map(Dep::ident).collect();
    let provides: Vec<String> = pipe.provides().iter().map(Dep::ident).collect();
    assert_eq!(needs, ["x", "a"]);
    assert_eq!(provides, ["a", "b"]);
    Ok(())
}

#[test]
fn narrowed_outputs_apply_on_compile() -> anyhow::Result<()> {
    let pipe = Pipeline::builder("graph")
        .operation(Operation::new("op1").needs(["x"]).provides(["a"]))
        .operation(Operation::new("op2").needs(["a"]).provides(["b"]))
        .outputs(["a"])
        .build()?;

    let plan = pipe.compile(Some(&["x"]))?;
    assert_op_names(&plan, &["op1"]);
    assert!(plan.asked_outs());

    // compile_with overrides the narrowing.
    let plan = pipe.compile_with(Some(&["x"]), Some(&["b"]), None)?;
    assert_op_names(&plan, &["op1", "op2"]);
    Ok(())
}

#[test]
fn withset_reopens_a_seeded_builder() -> anyhow::Result<()> {
    let pipe = compose(
        "graph",
        [
            Operation::new("op1").needs(["x"]).provides(["a"]),
            Operation::new("op2").needs(["a"]).provides(["b"]),
        ],
    )?;

    let narrowed = pipe.withset().outputs(["a"]).build()?;
    assert_eq!(narrowed.name(), "graph");
    assert_eq!(op_names(&narrowed), ["op1", "op2"]);

    let plan = narrowed.compile(Some(&["x"]))?;
    assert_op_names(&plan, &["op1"]);
    Ok(())
}

#[test]
fn auto_name_devises_a_distinct_suffix() -> anyhow::Result<()> {
    let pipe = compose(
        "graph-42",
        [Operation::new("op1").needs(["x"]).provides(["a"])],
    )?;

    let renamed = pipe.withset().outputs(["a"]).auto_name().build()?;
    assert!(renamed.name().starts_with("graph-"), "{}", renamed.name());
    assert_ne!(renamed.name(), "graph-42");

    // The uid is stable for equal settings.
    let again = pipe.withset().outputs(["a"]).auto_name().build()?;
    assert_eq!(renamed.name(), again.name());
    Ok(())
}
