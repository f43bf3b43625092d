//! End-to-end compile scenarios: pruning, satisfaction, caching.

use std::sync::Arc;

use anyhow::anyhow;
use flowplan::testing::{assert_op_names, dep_idents, diamond_network, diamond_ops, subdoc_network};
use flowplan::{Dep, GraphError, Network, Operation, Predicate};

/// Surface the compiler's info/debug diagnostics when tests run with
/// `RUST_LOG` set.
fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn diamond_orders_by_insertion() -> anyhow::Result<()> {
    init_logs();
    let net = diamond_network();
    let plan = net.compile(Some(&["x"]), Some(&["y"]), None)?;

    assert_op_names(&plan, &["op1", "op2", "op3"]);
    assert_eq!(dep_idents(plan.needs()), ["x"]);
    assert_eq!(dep_idents(plan.provides()), ["y"]);
    assert!(plan.asked_outs());
    Ok(())
}

#[test]
fn given_intermediate_prunes_its_producer() -> anyhow::Result<()> {
    // op0 produces `x`, but `x` is given: op0 must not run.
    let mut ops = vec![Operation::new("op0").needs(["z"]).provides(["x"])];
    ops.extend(diamond_ops());
    let net = Network::new(ops)?;

    let plan = net.compile(Some(&["x"]), Some(&["y"]), None)?;
    assert_op_names(&plan, &["op1", "op2", "op3"]);
    assert_eq!(dep_idents(plan.needs()), ["x"]);

    // With `z` given instead, the full chain runs.
    let plan = net.compile(Some(&["z"]), Some(&["y"]), None)?;
    assert_op_names(&plan, &["op0", "op1", "op2", "op3"]);
    Ok(())
}

#[test]
fn producer_survives_when_consumed_elsewhere() -> anyhow::Result<()> {
    // op0 produces both the given `x` and `w`, which op3 still needs.
    let net = Network::new([
        Operation::new("op0").needs(["z"]).provides(["x", "w"]),
        Operation::new("op3").needs(["x", "w"]).provides(["y"]),
    ])?;

    let plan = net.compile(Some(&["z", "x"]), Some(&["y"]), None)?;
    assert_op_names(&plan, &["op0", "op3"]);
    Ok(())
}

#[test]
fn optional_need_may_be_absent() -> anyhow::Result<()> {
    let net = Network::new([
        Operation::new("op1")
            .needs([Dep::new("x").optional()])
            .provides(["a"]),
    ])?;

    let plan = net.compile(Some(&[]), Some(&["a"]), None)?;
    assert_op_names(&plan, &["op1"]);
    assert!(dep_idents(plan.needs()).is_empty());
    Ok(())
}

#[test]
fn compulsory_need_missing_prunes_the_op() -> anyhow::Result<()> {
    let net = diamond_network();
    let plan = net.compile(Some(&[]), Some(&["y"]), None)?;
    assert_eq!(plan.operations().count(), 0);
    assert!(plan.steps().is_empty());
    Ok(())
}

#[test]
fn unknown_outputs_error() {
    let net = diamond_network();
    let err = net
        .compile(Some(&["x"]), Some(&["nonexistent"]), None)
        .unwrap_err();
    match &err {
        GraphError::UnknownOutputs(names) => assert_eq!(names, &["nonexistent".to_string()]),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("Unknown output nodes"));
}

#[test]
fn unknown_inputs_are_ignored() -> anyhow::Result<()> {
    let net = diamond_network();
    let plan = net.compile(Some(&["x", "bogus"]), Some(&["y"]), None)?;
    assert_op_names(&plan, &["op1", "op2", "op3"]);
    assert_eq!(dep_idents(plan.needs()), ["x"]);
    Ok(())
}

#[test]
fn subdoc_compile_runs_producer_and_consumer() -> anyhow::Result<()> {
    let net = subdoc_network();
    let plan = net.compile(None, Some(&["out"]), None)?;
    assert_op_names(&plan, &["producer", "consumer"]);
    Ok(())
}

#[test]
fn open_ended_outputs_keep_all_reachable() -> anyhow::Result<()> {
    let net = diamond_network();
    let plan = net.compile(Some(&["x"]), None, None)?;

    assert_op_names(&plan, &["op1", "op2", "op3"]);
    assert!(!plan.asked_outs());
    // Every produced value except the inputs is a provide.
    assert_eq!(dep_idents(plan.provides()), ["a", "b", "y"]);
    Ok(())
}

#[test]
fn outputs_narrow_the_plan() -> anyhow::Result<()> {
    let net = diamond_network();
    // Asking only `a` leaves op2/op3 out.
    let plan = net.compile(Some(&["x"]), Some(&["a"]), None)?;
    assert_op_names(&plan, &["op1"]);
    Ok(())
}

#[test]
fn empty_outputs_compile_to_an_empty_plan() -> anyhow::Result<()> {
    let net = diamond_network();
    let plan = net.compile(Some(&["x"]), Some(&[]), None)?;
    assert!(plan.steps().is_empty());
    assert!(dep_idents(plan.provides()).is_empty());
    Ok(())
}

#[test]
fn predicate_filters_operations() -> anyhow::Result<()> {
    init_logs();
    let net = Network::new([
        Operation::new("fast").needs(["x"]).provides(["a"]).node_prop("slow", false),
        Operation::new("slow").needs(["x"]).provides(["a2"]).node_prop("slow", true),
    ])?;

    let only_fast = Predicate::new("not-slow", |_, props| {
        Ok(!props.get("slow").and_then(|v| v.as_bool()).unwrap_or(false))
    });
    let plan = net.compile(Some(&["x"]), None, Some(&only_fast))?;
    assert_op_names(&plan, &["fast"]);
    Ok(())
}

#[test]
fn predicate_errors_are_rethrown_with_context() {
    let net = diamond_network();
    let failing = Predicate::new("broken", |op, _| {
        if op.name == "op2" {
            Err(anyhow!("boom"))
        } else {
            Ok(true)
        }
    });
    let err = net.compile(Some(&["x"]), Some(&["y"]), Some(&failing)).unwrap_err();
    match &err {
        GraphError::PredicateFailed { predicate, node, .. } => {
            assert_eq!(predicate, "broken");
            assert_eq!(node, "op2");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn equal_requests_share_one_plan() -> anyhow::Result<()> {
    let net = diamond_network();
    let p1 = net.compile(Some(&["x"]), Some(&["y"]), None)?;
    let p2 = net.compile(Some(&["x"]), Some(&["y"]), None)?;
    assert!(Arc::ptr_eq(&p1, &p2));

    // Keys normalize: order and duplicates don't matter.
    let p3 = net.compile(Some(&["x", "x"]), Some(&["y"]), None)?;
    assert!(Arc::ptr_eq(&p1, &p3));

    // A different request compiles its own plan.
    let p4 = net.compile(Some(&["x"]), None, None)?;
    assert!(!Arc::ptr_eq(&p1, &p4));
    Ok(())
}

#[test]
fn predicate_tag_is_part_of_the_cache_key() -> anyhow::Result<()> {
    let net = diamond_network();
    let all = Predicate::new("all", |_, _| Ok(true));
    let p1 = net.compile(Some(&["x"]), Some(&["y"]), Some(&all))?;
    let p2 = net.compile(Some(&["x"]), Some(&["y"]), None)?;
    let p3 = net.compile(Some(&["x"]), Some(&["y"]), Some(&all))?;
    assert!(!Arc::ptr_eq(&p1, &p2));
    assert!(Arc::ptr_eq(&p1, &p3));
    Ok(())
}

#[test]
fn equal_networks_compile_identical_steps() -> anyhow::Result<()> {
    let net1 = diamond_network();
    let net2 = diamond_network();
    let p1 = net1.compile(Some(&["x"]), Some(&["y"]), None)?;
    let p2 = net2.compile(Some(&["x"]), Some(&["y"]), None)?;
    assert_eq!(
        flowplan::testing::step_strings(&p1),
        flowplan::testing::step_strings(&p2)
    );
    Ok(())
}

#[test]
fn cyclic_needs_error() {
    let net = Network::new([
        Operation::new("a2b").needs(["b"]).provides(["a"]),
        Operation::new("b2a").needs(["a"]).provides(["b"]),
    ])
    .expect("cycles surface at compile time, not assembly");

    let err = net.compile(None, None, None).unwrap_err();
    assert!(matches!(err, GraphError::CyclicGraph(_)), "{err}");
}

#[test]
fn sideffect_needs_gate_operations() -> anyhow::Result<()> {
    let net = Network::new([
        Operation::new("init").provides([Dep::sfx("ready")]),
        Operation::new("work").needs([Dep::sfx("ready")]).provides(["out"]),
    ])?;

    // The side-effect flows from init, so work is satisfiable.
    let plan = net.compile(None, Some(&["out"]), None)?;
    assert_op_names(&plan, &["init", "work"]);

    // Given directly by its namespaced identity, init is pruned.
    let plan = net.compile(Some(&["sfx(ready)"]), Some(&["out"]), None)?;
    assert_op_names(&plan, &["work"]);
    Ok(())
}

#[test]
fn sideffected_provides_are_not_open_ended_outputs() -> anyhow::Result<()> {
    let net = Network::new([
        Operation::new("load")
            .needs(["raw"])
            .provides([Dep::sfxed("df", ["sorted"]), Dep::new("count")]),
    ])?;

    let plan = net.compile(Some(&["raw"]), None, None)?;
    // The sideffected provide is excluded from inferred outputs.
    assert_eq!(dep_idents(plan.provides()), ["count"]);
    Ok(())
}
